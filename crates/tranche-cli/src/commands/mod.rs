pub mod init;
pub mod release;
pub mod run;
