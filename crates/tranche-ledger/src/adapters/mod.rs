pub mod memory;
pub mod rpc;

pub use memory::{Fault, MemoryLedger};
pub use rpc::JsonRpcLedger;
