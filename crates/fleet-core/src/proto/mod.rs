mod error;
mod rpc;
mod types;

pub use error::{ErrorCode, RpcError};
pub use rpc::*;
pub use types::*;
