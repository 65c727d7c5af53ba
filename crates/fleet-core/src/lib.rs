mod errors;
pub mod model;
pub mod proto;

pub use errors::FleetError;

pub const PROTOCOL_VERSION: u32 = 1;
