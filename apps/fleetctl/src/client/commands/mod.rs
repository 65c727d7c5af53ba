pub mod backup;
pub mod core;
pub mod players;
pub mod whitelist;
