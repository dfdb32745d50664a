pub mod events;
pub mod goals;
pub mod rpc;
