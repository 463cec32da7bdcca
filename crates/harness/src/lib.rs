pub mod fixtures;
pub mod gateway;

pub use fixtures::*;
pub use gateway::{GatewayCall, ScriptedGateway};
