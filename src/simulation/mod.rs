pub mod agents;
pub mod config;
pub mod error;
pub mod events;
pub mod id;
pub mod logging;
pub mod network;
pub mod random;
pub mod scenario;
#[allow(clippy::module_inception)]
pub mod simulation;
pub mod time_queue;
pub mod vehicles;
