// Library interface for sigproxy
// This allows the binary and integration tests to import the modules

pub mod backends;
pub mod config;
pub mod eth;
pub mod logging;
pub mod prelude;
pub mod proxy;
pub mod registry;
pub mod rpc;
