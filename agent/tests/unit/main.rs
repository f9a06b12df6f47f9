//! Integration tests for the app-deployer crate


mod test_concurrency;
mod test_fsm;
mod test_observe;
mod test_registry;
mod test_server;
mod test_stages;
