//! app-deployer library
//!
//! Deployment workflow engine for applications running as systemd services,
//! plus the HTTP adapter and process lifecycle around it.

pub mod app;
pub mod check;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod registry;
pub mod server;
pub mod storage;
pub mod telemetry;
pub mod utils;
