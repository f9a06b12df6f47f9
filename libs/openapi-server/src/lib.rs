//! HTTP API models for the app-deployer agent

pub mod models;
