//! Filesystem access

pub mod file;
pub mod ops;
