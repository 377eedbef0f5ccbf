//! Shared test utilities

#![allow(dead_code)]

mod archive;
mod gateway;

pub use archive::*;
pub use gateway::*;
