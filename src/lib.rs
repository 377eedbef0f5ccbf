//! Release artifact catalog and on-demand archive cache
//!
//! # Modules
//!
//! - [`version`]: parsing and ordering of artifact version identifiers
//! - [`manifest`]: the JSON catalog of published versions
//! - [`store`]: where release archives are fetched from
//! - [`gateway`]: fills the local cache on demand and serves files from it
//! - [`server`]: HTTP routes over the gateway
//! - [`config`]: constants, server configuration and data paths
//! - [`logging`]: tracing subscriber setup

pub mod config;
pub mod gateway;
pub mod logging;
pub mod manifest;
pub mod server;
pub mod store;
pub mod version;
