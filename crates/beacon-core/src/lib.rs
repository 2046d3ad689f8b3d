//! Beacon Core - Domain types and ports for the report dispatcher
//!
//! This crate contains the pieces of the reporting client that do not
//! perform I/O:
//! - **Domain types** - `Level`, `Event`, `Draft`, `Mode`
//! - **Payload composition** - `PayloadBuilder` and the default JSON builder
//! - **Port definitions** - the `Transport` trait and its event stream types
//! - **Configuration** - YAML-backed `Config` with validation and a builder
//!
//! Adapter crates (`beacon-client`) implement the ports and run the
//! dispatcher on top of them.

pub mod config;
pub mod domain;
pub mod payload;
pub mod ports;
