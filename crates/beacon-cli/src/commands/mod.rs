pub mod config;
pub mod send;
