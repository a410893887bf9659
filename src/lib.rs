//! Fetch patents from a paginated HTTP API and write them to a pluggable sink.

pub mod config;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod gateway;
pub mod output;
pub mod sink;
