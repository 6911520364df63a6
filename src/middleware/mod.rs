//! Request observability middleware.
//!
//! This module provides request logging with latency tracking, layered
//! onto every route except `/health`.

pub mod logging;

pub use logging::request_logging;
