//! Serve Dispatcher (C6): turns inbound host requests into guest handler
//! invocations and outbound guest responses into host responses, streaming
//! bodies in both directions.

pub mod dispatcher;
mod ops;

pub use ops::islet_http;
