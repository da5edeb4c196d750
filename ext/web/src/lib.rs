//! The Web Object Model, Body state machine, and guest stream shims: the
//! pure-Rust half of the fetch bridge's Web platform surface (components
//! C2, C3, C4, C9).

pub mod abort;
pub mod blob;
pub mod body;
pub mod error;
pub mod form_data;
pub mod headers;
pub mod identity;
pub mod multipart;
pub mod ops;
pub mod request;
pub mod response;
pub mod streams;
pub mod url;

pub use ops::islet_web;
