//! WebSocket Connection Manager (C8): upgraded-connection lifecycle
//! (`CONNECTING` → `OPEN` → `CLOSING`/`CLOSED`), the guest `ws` object
//! contract, and the host-side command channel that drives the actual
//! `fastwebsockets` read/write loop.

pub mod manager;
mod ops;
pub mod transport;

pub use ops::islet_websocket;
