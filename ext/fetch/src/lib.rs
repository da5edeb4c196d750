//! Cross-boundary marshalling (C5) and outbound `fetch` (C7).

pub mod marshal;
mod ops;
pub mod outbound;

pub use ops::islet_fetch;
