//! Static allow-list gate applied before every bot command.
pub mod allowlist;

pub use allowlist::*;
