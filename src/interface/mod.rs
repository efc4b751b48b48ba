//! Interface state classification.
//!
//! Raw adapter/radio text goes in, a typed [`InterfaceSnapshot`] comes out.

pub mod classify;
pub mod extract;
pub mod types;

pub use classify::{classify, dbm_to_percent, infer_link_type, percent_to_dbm, snr_db};
pub use types::{InterfaceHint, InterfaceSnapshot, LinkType};
