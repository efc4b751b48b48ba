//! Shared utilities: IP and subnet helpers.

pub mod ip_utils;

pub use ip_utils::{is_private_ip, is_valid_ip, Cidr, CidrError};
