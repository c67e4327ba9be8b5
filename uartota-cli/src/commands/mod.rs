//! Command implementations.

pub(crate) mod checksum;
pub(crate) mod ports;
pub(crate) mod upload;
