//! USB Subsystem
//!
//! Two interfaces share the device:
//! - a vendor-specific interface carrying register reads and writes as
//!   control transfers
//! - CDC ACM for the typed serial console

pub mod cdc;
pub mod vendor;
