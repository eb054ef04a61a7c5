//! Data models shared by the gateway's route handlers and sync paths.

mod address;
mod donation;

pub use address::Address;
pub use donation::{DonationRecord, Donor};
