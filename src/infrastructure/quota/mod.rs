//! Usage quota enforcement

mod tracker;

pub use tracker::{QuotaConfig, QuotaReservation, QuotaTracker};
