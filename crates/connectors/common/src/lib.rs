//! Connector building blocks shared across venues.
//!
//! Hosts the `paper` venue: an in-memory exchange used for demos and for
//! exercising the gateway without network access.

pub mod simulated;

pub use simulated::{PaperClient, PaperConfig, PaperVenue, PAPER_EXCHANGE_ID};
