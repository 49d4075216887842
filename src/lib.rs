//! Mailbox scanner for business-email-compromise attempts.
//!
//! Signs in with the device-code flow, pages through recent messages in a
//! Microsoft Graph mailbox, and flags ones that ask to change payment or
//! address details. Matches are echoed to the console and saved to a CSV
//! report at the end of the run.

pub mod auth;
pub mod classifier;
pub mod config;
pub mod error;
pub mod fetch;
pub mod models;
pub mod output;
pub mod progress;
pub mod scanner;

pub use config::Config;
pub use error::{Result, ScanError};
pub use models::MatchRecord;
pub use scanner::{ScanDriver, ScanOutcome};
