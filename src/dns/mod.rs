//! Mail exchange lookups used by the email channel.

pub mod resolver;

use async_trait::async_trait;
use thiserror::Error;

pub use resolver::HickoryMxResolver;

/// A single MX record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MxRecord {
    /// Lower values are preferred.
    pub preference: u16,
    /// Host name of the mail exchange, without the trailing root dot.
    pub exchange: String,
}

impl MxRecord {
    pub fn new(preference: u16, exchange: impl Into<String>) -> Self {
        Self {
            preference,
            exchange: exchange.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DnsError {
    #[error("DNS resolution failed: {0}")]
    Resolution(String),

    #[error("No MX records found for {0}")]
    NoRecords(String),
}

/// Resolves the mail exchanges of a domain.
#[async_trait]
pub trait MxResolver: Send + Sync {
    /// Looks up the MX records of `domain`.
    ///
    /// # Returns
    /// * `Ok(records)` with at least one record on success
    /// * `Err` for NXDOMAIN, timeouts, server errors or an empty answer
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, DnsError>;
}

/// Picks the most preferred exchange. Ties keep the order of the answer.
pub fn preferred_exchange(records: &[MxRecord]) -> Option<&MxRecord> {
    records.iter().min_by_key(|r| r.preference)
}
