//! Typed values flowing through a sync run
//!
//! Records are validated once, at the parse boundary, and are immutable
//! afterwards. Range sets are `BTreeSet`s so membership is deduplicated and
//! iteration order (and therefore API payloads and logs) is stable.

use crate::error::{Error, Result};
use ipnetwork::IpNetwork;
use std::collections::BTreeSet;
use std::fmt;

/// A deduplicated set of CIDR ranges
pub type RangeSet = BTreeSet<IpNetwork>;

/// Parse a CIDR string into its canonical network form
///
/// Host bits are cleared (`10.0.0.1/8` becomes `10.0.0.0/8`) and a bare
/// address is read as a single-host prefix, so equal ranges compare equal
/// regardless of how the dataset or the remote API spelled them.
pub fn parse_cidr(input: &str) -> Result<IpNetwork> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::invalid_input("CIDR cannot be empty"));
    }

    let network: IpNetwork = trimmed
        .parse()
        .map_err(|e| Error::invalid_input(format!("Invalid CIDR '{}': {}", trimmed, e)))?;

    IpNetwork::new(network.network(), network.prefix())
        .map_err(|e| Error::invalid_input(format!("Invalid CIDR '{}': {}", trimmed, e)))
}

/// One row of the dataset: an IP range and the organization announcing it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRecord {
    cidr: IpNetwork,
    asn: Option<u32>,
    organization: String,
}

impl RangeRecord {
    /// Create a record from already-typed values
    pub fn new(cidr: IpNetwork, organization: impl Into<String>) -> Self {
        Self {
            cidr,
            asn: None,
            organization: organization.into(),
        }
    }

    /// Attach the autonomous system number of the row
    pub fn with_asn(mut self, asn: u32) -> Self {
        self.asn = Some(asn);
        self
    }

    /// Validate raw row fields into a record
    ///
    /// # Parameters
    ///
    /// - `row`: 1-based row number, used in the error
    /// - `network`: CIDR column
    /// - `asn`: autonomous system number column (may be empty)
    /// - `organization`: organization column
    ///
    /// # Returns
    ///
    /// - `Ok(RangeRecord)`: The validated record
    /// - `Err(Error::Parse)`: If the CIDR or ASN column is malformed
    pub fn from_fields(row: usize, network: &str, asn: &str, organization: &str) -> Result<Self> {
        let cidr = parse_cidr(network).map_err(|e| Error::parse(row, e.to_string()))?;

        let asn = match asn.trim() {
            "" => None,
            value => Some(value.parse::<u32>().map_err(|_| {
                Error::parse(row, format!("Invalid autonomous system number '{}'", value))
            })?),
        };

        Ok(Self {
            cidr,
            asn,
            organization: organization.trim().to_string(),
        })
    }

    pub fn cidr(&self) -> IpNetwork {
        self.cidr
    }

    pub fn asn(&self) -> Option<u32> {
        self.asn
    }

    pub fn organization(&self) -> &str {
        &self.organization
    }
}

/// A parsed dataset snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    /// Rows that passed validation
    pub records: Vec<RangeRecord>,
    /// Rows dropped on the parse error path
    pub rejected_rows: usize,
}

/// A named group of ranges destined for one tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagBucket {
    /// Tag name; identity of the bucket
    pub name: String,
    /// Desired member ranges
    pub members: RangeSet,
}

impl TagBucket {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: RangeSet::new(),
        }
    }
}

/// Ranges to add to and remove from one tag
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationDelta {
    pub to_add: RangeSet,
    pub to_remove: RangeSet,
}

impl ReconciliationDelta {
    /// True when the tag already matches the desired state
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

impl fmt::Display for ReconciliationDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{} -{}", self.to_add.len(), self.to_remove.len())
    }
}
