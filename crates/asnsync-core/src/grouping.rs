//! Partition dataset records into tag buckets
//!
//! Every configured bucket yields exactly one `TagBucket`, even when nothing
//! matched, so the engine can shrink a tag to empty. A record matching the
//! patterns of several buckets lands in all of them; there is no precedence.

use crate::config::MatchPattern;
use crate::model::{RangeRecord, TagBucket};
use std::collections::BTreeMap;
use tracing::debug;

impl MatchPattern {
    /// Test a record against this pattern
    ///
    /// Keywords are case-insensitive substrings of the organization, taken
    /// as configured (surrounding spaces are part of the keyword). A blank
    /// keyword matches nothing.
    pub fn matches(&self, record: &RangeRecord) -> bool {
        Matcher::from(self).matches(&record.organization().to_lowercase(), record.asn())
    }
}

/// A pattern with its keyword lowercased ahead of the record loop
enum Matcher {
    Keyword(String),
    Asn(u32),
    Nothing,
}

impl From<&MatchPattern> for Matcher {
    fn from(pattern: &MatchPattern) -> Self {
        match pattern {
            MatchPattern::Keyword(keyword) if keyword.trim().is_empty() => Matcher::Nothing,
            MatchPattern::Keyword(keyword) => Matcher::Keyword(keyword.to_lowercase()),
            MatchPattern::Asn { asn } => Matcher::Asn(*asn),
        }
    }
}

impl Matcher {
    /// `organization` must already be lowercase
    fn matches(&self, organization: &str, asn: Option<u32>) -> bool {
        match self {
            Matcher::Keyword(keyword) => organization.contains(keyword.as_str()),
            Matcher::Asn(expected) => asn == Some(*expected),
            Matcher::Nothing => false,
        }
    }
}

/// Group records into one bucket per configured name
///
/// # Parameters
///
/// - `records`: the full parsed dataset
/// - `buckets`: bucket name to match patterns
///
/// # Returns
///
/// Buckets in configuration (name) order, each holding the deduplicated
/// ranges of every matching record.
pub fn group_records(
    records: &[RangeRecord],
    buckets: &BTreeMap<String, Vec<MatchPattern>>,
) -> Vec<TagBucket> {
    let organizations: Vec<String> = records
        .iter()
        .map(|record| record.organization().to_lowercase())
        .collect();

    buckets
        .iter()
        .map(|(name, patterns)| {
            let matchers: Vec<Matcher> = patterns.iter().map(Matcher::from).collect();
            let mut bucket = TagBucket::new(name.clone());
            for (record, organization) in records.iter().zip(&organizations) {
                if matchers
                    .iter()
                    .any(|matcher| matcher.matches(organization, record.asn()))
                {
                    bucket.members.insert(record.cidr());
                }
            }
            debug!("Bucket {} collected {} range(s)", name, bucket.members.len());
            bucket
        })
        .collect()
}
