//! DNS client interface.

use crate::error::Result;
use crate::pager::{Page, Pager};
use serde::{Deserialize, Serialize};
use std::fmt;

/// DNS record types managed for a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    /// IPv4 address
    A,
    /// IPv6 address
    Aaaa,
    /// Canonical name
    Cname,
    /// Text
    Txt,
}

impl RecordType {
    /// Wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
            Self::Cname => "CNAME",
            Self::Txt => "TXT",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record set: every record of one name and type in a zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSet {
    /// Zone name (e.g. "example.com.")
    pub zone: String,
    /// Fully qualified record name
    pub name: String,
    /// Record type
    pub record_type: RecordType,
    /// Time to live in seconds
    pub ttl: u32,
    /// Record values
    pub records: Vec<String>,
}

/// DNS API surface used by the record task.
pub trait DnsApi: Send + Sync {
    /// One page of the record sets in `zone`. Fails with not-found for an unknown zone.
    fn list_record_sets(&self, zone: &str, marker: Option<&str>) -> Result<Page<RecordSet>>;
    /// Create or replace a record set.
    fn upsert_record_set(&self, record_set: &RecordSet) -> Result<()>;
    /// Delete the record set with this name and type.
    fn delete_record_set(&self, zone: &str, name: &str, record_type: RecordType) -> Result<()>;
}

/// Every record set of a zone, fetched page by page.
pub fn record_sets<'a>(
    api: &'a dyn DnsApi,
    zone: &'a str,
) -> Pager<RecordSet, impl FnMut(Option<&str>) -> Result<Page<RecordSet>> + 'a> {
    Pager::new(move |marker: Option<&str>| api.list_record_sets(zone, marker))
}

/// Find the record set with `name` and `record_type` in `zone`.
pub fn find_record_set(
    api: &dyn DnsApi,
    zone: &str,
    name: &str,
    record_type: RecordType,
) -> Result<Option<RecordSet>> {
    let zone = fqdn(zone);
    let name = fqdn(name);
    for record_set in record_sets(api, &zone) {
        let record_set = record_set?;
        if record_set.name == name && record_set.record_type == record_type {
            return Ok(Some(record_set));
        }
    }
    Ok(None)
}

/// Fully qualified form of a DNS name: lowercase with a trailing dot.
pub fn fqdn(name: &str) -> String {
    let name = name.to_ascii_lowercase();
    if name.ends_with('.') {
        name
    } else {
        format!("{name}.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fqdn() {
        assert_eq!(fqdn("API.Example.com"), "api.example.com.");
        assert_eq!(fqdn("example.com."), "example.com.");
    }

    #[test]
    fn test_record_type_serde_names() {
        assert_eq!(serde_json::to_string(&RecordType::Aaaa).unwrap(), "\"AAAA\"");
        let parsed: RecordType = serde_json::from_str("\"CNAME\"").unwrap();
        assert_eq!(parsed, RecordType::Cname);
    }
}
