use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TifError;

/// Indicator type, spelled the way STIX 2 feeds spell it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IocType {
    Ipv4Addr,
    Ipv6Addr,
    DomainName,
    Hashes,
    Url,
    File,
}

impl std::fmt::Display for IocType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IocType::Ipv4Addr => write!(f, "ipv4-addr"),
            IocType::Ipv6Addr => write!(f, "ipv6-addr"),
            IocType::DomainName => write!(f, "domain-name"),
            IocType::Hashes => write!(f, "hashes"),
            IocType::Url => write!(f, "url"),
            IocType::File => write!(f, "file"),
        }
    }
}

/// One indicator of compromise as stored in a feed index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ioc {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub ioc_type: IocType,
    pub value: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default = "default_spec_version")]
    pub spec_version: String,
    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub modified: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub feed_id: String,
}

fn default_spec_version() -> String {
    "2.1".to_string()
}

impl Ioc {
    /// Parse one newline-delimited JSON record from a feed object.
    ///
    /// Missing ids get a fresh UUID and the record is stamped with `feed_id`.
    pub fn parse_line(line: &str, feed_id: &str) -> Result<Self, TifError> {
        let mut ioc: Ioc = serde_json::from_str(line.trim())
            .map_err(|e| TifError::MalformedIoc(e.to_string()))?;
        if ioc.name.trim().is_empty() {
            return Err(TifError::MalformedIoc("name must not be empty".into()));
        }
        if ioc.value.trim().is_empty() {
            return Err(TifError::MalformedIoc(format!("IOC '{}' has an empty value", ioc.name)));
        }
        if ioc.id.is_empty() {
            ioc.id = Uuid::new_v4().to_string();
        }
        ioc.feed_id = feed_id.to_string();
        Ok(ioc)
    }

    /// Whether two records describe the same indicator, ignoring storage metadata.
    pub fn same_indicator(&self, other: &Ioc) -> bool {
        self.name == other.name && self.ioc_type == other.ioc_type && self.value == other.value
    }
}
