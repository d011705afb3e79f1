use serde::{Deserialize, Serialize};

use crate::error::TifError;

/// Prefix shared by every per-feed IOC index.
pub const IOC_INDEX_PREFIX: &str = "tif-ioc-";

/// Location of a feed in an S3-compatible bucket.
///
/// `object_key` doubles as the source-config identifier: every object under
/// it belongs to the same feed, and the feed's IOC index is named after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3ConnectorConfig {
    pub bucket: String,
    pub object_key: String,
    pub region: String,
    pub role_arn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,
}

impl S3ConnectorConfig {
    pub fn new(bucket: &str, object_key: &str, region: &str, role_arn: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            object_key: object_key.to_string(),
            region: region.to_string(),
            role_arn: role_arn.to_string(),
            endpoint_url: None,
        }
    }

    /// Identifier used to derive the feed's index name.
    pub fn source_config_id(&self) -> &str {
        self.object_key.trim_matches('/')
    }

    pub fn validate(&self) -> Result<(), TifError> {
        if self.bucket.trim().is_empty() {
            return Err(TifError::InvalidSourceConfig("bucket must not be empty".into()));
        }
        if self.source_config_id().is_empty() {
            return Err(TifError::InvalidSourceConfig("object key must not be empty".into()));
        }
        if self.region.trim().is_empty() {
            return Err(TifError::InvalidSourceConfig("region must not be empty".into()));
        }
        Ok(())
    }
}

/// Name of the index holding the IOCs of one source config.
pub fn feed_index_name(source_config_id: &str) -> String {
    format!("{}{}", IOC_INDEX_PREFIX, source_config_id.trim_matches('/').to_lowercase())
}
