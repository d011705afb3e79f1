use std::sync::Arc;

use object_store::aws::AmazonS3Builder;
use object_store::ObjectStore;
use tracing::info;

use tif_core::config::AwsConfig;
use tif_core::S3ConnectorConfig;

use crate::error::StorageError;

/// Opens the bulk source a feed is read from.
///
/// Each job names its own bucket and region, so stores are built per source
/// config rather than once at startup.
pub trait SourceStoreFactory: Send + Sync {
    fn store_for(&self, source: &S3ConnectorConfig) -> Result<Arc<dyn ObjectStore>, StorageError>;
}

/// Builds an S3 client per source config from the shared AWS credentials.
pub struct S3SourceFactory {
    aws: AwsConfig,
}

impl S3SourceFactory {
    pub fn new(aws: AwsConfig) -> Self {
        Self { aws }
    }

    fn builder(&self, source: &S3ConnectorConfig) -> AmazonS3Builder {
        let region = if source.region.is_empty() {
            &self.aws.region
        } else {
            &source.region
        };

        let mut builder = AmazonS3Builder::new()
            .with_region(region)
            .with_bucket_name(&source.bucket);

        if let Some(ref key) = self.aws.access_key_id {
            builder = builder.with_access_key_id(key);
        }
        if let Some(ref secret) = self.aws.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }
        if let Some(ref token) = self.aws.session_token {
            builder = builder.with_token(token);
        }

        let endpoint = source
            .endpoint_url
            .as_deref()
            .or(self.aws.endpoint_url.as_deref())
            .filter(|e| !e.is_empty());
        if let Some(endpoint) = endpoint {
            let endpoint_url = with_scheme(endpoint);
            builder = builder
                .with_allow_http(endpoint_url.starts_with("http://"))
                .with_endpoint(endpoint_url);
        }

        builder
    }
}

impl SourceStoreFactory for S3SourceFactory {
    fn store_for(&self, source: &S3ConnectorConfig) -> Result<Arc<dyn ObjectStore>, StorageError> {
        source.validate()?;
        let store = self.builder(source).build()?;
        info!(
            bucket = %source.bucket,
            region = %source.region,
            role_arn = %source.role_arn,
            "opened S3 feed source"
        );
        Ok(Arc::new(store))
    }
}

/// Serves every source config from one pre-built store (local runs and tests).
pub struct StaticSourceFactory {
    store: Arc<dyn ObjectStore>,
}

impl StaticSourceFactory {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

impl SourceStoreFactory for StaticSourceFactory {
    fn store_for(&self, _source: &S3ConnectorConfig) -> Result<Arc<dyn ObjectStore>, StorageError> {
        Ok(self.store.clone())
    }
}

/// object_store requires absolute endpoint URLs.
fn with_scheme(endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("https://{}", endpoint)
    }
}
