use std::sync::Arc;
use std::time::Instant;

use futures::TryStreamExt;
use object_store::path::Path;
use object_store::ObjectStore;
use tracing::{debug, info, warn};

use tif_core::config::FetchConfig;
use tif_core::{feed_index_name, Ioc, LockRenewer, NoopRenewer, S3ConnectorConfig};

use crate::backend::SourceStoreFactory;
use crate::error::FetchError;
use crate::index::IocIndex;

/// Records accepted by one fetch, in source order.
#[derive(Debug, Clone, Default)]
pub struct FetchResponse {
    pub iocs: Vec<Ioc>,
}

/// Pulls newline-delimited IOC records from a feed bucket and writes them into
/// the feed's index.
///
/// Stateless between calls: every fetch lists the source again and rewrites
/// whatever it reads.
pub struct IocFetchService {
    sources: Arc<dyn SourceStoreFactory>,
    index: Arc<dyn IocIndex>,
    max_records: usize,
    batch_size: usize,
}

impl IocFetchService {
    pub fn new(sources: Arc<dyn SourceStoreFactory>, index: Arc<dyn IocIndex>, config: &FetchConfig) -> Self {
        Self {
            sources,
            index,
            max_records: config.max_records,
            batch_size: config.batch_size.max(1),
        }
    }

    pub async fn fetch_iocs(&self, source: &S3ConnectorConfig) -> Result<FetchResponse, FetchError> {
        self.fetch_iocs_with_renewal(source, &NoopRenewer).await
    }

    /// Fetch and index, calling `renewer` before every object read and every
    /// bulk batch so a held lock outlives a long import.
    pub async fn fetch_iocs_with_renewal(
        &self,
        source: &S3ConnectorConfig,
        renewer: &dyn LockRenewer,
    ) -> Result<FetchResponse, FetchError> {
        source
            .validate()
            .map_err(|e| FetchError::InvalidConfig(e.to_string()))?;
        let start = Instant::now();
        let source_id = source.source_config_id();

        let store = self.sources.store_for(source)?;
        let iocs = self.read_records(store.as_ref(), source_id, renewer).await?;

        let index = feed_index_name(source_id);
        self.index.ensure_index(&index, source_id).await?;

        let mut failed = 0usize;
        for batch in iocs.chunks(self.batch_size) {
            renewer.renew_lock().await;
            let response = self.index.bulk_index(&index, batch).await?;
            for failure in &response.failures {
                warn!(index = %index, id = %failure.id, reason = %failure.reason, "IOC rejected by index");
            }
            failed += response.failures.len();
        }

        if failed > 0 {
            return Err(FetchError::PartialWrite {
                index,
                failed,
                total: iocs.len(),
            });
        }

        info!(
            source = source_id,
            index = %index,
            count = iocs.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "fetched feed IOCs"
        );
        Ok(FetchResponse { iocs })
    }

    /// Read up to `max_records` records from every object under the source prefix.
    async fn read_records(
        &self,
        store: &dyn ObjectStore,
        source_id: &str,
        renewer: &dyn LockRenewer,
    ) -> Result<Vec<Ioc>, FetchError> {
        let prefix = Path::from(source_id);
        let mut keys: Vec<Path> = store
            .list(Some(&prefix))
            .map_ok(|meta| meta.location)
            .try_collect()
            .await?;
        keys.sort();
        debug!(source = source_id, objects = keys.len(), "listed feed objects");

        let mut iocs = Vec::new();
        'objects: for key in keys {
            renewer.renew_lock().await;
            let data = store.get(&key).await?.bytes().await?;
            let text = std::str::from_utf8(&data).map_err(|_| FetchError::Encoding { key: key.to_string() })?;

            for (n, line) in text.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                if iocs.len() >= self.max_records {
                    warn!(source = source_id, max = self.max_records, "record limit reached, rest of feed skipped");
                    break 'objects;
                }
                let ioc = Ioc::parse_line(line, source_id).map_err(|e| FetchError::Malformed {
                    key: key.to_string(),
                    line: n + 1,
                    reason: e.to_string(),
                })?;
                iocs.push(ioc);
            }
        }
        Ok(iocs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StaticSourceFactory;
    use crate::index::{BulkItemFailure, BulkResponse, InMemoryIocIndex, IndexInfo};
    use crate::error::StorageError;
    use async_trait::async_trait;
    use object_store::memory::InMemory;
    use object_store::PutPayload;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRenewer(AtomicUsize);

    #[async_trait]
    impl LockRenewer for CountingRenewer {
        async fn renew_lock(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Rejects every document with the given value.
    struct RejectingIndex {
        inner: InMemoryIocIndex,
        reject_value: String,
    }

    #[async_trait]
    impl IocIndex for RejectingIndex {
        async fn ensure_index(&self, index: &str, source_config_id: &str) -> Result<(), StorageError> {
            self.inner.ensure_index(index, source_config_id).await
        }

        async fn bulk_index(&self, index: &str, iocs: &[Ioc]) -> Result<BulkResponse, StorageError> {
            let (bad, good): (Vec<Ioc>, Vec<Ioc>) =
                iocs.iter().cloned().partition(|i| i.value == self.reject_value);
            let mut resp = self.inner.bulk_index(index, &good).await?;
            resp.failures.extend(bad.into_iter().map(|i| BulkItemFailure {
                id: i.id,
                reason: "mapper_parsing_exception".into(),
            }));
            Ok(resp)
        }

        async fn documents(&self, index: &str) -> Result<Vec<Ioc>, StorageError> {
            self.inner.documents(index).await
        }

        async fn index_info(&self, index: &str) -> Result<Option<IndexInfo>, StorageError> {
            self.inner.index_info(index).await
        }
    }

    fn line(i: usize) -> String {
        format!(r#"{{"id":"ioc-{i}","name":"ioc {i}","type":"ipv4-addr","value":"10.0.0.{i}"}}"#)
    }

    async fn seeded_store(key: &str, count: usize) -> Arc<InMemory> {
        let store = Arc::new(InMemory::new());
        let body: String = (0..count).map(|i| line(i) + "\n").collect();
        store
            .put(&Path::from(key), PutPayload::from(body.into_bytes()))
            .await
            .unwrap();
        store
    }

    fn service(store: Arc<InMemory>, index: Arc<dyn IocIndex>, max_records: usize, batch_size: usize) -> IocFetchService {
        let config = FetchConfig { max_records, batch_size, allow_empty_feed: false };
        IocFetchService::new(Arc::new(StaticSourceFactory::new(store)), index, &config)
    }

    fn source() -> S3ConnectorConfig {
        S3ConnectorConfig::new("feeds", "feed-a", "us-east-1", "")
    }

    #[tokio::test]
    async fn renews_before_each_batch() {
        let store = seeded_store("feed-a/iocs.ndjson", 7).await;
        let index = Arc::new(InMemoryIocIndex::new());
        let svc = service(store, index.clone(), 100, 3);
        let renewer = CountingRenewer(AtomicUsize::new(0));

        let resp = svc.fetch_iocs_with_renewal(&source(), &renewer).await.unwrap();
        assert_eq!(resp.iocs.len(), 7);
        // One object read plus three batches.
        assert_eq!(renewer.0.load(Ordering::SeqCst), 4);
        assert_eq!(index.documents("tif-ioc-feed-a").await.unwrap().len(), 7);
    }

    #[tokio::test]
    async fn renews_before_each_object_read() {
        let store = Arc::new(InMemory::new());
        for part in 0..3 {
            let key = Path::from(format!("feed-a/part-{part}.ndjson"));
            store.put(&key, PutPayload::from(line(part).into_bytes())).await.unwrap();
        }
        let svc = service(store, Arc::new(InMemoryIocIndex::new()), 100, 500);
        let renewer = CountingRenewer(AtomicUsize::new(0));

        let resp = svc.fetch_iocs_with_renewal(&source(), &renewer).await.unwrap();
        assert_eq!(resp.iocs.len(), 3);
        // Three object reads plus one batch.
        assert_eq!(renewer.0.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn stops_at_max_records() {
        let store = seeded_store("feed-a/iocs.ndjson", 20).await;
        let svc = service(store, Arc::new(InMemoryIocIndex::new()), 5, 500);
        let resp = svc.fetch_iocs(&source()).await.unwrap();
        assert_eq!(resp.iocs.len(), 5);
        assert_eq!(resp.iocs[0].id, "ioc-0");
    }

    #[tokio::test]
    async fn malformed_line_fails_the_fetch() {
        let store = Arc::new(InMemory::new());
        let body = format!("{}\nnot json\n", line(1));
        store.put(&Path::from("feed-a/x.ndjson"), PutPayload::from(body.into_bytes())).await.unwrap();
        let index = Arc::new(InMemoryIocIndex::new());
        let svc = service(store, index.clone(), 100, 10);

        let err = svc.fetch_iocs(&source()).await.unwrap_err();
        assert!(matches!(err, FetchError::Malformed { line: 2, .. }));
        assert!(index.index_info("tif-ioc-feed-a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn item_failures_become_partial_write() {
        let store = seeded_store("feed-a/iocs.ndjson", 4).await;
        let index = Arc::new(RejectingIndex {
            inner: InMemoryIocIndex::new(),
            reject_value: "10.0.0.2".into(),
        });
        let svc = service(store, index, 100, 2);

        let err = svc.fetch_iocs(&source()).await.unwrap_err();
        assert!(matches!(err, FetchError::PartialWrite { failed: 1, total: 4, .. }));
    }

    #[tokio::test]
    async fn empty_feed_creates_index_and_returns_nothing() {
        let store = Arc::new(InMemory::new());
        let index = Arc::new(InMemoryIocIndex::new());
        let svc = service(store, index.clone(), 100, 10);

        let resp = svc.fetch_iocs(&source()).await.unwrap();
        assert!(resp.iocs.is_empty());
        assert!(index.index_info("tif-ioc-feed-a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn invalid_source_is_rejected() {
        let svc = service(Arc::new(InMemory::new()), Arc::new(InMemoryIocIndex::new()), 100, 10);
        let bad = S3ConnectorConfig::new("", "feed-a", "us-east-1", "");
        assert!(matches!(svc.fetch_iocs(&bad).await, Err(FetchError::InvalidConfig(_))));
    }
}
