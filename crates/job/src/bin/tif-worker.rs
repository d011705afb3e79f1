//! tif-worker: creates threat-intel feed jobs and runs one-off feed fetches.
//!
//! Uses PostgreSQL for locks, job records and IOC indices when `PG_*` is
//! configured, otherwise falls back to in-memory services (single node only).

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use object_store::local::LocalFileSystem;
use tracing::{info, warn};

use tif_core::{CallerContext, Config, Principal, PutJobRequest, S3ConnectorConfig};
use tif_job::{BackendRoleFilter, FetchIngestionEngine, JobCreator, PutJobAction};
use tif_lock::{InMemoryLockService, LockService, PgLockService};
use tif_storage::{
    init_pg_pool, InMemoryIocIndex, InMemoryJobParameterStore, IocFetchService, IocIndex,
    JobParameterStore, PgIocIndex, PgJobParameterStore, S3SourceFactory, SourceStoreFactory,
    StaticSourceFactory,
};

// ── CLI ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "tif-worker", version, about)]
struct Cli {
    /// Read feed objects from a local directory instead of S3.
    #[arg(long, env = "TIF_LOCAL_SOURCE_DIR", global = true)]
    local_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a feed job: lock, save the job record, ingest the feed.
    PutJob {
        /// Job name (lowercase, no whitespace).
        #[arg(long)]
        name: String,

        #[command(flatten)]
        source: SourceArgs,

        #[arg(long, default_value_t = 1)]
        interval_days: u32,

        /// Caller name; omitted means security is disabled for this call.
        #[arg(long, env = "TIF_USER")]
        user: Option<String>,

        #[arg(long = "backend-role")]
        backend_roles: Vec<String>,

        #[arg(long = "role")]
        roles: Vec<String>,
    },
    /// Fetch a feed into its IOC index without creating a job.
    FetchIocs {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Print the resolved config with secrets redacted.
    ShowConfig,
}

#[derive(Args, Debug)]
struct SourceArgs {
    #[arg(long, env = "TIF_FEED_BUCKET")]
    bucket: String,

    /// Key prefix of the feed objects; also names the IOC index.
    #[arg(long)]
    object_key: String,

    #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
    region: String,

    #[arg(long, env = "TIF_FEED_ROLE_ARN", default_value = "")]
    role_arn: String,

    #[arg(long)]
    endpoint_url: Option<String>,
}

impl SourceArgs {
    fn into_config(self) -> S3ConnectorConfig {
        let mut config = S3ConnectorConfig::new(&self.bucket, &self.object_key, &self.region, &self.role_arn);
        config.endpoint_url = self.endpoint_url;
        config
    }
}

// ── Wiring ──────────────────────────────────────────────────────────

struct Services {
    locks: Arc<dyn LockService>,
    jobs: Arc<dyn JobParameterStore>,
    fetch: Arc<IocFetchService>,
}

async fn build_services(config: &Config, local_dir: Option<PathBuf>) -> anyhow::Result<Services> {
    let sources: Arc<dyn SourceStoreFactory> = match local_dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            info!(dir = %dir.display(), "reading feeds from local directory");
            Arc::new(StaticSourceFactory::new(Arc::new(LocalFileSystem::new_with_prefix(&dir)?)))
        }
        None => Arc::new(S3SourceFactory::new(config.aws.clone())),
    };

    let (locks, jobs, index): (Arc<dyn LockService>, Arc<dyn JobParameterStore>, Arc<dyn IocIndex>) =
        match init_pg_pool(&config.postgres).await {
            Some(pool) => {
                let locks = PgLockService::new(pool.clone());
                locks.ensure_schema().await?;
                let index = PgIocIndex::new(pool.clone());
                index.ensure_schema().await?;
                (
                    Arc::new(locks) as Arc<dyn LockService>,
                    Arc::new(PgJobParameterStore::new(pool)) as Arc<dyn JobParameterStore>,
                    Arc::new(index) as Arc<dyn IocIndex>,
                )
            }
            None => {
                warn!("using in-memory locks and stores; state is lost on exit");
                (
                    Arc::new(InMemoryLockService::new()) as Arc<dyn LockService>,
                    Arc::new(InMemoryJobParameterStore::new()) as Arc<dyn JobParameterStore>,
                    Arc::new(InMemoryIocIndex::new()) as Arc<dyn IocIndex>,
                )
            }
        };

    let fetch = Arc::new(IocFetchService::new(sources, index, &config.fetch));
    Ok(Services { locks, jobs, fetch })
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tif_core::config::load_dotenv();
    let cli = Cli::parse();
    let config = Config::from_env();
    config.log_summary();

    if let Command::ShowConfig = cli.command {
        println!("{}", serde_json::to_string_pretty(&config.redacted_summary())?);
        return Ok(());
    }

    let services = build_services(&config, cli.local_dir).await?;

    match cli.command {
        Command::PutJob {
            name,
            source,
            interval_days,
            user,
            backend_roles,
            roles,
        } => {
            let mut request = PutJobRequest::new(&name, source.into_config());
            request.schedule_interval_days = interval_days;

            let ctx = match user {
                Some(user) => CallerContext::user(Principal {
                    name: user,
                    backend_roles,
                    roles,
                }),
                None => CallerContext::anonymous(),
            };

            let ingestion = Arc::new(FetchIngestionEngine::new(
                services.fetch.clone(),
                config.fetch.allow_empty_feed,
            ));
            let creator = Arc::new(JobCreator::new(services.locks, services.jobs, ingestion, &config.lock));
            let action = PutJobAction::new(Arc::new(BackendRoleFilter::new(&config.security)), creator);

            match action.execute(ctx, request).await {
                Ok(ack) => println!("{}", serde_json::to_string(&ack)?),
                Err(e) => {
                    eprintln!("put-job failed ({}): {}", e.status_code(), e);
                    std::process::exit(1);
                }
            }
        }
        Command::FetchIocs { source } => {
            let response = services.fetch.fetch_iocs(&source.into_config()).await?;
            info!(count = response.iocs.len(), "fetch complete");
            println!("{}", serde_json::to_string_pretty(&response.iocs)?);
        }
        Command::ShowConfig => {}
    }

    Ok(())
}
