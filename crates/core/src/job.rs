//! Job parameter model: the persisted record describing one feed job.
//!
//! Records move through their lifecycle by value: each transition consumes a
//! snapshot and returns the next one, so a record handed to another task is
//! never mutated behind its back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TifError;
use crate::source::{feed_index_name, S3ConnectorConfig};

/// Index (table) holding one job parameter record per job name.
pub const JOB_INDEX_NAME: &str = "tif-job-parameters";

const MAX_JOB_NAME_BYTES: usize = 127;
const INVALID_NAME_CHARS: &[char] = &['\\', '/', '*', '?', '"', '<', '>', '|', ',', '#', ':'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Creating,
    Available,
    CreateFailed,
    Deleting,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Creating => write!(f, "CREATING"),
            JobState::Available => write!(f, "AVAILABLE"),
            JobState::CreateFailed => write!(f, "CREATE_FAILED"),
            JobState::Deleting => write!(f, "DELETING"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStats {
    pub last_succeeded_at: Option<DateTime<Utc>>,
    pub last_processing_time_ms: Option<u64>,
    pub last_failed_at: Option<DateTime<Utc>>,
    pub last_skipped_at: Option<DateTime<Utc>>,
}

/// Request to create a feed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutJobRequest {
    pub name: String,
    pub source_config: S3ConnectorConfig,
    #[serde(default = "default_interval_days")]
    pub schedule_interval_days: u32,
}

fn default_interval_days() -> u32 {
    1
}

impl PutJobRequest {
    pub fn new(name: &str, source_config: S3ConnectorConfig) -> Self {
        Self {
            name: name.to_string(),
            source_config,
            schedule_interval_days: default_interval_days(),
        }
    }

    pub fn validate(&self) -> Result<(), TifError> {
        validate_job_name(&self.name)?;
        if self.schedule_interval_days < 1 {
            return Err(TifError::InvalidRequest(
                "schedule interval must be at least 1 day".into(),
            ));
        }
        self.source_config.validate()
    }
}

/// Job names double as lock keys and record ids, so they follow index naming rules.
pub fn validate_job_name(name: &str) -> Result<(), TifError> {
    if name.is_empty() {
        return Err(TifError::InvalidName("name must not be empty".into()));
    }
    if name.len() > MAX_JOB_NAME_BYTES {
        return Err(TifError::InvalidName(format!(
            "name must not be longer than {} bytes",
            MAX_JOB_NAME_BYTES
        )));
    }
    if name == "." || name == ".." {
        return Err(TifError::InvalidName("name must not be '.' or '..'".into()));
    }
    if name.starts_with(['_', '-', '+']) {
        return Err(TifError::InvalidName(
            "name must not start with '_', '-', or '+'".into(),
        ));
    }
    if name.chars().any(|c| c.is_whitespace() || c.is_uppercase()) {
        return Err(TifError::InvalidName(
            "name must be lowercase and must not contain whitespace".into(),
        ));
    }
    if let Some(c) = name.chars().find(|c| INVALID_NAME_CHARS.contains(c)) {
        return Err(TifError::InvalidName(format!("name must not contain '{}'", c)));
    }
    Ok(())
}

/// Persisted metadata of one feed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobParameter {
    pub name: String,
    pub state: JobState,
    pub source_config: S3ConnectorConfig,
    pub schedule_interval_days: u32,
    pub enabled_time: Option<DateTime<Utc>>,
    pub last_update_time: DateTime<Utc>,
    #[serde(default)]
    pub indices: Vec<String>,
    #[serde(default)]
    pub update_stats: UpdateStats,
    /// Store-assigned version used for optimistic concurrency. Zero until persisted.
    #[serde(default)]
    pub seq_no: u64,
}

impl JobParameter {
    /// Build a fresh CREATING record from a request.
    pub fn from_request(request: &PutJobRequest, now: DateTime<Utc>) -> Self {
        Self {
            name: request.name.clone(),
            state: JobState::Creating,
            source_config: request.source_config.clone(),
            schedule_interval_days: request.schedule_interval_days,
            enabled_time: Some(now),
            last_update_time: now,
            indices: Vec::new(),
            update_stats: UpdateStats::default(),
            seq_no: 0,
        }
    }

    pub fn is_creating(&self) -> bool {
        self.state == JobState::Creating
    }

    /// Index the job's IOCs are written to.
    pub fn feed_index(&self) -> String {
        feed_index_name(self.source_config.source_config_id())
    }

    pub fn mark_create_failed(self, now: DateTime<Utc>) -> Self {
        Self {
            state: JobState::CreateFailed,
            last_update_time: now,
            update_stats: UpdateStats {
                last_failed_at: Some(now),
                ..self.update_stats
            },
            ..self
        }
    }

    pub fn mark_available(self, now: DateTime<Utc>, processing_time_ms: u64, indices: Vec<String>) -> Self {
        Self {
            state: JobState::Available,
            last_update_time: now,
            indices,
            update_stats: UpdateStats {
                last_succeeded_at: Some(now),
                last_processing_time_ms: Some(processing_time_ms),
                ..self.update_stats
            },
            ..self
        }
    }
}
