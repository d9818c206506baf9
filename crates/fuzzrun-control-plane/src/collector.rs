//! Engine telemetry collection.
//!
//! Reads the engine's `fuzzer_stats` file and recounts crashes and corpus
//! entries from the instance output directories. Reads never fail: when the
//! telemetry is unavailable the collector degrades to a recent cached
//! snapshot or to the task's stored fields.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use fuzzrun_core::{
    coverage_percent, format_run_time, ArtifactFile, ArtifactKind, FuzzStats, StatsUpdate, Task,
    TaskId,
};

/// Name of the engine's telemetry file inside an instance directory.
pub const STATS_FILE: &str = "fuzzer_stats";

/// Filename prefix of every input the engine keeps.
pub const INPUT_PREFIX: &str = "id:";

/// Directory of the main engine instance.
pub const MAIN_INSTANCE: &str = "fuzzer0";

const KNOWN_KEYS: &[&str] = &[
    "run_time",
    "execs_done",
    "execs_per_sec",
    "unique_crashes",
    "unique_hangs",
    "saved_crashes",
    "saved_hangs",
    "paths_found",
    "corpus_count",
    "cycles_done",
    "max_depth",
    "map_density",
    "bitmap_cvg",
    "edges_found",
    "edges_total",
    "last_path",
    "last_crash",
    "last_hang",
];

/// A typed telemetry value.
#[derive(Debug, Clone, PartialEq)]
pub enum StatValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl StatValue {
    fn parse(raw: &str) -> Self {
        let parsed = if raw.contains('.') {
            raw.parse().ok().map(Self::Float)
        } else {
            raw.parse().ok().map(Self::Int)
        };
        parsed.unwrap_or_else(|| Self::Text(raw.to_string()))
    }

    /// Non-negative integer view.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Int(v) => u64::try_from(*v).ok(),
            Self::Float(v) if *v >= 0.0 => Some(*v as u64),
            _ => None,
        }
    }

    /// Float view.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(_) => None,
        }
    }
}

/// Parse the flat `key : value` telemetry format.
///
/// Unknown keys and lines without a separator are ignored.
pub fn parse_fuzzer_stats(text: &str) -> BTreeMap<String, StatValue> {
    text.lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            let key = key.trim();
            KNOWN_KEYS
                .contains(&key)
                .then(|| (key.to_string(), StatValue::parse(value.trim())))
        })
        .collect()
}

/// Artifact access errors.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Invalid artifact name: {0}")]
    InvalidName(String),

    #[error("Artifact not found: {0}")]
    NotFound(String),

    #[error("Failed to read artifact: {0}")]
    Io(#[from] io::Error),
}

/// A telemetry snapshot and the fields the engine actually reported.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Stored fields overlaid with whatever was observed.
    pub snapshot: FuzzStats,
    /// Observed fields only; empty when the telemetry was unavailable.
    pub update: StatsUpdate,
}

/// Telemetry reader with a short-lived fallback cache.
pub struct StatsCollector {
    cache_ttl: Duration,
    cache: Mutex<HashMap<TaskId, (Instant, FuzzStats)>>,
}

impl StatsCollector {
    pub fn new(cache_ttl: Duration) -> Self {
        Self {
            cache_ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Current telemetry snapshot of a task.
    pub async fn read(&self, task: &Task) -> FuzzStats {
        self.sample(task).await.snapshot
    }

    /// Current telemetry of a task, with the observed fields kept apart so
    /// callers can merge them without clobbering what the engine omitted.
    pub async fn sample(&self, task: &Task) -> Sample {
        let now = Utc::now();
        let path = stats_path(&task.output_dir, MAIN_INSTANCE);

        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Sample::unobserved(FuzzStats::from_task(task, now));
            }
            Err(e) => {
                warn!(task_id = %task.id, path = %path.display(), error = %e, "Telemetry file unreadable");
                return Sample::unobserved(self.fallback(task, now));
            }
        };

        let fields = parse_fuzzer_stats(&text);
        if fields.is_empty() {
            debug!(task_id = %task.id, "Telemetry file has no recognised fields");
            return Sample::unobserved(self.fallback(task, now));
        }

        let sample = self.build(task, &fields, now).await;
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(task.id, (Instant::now(), sample.snapshot.clone()));
        }
        sample
    }

    /// Crash or corpus files of a task, newest first.
    pub async fn list_artifacts(&self, task: &Task, kind: ArtifactKind) -> Vec<ArtifactFile> {
        let dir = artifact_dir(&task.output_dir, kind);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut files = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Ok(filename) = entry.file_name().into_string() else {
                continue;
            };
            if !filename.starts_with(INPUT_PREFIX) {
                continue;
            }
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            files.push(ArtifactFile {
                filename,
                path: entry.path(),
                size: metadata.len(),
                modified,
            });
        }

        files.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| a.filename.cmp(&b.filename))
        });
        files
    }

    /// Contents of one crash or corpus file.
    pub async fn read_artifact(
        &self,
        task: &Task,
        kind: ArtifactKind,
        filename: &str,
    ) -> Result<Vec<u8>, ArtifactError> {
        if filename.is_empty()
            || filename.contains('/')
            || filename.contains('\\')
            || filename.contains("..")
        {
            return Err(ArtifactError::InvalidName(filename.to_string()));
        }

        let path = artifact_dir(&task.output_dir, kind).join(filename);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(ArtifactError::NotFound(filename.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Drop the cached snapshot of a task.
    pub fn forget(&self, id: TaskId) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.remove(&id);
        }
    }

    async fn build(
        &self,
        task: &Task,
        fields: &BTreeMap<String, StatValue>,
        now: DateTime<Utc>,
    ) -> Sample {
        let u64_field = |key: &str| fields.get(key).and_then(StatValue::as_u64);

        let exec_count = u64_field("execs_done");
        let edges_found = u64_field("edges_found");
        let edges_total = u64_field("edges_total");

        let corpus_dir = artifact_dir(&task.output_dir, ArtifactKind::Corpus);
        let corpus_count = match count_inputs(&corpus_dir).await {
            Some(count) => Some(count),
            None => u64_field("corpus_count").or_else(|| u64_field("paths_found")),
        };
        let crash_dir = artifact_dir(&task.output_dir, ArtifactKind::Crash);

        let update = StatsUpdate {
            exec_count,
            unique_crashes: count_inputs(&crash_dir).await,
            unique_hangs: u64_field("unique_hangs").or_else(|| u64_field("saved_hangs")),
            total_execs: total_execs(&task.output_dir)
                .await
                .map(|total| total.max(exec_count.unwrap_or(0))),
            execs_per_sec: fields.get("execs_per_sec").and_then(StatValue::as_f64),
            corpus_count,
            coverage: edges_found
                .zip(edges_total)
                .map(|(found, total)| coverage_percent(found, total)),
            edges_found,
        };

        let mut stats = task.stats;
        stats.merge(&update);

        Sample {
            snapshot: FuzzStats {
                task_id: task.id,
                status: task.status,
                stats,
                edges_total: edges_total.unwrap_or(0),
                run_time: format_run_time(task.started_at, now),
                last_update: now,
            },
            update,
        }
    }

    fn fallback(&self, task: &Task, now: DateTime<Utc>) -> FuzzStats {
        let cached = self.cache.lock().ok().and_then(|cache| {
            cache
                .get(&task.id)
                .filter(|(at, _)| at.elapsed() < self.cache_ttl)
                .map(|(_, snapshot)| snapshot.clone())
        });

        match cached {
            Some(mut snapshot) => {
                snapshot.status = task.status;
                snapshot.run_time = format_run_time(task.started_at, now);
                snapshot.last_update = now;
                snapshot
            }
            None => FuzzStats::from_task(task, now),
        }
    }
}

impl Sample {
    fn unobserved(snapshot: FuzzStats) -> Self {
        Self {
            snapshot,
            update: StatsUpdate::default(),
        }
    }
}

fn stats_path(output_dir: &Path, instance: &str) -> PathBuf {
    output_dir.join(instance).join(STATS_FILE)
}

fn artifact_dir(output_dir: &Path, kind: ArtifactKind) -> PathBuf {
    output_dir.join(MAIN_INSTANCE).join(kind.dir_name())
}

/// Number of engine inputs in a directory; `None` if it cannot be read.
async fn count_inputs(dir: &Path) -> Option<u64> {
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    let mut count = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(INPUT_PREFIX))
        {
            count += 1;
        }
    }
    Some(count)
}

/// Sum of `execs_done` over every instance that reports it.
///
/// `None` if no instance does.
async fn total_execs(output_dir: &Path) -> Option<u64> {
    let mut entries = tokio::fs::read_dir(output_dir).await.ok()?;
    let mut total = None;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let Ok(text) = tokio::fs::read_to_string(entry.path().join(STATS_FILE)).await else {
            continue;
        };
        if let Some(execs) = parse_fuzzer_stats(&text)
            .get("execs_done")
            .and_then(StatValue::as_u64)
        {
            total = Some(total.unwrap_or(0) + execs);
        }
    }
    total
}
