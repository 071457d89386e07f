//! Analysis persistence.
//!
//! [`AnalysisStore`] is best-effort: writes that cannot be completed become
//! [`SaveOutcome::Skipped`] and reads that fail return an empty list. The
//! durable work is delegated to a [`RecordBackend`].

mod sqlite;
mod supabase;

pub use sqlite::SqliteBackend;
pub use supabase::SupabaseBackend;

use crate::verdict::Verdict;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use meta_common::config::Config;
use meta_common::Result;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;

/// Most records a history listing ever returns.
pub const HISTORY_LIMIT: usize = 20;

/// One persisted analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: i64,
    pub old_schema: String,
    pub new_schema: String,
    pub is_breaking: bool,
    /// Serialized [`Verdict`]
    pub ai_summary: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_timestamp"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

/// Parse a stored timestamp. Values without an offset are taken as UTC.
pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// A timestamp the store cannot read must not cost the whole row.
fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(|v| v.as_str()).and_then(parse_timestamp))
}

impl AnalysisRecord {
    /// Decode the stored verdict.
    pub fn verdict(&self) -> Option<Verdict> {
        serde_json::from_str(&self.ai_summary).ok()
    }
}

/// Row to insert; the backend assigns the id.
#[derive(Debug, Clone, Serialize)]
pub struct NewAnalysis {
    pub old_schema: String,
    pub new_schema: String,
    pub is_breaking: bool,
    pub ai_summary: String,
}

impl NewAnalysis {
    pub fn new(old_schema: &str, new_schema: &str, verdict: &Verdict) -> Result<Self> {
        Ok(Self {
            old_schema: old_schema.to_string(),
            new_schema: new_schema.to_string(),
            is_breaking: verdict.is_breaking,
            ai_summary: serde_json::to_string(verdict)?,
        })
    }
}

/// Durable append/query capability.
#[async_trait]
pub trait RecordBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Append one record and return it with its assigned id.
    async fn insert(&self, row: &NewAnalysis) -> Result<AnalysisRecord>;

    /// Most recent records, id descending, at most `limit`.
    async fn recent(&self, limit: usize) -> Result<Vec<AnalysisRecord>>;
}

/// Why a save did not happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No backend configured
    Unconfigured,
    /// Backend could not be reached; might work later
    Unreachable(String),
    /// Backend refused the write or answered with garbage
    Rejected(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unconfigured => write!(f, "store not configured"),
            Self::Unreachable(msg) => write!(f, "store unreachable: {msg}"),
            Self::Rejected(msg) => write!(f, "store rejected write: {msg}"),
        }
    }
}

/// Result of [`AnalysisStore::save`].
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Saved(AnalysisRecord),
    Skipped(SkipReason),
}

/// Best-effort store for analysis records.
#[derive(Clone, Default)]
pub struct AnalysisStore {
    backend: Option<Arc<dyn RecordBackend>>,
}

impl AnalysisStore {
    pub fn new(backend: Arc<dyn RecordBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// A store that persists nothing.
    pub fn disabled() -> Self {
        Self { backend: None }
    }

    /// Pick a backend from configuration.
    ///
    /// Supabase wins when both its URL and key are set; otherwise a SQLite
    /// path is used if present. A SQLite file that cannot be opened leaves
    /// the store disabled.
    pub fn from_config(config: &Config) -> Self {
        if config.supabase_configured() {
            if let (Some(url), Some(key)) = (&config.store.supabase_url, &config.store.supabase_key)
            {
                return Self::new(Arc::new(SupabaseBackend::new(url, key, &config.store.table)));
            }
        }

        if let Some(ref path) = config.store.sqlite_path {
            match SqliteBackend::open(path) {
                Ok(backend) => return Self::new(Arc::new(backend)),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to open SQLite store, persistence disabled"
                    );
                }
            }
        }

        Self::disabled()
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_some()
    }

    pub fn backend_name(&self) -> Option<&str> {
        self.backend.as_deref().map(|b| b.name())
    }

    /// Persist one analysis. Never fails; problems become `Skipped`.
    pub async fn save(&self, old_schema: &str, new_schema: &str, verdict: &Verdict) -> SaveOutcome {
        let Some(backend) = self.backend.as_ref() else {
            tracing::warn!("Store keys missing, skipping save");
            return SaveOutcome::Skipped(SkipReason::Unconfigured);
        };

        let result = match NewAnalysis::new(old_schema, new_schema, verdict) {
            Ok(row) => backend.insert(&row).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(record) => SaveOutcome::Saved(record),
            Err(e) if e.is_transient() => {
                tracing::warn!(backend = backend.name(), error = %e, "Store unreachable, skipping save");
                SaveOutcome::Skipped(SkipReason::Unreachable(e.to_string()))
            }
            Err(e) => {
                tracing::warn!(backend = backend.name(), error = %e, "Store rejected save");
                SaveOutcome::Skipped(SkipReason::Rejected(e.to_string()))
            }
        }
    }

    /// Most recent records, newest first. Empty on any failure.
    pub async fn list_recent(&self, limit: usize) -> Vec<AnalysisRecord> {
        let limit = limit.min(HISTORY_LIMIT);
        let Some(backend) = self.backend.as_ref() else {
            return Vec::new();
        };
        if limit == 0 {
            return Vec::new();
        }

        match backend.recent(limit).await {
            Ok(mut records) => {
                records.sort_by(|a, b| b.id.cmp(&a.id));
                records.truncate(limit);
                records
            }
            Err(e) => {
                tracing::warn!(backend = backend.name(), error = %e, "Fetch error, returning empty history");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meta_common::Error;
    use std::sync::Mutex;

    #[derive(Clone, Copy)]
    enum Failure {
        Transient,
        Permanent,
    }

    impl Failure {
        fn error(self) -> Error {
            match self {
                Self::Transient => Error::External("connection refused".into()),
                Self::Permanent => Error::Storage("relation does not exist".into()),
            }
        }
    }

    /// In-memory backend that can be told to fail.
    #[derive(Default)]
    struct MemoryBackend {
        rows: Mutex<Vec<AnalysisRecord>>,
        failure: Option<Failure>,
    }

    #[async_trait]
    impl RecordBackend for MemoryBackend {
        fn name(&self) -> &str {
            "memory"
        }

        async fn insert(&self, row: &NewAnalysis) -> Result<AnalysisRecord> {
            if let Some(failure) = self.failure {
                return Err(failure.error());
            }
            let mut rows = self.rows.lock().unwrap();
            let record = AnalysisRecord {
                id: rows.len() as i64 + 1,
                old_schema: row.old_schema.clone(),
                new_schema: row.new_schema.clone(),
                is_breaking: row.is_breaking,
                ai_summary: row.ai_summary.clone(),
                created_at: None,
            };
            rows.push(record.clone());
            Ok(record)
        }

        async fn recent(&self, _limit: usize) -> Result<Vec<AnalysisRecord>> {
            if let Some(failure) = self.failure {
                return Err(failure.error());
            }
            // Ascending and uncapped, like a backend that ignores the query hints.
            Ok(self.rows.lock().unwrap().clone())
        }
    }

    fn verdict() -> Verdict {
        Verdict {
            is_breaking: true,
            summary: "id changed type".into(),
            changes: vec!["id: integer -> string".into()],
        }
    }

    #[tokio::test]
    async fn save_assigns_id_and_serializes_verdict() {
        let store = AnalysisStore::new(Arc::new(MemoryBackend::default()));

        let SaveOutcome::Saved(record) = store.save("{}", "{\"a\":1}", &verdict()).await else {
            panic!("expected save");
        };
        assert_eq!(record.id, 1);
        assert!(record.is_breaking);
        assert_eq!(record.verdict(), Some(verdict()));
    }

    #[tokio::test]
    async fn disabled_store_skips() {
        let store = AnalysisStore::disabled();
        assert!(!store.is_configured());
        assert_eq!(
            store.save("a", "b", &verdict()).await,
            SaveOutcome::Skipped(SkipReason::Unconfigured)
        );
        assert!(store.list_recent(HISTORY_LIMIT).await.is_empty());
    }

    #[tokio::test]
    async fn transient_failure_is_unreachable() {
        let backend = MemoryBackend {
            failure: Some(Failure::Transient),
            ..MemoryBackend::default()
        };
        let store = AnalysisStore::new(Arc::new(backend));

        assert!(matches!(
            store.save("a", "b", &verdict()).await,
            SaveOutcome::Skipped(SkipReason::Unreachable(_))
        ));
        assert!(store.list_recent(HISTORY_LIMIT).await.is_empty());
    }

    #[tokio::test]
    async fn permanent_failure_is_rejected() {
        let backend = MemoryBackend {
            failure: Some(Failure::Permanent),
            ..MemoryBackend::default()
        };
        let store = AnalysisStore::new(Arc::new(backend));

        assert!(matches!(
            store.save("a", "b", &verdict()).await,
            SaveOutcome::Skipped(SkipReason::Rejected(m)) if m.contains("relation")
        ));
    }

    #[tokio::test]
    async fn list_recent_orders_and_caps() {
        let store = AnalysisStore::new(Arc::new(MemoryBackend::default()));
        for i in 0..25 {
            store.save(&format!("old-{i}"), "new", &verdict()).await;
        }

        let records = store.list_recent(HISTORY_LIMIT).await;
        assert_eq!(records.len(), 20);
        assert_eq!(records[0].id, 25);
        assert!(records.windows(2).all(|w| w[0].id > w[1].id));

        assert_eq!(store.list_recent(3).await.len(), 3);
        assert!(store.list_recent(0).await.is_empty());
        assert_eq!(store.list_recent(500).await.len(), 20);
    }

    #[test]
    fn record_omits_missing_timestamp() {
        let record = AnalysisRecord {
            id: 7,
            old_schema: "a".into(),
            new_schema: "b".into(),
            is_breaking: false,
            ai_summary: "{}".into(),
            created_at: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], 7);
        assert!(json.get("created_at").is_none());
    }

    #[test]
    fn from_config_without_store_is_disabled() {
        let store = AnalysisStore::from_config(&Config::default());
        assert!(!store.is_configured());
        assert_eq!(store.backend_name(), None);
    }

    #[test]
    fn from_config_prefers_supabase() {
        let mut config = Config::default();
        config.store.supabase_url = Some("https://project.supabase.co".into());
        config.store.supabase_key = Some("key".into());
        config.store.sqlite_path = Some("/nonexistent/dir/analyses.db".into());

        let store = AnalysisStore::from_config(&config);
        assert_eq!(store.backend_name(), Some("supabase"));
    }

    #[test]
    fn from_config_uses_sqlite_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.store.sqlite_path = Some(dir.path().join("analyses.db"));

        let store = AnalysisStore::from_config(&config);
        assert_eq!(store.backend_name(), Some("sqlite"));
    }

    #[test]
    fn record_tolerates_unusual_timestamps() {
        let decode = |created_at: serde_json::Value| -> AnalysisRecord {
            serde_json::from_value(serde_json::json!({
                "id": 1,
                "old_schema": "a",
                "new_schema": "b",
                "is_breaking": false,
                "ai_summary": "{}",
                "created_at": created_at
            }))
            .unwrap()
        };

        let naive = decode("2024-05-01T12:00:00.123456".into());
        assert_eq!(
            naive.created_at.map(|dt| dt.to_rfc3339()),
            Some("2024-05-01T12:00:00.123456+00:00".to_string())
        );
        assert!(decode("2024-05-01 12:00:00".into()).created_at.is_some());
        assert!(decode("yesterday".into()).created_at.is_none());
        assert!(decode(serde_json::json!(1714564800)).created_at.is_none());
        assert!(decode(serde_json::Value::Null).created_at.is_none());
    }

    #[test]
    fn unopenable_sqlite_disables_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        config.store.sqlite_path = Some(blocker.join("analyses.db"));

        assert!(!AnalysisStore::from_config(&config).is_configured());
    }
}
