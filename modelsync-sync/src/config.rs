//! Sync policy configuration.

use std::collections::HashMap;
use std::time::Duration;

use modelsync_model::QueryPredicate;
use serde::{Deserialize, Serialize};

/// Highest gray-release cohort a client can be configured with.
pub const MAX_GRAY_RELEASE: i64 = 16;

/// Local data older than this is refetched in full.
pub const DEFAULT_EXPIRE_INTERVAL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Page size requested per model.
pub const DEFAULT_PAGE_LIMIT: u32 = 1000;

/// Upper bound on composite requests per cycle.
pub const DEFAULT_MAX_PAGES: usize = 100;

/// How the merger treats an incoming record older than the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// The last record fetched wins, whatever its `_version`.
    #[default]
    ArrivalOrder,
    /// Upserts whose `_version` is lower than the stored version are skipped.
    VersionChecked,
}

/// Configuration for the sync orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Watermark age after which a cycle refetches everything.
    pub expire_interval: Duration,
    /// Gray-release cohort of this client (0..=16). Records with a
    /// `grayRelease` at or below it are not fetched.
    pub gray_release: i64,
    /// Locale tag for locale overlay models.
    pub locale: Option<String>,
    /// Page size per model.
    pub page_limit: u32,
    /// Composite requests allowed per cycle.
    pub max_pages: usize,
    /// Static base predicate per model name.
    pub sync_expressions: HashMap<String, QueryPredicate>,
    pub conflict_policy: ConflictPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            expire_interval: DEFAULT_EXPIRE_INTERVAL,
            gray_release: 0,
            locale: None,
            page_limit: DEFAULT_PAGE_LIMIT,
            max_pages: DEFAULT_MAX_PAGES,
            sync_expressions: HashMap::new(),
            conflict_policy: ConflictPolicy::default(),
        }
    }
}

impl SyncConfig {
    /// Gray-release threshold clamped to the valid range.
    pub fn effective_gray_release(&self) -> i64 {
        self.gray_release.clamp(0, MAX_GRAY_RELEASE)
    }

    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    #[must_use]
    pub fn with_gray_release(mut self, gray_release: i64) -> Self {
        self.gray_release = gray_release;
        self
    }

    #[must_use]
    pub fn with_sync_expression(mut self, model: impl Into<String>, predicate: QueryPredicate) -> Self {
        self.sync_expressions.insert(model.into(), predicate);
        self
    }
}
