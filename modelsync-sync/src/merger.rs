//! Applying fetched records to the local store.
//!
//! Two passes per cycle:
//!
//! 1. Every group is written in one transaction: tombstones are deleted,
//!    everything else is upserted by identifier. Locale overlay records are
//!    stored too, as records of their own model.
//! 2. Overlays are joined onto their base records by `materialID` and copy
//!    `name` and `sort` across. This runs after pass 1 committed, in its own
//!    transaction, so an overlay can reach a base record that arrived in the
//!    same cycle. Base records re-synced without their overlay are joined
//!    against the overlays already stored, so a later upsert of the base
//!    record does not undo its localization.

use std::collections::HashSet;
use std::sync::Arc;

use modelsync_model::{QueryPredicate, SchemaRegistry};
use modelsync_storage::{LocalStore, StorageResult, StoreWriter};
use modelsync_types::{fields, ModelWithMetadata, Record};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::ConflictPolicy;
use crate::error::{SyncError, SyncResult};

/// Called on every record right before it is upserted.
pub trait RecordHook: Send + Sync {
    fn before_save(&self, record: &mut Record);
}

impl<F> RecordHook for F
where
    F: Fn(&mut Record) + Send + Sync,
{
    fn before_save(&self, record: &mut Record) {
        self(record)
    }
}

/// All records fetched for one model in one cycle, in arrival order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelGroup {
    pub model: String,
    pub items: Vec<ModelWithMetadata>,
}

impl ModelGroup {
    pub fn new(model: impl Into<String>, items: Vec<ModelWithMetadata>) -> Self {
        Self {
            model: model.into(),
            items,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Stored overlays are looked up this many base ids at a time.
const OVERLAY_LOOKUP_CHUNK: usize = 200;

/// Pass 2 work for one overlay model.
struct OverlayJob {
    overlay_model: String,
    target: String,
    /// Live overlays fetched this cycle, in arrival order.
    fresh: Vec<Record>,
    /// Base ids whose overlays must be resolved.
    base_ids: Vec<String>,
}

/// Counts from one merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeStats {
    pub upserted: usize,
    pub deleted: usize,
    /// Base records updated from a locale overlay.
    pub localized: usize,
    /// Upserts skipped by [`ConflictPolicy::VersionChecked`].
    pub stale: usize,
}

/// Transactional writer of fetched model groups.
pub struct ModelMerger<S> {
    store: Arc<S>,
    registry: Arc<SchemaRegistry>,
    policy: ConflictPolicy,
    hook: Option<Arc<dyn RecordHook>>,
    locale: Option<String>,
}

impl<S: LocalStore> ModelMerger<S> {
    pub fn new(store: Arc<S>, registry: Arc<SchemaRegistry>) -> Self {
        Self {
            store,
            registry,
            policy: ConflictPolicy::default(),
            hook: None,
            locale: None,
        }
    }

    /// Restricts stored overlays joined in pass 2 to one locale tag.
    #[must_use]
    pub fn with_locale(mut self, locale: Option<String>) -> Self {
        self.locale = locale;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn RecordHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Applies `groups`. Fails only if pass 1 does not commit.
    pub async fn merge(&self, groups: Vec<ModelGroup>) -> SyncResult<MergeStats> {
        for group in &groups {
            self.registry.get(&group.model)?;
        }

        let jobs = self.overlay_jobs(&groups);
        let mut stats = self.apply_records(groups).await?;
        stats.localized = self.apply_overlays(jobs).await;

        info!(
            upserted = stats.upserted,
            deleted = stats.deleted,
            localized = stats.localized,
            stale = stats.stale,
            "merge committed"
        );
        Ok(stats)
    }

    /// Pass 1: one transaction over every group.
    async fn apply_records(&self, groups: Vec<ModelGroup>) -> SyncResult<MergeStats> {
        let hook = self.hook.clone();
        let policy = self.policy;
        self.store
            .with_transaction(move |w| {
                let mut stats = MergeStats::default();
                for group in groups {
                    for item in group.items {
                        if item.is_deleted() {
                            w.delete(&item.record.model, &item.record.id)?;
                            stats.deleted += 1;
                            continue;
                        }
                        if policy == ConflictPolicy::VersionChecked && is_stale(w, &item)? {
                            debug!(
                                model = %item.record.model,
                                id = %item.record.id,
                                version = item.metadata.version,
                                "skipping record older than stored version"
                            );
                            stats.stale += 1;
                            continue;
                        }
                        let mut record = item.record;
                        if let Some(hook) = &hook {
                            hook.before_save(&mut record);
                        }
                        w.save_versioned(&record, item.metadata.version)?;
                        stats.upserted += 1;
                    }
                }
                Ok(stats)
            })
            .await
            .map_err(|e| SyncError::MergeFailed(e.to_string()))
    }

    /// Collects, per overlay model, the overlays fetched this cycle and the
    /// base ids they or the fetched base records touch.
    fn overlay_jobs(&self, groups: &[ModelGroup]) -> Vec<OverlayJob> {
        let mut jobs = Vec::new();
        for schema in self.registry.models() {
            if !schema.is_locale_overlay() {
                continue;
            }
            let Some(target) = self.registry.overlay_target(&schema.name) else {
                warn!(model = %schema.name, "locale overlay has no registered base model");
                continue;
            };
            let declares_material = self
                .registry
                .capabilities(&schema.name)
                .is_ok_and(|caps| caps.material_id);
            if !declares_material {
                warn!(model = %schema.name, "locale overlay declares no materialID, skipping");
                continue;
            }

            let fresh: Vec<Record> = groups
                .iter()
                .filter(|g| g.model == schema.name)
                .flat_map(|g| &g.items)
                .filter(|i| !i.is_deleted())
                .map(|i| i.record.clone())
                .collect();

            let mut seen = HashSet::new();
            let base_ids: Vec<String> = fresh
                .iter()
                .filter_map(|r| r.material_id())
                .chain(
                    groups
                        .iter()
                        .filter(|g| g.model == target.name)
                        .flat_map(|g| &g.items)
                        .filter(|i| !i.is_deleted())
                        .map(|i| i.record.id.as_str()),
                )
                .filter(|id| seen.insert(id.to_string()))
                .map(str::to_string)
                .collect();

            if base_ids.is_empty() {
                continue;
            }
            jobs.push(OverlayJob {
                overlay_model: schema.name.clone(),
                target: target.name.clone(),
                fresh,
                base_ids,
            });
        }
        jobs
    }

    /// Overlays already stored for `job.base_ids`, in store order.
    async fn stored_overlays(&self, job: &OverlayJob) -> StorageResult<Vec<Record>> {
        let declares_locale = self.registry.capabilities(&job.overlay_model)?.locale;
        let locale_clause = match &self.locale {
            Some(tag) if declares_locale => {
                QueryPredicate::eq(fields::LOCALE, tag.as_str())
            }
            _ => QueryPredicate::All,
        };
        let mut stored = Vec::new();
        for chunk in job.base_ids.chunks(OVERLAY_LOOKUP_CHUNK) {
            let by_base = QueryPredicate::Or(
                chunk
                    .iter()
                    .map(|id| QueryPredicate::eq(fields::MATERIAL_ID, id.as_str()))
                    .collect(),
            );
            let predicate = by_base.and(locale_clause.clone());
            stored.extend(self.store.query(&job.overlay_model, predicate).await?);
        }
        Ok(stored)
    }

    /// Pass 2: copies overlay display fields onto base records. Returns the
    /// number of base records updated; failures are logged, never raised.
    async fn apply_overlays(&self, jobs: Vec<OverlayJob>) -> usize {
        if jobs.is_empty() {
            return 0;
        }

        let mut resolved = Vec::with_capacity(jobs.len());
        for job in jobs {
            let stored = match self.stored_overlays(&job).await {
                Ok(stored) => stored,
                Err(e) => {
                    warn!(model = %job.overlay_model, "reading stored overlays failed: {e}");
                    Vec::new()
                }
            };
            let mut candidates = job.fresh;
            candidates.extend(stored);
            resolved.push((job.overlay_model, job.target, candidates));
        }

        let result = self
            .store
            .with_transaction(move |w| {
                let mut localized = 0;
                for (overlay_model, target, candidates) in &resolved {
                    localized += overlay_records(w, overlay_model, target, candidates);
                }
                Ok(localized)
            })
            .await;

        match result {
            Ok(n) => n,
            Err(e) => {
                warn!("locale overlay pass failed: {e}");
                0
            }
        }
    }
}

fn is_stale(w: &mut dyn StoreWriter, item: &ModelWithMetadata) -> StorageResult<bool> {
    let stored = w.version_of(&item.record.model, &item.record.id)?;
    Ok(stored.is_some_and(|v| item.metadata.version < v))
}

/// Applies the first candidate per base record. Candidates repeating an
/// overlay id already seen are the same overlay and are skipped silently.
fn overlay_records(
    w: &mut dyn StoreWriter,
    overlay_model: &str,
    target: &str,
    candidates: &[Record],
) -> usize {
    let mut seen_overlays = HashSet::new();
    let mut seen_bases = HashSet::new();
    let mut duplicates = 0;
    let mut localized = 0;
    for overlay in candidates {
        if !seen_overlays.insert(overlay.id.as_str()) {
            continue;
        }
        let Some(base_id) = overlay.material_id() else {
            debug!(model = %overlay.model, id = %overlay.id, "overlay without materialID");
            continue;
        };
        if !seen_bases.insert(base_id) {
            duplicates += 1;
            continue;
        }

        let mut patch = Map::new();
        if let Some(name) = overlay.display_name() {
            patch.insert(fields::NAME.into(), Value::String(name.into()));
        }
        if let Some(sort) = overlay.sort() {
            patch.insert(fields::SORT.into(), Value::from(sort));
        }
        if patch.is_empty() {
            warn!(model = %overlay.model, id = %overlay.id, "overlay carries neither name nor sort");
            continue;
        }

        match w.update_fields(target, base_id, &patch) {
            Ok(true) => localized += 1,
            Ok(false) => debug!(model = %target, base_id, "overlay target not present locally"),
            Err(e) => warn!(model = %target, base_id, "overlay update failed: {e}"),
        }
    }

    if duplicates > 0 {
        warn!(
            model = %overlay_model,
            duplicates,
            "several overlays reference the same base record; only the first was applied"
        );
    }
    localized
}
