//! Sync orchestrator: drives one sync cycle end to end.
//!
//! A cycle reads the watermark, builds predicates, fetches every page of
//! every model through the transport, merges the result and only then
//! advances the watermark. Cycles on one store are serialized.

use std::sync::Arc;

use modelsync_model::SchemaRegistry;
use modelsync_storage::{LocalStore, SettingsStore};
use modelsync_types::{SyncWatermark, Timestamp};
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::merger::{MergeStats, ModelGroup, ModelMerger, RecordHook};
use crate::predicate::{PredicateBuilder, PredicateInputs};
use crate::request::{ModelQuery, RequestMerger};
use crate::response::ResponseDemultiplexer;
use crate::transport::SyncTransport;

/// Lifecycle of the orchestrator's sync critical section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Idle,
    InProgress,
    Committed,
    Failed,
}

/// Result of a committed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Watermark persisted by this cycle.
    pub newest_updated_time: Timestamp,
    pub merged: usize,
    pub deleted: usize,
    pub localized: usize,
    /// Composite requests sent.
    pub pages: usize,
    /// The watermark had expired and everything was refetched.
    pub full_resync: bool,
}

/// Everything fetched in one cycle, grouped per model.
struct Fetched {
    groups: Vec<ModelGroup>,
    pages: usize,
}

/// Top-level sync driver for one local store.
pub struct SyncOrchestrator<S> {
    config: SyncConfig,
    registry: Arc<SchemaRegistry>,
    store: Arc<S>,
    settings: Arc<dyn SettingsStore>,
    transport: Arc<dyn SyncTransport>,
    predicates: PredicateBuilder,
    requests: RequestMerger,
    demux: ResponseDemultiplexer,
    merger: ModelMerger<S>,
    cycle: Mutex<()>,
    state: watch::Sender<SyncState>,
    last_outcome: RwLock<Option<SyncOutcome>>,
}

impl<S: LocalStore> SyncOrchestrator<S> {
    pub fn new(
        config: SyncConfig,
        registry: Arc<SchemaRegistry>,
        store: Arc<S>,
        settings: Arc<dyn SettingsStore>,
        transport: Arc<dyn SyncTransport>,
    ) -> Self {
        let predicates = PredicateBuilder::new(registry.clone(), config.sync_expressions.clone());
        let merger = ModelMerger::new(store.clone(), registry.clone())
            .with_policy(config.conflict_policy)
            .with_locale(config.locale.clone());
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            requests: RequestMerger::new(registry.clone()),
            demux: ResponseDemultiplexer::new(),
            config,
            registry,
            store,
            settings,
            transport,
            predicates,
            merger,
            cycle: Mutex::new(()),
            state,
            last_outcome: RwLock::new(None),
        }
    }

    /// Installs a hook run on every record before it is saved.
    #[must_use]
    pub fn with_record_hook(mut self, hook: Arc<dyn RecordHook>) -> Self {
        self.merger = self.merger.with_hook(hook);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// Receiver observing every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Outcome of the most recent cycle; `None` if it failed or none ran.
    pub async fn last_outcome(&self) -> Option<SyncOutcome> {
        *self.last_outcome.read().await
    }

    /// Runs one cycle. Failures are logged and reported as `None`; the
    /// watermark is left untouched.
    pub async fn sync_now(&self) -> Option<SyncOutcome> {
        match self.sync_now_detailed().await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!("sync cycle failed: {e}");
                None
            }
        }
    }

    /// Runs one cycle and reports why it failed.
    ///
    /// A caller arriving while a cycle is in flight waits for it, then runs
    /// its own cycle from the watermark the first one committed.
    pub async fn sync_now_detailed(&self) -> SyncResult<SyncOutcome> {
        let _cycle = self.cycle.lock().await;
        self.state.send_replace(SyncState::InProgress);

        let result = self.run_cycle().await;

        let terminal = if result.is_ok() {
            SyncState::Committed
        } else {
            SyncState::Failed
        };
        self.state.send_replace(terminal);
        *self.last_outcome.write().await = result.as_ref().ok().copied();
        self.state.send_replace(SyncState::Idle);
        result
    }

    async fn run_cycle(&self) -> SyncResult<SyncOutcome> {
        self.store.ready().await?;

        let now = Timestamp::now();
        let watermark = self.settings.watermark()?;
        let locale = self.config.locale.as_deref();

        let mut last_sync = watermark.last_sync;
        let age = now.duration_since(last_sync);
        let full_resync = !last_sync.is_zero() && age > self.config.expire_interval;
        if full_resync {
            info!(age_secs = age.as_secs(), "local data expired, refetching everything");
            last_sync = Timestamp::ZERO;
        }
        let model_set_changed = watermark
            .model_set_version
            .as_deref()
            .is_some_and(|v| v != self.registry.version());
        if model_set_changed {
            info!(
                stored = ?watermark.model_set_version,
                current = self.registry.version(),
                "model set changed, refetching everything"
            );
            last_sync = Timestamp::ZERO;
        }

        let inputs = PredicateInputs {
            last_sync,
            gray_release: self.config.effective_gray_release(),
            locale: self.config.locale.clone(),
            locale_rebuild: watermark.locale_changed(locale),
        };
        debug!(last_sync = %inputs.last_sync, locale = ?inputs.locale, "starting sync cycle");

        let fetched = self.fetch_all(&inputs).await?;

        let newest = if full_resync {
            now
        } else {
            newest_change(&fetched.groups)
                .map_or(watermark.last_sync, |t| t.max(watermark.last_sync))
                .min(now)
        };

        let stats: MergeStats = self.merger.merge(fetched.groups).await?;

        self.settings.save_watermark(&SyncWatermark {
            last_sync: newest,
            model_set_version: Some(self.registry.version().to_string()),
            locale: self.config.locale.clone(),
        })?;

        let outcome = SyncOutcome {
            newest_updated_time: newest,
            merged: stats.upserted,
            deleted: stats.deleted,
            localized: stats.localized,
            pages: fetched.pages,
            full_resync,
        };
        info!(
            watermark = %newest,
            merged = outcome.merged,
            deleted = outcome.deleted,
            pages = outcome.pages,
            "sync cycle committed"
        );
        Ok(outcome)
    }

    /// Fetches every page of every model.
    async fn fetch_all(&self, inputs: &PredicateInputs) -> SyncResult<Fetched> {
        let mut groups: Vec<ModelGroup> = Vec::new();
        let mut pending: Vec<ModelQuery> = Vec::new();
        for p in self.predicates.build_all(inputs)? {
            pending.push(self.requests.model_query(
                &p.model,
                p.predicate,
                self.config.page_limit,
                None,
            )?);
            groups.push(ModelGroup::new(p.model, Vec::new()));
        }

        if pending.is_empty() {
            return Err(SyncError::EmptyRequest);
        }

        let mut pages = 0;
        while !pending.is_empty() {
            if pages >= self.config.max_pages {
                warn!(max_pages = self.config.max_pages, "backend keeps paginating");
                return Err(SyncError::PaginationLimit(self.config.max_pages));
            }

            let merged = self.requests.merge(&pending)?;
            let raw = self.transport.execute(&merged).await?;
            pages += 1;

            let result = self.demux.demultiplex(&raw, &merged.children);
            if !result.complete {
                return Err(SyncError::IncompleteResponse(result.error_summary()));
            }

            let mut next = Vec::new();
            for page in result.pages {
                if let Some(group) = groups.iter_mut().find(|g| g.model == page.model) {
                    group.items.extend(page.items);
                }
                if let Some(token) = page.next_token {
                    if let Some(query) = pending.iter().find(|q| q.model == page.model) {
                        next.push(query.continuation(token));
                    }
                }
            }
            pending = next;
        }

        Ok(Fetched { groups, pages })
    }
}

/// Latest `_lastChangedAt` among live records.
fn newest_change(groups: &[ModelGroup]) -> Option<Timestamp> {
    groups
        .iter()
        .flat_map(|g| &g.items)
        .filter(|i| !i.is_deleted())
        .map(|i| i.metadata.last_changed_at)
        .max()
}
