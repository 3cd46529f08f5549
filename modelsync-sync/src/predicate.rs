//! Per-model incremental filters.

use std::collections::HashMap;
use std::sync::Arc;

use modelsync_model::{QueryPredicate, SchemaRegistry};
use modelsync_types::{fields, Timestamp};
use tracing::debug;

use crate::error::SyncResult;

/// Inputs shared by every model's predicate in one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PredicateInputs {
    pub last_sync: Timestamp,
    pub gray_release: i64,
    pub locale: Option<String>,
    /// The configured locale differs from the one the watermark was reached
    /// under; locale overlay models are refetched in full.
    pub locale_rebuild: bool,
}

/// One model's filter for the current cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelPredicate {
    pub model: String,
    pub predicate: QueryPredicate,
    /// True when the `updatedAt` clause was left out.
    pub full_fetch: bool,
}

/// Derives the "records I still need" filter for each model.
#[derive(Debug, Clone)]
pub struct PredicateBuilder {
    registry: Arc<SchemaRegistry>,
    base: HashMap<String, QueryPredicate>,
}

impl PredicateBuilder {
    /// `base` holds the statically configured predicate per model; models
    /// without an entry start from match-all.
    pub fn new(registry: Arc<SchemaRegistry>, base: HashMap<String, QueryPredicate>) -> Self {
        Self { registry, base }
    }

    /// Builds one model's predicate.
    ///
    /// Clauses are AND-ed onto the base predicate: `grayRelease > threshold`
    /// and `locale == tag` when the model declares those fields, and
    /// `updatedAt > last_sync` unless `last_sync` is zero.
    pub fn build(
        &self,
        model: &str,
        last_sync: Timestamp,
        gray_release: i64,
        locale: Option<&str>,
    ) -> SyncResult<QueryPredicate> {
        let caps = self.registry.capabilities(model)?;
        let mut predicate = self.base.get(model).cloned().unwrap_or_default();

        if caps.gray_release {
            predicate = predicate.and(QueryPredicate::gt(fields::GRAY_RELEASE, gray_release));
        }
        if caps.locale {
            if let Some(tag) = locale {
                predicate = predicate.and(QueryPredicate::eq(fields::LOCALE, tag));
            }
        }
        if !last_sync.is_zero() {
            predicate =
                predicate.and(QueryPredicate::gt(fields::UPDATED_AT, last_sync.to_rfc3339()));
        }
        Ok(predicate)
    }

    /// Builds predicates for every registered model, in registration order.
    pub fn build_all(&self, inputs: &PredicateInputs) -> SyncResult<Vec<ModelPredicate>> {
        self.registry
            .models()
            .iter()
            .map(|schema| {
                let rebuild = inputs.locale_rebuild && schema.is_locale_overlay();
                let last_sync = if rebuild {
                    Timestamp::ZERO
                } else {
                    inputs.last_sync
                };
                if rebuild {
                    debug!(model = %schema.name, "locale changed, refetching overlay model");
                }
                let predicate = self.build(
                    &schema.name,
                    last_sync,
                    inputs.gray_release,
                    inputs.locale.as_deref(),
                )?;
                Ok(ModelPredicate {
                    model: schema.name.clone(),
                    predicate,
                    full_fetch: last_sync.is_zero(),
                })
            })
            .collect()
    }
}
