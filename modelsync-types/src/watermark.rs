use serde::{Deserialize, Serialize};

use crate::Timestamp;

/// Per-replica sync boundary.
///
/// Everything the backend changed before `last_sync` is assumed merged
/// locally. `model_set_version` and `locale` record which schema and which
/// locale that boundary was reached under; a change in either invalidates
/// part of it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncWatermark {
    pub last_sync: Timestamp,
    pub model_set_version: Option<String>,
    pub locale: Option<String>,
}

impl SyncWatermark {
    pub fn new(last_sync: Timestamp) -> Self {
        Self {
            last_sync,
            ..Default::default()
        }
    }

    /// True if nothing was ever synced.
    pub fn is_initial(&self) -> bool {
        self.last_sync.is_zero()
    }

    /// True if the stored locale differs from `current`.
    ///
    /// A replica that never recorded a locale counts as changed once a locale
    /// is configured.
    pub fn locale_changed(&self, current: Option<&str>) -> bool {
        self.locale.as_deref() != current
    }
}
