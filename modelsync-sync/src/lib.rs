//! Incremental multi-model sync engine.
//!
//! One cycle, leaf-first:
//!
//! - [`PredicateBuilder`] derives each model's "changed since" filter
//! - [`RequestMerger`] folds the per-model list queries into one request
//! - a [`SyncTransport`] executes it
//! - [`ResponseDemultiplexer`] splits the response back into per-model pages
//! - [`ModelMerger`] writes the pages into the local store
//! - [`SyncOrchestrator`] drives the loop, paginates, and advances the watermark
//!   only after the merge committed

pub mod config;
pub mod error;
pub mod http;
pub mod merger;
pub mod orchestrator;
pub mod predicate;
pub mod request;
pub mod response;
pub mod transport;

pub use config::{ConflictPolicy, SyncConfig, DEFAULT_EXPIRE_INTERVAL, MAX_GRAY_RELEASE};
pub use error::{SyncError, SyncResult};
pub use http::{HttpTransport, HttpTransportConfig};
pub use merger::{MergeStats, ModelGroup, ModelMerger, RecordHook};
pub use orchestrator::{SyncOrchestrator, SyncOutcome, SyncState};
pub use predicate::{ModelPredicate, PredicateBuilder, PredicateInputs};
pub use request::{alias_for, ChildQuery, MergedQuery, ModelQuery, RequestMerger, VariableDecl};
pub use response::{DemuxResult, GraphQlError, PageResult, ResponseDemultiplexer};
pub use transport::SyncTransport;
