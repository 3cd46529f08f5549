//! Splitting a composite response back into per-model pages.

use modelsync_types::{ModelWithMetadata, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::request::ChildQuery;

/// One entry of the response's top-level `errors` array.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GraphQlError {
    #[serde(rename = "errorType", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl std::fmt::Display for GraphQlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}]: {}",
            self.error_type.as_deref().unwrap_or("Unknown"),
            self.message
        )
    }
}

/// One model's slice of one response.
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult {
    pub model: String,
    pub items: Vec<ModelWithMetadata>,
    pub next_token: Option<String>,
    pub started_at: Option<Timestamp>,
}

impl PageResult {
    pub fn empty(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            items: Vec::new(),
            next_token: None,
            started_at: None,
        }
    }
}

/// Everything extracted from one composite response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DemuxResult {
    /// Per-model pages, in child-query order.
    pub pages: Vec<PageResult>,
    pub errors: Vec<GraphQlError>,
    /// False if the response had no `data` object; `pages` is then empty.
    pub complete: bool,
}

impl DemuxResult {
    pub fn has_more(&self) -> bool {
        self.pages.iter().any(|p| p.next_token.is_some())
    }

    /// `errors` joined into one line.
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Wire shape of one model's list result.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    items: Vec<Value>,
    next_token: Option<String>,
    started_at: Option<u64>,
}

/// Splits composite responses by child-query alias.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseDemultiplexer;

impl ResponseDemultiplexer {
    pub fn new() -> Self {
        Self
    }

    pub fn demultiplex(&self, response: &Value, children: &[ChildQuery]) -> DemuxResult {
        let errors = parse_errors(response);
        for err in &errors {
            warn!("sync query error {err}");
        }

        let Some(data) = response.get("data").and_then(Value::as_object) else {
            let result = DemuxResult {
                pages: Vec::new(),
                errors,
                complete: false,
            };
            error!("sync response carried no data object: {}", result.error_summary());
            return result;
        };

        for key in data.keys() {
            if !children.iter().any(|c| &c.alias == key) {
                debug!(key = %key, "ignoring unexpected response key");
            }
        }

        let pages = children
            .iter()
            .filter_map(|child| {
                let value = data.get(&child.alias)?;
                Some(decode_page(&child.model, value))
            })
            .collect();

        DemuxResult {
            pages,
            errors,
            complete: true,
        }
    }
}

/// Decodes one model's list result. Any malformed part yields an empty page.
fn decode_page(model: &str, value: &Value) -> PageResult {
    if value.is_null() {
        warn!(model, "null result for model, treating as empty");
        return PageResult::empty(model);
    }
    let list: ListResponse = match serde_json::from_value(value.clone()) {
        Ok(list) => list,
        Err(e) => {
            warn!(model, "malformed result for model, treating as empty: {e}");
            return PageResult::empty(model);
        }
    };
    let items = match list
        .items
        .iter()
        .filter(|item| !item.is_null())
        .map(|item| ModelWithMetadata::from_item(model, item))
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(items) => items,
        Err(e) => {
            warn!(model, "malformed item for model, treating page as empty: {e}");
            return PageResult::empty(model);
        }
    };
    debug!(model, count = items.len(), more = list.next_token.is_some(), "decoded page");
    PageResult {
        model: model.to_string(),
        items,
        next_token: list.next_token.filter(|t| !t.is_empty()),
        started_at: list.started_at.map(Timestamp::from_millis),
    }
}

fn parse_errors(response: &Value) -> Vec<GraphQlError> {
    response
        .get("errors")
        .and_then(Value::as_array)
        .map(|errors| {
            errors
                .iter()
                .map(|e| {
                    serde_json::from_value(e.clone()).unwrap_or_else(|_| GraphQlError {
                        error_type: None,
                        message: e.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}
