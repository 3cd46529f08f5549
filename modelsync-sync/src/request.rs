//! Composite request construction.
//!
//! Each model gets its own paginated list query. [`RequestMerger::merge`]
//! folds N of them into one GraphQL operation: shared variables (`limit`,
//! `lastSync`) are declared once, every other variable is suffixed with the
//! model name so two models can never collide.

use std::collections::BTreeMap;
use std::sync::Arc;

use modelsync_model::{QueryPredicate, SchemaRegistry};
use modelsync_types::fields;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{SyncError, SyncResult};

/// Variable names declared once per composite request.
pub const SHARED_VARIABLES: [&str; 2] = ["limit", "lastSync"];

/// Name of the composite operation.
pub const OPERATION_NAME: &str = "ListAllModel";

/// Response alias of a model's child query.
pub fn alias_for(model: &str) -> String {
    format!("list{model}")
}

/// True if `name` is declared once and shared by all child queries.
pub fn is_shared(name: &str) -> bool {
    SHARED_VARIABLES.contains(&name)
}

/// Identifies one child query inside a composite request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildQuery {
    pub model: String,
    /// Key of this model's result inside the response `data` object.
    pub alias: String,
}

/// A declared GraphQL variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableDecl {
    pub name: String,
    pub graphql_type: String,
}

/// One model's paginated "list changed records" query, before merging.
///
/// `body` references its variables by their unsuffixed names (`$filter`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelQuery {
    pub model: String,
    pub alias: String,
    pub body: String,
    pub declarations: Vec<VariableDecl>,
    pub variables: Map<String, Value>,
    pub predicate: QueryPredicate,
}

impl ModelQuery {
    pub fn next_token(&self) -> Option<&str> {
        self.variables.get("nextToken").and_then(Value::as_str)
    }

    /// The same query positioned at the next page.
    #[must_use]
    pub fn continuation(&self, next_token: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.variables
            .insert("nextToken".into(), Value::String(next_token.into()));
        next
    }

    /// Standalone single-model document, unmerged.
    pub fn document(&self) -> String {
        let params = self
            .declarations
            .iter()
            .map(|d| format!("${}: {}", d.name, d.graphql_type))
            .collect::<Vec<_>>()
            .join(", ");
        format!("query Sync{}({params}) {{\n  {}\n}}\n", self.model, self.body)
    }
}

/// The union of several [`ModelQuery`]s, ready for the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedQuery {
    pub document: String,
    pub variables: Map<String, Value>,
    pub children: Vec<ChildQuery>,
}

impl MergedQuery {
    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.children.iter().map(|c| c.model.as_str())
    }
}

/// Builds per-model queries and merges them.
#[derive(Debug, Clone)]
pub struct RequestMerger {
    registry: Arc<SchemaRegistry>,
}

impl RequestMerger {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }

    /// Builds the list query for one model.
    pub fn model_query(
        &self,
        model: &str,
        predicate: QueryPredicate,
        limit: u32,
        next_token: Option<&str>,
    ) -> SyncResult<ModelQuery> {
        let schema = self.registry.get(model)?;
        let alias = alias_for(model);

        let mut selection: Vec<&str> = schema.field_names().collect();
        for meta in [fields::VERSION, fields::DELETED, fields::LAST_CHANGED_AT] {
            if !selection.contains(&meta) {
                selection.push(meta);
            }
        }
        let body = format!(
            "{alias}: list{}(filter: $filter, limit: $limit, nextToken: $nextToken) \
             {{ items {{ {} }} nextToken startedAt }}",
            schema.plural_name,
            selection.join(" ")
        );

        let declarations = vec![
            VariableDecl {
                name: "filter".into(),
                graphql_type: format!("Model{model}FilterInput"),
            },
            VariableDecl {
                name: "limit".into(),
                graphql_type: "Int".into(),
            },
            VariableDecl {
                name: "nextToken".into(),
                graphql_type: "String".into(),
            },
        ];

        let mut variables = Map::new();
        variables.insert("filter".into(), predicate.to_filter());
        variables.insert("limit".into(), Value::from(limit));
        variables.insert(
            "nextToken".into(),
            next_token.map_or(Value::Null, |t| Value::String(t.into())),
        );

        Ok(ModelQuery {
            model: model.to_string(),
            alias,
            body,
            declarations,
            variables,
            predicate,
        })
    }

    /// Merges child queries into one composite request.
    ///
    /// Fails with [`SyncError::EmptyRequest`] for zero queries and with
    /// [`SyncError::Protocol`] if two children disagree on a shared
    /// variable's type or the same model appears twice.
    pub fn merge(&self, queries: &[ModelQuery]) -> SyncResult<MergedQuery> {
        if queries.is_empty() {
            return Err(SyncError::EmptyRequest);
        }

        let mut params: BTreeMap<String, String> = BTreeMap::new();
        let mut variables = Map::new();
        let mut bodies = Vec::with_capacity(queries.len());
        let mut children: Vec<ChildQuery> = Vec::with_capacity(queries.len());

        for query in queries {
            if children.iter().any(|c| c.model == query.model) {
                return Err(SyncError::Protocol(format!(
                    "model {} appears twice in one request",
                    query.model
                )));
            }

            let mut body = query.body.clone();
            for decl in &query.declarations {
                let name = namespaced(&decl.name, &query.model);
                if let Some(existing) = params.get(&name) {
                    if *existing != decl.graphql_type {
                        return Err(SyncError::Protocol(format!(
                            "variable ${name} declared as both {existing} and {}",
                            decl.graphql_type
                        )));
                    }
                } else {
                    params.insert(name.clone(), decl.graphql_type.clone());
                }
                if name != decl.name {
                    body = rename_variable(&body, &decl.name, &name);
                }
            }

            for (key, value) in &query.variables {
                let name = namespaced(key, &query.model);
                if is_shared(key) && variables.contains_key(&name) {
                    continue;
                }
                variables.insert(name, value.clone());
            }

            bodies.push(body);
            children.push(ChildQuery {
                model: query.model.clone(),
                alias: query.alias.clone(),
            });
        }

        let params = params
            .iter()
            .map(|(name, ty)| format!("${name}: {ty}"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut document = format!("query {OPERATION_NAME}({params}) {{\n");
        for body in &bodies {
            document.push_str("  ");
            document.push_str(body);
            document.push('\n');
        }
        document.push_str("}\n");

        debug!(models = children.len(), "merged composite query");
        Ok(MergedQuery {
            document,
            variables,
            children,
        })
    }
}

/// `name` for shared variables, `<name><Model>` otherwise.
pub fn namespaced(name: &str, model: &str) -> String {
    if is_shared(name) {
        name.to_string()
    } else {
        format!("{name}{model}")
    }
}

/// Replaces whole-word `$from` references with `$to`.
fn rename_variable(body: &str, from: &str, to: &str) -> String {
    let needle = format!("${from}");
    let mut out = String::with_capacity(body.len() + 16);
    let mut rest = body;
    while let Some(pos) = rest.find(&needle) {
        let after = &rest[pos + needle.len()..];
        out.push_str(&rest[..pos]);
        let continues = after
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
        if continues {
            out.push_str(&needle);
        } else {
            out.push('$');
            out.push_str(to);
        }
        rest = after;
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rename_is_whole_word() {
        let body = "a(filter: $filter, other: $filterX, nextToken: $nextToken)";
        assert_eq!(
            rename_variable(body, "filter", "filterFont"),
            "a(filter: $filterFont, other: $filterX, nextToken: $nextToken)"
        );
    }

    #[test]
    fn namespacing_skips_shared() {
        assert_eq!(namespaced("limit", "Font"), "limit");
        assert_eq!(namespaced("lastSync", "Font"), "lastSync");
        assert_eq!(namespaced("filter", "Font"), "filterFont");
    }
}
