//! Memory runners — read and write a keyed store through the memory
//! adapter. Writes are idempotent by key.

use async_trait::async_trait;
use weft_runner::{
    ConfigSchema, FieldSpec, NodeInput, NodeRunner, RunContext, RunnerError, RunnerOutcome,
    RunnerSpec,
};
use weft_workflow::NodeKind;

const DEFAULT_SEARCH_LIMIT: u64 = 10;

/// Runner for memory subtypes (`key_value`, `buffer`, `document`,
/// `vector_search`).
///
/// Config:
/// - `collection` (required string)
/// - `operation` (enum `get` | `put`, default `put`; ignored by
///   `vector_search`)
/// - `key` (string; required for `key_value` and `document`)
/// - `query` (string; required for `vector_search`)
/// - `limit` (integer >= 1, default 10; `vector_search` only)
pub struct MemoryRunner {
    spec: RunnerSpec,
}

impl MemoryRunner {
    /// Create a memory runner for one subtype.
    #[must_use]
    pub fn new(subtype: &str) -> Self {
        let mut schema = ConfigSchema::new().field(FieldSpec::string("collection").required());
        schema = match subtype {
            "vector_search" => schema
                .field(FieldSpec::string("query"))
                .field(FieldSpec::integer("limit").with_range(1.0, 1000.0)),
            "buffer" => schema.field(FieldSpec::string("operation").with_enum(["get", "put"])),
            // key_value and document
            _ => schema
                .field(FieldSpec::string("key").required())
                .field(FieldSpec::string("operation").with_enum(["get", "put"])),
        };
        Self {
            spec: RunnerSpec::new(NodeKind::Memory, subtype, format!("{subtype} memory"))
                .with_schema(schema),
        }
    }

    async fn run_keyed(
        &self,
        ctx: &RunContext,
        input: &NodeInput,
    ) -> Result<RunnerOutcome, RunnerError> {
        let collection = ctx.config_str("collection")?;
        let key = ctx.config_str("key")?;
        let store = ctx.memory()?;

        match ctx.config_str_opt("operation").unwrap_or("put") {
            "get" => {
                let value = store.get(collection, key).await?;
                Ok(RunnerOutcome::result(
                    value.unwrap_or(serde_json::Value::Null),
                ))
            }
            _ => {
                let value = input.primary();
                if self.spec.subtype == "document" && !value.is_object() {
                    return Err(RunnerError::invalid_configuration(
                        "document memory requires an object value",
                    ));
                }
                store.put(collection, key, value.clone()).await?;
                Ok(RunnerOutcome::result(value))
            }
        }
    }

    async fn run_buffer(
        &self,
        ctx: &RunContext,
        input: &NodeInput,
    ) -> Result<RunnerOutcome, RunnerError> {
        let collection = ctx.config_str("collection")?;
        let store = ctx.memory()?;
        // The buffer lives under a single well-known key per collection.
        let key = "buffer";

        match ctx.config_str_opt("operation").unwrap_or("put") {
            "get" => {
                let value = store.get(collection, key).await?;
                Ok(RunnerOutcome::result(
                    value.unwrap_or_else(|| serde_json::json!([])),
                ))
            }
            _ => {
                let mut entries = match store.get(collection, key).await? {
                    Some(serde_json::Value::Array(entries)) => entries,
                    _ => Vec::new(),
                };
                entries.push(input.primary());
                let value = serde_json::Value::Array(entries);
                store.put(collection, key, value.clone()).await?;
                Ok(RunnerOutcome::result(value))
            }
        }
    }

    async fn run_search(&self, ctx: &RunContext) -> Result<RunnerOutcome, RunnerError> {
        let collection = ctx.config_str("collection")?;
        let query = ctx.config_str("query")?;
        let limit = ctx.config_u64("limit").unwrap_or(DEFAULT_SEARCH_LIMIT) as usize;
        let hits = ctx.memory()?.search(collection, query, limit).await?;
        Ok(RunnerOutcome::result(serde_json::Value::Array(hits)))
    }
}

#[async_trait]
impl NodeRunner for MemoryRunner {
    fn spec(&self) -> &RunnerSpec {
        &self.spec
    }

    async fn run(&self, ctx: &RunContext, input: &NodeInput) -> Result<RunnerOutcome, RunnerError> {
        ctx.check_cancelled()?;
        match self.spec.subtype.as_str() {
            "buffer" => self.run_buffer(ctx, input).await,
            "vector_search" => self.run_search(ctx).await,
            _ => self.run_keyed(ctx, input).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fake_store::FakeMemory;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use weft_core::{ExecutionId, NodeId, WorkflowId};
    use weft_runner::Adapters;

    mod fake_store {
        use super::*;
        use std::collections::HashMap;
        use std::sync::Mutex;
        use weft_runner::MemoryStore;

        #[derive(Default)]
        pub struct FakeMemory {
            pub entries: Mutex<HashMap<(String, String), serde_json::Value>>,
        }

        #[async_trait]
        impl MemoryStore for FakeMemory {
            async fn put(
                &self,
                collection: &str,
                key: &str,
                value: serde_json::Value,
            ) -> Result<(), RunnerError> {
                self.entries
                    .lock()
                    .unwrap()
                    .insert((collection.to_owned(), key.to_owned()), value);
                Ok(())
            }

            async fn get(
                &self,
                collection: &str,
                key: &str,
            ) -> Result<Option<serde_json::Value>, RunnerError> {
                Ok(self
                    .entries
                    .lock()
                    .unwrap()
                    .get(&(collection.to_owned(), key.to_owned()))
                    .cloned())
            }

            async fn search(
                &self,
                collection: &str,
                query: &str,
                limit: usize,
            ) -> Result<Vec<serde_json::Value>, RunnerError> {
                Ok(self
                    .entries
                    .lock()
                    .unwrap()
                    .iter()
                    .filter(|((c, _), v)| c == collection && v.to_string().contains(query))
                    .map(|(_, v)| v.clone())
                    .take(limit)
                    .collect())
            }
        }
    }

    fn context(config: serde_json::Value, store: Arc<FakeMemory>) -> RunContext {
        RunContext::new(ExecutionId::v4(), WorkflowId::v4(), NodeId::v4(), "memory")
            .with_config(config.as_object().cloned().unwrap_or_default())
            .with_adapters(Adapters {
                memory: Some(store),
                ..Adapters::default()
            })
    }

    #[tokio::test]
    async fn key_value_put_then_get() {
        let store = Arc::new(FakeMemory::default());
        let runner = MemoryRunner::new("key_value");

        let put_ctx = context(
            json!({"collection": "prefs", "key": "user-1", "operation": "put"}),
            store.clone(),
        );
        let input = NodeInput::new().with("input", json!({"theme": "dark"}));
        runner.run(&put_ctx, &input).await.unwrap();

        let get_ctx = context(
            json!({"collection": "prefs", "key": "user-1", "operation": "get"}),
            store,
        );
        let outcome = runner.run(&get_ctx, &NodeInput::new()).await.unwrap();
        assert_eq!(
            outcome.ports().unwrap().get("result"),
            Some(&json!({"theme": "dark"}))
        );
    }

    #[tokio::test]
    async fn key_value_put_is_idempotent_by_key() {
        let store = Arc::new(FakeMemory::default());
        let runner = MemoryRunner::new("key_value");
        let ctx = context(json!({"collection": "c", "key": "k"}), store.clone());
        let input = NodeInput::new().with("input", json!(1));

        runner.run(&ctx, &input).await.unwrap();
        runner.run(&ctx, &input).await.unwrap();

        assert_eq!(store.entries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn get_missing_key_yields_null() {
        let store = Arc::new(FakeMemory::default());
        let ctx = context(
            json!({"collection": "c", "key": "nope", "operation": "get"}),
            store,
        );
        let outcome = MemoryRunner::new("key_value")
            .run(&ctx, &NodeInput::new())
            .await
            .unwrap();
        assert_eq!(
            outcome.ports().unwrap().get("result"),
            Some(&serde_json::Value::Null)
        );
    }

    #[tokio::test]
    async fn buffer_appends() {
        let store = Arc::new(FakeMemory::default());
        let runner = MemoryRunner::new("buffer");
        let ctx = context(json!({"collection": "chat"}), store.clone());

        runner
            .run(&ctx, &NodeInput::new().with("input", json!("first")))
            .await
            .unwrap();
        let outcome = runner
            .run(&ctx, &NodeInput::new().with("input", json!("second")))
            .await
            .unwrap();
        assert_eq!(
            outcome.ports().unwrap().get("result"),
            Some(&json!(["first", "second"]))
        );

        let read_ctx = context(json!({"collection": "chat", "operation": "get"}), store);
        let outcome = runner.run(&read_ctx, &NodeInput::new()).await.unwrap();
        assert_eq!(
            outcome.ports().unwrap().get("result"),
            Some(&json!(["first", "second"]))
        );
    }

    #[tokio::test]
    async fn document_requires_object() {
        let store = Arc::new(FakeMemory::default());
        let ctx = context(json!({"collection": "docs", "key": "d1"}), store);
        let err = MemoryRunner::new("document")
            .run(&ctx, &NodeInput::new().with("input", json!("scalar")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_configuration");
    }

    #[tokio::test]
    async fn vector_search_returns_hits() {
        let store = Arc::new(FakeMemory::default());
        store
            .entries
            .lock()
            .unwrap()
            .insert(("kb".into(), "a".into()), json!({"text": "rust workflows"}));
        store
            .entries
            .lock()
            .unwrap()
            .insert(("kb".into(), "b".into()), json!({"text": "gardening"}));

        let ctx = context(json!({"collection": "kb", "query": "workflows"}), store);
        let outcome = MemoryRunner::new("vector_search")
            .run(&ctx, &NodeInput::new())
            .await
            .unwrap();
        assert_eq!(
            outcome.ports().unwrap().get("result"),
            Some(&json!([{"text": "rust workflows"}]))
        );
    }
}
