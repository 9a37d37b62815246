//! Adapter ports — the narrow interfaces runners use for all I/O.
//!
//! The engine is constructed with implementations of these traits; runners
//! never touch the host environment directly, so the whole pipeline can be
//! exercised with in-memory fakes.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use weft_core::UserId;

use crate::context::SecureString;
use crate::error::RunnerError;

// ── AI provider ─────────────────────────────────────────────────────────────

/// A chat message in an AI conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiMessage {
    /// `"user"`, `"assistant"` or `"tool"`.
    pub role: String,
    /// Message content.
    pub content: String,
}

impl AiMessage {
    /// Create a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    /// Create an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }

    /// Create a tool-result message.
    #[must_use]
    pub fn tool(content: impl Into<String>) -> Self {
        Self {
            role: "tool".into(),
            content: content.into(),
        }
    }
}

/// A tool the model may call, described by name and purpose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name, matched against tool-node names.
    pub name: String,
    /// What the tool does.
    pub description: String,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Which tool to invoke.
    pub name: String,
    /// Arguments for the tool.
    pub arguments: serde_json::Value,
}

/// Token accounting for one completion.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AiUsage {
    /// Tokens consumed by the prompt.
    pub input_tokens: u64,
    /// Tokens produced by the model.
    pub output_tokens: u64,
}

/// One completion request.
#[derive(Debug, Clone)]
pub struct AiRequest {
    /// System prompt.
    pub system_prompt: String,
    /// Conversation so far.
    pub messages: Vec<AiMessage>,
    /// Tools the model may call.
    pub tools: Vec<ToolDescriptor>,
    /// Provider-specific settings (model, temperature, ...).
    pub config: serde_json::Value,
}

/// One completion response.
#[derive(Debug, Clone)]
pub struct AiResponse {
    /// The model's text output.
    pub text: String,
    /// Tool invocations the model requested, empty when final.
    pub tool_calls: Vec<ToolCall>,
    /// Token usage.
    pub usage: AiUsage,
}

/// Port to an AI model provider.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Run one completion.
    async fn complete(&self, request: AiRequest) -> Result<AiResponse, RunnerError>;
}

// ── HTTP invoker ────────────────────────────────────────────────────────────

/// One outbound HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method (`GET`, `POST`, ...).
    pub method: String,
    /// Target URL.
    pub url: String,
    /// Request headers.
    pub headers: Vec<(String, String)>,
    /// JSON body, if any.
    pub body: Option<serde_json::Value>,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// The response to an [`HttpRequest`].
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// Parsed body — JSON when the response was JSON, else a string value.
    pub body: serde_json::Value,
}

impl HttpResponse {
    /// Returns `true` for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Port for outbound HTTP.
#[async_trait]
pub trait HttpInvoker: Send + Sync {
    /// Issue one request.
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, RunnerError>;
}

// ── Credential vault ────────────────────────────────────────────────────────

/// Result of a credential lookup.
#[derive(Debug, Clone)]
pub enum CredentialStatus {
    /// A live token.
    Token(SecureString),
    /// No credential stored for this user/provider pair.
    Missing,
    /// The stored credential expired; a refresh token may be available.
    Expired {
        /// Refresh token to try, if the vault kept one.
        refresh_token: Option<SecureString>,
    },
}

/// Port to the credential vault.
#[async_trait]
pub trait CredentialVault: Send + Sync {
    /// Fetch the credential for `(user, provider)`.
    async fn fetch(&self, user: UserId, provider: &str) -> Result<CredentialStatus, RunnerError>;

    /// Exchange a refresh token for a fresh credential.
    async fn refresh(
        &self,
        provider: &str,
        refresh_token: &SecureString,
    ) -> Result<SecureString, RunnerError>;
}

// ── External service invoker ────────────────────────────────────────────────

/// Result of invoking an operation on an external service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceResult {
    /// Whether the provider reported success.
    pub success: bool,
    /// Response payload.
    #[serde(default)]
    pub data: serde_json::Value,
    /// Provider-side status code, when the call failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Provider-side error message, when the call failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceResult {
    /// A successful result.
    #[must_use]
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data,
            status: None,
            error: None,
        }
    }

    /// A failed result with provider status and message.
    #[must_use]
    pub fn err(status: u16, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: serde_json::Value::Null,
            status: Some(status),
            error: Some(message.into()),
        }
    }
}

/// Port to external integrations (Slack, GitHub, Calendar, Notion, ...).
#[async_trait]
pub trait ServiceInvoker: Send + Sync {
    /// Invoke one operation with resolved credentials.
    async fn invoke(
        &self,
        provider: &str,
        operation: &str,
        params: serde_json::Value,
        credentials: &SecureString,
    ) -> Result<ServiceResult, RunnerError>;
}

// ── Memory store ────────────────────────────────────────────────────────────

/// Port to the keyed memory store. Writes are idempotent by key.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Write a value under `(collection, key)`.
    async fn put(
        &self,
        collection: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), RunnerError>;

    /// Read the value under `(collection, key)`.
    async fn get(&self, collection: &str, key: &str)
    -> Result<Option<serde_json::Value>, RunnerError>;

    /// Search a collection, returning up to `limit` matches.
    async fn search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<serde_json::Value>, RunnerError>;
}

// ── Response classifier ─────────────────────────────────────────────────────

/// Classifier verdict on an incoming human response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The response addresses the interaction.
    Relevant,
    /// The response is unrelated chatter.
    Filtered,
    /// Could not tell.
    Uncertain,
}

/// Relevance score plus verdict.
#[derive(Debug, Clone, Copy)]
pub struct Classification {
    /// Relevance in `[0, 1]`.
    pub relevance: f64,
    /// The classifier's verdict.
    pub verdict: Verdict,
}

/// Optional port scoring whether an incoming message answers a pending
/// interaction. When absent, the resume controller falls back to a
/// heuristic.
#[async_trait]
pub trait ResponseClassifier: Send + Sync {
    /// Score `incoming` against the pending `interaction`.
    async fn classify(
        &self,
        interaction: &serde_json::Value,
        incoming: &serde_json::Value,
    ) -> Result<Classification, RunnerError>;
}

// ── Engine-injected handles ─────────────────────────────────────────────────

/// Handle a `for_each` runner uses to dispatch its body subgraph once per
/// element. Implemented by the engine.
#[async_trait]
pub trait SubgraphHandle: Send + Sync {
    /// Run the loop body for one element, returning the body's output.
    async fn run_body(
        &self,
        index: usize,
        item: serde_json::Value,
    ) -> Result<serde_json::Value, RunnerError>;
}

/// Handle an AI agent uses to invoke tool nodes connected via `ai_tool`
/// edges. Implemented by the engine.
#[async_trait]
pub trait ToolHandle: Send + Sync {
    /// Tools available to the agent.
    fn tools(&self) -> Vec<ToolDescriptor>;

    /// Invoke a tool by name.
    async fn invoke_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, RunnerError>;
}
