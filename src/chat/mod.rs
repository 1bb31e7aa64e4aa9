//! Chat request flow.
//!
//! A chat request passes the per-user rate gate, assembles its context from
//! the conversation log, calls the external completion provider, and records
//! both turns. Replies are never cached; the provider is never retried here.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::{instrument, warn};

use crate::limit::{Decision, RateLimiter};
use crate::session::{ConversationLog, Role, StoredMessage};

const CHAT_SCOPE: &str = "chat";

#[derive(Debug, Error)]
#[error("completion provider failed: {0}")]
pub struct CompletionError(pub String);

/// The external text-completion call. Opaque and fallible.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[StoredMessage],
        user_message: &str,
    ) -> Result<String, CompletionError>;
}

/// Gate and context parameters for the chat flow.
#[derive(Debug, Clone)]
pub struct ChatLimits {
    /// Requests allowed per principal per window.
    pub max_requests: u64,
    pub window: Duration,
    /// How many log entries feed the completion context.
    pub context_window: usize,
}

#[derive(Debug)]
pub struct ChatReply {
    pub text: String,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat rate limit exceeded")]
    RateLimited { retry_after: Duration },
    #[error(transparent)]
    Completion(#[from] CompletionError),
}

#[derive(Debug, Serialize)]
struct ChatErrorBody {
    error: ChatErrorMessage,
}

#[derive(Debug, Serialize)]
struct ChatErrorMessage {
    code: &'static str,
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_seconds: Option<u64>,
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        match self {
            ChatError::RateLimited { retry_after } => {
                let seconds = retry_after.as_secs().max(1);
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(ChatErrorBody {
                        error: ChatErrorMessage {
                            code: "rate_limited",
                            message: "too many chat requests, slow down",
                            retry_after_seconds: Some(seconds),
                        },
                    }),
                )
                    .into_response();
                if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
                response
            }
            ChatError::Completion(error) => {
                warn!(error = %error, "completion provider failed");
                (
                    StatusCode::BAD_GATEWAY,
                    Json(ChatErrorBody {
                        error: ChatErrorMessage {
                            code: "completion_failed",
                            message: "the completion provider did not answer",
                            retry_after_seconds: None,
                        },
                    }),
                )
                    .into_response()
            }
        }
    }
}

/// Orchestrates gate → window → complete → append.
pub struct ChatService {
    log: ConversationLog,
    limiter: RateLimiter,
    provider: Arc<dyn CompletionProvider>,
    limits: ChatLimits,
}

impl ChatService {
    pub fn new(
        log: ConversationLog,
        limiter: RateLimiter,
        provider: Arc<dyn CompletionProvider>,
        limits: ChatLimits,
    ) -> Self {
        Self {
            log,
            limiter,
            provider,
            limits,
        }
    }

    /// Answer one chat message for `principal` in `session_id`.
    ///
    /// Both turns are recorded only after the provider answered, so a failed
    /// completion leaves the log untouched and the user free to retry.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn respond(
        &self,
        principal: &str,
        session_id: &str,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<ChatReply, ChatError> {
        if let Decision::Denied { retry_after } = self
            .limiter
            .check(
                CHAT_SCOPE,
                principal,
                self.limits.max_requests,
                self.limits.window,
            )
            .await
        {
            return Err(ChatError::RateLimited { retry_after });
        }

        let history = self
            .log
            .window(session_id, self.limits.context_window)
            .await;
        let text = self
            .provider
            .complete(system_prompt, &history, user_message)
            .await?;

        self.log.append(session_id, Role::User, user_message).await;
        self.log.append(session_id, Role::Assistant, &text).await;

        Ok(ChatReply { text })
    }
}
