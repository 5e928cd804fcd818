//! Boundaries to the collaborators the core hands work to: audio playback and
//! diagnostics recording.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::synthesis::SpeechResult;

/// Who asked for something, and where.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandContext {
    pub author_id: String,
    pub channel_id: String,
    pub server_id: Option<String>,
    /// Full command text as received.
    pub content: String,
}

impl CommandContext {
    /// How the platform addresses the author, e.g. `<@1234>`.
    pub fn mention(&self) -> String {
        format!("<@{}>", self.author_id)
    }
}

/// Per-server voice state handed to playback without a command context.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServerState {
    pub server_id: String,
    pub voice_channel_id: Option<String>,
}

/// Runs after server-state playback finishes (or fails).
pub type CompletionCallback = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// Box an async closure as a [`CompletionCallback`].
pub fn completion<F, Fut>(f: F) -> CompletionCallback
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Box::new(move || -> Pin<Box<dyn Future<Output = ()> + Send>> { Box::pin(f()) })
}

/// Audio playback queue/mixer. Consumers call back into
/// [`AudioFileManager::delete`](crate::files::AudioFileManager::delete) once a file
/// has been played.
#[async_trait]
pub trait AudioPlayback: Send + Sync {
    async fn play_audio(
        &self,
        ctx: &CommandContext,
        path: &Path,
        target: Option<&str>,
    ) -> SpeechResult<()>;

    async fn play_via_server_state(
        &self,
        state: &ServerState,
        path: &Path,
        on_complete: CompletionCallback,
    ) -> SpeechResult<()>;
}

/// A failed dispatch attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    pub timestamp: DateTime<Utc>,
    pub author_id: String,
    pub channel_id: String,
    pub content: String,
    pub origin: String,
    pub success: bool,
    pub error: Option<String>,
}

/// Fire-and-forget diagnostics recording. Must never block the caller.
pub trait DiagnosticsSink: Send + Sync {
    fn record(&self, event: DiagnosticEvent);
}

/// Sink that queues events to a background task which logs them.
pub struct ChannelDiagnosticsSink {
    tx: mpsc::UnboundedSender<DiagnosticEvent>,
}

impl ChannelDiagnosticsSink {
    /// Must be called inside a tokio runtime.
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<DiagnosticEvent>();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match serde_json::to_string(&event) {
                    Ok(json) => debug!(target: "diagnostics", event = %json, "Recorded diagnostic event"),
                    Err(e) => warn!(target: "diagnostics", error = %e, "Unserializable diagnostic event"),
                }
            }
        });
        Self { tx }
    }

    pub fn from_sender(tx: mpsc::UnboundedSender<DiagnosticEvent>) -> Self {
        Self { tx }
    }
}

impl DiagnosticsSink for ChannelDiagnosticsSink {
    fn record(&self, event: DiagnosticEvent) {
        if self.tx.send(event).is_err() {
            warn!(target: "diagnostics", "Diagnostics receiver gone; dropping event");
        }
    }
}

/// Turns a failed command into a diagnostic event and a reply for the user.
pub struct CommandErrorReporter {
    sink: Arc<dyn DiagnosticsSink>,
    activation: String,
}

impl CommandErrorReporter {
    pub fn new(sink: Arc<dyn DiagnosticsSink>, activation: impl Into<String>) -> Self {
        Self {
            sink,
            activation: activation.into(),
        }
    }

    pub fn report(&self, ctx: &CommandContext, invoked_with: &str, error: &str) -> String {
        self.sink.record(DiagnosticEvent {
            timestamp: Utc::now(),
            author_id: ctx.author_id.clone(),
            channel_id: ctx.channel_id.clone(),
            content: ctx.content.clone(),
            origin: "on_command_error".to_string(),
            success: false,
            error: Some(error.to_string()),
        });

        // Platform errors carry "code =" in their text.
        if error.contains("code =") {
            format!(
                "Sorry {}, the chat platform is having some issues that won't let me speak right now.",
                ctx.mention()
            )
        } else {
            format!(
                "Sorry {}, **{}{}** isn't a valid command. Try the **{}help** page.",
                ctx.mention(),
                self.activation,
                invoked_with,
                self.activation
            )
        }
    }
}
