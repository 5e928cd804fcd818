use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use orator_core::collab::{AudioPlayback, CommandContext, CompletionCallback, ServerState};
use orator_core::files::AudioFileManager;
use orator_core::process::{CommandLine, InvocationOutcome, ProcessInvoker};
use orator_core::synthesis::{SpeechError, SpeechResult};

use crate::config::PlaybackConfig;

/// Plays files one at a time through a local player, then deletes them.
pub struct ConsolePlayback {
    cfg: PlaybackConfig,
    invoker: Arc<dyn ProcessInvoker>,
    files: Arc<AudioFileManager>,
    // One speaker.
    queue: tokio::sync::Mutex<()>,
}

impl ConsolePlayback {
    pub fn new(
        cfg: PlaybackConfig,
        invoker: Arc<dyn ProcessInvoker>,
        files: Arc<AudioFileManager>,
    ) -> Self {
        Self {
            cfg,
            invoker,
            files,
            queue: tokio::sync::Mutex::new(()),
        }
    }

    async fn play(&self, path: &Path) -> SpeechResult<()> {
        let _speaker = self.queue.lock().await;
        let result = match &self.cfg.player {
            None => {
                info!(target = "orator_host", path = %path.display(), "Audio ready (no player configured)");
                Ok(())
            }
            Some(player) => {
                let command = CommandLine::new(player.clone()).arg(path.to_string_lossy());
                let deadline = Duration::from_millis(self.cfg.player_timeout_ms);
                match self.invoker.run(&command, deadline).await {
                    Ok(InvocationOutcome::Exited(0)) => Ok(()),
                    Ok(other) => Err(SpeechError::Playback(format!("player ended with {:?}", other))),
                    Err(e) => Err(SpeechError::Playback(e.to_string())),
                }
            }
        };
        self.files.delete(path).await;
        result
    }
}

#[async_trait]
impl AudioPlayback for ConsolePlayback {
    async fn play_audio(
        &self,
        ctx: &CommandContext,
        path: &Path,
        target: Option<&str>,
    ) -> SpeechResult<()> {
        info!(target = "orator_host", author = %ctx.author_id, target_user = ?target, "Queued audio");
        self.play(path).await
    }

    async fn play_via_server_state(
        &self,
        state: &ServerState,
        path: &Path,
        on_complete: CompletionCallback,
    ) -> SpeechResult<()> {
        let played = self.play(path).await;
        if let Err(e) = &played {
            warn!(target = "orator_host", server = %state.server_id, error = %e, "Sign-off playback failed");
        }
        on_complete().await;
        played
    }
}
