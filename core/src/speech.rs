//! Speech facade: synthesis output handed to the playback collaborator.

use rand::seq::SliceRandom;
use std::sync::{Arc, Mutex};
use tracing::{error, warn};

use crate::collab::{completion, AudioPlayback, CommandContext, CompletionCallback, ServerState};
use crate::files::GeneratedAudioFile;
use crate::synthesis::{SpeechError, SpeechResult, SynthesisPipeline, SynthesisRequest};

pub struct SpeechService {
    pipeline: Arc<SynthesisPipeline>,
    playback: Arc<dyn AudioPlayback>,
    channel_timeout_phrases: Vec<String>,
}

impl SpeechService {
    pub fn new(pipeline: Arc<SynthesisPipeline>, playback: Arc<dyn AudioPlayback>) -> Self {
        Self {
            pipeline,
            playback,
            channel_timeout_phrases: Vec::new(),
        }
    }

    /// Sign-off phrases spoken when the bot leaves an idle channel.
    pub fn with_channel_timeout_phrases(mut self, phrases: Vec<String>) -> Self {
        self.channel_timeout_phrases = phrases;
        self
    }

    pub fn pipeline(&self) -> &Arc<SynthesisPipeline> {
        &self.pipeline
    }

    pub fn char_limit(&self) -> usize {
        self.pipeline.config().char_limit
    }

    /// Turn text into an audio file for later playing.
    pub async fn build(&self, request: SynthesisRequest) -> SpeechResult<GeneratedAudioFile> {
        self.pipeline.synthesize(&request).await
    }

    /// Build and queue for playback. The file is released by the player via
    /// [`AudioFileManager::delete`](crate::files::AudioFileManager::delete).
    pub async fn say(
        &self,
        ctx: &CommandContext,
        text: &str,
        target: Option<&str>,
        bypass_limit: bool,
    ) -> SpeechResult<()> {
        let request = SynthesisRequest {
            text: text.to_string(),
            bypass_limit,
            target: target.map(str::to_string),
        };
        let file = match self.build(request).await {
            Ok(f) => f,
            Err(e) => {
                match &e {
                    SpeechError::MessageTooLong { limit, actual } => {
                        warn!(target: "speech", limit, actual, "Unable to build too long message")
                    }
                    other => error!(target: "speech", error = %other, "Unable to build audio file"),
                }
                return Err(e);
            }
        };
        self.playback.play_audio(ctx, file.path(), target).await
    }

    /// Speak a random sign-off phrase; `on_complete` runs whatever happens.
    pub async fn play_channel_timeout_message(&self, state: &ServerState, on_complete: CompletionCallback) {
        let phrase = self
            .channel_timeout_phrases
            .choose(&mut rand::thread_rng())
            .cloned();
        let Some(phrase) = phrase else {
            on_complete().await;
            return;
        };

        let file = match self
            .build(SynthesisRequest::new(phrase).bypass_limit(true))
            .await
        {
            Ok(f) => f,
            Err(e) => {
                error!(target: "speech", error = %e, "Exception during channel sign-off");
                on_complete().await;
                return;
            }
        };

        // Run `on_complete` exactly once, whether or not the player accepted it.
        let slot = Arc::new(Mutex::new(Some(on_complete)));
        let shared = slot.clone();
        let forwarded = completion(move || async move {
            let callback = shared.lock().ok().and_then(|mut g| g.take());
            if let Some(callback) = callback {
                callback().await;
            }
        });

        if let Err(e) = self
            .playback
            .play_via_server_state(state, file.path(), forwarded)
            .await
        {
            error!(target: "speech", error = %e, "Exception during channel sign-off playback");
            let callback = slot.lock().ok().and_then(|mut g| g.take());
            if let Some(callback) = callback {
                callback().await;
            }
        }
    }
}
