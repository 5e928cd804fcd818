use std::path::Path;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::error::{SpeechError, SpeechResult};
use super::format::{format_message, message_length};
use super::SynthesisConfig;
use crate::files::{AudioFileManager, GeneratedAudioFile};
use crate::process::{CommandLine, InvocationOutcome, ProcessInvoker};

/// One text-to-speech job.
#[derive(Clone, Debug, Default)]
pub struct SynthesisRequest {
    pub text: String,
    /// Skip the character limit (sign-off phrases, admin messages).
    pub bypass_limit: bool,
    /// Recipient hint for playback; not used by the pipeline.
    pub target: Option<String>,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn bypass_limit(mut self, bypass: bool) -> Self {
        self.bypass_limit = bypass;
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// Validate → format → invoke, strictly in that order per request.
pub struct SynthesisPipeline {
    cfg: SynthesisConfig,
    invoker: Arc<dyn ProcessInvoker>,
    files: Arc<AudioFileManager>,
}

impl SynthesisPipeline {
    pub fn new(
        cfg: SynthesisConfig,
        invoker: Arc<dyn ProcessInvoker>,
        files: Arc<AudioFileManager>,
    ) -> Self {
        Self {
            cfg,
            invoker,
            files,
        }
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.cfg
    }

    pub fn files(&self) -> &Arc<AudioFileManager> {
        &self.files
    }

    pub fn check_length(&self, text: &str) -> bool {
        message_length(text) <= self.cfg.char_limit
    }

    fn validate(&self, request: &SynthesisRequest) -> SpeechResult<()> {
        if request.bypass_limit || self.check_length(&request.text) {
            return Ok(());
        }
        Err(SpeechError::MessageTooLong {
            limit: self.cfg.char_limit,
            actual: message_length(&request.text),
        })
    }

    /// `[display prefix] [shim] <exe> -w <output> <text>`
    pub fn build_command(&self, output: &Path, formatted: &str) -> CommandLine {
        let mut command = CommandLine::new(self.cfg.executable.to_string_lossy())
            .arg("-w")
            .arg(output.to_string_lossy())
            .arg(formatted);

        if let Some(shim) = &self.cfg.compatibility_shim {
            command = command.wrapped_by(std::slice::from_ref(shim));
        }

        let (envs, prefix) = self.cfg.display_parts();
        command = command.wrapped_by(&prefix);
        for (k, v) in envs {
            command = command.env(k, v);
        }
        command
    }

    /// Produce an audio file for `request`.
    ///
    /// The invocation is bounded by the configured deadline here as well as in
    /// the invoker, so a slow invoker still yields `SynthesisTimeout` on time.
    #[tracing::instrument(skip(self, request), fields(len = request.text.len(), bypass = request.bypass_limit))]
    pub async fn synthesize(&self, request: &SynthesisRequest) -> SpeechResult<GeneratedAudioFile> {
        self.validate(request)?;

        let formatted = format_message(&request.text, &self.cfg);
        let output = self
            .files
            .generate_unique_name(&self.cfg.output_extension)
            .await;
        let command = self.build_command(&output, &formatted);
        let deadline = self.cfg.timeout;
        debug!(target: "synthesis", command = %command, "Invoking synthesizer");

        let outcome = match timeout(deadline, self.invoker.run(&command, deadline)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                warn!(target: "synthesis", error = %e, program = %command.program, "Failed to launch synthesizer");
                self.files.delete(&output).await;
                return Err(SpeechError::Io(e));
            }
            Err(_) => InvocationOutcome::TimedOut,
        };

        let err = match outcome {
            InvocationOutcome::Exited(0) => {
                info!(target: "synthesis", path = %output.display(), "Built audio file");
                return Ok(GeneratedAudioFile::new(
                    output,
                    self.cfg.output_extension.clone(),
                ));
            }
            InvocationOutcome::Exited(code) => SpeechError::SynthesisFailed { code },
            InvocationOutcome::TimedOut => SpeechError::SynthesisTimeout { deadline },
            InvocationOutcome::Cancelled => SpeechError::Cancelled,
        };
        warn!(target: "synthesis", error = %err, text = %formatted, "Synthesis failed");
        self.files.delete(&output).await;
        Err(err)
    }
}
