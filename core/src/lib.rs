// Orator Core Library
// Module runtime and speech synthesis for a chat-bot host

pub mod collab;
pub mod files;
pub mod module;
pub mod process;
pub mod speech;
pub mod supervisor;
pub mod synthesis;

pub(crate) mod util;

// Export core types
pub use collab::{AudioPlayback, CommandContext, CommandErrorReporter, DiagnosticsSink, ServerState};
pub use files::{AudioFileManager, GeneratedAudioFile};
pub use module::{ModuleError, ModuleLifecycle, ModuleRegistry, ModuleRuntime, ModuleRuntimeConfig};
pub use process::{CommandLine, InvocationOutcome, ProcessInvoker, TokioProcessInvoker};
pub use speech::SpeechService;
pub use supervisor::RestartPolicy;
pub use synthesis::{SpeechError, SynthesisConfig, SynthesisPipeline, SynthesisRequest};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OratorError {
    #[error("Module error: {0}")]
    Module(#[from] ModuleError),

    #[error("Speech error: {0}")]
    Speech(#[from] SpeechError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    /// Not worth restarting for.
    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl OratorError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, OratorError::Fatal(_) | OratorError::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, OratorError>;
