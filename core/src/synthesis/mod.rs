//! Text-to-speech synthesis through an external CLI engine
//!
//! A request moves through `Validating → Formatting → Invoking` and ends with
//! either a [`GeneratedAudioFile`](crate::files::GeneratedAudioFile) in the
//! output directory or a typed [`SpeechError`]:
//! - text longer than `char_limit` (unless bypassed) never spawns a process
//! - newlines become a pause placeholder, `"` is stripped
//! - exit code 0 is the only success signal
//!
//! Env overrides (see [`SynthesisConfig`]):
//! - ORATOR_TTS_BIN, ORATOR_TTS_OUTPUT_DIR
//! - ORATOR_TTS_TIMEOUT_MS, ORATOR_CHAR_LIMIT

mod config;
mod error;
pub mod format;
mod pipeline;

pub use config::SynthesisConfig;
pub use error::{SpeechError, SpeechResult};
pub use pipeline::{SynthesisPipeline, SynthesisRequest};
