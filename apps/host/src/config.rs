use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use orator_core::{ModuleRuntimeConfig, RestartPolicy, SynthesisConfig};

/// High-level configuration for the Orator host
#[derive(Clone, Debug)]
pub struct HostConfig {
    /// Command prefix, e.g. `\` in `\say hello`
    pub activation: String,
    pub description: String,
    pub version: String,
    pub synthesis: SynthesisConfig,
    pub modules: ModuleRuntimeConfig,
    pub playback: PlaybackConfig,
    /// Spoken when leaving an idle voice channel
    pub channel_timeout_phrases: Vec<String>,
    pub restart: RestartPolicy,
}

/// Local player used by the console playback
#[derive(Clone, Debug, Default)]
pub struct PlaybackConfig {
    /// e.g. `aplay` or `afplay`; files are only logged when unset
    pub player: Option<String>,
    pub player_timeout_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            activation: std::env::var("ORATOR_ACTIVATION").unwrap_or_else(|_| "\\".to_string()),
            description: "A retro TTS bot".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            synthesis: SynthesisConfig::default(),
            modules: ModuleRuntimeConfig::default(),
            playback: PlaybackConfig {
                player: std::env::var("ORATOR_PLAYER").ok().filter(|s| !s.is_empty()),
                player_timeout_ms: 60_000,
            },
            channel_timeout_phrases: vec![
                "Alright, I'm heading out.".to_string(),
                "Bye for now.".to_string(),
                "I'll be back.".to_string(),
            ],
            restart: RestartPolicy::default(),
        }
    }
}

impl HostConfig {
    /// Load configuration from a TOML file (path via ORATOR_CONFIG or ./orator.toml),
    /// overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let path = std::env::var("ORATOR_CONFIG").unwrap_or_else(|_| "orator.toml".into());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(p: &Path) -> Self {
        let default = Self::default();
        if !p.exists() {
            tracing::info!(target = "orator_host", path = %p.display(), "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(p) {
            Ok(s) => match toml::from_str::<HostToml>(&s) {
                Ok(t) => t.overlay(default),
                Err(e) => {
                    tracing::warn!(target = "orator_host", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target = "orator_host", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct HostToml {
    pub activation: Option<String>,
    pub description: Option<String>,
    pub channel_timeout_phrases: Option<Vec<String>>,
    pub speech: Option<SpeechToml>,
    pub modules: Option<ModulesToml>,
    pub playback: Option<PlaybackToml>,
    pub restart: Option<RestartToml>,
}

impl HostToml {
    fn overlay(self, mut base: HostConfig) -> HostConfig {
        if let Some(x) = self.activation {
            base.activation = x;
        }
        if let Some(x) = self.description {
            base.description = x;
        }
        if let Some(x) = self.channel_timeout_phrases {
            base.channel_timeout_phrases = x.into_iter().filter(|p| !p.trim().is_empty()).collect();
        }
        if let Some(s) = self.speech {
            s.apply(&mut base.synthesis);
        }
        if let Some(m) = self.modules {
            m.apply(&mut base.modules);
        }
        if let Some(p) = self.playback {
            p.apply(&mut base.playback);
        }
        if let Some(r) = self.restart {
            r.apply(&mut base.restart);
        }
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct SpeechToml {
    pub executable: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub prepend: Option<String>,
    pub append: Option<String>,
    pub char_limit: Option<usize>,
    pub newline_replacement: Option<String>,
    pub output_extension: Option<String>,
    /// Empty string disables the shim
    pub compatibility_shim: Option<String>,
    pub display_prefix: Option<String>,
    pub headless: Option<bool>,
    pub timeout_ms: Option<u64>,
}
impl SpeechToml {
    fn apply(self, s: &mut SynthesisConfig) {
        if let Some(x) = self.executable {
            s.executable = x;
        }
        if let Some(x) = self.output_dir {
            s.output_dir = x;
        }
        if let Some(x) = self.prepend {
            s.prepend = x;
        }
        if let Some(x) = self.append {
            s.append = x;
        }
        if let Some(x) = self.char_limit {
            s.char_limit = x;
        }
        if let Some(x) = self.newline_replacement {
            s.newline_replacement = x;
        }
        if let Some(x) = self.output_extension {
            s.output_extension = x.trim_start_matches('.').to_string();
        }
        if let Some(x) = self.compatibility_shim {
            s.compatibility_shim = Some(x).filter(|v| !v.is_empty());
        }
        if let Some(x) = self.display_prefix {
            s.display_prefix = x;
        }
        if let Some(x) = self.headless {
            s.headless = x;
        }
        if let Some(x) = self.timeout_ms {
            s.timeout = Duration::from_millis(x);
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct ModulesToml {
    pub dir: Option<PathBuf>,
    pub unit_suffix: Option<String>,
}
impl ModulesToml {
    fn apply(self, m: &mut ModuleRuntimeConfig) {
        if let Some(x) = self.dir {
            m.modules_dir = x;
        }
        if let Some(x) = self.unit_suffix {
            m.unit_suffix = x;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct PlaybackToml {
    pub player: Option<String>,
    pub player_timeout_ms: Option<u64>,
}
impl PlaybackToml {
    fn apply(self, p: &mut PlaybackConfig) {
        if let Some(x) = self.player {
            p.player = Some(x).filter(|v| !v.is_empty());
        }
        if let Some(x) = self.player_timeout_ms {
            p.player_timeout_ms = x;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct RestartToml {
    pub max_restarts: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
}
impl RestartToml {
    fn apply(self, r: &mut RestartPolicy) {
        if let Some(x) = self.max_restarts {
            r.max_restarts = x;
        }
        if let Some(x) = self.initial_backoff_ms {
            r.initial_backoff = Duration::from_millis(x);
        }
        if let Some(x) = self.max_backoff_ms {
            r.max_backoff = Duration::from_millis(x);
        }
    }
}
