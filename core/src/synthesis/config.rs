use std::path::PathBuf;
use std::time::Duration;

/// Settings for the external synthesizer and the text it receives.
///
/// `Default` honours env overrides:
/// - ORATOR_TTS_BIN, ORATOR_TTS_OUTPUT_DIR
/// - ORATOR_TTS_TIMEOUT_MS, ORATOR_CHAR_LIMIT
#[derive(Clone, Debug)]
pub struct SynthesisConfig {
    pub executable: PathBuf,
    pub output_dir: PathBuf,
    /// Control sequence placed in front of every message.
    pub prepend: String,
    pub append: String,
    pub char_limit: usize,
    /// Replaces `\n`; empty disables replacement.
    pub newline_replacement: String,
    pub output_extension: String,
    /// Program used to run a foreign-platform executable (e.g. `wine`).
    pub compatibility_shim: Option<String>,
    /// Only applied when `headless` is set. `KEY=VALUE` tokens become child
    /// environment variables, anything else a program prefix.
    pub display_prefix: String,
    pub headless: bool,
    pub timeout: Duration,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        let executable = std::env::var("ORATOR_TTS_BIN")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("say.exe"));
        let output_dir = std::env::var("ORATOR_TTS_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("temp"));
        let timeout_ms = std::env::var("ORATOR_TTS_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(3_000);
        let char_limit = std::env::var("ORATOR_CHAR_LIMIT")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(1250);
        let compatibility_shim = default_shim(&executable);

        Self {
            executable,
            output_dir,
            prepend: "[:phoneme on]".to_string(),
            append: String::new(),
            char_limit,
            newline_replacement: "[_<250,10>]".to_string(),
            output_extension: "wav".to_string(),
            compatibility_shim,
            display_prefix: "DISPLAY=:0.0".to_string(),
            headless: false,
            timeout: Duration::from_millis(timeout_ms),
        }
    }
}

/// Windows executables need `wine` on Linux.
fn default_shim(executable: &std::path::Path) -> Option<String> {
    let is_exe = executable
        .extension()
        .map(|e| e.eq_ignore_ascii_case("exe"))
        .unwrap_or(false);
    if cfg!(target_os = "linux") && is_exe {
        Some("wine".to_string())
    } else {
        None
    }
}

impl SynthesisConfig {
    /// Split the display prefix into `(envs, program prefix)`.
    pub(crate) fn display_parts(&self) -> (Vec<(String, String)>, Vec<String>) {
        let mut envs = Vec::new();
        let mut prefix = Vec::new();
        if !self.headless {
            return (envs, prefix);
        }
        for token in self.display_prefix.split_whitespace() {
            match token.split_once('=') {
                Some((k, v)) if prefix.is_empty() && !k.is_empty() => {
                    envs.push((k.to_string(), v.to_string()))
                }
                _ => prefix.push(token.to_string()),
            }
        }
        (envs, prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefix_ignored_unless_headless() {
        let cfg = SynthesisConfig {
            headless: false,
            ..SynthesisConfig::default()
        };
        let (envs, prefix) = cfg.display_parts();
        assert!(envs.is_empty());
        assert!(prefix.is_empty());
    }

    #[test]
    fn display_prefix_env_assignment() {
        let cfg = SynthesisConfig {
            headless: true,
            display_prefix: "DISPLAY=:0.0".into(),
            ..SynthesisConfig::default()
        };
        let (envs, prefix) = cfg.display_parts();
        assert_eq!(envs, vec![("DISPLAY".to_string(), ":0.0".to_string())]);
        assert!(prefix.is_empty());
    }

    #[test]
    fn display_prefix_program_wrapper() {
        let cfg = SynthesisConfig {
            headless: true,
            display_prefix: "xvfb-run -a".into(),
            ..SynthesisConfig::default()
        };
        let (envs, prefix) = cfg.display_parts();
        assert!(envs.is_empty());
        assert_eq!(prefix, vec!["xvfb-run", "-a"]);
    }

    #[test]
    fn shim_only_for_exe() {
        assert_eq!(default_shim(std::path::Path::new("espeak-ng")), None);
        if cfg!(target_os = "linux") {
            assert_eq!(default_shim(std::path::Path::new("say.exe")).as_deref(), Some("wine"));
        }
    }
}
