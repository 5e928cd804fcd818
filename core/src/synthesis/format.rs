//! Message decoration applied before text reaches the synthesizer.

use super::SynthesisConfig;

/// Newlines → placeholder, prepend, append, then drop `"` so the text can
/// never break out of a quoted command-line argument.
pub fn format_message(text: &str, cfg: &SynthesisConfig) -> String {
    let mut message = if cfg.newline_replacement.is_empty() {
        text.to_string()
    } else {
        text.replace('\n', &cfg.newline_replacement)
    };

    if !cfg.prepend.is_empty() {
        message.insert_str(0, &cfg.prepend);
    }
    if !cfg.append.is_empty() {
        message.push_str(&cfg.append);
    }

    message.retain(|c| c != '"');
    message
}

/// Character count as the user sees it (not bytes).
pub fn message_length(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SynthesisConfig {
        SynthesisConfig {
            prepend: "[:phoneme on]".into(),
            append: "".into(),
            newline_replacement: "[_<250,10>]".into(),
            ..SynthesisConfig::default()
        }
    }

    #[test]
    fn replaces_newlines_and_prepends() {
        let out = format_message("hello\nworld", &cfg());
        assert_eq!(out, "[:phoneme on]hello[_<250,10>]world");
    }

    #[test]
    fn strips_double_quotes_everywhere() {
        let mut c = cfg();
        c.append = "\"end\"".into();
        let out = format_message("say \"hi\"", &c);
        assert!(!out.contains('"'));
        assert!(out.ends_with("end"));
    }

    #[test]
    fn empty_replacement_keeps_newlines() {
        let mut c = cfg();
        c.newline_replacement = String::new();
        c.prepend = String::new();
        assert_eq!(format_message("a\nb", &c), "a\nb");
    }

    #[test]
    fn length_counts_chars() {
        assert_eq!(message_length("héllo"), 5);
    }
}
