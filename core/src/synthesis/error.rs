use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("Message is {actual} characters long when it should be at most {limit}")]
    MessageTooLong { limit: usize, actual: usize },

    #[error("Building audio file timed out after {}ms", deadline.as_millis())]
    SynthesisTimeout { deadline: Duration },

    #[error("Couldn't build the audio file, exit code {code}")]
    SynthesisFailed { code: i32 },

    #[error("Synthesis cancelled")]
    Cancelled,

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SpeechResult<T> = Result<T, SpeechError>;

impl SpeechError {
    /// Reply shown to the requesting user; `mention` addresses them.
    pub fn user_message(&self, mention: &str) -> String {
        match self {
            SpeechError::MessageTooLong { limit, .. } => format!(
                "Wow, {}, that's waaay too much! You've gotta keep messages shorter than {} characters.",
                mention, limit
            ),
            SpeechError::SynthesisTimeout { .. } => format!(
                "Sorry, {}, I wasn't able to generate speech for that.",
                mention
            ),
            _ => format!("Sorry, {}, I can't say that right now.", mention),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_long_message_mentions_limit() {
        let e = SpeechError::MessageTooLong {
            limit: 1250,
            actual: 2000,
        };
        let msg = e.user_message("<@42>");
        assert!(msg.contains("<@42>"));
        assert!(msg.contains("1250"));
    }

    #[test]
    fn failures_share_generic_reply() {
        let msg = SpeechError::SynthesisFailed { code: 1 }.user_message("<@1>");
        assert_eq!(msg, "Sorry, <@1>, I can't say that right now.");
    }
}
