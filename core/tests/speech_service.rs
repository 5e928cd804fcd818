//! SpeechService against a recording playback collaborator

use async_trait::async_trait;
use orator_core::collab::{completion, AudioPlayback, CommandContext, CompletionCallback, ServerState};
use orator_core::files::AudioFileManager;
use orator_core::process::{CommandLine, InvocationOutcome, ProcessInvoker};
use orator_core::synthesis::{SpeechError, SpeechResult, SynthesisConfig, SynthesisPipeline};
use orator_core::SpeechService;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct FixedExit(i32);

#[async_trait]
impl ProcessInvoker for FixedExit {
    async fn run(&self, _command: &CommandLine, _deadline: Duration) -> io::Result<InvocationOutcome> {
        Ok(InvocationOutcome::Exited(self.0))
    }
}

#[derive(Default)]
struct RecordingPlayback {
    played: Mutex<Vec<(PathBuf, Option<String>)>>,
    fail_server_state: bool,
    run_callback: bool,
}

#[async_trait]
impl AudioPlayback for RecordingPlayback {
    async fn play_audio(
        &self,
        _ctx: &CommandContext,
        path: &Path,
        target: Option<&str>,
    ) -> SpeechResult<()> {
        self.played
            .lock()
            .unwrap()
            .push((path.to_path_buf(), target.map(str::to_string)));
        Ok(())
    }

    async fn play_via_server_state(
        &self,
        _state: &ServerState,
        path: &Path,
        on_complete: CompletionCallback,
    ) -> SpeechResult<()> {
        if self.fail_server_state {
            return Err(SpeechError::Playback("not connected".into()));
        }
        self.played.lock().unwrap().push((path.to_path_buf(), None));
        if self.run_callback {
            on_complete().await;
        }
        Ok(())
    }
}

fn service(dir: &Path, exit: i32, playback: Arc<RecordingPlayback>) -> SpeechService {
    let cfg = SynthesisConfig {
        executable: PathBuf::from("say"),
        output_dir: dir.to_path_buf(),
        char_limit: 20,
        compatibility_shim: None,
        ..SynthesisConfig::default()
    };
    let pipeline = SynthesisPipeline::new(
        cfg,
        Arc::new(FixedExit(exit)),
        Arc::new(AudioFileManager::new(dir)),
    );
    SpeechService::new(Arc::new(pipeline), playback)
        .with_channel_timeout_phrases(vec!["Bye for now".into(), "See you".into()])
}

fn ctx() -> CommandContext {
    CommandContext {
        author_id: "42".into(),
        channel_id: "general".into(),
        server_id: Some("guild".into()),
        content: "\\say hi".into(),
    }
}

fn counting_callback(counter: &Arc<AtomicUsize>) -> CompletionCallback {
    let c = counter.clone();
    completion(move || async move {
        c.fetch_add(1, Ordering::SeqCst);
    })
}

#[tokio::test]
async fn say_hands_file_to_playback() {
    let tmp = tempfile::tempdir().unwrap();
    let playback = Arc::new(RecordingPlayback::default());
    let speech = service(tmp.path(), 0, playback.clone());

    speech.say(&ctx(), "hello", Some("bob"), false).await.unwrap();

    let played = playback.played.lock().unwrap();
    assert_eq!(played.len(), 1);
    assert!(played[0].0.starts_with(tmp.path()));
    assert_eq!(played[0].1.as_deref(), Some("bob"));
}

#[tokio::test]
async fn say_rejects_long_text_without_playing() {
    let tmp = tempfile::tempdir().unwrap();
    let playback = Arc::new(RecordingPlayback::default());
    let speech = service(tmp.path(), 0, playback.clone());

    let err = speech
        .say(&ctx(), "this message is far too long", None, false)
        .await
        .unwrap_err();

    assert!(err.user_message(&ctx().mention()).contains("20 characters"));
    assert!(playback.played.lock().unwrap().is_empty());
}

#[tokio::test]
async fn say_bypass_allows_long_text() {
    let tmp = tempfile::tempdir().unwrap();
    let playback = Arc::new(RecordingPlayback::default());
    let speech = service(tmp.path(), 0, playback.clone());

    speech
        .say(&ctx(), "this message is far too long", None, true)
        .await
        .unwrap();
    assert_eq!(playback.played.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn sign_off_plays_and_completes_once() {
    let tmp = tempfile::tempdir().unwrap();
    let playback = Arc::new(RecordingPlayback {
        run_callback: true,
        ..Default::default()
    });
    let speech = service(tmp.path(), 0, playback.clone());
    let done = Arc::new(AtomicUsize::new(0));

    speech
        .play_channel_timeout_message(&ServerState::default(), counting_callback(&done))
        .await;

    assert_eq!(playback.played.lock().unwrap().len(), 1);
    assert_eq!(done.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn sign_off_completes_when_synthesis_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let playback = Arc::new(RecordingPlayback::default());
    let speech = service(tmp.path(), 1, playback.clone());
    let done = Arc::new(AtomicUsize::new(0));

    speech
        .play_channel_timeout_message(&ServerState::default(), counting_callback(&done))
        .await;

    assert!(playback.played.lock().unwrap().is_empty());
    assert_eq!(done.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn sign_off_completes_when_playback_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let playback = Arc::new(RecordingPlayback {
        fail_server_state: true,
        ..Default::default()
    });
    let speech = service(tmp.path(), 0, playback);
    let done = Arc::new(AtomicUsize::new(0));

    speech
        .play_channel_timeout_message(&ServerState::default(), counting_callback(&done))
        .await;

    assert_eq!(done.load(Ordering::SeqCst), 1);
}
