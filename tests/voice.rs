//! Voice pipeline integration tests
//!
//! Drives the synthesis pipeline with ordinary shell processes standing in
//! for the TTS engine and the audio sink; no audio hardware needed

use std::path::Path;
use std::time::{Duration, Instant};

use futures::StreamExt;
use futures::stream::{self, BoxStream};

use kubic_assistant::voice::{
    PlaybackOutcome, ProcessSpec, SynthesisPipeline, Voice, WakeWordMatcher,
};

/// Engine that records its input to `path` and produces no audio
fn recording_engine(path: &Path) -> ProcessSpec {
    ProcessSpec::new(
        "sh",
        [
            "-c".to_string(),
            r#"cat > "$0""#.to_string(),
            path.display().to_string(),
        ],
    )
}

fn discard_sink() -> ProcessSpec {
    ProcessSpec::new("cat", Vec::<String>::new())
}

fn pipeline(tts: ProcessSpec, sink: ProcessSpec, timeout: Duration) -> SynthesisPipeline {
    let tone = ProcessSpec::new("true", Vec::<String>::new());
    SynthesisPipeline::new(tts, sink, tone, timeout).with_settle(Duration::ZERO)
}

fn chunks(items: &[&str]) -> BoxStream<'static, String> {
    let items: Vec<String> = items.iter().map(ToString::to_string).collect();
    stream::iter(items).boxed()
}

#[tokio::test]
async fn test_chunks_reach_engine_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("tts-input.txt");
    let voice = pipeline(recording_engine(&out), discard_sink(), Duration::from_secs(10));

    let report = voice
        .speak_stream(chunks(&["Hola, ", "soy \"Kubic\"", ". ¿En qué ", "te ayudo?"]))
        .await;

    assert_eq!(report.outcome, PlaybackOutcome::Completed);
    assert_eq!(report.chunks, 4);
    assert_eq!(report.text, "Hola, soy Kubic. ¿En qué te ayudo?");
    assert_eq!(
        std::fs::read_to_string(&out).unwrap(),
        "Hola, soy Kubic. ¿En qué te ayudo?"
    );
}

#[tokio::test]
async fn test_speak_folds_newlines() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("tts-input.txt");
    let voice = pipeline(recording_engine(&out), discard_sink(), Duration::from_secs(10));

    let report = voice.speak("Son las\n21:07.").await;

    assert!(report.is_success());
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "Son las 21:07.");
}

#[tokio::test]
async fn test_empty_stream_returns_promptly() {
    let voice = pipeline(
        ProcessSpec::new("cat", Vec::<String>::new()),
        discard_sink(),
        Duration::from_secs(10),
    );

    let start = Instant::now();
    let report = voice.speak_stream(stream::empty().boxed()).await;

    assert_eq!(report.outcome, PlaybackOutcome::Completed);
    assert_eq!(report.chunks, 0);
    assert!(report.text.is_empty());
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_hung_engine_is_killed_after_timeout() {
    let voice = pipeline(
        ProcessSpec::new("sleep", ["30"]),
        discard_sink(),
        Duration::from_millis(300),
    );

    let start = Instant::now();
    let report = voice.speak("hola").await;

    assert_eq!(report.outcome, PlaybackOutcome::TimedOut);
    assert!(start.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_stalled_input_is_abandoned() {
    let voice = pipeline(
        ProcessSpec::new("cat", Vec::<String>::new()),
        discard_sink(),
        Duration::from_millis(300),
    );

    let stalled = stream::once(async { "Hola".to_string() })
        .chain(stream::pending())
        .boxed();

    let start = Instant::now();
    let report = tokio::time::timeout(Duration::from_secs(5), voice.speak_stream(stalled))
        .await
        .expect("speak_stream blocked on a stalled producer");

    assert_eq!(report.outcome, PlaybackOutcome::TimedOut);
    assert_eq!(report.chunks, 1);
    assert_eq!(report.text, "Hola");
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_missing_engine_does_not_wait_on_stalled_input() {
    let voice = pipeline(
        ProcessSpec::new("/nonexistent/piper", Vec::<String>::new()),
        discard_sink(),
        Duration::from_millis(300),
    );

    let stalled = stream::once(async { "a".to_string() })
        .chain(stream::pending())
        .boxed();

    let report = tokio::time::timeout(Duration::from_secs(5), voice.speak_stream(stalled))
        .await
        .expect("speak_stream blocked on a stalled producer");

    assert_eq!(report.outcome, PlaybackOutcome::SpawnFailed);
    assert_eq!(report.chunks, 1);
}

#[tokio::test]
async fn test_sink_failure_is_reported() {
    let sink = ProcessSpec::new("sh", ["-c", "cat > /dev/null; exit 3"]);
    let voice = pipeline(
        ProcessSpec::new("cat", Vec::<String>::new()),
        sink,
        Duration::from_secs(10),
    );

    let report = voice.speak("hola").await;

    assert_eq!(
        report.outcome,
        PlaybackOutcome::Failed {
            tts: Some(0),
            sink: Some(3)
        }
    );
    assert!(!report.is_success());
}

#[tokio::test]
async fn test_engine_exit_drains_remaining_text() {
    let voice = pipeline(
        ProcessSpec::new("true", Vec::<String>::new()),
        discard_sink(),
        Duration::from_secs(10),
    );

    let slow = stream::iter(["uno", "dos", "tres"].map(String::from))
        .then(|chunk| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            chunk
        })
        .boxed();

    let report = voice.speak_stream(slow).await;

    assert_eq!(report.outcome, PlaybackOutcome::Broken);
    assert_eq!(report.chunks, 3);
    assert!(report.text.is_empty());
}

#[tokio::test]
async fn test_missing_engine_drains_input() {
    let voice = pipeline(
        ProcessSpec::new("/nonexistent/piper", Vec::<String>::new()),
        discard_sink(),
        Duration::from_secs(10),
    );

    let report = voice.speak_stream(chunks(&["a", "b"])).await;

    assert_eq!(report.outcome, PlaybackOutcome::SpawnFailed);
    assert_eq!(report.chunks, 2);
}

#[tokio::test]
async fn test_play_tone_runs_tone_command() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("played");
    let tone = ProcessSpec::new("touch", [marker.display().to_string()]);
    let voice = SynthesisPipeline::new(
        discard_sink(),
        discard_sink(),
        tone,
        Duration::from_secs(10),
    )
    .with_settle(Duration::ZERO);

    voice.play_tone().await;
    assert!(marker.exists());
}

#[test]
fn test_wake_word_substring_match() {
    let matcher = WakeWordMatcher::new("  Hola ", false);

    assert_eq!(matcher.wake_word(), "hola");
    assert!(matcher.matches("HOLA kubic"));
    assert!(matcher.matches("holanda"));
    assert!(!matcher.matches("adiós"));
}

#[test]
fn test_wake_word_strict_match() {
    let matcher = WakeWordMatcher::new("hola kubic", true);

    assert!(matcher.is_strict());
    assert!(matcher.matches("oye hola kubic qué tal"));
    assert!(!matcher.matches("hola kubicos"));
    assert!(!matcher.matches("kubic hola"));
}
