//! Tests for the command TTS engine

use farsight_spk::config::{CommandConfig, VoiceConfig};
use farsight_spk::engines::{CommandTtsEngine, TtsEngine};
use farsight_spk::error::SpeechError;

#[test]
fn test_empty_program_rejected() {
    let result = CommandTtsEngine::new(CommandConfig {
        program: String::new(),
        args: vec![],
    });
    assert!(matches!(result, Err(SpeechError::Config(_))));
}

#[tokio::test]
async fn test_missing_program_is_engine_error() {
    let engine = CommandTtsEngine::new(CommandConfig {
        program: "farsight-no-such-speech-program".to_string(),
        args: vec![],
    })
    .unwrap();
    let result = engine.speak("hello", &VoiceConfig::default()).await;
    assert!(matches!(result, Err(SpeechError::Engine(_))));
}

#[tokio::test]
async fn test_blank_text_rejected() {
    let engine = CommandTtsEngine::new(CommandConfig {
        program: "true".to_string(),
        args: vec![],
    })
    .unwrap();
    let result = engine.speak("\n\t", &VoiceConfig::default()).await;
    assert!(matches!(result, Err(SpeechError::Synthesizer(_))));
}

#[cfg(unix)]
#[tokio::test]
async fn test_text_passed_as_last_argument() {
    let dir = tempfile::TempDir::new().unwrap();
    let out = dir.path().join("spoken.txt");

    // sh -c SCRIPT NAME TEXT: TEXT becomes $1
    let engine = CommandTtsEngine::new(CommandConfig {
        program: "sh".to_string(),
        args: vec![
            "-c".to_string(),
            format!("printf '%s' \"$1\" > '{}'", out.display()),
            "speak".to_string(),
        ],
    })
    .unwrap();

    engine
        .speak("person too close to you\nahead of you.", &VoiceConfig::default())
        .await
        .unwrap();

    let spoken = std::fs::read_to_string(&out).unwrap();
    assert_eq!(spoken, "person too close to you ahead of you.");
    assert_eq!(engine.name(), "command");
    assert!(engine.list_voices().await.unwrap().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn test_failing_program_reports_status() {
    let engine = CommandTtsEngine::new(CommandConfig {
        program: "sh".to_string(),
        args: vec!["-c".to_string(), "echo broken >&2; exit 3".to_string(), "speak".to_string()],
    })
    .unwrap();
    match engine.speak("hello", &VoiceConfig::default()).await {
        Err(SpeechError::Engine(msg)) => assert!(msg.contains("broken")),
        other => panic!("expected engine error, got {:?}", other),
    }
}
