//! Error types for farsight-spk

use thiserror::Error;

/// Speech errors
#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("Synthesizer error: {0}")]
    Synthesizer(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speech_error_display() {
        let err = SpeechError::Engine("espeak-ng not available".to_string());
        assert_eq!(err.to_string(), "Engine error: espeak-ng not available");
    }

    #[test]
    fn test_speech_error_from_io() {
        let err: SpeechError = std::io::Error::new(std::io::ErrorKind::NotFound, "say").into();
        assert!(matches!(err, SpeechError::Io(_)));
    }
}
