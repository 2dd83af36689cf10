//! TTS engine implementations

pub mod command;
pub mod native;

use crate::config::{SpeechConfig, VoiceConfig};
use crate::error::SpeechError;
use async_trait::async_trait;
use std::sync::Arc;

pub use command::CommandTtsEngine;
pub use native::NativeTtsEngine;

/// Trait for TTS engines
#[async_trait]
pub trait TtsEngine: Send + Sync {
    /// Speak `text` aloud, returning once playback has finished
    async fn speak(&self, text: &str, voice: &VoiceConfig) -> Result<(), SpeechError>;

    /// Get available voices
    async fn list_voices(&self) -> Result<Vec<String>, SpeechError>;

    /// Check if engine is available
    fn is_available(&self) -> bool;

    /// Get engine name
    fn name(&self) -> &str;
}

/// Build the engine selected by `config`
pub fn create_engine(config: &SpeechConfig) -> Result<Arc<dyn TtsEngine>, SpeechError> {
    match config.engine {
        crate::config::TtsEngine::Native => Ok(Arc::new(NativeTtsEngine::new_with_config(
            config.rate,
            config.volume,
            config.pitch,
        ))),
        crate::config::TtsEngine::Command => {
            let command = config.command.clone().ok_or_else(|| {
                SpeechError::Config("Command engine selected but no command configured".to_string())
            })?;
            Ok(Arc::new(CommandTtsEngine::new(command)?))
        }
    }
}

/// Strip control characters, keeping line breaks as spaces
pub fn sanitize_text(text: &str) -> String {
    text.chars()
        .map(|c| if c == '\n' || c == '\r' || c == '\t' { ' ' } else { c })
        .filter(|c| !c.is_control())
        .take(MAX_TEXT_LEN)
        .collect::<String>()
        .trim()
        .to_string()
}

pub(crate) const MAX_TEXT_LEN: usize = 100_000;
