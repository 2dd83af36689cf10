//! User-configured speech program

use crate::config::{CommandConfig, VoiceConfig};
use crate::engines::{sanitize_text, TtsEngine, MAX_TEXT_LEN};
use crate::error::SpeechError;
use async_trait::async_trait;
use std::process::Stdio;
use tracing::debug;

/// Runs `program args... <text>` for every utterance
pub struct CommandTtsEngine {
    command: CommandConfig,
}

impl CommandTtsEngine {
    pub fn new(command: CommandConfig) -> Result<Self, SpeechError> {
        command.validate().map_err(SpeechError::Config)?;
        Ok(Self { command })
    }

    pub fn command(&self) -> &CommandConfig {
        &self.command
    }
}

#[async_trait]
impl TtsEngine for CommandTtsEngine {
    async fn speak(&self, text: &str, _voice: &VoiceConfig) -> Result<(), SpeechError> {
        if text.len() > MAX_TEXT_LEN {
            return Err(SpeechError::Synthesizer("Text too long (max 100KB)".to_string()));
        }
        let text = sanitize_text(text);
        if text.is_empty() {
            return Err(SpeechError::Synthesizer("Text cannot be empty".to_string()));
        }

        debug!("Speaking with {}: {:?}", self.command.program, text);
        let output = tokio::process::Command::new(&self.command.program)
            .args(&self.command.args)
            .arg(&text)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SpeechError::Engine(format!("Failed to run {}: {}", self.command.program, e)))?;

        if !output.status.success() {
            return Err(SpeechError::Engine(format!(
                "{} exited with {}: {}",
                self.command.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(())
    }

    async fn list_voices(&self) -> Result<Vec<String>, SpeechError> {
        Ok(vec![])
    }

    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "command"
    }
}
