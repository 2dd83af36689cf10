//! Native platform TTS engine

use crate::config::VoiceConfig;
use crate::engines::{sanitize_text, TtsEngine, MAX_TEXT_LEN};
use crate::error::SpeechError;
use async_trait::async_trait;
use std::process::Stdio;
use tracing::{debug, info, warn};

const MAX_VOICES: usize = 1000;

/// Synthesizer found on this machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeBackend {
    /// macOS `say`
    Say,
    /// `espeak-ng` or `espeak`, by program name
    Espeak(String),
    /// Windows System.Speech through PowerShell
    Sapi,
    Unavailable,
}

impl NativeBackend {
    /// Look up the platform synthesizer
    pub fn detect() -> Self {
        if cfg!(target_os = "windows") {
            return NativeBackend::Sapi;
        }

        if cfg!(target_os = "macos") {
            return if program_runs("say", &["-v", "?"]) {
                NativeBackend::Say
            } else {
                NativeBackend::Unavailable
            };
        }

        ["espeak-ng", "espeak"]
            .iter()
            .find(|program| program_runs(program, &["--version"]))
            .map(|program| NativeBackend::Espeak(program.to_string()))
            .unwrap_or(NativeBackend::Unavailable)
    }
}

fn program_runs(program: &str, args: &[&str]) -> bool {
    std::process::Command::new(program)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Native TTS engine (platform-specific)
pub struct NativeTtsEngine {
    backend: NativeBackend,
    rate: u32,
    volume: f32,
    pitch: f32,
}

#[async_trait]
impl TtsEngine for NativeTtsEngine {
    async fn speak(&self, text: &str, voice: &VoiceConfig) -> Result<(), SpeechError> {
        let (program, args) = self.speak_command(text, voice)?;
        debug!("Speaking with {}: {:?}", program, text);

        let output = tokio::process::Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SpeechError::Engine(format!("Failed to run {}: {}", program, e)))?;

        if !output.status.success() {
            return Err(SpeechError::Engine(format!(
                "{} failed: {}",
                program,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(())
    }

    async fn list_voices(&self) -> Result<Vec<String>, SpeechError> {
        let (program, args): (&str, Vec<String>) = match &self.backend {
            NativeBackend::Say => ("say", vec!["-v".into(), "?".into()]),
            NativeBackend::Espeak(program) => (program.as_str(), vec!["--voices".into()]),
            NativeBackend::Sapi => ("powershell", powershell_args(
                "Add-Type -AssemblyName System.Speech; \
                 (New-Object System.Speech.Synthesis.SpeechSynthesizer).GetInstalledVoices() | \
                 ForEach-Object { $_.VoiceInfo.Name }",
            )),
            NativeBackend::Unavailable => return Ok(vec![]),
        };

        let output = tokio::process::Command::new(program)
            .args(&args)
            .output()
            .await
            .map_err(|e| SpeechError::Engine(format!("Failed to list voices: {}", e)))?;

        if !output.status.success() {
            warn!("{} could not list voices", program);
            return Ok(vec![]);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_voices(&self.backend, &stdout))
    }

    fn is_available(&self) -> bool {
        self.backend != NativeBackend::Unavailable
    }

    fn name(&self) -> &str {
        "native"
    }
}

impl NativeTtsEngine {
    pub fn new() -> Self {
        Self::new_with_config(150, 0.8, 0.0)
    }

    pub fn new_with_config(rate: u32, volume: f32, pitch: f32) -> Self {
        let backend = NativeBackend::detect();
        match backend {
            NativeBackend::Unavailable => warn!("No native TTS engine found; warnings will not be spoken"),
            ref found => info!("Native TTS engine initialized: {:?}", found),
        }
        Self::with_backend(backend, rate, volume, pitch)
    }

    pub fn with_backend(backend: NativeBackend, rate: u32, volume: f32, pitch: f32) -> Self {
        Self {
            backend,
            rate,
            volume,
            pitch,
        }
    }

    pub fn backend(&self) -> &NativeBackend {
        &self.backend
    }

    /// Program and arguments that speak `text`
    pub fn speak_command(&self, text: &str, voice: &VoiceConfig) -> Result<(String, Vec<String>), SpeechError> {
        if text.len() > MAX_TEXT_LEN {
            return Err(SpeechError::Synthesizer("Text too long (max 100KB)".to_string()));
        }
        let text = sanitize_text(text);
        if text.is_empty() {
            return Err(SpeechError::Synthesizer("Text cannot be empty".to_string()));
        }
        let voice_name = voice.name.as_deref().map(sanitize_voice).filter(|v| !v.is_empty());

        match &self.backend {
            NativeBackend::Say => {
                let mut args = vec!["-r".to_string(), self.rate.min(500).to_string()];
                if let Some(name) = voice_name {
                    args.push("-v".to_string());
                    args.push(name);
                }
                args.push(text);
                Ok(("say".to_string(), args))
            }
            NativeBackend::Espeak(program) => {
                let voice = voice_name.unwrap_or_else(|| voice.language.to_lowercase());
                let args = vec![
                    "-s".to_string(),
                    self.rate.to_string(),
                    "-a".to_string(),
                    espeak_volume(self.volume).to_string(),
                    "-p".to_string(),
                    espeak_pitch(self.pitch).to_string(),
                    "-v".to_string(),
                    voice,
                    text,
                ];
                Ok((program.clone(), args))
            }
            NativeBackend::Sapi => {
                let select_voice = voice_name
                    .map(|name| format!("$synth.SelectVoice({}); ", ps_quote(&name)))
                    .unwrap_or_default();
                let script = format!(
                    "Add-Type -AssemblyName System.Speech; \
                     $synth = New-Object System.Speech.Synthesis.SpeechSynthesizer; \
                     {}$synth.Rate = {}; $synth.Volume = {}; \
                     $synth.SetOutputToDefaultAudioDevice(); \
                     $synth.Speak({}); $synth.Dispose()",
                    select_voice,
                    sapi_rate(self.rate),
                    sapi_volume(self.volume),
                    ps_quote(&text)
                );
                Ok(("powershell".to_string(), powershell_args(&script)))
            }
            NativeBackend::Unavailable => {
                Err(SpeechError::Engine("Native TTS engine not available".to_string()))
            }
        }
    }
}

impl Default for NativeTtsEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn powershell_args(script: &str) -> Vec<String> {
    ["-NoProfile", "-NonInteractive", "-Command", script]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Single-quoted PowerShell string literal
fn ps_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Only alphanumeric, spaces, hyphens, underscores and dots
fn sanitize_voice(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.' | '+'))
        .take(256)
        .collect()
}

/// 0.0-1.0 to espeak amplitude 0-200
fn espeak_volume(volume: f32) -> u32 {
    ((volume * 200.0).round().max(0.0) as u32).min(200)
}

/// -1.0..1.0 to espeak pitch 0-99, 0.0 -> 50
fn espeak_pitch(pitch: f32) -> u32 {
    ((50.0 + pitch * 49.0).round().max(0.0) as u32).min(99)
}

/// WPM (0-500) to SpeechSynthesizer.Rate (-10..10), 250 WPM -> 0
fn sapi_rate(rate: u32) -> i32 {
    let rate = rate.min(500) as f32;
    (((rate - 250.0) / 250.0) * 10.0).round() as i32
}

fn sapi_volume(volume: f32) -> u32 {
    ((volume * 100.0).round().max(0.0) as u32).min(100)
}

fn parse_voices(backend: &NativeBackend, stdout: &str) -> Vec<String> {
    let voices = stdout.lines();
    let names: Vec<String> = match backend {
        // "Alex                en_US    # Most people recognize me by my voice."
        NativeBackend::Say => voices
            .filter_map(|line| line.split('#').next())
            .filter_map(|line| {
                let mut fields: Vec<&str> = line.split_whitespace().collect();
                fields.pop()?;
                (!fields.is_empty()).then(|| fields.join(" "))
            })
            .collect(),
        // "Pty Language       Age/Gender VoiceName          File                 Other Languages"
        NativeBackend::Espeak(_) => voices
            .skip(1)
            .filter_map(|line| line.split_whitespace().nth(1).map(str::to_string))
            .collect(),
        NativeBackend::Sapi => voices.map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect(),
        NativeBackend::Unavailable => Vec::new(),
    };

    names
        .into_iter()
        .filter(|v| v.len() <= 256 && !v.chars().any(|c| c.is_control()))
        .take(MAX_VOICES)
        .collect()
}
