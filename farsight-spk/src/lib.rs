//! farsight-spk: spoken warnings
//!
//! Provides text-to-speech with:
//! - Native TTS engines (platform command-line synthesizers)
//! - A user-configured command engine
//! - A fire-and-forget speaker that drops requests while busy

pub mod config;
pub mod engines;
pub mod error;
pub mod speaker;

pub use config::{CommandConfig, SpeechConfig, TtsEngine, VoiceConfig};
pub use engines::TtsEngine as TtsEngineTrait;
pub use error::SpeechError;
pub use speaker::Speaker;
