//! Fire-and-forget speaker for warnings

use crate::config::{SpeechConfig, VoiceConfig};
use crate::engines::{create_engine, TtsEngine};
use crate::error::SpeechError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// Speaks one sentence at a time
///
/// While a sentence is playing, new requests are dropped rather than
/// queued, so a warning is never read out after it has gone stale.
pub struct Speaker {
    engine: Arc<dyn TtsEngine>,
    voice: VoiceConfig,
    busy: Arc<AtomicBool>,
    handle: Handle,
}

/// Clears the busy flag when the utterance ends, however it ends
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Speaker {
    /// Create a speaker for the configured engine
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(config: &SpeechConfig) -> Result<Self, SpeechError> {
        config.validate().map_err(SpeechError::Config)?;

        if !config.enabled {
            return Err(SpeechError::Config("Speech is disabled".to_string()));
        }

        let engine = create_engine(config)?;
        if !engine.is_available() {
            return Err(SpeechError::Engine(format!("{} TTS engine not available", engine.name())));
        }

        Self::with_engine(engine, config.voice.clone())
    }

    /// Create a speaker around an existing engine
    pub fn with_engine(engine: Arc<dyn TtsEngine>, voice: VoiceConfig) -> Result<Self, SpeechError> {
        let handle = Handle::try_current().map_err(|_| {
            SpeechError::Engine("No tokio runtime available for speech".to_string())
        })?;

        info!("Speaker ready ({} engine)", engine.name());
        Ok(Self {
            engine,
            voice,
            busy: Arc::new(AtomicBool::new(false)),
            handle,
        })
    }

    /// Start speaking `text` in the background
    ///
    /// Returns `false` without doing anything when `text` is blank or a
    /// previous sentence is still playing.
    pub fn announce(&self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }

        let guard = match self.try_acquire() {
            Some(guard) => guard,
            None => {
                debug!("Speaker busy, dropping: {}", text);
                return false;
            }
        };

        let engine = self.engine.clone();
        let voice = self.voice.clone();
        let text = text.to_string();
        self.handle.spawn(async move {
            let _guard = guard;
            if let Err(e) = engine.speak(&text, &voice).await {
                warn!("Failed to speak warning: {}", e);
            }
        });

        true
    }

    /// Speak `text` and wait for it to finish
    pub async fn speak_now(&self, text: &str) -> Result<(), SpeechError> {
        let _guard = self
            .try_acquire()
            .ok_or_else(|| SpeechError::Synthesizer("Speaker is busy".to_string()))?;
        self.engine.speak(text, &self.voice).await
    }

    pub fn is_speaking(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub async fn list_voices(&self) -> Result<Vec<String>, SpeechError> {
        self.engine.list_voices().await
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    fn try_acquire(&self) -> Option<BusyGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(self.busy.clone()))
    }
}
