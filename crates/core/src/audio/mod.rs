mod cue;
mod silent;
#[cfg(feature = "tone-output")]
mod tone;

use futures::future::BoxFuture;
use serde::Serialize;

pub use cue::{phase_cue, volume_db, NoiseCue, PhaseCue, Ramp, ToneCue, VolumeSettings};
pub use silent::SilentAudioSink;
#[cfg(feature = "tone-output")]
pub use tone::ToneAudioSink;

const LOG_TARGET: &str = "audio";

/// A pitch in scientific notation, e.g. `"G#4"` or `"Bb3"`.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, Hash)]
pub struct Note(pub &'static str);

impl Note {
    /// Equal-tempered frequency with A4 at 440 Hz.
    pub fn frequency_hz(self) -> Option<f32> {
        let mut chars = self.0.chars();
        let semitone: i32 = match chars.next()?.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return None,
        };
        let rest = chars.as_str();
        let (accidental, octave) = match rest.strip_prefix('#') {
            Some(o) => (1, o),
            None => match rest.strip_prefix('b') {
                Some(o) => (-1, o),
                None => (0, rest),
            },
        };
        let octave: i32 = octave.parse().ok()?;
        let midi = 12 * (octave + 1) + semitone + accidental;
        Some(440.0 * 2f32.powf((midi - 69) as f32 / 12.0))
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("audio output unavailable: {details}")]
    Unavailable { details: String },

    #[error("audio playback failed: {details}")]
    Playback { details: String },
}

pub trait AudioSink: Send + Sync {
    fn init(&self) -> BoxFuture<'_, Result<(), AudioError>>;

    fn set_volume(&self, volume: VolumeSettings) -> BoxFuture<'_, Result<(), AudioError>>;

    fn play_cue(&self, cue: PhaseCue) -> BoxFuture<'_, Result<(), AudioError>>;

    fn stop_noise(&self) -> BoxFuture<'_, Result<(), AudioError>>;
}

/// Owns the audio sink's lifecycle: lazy init, disabling on a missing device,
/// and re-initialising after a playback failure.
pub struct AudioController<A> {
    sink: A,
    enabled: bool,
    initialized: bool,
    unavailable: bool,
}

impl<A: AudioSink> AudioController<A> {
    pub fn new(sink: A) -> Self {
        Self {
            sink,
            enabled: false,
            initialized: false,
            unavailable: false,
        }
    }

    pub fn sink(&self) -> &A {
        &self.sink
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_unavailable(&self) -> bool {
        self.unavailable
    }

    /// Turn audio on, initialising the sink on first use. Returns whether audio is now on.
    pub async fn enable(&mut self, volume: f32) -> bool {
        if self.unavailable {
            return false;
        }
        if !self.ensure_initialized(volume).await {
            return false;
        }
        self.enabled = true;
        tracing::info!(target: LOG_TARGET, "audio enabled");
        true
    }

    pub async fn disable(&mut self) {
        self.enabled = false;
        if self.initialized {
            if let Err(e) = self.sink.stop_noise().await {
                tracing::warn!(target: LOG_TARGET, error = %e, "failed to stop breath noise");
            }
        }
        tracing::info!(target: LOG_TARGET, "audio disabled");
    }

    pub async fn set_volume(&mut self, volume: f32) {
        if !self.initialized {
            return;
        }
        if let Err(e) = self.sink.set_volume(VolumeSettings::from_volume(volume)).await {
            tracing::warn!(target: LOG_TARGET, error = %e, "failed to apply volume");
        }
    }

    pub async fn play(&mut self, cue: PhaseCue, volume: f32) {
        if !self.enabled || !self.initialized {
            return;
        }
        match self.sink.play_cue(cue).await {
            Ok(()) => {
                tracing::trace!(target: LOG_TARGET, phase = %cue.phase, "phase cue played");
            }
            Err(e) => {
                tracing::error!(target: LOG_TARGET, error = %e, "audio playback error; reinitialising");
                self.initialized = false;
                self.ensure_initialized(volume).await;
            }
        }
    }

    pub async fn stop_noise(&mut self) {
        if !self.enabled || !self.initialized {
            return;
        }
        if let Err(e) = self.sink.stop_noise().await {
            tracing::warn!(target: LOG_TARGET, error = %e, "failed to stop breath noise");
        }
    }

    async fn ensure_initialized(&mut self, volume: f32) -> bool {
        if self.initialized {
            return true;
        }
        match self.sink.init().await {
            Ok(()) => {
                self.initialized = true;
                self.set_volume(volume).await;
                true
            }
            Err(e) => {
                tracing::error!(target: LOG_TARGET, error = %e, "audio initialisation failed; audio unavailable");
                self.unavailable = true;
                self.enabled = false;
                false
            }
        }
    }
}
