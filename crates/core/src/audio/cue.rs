use crate::audio::Note;
use crate::breath::{BreathPhase, BreathingPattern};
use serde::{Deserialize, Serialize};

const SILENCE_DB: f32 = -60.0;
const NOISE_OFFSET_DB: f32 = -10.0;
const HOLD_NOISE_OFFSET_DB: f32 = -30.0;
const NOTE_LEAD_SECS: f32 = 0.1;
const NOISE_RAMP_SECS: f32 = 0.5;

/// Map a `[0, 1]` volume onto `[-60, 0]` dB.
pub fn volume_db(volume: f32) -> f32 {
    SILENCE_DB + volume.clamp(0.0, 1.0) * -SILENCE_DB
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct VolumeSettings {
    pub synth_db: f32,
    pub noise_db: f32,
}

impl VolumeSettings {
    pub fn from_volume(volume: f32) -> Self {
        let synth_db = volume_db(volume);
        Self {
            synth_db,
            noise_db: synth_db + NOISE_OFFSET_DB,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq)]
pub struct ToneCue {
    pub note: Note,
    pub duration_secs: f32,
}

/// Linear ramp of a parameter to `target` over `over_secs`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Ramp {
    pub target: f32,
    pub over_secs: f32,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub enum NoiseCue {
    /// (Re)start breath noise with the low-pass cutoff at `cutoff_hz`.
    Start { cutoff_hz: f32, cutoff: Ramp },
    /// Adjust running noise.
    Shape {
        gain_db: Ramp,
        cutoff: Option<Ramp>,
    },
    Stop,
}

/// Everything the audio collaborator needs for one phase.
#[derive(Clone, Copy, Debug, Serialize, PartialEq)]
pub struct PhaseCue {
    pub phase: BreathPhase,
    pub tone: Option<ToneCue>,
    pub noise: NoiseCue,
    pub noise_db: f32,
    pub phase_secs: f32,
}

pub fn phase_cue(
    phase: BreathPhase,
    pattern: &BreathingPattern,
    chord: [Note; 3],
    volume: f32,
) -> PhaseCue {
    let base_db = volume_db(volume);
    let phase_secs = pattern.duration(phase);
    let note_secs = (phase_secs - NOTE_LEAD_SECS).max(0.0);
    let tone = |note: Note| {
        Some(ToneCue {
            note,
            duration_secs: note_secs,
        })
    };
    let [base, hold, exhale] = chord;

    let (tone, noise) = match phase {
        BreathPhase::Inhale => (
            tone(base),
            NoiseCue::Start {
                cutoff_hz: 600.0,
                cutoff: Ramp {
                    target: 1200.0,
                    over_secs: note_secs,
                },
            },
        ),
        BreathPhase::Hold => (
            tone(hold),
            NoiseCue::Shape {
                gain_db: Ramp {
                    target: base_db + HOLD_NOISE_OFFSET_DB,
                    over_secs: NOISE_RAMP_SECS,
                },
                cutoff: None,
            },
        ),
        BreathPhase::Exhale => (
            tone(exhale),
            NoiseCue::Shape {
                gain_db: Ramp {
                    target: base_db + NOISE_OFFSET_DB,
                    over_secs: NOISE_RAMP_SECS,
                },
                cutoff: Some(Ramp {
                    target: 300.0,
                    over_secs: note_secs,
                }),
            },
        ),
        BreathPhase::Rest => (None, NoiseCue::Stop),
    };

    PhaseCue {
        phase,
        tone,
        noise,
        noise_db: base_db + NOISE_OFFSET_DB,
        phase_secs,
    }
}
