use crate::emotion::{Emotion, EmotionSample};
use serde::{Deserialize, Serialize};

/// Samples at or below this confidence are ignored outright.
pub const CONFIDENCE_THRESHOLD: f32 = 0.5;
/// Stability above which guidance text is shown.
pub const GUIDANCE_STABILITY: f32 = 0.7;

const NO_FACE_DECAY: f32 = 0.05;
const AGREEMENT_GAIN: f32 = 0.1;
const DISAGREEMENT_RESET: f32 = 0.3;
const SWITCH_STABILITY: f32 = 0.5;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct EmotionState {
    pub current: Option<Emotion>,
    pub confidence: f32,
    pub stability: f32,
}

impl EmotionState {
    /// Hard reset used when detection stops; unrelated to the no-face decay.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_guidance_stable(&self) -> bool {
        self.current.is_some() && self.stability > GUIDANCE_STABILITY
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StabilizerOutcome {
    /// No face this cycle; stability decayed.
    Decayed,
    /// Face seen but not confidently enough to count.
    Ignored,
    /// The sample agreed with the current label.
    Reinforced(Emotion),
    /// The sample disagreed, but the current label was kept.
    Retained { current: Emotion, rejected: Emotion },
    /// The label moved to a new value.
    Switched {
        previous: Option<Emotion>,
        current: Emotion,
    },
}

impl StabilizerOutcome {
    pub fn changed_label(&self) -> Option<Emotion> {
        match *self {
            Self::Switched { current, .. } => Some(current),
            _ => None,
        }
    }
}

/// Fold one detection cycle into the state.
///
/// A disagreeing sample resets stability to a fixed value before the switch test runs,
/// so once a label is set it is only replaced after a hard reset.
pub fn update_emotion_state(
    state: &mut EmotionState,
    sample: Option<EmotionSample>,
) -> StabilizerOutcome {
    let Some(sample) = sample else {
        state.stability = (state.stability - NO_FACE_DECAY).max(0.0);
        return StabilizerOutcome::Decayed;
    };

    if sample.confidence <= CONFIDENCE_THRESHOLD {
        return StabilizerOutcome::Ignored;
    }

    if state.current == Some(sample.emotion) {
        state.stability = (state.stability + AGREEMENT_GAIN).min(1.0);
        if state.stability > SWITCH_STABILITY {
            state.confidence = sample.confidence;
        }
        return StabilizerOutcome::Reinforced(sample.emotion);
    }

    state.stability = DISAGREEMENT_RESET;

    match state.current {
        Some(current) if state.stability <= SWITCH_STABILITY => StabilizerOutcome::Retained {
            current,
            rejected: sample.emotion,
        },
        previous => {
            state.current = Some(sample.emotion);
            state.confidence = sample.confidence;
            StabilizerOutcome::Switched {
                previous,
                current: sample.emotion,
            }
        }
    }
}
