mod classifier;
mod history;
mod stabilizer;

use crate::audio::Note;
use crate::color::Rgb;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

pub use classifier::{
    load_models_with_retry, Detection, EmotionError, ExpressionClassifier, ScriptedClassifier,
    SimulatedClassifier,
};
pub use history::{EmotionHistory, EmotionLogEntry, HISTORY_CAPACITY};
pub use stabilizer::{
    update_emotion_state, EmotionState, StabilizerOutcome, CONFIDENCE_THRESHOLD,
    GUIDANCE_STABILITY,
};

pub const NEUTRAL_DROPLET_COLOR: Rgb = Rgb::from_hex(0x4aa3df);

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Neutral,
    Happy,
    Sad,
    Angry,
    Surprised,
    Fearful,
    Disgusted,
}

impl Emotion {
    pub const ALL: [Emotion; 7] = [
        Self::Neutral,
        Self::Happy,
        Self::Sad,
        Self::Angry,
        Self::Surprised,
        Self::Fearful,
        Self::Disgusted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Happy => "happy",
            Self::Sad => "sad",
            Self::Angry => "angry",
            Self::Surprised => "surprised",
            Self::Fearful => "fearful",
            Self::Disgusted => "disgusted",
        }
    }

    /// Droplet tint while this emotion drives the response.
    pub fn color(self) -> Rgb {
        match self {
            Self::Neutral => NEUTRAL_DROPLET_COLOR,
            Self::Happy => Rgb::from_hex(0xffeb3b),
            Self::Sad => Rgb::from_hex(0x2979ff),
            Self::Angry => Rgb::from_hex(0xff5252),
            Self::Surprised => Rgb::from_hex(0xab47bc),
            Self::Fearful => Rgb::from_hex(0x43a047),
            Self::Disgusted => Rgb::from_hex(0xff9800),
        }
    }

    /// Swatch shown next to the detected label.
    pub fn indicator_color(self) -> Rgb {
        match self {
            Self::Neutral => Rgb::from_hex(0x78909c),
            other => other.color(),
        }
    }

    /// Base, hold and exhale notes for the phase cues.
    pub fn chord(self) -> [Note; 3] {
        let names = match self {
            Self::Neutral => ["C4", "E4", "G4"],
            Self::Happy => ["E4", "G#4", "B4"],
            Self::Sad => ["A3", "C4", "E4"],
            Self::Angry => ["D4", "F4", "A4"],
            Self::Surprised => ["F4", "A4", "C5"],
            Self::Fearful => ["B3", "D4", "F#4"],
            Self::Disgusted => ["G3", "B3", "D4"],
        };
        names.map(Note)
    }

    pub fn guidance(self) -> Option<&'static str> {
        match self {
            Self::Neutral => None,
            Self::Happy => Some("Enjoy this feeling"),
            Self::Sad => Some("Find comfort"),
            Self::Angry => Some("Release tension"),
            Self::Surprised => Some("Center yourself"),
            Self::Fearful => Some("You are safe"),
            Self::Disgusted => Some("Let it pass"),
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown emotion label: {0}")]
pub struct UnknownEmotion(pub String);

impl FromStr for Emotion {
    type Err = UnknownEmotion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|e| e.as_str() == wanted)
            .ok_or(UnknownEmotion(wanted))
    }
}

/// One classification result: the dominant expression and its score.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct EmotionSample {
    pub emotion: Emotion,
    pub confidence: f32,
}

impl EmotionSample {
    pub fn new(emotion: Emotion, confidence: f32) -> Self {
        Self {
            emotion,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Per-expression scores as reported by a face-expression model.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ExpressionScores(pub Vec<(Emotion, f32)>);

impl ExpressionScores {
    /// Highest-scoring expression; the first one wins a tie.
    pub fn dominant(&self) -> Option<EmotionSample> {
        let mut best: Option<EmotionSample> = None;
        for &(emotion, score) in &self.0 {
            if best.map_or(score > 0.0, |b| score > b.confidence) {
                best = Some(EmotionSample::new(emotion, score));
            }
        }
        best
    }
}
