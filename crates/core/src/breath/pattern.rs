use crate::breath::BreathPhase;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PatternError {
    #[error("phase duration for {phase} must be finite and >= 0, got {value}")]
    InvalidDuration { phase: BreathPhase, value: f32 },
    #[error("at least one phase duration must be > 0")]
    AllPhasesZero,
    #[error("unknown breathing pattern: {0}")]
    Unknown(String),
}

/// Four phase durations in seconds under a display name.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BreathingPattern {
    name: String,
    inhale: f32,
    hold: f32,
    exhale: f32,
    rest: f32,
}

impl BreathingPattern {
    pub fn new<S: Into<String>>(
        name: S,
        inhale: f32,
        hold: f32,
        exhale: f32,
        rest: f32,
    ) -> Result<Self, PatternError> {
        for (phase, value) in [
            (BreathPhase::Inhale, inhale),
            (BreathPhase::Hold, hold),
            (BreathPhase::Exhale, exhale),
            (BreathPhase::Rest, rest),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PatternError::InvalidDuration { phase, value });
            }
        }
        if inhale + hold + exhale + rest <= 0.0 {
            return Err(PatternError::AllPhasesZero);
        }

        Ok(Self {
            name: name.into(),
            inhale,
            hold,
            exhale,
            rest,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn duration(&self, phase: BreathPhase) -> f32 {
        match phase {
            BreathPhase::Inhale => self.inhale,
            BreathPhase::Hold => self.hold,
            BreathPhase::Exhale => self.exhale,
            BreathPhase::Rest => self.rest,
        }
    }

    pub fn has_hold(&self) -> bool {
        self.hold > 0.0
    }

    pub fn has_rest(&self) -> bool {
        self.rest > 0.0
    }

    pub fn cycle_secs(&self) -> f32 {
        self.inhale + self.hold + self.exhale + self.rest
    }

    pub fn breaths_per_minute(&self) -> f32 {
        60.0 / self.cycle_secs()
    }
}

/// The built-in patterns offered by the UI.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    #[default]
    Normal,
    Box,
    #[serde(rename = "478")]
    FourSevenEight,
}

impl PatternKind {
    pub const ALL: [PatternKind; 3] = [Self::Normal, Self::Box, Self::FourSevenEight];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Box => "box",
            Self::FourSevenEight => "478",
        }
    }

    pub fn pattern(self) -> BreathingPattern {
        let (inhale, hold, exhale, rest) = match self {
            Self::Normal => (4.0, 0.0, 4.0, 0.0),
            Self::Box => (4.0, 4.0, 4.0, 4.0),
            Self::FourSevenEight => (4.0, 7.0, 8.0, 0.0),
        };
        BreathingPattern {
            name: self.as_str().to_owned(),
            inhale,
            hold,
            exhale,
            rest,
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatternKind {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "box" => Ok(Self::Box),
            "478" | "4-7-8" => Ok(Self::FourSevenEight),
            other => Err(PatternError::Unknown(other.to_owned())),
        }
    }
}
