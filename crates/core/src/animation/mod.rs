mod ripple;

use crate::emotion::Emotion;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

pub use ripple::{Ripple, RipplePool, RIPPLE_SLOTS};

const BASE_SCALE: f32 = 0.8;
const BREATH_SCALE_GAIN: f32 = 0.15;
const LOW_ATTENTION_TURBULENCE: f32 = 0.7;
const ANGER_TURBULENCE: f32 = 0.4;
const FEAR_TURBULENCE_MAX: f32 = 0.3;
/// Chance per second of a spontaneous ripple during a session.
pub const RIPPLE_RATE_PER_SEC: f32 = 0.2;

/// How settled the user says their attention is; low attention roughens the surface.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AttentionLevel {
    #[default]
    High,
    Low,
    Dynamic,
}

impl AttentionLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Low => "low",
            Self::Dynamic => "dynamic",
        }
    }
}

impl fmt::Display for AttentionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown attention level: {0}")]
pub struct UnknownAttention(pub String);

impl FromStr for AttentionLevel {
    type Err = UnknownAttention;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "low" => Ok(Self::Low),
            "dynamic" => Ok(Self::Dynamic),
            other => Err(UnknownAttention(other.to_owned())),
        }
    }
}

/// Per-tick breath output, recomputed from session and emotion state.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AnimationParams {
    pub breath_progress: f32,
    pub turbulence: f32,
}

pub fn base_turbulence(attention: AttentionLevel, elapsed_secs: f32) -> f32 {
    match attention {
        AttentionLevel::High => 0.0,
        AttentionLevel::Low => LOW_ATTENTION_TURBULENCE,
        AttentionLevel::Dynamic => 0.1 + 0.6 * (elapsed_secs * 0.2).sin().abs(),
    }
}

/// Surface turbulence for a session tick.
///
/// `reactive_emotion` is the detected label when the emotion response is on.
/// Fear adds a fresh random amount every call, with no smoothing between ticks.
pub fn compute_turbulence<R>(
    attention: AttentionLevel,
    elapsed_secs: f32,
    reactive_emotion: Option<Emotion>,
    rng: &mut R,
) -> f32
where
    R: Rng + ?Sized,
{
    let base = base_turbulence(attention, elapsed_secs);
    match reactive_emotion {
        Some(Emotion::Angry) => base + ANGER_TURBULENCE,
        Some(Emotion::Fearful) => base + rng.random_range(0.0..FEAR_TURBULENCE_MAX),
        _ => base,
    }
}

pub fn droplet_scale<R>(breath_progress: f32, turbulence: f32, rng: &mut R) -> f32
where
    R: Rng + ?Sized,
{
    let scale = BASE_SCALE * (1.0 + breath_progress * BREATH_SCALE_GAIN);
    if turbulence > 0.0 {
        scale + (rng.random::<f32>() - 0.5) * turbulence * 0.1
    } else {
        scale
    }
}

pub fn normal_scale(intensity: f32, turbulence: f32) -> f32 {
    0.02 + intensity * 0.03 + turbulence * 0.02
}

/// Rotation in radians plus a vertical bob.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct DropletPose {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
    pub bob: f32,
}

pub fn droplet_pose(elapsed_secs: f32, reactive_emotion: Option<Emotion>) -> DropletPose {
    let e = elapsed_secs;
    let mut pose = DropletPose {
        yaw: (e * 0.2).sin() * 0.1,
        ..Default::default()
    };

    match reactive_emotion {
        None => {}
        Some(Emotion::Angry) => {
            pose.pitch = (e * 2.0).sin() * 0.1;
            pose.roll = (e * 1.5).cos() * 0.08;
        }
        Some(Emotion::Sad) => pose.pitch = (e * 0.5).sin() * 0.05 - 0.1,
        Some(Emotion::Happy) => {
            pose.pitch = (e * 1.2).sin().abs() * 0.08;
            pose.bob = (e * 1.2).sin() * 0.1;
        }
        Some(_) => pose.pitch = (e * 0.3).sin() * 0.05,
    }
    pose
}
