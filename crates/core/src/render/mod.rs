mod log;

use crate::animation::{DropletPose, Ripple};
use crate::breath::BreathPhase;
use crate::color::Rgb;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

pub use log::LogRenderSink;

/// Everything the presentation layer needs to draw one frame.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FrameParams {
    pub breath_progress: f32,
    pub turbulence: f32,
    pub color: Rgb,
    pub background_tint: Rgb,
    pub scale: f32,
    pub normal_scale: f32,
    pub pose: DropletPose,
    pub water_time: f32,
    pub ripples: Vec<Ripple>,
    pub instruction: String,
    /// Swatch for the detected label, shown whether or not the droplet reacts to it.
    pub emotion_indicator: Option<Rgb>,
    pub breaths_per_minute: f32,
    pub session_active: bool,
    pub phase: BreathPhase,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// The surface cannot be drawn at all; fatal at start-up.
    #[error("rendering unsupported: {details}")]
    Unsupported { details: String },

    #[error("frame rejected: {details}")]
    Frame { details: String },
}

pub trait RenderSink: Send + Sync {
    fn init(&self) -> BoxFuture<'_, Result<(), RenderError>>;

    fn apply(&self, frame: FrameParams) -> BoxFuture<'_, Result<(), RenderError>>;
}
