#![deny(warnings)]

pub mod animation;
pub mod audio;
pub mod breath;
pub mod color;
pub mod config;
pub mod emotion;
pub mod engine;
pub mod render;
pub mod util;

pub use animation::compute_turbulence;
pub use breath::{advance_phase, compute_progress};
pub use color::begin_color_transition;
pub use emotion::update_emotion_state;
