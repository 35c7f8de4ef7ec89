use crate::render::{FrameParams, RenderError, RenderSink};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::atomic::{AtomicU64, Ordering};

const LOG_TARGET: &str = "render";

/// Renders frames into the log: every frame at `trace`, a summary at `debug`
/// once every `summary_every` frames.
pub struct LogRenderSink {
    frames: AtomicU64,
    summary_every: u64,
}

impl LogRenderSink {
    pub fn new(frames_per_sec: u32) -> Self {
        Self {
            frames: AtomicU64::new(0),
            summary_every: u64::from(frames_per_sec.max(1)),
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

impl Default for LogRenderSink {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_FRAME_RATE)
    }
}

impl RenderSink for LogRenderSink {
    fn init(&self) -> BoxFuture<'_, Result<(), RenderError>> {
        async move {
            tracing::debug!(target: LOG_TARGET, "log renderer ready");
            Ok(())
        }
        .boxed()
    }

    fn apply(&self, frame: FrameParams) -> BoxFuture<'_, Result<(), RenderError>> {
        async move {
            let n = self.frames.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(
                target: LOG_TARGET,
                frame = n,
                progress = frame.breath_progress,
                turbulence = frame.turbulence,
                scale = frame.scale,
                "frame"
            );
            if n % self.summary_every == 0 {
                tracing::debug!(
                    target: LOG_TARGET,
                    frame = n,
                    phase = %frame.phase,
                    session = frame.session_active,
                    progress = format_args!("{:.2}", frame.breath_progress),
                    turbulence = format_args!("{:.2}", frame.turbulence),
                    color = format_args!("#{:06x}", frame.color.to_hex()),
                    ripples = frame.ripples.len(),
                    bpm = format_args!("{:.1}", frame.breaths_per_minute),
                    emotion = ?frame.emotion_indicator.map(|c| format!("#{:06x}", c.to_hex())),
                    instruction = %frame.instruction,
                    "droplet"
                );
            }
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::DropletPose;
    use crate::breath::BreathPhase;
    use crate::color::Rgb;
    use futures::executor::block_on;

    #[test]
    fn counts_applied_frames() {
        let sink = LogRenderSink::new(2);
        block_on(sink.init()).expect("init");
        let frame = FrameParams {
            breath_progress: 0.5,
            turbulence: 0.0,
            color: Rgb::from_hex(0x4aa3df),
            background_tint: Rgb::new(0.0, 0.0, 0.0),
            scale: 0.86,
            normal_scale: 0.035,
            pose: DropletPose::default(),
            water_time: 0.0,
            ripples: Vec::new(),
            instruction: "Inhale...".to_owned(),
            emotion_indicator: None,
            breaths_per_minute: 7.5,
            session_active: true,
            phase: BreathPhase::Inhale,
        };
        for _ in 0..3 {
            block_on(sink.apply(frame.clone())).expect("apply");
        }
        assert_eq!(sink.frames(), 3);
    }
}
