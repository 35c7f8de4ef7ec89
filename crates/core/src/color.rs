use serde::{Deserialize, Serialize};

pub const MIN_TRANSITION_SECS: f32 = 1.0;
const SECS_PER_UNIT_DISTANCE: f32 = 2.0;

/// Linear RGB triple, each channel in `[0, 1]`.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub const fn from_hex(hex: u32) -> Self {
        Self {
            r: ((hex >> 16) & 0xff) as f32 / 255.0,
            g: ((hex >> 8) & 0xff) as f32 / 255.0,
            b: (hex & 0xff) as f32 / 255.0,
        }
    }

    pub fn to_hex(self) -> u32 {
        let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u32;
        (channel(self.r) << 16) | (channel(self.g) << 8) | channel(self.b)
    }

    pub fn distance(self, other: Rgb) -> f32 {
        let dr = self.r - other.r;
        let dg = self.g - other.g;
        let db = self.b - other.b;
        (dr * dr + dg * dg + db * db).sqrt()
    }

    pub fn lerp(self, other: Rgb, t: f32) -> Rgb {
        Rgb {
            r: self.r + (other.r - self.r) * t,
            g: self.g + (other.g - self.g) * t,
            b: self.b + (other.b - self.b) * t,
        }
    }

    pub fn scale(self, factor: f32) -> Rgb {
        Rgb {
            r: self.r * factor,
            g: self.g * factor,
            b: self.b * factor,
        }
    }
}

pub fn smoothstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Span {
    from: Rgb,
    to: Rgb,
}

/// An eased blend from one colour to another, advanced once per render tick.
///
/// Completion snaps to the exact target and clears the span; updating an idle
/// transition is a no-op.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorTransition {
    span: Option<Span>,
    progress: f32,
    duration: f32,
}

impl Default for ColorTransition {
    fn default() -> Self {
        Self::idle()
    }
}

impl ColorTransition {
    pub fn idle() -> Self {
        Self {
            span: None,
            progress: 0.0,
            duration: MIN_TRANSITION_SECS,
        }
    }

    pub fn toward(from: Rgb, to: Rgb, duration_secs: f32) -> Self {
        Self {
            span: Some(Span { from, to }),
            progress: 0.0,
            duration: duration_secs.max(f32::EPSILON),
        }
    }

    pub fn is_active(&self) -> bool {
        self.span.is_some()
    }

    pub fn duration_secs(&self) -> f32 {
        self.duration
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn target(&self) -> Option<Rgb> {
        self.span.map(|s| s.to)
    }

    /// Advance by `delta_secs`, returning the colour to display, or `None` when idle.
    pub fn update(&mut self, delta_secs: f32) -> Option<Rgb> {
        let span = self.span?;
        self.progress += delta_secs / self.duration;

        if self.progress >= 1.0 {
            self.span = None;
            return Some(span.to);
        }

        Some(span.from.lerp(span.to, smoothstep(self.progress)))
    }
}

/// Start a transition whose length grows with the distance between the two colours.
pub fn begin_color_transition(current: Rgb, target: Rgb) -> ColorTransition {
    let duration = MIN_TRANSITION_SECS + current.distance(target) * SECS_PER_UNIT_DISTANCE;
    ColorTransition::toward(current, target, duration)
}
