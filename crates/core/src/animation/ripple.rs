use crate::color::Rgb;
use serde::{Deserialize, Serialize};

pub const RIPPLE_SLOTS: usize = 5;
const START_SCALE: f32 = 0.1;
const START_OPACITY: f32 = 0.5;
const GROWTH_PER_SEC: f32 = 2.0;
const FADE_PER_SEC: f32 = 0.8;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Ripple {
    pub scale: f32,
    pub opacity: f32,
    pub color: Rgb,
}

#[derive(Clone, Copy, Debug)]
struct Slot {
    ripple: Ripple,
    active: bool,
}

/// Expanding rings under the droplet. Triggers are dropped while every slot is busy.
///
/// A slot keeps the colour it was last given, so a ripple triggered without a
/// colour reuses whatever that slot showed before.
#[derive(Clone, Debug)]
pub struct RipplePool {
    slots: [Slot; RIPPLE_SLOTS],
}

impl RipplePool {
    pub fn new(initial: Rgb) -> Self {
        let slot = Slot {
            ripple: Ripple {
                scale: START_SCALE,
                opacity: START_OPACITY,
                color: initial,
            },
            active: false,
        };
        Self {
            slots: [slot; RIPPLE_SLOTS],
        }
    }

    pub fn trigger(&mut self, color: Option<Rgb>) -> bool {
        let Some(slot) = self.slots.iter_mut().find(|s| !s.active) else {
            return false;
        };
        slot.active = true;
        slot.ripple.scale = START_SCALE;
        slot.ripple.opacity = START_OPACITY;
        if let Some(color) = color {
            slot.ripple.color = color;
        }
        true
    }

    pub fn update(&mut self, delta_secs: f32) {
        for slot in self.slots.iter_mut().filter(|s| s.active) {
            let r = &mut slot.ripple;
            r.scale += delta_secs * GROWTH_PER_SEC;
            r.opacity -= delta_secs * FADE_PER_SEC;
            if r.opacity <= 0.0 {
                slot.active = false;
            }
        }
    }

    pub fn recolor(&mut self, color: Rgb) {
        for slot in self.slots.iter_mut().filter(|s| s.active) {
            slot.ripple.color = color;
        }
    }

    pub fn active(&self) -> impl Iterator<Item = &Ripple> {
        self.slots.iter().filter(|s| s.active).map(|s| &s.ripple)
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }
}
