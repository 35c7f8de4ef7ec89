mod pattern;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use pattern::{BreathingPattern, PatternError, PatternKind};

pub const IDLE_INSTRUCTION: &str = "Start a session to begin";

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BreathPhase {
    #[default]
    Inhale,
    Hold,
    Exhale,
    Rest,
}

impl BreathPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inhale => "inhale",
            Self::Hold => "hold",
            Self::Exhale => "exhale",
            Self::Rest => "rest",
        }
    }

    pub fn instruction(self) -> &'static str {
        match self {
            Self::Inhale => "Inhale...",
            Self::Hold => "Hold...",
            Self::Exhale => "Exhale...",
            Self::Rest => "Rest...",
        }
    }
}

impl fmt::Display for BreathPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a guided session currently is. Stopping freezes the phase and timer.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionState {
    pub active: bool,
    pub phase: BreathPhase,
    pub phase_timer: f32,
}

impl SessionState {
    pub fn start(&mut self) {
        self.active = true;
        self.phase = BreathPhase::Inhale;
        self.phase_timer = 0.0;
    }

    pub fn stop(&mut self) {
        self.active = false;
    }
}

/// Next phase in the cycle. Hold and rest are skipped when the pattern gives them no time.
pub fn advance_phase(pattern: &BreathingPattern, phase: BreathPhase) -> BreathPhase {
    match phase {
        BreathPhase::Inhale if pattern.has_hold() => BreathPhase::Hold,
        BreathPhase::Inhale => BreathPhase::Exhale,
        BreathPhase::Hold => BreathPhase::Exhale,
        BreathPhase::Exhale if pattern.has_rest() => BreathPhase::Rest,
        BreathPhase::Exhale => BreathPhase::Inhale,
        BreathPhase::Rest => BreathPhase::Inhale,
    }
}

/// Accumulate `delta_secs` into the phase timer and transition at most once.
///
/// Returns the newly entered phase. The timer restarts at zero on a transition,
/// discarding any overshoot.
pub fn tick_session(
    state: &mut SessionState,
    pattern: &BreathingPattern,
    delta_secs: f32,
) -> Option<BreathPhase> {
    if !state.active {
        return None;
    }

    state.phase_timer += delta_secs;
    if state.phase_timer < pattern.duration(state.phase) {
        return None;
    }

    state.phase_timer = 0.0;
    state.phase = advance_phase(pattern, state.phase);
    Some(state.phase)
}

/// Breath fill in `[0, 1]`: rises while inhaling, holds full, falls while exhaling, rests empty.
pub fn compute_progress(state: &SessionState, pattern: &BreathingPattern) -> f32 {
    let duration = pattern.duration(state.phase);
    let fraction = if duration > 0.0 {
        (state.phase_timer / duration).clamp(0.0, 1.0)
    } else {
        1.0
    };

    match state.phase {
        BreathPhase::Inhale => fraction,
        BreathPhase::Hold if pattern.has_hold() => 1.0,
        BreathPhase::Hold => 0.0,
        BreathPhase::Exhale => 1.0 - fraction,
        BreathPhase::Rest => 0.0,
    }
}

/// Gentle breathing shown while no session runs.
pub fn idle_progress(elapsed_secs: f32) -> f32 {
    ((elapsed_secs * 0.5).sin() + 1.0) * 0.5
}

pub fn instruction_text(session: &SessionState, guidance: Option<&str>) -> String {
    if !session.active {
        return IDLE_INSTRUCTION.to_owned();
    }
    match guidance {
        Some(g) => format!("{} {g}", session.phase.instruction()),
        None => session.phase.instruction().to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cycle_from_inhale(pattern: &BreathingPattern, steps: usize) -> Vec<BreathPhase> {
        let mut phase = BreathPhase::Inhale;
        let mut seen = vec![phase];
        for _ in 0..steps {
            phase = advance_phase(pattern, phase);
            seen.push(phase);
        }
        seen
    }

    #[test]
    fn normal_pattern_skips_hold_and_rest() {
        use BreathPhase::*;
        let seen = cycle_from_inhale(&PatternKind::Normal.pattern(), 4);
        assert_eq!(seen, vec![Inhale, Exhale, Inhale, Exhale, Inhale]);
    }

    #[test]
    fn every_pattern_visits_exactly_its_nonzero_phases() {
        use BreathPhase::*;
        for (hold, rest) in [(0.0, 0.0), (2.0, 0.0), (0.0, 3.0), (2.0, 3.0)] {
            let pattern = BreathingPattern::new("p", 4.0, hold, 5.0, rest).expect("valid");
            let seen = cycle_from_inhale(&pattern, 8);
            assert_eq!(seen.contains(&Hold), hold > 0.0);
            assert_eq!(seen.contains(&Rest), rest > 0.0);
            for w in seen.windows(2) {
                assert_ne!(w[0], w[1]);
                assert!(pattern.duration(w[1]) > 0.0);
            }
        }
    }

    #[test]
    fn box_pattern_cycles_in_sixteen_seconds() {
        let pattern = PatternKind::Box.pattern();
        let mut state = SessionState::default();
        state.start();

        let mut entered = Vec::new();
        // Quarter-second ticks are exact in binary floating point.
        for _ in 0..64 {
            if let Some(p) = tick_session(&mut state, &pattern, 0.25) {
                entered.push(p);
            }
        }

        use BreathPhase::*;
        assert_eq!(entered, vec![Hold, Exhale, Rest, Inhale]);
        assert_eq!(state.phase, Inhale);
        assert_eq!(state.phase_timer, 0.0);
    }

    #[test]
    fn transition_resets_timer_and_drops_overshoot() {
        let pattern = PatternKind::Normal.pattern();
        let mut state = SessionState::default();
        state.start();

        assert_eq!(tick_session(&mut state, &pattern, 3.0), None);
        assert_eq!(state.phase_timer, 3.0);
        assert_eq!(
            tick_session(&mut state, &pattern, 2.5),
            Some(BreathPhase::Exhale)
        );
        assert_eq!(state.phase_timer, 0.0);
    }

    #[test]
    fn inactive_session_does_not_advance() {
        let pattern = PatternKind::Normal.pattern();
        let mut state = SessionState::default();
        assert_eq!(tick_session(&mut state, &pattern, 10.0), None);
        assert_eq!(state.phase_timer, 0.0);
    }

    #[test]
    fn stop_freezes_phase_and_timer() {
        let pattern = PatternKind::Box.pattern();
        let mut state = SessionState::default();
        state.start();
        tick_session(&mut state, &pattern, 4.0);
        tick_session(&mut state, &pattern, 1.5);
        state.stop();

        assert!(!state.active);
        assert_eq!(state.phase, BreathPhase::Hold);
        assert_eq!(state.phase_timer, 1.5);
    }

    #[test]
    fn progress_is_continuous_across_boundaries() {
        let pattern = PatternKind::Box.pattern();
        let at = |phase, phase_timer| {
            compute_progress(
                &SessionState {
                    active: true,
                    phase,
                    phase_timer,
                },
                &pattern,
            )
        };

        assert_eq!(at(BreathPhase::Inhale, 0.0), 0.0);
        assert_eq!(at(BreathPhase::Inhale, 2.0), 0.5);
        assert_eq!(at(BreathPhase::Inhale, 4.0), 1.0);
        assert_eq!(at(BreathPhase::Hold, 0.0), 1.0);
        assert_eq!(at(BreathPhase::Hold, 4.0), 1.0);
        assert_eq!(at(BreathPhase::Exhale, 0.0), 1.0);
        assert_eq!(at(BreathPhase::Exhale, 4.0), 0.0);
        assert_eq!(at(BreathPhase::Rest, 0.0), 0.0);
    }

    #[test]
    fn zero_length_phases_never_divide_by_zero() {
        let pattern = PatternKind::Normal.pattern();
        let hold = SessionState {
            active: true,
            phase: BreathPhase::Hold,
            phase_timer: 0.0,
        };
        assert_eq!(compute_progress(&hold, &pattern), 0.0);

        let no_inhale = BreathingPattern::new("x", 0.0, 0.0, 4.0, 0.0).expect("valid");
        let inhale = SessionState {
            active: true,
            ..Default::default()
        };
        assert_eq!(compute_progress(&inhale, &no_inhale), 1.0);
    }

    #[test]
    fn idle_progress_stays_in_unit_range() {
        for i in 0..200 {
            let p = idle_progress(i as f32 * 0.37);
            assert!((0.0..=1.0).contains(&p));
        }
        assert!((idle_progress(0.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn instruction_adds_guidance_only_while_active() {
        let mut session = SessionState::default();
        assert_eq!(
            instruction_text(&session, Some("You are safe")),
            IDLE_INSTRUCTION
        );

        session.start();
        assert_eq!(instruction_text(&session, None), "Inhale...");
        assert_eq!(
            instruction_text(&session, Some("You are safe")),
            "Inhale... You are safe"
        );
    }
}
