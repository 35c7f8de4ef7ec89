//! The session engine: owns all mutable state and drives the render tick,
//! the detection cycle and user commands from one task.

mod clock;
mod command;
mod schedule;

use crate::animation::{
    compute_turbulence, droplet_pose, droplet_scale, normal_scale, AnimationParams,
    AttentionLevel, RipplePool, RIPPLE_RATE_PER_SEC,
};
use crate::audio::{phase_cue, AudioController, AudioSink};
use crate::breath::{
    compute_progress, idle_progress, instruction_text, tick_session, BreathingPattern,
    PatternKind, SessionState,
};
use crate::color::{begin_color_transition, ColorTransition, Rgb};
use crate::config::AppConfig;
use crate::emotion::{
    load_models_with_retry, update_emotion_state, Detection, Emotion, EmotionError,
    EmotionHistory, EmotionSample, EmotionState, ExpressionClassifier, StabilizerOutcome,
    GUIDANCE_STABILITY, NEUTRAL_DROPLET_COLOR,
};
use crate::render::{FrameParams, RenderError, RenderSink};
use crate::util::RetryConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};

pub use clock::{ClockTick, PhaseClock};
pub use command::{Command, CommandParseError};
pub use schedule::DetectionSchedule;

const LOG_TARGET: &str = "engine";
const DETECTION_OFF_FADE_SECS: f32 = 1.5;
const RESPONSE_OFF_FADE_SECS: f32 = 2.0;
const BACKGROUND_TINT: f32 = 0.2;

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("renderer failed to start: {0}")]
    Render(#[from] RenderError),
}

/// User-adjustable settings.
#[derive(Clone, Debug)]
pub struct Settings {
    pub pattern_kind: PatternKind,
    pub pattern: BreathingPattern,
    pub attention: AttentionLevel,
    pub intensity: f32,
    pub volume: f32,
    pub audio_enabled: bool,
    pub detection_enabled: bool,
    pub response_enabled: bool,
}

#[derive(Clone, Debug, Default)]
pub struct EmotionContext {
    pub state: EmotionState,
    pub history: EmotionHistory,
}

#[derive(Clone, Debug)]
pub struct AnimationState {
    pub params: AnimationParams,
    pub color: Rgb,
    pub transition: ColorTransition,
    pub ripples: RipplePool,
    pub background_tint: Rgb,
    pub water_time: f32,
}

impl Default for AnimationState {
    fn default() -> Self {
        Self {
            params: AnimationParams::default(),
            color: NEUTRAL_DROPLET_COLOR,
            transition: ColorTransition::idle(),
            ripples: RipplePool::new(NEUTRAL_DROPLET_COLOR),
            background_tint: Rgb::default(),
            water_time: 0.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppContext {
    pub settings: Settings,
    pub session: SessionState,
    pub emotion: EmotionContext,
    pub animation: AnimationState,
}

impl AppContext {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            settings: Settings {
                pattern_kind: config.pattern,
                pattern: config.pattern.pattern(),
                attention: config.attention,
                intensity: config.intensity.get(),
                volume: config.volume.get(),
                audio_enabled: false,
                detection_enabled: false,
                response_enabled: false,
            },
            session: SessionState::default(),
            emotion: EmotionContext::default(),
            animation: AnimationState::default(),
        }
    }

    /// The detected label, but only while the droplet is allowed to react to it.
    pub fn reactive_emotion(&self) -> Option<Emotion> {
        if self.settings.response_enabled {
            self.emotion.state.current
        } else {
            None
        }
    }
}

type ModelLoad = JoinHandle<Result<(), EmotionError>>;

/// Detection the user asked for before the expression models were ready.
#[derive(Clone, Copy, Debug, Default)]
struct PendingDetection {
    enable: bool,
    respond: bool,
}

pub struct Engine<C, R, A> {
    classifier: Arc<C>,
    render: R,
    audio: AudioController<A>,
    config: AppConfig,
    ctx: AppContext,
    detection: DetectionSchedule,
    rng: StdRng,
    retry: RetryConfig,
    models_loaded: bool,
    loading: Option<ModelLoad>,
    pending: PendingDetection,
    started: Instant,
}

impl<C, R, A> Engine<C, R, A>
where
    C: ExpressionClassifier + 'static,
    R: RenderSink,
    A: AudioSink,
{
    pub fn new(config: AppConfig, classifier: C, render: R, audio: A) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let retry = RetryConfig::new(
            config.detection.model_load_attempts,
            config.detection.model_load_backoff,
        );
        Self {
            classifier: Arc::new(classifier),
            render,
            audio: AudioController::new(audio),
            ctx: AppContext::new(&config),
            config,
            detection: DetectionSchedule::default(),
            rng,
            retry,
            models_loaded: false,
            loading: None,
            pending: PendingDetection::default(),
            started: Instant::now(),
        }
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    /// Run until `Shutdown` arrives or every sender is dropped, returning the final state.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
    ) -> Result<AppContext, EngineError> {
        self.render.init().await?;
        self.started = Instant::now();
        self.startup().await;

        let mut clock = PhaseClock::new(self.started);
        let mut frames = tokio::time::interval(self.config.frame_rate.period());
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let due = self.detection.next_due();
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(Command::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd).await,
                },
                now = frames.tick() => {
                    let tick = clock.tick(now);
                    self.render_tick(tick).await;
                }
                _ = sleep_until_due(due) => {
                    self.detection.take_due();
                    self.detection_cycle().await;
                }
                loaded = join_model_load(&mut self.loading) => {
                    self.loading = None;
                    self.models_ready(loaded).await;
                }
            }
        }

        self.shutdown().await;
        Ok(self.ctx)
    }

    async fn startup(&mut self) {
        if self.config.audio_enabled {
            self.enable_audio().await;
        }
        self.pending = PendingDetection {
            enable: self.config.detection.enabled_on_start,
            respond: self.config.detection.response_on_start,
        };
        self.begin_model_load();
        if self.config.auto_start_session {
            self.start_session().await;
        }
        tracing::info!(
            target: LOG_TARGET,
            pattern = %self.ctx.settings.pattern_kind,
            attention = %self.ctx.settings.attention,
            audio = self.ctx.settings.audio_enabled,
            detection = self.pending.enable,
            "engine started"
        );
    }

    async fn shutdown(&mut self) {
        if let Some(loading) = self.loading.take() {
            loading.abort();
        }
        if self.ctx.settings.detection_enabled {
            self.disable_detection().await;
        }
        self.audio.stop_noise().await;
        tracing::info!(
            target: LOG_TARGET,
            history = self.ctx.emotion.history.len(),
            "engine stopped"
        );
    }

    async fn handle_command(&mut self, cmd: Command) {
        tracing::debug!(target: LOG_TARGET, command = ?cmd, "command");
        match cmd {
            Command::StartSession => {
                if !self.ctx.session.active {
                    self.start_session().await;
                }
            }
            Command::StopSession => {
                if self.ctx.session.active {
                    self.stop_session().await;
                }
            }
            Command::ToggleSession => {
                if self.ctx.session.active {
                    self.stop_session().await;
                } else {
                    self.start_session().await;
                }
            }
            Command::SetPattern(kind) => {
                self.ctx.settings.pattern_kind = kind;
                self.ctx.settings.pattern = kind.pattern();
                tracing::info!(target: LOG_TARGET, pattern = %kind, "breathing pattern set");
            }
            Command::SetAttention(level) => {
                self.ctx.settings.attention = level;
                tracing::info!(target: LOG_TARGET, attention = %level, "attention set");
            }
            Command::SetIntensity(level) => {
                self.ctx.settings.intensity = level.clamp(0.0, 1.0);
            }
            Command::SetVolume(level) => {
                self.ctx.settings.volume = level.clamp(0.0, 1.0);
                self.audio.set_volume(self.ctx.settings.volume).await;
            }
            Command::ToggleAudio => {
                if self.ctx.settings.audio_enabled {
                    self.audio.disable().await;
                    self.ctx.settings.audio_enabled = false;
                } else {
                    self.enable_audio().await;
                }
            }
            Command::ToggleDetection => {
                if self.ctx.settings.detection_enabled {
                    self.disable_detection().await;
                } else if self.models_loaded {
                    self.enable_detection().await;
                } else if self.loading.is_some() {
                    self.pending.enable = !self.pending.enable;
                    self.pending.respond = false;
                    tracing::info!(
                        target: LOG_TARGET,
                        requested = self.pending.enable,
                        "expression models still loading"
                    );
                } else {
                    self.pending = PendingDetection {
                        enable: true,
                        respond: false,
                    };
                    self.begin_model_load();
                }
            }
            Command::ToggleResponse => self.toggle_response(),
            Command::Shutdown => {}
        }
    }

    async fn start_session(&mut self) {
        self.ctx.session.start();
        tracing::info!(
            target: LOG_TARGET,
            pattern = %self.ctx.settings.pattern_kind,
            "session started"
        );
        self.play_phase_cue().await;
        self.trigger_ripple();
    }

    async fn stop_session(&mut self) {
        self.ctx.session.stop();
        self.audio.stop_noise().await;
        tracing::info!(target: LOG_TARGET, "session stopped");
    }

    async fn enable_audio(&mut self) {
        self.ctx.settings.audio_enabled = self.audio.enable(self.ctx.settings.volume).await;
        if self.ctx.settings.audio_enabled && self.ctx.session.active {
            self.play_phase_cue().await;
        }
    }

    async fn play_phase_cue(&mut self) {
        let chord = self
            .ctx
            .reactive_emotion()
            .unwrap_or(Emotion::Neutral)
            .chord();
        let volume = self.ctx.settings.volume;
        let cue = phase_cue(self.ctx.session.phase, &self.ctx.settings.pattern, chord, volume);
        self.audio.play(cue, volume).await;
    }

    /// Ripples take the emotion colour while the droplet reacts; otherwise the
    /// slot keeps the colour it last showed.
    fn trigger_ripple(&mut self) {
        let color = self.ctx.reactive_emotion().map(Emotion::color);
        self.ctx.animation.ripples.trigger(color);
    }

    /// Start a blend toward `emotion`'s colour and recolour everything tied to it.
    fn retarget_color(&mut self, emotion: Emotion) {
        let anim = &mut self.ctx.animation;
        let target = emotion.color();
        anim.transition = begin_color_transition(anim.color, target);
        anim.ripples.recolor(target);
        anim.background_tint = target.scale(BACKGROUND_TINT);
        tracing::debug!(
            target: LOG_TARGET,
            emotion = %emotion,
            secs = anim.transition.duration_secs(),
            "droplet colour transition"
        );
    }

    fn fade_to_neutral(&mut self, secs: f32) {
        let anim = &mut self.ctx.animation;
        anim.transition = ColorTransition::toward(anim.color, NEUTRAL_DROPLET_COLOR, secs);
    }

    fn toggle_response(&mut self) {
        if !self.ctx.settings.detection_enabled {
            tracing::warn!(target: LOG_TARGET, "emotion response needs detection; ignoring");
            return;
        }
        let enabled = !self.ctx.settings.response_enabled;
        self.ctx.settings.response_enabled = enabled;
        if !enabled {
            self.fade_to_neutral(RESPONSE_OFF_FADE_SECS);
        } else if let Some(current) = self.ctx.emotion.state.current {
            self.retarget_color(current);
        }
        tracing::info!(target: LOG_TARGET, enabled, "emotion response toggled");
    }

    /// Fetch the expression models on their own task so frames and commands
    /// keep flowing; `models_ready` picks up the result.
    fn begin_model_load(&mut self) {
        if self.models_loaded || self.loading.is_some() {
            return;
        }
        let classifier = Arc::clone(&self.classifier);
        let retry = self.retry.clone();
        let timeout = self.config.detection.model_load_timeout;
        tracing::debug!(target: LOG_TARGET, "loading expression models");
        self.loading = Some(tokio::spawn(async move {
            load_models_with_retry(&*classifier, &retry, timeout).await
        }));
    }

    async fn models_ready(&mut self, loaded: Result<Result<(), EmotionError>, JoinError>) {
        let pending = std::mem::take(&mut self.pending);
        match loaded {
            Ok(Ok(())) => {
                self.models_loaded = true;
                tracing::info!(target: LOG_TARGET, "expression models loaded");
            }
            Ok(Err(e)) => {
                tracing::error!(
                    target: LOG_TARGET,
                    error = %e,
                    "expression models unavailable; detection stays off"
                );
                return;
            }
            Err(e) => {
                tracing::error!(target: LOG_TARGET, error = %e, "model loading task failed");
                return;
            }
        }

        if pending.enable {
            self.enable_detection().await;
            if pending.respond && self.ctx.settings.detection_enabled {
                self.toggle_response();
            }
        }
    }

    async fn enable_detection(&mut self) {
        if let Err(e) = self.classifier.start_capture().await {
            tracing::error!(target: LOG_TARGET, error = %e, "cannot start detection");
            return;
        }

        self.ctx.settings.detection_enabled = true;
        self.detection.start(Instant::now());
        tracing::info!(target: LOG_TARGET, "emotion detection started");
    }

    async fn disable_detection(&mut self) {
        self.detection.stop();
        self.classifier.stop_capture().await;
        self.ctx.settings.detection_enabled = false;
        self.ctx.settings.response_enabled = false;
        self.ctx.emotion.state.reset();
        self.fade_to_neutral(DETECTION_OFF_FADE_SECS);
        tracing::info!(target: LOG_TARGET, "emotion detection stopped");
    }

    async fn detection_cycle(&mut self) {
        if !self.detection.is_active() {
            return;
        }
        let result = self.classifier.classify().await;
        if !self.detection.is_active() {
            return;
        }

        let cadence = match result {
            Ok(Detection::NotReady) => self.config.detection.idle_interval,
            Ok(Detection::NoFace) => {
                update_emotion_state(&mut self.ctx.emotion.state, None);
                self.config.detection.interval_for(false)
            }
            Ok(Detection::Face(sample)) => {
                self.apply_sample(sample);
                self.config.detection.interval_for(true)
            }
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, error = %e, "expression classification failed");
                self.config.detection.error_interval
            }
        };
        self.detection.reschedule(Instant::now(), cadence);
    }

    fn apply_sample(&mut self, sample: EmotionSample) {
        let outcome = update_emotion_state(&mut self.ctx.emotion.state, Some(sample));
        tracing::debug!(
            target: LOG_TARGET,
            ?outcome,
            stability = self.ctx.emotion.state.stability,
            "emotion sample"
        );

        let now = self.wall_clock();
        match outcome {
            StabilizerOutcome::Reinforced(emotion)
                if self.ctx.emotion.state.stability > GUIDANCE_STABILITY =>
            {
                self.ctx
                    .emotion
                    .history
                    .record_agreement(emotion, sample.confidence, now);
            }
            StabilizerOutcome::Switched { previous, current } => {
                tracing::info!(
                    target: LOG_TARGET,
                    from = previous.map(Emotion::as_str),
                    to = %current,
                    confidence = sample.confidence,
                    "emotion changed"
                );
                if self.ctx.settings.response_enabled {
                    self.retarget_color(current);
                    self.trigger_ripple();
                    if previous.is_some() {
                        self.ctx
                            .emotion
                            .history
                            .record_change(current, sample.confidence, now);
                    }
                }
            }
            _ => {}
        }
    }

    async fn render_tick(&mut self, tick: ClockTick) {
        let ClockTick {
            delta_secs: dt,
            elapsed_secs: elapsed,
        } = tick;

        if let Some(phase) = tick_session(&mut self.ctx.session, &self.ctx.settings.pattern, dt) {
            tracing::debug!(target: LOG_TARGET, %phase, "breath phase");
            self.play_phase_cue().await;
            self.trigger_ripple();
        }

        let reactive = self.ctx.reactive_emotion();
        let settings = &self.ctx.settings;
        let session = &self.ctx.session;
        let anim = &mut self.ctx.animation;

        anim.params = if session.active {
            AnimationParams {
                breath_progress: compute_progress(session, &settings.pattern),
                turbulence: compute_turbulence(settings.attention, elapsed, reactive, &mut self.rng),
            }
        } else {
            AnimationParams {
                breath_progress: idle_progress(elapsed),
                turbulence: 0.0,
            }
        };

        if let Some(color) = anim.transition.update(dt) {
            anim.color = color;
        }

        anim.ripples.update(dt);
        let spontaneous = session.active && self.rng.random::<f32>() < dt * RIPPLE_RATE_PER_SEC;
        anim.water_time += dt * settings.intensity;
        if spontaneous {
            self.trigger_ripple();
        }

        let frame = self.frame(elapsed, reactive);
        if let Err(e) = self.render.apply(frame).await {
            tracing::warn!(target: LOG_TARGET, error = %e, "frame dropped");
        }
    }

    fn frame(&mut self, elapsed: f32, reactive: Option<Emotion>) -> FrameParams {
        let anim = &self.ctx.animation;
        let AnimationParams {
            breath_progress,
            turbulence,
        } = anim.params;

        let guidance = reactive
            .filter(|_| self.ctx.emotion.state.is_guidance_stable())
            .and_then(Emotion::guidance);

        FrameParams {
            breath_progress,
            turbulence,
            color: anim.color,
            background_tint: anim.background_tint,
            scale: droplet_scale(breath_progress, turbulence, &mut self.rng),
            normal_scale: normal_scale(self.ctx.settings.intensity, turbulence),
            pose: droplet_pose(elapsed, reactive),
            water_time: anim.water_time,
            ripples: anim.ripples.active().copied().collect(),
            instruction: instruction_text(&self.ctx.session, guidance),
            emotion_indicator: self.ctx.emotion.state.current.map(Emotion::indicator_color),
            breaths_per_minute: self.ctx.settings.pattern.breaths_per_minute(),
            session_active: self.ctx.session.active,
            phase: self.ctx.session.phase,
        }
    }

    /// Wall-clock time derived from the monotonic clock, so history timestamps
    /// advance with the engine rather than the host.
    fn wall_clock(&self) -> SystemTime {
        self.config.start_time + self.started.elapsed()
    }
}

async fn sleep_until_due(due: Option<Instant>) {
    match due {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn join_model_load(
    loading: &mut Option<ModelLoad>,
) -> Result<Result<(), EmotionError>, JoinError> {
    match loading.as_mut() {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioError, PhaseCue, VolumeSettings};
    use crate::breath::BreathPhase;
    use crate::config::FrameRate;
    use crate::emotion::ScriptedClassifier;
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::task::JoinHandle;

    #[derive(Clone, Default)]
    struct RecordingRender {
        frames: Arc<Mutex<Vec<FrameParams>>>,
        unsupported: bool,
    }

    impl RecordingRender {
        fn last(&self) -> FrameParams {
            self.frames
                .lock()
                .expect("frames lock")
                .last()
                .cloned()
                .expect("at least one frame")
        }
    }

    impl RenderSink for RecordingRender {
        fn init(&self) -> BoxFuture<'_, Result<(), RenderError>> {
            async move {
                if self.unsupported {
                    return Err(RenderError::Unsupported {
                        details: "no gpu".to_owned(),
                    });
                }
                Ok(())
            }
            .boxed()
        }

        fn apply(&self, frame: FrameParams) -> BoxFuture<'_, Result<(), RenderError>> {
            async move {
                self.frames.lock().expect("frames lock").push(frame);
                Ok(())
            }
            .boxed()
        }
    }

    #[derive(Clone, Default)]
    struct RecordingAudio {
        cues: Arc<Mutex<Vec<PhaseCue>>>,
    }

    impl RecordingAudio {
        fn phases(&self) -> Vec<BreathPhase> {
            self.cues
                .lock()
                .expect("cues lock")
                .iter()
                .map(|c| c.phase)
                .collect()
        }
    }

    impl AudioSink for RecordingAudio {
        fn init(&self) -> BoxFuture<'_, Result<(), AudioError>> {
            async move { Ok(()) }.boxed()
        }

        fn set_volume(&self, _volume: VolumeSettings) -> BoxFuture<'_, Result<(), AudioError>> {
            async move { Ok(()) }.boxed()
        }

        fn play_cue(&self, cue: PhaseCue) -> BoxFuture<'_, Result<(), AudioError>> {
            async move {
                self.cues.lock().expect("cues lock").push(cue);
                Ok(())
            }
            .boxed()
        }

        fn stop_noise(&self) -> BoxFuture<'_, Result<(), AudioError>> {
            async move { Ok(()) }.boxed()
        }
    }

    fn test_config() -> AppConfig {
        AppConfig {
            frame_rate: FrameRate::new(20).expect("nonzero"),
            rng_seed: Some(11),
            audio_enabled: true,
            ..Default::default()
        }
    }

    fn spawn<C: ExpressionClassifier + 'static>(
        engine: Engine<C, RecordingRender, RecordingAudio>,
    ) -> (
        mpsc::Sender<Command>,
        JoinHandle<Result<AppContext, EngineError>>,
    ) {
        let (tx, rx) = mpsc::channel(16);
        (tx, tokio::spawn(engine.run(rx)))
    }

    async fn finish(
        tx: mpsc::Sender<Command>,
        handle: JoinHandle<Result<AppContext, EngineError>>,
    ) -> AppContext {
        tx.send(Command::Shutdown).await.expect("engine running");
        handle.await.expect("join").expect("engine ok")
    }

    fn happy(n: usize) -> Vec<Option<EmotionSample>> {
        vec![Some(EmotionSample::new(Emotion::Happy, 0.9)); n]
    }

    fn detecting(response: bool) -> AppConfig {
        AppConfig {
            detection: crate::config::DetectionConfig {
                enabled_on_start: true,
                response_on_start: response,
                ..Default::default()
            },
            ..test_config()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn box_session_cues_every_phase_in_order() {
        let render = RecordingRender::default();
        let audio = RecordingAudio::default();
        let config = AppConfig {
            pattern: PatternKind::Box,
            ..test_config()
        };
        let engine = Engine::new(config, ScriptedClassifier::new([]), render.clone(), audio.clone());
        let (tx, handle) = spawn(engine);

        tx.send(Command::StartSession).await.expect("send");
        tokio::time::sleep(Duration::from_secs(17)).await;
        let ctx = finish(tx, handle).await;

        assert_eq!(
            audio.phases(),
            vec![
                BreathPhase::Inhale,
                BreathPhase::Hold,
                BreathPhase::Exhale,
                BreathPhase::Rest,
                BreathPhase::Inhale,
            ]
        );
        assert!(ctx.session.active);
        assert_eq!(ctx.session.phase, BreathPhase::Inhale);

        let frame = render.last();
        assert!(frame.session_active);
        assert_eq!(frame.instruction, "Inhale...");
        assert!((0.0..=1.0).contains(&frame.breath_progress));
        assert_eq!(frame.turbulence, 0.0);
        assert_eq!(frame.breaths_per_minute, 3.75);
        assert_eq!(frame.emotion_indicator, None);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_engine_breathes_gently_without_cues() {
        let render = RecordingRender::default();
        let audio = RecordingAudio::default();
        let engine = Engine::new(test_config(), ScriptedClassifier::new([]), render.clone(), audio.clone());
        let (tx, handle) = spawn(engine);

        tokio::time::sleep(Duration::from_secs(2)).await;
        let ctx = finish(tx, handle).await;

        assert!(audio.phases().is_empty());
        assert!(!ctx.session.active);
        let frames = render.frames.lock().expect("frames lock");
        assert!(frames.len() >= 30);
        assert!(frames.iter().all(|f| f.instruction == crate::breath::IDLE_INSTRUCTION));
        assert!(frames.iter().all(|f| f.turbulence == 0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_a_session_freezes_its_phase() {
        let audio = RecordingAudio::default();
        let engine = Engine::new(
            test_config(),
            ScriptedClassifier::new([]),
            RecordingRender::default(),
            audio.clone(),
        );
        let (tx, handle) = spawn(engine);

        tx.send(Command::ToggleSession).await.expect("send");
        tokio::time::sleep(Duration::from_secs(5)).await;
        tx.send(Command::ToggleSession).await.expect("send");
        tokio::time::sleep(Duration::from_secs(10)).await;
        let ctx = finish(tx, handle).await;

        assert!(!ctx.session.active);
        assert_eq!(ctx.session.phase, BreathPhase::Exhale);
        assert_eq!(audio.phases(), vec![BreathPhase::Inhale, BreathPhase::Exhale]);
    }

    #[tokio::test(start_paused = true)]
    async fn detected_emotion_tints_the_droplet() {
        let render = RecordingRender::default();
        let config = AppConfig {
            detection: crate::config::DetectionConfig {
                enabled_on_start: true,
                response_on_start: true,
                ..Default::default()
            },
            ..test_config()
        };
        let classifier = ScriptedClassifier::new(happy(30));
        let engine = Engine::new(config, classifier, render.clone(), RecordingAudio::default());
        let (tx, handle) = spawn(engine);

        tx.send(Command::StartSession).await.expect("send");
        tokio::time::sleep(Duration::from_secs(8)).await;
        let ctx = finish(tx, handle).await;

        assert_eq!(ctx.emotion.state.current, None, "shutdown resets detection");
        assert!(!ctx.emotion.history.is_empty());
        assert!(ctx.emotion.history.iter_newest_first().all(|e| !e.is_change));
        assert!(ctx.emotion.history.len() <= crate::emotion::HISTORY_CAPACITY);

        let frames = render.frames.lock().expect("frames lock");
        let tinted = frames
            .iter()
            .rev()
            .find(|f| f.color == Emotion::Happy.color())
            .expect("droplet reached the emotion colour");
        assert_eq!(tinted.background_tint, Emotion::Happy.color().scale(0.2));
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_detection_resets_emotion_and_fades_to_neutral() {
        let config = AppConfig {
            detection: crate::config::DetectionConfig {
                enabled_on_start: true,
                response_on_start: true,
                ..Default::default()
            },
            ..test_config()
        };
        let render = RecordingRender::default();
        let engine = Engine::new(
            config,
            ScriptedClassifier::new(happy(100)),
            render.clone(),
            RecordingAudio::default(),
        );
        let (tx, handle) = spawn(engine);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(render.last().color, Emotion::Happy.color());

        tx.send(Command::ToggleDetection).await.expect("send");
        tokio::time::sleep(Duration::from_secs(3)).await;
        let ctx = finish(tx, handle).await;

        assert!(!ctx.settings.detection_enabled);
        assert!(!ctx.settings.response_enabled);
        assert_eq!(ctx.emotion.state, EmotionState::default());
        assert_eq!(render.last().color, NEUTRAL_DROPLET_COLOR);
    }

    #[tokio::test(start_paused = true)]
    async fn response_requires_detection() {
        let engine = Engine::new(
            test_config(),
            ScriptedClassifier::new([]),
            RecordingRender::default(),
            RecordingAudio::default(),
        );
        let (tx, handle) = spawn(engine);

        tx.send(Command::ToggleResponse).await.expect("send");
        tokio::time::sleep(Duration::from_millis(200)).await;
        let ctx = finish(tx, handle).await;
        assert!(!ctx.settings.response_enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_camera_leaves_detection_off() {
        let engine = Engine::new(
            test_config(),
            ScriptedClassifier::new(happy(5)).without_camera(),
            RecordingRender::default(),
            RecordingAudio::default(),
        );
        let (tx, handle) = spawn(engine);

        tx.send(Command::ToggleDetection).await.expect("send");
        tx.send(Command::StartSession).await.expect("send");
        tokio::time::sleep(Duration::from_secs(1)).await;
        let ctx = finish(tx, handle).await;

        assert!(!ctx.settings.detection_enabled);
        assert!(ctx.session.active);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_model_load_is_retried_on_next_toggle() {
        let config = AppConfig {
            detection: crate::config::DetectionConfig {
                model_load_attempts: 2,
                ..Default::default()
            },
            ..test_config()
        };
        let engine = Engine::new(
            config,
            ScriptedClassifier::new(happy(20)).with_load_failures(2),
            RecordingRender::default(),
            RecordingAudio::default(),
        );
        let (tx, handle) = spawn(engine);

        tx.send(Command::ToggleDetection).await.expect("send");
        tokio::time::sleep(Duration::from_secs(5)).await;
        tx.send(Command::ToggleDetection).await.expect("send");
        tokio::time::sleep(Duration::from_secs(3)).await;
        let ctx = finish(tx, handle).await;

        assert!(
            !ctx.emotion.history.is_empty(),
            "second toggle loaded the models and ran detection"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn frames_keep_flowing_while_models_load() {
        let render = RecordingRender::default();
        let engine = Engine::new(
            detecting(false),
            ScriptedClassifier::new(happy(40)).with_load_failures(3),
            render.clone(),
            RecordingAudio::default(),
        );
        let (tx, handle) = spawn(engine);

        tx.send(Command::StartSession).await.expect("send");
        tokio::time::sleep(Duration::from_secs(3)).await;
        let during_load = render.frames.lock().expect("frames lock").len();
        assert!(during_load >= 55, "only {during_load} frames while loading");
        assert!(render.last().breath_progress > 0.6, "inhale kept advancing");

        tokio::time::sleep(Duration::from_secs(3)).await;
        let ctx = finish(tx, handle).await;
        assert!(
            !ctx.emotion.history.is_empty(),
            "detection started once the models loaded"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn detection_cadence_follows_each_outcome() {
        let classifier = Arc::new(
            ScriptedClassifier::new(happy(1))
                .then_error("dropped frame")
                .then_not_ready()
                .then_samples([None])
                .then_samples(happy(1)),
        );
        let render = RecordingRender::default();
        let engine = Engine::new(
            detecting(false),
            Arc::clone(&classifier),
            render.clone(),
            RecordingAudio::default(),
        );
        let start = Instant::now();
        let (tx, handle) = spawn(engine);

        // face 100 ms, error 1 s, not ready 500 ms, no face 500 ms, face 100 ms
        let expected = [
            (50, 1),
            (150, 2),
            (1050, 2),
            (1150, 3),
            (1550, 3),
            (1650, 4),
            (2050, 4),
            (2150, 5),
            (2250, 6),
        ];
        for (at_ms, cycles) in expected {
            tokio::time::sleep_until(start + Duration::from_millis(at_ms)).await;
            assert_eq!(classifier.classify_calls(), cycles, "cycles run by {at_ms} ms");
        }
        assert_eq!(classifier.remaining(), 0);

        let frames = render.frames.lock().expect("frames lock").len();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(
            render.frames.lock().expect("frames lock").len() > frames,
            "render loop survived the classifier error"
        );
        finish(tx, handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn first_label_with_response_recolours_and_ripples() {
        let render = RecordingRender::default();
        let classifier = ScriptedClassifier::new([Some(EmotionSample::new(Emotion::Sad, 0.9))])
            .then_samples(happy(1));
        let engine = Engine::new(
            detecting(true),
            classifier,
            render.clone(),
            RecordingAudio::default(),
        );
        let (tx, handle) = spawn(engine);

        tokio::time::sleep(Duration::from_secs(6)).await;
        let last = render.last();
        let ctx = finish(tx, handle).await;

        // The disagreeing happy sample is held back; sad stays.
        assert_eq!(last.color, Emotion::Sad.color());
        assert_eq!(last.emotion_indicator, Some(Emotion::Sad.indicator_color()));
        let frames = render.frames.lock().expect("frames lock");
        assert!(frames
            .iter()
            .any(|f| f.ripples.iter().any(|r| r.color == Emotion::Sad.color())));
        assert!(ctx.emotion.history.iter_newest_first().all(|e| !e.is_change));
    }

    #[tokio::test(start_paused = true)]
    async fn ripples_without_response_keep_their_slot_colour() {
        let render = RecordingRender::default();
        let engine = Engine::new(
            test_config(),
            ScriptedClassifier::new([]),
            render.clone(),
            RecordingAudio::default(),
        );
        let (tx, handle) = spawn(engine);

        tx.send(Command::StartSession).await.expect("send");
        tokio::time::sleep(Duration::from_millis(200)).await;
        finish(tx, handle).await;

        let frames = render.frames.lock().expect("frames lock");
        let ripple = frames
            .iter()
            .flat_map(|f| f.ripples.iter())
            .next()
            .expect("session start ripple");
        assert_eq!(ripple.color, NEUTRAL_DROPLET_COLOR);
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_renderer_is_fatal() {
        let render = RecordingRender {
            unsupported: true,
            ..Default::default()
        };
        let engine = Engine::new(
            test_config(),
            ScriptedClassifier::new([]),
            render,
            RecordingAudio::default(),
        );
        let (_tx, rx) = mpsc::channel(1);
        let err = engine.run(rx).await.expect_err("init fails");
        assert!(matches!(err, EngineError::Render(RenderError::Unsupported { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_every_sender_ends_the_run() {
        let engine = Engine::new(
            test_config(),
            ScriptedClassifier::new([]),
            RecordingRender::default(),
            RecordingAudio::default(),
        );
        let (tx, rx) = mpsc::channel(1);
        drop(tx);
        let ctx = engine.run(rx).await.expect("clean exit");
        assert!(!ctx.session.active);
    }
}
