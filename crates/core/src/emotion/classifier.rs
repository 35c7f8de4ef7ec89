use crate::emotion::{Emotion, EmotionSample, ExpressionScores};
use crate::util::{retry_with_backoff, RetryConfig};
use futures::future::BoxFuture;
use futures::FutureExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const LOG_TARGET: &str = "emotion::classifier";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EmotionError {
    #[error("expression models failed to load: {details}")]
    ModelLoad { details: String },

    #[error("expression model loading timed out after {0:?}")]
    ModelLoadTimeout(Duration),

    #[error("camera unavailable: {details}")]
    CameraUnavailable { details: String },

    #[error("expression classification failed: {details}")]
    Classification { details: String },

    #[error("invalid emotion script: {details}")]
    Script { details: String },
}

impl EmotionError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ModelLoad { .. })
    }
}

/// What one classifier invocation saw.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Detection {
    /// The camera has no frame to look at yet.
    NotReady,
    NoFace,
    Face(EmotionSample),
}

impl Detection {
    pub fn face_present(&self) -> bool {
        matches!(self, Self::Face(_))
    }
}

pub trait ExpressionClassifier: Send + Sync {
    fn load_models(&self) -> BoxFuture<'_, Result<(), EmotionError>>;

    fn start_capture(&self) -> BoxFuture<'_, Result<(), EmotionError>>;

    fn stop_capture(&self) -> BoxFuture<'_, ()>;

    fn classify(&self) -> BoxFuture<'_, Result<Detection, EmotionError>>;
}

impl<T> ExpressionClassifier for Arc<T>
where
    T: ExpressionClassifier + ?Sized,
{
    fn load_models(&self) -> BoxFuture<'_, Result<(), EmotionError>> {
        (**self).load_models()
    }

    fn start_capture(&self) -> BoxFuture<'_, Result<(), EmotionError>> {
        (**self).start_capture()
    }

    fn stop_capture(&self) -> BoxFuture<'_, ()> {
        (**self).stop_capture()
    }

    fn classify(&self) -> BoxFuture<'_, Result<Detection, EmotionError>> {
        (**self).classify()
    }
}

/// Load models with bounded retries, giving up once `timeout` has elapsed overall.
pub async fn load_models_with_retry<C>(
    classifier: &C,
    retry: &RetryConfig,
    timeout: Duration,
) -> Result<(), EmotionError>
where
    C: ExpressionClassifier + ?Sized,
{
    let attempts = retry_with_backoff(retry, || classifier.load_models(), EmotionError::is_retryable);
    match tokio::time::timeout(timeout, attempts).await {
        Ok(result) => result,
        Err(_) => Err(EmotionError::ModelLoadTimeout(timeout)),
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!(target: LOG_TARGET, "classifier state lock was poisoned; recovering");
            poisoned.into_inner()
        }
    }
}

/// Replays a fixed sequence of detections, then reports no face.
pub struct ScriptedClassifier {
    steps: Mutex<VecDeque<Result<Detection, EmotionError>>>,
    load_failures_left: AtomicU32,
    load_calls: AtomicU32,
    classify_calls: AtomicU32,
    camera_available: bool,
    capturing: AtomicBool,
}

impl ScriptedClassifier {
    pub fn new<I>(samples: I) -> Self
    where
        I: IntoIterator<Item = Option<EmotionSample>>,
    {
        let steps = samples
            .into_iter()
            .map(|s| Ok(s.map_or(Detection::NoFace, Detection::Face)))
            .collect();
        Self {
            steps: Mutex::new(steps),
            load_failures_left: AtomicU32::new(0),
            load_calls: AtomicU32::new(0),
            classify_calls: AtomicU32::new(0),
            camera_available: true,
            capturing: AtomicBool::new(false),
        }
    }

    /// Parse a JSON array whose items are `null` or `{"emotion": "...", "confidence": 0.9}`.
    pub fn from_json_str(json: &str) -> Result<Self, EmotionError> {
        let samples: Vec<Option<EmotionSample>> =
            serde_json::from_str(json).map_err(|e| EmotionError::Script {
                details: e.to_string(),
            })?;
        if let Some(bad) = samples
            .iter()
            .flatten()
            .find(|s| !(0.0..=1.0).contains(&s.confidence))
        {
            return Err(EmotionError::Script {
                details: format!("confidence {} outside [0, 1]", bad.confidence),
            });
        }
        Ok(Self::new(samples))
    }

    pub fn from_json_file(path: &Path) -> Result<Self, EmotionError> {
        let json = std::fs::read_to_string(path).map_err(|e| EmotionError::Script {
            details: format!("{}: {e}", path.display()),
        })?;
        Self::from_json_str(&json)
    }

    pub fn with_load_failures(self, failures: u32) -> Self {
        self.load_failures_left.store(failures, Ordering::Relaxed);
        self
    }

    pub fn without_camera(mut self) -> Self {
        self.camera_available = false;
        self
    }

    pub fn then_error<S: Into<String>>(self, details: S) -> Self {
        lock(&self.steps).push_back(Err(EmotionError::Classification {
            details: details.into(),
        }));
        self
    }

    pub fn then_not_ready(self) -> Self {
        lock(&self.steps).push_back(Ok(Detection::NotReady));
        self
    }

    pub fn then_samples<I>(self, samples: I) -> Self
    where
        I: IntoIterator<Item = Option<EmotionSample>>,
    {
        lock(&self.steps).extend(
            samples
                .into_iter()
                .map(|s| Ok(s.map_or(Detection::NoFace, Detection::Face))),
        );
        self
    }

    pub fn load_calls(&self) -> u32 {
        self.load_calls.load(Ordering::Relaxed)
    }

    pub fn classify_calls(&self) -> u32 {
        self.classify_calls.load(Ordering::Relaxed)
    }

    pub fn remaining(&self) -> usize {
        lock(&self.steps).len()
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::Relaxed)
    }
}

impl ExpressionClassifier for ScriptedClassifier {
    fn load_models(&self) -> BoxFuture<'_, Result<(), EmotionError>> {
        async move {
            self.load_calls.fetch_add(1, Ordering::Relaxed);
            let left = self.load_failures_left.load(Ordering::Relaxed);
            if left > 0 {
                self.load_failures_left.store(left - 1, Ordering::Relaxed);
                return Err(EmotionError::ModelLoad {
                    details: "scripted load failure".to_owned(),
                });
            }
            Ok(())
        }
        .boxed()
    }

    fn start_capture(&self) -> BoxFuture<'_, Result<(), EmotionError>> {
        async move {
            if !self.camera_available {
                return Err(EmotionError::CameraUnavailable {
                    details: "no camera found".to_owned(),
                });
            }
            self.capturing.store(true, Ordering::Relaxed);
            Ok(())
        }
        .boxed()
    }

    fn stop_capture(&self) -> BoxFuture<'_, ()> {
        async move {
            self.capturing.store(false, Ordering::Relaxed);
        }
        .boxed()
    }

    fn classify(&self) -> BoxFuture<'_, Result<Detection, EmotionError>> {
        async move {
            self.classify_calls.fetch_add(1, Ordering::Relaxed);
            if !self.is_capturing() {
                return Ok(Detection::NotReady);
            }
            lock(&self.steps).pop_front().unwrap_or(Ok(Detection::NoFace))
        }
        .boxed()
    }
}

struct SimulatedState {
    rng: StdRng,
    mood: Emotion,
    face_present: bool,
    capturing: bool,
}

/// A stand-in for a webcam model: a sustained mood with occasional glances away,
/// noisy frames and mood shifts.
pub struct SimulatedClassifier {
    state: Mutex<SimulatedState>,
}

impl SimulatedClassifier {
    pub fn new(seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mood = Emotion::ALL[rng.random_range(0..Emotion::ALL.len())];
        Self {
            state: Mutex::new(SimulatedState {
                rng,
                mood,
                face_present: true,
                capturing: false,
            }),
        }
    }
}

impl ExpressionClassifier for SimulatedClassifier {
    fn load_models(&self) -> BoxFuture<'_, Result<(), EmotionError>> {
        async move { Ok(()) }.boxed()
    }

    fn start_capture(&self) -> BoxFuture<'_, Result<(), EmotionError>> {
        async move {
            lock(&self.state).capturing = true;
            Ok(())
        }
        .boxed()
    }

    fn stop_capture(&self) -> BoxFuture<'_, ()> {
        async move {
            lock(&self.state).capturing = false;
        }
        .boxed()
    }

    fn classify(&self) -> BoxFuture<'_, Result<Detection, EmotionError>> {
        async move {
            let mut guard = lock(&self.state);
            let s = &mut *guard;
            if !s.capturing {
                return Ok(Detection::NotReady);
            }

            let flip = if s.face_present { 0.02 } else { 0.2 };
            if s.rng.random_bool(flip) {
                s.face_present = !s.face_present;
            }
            if !s.face_present {
                return Ok(Detection::NoFace);
            }

            if s.rng.random_bool(0.01) {
                s.mood = Emotion::ALL[s.rng.random_range(0..Emotion::ALL.len())];
                tracing::debug!(target: LOG_TARGET, mood = %s.mood, "simulated mood shift");
            }

            // Mostly the sustained mood; sometimes a brief, weaker glance at another.
            let (leader, peak) = if s.rng.random_bool(0.15) {
                (Emotion::ALL[s.rng.random_range(0..Emotion::ALL.len())], 0.3f32..0.7)
            } else {
                (s.mood, 0.55f32..0.95)
            };
            let mut scores = Vec::with_capacity(Emotion::ALL.len());
            for emotion in Emotion::ALL {
                let score = if emotion == leader {
                    s.rng.random_range(peak.clone())
                } else {
                    s.rng.random_range(0.0f32..0.25)
                };
                scores.push((emotion, score));
            }
            Ok(ExpressionScores(scores)
                .dominant()
                .map_or(Detection::NoFace, Detection::Face))
        }
        .boxed()
    }
}
