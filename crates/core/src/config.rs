use crate::animation::AttentionLevel;
use crate::breath::PatternKind;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

pub const DEFAULT_INTENSITY: f32 = 0.5;
pub const DEFAULT_VOLUME: f32 = 0.5;
pub const DEFAULT_FRAME_RATE: u32 = 60;
pub const ENV_PATTERN: &str = "BREATH_PATTERN";
pub const ENV_ATTENTION: &str = "BREATH_ATTENTION";
pub const ENV_EMOTION_SCRIPT: &str = "BREATH_EMOTION_SCRIPT";
pub const ENV_LOG_LEVEL: &str = "BREATH_LOG_LEVEL";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// A user-facing slider value in `[0, 1]`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct UnitLevel(f32);

impl UnitLevel {
    pub fn new(name: &'static str, value: f32) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::OutOfRange { name, value });
        }
        Ok(Self(value))
    }

    pub fn get(self) -> f32 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FrameRate {
    pub per_sec: u32,
}

impl FrameRate {
    pub fn new(per_sec: u32) -> Result<Self, ConfigError> {
        if per_sec == 0 {
            return Err(ConfigError::ZeroFrameRate);
        }
        Ok(Self { per_sec })
    }

    pub fn period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.per_sec))
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self {
            per_sec: DEFAULT_FRAME_RATE,
        }
    }
}

/// Face detection timing and start-up behaviour.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DetectionConfig {
    pub enabled_on_start: bool,
    pub response_on_start: bool,
    /// Cadence while a face is in view.
    pub face_interval: Duration,
    /// Cadence while no face is in view or the camera frame is not ready.
    pub idle_interval: Duration,
    /// Cadence after a classifier error.
    pub error_interval: Duration,
    pub model_load_attempts: u32,
    pub model_load_backoff: Duration,
    pub model_load_timeout: Duration,
}

impl DetectionConfig {
    pub fn interval_for(&self, face_present: bool) -> Duration {
        if face_present {
            self.face_interval
        } else {
            self.idle_interval
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            enabled_on_start: false,
            response_on_start: false,
            face_interval: Duration::from_millis(100),
            idle_interval: Duration::from_millis(500),
            error_interval: Duration::from_millis(1000),
            model_load_attempts: 4,
            model_load_backoff: Duration::from_millis(500),
            model_load_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub pattern: PatternKind,
    pub attention: AttentionLevel,
    pub intensity: UnitLevel,
    pub volume: UnitLevel,
    pub audio_enabled: bool,
    pub detection: DetectionConfig,
    pub frame_rate: FrameRate,
    pub auto_start_session: bool,
    pub rng_seed: Option<u64>,
    pub start_time: SystemTime,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pattern: PatternKind::default(),
            attention: AttentionLevel::default(),
            intensity: UnitLevel(DEFAULT_INTENSITY),
            volume: UnitLevel(DEFAULT_VOLUME),
            audio_enabled: false,
            detection: DetectionConfig::default(),
            frame_rate: FrameRate::default(),
            auto_start_session: false,
            rng_seed: None,
            start_time: SystemTime::now(),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be within [0, 1], got {value}")]
    OutOfRange { name: &'static str, value: f32 },
    #[error("frame rate must be > 0")]
    ZeroFrameRate,
    #[error("invalid value for {key}: {details}")]
    Invalid { key: &'static str, details: String },
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn resolve_string_with_default(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
    default: &str,
) -> String {
    match cli_value {
        Some(v) => v,
        None => env.var(env_key).unwrap_or_else(|| default.to_owned()),
    }
}

pub fn resolve_optional_string(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Option<String> {
    match cli_value {
        Some(v) => Some(v),
        None => env.var(env_key),
    }
}

/// Resolve a parseable setting: CLI first, then the environment, then `default`.
pub fn resolve_parsed<T>(
    cli_value: Option<String>,
    env_key: &'static str,
    env: &impl Env,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match resolve_optional_string(cli_value, env_key, env) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key: env_key,
            details: e.to_string(),
        }),
        None => Ok(default),
    }
}
