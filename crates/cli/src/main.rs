#![deny(warnings)]

use anyhow::Context;
use breath_droplet_core::animation::AttentionLevel;
use breath_droplet_core::audio::AudioSink;
use breath_droplet_core::breath::PatternKind;
use breath_droplet_core::config::{
    resolve_optional_string, resolve_parsed, resolve_string_with_default, AppConfig,
    DetectionConfig, Env, FrameRate, StdEnv, UnitLevel, DEFAULT_FRAME_RATE, DEFAULT_INTENSITY,
    DEFAULT_LOG_LEVEL, DEFAULT_VOLUME, ENV_ATTENTION, ENV_EMOTION_SCRIPT, ENV_LOG_LEVEL,
    ENV_PATTERN,
};
use breath_droplet_core::emotion::{ExpressionClassifier, ScriptedClassifier, SimulatedClassifier};
use breath_droplet_core::engine::{Command, Engine};
use breath_droplet_core::render::LogRenderSink;
use clap::Parser;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "breath-droplet")]
#[command(about = "Guided breathing with an emotion-reactive water droplet")]
#[command(after_help = "Commands on stdin: space | start | stop | pattern <normal|box|478> | \
attention <high|low|dynamic> | intensity <0-1> | volume <0-1> | a | e | r | q")]
struct Args {
    /// Breathing pattern: normal, box or 478
    #[arg(long)]
    pattern: Option<String>,

    /// Attention level: high, low or dynamic
    #[arg(long)]
    attention: Option<String>,

    #[arg(long, default_value_t = DEFAULT_INTENSITY)]
    intensity: f32,

    #[arg(long, default_value_t = DEFAULT_VOLUME)]
    volume: f32,

    /// Enable audio cues at start-up
    #[arg(long)]
    audio: bool,

    /// Start emotion detection at start-up
    #[arg(long)]
    detect: bool,

    /// React to detected emotions (implies --detect)
    #[arg(long)]
    respond: bool,

    /// JSON script of detections to replay instead of the simulated classifier
    #[arg(long)]
    emotion_script: Option<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_FRAME_RATE)]
    fps: u32,

    /// Start a session immediately
    #[arg(long)]
    start: bool,

    #[arg(long)]
    seed: Option<u64>,

    /// Stop after this many seconds
    #[arg(long)]
    run_for_secs: Option<u64>,

    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let env = StdEnv;
    let level =
        resolve_string_with_default(args.log_level.clone(), ENV_LOG_LEVEL, &env, DEFAULT_LOG_LEVEL);
    init_tracing(&level)?;

    let script = resolve_optional_string(
        args.emotion_script
            .as_ref()
            .map(|p| p.display().to_string()),
        ENV_EMOTION_SCRIPT,
        &env,
    );
    let run_for = args.run_for_secs.map(Duration::from_secs);
    let cfg = build_config(args, &env)?;

    tracing::info!(
        pattern = %cfg.pattern,
        attention = %cfg.attention,
        fps = cfg.frame_rate.per_sec,
        "config loaded"
    );

    match script {
        Some(path) => {
            let classifier = ScriptedClassifier::from_json_file(Path::new(&path))
                .with_context(|| format!("loading emotion script {path}"))?;
            run_with(cfg, classifier, run_for).await
        }
        None => {
            let classifier = SimulatedClassifier::new(cfg.rng_seed);
            run_with(cfg, classifier, run_for).await
        }
    }
}

async fn run_with<C>(cfg: AppConfig, classifier: C, run_for: Option<Duration>) -> anyhow::Result<()>
where
    C: ExpressionClassifier + 'static,
{
    #[cfg(feature = "tone-output")]
    let audio = breath_droplet_core::audio::ToneAudioSink::new();
    #[cfg(not(feature = "tone-output"))]
    let audio = breath_droplet_core::audio::SilentAudioSink::new();

    run_engine(cfg, classifier, audio, run_for).await
}

async fn run_engine<C, A>(
    cfg: AppConfig,
    classifier: C,
    audio: A,
    run_for: Option<Duration>,
) -> anyhow::Result<()>
where
    C: ExpressionClassifier + 'static,
    A: AudioSink + 'static,
{
    let render = LogRenderSink::new(cfg.frame_rate.per_sec);
    let engine = Engine::new(cfg, classifier, render, audio);
    let (tx, rx) = mpsc::channel::<Command>(32);

    spawn_stdin_reader(tx.clone());
    if let Some(after) = run_for {
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(Command::Shutdown).await;
        });
    } else {
        drop(tx);
    }

    let ctx = engine.run(rx).await.context("engine failed")?;
    tracing::info!(
        session_active = ctx.session.active,
        history = ctx.emotion.history.len(),
        last_emotion = ?ctx.emotion.history.latest().map(|e| e.emotion),
        "bye"
    );
    for entry in ctx.emotion.history.iter_newest_first() {
        tracing::debug!(
            emotion = %entry.emotion,
            confidence = entry.confidence,
            change = entry.is_change,
            "history"
        );
    }
    Ok(())
}

/// Forward stdin lines to the engine from a plain thread, so a pending read
/// never holds up runtime shutdown. End of input drops this sender.
fn spawn_stdin_reader(tx: mpsc::Sender<Command>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!(error = %e, "stdin read failed");
                    return;
                }
            };
            match Command::parse(&line) {
                Ok(cmd) => {
                    if tx.blocking_send(cmd).is_err() {
                        return;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "ignoring input"),
            }
        }
    });
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn build_config(args: Args, env: &impl Env) -> anyhow::Result<AppConfig> {
    let pattern = resolve_parsed(args.pattern, ENV_PATTERN, env, PatternKind::default())?;
    let attention = resolve_parsed(args.attention, ENV_ATTENTION, env, AttentionLevel::default())?;
    let intensity = UnitLevel::new("intensity", args.intensity)?;
    let volume = UnitLevel::new("volume", args.volume)?;
    let frame_rate = FrameRate::new(args.fps)?;

    let detection = DetectionConfig {
        enabled_on_start: args.detect || args.respond,
        response_on_start: args.respond,
        ..DetectionConfig::default()
    };

    Ok(AppConfig {
        pattern,
        attention,
        intensity,
        volume,
        audio_enabled: args.audio,
        detection,
        frame_rate,
        auto_start_session: args.start,
        rng_seed: args.seed,
        start_time: SystemTime::now(),
    })
}
