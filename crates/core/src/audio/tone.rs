use crate::audio::{AudioError, AudioSink, NoiseCue, PhaseCue, ToneCue, VolumeSettings, LOG_TARGET};
use futures::future::BoxFuture;
use futures::FutureExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rodio::source::Source;
use rodio::{OutputStream, OutputStreamBuilder, Sink};
use std::f32::consts::TAU;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const SAMPLE_RATE: u32 = 44_100;
const ATTACK_SECS: f32 = 0.3;
const DECAY_SECS: f32 = 0.1;
const SUSTAIN_LEVEL: f32 = 0.5;
const RELEASE_SECS: f32 = 0.5;

fn db_to_gain(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!(target: LOG_TARGET, "tone sink lock was poisoned; recovering and continuing");
            poisoned.into_inner()
        }
    }
}

/// Lazily opened output stream. [`rodio::OutputStream`] must outlive every sink
/// connected to it, so it is opened once and shared by clones.
struct LazyStream {
    value: Mutex<Option<OutputStream>>,
}

impl LazyStream {
    fn new() -> Self {
        Self {
            value: Mutex::new(None),
        }
    }

    fn connect(&self) -> Result<Sink, AudioError> {
        let mut guard = lock(&self.value);
        if guard.is_none() {
            let stream = OutputStreamBuilder::open_default_stream().map_err(|e| {
                AudioError::Unavailable {
                    details: format!("open default output stream: {e}"),
                }
            })?;
            *guard = Some(stream);
        }

        match guard.as_ref() {
            Some(stream) => {
                let mixer = stream.mixer();
                Ok(Sink::connect_new(&mixer))
            }
            None => Err(AudioError::Unavailable {
                details: "internal error: output stream cache invariant violated".to_owned(),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct NoiseState {
    running: bool,
    cutoff_hz: f32,
    gain_db: f32,
}

/// Synthesizes phase cues on the default output device: an enveloped sine tone
/// and low-passed breath noise.
#[derive(Clone)]
pub struct ToneAudioSink {
    stream: Arc<LazyStream>,
    volume: Arc<Mutex<VolumeSettings>>,
    noise: Arc<Mutex<NoiseState>>,
    noise_sink: Arc<Mutex<Option<Sink>>>,
}

impl Default for ToneAudioSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ToneAudioSink {
    pub fn new() -> Self {
        Self {
            stream: Arc::new(LazyStream::new()),
            volume: Arc::new(Mutex::new(VolumeSettings::from_volume(0.5))),
            noise: Arc::new(Mutex::new(NoiseState {
                running: false,
                cutoff_hz: 800.0,
                gain_db: VolumeSettings::from_volume(0.5).noise_db,
            })),
            noise_sink: Arc::new(Mutex::new(None)),
        }
    }

    fn play_tone(&self, tone: ToneCue) -> Result<(), AudioError> {
        let Some(freq) = tone.note.frequency_hz() else {
            return Err(AudioError::Playback {
                details: format!("unplayable note {}", tone.note.0),
            });
        };
        let gain = db_to_gain(lock(&self.volume).synth_db);
        let sink = self.stream.connect()?;
        sink.append(ToneSource::new(freq, tone.duration_secs, gain));
        sink.detach();
        Ok(())
    }

    fn render_noise(&self, cue: &PhaseCue) -> Result<(), AudioError> {
        let mut noise = lock(&self.noise);
        let segment = match cue.noise {
            NoiseCue::Stop => {
                noise.running = false;
                self.stop_noise_sink();
                return Ok(());
            }
            NoiseCue::Start { cutoff_hz, cutoff } => {
                noise.running = true;
                noise.gain_db = cue.noise_db;
                NoiseSource::new(
                    cue.phase_secs,
                    Ramp::new(cutoff_hz, cutoff.target, cutoff.over_secs),
                    Ramp::hold(db_to_gain(cue.noise_db)),
                )
            }
            NoiseCue::Shape { gain_db, cutoff } => {
                if !noise.running {
                    return Ok(());
                }
                let cutoff = match cutoff {
                    Some(c) => Ramp::new(noise.cutoff_hz, c.target, c.over_secs),
                    None => Ramp::hold(noise.cutoff_hz),
                };
                let gain = Ramp::new(
                    db_to_gain(noise.gain_db),
                    db_to_gain(gain_db.target),
                    gain_db.over_secs,
                );
                noise.gain_db = gain_db.target;
                NoiseSource::new(cue.phase_secs, cutoff, gain)
            }
        };
        noise.cutoff_hz = segment.cutoff.end;

        let sink = self.stream.connect()?;
        sink.append(segment);
        let previous = lock(&self.noise_sink).replace(sink);
        if let Some(previous) = previous {
            previous.stop();
        }
        Ok(())
    }

    fn stop_noise_sink(&self) {
        if let Some(sink) = lock(&self.noise_sink).take() {
            sink.stop();
        }
    }
}

impl AudioSink for ToneAudioSink {
    fn init(&self) -> BoxFuture<'_, Result<(), AudioError>> {
        async move {
            // Opening and immediately dropping a sink proves the device works.
            let sink = self.stream.connect()?;
            drop(sink);
            tracing::debug!(target: LOG_TARGET, "tone output ready");
            Ok(())
        }
        .boxed()
    }

    fn set_volume(&self, volume: VolumeSettings) -> BoxFuture<'_, Result<(), AudioError>> {
        async move {
            *lock(&self.volume) = volume;
            Ok(())
        }
        .boxed()
    }

    fn play_cue(&self, cue: PhaseCue) -> BoxFuture<'_, Result<(), AudioError>> {
        async move {
            if let Some(tone) = cue.tone {
                self.play_tone(tone)?;
            }
            self.render_noise(&cue)
        }
        .boxed()
    }

    fn stop_noise(&self) -> BoxFuture<'_, Result<(), AudioError>> {
        async move {
            lock(&self.noise).running = false;
            self.stop_noise_sink();
            Ok(())
        }
        .boxed()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Ramp {
    start: f32,
    end: f32,
    over_samples: u64,
}

impl Ramp {
    fn new(start: f32, end: f32, over_secs: f32) -> Self {
        Self {
            start,
            end,
            over_samples: secs_to_samples(over_secs),
        }
    }

    fn hold(value: f32) -> Self {
        Self::new(value, value, 0.0)
    }

    fn at(&self, sample: u64) -> f32 {
        if sample >= self.over_samples {
            return self.end;
        }
        let t = sample as f32 / self.over_samples as f32;
        self.start + (self.end - self.start) * t
    }
}

fn secs_to_samples(secs: f32) -> u64 {
    (secs.max(0.0) * SAMPLE_RATE as f32) as u64
}

/// Sine tone with an attack/decay/sustain envelope followed by a release tail.
struct ToneSource {
    freq: f32,
    gain: f32,
    sample: u64,
    held: u64,
    total: u64,
}

impl ToneSource {
    fn new(freq: f32, duration_secs: f32, gain: f32) -> Self {
        let held = secs_to_samples(duration_secs);
        Self {
            freq,
            gain,
            sample: 0,
            held,
            total: held + secs_to_samples(RELEASE_SECS),
        }
    }

    fn envelope(&self, t: f32) -> f32 {
        let held_secs = self.held as f32 / SAMPLE_RATE as f32;
        let level_at = |t: f32| {
            if t < ATTACK_SECS {
                t / ATTACK_SECS
            } else if t < ATTACK_SECS + DECAY_SECS {
                1.0 - (1.0 - SUSTAIN_LEVEL) * (t - ATTACK_SECS) / DECAY_SECS
            } else {
                SUSTAIN_LEVEL
            }
        };
        if t < held_secs {
            level_at(t)
        } else {
            let released = (t - held_secs) / RELEASE_SECS;
            level_at(held_secs) * (1.0 - released).max(0.0)
        }
    }
}

impl Iterator for ToneSource {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.sample >= self.total {
            return None;
        }
        let t = self.sample as f32 / SAMPLE_RATE as f32;
        self.sample += 1;
        Some((TAU * self.freq * t).sin() * self.envelope(t) * self.gain)
    }
}

impl Source for ToneSource {
    fn current_span_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f64(self.total as f64 / SAMPLE_RATE as f64))
    }
}

/// White noise through a one-pole low-pass with ramped cutoff and gain.
struct NoiseSource {
    rng: StdRng,
    cutoff: Ramp,
    gain: Ramp,
    state: f32,
    sample: u64,
    total: u64,
}

impl NoiseSource {
    fn new(duration_secs: f32, cutoff: Ramp, gain: Ramp) -> Self {
        Self {
            rng: StdRng::from_os_rng(),
            cutoff,
            gain,
            state: 0.0,
            sample: 0,
            total: secs_to_samples(duration_secs),
        }
    }
}

impl Iterator for NoiseSource {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.sample >= self.total {
            return None;
        }
        let cutoff = self.cutoff.at(self.sample);
        let alpha = 1.0 - (-TAU * cutoff / SAMPLE_RATE as f32).exp();
        let white = self.rng.random_range(-1.0f32..1.0);
        self.state += alpha * (white - self.state);
        let out = self.state * self.gain.at(self.sample);
        self.sample += 1;
        Some(out)
    }
}

impl Source for NoiseSource {
    fn current_span_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f64(self.total as f64 / SAMPLE_RATE as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decibels_convert_to_linear_gain() {
        assert!((db_to_gain(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_gain(-20.0) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn ramp_interpolates_then_holds() {
        let r = Ramp::new(600.0, 1200.0, 1.0);
        assert_eq!(r.at(0), 600.0);
        assert!((r.at(u64::from(SAMPLE_RATE) / 2) - 900.0).abs() < 1e-3);
        assert_eq!(r.at(u64::from(SAMPLE_RATE) * 2), 1200.0);
        assert_eq!(Ramp::hold(3.0).at(0), 3.0);
    }

    #[test]
    fn tone_envelope_attacks_sustains_and_releases() {
        let tone = ToneSource::new(440.0, 2.0, 1.0);
        assert_eq!(tone.envelope(0.0), 0.0);
        assert!((tone.envelope(0.3) - 1.0).abs() < 1e-3);
        assert!((tone.envelope(1.0) - SUSTAIN_LEVEL).abs() < 1e-6);
        assert!(tone.envelope(2.25) < SUSTAIN_LEVEL);
        assert_eq!(tone.envelope(2.6), 0.0);
    }

    #[test]
    fn sources_end_after_their_duration() {
        let tone = ToneSource::new(440.0, 0.1, 0.5);
        let expected = secs_to_samples(0.1) + secs_to_samples(RELEASE_SECS);
        assert_eq!(tone.count() as u64, expected);

        let noise = NoiseSource::new(0.05, Ramp::hold(800.0), Ramp::hold(0.2));
        let samples: Vec<f32> = noise.collect();
        assert_eq!(samples.len() as u64, secs_to_samples(0.05));
        assert!(samples.iter().all(|s| s.abs() <= 0.2));
    }
}
