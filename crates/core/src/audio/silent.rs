use crate::audio::{AudioError, AudioSink, PhaseCue, VolumeSettings};
use futures::future::BoxFuture;
use futures::FutureExt;

/// Accepts every cue and plays nothing.
#[derive(Clone, Debug, Default)]
pub struct SilentAudioSink;

impl SilentAudioSink {
    pub fn new() -> Self {
        Self
    }
}

impl AudioSink for SilentAudioSink {
    fn init(&self) -> BoxFuture<'_, Result<(), AudioError>> {
        async move { Ok(()) }.boxed()
    }

    fn set_volume(&self, _volume: VolumeSettings) -> BoxFuture<'_, Result<(), AudioError>> {
        async move { Ok(()) }.boxed()
    }

    fn play_cue(&self, cue: PhaseCue) -> BoxFuture<'_, Result<(), AudioError>> {
        async move {
            tracing::trace!(phase = %cue.phase, "silent sink dropped cue");
            Ok(())
        }
        .boxed()
    }

    fn stop_noise(&self) -> BoxFuture<'_, Result<(), AudioError>> {
        async move { Ok(()) }.boxed()
    }
}
