//! Audio capture sources.
//!
//! A capture source delivers mono f32 samples at the requested sample rate.
//! Starting one is where a permission prompt would happen, so `start` is
//! async and may fail with [`RealtimeError::PermissionDenied`].

use crate::error::{RealtimeError, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Chunks of captured samples, in capture order.
pub type SampleReceiver = mpsc::Receiver<Vec<f32>>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioCapture: Send {
    /// Starts capturing mono audio at `sample_rate` Hz.
    async fn start(&mut self, sample_rate: u32) -> Result<SampleReceiver>;

    /// Releases the device. Safe to call when not started.
    fn stop(&mut self);
}

#[async_trait]
impl<C: AudioCapture + ?Sized> AudioCapture for Box<C> {
    async fn start(&mut self, sample_rate: u32) -> Result<SampleReceiver> {
        (**self).start(sample_rate).await
    }

    fn stop(&mut self) {
        (**self).stop();
    }
}

/// A capture source fed by the caller through a channel.
///
/// Useful when samples come from somewhere other than a device (a file, a
/// test, another pipeline). The source can be started once.
pub struct ChannelCapture {
    rx: Option<SampleReceiver>,
}

impl ChannelCapture {
    /// Returns the source and the sender that feeds it.
    pub fn new(buffer: usize) -> (Self, mpsc::Sender<Vec<f32>>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { rx: Some(rx) }, tx)
    }
}

#[async_trait]
impl AudioCapture for ChannelCapture {
    async fn start(&mut self, _sample_rate: u32) -> Result<SampleReceiver> {
        self.rx
            .take()
            .ok_or_else(|| RealtimeError::Capture("channel capture already started".to_string()))
    }

    fn stop(&mut self) {
        self.rx = None;
    }
}
