//! Capture sources for the `talk` command.

use async_trait::async_trait;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use salesmind_realtime::{
    AudioCapture, RealtimeError, Result, SampleReceiver, audio::convert_i16_to_f32,
    audio::le_bytes_to_pcm16,
};
use std::{path::PathBuf, time::Duration};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

const CHANNEL_CAPACITY: usize = 64;
const FILE_RESAMPLER_CHUNK: usize = 1024;

/// Mono resampler fed with arbitrarily sized chunks.
pub struct MonoResampler {
    resampler: Option<FastFixedIn<f32>>,
    input_buffer: Vec<f32>,
    chunk_size: usize,
}

impl MonoResampler {
    pub fn new(in_rate: u32, out_rate: u32, chunk_size: usize) -> anyhow::Result<Self> {
        let resampler = if in_rate == out_rate {
            None
        } else {
            Some(FastFixedIn::<f32>::new(
                out_rate as f64 / in_rate as f64,
                1.0,
                PolynomialDegree::Cubic,
                chunk_size,
                1,
            )?)
        };
        Ok(Self {
            resampler,
            input_buffer: Vec::with_capacity(chunk_size * 2),
            chunk_size,
        })
    }

    /// Returns resampled output for every complete input chunk buffered so far.
    pub fn process(&mut self, input: &[f32]) -> anyhow::Result<Vec<f32>> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(input.to_vec());
        };
        self.input_buffer.extend_from_slice(input);

        let mut output = Vec::new();
        while self.input_buffer.len() >= self.chunk_size {
            let chunk: Vec<f32> = self.input_buffer.drain(..self.chunk_size).collect();
            let resampled = resampler.process(&[chunk], None)?;
            output.extend_from_slice(&resampled[0]);
        }
        Ok(output)
    }
}

/// Streams a raw little-endian PCM16 mono file at real-time pace, followed by
/// silence so server VAD can close the turn.
pub struct FileCapture {
    path: PathBuf,
    /// Rate the file was recorded at; `None` means the session rate.
    source_rate: Option<u32>,
    chunk: Duration,
    trailing_silence: Duration,
    task: Option<JoinHandle<()>>,
}

impl FileCapture {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            source_rate: None,
            chunk: Duration::from_millis(100),
            trailing_silence: Duration::from_secs(1),
            task: None,
        }
    }

    pub fn with_source_rate(mut self, rate: u32) -> Self {
        self.source_rate = Some(rate);
        self
    }

    pub fn with_chunk(mut self, chunk: Duration) -> Self {
        self.chunk = chunk;
        self
    }

    pub fn with_trailing_silence(mut self, silence: Duration) -> Self {
        self.trailing_silence = silence;
        self
    }
}

#[async_trait]
impl AudioCapture for FileCapture {
    async fn start(&mut self, sample_rate: u32) -> Result<SampleReceiver> {
        if self.task.is_some() {
            return Err(RealtimeError::Capture("file capture already started".to_string()));
        }
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            RealtimeError::Capture(format!("cannot read {}: {e}", self.path.display()))
        })?;
        if bytes.len() % 2 != 0 {
            warn!(path = %self.path.display(), "Odd-sized PCM16 file; dropping last byte");
        }
        let mut samples = convert_i16_to_f32(&le_bytes_to_pcm16(&bytes));
        if let Some(source_rate) = self.source_rate.filter(|&r| r != sample_rate) {
            debug!(source_rate, sample_rate, "Resampling audio file");
            samples.resize(samples.len().next_multiple_of(FILE_RESAMPLER_CHUNK), 0.0);
            samples = MonoResampler::new(source_rate, sample_rate, FILE_RESAMPLER_CHUNK)
                .and_then(|mut r| r.process(&samples))
                .map_err(|e| RealtimeError::Capture(e.to_string()))?;
        }
        let silence = (self.trailing_silence.as_secs_f64() * sample_rate as f64) as usize;
        samples.resize(samples.len() + silence, 0.0);

        let per_chunk = ((self.chunk.as_secs_f64() * sample_rate as f64) as usize).max(1);
        info!(
            path = %self.path.display(),
            samples = samples.len(),
            "Streaming audio file"
        );

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let pace = self.chunk;
        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(pace);
            for chunk in samples.chunks(per_chunk) {
                ticker.tick().await;
                if tx.send(chunk.to_vec()).await.is_err() {
                    return;
                }
            }
            debug!("Audio file finished");
        }));
        Ok(rx)
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(feature = "microphone")]
pub use microphone::MicrophoneCapture;

#[cfg(feature = "microphone")]
mod microphone {
    use super::{CHANNEL_CAPACITY, MonoResampler};
    use async_trait::async_trait;
    use cpal::{
        FromSample, Sample, SizedSample,
        traits::{DeviceTrait, HostTrait, StreamTrait},
    };
    use salesmind_realtime::{AudioCapture, RealtimeError, Result, SampleReceiver};
    use std::{sync::mpsc as std_mpsc, thread::JoinHandle};
    use tokio::sync::{mpsc, oneshot};
    use tracing::{error, info, warn};

    /// Resampler input chunk, in device samples.
    const RESAMPLER_CHUNK: usize = 1024;

    /// The default input device. The cpal stream lives on its own thread
    /// because it is not `Send` on every platform.
    #[derive(Default)]
    pub struct MicrophoneCapture {
        stop_tx: Option<std_mpsc::Sender<()>>,
        thread: Option<JoinHandle<()>>,
    }

    impl MicrophoneCapture {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl AudioCapture for MicrophoneCapture {
        async fn start(&mut self, sample_rate: u32) -> Result<SampleReceiver> {
            if self.stop_tx.is_some() {
                return Err(RealtimeError::Capture("microphone already started".to_string()));
            }
            let (samples_tx, samples_rx) = mpsc::channel(CHANNEL_CAPACITY);
            let (ready_tx, ready_rx) = oneshot::channel();
            let (stop_tx, stop_rx) = std_mpsc::channel();

            let thread = std::thread::spawn(move || {
                let stream = match open_stream(sample_rate, samples_tx) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Blocks until stop() or drop of the sender.
                let _ = stop_rx.recv();
                drop(stream);
                info!("Microphone released");
            });

            match ready_rx.await {
                Ok(Ok(())) => {
                    self.stop_tx = Some(stop_tx);
                    self.thread = Some(thread);
                    Ok(samples_rx)
                }
                Ok(Err(e)) => Err(e),
                Err(_) => Err(RealtimeError::Capture("capture thread exited".to_string())),
            }
        }

        fn stop(&mut self) {
            if let Some(stop_tx) = self.stop_tx.take() {
                let _ = stop_tx.send(());
            }
            if let Some(thread) = self.thread.take() {
                if thread.join().is_err() {
                    warn!("Capture thread panicked");
                }
            }
        }
    }

    impl Drop for MicrophoneCapture {
        fn drop(&mut self) {
            self.stop();
        }
    }

    fn open_stream(sample_rate: u32, samples_tx: mpsc::Sender<Vec<f32>>) -> Result<cpal::Stream> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| RealtimeError::Capture("no default input device".to_string()))?;
        let supported = device
            .default_input_config()
            .map_err(|e| RealtimeError::PermissionDenied(e.to_string()))?;
        info!(
            device = %device.name().unwrap_or_default(),
            rate = supported.sample_rate().0,
            channels = supported.channels(),
            format = ?supported.sample_format(),
            "Opening input device"
        );

        let config = supported.config();
        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => build::<f32>(&device, &config, sample_rate, samples_tx),
            cpal::SampleFormat::I16 => build::<i16>(&device, &config, sample_rate, samples_tx),
            cpal::SampleFormat::U16 => build::<u16>(&device, &config, sample_rate, samples_tx),
            other => Err(RealtimeError::Capture(format!("unsupported sample format {other:?}"))),
        }?;
        stream
            .play()
            .map_err(|e| RealtimeError::PermissionDenied(e.to_string()))?;
        Ok(stream)
    }

    fn build<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        sample_rate: u32,
        samples_tx: mpsc::Sender<Vec<f32>>,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample,
        f32: FromSample<T>,
    {
        let channels = config.channels.max(1) as usize;
        let mut resampler = MonoResampler::new(config.sample_rate.0, sample_rate, RESAMPLER_CHUNK)
            .map_err(|e| RealtimeError::Capture(e.to_string()))?;

        device
            .build_input_stream(
                config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    let mono: Vec<f32> = data
                        .chunks(channels)
                        .map(|frame| {
                            let sum: f32 = frame.iter().map(|&s| f32::from_sample(s)).sum();
                            sum / frame.len() as f32
                        })
                        .collect();
                    match resampler.process(&mono) {
                        Ok(out) if out.is_empty() => {}
                        Ok(out) => {
                            if samples_tx.try_send(out).is_err() {
                                warn!("Capture consumer is behind; dropping samples");
                            }
                        }
                        Err(e) => error!(error = %e, "Resampling failed"),
                    }
                },
                |e| error!(error = %e, "Input stream error"),
                None,
            )
            .map_err(|e| RealtimeError::PermissionDenied(e.to_string()))
    }
}
