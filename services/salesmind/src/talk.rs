//! `salesmind talk`: one realtime voice session.

use crate::{account, capture::FileCapture, cli::TalkArgs};
use anyhow::{Context, Result};
use salesmind_core::ApiClient;
use salesmind_realtime::{
    AudioCapture, RealtimeClient, RealtimeConfig, RealtimeEvent, TranscriptRole,
    audio::{decode_audio_delta, pcm16_to_le_bytes},
};
use std::{
    fmt,
    io::{self, Write},
    path::Path,
    time::Duration,
};
use tokio::{
    fs::{File, OpenOptions},
    io::AsyncWriteExt,
    sync::mpsc::UnboundedReceiver,
};
use tracing::{info, warn};

pub async fn run(args: TalkArgs) -> Result<()> {
    let api = ApiClient::new(&args.account.api_base)?;
    let mut app = account::login(&api, &args.account).await?;
    account::ensure_session(&api, &mut app, &args.account, &args.scenario).await?;

    let mut handle = app.realtime_handle()?;
    if let Some(voice) = &args.voice {
        handle = handle.with_voice(voice.clone());
    }
    let mut config = RealtimeConfig::parse(&args.server_url)?;
    if let Some(block_size) = args.block_size {
        config.block_size = block_size;
    }

    let audio_out = match &args.save_audio {
        Some(path) => Some(open_audio_out(path).await?),
        None => None,
    };
    let mut console = Console::new(io::stdout(), audio_out);

    let (mut client, mut events) = RealtimeClient::new(handle, config);
    client.connect().await.context("Could not open the voice session")?;

    // Audio sent before the handshake completes would be dropped.
    if !wait_until_ready(&mut events, &mut console).await? {
        return console.finish().await;
    }
    client
        .start_audio_stream(capture_source(&args)?)
        .await
        .context("Could not start audio capture")?;
    console.line(format_args!("Listening. Press Ctrl+C to stop."))?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    if !console.render(event).await? {
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted; closing voice session");
                client.stop_audio_stream();
                client.disconnect();
            }
        }
    }

    console.finish().await
}

fn capture_source(args: &TalkArgs) -> Result<Box<dyn AudioCapture>> {
    if let Some(path) = &args.input {
        let mut capture = FileCapture::new(path);
        if let Some(rate) = args.input_rate {
            capture = capture.with_source_rate(rate);
        }
        if let Some(ms) = args.chunk_ms {
            capture = capture.with_chunk(Duration::from_millis(ms));
        }
        if let Some(ms) = args.trailing_silence_ms {
            capture = capture.with_trailing_silence(Duration::from_millis(ms));
        }
        return Ok(Box::new(capture));
    }
    microphone()
}

#[cfg(feature = "microphone")]
fn microphone() -> Result<Box<dyn AudioCapture>> {
    Ok(Box::new(crate::capture::MicrophoneCapture::new()))
}

#[cfg(not(feature = "microphone"))]
fn microphone() -> Result<Box<dyn AudioCapture>> {
    anyhow::bail!("Built without the `microphone` feature; pass --input <PATH>")
}

/// Prints events until the session is ready. Returns false if it ended first.
async fn wait_until_ready<W: Write>(
    events: &mut UnboundedReceiver<RealtimeEvent>,
    console: &mut Console<W>,
) -> Result<bool> {
    while let Some(event) = events.recv().await {
        if event == RealtimeEvent::Ready {
            console.line(format_args!("[ready]"))?;
            return Ok(true);
        }
        if !console.render(event).await? {
            return Ok(false);
        }
    }
    Ok(false)
}

/// Terminal output for a voice session.
///
/// Assistant transcript deltas are streamed onto one line per reply, which is
/// ended by `response.done` or by the next line of other output.
struct Console<W> {
    out: W,
    audio_out: Option<File>,
    reply_open: bool,
}

impl<W: Write> Console<W> {
    fn new(out: W, audio_out: Option<File>) -> Self {
        Self {
            out,
            audio_out,
            reply_open: false,
        }
    }

    fn line(&mut self, args: fmt::Arguments<'_>) -> io::Result<()> {
        self.end_reply()?;
        writeln!(self.out, "{args}")
    }

    fn end_reply(&mut self) -> io::Result<()> {
        if self.reply_open {
            self.reply_open = false;
            writeln!(self.out)?;
        }
        Ok(())
    }

    /// Prints one event. Returns false once the session is over.
    async fn render(&mut self, event: RealtimeEvent) -> Result<bool> {
        match event {
            RealtimeEvent::StatusChange(status) => self.line(format_args!("[status] {status}"))?,
            RealtimeEvent::Connected => self.line(format_args!("[connected]"))?,
            RealtimeEvent::Ready => self.line(format_args!("[ready]"))?,
            RealtimeEvent::Transcript {
                text,
                role: TranscriptRole::Assistant,
                ..
            } => {
                if !self.reply_open {
                    write!(self.out, "{}: ", TranscriptRole::Assistant)?;
                    self.reply_open = true;
                }
                write!(self.out, "{text}")?;
                self.out.flush()?;
            }
            RealtimeEvent::Transcript { text, role, .. } => {
                self.line(format_args!("{role}: {text}"))?
            }
            RealtimeEvent::UserSpeechStopped { .. } => {}
            RealtimeEvent::Audio { delta } => {
                if let Some(file) = self.audio_out.as_mut() {
                    let samples = decode_audio_delta(&delta);
                    file.write_all(&pcm16_to_le_bytes(&samples)).await?;
                }
            }
            RealtimeEvent::Response { .. } => self.end_reply()?,
            RealtimeEvent::Error { message } => {
                self.end_reply()?;
                eprintln!("[error] {message}");
            }
            RealtimeEvent::Disconnected { code, reason } => {
                self.line(format_args!("[disconnected] code={code} {reason}"))?;
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn finish(mut self) -> Result<()> {
        self.end_reply()?;
        self.out.flush()?;
        if let Some(mut file) = self.audio_out.take() {
            file.flush().await?;
        }
        Ok(())
    }
}

/// Opens `path` for appending the customer's voice.
async fn open_audio_out(path: &Path) -> Result<File> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("Cannot open {}", path.display()))?;
    if path.extension().is_some_and(|ext| ext == "wav") {
        warn!("Audio is written as headerless PCM16 at 24 kHz, not WAV");
    }
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use salesmind_realtime::audio::encode_pcm16_base64;

    fn assistant(text: &str) -> RealtimeEvent {
        RealtimeEvent::Transcript {
            text: text.to_string(),
            role: TranscriptRole::Assistant,
            item_id: Some("r1".to_string()),
        }
    }

    #[tokio::test]
    async fn test_assistant_deltas_share_one_line() {
        let mut console = Console::new(Vec::new(), None);
        for event in [
            RealtimeEvent::Transcript {
                text: "How much is it?".to_string(),
                role: TranscriptRole::User,
                item_id: Some("u1".to_string()),
            },
            assistant("It "),
            assistant("depends"),
            assistant("."),
            RealtimeEvent::Response {
                payload: serde_json::json!({ "status": "completed" }),
            },
            assistant("Anything else?"),
        ] {
            assert!(console.render(event).await.unwrap());
        }
        assert!(
            !console
                .render(RealtimeEvent::Disconnected {
                    code: 1000,
                    reason: String::new(),
                })
                .await
                .unwrap()
        );

        let printed = String::from_utf8(console.out).unwrap();
        assert_eq!(
            printed,
            "user: How much is it?\n\
             assistant: It depends.\n\
             assistant: Anything else?\n\
             [disconnected] code=1000 \n"
        );
    }

    #[tokio::test]
    async fn test_saved_audio_is_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("customer.pcm");
        std::fs::write(&path, [0xAA, 0xBB]).unwrap();

        let file = open_audio_out(&path).await.unwrap();
        let mut console = Console::new(Vec::new(), Some(file));
        let delta = encode_pcm16_base64(&pcm16_to_le_bytes(&[1, -1]));
        console.render(RealtimeEvent::Audio { delta }).await.unwrap();
        console.finish().await.unwrap();

        assert_eq!(
            std::fs::read(&path).unwrap(),
            vec![0xAA, 0xBB, 0x01, 0x00, 0xFF, 0xFF]
        );
    }
}
