use crate::{
    audio::{DEFAULT_BLOCK_SIZE, REALTIME_PCM16_SAMPLE_RATE},
    error::{RealtimeError, Result},
    session::SessionHandle,
};
use salesmind_realtime_types::{
    AudioFormat, AudioTranscription, Modality, SessionConfig, TurnDetection,
};
use url::Url;

/// Path of the realtime WebSocket on the application server.
pub const REALTIME_WS_PATH: &str = "/ws/realtime/";

/// Server-side voice-activity detection thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct VadSettings {
    pub threshold: f32,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 500,
        }
    }
}

/// Connection and audio settings for a [`RealtimeClient`](crate::RealtimeClient).
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Origin of the application server, e.g. `https://app.example.com`.
    /// `http`/`https` are mapped to `ws`/`wss`.
    pub server_url: Url,
    pub vad: VadSettings,
    pub transcription_model: String,
    pub transcription_language: Option<String>,
    /// Capture sample rate requested from audio sources.
    pub sample_rate: u32,
    /// Samples per binary audio frame.
    pub block_size: usize,
}

impl RealtimeConfig {
    pub fn new(server_url: Url) -> Self {
        Self {
            server_url,
            vad: VadSettings::default(),
            transcription_model: "whisper-1".to_string(),
            transcription_language: None,
            sample_rate: REALTIME_PCM16_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    /// Parses `server_url` and applies the defaults.
    pub fn parse(server_url: &str) -> Result<Self> {
        let url = Url::parse(server_url)
            .map_err(|e| RealtimeError::Configuration(format!("{server_url}: {e}")))?;
        Ok(Self::new(url))
    }

    /// Builds `ws[s]://<host>/ws/realtime/?token=..[&session_id=..]`.
    pub fn endpoint_url(&self, handle: &SessionHandle) -> Result<Url> {
        let scheme = match self.server_url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => {
                return Err(RealtimeError::Configuration(format!(
                    "unsupported URL scheme '{other}'"
                )));
            }
        };
        if self.server_url.host_str().is_none() {
            return Err(RealtimeError::Configuration(format!(
                "{} has no host",
                self.server_url
            )));
        }

        let mut url = self.server_url.clone();
        url.set_scheme(scheme)
            .map_err(|_| RealtimeError::Configuration(format!("cannot use scheme {scheme}")))?;
        url.set_path(REALTIME_WS_PATH);
        url.set_fragment(None);
        {
            let mut query = url.query_pairs_mut();
            query.clear();
            query.append_pair("token", handle.token());
            if let Some(session_id) = handle.session_id() {
                query.append_pair("session_id", &session_id.to_string());
            }
        }
        Ok(url)
    }

    /// The `session` payload sent once the server reports `session.created`.
    pub fn session_config(&self, handle: &SessionHandle) -> SessionConfig {
        SessionConfig {
            modalities: vec![Modality::Text, Modality::Audio],
            instructions: Some(handle.instructions()),
            voice: Some(handle.voice().to_string()),
            input_audio_format: Some(AudioFormat::Pcm16),
            output_audio_format: Some(AudioFormat::Pcm16),
            input_audio_transcription: Some(AudioTranscription {
                model: self.transcription_model.clone(),
                language: self.transcription_language.clone(),
            }),
            turn_detection: Some(TurnDetection::ServerVad {
                threshold: self.vad.threshold,
                prefix_padding_ms: self.vad.prefix_padding_ms,
                silence_duration_ms: self.vad.silence_duration_ms,
            }),
        }
    }
}
