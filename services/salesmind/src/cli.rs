//! CLI argument definitions.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use uuid::Uuid;

/// SalesMind training client
#[derive(Parser, Debug)]
#[command(name = "salesmind", version, about = "SalesMind sales-training client")]
pub struct Cli {
    /// Log level for diagnostics on stderr
    #[arg(long, env = "RUST_LOG", default_value = "WARN", global = true)]
    pub log_level: Level,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one voice session with the simulated customer
    Talk(TalkArgs),
    /// Send one message and stream the customer's reply
    Chat(ChatArgs),
}

/// How to reach the backend and who to act as.
#[derive(Args, Debug, Clone)]
pub struct AccountArgs {
    /// REST API root
    #[arg(long, env = "SALESMIND_API_BASE", default_value = "http://localhost:8000/api/")]
    pub api_base: String,

    /// Auth token; takes precedence over username/password
    #[arg(long, env = "SALESMIND_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[arg(long, env = "SALESMIND_USERNAME")]
    pub username: Option<String>,

    #[arg(long, env = "SALESMIND_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Existing training session to join
    #[arg(long, env = "SALESMIND_SESSION_ID")]
    pub session_id: Option<Uuid>,
}

/// Scenario used when a new training session has to be started.
#[derive(Args, Debug, Clone, Default)]
pub struct ScenarioArgs {
    #[arg(long)]
    pub industry: Option<String>,

    /// What the salesperson is offering
    #[arg(long)]
    pub value_proposition: Option<String>,

    /// Who the simulated customer is
    #[arg(long)]
    pub persona: Option<String>,
}

#[derive(Args, Debug)]
pub struct TalkArgs {
    #[command(flatten)]
    pub account: AccountArgs,

    #[command(flatten)]
    pub scenario: ScenarioArgs,

    /// Realtime proxy base URL (http(s) or ws(s))
    #[arg(long, env = "SALESMIND_SERVER_URL", default_value = "http://localhost:8001")]
    pub server_url: String,

    #[arg(long, env = "SALESMIND_VOICE")]
    pub voice: Option<String>,

    /// Stream a raw little-endian PCM16 mono file instead of the microphone
    #[arg(long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Sample rate of --input, if it differs from the session rate
    #[arg(long, requires = "input")]
    pub input_rate: Option<u32>,

    /// Milliseconds of --input audio sent per tick [default: 100]
    #[arg(long, requires = "input", value_parser = clap::value_parser!(u64).range(1..))]
    pub chunk_ms: Option<u64>,

    /// Silence streamed after --input so the server detects the end of the turn [default: 1000]
    #[arg(long, requires = "input")]
    pub trailing_silence_ms: Option<u64>,

    /// Append the customer's voice to this file as raw PCM16
    #[arg(long, value_name = "PATH")]
    pub save_audio: Option<PathBuf>,

    /// Samples per binary frame sent to the server
    #[arg(long)]
    pub block_size: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ChatArgs {
    #[command(flatten)]
    pub account: AccountArgs,

    #[command(flatten)]
    pub scenario: ScenarioArgs,

    /// Message to send
    pub message: String,

    /// Finish the session after the reply and print its score report
    #[arg(long)]
    pub finish: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_talk_with_file_input() {
        let cli = Cli::try_parse_from([
            "salesmind",
            "talk",
            "--token",
            "tok",
            "--server-url",
            "https://app.example.com",
            "--input",
            "pitch.pcm",
            "--input-rate",
            "16000",
            "--chunk-ms",
            "20",
            "--trailing-silence-ms",
            "0",
            "--industry",
            "Logistics",
        ])
        .unwrap();
        let Commands::Talk(args) = cli.command else {
            panic!("expected talk");
        };
        assert_eq!(args.account.token.as_deref(), Some("tok"));
        assert_eq!(args.server_url, "https://app.example.com");
        assert_eq!(args.input, Some(PathBuf::from("pitch.pcm")));
        assert_eq!(args.input_rate, Some(16_000));
        assert_eq!(args.chunk_ms, Some(20));
        assert_eq!(args.trailing_silence_ms, Some(0));
        assert_eq!(args.scenario.industry.as_deref(), Some("Logistics"));
    }

    #[test]
    fn test_file_pacing_flags_require_input() {
        for flag in ["--input-rate", "--chunk-ms", "--trailing-silence-ms"] {
            assert!(Cli::try_parse_from(["salesmind", "talk", flag, "100"]).is_err());
        }
        assert!(
            Cli::try_parse_from(["salesmind", "talk", "--input", "a.pcm", "--chunk-ms", "0"])
                .is_err()
        );
    }

    #[test]
    fn test_parse_chat() {
        let session = Uuid::new_v4().to_string();
        let cli = Cli::try_parse_from([
            "salesmind",
            "chat",
            "--session-id",
            session.as_str(),
            "--finish",
            "How do you ship today?",
        ])
        .unwrap();
        let Commands::Chat(args) = cli.command else {
            panic!("expected chat");
        };
        assert_eq!(args.message, "How do you ship today?");
        assert!(args.finish);
        assert_eq!(args.account.session_id.map(|id| id.to_string()), Some(session));
    }
}
