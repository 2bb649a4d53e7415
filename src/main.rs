use std::collections::HashMap;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tokio::sync::RwLock;
use tracing_subscriber::EnvFilter;

use voicelink::api::{ApiState, CredentialStatus};
use voicelink::voice::llm::ChatReplier;
use voicelink::voice::stt::WhisperTranscriber;
use voicelink::voice::tts::SpeechSocket;
use voicelink::{Config, SessionRegistry, VoicePipeline};

/// Voicelink - real-time voice conversation sidecar
#[derive(Parser)]
#[command(name = "voicelink", version, about)]
struct Cli {
    /// Port to listen on
    #[arg(long, env = "VOICELINK_PORT", default_value = "8787")]
    port: u16,

    /// Address to bind
    #[arg(long, env = "VOICELINK_BIND", default_value = "0.0.0.0")]
    bind: String,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,voicelink=info",
        1 => "info,voicelink=debug",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::from_env();

    let missing = config.missing_credentials();
    if !missing.is_empty() {
        tracing::warn!(?missing, "some collaborator credentials are not configured");
    }

    let transcriber = Arc::new(WhisperTranscriber::new(config.stt.clone()));
    let replier = Arc::new(ChatReplier::new(config.llm.clone()));
    let pipeline = Arc::new(VoicePipeline::new(transcriber, replier, config.voice));

    // Dialed eagerly so the first utterance doesn't pay the connect cost
    let synthesizer = Arc::new(SpeechSocket::connect(config.tts.clone()));

    let registry = SessionRegistry::new();
    registry.spawn_sweeper(
        Duration::from_secs(config.registry.retention_secs),
        Duration::from_secs(config.registry.sweep_interval_secs),
    );

    let state = Arc::new(ApiState {
        registry,
        sessions: Arc::new(RwLock::new(HashMap::new())),
        pipeline,
        synthesizer,
        settings: config.voice,
        credentials: CredentialStatus {
            stt: !config.stt.api_key.is_empty(),
            generation: !config.llm.api_key.is_empty(),
            synthesis: !config.tts.api_key.is_empty(),
        },
        started_at: Instant::now(),
    });

    let addr = format!("{}:{}", cli.bind, cli.port);
    voicelink::api::serve(state, &addr).await?;
    Ok(())
}
