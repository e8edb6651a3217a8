use std::sync::Arc;
use std::time::Duration;

use chatsphere::{
    ChatMessage, ClientConfig, CloseReason, MessageLog, Origin, ReconnectPolicy, ReconnectingSession, RelayEndpoint,
    RoomCode, RoomSession, SessionConnection, SessionError, SessionObserver, SessionState, WsTransport,
};
use chatsphere::config::ConfigError;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Session(#[from] SessionError),
    #[error("disconnected: {0}")]
    Disconnected(CloseReason),
}

#[derive(Parser, Debug)]
#[command(name = "chatsphere", about = "Join a ChatSphere room from the terminal")]
struct Cli {
    /// Relay address (ws://, wss://, http:// or https://).
    #[arg(long, env = "CHATSPHERE_RELAY_URL")]
    endpoint: Option<String>,

    /// Reconnect with backoff when the relay connection drops.
    #[arg(long, default_value_t = false)]
    reconnect: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a room with a fresh code and join it.
    Create,
    /// Join an existing room by code.
    Join { code: String },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env()?;
    if let Some(raw) = cli.endpoint.as_deref() {
        config.endpoint = RelayEndpoint::parse(raw)?;
    }
    if cli.reconnect && config.reconnect.is_none() {
        config.reconnect = Some(ReconnectPolicy::default());
    }

    let room_code = match cli.command {
        Command::Create => RoomCode::generate(),
        Command::Join { code } => RoomCode::parse(&code)?,
    };

    let input = spawn_stdin_reader();
    let reason = match config.reconnect {
        Some(policy) => run_reconnecting(&config, policy, room_code, input).await,
        None => run_once(&config, room_code, input).await?,
    };

    match reason {
        CloseReason::Requested => Ok(()),
        other => Err(CliError::Disconnected(other)),
    }
}

async fn run_once(
    config: &ClientConfig,
    room_code: RoomCode,
    mut input: mpsc::Receiver<String>,
) -> Result<CloseReason, CliError> {
    let transport = Arc::new(WsTransport::new(config.connect_timeout));
    let mut connection = SessionConnection::new(transport);
    connection.connect(config.endpoint.clone());
    let mut session = RoomSession::new(connection, Box::new(TerminalObserver))
        .with_log(MessageLog::with_limit(config.history_limit));
    session.start(room_code)?;

    let reason = tokio::select! {
        reason = session.run(&mut input) => reason,
        _ = tokio::signal::ctrl_c() => {
            session.close();
            CloseReason::Requested
        }
    };
    Ok(reason)
}

async fn run_reconnecting(
    config: &ClientConfig,
    policy: ReconnectPolicy,
    room_code: RoomCode,
    mut input: mpsc::Receiver<String>,
) -> CloseReason {
    let transport = Arc::new(WsTransport::new(config.connect_timeout));
    let session = ReconnectingSession::new(transport, config.endpoint.clone(), policy)
        .with_history_limit(config.history_limit);

    tokio::select! {
        reason = session.run(room_code, Box::new(TerminalObserver), &mut input) => reason,
        _ = tokio::signal::ctrl_c() => CloseReason::Requested,
    }
}

/// Forward stdin lines to the session until EOF.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(error) => {
                    tracing::warn!(%error, "stdin read failed");
                    break;
                }
            }
        }
    });
    rx
}

// =============================================================================
// PRESENTATION
// =============================================================================

struct TerminalObserver;

impl SessionObserver for TerminalObserver {
    fn room_code_ready(&mut self, code: &RoomCode) {
        println!("room code: {code}");
    }

    fn messages_changed(&mut self, log: &MessageLog) {
        if let Some(message) = log.last() {
            println!("{}", render_message(message));
        }
    }

    fn membership_changed(&mut self, count: u32) {
        println!("[{count} online]");
    }

    fn state_changed(&mut self, state: SessionState) {
        match state {
            SessionState::Joined => println!("[joined; type a message and press enter]"),
            SessionState::Ended => println!("[disconnected]"),
            SessionState::Unjoined | SessionState::Joining => {}
        }
    }

    fn reconnecting(&mut self, attempt: u32, delay: Duration) {
        println!("[reconnecting in {:.1}s, attempt {attempt}]", delay.as_secs_f32());
    }
}

fn render_message(message: &ChatMessage) -> String {
    match message.origin {
        Origin::Local => format!("you: {}", message.text),
        Origin::Remote => message.text.clone(),
    }
}
