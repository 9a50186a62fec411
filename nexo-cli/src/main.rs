use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::Input;
use nexo_client::{
    ClientConfig, RoomController, RoomEvent, RoomHandle, SyntheticCapture, TopologyCache,
    WebRtcTransportFactory, WsSignalingChannel,
};
use nexo_core::{ParticipantId, RoomId};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nexo")]
#[command(about = "Join a mesh call room from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Join {
        /// Relay websocket endpoint.
        #[arg(long)]
        relay: Option<String>,

        #[arg(long)]
        room: String,

        /// Email or token; prompted for when omitted.
        #[arg(short, long)]
        participant: Option<String>,

        /// JSON client configuration.
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long, default_value = ".nexo-topology.json")]
        state_file: PathBuf,

        #[arg(long, requires_all = ["turn_user", "turn_pass"])]
        turn: Option<String>,

        #[arg(long)]
        turn_user: Option<String>,

        #[arg(long)]
        turn_pass: Option<String>,

        #[arg(long)]
        negotiation_timeout_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,nexo_client=info,nexo_cli=info")),
        )
        .init();

    let Cli { command } = Cli::parse();

    match command {
        Commands::Join {
            relay,
            room,
            participant,
            config,
            state_file,
            turn,
            turn_user,
            turn_pass,
            negotiation_timeout_ms,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(relay) = relay {
                config.relay_url = relay;
            }
            if let (Some(url), Some(user), Some(pass)) = (turn, turn_user, turn_pass) {
                config.transport = config.transport.with_turn(url, user, pass);
            }
            if negotiation_timeout_ms.is_some() {
                config.negotiation_timeout_ms = negotiation_timeout_ms;
            }

            let participant = match participant {
                Some(p) => ParticipantId::from(p),
                None => prompt_participant()?,
            };

            join(config, RoomId::from(room), participant, state_file).await?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<ClientConfig> {
    let Some(path) = path else {
        return Ok(ClientConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid config {}", path.display()))
}

fn prompt_participant() -> Result<ParticipantId> {
    let generated = ParticipantId::generate();
    let id: String = Input::new()
        .with_prompt("Participant id (email or token)")
        .default(generated.to_string())
        .interact_text()
        .context("Failed to read participant id")?;
    Ok(ParticipantId::from(id.trim().to_owned()))
}

async fn join(
    config: ClientConfig,
    room_id: RoomId,
    local_id: ParticipantId,
    state_file: PathBuf,
) -> Result<()> {
    println!(
        "{}",
        format!("📡 Joining {} as {}...", room_id, local_id).green().bold()
    );

    let channel = WsSignalingChannel::connect(
        &config.relay_url,
        local_id.clone(),
        config.reconnect.clone(),
    )
    .await
    .context("Failed to reach the relay")?;

    let cache = TopologyCache::new(state_file, config.topology_ttl());
    let resume = cache.load(&room_id, &local_id);
    if let Some(snapshot) = &resume {
        println!(
            "{}",
            format!("♻️  Resuming {} previous session(s)", snapshot.len()).cyan()
        );
    }

    let (controller, handle) = RoomController::new(
        local_id.clone(),
        room_id,
        channel.clone(),
        Arc::new(WebRtcTransportFactory::new(&local_id)),
        Arc::new(SyntheticCapture::new()),
        &config,
    );

    let printer = tokio::spawn(print_events(handle.clone()));
    let persister = tokio::spawn(persist_topology(handle.clone(), cache.clone()));
    let room = tokio::spawn(controller.with_resume(resume).run());

    print_help();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match run_command(&handle, line.trim()).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => println!("{}", format!("❌ {e}").red()),
        }
    }

    handle.end_call().await.ok();
    persister.abort();
    if let Err(e) = cache.clear() {
        warn!("Failed to clear topology cache: {}", e);
    }
    if let Err(e) = room.await {
        warn!("Room controller ended abnormally: {}", e);
    }
    printer.abort();
    channel.close().await;

    println!("{}", "👋 Left the room".green().bold());
    Ok(())
}

fn print_help() {
    println!(
        "{}",
        "Commands: cam | mic | share | unshare | say <text> | peers | quit".dimmed()
    );
}

/// Returns `false` once the user asked to leave.
async fn run_command(handle: &RoomHandle, line: &str) -> Result<bool> {
    let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
    match cmd {
        "" => {}
        "cam" => match handle.toggle_camera().await? {
            Some(on) => println!("📷 Camera {}", on_off(on)),
            None => println!("{}", "No camera".yellow()),
        },
        "mic" => match handle.toggle_mic().await? {
            Some(on) => println!("🎙️  Microphone {}", on_off(on)),
            None => println!("{}", "No microphone".yellow()),
        },
        "share" => {
            handle.start_screen_share().await?;
            println!("🖥️  Sharing screen");
        }
        "unshare" => {
            if handle.stop_screen_share().await? {
                println!("🖥️  Screen share stopped");
            } else {
                println!("{}", "Not sharing".yellow());
            }
        }
        "say" => handle.send_chat(rest.trim()).await?,
        "peers" => {
            let participants = handle.participants();
            if participants.is_empty() {
                println!("{}", "Nobody else here yet".dimmed());
            }
            for peer in participants {
                let state = handle
                    .session(&peer)
                    .map(|s| s.state().to_string())
                    .unwrap_or_default();
                println!("   👤 {} {}", peer.to_string().bold(), state.dimmed());
            }
        }
        "quit" | "exit" => return Ok(false),
        other => {
            println!("{}", format!("Unknown command: {other}").yellow());
            print_help();
        }
    }
    Ok(true)
}

fn on_off(on: bool) -> ColoredString {
    if on { "on".green() } else { "off".red() }
}

async fn print_events(handle: RoomHandle) {
    let mut events = handle.subscribe();
    while let Ok(event) = events.recv().await {
        match event {
            RoomEvent::Joined(room) => println!("{}", format!("✅ Joined {room}").green()),
            RoomEvent::ParticipantJoined(p) => println!("{}", format!("➕ {p} joined").cyan()),
            RoomEvent::ParticipantLeft(p) => println!("{}", format!("➖ {p} left").cyan()),
            RoomEvent::RemoteStreamAdded {
                participant_id,
                stream,
            } => println!(
                "{}",
                format!("🎬 Receiving {} from {}", stream.stream_id(), participant_id).blue()
            ),
            RoomEvent::RemoteStreamRemoved(p) => {
                println!("{}", format!("🎬 Stream from {p} ended").blue())
            }
            RoomEvent::Chat { from, message } => {
                let from = from.map(|p| p.to_string()).unwrap_or_else(|| "relay".into());
                println!("💬 {}: {}", from.bold(), message);
            }
            RoomEvent::DeviceError(e) => println!("{}", format!("⚠️  {e}").yellow()),
            RoomEvent::SignalingStatus(status) => {
                println!("{}", format!("📡 Relay {status:?}").dimmed())
            }
            RoomEvent::SessionFailed {
                participant_id,
                reason,
            } => println!(
                "{}",
                format!("❌ Call with {participant_id} failed: {reason}").red()
            ),
            RoomEvent::Left(room) => info!("Left {}", room),
        }
    }
}

async fn persist_topology(handle: RoomHandle, cache: TopologyCache) {
    let mut topology = handle.topology();
    while topology.changed().await.is_ok() {
        let snapshot = topology.borrow_and_update().clone();
        if let Some(snapshot) = snapshot {
            if let Err(e) = cache.save(&snapshot) {
                warn!("Failed to persist topology: {:#}", e);
            }
        }
    }
}
