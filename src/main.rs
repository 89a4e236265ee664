//! DemoGame World Server
//!
//! Hosts the fixed-step world simulation, accepts game clients over TCP and
//! reads administrator commands from the console.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use glam::Vec2;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use demogame_server::config::ServerConfig;
use demogame_server::console::{spawn_console_reader, ConsoleCommand, HELP_TEXT};
use demogame_server::game::data::WorldData;
use demogame_server::game::events::WorldEvent;
use demogame_server::game::persistence::{EntityRepository, InMemoryRepository};
use demogame_server::game::{EntityId, GameWorld, MapId};
use demogame_server::net::handler::accept_connections;
use demogame_server::net::session::SessionId;
use demogame_server::net::IngressEvent;
use demogame_server::protocol::ServerMessage;
use demogame_server::state::AppState;
use demogame_server::VERSION;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("╔══════════════════════════════════════════════╗");
    info!("║        DemoGame World Server v{}          ║", VERSION);
    info!("╚══════════════════════════════════════════════╝");

    // Load configuration
    let config = ServerConfig::load().await?;
    info!("Configuration loaded from: {}", config.config_path.display());

    let world_data = WorldData::load(&config.world_data_path()).await?;
    let repository = Arc::new(InMemoryRepository::with_templates(
        world_data.templates.iter().cloned(),
    ));

    // Create shutdown and ingress channels
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let (ingress_tx, ingress_rx) = mpsc::unbounded_channel();

    let state = Arc::new(AppState::new(
        config.clone(),
        repository,
        ingress_tx,
        shutdown_tx.clone(),
    )?);
    info!("Application state initialized");

    let mut world = state.create_world();
    for definition in &world_data.maps {
        world
            .add_map(definition)
            .with_context(|| format!("Failed to build map {}", definition.id))?;
    }
    let world_events = world.subscribe();

    if config.stats.enabled {
        state.stats.enable_file_output(
            config.stats.output_path.clone(),
            Duration::from_millis(config.stats.dump_rate_ms),
        );
        info!(path = %config.stats.output_path.display(), "Message stats output enabled");
    }

    // Start TCP listener for game connections
    let listen_addr = config.listen_address();
    let listener = TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", listen_addr))?;
    info!("Game server listening on: {}", listen_addr);

    let acceptor_state = state.clone();
    let mut acceptor_shutdown_rx = shutdown_tx.subscribe();
    let acceptor_handle = tokio::spawn(async move {
        accept_connections(listener, acceptor_state, &mut acceptor_shutdown_rx).await;
    });

    let (console_tx, console_rx) = mpsc::unbounded_channel();
    if let Err(e) = spawn_console_reader(console_tx) {
        warn!("Console unavailable: {}", e);
    }

    tokio::spawn(wait_for_shutdown(shutdown_tx.clone()));

    info!("Server startup complete!");
    info!("{}", world.info());

    let mut host = Host {
        world,
        state: state.clone(),
        players: HashMap::new(),
    };
    host.run(ingress_rx, console_rx, world_events, shutdown_tx.subscribe())
        .await;

    info!("Shutting down server...");
    let _ = shutdown_tx.send(());
    let _ = acceptor_handle.await;

    let (saved, failed) = host.world.save_all();
    info!(saved = saved, failed = failed, "Final save complete");
    state.stats.disable_file_output();

    info!("Server shutdown complete. Goodbye!");
    Ok(())
}

/// Initialize the logging/tracing system
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,demogame_server=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .init();
}

/// The simulation loop: sole owner of the world
struct Host {
    world: GameWorld,
    state: Arc<AppState>,
    players: HashMap<SessionId, (MapId, EntityId)>,
}

impl Host {
    async fn run(
        &mut self,
        mut ingress_rx: mpsc::UnboundedReceiver<IngressEvent>,
        mut console_rx: mpsc::UnboundedReceiver<String>,
        mut world_events: mpsc::UnboundedReceiver<WorldEvent>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let mut frame = interval(Duration::from_millis(
            self.state.config.simulation.host_frame_ms.max(1),
        ));
        frame.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = frame.tick() => {
                    self.world.update();
                }
                Some(event) = ingress_rx.recv() => self.on_ingress(event),
                Some(event) = world_events.recv() => self.on_world_event(event),
                Some(line) = console_rx.recv() => {
                    if !self.on_console(&line) {
                        break;
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    }

    fn on_ingress(&mut self, event: IngressEvent) {
        match event {
            IngressEvent::Connected(session_id) => {
                let Some(session) = self.state.session_manager.get(session_id) else {
                    debug!(session_id = session_id, "Session left before spawning");
                    return;
                };
                let sim = &self.state.config.simulation;
                let spawned = self.world.spawn(
                    sim.spawn_map,
                    sim.player_template,
                    Vec2::new(sim.spawn_x, sim.spawn_y),
                );
                match spawned {
                    Ok(entity) => {
                        session.attach_entity(sim.spawn_map, entity);
                        self.players.insert(session_id, (sim.spawn_map, entity));
                        let welcome = ServerMessage::Welcome {
                            map: sim.spawn_map,
                            entity: entity.0,
                        };
                        if let Err(e) = session.send(&welcome) {
                            warn!(session_id = session_id, error = %e, "Failed to send welcome");
                        }
                        info!(session_id = session_id, entity = %entity, "Player entered the world");
                    }
                    Err(e) => error!(session_id = session_id, error = %e, "Failed to spawn player"),
                }
            }
            IngressEvent::Action { session, action } => match self.players.get(&session) {
                Some(&(map, entity)) => self.world.queue_action(map, entity, action),
                None => debug!(session_id = session, "Action from session without entity"),
            },
            IngressEvent::Disconnected(session_id) => {
                if let Some((map, entity)) = self.players.remove(&session_id) {
                    if let Err(e) = self.world.despawn(map, entity) {
                        warn!(session_id = session_id, error = %e, "Failed to despawn player");
                    }
                }
            }
        }
    }

    fn on_world_event(&mut self, event: WorldEvent) {
        match event {
            WorldEvent::Chat {
                map,
                entity,
                message,
            } => {
                let chat = ServerMessage::Chat {
                    entity: entity.0,
                    message,
                };
                let reached = self.state.session_manager.broadcast_to_map(map, &chat);
                debug!(map = map, reached = reached, "Chat broadcast");
            }
            WorldEvent::BacklogSkipped { skipped_ms } => {
                debug!(skipped_ms = skipped_ms, "World skipped backlog");
            }
            _ => {}
        }
    }

    /// Execute one console line. Returns false when the server should stop.
    fn on_console(&mut self, line: &str) -> bool {
        let command = match line.parse::<ConsoleCommand>() {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e);
                return true;
            }
        };

        match command {
            ConsoleCommand::Help => println!("{}", HELP_TEXT),
            ConsoleCommand::Quit => {
                info!("Quit requested from console");
                return false;
            }
            ConsoleCommand::Info => {
                println!("{}", self.world.info());
                let mut states: Vec<String> = self
                    .state
                    .session_manager
                    .count_by_state()
                    .into_iter()
                    .map(|(state, count)| format!("{} {}", count, state))
                    .collect();
                states.sort();
                println!(
                    "Sessions: {} ({}) - Pending actions: {}",
                    self.state.session_manager.count(),
                    states.join(", "),
                    self.world.pending_actions()
                );
            }
            ConsoleCommand::Pause => {
                self.world.pause();
                println!("World paused");
            }
            ConsoleCommand::Resume => {
                self.world.resume();
                println!("World resumed");
            }
            ConsoleCommand::Stats => print!("{}", self.state.stats.render()),
            ConsoleCommand::Save => {
                let (saved, failed) = self.world.save_all();
                println!("Saved {} entities ({} failed)", saved, failed);
            }
            ConsoleCommand::Spawn { template, map, x, y } => {
                match self.world.spawn(map, template, Vec2::new(x, y)) {
                    Ok(id) => println!("Spawned {} on map {}", id, map),
                    Err(e) => println!("Spawn failed: {}", e),
                }
            }
            ConsoleCommand::Despawn { map, entity } => match self.world.despawn(map, entity) {
                Ok(removed) => {
                    self.players.retain(|_, &mut (m, e)| !(m == map && e == entity));
                    println!("Despawned {} ({})", entity, removed.name);
                }
                Err(e) => println!("Despawn failed: {}", e),
            },
            ConsoleCommand::Snapshot { map } => match self.world.map(map) {
                Some(target) => match serde_json::to_string_pretty(&target.snapshots()) {
                    Ok(json) => println!("{}", json),
                    Err(e) => println!("Snapshot failed: {}", e),
                },
                None => println!("No map {}", map),
            },
            ConsoleCommand::Saved { map } => match self.state.repository.load_entities(map) {
                Ok(stored) => match serde_json::to_string_pretty(&stored) {
                    Ok(json) => println!("{}", json),
                    Err(e) => println!("Saved entities unavailable: {}", e),
                },
                Err(e) => println!("Load failed: {}", e),
            },
        }
        true
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn wait_for_shutdown(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    // Signal all tasks to shut down
    let _ = shutdown_tx.send(());
}
