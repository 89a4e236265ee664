//! Application state module
//!
//! Contains the shared state used by connection tasks. The world itself is
//! not shared: it is owned by the simulation loop, which is the only writer.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::info;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::game::factory::EntityFactory;
use crate::game::persistence::EntityRepository;
use crate::game::world::{GameWorld, WorldSettings};
use crate::net::dispatch::MessageDispatcher;
use crate::net::handler::IngressEvent;
use crate::net::session::SessionManager;
use crate::net::stats::MessageStats;
use crate::protocol::client::{client_dispatcher, ClientSession};

/// Application state shared across all connections
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Session manager for tracking connected clients
    pub session_manager: SessionManager,
    /// Per-message statistics
    pub stats: Arc<MessageStats>,
    /// Client message handlers
    pub dispatcher: MessageDispatcher<ClientSession>,
    /// Storage collaborator
    pub repository: Arc<dyn EntityRepository>,
    /// Entity constructors
    pub factory: Arc<EntityFactory>,
    /// Events flowing from connections to the simulation loop
    pub ingress_tx: mpsc::UnboundedSender<IngressEvent>,
    /// Shutdown signal sender
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    /// Create the application state
    pub fn new(
        config: ServerConfig,
        repository: Arc<dyn EntityRepository>,
        ingress_tx: mpsc::UnboundedSender<IngressEvent>,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Result<Self> {
        let stats = Arc::new(MessageStats::new());
        let dispatcher = client_dispatcher(stats.clone())?;
        let factory = Arc::new(EntityFactory::with_defaults());
        info!(
            handlers = dispatcher.registered_ids().len(),
            kinds = ?factory.kinds(),
            "Application state initialized"
        );

        Ok(Self {
            session_manager: SessionManager::new(config.max_connections_per_ip),
            config,
            stats,
            dispatcher,
            repository,
            factory,
            ingress_tx,
            shutdown_tx,
        })
    }

    /// Create world settings from server config
    pub fn create_world_settings(config: &ServerConfig) -> WorldSettings {
        let sim = &config.simulation;

        info!(
            update_rate_ms = sim.update_rate_ms,
            autosave_interval_steps = sim.autosave_interval_steps,
            "Configuring world"
        );

        WorldSettings::default()
            .with_name(config.server_name.clone())
            .with_update_rate(sim.update_rate_ms, sim.max_update_delta_ms)
            .with_autosave_interval(sim.autosave_interval_steps)
            .with_segment_size(config.grid.segment_size)
            .with_physics((&config.physics).into())
            .with_rng_seed(sim.rng_seed)
    }

    /// Build an empty world sharing this state's repository and factory
    pub fn create_world(&self) -> GameWorld {
        GameWorld::new(
            Self::create_world_settings(&self.config),
            self.repository.clone(),
            self.factory.clone(),
        )
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("server_name", &self.config.server_name)
            .field("sessions", &self.session_manager.count())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}
