//! Server configuration module
//!
//! Handles loading and parsing of server configuration from files and environment variables.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::game::entity::TemplateId;
use crate::game::map::{MapId, PhysicsSettings};
use crate::spatial::MIN_SEGMENT_SIZE;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "DEMOGAME_CONFIG";

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Server name shown in logs and `info`
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// Address the game listener binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Game port (TCP)
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Path to data files (world templates and maps)
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,

    /// World data file name, relative to `data_path`
    #[serde(default = "default_world_file")]
    pub world_file: String,

    /// Maximum connections from one IP address
    #[serde(default = "default_max_connections_per_ip")]
    pub max_connections_per_ip: usize,

    /// Simulation timing
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Physics constants
    #[serde(default)]
    pub physics: PhysicsConfig,

    /// Spatial grid configuration
    #[serde(default)]
    pub grid: GridConfig,

    /// Message statistics output
    #[serde(default)]
    pub stats: StatsConfig,
}

/// Simulation timing and spawning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Fixed simulation step in milliseconds
    #[serde(default = "default_update_rate")]
    pub update_rate_ms: u32,

    /// Largest backlog replayed in one update before snapping
    #[serde(default = "default_max_update_delta")]
    pub max_update_delta_ms: u32,

    /// How often the host polls the world
    #[serde(default = "default_host_frame")]
    pub host_frame_ms: u64,

    /// Autosave interval in steps (0 to disable)
    #[serde(default = "default_autosave_interval")]
    pub autosave_interval_steps: u64,

    /// Seed for NPC behaviour
    #[serde(default)]
    pub rng_seed: u64,

    /// Template used for connecting players
    #[serde(default = "default_player_template")]
    pub player_template: TemplateId,

    /// Map new players start on
    #[serde(default = "default_spawn_map")]
    pub spawn_map: MapId,

    #[serde(default = "default_spawn_x")]
    pub spawn_x: f32,

    #[serde(default = "default_spawn_y")]
    pub spawn_y: f32,
}

/// Physics constants (world units and milliseconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicsConfig {
    #[serde(default = "default_gravity")]
    pub gravity: f32,

    #[serde(default = "default_max_fall_speed")]
    pub max_fall_speed: f32,

    #[serde(default = "default_move_speed")]
    pub move_speed: f32,

    /// Initial jump speed (negative is up)
    #[serde(default = "default_jump_velocity")]
    pub jump_velocity: f32,
}

/// Spatial grid configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Cell size in world units
    #[serde(default = "default_segment_size")]
    pub segment_size: u32,
}

/// Message statistics output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Write stats to a file periodically
    #[serde(default)]
    pub enabled: bool,

    /// Output file
    #[serde(default = "default_stats_path")]
    pub output_path: PathBuf,

    /// Flush interval in milliseconds
    #[serde(default = "default_dump_rate")]
    pub dump_rate_ms: u64,
}

// Default value functions
fn default_server_name() -> String {
    "DemoGame".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    44445
}

fn default_data_path() -> PathBuf {
    PathBuf::from("./data")
}

fn default_world_file() -> String {
    "world.toml".to_string()
}

fn default_max_connections_per_ip() -> usize {
    10
}

fn default_update_rate() -> u32 {
    20
}

fn default_max_update_delta() -> u32 {
    5000
}

fn default_host_frame() -> u64 {
    5
}

fn default_autosave_interval() -> u64 {
    15_000 // 5 minutes at 20ms
}

fn default_player_template() -> TemplateId {
    2
}

fn default_spawn_map() -> MapId {
    1
}

fn default_spawn_x() -> f32 {
    64.0
}

fn default_spawn_y() -> f32 {
    64.0
}

fn default_gravity() -> f32 {
    PhysicsSettings::default().gravity
}

fn default_max_fall_speed() -> f32 {
    PhysicsSettings::default().max_fall_speed
}

fn default_move_speed() -> f32 {
    PhysicsSettings::default().move_speed
}

fn default_jump_velocity() -> f32 {
    PhysicsSettings::default().jump_velocity
}

fn default_segment_size() -> u32 {
    32
}

fn default_stats_path() -> PathBuf {
    PathBuf::from("message_stats.txt")
}

fn default_dump_rate() -> u64 {
    10_000
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            update_rate_ms: default_update_rate(),
            max_update_delta_ms: default_max_update_delta(),
            host_frame_ms: default_host_frame(),
            autosave_interval_steps: default_autosave_interval(),
            rng_seed: 0,
            player_template: default_player_template(),
            spawn_map: default_spawn_map(),
            spawn_x: default_spawn_x(),
            spawn_y: default_spawn_y(),
        }
    }
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: default_gravity(),
            max_fall_speed: default_max_fall_speed(),
            move_speed: default_move_speed(),
            jump_velocity: default_jump_velocity(),
        }
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            segment_size: default_segment_size(),
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            output_path: default_stats_path(),
            dump_rate_ms: default_dump_rate(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config/server.toml"),
            server_name: default_server_name(),
            bind_address: default_bind_address(),
            listen_port: default_listen_port(),
            data_path: default_data_path(),
            world_file: default_world_file(),
            max_connections_per_ip: default_max_connections_per_ip(),
            simulation: SimulationConfig::default(),
            physics: PhysicsConfig::default(),
            grid: GridConfig::default(),
            stats: StatsConfig::default(),
        }
    }
}

impl From<&PhysicsConfig> for PhysicsSettings {
    fn from(config: &PhysicsConfig) -> Self {
        Self {
            gravity: config.gravity,
            max_fall_speed: config.max_fall_speed,
            move_speed: config.move_speed,
            jump_velocity: config.jump_velocity,
        }
    }
}

impl ServerConfig {
    /// Load configuration from file and environment variables
    pub async fn load() -> Result<Self> {
        // Determine config path from environment or use default
        let config_path = env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/server.toml"));

        let mut config = Self::load_from(&config_path).await?;

        // Override with environment variables
        config.apply_env_overrides();

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Load a config file without environment overrides. A missing file
    /// yields the defaults.
    pub async fn load_from(config_path: &Path) -> Result<Self> {
        let mut config = if config_path.exists() {
            let content = tokio::fs::read_to_string(config_path)
                .await
                .with_context(|| {
                    format!("Failed to read config file: {}", config_path.display())
                })?;

            toml::from_str(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };

        config.config_path = config_path.to_path_buf();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("DEMOGAME_SERVER_NAME") {
            self.server_name = val;
        }
        if let Ok(val) = env::var("DEMOGAME_BIND_ADDRESS") {
            self.bind_address = val;
        }
        if let Ok(val) = env::var("DEMOGAME_LISTEN_PORT") {
            if let Ok(port) = val.parse() {
                self.listen_port = port;
            }
        }
        if let Ok(val) = env::var("DEMOGAME_DATA_PATH") {
            self.data_path = PathBuf::from(val);
        }
        if let Ok(val) = env::var("DEMOGAME_UPDATE_RATE_MS") {
            if let Ok(rate) = val.parse() {
                self.simulation.update_rate_ms = rate;
            }
        }
        if let Ok(val) = env::var("DEMOGAME_MAX_UPDATE_DELTA_MS") {
            if let Ok(delta) = val.parse() {
                self.simulation.max_update_delta_ms = delta;
            }
        }
        if let Ok(val) = env::var("DEMOGAME_RNG_SEED") {
            if let Ok(seed) = val.parse() {
                self.simulation.rng_seed = seed;
            }
        }
        if let Ok(val) = env::var("DEMOGAME_SEGMENT_SIZE") {
            if let Ok(size) = val.parse() {
                self.grid.segment_size = size;
            }
        }
        if let Ok(val) = env::var("DEMOGAME_STATS_ENABLED") {
            self.stats.enabled = val.to_lowercase() == "true" || val == "1";
        }
        if let Ok(val) = env::var("DEMOGAME_STATS_PATH") {
            self.stats.output_path = PathBuf::from(val);
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let sim = &self.simulation;

        if sim.update_rate_ms == 0 || sim.update_rate_ms > sim.max_update_delta_ms {
            anyhow::bail!(
                "Update rate must be between 1ms and max_update_delta_ms ({}ms)",
                sim.max_update_delta_ms
            );
        }

        if sim.host_frame_ms == 0 {
            anyhow::bail!("Host frame interval must be at least 1ms");
        }

        if self.grid.segment_size < MIN_SEGMENT_SIZE {
            anyhow::bail!("Grid segment size must be at least {}", MIN_SEGMENT_SIZE);
        }

        if self.physics.gravity < 0.0
            || self.physics.max_fall_speed <= 0.0
            || self.physics.move_speed <= 0.0
        {
            anyhow::bail!("Physics speeds must be positive");
        }

        if self.stats.dump_rate_ms < 100 {
            anyhow::bail!("Stats dump rate must be at least 100ms");
        }

        if self.max_connections_per_ip == 0 {
            anyhow::bail!("Max connections per IP must be at least 1");
        }

        Ok(())
    }

    /// Full path of the world data file
    pub fn world_data_path(&self) -> PathBuf {
        self.data_path.join(&self.world_file)
    }

    /// Socket address string for the game listener
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.listen_port)
    }
}
