//! World data loading
//!
//! Templates and map layouts live in a TOML file under the data path:
//!
//! ```toml
//! [[templates]]
//! id = 1
//! name = "Floor"
//! kind = "wall"
//! width = 512.0
//! height = 32.0
//!
//! [[maps]]
//! id = 1
//! name = "Town"
//! width = 1024.0
//! height = 768.0
//! spawns = [{ template = 1, x = 0.0, y = 700.0 }]
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::game::entity::TemplateId;
use crate::game::factory::EntityTemplate;
use crate::game::map::MapId;

/// Contents of the world data file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldData {
    #[serde(default)]
    pub templates: Vec<EntityTemplate>,
    #[serde(default)]
    pub maps: Vec<MapDefinition>,
}

/// Layout of one map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapDefinition {
    pub id: MapId,
    pub name: String,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub spawns: Vec<SpawnDefinition>,
}

/// Entity placed on a map at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnDefinition {
    pub template: TemplateId,
    pub x: f32,
    pub y: f32,
}

impl WorldData {
    /// Read and parse a world data file
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read world data: {}", path.display()))?;
        let data = Self::parse(&content)
            .with_context(|| format!("Failed to parse world data: {}", path.display()))?;

        info!(
            templates = data.templates.len(),
            maps = data.maps.len(),
            path = %path.display(),
            "World data loaded"
        );
        Ok(data)
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn template(&self, id: TemplateId) -> Option<&EntityTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }
}
