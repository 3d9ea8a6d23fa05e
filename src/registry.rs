//! Tag Registry
//!
//! Static lookup from tag identifier to either a roster player or a resource
//! category. Built once at startup from two tables and never mutated afterwards:
//!
//! ```toml
//! [[players]]
//! id = "Player1"
//! tag = "EF89FE1E"
//! label = "P1"
//!
//! [resources]
//! FIRE = ["047BB30CBE2A81", "534DE1D9410001"]
//! WATER = ["5387D4D9410001"]
//! ```
//!
//! The resource table is inverted into tag -> category. Loading fails on any
//! tag that appears twice, whether inside one category, across categories, or
//! in both tables.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::domain::{PlayerId, ResourceCategory, TagId};
use crate::error::{RegistryError, Result};

/// Raw registry tables as written on disk
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RegistryTables {
    /// Roster in canonical order; trade rotation follows this order
    pub players: Vec<PlayerEntry>,
    /// Category name -> tags
    #[serde(default)]
    pub resources: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerEntry {
    pub id: String,
    pub tag: String,
    /// Short display name, defaults to the id
    #[serde(default)]
    pub label: Option<String>,
}

/// A roster player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub tag: TagId,
    pub label: String,
}

/// What a scanned tag stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind<'a> {
    Player(&'a Player),
    Resource(&'a ResourceCategory),
}

#[derive(Debug, Clone)]
pub struct TagRegistry {
    roster: Vec<Player>,
    player_tags: HashMap<TagId, usize>,
    resource_tags: HashMap<TagId, ResourceCategory>,
    category_sizes: BTreeMap<ResourceCategory, usize>,
}

impl TagRegistry {
    /// Load and validate the registry from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let registry = Self::from_toml_str(&raw)?;
        info!(
            path = %path.display(),
            players = registry.roster.len(),
            resource_tags = registry.resource_tags.len(),
            "Tag registry loaded"
        );
        Ok(registry)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let tables: RegistryTables = toml::from_str(raw)?;
        Ok(Self::from_tables(tables)?)
    }

    /// Build the runtime lookup, rejecting every overlap between entries
    pub fn from_tables(tables: RegistryTables) -> std::result::Result<Self, RegistryError> {
        if tables.players.is_empty() {
            return Err(RegistryError::EmptyRoster);
        }

        // tag -> owner description, used to report both sides of a clash
        let mut owners: HashMap<TagId, String> = HashMap::new();
        let mut roster = Vec::with_capacity(tables.players.len());
        let mut player_tags = HashMap::new();

        for entry in tables.players {
            let id = entry.id.trim();
            if id.is_empty() {
                return Err(RegistryError::InvalidTag {
                    tag: entry.tag,
                    context: "player with empty id".to_string(),
                });
            }
            if roster.iter().any(|p: &Player| p.id.as_str() == id) {
                return Err(RegistryError::DuplicatePlayer(id.to_string()));
            }

            let tag = parse_tag(&entry.tag, &format!("player {id}"))?;
            let owner = format!("player {id}");
            if let Some(first) = owners.insert(tag.clone(), owner.clone()) {
                return Err(RegistryError::DuplicateTag {
                    tag: tag.to_string(),
                    first,
                    second: owner,
                });
            }

            let label = entry
                .label
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| id.to_string());

            player_tags.insert(tag.clone(), roster.len());
            roster.push(Player {
                id: PlayerId::new(id),
                tag,
                label,
            });
        }

        let mut resource_tags = HashMap::new();
        let mut category_sizes = BTreeMap::new();

        for (name, tags) in tables.resources {
            let category = ResourceCategory::new(&name);
            if category.is_empty() {
                return Err(RegistryError::InvalidCategory(name));
            }
            if category_sizes.contains_key(&category) {
                // Two keys that only differ by case or whitespace
                return Err(RegistryError::InvalidCategory(name));
            }

            let owner = format!("resource {category}");
            for raw in &tags {
                let tag = parse_tag(raw, &owner)?;
                if let Some(first) = owners.insert(tag.clone(), owner.clone()) {
                    return Err(RegistryError::DuplicateTag {
                        tag: tag.to_string(),
                        first,
                        second: owner,
                    });
                }
                resource_tags.insert(tag, category.clone());
            }
            debug!(category = %category, count = tags.len(), "Resource category registered");
            category_sizes.insert(category, tags.len());
        }

        Ok(Self {
            roster,
            player_tags,
            resource_tags,
            category_sizes,
        })
    }

    /// Resolve a scanned tag
    pub fn resolve(&self, tag: &TagId) -> Option<TagKind<'_>> {
        if let Some(&idx) = self.player_tags.get(tag) {
            return Some(TagKind::Player(&self.roster[idx]));
        }
        self.resource_tags.get(tag).map(TagKind::Resource)
    }

    pub fn resource_category(&self, tag: &TagId) -> Option<&ResourceCategory> {
        self.resource_tags.get(tag)
    }

    /// Players in canonical roster order
    pub fn roster(&self) -> &[Player] {
        &self.roster
    }

    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.roster.iter().find(|p| &p.id == id)
    }

    /// Display label for a player, falling back to the raw id
    pub fn label<'a>(&'a self, id: &'a PlayerId) -> &'a str {
        self.player(id).map(|p| p.label.as_str()).unwrap_or(id.as_str())
    }

    /// Number of tags registered per category
    pub fn categories(&self) -> &BTreeMap<ResourceCategory, usize> {
        &self.category_sizes
    }
}

fn parse_tag(raw: &str, context: &str) -> std::result::Result<TagId, RegistryError> {
    TagId::normalize(raw).ok_or_else(|| RegistryError::InvalidTag {
        tag: raw.to_string(),
        context: context.to_string(),
    })
}
