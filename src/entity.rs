// Telegram destinations per platform and content type

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::config::ConfigError;
use crate::error::Error;
use crate::platform::{ContentType, Platform, PlatformInfo};

/// Where an upload goes: a forum group and one of its topics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Destination {
    pub group_id: i64,
    pub topic_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityConfig {
    pub group_id: i64,
    pub topics: HashMap<ContentType, i64>,
}

impl EntityConfig {
    /// Clips go to their own topic when configured, otherwise to shorts.
    pub fn topic_for(&self, content_type: ContentType) -> Option<i64> {
        match content_type {
            ContentType::Clip => self
                .topics
                .get(&ContentType::Clip)
                .or_else(|| self.topics.get(&ContentType::Short))
                .copied(),
            other => self.topics.get(&other).copied(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    group_id: i64,
    #[serde(default)]
    topics: HashMap<String, i64>,
}

/// Immutable platform -> destination table, loaded once at startup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityMap {
    entries: HashMap<Platform, EntityConfig>,
}

impl EntityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, platform: Platform, config: EntityConfig) {
        self.entries.insert(platform, config);
    }

    /// Builder-style helper, mostly for tests and fixtures
    pub fn with(mut self, platform: Platform, group_id: i64, topics: &[(ContentType, i64)]) -> Self {
        self.insert(
            platform,
            EntityConfig {
                group_id,
                topics: topics.iter().copied().collect(),
            },
        );
        self
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::parse(&content).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    /// Parse and validate the JSON entity map.
    pub fn parse(json: &str) -> Result<Self, ConfigError> {
        let raw: HashMap<String, RawEntity> =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse {
                path: "entities".to_string(),
                message: e.to_string(),
            })?;

        let mut map = Self::new();
        for (name, entity) in raw {
            let platform: Platform = name.parse().map_err(|reason| ConfigError::Invalid {
                key: "entities".to_string(),
                value: name.clone(),
                reason,
            })?;

            let mut topics = HashMap::new();
            for (key, topic_id) in entity.topics {
                let content_type = topic_key(&key).ok_or_else(|| ConfigError::Invalid {
                    key: format!("entities.{}.topics", name),
                    value: key.clone(),
                    reason: "expected videos, shorts or clips".to_string(),
                })?;
                if topics.insert(content_type, topic_id).is_some() {
                    return Err(ConfigError::Invalid {
                        key: format!("entities.{}.topics", name),
                        value: key,
                        reason: format!("{} topic is listed more than once", content_type),
                    });
                }
            }

            if map.entries.contains_key(&platform) {
                return Err(ConfigError::Invalid {
                    key: "entities".to_string(),
                    value: name,
                    reason: format!("{} is listed more than once", platform),
                });
            }
            map.insert(
                platform,
                EntityConfig {
                    group_id: entity.group_id,
                    topics,
                },
            );
        }

        Ok(map)
    }

    pub fn resolve(&self, info: &PlatformInfo) -> Result<Destination, Error> {
        let unresolved = || Error::UnresolvedEntity {
            platform: info.platform,
            content_type: info.content_type,
        };

        let entity = self.entries.get(&info.platform).ok_or_else(unresolved)?;
        let topic_id = entity.topic_for(info.content_type).ok_or_else(unresolved)?;

        Ok(Destination {
            group_id: entity.group_id,
            topic_id,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn topic_key(key: &str) -> Option<ContentType> {
    match key.trim().to_ascii_lowercase().as_str() {
        "videos" | "video" => Some(ContentType::Video),
        "shorts" | "short" => Some(ContentType::Short),
        "clips" | "clip" => Some(ContentType::Clip),
        _ => None,
    }
}
