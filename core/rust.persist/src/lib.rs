use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use wardencore_rs::types::GuildId;

pub type Error = Box<dyn std::error::Error + Send + Sync>; // This is constant and should be copy pasted

/// A guild's full persisted document
///
/// The `scheduler` section is owned exclusively by the scheduler. Every
/// other subsystem's sections ride along in `rest` and survive
/// full-document rewrites untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuildDocument {
    #[serde(default)]
    pub scheduler: Vec<serde_json::Value>,

    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

/// Flat-file per-guild document store: one JSON file per guild under a
/// single directory
///
/// Documents are cached in memory; `save` rewrites the guild's full
/// document to disk. Callers must not race concurrent saves for the
/// same guild.
pub struct JsonGuildStore {
    dir: PathBuf,
    cache: dashmap::DashMap<GuildId, GuildDocument>,
}

impl JsonGuildStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<JsonGuildStore, Error> {
        let dir = dir.as_ref().to_path_buf();

        std::fs::create_dir_all(&dir)
            .map_err(|e| format!("Failed to create directory {}: {}", dir.display(), e))?;

        Ok(JsonGuildStore {
            dir,
            cache: dashmap::DashMap::new(),
        })
    }

    fn path(&self, guild_id: GuildId) -> PathBuf {
        self.dir.join(format!("{}.json", guild_id))
    }

    /// Reads a guild's document from disk into the cache
    ///
    /// A guild with no document yet yields the default (empty) document.
    pub fn load(&self, guild_id: GuildId) -> Result<GuildDocument, Error> {
        let path = self.path(guild_id);

        let doc = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;

            serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?
        } else {
            GuildDocument::default()
        };

        self.cache.insert(guild_id, doc.clone());

        Ok(doc)
    }

    /// Returns the cached document, reading from disk on first access
    pub fn get(&self, guild_id: GuildId) -> Result<GuildDocument, Error> {
        if let Some(doc) = self.cache.get(&guild_id) {
            return Ok(doc.clone());
        }

        self.load(guild_id)
    }

    /// Applies a mutation to the cached document, then rewrites the full
    /// document to disk
    pub fn update<F: FnOnce(&mut GuildDocument)>(
        &self,
        guild_id: GuildId,
        f: F,
    ) -> Result<(), Error> {
        let mut doc = self.get(guild_id)?;
        f(&mut doc);
        self.cache.insert(guild_id, doc);

        self.save(guild_id)
    }

    /// Rewrites the guild's full cached document to disk
    pub fn save(&self, guild_id: GuildId) -> Result<(), Error> {
        let doc = self
            .cache
            .get(&guild_id)
            .map(|d| d.clone())
            .unwrap_or_default();

        let path = self.path(guild_id);
        let contents = serde_json::to_string_pretty(&doc)?;

        std::fs::write(&path, contents)
            .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;

        Ok(())
    }

    /// Lists every guild with a document on disk
    pub fn list_guilds(&self) -> Result<Vec<GuildId>, Error> {
        let mut guilds = Vec::new();

        for entry in std::fs::read_dir(&self.dir)
            .map_err(|e| format!("Failed to read directory {}: {}", self.dir.display(), e))?
        {
            let entry = entry.map_err(|e| format!("Failed to read entry: {}", e))?;
            let path = entry.path();

            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            match GuildId::from_str(stem) {
                Ok(guild_id) => guilds.push(guild_id),
                Err(_) => {
                    log::warn!("Ignoring non-guild file in data dir: {}", path.display());
                }
            }
        }

        guilds.sort();

        Ok(guilds)
    }
}

#[async_trait::async_trait]
impl scheduler::SchedulerStore for JsonGuildStore {
    async fn load(&self, guild_id: GuildId) -> Result<Vec<serde_json::Value>, Error> {
        Ok(JsonGuildStore::load(self, guild_id)?.scheduler)
    }

    async fn save(
        &self,
        guild_id: GuildId,
        records: &[scheduler::TaskRecord],
    ) -> Result<(), Error> {
        let values = records
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;

        self.update(guild_id, |doc| doc.scheduler = values)
    }
}
