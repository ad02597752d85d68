//! In-memory data source, optionally mirrored to a JSON file after every write.
//!
//! File layout: `{"ids": {"Pokemon": n}, "models": {"Pokemon": {"<name>": "<record json>"}}}`.
//! Each record is stored as a JSON string.

use crate::datasource::DataSource;
use crate::error::AppError;
use crate::filter::{Filter, Where};
use crate::model::{Pokemon, PokemonPatch, MODEL_NAME};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tokio::sync::RwLock;

pub struct MemoryDataSource {
    name: String,
    file: Option<PathBuf>,
    state: RwLock<MemoryState>,
}

#[derive(Clone, Default)]
struct MemoryState {
    records: BTreeMap<String, Pokemon>,
    /// Number of records ever created; persisted as `ids.Pokemon`.
    next_id: u64,
}

#[derive(Default, Serialize, Deserialize)]
struct FileLayout {
    #[serde(default)]
    ids: HashMap<String, u64>,
    #[serde(default)]
    models: HashMap<String, BTreeMap<String, String>>,
}

impl MemoryDataSource {
    /// Unpersisted store.
    pub fn new(name: impl Into<String>) -> Self {
        MemoryDataSource {
            name: name.into(),
            file: None,
            state: RwLock::new(MemoryState::default()),
        }
    }

    /// Store backed by `file` when given. A missing file starts empty; an unreadable one is an error.
    pub async fn open(name: impl Into<String>, file: Option<PathBuf>) -> Result<Self, AppError> {
        let name = name.into();
        let mut state = MemoryState::default();
        if let Some(path) = &file {
            match tokio::fs::read_to_string(path).await {
                Ok(text) if !text.trim().is_empty() => {
                    state = parse_file(&text)?;
                    tracing::info!(
                        datasource = %name,
                        file = %path.display(),
                        records = state.records.len(),
                        "loaded memory store"
                    );
                }
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::info!(datasource = %name, file = %path.display(), "memory store file not found, starting empty");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(MemoryDataSource {
            name,
            file,
            state: RwLock::new(state),
        })
    }

    /// Flush `next` to the file, then make it the current state. On a failed flush the
    /// current state is left untouched. Called with the write lock held.
    async fn commit(&self, state: &mut MemoryState, next: MemoryState) -> Result<(), AppError> {
        self.flush(&next).await?;
        *state = next;
        Ok(())
    }

    /// Write the store to its file.
    async fn flush(&self, state: &MemoryState) -> Result<(), AppError> {
        let Some(path) = &self.file else {
            return Ok(());
        };
        let mut layout = FileLayout::default();
        layout.ids.insert(MODEL_NAME.to_string(), state.next_id);
        let mut rows = BTreeMap::new();
        for (name, record) in &state.records {
            let json = serde_json::to_string(record)
                .map_err(|e| AppError::Storage(e.to_string()))?;
            rows.insert(name.clone(), json);
        }
        layout.models.insert(MODEL_NAME.to_string(), rows);
        let text = serde_json::to_string_pretty(&layout)
            .map_err(|e| AppError::Storage(e.to_string()))?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(path, text).await?;
        tracing::debug!(file = %path.display(), records = state.records.len(), "flushed memory store");
        Ok(())
    }
}

fn parse_file(text: &str) -> Result<MemoryState, AppError> {
    let layout: FileLayout =
        serde_json::from_str(text).map_err(|e| AppError::Storage(format!("memory store file: {}", e)))?;
    let mut state = MemoryState {
        next_id: layout.ids.get(MODEL_NAME).copied().unwrap_or(0),
        ..MemoryState::default()
    };
    if let Some(rows) = layout.models.get(MODEL_NAME) {
        for (name, json) in rows {
            let record: Pokemon = serde_json::from_str(json)
                .map_err(|e| AppError::Storage(format!("record {}: {}", name, e)))?;
            state.records.insert(record.name.clone(), record);
        }
    }
    state.next_id = state.next_id.max(state.records.len() as u64);
    Ok(state)
}

#[async_trait]
impl DataSource for MemoryDataSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn connector(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn create(&self, record: Pokemon) -> Result<Pokemon, AppError> {
        let mut state = self.state.write().await;
        if state.records.contains_key(&record.name) {
            return Err(AppError::Conflict(format!(
                "duplicate entry for {}.name: {}",
                MODEL_NAME, record.name
            )));
        }
        tracing::debug!(datasource = %self.name, name = %record.name, "memory create");
        let mut next = state.clone();
        next.records.insert(record.name.clone(), record.clone());
        next.next_id += 1;
        self.commit(&mut state, next).await?;
        Ok(record)
    }

    async fn find(&self, filter: &Filter) -> Result<Vec<Pokemon>, AppError> {
        let state = self.state.read().await;
        Ok(filter.select(state.records.values()))
    }

    async fn find_by_id(&self, name: &str) -> Result<Option<Pokemon>, AppError> {
        let state = self.state.read().await;
        Ok(state.records.get(name).cloned())
    }

    async fn count(&self, where_: Option<&Where>) -> Result<u64, AppError> {
        let state = self.state.read().await;
        let n = match where_ {
            Some(w) => state
                .records
                .values()
                .filter(|p| w.matches(&p.to_value()))
                .count(),
            None => state.records.len(),
        };
        Ok(n as u64)
    }

    async fn update_all(&self, patch: &PokemonPatch, where_: Option<&Where>) -> Result<u64, AppError> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        let mut n = 0u64;
        for record in next.records.values_mut() {
            if where_.map_or(true, |w| w.matches(&record.to_value())) {
                patch.apply_to(record);
                n += 1;
            }
        }
        tracing::debug!(datasource = %self.name, count = n, "memory update_all");
        if n > 0 {
            self.commit(&mut state, next).await?;
        }
        Ok(n)
    }

    async fn update_by_id(&self, name: &str, patch: &PokemonPatch) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        let Some(record) = next.records.get_mut(name) else {
            return Ok(false);
        };
        patch.apply_to(record);
        self.commit(&mut state, next).await?;
        Ok(true)
    }

    async fn replace_by_id(&self, record: Pokemon) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        if !state.records.contains_key(&record.name) {
            return Ok(false);
        }
        let mut next = state.clone();
        next.records.insert(record.name.clone(), record);
        self.commit(&mut state, next).await?;
        Ok(true)
    }

    async fn delete_by_id(&self, name: &str) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        if !state.records.contains_key(name) {
            return Ok(false);
        }
        let mut next = state.clone();
        next.records.remove(name);
        self.commit(&mut state, next).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_file_layout() {
        let text = json!({
            "ids": {"Pokemon": 7},
            "models": {"Pokemon": {
                "mew": "{\"name\":\"mew\",\"modified\":\"2024-01-01T00:00:00.000Z\",\"type\":\"psychic\"}"
            }}
        })
        .to_string();
        let state = parse_file(&text).unwrap();
        assert_eq!(state.next_id, 7);
        let mew = state.records.get("mew").unwrap();
        assert_eq!(mew.properties.get("type"), Some(&json!("psychic")));
        assert!(mew.modified.is_some());
    }

    #[test]
    fn rejects_corrupt_file() {
        assert!(matches!(parse_file("{\"models\": 3}"), Err(AppError::Storage(_))));
    }

    #[tokio::test]
    async fn duplicate_create_conflicts() {
        let ds = MemoryDataSource::new("local");
        ds.create(Pokemon::new("mew")).await.unwrap();
        let err = ds.create(Pokemon::new("mew")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(ds.count(None).await.unwrap(), 1);
    }
}
