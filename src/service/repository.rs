//! Pokemon repository: persist hooks, identity checks and not-found handling over a data source.

use crate::datasource::DataSource;
use crate::error::AppError;
use crate::filter::{Filter, Where};
use crate::model::{timestamp, Pokemon, PokemonPatch, ID_PROPERTY, MODEL_NAME, MODIFIED_PROPERTY};
use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Write operation a persist hook runs for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Create,
    UpdateAll,
    UpdateById,
    ReplaceById,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::UpdateAll => "updateAll",
            Operation::UpdateById => "updateById",
            Operation::ReplaceById => "replaceById",
        }
    }
}

/// Data about to be written, handed to each persist observer in registration order.
pub struct PersistContext<'a> {
    pub model: &'static str,
    pub operation: Operation,
    /// Target record for by-id writes.
    pub id: Option<&'a str>,
    pub data: &'a mut Map<String, Value>,
}

pub type PersistObserver =
    Arc<dyn Fn(&mut PersistContext<'_>) -> Result<(), AppError> + Send + Sync>;

/// Sets `modified` to the current time (millisecond precision), replacing any client value.
pub fn stamp_modified(ctx: &mut PersistContext<'_>) -> Result<(), AppError> {
    let now = timestamp::format(&Utc::now());
    tracing::trace!(
        model = ctx.model,
        operation = ctx.operation.as_str(),
        modified = %now,
        "persist hook"
    );
    ctx.data
        .insert(MODIFIED_PROPERTY.to_string(), Value::String(now));
    Ok(())
}

pub struct PokemonRepository {
    data_source: Arc<dyn DataSource>,
    observers: Vec<PersistObserver>,
}

impl PokemonRepository {
    /// Repository over `data_source` with the `modified` stamping hook registered.
    pub fn new(data_source: Arc<dyn DataSource>) -> Self {
        let mut repo = PokemonRepository {
            data_source,
            observers: Vec::new(),
        };
        repo.observe_persist(Arc::new(stamp_modified));
        repo
    }

    /// Register a hook that runs before every create and update. An error aborts the write.
    pub fn observe_persist(&mut self, observer: PersistObserver) {
        self.observers.push(observer);
    }

    pub fn data_source(&self) -> &Arc<dyn DataSource> {
        &self.data_source
    }

    fn notify_persist(
        &self,
        operation: Operation,
        id: Option<&str>,
        data: &mut Map<String, Value>,
    ) -> Result<(), AppError> {
        let mut ctx = PersistContext {
            model: MODEL_NAME,
            operation,
            id,
            data,
        };
        for observer in &self.observers {
            observer(&mut ctx)?;
        }
        Ok(())
    }

    pub async fn create(&self, mut data: Map<String, Value>) -> Result<Pokemon, AppError> {
        self.notify_persist(Operation::Create, None, &mut data)?;
        let record = Pokemon::from_data(data)?;
        tracing::debug!(name = %record.name, "create");
        self.data_source.create(record).await
    }

    pub async fn count(&self, where_: Option<&Where>) -> Result<u64, AppError> {
        self.data_source.count(where_).await
    }

    pub async fn find(&self, filter: &Filter) -> Result<Vec<Pokemon>, AppError> {
        filter.check_include()?;
        self.data_source.find(filter).await
    }

    pub async fn find_by_id(&self, name: &str, filter: Option<&Filter>) -> Result<Pokemon, AppError> {
        if let Some(f) = filter {
            f.check_include()?;
        }
        self.data_source
            .find_by_id(name)
            .await?
            .ok_or_else(|| AppError::not_found(MODEL_NAME, name))
    }

    /// Patch every record matching `where_` (all records when `None`). Returns the match count.
    pub async fn update_all(
        &self,
        mut data: Map<String, Value>,
        where_: Option<&Where>,
    ) -> Result<u64, AppError> {
        if data.contains_key(ID_PROPERTY) {
            return Err(AppError::BadRequest(format!(
                "{} cannot be changed by a bulk update",
                ID_PROPERTY
            )));
        }
        self.notify_persist(Operation::UpdateAll, None, &mut data)?;
        let patch = PokemonPatch::from_data(data)?;
        let n = self.data_source.update_all(&patch, where_).await?;
        tracing::debug!(count = n, "update all");
        Ok(n)
    }

    pub async fn update_by_id(&self, name: &str, mut data: Map<String, Value>) -> Result<(), AppError> {
        check_identity(name, &data)?;
        self.notify_persist(Operation::UpdateById, Some(name), &mut data)?;
        let patch = PokemonPatch::from_data(data)?;
        tracing::debug!(name = %name, "update by id");
        if self.data_source.update_by_id(name, &patch).await? {
            Ok(())
        } else {
            Err(AppError::not_found(MODEL_NAME, name))
        }
    }

    /// Replace the whole record; properties absent from `data` are removed.
    pub async fn replace_by_id(&self, name: &str, mut data: Map<String, Value>) -> Result<(), AppError> {
        check_identity(name, &data)?;
        data.insert(ID_PROPERTY.to_string(), Value::String(name.to_string()));
        self.notify_persist(Operation::ReplaceById, Some(name), &mut data)?;
        let record = Pokemon::from_data(data)?;
        tracing::debug!(name = %name, "replace by id");
        if self.data_source.replace_by_id(record).await? {
            Ok(())
        } else {
            Err(AppError::not_found(MODEL_NAME, name))
        }
    }

    pub async fn delete_by_id(&self, name: &str) -> Result<(), AppError> {
        tracing::debug!(name = %name, "delete by id");
        if self.data_source.delete_by_id(name).await? {
            Ok(())
        } else {
            Err(AppError::not_found(MODEL_NAME, name))
        }
    }
}

/// A body `name` must match the path name.
fn check_identity(name: &str, data: &Map<String, Value>) -> Result<(), AppError> {
    match data.get(ID_PROPERTY) {
        None => Ok(()),
        Some(Value::String(s)) if s == name => Ok(()),
        Some(other) => Err(AppError::BadRequest(format!(
            "{} cannot be changed from {:?} to {}",
            ID_PROPERTY, name, other
        ))),
    }
}
