//! Generic CRUD over the entity store. Each public operation is a single-shot state machine
//! that never lets an error escape: failures become error envelopes.

use crate::config::ResolvedEntity;
use crate::error::{AppError, FieldErrors, Operation, Unsupported};
use crate::query::{translate, Pagination, QueryRequest};
use crate::response::ResultEnvelope;
use crate::service::includes::{self, IncludeTree};
use crate::service::representation::{append, changed_fields, present};
use crate::service::RequestValidator;
use crate::state::AppState;
use crate::store::{key_string, DeleteMode, Record, StoreError, Trashed};
use serde_json::{json, Map, Value};

#[derive(Clone)]
pub struct CrudService {
    state: AppState,
}

impl CrudService {
    pub fn new(state: AppState) -> Self {
        CrudService { state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Validate and insert one record.
    pub async fn create(&self, resource: &str, payload: &Value) -> ResultEnvelope {
        Self::finish(Operation::Create, resource, self.try_create(resource, payload).await)
    }

    /// Filtered, sorted, paginated listing.
    pub async fn read(&self, request: &QueryRequest) -> ResultEnvelope {
        Self::finish(Operation::Read, &request.resource, self.try_read(request).await)
    }

    /// Overwrite the supplied fields of one record.
    pub async fn update(&self, resource: &str, id: &Value, payload: &Value) -> ResultEnvelope {
        Self::finish(Operation::Update, resource, self.try_update(resource, id, payload).await)
    }

    /// Soft or permanent delete of one record.
    pub async fn delete(&self, resource: &str, id: &Value, force: bool) -> ResultEnvelope {
        Self::finish(Operation::Delete, resource, self.try_delete(resource, id, force).await)
    }

    fn finish(op: Operation, resource: &str, result: Result<ResultEnvelope, AppError>) -> ResultEnvelope {
        match result {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(operation = %op, resource = %resource, code = e.code(), error = %e, "operation failed");
                e.into_envelope(op)
            }
        }
    }

    fn resolve(&self, resource: &str, op: Operation) -> Result<&ResolvedEntity, AppError> {
        let entity = self.state.registry.resolve(resource)?;
        if !entity.allows(op.as_str()) {
            return Err(AppError::UnsupportedOperation {
                resource: resource.to_string(),
                detail: Unsupported::NotAllowed(op),
            });
        }
        if matches!(op, Operation::Create | Operation::Update) && !entity.supports_validation {
            return Err(AppError::UnsupportedOperation {
                resource: resource.to_string(),
                detail: Unsupported::Validation,
            });
        }
        Ok(entity)
    }

    async fn try_create(&self, resource: &str, payload: &Value) -> Result<ResultEnvelope, AppError> {
        let entity = self.resolve(resource, Operation::Create)?;
        let attributes = payload_object(payload)?;
        RequestValidator::validate_attributes(entity, &attributes)?;
        RequestValidator::validate(&attributes, &entity.validation)?;

        let stored = self.state.store.insert(entity, &attributes).await?;
        let id = stored.get(&entity.primary_key).cloned().unwrap_or(Value::Null);
        let fresh = self.refresh(entity, &id).await?;
        tracing::info!(resource = %resource, id = %id, "created record");

        let mut metadata = Map::new();
        metadata.insert("resource".into(), json!(resource));
        metadata.insert("id".into(), id);
        metadata.insert("created_at".into(), fresh.get("created_at").cloned().unwrap_or(Value::Null));
        let data = present(entity, &fresh, None, &[]);
        Ok(ResultEnvelope::success(Value::Object(data), metadata).with_message("Your item has been successfully added"))
    }

    async fn try_read(&self, request: &QueryRequest) -> Result<ResultEnvelope, AppError> {
        let entity = self.resolve(&request.resource, Operation::Read)?;
        let query = translate(entity, request)?;
        let selected = self.state.store.select(entity, &query.selection).await?;

        let mut rows = selected.rows;
        let tree = IncludeTree::from_paths(&query.includes);
        includes::load(
            self.state.store.as_ref(),
            &self.state.registry,
            entity,
            &mut rows,
            &tree,
            &query.fields,
        )
        .await?;

        let keep = tree.names();
        let data: Vec<Value> = rows
            .iter()
            .map(|row| {
                let mut item = present(entity, row, query.fields.get(&entity.uri_key), &keep);
                append(entity, row, &mut item, &query.appends);
                Value::Object(item)
            })
            .collect();

        let pagination = Pagination::new(query.page, selected.total, data.len() as u64);
        tracing::debug!(resource = %entity.uri_key, total = selected.total, page = query.page.number, "read page");
        Ok(ResultEnvelope::success(Value::Array(data), pagination.metadata()).with_links(pagination.links(request)))
    }

    /// `changed_fields` is diffed on the caller-facing representation, so hidden attributes
    /// never appear in it even when they were written.
    async fn try_update(&self, resource: &str, id: &Value, payload: &Value) -> Result<ResultEnvelope, AppError> {
        let entity = self.resolve(resource, Operation::Update)?;
        let key = parse_key(entity, id)?;
        let before = self
            .state
            .store
            .find(entity, &key, Trashed::Exclude)
            .await?
            .ok_or_else(|| record_not_found(entity, id))?;

        let attributes = payload_object(payload)?;
        RequestValidator::validate_attributes(entity, &attributes)?;
        RequestValidator::validate_partial(&attributes, &entity.validation)?;

        self.state
            .store
            .update(entity, &key, &attributes)
            .await?
            .ok_or_else(|| record_not_found(entity, id))?;
        let after = self.refresh(entity, &key).await?;

        let before = present(entity, &before, None, &[]);
        let after = present(entity, &after, None, &[]);
        let changed = changed_fields(&before, &after);
        tracing::info!(resource = %resource, id = %key, changed = ?changed, "updated record");

        let mut metadata = Map::new();
        metadata.insert("resource".into(), json!(resource));
        metadata.insert("id".into(), key);
        metadata.insert("updated_at".into(), after.get("updated_at").cloned().unwrap_or(Value::Null));
        metadata.insert("changed_fields".into(), json!(changed));
        Ok(ResultEnvelope::success(Value::Object(after), metadata).with_message("Your item has been successfully updated"))
    }

    async fn try_delete(&self, resource: &str, id: &Value, force: bool) -> Result<ResultEnvelope, AppError> {
        let entity = self.resolve(resource, Operation::Delete)?;
        let key = parse_key(entity, id)?;
        let (mode, trashed, delete_type) = if force {
            (DeleteMode::Hard, Trashed::Include, "force_deleted")
        } else if entity.soft_deletes {
            (DeleteMode::Soft, Trashed::Exclude, "soft_deleted")
        } else {
            (DeleteMode::Hard, Trashed::Exclude, "deleted")
        };

        let record = self
            .state
            .store
            .find(entity, &key, trashed)
            .await?
            .ok_or_else(|| record_not_found(entity, id))?;
        let data = present(entity, &record, None, &[]);

        match self.state.store.delete(entity, &key, mode).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(StoreError::other("Unable to remove this item. The operation was not successful.").into())
            }
            Err(e) if e.is_foreign_key() => {
                return Err(AppError::ConstraintViolation {
                    resource: resource.to_string(),
                    id: display_id(id),
                })
            }
            Err(e) => return Err(e.into()),
        }
        tracing::info!(resource = %resource, id = %key, delete_type, "deleted record");

        let mut metadata = Map::new();
        metadata.insert("resource".into(), json!(resource));
        metadata.insert("id".into(), key);
        metadata.insert("deleted_at".into(), json!(chrono::Utc::now().to_rfc3339()));
        metadata.insert("delete_type".into(), json!(delete_type));
        metadata.insert("permanently_deleted".into(), json!(delete_type != "soft_deleted"));
        Ok(ResultEnvelope::success(Value::Object(data), metadata).with_message("Your item has been successfully removed"))
    }

    /// Re-read a record after a write so store-side defaults and timestamps are visible.
    async fn refresh(&self, entity: &ResolvedEntity, key: &Value) -> Result<Record, AppError> {
        Ok(self
            .state
            .store
            .find(entity, key, Trashed::Exclude)
            .await?
            .ok_or_else(|| StoreError::other("the saved item could not be reloaded"))?)
    }
}

fn payload_object(payload: &Value) -> Result<Map<String, Value>, AppError> {
    match payload {
        Value::Object(m) if !m.is_empty() => Ok(m.clone()),
        Value::Object(_) | Value::Null => Err(AppError::ValidationFailed(FieldErrors::single(
            "payload",
            "The payload field is required.",
        ))),
        _ => Err(AppError::ValidationFailed(FieldErrors::single(
            "payload",
            "The payload field must be an object.",
        ))),
    }
}

fn display_id(id: &Value) -> String {
    key_string(id).unwrap_or_default()
}

fn record_not_found(entity: &ResolvedEntity, id: &Value) -> AppError {
    AppError::RecordNotFound {
        resource: entity.uri_key.clone(),
        id: display_id(id),
    }
}

/// Ids that cannot be keys of this entity cannot match any record.
fn parse_key(entity: &ResolvedEntity, id: &Value) -> Result<Value, AppError> {
    entity.parse_id(id).ok_or_else(|| record_not_found(entity, id))
}
