//! Compliance audit trail.
//!
//! Every mutating operation of the engine runs through
//! [`AuditRecorder::with_audit`], which stores one `audit_events` row in the
//! same transaction as the mutation: who did what to which entity, plus
//! before/after JSON snapshots for history review. The recorder is an
//! observer: it never changes the outcome of the wrapped operation beyond
//! propagating its error.

use std::{future::Future, pin::Pin};

use chrono::Utc;
use sea_orm::{ActiveValue, DatabaseTransaction, entity::prelude::*};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::ResultEngine;

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuditAction {
    StartShift,
    FinishShift,
    UpdateShift,
    DeleteShift,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StartShift => "START_SHIFT",
            Self::FinishShift => "FINISH_SHIFT",
            Self::UpdateShift => "UPDATE_SHIFT",
            Self::DeleteShift => "DELETE_SHIFT",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuditOperation {
    Insert,
    Update,
    Delete,
}

impl AuditOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

/// Who is performing an audited operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditContext {
    pub actor_type: String,
    pub actor_id: String,
    pub actor_role: String,
    pub source: String,
    pub request_id: String,
}

impl AuditContext {
    /// Context for operations triggered by the system itself (jobs,
    /// scripts, CLI maintenance) rather than a user request.
    pub fn system(job_name: &str) -> Self {
        Self {
            actor_type: "system".to_string(),
            actor_id: job_name.to_string(),
            actor_role: "scheduled-job".to_string(),
            source: "job".to_string(),
            request_id: Uuid::new_v4().to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "audit_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub action: String,
    pub entity: String,
    pub entity_id: String,
    pub operation: String,
    pub actor_type: String,
    pub actor_id: String,
    pub actor_role: String,
    pub source: String,
    pub request_id: String,
    pub before_data: Option<String>,
    pub after_data: Option<String>,
    pub payload_hash: Option<String>,
    pub recorded_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Short traceability hash of a snapshot, with volatile fields removed so
/// re-submissions of the same payload hash identically.
fn payload_hash(snapshot: &JsonValue) -> String {
    let sanitized = match snapshot {
        JsonValue::Object(map) => {
            let mut map = map.clone();
            map.remove("created_at");
            map.remove("updated_at");
            JsonValue::Object(map)
        }
        other => other.clone(),
    };
    let digest = Sha256::digest(sanitized.to_string().as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// Records audited operations. Stateless: rows go through whatever
/// transaction the caller is running.
#[derive(Clone, Copy, Debug, Default)]
pub struct AuditRecorder;

impl AuditRecorder {
    /// Wraps a mutation with snapshot capture and audit-row insertion.
    ///
    /// The before snapshot is awaited first (only meaningful for
    /// UPDATE/DELETE), then `execute`; an after snapshot is taken by
    /// serializing the value `execute` returned (INSERT/UPDATE). For
    /// inserts the entity id is read back from the after snapshot, since
    /// the caller cannot know a generated id up front.
    ///
    /// Errors from `execute` propagate untouched and abort the caller's
    /// transaction; the audit row is only written when the mutation
    /// succeeded.
    #[allow(clippy::too_many_arguments)]
    pub async fn with_audit<T: serde::Serialize>(
        &self,
        db_tx: &DatabaseTransaction,
        ctx: &AuditContext,
        action: AuditAction,
        entity: &str,
        entity_id: Option<String>,
        operation: AuditOperation,
        fetch_before: Option<BoxFuture<'_, ResultEngine<Option<JsonValue>>>>,
        execute: BoxFuture<'_, ResultEngine<T>>,
    ) -> ResultEngine<T> {
        let needs_before = matches!(operation, AuditOperation::Update | AuditOperation::Delete);
        let needs_after = matches!(operation, AuditOperation::Insert | AuditOperation::Update);

        let before = match (needs_before, fetch_before) {
            (true, Some(fetch)) => fetch.await?,
            _ => None,
        };

        let result = execute.await?;

        let after = if needs_after {
            Some(serde_json::to_value(&result)?)
        } else {
            None
        };

        let entity_id = entity_id
            .or_else(|| {
                after
                    .as_ref()
                    .and_then(|value| value.get("id"))
                    .and_then(JsonValue::as_str)
                    .map(String::from)
            })
            .unwrap_or_else(|| "new".to_string());

        let hash = after.as_ref().or(before.as_ref()).map(payload_hash);

        let event = ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4().to_string()),
            action: ActiveValue::Set(action.as_str().to_string()),
            entity: ActiveValue::Set(entity.to_string()),
            entity_id: ActiveValue::Set(entity_id),
            operation: ActiveValue::Set(operation.as_str().to_string()),
            actor_type: ActiveValue::Set(ctx.actor_type.clone()),
            actor_id: ActiveValue::Set(ctx.actor_id.clone()),
            actor_role: ActiveValue::Set(ctx.actor_role.clone()),
            source: ActiveValue::Set(ctx.source.clone()),
            request_id: ActiveValue::Set(ctx.request_id.clone()),
            before_data: ActiveValue::Set(before.map(|value| value.to_string())),
            after_data: ActiveValue::Set(after.map(|value| value.to_string())),
            payload_hash: ActiveValue::Set(hash),
            recorded_at: ActiveValue::Set(Utc::now()),
        };
        event.insert(db_tx).await?;

        Ok(result)
    }
}
