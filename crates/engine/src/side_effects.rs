//! Durable side-effect queue.
//!
//! Closing a shift must trigger fraud scoring and a maintenance check, but
//! neither may block or corrupt the closing transaction. Instead of firing
//! detached calls and hoping, the transaction enqueues one row per side
//! effect here; the [`SideEffectWorker`] consumes them after commit with
//! retry and backoff.
//!
//! [`SideEffectWorker`]: crate::SideEffectWorker

use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ResultEngine, ShiftError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SideEffectKind {
    FraudAnalysis,
    MaintenanceCheck,
}

impl SideEffectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FraudAnalysis => "fraud_analysis",
            Self::MaintenanceCheck => "maintenance_check",
        }
    }
}

impl TryFrom<&str> for SideEffectKind {
    type Error = ShiftError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "fraud_analysis" => Ok(Self::FraudAnalysis),
            "maintenance_check" => Ok(Self::MaintenanceCheck),
            other => Err(ShiftError::InvalidField(format!(
                "tipo de efeito desconhecido: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Done,
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

/// One enqueued side effect with its payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SideEffectTask {
    FraudAnalysis { shift_id: Uuid },
    MaintenanceCheck { vehicle_id: String, km: i64 },
}

impl SideEffectTask {
    pub fn kind(&self) -> SideEffectKind {
        match self {
            Self::FraudAnalysis { .. } => SideEffectKind::FraudAnalysis,
            Self::MaintenanceCheck { .. } => SideEffectKind::MaintenanceCheck,
        }
    }

    pub(crate) fn encode_payload(&self) -> ResultEngine<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub(crate) fn decode(kind: &str, payload: &str) -> ResultEngine<Self> {
        let task: Self = match SideEffectKind::try_from(kind)? {
            SideEffectKind::FraudAnalysis => {
                #[derive(Deserialize)]
                struct Payload {
                    shift_id: Uuid,
                }
                let payload: Payload = serde_json::from_str(payload)?;
                Self::FraudAnalysis {
                    shift_id: payload.shift_id,
                }
            }
            SideEffectKind::MaintenanceCheck => {
                #[derive(Deserialize)]
                struct Payload {
                    vehicle_id: String,
                    km: i64,
                }
                let payload: Payload = serde_json::from_str(payload)?;
                Self::MaintenanceCheck {
                    vehicle_id: payload.vehicle_id,
                    km: payload.km,
                }
            }
        };
        Ok(task)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "side_effects")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub kind: String,
    pub payload: String,
    pub status: String,
    pub attempts: i32,
    pub next_attempt_at: DateTimeUtc,
    pub last_error: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// A fresh pending row for `task`, due immediately.
    pub(crate) fn enqueue(task: &SideEffectTask, now: DateTimeUtc) -> ResultEngine<ActiveModel> {
        Ok(ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4().to_string()),
            kind: ActiveValue::Set(task.kind().as_str().to_string()),
            payload: ActiveValue::Set(task.encode_payload()?),
            status: ActiveValue::Set(TaskStatus::Pending.as_str().to_string()),
            attempts: ActiveValue::Set(0),
            next_attempt_at: ActiveValue::Set(now),
            last_error: ActiveValue::Set(None),
            created_at: ActiveValue::Set(now),
        })
    }
}
