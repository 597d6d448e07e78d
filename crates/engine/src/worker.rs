//! Collaborator ports and the side-effect worker.
//!
//! Fraud scoring and maintenance scheduling live outside this crate; the
//! engine only knows the two narrow ports below. The worker drains the
//! durable queue written by the closing transactions and dispatches to the
//! ports with retry and exponential backoff. A failing analyzer never
//! reaches the operation that enqueued it: errors are logged, recorded on
//! the row and retried until the attempt budget runs out.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder,
};

use crate::{
    ResultEngine,
    side_effects::{self, SideEffectTask, TaskStatus},
};

/// Errors analyzers may return; the worker only logs and counts them.
pub type SideEffectError = Box<dyn std::error::Error + Send + Sync>;

#[async_trait]
pub trait FraudService: Send + Sync {
    async fn analyze_shift(&self, shift_id: &str) -> Result<(), SideEffectError>;
}

#[async_trait]
pub trait MaintenanceService: Send + Sync {
    async fn check_status(&self, vehicle_id: &str, km: i64) -> Result<(), SideEffectError>;
}

/// Port implementation for deployments that run without a fraud analyzer.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopFraudService;

#[async_trait]
impl FraudService for NoopFraudService {
    async fn analyze_shift(&self, shift_id: &str) -> Result<(), SideEffectError> {
        tracing::debug!(shift_id, "fraud analysis disabled; skipping");
        Ok(())
    }
}

/// Port implementation for deployments that run without maintenance
/// scheduling.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMaintenanceService;

#[async_trait]
impl MaintenanceService for NoopMaintenanceService {
    async fn check_status(&self, vehicle_id: &str, km: i64) -> Result<(), SideEffectError> {
        tracing::debug!(vehicle_id, km, "maintenance check disabled; skipping");
        Ok(())
    }
}

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_MAX_ATTEMPTS: i32 = 5;
const RETRY_BASE_SECS: i64 = 30;

pub struct SideEffectWorker {
    database: DatabaseConnection,
    fraud: Arc<dyn FraudService>,
    maintenance: Arc<dyn MaintenanceService>,
    poll_interval: Duration,
    max_attempts: i32,
}

impl SideEffectWorker {
    pub fn new(
        database: DatabaseConnection,
        fraud: Arc<dyn FraudService>,
        maintenance: Arc<dyn MaintenanceService>,
    ) -> Self {
        Self {
            database,
            fraud,
            maintenance,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn max_attempts(mut self, attempts: i32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Runs the drain loop until the task is aborted.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if let Err(err) = self.drain_once(Utc::now()).await {
                    tracing::error!(error = %err, "side-effect drain failed");
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        })
    }

    /// Dispatches every pending task due at `now`. Returns how many tasks
    /// completed successfully; individual failures are swallowed after
    /// being logged and scheduled for retry.
    pub async fn drain_once(&self, now: DateTime<Utc>) -> ResultEngine<usize> {
        let due = side_effects::Entity::find()
            .filter(side_effects::Column::Status.eq(TaskStatus::Pending.as_str()))
            .filter(side_effects::Column::NextAttemptAt.lte(now))
            .order_by_asc(side_effects::Column::CreatedAt)
            .all(&self.database)
            .await?;

        let mut completed = 0;
        for row in due {
            let task = match SideEffectTask::decode(&row.kind, &row.payload) {
                Ok(task) => task,
                Err(err) => {
                    // A payload this worker cannot read will never become
                    // readable; park it instead of retrying forever.
                    tracing::error!(task = %row.id, error = %err, "unreadable side-effect payload");
                    self.mark(&row, TaskStatus::Failed, row.attempts, now, Some(err.to_string()))
                        .await?;
                    continue;
                }
            };

            match self.dispatch(&task).await {
                Ok(()) => {
                    self.mark(&row, TaskStatus::Done, row.attempts + 1, now, None)
                        .await?;
                    completed += 1;
                }
                Err(err) => {
                    let attempts = row.attempts + 1;
                    if attempts >= self.max_attempts {
                        tracing::error!(
                            task = %row.id,
                            kind = %row.kind,
                            attempts,
                            error = %err,
                            "side effect exhausted its attempts"
                        );
                        self.mark(&row, TaskStatus::Failed, attempts, now, Some(err.to_string()))
                            .await?;
                    } else {
                        tracing::warn!(
                            task = %row.id,
                            kind = %row.kind,
                            attempts,
                            error = %err,
                            "side effect failed; scheduling retry"
                        );
                        self.retry_later(&row, attempts, now, err.to_string()).await?;
                    }
                }
            }
        }
        Ok(completed)
    }

    async fn dispatch(&self, task: &SideEffectTask) -> Result<(), SideEffectError> {
        match task {
            SideEffectTask::FraudAnalysis { shift_id } => {
                self.fraud.analyze_shift(&shift_id.to_string()).await
            }
            SideEffectTask::MaintenanceCheck { vehicle_id, km } => {
                self.maintenance.check_status(vehicle_id, *km).await
            }
        }
    }

    async fn mark(
        &self,
        row: &side_effects::Model,
        status: TaskStatus,
        attempts: i32,
        now: DateTime<Utc>,
        last_error: Option<String>,
    ) -> ResultEngine<()> {
        let update = side_effects::ActiveModel {
            id: ActiveValue::Set(row.id.clone()),
            status: ActiveValue::Set(status.as_str().to_string()),
            attempts: ActiveValue::Set(attempts),
            next_attempt_at: ActiveValue::Set(now),
            last_error: ActiveValue::Set(last_error),
            ..Default::default()
        };
        update.update(&self.database).await?;
        Ok(())
    }

    async fn retry_later(
        &self,
        row: &side_effects::Model,
        attempts: i32,
        now: DateTime<Utc>,
        error: String,
    ) -> ResultEngine<()> {
        let backoff = chrono::Duration::seconds(RETRY_BASE_SECS << (attempts - 1).min(6));
        let update = side_effects::ActiveModel {
            id: ActiveValue::Set(row.id.clone()),
            attempts: ActiveValue::Set(attempts),
            next_attempt_at: ActiveValue::Set(now + backoff),
            last_error: ActiveValue::Set(Some(error)),
            ..Default::default()
        };
        update.update(&self.database).await?;
        Ok(())
    }
}
