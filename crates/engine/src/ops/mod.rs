//! The shift service: orchestration of the lifecycle, settlement and
//! administrative operations.

use sea_orm::{DatabaseConnection, DatabaseTransaction};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::{
    ResultEngine,
    audit::{AuditContext, AuditRecorder},
    calculator::FinancialCalculator,
    repo::ShiftRepository,
};

mod admin;
mod lifecycle;
mod totals;

pub use admin::{ManualExpenseInput, ManualRideInput, ManualShiftInput, ShiftPatch};
pub use lifecycle::ClosedShift;
pub use totals::ShiftAggregates;

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

/// Orchestrator of the shift lifecycle.
///
/// Built with injected collaborators so tests can swap the calculator (rule
/// tables) and run against an in-memory database: every operation
/// re-validates its preconditions inside its own transaction, mutates state
/// through the [`ShiftRepository`], settles via the [`FinancialCalculator`]
/// and records the mutation through the [`AuditRecorder`].
#[derive(Debug)]
pub struct ShiftService {
    pub(crate) database: DatabaseConnection,
    pub(crate) repo: ShiftRepository,
    pub(crate) calculator: FinancialCalculator,
    pub(crate) audit: AuditRecorder,
}

impl ShiftService {
    /// Return a builder for `ShiftService`. Help to build the struct.
    pub fn builder() -> ShiftServiceBuilder {
        ShiftServiceBuilder::default()
    }

    /// JSON snapshot of a shift for the audit trail; `None` when the shift
    /// does not exist (inserts, already-deleted rows).
    pub(crate) async fn snapshot_shift(
        &self,
        db: &DatabaseTransaction,
        shift_id: Uuid,
    ) -> ResultEngine<Option<JsonValue>> {
        let shift = self.repo.find_shift(db, shift_id).await?;
        Ok(shift.map(|shift| serde_json::to_value(&shift)).transpose()?)
    }
}

/// Callers without a request context act as the system itself.
pub(crate) fn context_or_system(ctx: Option<&AuditContext>, job_name: &str) -> AuditContext {
    ctx.cloned()
        .unwrap_or_else(|| AuditContext::system(job_name))
}

/// The builder for `ShiftService`
#[derive(Default)]
pub struct ShiftServiceBuilder {
    database: DatabaseConnection,
    calculator: Option<FinancialCalculator>,
}

impl ShiftServiceBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> ShiftServiceBuilder {
        self.database = db;
        self
    }

    /// Override the default 60/40 rule table.
    pub fn calculator(mut self, calculator: FinancialCalculator) -> ShiftServiceBuilder {
        self.calculator = Some(calculator);
        self
    }

    /// Construct `ShiftService`
    pub fn build(self) -> ShiftService {
        ShiftService {
            database: self.database,
            repo: ShiftRepository,
            calculator: self.calculator.unwrap_or_default(),
            audit: AuditRecorder,
        }
    }
}
