//! Shift lifecycle and financial settlement engine.
//!
//! The engine owns one driver work session ("turno") from open to close:
//! it guards the mutual-exclusion invariants (one open shift per driver,
//! one per vehicle, forward-only odometers), derives the revenue split from
//! the rides and expenses recorded during the shift, wraps every mutation
//! in an audit record and queues the detached side effects (fraud scoring,
//! maintenance checks) that run after commit.
//!
//! Entry points: build a [`ShiftService`] over a database connection, and
//! optionally spawn a [`SideEffectWorker`] to drain the queued side
//! effects.

pub use audit::{AuditAction, AuditContext, AuditOperation, AuditRecorder};
pub use calculator::{FinancialCalculator, SettlementInput, ShiftFinancials, SplitRule};
pub use error::ShiftError;
pub use expenses::Expense;
pub use money::Centavos;
pub use ops::{
    ClosedShift, ManualExpenseInput, ManualRideInput, ManualShiftInput, ShiftAggregates,
    ShiftPatch, ShiftService, ShiftServiceBuilder,
};
pub use repo::ShiftRepository;
pub use rides::{Ride, RideChannel};
pub use shifts::{Shift, ShiftStatus};
pub use side_effects::{SideEffectKind, SideEffectTask, TaskStatus};
pub use vehicles::Vehicle;
pub use worker::{
    FraudService, MaintenanceService, NoopFraudService, NoopMaintenanceService, SideEffectError,
    SideEffectWorker,
};

mod audit;
mod calculator;
mod error;
mod expenses;
mod money;
mod ops;
mod repo;
mod rides;
mod shifts;
mod side_effects;
mod vehicles;
mod worker;

type ResultEngine<T> = Result<T, ShiftError>;
