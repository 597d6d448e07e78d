//! Lifecycle transitions: opening and closing shifts.
//!
//! All three operations follow the same discipline: advisory reads outside
//! the transaction give fast feedback, then every precondition is
//! re-checked inside the transaction immediately before the write, so a
//! rejection never leaves partial state. The partial unique indexes on open
//! shifts back the re-check at the storage layer.

use chrono::{DateTime, Utc};
use sea_orm::TransactionTrait;
use uuid::Uuid;

use crate::{
    ResultEngine, ShiftError,
    audit::{AuditAction, AuditContext, AuditOperation},
    shifts::Shift,
    side_effects::SideEffectTask,
};

use super::{ShiftService, context_or_system, totals::aggregate, with_tx};

/// Result of an administrative close: the closed shift plus a soft warning
/// when the requested end time contradicts the recorded rides.
#[derive(Clone, Debug, PartialEq)]
pub struct ClosedShift {
    pub shift: Shift,
    pub warning: Option<String>,
}

impl ShiftService {
    /// Opens a shift for `driver_id` on `vehicle_id` at odometer
    /// `km_inicial`.
    ///
    /// Rejections: the driver already has an open shift, the vehicle is
    /// already bound to one, or the reading is below the vehicle's accepted
    /// odometer.
    pub async fn start_shift(
        &self,
        driver_id: &str,
        vehicle_id: &str,
        km_inicial: i64,
        ctx: Option<&AuditContext>,
    ) -> ResultEngine<Shift> {
        let ctx = context_or_system(ctx, "start-shift");

        // Advisory check outside the transaction so the common mistake
        // fails before a transaction is paid for. Not authoritative.
        if self
            .repo
            .find_open_shift_by_driver(&self.database, driver_id)
            .await?
            .is_some()
        {
            return Err(ShiftError::DriverShiftOpen(driver_id.to_string()));
        }

        with_tx!(self, |db_tx| {
            let tx = &db_tx;
            self.audit
                .with_audit(
                    tx,
                    &ctx,
                    AuditAction::StartShift,
                    "shifts",
                    None,
                    AuditOperation::Insert,
                    None,
                    Box::pin(async move {
                        // Re-check both uniqueness predicates right before
                        // the insert; this is the mutual-exclusion path the
                        // unique indexes back up.
                        if self
                            .repo
                            .find_open_shift_by_driver(tx, driver_id)
                            .await?
                            .is_some()
                        {
                            return Err(ShiftError::DriverShiftOpen(driver_id.to_string()));
                        }
                        if self
                            .repo
                            .find_open_shift_by_vehicle(tx, vehicle_id)
                            .await?
                            .is_some()
                        {
                            return Err(ShiftError::VehicleInUse(vehicle_id.to_string()));
                        }

                        let vehicle = self.repo.require_vehicle(tx, vehicle_id).await?;
                        if km_inicial < vehicle.km_inicial {
                            return Err(ShiftError::OdometerRegression(format!(
                                "O veículo está com {} km. Você informou {} km.",
                                vehicle.km_inicial, km_inicial
                            )));
                        }

                        let shift = Shift::new(
                            driver_id.to_string(),
                            vehicle_id.to_string(),
                            km_inicial,
                            Utc::now(),
                        );
                        self.repo.insert_shift(tx, &shift).await?;
                        Ok(shift)
                    }),
                )
                .await
        })
    }

    /// Closes a shift at odometer `km_final`, settling its finances.
    ///
    /// One transaction loads the recorded rides and expenses, aggregates
    /// them, runs the calculator and persists the closed shift together
    /// with the forward-only vehicle odometer update and the queued side
    /// effects. Fraud analysis and the maintenance check run detached,
    /// after commit, via the side-effect worker.
    pub async fn finish_shift(
        &self,
        shift_id: Uuid,
        km_final: i64,
        ctx: Option<&AuditContext>,
    ) -> ResultEngine<Shift> {
        let ctx = context_or_system(ctx, "finish-shift");

        // Advisory pre-checks; re-raised inside the transaction.
        let advisory = self.repo.require_shift(&self.database, shift_id).await?;
        if !advisory.status.is_open() {
            return Err(ShiftError::AlreadyFinalized(shift_id.to_string()));
        }
        if km_final < advisory.km_inicial {
            return Err(km_final_regression(km_final, advisory.km_inicial));
        }

        with_tx!(self, |db_tx| {
            let tx = &db_tx;
            self.audit
                .with_audit(
                    tx,
                    &ctx,
                    AuditAction::FinishShift,
                    "shifts",
                    Some(shift_id.to_string()),
                    AuditOperation::Update,
                    Some(Box::pin(async move { self.snapshot_shift(tx, shift_id).await })),
                    Box::pin(async move {
                        let shift = self.repo.require_shift(tx, shift_id).await?;
                        if !shift.status.is_open() {
                            return Err(ShiftError::AlreadyFinalized(shift_id.to_string()));
                        }
                        if km_final < shift.km_inicial {
                            return Err(km_final_regression(km_final, shift.km_inicial));
                        }

                        let rides = self.repo.rides_by_shift(tx, shift_id).await?;
                        let expenses = self.repo.expenses_by_shift(tx, shift_id).await?;
                        let aggregates = aggregate(&rides, &expenses);
                        let financials = self
                            .calculator
                            .calculate_shift_result(&aggregates.settlement_input(shift.inicio));

                        let fim = Utc::now();
                        let duracao_min = (fim - shift.inicio).num_minutes();
                        self.repo
                            .apply_finalization(
                                tx,
                                shift_id,
                                km_final,
                                fim,
                                duracao_min,
                                &aggregates,
                                &financials,
                            )
                            .await?;
                        self.repo
                            .advance_vehicle_km(tx, &shift.vehicle_id, km_final)
                            .await?;

                        self.repo
                            .enqueue_side_effect(
                                tx,
                                &SideEffectTask::FraudAnalysis { shift_id },
                                fim,
                            )
                            .await?;
                        self.repo
                            .enqueue_side_effect(
                                tx,
                                &SideEffectTask::MaintenanceCheck {
                                    vehicle_id: shift.vehicle_id.clone(),
                                    km: km_final,
                                },
                                fim,
                            )
                            .await?;

                        tracing::info!(
                            shift = %shift_id,
                            km_final,
                            rule = financials.rule_used,
                            "shift finalized"
                        );
                        self.repo.require_shift(tx, shift_id).await
                    }),
                )
                .await
        })
    }

    /// Administrative close for shifts that never went through the normal
    /// flow.
    ///
    /// An end time earlier than the last recorded ride is a soft violation:
    /// the close still commits and the contradiction comes back as a
    /// warning string. Totals are recomputed as a separate step after the
    /// commit; if that step fails the close stands and the failure is
    /// logged.
    pub async fn admin_close_shift(
        &self,
        shift_id: Uuid,
        fim: DateTime<Utc>,
        km_final: i64,
        ctx: Option<&AuditContext>,
    ) -> ResultEngine<ClosedShift> {
        let ctx = context_or_system(ctx, "admin-close-shift");

        let mut warning: Option<String> = None;
        let warning_slot = &mut warning;

        let closed = with_tx!(self, |db_tx| {
            let tx = &db_tx;
            self.audit
                .with_audit(
                    tx,
                    &ctx,
                    // Semantically a finish, forced by an administrator.
                    AuditAction::FinishShift,
                    "shifts",
                    Some(shift_id.to_string()),
                    AuditOperation::Update,
                    Some(Box::pin(async move { self.snapshot_shift(tx, shift_id).await })),
                    Box::pin(async move {
                        let shift = self.repo.require_shift(tx, shift_id).await?;
                        if !shift.status.is_open() {
                            return Err(ShiftError::AlreadyFinalized(shift_id.to_string()));
                        }

                        if let Some(last_ride) = self.repo.last_ride_hora(tx, shift_id).await? {
                            if fim < last_ride {
                                let text = format!(
                                    "Atenção: o horário de fim ({fim}) é anterior à última \
                                     corrida ({last_ride}). O turno foi encerrado mesmo assim."
                                );
                                tracing::warn!(shift = %shift_id, "{text}");
                                *warning_slot = Some(text);
                            }
                        }

                        let duracao_min = (fim - shift.inicio).num_minutes();
                        self.repo
                            .apply_admin_close(tx, shift_id, fim, km_final, duracao_min)
                            .await?;
                        self.repo
                            .advance_vehicle_km(tx, &shift.vehicle_id, km_final)
                            .await?;
                        self.repo
                            .enqueue_side_effect(
                                tx,
                                &SideEffectTask::FraudAnalysis { shift_id },
                                Utc::now(),
                            )
                            .await?;

                        self.repo.require_shift(tx, shift_id).await
                    }),
                )
                .await
        })?;

        // Separate step on purpose: the close is already committed, a
        // recalculation failure must not undo it.
        let shift = match self.recalculate_shift_totals(shift_id).await {
            Ok(updated) => updated,
            Err(err) => {
                tracing::error!(
                    shift = %shift_id,
                    error = %err,
                    "recalculation after admin close failed"
                );
                closed
            }
        };

        Ok(ClosedShift { shift, warning })
    }
}

fn km_final_regression(km_final: i64, km_inicial: i64) -> ShiftError {
    ShiftError::OdometerRegression(format!(
        "KM final ({km_final}) não pode ser menor que o KM inicial do turno ({km_inicial})."
    ))
}
