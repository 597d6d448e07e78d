//! Administrative operations: corrections, retroactive shifts, deletion and
//! the read API.

use chrono::{DateTime, Utc};
use sea_orm::TransactionTrait;
use uuid::Uuid;

use crate::{
    ResultEngine, ShiftError,
    audit::{AuditAction, AuditContext, AuditOperation},
    expenses::Expense,
    rides::Ride,
    shifts::{Shift, ShiftStatus},
    side_effects::SideEffectTask,
};

use super::{ShiftService, context_or_system, with_tx};

/// Field patch for an administrative correction. Absent fields stay
/// untouched. There is no inferred transition: the status only changes when
/// the patch names it, so setting `fim` alone leaves a shift open.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShiftPatch {
    pub inicio: Option<DateTime<Utc>>,
    pub fim: Option<DateTime<Utc>>,
    pub km_inicial: Option<i64>,
    pub km_final: Option<i64>,
    pub status: Option<ShiftStatus>,
}

impl ShiftPatch {
    pub fn is_empty(&self) -> bool {
        self.inicio.is_none()
            && self.fim.is_none()
            && self.km_inicial.is_none()
            && self.km_final.is_none()
            && self.status.is_none()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ManualRideInput {
    pub hora: DateTime<Utc>,
    pub valor: i64,
    pub tipo: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ManualExpenseInput {
    /// Defaults to the shift's start when absent.
    pub date: Option<DateTime<Utc>>,
    pub cost_type_id: String,
    pub value: i64,
    pub notes: Option<String>,
    pub is_particular: bool,
    pub is_split_cost: bool,
}

/// Payload of a retroactive shift: the already-closed shift plus everything
/// recorded during it.
#[derive(Clone, Debug, PartialEq)]
pub struct ManualShiftInput {
    pub driver_id: String,
    pub vehicle_id: String,
    pub km_inicial: i64,
    pub km_final: i64,
    pub inicio: DateTime<Utc>,
    pub fim: DateTime<Utc>,
    pub rides: Vec<ManualRideInput>,
    pub expenses: Vec<ManualExpenseInput>,
}

impl ShiftService {
    /// Applies an explicit field patch to a shift.
    ///
    /// Moving `inicio` shifts every recorded ride by the same delta so the
    /// rides keep their position within the shift. Fraud re-analysis is
    /// queued because corrected shifts are exactly the ones worth a second
    /// look.
    pub async fn update_shift(
        &self,
        shift_id: Uuid,
        patch: ShiftPatch,
        ctx: Option<&AuditContext>,
    ) -> ResultEngine<Shift> {
        let ctx = context_or_system(ctx, "update-shift");

        with_tx!(self, |db_tx| {
            let tx = &db_tx;
            let patch = &patch;
            self.audit
                .with_audit(
                    tx,
                    &ctx,
                    AuditAction::UpdateShift,
                    "shifts",
                    Some(shift_id.to_string()),
                    AuditOperation::Update,
                    Some(Box::pin(async move { self.snapshot_shift(tx, shift_id).await })),
                    Box::pin(async move {
                        let current = self.repo.require_shift(tx, shift_id).await?;

                        if let Some(new_inicio) = patch.inicio {
                            let delta = new_inicio - current.inicio;
                            if !delta.is_zero() {
                                self.repo.shift_ride_times(tx, shift_id, delta).await?;
                            }
                        }

                        if !patch.is_empty() {
                            self.repo.patch_shift(tx, shift_id, patch).await?;
                        }

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
        })
    }

    /// Removes a shift and everything recorded against it.
    pub async fn delete_shift(
        &self,
        shift_id: Uuid,
        ctx: Option<&AuditContext>,
    ) -> ResultEngine<()> {
        let ctx = context_or_system(ctx, "delete-shift");

        with_tx!(self, |db_tx| {
            let tx = &db_tx;
            self.audit
                .with_audit(
                    tx,
                    &ctx,
                    AuditAction::DeleteShift,
                    "shifts",
                    Some(shift_id.to_string()),
                    AuditOperation::Delete,
                    Some(Box::pin(async move { self.snapshot_shift(tx, shift_id).await })),
                    Box::pin(async move {
                        self.repo.require_shift(tx, shift_id).await?;
                        self.repo.delete_shift_cascade(tx, shift_id).await
                    }),
                )
                .await
        })
    }

    /// Inserts a retroactive shift, already finalized, with its full set of
    /// rides and expenses, in one transaction.
    ///
    /// Totals run as a separate step after the commit: a failure there
    /// leaves the inserted shift with zeroed figures until the next
    /// recalculation, and is logged rather than undoing the insert.
    pub async fn create_manual_shift(
        &self,
        input: ManualShiftInput,
        ctx: Option<&AuditContext>,
    ) -> ResultEngine<Shift> {
        let ctx = context_or_system(ctx, "create-manual-shift");

        if input.km_final < input.km_inicial {
            return Err(ShiftError::OdometerRegression(format!(
                "KM final ({}) não pode ser menor que o KM inicial do turno ({}).",
                input.km_final, input.km_inicial
            )));
        }
        if input.fim < input.inicio {
            return Err(ShiftError::InvalidField(
                "fim anterior ao início do turno".to_string(),
            ));
        }

        let inserted = with_tx!(self, |db_tx| {
            let tx = &db_tx;
            let input = &input;
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
                        self.repo.require_vehicle(tx, &input.vehicle_id).await?;

                        let mut shift = Shift::new(
                            input.driver_id.clone(),
                            input.vehicle_id.clone(),
                            input.km_inicial,
                            input.inicio,
                        );
                        shift.fim = Some(input.fim);
                        shift.km_final = Some(input.km_final);
                        shift.status = ShiftStatus::Finalized;
                        shift.duracao_min = (input.fim - input.inicio).num_minutes();
                        self.repo.insert_shift(tx, &shift).await?;

                        for ride in &input.rides {
                            self.repo
                                .insert_ride(
                                    tx,
                                    &Ride::new(shift.id, ride.tipo.clone(), ride.valor, ride.hora),
                                )
                                .await?;
                        }
                        for entry in &input.expenses {
                            let mut expense = Expense::new(
                                shift.id,
                                entry.cost_type_id.clone(),
                                entry.value,
                                entry.date.unwrap_or(input.inicio),
                            );
                            expense.notes = entry.notes.clone();
                            expense.is_particular = entry.is_particular;
                            expense.is_split_cost = entry.is_split_cost;
                            self.repo.insert_expense(tx, &expense).await?;
                        }

                        self.repo
                            .advance_vehicle_km(tx, &input.vehicle_id, input.km_final)
                            .await?;
                        self.repo
                            .enqueue_side_effect(
                                tx,
                                &SideEffectTask::FraudAnalysis { shift_id: shift.id },
                                Utc::now(),
                            )
                            .await?;
                        Ok(shift)
                    }),
                )
                .await
        })?;

        match self.recalculate_shift_totals(inserted.id).await {
            Ok(shift) => Ok(shift),
            Err(err) => {
                tracing::error!(
                    shift = %inserted.id,
                    error = %err,
                    "totals after manual shift insert failed"
                );
                Ok(inserted)
            }
        }
    }

    pub async fn get_shift_by_id(&self, shift_id: Uuid) -> ResultEngine<Option<Shift>> {
        self.repo.find_shift(&self.database, shift_id).await
    }

    pub async fn get_open_shift(&self, driver_id: &str) -> ResultEngine<Option<Shift>> {
        self.repo
            .find_open_shift_by_driver(&self.database, driver_id)
            .await
    }

    /// Pages through shifts, newest first. `page` is 1-based; also returns
    /// the total count for the filter.
    pub async fn list_shifts(
        &self,
        driver_id: Option<&str>,
        page: u64,
        per_page: u64,
    ) -> ResultEngine<(Vec<Shift>, u64)> {
        self.repo
            .list_shifts(&self.database, driver_id, page, per_page)
            .await
    }
}
