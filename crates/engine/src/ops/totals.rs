//! Aggregation of a shift's rides and expenses, and total recomputation.

use chrono::{DateTime, Utc};
use sea_orm::TransactionTrait;
use uuid::Uuid;

use crate::{
    ResultEngine,
    calculator::SettlementInput,
    expenses::Expense,
    rides::{Ride, RideChannel},
    shifts::Shift,
};

use super::{ShiftService, with_tx};

/// Sums and counts derived from a shift's recorded rows. Money in centavos.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShiftAggregates {
    pub total_app: i64,
    pub total_particular: i64,
    pub total_corridas: i32,
    pub total_corridas_app: i32,
    pub total_corridas_particular: i32,
    /// Shared cost pool: normal plus split costs, personal ones excluded.
    pub total_custos: i64,
    /// Driver-personal costs, tracked apart from the shared pool.
    pub total_custos_particular: i64,
    pub custos_normais: i64,
    pub custos_divididos: i64,
}

impl ShiftAggregates {
    pub fn settlement_input(&self, shift_date: DateTime<Utc>) -> SettlementInput {
        SettlementInput {
            total_app: self.total_app,
            total_particular: self.total_particular,
            custos_normais: self.custos_normais,
            custos_divididos: self.custos_divididos,
            shift_date,
        }
    }
}

/// Partitions rides by channel and expenses into personal / normal / split
/// pools, summing each. Personal costs never enter the shared pool; the
/// remaining expenses are split-flagged or normal.
pub(crate) fn aggregate(rides: &[Ride], expenses: &[Expense]) -> ShiftAggregates {
    let mut aggregates = ShiftAggregates::default();

    for ride in rides {
        aggregates.total_corridas += 1;
        match ride.channel() {
            RideChannel::App => {
                aggregates.total_app += ride.valor;
                aggregates.total_corridas_app += 1;
            }
            RideChannel::Particular => {
                aggregates.total_particular += ride.valor;
                aggregates.total_corridas_particular += 1;
            }
        }
    }

    for expense in expenses {
        if expense.is_particular {
            aggregates.total_custos_particular += expense.value;
        } else if expense.is_split_cost {
            aggregates.custos_divididos += expense.value;
        } else {
            aggregates.custos_normais += expense.value;
        }
    }
    aggregates.total_custos = aggregates.custos_normais + aggregates.custos_divididos;

    aggregates
}

impl ShiftService {
    /// Recomputes the derived financial fields of a shift from its current
    /// rides and expenses and persists them. Status, odometer and
    /// timestamps are left alone, so a finalized shift stays finalized and
    /// an open one stays open.
    ///
    /// Idempotent by construction: the fields are a pure function of the
    /// recorded rows, so running this twice without intervening edits
    /// writes the same values twice.
    pub async fn recalculate_shift_totals(&self, shift_id: Uuid) -> ResultEngine<Shift> {
        with_tx!(self, |db_tx| {
            let shift = self.repo.require_shift(&db_tx, shift_id).await?;
            let rides = self.repo.rides_by_shift(&db_tx, shift_id).await?;
            let expenses = self.repo.expenses_by_shift(&db_tx, shift_id).await?;

            tracing::debug!(
                shift = %shift_id,
                rides = rides.len(),
                expenses = expenses.len(),
                "recalculating shift totals"
            );

            let aggregates = aggregate(&rides, &expenses);
            let financials = self
                .calculator
                .calculate_shift_result(&aggregates.settlement_input(shift.inicio));

            self.repo
                .apply_totals(&db_tx, shift_id, &aggregates, &financials)
                .await?;
            self.repo.require_shift(&db_tx, shift_id).await
        })
    }
}
