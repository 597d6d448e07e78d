//! Persistence port of the shift engine.
//!
//! Every query and write goes through this stateless repository. Methods are
//! generic over [`ConnectionTrait`] so the same call runs against the plain
//! connection (advisory reads) or inside a [`DatabaseTransaction`] — which
//! is how the start-shift precondition can be checked outside the
//! transaction for fast feedback and re-checked inside it right before the
//! insert.
//!
//! [`DatabaseTransaction`]: sea_orm::DatabaseTransaction

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, ConnectionTrait, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use uuid::Uuid;

use crate::{
    ResultEngine, ShiftError,
    calculator::ShiftFinancials,
    expenses::{self, Expense},
    ops::{ShiftAggregates, ShiftPatch},
    rides::{self, Ride},
    shifts::{self, Shift, ShiftStatus},
    side_effects::{self, SideEffectTask},
    vehicles::{self, Vehicle},
};

// The engine only ever writes "em_andamento", but rows predating the status
// cleanup may still carry the legacy label; open-shift predicates must see
// both.
const OPEN_STATUSES: [&str; 2] = ["em_andamento", "aberto"];

/// Translates a unique-index violation on the open-shift indexes into the
/// business rejection it enforces; anything else stays a database error.
fn map_insert_error(err: DbErr, driver_id: &str, vehicle_id: &str) -> ShiftError {
    let message = err.to_string();
    if message.contains("idx-shifts-driver-open") {
        ShiftError::DriverShiftOpen(driver_id.to_string())
    } else if message.contains("idx-shifts-vehicle-open") {
        ShiftError::VehicleInUse(vehicle_id.to_string())
    } else {
        ShiftError::Database(err)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ShiftRepository;

impl ShiftRepository {
    pub async fn find_shift<C: ConnectionTrait>(
        &self,
        db: &C,
        shift_id: Uuid,
    ) -> ResultEngine<Option<Shift>> {
        shifts::Entity::find_by_id(shift_id.to_string())
            .one(db)
            .await?
            .map(Shift::try_from)
            .transpose()
    }

    pub async fn require_shift<C: ConnectionTrait>(
        &self,
        db: &C,
        shift_id: Uuid,
    ) -> ResultEngine<Shift> {
        self.find_shift(db, shift_id)
            .await?
            .ok_or_else(|| ShiftError::NotFound("turno".to_string()))
    }

    pub async fn find_open_shift_by_driver<C: ConnectionTrait>(
        &self,
        db: &C,
        driver_id: &str,
    ) -> ResultEngine<Option<Shift>> {
        shifts::Entity::find()
            .filter(shifts::Column::DriverId.eq(driver_id))
            .filter(shifts::Column::Status.is_in(OPEN_STATUSES))
            .one(db)
            .await?
            .map(Shift::try_from)
            .transpose()
    }

    pub async fn find_open_shift_by_vehicle<C: ConnectionTrait>(
        &self,
        db: &C,
        vehicle_id: &str,
    ) -> ResultEngine<Option<Shift>> {
        shifts::Entity::find()
            .filter(shifts::Column::VehicleId.eq(vehicle_id))
            .filter(shifts::Column::Status.is_in(OPEN_STATUSES))
            .one(db)
            .await?
            .map(Shift::try_from)
            .transpose()
    }

    pub async fn insert_shift<C: ConnectionTrait>(
        &self,
        db: &C,
        shift: &Shift,
    ) -> ResultEngine<()> {
        shifts::ActiveModel::from(shift)
            .insert(db)
            .await
            .map_err(|err| map_insert_error(err, &shift.driver_id, &shift.vehicle_id))?;
        Ok(())
    }

    /// Closes the shift and persists the whole settlement in one write.
    #[allow(clippy::too_many_arguments)]
    pub async fn apply_finalization<C: ConnectionTrait>(
        &self,
        db: &C,
        shift_id: Uuid,
        km_final: i64,
        fim: DateTime<Utc>,
        duracao_min: i64,
        aggregates: &ShiftAggregates,
        financials: &ShiftFinancials,
    ) -> ResultEngine<()> {
        let update = shifts::ActiveModel {
            id: ActiveValue::Set(shift_id.to_string()),
            km_final: ActiveValue::Set(Some(km_final)),
            fim: ActiveValue::Set(Some(fim)),
            status: ActiveValue::Set(ShiftStatus::Finalized.as_str().to_string()),
            duracao_min: ActiveValue::Set(duracao_min),
            ..self.totals_update(shift_id, aggregates, financials)
        };
        update.update(db).await?;
        Ok(())
    }

    /// Persists only the derived financial fields; status, odometer and
    /// timestamps stay untouched.
    pub async fn apply_totals<C: ConnectionTrait>(
        &self,
        db: &C,
        shift_id: Uuid,
        aggregates: &ShiftAggregates,
        financials: &ShiftFinancials,
    ) -> ResultEngine<()> {
        self.totals_update(shift_id, aggregates, financials)
            .update(db)
            .await?;
        Ok(())
    }

    fn totals_update(
        &self,
        shift_id: Uuid,
        aggregates: &ShiftAggregates,
        financials: &ShiftFinancials,
    ) -> shifts::ActiveModel {
        shifts::ActiveModel {
            id: ActiveValue::Set(shift_id.to_string()),
            total_app: ActiveValue::Set(aggregates.total_app),
            total_particular: ActiveValue::Set(aggregates.total_particular),
            total_bruto: ActiveValue::Set(financials.total_bruto),
            total_corridas: ActiveValue::Set(aggregates.total_corridas),
            total_corridas_app: ActiveValue::Set(aggregates.total_corridas_app),
            total_corridas_particular: ActiveValue::Set(aggregates.total_corridas_particular),
            total_custos: ActiveValue::Set(aggregates.total_custos),
            total_custos_particular: ActiveValue::Set(aggregates.total_custos_particular),
            liquido: ActiveValue::Set(financials.liquido),
            repasse_empresa: ActiveValue::Set(financials.repasse_empresa),
            repasse_motorista: ActiveValue::Set(financials.repasse_motorista),
            discount_company: ActiveValue::Set(financials.discount_company),
            discount_driver: ActiveValue::Set(financials.discount_driver),
            ..Default::default()
        }
    }

    /// Closes the shift without touching the derived totals; the caller
    /// recomputes them in a separate step.
    pub async fn apply_admin_close<C: ConnectionTrait>(
        &self,
        db: &C,
        shift_id: Uuid,
        fim: DateTime<Utc>,
        km_final: i64,
        duracao_min: i64,
    ) -> ResultEngine<()> {
        let update = shifts::ActiveModel {
            id: ActiveValue::Set(shift_id.to_string()),
            fim: ActiveValue::Set(Some(fim)),
            km_final: ActiveValue::Set(Some(km_final)),
            status: ActiveValue::Set(ShiftStatus::Finalized.as_str().to_string()),
            duracao_min: ActiveValue::Set(duracao_min),
            ..Default::default()
        };
        update.update(db).await?;
        Ok(())
    }

    /// Applies an explicit field patch. The caller guards against empty
    /// patches.
    pub async fn patch_shift<C: ConnectionTrait>(
        &self,
        db: &C,
        shift_id: Uuid,
        patch: &ShiftPatch,
    ) -> ResultEngine<()> {
        let mut update = shifts::ActiveModel {
            id: ActiveValue::Set(shift_id.to_string()),
            ..Default::default()
        };
        if let Some(inicio) = patch.inicio {
            update.inicio = ActiveValue::Set(inicio);
        }
        if let Some(fim) = patch.fim {
            update.fim = ActiveValue::Set(Some(fim));
        }
        if let Some(km_inicial) = patch.km_inicial {
            update.km_inicial = ActiveValue::Set(km_inicial);
        }
        if let Some(km_final) = patch.km_final {
            update.km_final = ActiveValue::Set(Some(km_final));
        }
        if let Some(status) = patch.status {
            update.status = ActiveValue::Set(status.as_str().to_string());
        }
        update.update(db).await?;
        Ok(())
    }

    pub async fn delete_shift_cascade<C: ConnectionTrait>(
        &self,
        db: &C,
        shift_id: Uuid,
    ) -> ResultEngine<()> {
        // FKs don't declare ON DELETE CASCADE everywhere, so remove the
        // children explicitly within the caller's transaction.
        rides::Entity::delete_many()
            .filter(rides::Column::ShiftId.eq(shift_id.to_string()))
            .exec(db)
            .await?;
        expenses::Entity::delete_many()
            .filter(expenses::Column::ShiftId.eq(shift_id.to_string()))
            .exec(db)
            .await?;
        shifts::Entity::delete_by_id(shift_id.to_string())
            .exec(db)
            .await?;
        Ok(())
    }

    pub async fn rides_by_shift<C: ConnectionTrait>(
        &self,
        db: &C,
        shift_id: Uuid,
    ) -> ResultEngine<Vec<Ride>> {
        let models = rides::Entity::find()
            .filter(rides::Column::ShiftId.eq(shift_id.to_string()))
            .order_by_asc(rides::Column::Hora)
            .all(db)
            .await?;
        models.into_iter().map(Ride::try_from).collect()
    }

    pub async fn expenses_by_shift<C: ConnectionTrait>(
        &self,
        db: &C,
        shift_id: Uuid,
    ) -> ResultEngine<Vec<Expense>> {
        let models = expenses::Entity::find()
            .filter(expenses::Column::ShiftId.eq(shift_id.to_string()))
            .all(db)
            .await?;
        models.into_iter().map(Expense::try_from).collect()
    }

    pub async fn last_ride_hora<C: ConnectionTrait>(
        &self,
        db: &C,
        shift_id: Uuid,
    ) -> ResultEngine<Option<DateTime<Utc>>> {
        let model = rides::Entity::find()
            .filter(rides::Column::ShiftId.eq(shift_id.to_string()))
            .order_by_desc(rides::Column::Hora)
            .limit(1)
            .one(db)
            .await?;
        Ok(model.map(|ride| ride.hora))
    }

    /// Moves every ride of the shift by `delta`, keeping their relative
    /// spacing. Used when an administrative correction moves the shift's
    /// start.
    pub async fn shift_ride_times<C: ConnectionTrait>(
        &self,
        db: &C,
        shift_id: Uuid,
        delta: chrono::Duration,
    ) -> ResultEngine<()> {
        let models = rides::Entity::find()
            .filter(rides::Column::ShiftId.eq(shift_id.to_string()))
            .all(db)
            .await?;
        for model in models {
            let moved = rides::ActiveModel {
                id: ActiveValue::Set(model.id.clone()),
                hora: ActiveValue::Set(model.hora + delta),
                ..Default::default()
            };
            moved.update(db).await?;
        }
        Ok(())
    }

    pub async fn insert_ride<C: ConnectionTrait>(&self, db: &C, ride: &Ride) -> ResultEngine<()> {
        rides::ActiveModel::from(ride).insert(db).await?;
        Ok(())
    }

    pub async fn insert_expense<C: ConnectionTrait>(
        &self,
        db: &C,
        expense: &Expense,
    ) -> ResultEngine<()> {
        expenses::ActiveModel::from(expense).insert(db).await?;
        Ok(())
    }

    pub async fn find_vehicle<C: ConnectionTrait>(
        &self,
        db: &C,
        vehicle_id: &str,
    ) -> ResultEngine<Option<Vehicle>> {
        Ok(vehicles::Entity::find_by_id(vehicle_id)
            .one(db)
            .await?
            .map(Vehicle::from))
    }

    pub async fn require_vehicle<C: ConnectionTrait>(
        &self,
        db: &C,
        vehicle_id: &str,
    ) -> ResultEngine<Vehicle> {
        self.find_vehicle(db, vehicle_id)
            .await?
            .ok_or_else(|| ShiftError::NotFound("veículo".to_string()))
    }

    /// Advances the vehicle's accepted odometer to `km`, never backwards: a
    /// correction closing an old shift at a lower reading leaves the
    /// current one alone.
    pub async fn advance_vehicle_km<C: ConnectionTrait>(
        &self,
        db: &C,
        vehicle_id: &str,
        km: i64,
    ) -> ResultEngine<()> {
        let vehicle = self.require_vehicle(db, vehicle_id).await?;
        if km <= vehicle.km_inicial {
            return Ok(());
        }
        let update = vehicles::ActiveModel {
            id: ActiveValue::Set(vehicle_id.to_string()),
            km_inicial: ActiveValue::Set(km),
            current_km: ActiveValue::Set(km),
            ..Default::default()
        };
        update.update(db).await?;
        Ok(())
    }

    pub async fn enqueue_side_effect<C: ConnectionTrait>(
        &self,
        db: &C,
        task: &SideEffectTask,
        now: DateTime<Utc>,
    ) -> ResultEngine<()> {
        side_effects::Model::enqueue(task, now)?.insert(db).await?;
        Ok(())
    }

    /// Pages through shifts, newest first. `page` is 1-based; returns the
    /// page plus the total row count for the filter.
    pub async fn list_shifts<C: ConnectionTrait>(
        &self,
        db: &C,
        driver_id: Option<&str>,
        page: u64,
        per_page: u64,
    ) -> ResultEngine<(Vec<Shift>, u64)> {
        let mut query = shifts::Entity::find().order_by_desc(shifts::Column::Inicio);
        if let Some(driver_id) = driver_id {
            query = query.filter(shifts::Column::DriverId.eq(driver_id));
        }
        let paginator = query.paginate(db, per_page.max(1));
        let total = paginator.num_items().await?;
        let models = paginator.fetch_page(page.saturating_sub(1)).await?;
        let shifts = models
            .into_iter()
            .map(Shift::try_from)
            .collect::<ResultEngine<Vec<_>>>()?;
        Ok((shifts, total))
    }
}
