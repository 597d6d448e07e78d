use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement, Value};
use uuid::Uuid;

use engine::{
    FraudService, MaintenanceService, ManualExpenseInput, ManualRideInput, ManualShiftInput,
    ShiftError, ShiftPatch, ShiftService, ShiftStatus, SideEffectError, SideEffectWorker,
};
use migration::MigratorTrait;

async fn service_with_db() -> (ShiftService, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let service = ShiftService::builder().database(db.clone()).build();
    (service, db)
}

async fn execute(db: &DatabaseConnection, sql: &str, values: Vec<Value>) {
    let backend = db.get_database_backend();
    db.execute(Statement::from_sql_and_values(backend, sql, values))
        .await
        .unwrap();
}

async fn insert_vehicle(db: &DatabaseConnection, id: &str, km: i64) {
    execute(
        db,
        "INSERT INTO vehicles (id, plate, modelo, is_active, km_inicial, current_km) \
         VALUES (?, ?, ?, ?, ?, ?)",
        vec![
            id.into(),
            format!("PLT-{id}").into(),
            "Onix 1.0".into(),
            true.into(),
            km.into(),
            km.into(),
        ],
    )
    .await;
}

async fn insert_ride(
    db: &DatabaseConnection,
    shift_id: Uuid,
    tipo: &str,
    valor: i64,
    hora: DateTime<Utc>,
) {
    execute(
        db,
        "INSERT INTO rides (id, shift_id, tipo, valor, hora) VALUES (?, ?, ?, ?, ?)",
        vec![
            Uuid::new_v4().to_string().into(),
            shift_id.to_string().into(),
            tipo.into(),
            valor.into(),
            hora.into(),
        ],
    )
    .await;
}

async fn insert_expense(
    db: &DatabaseConnection,
    shift_id: Uuid,
    valor: i64,
    is_particular: bool,
    is_split_cost: bool,
) {
    execute(
        db,
        "INSERT INTO expenses (id, shift_id, cost_type_id, valor, date, is_particular, is_split_cost) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        vec![
            Uuid::new_v4().to_string().into(),
            shift_id.to_string().into(),
            "combustivel".into(),
            valor.into(),
            Utc::now().into(),
            is_particular.into(),
            is_split_cost.into(),
        ],
    )
    .await;
}

async fn count_rows(db: &DatabaseConnection, sql: &str, values: Vec<Value>) -> i64 {
    let backend = db.get_database_backend();
    let row = db
        .query_one(Statement::from_sql_and_values(backend, sql, values))
        .await
        .unwrap()
        .unwrap();
    row.try_get::<i64>("", "cnt").unwrap()
}

async fn vehicle_km(db: &DatabaseConnection, id: &str) -> i64 {
    let backend = db.get_database_backend();
    let row = db
        .query_one(Statement::from_sql_and_values(
            backend,
            "SELECT km_inicial FROM vehicles WHERE id = ?",
            vec![id.into()],
        ))
        .await
        .unwrap()
        .unwrap();
    row.try_get::<i64>("", "km_inicial").unwrap()
}

#[derive(Default)]
struct RecordingFraud {
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl FraudService for RecordingFraud {
    async fn analyze_shift(&self, shift_id: &str) -> Result<(), SideEffectError> {
        self.calls.lock().unwrap().push(shift_id.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct RecordingMaintenance {
    calls: Mutex<Vec<(String, i64)>>,
}

#[async_trait]
impl MaintenanceService for RecordingMaintenance {
    async fn check_status(&self, vehicle_id: &str, km: i64) -> Result<(), SideEffectError> {
        self.calls.lock().unwrap().push((vehicle_id.to_string(), km));
        Ok(())
    }
}

struct FailingFraud;

#[async_trait]
impl FraudService for FailingFraud {
    async fn analyze_shift(&self, _shift_id: &str) -> Result<(), SideEffectError> {
        Err("scoring backend offline".into())
    }
}

#[tokio::test]
async fn start_shift_opens_above_vehicle_km() {
    let (service, db) = service_with_db().await;
    insert_vehicle(&db, "veh-1", 900).await;

    let shift = service
        .start_shift("driver-1", "veh-1", 1000, None)
        .await
        .unwrap();

    assert_eq!(shift.status, ShiftStatus::Open);
    assert_eq!(shift.km_inicial, 1000);
    assert!(shift.fim.is_none());

    let open = service.get_open_shift("driver-1").await.unwrap().unwrap();
    assert_eq!(open.id, shift.id);
}

#[tokio::test]
async fn start_shift_rejects_second_open_shift_for_driver() {
    let (service, db) = service_with_db().await;
    insert_vehicle(&db, "veh-1", 900).await;
    insert_vehicle(&db, "veh-2", 400).await;

    service
        .start_shift("driver-1", "veh-1", 1000, None)
        .await
        .unwrap();

    let err = service
        .start_shift("driver-1", "veh-2", 500, None)
        .await
        .unwrap_err();
    assert_eq!(err, ShiftError::DriverShiftOpen("driver-1".to_string()));
}

#[tokio::test]
async fn start_shift_rejects_vehicle_already_in_use() {
    let (service, db) = service_with_db().await;
    insert_vehicle(&db, "veh-1", 900).await;

    service
        .start_shift("driver-1", "veh-1", 1000, None)
        .await
        .unwrap();

    let err = service
        .start_shift("driver-2", "veh-1", 1000, None)
        .await
        .unwrap_err();
    assert_eq!(err, ShiftError::VehicleInUse("veh-1".to_string()));
}

#[tokio::test]
async fn start_shift_rejects_km_below_vehicle_reading() {
    let (service, db) = service_with_db().await;
    insert_vehicle(&db, "veh-1", 900).await;

    let err = service
        .start_shift("driver-1", "veh-1", 800, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ShiftError::OdometerRegression(_)));
    assert!(service.get_open_shift("driver-1").await.unwrap().is_none());
}

#[tokio::test]
async fn start_shift_rejects_unknown_vehicle() {
    let (service, _db) = service_with_db().await;

    let err = service
        .start_shift("driver-1", "veh-missing", 100, None)
        .await
        .unwrap_err();
    assert_eq!(err, ShiftError::NotFound("veículo".to_string()));
}

#[tokio::test]
async fn open_shift_unique_index_blocks_direct_inserts() {
    let (service, db) = service_with_db().await;
    insert_vehicle(&db, "veh-1", 900).await;
    insert_vehicle(&db, "veh-2", 400).await;

    service
        .start_shift("driver-1", "veh-1", 1000, None)
        .await
        .unwrap();

    // Bypass the service re-check entirely: the partial unique index still
    // refuses a second open shift for the driver.
    let backend = db.get_database_backend();
    let result = db
        .execute(Statement::from_sql_and_values(
            backend,
            "INSERT INTO shifts (id, driver_id, vehicle_id, inicio, km_inicial, status) \
             VALUES (?, ?, ?, ?, ?, 'em_andamento')",
            vec![
                Uuid::new_v4().to_string().into(),
                "driver-1".into(),
                "veh-2".into(),
                Utc::now().into(),
                500i64.into(),
            ],
        ))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn legacy_open_status_still_blocks_and_lists() {
    let (service, db) = service_with_db().await;
    insert_vehicle(&db, "veh-1", 900).await;

    // Row written before the status cleanup.
    execute(
        &db,
        "INSERT INTO shifts (id, driver_id, vehicle_id, inicio, km_inicial, status) \
         VALUES (?, ?, ?, ?, ?, 'aberto')",
        vec![
            Uuid::new_v4().to_string().into(),
            "driver-1".into(),
            "veh-1".into(),
            Utc::now().into(),
            950i64.into(),
        ],
    )
    .await;

    let open = service.get_open_shift("driver-1").await.unwrap().unwrap();
    assert_eq!(open.status, ShiftStatus::Open);

    let err = service
        .start_shift("driver-1", "veh-1", 1000, None)
        .await
        .unwrap_err();
    assert_eq!(err, ShiftError::DriverShiftOpen("driver-1".to_string()));
}

#[tokio::test]
async fn finish_shift_settles_and_advances_the_vehicle() {
    let (service, db) = service_with_db().await;
    insert_vehicle(&db, "veh-1", 900).await;

    let shift = service
        .start_shift("driver-1", "veh-1", 1000, None)
        .await
        .unwrap();
    insert_ride(&db, shift.id, "APP", 2550, Utc::now()).await;
    insert_ride(&db, shift.id, "APP", 1800, Utc::now()).await;
    insert_ride(&db, shift.id, "PARTICULAR", 4500, Utc::now()).await;
    insert_expense(&db, shift.id, 1000, false, false).await;

    let closed = service.finish_shift(shift.id, 1050, None).await.unwrap();

    assert_eq!(closed.status, ShiftStatus::Finalized);
    assert_eq!(closed.km_final, Some(1050));
    assert!(closed.fim.is_some());
    assert_eq!(closed.total_app, 4350);
    assert_eq!(closed.total_particular, 4500);
    assert_eq!(closed.total_bruto, 8850);
    assert_eq!(closed.total_bruto, closed.total_app + closed.total_particular);
    assert_eq!(closed.total_corridas, 3);
    assert_eq!(closed.total_corridas_app, 2);
    assert_eq!(closed.total_corridas_particular, 1);
    assert_eq!(closed.total_custos, 1000);
    assert_eq!(closed.liquido, 7850);
    assert_eq!(closed.repasse_empresa, 4710);
    assert_eq!(closed.repasse_motorista, 3140);

    assert_eq!(vehicle_km(&db, "veh-1").await, 1050);

    // Both side effects queued inside the finishing transaction.
    let pending = count_rows(
        &db,
        "SELECT COUNT(*) AS cnt FROM side_effects WHERE status = 'pending'",
        vec![],
    )
    .await;
    assert_eq!(pending, 2);
}

#[tokio::test]
async fn finish_shift_rejects_km_below_shift_start() {
    let (service, db) = service_with_db().await;
    insert_vehicle(&db, "veh-1", 900).await;

    let shift = service
        .start_shift("driver-1", "veh-1", 1000, None)
        .await
        .unwrap();

    let err = service.finish_shift(shift.id, 950, None).await.unwrap_err();
    assert!(matches!(err, ShiftError::OdometerRegression(_)));

    // Nothing moved: still open, no side effects queued.
    let still_open = service.get_shift_by_id(shift.id).await.unwrap().unwrap();
    assert_eq!(still_open.status, ShiftStatus::Open);
    let queued = count_rows(&db, "SELECT COUNT(*) AS cnt FROM side_effects", vec![]).await;
    assert_eq!(queued, 0);
}

#[tokio::test]
async fn finish_shift_rejects_missing_and_already_finalized() {
    let (service, db) = service_with_db().await;
    insert_vehicle(&db, "veh-1", 900).await;

    let err = service
        .finish_shift(Uuid::new_v4(), 1000, None)
        .await
        .unwrap_err();
    assert_eq!(err, ShiftError::NotFound("turno".to_string()));

    let shift = service
        .start_shift("driver-1", "veh-1", 1000, None)
        .await
        .unwrap();
    service.finish_shift(shift.id, 1050, None).await.unwrap();

    let err = service.finish_shift(shift.id, 1100, None).await.unwrap_err();
    assert_eq!(err, ShiftError::AlreadyFinalized(shift.id.to_string()));
}

#[tokio::test]
async fn vehicle_odometer_never_moves_backwards() {
    let (service, db) = service_with_db().await;
    insert_vehicle(&db, "veh-1", 900).await;

    let shift = service
        .start_shift("driver-1", "veh-1", 1000, None)
        .await
        .unwrap();

    // Another flow already advanced the vehicle past this shift's end.
    execute(
        &db,
        "UPDATE vehicles SET km_inicial = ?, current_km = ? WHERE id = ?",
        vec![2000i64.into(), 2000i64.into(), "veh-1".into()],
    )
    .await;

    service.finish_shift(shift.id, 1050, None).await.unwrap();
    assert_eq!(vehicle_km(&db, "veh-1").await, 2000);
}

#[tokio::test]
async fn recalculate_is_idempotent_and_tracks_late_edits() {
    let (service, db) = service_with_db().await;
    insert_vehicle(&db, "veh-1", 900).await;

    let shift = service
        .start_shift("driver-1", "veh-1", 1000, None)
        .await
        .unwrap();
    insert_ride(&db, shift.id, "APP", 2550, Utc::now()).await;
    insert_expense(&db, shift.id, 1000, false, false).await;
    let finished = service.finish_shift(shift.id, 1050, None).await.unwrap();

    let first = service.recalculate_shift_totals(shift.id).await.unwrap();
    let second = service.recalculate_shift_totals(shift.id).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.liquido, finished.liquido);
    // Only derived fields were rewritten.
    assert_eq!(first.status, ShiftStatus::Finalized);
    assert_eq!(first.fim, finished.fim);
    assert_eq!(first.km_final, finished.km_final);

    // A late expense edit changes the settlement on the next recalculation.
    insert_expense(&db, shift.id, 550, false, false).await;
    let corrected = service.recalculate_shift_totals(shift.id).await.unwrap();
    assert_eq!(corrected.total_custos, 1550);
    assert_eq!(corrected.liquido, first.liquido - 550);
}

#[tokio::test]
async fn particular_expenses_stay_out_of_the_settlement() {
    let (service, db) = service_with_db().await;
    insert_vehicle(&db, "veh-1", 900).await;

    let shift = service
        .start_shift("driver-1", "veh-1", 1000, None)
        .await
        .unwrap();
    insert_ride(&db, shift.id, "APP", 10_000, Utc::now()).await;
    insert_expense(&db, shift.id, 1000, false, false).await;
    insert_expense(&db, shift.id, 700, true, false).await;

    let closed = service.finish_shift(shift.id, 1050, None).await.unwrap();
    assert_eq!(closed.total_custos, 1000);
    assert_eq!(closed.total_custos_particular, 700);
    assert_eq!(closed.liquido, 9000);
}

#[tokio::test]
async fn admin_close_commits_with_warning_on_out_of_order_fim() {
    let (service, db) = service_with_db().await;
    insert_vehicle(&db, "veh-1", 900).await;

    let shift = service
        .start_shift("driver-1", "veh-1", 1000, None)
        .await
        .unwrap();
    let last_ride = Utc::now();
    insert_ride(&db, shift.id, "PARTICULAR", 4500, last_ride).await;

    let fim = last_ride - Duration::hours(2);
    let closed = service
        .admin_close_shift(shift.id, fim, 1010, None)
        .await
        .unwrap();

    // Soft violation: the close stands, the contradiction is reported.
    let warning = closed.warning.expect("warning expected");
    assert!(!warning.is_empty());
    assert_eq!(closed.shift.status, ShiftStatus::Finalized);
    assert_eq!(closed.shift.fim, Some(fim));
    // The separate recalculation step already ran.
    assert_eq!(closed.shift.total_particular, 4500);
    assert_eq!(vehicle_km(&db, "veh-1").await, 1010);
}

#[tokio::test]
async fn admin_close_without_contradiction_has_no_warning() {
    let (service, db) = service_with_db().await;
    insert_vehicle(&db, "veh-1", 900).await;

    let shift = service
        .start_shift("driver-1", "veh-1", 1000, None)
        .await
        .unwrap();
    insert_ride(&db, shift.id, "APP", 2550, Utc::now()).await;

    let closed = service
        .admin_close_shift(shift.id, Utc::now() + Duration::hours(1), 1010, None)
        .await
        .unwrap();
    assert!(closed.warning.is_none());

    let err = service
        .admin_close_shift(shift.id, Utc::now(), 1020, None)
        .await
        .unwrap_err();
    assert_eq!(err, ShiftError::AlreadyFinalized(shift.id.to_string()));
}

#[tokio::test]
async fn update_shift_never_infers_a_transition() {
    let (service, db) = service_with_db().await;
    insert_vehicle(&db, "veh-1", 900).await;

    let shift = service
        .start_shift("driver-1", "veh-1", 1000, None)
        .await
        .unwrap();

    // Setting fim alone is a correction, not a close.
    let patched = service
        .update_shift(
            shift.id,
            ShiftPatch {
                fim: Some(Utc::now()),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(patched.status, ShiftStatus::Open);

    // The transition only happens when the patch names it.
    let finalized = service
        .update_shift(
            shift.id,
            ShiftPatch {
                status: Some(ShiftStatus::Finalized),
                km_final: Some(1050),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(finalized.status, ShiftStatus::Finalized);
}

#[tokio::test]
async fn update_shift_moves_rides_with_the_start() {
    let (service, db) = service_with_db().await;
    insert_vehicle(&db, "veh-1", 900).await;

    let shift = service
        .start_shift("driver-1", "veh-1", 1000, None)
        .await
        .unwrap();
    let hora = Utc::now();
    insert_ride(&db, shift.id, "APP", 2550, hora).await;

    let new_inicio = shift.inicio + Duration::hours(1);
    service
        .update_shift(
            shift.id,
            ShiftPatch {
                inicio: Some(new_inicio),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();

    let backend = db.get_database_backend();
    let row = db
        .query_one(Statement::from_sql_and_values(
            backend,
            "SELECT hora FROM rides WHERE shift_id = ?",
            vec![shift.id.to_string().into()],
        ))
        .await
        .unwrap()
        .unwrap();
    let moved: DateTime<Utc> = row.try_get("", "hora").unwrap();
    assert_eq!(moved, hora + Duration::hours(1));
}

#[tokio::test]
async fn delete_shift_cascades_and_leaves_a_snapshot() {
    let (service, db) = service_with_db().await;
    insert_vehicle(&db, "veh-1", 900).await;

    let shift = service
        .start_shift("driver-1", "veh-1", 1000, None)
        .await
        .unwrap();
    insert_ride(&db, shift.id, "APP", 2550, Utc::now()).await;
    insert_expense(&db, shift.id, 1000, false, false).await;

    service.delete_shift(shift.id, None).await.unwrap();

    assert!(service.get_shift_by_id(shift.id).await.unwrap().is_none());
    let rides = count_rows(
        &db,
        "SELECT COUNT(*) AS cnt FROM rides WHERE shift_id = ?",
        vec![shift.id.to_string().into()],
    )
    .await;
    assert_eq!(rides, 0);
    let expenses = count_rows(
        &db,
        "SELECT COUNT(*) AS cnt FROM expenses WHERE shift_id = ?",
        vec![shift.id.to_string().into()],
    )
    .await;
    assert_eq!(expenses, 0);

    // The audit row keeps the last state of the deleted shift.
    let snapshots = count_rows(
        &db,
        "SELECT COUNT(*) AS cnt FROM audit_events \
         WHERE action = 'DELETE_SHIFT' AND entity_id = ? \
         AND before_data IS NOT NULL AND after_data IS NULL",
        vec![shift.id.to_string().into()],
    )
    .await;
    assert_eq!(snapshots, 1);

    let err = service.delete_shift(shift.id, None).await.unwrap_err();
    assert_eq!(err, ShiftError::NotFound("turno".to_string()));
}

#[tokio::test]
async fn audit_rows_capture_before_and_after() {
    let (service, db) = service_with_db().await;
    insert_vehicle(&db, "veh-1", 900).await;

    let shift = service
        .start_shift("driver-1", "veh-1", 1000, None)
        .await
        .unwrap();

    // INSERT audit: entity id resolved from the created shift.
    let started = count_rows(
        &db,
        "SELECT COUNT(*) AS cnt FROM audit_events \
         WHERE action = 'START_SHIFT' AND operation = 'INSERT' AND entity_id = ? \
         AND before_data IS NULL AND after_data IS NOT NULL",
        vec![shift.id.to_string().into()],
    )
    .await;
    assert_eq!(started, 1);

    service.finish_shift(shift.id, 1050, None).await.unwrap();

    let finished = count_rows(
        &db,
        "SELECT COUNT(*) AS cnt FROM audit_events \
         WHERE action = 'FINISH_SHIFT' AND operation = 'UPDATE' AND entity_id = ? \
         AND before_data IS NOT NULL AND after_data IS NOT NULL \
         AND payload_hash IS NOT NULL",
        vec![shift.id.to_string().into()],
    )
    .await;
    assert_eq!(finished, 1);
}

#[tokio::test]
async fn create_manual_shift_round_trips_the_settlement() {
    let (service, db) = service_with_db().await;
    insert_vehicle(&db, "veh-1", 900).await;

    let inicio = Utc::now() - Duration::days(1);
    let fim = inicio + Duration::hours(8);
    let shift = service
        .create_manual_shift(
            ManualShiftInput {
                driver_id: "driver-1".to_string(),
                vehicle_id: "veh-1".to_string(),
                km_inicial: 1000,
                km_final: 1180,
                inicio,
                fim,
                rides: vec![
                    ManualRideInput {
                        hora: inicio + Duration::hours(1),
                        valor: 2550,
                        tipo: "APP".to_string(),
                    },
                    ManualRideInput {
                        hora: inicio + Duration::hours(2),
                        valor: 1800,
                        tipo: "APP".to_string(),
                    },
                    ManualRideInput {
                        hora: inicio + Duration::hours(3),
                        valor: 4500,
                        tipo: "PARTICULAR".to_string(),
                    },
                ],
                expenses: vec![ManualExpenseInput {
                    date: None,
                    cost_type_id: "combustivel".to_string(),
                    value: 1000,
                    notes: None,
                    is_particular: false,
                    is_split_cost: false,
                }],
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(shift.status, ShiftStatus::Finalized);
    assert_eq!(shift.duracao_min, 480);
    assert_eq!(shift.total_bruto, 8850);
    assert_eq!(shift.liquido, 7850);
    assert_eq!(shift.repasse_empresa, 4710);
    assert_eq!(shift.repasse_motorista, 3140);
    assert_eq!(vehicle_km(&db, "veh-1").await, 1180);

    let rides = count_rows(
        &db,
        "SELECT COUNT(*) AS cnt FROM rides WHERE shift_id = ?",
        vec![shift.id.to_string().into()],
    )
    .await;
    assert_eq!(rides, 3);
}

#[tokio::test]
async fn create_manual_shift_validates_odometer_and_times() {
    let (service, db) = service_with_db().await;
    insert_vehicle(&db, "veh-1", 900).await;

    let inicio = Utc::now() - Duration::days(1);
    let base = ManualShiftInput {
        driver_id: "driver-1".to_string(),
        vehicle_id: "veh-1".to_string(),
        km_inicial: 1000,
        km_final: 950,
        inicio,
        fim: inicio + Duration::hours(8),
        rides: vec![],
        expenses: vec![],
    };

    let err = service
        .create_manual_shift(base.clone(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ShiftError::OdometerRegression(_)));

    let err = service
        .create_manual_shift(
            ManualShiftInput {
                km_final: 1100,
                fim: inicio - Duration::hours(1),
                ..base
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ShiftError::InvalidField(_)));
}

#[tokio::test]
async fn worker_dispatches_queued_side_effects() {
    let (service, db) = service_with_db().await;
    insert_vehicle(&db, "veh-1", 900).await;

    let shift = service
        .start_shift("driver-1", "veh-1", 1000, None)
        .await
        .unwrap();
    service.finish_shift(shift.id, 1050, None).await.unwrap();

    let fraud = Arc::new(RecordingFraud::default());
    let maintenance = Arc::new(RecordingMaintenance::default());
    let worker = SideEffectWorker::new(db.clone(), fraud.clone(), maintenance.clone());

    let completed = worker.drain_once(Utc::now()).await.unwrap();
    assert_eq!(completed, 2);
    assert_eq!(
        fraud.calls.lock().unwrap().as_slice(),
        &[shift.id.to_string()]
    );
    assert_eq!(
        maintenance.calls.lock().unwrap().as_slice(),
        &[("veh-1".to_string(), 1050)]
    );

    // Nothing left to do; a second drain is a no-op.
    assert_eq!(worker.drain_once(Utc::now()).await.unwrap(), 0);
    let done = count_rows(
        &db,
        "SELECT COUNT(*) AS cnt FROM side_effects WHERE status = 'done'",
        vec![],
    )
    .await;
    assert_eq!(done, 2);
}

#[tokio::test]
async fn failing_side_effect_retries_then_parks_without_touching_the_shift() {
    let (service, db) = service_with_db().await;
    insert_vehicle(&db, "veh-1", 900).await;

    let shift = service
        .start_shift("driver-1", "veh-1", 1000, None)
        .await
        .unwrap();
    service.finish_shift(shift.id, 1050, None).await.unwrap();

    let maintenance = Arc::new(RecordingMaintenance::default());
    let worker = SideEffectWorker::new(db.clone(), Arc::new(FailingFraud), maintenance.clone())
        .max_attempts(2);

    let now = Utc::now();
    // First pass: maintenance succeeds, fraud fails and is backed off.
    assert_eq!(worker.drain_once(now).await.unwrap(), 1);
    let pending = count_rows(
        &db,
        "SELECT COUNT(*) AS cnt FROM side_effects \
         WHERE status = 'pending' AND attempts = 1 AND last_error IS NOT NULL",
        vec![],
    )
    .await;
    assert_eq!(pending, 1);

    // Not due yet: the backoff window holds.
    assert_eq!(worker.drain_once(now).await.unwrap(), 0);

    // Past the backoff the second attempt exhausts the budget.
    assert_eq!(worker.drain_once(now + Duration::hours(1)).await.unwrap(), 0);
    let failed = count_rows(
        &db,
        "SELECT COUNT(*) AS cnt FROM side_effects \
         WHERE status = 'failed' AND kind = 'fraud_analysis' AND last_error IS NOT NULL",
        vec![],
    )
    .await;
    assert_eq!(failed, 1);

    // The shift itself is untouched by the side-effect failure.
    let settled = service.get_shift_by_id(shift.id).await.unwrap().unwrap();
    assert_eq!(settled.status, ShiftStatus::Finalized);
    assert_eq!(settled.km_final, Some(1050));
}

#[tokio::test]
async fn list_shifts_pages_newest_first() {
    let (service, db) = service_with_db().await;
    insert_vehicle(&db, "veh-1", 0).await;

    for n in 0..3i64 {
        let shift = service
            .start_shift("driver-1", "veh-1", n * 100, None)
            .await
            .unwrap();
        service
            .finish_shift(shift.id, n * 100 + 50, None)
            .await
            .unwrap();
    }

    let (page, total) = service.list_shifts(Some("driver-1"), 1, 2).await.unwrap();
    assert_eq!(total, 3);
    assert_eq!(page.len(), 2);
    assert!(page[0].inicio >= page[1].inicio);

    let (rest, _) = service.list_shifts(Some("driver-1"), 2, 2).await.unwrap();
    assert_eq!(rest.len(), 1);

    let (none, total) = service.list_shifts(Some("driver-2"), 1, 2).await.unwrap();
    assert_eq!(total, 0);
    assert!(none.is_empty());
}
