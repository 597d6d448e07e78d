//! Initial schema migration - creates all tables from scratch.
//!
//! Tables:
//!
//! - `vehicles`: fleet vehicles with their accepted odometer reading
//! - `shifts`: driver work sessions and their settlement figures
//! - `rides`: rides recorded during a shift
//! - `expenses`: costs recorded during a shift
//! - `audit_events`: one row per audited mutation, with snapshots
//! - `side_effects`: durable queue for post-commit work
//!
//! The two partial unique indexes on `shifts` are the storage-level guard
//! for the "at most one open shift per driver / per vehicle" invariants:
//! the service re-checks before inserting, and these indexes close the
//! remaining race window.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// ─────────────────────────────────────────────────────────────────────────────
// Table identifiers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Iden)]
enum Vehicles {
    Table,
    Id,
    Plate,
    Modelo,
    IsActive,
    KmInicial,
    CurrentKm,
}

#[derive(Iden)]
enum Shifts {
    Table,
    Id,
    DriverId,
    VehicleId,
    Inicio,
    Fim,
    KmInicial,
    KmFinal,
    Status,
    TotalApp,
    TotalParticular,
    TotalBruto,
    TotalCorridas,
    TotalCorridasApp,
    TotalCorridasParticular,
    TotalCustos,
    TotalCustosParticular,
    Liquido,
    RepasseEmpresa,
    RepasseMotorista,
    DiscountCompany,
    DiscountDriver,
    DuracaoMin,
}

#[derive(Iden)]
enum Rides {
    Table,
    Id,
    ShiftId,
    Tipo,
    Valor,
    Hora,
}

#[derive(Iden)]
enum Expenses {
    Table,
    Id,
    ShiftId,
    CostTypeId,
    Valor,
    Date,
    Notes,
    IsParticular,
    IsSplitCost,
}

#[derive(Iden)]
enum AuditEvents {
    Table,
    Id,
    Action,
    Entity,
    EntityId,
    Operation,
    ActorType,
    ActorId,
    ActorRole,
    Source,
    RequestId,
    BeforeData,
    AfterData,
    PayloadHash,
    RecordedAt,
}

#[derive(Iden)]
enum SideEffects {
    Table,
    Id,
    Kind,
    Payload,
    Status,
    Attempts,
    NextAttemptAt,
    LastError,
    CreatedAt,
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ───────────────────────────────────────────────────────────────────
        // 1. Vehicles
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Vehicles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Vehicles::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Vehicles::Plate).string().not_null())
                    .col(ColumnDef::new(Vehicles::Modelo).string().not_null())
                    .col(
                        ColumnDef::new(Vehicles::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Vehicles::KmInicial)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Vehicles::CurrentKm)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-vehicles-plate-unique")
                    .table(Vehicles::Table)
                    .col(Vehicles::Plate)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 2. Shifts
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Shifts::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Shifts::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Shifts::DriverId).string().not_null())
                    .col(ColumnDef::new(Shifts::VehicleId).string().not_null())
                    .col(ColumnDef::new(Shifts::Inicio).timestamp().not_null())
                    .col(ColumnDef::new(Shifts::Fim).timestamp())
                    .col(ColumnDef::new(Shifts::KmInicial).big_integer().not_null())
                    .col(ColumnDef::new(Shifts::KmFinal).big_integer())
                    .col(
                        ColumnDef::new(Shifts::Status)
                            .string()
                            .not_null()
                            .default("em_andamento"),
                    )
                    .col(
                        ColumnDef::new(Shifts::TotalApp)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Shifts::TotalParticular)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Shifts::TotalBruto)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Shifts::TotalCorridas)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Shifts::TotalCorridasApp)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Shifts::TotalCorridasParticular)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Shifts::TotalCustos)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Shifts::TotalCustosParticular)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Shifts::Liquido)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Shifts::RepasseEmpresa)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Shifts::RepasseMotorista)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Shifts::DiscountCompany)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Shifts::DiscountDriver)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Shifts::DuracaoMin)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-shifts-vehicle_id")
                            .from(Shifts::Table, Shifts::VehicleId)
                            .to(Vehicles::Table, Vehicles::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-shifts-driver_id")
                    .table(Shifts::Table)
                    .col(Shifts::DriverId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-shifts-vehicle_id")
                    .table(Shifts::Table)
                    .col(Shifts::VehicleId)
                    .to_owned(),
            )
            .await?;

        // Partial unique indexes: the storage-level guarantee that a driver
        // or a vehicle never holds two open shifts, whatever the request
        // interleaving. sea-query has no builder for partial indexes, so
        // raw SQL it is (valid on SQLite and PostgreSQL).
        let connection = manager.get_connection();
        connection
            .execute_unprepared(
                "CREATE UNIQUE INDEX \"idx-shifts-driver-open\" ON \"shifts\" (\"driver_id\") \
                 WHERE \"status\" = 'em_andamento'",
            )
            .await?;
        connection
            .execute_unprepared(
                "CREATE UNIQUE INDEX \"idx-shifts-vehicle-open\" ON \"shifts\" (\"vehicle_id\") \
                 WHERE \"status\" = 'em_andamento'",
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 3. Rides
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Rides::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Rides::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Rides::ShiftId).string().not_null())
                    .col(ColumnDef::new(Rides::Tipo).string().not_null())
                    .col(ColumnDef::new(Rides::Valor).big_integer().not_null())
                    .col(ColumnDef::new(Rides::Hora).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-rides-shift_id")
                            .from(Rides::Table, Rides::ShiftId)
                            .to(Shifts::Table, Shifts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-rides-shift_id-hora")
                    .table(Rides::Table)
                    .col(Rides::ShiftId)
                    .col(Rides::Hora)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 4. Expenses
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Expenses::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Expenses::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Expenses::ShiftId).string().not_null())
                    .col(ColumnDef::new(Expenses::CostTypeId).string().not_null())
                    .col(ColumnDef::new(Expenses::Valor).big_integer().not_null())
                    .col(ColumnDef::new(Expenses::Date).timestamp().not_null())
                    .col(ColumnDef::new(Expenses::Notes).string())
                    .col(
                        ColumnDef::new(Expenses::IsParticular)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Expenses::IsSplitCost)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-expenses-shift_id")
                            .from(Expenses::Table, Expenses::ShiftId)
                            .to(Shifts::Table, Shifts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-expenses-shift_id")
                    .table(Expenses::Table)
                    .col(Expenses::ShiftId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 5. Audit events
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(AuditEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AuditEvents::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AuditEvents::Action).string().not_null())
                    .col(ColumnDef::new(AuditEvents::Entity).string().not_null())
                    .col(ColumnDef::new(AuditEvents::EntityId).string().not_null())
                    .col(ColumnDef::new(AuditEvents::Operation).string().not_null())
                    .col(ColumnDef::new(AuditEvents::ActorType).string().not_null())
                    .col(ColumnDef::new(AuditEvents::ActorId).string().not_null())
                    .col(ColumnDef::new(AuditEvents::ActorRole).string().not_null())
                    .col(ColumnDef::new(AuditEvents::Source).string().not_null())
                    .col(ColumnDef::new(AuditEvents::RequestId).string().not_null())
                    .col(ColumnDef::new(AuditEvents::BeforeData).text())
                    .col(ColumnDef::new(AuditEvents::AfterData).text())
                    .col(ColumnDef::new(AuditEvents::PayloadHash).string())
                    .col(
                        ColumnDef::new(AuditEvents::RecordedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-audit_events-entity-entity_id")
                    .table(AuditEvents::Table)
                    .col(AuditEvents::Entity)
                    .col(AuditEvents::EntityId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 6. Side effects
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(SideEffects::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SideEffects::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SideEffects::Kind).string().not_null())
                    .col(ColumnDef::new(SideEffects::Payload).text().not_null())
                    .col(
                        ColumnDef::new(SideEffects::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(SideEffects::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SideEffects::NextAttemptAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SideEffects::LastError).text())
                    .col(
                        ColumnDef::new(SideEffects::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-side_effects-status-next_attempt_at")
                    .table(SideEffects::Table)
                    .col(SideEffects::Status)
                    .col(SideEffects::NextAttemptAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SideEffects::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AuditEvents::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Expenses::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Rides::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Shifts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Vehicles::Table).to_owned())
            .await?;
        Ok(())
    }
}
