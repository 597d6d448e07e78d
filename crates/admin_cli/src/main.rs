use std::{error::Error, sync::Arc};

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use engine::{
    Centavos, NoopFraudService, NoopMaintenanceService, Shift, ShiftService, SideEffectWorker,
};
use migration::MigratorTrait;
use sea_orm::Database;
use uuid::Uuid;

mod settings;

#[derive(Parser, Debug)]
#[command(name = "frota_admin")]
#[command(about = "Admin utilities for the shift engine (migrations, lifecycle, settlement)")]
struct Cli {
    /// Database connection string (also read from `DATABASE_URL`; falls
    /// back to `settings.toml`).
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending schema migrations.
    Migrate,
    /// Open a shift for a driver on a vehicle.
    Start(StartArgs),
    /// Close a shift and settle its finances.
    Finish(FinishArgs),
    /// Recompute the derived financial fields of a shift.
    Recalculate(ShiftArgs),
    /// Force-close a shift that never went through the normal flow.
    AdminClose(AdminCloseArgs),
    /// Print one shift.
    Show(ShiftArgs),
    /// Page through shifts, newest first.
    List(ListArgs),
    /// Dispatch the pending side effects once.
    SideEffects,
}

#[derive(Args, Debug)]
struct StartArgs {
    #[arg(long)]
    driver: String,
    #[arg(long)]
    vehicle: String,
    #[arg(long)]
    km: i64,
}

#[derive(Args, Debug)]
struct FinishArgs {
    #[arg(long)]
    shift: Uuid,
    #[arg(long)]
    km: i64,
}

#[derive(Args, Debug)]
struct ShiftArgs {
    #[arg(long)]
    shift: Uuid,
}

#[derive(Args, Debug)]
struct AdminCloseArgs {
    #[arg(long)]
    shift: Uuid,
    /// End timestamp, RFC 3339 (e.g. 2026-07-15T22:30:00-03:00).
    #[arg(long)]
    fim: String,
    #[arg(long)]
    km: i64,
}

#[derive(Args, Debug)]
struct ListArgs {
    #[arg(long)]
    driver: Option<String>,
    #[arg(long, default_value_t = 1)]
    page: u64,
    #[arg(long, default_value_t = 20)]
    per_page: u64,
}

fn print_shift(shift: &Shift) {
    println!(
        "{}  driver={} vehicle={} status={} km {}..{}",
        shift.id,
        shift.driver_id,
        shift.vehicle_id,
        shift.status.as_str(),
        shift.km_inicial,
        shift
            .km_final
            .map_or_else(|| "-".to_string(), |km| km.to_string()),
    );
    println!(
        "    bruto={} custos={} liquido={} empresa={} motorista={}",
        Centavos::new(shift.total_bruto),
        Centavos::new(shift.total_custos),
        Centavos::new(shift.liquido),
        Centavos::new(shift.repasse_empresa),
        Centavos::new(shift.repasse_motorista),
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let settings = settings::Settings::new()?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "engine={level},frota_admin={level}",
            level = settings.log.level
        ))
        .init();

    let database_url = cli.database_url.unwrap_or(settings.database.url);
    let db = Database::connect(&database_url).await?;

    if let Command::Migrate = cli.command {
        migration::Migrator::up(&db, None).await?;
        println!("migrations applied");
        return Ok(());
    }

    let service = ShiftService::builder().database(db.clone()).build();

    match cli.command {
        Command::Migrate => unreachable!("handled above"),
        Command::Start(args) => {
            let shift = service
                .start_shift(&args.driver, &args.vehicle, args.km, None)
                .await?;
            println!("turno aberto:");
            print_shift(&shift);
        }
        Command::Finish(args) => {
            let shift = service.finish_shift(args.shift, args.km, None).await?;
            println!("turno finalizado:");
            print_shift(&shift);
        }
        Command::Recalculate(args) => {
            let shift = service.recalculate_shift_totals(args.shift).await?;
            println!("totais recalculados:");
            print_shift(&shift);
        }
        Command::AdminClose(args) => {
            let fim = DateTime::parse_from_rfc3339(&args.fim)?.with_timezone(&Utc);
            let closed = service
                .admin_close_shift(args.shift, fim, args.km, None)
                .await?;
            println!("turno encerrado:");
            print_shift(&closed.shift);
            if let Some(warning) = closed.warning {
                println!("aviso: {warning}");
            }
        }
        Command::Show(args) => match service.get_shift_by_id(args.shift).await? {
            Some(shift) => print_shift(&shift),
            None => println!("turno não encontrado"),
        },
        Command::List(args) => {
            let (shifts, total) = service
                .list_shifts(args.driver.as_deref(), args.page, args.per_page)
                .await?;
            for shift in &shifts {
                print_shift(shift);
            }
            println!("{} de {total} turno(s)", shifts.len());
        }
        Command::SideEffects => {
            let worker = SideEffectWorker::new(
                db,
                Arc::new(NoopFraudService),
                Arc::new(NoopMaintenanceService),
            );
            let dispatched = worker.drain_once(Utc::now()).await?;
            println!("{dispatched} efeito(s) despachado(s)");
        }
    }

    Ok(())
}
