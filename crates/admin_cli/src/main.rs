use std::error::Error;

use clap::{Args, Parser, Subcommand};
use engine::{Engine, EngineError, TenantReconciliation};
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};
use serde::Serialize;

mod settings;

#[derive(Parser, Debug)]
#[command(name = "apotheca_admin")]
#[command(about = "Admin utilities for Apotheca (bootstrap tenants, reconcile ledgers)")]
struct Cli {
    /// Optional settings file (TOML), `settings.toml` by default.
    #[arg(long)]
    config: Option<String>,
    /// Override the database connection string.
    #[arg(long)]
    database_url: Option<String>,
    /// Override the log level (`error`, `warn`, `info`, `debug`, `trace`).
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Tenant(Tenant),
    Member(Member),
    Supplier(Supplier),
    /// Check derived totals and balances; exits with 1 on drift.
    Reconcile(ReconcileArgs),
}

#[derive(Args, Debug)]
struct Tenant {
    #[command(subcommand)]
    command: TenantCommand,
}

#[derive(Subcommand, Debug)]
enum TenantCommand {
    Create {
        #[arg(long)]
        name: String,
    },
    List,
}

#[derive(Args, Debug)]
struct Member {
    #[command(subcommand)]
    command: MemberCommand,
}

#[derive(Subcommand, Debug)]
enum MemberCommand {
    /// Map an authenticated principal to a tenant.
    Add {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        principal: String,
    },
}

#[derive(Args, Debug)]
struct Supplier {
    #[command(subcommand)]
    command: SupplierCommand,
}

#[derive(Subcommand, Debug)]
enum SupplierCommand {
    Create {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        name: String,
    },
    List {
        #[arg(long)]
        tenant: String,
    },
}

#[derive(Args, Debug)]
struct ReconcileArgs {
    /// Only this tenant; every tenant when omitted.
    #[arg(long)]
    tenant: Option<String>,
    /// Recompute whatever drifted instead of only reporting it.
    #[arg(long)]
    repair: bool,
}

async fn connect_db(
    database_url: &str,
) -> Result<DatabaseConnection, Box<dyn Error + Send + Sync>> {
    let db = Database::connect(database_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn Error + Send + Sync>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn reconcile(
    engine: &Engine,
    args: ReconcileArgs,
) -> Result<Vec<TenantReconciliation>, EngineError> {
    let tenant_ids = match args.tenant {
        Some(tenant_id) => vec![tenant_id],
        None => engine
            .tenants()
            .await?
            .into_iter()
            .map(|tenant| tenant.id)
            .collect(),
    };

    let mut reports = Vec::with_capacity(tenant_ids.len());
    for tenant_id in tenant_ids {
        let report = if args.repair {
            engine.repair_tenant(&tenant_id).await?
        } else {
            engine.reconcile_tenant(&tenant_id).await?
        };
        if !report.is_consistent() {
            tracing::warn!(
                tenant_id = %report.tenant_id,
                drift = report.drift_count(),
                "tenant has drifted records"
            );
        }
        reports.push(report);
    }
    Ok(reports)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();

    let mut settings = settings::Settings::load(cli.config.as_deref())?;
    if let Some(database_url) = cli.database_url {
        settings.database_url = database_url;
    }
    if let Some(log_level) = cli.log_level {
        settings.log_level = log_level;
    }

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "apotheca_admin={level},engine={level},migration={level}",
            level = settings.log_level
        ))
        .with_writer(std::io::stderr)
        .init();

    let db = connect_db(&settings.database_url).await?;
    let engine = Engine::builder().database(db).build().await?;

    match cli.command {
        Command::Tenant(Tenant {
            command: TenantCommand::Create { name },
        }) => {
            let tenant_id = engine.new_tenant(&name).await?;
            println!("created tenant: {name} ({tenant_id})");
        }
        Command::Tenant(Tenant {
            command: TenantCommand::List,
        }) => {
            print_json(&engine.tenants().await?)?;
        }
        Command::Member(Member {
            command: MemberCommand::Add { tenant, principal },
        }) => {
            engine.add_member(&tenant, &principal).await?;
            println!("added member: {principal} -> {tenant}");
        }
        Command::Supplier(Supplier {
            command: SupplierCommand::Create { tenant, name },
        }) => {
            let supplier = engine.new_supplier(&tenant, &name).await?;
            println!("created supplier: {} ({})", supplier.name, supplier.id);
        }
        Command::Supplier(Supplier {
            command: SupplierCommand::List { tenant },
        }) => {
            print_json(&engine.list_suppliers(&tenant).await?)?;
        }
        Command::Reconcile(args) => {
            let repair = args.repair;
            let reports = reconcile(&engine, args).await?;
            print_json(&reports)?;
            if !repair && reports.iter().any(|report| !report.is_consistent()) {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
