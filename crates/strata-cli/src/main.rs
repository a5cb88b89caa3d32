//! Operator CLI for the Strata multi-tenant store.

use clap::{Parser, Subcommand};
use strata_core::SchemaName;
use strata_db::{migrations, pool, provision, schema, tenants, PoolConfig, Provisioner};
use tracing::error;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Multi-tenant store operations", long_about = None)]
#[command(version)]
struct Cli {
    /// PostgreSQL connection string.
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the shared metadata schema and seed the plan catalog
    Init,

    /// Provision a new tenant for an existing user
    Provision {
        /// Id of the requesting user; becomes the tenant owner
        #[arg(long)]
        user: Uuid,
        /// Plan slug (free, starter, growth)
        #[arg(long, default_value = "free")]
        plan: String,
        /// Organization name
        #[arg(long)]
        org: String,
    },

    /// Migration operations
    Migrate {
        #[command(subcommand)]
        command: MigrateCommands,
    },

    /// List registered tenants
    Tenants,

    /// List subscription plans
    Plans,

    /// Suspend a tenant
    Suspend {
        #[arg(long)]
        tenant: Uuid,
    },

    /// Reactivate a suspended tenant
    Reactivate {
        #[arg(long)]
        tenant: Uuid,
    },

    /// Check database connectivity
    Health,
}

#[derive(Subcommand)]
enum MigrateCommands {
    /// Apply pending migrations to one schema
    Run {
        /// Target schema name (e.g. tenant_acme_1a2b3c4d)
        #[arg(long)]
        schema: String,
    },
    /// Apply pending migrations across every tenant schema
    Sweep,
    /// Show a schema's ledger and pending scripts
    Status {
        #[arg(long)]
        schema: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "strata_db=info,strata_cli=info".into()),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!(error = %e, "Command failed");
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> strata_core::Result<()> {
    let url = cli.database_url.ok_or_else(|| {
        strata_core::StrataError::Validation(
            "no database URL; pass --database-url or set DATABASE_URL".into(),
        )
    })?;
    let pool = pool::connect_with(&url, PoolConfig::default()).await?;

    match cli.command {
        Commands::Init => {
            schema::init_metadata_schema(&pool).await?;
            println!("metadata schema initialized");
        }

        Commands::Provision { user, plan, org } => {
            let provisioner = Provisioner::new(pool.clone());
            let outcome = provisioner
                .provision(provision::ProvisionRequest {
                    user_id: user,
                    plan_slug: plan,
                    org_name: org,
                    secret_ciphertext: None,
                })
                .await?;
            println!(
                "provisioned tenant {} (slug {}, schema {})",
                outcome.tenant_id, outcome.slug, outcome.schema_name
            );
        }

        Commands::Migrate { command } => match command {
            MigrateCommands::Run { schema } => {
                let schema = SchemaName::parse(&schema)?;
                let report = migrations::apply(&pool, &schema, migrations::all_migrations()).await?;
                println!(
                    "executed {}, skipped {}",
                    report.executed.len(),
                    report.skipped.len()
                );
                for err in &report.errors {
                    eprintln!("failed: {}", err);
                }
                if !report.ok() {
                    std::process::exit(1);
                }
            }
            MigrateCommands::Sweep => {
                let report = migrations::apply_all(&pool, migrations::all_migrations()).await?;
                println!(
                    "{} schemas: {} succeeded, {} failed",
                    report.total, report.succeeded, report.failed
                );
                if report.failed > 0 {
                    std::process::exit(1);
                }
            }
            MigrateCommands::Status { schema } => {
                let schema = SchemaName::parse(&schema)?;
                let applied = migrations::ledger(&pool, &schema).await?;
                let pending =
                    migrations::pending(&pool, &schema, migrations::all_migrations()).await?;
                println!("applied:");
                for entry in &applied {
                    println!("  {}  ({})", entry.name, entry.executed_at);
                }
                println!("pending:");
                for name in &pending {
                    println!("  {}", name);
                }
            }
        },

        Commands::Tenants => {
            let list = tenants::list_tenants(&pool).await?;
            for t in &list {
                println!("{}  {}  {}  {}", t.id, t.slug, t.schema_name, t.status);
            }
            println!("{} tenant(s)", list.len());
        }

        Commands::Plans => {
            for p in tenants::list_plans(&pool).await? {
                println!(
                    "{}  {}  members={}  invoices/mo={}",
                    p.slug, p.name, p.max_members, p.max_invoices_per_month
                );
            }
        }

        Commands::Suspend { tenant } => {
            tenants::suspend_tenant(&pool, tenant, None).await?;
            println!("tenant {} suspended", tenant);
        }

        Commands::Reactivate { tenant } => {
            tenants::reactivate_tenant(&pool, tenant, None).await?;
            println!("tenant {} reactivated", tenant);
        }

        Commands::Health => {
            pool::health_check(&pool).await?;
            println!("ok");
        }
    }

    Ok(())
}
