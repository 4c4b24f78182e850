//! oxide-replaceable CLI
//!
//! Command-line tool for planning and applying create-or-replace migrations.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use oxide_replaceable::prelude::*;

/// Declarative create-or-replace migrations for PostgreSQL.
#[derive(Parser)]
#[command(name = "oxide-replaceable")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// PostgreSQL connection string.
    #[arg(short, long, env = "DATABASE_URL")]
    database_url: String,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the SQL needed to bring the database in line with a manifest.
    Plan {
        /// Manifest of declared entities.
        #[arg(short, long)]
        manifest: PathBuf,

        /// Additional schema to observe.
        #[arg(short, long = "schema")]
        schemas: Vec<String>,

        /// Schema to ignore.
        #[arg(short, long = "exclude-schema")]
        exclude_schemas: Vec<String>,

        /// Also show the SQL that undoes the plan.
        #[arg(long)]
        downgrade: bool,
    },

    /// Compute the plan and apply it.
    Apply {
        /// Manifest of declared entities.
        #[arg(short, long)]
        manifest: PathBuf,

        /// Show SQL without executing (dry run).
        #[arg(long)]
        dry_run: bool,
    },
}

async fn load_plan(
    pool: &PgPool,
    manifest: &Path,
    schemas: Vec<String>,
    exclude_schemas: Vec<String>,
    downgrade: bool,
) -> anyhow::Result<(Vec<MigrationOp>, Vec<MigrationOp>)> {
    let mut manifest = Manifest::load(manifest)?;
    manifest.options.schemas.extend(schemas);
    manifest.options.exclude_schemas.extend(exclude_schemas);

    let mut engine = DiffEngine::new().with_options(manifest.options.clone());
    let declared = manifest.entities(engine.kinds())?;

    let mut session = PgSession::acquire(pool).await?;
    let upgrade = engine.compute_plan(&mut session, &declared).await?;
    let downgrade = if downgrade {
        engine.downgrade(&mut session, &upgrade).await?
    } else {
        Vec::new()
    };
    Ok((upgrade, downgrade))
}

fn print_sql(title: &str, ops: &[MigrationOp]) {
    println!("-- {title}");
    if ops.is_empty() {
        println!("-- (no changes)");
    }
    for sql in PlanExecutor::sql_for(ops) {
        println!("{sql};");
    }
    println!();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Connect to database
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&cli.database_url)
        .await?;

    match cli.command {
        Commands::Plan {
            manifest,
            schemas,
            exclude_schemas,
            downgrade,
        } => {
            let (upgrade, reverse) =
                load_plan(&pool, &manifest, schemas, exclude_schemas, downgrade).await?;

            print_sql("upgrade", &upgrade);
            if downgrade {
                print_sql("downgrade", &reverse);
            }
        }

        Commands::Apply { manifest, dry_run } => {
            let (upgrade, _) =
                load_plan(&pool, &manifest, Vec::new(), Vec::new(), false).await?;

            if dry_run {
                info!("Dry run mode - SQL will be printed but not executed.");
            }
            PlanExecutor::new(pool).dry_run(dry_run).apply(&upgrade).await?;
        }
    }

    Ok(())
}
