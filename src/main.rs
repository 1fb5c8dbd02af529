use access2pg::{
    config::ToolsConfig,
    sink::{InsertMode, InsertOptions, PgSession},
    source::MdbTools,
    Pipeline, PipelineError,
};
use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::{env, path::PathBuf};
use tokio_postgres::NoTls;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(version, about = "Export Access tables to JSON or load them into PostgreSQL")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the tables of an Access file
    Tables {
        #[arg(short, long)]
        db: PathBuf,
    },
    /// List the columns of an Access table
    Describe {
        #[arg(short, long)]
        db: PathBuf,
        #[arg(short, long)]
        table: String,
    },
    /// Export an Access table to a JSON file
    Export {
        #[arg(short, long)]
        db: PathBuf,
        #[arg(short, long)]
        table: String,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Insert an Access table's rows into a PostgreSQL table
    Load {
        #[arg(short, long)]
        db: PathBuf,
        #[arg(short, long)]
        table: String,
        #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
        database_url: String,
        /// Destination table, `schema.table` allowed; defaults to --table
        #[arg(long)]
        dest_table: Option<String>,
        /// Roll back every row if any insert fails
        #[arg(long)]
        transactional: bool,
        /// Insert empty fields as NULL instead of ''
        #[arg(long)]
        empty_as_null: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::default().add_directive(log_level.parse().unwrap_or(Level::INFO.into()))
    });
    fmt()
        .with_env_filter(filter)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();

    // ─── 2) configure tools ──────────────────────────────────────────
    let cli = Cli::parse();
    let tools = ToolsConfig::from_env();
    info!(export = %tools.export_bin.display(), schema = %tools.schema_bin.display(), "mdb tools");
    let pipeline = Pipeline::new(MdbTools::new(tools));

    // ─── 3) dispatch ─────────────────────────────────────────────────
    dispatch(cli.command, &pipeline).await
}

async fn dispatch(command: Command, pipeline: &Pipeline<MdbTools>) -> Result<()> {
    match command {
        Command::Tables { db } => {
            let tables = pipeline.list_tables(&db).await.map_err(report)?;
            for t in tables {
                println!("{}", t);
            }
            Ok(())
        }
        Command::Describe { db, table } => {
            require_table(&table)?;
            let schema = pipeline.describe(&db, &table).await.map_err(report)?;
            println!("Columns of table '{}':", schema.table);
            for col in &schema.columns {
                println!("- {} ({})", col.name, col.ty);
            }
            Ok(())
        }
        Command::Export { db, table, output } => {
            require_table(&table)?;
            let summary = pipeline
                .export(&db, &table, &output)
                .await
                .map_err(report)?;
            println!("{}", summary);
            Ok(())
        }
        Command::Load {
            db,
            table,
            database_url,
            dest_table,
            transactional,
            empty_as_null,
        } => {
            require_table(&table)?;
            let mut session = connect(&database_url).await?;
            let dest_table = dest_table.unwrap_or_else(|| table.clone());
            let options = InsertOptions {
                mode: if transactional {
                    InsertMode::Transactional
                } else {
                    InsertMode::PerRow
                },
                empty_as_null,
            };
            let summary = pipeline
                .load(&db, &table, &mut session, &dest_table, options)
                .await
                .map_err(report)?;
            println!("{}", summary);
            Ok(())
        }
    }
}

fn require_table(table: &str) -> Result<()> {
    if table.trim().is_empty() {
        bail!("--table must not be empty");
    }
    Ok(())
}

/// Prefix the failing stage so the user sees where the run stopped.
fn report(e: PipelineError) -> anyhow::Error {
    let stage = e.stage();
    anyhow!(e).context(format!("{} failed", stage))
}

/// Open the destination, spawn its connection task, and ping it before any
/// row is sent.
async fn connect(database_url: &str) -> Result<PgSession> {
    let (client, connection) = tokio_postgres::connect(database_url, NoTls)
        .await
        .context("connecting to PostgreSQL")?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!("PostgreSQL connection error: {}", e);
        }
    });

    let session = PgSession::new(client);
    session
        .ping()
        .await
        .map_err(|e| anyhow!(e))
        .context("PostgreSQL health check failed")?;
    info!("connected to PostgreSQL");
    Ok(session)
}
