use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod access;
mod buckets;
mod config;
mod db;
mod district;
mod export;
mod files;
mod finance;
mod health;
mod models;
mod ranking;
mod report;

use access::{Capabilities, Role};
use buckets::ParseMode;
use config::Settings;
use district::DistrictReport;
use export::{ExportFormat, ReportTab};
use models::{Branch, RecordKind};

#[derive(Parser)]
#[command(name = "district-reports")]
#[command(about = "Branch activity reports for church district administration", long_about = None)]
struct Cli {
    /// Role used to authorize changes
    #[arg(long, value_enum, global = true, default_value_t = Role::Viewer)]
    role: Role,
    /// How unparseable dates and transaction types are handled
    #[arg(
        long,
        value_enum,
        global = true,
        ignore_case = true,
        env = "DISTRICT_REPORTS_DATE_MODE",
        default_value_t = ParseMode::Lenient
    )]
    date_mode: ParseMode,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ScopeArgs {
    /// Only branches of this district
    #[arg(long)]
    district: Option<String>,
    /// Only these branch ids (repeatable)
    #[arg(long = "branch")]
    branches: Vec<String>,
    /// Read table dumps from a directory instead of Postgres
    #[arg(long)]
    csv_dir: Option<PathBuf>,
    /// Report as of this date (YYYY-MM-DD, default today)
    #[arg(long)]
    as_of: Option<NaiveDate>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo branches and activity
    Seed,
    /// Import branches from a CSV file (id,name,district)
    ImportBranches {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Import activity rows from a CSV file
    Import {
        #[arg(long, value_enum)]
        kind: RecordKind,
        #[arg(long)]
        csv: PathBuf,
    },
    /// Score branch health over the last 30 days
    Health {
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Show monthly totals for the top branches
    Trends {
        #[arg(long, value_enum)]
        kind: RecordKind,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Show monthly income and expense
    Finance {
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Export one report tab
    Export {
        #[arg(long, value_enum)]
        tab: ReportTab,
        #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "district-report.md")]
        out: PathBuf,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Count rows per table since a number of days ago
    Counts {
        #[arg(long, default_value_t = 365)]
        since_days: i64,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Delete activity rows older than a date
    Purge {
        #[arg(long, value_enum)]
        kind: RecordKind,
        #[arg(long)]
        before: NaiveDate,
        #[command(flatten)]
        scope: ScopeArgs,
    },
}

impl Commands {
    fn needs_database(&self) -> bool {
        match self {
            Commands::Health { scope }
            | Commands::Trends { scope, .. }
            | Commands::Finance { scope }
            | Commands::Export { scope, .. }
            | Commands::Report { scope, .. } => scope.csv_dir.is_none(),
            _ => true,
        }
    }
}

fn init_tracing(log_json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn connect(settings: &Settings) -> anyhow::Result<PgPool> {
    let database_url = settings.require_database_url()?;
    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

struct App {
    settings: Settings,
    pool: Option<PgPool>,
    mode: ParseMode,
}

impl App {
    fn pool(&self) -> anyhow::Result<&PgPool> {
        self.pool.as_ref().context("no database connection")
    }

    async fn scoped_branches(&self, scope: &ScopeArgs) -> anyhow::Result<Vec<Branch>> {
        db::fetch_branches(self.pool()?, scope.district.as_deref(), &scope.branches).await
    }

    async fn load(&self, scope: &ScopeArgs) -> anyhow::Result<DistrictReport> {
        let today = scope.as_of.unwrap_or_else(|| Utc::now().date_naive());
        let (branches, activity) = match &scope.csv_dir {
            Some(dir) => {
                let (branches, activity) = files::load_dir(dir)?;
                files::scope(branches, activity, scope.district.as_deref(), &scope.branches)
            }
            None => {
                let branches = self.scoped_branches(scope).await?;
                let ids: Vec<String> = branches.iter().map(|b| b.id.clone()).collect();
                let activity =
                    db::fetch_activity(self.pool()?, &ids, district::floors(today)).await?;
                (branches, activity)
            }
        };
        DistrictReport::build(branches, &activity, today, self.mode)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::from_env()?;
    init_tracing(settings.log_json);

    let caps = Capabilities::for_role(cli.role);
    let mode = cli.date_mode;
    let pool = if cli.command.needs_database() {
        Some(connect(&settings).await?)
    } else {
        None
    };
    let ctx = App {
        settings,
        pool,
        mode,
    };
    tracing::debug!(
        max_connections = ctx.settings.max_connections,
        mode = ?ctx.mode,
        "settings loaded"
    );

    match cli.command {
        Commands::InitDb => {
            db::init_db(ctx.pool()?).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(ctx.pool()?, caps, Utc::now().date_naive()).await?;
            println!("Seed data inserted.");
        }
        Commands::ImportBranches { csv } => {
            let branches: Vec<Branch> = files::read_rows(&csv)?;
            let count = db::upsert_branches(ctx.pool()?, caps, &branches).await?;
            println!("Upserted {count} branches from {}.", csv.display());
        }
        Commands::Import { kind, csv } => {
            let inserted = db::import_csv(ctx.pool()?, caps, kind, &csv, ctx.mode).await?;
            println!("Inserted {inserted} {} rows from {}.", kind.table(), csv.display());
        }
        Commands::Health { scope } => {
            let report = ctx.load(&scope).await?;
            if report.health.is_empty() {
                println!("No branches in scope.");
                return Ok(());
            }

            println!("Branch health (last 30 days, as of {}):", report.today);
            for row in &report.health {
                println!(
                    "- {} score {} ({} attendance, {} new members, {} events, {} finance)",
                    row.branch,
                    row.score,
                    row.attendance_30d,
                    row.new_members_30d,
                    row.events_30d,
                    row.finance_30d
                );
            }
        }
        Commands::Trends { kind, scope } => {
            let report = ctx.load(&scope).await?;
            let trend = report.trend_for(kind);
            if trend.top.is_empty() {
                println!("No {} rows in this window.", kind.table());
                return Ok(());
            }

            println!("Top branches by {}:", kind.table());
            for id in &trend.top {
                println!("- {}: {}", report.label(id), trend.buckets.totals.get(id));
            }
            for row in &trend.chart {
                let values: Vec<String> = row.values.iter().map(|v| v.to_string()).collect();
                println!("{}  {}", row.month, values.join("  "));
            }
            if trend.buckets.malformed_dates > 0 {
                println!(
                    "{} rows had unparseable dates.",
                    trend.buckets.malformed_dates
                );
            }
        }
        Commands::Finance { scope } => {
            let report = ctx.load(&scope).await?;
            println!("Month     Income  Expense  Net");
            for row in &report.flow {
                println!("{}  {}  {}  {}", row.month, row.income, row.expense, row.net);
            }
        }
        Commands::Export {
            tab,
            format,
            out_dir,
            scope,
        } => {
            let report = ctx.load(&scope).await?;
            let table = report.table(tab);
            let path = export::export(&table, format, &out_dir)?;
            println!("Exported {} rows to {}.", table.rows.len(), path.display());
        }
        Commands::Report { out, scope } => {
            let report = ctx.load(&scope).await?;
            let text = report::build_report(scope.district.as_deref(), &report);
            std::fs::write(&out, text)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Counts { since_days, scope } => {
            let branches = ctx.scoped_branches(&scope).await?;
            let ids: Vec<String> = branches.iter().map(|b| b.id.clone()).collect();
            let today = scope.as_of.unwrap_or_else(|| Utc::now().date_naive());
            let since = health::cutoff_date(today, since_days);
            for kind in RecordKind::ALL {
                let count = db::count_rows(ctx.pool()?, kind, &ids, since).await?;
                println!("{}: {count} rows since {since}", kind.table());
            }
        }
        Commands::Purge {
            kind,
            before,
            scope,
        } => {
            let branches = ctx.scoped_branches(&scope).await?;
            let ids: Vec<String> = branches.iter().map(|b| b.id.clone()).collect();
            let deleted = db::purge(ctx.pool()?, caps, kind, &ids, before).await?;
            println!("Deleted {deleted} {} rows before {before}.", kind.table());
        }
    }

    Ok(())
}
