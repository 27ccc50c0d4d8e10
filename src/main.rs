use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use tracing_subscriber::EnvFilter;

use performance_dashboard::config::Settings;
use performance_dashboard::db::{self, PgRecordStore};
use performance_dashboard::report;
use performance_dashboard::summary::{HighlightSummarizer, SummaryService};
use performance_dashboard::{
    Category, DashboardView, DateRange, Filters, ImportError, ImportOutcome, Importer,
    RawInputRow, RecordQuery, RecordStore, Registry,
};

#[derive(Parser)]
#[command(name = "performance-dashboard")]
#[command(about = "District performance records: import, aggregate and rank", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct FilterArgs {
    /// District name or id
    #[arg(long)]
    district: Option<String>,
    /// Category tag, e.g. "NBW" or "Sand Mining"
    #[arg(long)]
    category: Option<String>,
    #[arg(long, requires = "to")]
    from: Option<NaiveDate>,
    #[arg(long, requires = "from")]
    to: Option<NaiveDate>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample records for the last three months
    Seed,
    /// Import records from a CSV, XLSX/XLS/ODS or PDF file
    Import {
        #[arg(long)]
        file: PathBuf,
    },
    /// Submit a single record
    Add {
        /// District name or id
        #[arg(long)]
        district: String,
        #[arg(long)]
        category: String,
        #[arg(long)]
        value: f64,
        /// Date as YYYY-MM-DD (or any accepted date shape)
        #[arg(long)]
        date: String,
    },
    /// Print KPIs, comparison, trend and leaderboard
    Dashboard {
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long)]
        json: bool,
    },
    /// Rank districts by overall score
    Leaderboard {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Recompute the dashboard on every store change
    Watch {
        #[command(flatten)]
        filters: FilterArgs,
    },
}

fn resolve_filters(args: &FilterArgs, registry: &Registry) -> anyhow::Result<Filters> {
    let district_id = match args.district.as_deref() {
        Some(raw) => {
            let district = raw
                .trim()
                .parse::<i32>()
                .ok()
                .and_then(|id| registry.by_id(id))
                .or_else(|| registry.by_name(raw))
                .with_context(|| format!("unknown district {raw:?}"))?;
            Some(district.id)
        }
        None => None,
    };

    let category = args
        .category
        .as_deref()
        .map(str::parse::<Category>)
        .transpose()?;

    let range = match (args.from, args.to) {
        (Some(from), Some(to)) => Some(DateRange::new(from, to)),
        _ => None,
    };

    Ok(Filters {
        district_id,
        category,
        range,
    })
}

fn manual_row(district: &str, category: &str, value: f64, date: &str) -> RawInputRow {
    let row = RawInputRow::new()
        .with("category", category)
        .with("value", value)
        .with("date", date);
    match district.trim().parse::<i32>() {
        Ok(id) => row.with("districtId", id),
        Err(_) => row.with("districtName", district),
    }
}

fn report_import(outcome: &ImportOutcome, source: &Path) {
    for rejection in &outcome.rejected {
        println!("  row {} skipped: {}", rejection.row, rejection.error);
    }
    if outcome.nothing_added() {
        println!(
            "No valid records with recognizable districts and dates were found in {}.",
            source.display()
        );
    } else {
        println!(
            "Inserted {} of {} records from {}.",
            outcome.added,
            outcome.total_rows(),
            source.display()
        );
    }
}

async fn import_file(
    store: &PgRecordStore,
    registry: &Registry,
    settings: &Settings,
    path: &Path,
) -> Result<ImportOutcome, anyhow::Error> {
    let importer = Importer::new(store, registry);
    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

    let outcome = if is_pdf {
        let extractor = settings.extractor()?;
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        importer.import_pdf(&extractor, &bytes).await
    } else {
        importer.import_sheet(path).await
    };

    outcome.map_err(|err| match err {
        ImportError::StoreUnavailable(_) => {
            anyhow::Error::new(err).context("import aborted: record store unreachable, nothing was saved")
        }
        other => anyhow::Error::new(other),
    })
}

async fn dashboard(
    pool: &PgPool,
    registry: &Registry,
    filters: &Filters,
) -> anyhow::Result<(DashboardView, String)> {
    let records = db::fetch_records(pool, RecordQuery::all()).await?;
    let view = DashboardView::compute(&records, filters, registry, today());
    let summary = SummaryService::new(HighlightSummarizer)
        .refresh(&view.kpis)
        .await
        .unwrap_or_default();
    Ok((view, summary))
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;
    let registry = settings.registry()?;

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(settings.database_url()?)
        .await
        .context("failed to connect to Postgres")?;
    let store = PgRecordStore::new(pool.clone());

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let inserted = db::seed(&pool, today()).await?;
            println!("Seed data inserted ({inserted} new records).");
        }
        Commands::Import { file } => {
            let outcome = import_file(&store, &registry, &settings, &file).await?;
            report_import(&outcome, &file);
        }
        Commands::Add {
            district,
            category,
            value,
            date,
        } => {
            let row = manual_row(&district, &category, value, &date);
            let id = Importer::new(&store, &registry).submit(&row).await?;
            println!("Record {id} saved.");
        }
        Commands::Dashboard { filters, json } => {
            let filters = resolve_filters(&filters, &registry)?;
            let (view, summary) = dashboard(&pool, &registry, &filters).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                print!("{}", report::build_report(&view, &registry, Some(&summary)));
            }
        }
        Commands::Leaderboard { limit } => {
            let records = db::fetch_records(&pool, RecordQuery::all()).await?;
            let board = performance_dashboard::aggregate::leaderboard(&records, &registry);

            println!("District leaderboard:");
            for entry in board.iter().take(limit) {
                let breakdown: Vec<String> = entry
                    .totals
                    .iter()
                    .map(|(category, value)| format!("{}={}", category, value))
                    .collect();
                println!(
                    "{:>2}. {} score {} ({})",
                    entry.rank,
                    entry.district.name,
                    entry.score,
                    breakdown.join(", ")
                );
            }
        }
        Commands::Report { filters, out } => {
            let filters = resolve_filters(&filters, &registry)?;
            let (view, summary) = dashboard(&pool, &registry, &filters).await?;
            let report = report::build_report(&view, &registry, Some(&summary));
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Watch { filters } => {
            let filters = resolve_filters(&filters, &registry)?;
            let mut subscription = store.subscribe(RecordQuery::all()).await?;
            let summaries = SummaryService::new(HighlightSummarizer);

            let mut records = subscription.current();
            loop {
                let view = DashboardView::compute(&records, &filters, &registry, today());
                info!(records = records.len(), "dashboard recomputed");
                if let Some(summary) = summaries.refresh(&view.kpis).await {
                    println!("{summary}");
                }
                for metric in &view.kpis {
                    println!("  {}: {} ({:+.1}%)", metric.label, metric.value, metric.change);
                }

                match subscription.next().await {
                    Some(next) => records = next,
                    None => break,
                }
            }
            println!("Subscription closed.");
        }
    }

    Ok(())
}
