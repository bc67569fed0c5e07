use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, NaiveTime};
use claims_lens::{AnalysisSelection, AppConfig, DatasetSchema, ProductSelection, Session};
use clap::{Args as ClapArgs, Parser, Subcommand};
use polars::prelude::*;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

const USER_ENV_VAR: &str = "CLAIMS_LENS_USER";
const PASSWORD_ENV_VAR: &str = "CLAIMS_LENS_PASSWORD";

#[derive(Parser)]
#[command(name = "claims-lens")]
#[command(about = "Insurance claims aggregation for dashboard reporting")]
#[command(version)]
struct Args {
    /// Path to a JSON config file (or set CLAIMS_LENS_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ClapArgs)]
struct Upload {
    /// Dataset schema: a configured/preset name (life, property) or a JSON file
    #[arg(short, long, default_value = "life")]
    schema: String,

    /// Claims file: CSV or Excel workbook (first sheet)
    #[arg(short, long)]
    file: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the dashboard report for one year and product
    Report {
        #[command(flatten)]
        upload: Upload,

        /// Incident year (default: first year in the data)
        #[arg(long)]
        year: Option<i32>,

        /// Product category (default: all products)
        #[arg(long)]
        product: Option<String>,

        /// Number of top causes, 3-10
        #[arg(long)]
        top_n: Option<usize>,

        /// Histogram bins, 10-100
        #[arg(long)]
        bins: Option<usize>,

        /// Reference date for days-open counts, YYYY-MM-DD (default: now)
        #[arg(long)]
        as_of: Option<NaiveDate>,

        /// Write the filtered raw rows to this CSV file
        #[arg(long)]
        raw_out: Option<PathBuf>,
    },
    /// List the incident years present in a file
    Years {
        #[command(flatten)]
        upload: Upload,
    },
    /// List the product categories present in a file
    Products {
        #[command(flatten)]
        upload: Upload,
    },
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = AppConfig::resolve(args.config)?;

    match args.command {
        Commands::Report { upload, year, product, top_n, bins, as_of, raw_out } => {
            let (mut session, tab) = open_session(&config, &upload)?;

            let mut selection = session
                .tab(&tab)?
                .selection()
                .cloned()
                .ok_or_else(|| anyhow!("No incident year could be parsed from {}", upload.file.display()))?;
            if let Some(year) = year {
                selection = AnalysisSelection::new(year);
            }
            selection = selection
                .with_product(product.as_deref().map(ProductSelection::only).unwrap_or_default())
                .with_top_n(top_n.unwrap_or(config.default_top_n))
                .with_histogram_bins(bins.unwrap_or(config.default_histogram_bins));
            session.select(&tab, selection)?;

            let reference_time = match as_of {
                Some(date) => date.and_time(NaiveTime::MIN),
                None => chrono::Local::now().naive_local(),
            };
            let output = session.render(&tab, reference_time)?;

            if let Some(path) = raw_out {
                write_raw(output.raw.into_frame(), &path)?;
            }
            println!("{}", serde_json::to_string_pretty(&output.report)?);
            Ok(())
        }
        Commands::Years { upload } => {
            let (session, tab) = open_session(&config, &upload)?;
            println!("{}", serde_json::to_string_pretty(&session.years(&tab)?)?);
            Ok(())
        }
        Commands::Products { upload } => {
            let (session, tab) = open_session(&config, &upload)?;
            println!("{}", serde_json::to_string_pretty(&session.products(&tab)?)?);
            Ok(())
        }
    }
}

fn resolve_schema(config: &AppConfig, name_or_path: &str) -> Result<DatasetSchema> {
    if let Some(schema) = config.schema(name_or_path) {
        return Ok(schema);
    }
    let path = Path::new(name_or_path);
    if path.exists() {
        return DatasetSchema::load(path)
            .with_context(|| format!("Failed to load schema from {}", path.display()));
    }
    Err(anyhow!("Unknown dataset schema '{}'", name_or_path))
}

/// Log in with the environment credentials and upload the file.
fn open_session(config: &AppConfig, upload: &Upload) -> Result<(Session, String)> {
    let schema = resolve_schema(config, &upload.schema)?;
    let tab = schema.name.clone();

    let verifier = config.verifier();
    if verifier.is_empty() {
        return Err(anyhow!("No users configured; add credentials to the config file"));
    }
    let user = std::env::var(USER_ENV_VAR).with_context(|| format!("{} is not set", USER_ENV_VAR))?;
    let password =
        std::env::var(PASSWORD_ENV_VAR).with_context(|| format!("{} is not set", PASSWORD_ENV_VAR))?;

    let mut session = Session::new(vec![schema])?;
    session.authenticate(&verifier, &user, &password)?;
    session.upload_file(&tab, &upload.file)?;
    info!("Session {} ready for dataset '{}'", session.id(), tab);
    Ok((session, tab))
}

fn write_raw(mut df: DataFrame, path: &Path) -> Result<()> {
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;
    info!("Wrote {} raw rows to {}", df.height(), path.display());
    Ok(())
}
