// src/main.rs
mod utils;
mod spensiones;
mod periods;
mod extractors;
mod storage;
mod pipeline;

use std::time::Duration;

use clap::Parser;
use periods::PeriodRequest;
use spensiones::client::{ClientConfig, SpensionesClient, DEFAULT_REQUEST_DELAY_MS, DEFAULT_TIMEOUT_SECS};
use spensiones::models::{DatasetKind, Frequency, FundType};
use storage::StorageManager;
use utils::AppError;

/// Downloads pension fund statistics published by the Superintendencia de
/// Pensiones and converts each cuadro into CSV
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Dataset to download
    #[arg(value_enum)]
    dataset: DatasetKind,

    /// Period: YYYYMM, or YYYY for a whole year
    #[arg(short, long, conflicts_with = "rango", required_unless_present = "rango")]
    periodo: Option<String>,

    /// Inclusive range of years
    #[arg(short, long, num_args = 2, value_names = ["DESDE", "HASTA"])]
    rango: Option<Vec<i32>>,

    /// Fund type for unit values
    #[arg(short, long, value_enum, ignore_case = true, default_value_t = FundType::C)]
    fondo: FundType,

    /// Output directory for raw documents and CSV files
    #[arg(short, long, default_value = "./data", env = "SPENSIONES_OUTPUT_DIR")]
    output_dir: String,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS, env = "SPENSIONES_TIMEOUT_SECS")]
    timeout_secs: u64,

    /// Pause before each request, in milliseconds
    #[arg(long, default_value_t = DEFAULT_REQUEST_DELAY_MS)]
    delay_ms: u64,

    /// Debug mode - save annotated HTML files for debugging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Setup Logging (reads RUST_LOG env var)
    utils::logging::setup_logging();

    // 2. Parse CLI Arguments
    let args = Args::parse();
    tracing::info!("Starting processing for args: {:?}", args);

    // 3. Resolve the requested periods before touching the network
    let datasets = args.dataset.descriptors();
    let frequency = args.dataset.frequency();
    let rango = match args.rango.as_deref() {
        Some(&[from, to]) => Some((from, to)),
        Some(other) => return Err(AppError::Config(format!("--rango takes two years, got {:?}", other))),
        None => None,
    };
    let request = PeriodRequest::from_args(args.periodo.as_deref(), rango)?;
    let tokens = periods::resolve(&request, frequency)?;

    if tokens.is_empty() {
        tracing::warn!("Nothing to download for {:?}", request);
        return Ok(());
    }
    tracing::info!(
        "Resolved {} {} period(s) for {:?}: {} .. {}",
        tokens.len(),
        frequency,
        args.dataset,
        tokens[0],
        tokens[tokens.len() - 1]
    );
    if frequency != Frequency::Annual && args.fondo != FundType::default() {
        tracing::warn!("--fondo only applies to unit values; ignoring it for {:?}", args.dataset);
    }

    // 4. Initialize storage and HTTP client
    let storage = StorageManager::new(&args.output_dir)?;
    tracing::info!("Writing output under {}", storage.base_dir().display());
    let client = SpensionesClient::new(ClientConfig {
        timeout: Duration::from_secs(args.timeout_secs),
        request_delay: Duration::from_millis(args.delay_ms),
    })?;

    // 5. Process every dataset, every period in order
    let summaries = pipeline::run_all(&client, &storage, &datasets, &tokens, args.fondo, args.debug).await;

    let failed: usize = summaries
        .iter()
        .filter(|s| s.has_failures())
        .map(|s| s.failed.len())
        .sum();
    if failed > 0 {
        return Err(AppError::PeriodsFailed(failed));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_year_range_and_fund() {
        let args = Args::try_parse_from([
            "spensiones_extractor", "valores-cuota", "--rango", "2020", "2024", "--fondo", "a",
        ])
        .unwrap();
        assert_eq!(args.dataset, DatasetKind::ValoresCuota);
        assert_eq!(args.rango, Some(vec![2020, 2024]));
        assert_eq!(args.fondo, FundType::A);
        assert!(args.periodo.is_none());
    }

    #[test]
    fn parses_ambos_selector() {
        let args = Args::try_parse_from(["spensiones_extractor", "ambos", "--periodo", "2024"]).unwrap();
        assert_eq!(args.dataset, DatasetKind::Ambos);
        assert_eq!(args.dataset.descriptors().len(), 2);
    }

    #[test]
    fn periodo_and_rango_are_exclusive() {
        let both = Args::try_parse_from([
            "spensiones_extractor", "eeff", "--periodo", "2024", "--rango", "2020", "2024",
        ]);
        assert!(both.is_err());
        let neither = Args::try_parse_from(["spensiones_extractor", "eeff"]);
        assert!(neither.is_err());
    }
}
