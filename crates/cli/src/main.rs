//! s2cuts CLI - Sentinel-2 scene search and download

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use s2cuts_algorithms::mask::MaskConfig;
use s2cuts_core::CRS;
use s2cuts_pipeline::{
    AreaOfInterest, BatchReport, Credentials, DataSource, Pipeline, PipelineConfig, SceneCandidate, TimeWindow,
    Variable,
};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "s2cuts")]
#[command(author, version, about = "Sentinel-2 downloader with cloud filtering and biophysical variables", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query the catalog, then fetch and write every selected scene
    Run {
        #[command(flatten)]
        query: QueryArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Query the catalog and print the selected scenes
    Search {
        #[command(flatten)]
        query: QueryArgs,
        /// Print candidates as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct QueryArgs {
    /// GeoJSON file with the area of interest
    #[arg(long = "geojson")]
    geojson: PathBuf,
    /// First acquisition date (YYYY-MM-DD)
    #[arg(long = "start_date", visible_alias = "start-date")]
    start_date: String,
    /// Last acquisition date, inclusive (YYYY-MM-DD)
    #[arg(long = "end_date", visible_alias = "end-date")]
    end_date: String,
    /// Feature id to use from the GeoJSON, also the AOI id in output names
    #[arg(long = "test_id", visible_alias = "test-id")]
    test_id: Option<String>,
    /// Maximum scene cloud cover in percent
    #[arg(long = "cloud_ceiling", visible_alias = "cloud-ceiling", default_value = "20")]
    cloud_ceiling: f64,
    /// Data source: earth-search (public COGs) or hub (Copernicus Data Space)
    #[arg(long, default_value = "earth-search")]
    source: String,
    /// Maximum catalog items to collect
    #[arg(long = "max_items", visible_alias = "max-items", default_value = "500")]
    max_items: usize,
    /// OAuth client id for the hub source
    #[arg(long = "client_id", visible_alias = "client-id", env = "S2CUTS_CLIENT_ID")]
    client_id: Option<String>,
    /// OAuth client secret for the hub source
    #[arg(long = "client_secret", visible_alias = "client-secret", env = "S2CUTS_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,
    /// Sentinel Hub service URL
    #[arg(long = "hub_url", visible_alias = "hub-url", default_value = "https://sh.dataspace.copernicus.eu")]
    hub_url: String,
    /// Per-request timeout in seconds
    #[arg(long, default_value = "30")]
    timeout: u64,
    /// Retries for transient HTTP failures
    #[arg(long, default_value = "3")]
    retries: u32,
}

#[derive(Args)]
struct OutputArgs {
    /// Output root directory
    #[arg(long = "out_dir", visible_alias = "out-dir")]
    out_dir: PathBuf,
    /// Output CRS: EPSG:4326, EPSG:3857 or a UTM zone (EPSG:326xx/327xx)
    #[arg(long = "target_crs", visible_alias = "target-crs", default_value = "EPSG:4326")]
    target_crs: String,
    /// Comma-separated variables: NDVI, LAI, CCC, CWC or band names (B04, B8A, ...)
    #[arg(long, default_value = "NDVI")]
    variables: String,
    /// Working resolution in metres
    #[arg(long, default_value = "20")]
    resolution: f64,
    /// Directory with lai.json, ccc.json and cwc.json model coefficients
    #[arg(long = "model_dir", visible_alias = "model-dir")]
    model_dir: Option<PathBuf>,
    /// Comma-separated SCL classes treated as invalid
    #[arg(long = "scl_invalid", visible_alias = "scl-invalid", default_value = "0,1,3,8,9,10,11")]
    scl_invalid: String,
    /// Refine the SCL mask: drop valid patches under 49 pixels, fill holes,
    /// apply a 3x3 closing, drop patches under 47 pixels. Without this flag
    /// only the SCL class filter is applied
    #[arg(long = "refine_mask", visible_alias = "refine-mask")]
    refine_mask: bool,
    /// Replace existing outputs instead of skipping them
    #[arg(long)]
    overwrite: bool,
    /// Scenes processed concurrently
    #[arg(short, long, default_value = "1")]
    jobs: usize,
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to install log subscriber")
}

fn scene_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} scenes {msg}")
            .context("Invalid progress template")?
            .progress_chars("=> "),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

fn parse_classes(s: &str) -> Result<Vec<u8>> {
    s.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(|c| {
            let code: u8 = c.parse().with_context(|| format!("Invalid SCL class: {}", c))?;
            if code > 11 {
                anyhow::bail!("SCL class {} is outside 0..=11", code);
            }
            Ok(code)
        })
        .collect()
}

fn load_aoi(query: &QueryArgs) -> Result<AreaOfInterest> {
    let aoi = AreaOfInterest::from_file(&query.geojson, query.test_id.as_deref())
        .with_context(|| format!("Failed to load AOI from {}", query.geojson.display()))?;
    info!(
        aoi = aoi.id(),
        bbox = ?aoi.bbox(),
        "area of interest loaded"
    );
    Ok(aoi)
}

fn time_window(query: &QueryArgs) -> Result<TimeWindow> {
    TimeWindow::parse(&query.start_date, &query.end_date).context("Invalid date range")
}

fn base_config(query: &QueryArgs) -> Result<PipelineConfig> {
    let source: DataSource = query.source.parse().context("Invalid --source")?;
    let credentials = match (&query.client_id, &query.client_secret) {
        (Some(id), Some(secret)) => Some(Credentials::new(id.as_str(), secret.as_str())),
        (None, None) => None,
        _ => anyhow::bail!("--client_id and --client_secret must be given together"),
    };
    Ok(PipelineConfig {
        source,
        cloud_ceiling: query.cloud_ceiling,
        max_items: query.max_items,
        credentials,
        hub_base_url: query.hub_url.clone(),
        request_timeout: Duration::from_secs(query.timeout),
        max_retries: query.retries,
        ..Default::default()
    })
}

fn run_config(query: &QueryArgs, output: &OutputArgs) -> Result<PipelineConfig> {
    let mut config = base_config(query)?;
    config.out_dir = output.out_dir.clone();
    config.target_crs = CRS::parse(&output.target_crs).context("Invalid --target_crs")?;
    config.variables = Variable::parse_list(&output.variables).context("Invalid --variables")?;
    config.resolution = output.resolution;
    config.model_dir = output.model_dir.clone();
    config.mask = MaskConfig {
        invalid_classes: parse_classes(&output.scl_invalid)?,
        refine: output.refine_mask,
        ..Default::default()
    };
    config.overwrite = output.overwrite;
    config.jobs = output.jobs;
    Ok(config)
}

fn print_candidates(candidates: &[SceneCandidate]) {
    println!("{:<10}  {:>3}  {:>6}  {:>6}  {:<6}  id", "date", "seq", "cloud", "epsg", "tile");
    for c in candidates {
        println!(
            "{:<10}  {:>3}  {:>5.1}%  {:>6}  {:<6}  {}",
            c.date,
            c.seq,
            c.cloud_cover,
            c.epsg.map(|e| e.to_string()).unwrap_or_else(|| "-".into()),
            c.tile.as_deref().unwrap_or("-"),
            c.id
        );
    }
    println!("{} scene(s)", candidates.len());
}

fn print_report(report: &BatchReport, elapsed: Duration) {
    println!(
        "{} scene(s): {} written, {} skipped, {} failed",
        report.scenes,
        report.written.len(),
        report.skipped.len(),
        report.failed.len()
    );
    for failure in &report.failed {
        println!("  failed {}: {}", failure.scene, failure.error);
    }
    println!("  Processing time: {:.2?}", elapsed);
}

// ─── Main ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        // ── Search ───────────────────────────────────────────────────
        Commands::Search { query, json } => {
            let aoi = load_aoi(&query)?;
            let window = time_window(&query)?;
            let pipeline = Pipeline::from_config(base_config(&query)?).context("Invalid configuration")?;

            let candidates = pipeline
                .search(&aoi, &window)
                .await
                .context("Catalog query failed")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&candidates)?);
            } else {
                print_candidates(&candidates);
            }
        }

        // ── Run ──────────────────────────────────────────────────────
        Commands::Run { query, output } => {
            let aoi = load_aoi(&query)?;
            let window = time_window(&query)?;
            let pipeline = Pipeline::from_config(run_config(&query, &output)?).context("Invalid configuration")?;

            let candidates = pipeline
                .search(&aoi, &window)
                .await
                .context("Catalog query failed")?;
            if candidates.is_empty() {
                warn!(aoi = aoi.id(), "no scene matches the query");
                return Ok(());
            }

            let start = Instant::now();
            let pb = scene_bar(candidates.len())?;
            let report = pipeline
                .process(&aoi, &candidates, |scene| {
                    pb.set_message(scene.scene.clone());
                    pb.inc(1);
                })
                .await;
            pb.finish_and_clear();

            print_report(&report, start.elapsed());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags_build_a_config() {
        let cli = Cli::try_parse_from([
            "s2cuts",
            "run",
            "--geojson",
            "aoi.geojson",
            "--start_date",
            "2019-01-01",
            "--end_date",
            "2019-02-01",
            "--out_dir",
            "out",
            "--target_crs",
            "EPSG:32632",
            "--variables",
            "ndvi,B04",
            "--scl_invalid",
            "3,8,9",
            "--jobs",
            "4",
        ])
        .unwrap();
        let Commands::Run { query, output } = cli.command else {
            panic!("expected run");
        };
        let config = run_config(&query, &output).unwrap();
        assert_eq!(config.target_crs, CRS::from_epsg(32632));
        assert_eq!(config.variables.len(), 2);
        assert_eq!(config.mask.invalid_classes, vec![3, 8, 9]);
        assert_eq!(config.jobs, 4);
        assert_eq!(config.cloud_ceiling, 20.0);
        assert!(!config.mask.refine);
        config.validate().unwrap();
    }

    #[test]
    fn refine_mask_flag_enables_refinement() {
        let cli = Cli::try_parse_from([
            "s2cuts",
            "run",
            "--geojson",
            "aoi.geojson",
            "--start_date",
            "2019-01-01",
            "--end_date",
            "2019-02-01",
            "--out_dir",
            "out",
            "--refine-mask",
        ])
        .unwrap();
        let Commands::Run { query, output } = cli.command else {
            panic!("expected run");
        };
        let config = run_config(&query, &output).unwrap();
        assert!(config.mask.refine);
        assert_eq!(config.mask.invalid_classes, MaskConfig::default().invalid_classes);

        let help = Cli::command()
            .find_subcommand_mut("run")
            .unwrap()
            .render_long_help()
            .to_string();
        assert!(help.contains("3x3 closing"));
    }

    #[test]
    fn kebab_aliases_are_accepted() {
        let cli = Cli::try_parse_from([
            "s2cuts",
            "search",
            "--geojson",
            "aoi.geojson",
            "--start-date",
            "2019-01-01",
            "--end-date",
            "2019-01-31",
            "--cloud-ceiling",
            "35",
        ])
        .unwrap();
        let Commands::Search { query, json } = cli.command else {
            panic!("expected search");
        };
        assert!(!json);
        assert_eq!(query.cloud_ceiling, 35.0);
    }

    #[test]
    fn scl_classes_are_checked() {
        assert_eq!(parse_classes("0, 1,11").unwrap(), vec![0, 1, 11]);
        assert!(parse_classes("12").is_err());
        assert!(parse_classes("cloud").is_err());
    }
}
