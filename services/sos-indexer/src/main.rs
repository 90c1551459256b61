//! SOS observation indexer.
//!
//! Builds the observation index from JSON observation files, runs filter
//! sessions against it, and queries the metadata database through the
//! generic reader.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use generic_reader::{GenericReader, ReaderConfig, SqlValue};
use observation_index::{
    IndexerConfig, LogicalOperator, ObservationFilter, ObservationIndexer, ObservationSearcher,
    ObservationType, Offering, ResponseMode,
};
use sos_common::{BoundingBox, TemporalGeometry, TemporalRelation};

#[derive(Parser, Debug)]
#[command(name = "sos-indexer")]
#[command(about = "Observation index builder and search tool for SOS services")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild the index from the observation and template directories
    Build(BuildArgs),
    /// Run a filter session against an existing index
    Search(SearchArgs),
    /// Read named variables from the metadata database
    Metadata(MetadataArgs),
}

#[derive(ClapArgs, Debug)]
struct BuildArgs {
    /// Observation JSON directory
    #[arg(long, env = "SOS_OBSERVATION_DIR")]
    observations: Option<PathBuf>,

    /// Result template JSON directory
    #[arg(long, env = "SOS_TEMPLATE_DIR")]
    templates: Option<PathBuf>,

    /// Index output directory
    #[arg(long, env = "SOS_INDEX_DIR")]
    index: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
struct SearchArgs {
    /// Index directory
    #[arg(long, env = "SOS_INDEX_DIR", default_value = "./data/index")]
    index: PathBuf,

    /// Procedure identifier (repeatable)
    #[arg(long)]
    procedure: Vec<String>,

    /// JSON file with offerings, used when no procedure is given
    #[arg(long)]
    offerings: Option<PathBuf>,

    /// Observed property (repeatable)
    #[arg(long)]
    property: Vec<String>,

    /// Feature of interest identifier (repeatable)
    #[arg(long)]
    foi: Vec<String>,

    /// Temporal filter as <relation>=<instant|begin/end>, e.g. TM_During=2020-01-01/2020-02-01
    #[arg(long)]
    time: Option<String>,

    /// Bounding box as minx,miny,maxx,maxy
    #[arg(long)]
    bbox: Option<String>,

    /// How the bounding box combines with the other filters (AND, OR, NOT)
    #[arg(long, default_value = "AND")]
    operator: String,

    /// Search result templates instead of observations
    #[arg(long)]
    template: bool,

    /// Search measurements instead of plain observations
    #[arg(long)]
    measurement: bool,

    /// Print (identifier, begin, end) records instead of identifiers
    #[arg(long)]
    results: bool,
}

#[derive(ClapArgs, Debug)]
struct MetadataArgs {
    /// Reader configuration file (.yaml or .json)
    #[arg(short, long, env = "METADATA_READER_CONFIG")]
    config: PathBuf,

    /// Variable to load (repeatable); lists all identifiers when omitted
    #[arg(long)]
    variable: Vec<String>,

    /// Bind parameter (repeatable, in order)
    #[arg(long)]
    param: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);
    if args.json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    match args.command {
        Command::Build(build) => run_build(build),
        Command::Search(search) => run_search(search),
        Command::Metadata(metadata) => run_metadata(metadata).await,
    }
}

fn run_build(args: BuildArgs) -> Result<()> {
    let mut config = IndexerConfig::from_env();
    if let Some(dir) = args.observations {
        config.observation_dir = dir;
    }
    if args.templates.is_some() {
        config.template_dir = args.templates;
    }
    if let Some(dir) = args.index {
        config.index_dir = dir;
    }
    info!(
        observations = %config.observation_dir.display(),
        index = %config.index_dir.display(),
        "Building observation index"
    );

    let stats = ObservationIndexer::new(config).create_index()?;
    println!("{}", serde_json::to_string(&stats)?);
    Ok(())
}

fn run_search(args: SearchArgs) -> Result<()> {
    let searcher = ObservationSearcher::open(&args.index)
        .with_context(|| format!("cannot open index at {}", args.index.display()))?;

    let mode = if args.template {
        ResponseMode::ResultTemplate
    } else {
        ResponseMode::Inline
    };
    let kind = if args.measurement {
        ObservationType::Measurement
    } else {
        ObservationType::Observation
    };
    let mut filter = ObservationFilter::observations(mode, kind);

    let offerings: Vec<Offering> = match &args.offerings {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read {}", path.display()))?;
            serde_json::from_str(&content)?
        }
        None => Vec::new(),
    };
    if !args.procedure.is_empty() || args.offerings.is_some() {
        filter.set_procedure(&args.procedure, &offerings);
    }
    filter
        .set_observed_properties(&args.property)
        .set_feature_of_interest(&args.foi);

    if let Some(time) = &args.time {
        let (relation, geometry) = parse_time_filter(time)?;
        filter.set_time_filter(relation, &geometry)?;
    }
    if let Some(bbox) = &args.bbox {
        let bbox = BoundingBox::from_bbox_string(bbox)?;
        filter.set_bounding_box(bbox);
    }
    filter.set_logical_operator(args.operator.parse::<LogicalOperator>()?);

    info!(query = %filter.query_text(), "Running filter session");

    if args.results {
        for result in filter.filter_result(&searcher)? {
            println!("{}", serde_json::to_string(&result)?);
        }
    } else {
        for id in filter.filter_observation(&searcher)? {
            println!("{}", id);
        }
    }
    Ok(())
}

/// Split `<relation>=<time>` into its parts.
fn parse_time_filter(value: &str) -> Result<(TemporalRelation, TemporalGeometry)> {
    let (relation, time) = value
        .split_once('=')
        .ok_or_else(|| anyhow!("time filter must look like <relation>=<time>: {}", value))?;
    Ok((relation.parse()?, TemporalGeometry::parse(time)?))
}

async fn run_metadata(args: MetadataArgs) -> Result<()> {
    let config = ReaderConfig::from_file(&args.config)?;
    let reader = GenericReader::connect(config).await?;

    if args.variable.is_empty() {
        for id in reader.all_identifiers().await? {
            println!("{}", id);
        }
        return Ok(());
    }

    let variables: Vec<&str> = args.variable.iter().map(String::as_str).collect();
    let params: Vec<SqlValue> = args.param.iter().map(|p| SqlValue::text(p.as_str())).collect();
    let values = reader.load_data(&variables, &params).await?;
    println!("{}", serde_json::to_string_pretty(&values)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time_filter() {
        let (relation, geometry) =
            parse_time_filter("TM_During=2020-01-01T00:00:00Z/2020-02-01T00:00:00Z").unwrap();
        assert_eq!(relation, TemporalRelation::During);
        assert!(matches!(geometry, TemporalGeometry::Period { .. }));

        let (relation, geometry) = parse_time_filter("before=2020-01-02").unwrap();
        assert_eq!(relation, TemporalRelation::Before);
        assert!(matches!(geometry, TemporalGeometry::Instant(_)));

        assert!(parse_time_filter("2020-01-02").is_err());
        assert!(parse_time_filter("TM_Overlaps=2020-01-02").is_err());
    }

    #[test]
    fn test_search_arguments() {
        let args = Args::try_parse_from([
            "sos-indexer",
            "search",
            "--procedure",
            "P1",
            "--procedure",
            "P2",
            "--bbox",
            "0,0,10,10",
            "--operator",
            "or",
            "--results",
        ])
        .unwrap();
        match args.command {
            Command::Search(search) => {
                assert_eq!(search.procedure, vec!["P1", "P2"]);
                assert!(search.results);
                assert_eq!(search.operator, "or");
            }
            other => panic!("Expected search, got {:?}", other),
        }
    }
}
