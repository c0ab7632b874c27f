extern crate log;
pub mod config;
pub mod crs;
pub mod geofile;
pub mod minify;
pub mod pipeline;
pub mod topo;
use crate::config::{KeyMapScope, MinifyOptions, NameList, RawOptions};
use crate::minify::prune::EmptyPropertyRule;
use crate::pipeline::Orchestrator;
use anyhow::anyhow;
use clap::Parser;
use std::path::PathBuf;

/// Minify GeoJSON files: shorten property keys, drop properties, truncate numbers, filter
/// features and optionally convert to TopoJSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input files (GeoJSON or ESRI shapefile).
    sources: Vec<PathBuf>,

    /// Input file, may be repeated. Combined with the positional input files.
    #[arg(short, long = "src", value_name = "FILE")]
    src: Vec<PathBuf>,

    /// Path to a YAML config file. Command line options take precedence.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Replace property keys by short codes.
    #[arg(short, long)]
    keys: bool,

    /// Append the code to key mapping to the output as `map`.
    #[arg(short, long)]
    include_key_map: bool,

    /// Number of decimals to keep in coordinates.
    #[arg(short, long, value_name = "N")]
    coordinates: Option<u32>,

    /// Number of decimals to keep in numeric property values.
    #[arg(short, long, value_name = "N")]
    decimals: Option<u32>,

    /// Comma separated properties to keep, e.g. "name, id".
    #[arg(short, long, value_name = "LIST")]
    whitelist: Option<String>,

    /// Comma separated properties to remove, e.g. "WATER, CITY".
    #[arg(short, long, value_name = "LIST")]
    blacklist: Option<String>,

    /// Keep features matching any clause, e.g. "WATER = NO, area > 10".
    #[arg(short, long, value_name = "QUERY")]
    filter: Option<String>,

    /// Write TopoJSON instead of GeoJSON.
    #[arg(short, long)]
    topo: bool,

    /// Coordinate system of the input, e.g. 28992 or EPSG:28992. Output is WGS84.
    #[arg(short, long, value_name = "CRS")]
    reproject: Option<String>,

    /// Show progress and a size report per file.
    #[arg(short, long)]
    verbose: bool,

    /// Share one key mapping over all files or use a fresh one per file.
    #[arg(long, value_enum)]
    key_map_scope: Option<KeyMapScope>,

    /// Which property values count as empty and are removed.
    #[arg(long, value_enum)]
    prune_empty: Option<EmptyPropertyRule>,

    /// Visvalingam-Whyatt area threshold for simplifying TopoJSON arcs.
    #[arg(long, value_name = "EPSILON")]
    simplify: Option<f64>,

    /// Base URL for looking up coordinate systems that are not built in.
    #[arg(long, value_name = "URL")]
    crs_service_url: Option<String>,
}

impl From<Args> for RawOptions {
    fn from(args: Args) -> Self {
        let src: Vec<PathBuf> = args.src.into_iter().chain(args.sources).collect();
        RawOptions {
            src: (!src.is_empty()).then_some(src),
            keys: args.keys.then_some(true),
            include_key_map: args.include_key_map.then_some(true),
            coordinates: args.coordinates,
            decimals: args.decimals,
            whitelist: args.whitelist.map(NameList::Joined),
            blacklist: args.blacklist.map(NameList::Joined),
            filter: args.filter,
            topo: args.topo.then_some(true),
            reproject: args.reproject,
            verbose: args.verbose.then_some(true),
            key_map_scope: args.key_map_scope,
            prune_empty: args.prune_empty,
            simplify: args.simplify,
            crs_service_url: args.crs_service_url,
        }
    }
}

fn try_main() -> anyhow::Result<()> {
    let mut args = Args::try_parse()?;
    let file_options = match args.config.take() {
        Some(config_filepath) => RawOptions::load(&config_filepath)?,
        None => RawOptions::default(),
    };
    let (options, sources) = MinifyOptions::from_raw(file_options.merge(args.into()))?;
    log::debug!("{:?}", options);

    let mut orchestrator = Orchestrator::new(options);
    let summary = orchestrator.process_files(&sources);
    let failed = summary.failed();
    if !failed.is_empty() {
        return Err(anyhow!(
            "{} of {} files failed: {}",
            failed.len(),
            summary.outcomes.len(),
            failed
                .iter()
                .map(|outcome| outcome.input_filepath.display().to_string())
                .collect::<Vec<String>>()
                .join(", ")
        ));
    }
    log::info!("Minified {} files", summary.outcomes.len());
    Ok(())
}

fn main() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    env_logger::init();
    if let Err(e) = try_main() {
        eprintln!("Error: {:?}", e);
        std::process::exit(1)
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use std::path::PathBuf;

    use super::Args;
    use crate::config::{KeyMapScope, MinifyOptions, RawOptions};

    #[test]
    fn test_parse_command_line() {
        let args = Args::try_parse_from([
            "minify_geojson",
            "-k",
            "-i",
            "-c",
            "5",
            "-b",
            "WATER, CITY",
            "-f",
            "WATER=NO",
            "--key-map-scope",
            "file",
            "a.geojson",
            "b.json",
        ])
        .unwrap();
        let raw: RawOptions = args.into();
        let (options, sources) = MinifyOptions::from_raw(raw).unwrap();
        assert_eq!(
            sources,
            vec![PathBuf::from("a.geojson"), PathBuf::from("b.json")]
        );
        assert!(options.minify_keys);
        assert!(options.include_key_map);
        assert!(!options.topology);
        assert_eq!(options.coordinate_precision, Some(5));
        assert_eq!(
            options.blacklist,
            Some(vec!["WATER".to_string(), "CITY".to_string()])
        );
        assert_eq!(options.key_map_scope, KeyMapScope::File);
    }

    #[test]
    fn test_src_option_and_positional_sources_combine() {
        let args = Args::try_parse_from([
            "minify_geojson",
            "-s",
            "a.geojson",
            "--src",
            "b.geojson",
            "c.geojson",
        ])
        .unwrap();
        let raw: RawOptions = args.into();
        assert_eq!(
            raw.src,
            Some(vec![
                PathBuf::from("a.geojson"),
                PathBuf::from("b.geojson"),
                PathBuf::from("c.geojson"),
            ])
        );
    }

    #[test]
    fn test_unset_flags_do_not_override_config() {
        let args = Args::try_parse_from(["minify_geojson", "a.geojson"]).unwrap();
        let raw: RawOptions = args.into();
        assert_eq!(raw.keys, None);
        assert_eq!(raw.topo, None);
        let config = RawOptions {
            keys: Some(true),
            ..Default::default()
        };
        assert_eq!(config.merge(raw).keys, Some(true));
    }
}
