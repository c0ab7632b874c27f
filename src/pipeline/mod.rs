pub mod batch;
pub mod report;
pub mod stage;
pub mod streaming;

use std::path::{Path, PathBuf};

use anyhow::anyhow;
use indicatif::ProgressBar;

use crate::{
    config::{KeyMapScope, MinifyOptions},
    crs::crs_utils::CrsResolver,
    minify::key_minifier::KeyMinifier,
};

use report::ReductionReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    GeoJson,
    Shapefile,
}

impl InputFormat {
    /// Recognized by a (case insensitive) extension ending in `json` or `shp`.
    pub fn from_path(filepath: &Path) -> anyhow::Result<Self> {
        let extension = filepath
            .extension()
            .and_then(|extension| extension.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        if extension.ends_with("json") {
            Ok(InputFormat::GeoJson)
        } else if extension.ends_with("shp") {
            Ok(InputFormat::Shapefile)
        } else {
            Err(anyhow!(
                "Unsupported input file {}, expected GeoJSON or a shapefile",
                filepath.display()
            ))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Batch,
    Streaming,
}

impl Mode {
    pub fn select(options: &MinifyOptions, input_format: InputFormat) -> Self {
        if options.requires_batch() || input_format == InputFormat::Shapefile {
            Mode::Batch
        } else {
            Mode::Streaming
        }
    }
}

/// `name.geojson` becomes `name.min.geojson`, or `name.min.topojson` for topology output.
pub fn output_filepath(input_filepath: &Path, topology: bool) -> PathBuf {
    if topology {
        input_filepath.with_extension("min.topojson")
    } else {
        input_filepath.with_extension("min.geojson")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Configuring,
    Running,
    Completed,
    Failed,
}

struct FileRun<'a> {
    input_filepath: &'a Path,
    state: RunState,
}

impl<'a> FileRun<'a> {
    fn new(input_filepath: &'a Path) -> Self {
        Self {
            input_filepath,
            state: RunState::Idle,
        }
    }

    fn transition(&mut self, state: RunState) {
        log::debug!(
            "{}: {:?} -> {:?}",
            self.input_filepath.display(),
            self.state,
            state
        );
        self.state = state;
    }
}

#[derive(Debug)]
pub struct FileOutcome {
    pub input_filepath: PathBuf,
    pub state: RunState,
    pub report: Option<ReductionReport>,
    pub error: Option<anyhow::Error>,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<FileOutcome>,
}

impl RunSummary {
    pub fn failed(&self) -> Vec<&FileOutcome> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.state == RunState::Failed)
            .collect()
    }
}

/// Runs the minification of a list of files. A failing file is logged and skipped; the remaining
/// files are still processed.
pub struct Orchestrator {
    options: MinifyOptions,
    run_minifier: KeyMinifier,
    crs_resolver: CrsResolver,
}

impl Orchestrator {
    pub fn new(options: MinifyOptions) -> Self {
        let crs_resolver = CrsResolver::new(&options.crs_service_url);
        Self {
            options,
            run_minifier: KeyMinifier::new(),
            crs_resolver,
        }
    }

    fn progress_bar(&self, mode: Mode) -> ProgressBar {
        if !self.options.verbose {
            return ProgressBar::hidden();
        }
        match mode {
            Mode::Batch => ProgressBar::new(0),
            Mode::Streaming => ProgressBar::new_spinner(),
        }
    }

    fn run_file(
        &mut self,
        input_filepath: &Path,
        run: &mut FileRun,
    ) -> anyhow::Result<ReductionReport> {
        run.transition(RunState::Configuring);
        if !input_filepath.is_file() {
            return Err(anyhow!("Input file {} not found", input_filepath.display()));
        }
        let input_format = InputFormat::from_path(input_filepath)?;
        let mode = Mode::select(&self.options, input_format);
        let output_filepath = output_filepath(input_filepath, self.options.topology);
        let progress = self.progress_bar(mode);
        let mut file_minifier = KeyMinifier::new();
        let minifier = match self.options.key_map_scope {
            KeyMapScope::Run => &mut self.run_minifier,
            KeyMapScope::File => &mut file_minifier,
        };

        run.transition(RunState::Running);
        log::info!(
            "Minifying {} in {:?} mode",
            input_filepath.display(),
            mode
        );
        let feature_count = match mode {
            Mode::Streaming => {
                let outcome = streaming::minify_file(
                    input_filepath,
                    &output_filepath,
                    &self.options,
                    minifier,
                    &progress,
                )?;
                log::debug!(
                    "Wrote {} of {} features",
                    outcome.features_written,
                    outcome.features_read
                );
                Some(outcome.features_read)
            }
            Mode::Batch => {
                batch::minify_file(
                    input_filepath,
                    input_format,
                    &output_filepath,
                    &self.options,
                    minifier,
                    &mut self.crs_resolver,
                    &progress,
                )?;
                None
            }
        };
        progress.finish_and_clear();
        log::debug!("{} property keys mapped so far", minifier.len());

        let key_map = self.options.minify_keys.then(|| minifier.key_map());
        ReductionReport::from_files(input_filepath, &output_filepath, feature_count, key_map)
    }

    pub fn process_file(&mut self, input_filepath: &Path) -> FileOutcome {
        let mut run = FileRun::new(input_filepath);
        let result = self.run_file(input_filepath, &mut run);
        match result {
            Ok(report) => {
                run.transition(RunState::Completed);
                if self.options.verbose {
                    log::info!("{}", report);
                }
                FileOutcome {
                    input_filepath: input_filepath.to_path_buf(),
                    state: run.state,
                    report: Some(report),
                    error: None,
                }
            }
            Err(error) => {
                run.transition(RunState::Failed);
                log::error!("Minifying {} failed: {:?}", input_filepath.display(), error);
                FileOutcome {
                    input_filepath: input_filepath.to_path_buf(),
                    state: run.state,
                    report: None,
                    error: Some(error),
                }
            }
        }
    }

    pub fn process_files(&mut self, input_filepaths: &[PathBuf]) -> RunSummary {
        let outcomes = input_filepaths
            .iter()
            .map(|input_filepath| self.process_file(input_filepath))
            .collect();
        RunSummary { outcomes }
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use rstest::rstest;
    use serde_json::json;
    use testdir::testdir;

    use crate::config::{KeyMapScope, MinifyOptions};

    use super::{output_filepath, InputFormat, Mode, Orchestrator, RunState};

    #[rstest]
    #[case("data/roads.geojson", false, "data/roads.min.geojson")]
    #[case("data/roads.json", true, "data/roads.min.topojson")]
    #[case("data/roads.shp", false, "data/roads.min.geojson")]
    fn test_output_filepath(#[case] input: &str, #[case] topology: bool, #[case] expected: &str) {
        assert_eq!(
            output_filepath(Path::new(input), topology),
            PathBuf::from(expected)
        );
    }

    #[rstest]
    #[case("a.geojson", Some(InputFormat::GeoJson))]
    #[case("a.JSON", Some(InputFormat::GeoJson))]
    #[case("a.topojson", Some(InputFormat::GeoJson))]
    #[case("a.SHP", Some(InputFormat::Shapefile))]
    #[case("a.txt", None)]
    #[case("a", None)]
    fn test_input_format(#[case] input: &str, #[case] expected: Option<InputFormat>) {
        assert_eq!(InputFormat::from_path(Path::new(input)).ok(), expected);
    }

    #[test]
    fn test_mode_selection() {
        let streaming = MinifyOptions::default();
        assert_eq!(Mode::select(&streaming, InputFormat::GeoJson), Mode::Streaming);
        assert_eq!(Mode::select(&streaming, InputFormat::Shapefile), Mode::Batch);
        let topology = MinifyOptions {
            topology: true,
            ..Default::default()
        };
        assert_eq!(Mode::select(&topology, InputFormat::GeoJson), Mode::Batch);
    }

    fn write_collection(filepath: &Path, names: &[&str]) {
        let features: Vec<serde_json::Value> = names
            .iter()
            .map(|name| {
                json!({
                    "type": "Feature",
                    "geometry": {"type": "Point", "coordinates": [1.0, 2.0]},
                    "properties": {"name": name, "kind": "city"}
                })
            })
            .collect();
        std::fs::write(
            filepath,
            json!({"type": "FeatureCollection", "features": features}).to_string(),
        )
        .unwrap();
    }

    #[test]
    fn test_failing_file_does_not_stop_the_run() {
        let test_dir = testdir!();
        let broken_filepath = test_dir.join("broken.geojson");
        std::fs::write(&broken_filepath, r#"{"type":"FeatureCollection","features":[{"#).unwrap();
        let valid_filepath = test_dir.join("valid.geojson");
        write_collection(&valid_filepath, &["Amsterdam", "Utrecht"]);

        let mut orchestrator = Orchestrator::new(MinifyOptions {
            minify_keys: true,
            include_key_map: true,
            ..Default::default()
        });
        let summary = orchestrator.process_files(&[
            broken_filepath.clone(),
            test_dir.join("missing.geojson"),
            valid_filepath.clone(),
        ]);

        let failed: Vec<&PathBuf> = summary
            .failed()
            .iter()
            .map(|outcome| &outcome.input_filepath)
            .collect();
        assert_eq!(failed, vec![&broken_filepath, &test_dir.join("missing.geojson")]);
        assert!(summary.failed()[0].error.is_some());

        let valid = &summary.outcomes[2];
        assert_eq!(valid.state, RunState::Completed);
        let report = valid.report.as_ref().unwrap();
        assert_eq!(report.feature_count, Some(2));
        assert_eq!(report.key_map.as_ref().unwrap().len(), 2);

        let output: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(test_dir.join("valid.min.geojson")).unwrap(),
        )
        .unwrap();
        assert_eq!(output["features"].as_array().unwrap().len(), 2);
        assert_eq!(output["features"][1]["properties"]["n"], "Utrecht");
        assert_eq!(output["map"], json!({"n": "name", "k": "kind"}));
    }

    #[rstest]
    #[case(KeyMapScope::Run, json!({"n": "name", "k": "kind", "a": "area"}))]
    #[case(KeyMapScope::File, json!({"a": "area", "k": "kind", "n": "name"}))]
    fn test_key_map_scope(#[case] key_map_scope: KeyMapScope, #[case] second_map: serde_json::Value) {
        let test_dir = testdir!();
        let first_filepath = test_dir.join("first.geojson");
        write_collection(&first_filepath, &["Amsterdam"]);
        let second_filepath = test_dir.join("second.geojson");
        std::fs::write(
            &second_filepath,
            json!({"type": "FeatureCollection", "features": [{
                "type": "Feature",
                "geometry": null,
                "properties": {"area": 12, "kind": "town", "name": "Zeist"}
            }]})
            .to_string(),
        )
        .unwrap();

        let mut orchestrator = Orchestrator::new(MinifyOptions {
            minify_keys: true,
            include_key_map: true,
            key_map_scope,
            ..Default::default()
        });
        let summary = orchestrator.process_files(&[first_filepath, second_filepath]);
        assert!(summary.failed().is_empty());

        let output: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(test_dir.join("second.min.geojson")).unwrap(),
        )
        .unwrap();
        assert_eq!(output["map"], second_map);
    }
}
