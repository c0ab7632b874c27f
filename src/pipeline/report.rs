use std::{
    fmt,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use geojson::JsonObject;
use indicatif::HumanCount;

/// Size reduction achieved for one input file.
#[derive(Debug, Clone, PartialEq)]
pub struct ReductionReport {
    pub input_filepath: PathBuf,
    pub output_filepath: PathBuf,
    pub input_size: u64,
    pub output_size: u64,
    pub feature_count: Option<usize>,
    pub key_map: Option<JsonObject>,
}

impl ReductionReport {
    pub fn from_files(
        input_filepath: &Path,
        output_filepath: &Path,
        feature_count: Option<usize>,
        key_map: Option<JsonObject>,
    ) -> anyhow::Result<Self> {
        let input_size = fs::metadata(input_filepath)
            .with_context(|| format!("Reading size of {}", input_filepath.display()))?
            .len();
        let output_size = fs::metadata(output_filepath)
            .with_context(|| format!("Reading size of {}", output_filepath.display()))?
            .len();
        Ok(Self {
            input_filepath: input_filepath.to_path_buf(),
            output_filepath: output_filepath.to_path_buf(),
            input_size,
            output_size,
            feature_count,
            key_map,
        })
    }

    /// Percentage by which the output is smaller than the input; negative when it grew.
    pub fn reduction_percentage(&self) -> f64 {
        if self.input_size == 0 {
            return 0.0;
        }
        100.0 * (self.input_size as f64 - self.output_size as f64) / self.input_size as f64
    }
}

impl fmt::Display for ReductionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.input_filepath.display())?;
        if let Some(feature_count) = self.feature_count {
            write!(f, " with {} features", feature_count)?;
        }
        writeln!(
            f,
            " minified successfully to {}.",
            self.output_filepath.display()
        )?;
        if let Some(key_map) = &self.key_map {
            let pretty = serde_json::to_string_pretty(key_map).map_err(|_| fmt::Error)?;
            writeln!(f, "Key mapping:")?;
            writeln!(f, "{}", pretty)?;
        }
        writeln!(
            f,
            "Original size :\t{}",
            HumanCount(self.input_size)
        )?;
        writeln!(
            f,
            "Minified size :\t{}",
            HumanCount(self.output_size)
        )?;
        write!(f, "Reduction :   \t{:.2}%", self.reduction_percentage())
    }
}
