use std::{
    fs::read_to_string,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context};
use serde::Deserialize;

use crate::{
    crs::crs_utils::{normalize_crs_name, DEFAULT_CRS_SERVICE_URL},
    minify::{property_filter::FilterQuery, prune::EmptyPropertyRule},
};

/// Lifetime of the key mapping when several files are minified in one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum KeyMapScope {
    /// One mapping shared by all input files.
    #[default]
    Run,
    /// A fresh mapping per input file.
    File,
}

/// Property names, either as a YAML list or as a comma separated string.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum NameList {
    Joined(String),
    Names(Vec<String>),
}

impl NameList {
    pub fn names(&self) -> Vec<String> {
        match self {
            NameList::Joined(joined) => split_names(joined),
            NameList::Names(names) => names
                .iter()
                .map(|name| name.trim().to_owned())
                .filter(|name| !name.is_empty())
                .collect(),
        }
    }
}

pub fn split_names(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Unvalidated options as given in a config file or on the command line. Every field is optional
/// so that command line values can be layered over the config file.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RawOptions {
    pub src: Option<Vec<PathBuf>>,
    pub keys: Option<bool>,
    pub include_key_map: Option<bool>,
    pub coordinates: Option<u32>,
    pub decimals: Option<u32>,
    pub whitelist: Option<NameList>,
    pub blacklist: Option<NameList>,
    pub filter: Option<String>,
    pub topo: Option<bool>,
    pub reproject: Option<String>,
    pub verbose: Option<bool>,
    pub key_map_scope: Option<KeyMapScope>,
    pub prune_empty: Option<EmptyPropertyRule>,
    pub simplify: Option<f64>,
    pub crs_service_url: Option<String>,
}

impl RawOptions {
    pub fn load(config_filepath: &Path) -> anyhow::Result<Self> {
        if !config_filepath.exists() {
            return Err(anyhow!(
                "Config file {} not found",
                config_filepath.display()
            ));
        }
        let config_contents = read_to_string(config_filepath)?;
        serde_yaml::from_str(&config_contents)
            .with_context(|| format!("Parsing config file {}", config_filepath.display()))
    }

    /// Layer `overrides` on top of `self`; values set in `overrides` win. Source lists are joined.
    pub fn merge(self, overrides: RawOptions) -> RawOptions {
        let src = match (self.src, overrides.src) {
            (Some(mut base), Some(extra)) => {
                base.extend(extra);
                Some(base)
            }
            (base, extra) => extra.or(base),
        };
        RawOptions {
            src,
            keys: overrides.keys.or(self.keys),
            include_key_map: overrides.include_key_map.or(self.include_key_map),
            coordinates: overrides.coordinates.or(self.coordinates),
            decimals: overrides.decimals.or(self.decimals),
            whitelist: overrides.whitelist.or(self.whitelist),
            blacklist: overrides.blacklist.or(self.blacklist),
            filter: overrides.filter.or(self.filter),
            topo: overrides.topo.or(self.topo),
            reproject: overrides.reproject.or(self.reproject),
            verbose: overrides.verbose.or(self.verbose),
            key_map_scope: overrides.key_map_scope.or(self.key_map_scope),
            prune_empty: overrides.prune_empty.or(self.prune_empty),
            simplify: overrides.simplify.or(self.simplify),
            crs_service_url: overrides.crs_service_url.or(self.crs_service_url),
        }
    }
}

/// Validated processing options shared by every file of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct MinifyOptions {
    pub minify_keys: bool,
    pub include_key_map: bool,
    pub coordinate_precision: Option<u32>,
    pub decimal_precision: Option<u32>,
    pub whitelist: Option<Vec<String>>,
    pub blacklist: Option<Vec<String>>,
    pub filter: Option<FilterQuery>,
    pub topology: bool,
    /// Normalized identifier of the input coordinate system.
    pub reproject: Option<String>,
    pub verbose: bool,
    pub key_map_scope: KeyMapScope,
    pub prune_empty: EmptyPropertyRule,
    pub simplify: Option<f64>,
    pub crs_service_url: String,
}

impl Default for MinifyOptions {
    fn default() -> Self {
        Self {
            minify_keys: false,
            include_key_map: false,
            coordinate_precision: None,
            decimal_precision: None,
            whitelist: None,
            blacklist: None,
            filter: None,
            topology: false,
            reproject: None,
            verbose: false,
            key_map_scope: KeyMapScope::default(),
            prune_empty: EmptyPropertyRule::default(),
            simplify: None,
            crs_service_url: DEFAULT_CRS_SERVICE_URL.to_owned(),
        }
    }
}

impl MinifyOptions {
    /// Validate raw options. Returns the options together with the source files to process.
    pub fn from_raw(raw: RawOptions) -> anyhow::Result<(Self, Vec<PathBuf>)> {
        let sources = raw.src.unwrap_or_default();
        if sources.is_empty() {
            return Err(anyhow!("No source specified"));
        }
        let minify_keys = raw.keys.unwrap_or(false);
        let include_key_map = raw.include_key_map.unwrap_or(false);
        if include_key_map && !minify_keys {
            log::warn!("Including the key map requires minifying the keys too, ignoring it");
        }
        if let Some(simplify) = raw.simplify {
            if !simplify.is_finite() || simplify < 0.0 {
                return Err(anyhow!(
                    "Simplification threshold must be a non-negative number, got {}",
                    simplify
                ));
            }
        }
        let filter = raw
            .filter
            .as_deref()
            .map(FilterQuery::parse)
            .transpose()?;
        let reproject = raw
            .reproject
            .as_deref()
            .map(normalize_crs_name)
            .transpose()?;

        let options = MinifyOptions {
            minify_keys,
            include_key_map: include_key_map && minify_keys,
            coordinate_precision: raw.coordinates,
            decimal_precision: raw.decimals,
            whitelist: raw.whitelist.map(|names| names.names()),
            blacklist: raw.blacklist.map(|names| names.names()),
            filter,
            topology: raw.topo.unwrap_or(false),
            reproject,
            verbose: raw.verbose.unwrap_or(false),
            key_map_scope: raw.key_map_scope.unwrap_or_default(),
            prune_empty: raw.prune_empty.unwrap_or_default(),
            simplify: raw.simplify.filter(|simplify| *simplify > 0.0),
            crs_service_url: raw
                .crs_service_url
                .unwrap_or_else(|| DEFAULT_CRS_SERVICE_URL.to_owned()),
        };
        Ok((options, sources))
    }

    /// Topology conversion and reprojection need the complete collection in memory.
    pub fn requires_batch(&self) -> bool {
        self.topology || self.reproject.is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use testdir::testdir;

    use super::{split_names, KeyMapScope, MinifyOptions, NameList, RawOptions};
    use crate::minify::prune::EmptyPropertyRule;

    #[test]
    fn test_split_names() {
        assert_eq!(
            split_names(" property1, property2 ,,"),
            vec!["property1".to_string(), "property2".to_string()]
        );
    }

    #[test]
    fn test_load_yaml_config() {
        let config_filepath = testdir!().join("config.yaml");
        std::fs::write(
            &config_filepath,
            "src: [a.geojson]\n\
             keys: true\n\
             coordinates: 5\n\
             whitelist: [name, \" id \"]\n\
             blacklist: \"WATER, CITY\"\n\
             filter: \"WATER = NO\"\n\
             key_map_scope: file\n\
             prune_empty: falsy\n",
        )
        .unwrap();
        let raw = RawOptions::load(&config_filepath).unwrap();
        assert_eq!(
            raw.blacklist,
            Some(NameList::Joined("WATER, CITY".to_string()))
        );

        let (options, sources) = MinifyOptions::from_raw(raw).unwrap();
        assert_eq!(sources, vec![PathBuf::from("a.geojson")]);
        assert!(options.minify_keys);
        assert_eq!(options.coordinate_precision, Some(5));
        assert_eq!(
            options.whitelist,
            Some(vec!["name".to_string(), "id".to_string()])
        );
        assert_eq!(
            options.blacklist,
            Some(vec!["WATER".to_string(), "CITY".to_string()])
        );
        assert_eq!(options.filter.unwrap().predicates().len(), 1);
        assert_eq!(options.key_map_scope, KeyMapScope::File);
        assert_eq!(options.prune_empty, EmptyPropertyRule::Falsy);
    }

    #[test]
    fn test_unknown_config_fields_are_rejected() {
        let config_filepath = testdir!().join("config.yaml");
        std::fs::write(&config_filepath, "keyz: true\n").unwrap();
        assert!(RawOptions::load(&config_filepath).is_err());
    }

    #[test]
    fn test_command_line_overrides_config() {
        let config = RawOptions {
            src: Some(vec![PathBuf::from("a.geojson")]),
            keys: Some(true),
            coordinates: Some(5),
            reproject: Some("28992".to_string()),
            ..Default::default()
        };
        let command_line = RawOptions {
            src: Some(vec![PathBuf::from("b.geojson")]),
            coordinates: Some(3),
            ..Default::default()
        };
        let (options, sources) = MinifyOptions::from_raw(config.merge(command_line)).unwrap();
        assert_eq!(
            sources,
            vec![PathBuf::from("a.geojson"), PathBuf::from("b.geojson")]
        );
        assert!(options.minify_keys);
        assert_eq!(options.coordinate_precision, Some(3));
        assert_eq!(options.reproject.as_deref(), Some("EPSG:28992"));
        assert!(options.requires_batch());
    }

    #[test]
    fn test_invalid_options() {
        let without_sources = RawOptions::default();
        assert!(MinifyOptions::from_raw(without_sources).is_err());

        let bad_filter = RawOptions {
            src: Some(vec![PathBuf::from("a.geojson")]),
            filter: Some("WATER ~ NO".to_string()),
            ..Default::default()
        };
        assert!(MinifyOptions::from_raw(bad_filter).is_err());
    }

    #[test]
    fn test_key_map_requires_keys() {
        let raw = RawOptions {
            src: Some(vec![PathBuf::from("a.geojson")]),
            include_key_map: Some(true),
            ..Default::default()
        };
        let (options, _) = MinifyOptions::from_raw(raw).unwrap();
        assert!(!options.include_key_map);
        assert!(!options.requires_batch());
    }
}
