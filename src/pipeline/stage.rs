use geojson::Feature;

use crate::{
    config::MinifyOptions,
    minify::{
        key_minifier::KeyMinifier,
        property_filter::FilterQuery,
        prune::{EmptyPropertyPruner, Pruner},
        truncate::{truncate_coordinates, truncate_property_values},
    },
};

/// One step of the feature pipeline: consumes a feature and yields it transformed, or `None` to
/// drop it from the output.
pub trait Stage {
    fn name(&self) -> &'static str;

    fn process(&mut self, feature: Feature) -> anyhow::Result<Option<Feature>>;
}

impl Stage for EmptyPropertyPruner {
    fn name(&self) -> &'static str {
        "prune-empty-properties"
    }

    fn process(&mut self, mut feature: Feature) -> anyhow::Result<Option<Feature>> {
        feature.properties = self.prune(feature.properties.take());
        Ok(Some(feature))
    }
}

pub struct PropertyFilter {
    query: FilterQuery,
}

impl Stage for PropertyFilter {
    fn name(&self) -> &'static str {
        "property-filter"
    }

    fn process(&mut self, feature: Feature) -> anyhow::Result<Option<Feature>> {
        if self.query.matches(feature.properties.as_ref()) {
            Ok(Some(feature))
        } else {
            Ok(None)
        }
    }
}

pub struct TruncateCoordinates {
    digits: u32,
}

impl Stage for TruncateCoordinates {
    fn name(&self) -> &'static str {
        "truncate-coordinates"
    }

    fn process(&mut self, mut feature: Feature) -> anyhow::Result<Option<Feature>> {
        if let Some(geometry) = feature.geometry.as_mut() {
            truncate_coordinates(geometry, self.digits);
        }
        Ok(Some(feature))
    }
}

pub struct TruncatePropertyValues {
    digits: u32,
}

impl Stage for TruncatePropertyValues {
    fn name(&self) -> &'static str {
        "truncate-property-values"
    }

    fn process(&mut self, mut feature: Feature) -> anyhow::Result<Option<Feature>> {
        if let Some(properties) = feature.properties.as_mut() {
            truncate_property_values(properties, self.digits);
        }
        Ok(Some(feature))
    }
}

pub struct BlackWhiteList {
    pruner: Pruner,
}

impl Stage for BlackWhiteList {
    fn name(&self) -> &'static str {
        "black-white-list"
    }

    fn process(&mut self, mut feature: Feature) -> anyhow::Result<Option<Feature>> {
        feature.properties = feature
            .properties
            .take()
            .map(|properties| self.pruner.prune(properties));
        Ok(Some(feature))
    }
}

/// Renames property keys through a key minifier owned by the caller, so that the mapping can
/// outlive the chain and be shared between files.
pub struct SimplifyKeys<'a> {
    minifier: &'a mut KeyMinifier,
}

impl<'a> Stage for SimplifyKeys<'a> {
    fn name(&self) -> &'static str {
        "simplify-keys"
    }

    fn process(&mut self, mut feature: Feature) -> anyhow::Result<Option<Feature>> {
        feature.properties = feature
            .properties
            .take()
            .map(|properties| self.minifier.minify_properties(properties));
        Ok(Some(feature))
    }
}

/// The ordered transform stages between parsing and serialization. Empty properties are always
/// pruned first; the other stages are present depending on the options, always in the order
/// filter, coordinates, property values, black/whitelist, keys.
pub struct TransformChain<'a> {
    prune_empty: EmptyPropertyPruner,
    stages: Vec<Box<dyn Stage + 'a>>,
}

impl<'a> TransformChain<'a> {
    pub fn for_streaming(options: &MinifyOptions, minifier: &'a mut KeyMinifier) -> Self {
        Self::build(options, minifier, true)
    }

    /// Like the streaming chain, minus coordinate truncation: batch output rounds coordinates
    /// while serializing.
    pub fn for_batch(options: &MinifyOptions, minifier: &'a mut KeyMinifier) -> Self {
        Self::build(options, minifier, false)
    }

    fn build(
        options: &MinifyOptions,
        minifier: &'a mut KeyMinifier,
        with_coordinate_stage: bool,
    ) -> Self {
        let mut stages: Vec<Box<dyn Stage + 'a>> = Vec::new();
        if let Some(query) = &options.filter {
            log::debug!("Keeping features where {}", query);
            stages.push(Box::new(PropertyFilter {
                query: query.clone(),
            }));
        }
        if with_coordinate_stage {
            if let Some(digits) = options.coordinate_precision {
                stages.push(Box::new(TruncateCoordinates { digits }));
            }
        }
        if let Some(digits) = options.decimal_precision {
            stages.push(Box::new(TruncatePropertyValues { digits }));
        }
        let pruner = Pruner::new(options.blacklist.as_ref(), options.whitelist.as_ref());
        if pruner.is_active() {
            stages.push(Box::new(BlackWhiteList { pruner }));
        }
        if options.minify_keys {
            stages.push(Box::new(SimplifyKeys { minifier }));
        }
        Self {
            prune_empty: EmptyPropertyPruner::new(options.prune_empty),
            stages,
        }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        std::iter::once(self.prune_empty.name())
            .chain(self.stages.iter().map(|stage| stage.name()))
            .collect()
    }

    /// Number of features that entered the chain.
    pub fn features_seen(&self) -> usize {
        self.prune_empty.count()
    }

    pub fn apply(&mut self, feature: Feature) -> anyhow::Result<Option<Feature>> {
        let Some(mut feature) = self.prune_empty.process(feature)? else {
            return Ok(None);
        };
        for stage in self.stages.iter_mut() {
            match stage.process(feature)? {
                Some(transformed) => feature = transformed,
                None => return Ok(None),
            }
        }
        Ok(Some(feature))
    }
}
