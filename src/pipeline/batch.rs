use std::path::Path;

use geojson::{FeatureCollection, JsonValue};
use indicatif::ProgressBar;

use crate::{
    config::MinifyOptions,
    crs::{
        crs_utils::{CrsResolver, WGS84},
        reproject::reproject_to_wgs84,
    },
    geofile::{
        gdal_geofile::read_features_from_geofile,
        geojson::{read_feature_collection, write_json},
    },
    minify::{key_minifier::KeyMinifier, truncate::round_array_numbers},
    topo::topology::feature_collection_to_topology,
};

use super::{stage::TransformChain, InputFormat};

pub fn load_collection(
    input_filepath: &Path,
    input_format: InputFormat,
) -> anyhow::Result<FeatureCollection> {
    match input_format {
        InputFormat::GeoJson => read_feature_collection(input_filepath),
        InputFormat::Shapefile => read_features_from_geofile(input_filepath),
    }
}

/// Minify a complete feature collection: reproject, transform every feature, then either convert
/// to a topology or round the coordinates while serializing.
pub fn minify_collection(
    mut collection: FeatureCollection,
    options: &MinifyOptions,
    minifier: &mut KeyMinifier,
    crs_resolver: &mut CrsResolver,
    progress: &ProgressBar,
) -> anyhow::Result<JsonValue> {
    if let Some(source_crs) = options.reproject.as_deref() {
        if source_crs != WGS84 {
            log::info!("Reprojecting from {} to WGS84", source_crs);
            let definition = crs_resolver.resolve(source_crs)?;
            reproject_to_wgs84(&mut collection, &definition)?;
        }
    }

    progress.set_length(collection.features.len() as u64);
    let features_read = collection.features.len();
    {
        let mut chain = TransformChain::for_batch(options, minifier);
        log::debug!("Transforming through {}", chain.stage_names().join(" -> "));
        let mut features = Vec::with_capacity(features_read);
        for feature in collection.features.drain(..) {
            if let Some(feature) = chain.apply(feature)? {
                features.push(feature);
            }
            progress.inc(1);
        }
        collection.features = features;
    }
    log::debug!(
        "Kept {} of {} features",
        collection.features.len(),
        features_read
    );
    let key_map = options.include_key_map.then(|| minifier.key_map());

    if options.topology {
        log::info!("Converting to TopoJSON");
        let topology = feature_collection_to_topology(&collection, options.simplify);
        return Ok(topology.to_json(key_map));
    }

    if let Some(key_map) = key_map {
        collection
            .foreign_members
            .get_or_insert_with(Default::default)
            .insert("map".to_string(), JsonValue::Object(key_map));
    }
    let mut document = serde_json::to_value(&collection)?;
    if let Some(digits) = options.coordinate_precision.filter(|digits| *digits > 0) {
        round_array_numbers(&mut document, digits);
    }
    Ok(document)
}

pub fn minify_file(
    input_filepath: &Path,
    input_format: InputFormat,
    output_filepath: &Path,
    options: &MinifyOptions,
    minifier: &mut KeyMinifier,
    crs_resolver: &mut CrsResolver,
    progress: &ProgressBar,
) -> anyhow::Result<()> {
    let collection = load_collection(input_filepath, input_format)?;
    let document = minify_collection(collection, options, minifier, crs_resolver, progress)?;
    write_json(&document, output_filepath)
}
