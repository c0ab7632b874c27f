use anyhow::{anyhow, Context};
use gdal::vector::{FieldValue, LayerAccess};
use geojson::{Feature, FeatureCollection, JsonObject, JsonValue};
use std::path::Path;

fn field_value_to_json(value: FieldValue) -> JsonValue {
    match value {
        FieldValue::IntegerValue(value) => JsonValue::from(value),
        FieldValue::Integer64Value(value) => JsonValue::from(value),
        FieldValue::RealValue(value) => JsonValue::from(value),
        FieldValue::StringValue(value) => JsonValue::from(value),
        FieldValue::IntegerListValue(values) => JsonValue::from(values),
        FieldValue::Integer64ListValue(values) => JsonValue::from(values),
        FieldValue::RealListValue(values) => JsonValue::from(values),
        FieldValue::StringListValue(values) => JsonValue::from(values),
        // Dates and date-times.
        other => other
            .into_string()
            .map(JsonValue::from)
            .unwrap_or(JsonValue::Null),
    }
}

fn gdal_geometry_to_geojson(
    gdal_feature: &gdal::vector::Feature,
) -> anyhow::Result<Option<geojson::Geometry>> {
    // Null shapes have no geometry reference at all.
    let Ok(gdal_geometry) = gdal_feature.geometry_by_index(0) else {
        return Ok(None);
    };
    let geometry_json = gdal_geometry.json()?;
    let geometry = serde_json::from_str(&geometry_json)
        .with_context(|| format!("Converting GDAL geometry {}", geometry_json))?;
    Ok(Some(geometry))
}

fn gdal_feature_to_geojson(gdal_feature: &gdal::vector::Feature) -> anyhow::Result<Feature> {
    let geometry = gdal_geometry_to_geojson(gdal_feature)?;

    let properties: JsonObject = gdal_feature
        .fields()
        .map(|(name, value)| (name, value.map_or(JsonValue::Null, field_value_to_json)))
        .collect();

    Ok(Feature {
        bbox: None,
        geometry,
        id: None,
        properties: Some(properties),
        foreign_members: None,
    })
}

/// Read all features of a single-layer vector file (e.g. an ESRI shapefile) into a GeoJSON
/// feature collection. Coordinates are returned as stored, without reprojection.
pub fn read_features_from_geofile(filepath: &Path) -> anyhow::Result<FeatureCollection> {
    gdal::DriverManager::register_all();
    let mut open_options = gdal::DatasetOptions::default();
    open_options.open_flags = gdal::GdalOpenFlags::GDAL_OF_VECTOR;
    let dataset = gdal::Dataset::open_ex(filepath, open_options)
        .with_context(|| format!("Opening {}", filepath.display()))?;

    let layer_count = dataset.layer_count();
    if 0 == layer_count || 1 < layer_count {
        return Err(anyhow!(
            "Found {} layers, only one layer is supported.",
            layer_count
        ));
    }
    let mut layer = dataset.layer(0)?;
    let features = layer
        .features()
        .map(|gdal_feature| gdal_feature_to_geojson(&gdal_feature))
        .collect::<anyhow::Result<Vec<Feature>>>()?;
    log::debug!(
        "Read {} features from {}",
        features.len(),
        filepath.display()
    );
    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

#[cfg(test)]
mod tests {
    use gdal::vector::{FieldValue, LayerAccess, OGRFieldType};
    use geojson::Value;
    use rstest::rstest;
    use serde_json::json;
    use testdir::testdir;

    use super::read_features_from_geofile;

    #[rstest]
    #[ignore = "needs a GDAL installation"]
    fn test_shapefile_write_read_round_trip() {
        let test_dir = testdir!();
        let shapefile_filepath = test_dir.join("points.shp");
        {
            let driver = gdal::DriverManager::get_driver_by_name("ESRI Shapefile").unwrap();
            let mut dataset = driver.create_vector_only(&shapefile_filepath).unwrap();
            let mut layer = dataset
                .create_layer(gdal::LayerOptions {
                    name: "points",
                    srs: None,
                    ty: gdal::vector::OGRwkbGeometryType::wkbPoint,
                    options: None,
                })
                .unwrap();
            layer
                .create_defn_fields(&[
                    ("name", OGRFieldType::OFTString),
                    ("height", OGRFieldType::OFTReal),
                ])
                .unwrap();
            layer
                .create_feature_fields(
                    gdal::vector::Geometry::from_wkt("POINT (4.5 52.25)").unwrap(),
                    &["name", "height"],
                    &[
                        FieldValue::StringValue("Dam".to_string()),
                        FieldValue::RealValue(3.5),
                    ],
                )
                .unwrap();
            let null_shape = gdal::vector::Feature::new(layer.defn()).unwrap();
            null_shape.set_field_string("name", "Nowhere").unwrap();
            null_shape.create(&layer).unwrap();
        }

        let collection = read_features_from_geofile(&shapefile_filepath).unwrap();
        assert_eq!(collection.features.len(), 2);
        assert!(collection.features[1].geometry.is_none());
        assert_eq!(collection.features[1].property("name"), Some(&json!("Nowhere")));
        let feature = &collection.features[0];
        assert_eq!(
            feature.geometry.as_ref().unwrap().value,
            Value::Point(vec![4.5, 52.25])
        );
        assert_eq!(feature.property("name"), Some(&json!("Dam")));
        assert_eq!(feature.property("height"), Some(&json!(3.5)));
    }
}
