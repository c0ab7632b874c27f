use anyhow::anyhow;
use geojson::{FeatureCollection, PointType};

use crate::geofile::feature::try_for_each_position;

use super::crs_utils::WGS84;

/// PROJ needs `+type=crs` to treat a bare PROJ string as a coordinate system.
fn as_crs_definition(definition: &str) -> String {
    let definition = definition.trim();
    if definition.starts_with('+') && !definition.contains("+type=crs") {
        format!("{} +type=crs", definition)
    } else {
        definition.to_owned()
    }
}

fn project_position(projection: &proj::Proj, position: &mut PointType) -> anyhow::Result<()> {
    if position.len() < 2 {
        return Err(anyhow!(
            "Position {:?} has fewer than two ordinates",
            position
        ));
    }
    let (x, y) = projection
        .convert((position[0], position[1]))
        .map_err(|err| anyhow!("Could not project position {:?}, {}", position, err))?;
    position[0] = x;
    position[1] = y;
    Ok(())
}

/// Reproject all features from the coordinate system given by `source_definition` (a PROJ string,
/// WKT or authority code) to WGS84 longitude/latitude. Ordinates beyond x/y are left unchanged and
/// bounding boxes, which would be stale, are dropped.
pub fn reproject_to_wgs84(
    collection: &mut FeatureCollection,
    source_definition: &str,
) -> anyhow::Result<()> {
    let projection =
        proj::Proj::new_known_crs(&as_crs_definition(source_definition), WGS84, None)?;
    collection.bbox = None;
    for feature in collection.features.iter_mut() {
        feature.bbox = None;
        if let Some(geometry) = feature.geometry.as_mut() {
            geometry.bbox = None;
            try_for_each_position(&mut geometry.value, &mut |position| {
                project_position(&projection, position)
            })?;
        }
    }
    Ok(())
}
