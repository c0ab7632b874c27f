use std::convert::Infallible;

use geojson::{JsonObject, JsonValue, PointType};

/// Property bag of a feature. Keys keep the order in which they appear in the input document.
pub type Properties = JsonObject;

/// Visit every position of a geometry, descending into multi-geometries and collections.
pub fn try_for_each_position<E, F>(value: &mut geojson::Value, visit: &mut F) -> Result<(), E>
where
    F: FnMut(&mut PointType) -> Result<(), E>,
{
    use geojson::Value::*;
    match value {
        Point(position) => visit(position),
        MultiPoint(positions) | LineString(positions) => positions.iter_mut().try_for_each(visit),
        MultiLineString(lines) | Polygon(lines) => lines
            .iter_mut()
            .flatten()
            .try_for_each(visit),
        MultiPolygon(polygons) => polygons
            .iter_mut()
            .flatten()
            .flatten()
            .try_for_each(visit),
        GeometryCollection(geometries) => geometries
            .iter_mut()
            .try_for_each(|geometry| try_for_each_position(&mut geometry.value, &mut *visit)),
    }
}

/// Infallible variant of `try_for_each_position`.
pub fn for_each_position<F>(value: &mut geojson::Value, mut visit: F)
where
    F: FnMut(&mut PointType),
{
    let visited = try_for_each_position(value, &mut |position| {
        visit(position);
        Ok::<(), Infallible>(())
    });
    match visited {
        Ok(()) => {}
        Err(never) => match never {},
    }
}

/// Parse a decimal number from a trimmed string, rejecting empty strings and the textual infinities/NaN
/// that `f64::from_str` would otherwise accept.
pub fn parse_numeric_str(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty()
        || trimmed
            .chars()
            .any(|c| c.is_alphabetic() && c != 'e' && c != 'E')
    {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Convert a float back to a JSON number, writing integral values without a fractional part.
/// Non-finite values have no JSON representation and become null.
pub fn json_number(value: f64) -> JsonValue {
    const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;
    if value.fract() == 0.0 && value.abs() <= MAX_SAFE_INTEGER {
        return JsonValue::from(value as i64);
    }
    serde_json::Number::from_f64(value)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}
