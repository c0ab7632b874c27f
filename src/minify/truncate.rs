use geojson::{Geometry, JsonValue};

use crate::geofile::feature::{for_each_position, json_number, parse_numeric_str, Properties};

/// Round half away from zero to `digits` decimals. Values whose scaled form would overflow are
/// returned unchanged.
pub fn round_to(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits.min(i32::MAX as u32) as i32);
    let scaled = value * factor;
    if !factor.is_finite() || !scaled.is_finite() {
        return value;
    }
    let rounded = scaled.round() / factor;
    if rounded.is_finite() {
        rounded
    } else {
        value
    }
}

/// Round every coordinate of the geometry, keeping its nesting.
pub fn truncate_coordinates(geometry: &mut Geometry, digits: u32) {
    for_each_position(&mut geometry.value, |position| {
        position
            .iter_mut()
            .for_each(|ordinate| *ordinate = round_to(*ordinate, digits));
    });
}

/// Round numeric property values. Numbers stay numbers. Strings holding a decimal fraction are
/// rewritten with exactly `digits` decimals; integer-looking strings (codes, zip codes, ids) and
/// non-numeric values are left alone.
pub fn truncate_property_values(properties: &mut Properties, digits: u32) {
    for value in properties.values_mut() {
        match value {
            JsonValue::Number(number) if number.is_f64() => {
                if let Some(float) = number.as_f64() {
                    *value = json_number(round_to(float, digits));
                }
            }
            JsonValue::String(text) if text.contains(['.', 'e', 'E']) => {
                if let Some(float) = parse_numeric_str(text) {
                    *text = format!("{:.*}", digits as usize, round_to(float, digits));
                }
            }
            _ => {}
        }
    }
}

/// Round every floating point number that is an array element, at any depth. Object members are
/// descended into but never rounded themselves, so properties keep their values while coordinate
/// arrays are shortened.
pub fn round_array_numbers(value: &mut JsonValue, digits: u32) {
    match value {
        JsonValue::Array(items) => {
            for item in items.iter_mut() {
                match item {
                    JsonValue::Number(number) if number.is_f64() => {
                        if let Some(float) = number.as_f64() {
                            *item = json_number(round_to(float, digits));
                        }
                    }
                    _ => round_array_numbers(item, digits),
                }
            }
        }
        JsonValue::Object(members) => members
            .values_mut()
            .for_each(|member| round_array_numbers(member, digits)),
        _ => {}
    }
}
