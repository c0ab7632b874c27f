use std::collections::HashMap;

use geo::SimplifyVw;
use geojson::{feature::Id, Feature, FeatureCollection, Geometry, JsonObject, JsonValue, PointType, Value};

/// Name of the single object of a converted topology.
pub const OBJECT_NAME: &str = "collection";

type ArcIdx = i64;
type ArcKey = Vec<Vec<u64>>;

fn arc_key<'a>(positions: impl Iterator<Item = &'a PointType>) -> ArcKey {
    positions
        .map(|position| position.iter().map(|ordinate| ordinate.to_bits()).collect())
        .collect()
}

/// Hands out arc indices in order of appearance. An arc identical to an earlier one is not stored
/// again: it gets the earlier index, or its one's complement when it runs the other way.
pub struct ArcIndexer {
    indices: HashMap<ArcKey, usize>,
    arcs: Vec<Vec<PointType>>,
}

impl ArcIndexer {
    pub fn new() -> Self {
        Self {
            indices: HashMap::new(),
            arcs: Vec::new(),
        }
    }

    pub fn get_index_for_arc(&mut self, positions: &[PointType]) -> ArcIdx {
        let key = arc_key(positions.iter());
        if let Some(index) = self.indices.get(&key) {
            return *index as ArcIdx;
        }
        if let Some(index) = self.indices.get(&arc_key(positions.iter().rev())) {
            return !(*index as ArcIdx);
        }
        self.indices.insert(key, self.arcs.len());
        self.arcs.push(positions.to_vec());
        self.arcs.len() as ArcIdx - 1
    }

    pub fn into_arcs(self) -> Vec<Vec<PointType>> {
        self.arcs
    }
}

impl Default for ArcIndexer {
    fn default() -> Self {
        Self::new()
    }
}

/// Simplify an arc with Visvalingam-Whyatt. Closed rings keep at least 4 positions, other arcs at
/// least 2; if that is not possible the arc is returned unchanged.
pub fn simplify_arc(positions: &[PointType], epsilon: f64) -> Vec<PointType> {
    if positions.iter().any(|position| position.len() < 2) {
        return positions.to_vec();
    }
    let closed = positions.len() > 1 && positions.first() == positions.last();
    let minimum_len = if closed { 4 } else { 2 };
    let line: geo::LineString<f64> = positions
        .iter()
        .map(|position| geo::Coord {
            x: position[0],
            y: position[1],
        })
        .collect();
    let simplified = line.simplify_vw(&epsilon);
    if simplified.0.len() < minimum_len || simplified.0.len() == positions.len() {
        return positions.to_vec();
    }

    // Map the retained coordinates back to the input positions so extra ordinates survive.
    let mut retained = simplified.coords().peekable();
    let kept: Vec<PointType> = positions
        .iter()
        .filter(|position| match retained.peek() {
            Some(coord) if coord.x == position[0] && coord.y == position[1] => {
                retained.next();
                true
            }
            _ => false,
        })
        .cloned()
        .collect();
    if kept.len() == simplified.0.len() {
        kept
    } else {
        simplified.coords().map(|coord| vec![coord.x, coord.y]).collect()
    }
}

/// A TopoJSON topology with absolute (unquantized) coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    pub bbox: Option<[f64; 4]>,
    pub geometries: Vec<JsonValue>,
    pub arcs: Vec<Vec<PointType>>,
}

impl Topology {
    /// `{"type":"Topology","bbox":..,"objects":{"collection":..},"arcs":..}`, with the key map
    /// as an extra `map` member if given.
    pub fn to_json(&self, key_map: Option<JsonObject>) -> JsonValue {
        let mut collection = JsonObject::new();
        collection.insert("type".to_string(), JsonValue::from("GeometryCollection"));
        collection.insert(
            "geometries".to_string(),
            JsonValue::Array(self.geometries.clone()),
        );
        let mut objects = JsonObject::new();
        objects.insert(OBJECT_NAME.to_string(), JsonValue::Object(collection));

        let mut topology = JsonObject::new();
        topology.insert("type".to_string(), JsonValue::from("Topology"));
        if let Some(bbox) = self.bbox {
            topology.insert("bbox".to_string(), JsonValue::from(bbox.to_vec()));
        }
        topology.insert("objects".to_string(), JsonValue::Object(objects));
        topology.insert("arcs".to_string(), JsonValue::from(self.arcs.clone()));
        if let Some(key_map) = key_map {
            topology.insert("map".to_string(), JsonValue::Object(key_map));
        }
        JsonValue::Object(topology)
    }
}

struct TopologyBuilder {
    arc_indexer: ArcIndexer,
    bbox: Option<[f64; 4]>,
}

impl TopologyBuilder {
    fn extend_bbox(&mut self, position: &PointType) {
        let (x, y) = match position.as_slice() {
            [x, y, ..] => (*x, *y),
            _ => return,
        };
        self.bbox = Some(match self.bbox {
            None => [x, y, x, y],
            Some([min_x, min_y, max_x, max_y]) => {
                [min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y)]
            }
        });
    }

    fn arc(&mut self, positions: &[PointType]) -> ArcIdx {
        positions
            .iter()
            .for_each(|position| self.extend_bbox(position));
        self.arc_indexer.get_index_for_arc(positions)
    }

    fn rings(&mut self, rings: &[Vec<PointType>]) -> JsonValue {
        JsonValue::from(
            rings
                .iter()
                .map(|ring| JsonValue::from(vec![self.arc(ring)]))
                .collect::<Vec<JsonValue>>(),
        )
    }

    fn shape(&mut self, value: &Value) -> JsonObject {
        let mut shape = JsonObject::new();
        let type_name = match value {
            Value::Point(position) => {
                self.extend_bbox(position);
                shape.insert("coordinates".to_string(), JsonValue::from(position.clone()));
                "Point"
            }
            Value::MultiPoint(positions) => {
                positions
                    .iter()
                    .for_each(|position| self.extend_bbox(position));
                shape.insert("coordinates".to_string(), JsonValue::from(positions.clone()));
                "MultiPoint"
            }
            Value::LineString(line) => {
                shape.insert("arcs".to_string(), JsonValue::from(vec![self.arc(line)]));
                "LineString"
            }
            Value::MultiLineString(lines) => {
                shape.insert("arcs".to_string(), self.rings(lines));
                "MultiLineString"
            }
            Value::Polygon(rings) => {
                shape.insert("arcs".to_string(), self.rings(rings));
                "Polygon"
            }
            Value::MultiPolygon(polygons) => {
                let arcs: Vec<JsonValue> = polygons
                    .iter()
                    .map(|rings| self.rings(rings))
                    .collect();
                shape.insert("arcs".to_string(), JsonValue::from(arcs));
                "MultiPolygon"
            }
            Value::GeometryCollection(geometries) => {
                let geometries: Vec<JsonValue> = geometries
                    .iter()
                    .map(|geometry| JsonValue::Object(self.geometry(Some(geometry))))
                    .collect();
                shape.insert("geometries".to_string(), JsonValue::from(geometries));
                "GeometryCollection"
            }
        };
        let mut typed = JsonObject::new();
        typed.insert("type".to_string(), JsonValue::from(type_name));
        typed.extend(shape);
        typed
    }

    fn geometry(&mut self, geometry: Option<&Geometry>) -> JsonObject {
        match geometry {
            Some(geometry) => self.shape(&geometry.value),
            None => {
                let mut shape = JsonObject::new();
                shape.insert("type".to_string(), JsonValue::Null);
                shape
            }
        }
    }

    fn feature(&mut self, feature: &Feature) -> JsonValue {
        let mut geometry = self.geometry(feature.geometry.as_ref());
        if let Some(id) = &feature.id {
            let id = match id {
                Id::String(id) => JsonValue::from(id.clone()),
                Id::Number(id) => JsonValue::Number(id.clone()),
            };
            geometry.insert("id".to_string(), id);
        }
        if let Some(properties) = &feature.properties {
            geometry.insert(
                "properties".to_string(),
                JsonValue::Object(properties.clone()),
            );
        }
        JsonValue::Object(geometry)
    }
}

/// Convert a feature collection into a topology holding one GeometryCollection object. Lines and
/// polygon rings become arcs, shared when identical; points stay inline. With `simplify`, every
/// arc is simplified with the given Visvalingam-Whyatt area threshold.
pub fn feature_collection_to_topology(
    collection: &FeatureCollection,
    simplify: Option<f64>,
) -> Topology {
    let mut builder = TopologyBuilder {
        arc_indexer: ArcIndexer::new(),
        bbox: None,
    };
    let geometries: Vec<JsonValue> = collection
        .features
        .iter()
        .map(|feature| builder.feature(feature))
        .collect();
    let mut arcs = builder.arc_indexer.into_arcs();
    if let Some(epsilon) = simplify.filter(|epsilon| *epsilon > 0.0) {
        arcs = arcs
            .iter()
            .map(|arc| simplify_arc(arc, epsilon))
            .collect();
    }
    log::debug!(
        "Built topology with {} geometries and {} arcs",
        geometries.len(),
        arcs.len()
    );
    Topology {
        bbox: builder.bbox,
        geometries,
        arcs,
    }
}
