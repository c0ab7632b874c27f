use std::{
    fmt,
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::Context;
use geojson::{Feature, FeatureCollection, JsonObject, JsonValue};
use serde::{
    de::{self, DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor},
    Serialize,
};

const COLLECTION_HEADER: &[u8] = br#"{"type":"FeatureCollection","features":["#;

/// JSON formatter that writes integral floats without a fractional part, e.g. `2` instead of `2.0`.
struct MinifyFormatter;

impl serde_json::ser::Formatter for MinifyFormatter {
    fn write_f64<W: ?Sized + Write>(&mut self, writer: &mut W, value: f64) -> io::Result<()> {
        const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;
        if value.fract() == 0.0 && value.abs() <= MAX_SAFE_INTEGER {
            write!(writer, "{}", value as i64)
        } else {
            serde_json::ser::CompactFormatter.write_f64(writer, value)
        }
    }
}

/// Serialize without whitespace, using the shortest number representation.
pub fn to_writer_minified<W: Write, T: Serialize + ?Sized>(
    writer: W,
    value: &T,
) -> serde_json::Result<()> {
    let mut serializer = serde_json::Serializer::with_formatter(writer, MinifyFormatter);
    value.serialize(&mut serializer)
}

/// Streams the elements of the `features` array into `on_feature`, one at a time.
struct FeaturesSeed<'a, F> {
    on_feature: &'a mut F,
    callback_error: &'a mut Option<anyhow::Error>,
}

impl<'de, 'a, F> DeserializeSeed<'de> for FeaturesSeed<'a, F>
where
    F: FnMut(Feature) -> anyhow::Result<()>,
{
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de, 'a, F> Visitor<'de> for FeaturesSeed<'a, F>
where
    F: FnMut(Feature) -> anyhow::Result<()>,
{
    type Value = ();

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("an array of GeoJSON features")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        while let Some(feature) = seq.next_element::<Feature>()? {
            if let Err(error) = (self.on_feature)(feature) {
                *self.callback_error = Some(error);
                return Err(de::Error::custom("feature processing stopped"));
            }
        }
        Ok(())
    }
}

/// Walks the members of a FeatureCollection object. Members other than `type` and `features`
/// (`bbox`, `crs`, `name`, ..) are skipped without being kept in memory.
struct CollectionSeed<'a, F> {
    on_feature: &'a mut F,
    callback_error: &'a mut Option<anyhow::Error>,
}

impl<'de, 'a, F> DeserializeSeed<'de> for CollectionSeed<'a, F>
where
    F: FnMut(Feature) -> anyhow::Result<()>,
{
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de, 'a, F> Visitor<'de> for CollectionSeed<'a, F>
where
    F: FnMut(Feature) -> anyhow::Result<()>,
{
    type Value = ();

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a GeoJSON FeatureCollection object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        let mut has_features = false;
        while let Some(member) = map.next_key::<String>()? {
            match member.as_str() {
                "features" => {
                    if has_features {
                        return Err(de::Error::duplicate_field("features"));
                    }
                    map.next_value_seed(FeaturesSeed {
                        on_feature: &mut *self.on_feature,
                        callback_error: &mut *self.callback_error,
                    })?;
                    has_features = true;
                }
                "type" => {
                    let type_name: String = map.next_value()?;
                    if type_name != "FeatureCollection" {
                        return Err(de::Error::custom(format!(
                            "expected a FeatureCollection, found {}",
                            type_name
                        )));
                    }
                }
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        if has_features {
            Ok(())
        } else {
            Err(de::Error::missing_field("features"))
        }
    }
}

/// Incrementally parse a FeatureCollection document and pass each feature to `on_feature` as soon
/// as it is complete. Only one feature is held in memory at a time. An error returned by
/// `on_feature` stops parsing and is returned as is. A missing `type` member is accepted.
pub fn for_each_feature<R, F>(reader: R, mut on_feature: F) -> anyhow::Result<()>
where
    R: Read,
    F: FnMut(Feature) -> anyhow::Result<()>,
{
    let mut callback_error = None;
    let mut deserializer = serde_json::Deserializer::from_reader(reader);
    let parsed = CollectionSeed {
        on_feature: &mut on_feature,
        callback_error: &mut callback_error,
    }
    .deserialize(&mut deserializer)
    .and_then(|()| deserializer.end());
    if let Some(error) = callback_error {
        return Err(error);
    }
    parsed.context("Parsing feature collection")
}

/// Read a whole GeoJSON file into memory. A missing `type` member is taken to mean
/// `FeatureCollection`.
pub fn read_feature_collection(filepath: &Path) -> anyhow::Result<FeatureCollection> {
    let file =
        File::open(filepath).with_context(|| format!("Opening {}", filepath.display()))?;
    let mut document: JsonValue = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Parsing {}", filepath.display()))?;
    if let Some(members) = document.as_object_mut() {
        members
            .entry("type")
            .or_insert_with(|| JsonValue::from("FeatureCollection"));
    }
    serde_json::from_value(document)
        .with_context(|| format!("Reading feature collection from {}", filepath.display()))
}

pub fn write_json<T: Serialize + ?Sized>(value: &T, output_filepath: &Path) -> anyhow::Result<()> {
    let file = File::create(output_filepath)
        .with_context(|| format!("Creating {}", output_filepath.display()))?;
    let mut writer = BufWriter::new(file);
    to_writer_minified(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

/// Incrementally writes a FeatureCollection:
/// `{"type":"FeatureCollection","features":[` feature `,` feature .. `]` [`,"map":{..}`] `}`.
pub struct FeatureCollectionWriter<W: Write> {
    writer: W,
    features_written: usize,
}

impl<W: Write> FeatureCollectionWriter<W> {
    pub fn new(mut writer: W) -> io::Result<Self> {
        writer.write_all(COLLECTION_HEADER)?;
        Ok(Self {
            writer,
            features_written: 0,
        })
    }

    pub fn features_written(&self) -> usize {
        self.features_written
    }

    pub fn write_feature(&mut self, feature: &Feature) -> anyhow::Result<()> {
        if self.features_written > 0 {
            self.writer.write_all(b",")?;
        }
        to_writer_minified(&mut self.writer, feature)?;
        self.features_written += 1;
        Ok(())
    }

    /// Close the features array, append the key map if given and flush.
    pub fn finish(mut self, key_map: Option<&JsonObject>) -> anyhow::Result<W> {
        self.writer.write_all(b"]")?;
        if let Some(key_map) = key_map {
            self.writer.write_all(br#","map":"#)?;
            to_writer_minified(&mut self.writer, key_map)?;
        }
        self.writer.write_all(b"}")?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}
