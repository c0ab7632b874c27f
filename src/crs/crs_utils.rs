use std::collections::HashMap;

use anyhow::{anyhow, Context};

pub const WGS84: &str = "EPSG:4326";

pub const DEFAULT_CRS_SERVICE_URL: &str = "https://spatialreference.org/ref";

const DEFAULT_AUTHORITY: &str = "EPSG";

/// PROJ definitions for coordinate systems that are resolved without a network lookup.
const KNOWN_CRS_DEFINITIONS: [(&str, &str); 9] = [
    ("EPSG:4326", "+proj=longlat +datum=WGS84 +no_defs"),
    (
        "EPSG:3857",
        "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m \
         +nadgrids=@null +wktext +no_defs",
    ),
    (
        "EPSG:900913",
        "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m \
         +nadgrids=@null +wktext +no_defs",
    ),
    (
        "EPSG:28992",
        "+proj=sterea +lat_0=52.15616055555555 +lon_0=5.38763888888889 +k=0.9999079 \
         +x_0=155000 +y_0=463000 +ellps=bessel \
         +towgs84=565.417,50.3319,465.552,-0.398957,0.343988,-1.8774,4.0725 +units=m +no_defs",
    ),
    (
        "EPSG:31370",
        "+proj=lcc +lat_0=90 +lon_0=4.36748666666667 +lat_1=51.1666672333333 \
         +lat_2=49.8333339 +x_0=150000.013 +y_0=5400088.438 +ellps=intl \
         +towgs84=-106.8686,52.2978,-103.7239,0.3366,-0.457,1.8422,-1.2747 +units=m +no_defs",
    ),
    (
        "EPSG:27700",
        "+proj=tmerc +lat_0=49 +lon_0=-2 +k=0.9996012717 +x_0=400000 +y_0=-100000 \
         +ellps=airy +towgs84=446.448,-125.157,542.06,0.15,0.247,0.842,-20.489 +units=m +no_defs",
    ),
    (
        "EPSG:2154",
        "+proj=lcc +lat_0=46.5 +lon_0=3 +lat_1=49 +lat_2=44 +x_0=700000 +y_0=6600000 \
         +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs",
    ),
    (
        "EPSG:25831",
        "+proj=utm +zone=31 +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs",
    ),
    (
        "EPSG:25832",
        "+proj=utm +zone=32 +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs",
    ),
];

/// Normalize a coordinate system identifier to `AUTHORITY:CODE`, e.g. `28992` and `epsg:28992`
/// both become `EPSG:28992`.
pub fn normalize_crs_name(name: &str) -> anyhow::Result<String> {
    let name = name.trim().to_uppercase();
    let (authority, code) = match name.split_once(':') {
        Some((authority, code)) => (authority.trim().to_owned(), code.trim().to_owned()),
        None => (DEFAULT_AUTHORITY.to_owned(), name.clone()),
    };
    if authority.is_empty()
        || code.is_empty()
        || !authority.chars().all(|c| c.is_ascii_alphanumeric())
        || !code.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(anyhow!(
            "Invalid coordinate system '{}', expected e.g. EPSG:28992 or 28992",
            name
        ));
    }
    Ok(format!("{}:{}", authority, code))
}

pub fn known_crs_definition(crs_name: &str) -> Option<&'static str> {
    KNOWN_CRS_DEFINITIONS
        .iter()
        .find(|(name, _)| *name == crs_name)
        .map(|(_, definition)| *definition)
}

/// Resolves coordinate system identifiers to PROJ definitions: first from the built-in table,
/// then from a spatialreference.org style service. Downloaded definitions are kept for the run.
pub struct CrsResolver {
    service_url: String,
    downloaded: HashMap<String, String>,
}

impl CrsResolver {
    pub fn new(service_url: &str) -> Self {
        Self {
            service_url: service_url.trim_end_matches('/').to_owned(),
            downloaded: HashMap::new(),
        }
    }

    /// Definition for an already normalized identifier.
    pub fn resolve(&mut self, crs_name: &str) -> anyhow::Result<String> {
        if let Some(definition) = known_crs_definition(crs_name) {
            return Ok(definition.to_owned());
        }
        if let Some(definition) = self.downloaded.get(crs_name) {
            return Ok(definition.clone());
        }
        log::info!("Looking up {} at {}", crs_name, self.service_url);
        let definition = download_crs_definition(&self.service_url, crs_name)?;
        self.downloaded
            .insert(crs_name.to_owned(), definition.clone());
        Ok(definition)
    }
}

impl Default for CrsResolver {
    fn default() -> Self {
        Self::new(DEFAULT_CRS_SERVICE_URL)
    }
}

fn crs_lookup_url(service_url: &str, crs_name: &str) -> String {
    let path = crs_name.to_lowercase().replacen(':', "/", 1);
    format!("{}/{}/proj4/", service_url, path)
}

fn download_crs_definition(service_url: &str, crs_name: &str) -> anyhow::Result<String> {
    let url = crs_lookup_url(service_url, crs_name);
    let client = reqwest::blocking::Client::builder()
        .user_agent("minify-geojson")
        .build()?;
    let response = client
        .get(&url)
        .send()
        .with_context(|| format!("Requesting {}", url))?;
    if !response.status().is_success() {
        return Err(anyhow!(
            "{} responded with HTTP {} while looking up \"{}\"",
            service_url,
            response.status(),
            crs_name
        ));
    }
    let definition = response
        .text()
        .or(Err(anyhow!("No response text for {}", crs_name)))?;
    let definition = definition.trim();
    if definition.is_empty() {
        return Err(anyhow!("Empty definition returned for {}", crs_name));
    }
    Ok(definition.to_owned())
}
