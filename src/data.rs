use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use log::info;
use serde_json::{Map, Value};
use xz::bufread::XzDecoder;

use crate::errors::Result;

use self::city::CityFeature;

pub mod city;
pub mod geo;
pub mod geojson;

/// A feature attribute as seen by paint expressions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyValue<'a> {
    Number(f64),
    Text(&'a str),
}

/// Attribute lookup by name, the input of data-driven styling.
pub trait FeatureProperties {
    fn property(&self, key: &str) -> Option<PropertyValue<'_>>;
}

impl FeatureProperties for Map<String, Value> {
    fn property(&self, key: &str) -> Option<PropertyValue<'_>> {
        match self.get(key)? {
            Value::Number(number) => number.as_f64().map(PropertyValue::Number),
            Value::String(text) => Some(PropertyValue::Text(text)),
            _ => None,
        }
    }
}

/// The city point dataset. Read-only once loaded.
#[derive(Debug, Default, Clone)]
pub struct CityDataset {
    features: Vec<CityFeature>,
}

impl CityDataset {
    pub fn new(features: Vec<CityFeature>) -> Self {
        CityDataset { features }
    }

    /// Reads a GeoJSON file, decompressing it first when the name ends in `.xz`.
    pub fn open(path: &Path) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut text = String::new();
        if path.extension().is_some_and(|ext| ext == "xz") {
            XzDecoder::new(reader).read_to_string(&mut text)?;
        } else {
            reader.read_to_string(&mut text)?;
        }
        let features = geojson::parse_feature_collection(&text)?;
        info!(path = &*path.to_string_lossy(), features = features.len(); "Loaded city dataset");
        Ok(CityDataset::new(features))
    }

    pub fn features(&self) -> &[CityFeature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn to_geojson(&self) -> Value {
        serde_json::json!({
            "type": "FeatureCollection",
            "features": self.features.iter().map(CityFeature::to_geojson).collect::<Vec<_>>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use xz::write::XzEncoder;

    use super::*;
    use crate::data::city::sample_city;

    #[test]
    fn json_objects_expose_numbers_and_text() {
        let props = serde_json::json!({"car_len_km": 12.5, "city": "Oslo", "tags": []});
        let map = props.as_object().unwrap();
        assert_eq!(map.property("car_len_km"), Some(PropertyValue::Number(12.5)));
        assert_eq!(map.property("city"), Some(PropertyValue::Text("Oslo")));
        assert_eq!(map.property("tags"), None);
        assert_eq!(map.property("missing"), None);
    }

    fn sample_dataset() -> CityDataset {
        CityDataset::new(vec![
            sample_city("Quito", -78.5, 5400.0, Some(0.25)),
            sample_city("Apia", -171.8, 120.0, None),
        ])
    }

    #[test]
    fn dataset_survives_geojson_round_trip_through_disk() {
        let dataset = sample_dataset();
        let mut file = tempfile::Builder::new().suffix(".geojson").tempfile().unwrap();
        file.write_all(dataset.to_geojson().to_string().as_bytes()).unwrap();

        let loaded = CityDataset::open(file.path()).unwrap();
        assert_eq!(loaded.features(), dataset.features());
    }

    #[test]
    fn xz_compressed_datasets_are_decompressed() {
        let dataset = sample_dataset();
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cities.geojson.xz");
        let mut encoder = XzEncoder::new(File::create(&path).unwrap(), 6);
        encoder.write_all(dataset.to_geojson().to_string().as_bytes()).unwrap();
        encoder.finish().unwrap();

        let loaded = CityDataset::open(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.features(), dataset.features());
    }

    #[test]
    fn uncompressed_file_named_xz_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cities.geojson.xz");
        std::fs::write(&path, sample_dataset().to_geojson().to_string()).unwrap();
        assert!(CityDataset::open(&path).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(CityDataset::open(Path::new("/nonexistent/cities.geojson")).is_err());
    }
}
