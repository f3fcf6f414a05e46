use log::warn;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::errors::Result;

use super::city::CityFeature;
use super::geo::LngLat;
use super::{FeatureProperties, PropertyValue};

#[derive(Deserialize)]
struct RawCollection {
    #[serde(rename = "type")]
    kind: String,
    features: Vec<Value>,
}

#[derive(Deserialize)]
struct RawFeature {
    geometry: RawGeometry,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum RawGeometry {
    Point { coordinates: Vec<f64> },
    #[serde(other)]
    Unsupported,
}

fn point(geometry: RawGeometry) -> std::result::Result<LngLat, String> {
    let coordinates = match geometry {
        RawGeometry::Point { coordinates } if coordinates.len() >= 2 => coordinates,
        RawGeometry::Point { .. } => return Err("point needs a longitude and a latitude".into()),
        RawGeometry::Unsupported => return Err("geometry is not a point".into()),
    };
    let (lng, lat) = (coordinates[0], coordinates[1]);
    if !(-180.0..=180.0).contains(&lng) || !(-90.0..=90.0).contains(&lat) {
        return Err(format!("coordinates [{lng}, {lat}] are out of range"));
    }
    Ok(LngLat::new(lng, lat))
}

/// Reads a numeric attribute. Values that are not numbers, or that fail
/// `is_valid`, are dropped as if the attribute were missing.
fn number(properties: &Map<String, Value>, index: usize, key: &str, is_valid: fn(f64) -> bool) -> Option<f64> {
    match properties.property(key)? {
        PropertyValue::Number(n) if is_valid(n) => Some(n),
        PropertyValue::Number(n) => {
            warn!(index = index, property = key, value = n; "Dropping invalid property");
            None
        },
        PropertyValue::Text(text) => {
            warn!(index = index, property = key, value = text; "Dropping non-numeric property");
            None
        },
    }
}

fn text(properties: &Map<String, Value>, key: &str) -> Option<String> {
    match properties.get(key)? {
        Value::String(text) => Some(text.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn non_negative(n: f64) -> bool {
    n.is_finite() && n >= 0.0
}

fn city(index: usize, raw: RawFeature) -> std::result::Result<CityFeature, String> {
    let coordinates = point(raw.geometry)?;
    let properties = raw.properties.unwrap_or_default();
    Ok(CityFeature {
        coordinates,
        city: text(&properties, "city"),
        country_code: text(&properties, "country_code"),
        population: number(&properties, index, "population", non_negative).map(|n| n.round() as u64),
        car_len_km: number(&properties, index, "car_len_km", non_negative),
        footway_len_km: number(&properties, index, "footway_len_km", non_negative),
        foot_to_car_ratio: number(&properties, index, "foot_to_car_ratio", f64::is_finite),
    })
}

/// Parses a GeoJSON `FeatureCollection` of cities. Features without a valid
/// point geometry are logged and skipped; missing or invalid attributes are
/// kept as absent so the paint fallbacks apply.
pub fn parse_feature_collection(text: &str) -> Result<Vec<CityFeature>> {
    let collection: RawCollection = serde_json::from_str(text)?;
    if collection.kind != "FeatureCollection" {
        return Err(format!("Expected a FeatureCollection, found {}", collection.kind).into());
    }

    let mut cities = Vec::with_capacity(collection.features.len());
    for (index, value) in collection.features.into_iter().enumerate() {
        let parsed = serde_json::from_value::<RawFeature>(value)
            .map_err(|err| err.to_string())
            .and_then(|raw| city(index, raw));
        match parsed {
            Ok(city) => cities.push(city),
            Err(reason) => warn!(index = index, reason = reason.as_str(); "Skipping feature"),
        }
    }
    Ok(cities)
}
