use serde_json::{json, Map, Value};

use super::geo::LngLat;
use super::{FeatureProperties, PropertyValue};

/// One city of the dataset with its street network statistics. Attributes
/// missing from the source data stay `None` and are left to the paint
/// fallbacks.
#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
pub struct CityFeature {
    pub coordinates: LngLat,
    pub city: Option<String>,
    pub country_code: Option<String>,
    pub population: Option<u64>,
    /// Length of the car-accessible road network, km.
    pub car_len_km: Option<f64>,
    /// Length of the pedestrian network, km.
    pub footway_len_km: Option<f64>,
    /// `footway_len_km / car_len_km`. Absent when the car network is empty.
    pub foot_to_car_ratio: Option<f64>,
}

impl CityFeature {
    /// Display name, `"n/a"` when the source has none.
    pub fn name(&self) -> &str {
        self.city.as_deref().unwrap_or("n/a")
    }

    pub fn to_geojson(&self) -> Value {
        let mut properties = Map::new();
        let mut insert = |key: &str, value: Option<Value>| {
            if let Some(value) = value {
                properties.insert(key.to_string(), value);
            }
        };
        insert("city", self.city.as_ref().map(|v| json!(v)));
        insert("country_code", self.country_code.as_ref().map(|v| json!(v)));
        insert("population", self.population.map(|v| json!(v)));
        insert("car_len_km", self.car_len_km.map(|v| json!(v)));
        insert("footway_len_km", self.footway_len_km.map(|v| json!(v)));
        insert("foot_to_car_ratio", self.foot_to_car_ratio.map(|v| json!(v)));
        json!({
            "type": "Feature",
            "geometry": {
                "type": "Point",
                "coordinates": [self.coordinates.lng, self.coordinates.lat],
            },
            "properties": properties,
        })
    }
}

impl FeatureProperties for CityFeature {
    fn property(&self, key: &str) -> Option<PropertyValue<'_>> {
        match key {
            "city" => self.city.as_deref().map(PropertyValue::Text),
            "country_code" => self.country_code.as_deref().map(PropertyValue::Text),
            "population" => self.population.map(|n| PropertyValue::Number(n as f64)),
            "car_len_km" => self.car_len_km.map(PropertyValue::Number),
            "footway_len_km" => self.footway_len_km.map(PropertyValue::Number),
            "foot_to_car_ratio" => self.foot_to_car_ratio.map(PropertyValue::Number),
            _ => None,
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_city(name: &str, lng: f64, car_len_km: f64, ratio: Option<f64>) -> CityFeature {
    CityFeature {
        coordinates: LngLat::new(lng, 10.0),
        city: Some(name.to_string()),
        country_code: Some("XX".to_string()),
        population: Some(1_000_000),
        car_len_km: Some(car_len_km),
        footway_len_km: Some(ratio.map_or(0.0, |r| r * car_len_km)),
        foot_to_car_ratio: ratio,
    }
}
