use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::data::FeatureProperties;
use crate::errors::Result;

use super::color::Color;
use super::expression::{Expression, Interpolation};

/// Values the map library uses when a paint expression cannot be evaluated
/// for a feature.
pub const FALLBACK_RADIUS: f64 = 5.0;
pub const FALLBACK_COLOR: Color = Color::BLACK;
pub const FALLBACK_OPACITY: f64 = 1.0;
pub const FALLBACK_STROKE_WIDTH: f64 = 0.0;

/// Paint properties of a circle layer. Fields missing from a configuration
/// file keep the city encoding of [`CirclePaint::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CirclePaint {
    #[serde(rename = "circle-radius")]
    pub radius: Expression,
    #[serde(rename = "circle-color")]
    pub color: Expression,
    #[serde(rename = "circle-opacity")]
    pub opacity: Expression,
    #[serde(rename = "circle-stroke-width")]
    pub stroke_width: Expression,
    #[serde(rename = "circle-stroke-color")]
    pub stroke_color: Expression,
}

impl Default for CirclePaint {
    /// Radius follows the car network length over 0..50000 km (2..20 px),
    /// colour goes red, yellow, green as the foot/car ratio goes 0, 0.5, 1.
    fn default() -> Self {
        CirclePaint {
            radius: Expression::Interpolate {
                interpolation: Interpolation::Linear,
                input: Box::new(Expression::get("car_len_km")),
                stops: vec![(0.0, 2.0.into()), (50000.0, 20.0.into())],
            },
            color: Expression::Interpolate {
                interpolation: Interpolation::Linear,
                input: Box::new(Expression::get("foot_to_car_ratio")),
                stops: vec![
                    (0.0, Color::RED.into()),
                    (0.5, Color::YELLOW.into()),
                    (1.0, Color::GREEN.into()),
                ],
            },
            opacity: 0.7.into(),
            stroke_width: 1.0.into(),
            stroke_color: Color::BLACK.into(),
        }
    }
}

/// Paint of one feature after expression evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircleStyle {
    pub radius: f64,
    pub color: Color,
    pub opacity: f64,
    pub stroke_width: f64,
    pub stroke_color: Color,
}

impl CircleStyle {
    /// Distance from the centre within which the pointer is over the circle.
    pub fn hit_radius(&self) -> f64 {
        self.radius + self.stroke_width
    }
}

fn number_or<P: FeatureProperties + ?Sized>(name: &str, expr: &Expression, feature: &P, fallback: f64) -> f64 {
    match expr.evaluate(feature).and_then(|out| out.as_number()) {
        Ok(value) => value,
        Err(err) => {
            debug!(property = name, reason = err.to_string().as_str(); "Using default paint value");
            fallback
        },
    }
}

fn color_or<P: FeatureProperties + ?Sized>(name: &str, expr: &Expression, feature: &P, fallback: Color) -> Color {
    match expr.evaluate(feature).and_then(|out| out.as_color()) {
        Ok(value) => value,
        Err(err) => {
            debug!(property = name, reason = err.to_string().as_str(); "Using default paint value");
            fallback
        },
    }
}

impl CirclePaint {
    pub fn resolve<P: FeatureProperties + ?Sized>(&self, feature: &P) -> CircleStyle {
        CircleStyle {
            radius: number_or("circle-radius", &self.radius, feature, FALLBACK_RADIUS),
            color: color_or("circle-color", &self.color, feature, FALLBACK_COLOR),
            opacity: number_or("circle-opacity", &self.opacity, feature, FALLBACK_OPACITY).clamp(0.0, 1.0),
            stroke_width: number_or("circle-stroke-width", &self.stroke_width, feature, FALLBACK_STROKE_WIDTH),
            stroke_color: color_or("circle-stroke-color", &self.stroke_color, feature, FALLBACK_COLOR),
        }
    }
}

/// A circle layer drawing every point of `source`.
#[derive(Debug, Clone, PartialEq)]
pub struct CircleLayer {
    pub id: String,
    pub source: String,
    pub paint: CirclePaint,
}

impl CircleLayer {
    pub fn new(id: &str, source: &str, paint: CirclePaint) -> Self {
        CircleLayer {
            id: id.to_string(),
            source: source.to_string(),
            paint,
        }
    }

    /// Layer definition as passed to MapLibre's `addLayer`.
    pub fn to_maplibre(&self) -> Result<Value> {
        Ok(json!({
            "id": self.id,
            "type": "circle",
            "source": self.source,
            "paint": serde_json::to_value(&self.paint)?,
        }))
    }
}
