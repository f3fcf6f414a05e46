//! A subset of the MapLibre style expression language: literals, `get` and
//! `interpolate`. Expressions convert to and from their JSON array form so
//! paint properties can be read from configuration and written into the web
//! export unchanged.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::data::{FeatureProperties, PropertyValue};
use crate::errors::{Error, Result};

use super::color::Color;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Interpolation {
    Linear,
    Exponential(f64),
}

impl Interpolation {
    /// Position of `x` between `lower` and `upper` as a factor in `0.0..=1.0`.
    fn factor(&self, x: f64, lower: f64, upper: f64) -> f64 {
        let span = upper - lower;
        let progress = x - lower;
        match *self {
            Interpolation::Exponential(base) if base != 1.0 => {
                (base.powf(progress) - 1.0) / (base.powf(span) - 1.0)
            },
            _ => progress / span,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum Expression {
    Number(f64),
    Color(Color),
    /// Feature attribute lookup.
    Get(String),
    /// Piecewise interpolation over stops sorted by strictly increasing input.
    /// Inputs outside the stop range take the nearest end stop's output.
    Interpolate {
        interpolation: Interpolation,
        input: Box<Expression>,
        stops: Vec<(f64, Expression)>,
    },
}

/// Result of evaluating an expression against a feature.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Number(f64),
    Color(Color),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    MissingProperty(String),
    TypeMismatch { expected: &'static str, found: Output },
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::MissingProperty(key) => write!(f, "property {key:?} is missing"),
            EvalError::TypeMismatch { expected, found } => {
                write!(f, "expected {expected}, found {found:?}")
            },
        }
    }
}

impl Output {
    pub fn as_number(&self) -> std::result::Result<f64, EvalError> {
        match self {
            Output::Number(n) => Ok(*n),
            other => Err(EvalError::TypeMismatch { expected: "number", found: other.clone() }),
        }
    }

    pub fn as_color(&self) -> std::result::Result<Color, EvalError> {
        match self {
            Output::Color(c) => Ok(*c),
            other => Err(EvalError::TypeMismatch { expected: "color", found: other.clone() }),
        }
    }

    fn lerp(&self, other: &Output, t: f64) -> std::result::Result<Output, EvalError> {
        match (self, other) {
            (Output::Number(a), Output::Number(b)) => Ok(Output::Number(a + (b - a) * t)),
            (Output::Color(a), Output::Color(b)) => Ok(Output::Color(a.lerp(b, t))),
            (Output::Number(_), found) | (Output::Color(_), found) | (found, _) => {
                Err(EvalError::TypeMismatch { expected: "number or color", found: found.clone() })
            },
        }
    }
}

impl Expression {
    pub fn get(key: &str) -> Self {
        Expression::Get(key.to_string())
    }

    /// Linear interpolation of `input` over `(input, output)` stops.
    pub fn linear(input: Expression, stops: Vec<(f64, Expression)>) -> Result<Self> {
        Self::interpolate(Interpolation::Linear, input, stops)
    }

    pub fn interpolate(interpolation: Interpolation, input: Expression, stops: Vec<(f64, Expression)>) -> Result<Self> {
        if stops.is_empty() {
            return Err("interpolate needs at least one stop".into());
        }
        if stops.windows(2).any(|pair| !(pair[0].0 < pair[1].0)) {
            return Err("interpolate stops must be in strictly ascending order".into());
        }
        if let Interpolation::Exponential(base) = interpolation {
            if !(base > 0.0) {
                return Err(format!("exponential base must be positive, got {base}").into());
            }
        }
        Ok(Expression::Interpolate { interpolation, input: Box::new(input), stops })
    }

    pub fn evaluate<P: FeatureProperties + ?Sized>(&self, feature: &P) -> std::result::Result<Output, EvalError> {
        match self {
            Expression::Number(n) => Ok(Output::Number(*n)),
            Expression::Color(c) => Ok(Output::Color(*c)),
            Expression::Get(key) => match feature.property(key) {
                Some(PropertyValue::Number(n)) => Ok(Output::Number(n)),
                Some(PropertyValue::Text(text)) => Ok(Output::Text(text.to_string())),
                None => Err(EvalError::MissingProperty(key.clone())),
            },
            Expression::Interpolate { interpolation, input, stops } => {
                let x = input.evaluate(feature)?.as_number()?;
                if x.is_nan() {
                    return Err(EvalError::TypeMismatch { expected: "number", found: Output::Number(x) });
                }
                let (first, last) = (&stops[0], &stops[stops.len() - 1]);
                if x <= first.0 {
                    return first.1.evaluate(feature);
                }
                if x >= last.0 {
                    return last.1.evaluate(feature);
                }
                let upper = stops.iter().position(|(stop, _)| x < *stop).unwrap_or(stops.len() - 1);
                let (lower_stop, lower_out) = &stops[upper - 1];
                let (upper_stop, upper_out) = &stops[upper];
                let t = interpolation.factor(x, *lower_stop, *upper_stop);
                lower_out.evaluate(feature)?.lerp(&upper_out.evaluate(feature)?, t)
            },
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Expression::Number(n) => json!(n),
            Expression::Color(c) => json!(c.to_css()),
            Expression::Get(key) => json!(["get", key]),
            Expression::Interpolate { interpolation, input, stops } => {
                let kind = match interpolation {
                    Interpolation::Linear => json!(["linear"]),
                    Interpolation::Exponential(base) => json!(["exponential", base]),
                };
                let mut array = vec![json!("interpolate"), kind, input.to_json()];
                for (stop, output) in stops {
                    array.push(json!(stop));
                    array.push(output.to_json());
                }
                Value::Array(array)
            },
        }
    }

    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Number(n) => n
                .as_f64()
                .map(Expression::Number)
                .ok_or_else(|| Error::from(format!("Unsupported number {n}"))),
            Value::String(s) => Ok(Expression::Color(s.parse()?)),
            Value::Array(items) => {
                let operator = items
                    .first()
                    .and_then(Value::as_str)
                    .ok_or("Expression array must start with an operator name")?;
                match operator {
                    "get" => match items.as_slice() {
                        [_, Value::String(key)] => Ok(Expression::get(key)),
                        _ => Err("get takes exactly one property name".into()),
                    },
                    "interpolate" => Self::interpolate_from_json(&items[1..]),
                    other => Err(format!("Unsupported expression operator {other:?}").into()),
                }
            },
            other => Err(format!("Unsupported expression {other}").into()),
        }
    }

    fn interpolate_from_json(args: &[Value]) -> Result<Self> {
        if args.len() < 4 || args.len() % 2 != 0 {
            return Err("interpolate takes a type, an input and stop/output pairs".into());
        }
        let interpolation = match args[0].as_array().map(Vec::as_slice) {
            Some([kind]) if kind == "linear" => Interpolation::Linear,
            Some([kind, base]) if kind == "exponential" => Interpolation::Exponential(
                base.as_f64().ok_or("exponential base must be a number")?,
            ),
            _ => return Err(format!("Unsupported interpolation type {}", args[0]).into()),
        };
        let input = Self::from_json(&args[1])?;
        let stops = args[2..]
            .chunks(2)
            .map(|pair| -> Result<(f64, Expression)> {
                let stop = pair[0].as_f64().ok_or("interpolate stop inputs must be numbers")?;
                Ok((stop, Self::from_json(&pair[1])?))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::interpolate(interpolation, input, stops)
    }
}

impl From<f64> for Expression {
    fn from(value: f64) -> Self {
        Expression::Number(value)
    }
}

impl From<Color> for Expression {
    fn from(value: Color) -> Self {
        Expression::Color(value)
    }
}

impl TryFrom<Value> for Expression {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_json(&value)
    }
}

impl From<Expression> for Value {
    fn from(value: Expression) -> Self {
        value.to_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn radius() -> Expression {
        Expression::linear(Expression::get("car_len_km"), vec![(0.0, 2.0.into()), (50000.0, 20.0.into())]).unwrap()
    }

    fn radius_for(car_len_km: f64) -> f64 {
        radius().evaluate(&props(json!({ "car_len_km": car_len_km }))).unwrap().as_number().unwrap()
    }

    #[test]
    fn linear_number_interpolation_clamps() {
        assert_eq!(radius_for(0.0), 2.0);
        assert_eq!(radius_for(50000.0), 20.0);
        assert_eq!(radius_for(25000.0), 11.0);
        assert_eq!(radius_for(100000.0), 20.0);
        assert_eq!(radius_for(-10.0), 2.0);
    }

    #[test]
    fn colour_interpolation_between_three_stops() {
        let expr = Expression::from_json(&json!([
            "interpolate", ["linear"], ["get", "ratio"],
            0, "#ff0000", 0.5, "#ffff00", 1, "#00ff00"
        ]))
        .unwrap();
        let at = |ratio: f64| expr.evaluate(&props(json!({ "ratio": ratio }))).unwrap().as_color().unwrap();
        assert_eq!(at(0.0), Color::RED);
        assert_eq!(at(0.5), Color::YELLOW);
        assert_eq!(at(1.0), Color::GREEN);
        assert_eq!(at(0.25), Color::rgb(1.0, 0.5, 0.0));
        assert_eq!(at(0.75), Color::rgb(0.5, 1.0, 0.0));
        assert_eq!(at(1.6), Color::GREEN);
    }

    #[test]
    fn exponential_interpolation_bends_towards_upper_stop() {
        let expr = Expression::interpolate(
            Interpolation::Exponential(2.0),
            Expression::get("x"),
            vec![(0.0, 0.0.into()), (2.0, 3.0.into())],
        )
        .unwrap();
        let y = expr.evaluate(&props(json!({ "x": 1.0 }))).unwrap().as_number().unwrap();
        assert!((y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn missing_or_textual_input_fails() {
        assert_eq!(
            radius().evaluate(&props(json!({}))),
            Err(EvalError::MissingProperty("car_len_km".to_string()))
        );
        assert!(matches!(
            radius().evaluate(&props(json!({ "car_len_km": "long" }))),
            Err(EvalError::TypeMismatch { expected: "number", .. })
        ));
    }

    #[test]
    fn json_form_is_preserved() {
        let json = json!(["interpolate", ["linear"], ["get", "car_len_km"], 0.0, 2.0, 50000.0, 20.0]);
        assert_eq!(radius().to_json(), json);
        assert_eq!(Expression::from_json(&json).unwrap(), radius());
        let via_serde: Expression = serde_json::from_value(json!("#000000")).unwrap();
        assert_eq!(via_serde, Expression::Color(Color::BLACK));
    }

    #[test]
    fn malformed_expressions_are_rejected() {
        for bad in [
            json!(["interpolate", ["linear"], ["get", "x"], 1, 2, 0, 3]),
            json!(["interpolate", ["cubic"], ["get", "x"], 0, 1]),
            json!(["interpolate", ["linear"], ["get", "x"], 0]),
            json!(["get"]),
            json!(["case", true, 1, 2]),
            json!({"op": "get"}),
            json!("not a colour"),
        ] {
            assert!(Expression::from_json(&bad).is_err(), "{bad} should be rejected");
        }
    }
}
