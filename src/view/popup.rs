use quick_xml::escape::{escape, unescape};
use regex::Regex;

use crate::data::city::CityFeature;
use crate::data::geo::LngLat;
use crate::errors::Result;

use super::format::{group_rounded, group_thousands, to_fixed};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PopupOptions {
    pub close_button: bool,
    pub close_on_click: bool,
}

impl Default for PopupOptions {
    fn default() -> Self {
        PopupOptions {
            close_button: true,
            close_on_click: true,
        }
    }
}

/// An HTML popup anchored at a coordinate. It is only visible while added
/// to the map.
#[derive(Debug, Clone, PartialEq)]
pub struct Popup {
    options: PopupOptions,
    lng_lat: Option<LngLat>,
    html: String,
    open: bool,
}

impl Popup {
    pub fn new(options: PopupOptions) -> Self {
        Popup {
            options,
            lng_lat: None,
            html: String::new(),
            open: false,
        }
    }

    pub fn set_lng_lat(&mut self, lng_lat: LngLat) -> &mut Self {
        self.lng_lat = Some(lng_lat);
        self
    }

    pub fn set_html(&mut self, html: String) -> &mut Self {
        self.html = html;
        self
    }

    /// Shows the popup. Fails to open while no anchor has been set.
    pub fn add_to_map(&mut self) -> &mut Self {
        self.open = self.lng_lat.is_some();
        self
    }

    pub fn remove(&mut self) -> &mut Self {
        self.open = false;
        self
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn options(&self) -> &PopupOptions {
        &self.options
    }

    pub fn lng_lat(&self) -> Option<LngLat> {
        self.lng_lat
    }

    pub fn html(&self) -> &str {
        &self.html
    }
}

const MISSING: &str = "n/a";

/// Popup body for a hovered city. Unknown attributes read `n/a`.
pub fn city_popup_html(city: &CityFeature) -> String {
    let text = |value: &Option<String>| value.as_deref().map_or(MISSING.into(), |v| escape(v).into_owned());
    let km = |value: Option<f64>| value.map_or(MISSING.to_string(), |v| format!("{} km", group_rounded(v)));
    [
        format!("<strong>{}</strong>, {}<br/>", text(&city.city), text(&city.country_code)),
        format!("Population: {}<br/>", city.population.map_or(MISSING.to_string(), group_thousands)),
        format!("Car network: {}<br/>", km(city.car_len_km)),
        format!("Foot network: {}<br/>", km(city.footway_len_km)),
        format!("Foot/Car Ratio: {}", city.foot_to_car_ratio.map_or(MISSING.to_string(), |r| to_fixed(r, 2))),
    ]
    .join("\n")
}

/// Plain text lines of popup HTML: `<br/>` separates lines, other tags are
/// dropped and entities decoded.
pub fn html_to_lines(html: &str) -> Result<Vec<String>> {
    let line_break = Regex::new(r"(?i)<br\s*/?>")?;
    let tag = Regex::new(r"<[^>]*>")?;
    line_break
        .split(html)
        .map(|line| -> Result<String> {
            let text = tag.replace_all(line, "");
            let text = unescape(text.trim()).map_err(|err| err.to_string())?;
            Ok(text.into_owned())
        })
        .filter(|line| !matches!(line, Ok(text) if text.is_empty()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paris() -> CityFeature {
        CityFeature {
            coordinates: LngLat::new(2.35, 48.85),
            city: Some("Paris".to_string()),
            country_code: Some("FR".to_string()),
            population: Some(1234567),
            car_len_km: Some(1234.6),
            footway_len_km: Some(987.4),
            foot_to_car_ratio: Some(0.666),
        }
    }

    #[test]
    fn city_statistics_are_formatted() {
        assert_eq!(
            city_popup_html(&paris()),
            "<strong>Paris</strong>, FR<br/>\n\
             Population: 1,234,567<br/>\n\
             Car network: 1,235 km<br/>\n\
             Foot network: 987 km<br/>\n\
             Foot/Car Ratio: 0.67"
        );
    }

    #[test]
    fn names_are_escaped_and_missing_ratio_shown() {
        let city = CityFeature {
            city: Some("Bar <&> Baz".to_string()),
            foot_to_car_ratio: None,
            ..paris()
        };
        let html = city_popup_html(&city);
        assert!(html.starts_with("<strong>Bar &lt;&amp;&gt; Baz</strong>"));
        assert!(html.ends_with("Foot/Car Ratio: n/a"));
    }

    #[test]
    fn missing_statistics_read_not_available() {
        let city = CityFeature {
            country_code: None,
            population: None,
            car_len_km: None,
            ..paris()
        };
        let lines = html_to_lines(&city_popup_html(&city)).unwrap();
        assert_eq!(lines[0], "Paris, n/a");
        assert_eq!(lines[1], "Population: n/a");
        assert_eq!(lines[2], "Car network: n/a");
        assert_eq!(lines[3], "Foot network: 987 km");
    }

    #[test]
    fn html_becomes_text_lines() {
        let city = CityFeature { city: Some("A & B".to_string()), ..paris() };
        let lines = html_to_lines(&city_popup_html(&city)).unwrap();
        assert_eq!(
            lines,
            vec![
                "A & B, FR",
                "Population: 1,234,567",
                "Car network: 1,235 km",
                "Foot network: 987 km",
                "Foot/Car Ratio: 0.67",
            ]
        );
    }

    #[test]
    fn popup_needs_an_anchor_to_open() {
        let mut popup = Popup::new(PopupOptions { close_button: false, close_on_click: false });
        popup.add_to_map();
        assert!(!popup.is_open());
        popup.set_lng_lat(LngLat::new(1.0, 2.0)).set_html("<b>x</b>".to_string()).add_to_map();
        assert!(popup.is_open());
        popup.remove();
        assert!(!popup.is_open());
        assert_eq!(popup.html(), "<b>x</b>");
    }
}
