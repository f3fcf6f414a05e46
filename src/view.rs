use std::collections::{HashMap, HashSet};

use log::{info, warn};
use regex::Regex;

use crate::data::city::CityFeature;
use crate::data::geo::{LngLat, ScreenPoint, WebMercator};
use crate::data::CityDataset;
use crate::errors::Result;
use crate::style::layer::{CircleLayer, CirclePaint};

use self::popup::{city_popup_html, Popup, PopupOptions};

pub mod format;
pub mod popup;

pub const SOURCE_ID: &str = "cities";
pub const LAYER_ID: &str = "cities-layer";

/// Canvas cursor, as written to the canvas element's `style.cursor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cursor {
    #[default]
    Default,
    Pointer,
}

impl Cursor {
    pub fn css(&self) -> &'static str {
        match self {
            Cursor::Default => "",
            Cursor::Pointer => "pointer",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapOptions {
    /// Id of the DOM element the map is mounted in.
    pub container: String,
    pub style_url: String,
    pub center: LngLat,
    pub zoom: f64,
}

impl Default for MapOptions {
    fn default() -> Self {
        MapOptions {
            container: "map".to_string(),
            style_url: String::new(),
            center: LngLat::new(0.0, 20.0),
            zoom: 1.0,
        }
    }
}

/// Replaces the value of `key` and `access_token` query parameters so style
/// URLs can be logged.
pub fn redact_access_key(url: &str) -> Result<String> {
    let re = Regex::new(r"([?&](?:key|access_token)=)[^&#]*")?;
    Ok(re.replace_all(url, "${1}***").into_owned())
}

/// Pointer position and the features under it, topmost first.
#[derive(Debug, Clone, PartialEq)]
pub struct HoverEvent {
    pub lng_lat: LngLat,
    pub features: Vec<CityFeature>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayerEvent {
    MouseEnter { layer: String, event: HoverEvent },
    MouseLeave { layer: String },
}

/// Headless map widget: sources, circle layers, a camera and the canvas
/// cursor, with layer-level enter/leave detection for pointer moves.
#[derive(Debug)]
pub struct Map {
    options: MapOptions,
    camera: WebMercator,
    sources: HashMap<String, CityDataset>,
    layers: Vec<CircleLayer>,
    cursor: Cursor,
    hovered_layers: HashSet<String>,
}

impl Map {
    pub fn new(options: MapOptions, width_px: f64, height_px: f64) -> Self {
        let camera = WebMercator::new(options.center, options.zoom, width_px, height_px);
        Map {
            options,
            camera,
            sources: HashMap::new(),
            layers: Vec::new(),
            cursor: Cursor::Default,
            hovered_layers: HashSet::new(),
        }
    }

    pub fn add_source(&mut self, id: &str, data: CityDataset) -> Result<()> {
        if self.sources.contains_key(id) {
            return Err(format!("There is already a source with id {id:?}").into());
        }
        info!(source = id, features = data.len(); "Added source");
        self.sources.insert(id.to_string(), data);
        Ok(())
    }

    pub fn add_layer(&mut self, layer: CircleLayer) -> Result<()> {
        if !self.sources.contains_key(&layer.source) {
            return Err(format!("Layer {:?} references unknown source {:?}", layer.id, layer.source).into());
        }
        if self.layer(&layer.id).is_some() {
            return Err(format!("There is already a layer with id {:?}", layer.id).into());
        }
        info!(layer = layer.id.as_str(), source = layer.source.as_str(); "Added layer");
        self.layers.push(layer);
        Ok(())
    }

    pub fn options(&self) -> &MapOptions {
        &self.options
    }

    pub fn camera(&self) -> &WebMercator {
        &self.camera
    }

    pub fn source(&self, id: &str) -> Option<&CityDataset> {
        self.sources.get(id)
    }

    pub fn layer(&self, id: &str) -> Option<&CircleLayer> {
        self.layers.iter().find(|layer| layer.id == id)
    }

    /// Layers in drawing order, bottom first.
    pub fn layers(&self) -> &[CircleLayer] {
        &self.layers
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn set_cursor(&mut self, cursor: Cursor) {
        self.cursor = cursor;
    }

    /// Features of `layer` whose rendered circle (any world copy) contains
    /// `point`, topmost first.
    pub fn query_rendered_features(&self, layer: &CircleLayer, point: &ScreenPoint) -> Vec<CityFeature> {
        let Some(source) = self.sources.get(&layer.source) else {
            return Vec::new();
        };
        source
            .features()
            .iter()
            .rev()
            .filter(|feature| {
                let hit_radius = layer.paint.resolve(*feature).hit_radius();
                self.camera.visible_world_copies(hit_radius).any(|copy| {
                    let coords = LngLat::new(
                        feature.coordinates.lng + 360.0 * copy as f64,
                        feature.coordinates.lat,
                    );
                    self.camera.project(&coords).distance_to(point) <= hit_radius
                })
            })
            .cloned()
            .collect()
    }

    /// Moves the pointer to `point`. A layer gets `MouseEnter` when the
    /// pointer moves onto any of its features from outside the layer and
    /// `MouseLeave` when it moves off all of them.
    pub fn pointer_move(&mut self, point: ScreenPoint) -> Vec<LayerEvent> {
        let lng_lat = self.camera.unproject(&point);
        let hits: Vec<(String, Vec<CityFeature>)> = self
            .layers
            .iter()
            .map(|layer| (layer.id.clone(), self.query_rendered_features(layer, &point)))
            .collect();

        let mut events = Vec::new();
        for (layer, features) in hits {
            let was_hovered = self.hovered_layers.contains(&layer);
            if !features.is_empty() && !was_hovered {
                self.hovered_layers.insert(layer.clone());
                events.push(LayerEvent::MouseEnter { layer, event: HoverEvent { lng_lat, features } });
            } else if features.is_empty() && was_hovered {
                self.hovered_layers.remove(&layer);
                events.push(LayerEvent::MouseLeave { layer });
            }
        }
        events
    }

    /// The pointer left the canvas.
    pub fn pointer_out(&mut self) -> Vec<LayerEvent> {
        let mut left: Vec<String> = self.hovered_layers.drain().collect();
        left.sort();
        left.into_iter().map(|layer| LayerEvent::MouseLeave { layer }).collect()
    }
}

/// The city map controller: one source, one circle layer and a hover popup.
#[derive(Debug)]
pub struct MapView {
    map: Map,
    popup: Option<Popup>,
}

impl MapView {
    pub fn new(options: MapOptions, width_px: f64, height_px: f64) -> Result<Self> {
        info!(
            container = options.container.as_str(),
            style = redact_access_key(&options.style_url)?.as_str(),
            lng = options.center.lng,
            lat = options.center.lat,
            zoom = options.zoom;
            "Created map"
        );
        Ok(MapView {
            map: Map::new(options, width_px, height_px),
            popup: None,
        })
    }

    pub fn map(&self) -> &Map {
        &self.map
    }

    pub fn popup(&self) -> Option<&Popup> {
        self.popup.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.popup.is_some()
    }

    /// Map-ready handler: registers the city source and layer and creates
    /// the detached popup. Runs once; later calls are ignored.
    pub fn on_load(&mut self, cities: CityDataset, paint: CirclePaint) -> Result<()> {
        if self.is_loaded() {
            warn!("Map already loaded, ignoring");
            return Ok(());
        }
        self.map.add_source(SOURCE_ID, cities)?;
        self.map.add_layer(CircleLayer::new(LAYER_ID, SOURCE_ID, paint))?;
        let popup = Popup::new(PopupOptions {
            close_button: false,
            close_on_click: false,
        });
        info!(
            close_button = popup.options().close_button,
            close_on_click = popup.options().close_on_click;
            "Created popup"
        );
        self.popup = Some(popup);
        Ok(())
    }

    pub fn on_hover_enter(&mut self, event: &HoverEvent) {
        let (Some(popup), Some(feature)) = (self.popup.as_mut(), event.features.first()) else {
            return;
        };
        self.map.set_cursor(Cursor::Pointer);

        let coordinates = feature.coordinates.nearest_copy_to(event.lng_lat.lng);
        popup
            .set_lng_lat(coordinates)
            .set_html(city_popup_html(feature))
            .add_to_map();
        info!(city = feature.name(), lng = coordinates.lng, lat = coordinates.lat; "Showing popup");
    }

    pub fn on_hover_leave(&mut self) {
        self.map.set_cursor(Cursor::Default);
        if let Some(popup) = self.popup.as_mut() {
            popup.remove();
        }
    }

    fn dispatch(&mut self, events: Vec<LayerEvent>) {
        for event in events {
            match event {
                LayerEvent::MouseEnter { layer, event } if layer == LAYER_ID => self.on_hover_enter(&event),
                LayerEvent::MouseLeave { layer } if layer == LAYER_ID => self.on_hover_leave(),
                _ => (),
            }
        }
    }

    /// Moves the pointer to `point`; a point off the canvas leaves it.
    pub fn pointer_move(&mut self, point: ScreenPoint) {
        if !self.map.camera().contains(&point) {
            self.pointer_out();
            return;
        }
        let events = self.map.pointer_move(point);
        self.dispatch(events);
    }

    pub fn pointer_out(&mut self) {
        let events = self.map.pointer_out();
        self.dispatch(events);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::city::sample_city;

    const WIDTH: f64 = 1024.0;
    const HEIGHT: f64 = 768.0;

    fn loaded_view(cities: Vec<CityFeature>) -> MapView {
        let mut view = MapView::new(MapOptions::default(), WIDTH, HEIGHT).unwrap();
        view.on_load(CityDataset::new(cities), CirclePaint::default()).unwrap();
        view
    }

    fn screen_of(view: &MapView, lng: f64, lat: f64) -> ScreenPoint {
        view.map().camera().project(&LngLat::new(lng, lat))
    }

    #[test]
    fn default_options_look_at_the_whole_world() {
        let options = MapOptions::default();
        assert_eq!(options.center, LngLat::new(0.0, 20.0));
        assert_eq!(options.zoom, 1.0);
    }

    #[test]
    fn load_registers_source_layer_and_detached_popup() {
        let view = loaded_view(vec![sample_city("Lima", -77.0, 9000.0, Some(0.4))]);
        assert_eq!(view.map().source(SOURCE_ID).map(CityDataset::len), Some(1));
        assert_eq!(view.map().layer(LAYER_ID).map(|l| l.source.as_str()), Some(SOURCE_ID));
        let popup = view.popup().unwrap();
        assert!(!popup.is_open());
        assert!(!popup.options().close_button);
        assert!(!popup.options().close_on_click);
    }

    #[test]
    fn second_load_is_ignored() {
        let mut view = loaded_view(vec![sample_city("Lima", -77.0, 9000.0, Some(0.4))]);
        view.on_load(CityDataset::default(), CirclePaint::default()).unwrap();
        assert_eq!(view.map().source(SOURCE_ID).map(CityDataset::len), Some(1));
        assert_eq!(view.map().layers().len(), 1);
    }

    #[test]
    fn hover_before_load_does_nothing() {
        let mut view = MapView::new(MapOptions::default(), WIDTH, HEIGHT).unwrap();
        view.on_hover_enter(&HoverEvent {
            lng_lat: LngLat::new(0.0, 0.0),
            features: vec![sample_city("Early", 0.0, 1.0, None)],
        });
        assert_eq!(view.map().cursor(), Cursor::Default);
        assert!(view.popup().is_none());
    }

    #[test]
    fn hover_enter_opens_popup_on_nearest_copy() {
        let mut view = loaded_view(vec![sample_city("Suva", -170.0, 900.0, Some(0.5))]);
        let suva = view.map().source(SOURCE_ID).unwrap().features()[0].clone();
        view.on_hover_enter(&HoverEvent { lng_lat: LngLat::new(170.0, 10.0), features: vec![suva] });

        assert_eq!(view.map().cursor(), Cursor::Pointer);
        let popup = view.popup().unwrap();
        assert!(popup.is_open());
        assert_eq!(popup.lng_lat(), Some(LngLat::new(190.0, 10.0)));
        assert!(popup.html().starts_with("<strong>Suva</strong>, XX"));
    }

    #[test]
    fn hover_leave_always_cleans_up() {
        let mut view = loaded_view(vec![sample_city("Oslo", 10.7, 4000.0, Some(0.9))]);
        view.on_hover_leave();
        assert_eq!(view.map().cursor(), Cursor::Default);
        assert!(!view.popup().unwrap().is_open());

        let oslo = view.map().source(SOURCE_ID).unwrap().features()[0].clone();
        for _ in 0..3 {
            view.on_hover_enter(&HoverEvent { lng_lat: oslo.coordinates, features: vec![oslo.clone()] });
        }
        view.on_hover_leave();
        view.on_hover_leave();
        assert_eq!(view.map().cursor(), Cursor::Default);
        assert!(!view.popup().unwrap().is_open());
    }

    #[test]
    fn pointer_moves_drive_enter_and_leave() {
        let mut view = loaded_view(vec![
            sample_city("Below", 0.0, 50000.0, Some(0.1)),
            sample_city("Above", 0.5, 50000.0, Some(0.9)),
        ]);
        let over = screen_of(&view, 0.25, 10.0);
        view.pointer_move(over);
        assert_eq!(view.map().cursor(), Cursor::Pointer);
        assert!(view.popup().unwrap().html().contains("Above"));

        // Moving within the layer does not re-fire enter.
        view.pointer_move(screen_of(&view, 0.0, 10.0));
        assert!(view.popup().unwrap().html().contains("Above"));

        view.pointer_move(ScreenPoint::new(5.0, 5.0));
        assert_eq!(view.map().cursor(), Cursor::Default);
        assert!(!view.popup().unwrap().is_open());
    }

    #[test]
    fn pointer_over_a_wrapped_copy_hits_the_feature() {
        let mut options = MapOptions::default();
        options.zoom = 0.0;
        let mut view = MapView::new(options, 2048.0, 512.0).unwrap();
        view.on_load(
            CityDataset::new(vec![sample_city("Apia", -171.8, 20000.0, Some(0.3))]),
            CirclePaint::default(),
        )
        .unwrap();
        let copy = screen_of(&view, -171.8 + 360.0, 10.0);
        view.pointer_move(copy);
        let popup = view.popup().unwrap();
        assert!(popup.is_open());
        let anchor = popup.lng_lat().unwrap();
        assert!((anchor.lng - 188.2).abs() < 1e-9);
    }

    #[test]
    fn leaving_the_canvas_fires_leave() {
        let mut view = loaded_view(vec![sample_city("Cairo", 31.2, 30000.0, Some(0.2))]);
        view.pointer_move(screen_of(&view, 31.2, 10.0));
        assert!(view.popup().unwrap().is_open());
        view.pointer_out();
        assert!(!view.popup().unwrap().is_open());
        assert_eq!(view.map().cursor(), Cursor::Default);
        view.pointer_out();
        assert!(!view.popup().unwrap().is_open());
    }

    #[test]
    fn moving_off_the_canvas_leaves_it() {
        let mut view = loaded_view(vec![sample_city("Cairo", 31.2, 30000.0, Some(0.2))]);
        view.pointer_move(screen_of(&view, 31.2, 10.0));
        assert_eq!(view.map().cursor(), Cursor::Pointer);
        view.pointer_move(ScreenPoint::new(-10.0, HEIGHT / 2.0));
        assert_eq!(view.map().cursor(), Cursor::Default);
        assert!(!view.popup().unwrap().is_open());

        view.pointer_move(screen_of(&view, 31.2, 10.0));
        assert!(view.popup().unwrap().is_open());
    }

    #[test]
    fn layers_need_an_existing_source() {
        let mut map = Map::new(MapOptions::default(), WIDTH, HEIGHT);
        let layer = CircleLayer::new("orphan", "nowhere", CirclePaint::default());
        assert!(map.add_layer(layer).is_err());
        map.add_source("cities", CityDataset::default()).unwrap();
        assert!(map.add_source("cities", CityDataset::default()).is_err());
    }

    #[test]
    fn access_keys_are_redacted() {
        let url = "https://api.maptiler.com/maps/streets/style.json?key=SECRET&lang=en";
        assert_eq!(
            redact_access_key(url).unwrap(),
            "https://api.maptiler.com/maps/streets/style.json?key=***&lang=en"
        );
        assert_eq!(redact_access_key("https://x/style.json").unwrap(), "https://x/style.json");
    }
}
