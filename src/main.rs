mod data;
mod errors;
mod etl;
mod style;
mod view;

use std::env;
use std::fs::{create_dir_all, File};
use std::io;
use std::path::{Path, PathBuf};

use log::info;
use serde::Deserialize;
use structured_logger::json::new_writer;
use structured_logger::Builder;

use crate::data::geo::{LngLat, ScreenPoint, MAX_ZOOM, MIN_ZOOM};
use crate::errors::Result;
use crate::etl::draw_map::DrawMapEtl;
use crate::etl::export_web::ExportWebEtl;
use crate::etl::load_cities::LoadCitiesEtl;
use crate::etl::Etl;
use crate::style::layer::CirclePaint;
use crate::view::{redact_access_key, MapOptions, MapView};

const DEFAULT_CONFIG_PATH: &str = "config/cities.json";

#[derive(Deserialize)]
pub struct UserConfig {
    /// City GeoJSON, optionally xz compressed.
    pub data_path: String,
    #[serde(default = "default_dest_path")]
    pub dest_path: String,
    pub style_url: String,
    #[serde(default = "default_container")]
    pub container: String,
    #[serde(default = "default_center")]
    pub center: [f64; 2],
    #[serde(default = "default_zoom")]
    pub zoom: f64,
    #[serde(default = "default_width_px")]
    pub width_px: u32,
    #[serde(default = "default_height_px")]
    pub height_px: u32,
    pub basemap_image: Option<String>,
    pub font_path: Option<String>,
    #[serde(default)]
    pub paint: CirclePaint,
    /// Screen positions replayed as pointer moves before the snapshot.
    #[serde(default)]
    pub pointer_path: Vec<[f64; 2]>,
}

fn default_dest_path() -> String {
    "output".to_string()
}

fn default_container() -> String {
    MapOptions::default().container
}

fn default_center() -> [f64; 2] {
    let center = MapOptions::default().center;
    [center.lng, center.lat]
}

fn default_zoom() -> f64 {
    MapOptions::default().zoom
}

fn default_width_px() -> u32 {
    1024
}

fn default_height_px() -> u32 {
    768
}

impl UserConfig {
    pub fn map_options(&self) -> MapOptions {
        MapOptions {
            container: self.container.clone(),
            style_url: self.style_url.clone(),
            center: LngLat::from(self.center),
            zoom: self.zoom.clamp(MIN_ZOOM, MAX_ZOOM),
        }
    }
}

fn load_user_config(path: &Path) -> Result<UserConfig> {
    let file = File::open(path)
        .map_err(|err| format!("Could not open config file {}: {}", path.display(), err))?;
    let config: UserConfig = serde_json::from_reader(file)
        .map_err(|err| format!("Could not parse config {}: {}", path.display(), err))?;
    info!(
        path = &*path.to_string_lossy(),
        style_url = redact_access_key(&config.style_url)?.as_str();
        "Loaded user config"
    );
    Ok(config)
}

fn create_output_dir(config: &UserConfig) -> Result<PathBuf> {
    let input_fname = Path::new(&config.data_path)
        .file_name()
        .ok_or("Could not get input file name")?;
    let output_dir = Path::new(&config.dest_path).join(input_fname);
    create_dir_all(&output_dir)?;
    Ok(output_dir)
}

fn setup_logging() {
    Builder::with_level("info")
        .with_target_writer("*", new_writer(io::stdout()))
        .init();
}

fn main() -> Result<()> {
    setup_logging();

    let config_path = env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let user_config = load_user_config(Path::new(&config_path))?;
    let output_dir = create_output_dir(&user_config)?;

    LoadCitiesEtl::new(Path::new(&user_config.data_path)).process(&output_dir)?;
    let cities = LoadCitiesEtl::read_cache(&output_dir)?;

    let mut view = MapView::new(
        user_config.map_options(),
        f64::from(user_config.width_px),
        f64::from(user_config.height_px),
    )?;
    view.on_load(cities, user_config.paint.clone())?;

    for [x, y] in &user_config.pointer_path {
        view.pointer_move(ScreenPoint::new(*x, *y));
    }
    info!(
        cursor = view.map().cursor().css(),
        popup_open = view.popup().is_some_and(|popup| popup.is_open());
        "Replayed pointer path"
    );

    let mut draw_map = DrawMapEtl::new(&user_config, &view)?;
    draw_map.clean(&output_dir)?;
    draw_map.process(&output_dir)?;

    let mut export_web = ExportWebEtl::new(&view);
    export_web.clean(&output_dir)?;
    export_web.process(&output_dir)?;

    info!(output_dir = &*output_dir.to_string_lossy(); "Done");
    Ok(())
}
