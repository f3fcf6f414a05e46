use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::escape::escape;
use serde_json::json;

use crate::errors::Result;
use crate::view::{MapView, LAYER_ID, SOURCE_ID};

use super::{remove_if_exists, Etl};

pub const ETL_NAME: &str = "export_web";
pub const HTML_FILE_NAME: &str = "index.html";
pub const SCRIPT_FILE_NAME: &str = "map.js";
pub const DATA_FILE_NAME: &str = "cities_data.geojson";

const MAPLIBRE_VERSION: &str = "4.7.1";

/// Hover behaviour of the exported page; mirrors `MapView::on_hover_enter`
/// and `MapView::on_hover_leave`.
const HANDLERS_JS: &str = r#"
    const popup = new maplibregl.Popup({ closeButton: false, closeOnClick: false });
    const isNumber = (n) => typeof n === 'number';
    const grouped = (n) => isNumber(n) ? Math.round(n).toLocaleString('en-US') : 'n/a';
    const km = (n) => isNumber(n) ? `${grouped(n)} km` : 'n/a';
    const escapeHtml = (s) => s === undefined || s === null
        ? 'n/a'
        : String(s).replace(/[&<>"']/g, (c) => `&#${c.charCodeAt(0)};`);

    map.on('mouseenter', __LAYER__, (e) => {
        map.getCanvas().style.cursor = 'pointer';

        const feature = e.features[0];
        const coordinates = feature.geometry.coordinates.slice();
        const p = feature.properties;
        const ratio = isNumber(p.foot_to_car_ratio) ? p.foot_to_car_ratio.toFixed(2) : 'n/a';
        const html = [
            `<strong>${escapeHtml(p.city)}</strong>, ${escapeHtml(p.country_code)}<br/>`,
            `Population: ${grouped(p.population)}<br/>`,
            `Car network: ${km(p.car_len_km)}<br/>`,
            `Foot network: ${km(p.footway_len_km)}<br/>`,
            `Foot/Car Ratio: ${ratio}`,
        ].join('\n');

        while (Math.abs(e.lngLat.lng - coordinates[0]) > 180) {
            coordinates[0] += e.lngLat.lng > coordinates[0] ? 360 : -360;
        }
        popup.setLngLat(coordinates).setHTML(html).addTo(map);
    });

    map.on('mouseleave', __LAYER__, () => {
        map.getCanvas().style.cursor = '';
        popup.remove();
    });
"#;

pub struct WebBundle {
    pub html: String,
    pub script: String,
    pub data: String,
}

/// Writes a MapLibre page that shows the same map interactively.
pub struct ExportWebEtl<'a> {
    view: &'a MapView,
}

impl ExportWebEtl<'_> {
    pub fn new(view: &MapView) -> ExportWebEtl<'_> {
        ExportWebEtl { view }
    }

    fn output_path(dir: &Path) -> PathBuf {
        dir.join(HTML_FILE_NAME)
    }

    fn script(&self) -> Result<String> {
        let map = self.view.map();
        let options = map.options();
        let layer = map
            .layer(LAYER_ID)
            .ok_or("The map has no city layer, was it loaded?")?;

        let map_options = json!({
            "container": options.container,
            "style": options.style_url,
            "center": [options.center.lng, options.center.lat],
            "zoom": options.zoom,
        });
        let source = json!({ "type": "geojson", "data": DATA_FILE_NAME });
        let handlers = HANDLERS_JS.replace("__LAYER__", &serde_json::to_string(LAYER_ID)?);

        Ok(format!(
            "const map = new maplibregl.Map({map_options});\n\n\
             map.on('load', () => {{\n    \
                 map.addSource({source_id}, {source});\n\n    \
                 map.addLayer({layer});\n\
             {handlers}}});\n",
            map_options = serde_json::to_string_pretty(&map_options)?,
            source_id = serde_json::to_string(SOURCE_ID)?,
            source = serde_json::to_string(&source)?,
            layer = serde_json::to_string(&layer.to_maplibre()?)?,
        ))
    }

    fn html(&self) -> String {
        let container = escape(&self.view.map().options().container).into_owned();
        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>City street networks</title>
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <script src="https://unpkg.com/maplibre-gl@{MAPLIBRE_VERSION}/dist/maplibre-gl.js"></script>
    <link href="https://unpkg.com/maplibre-gl@{MAPLIBRE_VERSION}/dist/maplibre-gl.css" rel="stylesheet">
    <style>
        body {{ margin: 0; padding: 0; }}
        #{container} {{ position: absolute; top: 0; bottom: 0; width: 100%; }}
    </style>
</head>
<body>
    <div id="{container}"></div>
    <script src="{SCRIPT_FILE_NAME}"></script>
</body>
</html>
"#
        )
    }
}

impl Etl for ExportWebEtl<'_> {
    type Input = ();
    type Output = WebBundle;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    fn is_cached(&self, dir: &Path) -> Result<bool> {
        Ok(Self::output_path(dir).exists())
    }

    fn clean(&self, dir: &Path) -> Result<()> {
        for name in [HTML_FILE_NAME, SCRIPT_FILE_NAME, DATA_FILE_NAME] {
            remove_if_exists(&dir.join(name))?;
        }
        Ok(())
    }

    fn extract(&mut self, _dir: &Path) -> Result<Self::Input> {
        Ok(())
    }

    fn transform(&mut self, _input: Self::Input) -> Result<Self::Output> {
        let data = self
            .view
            .map()
            .source(SOURCE_ID)
            .ok_or("The map has no city source, was it loaded?")?
            .to_geojson();
        Ok(WebBundle {
            html: self.html(),
            script: self.script()?,
            data: serde_json::to_string(&data)?,
        })
    }

    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()> {
        fs::write(dir.join(DATA_FILE_NAME), output.data)?;
        fs::write(dir.join(SCRIPT_FILE_NAME), output.script)?;
        fs::write(Self::output_path(dir), output.html)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::city::sample_city;
    use crate::data::CityDataset;
    use tempfile::tempdir;
    use crate::style::layer::CirclePaint;
    use crate::view::MapOptions;

    fn loaded_view() -> MapView {
        let options = MapOptions {
            style_url: "https://api.maptiler.com/maps/streets/style.json?key=KEY".to_string(),
            ..MapOptions::default()
        };
        let mut view = MapView::new(options, 800.0, 600.0).unwrap();
        view.on_load(
            CityDataset::new(vec![sample_city("Dakar", -17.4, 3100.0, Some(0.6))]),
            CirclePaint::default(),
        )
        .unwrap();
        view
    }

    #[test]
    fn bundle_is_written() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path();
        let view = loaded_view();
        let mut etl = ExportWebEtl::new(&view);
        etl.clean(&dir).unwrap();
        etl.process(&dir).unwrap();

        let script = fs::read_to_string(dir.join(SCRIPT_FILE_NAME)).unwrap();
        assert!(script.contains("\"style\": \"https://api.maptiler.com/maps/streets/style.json?key=KEY\""));
        assert!(script.contains("\"center\": [\n    0.0,\n    20.0\n  ]"));
        assert!(script.contains("map.addSource(\"cities\", {\"data\":\"cities_data.geojson\",\"type\":\"geojson\"})"));
        assert!(script.contains("[\"get\",\"car_len_km\"],0.0,2.0,50000.0,20.0"));
        assert!(script.contains("map.on('mouseenter', \"cities-layer\""));

        let html = fs::read_to_string(dir.join(HTML_FILE_NAME)).unwrap();
        assert!(html.contains("<div id=\"map\"></div>"));
        assert!(html.contains("maplibre-gl@4.7.1"));

        let data: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.join(DATA_FILE_NAME)).unwrap()).unwrap();
        assert_eq!(data["features"][0]["properties"]["city"], "Dakar");
    }

    #[test]
    fn unloaded_map_cannot_be_exported() {
        let view = MapView::new(MapOptions::default(), 800.0, 600.0).unwrap();
        let mut etl = ExportWebEtl::new(&view);
        assert!(etl.transform(()).is_err());
    }
}
