use std::f32::consts::PI;
use std::fs::File;
use std::path::{Path, PathBuf};

use log::{info, warn};
use png::{BitDepth, ColorType};
use raqote::{DrawOptions, DrawTarget, Image, LineCap, LineJoin, PathBuilder, SolidSource, Source, StrokeStyle};

use crate::{
    data::geo::{LngLat, ScreenPoint},
    errors::Result,
    style::{color::Color, layer::CircleStyle},
    view::{popup::{html_to_lines, Popup}, MapView},
    UserConfig,
};

use super::{remove_if_exists, Etl};

mod fk {
    pub use font_kit::canvas::{Canvas, Format, RasterizationOptions};
    pub use font_kit::font::Font;
    pub use font_kit::hinting::HintingOptions;
    pub use pathfinder_geometry::transform2d::Transform2F;
    pub use pathfinder_geometry::vector::{vec2f, vec2i};
}

pub const ETL_NAME: &str = "draw_map";
pub const OUTPUT_FILE_NAME: &str = "snapshot.png";

const BACKGROUND: Color = Color::rgb(0.949, 0.937, 0.914);
const POPUP_POINT_SIZE: f32 = 14.0;
const POPUP_PADDING: f32 = 10.0;
const POPUP_TIP: f32 = 10.0;

/// Premultiplied ARGB pixels, the layout raqote draws with.
pub struct OwnedImage {
    pub width: i32,
    pub height: i32,
    pub data: Vec<u32>,
}

fn premultiplied_argb(r: u8, g: u8, b: u8, a: u8) -> u32 {
    let mul = |c: u8| u32::from(c) * u32::from(a) / 255;
    (u32::from(a) << 24) | (mul(r) << 16) | (mul(g) << 8) | mul(b)
}

/// Composites black at `coverage` over a premultiplied pixel.
fn over_black(pixel: u32, coverage: u8) -> u32 {
    let coverage = u32::from(coverage);
    let keep = 255 - coverage;
    let scale = |shift: u32| ((pixel >> shift) & 0xFF) * keep / 255;
    let a = coverage + scale(24);
    (a << 24) | (scale(16) << 16) | (scale(8) << 8) | scale(0)
}

pub fn load_image(path: &Path) -> Result<OwnedImage> {
    let decoder = png::Decoder::new(File::open(path)?);
    let mut reader = decoder.read_info()?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf)?;

    if info.bit_depth != BitDepth::Eight {
        return Err("Unsupported bit depth".into())
    }

    let bytes = &buf[..info.buffer_size()];
    let data: Vec<u32> = match info.color_type {
        ColorType::Rgba => bytes
            .chunks_exact(4)
            .map(|px| premultiplied_argb(px[0], px[1], px[2], px[3]))
            .collect(),
        ColorType::Rgb => bytes
            .chunks_exact(3)
            .map(|px| premultiplied_argb(px[0], px[1], px[2], 0xFF))
            .collect(),
        ColorType::GrayscaleAlpha => bytes
            .chunks_exact(2)
            .map(|px| premultiplied_argb(px[0], px[0], px[0], px[1]))
            .collect(),
        ColorType::Grayscale => bytes
            .iter()
            .map(|g| premultiplied_argb(*g, *g, *g, 0xFF))
            .collect(),
        other => return Err(format!("Unsupported colour type {other:?}").into()),
    };

    Ok(OwnedImage {
        width: info.width.try_into()?,
        height: info.height.try_into()?,
        data,
    })
}

/// Renders the map state (basemap, city circles on every visible world copy
/// and the open popup) into a PNG.
pub struct DrawMapEtl<'a> {
    user_config: &'a UserConfig,
    view: &'a MapView,
    basemap: Option<OwnedImage>,
    font: Option<fk::Font>,
}

impl DrawMapEtl<'_> {
    fn output_path(dir: &Path) -> PathBuf {
        dir.join(OUTPUT_FILE_NAME)
    }

    pub fn new<'a>(user_config: &'a UserConfig, view: &'a MapView) -> Result<DrawMapEtl<'a>> {
        let basemap = match &user_config.basemap_image {
            Some(path) => Some(load_image(Path::new(path))?),
            None => None,
        };
        let font = match &user_config.font_path {
            Some(path) => Some(fk::Font::from_path(path, 0)?),
            None => None,
        };
        Ok(DrawMapEtl {
            user_config,
            view,
            basemap,
            font,
        })
    }

    fn stroke(width: f32) -> StrokeStyle {
        StrokeStyle {
            cap: LineCap::Round,
            join: LineJoin::Round,
            width,
            miter_limit: 2.0,
            dash_array: Vec::new(),
            dash_offset: 0.0,
        }
    }

    fn draw_circle(dt: &mut DrawTarget, center: &ScreenPoint, style: &CircleStyle) {
        let (x, y) = (center.x as f32, center.y as f32);
        let radius = style.radius.max(0.0) as f32;

        let mut pb = PathBuilder::new();
        pb.arc(x, y, radius, 0.0, 2.0 * PI);
        pb.close();
        dt.fill(
            &pb.finish(),
            &Source::Solid(style.color.to_solid_source(style.opacity)),
            &DrawOptions::new(),
        );

        if style.stroke_width > 0.0 {
            let width = style.stroke_width as f32;
            let mut pb = PathBuilder::new();
            pb.arc(x, y, radius + width / 2.0, 0.0, 2.0 * PI);
            pb.close();
            dt.stroke(
                &pb.finish(),
                &Source::Solid(style.stroke_color.to_solid_source(1.0)),
                &Self::stroke(width),
                &DrawOptions::new(),
            );
        }
    }

    fn draw_layers(&self, dt: &mut DrawTarget) {
        let map = self.view.map();
        let camera = map.camera();
        for layer in map.layers() {
            let Some(source) = map.source(&layer.source) else {
                continue;
            };
            let mut drawn = 0usize;
            for feature in tqdm::tqdm(source.features().iter()) {
                let style = layer.paint.resolve(feature);
                let reach = style.hit_radius();
                for copy in camera.visible_world_copies(reach) {
                    let center = camera.project(&LngLat::new(
                        feature.coordinates.lng + 360.0 * copy as f64,
                        feature.coordinates.lat,
                    ));
                    if center.x < -reach
                        || center.y < -reach
                        || center.x > camera.width + reach
                        || center.y > camera.height + reach {
                        continue;
                    }
                    Self::draw_circle(dt, &center, &style);
                    drawn += 1;
                }
            }
            info!(layer = layer.id.as_str(), circles = drawn; "Drew layer");
        }
    }

    fn text_width(font: &fk::Font, point_size: f32, text: &str) -> Result<f32> {
        let scale = point_size / font.metrics().units_per_em as f32;
        let mut width = 0.0;
        for c in text.chars() {
            if let Some(id) = font.glyph_for_char(c) {
                width += font.advance(id)?.x() * scale;
            }
        }
        Ok(width)
    }

    fn draw_text(dt: &mut DrawTarget, font: &fk::Font, text: &str, left: f32, top: f32, line_height: f32) -> Result<()> {
        let scale = POPUP_POINT_SIZE / font.metrics().units_per_em as f32;
        let ascent = font.metrics().ascent * scale;
        let width = Self::text_width(font, POPUP_POINT_SIZE, text)?.ceil() as i32 + 2;
        let height = line_height.ceil() as i32;

        let mut canvas = fk::Canvas::new(fk::vec2i(width, height), fk::Format::A8);
        let mut pen_x = 0.0;
        for c in text.chars() {
            let Some(id) = font.glyph_for_char(c) else {
                continue;
            };
            font.rasterize_glyph(
                &mut canvas,
                id,
                POPUP_POINT_SIZE,
                fk::Transform2F::from_translation(fk::vec2f(pen_x, ascent)),
                fk::HintingOptions::None,
                fk::RasterizationOptions::GrayscaleAa,
            )?;
            pen_x += font.advance(id)?.x() * scale;
        }

        let (origin_x, origin_y) = (left.round() as i32, top.round() as i32);
        let (dt_width, dt_height) = (dt.width(), dt.height());
        let data = dt.get_data_mut();
        for y in 0..canvas.size.y() {
            for x in 0..canvas.size.x() {
                let (px, py) = (origin_x + x, origin_y + y);
                if px < 0 || py < 0 || px >= dt_width || py >= dt_height {
                    continue;
                }
                let coverage = canvas.pixels[y as usize * canvas.stride + x as usize];
                if coverage > 0 {
                    let idx = (py * dt_width + px) as usize;
                    data[idx] = over_black(data[idx], coverage);
                }
            }
        }
        Ok(())
    }

    fn draw_popup(&self, dt: &mut DrawTarget, popup: &Popup) -> Result<()> {
        let Some(font) = &self.font else {
            warn!("No font configured, popup left out of the snapshot");
            return Ok(());
        };
        let Some(anchor) = popup.lng_lat() else {
            return Ok(());
        };
        let lines = html_to_lines(popup.html())?;
        let metrics = font.metrics();
        let scale = POPUP_POINT_SIZE / metrics.units_per_em as f32;
        let line_height = ((metrics.ascent - metrics.descent) * scale * 1.2).ceil();

        let mut box_width: f32 = 0.0;
        for line in &lines {
            box_width = box_width.max(Self::text_width(font, POPUP_POINT_SIZE, line)?);
        }
        box_width += 2.0 * POPUP_PADDING;
        let box_height = lines.len() as f32 * line_height + 2.0 * POPUP_PADDING;

        let point = self.view.map().camera().project(&anchor);
        let (x, y) = (point.x as f32, point.y as f32);
        let left = x - box_width / 2.0;
        let top = y - POPUP_TIP - box_height;

        let mut pb = PathBuilder::new();
        pb.rect(left, top, box_width, box_height);
        pb.move_to(x - POPUP_TIP, y - POPUP_TIP);
        pb.line_to(x, y);
        pb.line_to(x + POPUP_TIP, y - POPUP_TIP);
        pb.close();
        let outline = pb.finish();
        dt.fill(&outline, &Source::Solid(Color::WHITE.to_solid_source(1.0)), &DrawOptions::new());
        dt.stroke(
            &outline,
            &Source::Solid(SolidSource::from_unpremultiplied_argb(0x40, 0, 0, 0)),
            &Self::stroke(1.0),
            &DrawOptions::new(),
        );

        for (i, line) in lines.iter().enumerate() {
            let line_top = top + POPUP_PADDING + i as f32 * line_height;
            Self::draw_text(dt, font, line, left + POPUP_PADDING, line_top, line_height)?;
        }
        Ok(())
    }
}

impl Etl for DrawMapEtl<'_> {
    type Input = ();

    type Output = DrawTarget;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    fn is_cached(&self, dir: &Path) -> Result<bool> {
        Ok(Self::output_path(dir).exists())
    }

    fn clean(&self, dir: &Path) -> Result<()> {
        remove_if_exists(&Self::output_path(dir))
    }

    fn extract(&mut self, _dir: &Path) -> Result<Self::Input> {
        Ok(())
    }

    fn transform(&mut self, _input: Self::Input) -> Result<Self::Output> {
        let width: i32 = self.user_config.width_px.try_into()?;
        let height: i32 = self.user_config.height_px.try_into()?;
        let mut dt = DrawTarget::new(width, height);
        dt.clear(BACKGROUND.to_solid_source(1.0));

        if let Some(basemap) = &self.basemap {
            let img = Image {
                width: basemap.width,
                height: basemap.height,
                data: &basemap.data,
            };
            dt.draw_image_with_size_at(width as f32, height as f32, 0.0, 0.0, &img, &DrawOptions::new());
        }

        self.draw_layers(&mut dt);

        if let Some(popup) = self.view.popup().filter(|popup| popup.is_open()) {
            self.draw_popup(&mut dt, popup)?;
        }
        Ok(dt)
    }

    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()> {
        output.write_png(
            Self::output_path(dir)
        ).map_err(|_| "Couldn't write png. (encoding error)".into())
    }
}
