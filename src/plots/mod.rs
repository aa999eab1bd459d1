//! Off-screen chart rendering.
//!
//! Every chart is drawn into its own RGB buffer, encoded as PNG and returned
//! as a base64 string, so concurrent requests never share a surface. Text is
//! only drawn when a TrueType font was registered through
//! [`Renderer::with_font`]; otherwise charts come out without captions, axis
//! labels or annotations.

pub mod charts;

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use log::{info, warn};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::FontStyle;
use serde::Serialize;

use crate::error::RenderError;

pub use charts::{
    BarChart, BarSeries, Heatmap, Histogram, Line, LineChart, Orientation, Palette, PieChart,
    PieSlice,
};

pub(crate) const FONT_FAMILY: &str = "sans-serif";

pub type Area<'a> = DrawingArea<BitMapBackend<'a>, Shift>;

/// A rendered chart, or the reason it could not be drawn.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Chart {
    Image(String),
    Failed { error: String },
}

impl Chart {
    pub fn is_image(&self) -> bool {
        matches!(self, Chart::Image(_))
    }
}

impl From<Result<String, RenderError>> for Chart {
    fn from(result: Result<String, RenderError>) -> Self {
        match result {
            Ok(image) => Chart::Image(image),
            Err(err) => {
                warn!("chart not rendered: {err}");
                Chart::Failed {
                    error: err.to_string(),
                }
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Renderer {
    labels: bool,
}

impl Renderer {
    /// Charts without any text.
    pub fn unlabeled() -> Self {
        Self { labels: false }
    }

    /// Register the font at `path` for all charts drawn by this process.
    pub fn with_font(path: &Path) -> Result<Self, RenderError> {
        let bytes = std::fs::read(path)
            .map_err(|e| RenderError::Drawing(format!("cannot read font {path:?}: {e}")))?;
        // plotters keeps registered fonts for the life of the process.
        let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
        plotters::style::register_font(FONT_FAMILY, FontStyle::Normal, bytes)
            .map_err(|_| RenderError::Drawing(format!("{path:?} is not a usable font")))?;
        info!("chart font registered from {}", path.display());
        Ok(Self { labels: true })
    }

    /// Use the font at `path` when there is one, else draw unlabeled charts.
    pub fn from_font_path(path: Option<&Path>) -> Self {
        match path {
            Some(path) => Self::with_font(path).unwrap_or_else(|err| {
                warn!("{err}; charts will be drawn without text");
                Self::unlabeled()
            }),
            None => Self::unlabeled(),
        }
    }

    pub fn labels(&self) -> bool {
        self.labels
    }

    /// Draw into a fresh `width` x `height` canvas and return the PNG as base64.
    pub fn render<F>(&self, (width, height): (u32, u32), draw: F) -> Result<String, RenderError>
    where
        F: FnOnce(&Area<'_>, bool) -> Result<(), RenderError>,
    {
        let mut buffer = vec![0u8; width as usize * height as usize * 3];
        {
            let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
            root.fill(&WHITE)?;
            draw(&root, self.labels)?;
            root.present()?;
        }
        encode_png(&buffer, width, height)
    }
}

pub fn encode_png(rgb: &[u8], width: u32, height: u32) -> Result<String, RenderError> {
    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(rgb, width, height, ColorType::Rgb8)
        .map_err(|e| RenderError::Encode(e.to_string()))?;
    Ok(STANDARD.encode(png))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC_BASE64: &str = "iVBORw0KGgo";

    #[test]
    fn blank_canvas_encodes_to_png() {
        let image = Renderer::unlabeled()
            .render((40, 30), |_, _| Ok(()))
            .unwrap();
        assert!(image.starts_with(PNG_MAGIC_BASE64));
    }

    #[test]
    fn draw_errors_become_chart_errors() {
        let chart: Chart = Renderer::unlabeled()
            .render((10, 10), |_, _| Err(RenderError::EmptyData("series")))
            .into();
        assert_eq!(
            serde_json::to_value(&chart).unwrap(),
            serde_json::json!({"error": "nothing to draw: series"})
        );
    }

    #[test]
    fn missing_font_falls_back_to_unlabeled() {
        let renderer = Renderer::from_font_path(Some(Path::new("/no/such/font.ttf")));
        assert!(!renderer.labels());
    }

    #[test]
    fn image_serializes_as_a_bare_string() {
        let chart = Chart::Image("abc".into());
        assert_eq!(serde_json::to_value(&chart).unwrap(), serde_json::json!("abc"));
        assert!(chart.is_image());
    }
}
