//! SVG to PNG conversion.

use std::path::Path;

use loadtest_core::error::{PipelineError, Result};
use png::{BitDepth, ColorType, Encoder};
use resvg::tiny_skia::{Pixmap, Transform};
use resvg::usvg::{Options, Tree};

/// Rasterizes SVG documents with a font database loaded once.
pub struct Rasterizer {
    options: Options<'static>,
}

impl Rasterizer {
    /// Build a rasterizer backed by the system fonts.
    pub fn new() -> Self {
        let mut options = Options::default();
        options.fontdb_mut().load_system_fonts();
        Self { options }
    }

    /// Render `svg` into PNG bytes of `width` × `height` pixels.
    pub fn svg_to_png(&self, chart: &str, svg: &str, width: u32, height: u32) -> Result<Vec<u8>> {
        let render_err = |reason: String| PipelineError::Render {
            chart: chart.to_string(),
            reason,
        };

        let tree = Tree::from_data(svg.as_bytes(), &self.options)
            .map_err(|err| render_err(format!("SVG parse failed: {err}")))?;

        let mut pixmap = Pixmap::new(width, height)
            .ok_or_else(|| render_err(format!("cannot allocate {width}x{height} pixmap")))?;
        let mut pixmap_ref = pixmap.as_mut();
        resvg::render(&tree, Transform::default(), &mut pixmap_ref);

        let mut out = Vec::new();
        let mut encoder = Encoder::new(&mut out, width, height);
        encoder.set_color(ColorType::Rgba);
        encoder.set_depth(BitDepth::Eight);
        encoder
            .write_header()
            .map_err(|err| render_err(err.to_string()))?
            .write_image_data(pixmap.data())
            .map_err(|err| render_err(err.to_string()))?;

        Ok(out)
    }

    /// Render `svg` and write the PNG to `path`.
    pub fn write_png(&self, path: &Path, svg: &str, width: u32, height: u32) -> Result<()> {
        let chart = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let bytes = self.svg_to_png(&chart, svg, width, height)?;
        std::fs::write(path, bytes).map_err(|err| PipelineError::Render {
            chart,
            reason: err.to_string(),
        })
    }
}

impl Default for Rasterizer {
    fn default() -> Self {
        Self::new()
    }
}
