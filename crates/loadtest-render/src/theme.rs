/// Colours and typography shared by every chart.
///
/// All colours are SVG colour strings.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartTheme {
    // ── Canvas ───────────────────────────────────────────────────────────────
    pub background: &'static str,
    pub plot_border: &'static str,
    pub grid: &'static str,

    // ── Text ─────────────────────────────────────────────────────────────────
    pub font_family: &'static str,
    pub title: &'static str,
    pub label: &'static str,
    pub tick: &'static str,
    pub title_size: f64,
    pub label_size: f64,
    pub tick_size: f64,

    // ── Series ───────────────────────────────────────────────────────────────
    /// Cycled by series index.
    pub palette: &'static [&'static str],
    pub line_width: f64,
    pub marker_radius: f64,
    /// Horizontal threshold lines (e.g. target CPU).
    pub reference: &'static str,

    // ── Legend ───────────────────────────────────────────────────────────────
    pub legend_background: &'static str,
    pub legend_border: &'static str,
}

impl ChartTheme {
    /// White background, grey grid, tab10-style series colours.
    pub fn light() -> Self {
        Self {
            background: "#ffffff",
            plot_border: "#444444",
            grid: "#dddddd",
            font_family: "DejaVu Sans, Liberation Sans, Arial, sans-serif",
            title: "#111111",
            label: "#222222",
            tick: "#444444",
            title_size: 20.0,
            label_size: 15.0,
            tick_size: 12.0,
            palette: &["#1f77b4", "#ff7f0e", "#2ca02c", "#9467bd", "#8c564b"],
            line_width: 2.0,
            marker_radius: 4.0,
            reference: "#d62728",
            legend_background: "rgba(255,255,255,0.9)",
            legend_border: "#bbbbbb",
        }
    }

    /// Colour for the series at `index`.
    pub fn series_color(&self, index: usize) -> &'static str {
        self.palette[index % self.palette.len()]
    }
}

impl Default for ChartTheme {
    fn default() -> Self {
        Self::light()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_color_cycles() {
        let theme = ChartTheme::light();
        let n = theme.palette.len();
        assert_eq!(theme.series_color(0), theme.series_color(n));
        assert_ne!(theme.series_color(0), theme.series_color(1));
    }

    #[test]
    fn test_reference_is_red() {
        assert_eq!(ChartTheme::default().reference, "#d62728");
    }
}
