//! Time-series line charts drawn as SVG.
//!
//! A [`LineChart`] holds one or more series over a shared UTC time axis and
//! an optional horizontal reference line. [`LineChart::to_svg`] lays out the
//! axes, grid, legend and series and returns a standalone SVG document that
//! [`crate::raster::Rasterizer`] turns into a PNG.

use std::fmt::Write;

use chrono::{DateTime, TimeZone, Utc};

use crate::theme::ChartTheme;

const MARGIN_LEFT: f64 = 96.0;
const MARGIN_RIGHT: f64 = 40.0;
const MARGIN_TOP: f64 = 64.0;
const MARGIN_BOTTOM: f64 = 72.0;

/// Approximate number of value-axis intervals.
const Y_TICK_TARGET: f64 = 5.0;
/// Approximate number of time-axis intervals.
const X_TICK_TARGET: f64 = 6.0;
/// Largest magnitude the value axis spans; keeps `max - min` finite.
const VALUE_LIMIT: f64 = f64::MAX / 8.0;
/// Upper bound on gridlines per axis.
const MAX_TICKS: f64 = 1000.0;

/// Candidate time-axis tick spacings in seconds.
const TIME_STEPS: &[f64] = &[
    1.0, 2.0, 5.0, 10.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 900.0, 1800.0, 3600.0, 7200.0,
    10800.0, 21600.0, 43200.0, 86400.0,
];

// ── Chart model ───────────────────────────────────────────────────────────────

/// Point marker drawn at every sample of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Marker {
    #[default]
    None,
    Circle,
    Cross,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub label: String,
    pub points: Vec<(DateTime<Utc>, f64)>,
    pub marker: Marker,
}

impl Series {
    pub fn new(label: impl Into<String>, points: Vec<(DateTime<Utc>, f64)>) -> Self {
        Self {
            label: label.into(),
            points,
            marker: Marker::None,
        }
    }

    pub fn with_marker(mut self, marker: Marker) -> Self {
        self.marker = marker;
        self
    }
}

/// Dashed horizontal line across the whole plot area.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceLine {
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineChart {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub series: Vec<Series>,
    pub reference: Option<ReferenceLine>,
    pub width: u32,
    pub height: u32,
}

impl LineChart {
    pub fn new(
        title: impl Into<String>,
        x_label: impl Into<String>,
        y_label: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            x_label: x_label.into(),
            y_label: y_label.into(),
            series: Vec::new(),
            reference: None,
            width: 1200,
            height: 600,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_series(mut self, series: Series) -> Self {
        self.series.push(series);
        self
    }

    pub fn with_reference(mut self, label: impl Into<String>, value: f64) -> Self {
        self.reference = Some(ReferenceLine {
            label: label.into(),
            value,
        });
        self
    }

    /// Number of legend entries: one per series plus the reference line.
    pub fn legend_len(&self) -> usize {
        self.series.len() + usize::from(self.reference.is_some())
    }

    /// `true` when at least one series has a sample.
    pub fn has_data(&self) -> bool {
        self.series.iter().any(|s| !s.points.is_empty())
    }

    // ── SVG output ───────────────────────────────────────────────────────────

    /// Render the chart as a standalone SVG document.
    pub fn to_svg(&self, theme: &ChartTheme) -> String {
        let width = f64::from(self.width);
        let height = f64::from(self.height);
        let plot = PlotArea {
            left: MARGIN_LEFT,
            top: MARGIN_TOP,
            width: (width - MARGIN_LEFT - MARGIN_RIGHT).max(1.0),
            height: (height - MARGIN_TOP - MARGIN_BOTTOM).max(1.0),
        };
        let x_axis = self.time_axis();
        let y_axis = self.value_axis();

        let mut svg = String::new();
        let _ = writeln!(
            svg,
            "<svg xmlns='http://www.w3.org/2000/svg' width='{w}' height='{h}' viewBox='0 0 {w} {h}'>",
            w = self.width,
            h = self.height
        );
        let _ = writeln!(
            svg,
            "  <rect x='0' y='0' width='{}' height='{}' fill='{}'/>",
            self.width, self.height, theme.background
        );
        let _ = writeln!(
            svg,
            "  <defs><clipPath id='plot-area'><rect x='{:.2}' y='{:.2}' width='{:.2}' height='{:.2}'/></clipPath></defs>",
            plot.left, plot.top, plot.width, plot.height
        );

        // Title
        let _ = writeln!(
            svg,
            "  <text x='{:.2}' y='{:.2}' text-anchor='middle' fill='{}' font-family='{}' font-size='{}' font-weight='600'>{}</text>",
            width / 2.0,
            MARGIN_TOP / 2.0 + 6.0,
            theme.title,
            theme.font_family,
            theme.title_size,
            escape_text(&self.title)
        );

        self.write_grid(&mut svg, theme, &plot, &x_axis, &y_axis);

        let _ = writeln!(
            svg,
            "  <rect x='{:.2}' y='{:.2}' width='{:.2}' height='{:.2}' fill='none' stroke='{}' stroke-width='1'/>",
            plot.left, plot.top, plot.width, plot.height, theme.plot_border
        );

        // Series and reference line, clipped to the plot area
        let _ = writeln!(svg, "  <g clip-path='url(#plot-area)'>");
        if let Some(reference) = &self.reference {
            let y = plot.y(&y_axis, reference.value);
            let _ = writeln!(
                svg,
                "    <line x1='{:.2}' y1='{y:.2}' x2='{:.2}' y2='{y:.2}' stroke='{}' stroke-width='{}' stroke-dasharray='10 6'/>",
                plot.left,
                plot.left + plot.width,
                theme.reference,
                theme.line_width
            );
        }
        for (idx, series) in self.series.iter().enumerate() {
            write_series(&mut svg, theme, theme.series_color(idx), series, &plot, &x_axis, &y_axis);
        }
        let _ = writeln!(svg, "  </g>");

        // Axis labels
        let _ = writeln!(
            svg,
            "  <text x='{:.2}' y='{:.2}' text-anchor='middle' fill='{}' font-family='{}' font-size='{}'>{}</text>",
            plot.left + plot.width / 2.0,
            height - 18.0,
            theme.label,
            theme.font_family,
            theme.label_size,
            escape_text(&self.x_label)
        );
        let (lx, ly) = (24.0, plot.top + plot.height / 2.0);
        let _ = writeln!(
            svg,
            "  <text x='{lx:.2}' y='{ly:.2}' transform='rotate(-90 {lx:.2} {ly:.2})' text-anchor='middle' fill='{}' font-family='{}' font-size='{}'>{}</text>",
            theme.label,
            theme.font_family,
            theme.label_size,
            escape_text(&self.y_label)
        );

        if self.legend_len() > 1 {
            self.write_legend(&mut svg, theme, &plot);
        }

        let _ = writeln!(svg, "</svg>");
        svg
    }

    fn time_axis(&self) -> Axis {
        let xs = self
            .series
            .iter()
            .flat_map(|s| s.points.iter().map(|(ts, _)| epoch_seconds(*ts)));
        let (mut min, mut max) = min_max(xs).unwrap_or((0.0, 1.0));
        if max - min < 1e-9 {
            min -= 30.0;
            max += 30.0;
        }
        Axis { min, max }
    }

    fn value_axis(&self) -> Axis {
        let ys = self
            .series
            .iter()
            .flat_map(|s| s.points.iter().map(|(_, v)| *v))
            .chain(self.reference.as_ref().map(|r| r.value))
            .filter(|v| v.is_finite())
            .map(|v| v.clamp(-VALUE_LIMIT, VALUE_LIMIT));
        let (mut lo, mut hi) = min_max(ys).unwrap_or((0.0, 1.0));
        if hi - lo < 1e-12 {
            let pad = (hi.abs() * 0.1).max(1.0);
            lo -= pad;
            hi += pad;
        } else {
            let pad = (hi - lo) * 0.05;
            lo -= pad;
            hi += pad;
        }
        let step = nice_step((hi - lo) / Y_TICK_TARGET);
        Axis {
            min: (lo / step).floor() * step,
            max: (hi / step).ceil() * step,
        }
    }

    fn write_grid(&self, svg: &mut String, theme: &ChartTheme, plot: &PlotArea, x: &Axis, y: &Axis) {
        let _ = writeln!(svg, "  <g>");

        let y_step = nice_step((y.max - y.min) / Y_TICK_TARGET);
        for value in value_ticks(y, y_step) {
            let py = plot.y(y, value);
            let _ = writeln!(
                svg,
                "    <line x1='{:.2}' y1='{py:.2}' x2='{:.2}' y2='{py:.2}' stroke='{}' stroke-width='1'/>",
                plot.left,
                plot.left + plot.width,
                theme.grid
            );
            let _ = writeln!(
                svg,
                "    <text x='{:.2}' y='{:.2}' text-anchor='end' fill='{}' font-family='{}' font-size='{}'>{}</text>",
                plot.left - 8.0,
                py + theme.tick_size / 3.0,
                theme.tick,
                theme.font_family,
                theme.tick_size,
                format_tick(value, y_step)
            );
        }

        let x_step = time_step(x.max - x.min);
        let long_span = x.max - x.min >= 2.0 * 86400.0;
        for secs in time_ticks(x, x_step) {
            let px = plot.x(x, secs);
            let _ = writeln!(
                svg,
                "    <line x1='{px:.2}' y1='{:.2}' x2='{px:.2}' y2='{:.2}' stroke='{}' stroke-width='1'/>",
                plot.top,
                plot.top + plot.height,
                theme.grid
            );
            let _ = writeln!(
                svg,
                "    <text x='{px:.2}' y='{:.2}' text-anchor='middle' fill='{}' font-family='{}' font-size='{}'>{}</text>",
                plot.top + plot.height + theme.tick_size + 8.0,
                theme.tick,
                theme.font_family,
                theme.tick_size,
                format_time_tick(secs, long_span)
            );
        }

        let _ = writeln!(svg, "  </g>");
    }

    fn write_legend(&self, svg: &mut String, theme: &ChartTheme, plot: &PlotArea) {
        let labels: Vec<&str> = self
            .series
            .iter()
            .map(|s| s.label.as_str())
            .chain(self.reference.as_ref().map(|r| r.label.as_str()))
            .collect();
        let longest = labels.iter().map(|l| l.chars().count()).max().unwrap_or(0) as f64;
        let row_height = 22.0;
        let box_w = 48.0 + longest * theme.tick_size * 0.62;
        let box_h = labels.len() as f64 * row_height + 12.0;
        let box_x = plot.left + plot.width - box_w - 12.0;
        let box_y = plot.top + 12.0;

        let _ = writeln!(svg, "  <g transform='translate({box_x:.2} {box_y:.2})'>");
        let _ = writeln!(
            svg,
            "    <rect x='0' y='0' width='{box_w:.2}' height='{box_h:.2}' rx='4' fill='{}' stroke='{}'/>",
            theme.legend_background, theme.legend_border
        );
        for (idx, label) in labels.iter().enumerate() {
            let cy = 6.0 + row_height * idx as f64 + row_height / 2.0;
            let (color, dashed, marker) = match self.series.get(idx) {
                Some(series) => (theme.series_color(idx), false, series.marker),
                None => (theme.reference, true, Marker::None),
            };
            let dash = if dashed { " stroke-dasharray='6 4'" } else { "" };
            let _ = writeln!(
                svg,
                "    <line x1='10' y1='{cy:.2}' x2='34' y2='{cy:.2}' stroke='{color}' stroke-width='{}'{dash}/>",
                theme.line_width
            );
            write_marker(svg, marker, 22.0, cy, theme.marker_radius, color);
            let _ = writeln!(
                svg,
                "    <text x='42' y='{:.2}' fill='{}' font-family='{}' font-size='{}'>{}</text>",
                cy + theme.tick_size / 3.0,
                theme.label,
                theme.font_family,
                theme.tick_size,
                escape_text(label)
            );
        }
        let _ = writeln!(svg, "  </g>");
    }
}

// ── Layout helpers ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
struct Axis {
    min: f64,
    max: f64,
}

impl Axis {
    /// Position of `v` on the axis as a fraction in `[0, 1]`.
    fn fraction(&self, v: f64) -> f64 {
        let span = self.max - self.min;
        if span.is_finite() && span > 0.0 {
            (v.max(self.min).min(self.max) - self.min) / span
        } else {
            0.5
        }
    }
}

struct PlotArea {
    left: f64,
    top: f64,
    width: f64,
    height: f64,
}

impl PlotArea {
    fn x(&self, axis: &Axis, secs: f64) -> f64 {
        self.left + axis.fraction(secs) * self.width
    }

    fn y(&self, axis: &Axis, value: f64) -> f64 {
        self.top + (1.0 - axis.fraction(value)) * self.height
    }
}

fn write_series(
    svg: &mut String,
    theme: &ChartTheme,
    color: &str,
    series: &Series,
    plot: &PlotArea,
    x: &Axis,
    y: &Axis,
) {
    let coords: Vec<(f64, f64)> = series
        .points
        .iter()
        .filter(|(_, v)| v.is_finite())
        .map(|(ts, v)| (plot.x(x, epoch_seconds(*ts)), plot.y(y, *v)))
        .collect();

    if coords.len() > 1 {
        let mut path = String::new();
        for (px, py) in &coords {
            let _ = write!(path, "{px:.2},{py:.2} ");
        }
        let _ = writeln!(
            svg,
            "    <polyline points='{}' fill='none' stroke='{color}' stroke-width='{}' stroke-linejoin='round'/>",
            path.trim_end(),
            theme.line_width
        );
    }

    // A lone sample would otherwise be invisible.
    let marker = match (series.marker, coords.len()) {
        (Marker::None, 1) => Marker::Circle,
        (m, _) => m,
    };
    for (px, py) in &coords {
        write_marker(svg, marker, *px, *py, theme.marker_radius, color);
    }
}

fn write_marker(svg: &mut String, marker: Marker, cx: f64, cy: f64, r: f64, color: &str) {
    match marker {
        Marker::None => {}
        Marker::Circle => {
            let _ = writeln!(
                svg,
                "    <circle cx='{cx:.2}' cy='{cy:.2}' r='{r:.2}' fill='{color}'/>"
            );
        }
        Marker::Cross => {
            let _ = writeln!(
                svg,
                "    <path d='M{:.2},{:.2} L{:.2},{:.2} M{:.2},{:.2} L{:.2},{:.2}' stroke='{color}' stroke-width='2'/>",
                cx - r,
                cy - r,
                cx + r,
                cy + r,
                cx - r,
                cy + r,
                cx + r,
                cy - r
            );
        }
    }
}

fn epoch_seconds(ts: DateTime<Utc>) -> f64 {
    ts.timestamp_millis() as f64 / 1000.0
}

fn min_max(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

/// Round `raw` up to 1, 2 or 5 times a power of ten.
fn nice_step(raw: f64) -> f64 {
    if !raw.is_finite() || raw <= 0.0 {
        return 1.0;
    }
    let base = 10f64.powf(raw.log10().floor());
    let fraction = raw / base;
    let nice = if fraction <= 1.0 {
        1.0
    } else if fraction <= 2.0 {
        2.0
    } else if fraction <= 5.0 {
        5.0
    } else {
        10.0
    };
    nice * base
}

fn value_ticks(axis: &Axis, step: f64) -> Vec<f64> {
    let first = (axis.min / step).ceil();
    let last = (axis.max / step + 1e-9).floor();
    if !(0.0..=MAX_TICKS).contains(&(last - first)) {
        return Vec::new();
    }
    (0..=(last - first) as i64)
        .map(|i| (first + i as f64) * step)
        .collect()
}

fn format_tick(value: f64, step: f64) -> String {
    let decimals = if step >= 1.0 {
        0
    } else {
        (-step.log10()).ceil() as usize
    };
    let value = if value.abs() < step * 1e-6 { 0.0 } else { value };
    format!("{:.*}", decimals, value)
}

/// Smallest candidate spacing giving at most about [`X_TICK_TARGET`] ticks.
fn time_step(span_secs: f64) -> f64 {
    let target = span_secs / X_TICK_TARGET;
    TIME_STEPS
        .iter()
        .copied()
        .find(|step| *step >= target)
        .unwrap_or_else(|| (target / 86400.0).ceil() * 86400.0)
}

fn time_ticks(axis: &Axis, step: f64) -> Vec<f64> {
    value_ticks(axis, step)
}

fn format_time_tick(secs: f64, long_span: bool) -> String {
    let Some(ts) = Utc.timestamp_opt(secs.floor() as i64, 0).single() else {
        return String::new();
    };
    if long_span {
        ts.format("%m-%d %H:%M").to_string()
    } else {
        ts.format("%H:%M:%S").to_string()
    }
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_709_251_200 + secs, 0).unwrap()
    }

    fn sample_series(label: &str) -> Series {
        Series::new(label, vec![(ts(0), 10.0), (ts(30), 25.0), (ts(60), 18.0)])
    }

    // ── to_svg ───────────────────────────────────────────────────────────────

    #[test]
    fn test_svg_has_title_labels_and_line() {
        let chart = LineChart::new("K6 vus", "Time", "Count").with_series(sample_series("vus"));
        let svg = chart.to_svg(&ChartTheme::default());

        assert!(svg.starts_with("<svg"));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert!(svg.contains(">K6 vus</text>"));
        assert!(svg.contains(">Time</text>"));
        assert!(svg.contains(">Count</text>"));
        assert_eq!(svg.matches("<polyline").count(), 1);
    }

    #[test]
    fn test_single_series_has_no_legend() {
        let chart = LineChart::new("t", "x", "y").with_series(sample_series("only"));
        let svg = chart.to_svg(&ChartTheme::default());
        assert!(!svg.contains(">only</text>"));
    }

    #[test]
    fn test_two_series_get_legend_and_markers() {
        let chart = LineChart::new("HPA Replica Count", "Time", "Replicas")
            .with_series(sample_series("Current Replicas").with_marker(Marker::Circle))
            .with_series(sample_series("Desired Replicas").with_marker(Marker::Cross));
        let svg = chart.to_svg(&ChartTheme::default());

        assert!(svg.contains(">Current Replicas</text>"));
        assert!(svg.contains(">Desired Replicas</text>"));
        // Three samples each plus one legend swatch each.
        assert_eq!(svg.matches("<circle").count(), 4);
        assert_eq!(svg.matches("<path d='M").count(), 4);
    }

    #[test]
    fn test_reference_line_is_dashed_and_in_legend() {
        let chart = LineChart::new("HPA CPU Utilization", "Time", "CPU Utilization %")
            .with_series(sample_series("Current CPU").with_marker(Marker::Circle))
            .with_reference("Target CPU", 50.0);
        let svg = chart.to_svg(&ChartTheme::default());

        assert!(svg.contains("stroke-dasharray='10 6'"));
        assert!(svg.contains(">Target CPU</text>"));
        assert_eq!(chart.legend_len(), 2);
    }

    #[test]
    fn test_text_is_escaped() {
        let chart = LineChart::new("a<b & 'c'", "x", "y").with_series(sample_series("s"));
        let svg = chart.to_svg(&ChartTheme::default());
        assert!(svg.contains("a&lt;b &amp; &apos;c&apos;"));
    }

    #[test]
    fn test_single_point_draws_marker() {
        let chart = LineChart::new("t", "x", "y").with_series(Series::new("s", vec![(ts(0), 3.0)]));
        let svg = chart.to_svg(&ChartTheme::default());
        assert!(!svg.contains("<polyline"));
        assert_eq!(svg.matches("<circle").count(), 1);
    }

    #[test]
    fn test_svg_is_deterministic() {
        let chart = LineChart::new("t", "x", "y").with_series(sample_series("s"));
        let theme = ChartTheme::default();
        assert_eq!(chart.to_svg(&theme), chart.to_svg(&theme));
    }

    // ── axes ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_nice_step() {
        assert_eq!(nice_step(0.7), 1.0);
        assert_eq!(nice_step(1.5), 2.0);
        assert_eq!(nice_step(3.0), 5.0);
        assert_eq!(nice_step(7.0), 10.0);
        assert_eq!(nice_step(0.0), 1.0);
    }

    #[test]
    fn test_value_axis_covers_data_and_reference() {
        let chart = LineChart::new("t", "x", "y")
            .with_series(sample_series("s"))
            .with_reference("target", 50.0);
        let axis = chart.value_axis();
        assert!(axis.min <= 10.0);
        assert!(axis.max >= 50.0);
    }

    #[test]
    fn test_flat_series_gets_nonzero_range() {
        let chart = LineChart::new("t", "x", "y")
            .with_series(Series::new("s", vec![(ts(0), 2.0), (ts(30), 2.0)]));
        let axis = chart.value_axis();
        assert!(axis.max > axis.min);
        let x = chart.time_axis();
        assert!(x.max > x.min);
    }

    #[test]
    fn test_extreme_values_keep_axis_finite() {
        let chart = LineChart::new("K6 vus", "Time", "Count").with_series(Series::new(
            "vus",
            vec![(ts(0), -1e308), (ts(30), 1e308), (ts(60), f64::MAX)],
        ));

        let axis = chart.value_axis();
        assert!(axis.min.is_finite() && axis.max.is_finite());
        assert!((axis.max - axis.min).is_finite());

        let svg = chart.to_svg(&ChartTheme::default());
        assert_eq!(svg.matches("<polyline").count(), 1);
        assert!(!svg.contains("NaN"));
        assert!(!svg.contains("inf"));
    }

    #[test]
    fn test_value_ticks_capped() {
        let axis = Axis {
            min: -f64::MAX,
            max: f64::MAX,
        };
        assert!(value_ticks(&axis, 1.0).is_empty());
        assert!(value_ticks(&Axis { min: 0.0, max: 1.0 }, f64::NAN).is_empty());
    }

    #[test]
    fn test_value_ticks_and_format() {
        let ticks = value_ticks(&Axis { min: 0.0, max: 1.0 }, 0.2);
        assert_eq!(ticks.len(), 6);
        assert_eq!(format_tick(ticks[1], 0.2), "0.2");
        assert_eq!(format_tick(40.0, 10.0), "40");
    }

    #[test]
    fn test_time_step_selection() {
        assert_eq!(time_step(60.0), 10.0);
        assert_eq!(time_step(600.0), 120.0);
        assert_eq!(time_step(86400.0 * 30.0), 86400.0 * 5.0);
    }

    #[test]
    fn test_format_time_tick() {
        // 2024-03-01T00:00:00Z
        assert_eq!(format_time_tick(1_709_251_200.0, false), "00:00:00");
        assert_eq!(format_time_tick(1_709_251_200.0, true), "03-01 00:00");
    }
}
