use std::ops::Range;

use plotters::coord::types::RangedCoordf64;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use super::{Area, Renderer, FONT_FAMILY};
use crate::error::RenderError;

type Plane<'a, 'b> = ChartContext<'a, BitMapBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

pub const EXITS_RED: RGBColor = RGBColor(214, 39, 40);
pub const STAYS_GREEN: RGBColor = RGBColor(44, 160, 44);
pub const ACCENT_PINK: RGBColor = RGBColor(254, 93, 159);
pub const ACCENT_RASPBERRY: RGBColor = RGBColor(227, 11, 92);
pub const LIGHT_PINK: RGBColor = RGBColor(255, 192, 203);

/// Fill colours for cell charts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Palette {
    Blues,
    /// Diverging red to blue, for correlations.
    RdBu,
    /// From near-white to the given colour.
    Light(RGBColor),
}

fn lerp(from: RGBColor, to: RGBColor, t: f64) -> RGBColor {
    let mix = |a: u8, b: u8| (f64::from(a) + (f64::from(b) - f64::from(a)) * t).round() as u8;
    RGBColor(mix(from.0, to.0), mix(from.1, to.1), mix(from.2, to.2))
}

impl Palette {
    /// Colour at position `t` in `[0, 1]`.
    pub fn color(self, t: f64) -> RGBColor {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        let white = RGBColor(247, 247, 247);
        match self {
            Palette::Blues => lerp(RGBColor(247, 251, 255), RGBColor(8, 48, 107), t),
            Palette::RdBu if t < 0.5 => lerp(RGBColor(103, 0, 31), white, t * 2.0),
            Palette::RdBu => lerp(white, RGBColor(5, 48, 97), (t - 0.5) * 2.0),
            Palette::Light(base) => lerp(RGBColor(252, 252, 252), base, t),
        }
    }

    /// Annotation colour readable on top of `color(t)`.
    fn ink(self, t: f64) -> RGBColor {
        let dark = match self {
            Palette::RdBu => !(0.2..=0.8).contains(&t),
            _ => t > 0.6,
        };
        if dark {
            WHITE
        } else {
            BLACK
        }
    }
}

/// Name of the category whose centre sits at `value - offset`, if any.
fn category_at(names: &[String], value: f64, offset: f64) -> String {
    let shifted = value - offset;
    let idx = shifted.round();
    if (shifted - idx).abs() < 1e-6 && idx >= 0.0 && (idx as usize) < names.len() {
        names[idx as usize].clone()
    } else {
        String::new()
    }
}

fn short_number(value: f64) -> String {
    let text = format!("{value:.2}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

fn text_style(size: u32, color: RGBColor, pos: Pos) -> TextStyle<'static> {
    (FONT_FAMILY, f64::from(size))
        .into_font()
        .color(&color)
        .pos(pos)
}

fn plane<'a, 'b>(
    area: &'a Area<'b>,
    title: &str,
    labels: bool,
    x: Range<f64>,
    y: Range<f64>,
    left_axis: u32,
) -> Result<Plane<'a, 'b>, RenderError> {
    let mut builder = ChartBuilder::on(area);
    builder.margin(12);
    if labels {
        builder
            .caption(title, (FONT_FAMILY, 20))
            .x_label_area_size(45)
            .y_label_area_size(left_axis);
    }
    Ok(builder.build_cartesian_2d(x, y)?)
}

/// Category names along one axis, centred at `index + offset`.
struct Categories<'n> {
    names: &'n [String],
    offset: f64,
}

struct Axes<'n> {
    x_desc: &'n str,
    y_desc: &'n str,
    x: Option<Categories<'n>>,
    y: Option<Categories<'n>>,
}

fn draw_axes(chart: &mut Plane<'_, '_>, axes: Axes<'_>) -> Result<(), RenderError> {
    let format = |cats: &Option<Categories<'_>>, v: f64| match cats {
        Some(c) => category_at(c.names, v, c.offset),
        None => short_number(v),
    };
    let x_fmt = |v: &f64| format(&axes.x, *v);
    let y_fmt = |v: &f64| format(&axes.y, *v);

    let mut mesh = chart.configure_mesh();
    mesh.disable_mesh()
        .x_desc(axes.x_desc)
        .y_desc(axes.y_desc)
        .x_label_formatter(&x_fmt)
        .y_label_formatter(&y_fmt);
    // Half-unit ticks so that every category centre gets a tick.
    if let Some(c) = &axes.x {
        mesh.x_labels(c.names.len() * 2 + 1);
    }
    if let Some(c) = &axes.y {
        mesh.y_labels(c.names.len() * 2 + 1);
    }
    mesh.draw()?;
    Ok(())
}

/// Annotated matrix of coloured cells; row 0 is drawn at the top.
#[derive(Clone, Debug)]
pub struct Heatmap {
    pub title: String,
    pub x_labels: Vec<String>,
    pub y_labels: Vec<String>,
    pub values: Vec<Vec<f64>>,
    /// Values mapped to the two ends of the palette.
    pub range: (f64, f64),
    pub palette: Palette,
    pub decimals: usize,
    pub x_desc: String,
    pub y_desc: String,
}

fn draw_heatmap(area: &Area<'_>, plot: &Heatmap, labels: bool) -> Result<(), RenderError> {
    let rows = plot.values.len();
    let cols = plot.x_labels.len();
    if rows == 0 || cols == 0 || plot.values.iter().any(|r| r.len() != cols) {
        return Err(RenderError::EmptyData("heatmap cells"));
    }
    let (lo, hi) = plot.range;
    let scale = |v: f64| if hi > lo { (v - lo) / (hi - lo) } else { 0.0 };

    let mut chart = plane(area, &plot.title, labels, 0.0..cols as f64, 0.0..rows as f64, 110)?;
    let cells = plot.values.iter().enumerate().flat_map(|(r, row)| {
        let top = (rows - r) as f64;
        row.iter().enumerate().map(move |(c, &v)| {
            let fill = plot.palette.color(scale(v));
            Rectangle::new([(c as f64, top - 1.0), (c as f64 + 1.0, top)], fill.filled())
        })
    });
    chart.draw_series(cells)?;

    if labels {
        let mut y_names = plot.y_labels.clone();
        y_names.reverse();
        draw_axes(
            &mut chart,
            Axes {
                x_desc: &plot.x_desc,
                y_desc: &plot.y_desc,
                x: Some(Categories {
                    names: &plot.x_labels,
                    offset: 0.5,
                }),
                y: Some(Categories {
                    names: &y_names,
                    offset: 0.5,
                }),
            },
        )?;
        let size = if cols > 6 { 11 } else { 18 };
        let notes = plot.values.iter().enumerate().flat_map(|(r, row)| {
            let centre_y = (rows - r) as f64 - 0.5;
            row.iter().enumerate().map(move |(c, &v)| {
                let ink = plot.palette.ink(scale(v));
                Text::new(
                    format!("{:.*}", plot.decimals, v),
                    (c as f64 + 0.5, centre_y),
                    text_style(size, ink, Pos::new(HPos::Center, VPos::Center)),
                )
            })
        });
        chart.draw_series(notes)?;
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    Vertical,
    Horizontal,
}

#[derive(Clone, Debug)]
pub struct BarSeries {
    pub name: String,
    /// One colour for the whole series, or one per category.
    pub colors: Vec<RGBColor>,
    pub values: Vec<f64>,
}

impl BarSeries {
    pub fn new(name: impl Into<String>, color: RGBColor, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            colors: vec![color],
            values,
        }
    }

    fn color(&self, idx: usize) -> RGBColor {
        match self.colors.len() {
            0 => BLUE,
            1 => self.colors[0],
            n => self.colors[idx % n],
        }
    }
}

#[derive(Clone, Debug)]
pub struct BarChart {
    pub title: String,
    pub categories: Vec<String>,
    pub series: Vec<BarSeries>,
    pub orientation: Orientation,
    pub x_desc: String,
    pub y_desc: String,
    /// Write each value next to its bar.
    pub annotate: bool,
    pub value_range: Option<(f64, f64)>,
}

impl BarChart {
    pub fn vertical(title: impl Into<String>, categories: Vec<String>, series: Vec<BarSeries>) -> Self {
        Self {
            title: title.into(),
            categories,
            series,
            orientation: Orientation::Vertical,
            x_desc: String::new(),
            y_desc: String::new(),
            annotate: false,
            value_range: None,
        }
    }

    pub fn horizontal(title: impl Into<String>, categories: Vec<String>, series: Vec<BarSeries>) -> Self {
        Self {
            orientation: Orientation::Horizontal,
            ..Self::vertical(title, categories, series)
        }
    }

    pub fn axes(mut self, x_desc: impl Into<String>, y_desc: impl Into<String>) -> Self {
        self.x_desc = x_desc.into();
        self.y_desc = y_desc.into();
        self
    }

    pub fn annotated(mut self) -> Self {
        self.annotate = true;
        self
    }

    pub fn range(mut self, lo: f64, hi: f64) -> Self {
        self.value_range = Some((lo, hi));
        self
    }

    fn value_range(&self) -> (f64, f64) {
        self.value_range.unwrap_or_else(|| {
            let max = self
                .series
                .iter()
                .flat_map(|s| s.values.iter().copied())
                .fold(0.0, f64::max);
            (0.0, if max > 0.0 { max * 1.15 } else { 1.0 })
        })
    }
}

fn draw_bars(area: &Area<'_>, plot: &BarChart, labels: bool) -> Result<(), RenderError> {
    let n = plot.categories.len();
    if n == 0 || plot.series.is_empty() {
        return Err(RenderError::EmptyData("bar categories"));
    }
    let (lo, hi) = plot.value_range();
    let base = lo.max(0.0);
    let slot = 0.8 / plot.series.len() as f64;
    let cats = -0.5..n as f64 - 0.5;
    let vertical = plot.orientation == Orientation::Vertical;

    let mut chart = if vertical {
        plane(area, &plot.title, labels, cats, lo..hi, 60)?
    } else {
        plane(area, &plot.title, labels, lo..hi, cats, 120)?
    };

    // (category position, value) to chart coordinates.
    let at = |pos: f64, value: f64| if vertical { (pos, value) } else { (value, pos) };

    for (s, series) in plot.series.iter().enumerate() {
        let start = -0.4 + s as f64 * slot;
        let bars = series.values.iter().take(n).enumerate().map(|(i, &v)| {
            let from = i as f64 + start;
            Rectangle::new(
                [at(from, base), at(from + slot, v)],
                series.color(i).filled(),
            )
        });
        let legend = series.color(0);
        chart
            .draw_series(bars)?
            .label(series.name.as_str())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 12, y + 5)], legend.filled()));
    }

    if !labels {
        return Ok(());
    }
    let categories = Categories {
        names: &plot.categories,
        offset: 0.0,
    };
    draw_axes(
        &mut chart,
        Axes {
            x_desc: &plot.x_desc,
            y_desc: &plot.y_desc,
            x: Some(categories),
            y: None,
        }
        .swap_if(!vertical),
    )?;

    if plot.annotate {
        let pos = if vertical {
            Pos::new(HPos::Center, VPos::Bottom)
        } else {
            Pos::new(HPos::Left, VPos::Center)
        };
        let notes = plot.series.iter().enumerate().flat_map(|(s, series)| {
            let centre = -0.4 + (s as f64 + 0.5) * slot;
            series.values.iter().take(n).enumerate().map(move |(i, &v)| {
                Text::new(
                    short_number(v),
                    at(i as f64 + centre, v),
                    text_style(13, BLACK, pos),
                )
            })
        });
        chart.draw_series(notes)?;
    }
    if plot.series.len() > 1 {
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }
    Ok(())
}

impl<'n> Axes<'n> {
    /// Move the category axis from x to y for horizontal charts.
    fn swap_if(self, horizontal: bool) -> Self {
        if horizontal {
            Axes {
                x: self.y,
                y: self.x,
                ..self
            }
        } else {
            self
        }
    }
}

#[derive(Clone, Debug)]
pub struct Line {
    pub name: String,
    pub color: RGBColor,
    pub points: Vec<(f64, f64)>,
    pub width: u32,
    pub markers: bool,
}

impl Line {
    pub fn new(name: impl Into<String>, color: RGBColor, points: Vec<(f64, f64)>) -> Self {
        Self {
            name: name.into(),
            color,
            points,
            width: 2,
            markers: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LineChart {
    pub title: String,
    pub x_desc: String,
    pub y_desc: String,
    pub lines: Vec<Line>,
    pub x_range: (f64, f64),
    pub y_range: (f64, f64),
}

fn draw_lines(area: &Area<'_>, plot: &LineChart, labels: bool) -> Result<(), RenderError> {
    if plot.lines.iter().all(|l| l.points.is_empty()) {
        return Err(RenderError::EmptyData("line points"));
    }
    let (x0, x1) = plot.x_range;
    let (y0, y1) = plot.y_range;
    let mut chart = plane(area, &plot.title, labels, x0..x1, y0..y1, 60)?;

    for line in &plot.lines {
        let color = line.color;
        chart
            .draw_series(plotters::series::LineSeries::new(
                line.points.iter().copied(),
                color.stroke_width(line.width),
            ))?
            .label(line.name.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 18, y)], color.stroke_width(2)));
        if line.markers {
            chart.draw_series(line.points.iter().map(|&p| Circle::new(p, 4, color.filled())))?;
        }
    }

    if labels {
        draw_axes(
            &mut chart,
            Axes {
                x_desc: &plot.x_desc,
                y_desc: &plot.y_desc,
                x: None,
                y: None,
            },
        )?;
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::LowerRight)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }
    Ok(())
}

#[derive(Clone, Debug)]
pub struct Histogram {
    pub title: String,
    pub values: Vec<f64>,
    pub bins: usize,
}

/// Lower edge, bin width and per-bin counts; the last bin is closed.
pub fn bin_counts(values: &[f64], bins: usize) -> Option<(f64, f64, Vec<u64>)> {
    let bins = bins.max(1);
    let (min, max) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<(f64, f64)>, &v| match acc {
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            None => Some((v, v)),
        })?;
    let (min, width) = if max > min {
        (min, (max - min) / bins as f64)
    } else {
        (min - 0.5, 1.0 / bins as f64)
    };
    let mut counts = vec![0u64; bins];
    for &v in values.iter().filter(|v| v.is_finite()) {
        let idx = (((v - min) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    Some((min, width, counts))
}

fn draw_histogram(area: &Area<'_>, plot: &Histogram, labels: bool) -> Result<(), RenderError> {
    let (min, width, counts) =
        bin_counts(&plot.values, plot.bins).ok_or(RenderError::EmptyData("histogram values"))?;
    let top = counts.iter().copied().max().unwrap_or(0).max(1) as f64 * 1.1;
    let right = min + width * counts.len() as f64;
    let mut chart = plane(area, &plot.title, labels, min..right, 0.0..top, 50)?;
    chart.draw_series(counts.iter().enumerate().map(|(i, &c)| {
        let left = min + width * i as f64;
        Rectangle::new([(left, 0.0), (left + width, c as f64)], RGBColor(31, 119, 180).filled())
    }))?;
    if labels {
        let x_fmt = |v: &f64| short_number(*v);
        let mut mesh = chart.configure_mesh();
        mesh.disable_mesh()
            .x_labels(4)
            .y_labels(4)
            .x_label_formatter(&x_fmt)
            .label_style((FONT_FAMILY, 11));
        mesh.draw()?;
    }
    Ok(())
}

#[derive(Clone, Debug)]
pub struct PieSlice {
    pub label: String,
    pub value: f64,
    pub color: RGBColor,
}

#[derive(Clone, Debug)]
pub struct PieChart {
    pub title: String,
    pub slices: Vec<PieSlice>,
}

fn draw_pie(area: &Area<'_>, plot: &PieChart, labels: bool) -> Result<(), RenderError> {
    let total: f64 = plot.slices.iter().map(|s| s.value.max(0.0)).sum();
    if !(total > 0.0) {
        return Err(RenderError::EmptyData("pie slices"));
    }
    let (w, h) = area.dim_in_pixel();
    let centre = (w as f64 / 2.0, h as f64 / 2.0 + 15.0);
    let radius = f64::from(w.min(h)) * 0.33;
    let point = |angle: f64, r: f64| {
        (
            (centre.0 + r * angle.cos()).round() as i32,
            (centre.1 + r * angle.sin()).round() as i32,
        )
    };

    // Start at twelve o'clock and go clockwise.
    let mut angle = -std::f64::consts::FRAC_PI_2;
    let mut notes = Vec::new();
    for slice in &plot.slices {
        let share = slice.value.max(0.0) / total;
        let sweep = share * std::f64::consts::TAU;
        let steps = ((sweep.to_degrees()).ceil() as usize).max(2);
        let mut outline = vec![point(0.0, 0.0)];
        outline.extend((0..=steps).map(|k| point(angle + sweep * k as f64 / steps as f64, radius)));
        area.draw(&Polygon::new(outline, slice.color.filled()))?;

        let middle = angle + sweep / 2.0;
        notes.push((format!("{:.1}%", share * 100.0), point(middle, radius * 0.6)));
        notes.push((slice.label.clone(), point(middle, radius * 1.18)));
        angle += sweep;
    }

    if labels {
        let centred = Pos::new(HPos::Center, VPos::Center);
        area.draw(&Text::new(
            plot.title.clone(),
            ((w / 2) as i32, 20),
            text_style(20, BLACK, Pos::new(HPos::Center, VPos::Top)),
        ))?;
        for (text, at) in notes {
            area.draw(&Text::new(text, at, text_style(15, BLACK, centred)))?;
        }
    }
    Ok(())
}

impl Renderer {
    pub fn heatmap(&self, plot: &Heatmap) -> Result<String, RenderError> {
        let side = 420 + 40 * plot.x_labels.len().min(14) as u32;
        self.render((side + 80, side), |area, labels| draw_heatmap(area, plot, labels))
    }

    pub fn bar_chart(&self, plot: &BarChart) -> Result<String, RenderError> {
        let size = match plot.orientation {
            Orientation::Vertical => (800, 500),
            Orientation::Horizontal => (900, 40 * plot.categories.len().max(6) as u32 + 120),
        };
        self.render(size, |area, labels| draw_bars(area, plot, labels))
    }

    /// Bar charts side by side on one canvas.
    pub fn bar_panels(&self, panels: &[BarChart]) -> Result<String, RenderError> {
        if panels.is_empty() {
            return Err(RenderError::EmptyData("bar panels"));
        }
        let width = 600 * panels.len() as u32;
        self.render((width, 420), |area, labels| {
            for (cell, plot) in area.split_evenly((1, panels.len())).iter().zip(panels) {
                draw_bars(cell, plot, labels)?;
            }
            Ok(())
        })
    }

    pub fn line_chart(&self, plot: &LineChart) -> Result<String, RenderError> {
        self.render((720, 540), |area, labels| draw_lines(area, plot, labels))
    }

    /// One histogram per panel, laid out on a square-ish grid.
    pub fn histograms(&self, panels: &[Histogram]) -> Result<String, RenderError> {
        if panels.is_empty() {
            return Err(RenderError::EmptyData("histogram panels"));
        }
        let cols = (panels.len() as f64).sqrt().ceil() as usize;
        let rows = (panels.len() + cols - 1) / cols;
        let size = (330 * cols as u32, 300 * rows as u32);
        self.render(size, |area, labels| {
            for (cell, plot) in area.split_evenly((rows, cols)).iter().zip(panels) {
                draw_histogram(cell, plot, labels)?;
            }
            Ok(())
        })
    }

    pub fn pie(&self, plot: &PieChart) -> Result<String, RenderError> {
        self.render((600, 600), |area, labels| draw_pie(area, plot, labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &str = "iVBORw0KGgo";

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn palettes_hit_their_end_points() {
        assert_eq!(Palette::Blues.color(0.0), RGBColor(247, 251, 255));
        assert_eq!(Palette::Blues.color(1.0), RGBColor(8, 48, 107));
        assert_eq!(Palette::RdBu.color(0.5), RGBColor(247, 247, 247));
        assert_eq!(Palette::Light(ACCENT_PINK).color(1.0), ACCENT_PINK);
        assert_eq!(Palette::Blues.color(f64::NAN), Palette::Blues.color(0.0));
    }

    #[test]
    fn category_ticks_only_label_centres() {
        let cats = names(&["Stays", "Exits"]);
        assert_eq!(category_at(&cats, 1.0, 0.0), "Exits");
        assert_eq!(category_at(&cats, 0.5, 0.5), "Stays");
        assert_eq!(category_at(&cats, 0.5, 0.0), "");
        assert_eq!(category_at(&cats, 2.0, 0.0), "");
        assert_eq!(short_number(12.50), "12.5");
        assert_eq!(short_number(3.0), "3");
    }

    #[test]
    fn bins_cover_every_value() {
        let (min, width, counts) = bin_counts(&[0.0, 1.0, 2.0, 3.0, 4.0], 4).unwrap();
        assert_eq!(min, 0.0);
        assert_eq!(width, 1.0);
        assert_eq!(counts, vec![1, 1, 1, 2]);

        let (_, _, flat) = bin_counts(&[5.0, 5.0], 3).unwrap();
        assert_eq!(flat.iter().sum::<u64>(), 2);
        assert!(bin_counts(&[], 10).is_none());
    }

    #[test]
    fn every_chart_kind_renders_without_a_font() {
        let r = Renderer::unlabeled();
        let heat = Heatmap {
            title: "cm".into(),
            x_labels: names(&["Stays", "Exits"]),
            y_labels: names(&["Stays", "Exits"]),
            values: vec![vec![5.0, 1.0], vec![2.0, 3.0]],
            range: (0.0, 5.0),
            palette: Palette::Blues,
            decimals: 0,
            x_desc: "Predicted".into(),
            y_desc: "Actual".into(),
        };
        assert!(r.heatmap(&heat).unwrap().starts_with(PNG));

        let bars = BarChart::vertical(
            "bars",
            names(&["a", "b"]),
            vec![
                BarSeries::new("x", STAYS_GREEN, vec![1.0, 2.0]),
                BarSeries::new("y", EXITS_RED, vec![3.0, 0.5]),
            ],
        );
        assert!(r.bar_chart(&bars).unwrap().starts_with(PNG));
        let sideways = BarChart::horizontal("h", names(&["a"]), vec![BarSeries::new("x", BLUE, vec![0.3])]);
        assert!(r.bar_panels(&[bars, sideways]).unwrap().starts_with(PNG));

        let lines = LineChart {
            title: "roc".into(),
            x_desc: "fpr".into(),
            y_desc: "tpr".into(),
            lines: vec![Line::new("model", ACCENT_PINK, vec![(0.0, 0.0), (0.2, 0.8), (1.0, 1.0)])],
            x_range: (0.0, 1.0),
            y_range: (0.0, 1.05),
        };
        assert!(r.line_chart(&lines).unwrap().starts_with(PNG));

        let hist = Histogram {
            title: "Age".into(),
            values: vec![20.0, 30.0, 30.0, 45.0],
            bins: 10,
        };
        assert!(r.histograms(&[hist.clone(), hist]).unwrap().starts_with(PNG));

        let pie = PieChart {
            title: "balance".into(),
            slices: vec![
                PieSlice { label: "Stays".into(), value: 80.0, color: STAYS_GREEN },
                PieSlice { label: "Exits".into(), value: 20.0, color: EXITS_RED },
            ],
        };
        assert!(r.pie(&pie).unwrap().starts_with(PNG));
    }

    #[test]
    fn empty_inputs_are_render_errors() {
        let r = Renderer::unlabeled();
        let empty = BarChart::vertical("none", Vec::new(), Vec::new());
        assert_eq!(r.bar_chart(&empty), Err(RenderError::EmptyData("bar categories")));
        let pie = PieChart {
            title: "zero".into(),
            slices: vec![PieSlice { label: "a".into(), value: 0.0, color: BLUE }],
        };
        assert_eq!(r.pie(&pie), Err(RenderError::EmptyData("pie slices")));
    }
}
