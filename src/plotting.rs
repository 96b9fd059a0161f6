use std::collections::BTreeMap;
use std::path::Path;

use plotters::coord::types::RangedCoordf64;
use plotters::prelude::*;

use crate::error::{Error, Result};
use crate::kde::{DensityCurve, Grid};
use crate::summary::{GroupKey, Label};

pub type Chart<'a, 'b> =
    ChartContext<'a, BitMapBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

/// Blues for the urban classes, oranges for the rural ones, in class order.
pub const PALETTE: [&str; 10] = [
    "#08519c", "#3182bd", "#6baed6", "#bdd7e7", "#8c2d04", "#d94801", "#f16913", "#fd8d3c",
    "#fdae6b", "#fdd0a2",
];

const URBAN: &str = "#1f77b4";
const RURAL: &str = "#ff7f0e";

/// Parse "#rrggbb"; anything else is black.
pub fn hex_colour(hex: &str) -> RGBColor {
    let hex = hex.trim_start_matches('#');
    let channel = |i: usize| {
        hex.get(i..i + 2)
            .and_then(|c| u8::from_str_radix(c, 16).ok())
            .unwrap_or(0)
    };
    RGBColor(channel(0), channel(2), channel(4))
}

/// Colour of a group in a chart split by `key`.
pub fn group_colour(key: GroupKey, label: &Label) -> RGBColor {
    let rank = label.rank.max(0) as usize;
    match key {
        GroupKey::TwoFold if rank == 0 => hex_colour(URBAN),
        GroupKey::TwoFold => hex_colour(RURAL),
        GroupKey::Condensed if rank == 0 => hex_colour(PALETTE[1]),
        _ => hex_colour(PALETTE[rank % PALETTE.len()]),
    }
}

/// One line of a chart, with an optional vertical marker (e.g. a mode).
#[derive(Debug, Clone)]
pub struct Series {
    pub label: String,
    pub colour: RGBColor,
    pub points: Vec<(f64, f64)>,
    pub marker: Option<f64>,
}

impl Series {
    pub fn new(label: &str, colour: RGBColor, points: Vec<(f64, f64)>) -> Self {
        Series {
            label: label.to_string(),
            colour,
            points,
            marker: None,
        }
    }

    /// The curve with its mode marked.
    pub fn density(curve: &DensityCurve, colour: RGBColor) -> Self {
        Series {
            label: format!("{} (mode {:.1})", curve.label, curve.mode),
            colour,
            points: curve.xs.iter().copied().zip(curve.ys.iter().copied()).collect(),
            marker: Some(curve.mode),
        }
    }
}

pub fn plot_vline(chart: &mut Chart, x_value: f64, top_y: f64, stroke: ShapeStyle) -> Result<()> {
    chart
        .draw_series(std::iter::once(PathElement::new(
            vec![(x_value, 0.0), (x_value, top_y)],
            stroke,
        )))
        .map_err(|e| Error::Plot(e.to_string()))?;
    Ok(())
}

fn bounds(series: &[Series]) -> Option<(f64, f64, f64)> {
    let mut points = series.iter().flat_map(|s| s.points.iter());
    let first = points.next()?;
    let (min_x, max_x, max_y) = points.fold((first.0, first.0, first.1), |(lo, hi, top), p| {
        (lo.min(p.0), hi.max(p.0), top.max(p.1))
    });
    Some((min_x, max_x, max_y))
}

fn draw_lines(
    path: &Path,
    x_desc: &str,
    y_desc: &str,
    series: &[Series],
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let Some((min_x, mut max_x, max_y)) = bounds(series) else {
        log::warn!("nothing to plot in {}", path.display());
        return Ok(());
    };
    if max_x <= min_x {
        max_x = min_x + 1.0;
    }
    let top_y = if max_y > 0.0 { max_y * 1.05 } else { 1.0 };

    let root = BitMapBackend::new(path, (1024, 640)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20_i32)
        .x_label_area_size(50_i32)
        .y_label_area_size(70_i32)
        .build_cartesian_2d(min_x..max_x, 0_f64..top_y)?;

    chart
        .configure_mesh()
        .x_desc(x_desc)
        .y_desc(y_desc)
        .axis_desc_style(("sans-serif", 20_i32).into_text_style(&root))
        .draw()?;

    for s in series {
        let colour = s.colour;
        chart
            .draw_series(LineSeries::new(s.points.iter().copied(), colour.stroke_width(2)))?
            .label(s.label.as_str())
            .legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 20, y)], colour.stroke_width(2))
            });
        if let Some(x) = s.marker {
            plot_vline(&mut chart, x, top_y, colour.stroke_width(1))?;
        }
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .position(SeriesLabelPosition::UpperRight)
        .draw()?;

    root.present()?;
    log::info!("saved plot to {}", path.display());
    Ok(())
}

/// Draw `series` as lines on one chart and save it as a PNG.
pub fn line_chart(path: &Path, x_desc: &str, y_desc: &str, series: &[Series]) -> Result<()> {
    draw_lines(path, x_desc, y_desc, series).map_err(|e| Error::Plot(e.to_string()))
}

/// One density curve per group, each with its mode marked, on one chart.
/// Groups too small for an estimate are left out.
pub fn plot_densities(
    path: &Path,
    x_desc: &str,
    key: GroupKey,
    groups: &BTreeMap<Label, Vec<f64>>,
    grid: Grid,
) -> Result<Vec<DensityCurve>> {
    let curves: Vec<(RGBColor, DensityCurve)> = groups
        .iter()
        .filter_map(|(label, values)| {
            let curve = DensityCurve::estimate(&label.text, values.clone(), grid)?;
            Some((group_colour(key, label), curve))
        })
        .collect();
    let series: Vec<_> = curves
        .iter()
        .map(|(colour, curve)| Series::density(curve, *colour))
        .collect();
    line_chart(path, x_desc, "Density", &series)?;
    Ok(curves.into_iter().map(|(_, curve)| curve).collect())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_hex_colour() {
        assert_eq!(hex_colour("#08519c"), RGBColor(0x08, 0x51, 0x9c));
        assert_eq!(hex_colour("nonsense"), RGBColor(0, 0, 0));
    }

    #[test]
    fn test_group_colours() {
        let urban = Label::new(0, "Urban");
        assert_eq!(group_colour(GroupKey::TwoFold, &urban), hex_colour(URBAN));
        assert_eq!(group_colour(GroupKey::Condensed, &urban), hex_colour("#3182bd"));
        let hamlets = Label::new(9, "Rural hamlets and isolated dwellings in a sparse setting");
        assert_eq!(group_colour(GroupKey::TenFold, &hamlets), hex_colour("#fdd0a2"));
    }

    #[test]
    fn test_bounds() {
        let series = [
            Series::new("a", BLACK, vec![(1.0, 2.0), (3.0, 0.5)]),
            Series::new("b", BLACK, vec![(0.5, 4.0)]),
        ];
        assert_eq!(bounds(&series), Some((0.5, 3.0, 4.0)));
        assert_eq!(bounds(&[]), None);
    }
}
