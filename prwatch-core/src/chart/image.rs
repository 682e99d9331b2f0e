//! Static chart image (PNG or SVG, picked by file extension).

use std::path::Path;
use std::sync::OnceLock;

use chrono::{Duration, NaiveDate};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::register_font;

use crate::agents::{parse_hex_color, AgentMeta};
use crate::config::{ChartConfig, ChartMetric};
use crate::error::{Error, Result};
use crate::types::History;

use super::{all_dates, build_series, downsample, Series, AGGREGATE_KEY};

/// Font used for every label; plotters has no built-in rasterizer.
static CHART_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

/// Register the bundled font as "sans-serif" once per process.
fn ensure_font() -> Result<()> {
    static REGISTERED: OnceLock<bool> = OnceLock::new();
    let ok = *REGISTERED.get_or_init(|| {
        register_font("sans-serif", FontStyle::Normal, CHART_FONT).is_ok()
    });
    if ok {
        Ok(())
    } else {
        Err(Error::Chart("bundled chart font could not be loaded".to_string()))
    }
}

/// Render the chart image for `history` to `path`.
pub fn render_image(
    path: &Path,
    history: &History,
    agents: &[AgentMeta],
    config: &ChartConfig,
) -> Result<()> {
    ensure_font()?;
    let series = build_series(history, agents, config.metric);
    let dates = downsample(&all_dates(&series), config.max_points);
    let size = (config.width, config.height);

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => draw(
            BitMapBackend::new(path, size).into_drawing_area(),
            &series,
            &dates,
            config.metric,
        ),
        Some("svg") => draw(
            SVGBackend::new(path, size).into_drawing_area(),
            &series,
            &dates,
            config.metric,
        ),
        other => Err(Error::Chart(format!(
            "unsupported image format {:?} for {} (use .png or .svg)",
            other.unwrap_or(""),
            path.display()
        ))),
    }
}

fn chart_error<E: std::fmt::Display>(e: E) -> Error {
    Error::Chart(e.to_string())
}

fn draw<DB: DrawingBackend>(
    root: DrawingArea<DB, Shift>,
    series: &[Series],
    dates: &[NaiveDate],
    metric: ChartMetric,
) -> Result<()> {
    root.fill(&WHITE).map_err(chart_error)?;

    let origin = dates.first().copied();
    let offset = |date: NaiveDate| -> i32 {
        origin
            .map(|o| (date - o).num_days() as i32)
            .unwrap_or(0)
    };
    let x_max = dates.last().map(|d| offset(*d)).unwrap_or(0).max(1);

    // Keep only the sampled dates.
    let plotted: Vec<(&Series, Vec<(i32, f64)>)> = series
        .iter()
        .map(|s| {
            let points = s
                .points
                .iter()
                .filter(|(date, _)| dates.binary_search(date).is_ok())
                .map(|(date, y)| (offset(*date), *y))
                .collect();
            (s, points)
        })
        .collect();

    let (y_min, y_max) = match metric {
        ChartMetric::SuccessRate => (0.0, 100.0),
        ChartMetric::Total | ChartMetric::DailyNew => {
            let values = plotted.iter().flat_map(|(_, p)| p.iter().map(|(_, y)| *y));
            let (lo, hi) = values.fold((0.0f64, 0.0f64), |(lo, hi), y| (lo.min(y), hi.max(y)));
            (lo * 1.1, (hi * 1.1).max(1.0))
        }
    };

    let mut chart = ChartBuilder::on(&root)
        .caption("AI Coding Agent PRs", ("sans-serif", 36))
        .margin(30)
        .x_label_area_size(60)
        .y_label_area_size(80)
        .build_cartesian_2d(0i32..x_max, y_min..y_max)
        .map_err(chart_error)?;

    let x_label = |x: &i32| -> String {
        origin
            .and_then(|o| o.checked_add_signed(Duration::days(i64::from(*x))))
            .map(|d| d.format("%b %d").to_string())
            .unwrap_or_default()
    };
    let y_label = |y: &f64| -> String {
        match metric {
            ChartMetric::SuccessRate => format!("{:.0}%", y),
            _ => format!("{:.0}", y),
        }
    };

    chart
        .configure_mesh()
        .x_labels(dates.len().clamp(2, 12))
        .x_label_formatter(&x_label)
        .y_label_formatter(&y_label)
        .y_desc(metric.axis_label())
        .draw()
        .map_err(chart_error)?;

    for (s, points) in &plotted {
        if points.is_empty() {
            continue;
        }
        let (r, g, b) = parse_hex_color(&s.color).unwrap_or((0x55, 0x55, 0x55));
        let color = RGBColor(r, g, b);
        let width = if s.key == AGGREGATE_KEY { 2 } else { 3 };

        chart
            .draw_series(LineSeries::new(points.clone(), color.stroke_width(width)))
            .map_err(chart_error)?
            .label(s.label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(3)));

        chart
            .draw_series(points.iter().map(|p| Circle::new(*p, 4, color.filled())))
            .map_err(chart_error)?;
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .position(SeriesLabelPosition::UpperLeft)
        .draw()
        .map_err(chart_error)?;

    root.present().map_err(chart_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::default_roster;
    use crate::types::AgentRecord;
    use tempfile::TempDir;

    fn history() -> History {
        let mut h = History::new();
        for d in 1..=12u32 {
            let date = NaiveDate::from_ymd_opt(2025, 6, d).unwrap();
            let total = u64::from(d) * 100;
            h.upsert(AgentRecord::new(date, "codex", total, total * 3 / 4).unwrap());
            h.upsert(AgentRecord::new(date, "copilot", total * 2, total).unwrap());
        }
        h
    }

    fn small_config(metric: ChartMetric) -> ChartConfig {
        ChartConfig {
            metric,
            width: 400,
            height: 300,
            ..Default::default()
        }
    }

    #[test]
    fn test_png_output() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chart.png");
        render_image(&path, &history(), &default_roster(), &small_config(ChartMetric::SuccessRate))
            .unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], b"\x89PNG");
    }

    #[test]
    fn test_png_at_default_size_draws_labels() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chart.png");
        for metric in [ChartMetric::SuccessRate, ChartMetric::DailyNew] {
            let config = ChartConfig {
                metric,
                ..Default::default()
            };
            render_image(&path, &history(), &default_roster(), &config).unwrap();
        }
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], b"\x89PNG");
        assert!(bytes.len() > 1000);
    }

    #[test]
    fn test_svg_output() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chart.svg");
        render_image(&path, &history(), &default_roster(), &small_config(ChartMetric::Total))
            .unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("<svg"));
        // Agent colors show up as line strokes.
        assert!(text.to_ascii_uppercase().contains("#FF6B6B"));
    }

    #[test]
    fn test_empty_history_still_renders() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chart.svg");
        render_image(&path, &History::new(), &default_roster(), &small_config(ChartMetric::DailyNew))
            .unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_unknown_extension_is_chart_error() {
        let dir = TempDir::new().unwrap();
        let err = render_image(
            &dir.path().join("chart.gif"),
            &history(),
            &default_roster(),
            &ChartConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Chart(_)));
    }
}
