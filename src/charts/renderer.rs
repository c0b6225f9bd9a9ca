//! Static Chart Renderer
//! Draws a scatter figure to PNG with plotters.
//!
//! Layout (single square facet):
//! 1. Optional title
//! 2. Light grey grid, all four spines, axis labels with units
//! 3. Points coloured by climate regime, optional 1:1 line
//! 4. Legend upper left without frame, rank correlations lower right

use crate::charts::plotter::ScatterFigure;
use crate::config::RenderConfig;
use plotters::prelude::*;
use std::path::Path;
use thiserror::Error;

// Colors
const GRID: RGBColor = RGBColor(217, 217, 217); // 0.85 grey
const ONE_TO_ONE: RGBColor = RGBColor(128, 128, 128);

const FONT: &str = "sans-serif";

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Drawing failed: {0}")]
    Drawing(String),
}

fn drawing_err(e: impl std::fmt::Display) -> RenderError {
    RenderError::Drawing(e.to_string())
}

/// Pixel sizes derived from the physical figure size and resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FigureLayout {
    pub size: u32,
    pub marker_radius: u32,
    pub font_px: f64,
    pub label_font_px: f64,
    pub label_area: u32,
    pub margin: u32,
    pub line_width: u32,
}

impl FigureLayout {
    pub fn from_config(render: &RenderConfig) -> Self {
        let dpi = render.dpi as f64;
        let pt = |points: f64| points * dpi / 72.0;

        let font_px = pt(render.font_size_pt);
        let label_font_px = pt(render.font_size_pt + 1.0);
        Self {
            size: (render.facet_size_inches * dpi).round() as u32,
            // marker area is in pt^2, radius is half the side of that square
            marker_radius: (pt(render.marker_area_pt2.sqrt()) / 2.0).round().max(1.0) as u32,
            font_px,
            label_font_px,
            label_area: (label_font_px * 3.5).round() as u32,
            margin: pt(6.0).round() as u32,
            line_width: pt(0.8).round().max(1.0) as u32,
        }
    }
}

pub struct ScatterRenderer;

impl ScatterRenderer {
    /// Render `figure` to a PNG file at `path`.
    pub fn render_png(figure: &ScatterFigure, render: &RenderConfig, path: &Path) -> Result<(), RenderError> {
        let layout = FigureLayout::from_config(render);
        let (x0, x1) = figure.config.x_limits;
        let (y0, y1) = figure.config.y_limits;

        let root = BitMapBackend::new(path, (layout.size, layout.size)).into_drawing_area();
        root.fill(&WHITE).map_err(drawing_err)?;

        let mut builder = ChartBuilder::on(&root);
        builder
            .margin(layout.margin)
            .x_label_area_size(layout.label_area)
            .y_label_area_size(layout.label_area);
        if !figure.config.title.is_empty() {
            builder.caption(&figure.config.title, (FONT, layout.label_font_px));
        }
        let mut chart = builder
            .build_cartesian_2d(x0..x1, y0..y1)
            .map_err(drawing_err)?;

        chart
            .configure_mesh()
            .light_line_style(TRANSPARENT)
            .bold_line_style(GRID.stroke_width(layout.line_width))
            .axis_style(BLACK.stroke_width(layout.line_width))
            .x_labels(6)
            .y_labels(6)
            .x_label_formatter(&|v| format!("{:.0}", v))
            .y_label_formatter(&|v| format!("{:.0}", v))
            .label_style((FONT, layout.label_font_px))
            .axis_desc_style((FONT, layout.label_font_px))
            .x_desc(figure.x_label())
            .y_desc(figure.y_label())
            .draw()
            .map_err(drawing_err)?;

        if figure.config.origin_line {
            let lo = x0.max(y0);
            let hi = x1.min(y1);
            chart
                .draw_series(LineSeries::new(
                    vec![(lo, lo), (hi, hi)],
                    ONE_TO_ONE.stroke_width(layout.line_width),
                ))
                .map_err(drawing_err)?;
        }

        // Legend entries, one per regime present
        let radius = layout.marker_radius;
        for series in &figure.series {
            let color = series.regime.color();
            chart
                .draw_series(std::iter::empty::<Circle<(f64, f64), u32>>())
                .map_err(drawing_err)?
                .label(series.regime.label())
                .legend(move |(x, y)| Circle::new((x, y), radius, color.filled()));
        }

        // Points in their shuffled order, clipped to the axes
        chart
            .draw_series(
                figure
                    .points
                    .iter()
                    .filter(|p| (x0..=x1).contains(&p.x) && (y0..=y1).contains(&p.y))
                    .map(|p| Circle::new((p.x, p.y), radius, p.regime.color().filled())),
            )
            .map_err(drawing_err)?;

        let n = figure.series.len();
        chart
            .draw_series(figure.series.iter().enumerate().map(|(i, series)| {
                let row = (n - 1 - i) as f64;
                let at = (
                    x0 + 0.55 * (x1 - x0),
                    y0 + (0.04 + 0.075 * (row + 1.0)) * (y1 - y0),
                );
                let style = (FONT, layout.font_px).into_font().color(&series.regime.color());
                Text::new(series.annotation(), at, style)
            }))
            .map_err(drawing_err)?;

        // Spines on all four sides
        chart
            .plotting_area()
            .draw(&Rectangle::new(
                [(x0, y0), (x1, y1)],
                BLACK.stroke_width(layout.line_width),
            ))
            .map_err(drawing_err)?;

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperLeft)
            .background_style(TRANSPARENT)
            .border_style(TRANSPARENT)
            .label_font((FONT, layout.font_px))
            .draw()
            .map_err(drawing_err)?;

        root.present().map_err(drawing_err)?;
        Ok(())
    }
}
