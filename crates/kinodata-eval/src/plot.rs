//! Diagnostic scatter plot of predictions against targets.
//!
//! Rendered with the plotters SVG backend so no system fonts are needed.

use crate::error::{EvalError, EvalResult};
use crate::sink::{ImageArtifact, ImageFormat};
use plotters::prelude::*;
use serde::{Deserialize, Serialize};

/// Geometry of rendered plots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotStyle {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_point_radius")]
    pub point_radius: u32,
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

fn default_point_radius() -> u32 {
    2
}

impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            point_radius: default_point_radius(),
        }
    }
}

fn plot_err<E: std::fmt::Display>(err: E) -> EvalError {
    EvalError::Plot(err.to_string())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScatterPlot {
    /// `(target, prediction)` pairs.
    pub points: Vec<(f64, f64)>,
    pub lower: f64,
    pub upper: f64,
    pub title: String,
}

impl ScatterPlot {
    /// Target on the x axis, prediction on the y axis, both spanning `y_min..y_max`.
    #[must_use]
    pub fn new(
        targets: &[f64],
        predictions: &[f64],
        y_min: f64,
        y_max: f64,
        corr: Option<f64>,
    ) -> Self {
        let (lower, upper) =
            if y_max > y_min { (y_min, y_max) } else { (y_min - 0.5, y_max + 0.5) };
        let title = corr.map_or_else(|| "corr=undefined".to_string(), |c| format!("corr={c}"));
        Self {
            points: targets.iter().copied().zip(predictions.iter().copied()).collect(),
            lower,
            upper,
            title,
        }
    }

    /// Fails with [`EvalError::Plot`] when either axis bound is NaN or infinite.
    pub fn render_svg(&self, style: &PlotStyle) -> EvalResult<ImageArtifact> {
        if !(self.lower.is_finite() && self.upper.is_finite()) {
            return Err(EvalError::Plot(format!(
                "axis bounds must be finite, got {}..{}",
                self.lower, self.upper
            )));
        }
        let mut svg = String::new();
        {
            let root = SVGBackend::with_string(&mut svg, (style.width, style.height))
                .into_drawing_area();
            root.fill(&WHITE).map_err(plot_err)?;

            let mut chart = ChartBuilder::on(&root)
                .caption(&self.title, ("sans-serif", 16))
                .margin(12)
                .x_label_area_size(40)
                .y_label_area_size(50)
                .build_cartesian_2d(self.lower..self.upper, self.lower..self.upper)
                .map_err(plot_err)?;

            chart
                .configure_mesh()
                .x_desc("Target")
                .y_desc("Pred")
                .draw()
                .map_err(plot_err)?;

            chart
                .draw_series(
                    self.points
                        .iter()
                        .filter(|(x, y)| x.is_finite() && y.is_finite())
                        .map(|&(x, y)| Circle::new((x, y), style.point_radius, BLUE.filled())),
                )
                .map_err(plot_err)?;

            root.present().map_err(plot_err)?;
        }

        Ok(ImageArtifact {
            format: ImageFormat::Svg,
            data: svg,
            caption: Some(self.title.clone()),
        })
    }
}
