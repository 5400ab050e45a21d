use crate::result::Result;
use anyhow::ensure;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Plots data points in multiple series as they are added.
///
/// When a path is set, the chart is re-rendered to a PNG after each [`.add()`](Self::add()), so the file can be watched
/// while training. Requires the `plot` feature, otherwise only the points are recorded.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Animator {
    xlabel: String,
    legend: Vec<String>,
    xlim: Option<(f64, f64)>,
    ylim: Option<(f64, f64)>,
    series: Vec<Vec<(f64, f64)>>,
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl Animator {
    /// Creates a new animator with one series per entry of `legend`.
    pub fn new(xlabel: &str, legend: &[&str]) -> Self {
        Self {
            xlabel: xlabel.to_string(),
            legend: legend.iter().map(|name| name.to_string()).collect(),
            xlim: None,
            ylim: None,
            series: vec![Vec::new(); legend.len()],
            path: None,
        }
    }
    /// Fixes the x axis. Defaults to the range of the data.
    pub fn xlim(self, lo: f64, hi: f64) -> Self {
        Self {
            xlim: Some((lo, hi)),
            ..self
        }
    }
    /// Fixes the y axis. Defaults to the range of the data.
    pub fn ylim(self, lo: f64, hi: f64) -> Self {
        Self {
            ylim: Some((lo, hi)),
            ..self
        }
    }
    /// The png file to render to.
    pub fn path(self, path: Option<PathBuf>) -> Self {
        if path.is_some() && !cfg!(feature = "plot") {
            tracing::warn!("plotting requires the `plot` feature, only recording points");
        }
        Self { path, ..self }
    }
    /// The legend.
    pub fn legend(&self) -> &[String] {
        &self.legend
    }
    /// The (x, y) points of each series.
    pub fn series(&self) -> &[Vec<(f64, f64)>] {
        &self.series
    }
    /// Adds a point at `x` to each series with a `Some` value.
    ///
    /// **Errors**
    /// - The length of `ys` does not match the legend.
    /// - Rendering failed.
    pub fn add(&mut self, x: f64, ys: &[Option<f64>]) -> Result<()> {
        ensure!(
            ys.len() == self.legend.len(),
            "expected {} values, found {}",
            self.legend.len(),
            ys.len()
        );
        for ((name, series), y) in self.legend.iter().zip(self.series.iter_mut()).zip(ys) {
            if let Some(y) = y {
                tracing::debug!("{name}: ({x:.3}, {y:.3})");
                series.push((x, *y));
            }
        }
        #[cfg(feature = "plot")]
        if let Some(path) = self.path.as_ref() {
            self.render(path)?;
        }
        Ok(())
    }
    #[cfg_attr(not(feature = "plot"), allow(dead_code))]
    fn points(&self) -> impl Iterator<Item = &(f64, f64)> {
        self.series.iter().flatten()
    }
    #[cfg_attr(not(feature = "plot"), allow(dead_code))]
    fn x_range(&self) -> (f64, f64) {
        let range = self.xlim.unwrap_or_else(|| {
            self.points()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (x, _)| {
                    (lo.min(*x), hi.max(*x))
                })
        });
        widen(range)
    }
    #[cfg_attr(not(feature = "plot"), allow(dead_code))]
    fn y_range(&self) -> (f64, f64) {
        let range = self.ylim.unwrap_or_else(|| {
            self.points()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (_, y)| {
                    (lo.min(*y), hi.max(*y))
                })
        });
        widen(range)
    }
    /// Renders the chart to the png at `path`.
    #[cfg(feature = "plot")]
    pub fn render(&self, path: &Path) -> Result<()> {
        use plotters::prelude::*;

        const COLORS: [RGBColor; 6] = [BLUE, MAGENTA, GREEN, RED, CYAN, BLACK];

        let (x0, x1) = self.x_range();
        let (y0, y1) = self.y_range();
        let root = BitMapBackend::new(path, (640, 420)).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .set_all_label_area_size(40)
            .build_cartesian_2d(x0..x1, y0..y1)?;
        chart
            .configure_mesh()
            .disable_mesh()
            .x_desc(self.xlabel.as_str())
            .x_label_formatter(&|v| format!("{:.1}", v))
            .y_label_formatter(&|v| format!("{:.2}", v))
            .draw()?;
        for (i, (name, points)) in self.legend.iter().zip(self.series.iter()).enumerate() {
            let color = COLORS[i % COLORS.len()];
            chart
                .draw_series(LineSeries::new(points.iter().copied(), &color))?
                .label(name.as_str())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
            chart.draw_series(
                points
                    .iter()
                    .copied()
                    .map(|(x, y)| Circle::new((x, y), 2, color.filled())),
            )?;
        }
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::LowerRight)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
        root.present()?;
        Ok(())
    }
    /// Writes the points as json.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

// plotters needs a non-empty range
#[cfg_attr(not(feature = "plot"), allow(dead_code))]
fn widen((lo, hi): (f64, f64)) -> (f64, f64) {
    if !lo.is_finite() || !hi.is_finite() {
        (0., 1.)
    } else if hi - lo < f64::EPSILON {
        (lo - 0.5, hi + 0.5)
    } else {
        (lo, hi)
    }
}
