//! VISUALIZE: draw a chart from a table. The actual plotting backend is a
//! collaborator behind [`Renderer`]; the built-in one rasterizes straight
//! into a BMP so the crate works without a plotting dependency.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::Handler;
use crate::error::{RenderError, StepError};
use crate::image;
use crate::plan::{Capability, Step};
use crate::table::Table;
use crate::workspace::{Payload, Workspace};

const DEFAULT_WIDTH: u32 = 320;
const DEFAULT_HEIGHT: u32 = 240;
const MAX_DIMENSION: u32 = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Scatter,
    Line,
    Bar,
}

#[derive(Debug, Clone)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub x: String,
    pub y: String,
    pub width: u32,
    pub height: u32,
}

impl ChartSpec {
    fn from_params(params: &Value) -> Result<Self, StepError> {
        let kind = match params.get("chart").and_then(|v| v.as_str()) {
            Some("scatter") | None => ChartKind::Scatter,
            Some("line") => ChartKind::Line,
            Some("bar") => ChartKind::Bar,
            Some(other) => {
                return Err(RenderError::UnsupportedChart(other.to_string()).into());
            }
        };
        let x = params
            .get("x")
            .and_then(|v| v.as_str())
            .ok_or(StepError::MissingParam("x"))?;
        let y = params
            .get("y")
            .and_then(|v| v.as_str())
            .ok_or(StepError::MissingParam("y"))?;
        let width = dim(params, "width", DEFAULT_WIDTH);
        let height = dim(params, "height", DEFAULT_HEIGHT);
        Ok(Self {
            kind,
            x: x.to_string(),
            y: y.to_string(),
            width,
            height,
        })
    }
}

fn dim(params: &Value, key: &str, default: u32) -> u32 {
    params
        .get(key)
        .and_then(|v| v.as_u64())
        .map(|v| (v as u32).clamp(16, MAX_DIMENSION))
        .unwrap_or(default)
}

/// Turns a table and a chart spec into image bytes.
pub trait Renderer: Send + Sync {
    fn render(&self, table: &Table, spec: &ChartSpec) -> Result<Vec<u8>, RenderError>;
}

pub struct VisualizeHandler {
    renderer: Arc<dyn Renderer>,
}

impl VisualizeHandler {
    pub fn new(renderer: Arc<dyn Renderer>) -> Self {
        Self { renderer }
    }
}

#[async_trait]
impl Handler for VisualizeHandler {
    fn capability(&self) -> Capability {
        Capability::Visualize
    }

    async fn run(&self, step: &Step, workspace: &Workspace) -> Result<Payload, StepError> {
        let table = super::table_input(step, workspace)?;
        let spec = ChartSpec::from_params(&step.params)?;

        let bytes = self.renderer.render(&table, &spec)?;
        let image = image::sniff(&bytes).ok_or_else(|| {
            StepError::Render(RenderError::Backend(
                "renderer returned unrecognizable image bytes".to_string(),
            ))
        })?;
        tracing::debug!(
            width = image.width,
            height = image.height,
            format = %image.format,
            "rendered chart"
        );
        Ok(Payload::Image(image))
    }
}

/// Built-in bitmap renderer: white canvas, dark points/bars, no axes labels.
/// Good enough for an embedded thumbnail; swap in a real backend for more.
pub struct BitmapRenderer;

impl Renderer for BitmapRenderer {
    fn render(&self, table: &Table, spec: &ChartSpec) -> Result<Vec<u8>, RenderError> {
        if table.is_empty() {
            return Err(RenderError::EmptyTable);
        }
        let xs = table
            .numeric_column(&spec.x)
            .map_err(|_| RenderError::UnknownColumn(spec.x.clone()))?;
        let ys = table
            .numeric_column(&spec.y)
            .map_err(|_| RenderError::UnknownColumn(spec.y.clone()))?;

        let (w, h) = (spec.width, spec.height);
        let mut pixels = vec![0xFFu8; (w * h * 3) as usize];

        let (x_min, x_max) = bounds(&xs);
        let (y_min, y_max) = bounds(&ys);

        let project = |x: f64, y: f64| -> (u32, u32) {
            let margin = 8.0;
            let px = margin + (x - x_min) / (x_max - x_min).max(f64::EPSILON) * (w as f64 - 2.0 * margin);
            let py = margin + (y - y_min) / (y_max - y_min).max(f64::EPSILON) * (h as f64 - 2.0 * margin);
            // y grows upward on the chart, downward in the buffer
            (
                (px as u32).min(w - 1),
                (h - 1).saturating_sub(py as u32),
            )
        };

        let mut prev: Option<(u32, u32)> = None;
        for (&x, &y) in xs.iter().zip(&ys) {
            let (px, py) = project(x, y);
            match spec.kind {
                ChartKind::Scatter => blot(&mut pixels, w, h, px, py),
                ChartKind::Line => {
                    if let Some((qx, qy)) = prev {
                        line(&mut pixels, w, h, qx, qy, px, py);
                    }
                    blot(&mut pixels, w, h, px, py);
                    prev = Some((px, py));
                }
                ChartKind::Bar => {
                    for yy in py..h {
                        blot(&mut pixels, w, h, px, yy);
                    }
                }
            }
        }

        Ok(image::encode_bmp(w, h, &pixels))
    }
}

fn bounds(values: &[f64]) -> (f64, f64) {
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    (min, max)
}

/// A 2x2 dark dot.
fn blot(pixels: &mut [u8], w: u32, h: u32, x: u32, y: u32) {
    for dy in 0..2u32 {
        for dx in 0..2u32 {
            let (px, py) = (x + dx, y + dy);
            if px < w && py < h {
                let i = ((py * w + px) * 3) as usize;
                pixels[i] = 0x20;
                pixels[i + 1] = 0x30;
                pixels[i + 2] = 0x60;
            }
        }
    }
}

fn line(pixels: &mut [u8], w: u32, h: u32, x0: u32, y0: u32, x1: u32, y1: u32) {
    // Bresenham, integer-only
    let (mut x0, mut y0) = (x0 as i64, y0 as i64);
    let (x1, y1) = (x1 as i64, y1 as i64);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        blot(pixels, w, h, x0 as u32, y0 as u32);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
