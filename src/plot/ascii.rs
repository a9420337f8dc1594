//! ASCII plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - ON samples: `o`, OFF samples: `x`
//! - fitted ON curve: `-`, fitted OFF curve: `=`

use crate::domain::{CosineParams, Trace};
use crate::models::predict;

/// Everything drawable for one ON/OFF working point.
///
/// Any element may be absent: the `plot` command reloads fitted parameters
/// without raw samples, and a diverged fit has no curve to draw.
#[derive(Debug, Clone, Copy, Default)]
pub struct PairSeries<'a> {
    pub on_trace: Option<&'a Trace>,
    pub off_trace: Option<&'a Trace>,
    pub on_fit: Option<&'a CosineParams>,
    pub off_fit: Option<&'a CosineParams>,
}

/// Render an ON/OFF pair with fitted-curve overlays.
pub fn render_pair_plot(series: &PairSeries, width: usize, height: usize) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let (x_min, x_max) = basis_range(series).unwrap_or((0.0, 1.0));

    let on_curve = series
        .on_fit
        .filter(|p| p.is_defined())
        .map(|p| sample_curve(p, x_min, x_max, width));
    let off_curve = series
        .off_fit
        .filter(|p| p.is_defined())
        .map(|p| sample_curve(p, x_min, x_max, width));

    let (y_min, y_max) = value_range(series, on_curve.as_deref(), off_curve.as_deref())
        .unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Curves first (so samples can overlay), OFF under ON.
    if let Some(curve) = &off_curve {
        draw_curve(&mut grid, curve, x_min, x_max, y_min, y_max, '=');
    }
    if let Some(curve) = &on_curve {
        draw_curve(&mut grid, curve, x_min, x_max, y_min, y_max, '-');
    }

    if let Some(trace) = series.off_trace {
        draw_points(&mut grid, trace, x_min, x_max, y_min, y_max, 'x');
    }
    if let Some(trace) = series.on_trace {
        draw_points(&mut grid, trace, x_min, x_max, y_min, y_max, 'o');
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: basis=[{x_min:.3}, {x_max:.3}] | value=[{y_min:.3}, {y_max:.3}]\n"
    ));
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }

    out
}

fn basis_range(series: &PairSeries) -> Option<(f64, f64)> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for trace in [series.on_trace, series.off_trace].into_iter().flatten() {
        for &x in &trace.basis {
            min = min.min(x);
            max = max.max(x);
        }
    }
    if min.is_finite() && max.is_finite() && max > min {
        Some((min, max))
    } else {
        None
    }
}

fn value_range(
    series: &PairSeries,
    on_curve: Option<&[(f64, f64)]>,
    off_curve: Option<&[(f64, f64)]>,
) -> Option<(f64, f64)> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;

    for trace in [series.on_trace, series.off_trace].into_iter().flatten() {
        for &y in &trace.values {
            min = min.min(y);
            max = max.max(y);
        }
    }
    for curve in [on_curve, off_curve].into_iter().flatten() {
        for &(_, y) in curve {
            min = min.min(y);
            max = max.max(y);
        }
    }

    if min.is_finite() && max.is_finite() && max > min {
        Some((min, max))
    } else {
        None
    }
}

fn sample_curve(params: &CosineParams, x_min: f64, x_max: f64, n: usize) -> Vec<(f64, f64)> {
    let n = n.max(2);
    (0..n)
        .map(|i| {
            let u = i as f64 / (n as f64 - 1.0);
            let x = x_min + u * (x_max - x_min);
            (x, predict(x, params))
        })
        .collect()
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(x: f64, x_min: f64, x_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((x - x_min) / (x_max - x_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_points(
    grid: &mut [Vec<char>],
    trace: &Trace,
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
    ch: char,
) {
    let height = grid.len();
    let width = grid[0].len();
    for (&x, &y) in trace.basis.iter().zip(trace.values.iter()) {
        if !(x.is_finite() && y.is_finite()) {
            continue;
        }
        let col = map_x(x, x_min, x_max, width);
        let row = map_y(y, y_min, y_max, height);
        grid[row][col] = ch;
    }
}

fn draw_curve(
    grid: &mut [Vec<char>],
    curve: &[(f64, f64)],
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
    ch: char,
) {
    if curve.len() < 2 {
        return;
    }
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(x, y) in curve {
        let col = map_x(x, x_min, x_max, width);
        let row = map_y(y, y_min, y_max, height);
        if let Some((c0, r0)) = prev {
            draw_line(grid, c0, r0, col, row, ch);
        } else if grid[row][col] == ' ' {
            grid[row][col] = ch;
        }
        prev = Some((col, row));
    }
}

/// Integer line drawing (Bresenham-ish). Only fills blank cells.
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plot_golden_snapshot_points_only() {
        let on = Trace::new(vec![0.0, 0.5, 1.0], vec![0.0, 1.0, 0.0]).unwrap();
        let series = PairSeries {
            on_trace: Some(&on),
            ..PairSeries::default()
        };

        let txt = render_pair_plot(&series, 11, 5);
        let expected = concat!(
            "Plot: basis=[0.000, 1.000] | value=[-0.050, 1.050]\n",
            "     o     \n",
            "           \n",
            "           \n",
            "           \n",
            "o         o\n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn curves_draw_without_samples() {
        let params = CosineParams {
            amplitude: 0.5,
            phase: 0.0,
            offset: 0.5,
        };
        let series = PairSeries {
            on_fit: Some(&params),
            ..PairSeries::default()
        };

        let txt = render_pair_plot(&series, 40, 10);
        assert!(txt.contains('-'));
        assert!(!txt.contains('o'));
    }

    #[test]
    fn undefined_fits_are_skipped() {
        let params = CosineParams::nan();
        let off = Trace::new(vec![0.0, 0.25, 0.5], vec![0.2, 0.8, 0.2]).unwrap();
        let series = PairSeries {
            off_trace: Some(&off),
            on_fit: Some(&params),
            ..PairSeries::default()
        };

        let txt = render_pair_plot(&series, 20, 6);
        assert!(txt.contains('x'));
        assert!(!txt.contains('-'));
    }
}
