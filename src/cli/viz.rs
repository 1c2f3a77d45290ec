//! Terminal visualization using braille graphics
//!
//! Renders Monte Carlo score distributions with Unicode braille characters.

use drawille::Canvas;

/// Default canvas size for histograms, in braille dots
pub const HISTOGRAM_WIDTH: u32 = 120;
pub const HISTOGRAM_HEIGHT: u32 = 40;

/// Bin counts of the finite samples over `[min, max]`
pub fn bin_counts(samples: &[f64], bins: usize) -> Option<(Vec<usize>, f64, f64)> {
    let finite: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() || bins == 0 {
        return None;
    }
    let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut counts = vec![0; bins];
    let width = (max - min) / bins as f64;
    for v in finite {
        let bin = if width > 0.0 {
            (((v - min) / width) as usize).min(bins - 1)
        } else {
            0
        };
        counts[bin] += 1;
    }
    Some((counts, min, max))
}

/// Render a braille histogram of `samples`
///
/// # Example Output
/// ```text
/// ⣿⣿⣶⣤⡀
/// ⣿⣿⣿⣿⣿⣶⣀
/// 1.82                12.40
/// ```
pub fn render_histogram(samples: &[f64], width: u32, height: u32) -> String {
    let bins = (width / 2).max(1) as usize;
    let Some((counts, min, max)) = bin_counts(samples, bins) else {
        return "  (no finite samples)".to_string();
    };
    let peak = counts.iter().copied().max().unwrap_or(1).max(1);

    let mut canvas = Canvas::new(width, height);
    for (i, &count) in counts.iter().enumerate() {
        let bar = ((count as f64 / peak as f64) * (height - 1) as f64).round() as u32;
        if bar == 0 {
            continue;
        }
        let x = i as u32 * 2;
        for y in (height - bar)..height {
            canvas.set(x, y);
            canvas.set(x + 1, y);
        }
    }
    // Baseline
    for x in 0..width {
        canvas.set(x, height - 1);
    }

    let mut out = canvas.frame();
    let left = format!("{:.4}", min);
    let right = format!("{:.4}", max);
    let columns = (width / 2) as usize;
    let gap = columns.saturating_sub(left.len() + right.len()).max(1);
    out.push('\n');
    out.push_str(&left);
    out.push_str(&" ".repeat(gap));
    out.push_str(&right);
    out
}
