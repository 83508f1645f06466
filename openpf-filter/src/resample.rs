//! Weight-proportional index draws

use crate::config::ResamplingScheme;
use crate::error::{FilterError, FilterResult};
use rand::Rng;

fn cumulative(weights: &[f64]) -> FilterResult<Vec<f64>> {
    let mut sums = Vec::with_capacity(weights.len());
    let mut total = 0.0;
    for &w in weights {
        total += if w.is_finite() && w > 0.0 { w } else { 0.0 };
        sums.push(total);
    }
    if total > 0.0 {
        Ok(sums)
    } else {
        Err(FilterError::DegenerateWeights)
    }
}

/// Index of the first cumulative sum strictly above `u`
fn locate(sums: &[f64], u: f64) -> usize {
    let idx = sums.partition_point(|&c| c <= u);
    if idx < sums.len() {
        return idx;
    }
    // u landed on the total through rounding: take the last positive weight
    let total = sums.last().copied().unwrap_or(0.0);
    sums.partition_point(|&c| c < total).min(sums.len() - 1)
}

/// Draw a single index with probability proportional to its weight
pub fn sample_index<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> FilterResult<usize> {
    let sums = cumulative(weights)?;
    let total = sums[sums.len() - 1];
    Ok(locate(&sums, rng.gen::<f64>() * total))
}

/// Draw `n` indices with the given scheme
pub fn draw_indices<R: Rng + ?Sized>(
    weights: &[f64],
    n: usize,
    scheme: ResamplingScheme,
    rng: &mut R,
) -> FilterResult<Vec<usize>> {
    let sums = cumulative(weights)?;
    let total = sums[sums.len() - 1];
    let indices = match scheme {
        ResamplingScheme::Multinomial => (0..n)
            .map(|_| locate(&sums, rng.gen::<f64>() * total))
            .collect(),
        ResamplingScheme::Systematic => {
            let step = total / n as f64;
            let start = rng.gen::<f64>() * step;
            (0..n)
                .map(|k| locate(&sums, start + k as f64 * step))
                .collect()
        }
    };
    Ok(indices)
}

/// Kish's effective sample size, `(sum w)^2 / sum w^2`
pub fn effective_sample_size(weights: &[f64]) -> f64 {
    let (sum, sum_sq) = weights
        .iter()
        .fold((0.0, 0.0), |(s, sq), &w| (s + w, sq + w * w));
    if sum_sq > 0.0 {
        sum * sum / sum_sq
    } else {
        0.0
    }
}
