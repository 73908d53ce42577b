//! Small numeric helpers shared by the stabilization engine and calibration.

/// Spread of a burst (max - min). Empty input yields 0.
#[inline]
pub fn range(samples: &[f64]) -> f64 {
    let mut it = samples.iter().copied();
    let Some(first) = it.next() else {
        return 0.0;
    };
    let (lo, hi) = it.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
    hi - lo
}

/// Upper median: element at index `len / 2` after sorting. Empty input yields 0.
pub fn median(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted[sorted.len() / 2]
}

/// Mean after discarding `trim_ratio` of the samples at each tail.
///
/// The trim count is `floor(len * trim_ratio)`; when trimming would leave nothing,
/// all samples are averaged.
pub fn trimmed_mean(samples: &[f64], trim_ratio: f64) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let ratio = trim_ratio.clamp(0.0, 0.5);
    let trim = (sorted.len() as f64 * ratio).floor() as usize;
    let kept = if trim > 0 && sorted.len() > 2 * trim {
        &sorted[trim..sorted.len() - trim]
    } else {
        &sorted[..]
    };
    Some(kept.iter().sum::<f64>() / kept.len() as f64)
}
