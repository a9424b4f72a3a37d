//! Display-side outlier filtering.
//!
//! A single glitched sample can compress an entire magnitude plot into a
//! flat line. Before plotting, each trace's magnitudes are clipped to the
//! [p1, p99] percentile band; the underlying sweep result is never touched,
//! so exported files always carry the raw data.

/// Percentage trimmed from each end of the magnitude distribution.
pub const DEFAULT_OUTLIER_PERCENTILE: f64 = 1.0;

/// Percentile of `values` with linear interpolation between order
/// statistics. `pct` is in [0, 100]. NaN samples are ignored; returns `None`
/// for an empty (or all-NaN) input.
pub fn percentile(values: &[f64], pct: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let rank = (pct / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Clip every sample to the [`lower_pct`, `upper_pct`] percentile band.
///
/// Samples inside the band, and NaN samples, pass through unchanged.
pub fn clip_to_percentiles(values: &[f64], lower_pct: f64, upper_pct: f64) -> Vec<f64> {
    let (Some(lower), Some(upper)) = (percentile(values, lower_pct), percentile(values, upper_pct))
    else {
        return values.to_vec();
    };
    let (lower, upper) = if lower <= upper {
        (lower, upper)
    } else {
        (upper, lower)
    };
    values
        .iter()
        .map(|&v| if v.is_nan() { v } else { v.clamp(lower, upper) })
        .collect()
}

/// Clip one trace's magnitudes to the default [p1, p99] band for display.
pub fn clip_display_magnitudes(values: &[f64]) -> Vec<f64> {
    clip_to_percentiles(
        values,
        DEFAULT_OUTLIER_PERCENTILE,
        100.0 - DEFAULT_OUTLIER_PERCENTILE,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_interpolates_linearly() {
        let values = [0.0, 10.0];
        assert_eq!(percentile(&values, 0.0), Some(0.0));
        assert_eq!(percentile(&values, 50.0), Some(5.0));
        assert_eq!(percentile(&values, 100.0), Some(10.0));
    }

    #[test]
    fn percentile_of_empty_input_is_none() {
        assert_eq!(percentile(&[], 50.0), None);
        assert_eq!(percentile(&[f64::NAN], 50.0), None);
    }

    #[test]
    fn single_extreme_outlier_is_clipped() {
        let mut values = vec![1.0; 100];
        values.push(500.0);

        let clipped = clip_display_magnitudes(&values);

        let p99 = percentile(&values, 99.0).unwrap();
        assert_eq!(clipped[100], p99);
        assert!(clipped[..100].iter().all(|&v| v == 1.0));
    }

    #[test]
    fn in_band_samples_are_untouched() {
        let values: Vec<f64> = (0..100).map(f64::from).collect();
        let clipped = clip_display_magnitudes(&values);
        assert_eq!(clipped[50], 50.0);
    }

    #[test]
    fn uniform_input_is_unchanged() {
        let values = vec![-3.5; 20];
        assert_eq!(clip_display_magnitudes(&values), values);
    }

    #[test]
    fn nan_samples_pass_through() {
        let values = [1.0, f64::NAN, 2.0];
        let clipped = clip_to_percentiles(&values, 1.0, 99.0);
        assert!(clipped[1].is_nan());
    }
}
