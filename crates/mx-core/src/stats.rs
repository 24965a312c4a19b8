//! Robust statistics shared by the loudness meter, the reference
//! builder and the calibrator.

/// Scale factor that makes the MAD a consistent estimator of the
/// standard deviation for normally distributed data.
pub const MAD_SCALE: f64 = 1.4826;

/// Median of a slice. Returns `None` for empty input.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 1 {
        Some(sorted[n / 2])
    } else {
        Some((sorted[n / 2 - 1] + sorted[n / 2]) * 0.5)
    }
}

/// Median absolute deviation around the median.
pub fn mad(values: &[f64]) -> Option<f64> {
    let m = median(values)?;
    let deviations: Vec<f64> = values.iter().map(|v| (v - m).abs()).collect();
    median(&deviations)
}

/// Robust spread estimate: `1.4826 x MAD`.
pub fn robust_spread(values: &[f64]) -> Option<f64> {
    mad(values).map(|m| m * MAD_SCALE)
}

/// Linearly interpolated percentile, `p` in 0..=100.
///
/// Returns `None` for empty input.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n == 1 {
        return Some(sorted[0]);
    }
    let rank = (p / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[3.0]), Some(3.0));
        assert_eq!(median(&[1.0, 3.0, 2.0]), Some(2.0));
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), Some(2.5));
    }

    #[test]
    fn test_mad() {
        // Values 1..=5: median 3, abs deviations [2,1,0,1,2], MAD 1
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(mad(&values), Some(1.0));
        assert_eq!(robust_spread(&values), Some(MAD_SCALE));
    }

    #[test]
    fn test_mad_outlier_resistance() {
        let clean = [10.0, 10.5, 11.0, 9.5, 9.0];
        let dirty = [10.0, 10.5, 11.0, 9.5, 900.0];
        let spread_clean = robust_spread(&clean).unwrap();
        let spread_dirty = robust_spread(&dirty).unwrap();
        // One wild outlier must not blow up the spread estimate
        assert!(spread_dirty < spread_clean * 3.0);
    }

    #[test]
    fn test_percentile() {
        let values = [10.0, 20.0, 30.0, 40.0, 50.0];
        assert_eq!(percentile(&values, 0.0), Some(10.0));
        assert_eq!(percentile(&values, 50.0), Some(30.0));
        assert_eq!(percentile(&values, 100.0), Some(50.0));
        assert_eq!(percentile(&values, 25.0), Some(20.0));
    }
}
