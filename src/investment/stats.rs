//! Small numeric helpers shared by the investment pipeline

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn median(values: &[f64]) -> Option<f64> {
    percentile(values, 50.0)
}

/// Percentile with linear interpolation between closest ranks; `q` in 0..=100
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let position = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Sample standard deviation (n - 1)
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

/// Least-squares slope of `values` against their index
pub fn index_slope(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = mean(values)?;
    let (mut num, mut den) = (0.0, 0.0);
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    Some(num / den)
}

/// Percentile ranks in (0, 1], ties sharing their average rank; `None` stays `None`
pub fn rank_pct(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut present: Vec<(usize, f64)> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.filter(|x| !x.is_nan()).map(|x| (i, x)))
        .collect();
    present.sort_by(|a, b| a.1.total_cmp(&b.1));

    let count = present.len() as f64;
    let mut ranks = vec![None; values.len()];
    let mut start = 0;
    while start < present.len() {
        let mut end = start;
        while end + 1 < present.len() && present[end + 1].1 == present[start].1 {
            end += 1;
        }
        // 1-based positions start+1 ..= end+1
        let average = (start + end) as f64 / 2.0 + 1.0;
        for &(index, _) in &present[start..=end] {
            ranks[index] = Some(average / count);
        }
        start = end + 1;
    }
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolated_percentiles() {
        let values = [10.0, 20.0, 30.0, 40.0];
        assert_eq!(median(&values), Some(25.0));
        assert_eq!(percentile(&values, 0.0), Some(10.0));
        assert_eq!(percentile(&values, 100.0), Some(40.0));
        // position 0.95 * 3 = 2.85
        assert!((percentile(&values, 95.0).unwrap() - 38.5).abs() < 1e-9);
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn spread_and_trend() {
        assert!((sample_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap() - 2.138_089_935).abs() < 1e-6);
        assert_eq!(sample_std(&[1.0]), None);
        assert!((index_slope(&[1.0, 3.0, 5.0]).unwrap() - 2.0).abs() < 1e-12);
        assert_eq!(index_slope(&[4.0, 4.0]), Some(0.0));
    }

    #[test]
    fn average_ranks_for_ties() {
        let ranks = rank_pct(&[Some(3.0), None, Some(1.0), Some(3.0)]);
        assert_eq!(ranks, vec![Some(2.5 / 3.0), None, Some(1.0 / 3.0), Some(2.5 / 3.0)]);
    }
}
