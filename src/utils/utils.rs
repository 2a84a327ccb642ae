/// mean returns the arithmetic mean of the values, or 0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// variance returns the population variance of the values, or 0 for an empty slice.
pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

/// mean_and_variance returns both statistics in one call.
pub fn mean_and_variance(values: &[f64]) -> (f64, f64) {
    (mean(values), variance(values))
}
