/// Arithmetic mean of `values`, or `None` when there are none.
///
/// Plain sum-then-divide with no rounding applied.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}
