//! Ranked prediction types and the best-first traversal engines.

mod top_k;

pub use top_k::{
    hsm_label_probability, plt_label_probability_with, predict_hsm, predict_plt,
    predict_plt_with,
};

/// One ranked label with its probability.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: u32,
    pub value: f64,
}

/// Cut a descending-ranked list by count and probability threshold.
///
/// `top_k == 0` means no count limit; `threshold` keeps strictly greater
/// values only.
pub(crate) fn truncate_ranked(predictions: &mut Vec<Prediction>, top_k: usize, threshold: f64) {
    if top_k > 0 && predictions.len() > top_k {
        predictions.truncate(top_k);
    }
    if threshold > 0.0 {
        let keep = predictions.iter().take_while(|p| p.value > threshold).count();
        predictions.truncate(keep);
    }
}
