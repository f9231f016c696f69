use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Binary cross-entropy on logits, averaged over the batch
///
/// Uses the stable form `max(z, 0) - z * y + ln(1 + exp(-|z|))`. With
/// `weights`, each row's loss is scaled before averaging, so the result is
/// `sum(w_i * l_i) / n`.
///
/// # Arguments
/// * `logits` - Model output logits [batch_size, 1]
/// * `targets` - Labels as 0.0 / 1.0 [batch_size, 1]
/// * `weights` - Optional per-row weights [batch_size, 1]
pub fn binary_cross_entropy_with_logits<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 2>,
    weights: Option<Tensor<B, 2>>,
) -> Tensor<B, 1> {
    let softplus_tail = logits.clone().abs().neg().exp().add_scalar(1.0).log();
    let loss = logits.clone().clamp_min(0.0) - logits * targets + softplus_tail;

    match weights {
        Some(w) => (loss * w).mean(),
        None => loss.mean(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray<f32>;

    fn column(values: Vec<f32>) -> Tensor<TestBackend, 2> {
        let device = Default::default();
        let n = values.len();
        Tensor::from_data(TensorData::new(values, [n, 1]), &device)
    }

    #[test]
    fn test_bce_matches_closed_form() {
        let logits = column(vec![0.0, 2.0]);
        let targets = column(vec![1.0, 0.0]);

        let loss: f32 = binary_cross_entropy_with_logits(logits, targets, None).into_scalar();

        // ln 2 for the zero logit, ln(1 + e^2) for the confident miss
        let expected = ((2.0f32).ln() + (1.0 + 2.0f32.exp()).ln()) / 2.0;
        assert!((loss - expected).abs() < 1e-5);
    }

    #[test]
    fn test_weighted_bce_scales_rows() {
        let logits = column(vec![0.0, 0.0]);
        let targets = column(vec![1.0, 0.0]);
        let weights = column(vec![3.0, 1.0]);

        let loss: f32 =
            binary_cross_entropy_with_logits(logits, targets, Some(weights)).into_scalar();

        assert!((loss - 2.0 * 2.0f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_bce_stable_for_large_logits() {
        let logits = column(vec![80.0, -80.0]);
        let targets = column(vec![1.0, 0.0]);

        let loss: f32 = binary_cross_entropy_with_logits(logits, targets, None).into_scalar();
        assert!(loss.is_finite());
        assert!(loss < 1e-6);
    }
}
