use crate::model::loss::binary_cross_entropy_with_logits;
use crate::model::ModelConfig;
use burn::module::Module;
use burn::nn::{BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Initializer, Linear, LinearConfig};
use burn::tensor::activation::{relu, sigmoid};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Diabetes risk network: two regularized hidden blocks and a single logit
#[derive(Module, Debug)]
pub struct DiabetesNet<B: Backend> {
    fc1: Linear<B>,
    bn1: Option<BatchNorm<B, 0>>,
    fc2: Linear<B>,
    bn2: Option<BatchNorm<B, 0>>,
    output: Linear<B>,
    dropout: Dropout,
    l2: f64,
}

impl<B: Backend> DiabetesNet<B> {
    /// Forward pass returning logits `[batch, 1]`
    ///
    /// Dropout and batch statistics are only active on autodiff backends.
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = relu(self.fc1.forward(input));
        let x = match &self.bn1 {
            Some(bn) => bn.forward(x),
            None => x,
        };
        let x = self.dropout.forward(x);

        let x = relu(self.fc2.forward(x));
        let x = match &self.bn2 {
            Some(bn) => bn.forward(x),
            None => x,
        };
        let x = self.dropout.forward(x);

        self.output.forward(x)
    }

    /// Probabilities `[batch, 1]`
    pub fn predict_proba(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        sigmoid(self.forward(input))
    }

    /// `l2 * (||W1||² + ||W2||²)`; the output kernel is not penalized
    pub fn l2_penalty(&self) -> Tensor<B, 1> {
        let w1 = self.fc1.weight.val();
        let w2 = self.fc2.weight.val();
        ((w1.clone() * w1).sum() + (w2.clone() * w2).sum()).mul_scalar(self.l2)
    }

    /// Mean binary cross-entropy (optionally per-row weighted) plus the L2 term
    pub fn loss(
        &self,
        input: Tensor<B, 2>,
        targets: Tensor<B, 2>,
        weights: Option<Tensor<B, 2>>,
    ) -> TrainingOutput<B> {
        let logits = self.forward(input);
        let bce = binary_cross_entropy_with_logits(logits.clone(), targets.clone(), weights);
        let loss = bce + self.l2_penalty();

        TrainingOutput { loss, logits, targets }
    }
}

/// Training output
#[derive(Debug)]
pub struct TrainingOutput<B: Backend> {
    pub loss: Tensor<B, 1>,
    pub logits: Tensor<B, 2>,
    pub targets: Tensor<B, 2>,
}

/// Initialize the network from configuration
pub fn init_model<B: Backend>(config: &ModelConfig, device: &B::Device) -> DiabetesNet<B> {
    let dense = |d_in: usize, d_out: usize| {
        LinearConfig::new(d_in, d_out)
            .with_bias(true)
            .with_initializer(Initializer::XavierUniform { gain: 1.0 })
            .init(device)
    };
    let batch_norm = |features: usize| {
        config.use_batch_norm.then(|| {
            BatchNormConfig::new(features)
                .with_momentum(config.batch_norm_momentum)
                .with_epsilon(config.batch_norm_epsilon)
                .init(device)
        })
    };

    DiabetesNet {
        fc1: dense(config.input_size, config.hidden_size_1),
        bn1: batch_norm(config.hidden_size_1),
        fc2: dense(config.hidden_size_1, config.hidden_size_2),
        bn2: batch_norm(config.hidden_size_2),
        output: dense(config.hidden_size_2, 1),
        dropout: DropoutConfig::new(config.dropout).init(),
        l2: config.l2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_model_forward() {
        let device = <TestBackend as Backend>::Device::default();
        let config = ModelConfig::diabetes_default();
        let model = init_model::<TestBackend>(&config, &device);

        let input = Tensor::<TestBackend, 2>::zeros([2, 10], &device);
        let output = model.forward(input);

        // Output should be [2, 1] (batch_size, 1 for binary classification)
        assert_eq!(output.dims(), [2, 1]);
    }

    #[test]
    fn test_model_predict_proba_in_unit_interval() {
        let device = <TestBackend as Backend>::Device::default();
        let model = init_model::<TestBackend>(&ModelConfig::diabetes_default(), &device);

        let input = Tensor::<TestBackend, 2>::ones([3, 10], &device).mul_scalar(3.0);
        let probs: Vec<f32> = model.predict_proba(input).into_data().to_vec().unwrap();

        assert_eq!(probs.len(), 3);
        assert!(probs.iter().all(|p| p.is_finite() && (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_l2_penalty_positive() {
        let device = <TestBackend as Backend>::Device::default();
        let model = init_model::<TestBackend>(&ModelConfig::diabetes_default(), &device);

        let penalty: f32 = model.l2_penalty().into_scalar();
        assert!(penalty > 0.0);
    }
}
