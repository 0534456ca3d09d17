use burn::{nn::loss::Reduction, prelude::*};
use core::marker::PhantomData;

/// Floor applied to the squared distance before the square root, so the
/// gradient stays finite when both embeddings coincide.
pub const DISTANCE_EPSILON: f32 = 1e-7;

/// Euclidean distance between two batches of embeddings.
///
/// # Shapes
///
/// - x: `[batch_size, d_embedding]`
/// - y: `[batch_size, d_embedding]`
/// - output: `[batch_size, 1]`
pub fn euclidean_distance<B: Backend>(x: Tensor<B, 2>, y: Tensor<B, 2>) -> Tensor<B, 2> {
    (x - y)
        .powf_scalar(2.0)
        .sum_dim(1)
        .clamp_min(DISTANCE_EPSILON)
        .sqrt()
}

/// Configuration to create a [contrastive loss](ContrastiveLoss).
#[derive(Config, Debug)]
pub struct ContrastiveLossConfig {
    /// Distance beyond which pairs of different classes stop being penalized.
    #[config(default = 1.0)]
    pub margin: f32,
}

impl ContrastiveLossConfig {
    /// Initialize [contrastive loss](ContrastiveLoss).
    pub fn init<B: Backend>(&self) -> ContrastiveLoss<B> {
        assert!(
            self.margin >= 0.0,
            "Margin for contrastive loss must be a non-negative number."
        );

        ContrastiveLoss {
            margin: self.margin,
            _backend: PhantomData,
        }
    }
}

/// Contrastive loss from Hadsell, Chopra and LeCun (2006).
///
/// For a pair label `y` (1 for the same class, 0 otherwise) and a predicted
/// distance `d`, each pair contributes
///
/// ```text
/// L(y, d) = y * d^2 + (1 - y) * max(margin - d, 0)^2
/// ```
///
/// Pairs of the same class are pulled together, pairs of different classes are
/// pushed apart until their distance reaches the margin.
#[derive(Module, Debug)]
pub struct ContrastiveLoss<B: Backend> {
    margin: f32,
    _backend: PhantomData<B>,
}

impl<B: Backend> ContrastiveLoss<B> {
    /// Compute the loss for each pair, then reduce to a single value.
    ///
    /// `Reduction::Auto` behaves as `Reduction::Mean`.
    ///
    /// # Shapes
    ///
    /// - distances: `[batch_size, 1]`
    /// - targets: `[batch_size, 1]`
    /// - output: `[1]`
    pub fn forward(
        &self,
        distances: Tensor<B, 2>,
        targets: Tensor<B, 2>,
        reduction: Reduction,
    ) -> Tensor<B, 1> {
        let loss = self.forward_no_reduction(distances, targets);
        match reduction {
            Reduction::Mean | Reduction::Auto => loss.mean(),
            Reduction::Sum => loss.sum(),
        }
    }

    /// Compute the loss for each pair.
    ///
    /// # Shapes
    ///
    /// - distances: `[batch_size, 1]`
    /// - targets: `[batch_size, 1]`
    /// - output: `[batch_size, 1]`
    pub fn forward_no_reduction(
        &self,
        distances: Tensor<B, 2>,
        targets: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        let similar = distances.clone().powf_scalar(2.0);
        let dissimilar = distances
            .neg()
            .add_scalar(self.margin)
            .clamp_min(0.0)
            .powf_scalar(2.0);

        targets.clone() * similar + targets.neg().add_scalar(1.0) * dissimilar
    }

    pub fn margin(&self) -> f32 {
        self.margin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;
    type TestTensor<const D: usize> = Tensor<TestBackend, D>;

    fn column(values: &[f32]) -> TestTensor<2> {
        let device = Default::default();
        TestTensor::<2>::from_data(TensorData::new(values.to_vec(), [values.len(), 1]), &device)
    }

    fn scalar(tensor: TestTensor<1>) -> f32 {
        tensor.into_scalar().elem::<f32>()
    }

    #[test]
    fn distance_to_self_is_bounded_by_epsilon() {
        let device = Default::default();
        let x = TestTensor::<2>::from_floats([[0.3, -1.2, 4.0], [2.0, 0.0, 0.5]], &device);

        let distances = euclidean_distance(x.clone(), x).into_data().to_vec::<f32>().unwrap();

        assert_eq!(distances.len(), 2);
        for d in distances {
            assert!(d >= 0.0 && d <= DISTANCE_EPSILON.sqrt() + 1e-6);
        }
    }

    #[test]
    fn distance_is_euclidean_per_row() {
        let device = Default::default();
        let x = TestTensor::<2>::from_floats([[0.0, 0.0], [1.0, 1.0]], &device);
        let y = TestTensor::<2>::from_floats([[3.0, 4.0], [1.0, 2.0]], &device);

        let distances = euclidean_distance(x, y);

        assert_eq!(distances.dims(), [2, 1]);
        let values = distances.into_data().to_vec::<f32>().unwrap();
        assert!((values[0] - 5.0).abs() < 1e-5);
        assert!((values[1] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn contrastive_loss_reference_points() {
        let loss = ContrastiveLossConfig::new().init::<TestBackend>();
        let margin = loss.margin();

        let same_at_zero = loss.forward(column(&[0.0]), column(&[1.0]), Reduction::Mean);
        assert_eq!(scalar(same_at_zero), 0.0);

        let different_at_margin = loss.forward(column(&[margin]), column(&[0.0]), Reduction::Mean);
        assert_eq!(scalar(different_at_margin), 0.0);

        let different_at_zero = loss.forward(column(&[0.0]), column(&[0.0]), Reduction::Mean);
        assert!((scalar(different_at_zero) - margin * margin).abs() < 1e-6);
    }

    #[test]
    fn contrastive_loss_reductions() {
        let loss = ContrastiveLossConfig::new().with_margin(2.0).init::<TestBackend>();
        let distances = column(&[0.5, 0.5, 3.0, 1.0]);
        let targets = column(&[1.0, 0.0, 0.0, 1.0]);

        let per_pair = loss
            .forward_no_reduction(distances.clone(), targets.clone())
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        let expected = [0.25, 2.25, 0.0, 1.0];
        for (value, expected) in per_pair.iter().zip(expected) {
            assert!((value - expected).abs() < 1e-5);
        }

        let sum = scalar(loss.forward(distances.clone(), targets.clone(), Reduction::Sum));
        assert!((sum - 3.5).abs() < 1e-5);

        let mean = scalar(loss.forward(distances, targets, Reduction::Auto));
        assert!((mean - 0.875).abs() < 1e-5);
    }

    #[test]
    #[should_panic = "Margin for contrastive loss must be a non-negative number."]
    fn negative_margin_is_rejected() {
        ContrastiveLossConfig::new().with_margin(-1.0).init::<TestBackend>();
    }
}
