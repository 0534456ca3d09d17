use burn::prelude::*;

/// Pairs closer than this distance are predicted to share a class.
pub const DISTANCE_THRESHOLD: f32 = 0.5;

/// Fraction of pairs whose thresholded distance agrees with the pair label.
///
/// An empty input has no defined accuracy and yields `NaN`.
pub fn compute_accuracy(labels: &[u8], distances: &[f32]) -> f64 {
    assert_eq!(
        labels.len(),
        distances.len(),
        "Every predicted distance must have a label."
    );

    let correct = labels
        .iter()
        .zip(distances)
        .filter(|(label, distance)| (**distance < DISTANCE_THRESHOLD) == (**label == 1))
        .count();

    correct as f64 / labels.len() as f64
}

/// Tensor form of [compute_accuracy], usable on any backend.
///
/// # Shapes
///
/// - targets: `[batch_size, 1]`
/// - distances: `[batch_size, 1]`
/// - output: `[1]`
pub fn accuracy<B: Backend>(targets: Tensor<B, 2>, distances: Tensor<B, 2>) -> Tensor<B, 1> {
    let predictions = distances.lower_elem(DISTANCE_THRESHOLD).float();

    predictions.equal(targets).float().mean()
}

/// Item-weighted running average of a per-batch value.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunningAverage {
    total: f64,
    count: usize,
}

impl RunningAverage {
    /// Records the mean `value` of a batch of `batch_size` items.
    pub fn update(&mut self, value: f64, batch_size: usize) {
        self.total += value * batch_size as f64;
        self.count += batch_size;
    }

    pub fn value(&self) -> f64 {
        self.total / self.count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn separated_distances_are_fully_accurate() {
        let labels = [1, 0, 1, 0];
        let distances = [0.1, 0.9, 0.49, 0.5];

        assert_eq!(compute_accuracy(&labels, &distances), 1.0);
    }

    #[test]
    fn inverted_distances_are_never_accurate() {
        let labels = [1, 0, 1, 0];
        let distances = [0.9, 0.1, 0.5, 0.49];

        assert_eq!(compute_accuracy(&labels, &distances), 0.0);
    }

    #[test]
    fn partial_accuracy() {
        let labels = [1, 0, 1, 0];
        let distances = [0.1, 0.1, 0.1, 0.1];

        assert_eq!(compute_accuracy(&labels, &distances), 0.5);
    }

    #[test]
    fn empty_input_has_undefined_accuracy() {
        assert!(compute_accuracy(&[], &[]).is_nan());
    }

    #[test]
    fn tensor_form_matches_slice_form() {
        let device = Default::default();
        let labels = [1u8, 0, 1, 0, 1];
        let distances = [0.2f32, 0.7, 0.8, 0.3, 0.0];

        let targets = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(labels.iter().map(|l| *l as f32).collect(), [5, 1]),
            &device,
        );
        let predicted = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(distances.to_vec(), [5, 1]),
            &device,
        );

        let tensor_accuracy = accuracy(targets, predicted).into_scalar().elem::<f64>();

        assert!((tensor_accuracy - compute_accuracy(&labels, &distances)).abs() < 1e-6);
        assert!((tensor_accuracy - 0.6).abs() < 1e-6);
    }

    #[test]
    fn running_average_weights_by_batch_size() {
        let mut average = RunningAverage::default();
        average.update(1.0, 3);
        average.update(0.0, 1);

        assert!((average.value() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn running_average_without_items_is_undefined() {
        assert!(RunningAverage::default().value().is_nan());
    }
}
