use std::time::Instant;

use burn::{
    data::{dataloader::DataLoaderBuilder, dataset::vision::MnistDataset},
    module::AutodiffModule,
    optim::{adaptor::OptimizerAdaptor, Adam, AdamConfig, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
    train::{TrainOutput, TrainStep, ValidStep},
};
use rand::{rngs::StdRng, SeedableRng};

use crate::{
    data::LabeledSplit,
    loss::ContrastiveLossConfig,
    metric::{accuracy, compute_accuracy, RunningAverage},
    model::{EmbeddingNetConfig, SiameseNet},
    pairs::{PairBatch, PairBatcher, PairDataset},
};

#[derive(Config)]
pub struct ExperimentConfig {
    #[config(default = 20)]
    pub num_epochs: usize,
    #[config(default = 128)]
    pub batch_size: usize,
    #[config(default = 4)]
    pub num_workers: usize,
    #[config(default = 42)]
    pub seed: u64,
    #[config(default = 1e-3)]
    pub learning_rate: f64,
    #[config(default = 10)]
    pub num_classes: usize,
    #[config(default = "EmbeddingNetConfig::new()")]
    pub model: EmbeddingNetConfig,
    #[config(default = "ContrastiveLossConfig::new()")]
    pub loss: ContrastiveLossConfig,
    #[config(default = "AdamConfig::new().with_epsilon(1e-7)")]
    pub optimizer: AdamConfig,
}

/// Loss and accuracy of one epoch, averaged over the pairs seen.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub valid_loss: f64,
    pub valid_accuracy: f64,
}

/// Results of a full experiment.
#[derive(Clone, Debug)]
pub struct Metrics {
    /// Accuracy over every training pair, predicted after the last epoch.
    pub train_accuracy: f64,
    /// Accuracy over every test pair, predicted after the last epoch.
    pub test_accuracy: f64,
    pub history: Vec<EpochMetrics>,
}

impl core::fmt::Display for Metrics {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(
            f,
            "* Accuracy on training set: {:.2}%",
            100.0 * self.train_accuracy
        )?;
        write!(f, "* Accuracy on test set: {:.2}%", 100.0 * self.test_accuracy)
    }
}

/// Owns the Siamese network and its optimizer for the duration of training.
pub struct Trainer<B: AutodiffBackend> {
    model: SiameseNet<B>,
    optim: OptimizerAdaptor<Adam, SiameseNet<B>, B>,
    learning_rate: f64,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(config: &ExperimentConfig, device: &B::Device) -> Self {
        Self {
            model: SiameseNet::new(&config.model, &config.loss, device),
            optim: config.optimizer.init(),
            learning_rate: config.learning_rate,
        }
    }

    /// Runs one optimization step per batch and returns the epoch's mean loss and accuracy.
    pub fn train_epoch<I>(&mut self, epoch: usize, batches: I) -> (f64, f64)
    where
        I: IntoIterator<Item = PairBatch<B>>,
    {
        let mut loss = RunningAverage::default();
        let mut acc = RunningAverage::default();

        for (iteration, batch) in batches.into_iter().enumerate() {
            let batch_size = batch.targets.dims()[0];
            let model = self.model.clone();

            let TrainOutput { grads, item } =
                TrainStep::<PairBatch<B>, _>::step(&model, batch);
            self.model = self.optim.step(self.learning_rate, model, grads);

            let batch_loss = item.loss.into_scalar().elem::<f64>();
            let batch_acc = accuracy(item.targets, item.distances)
                .into_scalar()
                .elem::<f64>();
            loss.update(batch_loss, batch_size);
            acc.update(batch_acc, batch_size);

            log::debug!(
                "[Train - Epoch {epoch} - Iteration {iteration}] Loss {batch_loss:.4} | Accuracy {:.2} %",
                100.0 * batch_acc
            );
        }

        (loss.value(), acc.value())
    }

    /// Evaluates the current parameters with dropout disabled.
    pub fn valid_epoch<I>(&self, batches: I) -> (f64, f64)
    where
        I: IntoIterator<Item = PairBatch<B::InnerBackend>>,
    {
        let model = self.model.valid();
        let mut loss = RunningAverage::default();
        let mut acc = RunningAverage::default();

        for batch in batches {
            let batch_size = batch.targets.dims()[0];
            let item = ValidStep::<PairBatch<B::InnerBackend>, _>::step(&model, batch);

            loss.update(item.loss.into_scalar().elem::<f64>(), batch_size);
            acc.update(
                accuracy(item.targets, item.distances)
                    .into_scalar()
                    .elem::<f64>(),
                batch_size,
            );
        }

        (loss.value(), acc.value())
    }

    /// Predicted distance of every pair, in batch order.
    pub fn predict<I>(&self, batches: I) -> Vec<f32>
    where
        I: IntoIterator<Item = PairBatch<B::InnerBackend>>,
    {
        let model = self.model.valid();

        batches
            .into_iter()
            .flat_map(|batch| {
                model
                    .forward(batch.left, batch.right)
                    .into_data()
                    .iter::<f32>()
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

/// Loads MNIST, then trains and evaluates the Siamese network on its pairs.
pub fn run_experiment<B: AutodiffBackend>(config: &ExperimentConfig, device: B::Device) -> Metrics {
    let train = LabeledSplit::from_dataset(&MnistDataset::train());
    let test = LabeledSplit::from_dataset(&MnistDataset::test());
    log::info!(
        "Loaded MNIST with {} train and {} test images",
        train.len(),
        test.len()
    );

    run_on_splits::<B>(config, &train, &test, device)
}

/// Trains and evaluates the Siamese network on pairs drawn from the given splits.
///
/// The fixed number of epochs always runs to completion; the test pairs serve
/// as validation data once per epoch.
pub fn run_on_splits<B: AutodiffBackend>(
    config: &ExperimentConfig,
    train: &LabeledSplit,
    test: &LabeledSplit,
    device: B::Device,
) -> Metrics {
    B::seed(config.seed);
    let mut rng = StdRng::seed_from_u64(config.seed);

    let pairs_train = PairDataset::new(train, config.num_classes, &mut rng);
    let pairs_test = PairDataset::new(test, config.num_classes, &mut rng);
    log::info!(
        "Created {} train pairs and {} test pairs",
        pairs_train.positions().len(),
        pairs_test.positions().len()
    );
    let labels_train = pairs_train.labels().to_vec();
    let labels_test = pairs_test.labels().to_vec();

    let dataloader_train = DataLoaderBuilder::<B, _, _>::new(PairBatcher)
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.num_workers)
        .set_device(device.clone())
        .build(pairs_train.clone());

    // Single-threaded loaders keep the pair order, so predicted distances line up with labels.
    let dataloader_train_ordered = DataLoaderBuilder::<B::InnerBackend, _, _>::new(PairBatcher)
        .batch_size(config.batch_size)
        .set_device(device.clone())
        .build(pairs_train);
    let dataloader_test = DataLoaderBuilder::<B::InnerBackend, _, _>::new(PairBatcher)
        .batch_size(config.batch_size)
        .set_device(device.clone())
        .build(pairs_test);

    let mut trainer = Trainer::<B>::new(config, &device);
    let mut history = Vec::with_capacity(config.num_epochs);
    let now = Instant::now();

    for epoch in 1..config.num_epochs + 1 {
        let (train_loss, train_accuracy) = trainer.train_epoch(epoch, dataloader_train.iter());
        let (valid_loss, valid_accuracy) = trainer.valid_epoch(dataloader_test.iter());

        let metrics = EpochMetrics {
            epoch,
            train_loss,
            train_accuracy,
            valid_loss,
            valid_accuracy,
        };
        log::info!("{metrics:?}");
        println!(
            "[Epoch {epoch}/{}] Loss {train_loss:.4} | Accuracy {:.2} % | Valid Loss {valid_loss:.4} | Valid Accuracy {:.2} %",
            config.num_epochs,
            100.0 * train_accuracy,
            100.0 * valid_accuracy,
        );
        history.push(metrics);
    }

    let elapsed = now.elapsed().as_secs();
    log::info!("Training completed in {}m{}s", elapsed / 60, elapsed % 60);

    let distances = trainer.predict(dataloader_train_ordered.iter());
    let train_accuracy = compute_accuracy(&labels_train, &distances);
    let distances = trainer.predict(dataloader_test.iter());
    let test_accuracy = compute_accuracy(&labels_test, &distances);

    Metrics {
        train_accuracy,
        test_accuracy,
        history,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_the_reference_experiment() {
        let config = ExperimentConfig::new();

        assert_eq!(config.num_epochs, 20);
        assert_eq!(config.batch_size, 128);
        assert_eq!(config.num_classes, 10);
        assert_eq!(config.loss.margin, 1.0);
        assert_eq!(config.model.dropout, 0.1);
        assert_eq!(config.learning_rate, 1e-3);
    }

    #[test]
    fn metrics_report_two_decimal_percentages() {
        let metrics = Metrics {
            train_accuracy: 0.987654,
            test_accuracy: 0.5,
            history: Vec::new(),
        };

        assert_eq!(
            metrics.to_string(),
            "* Accuracy on training set: 98.77%\n* Accuracy on test set: 50.00%"
        );
    }
}
