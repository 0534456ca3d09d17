use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        loss::Reduction,
        pool::{MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
    tensor::backend::AutodiffBackend,
    train::{TrainOutput, TrainStep, ValidStep},
};

use crate::{
    data::{HEIGHT, WIDTH},
    loss::{euclidean_distance, ContrastiveLoss, ContrastiveLossConfig},
    pairs::PairBatch,
};

#[derive(Config, Debug)]
pub struct EmbeddingNetConfig {
    #[config(default = 8)]
    pub channels: usize,
    #[config(default = 5)]
    pub kernel_size: usize,
    #[config(default = 64)]
    pub hidden_size: usize,
    #[config(default = 64)]
    pub d_embedding: usize,
    #[config(default = 0.1)]
    pub dropout: f64,
}

/// Convolutional feature extractor mapping a digit image to an embedding.
#[derive(Module, Debug)]
pub struct EmbeddingNet<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    pool: MaxPool2d,
    linear1: Linear<B>,
    linear2: Linear<B>,
    dropout: Dropout,
    activation: Relu,
}

impl EmbeddingNetConfig {
    /// Returns the initialized embedding network.
    pub fn init<B: Backend>(&self, device: &B::Device) -> EmbeddingNet<B> {
        let kernel = [self.kernel_size, self.kernel_size];
        // Same padding keeps 28x28 through both convolutions; the pooling halves it.
        let d_flatten = self.channels * (HEIGHT / 2) * (WIDTH / 2);

        EmbeddingNet {
            conv1: Conv2dConfig::new([1, self.channels], kernel)
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            conv2: Conv2dConfig::new([self.channels, self.channels], kernel)
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            linear1: LinearConfig::new(d_flatten, self.hidden_size).init(device),
            linear2: LinearConfig::new(self.hidden_size, self.d_embedding).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> EmbeddingNet<B> {
    /// # Shapes
    ///   - Images `[batch_size, 1, height, width]`
    ///   - Output `[batch_size, d_embedding]`
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(images);
        let x = self.dropout.forward(x);
        let x = self.conv2.forward(x);
        let x = self.dropout.forward(x);
        let x = self.pool.forward(x);

        let x = x.flatten::<2>(1, 3);

        let x = self.linear1.forward(x);
        let x = self.activation.forward(x);
        let x = self.dropout.forward(x);
        let x = self.linear2.forward(x);

        self.activation.forward(x)
    }
}

/// Twin network: a single [EmbeddingNet] applied to both members of a pair,
/// followed by the Euclidean distance between the two embeddings.
#[derive(Module, Debug)]
pub struct SiameseNet<B: Backend> {
    embedding: EmbeddingNet<B>,
    loss: ContrastiveLoss<B>,
}

/// Output of a Siamese forward step.
#[derive(Clone, Debug)]
pub struct SiameseOutput<B: Backend> {
    /// Mean contrastive loss over the batch, `[1]`.
    pub loss: Tensor<B, 1>,
    /// Predicted distances, `[batch_size, 1]`.
    pub distances: Tensor<B, 2>,
    /// Pair labels, `[batch_size, 1]`.
    pub targets: Tensor<B, 2>,
}

impl<B: Backend> SiameseNet<B> {
    pub fn new(
        embedding: &EmbeddingNetConfig,
        loss: &ContrastiveLossConfig,
        device: &B::Device,
    ) -> Self {
        Self {
            embedding: embedding.init(device),
            loss: loss.init(),
        }
    }

    /// # Shapes
    ///   - Left, right `[batch_size, 1, height, width]`
    ///   - Output `[batch_size, 1]`
    pub fn forward(&self, left: Tensor<B, 4>, right: Tensor<B, 4>) -> Tensor<B, 2> {
        let left = self.embedding.forward(left);
        let right = self.embedding.forward(right);

        euclidean_distance(left, right)
    }

    pub fn forward_step(&self, batch: PairBatch<B>) -> SiameseOutput<B> {
        let distances = self.forward(batch.left, batch.right);
        let loss = self
            .loss
            .forward(distances.clone(), batch.targets.clone(), Reduction::Mean);

        SiameseOutput {
            loss,
            distances,
            targets: batch.targets,
        }
    }
}

impl<B: AutodiffBackend> TrainStep<PairBatch<B>, SiameseOutput<B>> for SiameseNet<B> {
    fn step(&self, batch: PairBatch<B>) -> TrainOutput<SiameseOutput<B>> {
        let item = self.forward_step(batch);

        TrainOutput::new(self, item.loss.backward(), item)
    }
}

impl<B: Backend> ValidStep<PairBatch<B>, SiameseOutput<B>> for SiameseNet<B> {
    fn step(&self, batch: PairBatch<B>) -> SiameseOutput<B> {
        self.forward_step(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn images(value: f32, batch_size: usize) -> Tensor<TestBackend, 4> {
        let device = Default::default();
        Tensor::full([batch_size, 1, HEIGHT, WIDTH], value, &device)
    }

    #[test]
    fn embedding_has_configured_width() {
        let device = Default::default();
        let net = EmbeddingNetConfig::new().init::<TestBackend>(&device);

        let embeddings = net.forward(images(0.5, 3));

        assert_eq!(embeddings.dims(), [3, 64]);
    }

    #[test]
    fn twin_branches_share_parameters() {
        let device = Default::default();
        let net = SiameseNet::<TestBackend>::new(
            &EmbeddingNetConfig::new(),
            &ContrastiveLossConfig::new(),
            &device,
        );

        let distances = net.forward(images(0.3, 4), images(0.3, 4));

        assert_eq!(distances.dims(), [4, 1]);
        for d in distances.into_data().to_vec::<f32>().unwrap() {
            assert!(d <= crate::loss::DISTANCE_EPSILON.sqrt() + 1e-5);
        }
    }

    #[test]
    fn forward_step_reports_scalar_loss() {
        let device = Default::default();
        let net = SiameseNet::<TestBackend>::new(
            &EmbeddingNetConfig::new(),
            &ContrastiveLossConfig::new(),
            &device,
        );
        let batch = PairBatch {
            left: images(0.1, 2),
            right: images(0.9, 2),
            targets: Tensor::from_floats([[1.0], [0.0]], &device),
        };

        let output = net.forward_step(batch);

        assert_eq!(output.loss.dims(), [1]);
        assert_eq!(output.distances.dims(), [2, 1]);
        assert!(output.loss.into_scalar().elem::<f32>() >= 0.0);
    }
}
