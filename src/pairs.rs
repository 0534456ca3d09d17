use std::sync::Arc;

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    prelude::*,
};
use rand::Rng;

use crate::data::{images_to_tensor, DigitIndexTable, Image, LabeledSplit};

/// Label of a pair whose members share a class.
pub const SAME_CLASS: u8 = 1;
/// Label of a pair whose members belong to different classes.
pub const DIFFERENT_CLASS: u8 = 0;

/// Build alternating positive and negative pairs from `x`.
///
/// With `n` one less than the smallest class count, every class `d` yields `n`
/// positive pairs `(x[idx[d][i]], x[idx[d][i + 1]])` labeled [SAME_CLASS], each
/// immediately followed by a negative pair `(x[idx[d][i]], x[idx[dn][i]])` labeled
/// [DIFFERENT_CLASS], where `dn` is drawn uniformly among the other classes.
///
/// A class with fewer than two samples makes `n` non-positive and no pair is
/// produced at all.
pub fn create_pairs<T: Clone, R: Rng + ?Sized>(
    x: &[T],
    digit_indices: &DigitIndexTable,
    rng: &mut R,
) -> (Vec<[T; 2]>, Vec<u8>) {
    let num_classes = digit_indices.num_classes();
    let n = digit_indices
        .min_class_count()
        .map_or(-1, |count| count as i64 - 1);
    let n = n.max(0) as usize;

    let mut pairs = Vec::with_capacity(2 * n * num_classes);
    let mut labels = Vec::with_capacity(2 * n * num_classes);

    for d in 0..num_classes {
        let class = digit_indices.class(d);

        for i in 0..n {
            pairs.push([x[class[i]].clone(), x[class[i + 1]].clone()]);

            let inc = rng.random_range(1..num_classes);
            let dn = (d + inc) % num_classes;
            pairs.push([x[class[i]].clone(), x[digit_indices.class(dn)[i]].clone()]);

            labels.push(SAME_CLASS);
            labels.push(DIFFERENT_CLASS);
        }
    }

    (pairs, labels)
}

/// A pair of images with its binary label.
#[derive(Clone, Debug)]
pub struct PairItem {
    pub left: Image,
    pub right: Image,
    pub label: u8,
}

/// Pairs of a split, materialized as positions into the split's image store.
#[derive(Clone)]
pub struct PairDataset {
    images: Arc<[Image]>,
    pairs: Vec<[usize; 2]>,
    labels: Vec<u8>,
}

impl PairDataset {
    /// Indexes the split by class and draws its pairs with [create_pairs].
    pub fn new<R: Rng + ?Sized>(split: &LabeledSplit, num_classes: usize, rng: &mut R) -> Self {
        let digit_indices = DigitIndexTable::from_labels(&split.labels, num_classes);
        let positions: Vec<usize> = (0..split.len()).collect();
        let (pairs, labels) = create_pairs(&positions, &digit_indices, rng);

        Self {
            images: split.images.clone().into(),
            pairs,
            labels,
        }
    }

    /// Dataset positions of each pair, in emission order.
    pub fn positions(&self) -> &[[usize; 2]] {
        &self.pairs
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }
}

impl Dataset<PairItem> for PairDataset {
    fn get(&self, index: usize) -> Option<PairItem> {
        let [left, right] = *self.pairs.get(index)?;

        Some(PairItem {
            left: self.images[left],
            right: self.images[right],
            label: self.labels[index],
        })
    }

    fn len(&self) -> usize {
        self.pairs.len()
    }
}

#[derive(Clone, Default)]
pub struct PairBatcher;

#[derive(Clone, Debug)]
pub struct PairBatch<B: Backend> {
    /// Left members, `[batch_size, 1, 28, 28]`.
    pub left: Tensor<B, 4>,
    /// Right members, `[batch_size, 1, 28, 28]`.
    pub right: Tensor<B, 4>,
    /// Pair labels as floats, `[batch_size, 1]`.
    pub targets: Tensor<B, 2>,
}

impl<B: Backend> Batcher<B, PairItem, PairBatch<B>> for PairBatcher {
    fn batch(&self, items: Vec<PairItem>, device: &B::Device) -> PairBatch<B> {
        let batch_size = items.len();
        let left: Vec<Image> = items.iter().map(|item| item.left).collect();
        let right: Vec<Image> = items.iter().map(|item| item.right).collect();
        let targets: Vec<f32> = items.iter().map(|item| item.label as f32).collect();

        // Channels last to channels first, as expected by the convolutions.
        let left = images_to_tensor::<B>(&left, device).permute([0, 3, 1, 2]);
        let right = images_to_tensor::<B>(&right, device).permute([0, 3, 1, 2]);
        let targets = Tensor::from_data(
            TensorData::new(targets, [batch_size, 1]).convert::<B::FloatElem>(),
            device,
        );

        PairBatch {
            left,
            right,
            targets,
        }
    }
}
