use burn::{
    data::dataset::{vision::MnistItem, Dataset},
    prelude::*,
};

/// Image width in pixels.
pub const WIDTH: usize = 28;
/// Image height in pixels.
pub const HEIGHT: usize = 28;

/// A single-channel digit image with pixel values in `[0, 1]`.
pub type Image = [[f32; WIDTH]; HEIGHT];

/// Rescale raw MNIST pixel intensities from `[0, 255]` to `[0, 1]`.
pub fn rescale(raw: &[[f32; WIDTH]; HEIGHT]) -> Image {
    let mut image = [[0f32; WIDTH]; HEIGHT];
    for (row, raw_row) in image.iter_mut().zip(raw.iter()) {
        for (pixel, raw_pixel) in row.iter_mut().zip(raw_row.iter()) {
            *pixel = raw_pixel / 255.0;
        }
    }
    image
}

/// Lay out a slice of images as a `[N, 28, 28, 1]` tensor (channels last).
pub fn images_to_tensor<B: Backend>(images: &[Image], device: &B::Device) -> Tensor<B, 4> {
    let values: Vec<f32> = images
        .iter()
        .flat_map(|image| image.iter().flat_map(|row| row.iter().copied()))
        .collect();
    let data = TensorData::new(values, [images.len(), HEIGHT, WIDTH, 1]);

    Tensor::from_data(data.convert::<B::FloatElem>(), device)
}

/// One split (train or test) of a labeled digit dataset, fully resident in memory.
#[derive(Clone, Debug, Default)]
pub struct LabeledSplit {
    pub images: Vec<Image>,
    pub labels: Vec<u8>,
}

impl LabeledSplit {
    /// Creates a split from already rescaled images and their labels.
    pub fn new(images: Vec<Image>, labels: Vec<u8>) -> Self {
        assert_eq!(
            images.len(),
            labels.len(),
            "Every image must have exactly one label."
        );
        Self { images, labels }
    }

    /// Reads every item of an MNIST dataset and rescales its pixels.
    pub fn from_dataset<D: Dataset<MnistItem>>(dataset: &D) -> Self {
        let (images, labels) = dataset
            .iter()
            .map(|item| (rescale(&item.image), item.label))
            .unzip();

        Self { images, labels }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Per-class lookup of the dataset positions holding each label.
///
/// Positions are stored in increasing order. Labels outside `0..num_classes`
/// are not indexed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DigitIndexTable {
    positions: Vec<Vec<usize>>,
}

impl DigitIndexTable {
    pub fn from_labels(labels: &[u8], num_classes: usize) -> Self {
        let mut positions = vec![Vec::new(); num_classes];

        for (position, label) in labels.iter().enumerate() {
            if let Some(class) = positions.get_mut(*label as usize) {
                class.push(position);
            }
        }

        Self { positions }
    }

    pub fn num_classes(&self) -> usize {
        self.positions.len()
    }

    /// Positions holding the given class.
    pub fn class(&self, class: usize) -> &[usize] {
        &self.positions[class]
    }

    /// Smallest number of samples held by any class, `None` for an empty table.
    pub fn min_class_count(&self) -> Option<usize> {
        self.positions.iter().map(Vec::len).min()
    }
}
