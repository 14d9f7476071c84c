//! The composed preprocessing pipeline.

use crate::common::*;

/// A preprocessing step that works on decoded images.
pub trait ImageOp
where
    Self: Debug + Send + Sync,
{
    fn apply(&self, image: RgbImage, rng: &mut dyn RngCore) -> RgbImage;
}

/// A preprocessing step that works on image tensors.
pub trait TensorOp
where
    Self: Debug + Send + Sync,
{
    fn apply(&self, tensor: Tensor, rng: &mut dyn RngCore) -> Tensor;
}

/// The image steps, the tensor conversion and the tensor steps in order.
#[derive(Debug, Default)]
pub struct Transform {
    image_ops: Vec<Box<dyn ImageOp>>,
    tensor_ops: Vec<Box<dyn TensorOp>>,
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image_op(mut self, op: impl ImageOp + 'static) -> Self {
        self.image_ops.push(Box::new(op));
        self
    }

    pub fn tensor_op(mut self, op: impl TensorOp + 'static) -> Self {
        self.tensor_ops.push(Box::new(op));
        self
    }

    /// The number of steps including the tensor conversion.
    pub fn len(&self) -> usize {
        self.image_ops.len() + 1 + self.tensor_ops.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Describe the steps, one per item.
    pub fn steps(&self) -> Vec<String> {
        let image_steps = self.image_ops.iter().map(|op| format!("{:?}", op));
        let tensor_steps = self.tensor_ops.iter().map(|op| format!("{:?}", op));
        image_steps
            .chain(std::iter::once("ToTensor".to_owned()))
            .chain(tensor_steps)
            .collect()
    }

    /// Run the pipeline with an entropy-seeded generator.
    pub fn forward(&self, image: RgbImage) -> Tensor {
        let mut rng = StdRng::from_entropy();
        self.forward_with_rng(image, &mut rng)
    }

    pub fn forward_with_rng(&self, image: RgbImage, rng: &mut dyn RngCore) -> Tensor {
        let image = self
            .image_ops
            .iter()
            .fold(image, |image, op| op.apply(image, rng));
        let tensor = to_tensor(&image);
        self.tensor_ops
            .iter()
            .fold(tensor, |tensor, op| op.apply(tensor, rng))
    }
}

impl Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in self.steps() {
            writeln!(f, "{}", step)?;
        }
        Ok(())
    }
}

/// Convert an image to a CHW tensor with values in `[0, 1]`.
pub fn to_tensor(image: &RgbImage) -> Tensor {
    let (width, height) = image.dimensions();
    Array3::from_shape_fn((3, height as usize, width as usize), |(c, y, x)| {
        image.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
    })
}

/// Per-channel standardization.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalize {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Normalize {
    pub fn new(mean: [f32; 3], std: [f32; 3]) -> Result<Self> {
        if std.iter().any(|&value| value <= 0.0) {
            return Err(Error::Configuration(
                "normalization std must be positive".into(),
            ));
        }
        Ok(Self { mean, std })
    }
}

impl TensorOp for Normalize {
    fn apply(&self, mut tensor: Tensor, _rng: &mut dyn RngCore) -> Tensor {
        tensor
            .axis_iter_mut(Axis(0))
            .zip(self.mean.iter().zip(self.std.iter()))
            .for_each(|(mut channel, (&mean, &std))| {
                channel.mapv_inplace(|value| (value - mean) / std);
            });
        tensor
    }
}
