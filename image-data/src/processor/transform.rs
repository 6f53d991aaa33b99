use crate::{
    common::*,
    config::{Phase, TransformConfig},
};

/// Writes a decoded image into one slot of a batch image tensor.
pub trait Transform
where
    Self: Debug + Send,
{
    /// The `(C, H, W)` shape written for the decoded `image`.
    fn infer_shape(&self, image: &Tensor) -> Result<[i64; 3]>;

    /// Transform `image` into `output`, a float tensor of the inferred shape.
    fn transform(&mut self, image: &Tensor, output: &mut Tensor) -> Result<()>;
}

/// The data transformer with cropping, mirroring, mean subtraction and
/// scaling.
#[derive(Debug)]
pub struct DataTransformer {
    scale: f64,
    mirror: bool,
    crop_size: Option<i64>,
    mean_values: Vec<f32>,
    phase: Phase,
    rng: StdRng,
}

impl DataTransformer {
    pub fn new(config: &TransformConfig, seed: u64) -> Self {
        let TransformConfig {
            scale,
            mirror,
            crop_size,
            ref mean_values,
            phase,
        } = *config;

        Self {
            scale: scale.raw(),
            mirror,
            crop_size: crop_size.map(|size| size.get() as i64),
            mean_values: mean_values.iter().map(|mean| mean.raw() as f32).collect(),
            phase,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Transform for DataTransformer {
    fn infer_shape(&self, image: &Tensor) -> Result<[i64; 3]> {
        let (channels, height, width) = image.size3()?;

        ensure!(
            self.mean_values.len() <= 1 || self.mean_values.len() == channels as usize,
            "specify either one mean value or as many as channels ({}), but get {}",
            channels,
            self.mean_values.len()
        );

        match self.crop_size {
            Some(crop_size) => {
                ensure!(
                    crop_size <= height && crop_size <= width,
                    "crop size {} is larger than the image size {}x{}",
                    crop_size,
                    height,
                    width
                );
                Ok([channels, crop_size, crop_size])
            }
            None => Ok([channels, height, width]),
        }
    }

    fn transform(&mut self, image: &Tensor, output: &mut Tensor) -> Result<()> {
        let [_channels, out_h, out_w] = self.infer_shape(image)?;
        let (_channels, height, width) = image.size3()?;

        let (top, left) = match (self.crop_size, self.phase) {
            (None, _) => (0, 0),
            (Some(_), Phase::Train) => (
                self.rng.gen_range(0..=(height - out_h)),
                self.rng.gen_range(0..=(width - out_w)),
            ),
            (Some(_), Phase::Test) => ((height - out_h) / 2, (width - out_w) / 2),
        };
        let do_mirror = self.mirror && self.phase == Phase::Train && self.rng.gen_bool(0.5);

        tch::no_grad(|| -> Result<_> {
            let cropped = image
                .i((.., top..(top + out_h), left..(left + out_w)))
                .to_kind(Kind::Float);
            let mirrored = if do_mirror {
                cropped.flip(&[2])
            } else {
                cropped
            };
            let centered = if self.mean_values.is_empty() {
                mirrored
            } else {
                let mean = Tensor::of_slice(&self.mean_values).view([-1, 1, 1]);
                mirrored - mean
            };
            let scaled = centered * self.scale;

            ensure!(
                output.size() == scaled.size(),
                "output slot shape {:?} does not match the transformed shape {:?}",
                output.size(),
                scaled.size()
            );
            output.copy_(&scaled);
            Ok(())
        })
    }
}
