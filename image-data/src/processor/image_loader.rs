use crate::{common::*, config::ImageSize};

/// Decodes image files into `u8` tensors of shape `(C, H, W)`.
///
/// An error is a per-record condition. The caller decides whether to skip the
/// record or to give up.
pub trait ImageLoader
where
    Self: Debug + Send,
{
    /// Load the image at `path`, resized to `size` if set, with 3 channels if
    /// `is_color` is set or 1 channel otherwise.
    fn load(&self, path: &Path, size: Option<ImageSize>, is_color: bool) -> Result<Tensor>;
}

/// The image loader backed by the codec of the tensor library.
#[derive(Debug, Clone, Default)]
pub struct FileImageLoader {
    _private: (),
}

impl FileImageLoader {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ImageLoader for FileImageLoader {
    fn load(&self, path: &Path, size: Option<ImageSize>, is_color: bool) -> Result<Tensor> {
        tch::no_grad(|| -> Result<_> {
            let image = vision::image::load(path)?;
            let (channels, _height, _width) = image.size3()?;
            ensure!(
                channels == 3,
                "expect a 3-channel decoded image, but get {} channels",
                channels
            );

            let image = match size {
                Some(ImageSize { height, width }) => {
                    vision::image::resize(&image, width as i64, height as i64)?
                }
                None => image,
            };

            let image = if is_color {
                image
            } else {
                // ITU-R BT.601 luma
                let weights = Tensor::of_slice(&[0.299f32, 0.587, 0.114]).view([3, 1, 1]);
                (image.to_kind(Kind::Float) * weights)
                    .sum_dim_intlist(&[0], true, Kind::Float)
                    .round()
                    .clamp(0.0, 255.0)
                    .to_kind(Kind::Uint8)
            };

            Ok(image.set_requires_grad(false))
        })
    }
}
