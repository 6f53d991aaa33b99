use crate::common::*;

/// A batch of transformed images and encoded labels.
#[derive(Debug, TensorLike)]
pub struct Batch {
    /// The index of the batch in production order.
    pub step: usize,
    /// The number of completed manifest passes when the batch was finished.
    pub epoch: usize,
    /// Float tensor of shape `(batch_size, C, H, W)`.
    pub images: Tensor,
    /// Float tensor of shape `(batch_size, num_labels_per_line)`.
    pub labels: Tensor,
}

impl Batch {
    /// Allocate a zero-filled batch on CPU.
    pub fn new(batch_size: usize, image_shape: [i64; 3], num_labels_per_line: usize) -> Self {
        let [channels, height, width] = image_shape;
        let batch_size = batch_size as i64;

        Self {
            step: 0,
            epoch: 0,
            images: Tensor::zeros(
                &[batch_size, channels, height, width],
                (Kind::Float, Device::Cpu),
            ),
            labels: Tensor::zeros(
                &[batch_size, num_labels_per_line as i64],
                (Kind::Float, Device::Cpu),
            ),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.images.size()[0] as usize
    }

    /// The `(C, H, W)` shape of each image.
    pub fn image_shape(&self) -> [i64; 3] {
        match self.images.size().as_slice() {
            &[_, channels, height, width] => [channels, height, width],
            _ => unreachable!("batch images are always 4-dimensional"),
        }
    }

    /// Reallocate the image buffer if its image shape differs from
    /// `image_shape`. Returns true if reallocated.
    pub fn reshape_images(&mut self, image_shape: [i64; 3]) -> bool {
        if self.image_shape() == image_shape {
            return false;
        }

        let [channels, height, width] = image_shape;
        self.images = Tensor::zeros(
            &[self.batch_size() as i64, channels, height, width],
            (Kind::Float, Device::Cpu),
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reshape_images_test() {
        let mut batch = Batch::new(2, [3, 4, 5], 6);
        assert_eq!(batch.batch_size(), 2);
        assert_eq!(batch.image_shape(), [3, 4, 5]);
        assert_eq!(batch.labels.size(), vec![2, 6]);

        assert!(!batch.reshape_images([3, 4, 5]));
        assert!(batch.reshape_images([1, 8, 8]));
        assert_eq!(batch.images.size(), vec![2, 1, 8, 8]);
    }

    #[test]
    fn device_move_test() {
        let mut batch = Batch::new(2, [1, 2, 2], 3);
        batch.step = 4;
        batch.epoch = 1;
        let _ = batch.labels.fill_(7.0);

        let moved = batch.to_device(Device::Cpu);
        assert_eq!(moved.step, 4);
        assert_eq!(moved.epoch, 1);
        assert_eq!(moved.images.size(), vec![2, 1, 2, 2]);
        assert_eq!(moved.labels.device(), Device::Cpu);
        assert_eq!(Vec::<f32>::from(&moved.labels.flatten(0, -1)), vec![7.0; 6]);

        let cloned = batch.shallow_clone();
        assert_eq!(cloned.labels.size(), vec![2, 3]);
    }
}
