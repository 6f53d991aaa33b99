use super::Batch;
use crate::{
    common::*,
    config::ImageSize,
    dataset::EpochIterator,
    processor::{ImageLoader, LabelEncoder, Transform},
    profiling::Timing,
};

/// The outcome of [BatchBuilder::build].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    /// Every slot of the batch is populated.
    Complete,
    /// The stop flag was raised before the batch was completed.
    Cancelled,
}

/// A decoded image with the record it was loaded for.
#[derive(Debug)]
pub struct LoadedImage {
    pub record: Arc<Record>,
    pub image: Tensor,
}

/// The options to build a [BatchBuilder].
#[derive(Debug)]
pub struct BatchBuilderInit {
    pub iter: EpochIterator,
    pub loader: Box<dyn ImageLoader>,
    pub transform: Box<dyn Transform>,
    pub encoder: LabelEncoder,
    pub root_folder: PathBuf,
    pub resize: Option<ImageSize>,
    pub is_color: bool,
    pub batch_size: NonZeroUsize,
    /// Defaults to the number of records.
    pub max_consecutive_failures: Option<NonZeroUsize>,
    /// An image already decoded for the record at the cursor.
    pub pending: Option<LoadedImage>,
}

impl BatchBuilderInit {
    pub fn build(self) -> Result<BatchBuilder> {
        let Self {
            iter,
            loader,
            transform,
            encoder,
            root_folder,
            resize,
            is_color,
            batch_size,
            max_consecutive_failures,
            pending,
        } = self;

        ensure!(!iter.is_empty(), "the manifest has no records");
        if let Some(LoadedImage { record, .. }) = &pending {
            ensure!(
                Arc::ptr_eq(record, iter.current()?),
                "the pending image does not belong to the record at the cursor"
            );
        }

        let batch_size = batch_size.get();
        let max_consecutive_failures = max_consecutive_failures
            .map(NonZeroUsize::get)
            .unwrap_or_else(|| iter.len());
        let label_buf = vec![0.0; batch_size * encoder.num_labels_per_line()];

        Ok(BatchBuilder {
            iter,
            loader,
            transform,
            encoder,
            root_folder,
            resize,
            is_color,
            batch_size,
            max_consecutive_failures,
            consecutive_failures: 0,
            step: 0,
            pending,
            label_buf,
        })
    }
}

/// Assembles batches from manifest records, skipping unreadable images.
///
/// It owns the manifest cursor, so it is meant to live on the single
/// producer of a [Prefetcher](super::Prefetcher).
#[derive(Derivative)]
#[derivative(Debug)]
pub struct BatchBuilder {
    iter: EpochIterator,
    loader: Box<dyn ImageLoader>,
    transform: Box<dyn Transform>,
    encoder: LabelEncoder,
    root_folder: PathBuf,
    resize: Option<ImageSize>,
    is_color: bool,
    batch_size: usize,
    max_consecutive_failures: usize,
    consecutive_failures: usize,
    step: usize,
    #[derivative(Debug = "ignore")]
    pending: Option<LoadedImage>,
    #[derivative(Debug = "ignore")]
    label_buf: Vec<f32>,
}

impl BatchBuilder {
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn iter(&self) -> &EpochIterator {
        &self.iter
    }

    /// Populate `batch` with the next `batch_size` loadable records.
    ///
    /// The first loadable record decides the image shape of the batch and the
    /// image buffer is reallocated if it differs. Later records whose
    /// transformed shape differs from it are skipped.
    pub fn build(&mut self, batch: &mut Batch, stop: &AtomicBool) -> Result<BuildStatus> {
        let mut timing = Timing::new("prefetch batch");
        let width = self.encoder.num_labels_per_line();
        let label_shape = [self.batch_size as i64, width as i64];
        ensure!(
            batch.batch_size() == self.batch_size && batch.labels.size() == label_shape,
            "the batch slot does not match batch size {} and label width {}",
            self.batch_size,
            width
        );

        // probe the first image to decide the batch shape
        let (first, image_shape) = match timing.measure("read", || self.load_usable(stop))? {
            Some(loaded) => loaded,
            None => return Ok(BuildStatus::Cancelled),
        };
        if batch.reshape_images(image_shape) {
            debug!("reshape batch images to {:?}", image_shape);
        }

        self.label_buf.iter_mut().for_each(|value| *value = 0.0);

        let mut next = Some((first, image_shape));
        let mut item_id = 0;

        while item_id < self.batch_size {
            let (LoadedImage { record, image }, shape) = match next.take() {
                Some(loaded) => loaded,
                None => match timing.measure("read", || self.load_usable(stop))? {
                    Some(loaded) => loaded,
                    None => return Ok(BuildStatus::Cancelled),
                },
            };

            if shape != image_shape {
                warn!(
                    "skip {}: image shape {:?} differs from the batch image shape {:?}",
                    record.path.display(),
                    shape,
                    image_shape
                );
                self.skip_current()?;
                continue;
            }

            let mut slot = batch.images.i(item_id as i64);
            let transform = &mut self.transform;
            timing.measure("transform", || transform.transform(&image, &mut slot))?;

            let row = &mut self.label_buf[(item_id * width)..((item_id + 1) * width)];
            self.encoder.encode(&record, row)?;

            self.consecutive_failures = 0;
            self.iter.advance();
            item_id += 1;
        }

        tch::no_grad(|| {
            let labels = Tensor::of_slice(&self.label_buf).view(label_shape);
            batch.labels.copy_(&labels);
        });
        batch.step = self.step;
        batch.epoch = self.iter.epoch();
        self.step += 1;

        timing.report();
        Ok(BuildStatus::Complete)
    }

    /// Load the record at the cursor together with its transformed shape.
    /// Records the transform cannot accept, such as images smaller than the
    /// crop size, are skipped like unreadable ones.
    fn load_usable(&mut self, stop: &AtomicBool) -> Result<Option<(LoadedImage, [i64; 3])>> {
        loop {
            let loaded = match self.load_current(stop)? {
                Some(loaded) => loaded,
                None => return Ok(None),
            };

            match self.transform.infer_shape(&loaded.image) {
                Ok(shape) => return Ok(Some((loaded, shape))),
                Err(err) => {
                    warn!("skip {}: {:#}", loaded.record.path.display(), err);
                    self.skip_current()?;
                }
            }
        }
    }

    /// Load the image of the record at the cursor. Unreadable records are
    /// skipped until one loads. Returns `None` if the stop flag is raised.
    pub fn load_current(&mut self, stop: &AtomicBool) -> Result<Option<LoadedImage>> {
        if let Some(loaded) = self.pending.take() {
            return Ok(Some(loaded));
        }

        loop {
            if stop.load(Ordering::SeqCst) {
                return Ok(None);
            }

            let record = self.iter.current()?.clone();
            let path = self.root_folder.join(&record.path);

            match self.loader.load(&path, self.resize, self.is_color) {
                Ok(image) => return Ok(Some(LoadedImage { record, image })),
                Err(err) => {
                    warn!("could not load {}: {:#}", path.display(), err);
                    self.skip_current()?;
                }
            }
        }
    }

    /// Count a failure on the record at the cursor and move past it.
    fn skip_current(&mut self) -> Result<()> {
        self.consecutive_failures += 1;
        ensure!(
            self.consecutive_failures <= self.max_consecutive_failures,
            "{} consecutive records could not be used, giving up at line {}",
            self.consecutive_failures,
            self.iter.current()?.line
        );
        self.iter.advance();
        Ok(())
    }
}
