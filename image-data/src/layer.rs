//! The image data layer setup.

use crate::{
    batch::{Batch, BatchBuilder, BatchBuilderInit, LoadedImage, Prefetcher},
    common::*,
    config::ImageDataConfig,
    dataset::EpochIterator,
    processor::{DataTransformer, FileImageLoader, ImageLoader, LabelEncoder, Transform},
};

/// The image data layer after setup.
///
/// The setup parses the manifest, positions the cursor and decodes the first
/// image to decide the output shapes. Any failure there is fatal. Call
/// [ImageDataLayer::start] to begin producing batches.
#[derive(Debug)]
pub struct ImageDataLayer {
    builder: BatchBuilder,
    slots: Vec<Batch>,
    layout: LabelLayout,
    image_shape: [i64; 3],
    batch_size: usize,
}

impl ImageDataLayer {
    /// Set up the layer with the file image loader and the data transformer.
    pub fn new(config: &ImageDataConfig) -> Result<Self> {
        let seed = config.seed_or_entropy();
        let loader = Box::new(FileImageLoader::new());
        let transform = Box::new(DataTransformer::new(
            &config.transform,
            seed.wrapping_add(1),
        ));
        Self::with_components(config, seed, loader, transform)
    }

    /// Set up the layer with a custom image loader and transform. `seed`
    /// drives shuffling and random skipping.
    pub fn with_components(
        config: &ImageDataConfig,
        seed: u64,
        loader: Box<dyn ImageLoader>,
        transform: Box<dyn Transform>,
    ) -> Result<Self> {
        let resize = config.resize_target()?;
        let parser = config.label_list_parser_init().build()?;

        // read the manifest
        let manifest = parser.open(&config.source)?;
        ensure!(
            !manifest.is_empty(),
            "the manifest '{}' has no records",
            config.source.display()
        );
        let layout = manifest.layout();
        let encoder = LabelEncoder::new(layout, config.ignore_label.raw() as f32)?;

        let mut iter = EpochIterator::new(manifest.into_records(), config.shuffle, seed);
        iter.initialize(config.rand_skip)?;
        info!("a total of {} images", iter.len());

        // read an image to decide the output shape
        let record = iter.current()?.clone();
        let path = config.root_folder.join(&record.path);
        let image = loader
            .load(&path, resize, config.is_color)
            .with_context(|| format!("could not load {}", path.display()))?;
        let image_shape = transform.infer_shape(&image)?;

        let batch_size = config.batch_size.get();
        let num_labels_per_line = layout.num_labels_per_line();
        let slots: Vec<_> = (0..config.prefetch_count.get())
            .map(|_| Batch::new(batch_size, image_shape, num_labels_per_line))
            .collect();

        {
            let [channels, height, width] = image_shape;
            info!(
                "output data size: {},{},{},{}",
                batch_size, channels, height, width
            );
            info!("output label size: {},{}", batch_size, num_labels_per_line);
        }

        let builder = BatchBuilderInit {
            iter,
            loader,
            transform,
            encoder,
            root_folder: config.root_folder.clone(),
            resize,
            is_color: config.is_color,
            batch_size: config.batch_size,
            max_consecutive_failures: config.max_consecutive_failures,
            pending: Some(LoadedImage { record, image }),
        }
        .build()?;

        Ok(Self {
            builder,
            slots,
            layout,
            image_shape,
            batch_size,
        })
    }

    /// The `(batch_size, C, H, W)` shape of the first batch.
    pub fn data_shape(&self) -> [i64; 4] {
        let [channels, height, width] = self.image_shape;
        [self.batch_size as i64, channels, height, width]
    }

    /// The `(batch_size, num_labels_per_line)` shape of every label batch.
    pub fn label_shape(&self) -> [i64; 2] {
        [
            self.batch_size as i64,
            self.layout.num_labels_per_line() as i64,
        ]
    }

    pub fn label_layout(&self) -> LabelLayout {
        self.layout
    }

    pub fn num_records(&self) -> usize {
        self.builder.iter().len()
    }

    /// The cursor position after shuffling and random skipping.
    pub fn cursor(&self) -> usize {
        self.builder.iter().cursor()
    }

    /// Start the producer thread.
    pub fn start(self) -> Result<Prefetcher> {
        let Self { builder, slots, .. } = self;
        Prefetcher::spawn(builder, slots)
    }
}
