//! Image data layer configuration format.

use crate::common::*;

/// The image data layer options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageDataConfig {
    /// The label list manifest file.
    pub source: PathBuf,
    /// The directory joined in front of every image path in the manifest.
    #[serde(default)]
    pub root_folder: PathBuf,
    /// The resize target height. Zero keeps the native size.
    #[serde(default)]
    pub new_height: usize,
    /// The resize target width. Zero keeps the native size.
    #[serde(default)]
    pub new_width: usize,
    /// Decode as 3-channel color if set, otherwise as 1-channel gray.
    #[serde(default = "default_is_color")]
    pub is_color: bool,
    pub batch_size: NonZeroUsize,
    /// Shuffle the manifest at setup and at the start of every epoch.
    #[serde(default)]
    pub shuffle: bool,
    /// If positive, start at a random record in `[0, rand_skip)`.
    #[serde(default)]
    pub rand_skip: usize,
    /// The value written for labels in the ignore group.
    #[serde(default = "default_ignore_label")]
    pub ignore_label: R64,
    /// The separator between labels in a group.
    #[serde(default = "default_label_separator")]
    pub label_separator: char,
    /// The separator between the positive and the ignore label groups.
    #[serde(default = "default_label_list_separator")]
    pub label_list_separator: char,
    #[serde(default)]
    pub label_conflict: LabelConflictPolicy,
    /// The shuffling seed. Drawn from the OS if not set.
    #[serde(default)]
    pub seed: Option<u64>,
    /// The number of batches pipelined between the loader and the consumer.
    #[serde(default = "default_prefetch_count")]
    pub prefetch_count: NonZeroUsize,
    /// Consecutive unreadable images tolerated before giving up. It defaults
    /// to the number of records in the manifest.
    #[serde(default)]
    pub max_consecutive_failures: Option<NonZeroUsize>,
    #[serde(default)]
    pub transform: TransformConfig,
}

impl ImageDataConfig {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        let config = json5::from_str(&text)
            .with_context(|| format!("failed to parse config file '{}'", path.display()))?;
        Ok(config)
    }

    /// Build a configuration with defaults for all optional fields.
    pub fn new(source: impl Into<PathBuf>, batch_size: NonZeroUsize) -> Self {
        Self {
            source: source.into(),
            root_folder: PathBuf::new(),
            new_height: 0,
            new_width: 0,
            is_color: default_is_color(),
            batch_size,
            shuffle: false,
            rand_skip: 0,
            ignore_label: default_ignore_label(),
            label_separator: default_label_separator(),
            label_list_separator: default_label_list_separator(),
            label_conflict: LabelConflictPolicy::default(),
            seed: None,
            prefetch_count: default_prefetch_count(),
            max_consecutive_failures: None,
            transform: TransformConfig::default(),
        }
    }

    /// The resize target, or `None` to keep the native image size.
    pub fn resize_target(&self) -> Result<Option<ImageSize>> {
        let Self {
            new_height,
            new_width,
            ..
        } = *self;

        match (new_height, new_width) {
            (0, 0) => Ok(None),
            (height, width) if height > 0 && width > 0 => Ok(Some(ImageSize { height, width })),
            _ => bail!(
                "new_height and new_width must be set at the same time, but get {}x{}",
                new_height,
                new_width
            ),
        }
    }

    /// The configured seed, or a fresh one from the OS.
    pub fn seed_or_entropy(&self) -> u64 {
        self.seed.unwrap_or_else(|| rand::rngs::OsRng.gen())
    }

    pub fn label_list_parser_init(&self) -> LabelListParserInit {
        LabelListParserInit {
            item_separator: self.label_separator,
            group_separator: self.label_list_separator,
            conflict_policy: self.label_conflict,
        }
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    pub height: usize,
    pub width: usize,
}

/// Whether random augmentations are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Train,
    Test,
}

impl Default for Phase {
    fn default() -> Self {
        Self::Train
    }
}

/// Data transformation options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformConfig {
    /// The factor multiplied to pixel values after mean subtraction.
    #[serde(default = "default_scale")]
    pub scale: R64,
    /// Randomly flip images horizontally in the train phase.
    #[serde(default)]
    pub mirror: bool,
    /// The square crop size. Random crops in the train phase, center crops in
    /// the test phase.
    #[serde(default)]
    pub crop_size: Option<NonZeroUsize>,
    /// The per-channel mean values, either one for all channels or one per
    /// channel.
    #[serde(default)]
    pub mean_values: Vec<R64>,
    #[serde(default)]
    pub phase: Phase,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            scale: default_scale(),
            mirror: false,
            crop_size: None,
            mean_values: vec![],
            phase: Phase::default(),
        }
    }
}

fn default_is_color() -> bool {
    true
}

fn default_ignore_label() -> R64 {
    r64(-1.0)
}

fn default_label_separator() -> char {
    ','
}

fn default_label_list_separator() -> char {
    ';'
}

fn default_prefetch_count() -> NonZeroUsize {
    NonZeroUsize::new(3).unwrap()
}

fn default_scale() -> R64 {
    r64(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json5_defaults_test() {
        let config: ImageDataConfig = json5::from_str(
            r#"{
                source: "train.txt",
                batch_size: 4,
                transform: { crop_size: 3, mean_values: [104.0, 117.0, 123.0] },
            }"#,
        )
        .unwrap();

        assert_eq!(config.batch_size.get(), 4);
        assert!(config.is_color);
        assert_eq!(config.label_separator, ',');
        assert_eq!(config.label_list_separator, ';');
        assert_eq!(config.prefetch_count.get(), 3);
        assert_eq!(config.ignore_label, r64(-1.0));
        assert_eq!(config.transform.scale, r64(1.0));
        assert_eq!(config.transform.crop_size.map(NonZeroUsize::get), Some(3));
        assert_eq!(config.transform.phase, Phase::Train);
        assert_eq!(config.resize_target().unwrap(), None);
    }

    #[test]
    fn zero_batch_size_test() {
        let result: Result<ImageDataConfig, _> =
            json5::from_str(r#"{ source: "train.txt", batch_size: 0 }"#);
        assert!(result.is_err());
    }

    #[test]
    fn resize_target_test() {
        let mut config = ImageDataConfig::new("train.txt", NonZeroUsize::new(1).unwrap());

        config.new_height = 32;
        assert!(config.resize_target().is_err());

        config.new_width = 48;
        assert_eq!(
            config.resize_target().unwrap(),
            Some(ImageSize {
                height: 32,
                width: 48
            })
        );
    }

    #[test]
    fn fixed_seed_test() {
        let mut config = ImageDataConfig::new("train.txt", NonZeroUsize::new(1).unwrap());
        config.seed = Some(7);
        assert_eq!(config.seed_or_entropy(), 7);
    }
}
