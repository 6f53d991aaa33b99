//! Test doubles shared by unit tests.

use crate::{common::*, config::ImageSize, processor::ImageLoader};
use std::{
    collections::{HashMap, HashSet},
    sync::atomic::AtomicUsize,
};

/// Produces 3-channel images filled with the number in the file stem, e.g.
/// `"007.jpg"` gives pixels of value 7.
#[derive(Debug, Clone)]
pub struct FakeLoader {
    pub unreadable: HashSet<PathBuf>,
    pub sizes: HashMap<PathBuf, (i64, i64)>,
    pub default_size: (i64, i64),
    pub num_loads: Arc<AtomicUsize>,
}

impl FakeLoader {
    pub fn new(height: i64, width: i64) -> Self {
        Self {
            unreadable: HashSet::new(),
            sizes: HashMap::new(),
            default_size: (height, width),
            num_loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn unreadable<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.unreadable.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn sized(mut self, path: impl Into<PathBuf>, height: i64, width: i64) -> Self {
        self.sizes.insert(path.into(), (height, width));
        self
    }
}

impl ImageLoader for FakeLoader {
    fn load(&self, path: &Path, size: Option<ImageSize>, _is_color: bool) -> Result<Tensor> {
        self.num_loads.fetch_add(1, Ordering::SeqCst);
        ensure!(
            !self.unreadable.contains(path),
            "could not decode {}",
            path.display()
        );

        let value: i64 = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.parse().ok())
            .unwrap_or(0);
        let (height, width) = match size {
            Some(ImageSize { height, width }) => (height as i64, width as i64),
            None => self.sizes.get(path).copied().unwrap_or(self.default_size),
        };

        Ok(Tensor::ones(&[3, height, width], (Kind::Uint8, Device::Cpu)) * value)
    }
}

/// Records `000.jpg`, `001.jpg`, ... with the positive label equal to the
/// index.
pub fn numbered_records(len: usize) -> Vec<Arc<Record>> {
    (0..len)
        .map(|index| {
            Arc::new(Record {
                path: format!("{:03}.jpg", index).into(),
                line: index + 1,
                groups: [vec![index as i64], vec![]],
            })
        })
        .collect()
}

/// Write `text` to a manifest file unique to `name` under the system temp
/// directory.
pub fn write_manifest(name: &str, text: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("image-data-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("{}.txt", name));
    std::fs::write(&path, text).unwrap();
    path
}
