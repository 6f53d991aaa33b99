use crate::{common::*, record::Record};

/// How to treat a label listed as both positive and ignored on one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelConflictPolicy {
    /// The later group in encoding order wins, i.e. ignore overrides positive.
    Overwrite,
    /// Refuse the manifest.
    Reject,
}

impl Default for LabelConflictPolicy {
    fn default() -> Self {
        Self::Overwrite
    }
}

/// The layout of the per-example label vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelLayout {
    /// One scalar label per example.
    Single,
    /// A sparse vector indexed by label id.
    Multi { num_labels: usize },
}

impl LabelLayout {
    /// The label vector width.
    pub fn num_labels_per_line(&self) -> usize {
        match *self {
            Self::Single => 1,
            Self::Multi { num_labels } => num_labels,
        }
    }

    pub fn is_multi_label(&self) -> bool {
        matches!(self, Self::Multi { .. })
    }
}

/// The parsed manifest.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub(crate) records: Vec<Arc<Record>>,
    pub(crate) layout: LabelLayout,
    pub(crate) max_label_id: i64,
    pub(crate) num_conflicts: usize,
}

impl Manifest {
    pub fn records(&self) -> &[Arc<Record>] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Arc<Record>> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn layout(&self) -> LabelLayout {
        self.layout
    }

    pub fn is_multi_label(&self) -> bool {
        self.layout.is_multi_label()
    }

    pub fn num_labels_per_line(&self) -> usize {
        self.layout.num_labels_per_line()
    }

    /// The largest label id seen in any group, 0 for a manifest without labels.
    pub fn max_label_id(&self) -> i64 {
        self.max_label_id
    }

    /// Number of records listing a label both as positive and ignored.
    pub fn num_conflicts(&self) -> usize {
        self.num_conflicts
    }
}
