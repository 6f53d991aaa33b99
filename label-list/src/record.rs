use crate::common::*;

/// The number of label groups on each manifest line.
pub const NUM_LABEL_LISTS: usize = 2;

/// The label category of a group on a manifest line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelGroup {
    Positive,
    Ignore,
}

impl LabelGroup {
    /// Groups in the order they appear on a line and are encoded.
    pub const ALL: [LabelGroup; NUM_LABEL_LISTS] = [LabelGroup::Positive, LabelGroup::Ignore];

    pub fn index(self) -> usize {
        match self {
            Self::Positive => 0,
            Self::Ignore => 1,
        }
    }
}

/// One manifest entry, an image path with its label groups.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Record {
    pub path: PathBuf,
    /// The 1-based line number in the manifest file.
    pub line: usize,
    pub groups: [Vec<i64>; NUM_LABEL_LISTS],
}

impl Record {
    pub fn labels(&self, group: LabelGroup) -> &[i64] {
        &self.groups[group.index()]
    }

    /// Total number of labels summed across groups.
    pub fn num_labels(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    /// The first label of the positive group, if any.
    pub fn first_label(&self) -> Option<i64> {
        self.labels(LabelGroup::Positive).first().copied()
    }

    /// Label ids listed both as positive and ignored.
    pub fn conflicting_labels(&self) -> Vec<i64> {
        let positive: HashSet<_> = self.labels(LabelGroup::Positive).iter().collect();
        self.labels(LabelGroup::Ignore)
            .iter()
            .filter(|label| positive.contains(label))
            .copied()
            .unique()
            .collect()
    }
}
