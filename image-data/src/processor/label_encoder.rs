use crate::common::*;

/// The value written for labels in the positive group.
pub const USE_LABEL: f32 = 1.0;

/// Encodes record labels into rows of the batch label tensor.
#[derive(Debug, Clone)]
pub struct LabelEncoder {
    layout: LabelLayout,
    /// Sentinel per label group, indexed by [LabelGroup::index].
    sentinels: [f32; 2],
}

impl LabelEncoder {
    pub fn new(layout: LabelLayout, ignore_label: f32) -> Result<Self> {
        ensure!(
            ignore_label != 0.0 && ignore_label != USE_LABEL,
            "ignore_label must differ from 0 and from the positive label value {}, but get {}",
            USE_LABEL,
            ignore_label
        );

        let mut sentinels = [0.0; 2];
        sentinels[LabelGroup::Positive.index()] = USE_LABEL;
        sentinels[LabelGroup::Ignore.index()] = ignore_label;

        Ok(Self { layout, sentinels })
    }

    /// The label vector width.
    pub fn num_labels_per_line(&self) -> usize {
        self.layout.num_labels_per_line()
    }

    pub fn sentinel(&self, group: LabelGroup) -> f32 {
        self.sentinels[group.index()]
    }

    /// Write the labels of `record` into `row`, which is expected to be
    /// zero-filled.
    ///
    /// In the multi-label layout the groups are written in [LabelGroup::ALL]
    /// order, so an id listed in both groups ends up with the ignore value.
    pub fn encode(&self, record: &Record, row: &mut [f32]) -> Result<()> {
        let width = self.num_labels_per_line();
        ensure!(
            row.len() == width,
            "expect a label row of width {}, but get {}",
            width,
            row.len()
        );

        match self.layout {
            LabelLayout::Single => {
                // a record without labels keeps the zero fill
                if let Some(label) = record.first_label() {
                    row[0] = label as f32;
                }
            }
            LabelLayout::Multi { .. } => {
                for group in LabelGroup::ALL {
                    let value = self.sentinel(group);
                    for &label in record.labels(group) {
                        let slot = usize::try_from(label)
                            .ok()
                            .and_then(|index| row.get_mut(index))
                            .ok_or_else(|| {
                                format_err!(
                                    "label {} on line {} is out of range [0, {})",
                                    label,
                                    record.line,
                                    width
                                )
                            })?;
                        *slot = value;
                    }
                }
            }
        }

        Ok(())
    }
}
