use crate::{
    common::*,
    manifest::{LabelConflictPolicy, LabelLayout, Manifest},
    record::{Record, NUM_LABEL_LISTS},
};

/// The options to build a [LabelListParser].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelListParserInit {
    /// The separator between labels within a group.
    pub item_separator: char,
    /// The separator between label groups.
    pub group_separator: char,
    pub conflict_policy: LabelConflictPolicy,
}

impl Default for LabelListParserInit {
    fn default() -> Self {
        Self {
            item_separator: ',',
            group_separator: ';',
            conflict_policy: LabelConflictPolicy::default(),
        }
    }
}

impl LabelListParserInit {
    pub fn build(self) -> Result<LabelListParser> {
        let Self {
            item_separator,
            group_separator,
            conflict_policy,
        } = self;

        ensure!(
            item_separator != group_separator,
            "the separators specified for the labels and the list of labels may not be the same, \
             but both are '{}'",
            item_separator
        );
        for sep in [item_separator, group_separator] {
            ensure!(
                !(sep.is_ascii_digit() || matches!(sep, '+' | '-' | '#')),
                "'{}' cannot be used as a label separator",
                sep
            );
        }
        ensure!(
            !group_separator.is_whitespace(),
            "the label list separator must not be whitespace"
        );

        Ok(LabelListParser {
            item_separator,
            group_separator,
            conflict_policy,
        })
    }
}

/// The label list manifest parser.
#[derive(Debug, Clone)]
pub struct LabelListParser {
    item_separator: char,
    group_separator: char,
    conflict_policy: LabelConflictPolicy,
}

impl LabelListParser {
    /// Read and parse a manifest file.
    pub fn open(&self, path: impl AsRef<Path>) -> Result<Manifest> {
        let path = path.as_ref();
        info!("opening file {}", path.display());

        let file = File::open(path)
            .with_context(|| format!("failed to open manifest file '{}'", path.display()))?;
        self.parse_reader(BufReader::new(file))
            .with_context(|| format!("failed to parse manifest file '{}'", path.display()))
    }

    pub fn parse_str(&self, text: &str) -> Result<Manifest> {
        self.parse_reader(text.as_bytes())
    }

    pub fn parse_reader(&self, reader: impl BufRead) -> Result<Manifest> {
        let mut builder = ManifestBuilder::new(self.conflict_policy);

        reader
            .lines()
            .enumerate()
            .try_for_each(|(index, line)| -> Result<_> {
                let line = line?;
                let lineno = index + 1;
                let parsed = self
                    .parse_line(&line, lineno)
                    .with_context(|| format!("invalid manifest line {}: '{}'", lineno, line))?;
                if let Some((record, has_empty_group)) = parsed {
                    builder.push(record, has_empty_group)?;
                }
                Ok(())
            })?;

        builder.finish()
    }

    /// Parse one line. Returns `None` for blank and comment lines, otherwise
    /// the record and whether a group was left empty by a leading group
    /// separator.
    fn parse_line(&self, line: &str, lineno: usize) -> Result<Option<(Record, bool)>> {
        let mut scanner = LineScanner::new(line);

        scanner.skip_whitespace();
        match scanner.peek() {
            None | Some('#') => return Ok(None),
            Some(_) => {}
        }

        let path = scanner.take_while(|ch| !ch.is_whitespace());
        let mut groups: [Vec<i64>; NUM_LABEL_LISTS] = Default::default();
        let mut has_empty_group = false;

        for group in groups.iter_mut() {
            scanner.skip_whitespace();

            // an empty group
            if scanner.peek() == Some(self.group_separator) {
                scanner.bump();
                has_empty_group = true;
                continue;
            }

            loop {
                scanner.skip_whitespace();
                if scanner.is_exhausted() {
                    break;
                }

                let token = scanner.take_while(|ch| ch.is_ascii_digit() || matches!(ch, '+' | '-'));
                let label: i64 = token.parse().map_err(|_| {
                    format_err!("expect an integer label, but found '{}'", scanner.rest())
                })?;
                group.push(label);

                scanner.skip_whitespace();
                if scanner.peek() == Some(self.item_separator) {
                    scanner.bump();
                    scanner.skip_whitespace();
                }
                if scanner.peek() == Some(self.group_separator) {
                    scanner.bump();
                    break;
                }
            }
        }

        scanner.skip_whitespace();
        ensure!(
            scanner.is_exhausted(),
            "unexpected content '{}' after {} label lists",
            scanner.rest(),
            NUM_LABEL_LISTS
        );

        let record = Record {
            path: PathBuf::from(path),
            line: lineno,
            groups,
        };
        Ok(Some((record, has_empty_group)))
    }
}

/// Accumulates parsed records and the derived label layout.
#[derive(Debug)]
struct ManifestBuilder {
    conflict_policy: LabelConflictPolicy,
    records: Vec<Arc<Record>>,
    is_multi_label: bool,
    max_label_id: i64,
    num_conflicts: usize,
}

impl ManifestBuilder {
    fn new(conflict_policy: LabelConflictPolicy) -> Self {
        Self {
            conflict_policy,
            records: vec![],
            is_multi_label: false,
            max_label_id: 0,
            num_conflicts: 0,
        }
    }

    fn push(&mut self, record: Record, has_empty_group: bool) -> Result<()> {
        // an empty group or more than one label per line, ignore labels
        // included, makes a multi-label manifest
        if has_empty_group || record.num_labels() > 1 {
            self.is_multi_label = true;
        }

        if let Some(max) = record.groups.iter().flatten().copied().max() {
            self.max_label_id = self.max_label_id.max(max);
        }

        let conflicts = record.conflicting_labels();
        if !conflicts.is_empty() {
            match self.conflict_policy {
                LabelConflictPolicy::Reject => bail!(
                    "line {}: labels {:?} are listed as both positive and ignored",
                    record.line,
                    conflicts
                ),
                LabelConflictPolicy::Overwrite => self.num_conflicts += 1,
            }
        }

        self.records.push(Arc::new(record));
        Ok(())
    }

    fn finish(self) -> Result<Manifest> {
        let Self {
            records,
            is_multi_label,
            max_label_id,
            num_conflicts,
            ..
        } = self;

        let layout = if is_multi_label {
            if let Some(record) = records
                .iter()
                .find(|record| record.groups.iter().flatten().any(|&label| label < 0))
            {
                bail!(
                    "line {}: negative label ids are not allowed in a multi-label manifest",
                    record.line
                );
            }

            LabelLayout::Multi {
                num_labels: max_label_id as usize + 1,
            }
        } else {
            let num_unlabeled = records
                .iter()
                .filter(|record| record.num_labels() == 0)
                .count();
            if num_unlabeled > 0 {
                warn!(
                    "{} records have no label and are encoded as label 0",
                    num_unlabeled
                );
            }
            LabelLayout::Single
        };

        if num_conflicts > 0 {
            warn!(
                "{} records list labels as both positive and ignored, the ignore label takes precedence",
                num_conflicts
            );
        }

        Ok(Manifest {
            records,
            layout,
            max_label_id,
            num_conflicts,
        })
    }
}

/// A cursor over the characters of one manifest line.
struct LineScanner<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> LineScanner<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) {
        if let Some(ch) = self.peek() {
            self.pos += ch.len_utf8();
        }
    }

    fn is_exhausted(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn skip_whitespace(&mut self) {
        self.take_while(char::is_whitespace);
    }

    fn take_while(&mut self, mut pred: impl FnMut(char) -> bool) -> &'a str {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if !pred(ch) {
                break;
            }
            self.pos += ch.len_utf8();
        }
        &self.text[start..self.pos]
    }
}
