use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::path::Path;

/// Class-index to label mapping for object detectors.
///
/// Label files hold one entry per line, either `label` (index = line number) or
/// `<index> <label>`. Blank lines are skipped.
#[derive(Clone, Debug, Default)]
pub struct LabelTable {
    labels: HashMap<usize, String>,
}

impl LabelTable {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read labels file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid labels file {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let mut labels = HashMap::new();
        for (line_no, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (index, label) = match line.split_once(char::is_whitespace) {
                Some((first, rest)) if first.chars().all(|c| c.is_ascii_digit()) => {
                    let index = first
                        .parse::<usize>()
                        .map_err(|_| anyhow!("line {}: bad class index", line_no + 1))?;
                    (index, rest.trim())
                }
                _ => (line_no, line),
            };
            labels.insert(index, label.to_string());
        }
        if labels.is_empty() {
            return Err(anyhow!("no labels found"));
        }
        Ok(Self { labels })
    }

    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels
                .into_iter()
                .enumerate()
                .map(|(i, l)| (i, l.into()))
                .collect(),
        }
    }

    pub fn get(&self, class_id: usize) -> Option<&str> {
        self.labels.get(&class_id).map(String::as_str)
    }

    /// Label for `class_id`, or `class <id>` when the table has no entry.
    pub fn label(&self, class_id: usize) -> String {
        self.get(class_id)
            .map(str::to_string)
            .unwrap_or_else(|| format!("class {}", class_id))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
