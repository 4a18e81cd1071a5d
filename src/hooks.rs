//! Side effects bound to detected labels.
//!
//! A `DetectionHook` watches a set of class labels and fires its action at most once
//! per detection cycle, on the first matching detection. Failures come back as
//! `Err` for the caller to log; they never interrupt the stream.

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::detect::Detection;

/// Action run when a watched label is detected.
pub trait HookAction: Send {
    fn name(&self) -> &'static str;

    /// `jpeg` is the annotated frame the detection came from.
    fn fire(&mut self, detection: &Detection, jpeg: &[u8]) -> Result<()>;
}

pub struct DetectionHook {
    watched: HashSet<String>,
    action: Box<dyn HookAction>,
}

impl DetectionHook {
    pub fn new<I, S>(labels: I, action: Box<dyn HookAction>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            watched: labels.into_iter().map(Into::into).collect(),
            action,
        }
    }

    pub fn watches(&self, label: &str) -> bool {
        self.watched.contains(label)
    }

    pub fn action_name(&self) -> &'static str {
        self.action.name()
    }

    /// Fire for the first watched detection, if any. Returns whether the action ran.
    pub fn run(&mut self, detections: &[Detection], jpeg: &[u8]) -> Result<bool> {
        let Some(hit) = detections.iter().find(|d| self.watches(&d.label)) else {
            return Ok(false);
        };
        self.action.fire(hit, jpeg)?;
        Ok(true)
    }
}

/// Writes the annotated frame to `<dir>/<UTC timestamp>_<label>.jpg`.
pub struct SnapshotHook {
    dir: PathBuf,
}

impl SnapshotHook {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create snapshot dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl HookAction for SnapshotHook {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    fn fire(&mut self, detection: &Detection, jpeg: &[u8]) -> Result<()> {
        let path = self.dir.join(snapshot_file_name(&detection.label));
        std::fs::write(&path, jpeg)
            .with_context(|| format!("write snapshot {}", path.display()))?;
        log::info!("snapshot saved: {}", path.display());
        Ok(())
    }
}

fn snapshot_file_name(label: &str) -> String {
    let stamp = Utc::now()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace(':', "-");
    let label: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("{}_{}.jpg", stamp, label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;
    use std::sync::{Arc, Mutex};

    struct Recording(Arc<Mutex<Vec<String>>>);

    impl HookAction for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn fire(&mut self, detection: &Detection, _jpeg: &[u8]) -> Result<()> {
            self.0
                .lock()
                .unwrap()
                .push(detection.label.clone());
            Ok(())
        }
    }

    fn det(label: &str) -> Detection {
        Detection::new(BoundingBox::new(0.0, 0.0, 0.5, 0.5), label, 0.9)
    }

    #[test]
    fn fires_once_per_cycle_on_first_match() {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let mut hook = DetectionHook::new(["cat", "dog"], Box::new(Recording(fired.clone())));
        let ran = hook
            .run(&[det("person"), det("dog"), det("cat")], b"jpeg")
            .unwrap();
        assert!(ran);
        assert_eq!(*fired.lock().unwrap(), vec!["dog".to_string()]);
    }

    #[test]
    fn unwatched_labels_do_nothing() {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let mut hook = DetectionHook::new(["cat"], Box::new(Recording(fired.clone())));
        assert!(!hook.run(&[det("person")], b"jpeg").unwrap());
        assert!(!hook.run(&[], b"jpeg").unwrap());
        assert!(fired.lock().unwrap().is_empty());
    }

    #[test]
    fn snapshot_is_named_by_timestamp_and_label() {
        let dir = tempfile::tempdir().unwrap();
        let mut hook = DetectionHook::new(
            ["traffic light"],
            Box::new(SnapshotHook::new(dir.path().join("snaps")).unwrap()),
        );
        assert!(hook.run(&[det("traffic light")], b"\xFF\xD8data").unwrap());

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("snaps"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(entries.len(), 1);
        let name = &entries[0];
        assert!(name.ends_with("Z_traffic_light.jpg"), "{}", name);
        assert!(!name.contains(':'));
    }

    #[test]
    fn snapshot_failure_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let mut action = SnapshotHook::new(dir.path()).unwrap();
        std::fs::remove_dir_all(dir.path()).unwrap();
        assert!(action.fire(&det("cat"), b"x").is_err());
    }
}
