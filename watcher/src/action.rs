use crate::corpus::{CorpusIndex, PhotoLibrary, StorageError};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

/// What to do when the extracted text matches library photos. Policies are
/// mutually exclusive and fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionPolicy {
    Report,
    Display,
    Delete,
}

impl ActionPolicy {
    pub fn parse(s: &str) -> Result<Self, PolicyError> {
        match s {
            "report" => Ok(Self::Report),
            "display" => Ok(Self::Display),
            "delete" => Ok(Self::Delete),
            other => Err(PolicyError(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown action policy {0:?}, expected 'report', 'display' or 'delete'")]
pub struct PolicyError(String);

/// Structured result of one cycle, emitted on the observer channel under the
/// `report` policy.
#[derive(Debug, Serialize)]
pub struct MatchReport {
    pub captured_at_ms: i64,
    pub text: String,
    pub matches: Vec<String>,
}

/// Where the `display` policy pushes its output. `show` is fire-and-forget:
/// implementations must hand off internally rather than block the worker.
pub trait PresentationSurface: Send + Sync {
    fn show(&self, frame: &[u8], text: &str, matches: &[PathBuf]);
}

impl<T: PresentationSurface + ?Sized> PresentationSurface for std::sync::Arc<T> {
    fn show(&self, frame: &[u8], text: &str, matches: &[PathBuf]) {
        (**self).show(frame, text, matches);
    }
}

/// Default surface: logs the summary instead of rendering anything.
pub struct LogSurface;

impl PresentationSurface for LogSurface {
    fn show(&self, frame: &[u8], text: &str, matches: &[PathBuf]) {
        if matches.is_empty() {
            info!(frame_bytes = frame.len(), chars = text.len(), "no match found");
        } else {
            let names: Vec<_> = matches.iter().map(|p| p.display().to_string()).collect();
            info!(
                frame_bytes = frame.len(),
                chars = text.len(),
                matched = %names.join(", "),
                "match found"
            );
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Reported { matches: usize },
    Displayed { matches: usize },
    Deleted { removed: usize, failed: usize },
}

pub struct Dispatcher {
    policy: ActionPolicy,
    surface: Box<dyn PresentationSurface>,
}

impl Dispatcher {
    pub fn new(policy: ActionPolicy, surface: Box<dyn PresentationSurface>) -> Self {
        Self { policy, surface }
    }

    pub fn policy(&self) -> ActionPolicy {
        self.policy
    }

    /// Act on one cycle's match result. Individual failures (an already-gone
    /// file, a permission error) are warnings; the cycle itself never fails.
    pub fn dispatch(
        &self,
        frame_bytes: &[u8],
        captured_at_ms: i64,
        text: &str,
        matches: &[PathBuf],
        library: &PhotoLibrary,
        index: &mut CorpusIndex,
    ) -> DispatchOutcome {
        match self.policy {
            ActionPolicy::Report => {
                let report = MatchReport {
                    captured_at_ms,
                    text: text.to_string(),
                    matches: matches.iter().map(|p| p.display().to_string()).collect(),
                };
                match serde_json::to_string(&report) {
                    Ok(line) => info!(matches = matches.len(), report = %line, "match report"),
                    Err(e) => warn!(error = %e, "failed to serialize match report"),
                }
                DispatchOutcome::Reported {
                    matches: matches.len(),
                }
            }
            ActionPolicy::Display => {
                self.surface.show(frame_bytes, text, matches);
                DispatchOutcome::Displayed {
                    matches: matches.len(),
                }
            }
            ActionPolicy::Delete => {
                let mut removed = 0;
                let mut failed = 0;
                for path in matches {
                    match library.delete(path) {
                        Ok(()) => {
                            index.drop_entry(path);
                            removed += 1;
                            info!(photo = %path.display(), "deleted matched photo");
                        }
                        Err(e) => {
                            failed += 1;
                            warn!(photo = %path.display(), error = %e, "failed to delete matched photo");
                            // Already gone means the entry is dead either way;
                            // retire it so later cycles cannot re-match it.
                            if matches!(e, StorageError::NotFound(_)) {
                                index.drop_entry(path);
                            }
                        }
                    }
                }
                DispatchOutcome::Deleted { removed, failed }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSurface {
        shown: Mutex<Vec<(usize, String, usize)>>,
    }

    impl RecordingSurface {
        fn new() -> Self {
            Self {
                shown: Mutex::new(Vec::new()),
            }
        }
    }

    impl PresentationSurface for RecordingSurface {
        fn show(&self, frame: &[u8], text: &str, matches: &[PathBuf]) {
            self.shown
                .lock()
                .unwrap()
                .push((frame.len(), text.to_string(), matches.len()));
        }
    }

    #[test]
    fn parse_rejects_unknown_policies() {
        assert_eq!(ActionPolicy::parse("report").unwrap(), ActionPolicy::Report);
        assert_eq!(
            ActionPolicy::parse("display").unwrap(),
            ActionPolicy::Display
        );
        assert_eq!(ActionPolicy::parse("delete").unwrap(), ActionPolicy::Delete);
        assert!(ActionPolicy::parse("shred").is_err());
    }

    #[test]
    fn report_counts_matches() {
        let dir = tempfile::tempdir().unwrap();
        let library = PhotoLibrary::new(dir.path());
        let mut index = CorpusIndex::new();
        let dispatcher = Dispatcher::new(ActionPolicy::Report, Box::new(LogSurface));

        let matches = vec![PathBuf::from("a.jpg"), PathBuf::from("b.jpg")];
        let outcome = dispatcher.dispatch(b"jpeg", 1754300000000, "TOTAL", &matches, &library, &mut index);
        assert_eq!(outcome, DispatchOutcome::Reported { matches: 2 });
    }

    #[test]
    fn display_forwards_to_the_surface() {
        let dir = tempfile::tempdir().unwrap();
        let library = PhotoLibrary::new(dir.path());
        let mut index = CorpusIndex::new();
        let surface = std::sync::Arc::new(RecordingSurface::new());
        let dispatcher = Dispatcher::new(
            ActionPolicy::Display,
            Box::new(std::sync::Arc::clone(&surface)),
        );

        let matches = vec![PathBuf::from("a.jpg")];
        let outcome = dispatcher.dispatch(b"jpeg", 0, "TEXT", &matches, &library, &mut index);
        assert_eq!(outcome, DispatchOutcome::Displayed { matches: 1 });
        assert_eq!(
            surface.shown.lock().unwrap().as_slice(),
            &[(4, "TEXT".to_string(), 1)]
        );
    }

    #[test]
    fn delete_removes_files_and_retires_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        std::fs::write(&path, b"x").unwrap();
        let library = PhotoLibrary::new(dir.path());
        let mut index = CorpusIndex::new();
        index.insert_text(path.clone(), "INVOICE".into());
        let dispatcher = Dispatcher::new(ActionPolicy::Delete, Box::new(LogSurface));

        let outcome = dispatcher.dispatch(
            b"jpeg",
            0,
            "INVOICE",
            &[path.clone()],
            &library,
            &mut index,
        );
        assert_eq!(
            outcome,
            DispatchOutcome::Deleted {
                removed: 1,
                failed: 0
            }
        );
        assert!(!path.exists());
        assert!(index.is_dropped(&path));
        assert_eq!(index.cached_text(&path), None);
    }

    #[test]
    fn delete_tolerates_an_already_gone_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.jpg");
        let library = PhotoLibrary::new(dir.path());
        let mut index = CorpusIndex::new();
        let dispatcher = Dispatcher::new(ActionPolicy::Delete, Box::new(LogSurface));

        let outcome = dispatcher.dispatch(b"jpeg", 0, "X", &[path.clone()], &library, &mut index);
        assert_eq!(
            outcome,
            DispatchOutcome::Deleted {
                removed: 0,
                failed: 1
            }
        );
        // Gone is gone: the entry is still retired.
        assert!(index.is_dropped(&path));
    }

    #[test]
    fn delete_with_no_matches_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let library = PhotoLibrary::new(dir.path());
        let mut index = CorpusIndex::new();
        let dispatcher = Dispatcher::new(ActionPolicy::Delete, Box::new(LogSurface));

        let outcome = dispatcher.dispatch(b"jpeg", 0, "X", &[], &library, &mut index);
        assert_eq!(
            outcome,
            DispatchOutcome::Deleted {
                removed: 0,
                failed: 0
            }
        );
    }
}
