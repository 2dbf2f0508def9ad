use crate::forge::RateLimit;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

/// Structured progress for whoever renders the run; the engine itself
/// never prints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    RepositoryDiscovered {
        repository: String,
    },
    RepositoryFinished {
        repository: String,
        entries: usize,
        contributions: u64,
    },
    ContributorResolved {
        repository: String,
        key: String,
        contributions: u64,
    },
    ContributorFailed {
        repository: String,
        subject: String,
        message: String,
    },
    RateLimitObserved(RateLimit),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ProgressSink {
    sender: Option<UnboundedSender<ProgressEvent>>,
}

impl ProgressSink {
    pub(crate) fn new(sender: UnboundedSender<ProgressEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Dropped silently once the receiving side is gone.
    pub(crate) fn emit(&self, event: ProgressEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }
}
