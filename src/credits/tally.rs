use super::{Attribution, NameSource, ResolvedContribution};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TallyEntry {
    pub display_name: String,
    pub total_contributions: u64,
    name_source: NameSource,
}

/// Per-repository contribution totals keyed by attribution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryTally {
    entries: HashMap<Attribution, TallyEntry>,
}

impl RepositoryTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts one resolved record. Counts add up; the display name kept is
    /// the one from the most authoritative source, so the result does not
    /// depend on merge order.
    pub fn merge(&mut self, resolved: ResolvedContribution) {
        match self.entries.entry(resolved.attribution) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.total_contributions += resolved.contributions;
                let candidate = (resolved.name_source, std::cmp::Reverse(&resolved.display_name));
                let current = (entry.name_source, std::cmp::Reverse(&entry.display_name));
                if candidate > current {
                    entry.display_name = resolved.display_name;
                    entry.name_source = resolved.name_source;
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(TallyEntry {
                    display_name: resolved.display_name,
                    total_contributions: resolved.contributions,
                    name_source: resolved.name_source,
                });
            }
        }
    }

    pub fn get(&self, attribution: &Attribution) -> Option<&TallyEntry> {
        self.entries.get(attribution)
    }

    pub fn get_login(&self, login: &str) -> Option<&TallyEntry> {
        self.get(&Attribution::Account(login.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_contributions(&self) -> u64 {
        self.entries.values().map(|e| e.total_contributions).sum()
    }

    pub fn unattributed_count(&self) -> usize {
        self.entries.keys().filter(|a| a.identity().is_none()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Attribution, &TallyEntry)> {
        self.entries.iter()
    }

    /// Highest totals first, ties broken by key.
    pub fn ranked(&self) -> Vec<(&Attribution, &TallyEntry)> {
        let mut ranked: Vec<_> = self.entries.iter().collect();
        ranked.sort_by(|a, b| {
            b.1.total_contributions
                .cmp(&a.1.total_contributions)
                .then_with(|| a.0.cmp(b.0))
        });
        ranked
    }
}

/// One tally entry as it appears in reports, carrying its attribution so
/// accounts and email buckets can be told apart without parsing the key.
#[derive(Serialize)]
struct EntryView<'a> {
    login: Option<&'a str>,
    email: Option<&'a str>,
    display_name: &'a str,
    contributions: u64,
}

impl<'a> EntryView<'a> {
    fn new(attribution: &'a Attribution, entry: &'a TallyEntry) -> Self {
        Self {
            login: attribution.identity(),
            email: attribution.email(),
            display_name: &entry.display_name,
            contributions: entry.total_contributions,
        }
    }
}

impl Serialize for RepositoryTally {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let ranked = self.ranked();
        let mut map = serializer.serialize_map(Some(ranked.len()))?;
        for (attribution, entry) in ranked {
            map.serialize_entry(&attribution.to_string(), &EntryView::new(attribution, entry))?;
        }
        map.end()
    }
}

/// Serializing merge path for one repository: any number of resolution tasks
/// send into it, a single consumer task owns the tally and folds records in
/// as they arrive.
pub struct Aggregator {
    sender: mpsc::UnboundedSender<ResolvedContribution>,
    consumer: JoinHandle<RepositoryTally>,
}

#[derive(Clone)]
pub struct TallySender {
    inner: mpsc::UnboundedSender<ResolvedContribution>,
}

impl TallySender {
    /// Returns false if the aggregator already finished.
    pub fn send(&self, resolved: ResolvedContribution) -> bool {
        match self.inner.send(resolved) {
            Ok(()) => true,
            Err(mpsc::error::SendError(lost)) => {
                warn!(key = %lost.attribution, "Aggregator closed, contribution dropped");
                false
            }
        }
    }
}

impl Aggregator {
    pub fn spawn(repository: &str) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<ResolvedContribution>();
        let repository = repository.to_string();

        let consumer = tokio::spawn(async move {
            let mut tally = RepositoryTally::new();
            let mut merged = 0usize;
            while let Some(resolved) = receiver.recv().await {
                tally.merge(resolved);
                merged += 1;
            }
            debug!(repo = %repository, merged, entries = tally.len(), "Tally finalized");
            tally
        });

        Self { sender, consumer }
    }

    pub fn sender(&self) -> TallySender {
        TallySender {
            inner: self.sender.clone(),
        }
    }

    /// Waits for every outstanding sender to drop, then returns the tally.
    pub async fn finish(self) -> Result<RepositoryTally, JoinError> {
        drop(self.sender);
        self.consumer.await
    }
}
