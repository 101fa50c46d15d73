use crate::error::StoreError;
use crate::gateway::AckRecord;
use crate::store::{StateStore, StateStoreExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

const JOURNAL_NS: &str = "commands";
const JOURNAL_KEY: &str = "applied";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct JournalEntry {
    id: i64,
    kind: String,
    ack: AckRecord,
}

/// Bounded record of applied non-idempotent commands, so a redelivered
/// command replays its ack instead of running again.
#[derive(Clone)]
pub struct CommandJournal {
    store: Arc<dyn StateStore>,
    capacity: usize,
}

impl CommandJournal {
    pub fn new(store: Arc<dyn StateStore>, capacity: usize) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
        }
    }

    fn entries(&self) -> Result<VecDeque<JournalEntry>, StoreError> {
        Ok(self
            .store
            .load(JOURNAL_NS, JOURNAL_KEY)?
            .unwrap_or_default())
    }

    /// Ack previously recorded for command `id` of type `kind`.
    pub fn lookup(&self, id: i64, kind: &str) -> Result<Option<AckRecord>, StoreError> {
        if id < 0 {
            return Ok(None);
        }
        Ok(self
            .entries()?
            .into_iter()
            .find(|entry| entry.id == id && entry.kind.eq_ignore_ascii_case(kind))
            .map(|entry| entry.ack))
    }

    /// Remember a successful ack. Commands without an id cannot be matched
    /// on redelivery and are not recorded.
    pub fn record(&self, ack: &AckRecord) -> Result<(), StoreError> {
        if ack.id < 0 || !ack.success {
            return Ok(());
        }
        let mut entries = self.entries()?;
        entries.retain(|entry| entry.id != ack.id);
        entries.push_back(JournalEntry {
            id: ack.id,
            kind: ack.command.to_ascii_lowercase(),
            ack: ack.clone(),
        });
        while entries.len() > self.capacity {
            entries.pop_front();
        }
        self.store.save(JOURNAL_NS, JOURNAL_KEY, &entries)
    }

    pub fn len(&self) -> usize {
        self.entries().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Command;
    use crate::store::MemoryStore;

    fn ack(id: i64, kind: &str, success: bool) -> AckRecord {
        let mut ack = AckRecord::envelope(&Command::new(id, kind));
        ack.success = success;
        ack
    }

    #[test]
    fn lookup_matches_id_and_kind() {
        let journal = CommandJournal::new(Arc::new(MemoryStore::new()), 4);
        journal.record(&ack(7, "wipe", true)).unwrap();

        assert!(journal.lookup(7, "WIPE").unwrap().is_some());
        assert!(journal.lookup(7, "request_password_change").unwrap().is_none());
        assert!(journal.lookup(8, "wipe").unwrap().is_none());
    }

    #[test]
    fn failures_and_missing_ids_are_not_recorded() {
        let journal = CommandJournal::new(Arc::new(MemoryStore::new()), 4);
        journal.record(&ack(1, "wipe", false)).unwrap();
        journal.record(&ack(-1, "wipe", true)).unwrap();
        assert!(journal.is_empty());
    }

    #[test]
    fn oldest_entries_are_evicted() {
        let journal = CommandJournal::new(Arc::new(MemoryStore::new()), 2);
        for id in 1..=3 {
            journal.record(&ack(id, "wipe", true)).unwrap();
        }
        assert_eq!(journal.len(), 2);
        assert!(journal.lookup(1, "wipe").unwrap().is_none());
        assert!(journal.lookup(3, "wipe").unwrap().is_some());
    }
}
