//! In-memory processing table keyed by fingerprint.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;
use tracing::debug;

use super::record::{now_millis, ProcessingRecord, ProcessingStatus};
use crate::fingerprint::Fingerprint;
use crate::{Error, ErrorContext, Result};

const CHANGE_CHANNEL_CAPACITY: usize = 1024;

/// Emitted every time a record is inserted or changes status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub id: Fingerprint,
    pub status: ProcessingStatus,
}

/// Shared view of every in-flight and finished request of this context.
///
/// Clones share the same underlying map.
#[derive(Clone)]
pub struct ProcessingTable {
    records: Arc<RwLock<HashMap<Fingerprint, ProcessingRecord>>>,
    changes: broadcast::Sender<StatusChange>,
}

impl Default for ProcessingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingTable {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            changes,
        }
    }

    pub fn get(&self, id: &Fingerprint) -> Option<ProcessingRecord> {
        self.records.read().unwrap().get(id).cloned()
    }

    pub fn status(&self, id: &Fingerprint) -> Option<ProcessingStatus> {
        self.records.read().unwrap().get(id).map(|r| r.status)
    }

    /// Insert a queued record unless one already exists for the fingerprint.
    ///
    /// Returns `false` when the id is taken, so two racing submissions of the
    /// same request enqueue it only once.
    pub fn insert_if_absent(&self, record: ProcessingRecord) -> bool {
        let id = record.id.clone();
        let status = record.status;
        {
            let mut records = self.records.write().unwrap();
            if records.contains_key(&id) {
                return false;
            }
            records.insert(id.clone(), record);
        }
        self.notify(id, status);
        true
    }

    /// Record where the request landed in the pending list.
    pub fn set_queue_position(&self, id: &Fingerprint, position: usize) {
        if let Some(record) = self.records.write().unwrap().get_mut(id) {
            record.queue_position = position;
        }
    }

    pub fn mark_processing(&self, id: &Fingerprint) -> Result<()> {
        self.transition(id, ProcessingStatus::Processing, |r| {
            r.start_processing = Some(now_millis());
        })
    }

    pub fn complete(&self, id: &Fingerprint, response: String) -> Result<()> {
        self.transition(id, ProcessingStatus::Complete, |r| {
            r.response = Some(response);
            r.end_time = Some(now_millis());
        })
    }

    pub fn fail(&self, id: &Fingerprint, message: String) -> Result<()> {
        self.transition(id, ProcessingStatus::Error, |r| {
            r.error = Some(message);
            r.end_time = Some(now_millis());
        })
    }

    fn transition<F>(&self, id: &Fingerprint, next: ProcessingStatus, apply: F) -> Result<()>
    where
        F: FnOnce(&mut ProcessingRecord),
    {
        {
            let mut records = self.records.write().unwrap();
            let record = records.get_mut(id).ok_or_else(|| {
                Error::internal_with_context(
                    "no processing record for fingerprint",
                    ErrorContext::new()
                        .with_details(id.to_string())
                        .with_source("processing_table"),
                )
            })?;
            if !record.status.can_transition_to(next) {
                return Err(Error::internal_with_context(
                    format!("invalid status transition {} -> {}", record.status, next),
                    ErrorContext::new()
                        .with_details(id.to_string())
                        .with_source("processing_table"),
                ));
            }
            record.status = next;
            apply(record);
        }
        debug!(id = %id, status = %next, "processing record updated");
        self.notify(id.clone(), next);
        Ok(())
    }

    fn notify(&self, id: Fingerprint, status: ProcessingStatus) {
        // no subscribers is fine
        let _ = self.changes.send(StatusChange { id, status });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.changes.subscribe()
    }

    /// All records, oldest first.
    pub fn snapshot(&self) -> Vec<ProcessingRecord> {
        let mut records: Vec<_> = self.records.read().unwrap().values().cloned().collect();
        records.sort_by_key(|r| r.start_time);
        records
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.records.write().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::FingerprintGenerator;
    use crate::upstream::GenerationRequest;

    fn queued(prompt: &str) -> ProcessingRecord {
        let request = GenerationRequest::new(prompt, "models/gemini-2.0-flash");
        let id = FingerprintGenerator::new().generate(prompt, &request.model, "", 0.7);
        ProcessingRecord::queued(id, request, 1)
    }

    #[test]
    fn test_insert_if_absent_dedups() {
        let table = ProcessingTable::new();
        let record = queued("a");
        assert!(table.insert_if_absent(record.clone()));
        assert!(!table.insert_if_absent(record.clone()));
        assert_eq!(table.len(), 1);
        assert_eq!(table.status(&record.id), Some(ProcessingStatus::Queued));
    }

    #[test]
    fn test_happy_path_sets_fields() {
        let table = ProcessingTable::new();
        let record = queued("a");
        let id = record.id.clone();
        table.insert_if_absent(record);
        table.mark_processing(&id).unwrap();
        assert!(table.get(&id).unwrap().start_processing.is_some());
        table.complete(&id, "answer".into()).unwrap();

        let done = table.get(&id).unwrap();
        assert_eq!(done.status, ProcessingStatus::Complete);
        assert_eq!(done.response.as_deref(), Some("answer"));
        assert!(done.error.is_none());
        assert!(done.end_time.is_some());
    }

    #[test]
    fn test_terminal_record_cannot_change() {
        let table = ProcessingTable::new();
        let record = queued("a");
        let id = record.id.clone();
        table.insert_if_absent(record);
        table.mark_processing(&id).unwrap();
        table.fail(&id, "boom".into()).unwrap();

        let err = table.complete(&id, "late".into()).unwrap_err();
        assert!(err.to_string().contains("error -> complete"));
        assert!(table.mark_processing(&id).is_err());
        let record = table.get(&id).unwrap();
        assert_eq!(record.status, ProcessingStatus::Error);
        assert!(record.response.is_none());
    }

    #[test]
    fn test_unknown_id_is_an_error() {
        let table = ProcessingTable::new();
        let id = queued("ghost").id;
        assert!(matches!(
            table.mark_processing(&id),
            Err(Error::Internal { .. })
        ));
    }

    #[tokio::test]
    async fn test_subscribers_see_every_change() {
        let table = ProcessingTable::new();
        let mut rx = table.subscribe();
        let record = queued("a");
        let id = record.id.clone();
        table.insert_if_absent(record);
        table.mark_processing(&id).unwrap();
        table.complete(&id, "ok".into()).unwrap();

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(rx.recv().await.unwrap().status);
        }
        assert_eq!(
            seen,
            vec![
                ProcessingStatus::Queued,
                ProcessingStatus::Processing,
                ProcessingStatus::Complete
            ]
        );
    }

    #[test]
    fn test_clones_share_state() {
        let table = ProcessingTable::new();
        let other = table.clone();
        table.insert_if_absent(queued("a"));
        assert_eq!(other.len(), 1);
        other.clear();
        assert!(table.is_empty());
    }
}
