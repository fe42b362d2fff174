//! Pending-acknowledgment ledger.
//!
//! Every event record the consumer receives must eventually be answered with a
//! `Finished` record carrying the same sequence number.  The producer uses these
//! answers for flow control and to detect unresponsive applications, so a
//! sequence that is never finished is a leak on the producer side.
//!
//! A batched motion event exposes only the sequence number of its *last* real
//! sample to the application.  The ledger remembers the chain of earlier
//! sequences folded into it so that finishing the public sequence finishes
//! the whole chain, oldest first.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// The producer reused a sequence number that is still outstanding.
    #[error("sequence {0} is already pending")]
    DuplicateSequence(u32),

    /// The sequence was never received, was already finished, or is not the
    /// public sequence of a delivered event.
    #[error("sequence {0} is not pending")]
    UnknownSequence(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    /// Received, not yet handed to the application.
    Undelivered,
    /// Handed to the application as the public sequence of an event.
    Delivered,
    /// Folded into the delivered event whose public sequence is stored here.
    Chained { to: u32 },
}

/// Set of received-but-unacknowledged sequence numbers.
#[derive(Debug, Default)]
pub struct PendingAckLedger {
    entries: BTreeMap<u32, Entry>,
    /// Arrival order per public sequence, its own sequence last.
    chains: BTreeMap<u32, Vec<u32>>,
}

impl PendingAckLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly received event record.
    ///
    /// # Errors
    ///
    /// [`LedgerError::DuplicateSequence`] if `seq` is already outstanding.
    pub fn record_received(&mut self, seq: u32) -> Result<(), LedgerError> {
        if self.entries.contains_key(&seq) {
            return Err(LedgerError::DuplicateSequence(seq));
        }
        self.entries.insert(seq, Entry::Undelivered);
        Ok(())
    }

    /// Marks `seqs` (in arrival order) as delivered in one event.
    ///
    /// The last sequence becomes the event's public sequence and every
    /// earlier one is chained behind it.  Returns the public sequence.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownSequence`] if any sequence was not received or
    /// was already delivered; the ledger is left unchanged in that case.
    pub fn mark_delivered(&mut self, seqs: &[u32]) -> Result<u32, LedgerError> {
        let Some(&public) = seqs.last() else {
            return Err(LedgerError::UnknownSequence(0));
        };
        if let Some(&bad) = seqs
            .iter()
            .find(|s| self.entries.get(s) != Some(&Entry::Undelivered))
        {
            return Err(LedgerError::UnknownSequence(bad));
        }

        for &seq in &seqs[..seqs.len() - 1] {
            self.entries.insert(seq, Entry::Chained { to: public });
        }
        self.entries.insert(public, Entry::Delivered);
        self.chains.insert(public, seqs.to_vec());
        Ok(public)
    }

    /// Removes the public sequence `seq` and everything chained behind it.
    ///
    /// Returns the removed sequences in arrival order, one `Finished` record
    /// is owed for each.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownSequence`] if `seq` is not the public sequence of
    /// a delivered, unfinished event.
    pub fn acknowledge(&mut self, seq: u32) -> Result<Vec<u32>, LedgerError> {
        if self.entries.get(&seq) != Some(&Entry::Delivered) {
            return Err(LedgerError::UnknownSequence(seq));
        }
        let chain = self.chains.remove(&seq).unwrap_or_else(|| vec![seq]);
        for s in &chain {
            self.entries.remove(s);
        }
        Ok(chain)
    }

    /// Removes sequences that were received but will never be delivered.
    ///
    /// Unknown or already delivered sequences are skipped; the removed ones
    /// are returned in the order given.
    pub fn discard_undelivered(&mut self, seqs: &[u32]) -> Vec<u32> {
        seqs.iter()
            .copied()
            .filter(|s| {
                if self.entries.get(s) == Some(&Entry::Undelivered) {
                    self.entries.remove(s);
                    true
                } else {
                    false
                }
            })
            .collect()
    }

    pub fn contains(&self, seq: u32) -> bool {
        self.entries.contains_key(&seq)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Public sequences of delivered events the application has not finished.
    pub fn delivered_unfinished(&self) -> Vec<u32> {
        self.entries
            .iter()
            .filter(|(_, e)| **e == Entry::Delivered)
            .map(|(s, _)| *s)
            .collect()
    }

    /// Every outstanding sequence, ascending.
    pub fn outstanding(&self) -> BTreeSet<u32> {
        self.entries.keys().copied().collect()
    }

    /// Public sequence that `seq` is chained to, if any.
    pub fn chained_to(&self, seq: u32) -> Option<u32> {
        match self.entries.get(&seq) {
            Some(Entry::Chained { to }) => Some(*to),
            _ => None,
        }
    }
}
