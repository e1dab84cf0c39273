//! Ordered registries of committed journal entries.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::transaction::{
    AutomatedTransaction, Identifiable, JournalId, PeriodicTransaction, Transaction,
};

/// Entry kinds that carry a back-reference to their owning journal.
pub trait JournalEntry: Identifiable {
    fn owner(&self) -> Option<JournalId>;
    fn set_owner(&mut self, owner: Option<JournalId>);
}

macro_rules! impl_journal_entry {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl JournalEntry for $ty {
                fn owner(&self) -> Option<JournalId> {
                    self.journal
                }

                fn set_owner(&mut self, owner: Option<JournalId>) {
                    self.journal = owner;
                }
            }
        )+
    };
}

impl_journal_entry!(Transaction, AutomatedTransaction, PeriodicTransaction);

/// Insertion-ordered collection that owns its entries exclusively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryRegistry<T> {
    entries: Vec<T>,
}

impl<T> Default for EntryRegistry<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

pub type TransactionRegistry = EntryRegistry<Transaction>;
pub type AutomatedTransactionRegistry = EntryRegistry<AutomatedTransaction>;
pub type PeriodicTransactionRegistry = EntryRegistry<PeriodicTransaction>;

impl<T: JournalEntry> EntryRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `entry`, stamping it with `owner`, and returns its id.
    pub fn push(&mut self, mut entry: T, owner: JournalId) -> Uuid {
        let id = entry.id();
        entry.set_owner(Some(owner));
        self.entries.push(entry);
        id
    }

    /// Removes the entry with `id`, handing ownership back to the caller.
    pub fn remove(&mut self, id: Uuid) -> Option<T> {
        let index = self.entries.iter().position(|entry| entry.id() == id)?;
        let mut entry = self.entries.remove(index);
        entry.set_owner(None);
        Some(entry)
    }

    /// Drops every entry past the first `len`.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }

    pub fn get(&self, id: Uuid) -> Option<&T> {
        self.entries.iter().find(|entry| entry.id() == id)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.entries.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.entries.iter().map(Identifiable::id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a, T> IntoIterator for &'a EntryRegistry<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
