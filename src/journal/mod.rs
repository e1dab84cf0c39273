//! Journal aggregate, its registries, finalizers, and source provenance.

pub mod finalizer;
#[allow(clippy::module_inception)]
pub mod journal;
pub mod provenance;
pub mod registry;
pub mod transaction;

pub use finalizer::{
    ChainFailure, ElidedAmountFinalizer, FinalizerChain, MinimumPostingsFinalizer,
    PayeeRequiredFinalizer, TransactionFinalizer,
};
pub use journal::{Journal, JournalSnapshot, ParseSummary, SharedAccounts};
pub use provenance::{ProvenanceRecord, SourceProvenanceLog};
pub use registry::{
    AutomatedTransactionRegistry, EntryRegistry, JournalEntry, PeriodicTransactionRegistry,
    TransactionRegistry,
};
pub use transaction::{
    AutomatedTransaction, Identifiable, JournalId, PeriodicTransaction, Posting, TemplatePosting,
    Transaction, TransactionState,
};
