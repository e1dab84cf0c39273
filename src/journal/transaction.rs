use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{account::AccountId, commodity::Amount};

/// Exposes a stable identifier for entries stored in the journal registries.
pub trait Identifiable {
    fn id(&self) -> Uuid;
}

/// Identity of the journal that owns a committed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JournalId(pub Uuid);

impl JournalId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JournalId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum TransactionState {
    #[default]
    Uncleared,
    Pending,
    Cleared,
}

/// One line item of a transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Posting {
    pub account: AccountId,
    /// `None` until a finalizer fills an elided amount.
    pub amount: Option<Amount>,
    /// Unbalanced virtual postings do not take part in balancing.
    #[serde(default)]
    pub is_virtual: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Posting {
    pub fn new(account: AccountId, amount: Option<Amount>) -> Self {
        Self {
            account,
            amount,
            is_virtual: false,
            note: None,
        }
    }

    pub fn virtual_posting(account: AccountId, amount: Option<Amount>) -> Self {
        Self {
            is_virtual: true,
            ..Self::new(account, amount)
        }
    }

    pub fn must_balance(&self) -> bool {
        !self.is_virtual
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aux_date: Option<NaiveDate>,
    #[serde(default)]
    pub state: TransactionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub payee: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub postings: Vec<Posting>,
    /// Back-reference set when the journal commits the transaction.
    #[serde(default)]
    pub(crate) journal: Option<JournalId>,
}

impl Transaction {
    pub fn new(date: NaiveDate, payee: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            date,
            aux_date: None,
            state: TransactionState::Uncleared,
            code: None,
            payee: payee.into(),
            note: None,
            postings: Vec::new(),
            journal: None,
        }
    }

    pub fn with_posting(mut self, posting: Posting) -> Self {
        self.postings.push(posting);
        self
    }

    pub fn add_posting(&mut self, posting: Posting) {
        self.postings.push(posting);
    }

    pub fn journal(&self) -> Option<JournalId> {
        self.journal
    }
}

impl Identifiable for Transaction {
    fn id(&self) -> Uuid {
        self.id
    }
}

/// Posting line of an automated or periodic template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemplatePosting {
    pub account: AccountId,
    pub amount: Option<Amount>,
    #[serde(default)]
    pub is_virtual: bool,
}

/// Template whose postings are added to transactions touching matching accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomatedTransaction {
    pub id: Uuid,
    /// Regular expression matched against full account names.
    pub predicate: String,
    pub postings: Vec<TemplatePosting>,
    #[serde(default)]
    pub(crate) journal: Option<JournalId>,
}

impl AutomatedTransaction {
    pub fn new(predicate: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            predicate: predicate.into(),
            postings: Vec::new(),
            journal: None,
        }
    }

    pub fn with_posting(mut self, posting: TemplatePosting) -> Self {
        self.postings.push(posting);
        self
    }

    pub fn journal(&self) -> Option<JournalId> {
        self.journal
    }
}

impl Identifiable for AutomatedTransaction {
    fn id(&self) -> Uuid {
        self.id
    }
}

/// Template describing a recurring transaction, e.g. `~ Monthly`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodicTransaction {
    pub id: Uuid,
    pub period: String,
    pub postings: Vec<TemplatePosting>,
    #[serde(default)]
    pub(crate) journal: Option<JournalId>,
}

impl PeriodicTransaction {
    pub fn new(period: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            period: period.into(),
            postings: Vec::new(),
            journal: None,
        }
    }

    pub fn with_posting(mut self, posting: TemplatePosting) -> Self {
        self.postings.push(posting);
        self
    }

    pub fn journal(&self) -> Option<JournalId> {
        self.journal
    }
}

impl Identifiable for PeriodicTransaction {
    fn id(&self) -> Uuid {
        self.id
    }
}
