use std::{
    cell::RefCell,
    collections::HashSet,
    fmt,
    io::Read,
    path::Path,
    rc::Rc,
    sync::Arc,
};

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    account::{Account, AccountId, AccountRegistry},
    commodity::CommodityPool,
    errors::{JournalError, Result},
    parser::{Diagnostic, JournalParser, ParseContext, SessionScope},
};

use super::{
    finalizer::{FinalizerChain, TransactionFinalizer},
    provenance::{ProvenanceRecord, SourceProvenanceLog},
    registry::{
        AutomatedTransactionRegistry, JournalEntry, PeriodicTransactionRegistry,
        TransactionRegistry,
    },
    transaction::{AutomatedTransaction, JournalId, PeriodicTransaction, Transaction},
};

/// Account registry shared between a session and the journals it loads.
pub type SharedAccounts = Rc<RefCell<dyn AccountRegistry>>;

/// Outcome of one successful [`Journal::parse`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseSummary {
    /// Transactions committed from this source.
    pub added: usize,
    pub automated: usize,
    pub periodic: usize,
    /// Parser diagnostics followed by rejected candidates.
    pub diagnostics: Vec<Diagnostic>,
}

/// Persisted form of a journal. Field order is significant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalSnapshot {
    pub master: Option<AccountId>,
    pub basket: Option<AccountId>,
    pub transactions: TransactionRegistry,
    pub automated_transactions: AutomatedTransactionRegistry,
    pub periodic_transactions: PeriodicTransactionRegistry,
    pub sources: SourceProvenanceLog,
}

/// Aggregate root holding everything loaded into one accounting journal.
pub struct Journal {
    id: JournalId,
    master: Option<AccountId>,
    basket: Option<AccountId>,
    transactions: TransactionRegistry,
    automated_transactions: AutomatedTransactionRegistry,
    periodic_transactions: PeriodicTransactionRegistry,
    sources: SourceProvenanceLog,
    was_loaded: bool,
    accounts: SharedAccounts,
    commodity_pool: Arc<dyn CommodityPool>,
    finalizers: FinalizerChain,
    parser: Box<dyn JournalParser>,
}

impl fmt::Debug for Journal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Journal")
            .field("id", &self.id)
            .field("master", &self.master)
            .field("basket", &self.basket)
            .field("transactions", &self.transactions.len())
            .field("automated_transactions", &self.automated_transactions.len())
            .field("periodic_transactions", &self.periodic_transactions.len())
            .field("sources", &self.sources.len())
            .field("was_loaded", &self.was_loaded)
            .field("finalizers", &self.finalizers)
            .finish()
    }
}

impl Journal {
    pub fn new(
        accounts: SharedAccounts,
        commodity_pool: Arc<dyn CommodityPool>,
        parser: Box<dyn JournalParser>,
    ) -> Self {
        Self {
            id: JournalId::new(),
            master: None,
            basket: None,
            transactions: TransactionRegistry::new(),
            automated_transactions: AutomatedTransactionRegistry::new(),
            periodic_transactions: PeriodicTransactionRegistry::new(),
            sources: SourceProvenanceLog::new(),
            was_loaded: false,
            accounts,
            commodity_pool,
            finalizers: FinalizerChain::new(),
            parser,
        }
    }

    /// Rebuilds a journal from a snapshot taken against the same account registry.
    pub fn restore(
        snapshot: JournalSnapshot,
        accounts: SharedAccounts,
        commodity_pool: Arc<dyn CommodityPool>,
        parser: Box<dyn JournalParser>,
    ) -> Self {
        let mut journal = Self::new(accounts, commodity_pool, parser);
        let owner = journal.id;
        journal.master = snapshot.master;
        journal.basket = snapshot.basket;
        journal.sources = snapshot.sources;
        for xact in snapshot.transactions.iter().cloned() {
            journal.transactions.push(xact, owner);
        }
        for auto in snapshot.automated_transactions.iter().cloned() {
            journal.automated_transactions.push(auto, owner);
        }
        for periodic in snapshot.periodic_transactions.iter().cloned() {
            journal.periodic_transactions.push(periodic, owner);
        }
        journal.was_loaded = !journal.transactions.is_empty();
        journal
    }

    pub fn snapshot(&self) -> JournalSnapshot {
        JournalSnapshot {
            master: self.master,
            basket: self.basket,
            transactions: self.transactions.clone(),
            automated_transactions: self.automated_transactions.clone(),
            periodic_transactions: self.periodic_transactions.clone(),
            sources: self.sources.clone(),
        }
    }

    pub fn id(&self) -> JournalId {
        self.id
    }

    pub fn master(&self) -> Option<AccountId> {
        self.master
    }

    pub fn set_master(&mut self, master: Option<AccountId>) {
        self.master = master;
    }

    pub fn basket(&self) -> Option<AccountId> {
        self.basket
    }

    pub fn set_basket(&mut self, basket: Option<AccountId>) {
        self.basket = basket;
    }

    pub fn transactions(&self) -> &TransactionRegistry {
        &self.transactions
    }

    pub fn automated_transactions(&self) -> &AutomatedTransactionRegistry {
        &self.automated_transactions
    }

    pub fn periodic_transactions(&self) -> &PeriodicTransactionRegistry {
        &self.periodic_transactions
    }

    pub fn sources(&self) -> &SourceProvenanceLog {
        &self.sources
    }

    pub fn was_loaded(&self) -> bool {
        self.was_loaded
    }

    pub fn commodity_pool(&self) -> &Arc<dyn CommodityPool> {
        &self.commodity_pool
    }

    pub fn finalizer_count(&self) -> usize {
        self.finalizers.len()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    // Account operations are forwarded to the session registry, which holds
    // every account the session has seen.

    pub fn add_account(&self, account: Account) -> AccountId {
        self.accounts.borrow_mut().add_account(account)
    }

    pub fn remove_account(&self, id: AccountId) -> bool {
        self.accounts.borrow_mut().remove_account(id)
    }

    pub fn find_account(&self, name: &str, auto_create: bool) -> Option<AccountId> {
        self.accounts.borrow_mut().find_account(name, auto_create)
    }

    pub fn find_account_re(&self, pattern: &str) -> Result<Option<AccountId>> {
        let pattern = Regex::new(pattern)?;
        Ok(self.accounts.borrow().find_account_re(&pattern))
    }

    /// Runs the finalizer chain and the balance check, then commits.
    ///
    /// A rejected transaction is dropped and the journal is left untouched.
    /// The first commit into a journal without a master adopts the account
    /// tree root as master.
    pub fn add_transaction(&mut self, mut xact: Transaction) -> Result<Uuid> {
        if self.holds_entry(xact.id) {
            return Err(JournalError::CandidateRejected {
                payee: xact.payee,
                reason: "already committed".to_string(),
            });
        }
        if let Err(failure) = self.finalizers.run(&mut xact) {
            return Err(JournalError::CandidateRejected {
                payee: xact.payee,
                reason: failure.to_string(),
            });
        }
        if !self.commodity_pool.nets_to_zero(&xact.postings) {
            return Err(JournalError::CandidateRejected {
                payee: xact.payee,
                reason: "postings do not balance".to_string(),
            });
        }
        self.adopt_root_master();
        let id = self.transactions.push(xact, self.id);
        self.was_loaded = true;
        Ok(id)
    }

    pub fn remove_transaction(&mut self, id: Uuid) -> Option<Transaction> {
        self.transactions.remove(id)
    }

    pub fn add_automated_transaction(&mut self, auto: AutomatedTransaction) -> Result<Uuid> {
        if self.holds_entry(auto.id) {
            return Err(JournalError::CandidateRejected {
                payee: format!("= {}", auto.predicate),
                reason: "already committed".to_string(),
            });
        }
        Ok(self.automated_transactions.push(auto, self.id))
    }

    pub fn remove_automated_transaction(&mut self, id: Uuid) -> Option<AutomatedTransaction> {
        self.automated_transactions.remove(id)
    }

    pub fn add_periodic_transaction(&mut self, periodic: PeriodicTransaction) -> Result<Uuid> {
        if self.holds_entry(periodic.id) {
            return Err(JournalError::CandidateRejected {
                payee: format!("~ {}", periodic.period),
                reason: "already committed".to_string(),
            });
        }
        Ok(self.periodic_transactions.push(periodic, self.id))
    }

    pub fn remove_periodic_transaction(&mut self, id: Uuid) -> Option<PeriodicTransaction> {
        self.periodic_transactions.remove(id)
    }

    fn holds_entry(&self, id: Uuid) -> bool {
        self.transactions.contains(id)
            || self.automated_transactions.contains(id)
            || self.periodic_transactions.contains(id)
    }

    fn adopt_root_master(&mut self) -> AccountId {
        let accounts = &self.accounts;
        *self
            .master
            .get_or_insert_with(|| accounts.borrow().root())
    }

    pub fn add_finalizer(&mut self, finalizer: Arc<dyn TransactionFinalizer>) {
        self.finalizers.add_hook(finalizer);
    }

    pub fn remove_finalizer(&mut self, finalizer: &Arc<dyn TransactionFinalizer>) -> bool {
        self.finalizers.remove_hook(finalizer)
    }

    /// Reads one source into the journal, adding to whatever is already loaded.
    ///
    /// Read failures leave the journal untouched. Otherwise exactly one
    /// provenance record is appended, including when a strict parse aborts.
    /// A strict abort discards every entry this call had committed and
    /// restores the previous master.
    pub fn parse<R: Read>(
        &mut self,
        mut stream: R,
        scope: &SessionScope,
        master: Option<AccountId>,
        original_path: Option<&Path>,
        strict: bool,
    ) -> Result<ParseSummary> {
        let origin = original_path
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "<stream>".to_string());

        let mut input = String::new();
        let bytes_read = stream
            .read_to_string(&mut input)
            .map_err(|source| JournalError::StructuralRead {
                origin: origin.clone(),
                source,
            })?;
        let record = match original_path {
            Some(path) => {
                ProvenanceRecord::from_path(path).map_err(|source| {
                    JournalError::StructuralRead {
                        origin: origin.clone(),
                        source,
                    }
                })?
            }
            None => ProvenanceRecord::from_stream(bytes_read as u64),
        };

        let master_before = self.master;
        let journal_master = self.adopt_root_master();
        let master = master.unwrap_or(journal_master);

        let output = {
            let mut accounts = self.accounts.borrow_mut();
            let mut ctx = ParseContext {
                accounts: &mut *accounts,
                master,
                source: original_path,
                scope,
            };
            self.parser.parse(&input, &mut ctx)
        };

        let mut summary = ParseSummary {
            diagnostics: output.diagnostics,
            ..ParseSummary::default()
        };

        if strict {
            if let Some(first) = summary.diagnostics.first() {
                let diagnostic = first.to_string();
                self.master = master_before;
                self.sources.append(record);
                tracing::warn!(source = %origin, %diagnostic, "strict parse aborted");
                return Err(JournalError::StrictModeAbort { origin, diagnostic });
            }
        }

        let committed_before = self.transactions.len();
        let automated_before = self.automated_transactions.len();
        let periodic_before = self.periodic_transactions.len();
        let was_loaded_before = self.was_loaded;

        let mut rejections = Vec::new();
        for xact in output.transactions {
            let date = xact.date;
            match self.add_transaction(xact) {
                Ok(_) => summary.added += 1,
                Err(err) => rejections.push(format!("{} on {}", err, date)),
            }
            if strict && !rejections.is_empty() {
                break;
            }
        }
        if rejections.is_empty() || !strict {
            for auto in output.automated {
                match self.add_automated_transaction(auto) {
                    Ok(_) => summary.automated += 1,
                    Err(err) => rejections.push(err.to_string()),
                }
            }
            for periodic in output.periodic {
                match self.add_periodic_transaction(periodic) {
                    Ok(_) => summary.periodic += 1,
                    Err(err) => rejections.push(err.to_string()),
                }
            }
        }

        for message in rejections {
            let diagnostic = Diagnostic::error(None, message);
            tracing::warn!(source = %origin, %diagnostic, "candidate rejected");
            if strict {
                self.transactions.truncate(committed_before);
                self.automated_transactions.truncate(automated_before);
                self.periodic_transactions.truncate(periodic_before);
                self.was_loaded = was_loaded_before;
                self.master = master_before;
                self.sources.append(record);
                return Err(JournalError::StrictModeAbort {
                    origin,
                    diagnostic: diagnostic.to_string(),
                });
            }
            summary.diagnostics.push(diagnostic);
        }

        if let Some(basket) = output.basket {
            self.basket = Some(basket);
        }

        self.sources.append(record);
        tracing::info!(
            source = %origin,
            added = summary.added,
            automated = summary.automated,
            periodic = summary.periodic,
            diagnostics = summary.diagnostics.len(),
            "source parsed"
        );
        Ok(summary)
    }

    /// Fast sanity gate over the aggregate's invariants.
    pub fn is_valid(&self) -> bool {
        if self.was_loaded && self.master.is_none() {
            tracing::debug!("journal loaded without a master account");
            return false;
        }

        let mut seen = HashSet::new();
        let all_ids = self
            .transactions
            .ids()
            .chain(self.automated_transactions.ids())
            .chain(self.periodic_transactions.ids());
        for id in all_ids {
            if !seen.insert(id) {
                tracing::debug!(entry = %id, "entry registered more than once");
                return false;
            }
        }

        let owned = self.transactions.iter().all(|x| x.owner() == Some(self.id))
            && self
                .automated_transactions
                .iter()
                .all(|x| x.owner() == Some(self.id))
            && self
                .periodic_transactions
                .iter()
                .all(|x| x.owner() == Some(self.id));
        if !owned {
            tracing::debug!("entry owned by another journal");
            return false;
        }

        let Ok(accounts) = self.accounts.try_borrow() else {
            return false;
        };
        for xact in &self.transactions {
            if !self.commodity_pool.nets_to_zero(&xact.postings) {
                tracing::debug!(xact = %xact.id, "transaction does not balance");
                return false;
            }
            let reachable = xact.postings.iter().all(|posting| {
                self.master
                    .is_some_and(|master| accounts.is_reachable(master, posting.account))
            });
            if !reachable {
                tracing::debug!(xact = %xact.id, "posting account unreachable from master");
                return false;
            }
        }
        true
    }
}
