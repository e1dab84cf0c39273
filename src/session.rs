//! Session wiring: one account tree, one commodity pool and one journal
//! configured from [`JournalConfig`].

use std::{
    cell::{Ref, RefCell},
    fs::File,
    io::{BufReader, Read},
    path::{Path, PathBuf},
    rc::Rc,
    sync::Arc,
};

use crate::{
    account::AccountTree,
    commodity::CommodityPool,
    config::JournalConfig,
    errors::{JournalError, Result},
    journal::{
        ElidedAmountFinalizer, Journal, MinimumPostingsFinalizer, ParseSummary,
        PayeeRequiredFinalizer, TransactionFinalizer,
    },
    parser::{SessionScope, TextualParser},
    utils::persistence::{load_snapshot, save_snapshot, SessionSnapshot},
};

pub struct Session {
    config: JournalConfig,
    scope: SessionScope,
    accounts: Rc<RefCell<AccountTree>>,
    journal: Journal,
}

impl Session {
    pub fn new(config: JournalConfig, commodity_pool: Arc<dyn CommodityPool>) -> Result<Self> {
        let accounts = Rc::new(RefCell::new(AccountTree::new()));
        let journal = Journal::new(
            accounts.clone(),
            commodity_pool,
            Box::new(TextualParser::new()),
        );
        Self::assemble(config, accounts, journal)
    }

    /// Restores a session from a snapshot written by [`Session::save_snapshot`].
    pub fn from_snapshot(
        config: JournalConfig,
        commodity_pool: Arc<dyn CommodityPool>,
        path: &Path,
    ) -> Result<Self> {
        config.validate()?;
        let snapshot = load_snapshot(path)?;
        let accounts = Rc::new(RefCell::new(snapshot.accounts));
        let journal = Journal::restore(
            snapshot.journal,
            accounts.clone(),
            commodity_pool,
            Box::new(TextualParser::new()),
        );
        let session = Self::assemble(config, accounts, journal)?;
        tracing::info!(
            path = %path.display(),
            transactions = session.journal.len(),
            "session restored from snapshot"
        );
        Ok(session)
    }

    fn assemble(
        config: JournalConfig,
        accounts: Rc<RefCell<AccountTree>>,
        mut journal: Journal,
    ) -> Result<Self> {
        config.validate()?;
        install_finalizers(&mut journal, &config)?;
        Ok(Self {
            scope: scope_for(&config),
            config,
            accounts,
            journal,
        })
    }

    pub fn config(&self) -> &JournalConfig {
        &self.config
    }

    pub fn scope(&self) -> &SessionScope {
        &self.scope
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn journal_mut(&mut self) -> &mut Journal {
        &mut self.journal
    }

    pub fn accounts(&self) -> Ref<'_, AccountTree> {
        self.accounts.borrow()
    }

    /// Reads the journal file at `path` into the session's journal.
    pub fn read_file(&mut self, path: &Path) -> Result<ParseSummary> {
        let file = File::open(path).map_err(|source| JournalError::StructuralRead {
            origin: path.display().to_string(),
            source,
        })?;
        self.journal.parse(
            BufReader::new(file),
            &self.scope,
            None,
            Some(path),
            self.config.strict,
        )
    }

    /// Reads journal text that has no file identity, e.g. standard input.
    pub fn read_stream<R: Read>(&mut self, reader: R) -> Result<ParseSummary> {
        self.journal
            .parse(reader, &self.scope, None, None, self.config.strict)
    }

    /// Files read earlier whose size or timestamp changed since.
    pub fn stale_sources(&self) -> Vec<PathBuf> {
        self.journal.sources().stale_sources()
    }

    /// Writes the session to `path`, or to the configured snapshot file.
    pub fn save_snapshot(&self, path: Option<&Path>) -> Result<PathBuf> {
        let target = path
            .map(Path::to_path_buf)
            .or_else(|| self.config.snapshot_file.clone())
            .ok_or_else(|| JournalError::Config("no snapshot file configured".into()))?;
        let snapshot = SessionSnapshot::new(self.accounts.borrow().clone(), self.journal.snapshot());
        save_snapshot(&snapshot, &target)?;
        tracing::info!(path = %target.display(), "session snapshot saved");
        Ok(target)
    }
}

fn scope_for(config: &JournalConfig) -> SessionScope {
    match config.default_commodity.as_deref() {
        Some(code) => SessionScope::with_default_commodity(code),
        None => SessionScope::default(),
    }
}

fn install_finalizers(journal: &mut Journal, config: &JournalConfig) -> Result<()> {
    for name in &config.finalizers {
        let finalizer: Arc<dyn TransactionFinalizer> = match name.as_str() {
            "elided-amount" => Arc::new(ElidedAmountFinalizer),
            "minimum-postings" => Arc::new(MinimumPostingsFinalizer),
            "payee-required" => Arc::new(PayeeRequiredFinalizer),
            other => {
                return Err(JournalError::Config(format!(
                    "unknown finalizer `{}`",
                    other
                )))
            }
        };
        journal.add_finalizer(finalizer);
    }
    Ok(())
}
