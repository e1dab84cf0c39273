mod common;

use std::{
    io::{self, Cursor, Read},
    sync::{Arc, Mutex},
};

use common::{new_journal, transfer, write_source, SOURCE_A, SOURCE_B};
use journal_core::{
    account::{Account, AccountRegistry},
    commodity::{Amount, CommodityBook},
    errors::{FinalizeError, JournalError},
    journal::{
        AutomatedTransaction, ElidedAmountFinalizer, Journal, PeriodicTransaction,
        TemplatePosting, Transaction, TransactionFinalizer,
    },
    parser::{SessionScope, TextualParser},
};
use rust_decimal_macros::dec;
use tempfile::tempdir;

struct FailingReader;

impl Read for FailingReader {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))
    }
}

struct Recorder {
    label: &'static str,
    reject: bool,
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl TransactionFinalizer for Recorder {
    fn name(&self) -> &str {
        self.label
    }

    fn process(&self, _xact: &mut Transaction) -> Result<(), FinalizeError> {
        self.calls.lock().expect("lock recorder log").push(self.label);
        if self.reject {
            Err(FinalizeError::new(format!("{} refused", self.label)))
        } else {
            Ok(())
        }
    }
}

#[test]
fn incremental_load_scenario_with_strict_rollback() {
    let dir = tempdir().unwrap();
    let path_a = write_source(dir.path(), "a.ledger", SOURCE_A);
    let (mut journal, _accounts) = new_journal();
    journal.add_finalizer(Arc::new(ElidedAmountFinalizer));
    let scope = SessionScope::default();

    let file = std::fs::File::open(&path_a).unwrap();
    let first = journal
        .parse(file, &scope, None, Some(&path_a), false)
        .expect("source A parses");
    assert_eq!(first.added, 3);
    assert_eq!(journal.len(), 3);
    assert_eq!(journal.sources().len(), 1);
    assert!(journal.was_loaded());
    assert!(journal.is_valid());

    let second = journal
        .parse(Cursor::new(SOURCE_B), &scope, None, None, false)
        .expect("source B parses");
    assert_eq!(second.added, 1);
    assert_eq!(second.diagnostics.len(), 1);
    assert_eq!(journal.len(), 4);
    assert_eq!(journal.sources().len(), 2);

    let strict = journal.parse(Cursor::new(SOURCE_B), &scope, None, None, true);
    assert!(matches!(strict, Err(JournalError::StrictModeAbort { .. })));
    assert_eq!(journal.len(), 4, "strict abort rolls back its own commits");
    assert_eq!(journal.sources().len(), 3);
    assert!(journal.is_valid());
}

#[test]
fn provenance_distinguishes_files_from_streams() {
    let dir = tempdir().unwrap();
    let path = write_source(dir.path(), "main.ledger", SOURCE_A);
    let (mut journal, _accounts) = new_journal();
    journal.add_finalizer(Arc::new(ElidedAmountFinalizer));
    let scope = SessionScope::default();

    journal
        .parse(std::fs::File::open(&path).unwrap(), &scope, None, Some(&path), false)
        .unwrap();
    journal
        .parse(Cursor::new(SOURCE_B), &scope, None, None, false)
        .unwrap();

    let records: Vec<_> = journal.sources().iter().collect();
    assert!(!records[0].is_from_stream());
    assert_eq!(records[0].source_path(), Some(path.as_path()));
    assert_eq!(records[0].byte_size(), SOURCE_A.len() as u64);
    assert!(records[1].is_from_stream());
    assert_eq!(records[1].source_path(), None);
    assert_eq!(records[1].byte_size(), SOURCE_B.len() as u64);
}

#[test]
fn unreadable_stream_leaves_journal_untouched() {
    let (mut journal, _accounts) = new_journal();
    let scope = SessionScope::default();

    let err = journal
        .parse(FailingReader, &scope, None, None, false)
        .unwrap_err();
    assert!(matches!(err, JournalError::StructuralRead { .. }));
    assert!(journal.is_empty());
    assert!(journal.sources().is_empty());
    assert!(!journal.was_loaded());
}

#[test]
fn unresolvable_source_path_is_structural() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("gone.ledger");
    let (mut journal, _accounts) = new_journal();

    let err = journal
        .parse(
            Cursor::new(SOURCE_B),
            &SessionScope::default(),
            None,
            Some(&missing),
            false,
        )
        .unwrap_err();
    assert!(matches!(err, JournalError::StructuralRead { .. }));
    assert!(journal.is_empty());
    assert!(journal.sources().is_empty());
}

#[test]
fn strict_parse_aborts_on_parser_diagnostics_before_committing() {
    let (mut journal, _accounts) = new_journal();
    let input = "\
2024-03-01 Bakery
    Expenses:Food   3.00 USD
    Assets:Cash    -3.00 USD

unknown directive
";
    let err = journal
        .parse(Cursor::new(input), &SessionScope::default(), None, None, true)
        .unwrap_err();
    assert!(matches!(err, JournalError::StrictModeAbort { .. }));
    assert!(journal.is_empty());
    assert!(!journal.was_loaded());
    assert_eq!(journal.master(), None);
    assert_eq!(journal.sources().len(), 1);

    let lenient = journal
        .parse(Cursor::new(input), &SessionScope::default(), None, None, false)
        .unwrap();
    assert_eq!(lenient.added, 1);
    assert_eq!(lenient.diagnostics.len(), 1);
}

#[test]
fn templates_bypass_the_finalizer_chain() {
    let (mut journal, _accounts) = new_journal();
    let calls = Arc::new(Mutex::new(Vec::new()));
    journal.add_finalizer(Arc::new(Recorder {
        label: "gate",
        reject: true,
        calls: calls.clone(),
    }));
    let input = "\
= ^Expenses
    (Budget)   -1 USD

~ Monthly
    Expenses:Rent   900 USD
    Assets:Checking
";
    let summary = journal
        .parse(Cursor::new(input), &SessionScope::default(), None, None, false)
        .unwrap();
    assert_eq!(summary.automated, 1);
    assert_eq!(summary.periodic, 1);
    assert_eq!(journal.automated_transactions().len(), 1);
    assert_eq!(journal.periodic_transactions().len(), 1);
    assert!(calls.lock().unwrap().is_empty());
    assert!(journal.is_valid());
}

#[test]
fn master_override_scopes_account_resolution() {
    let (mut journal, accounts) = new_journal();
    let personal = journal.add_account(Account::new("Personal"));
    let input = "\
2024-04-01 Bookshop
    Expenses:Books   12 USD
    Assets:Cash     -12 USD
";
    journal
        .parse(
            Cursor::new(input),
            &SessionScope::default(),
            Some(personal),
            None,
            false,
        )
        .unwrap();

    let xact = journal.transactions().iter().next().unwrap();
    let name = accounts.borrow().full_name(xact.postings[0].account);
    assert_eq!(name.as_deref(), Some("Personal:Expenses:Books"));
    assert_eq!(journal.master(), Some(accounts.borrow().root()));
    assert!(journal.is_valid());
}

#[test]
fn bucket_directive_sets_basket() {
    let (mut journal, _accounts) = new_journal();
    journal
        .parse(
            Cursor::new("bucket Assets:Checking\n"),
            &SessionScope::default(),
            None,
            None,
            false,
        )
        .unwrap();
    let basket = journal.basket().expect("basket set");
    assert_eq!(journal.find_account("Assets:Checking", false), Some(basket));

    journal.set_basket(None);
    assert_eq!(journal.basket(), None);
}

#[test]
fn balanced_transaction_is_committed_and_keeps_journal_valid() {
    let (mut journal, accounts) = new_journal();
    journal.set_master(Some(accounts.borrow().root()));
    let xact = transfer(&journal, "Payroll", "Income:Salary", "Assets:Bank", dec!(2500), dec!(2500));

    let id = journal.add_transaction(xact).expect("balanced");
    assert_eq!(journal.len(), 1);
    assert!(journal.was_loaded());
    assert_eq!(
        journal.transactions().get(id).and_then(|x| x.journal()),
        Some(journal.id())
    );
    assert!(journal.is_valid());
}

#[test]
fn unbalanced_transaction_is_rejected_atomically() {
    let (mut journal, _accounts) = new_journal();
    let xact = transfer(&journal, "Typo", "Assets:Cash", "Expenses:Books", dec!(20), dec!(18));

    let err = journal.add_transaction(xact).unwrap_err();
    assert!(matches!(err, JournalError::CandidateRejected { .. }));
    assert!(journal.is_empty());
    assert!(!journal.was_loaded());
}

#[test]
fn add_then_remove_restores_registry() {
    let (mut journal, accounts) = new_journal();
    journal.set_master(Some(accounts.borrow().root()));
    let first = transfer(&journal, "Rent", "Assets:Bank", "Expenses:Rent", dec!(900), dec!(900));
    journal.add_transaction(first).unwrap();
    let before: Vec<_> = journal.transactions().ids().collect();

    let extra = transfer(&journal, "Gym", "Assets:Bank", "Expenses:Gym", dec!(30), dec!(30));
    let id = journal.add_transaction(extra).unwrap();
    let removed = journal.remove_transaction(id).expect("present");

    assert_eq!(removed.journal(), None);
    assert_eq!(journal.transactions().ids().collect::<Vec<_>>(), before);
    assert!(journal.remove_transaction(id).is_none());
    assert!(journal.is_valid());
}

#[test]
fn failing_finalizer_stops_the_chain() {
    let (mut journal, _accounts) = new_journal();
    let calls = Arc::new(Mutex::new(Vec::new()));
    journal.add_finalizer(Arc::new(Recorder {
        label: "A",
        reject: true,
        calls: calls.clone(),
    }));
    journal.add_finalizer(Arc::new(Recorder {
        label: "B",
        reject: false,
        calls: calls.clone(),
    }));

    let xact = transfer(&journal, "Cinema", "Assets:Cash", "Expenses:Fun", dec!(12), dec!(12));
    let err = journal.add_transaction(xact).unwrap_err();

    match err {
        JournalError::CandidateRejected { reason, .. } => assert!(reason.contains("A refused")),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(*calls.lock().unwrap(), vec!["A"]);
    assert!(journal.is_empty());
}

#[test]
fn removed_finalizer_is_no_longer_invoked() {
    let (mut journal, _accounts) = new_journal();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let recorder: Arc<dyn TransactionFinalizer> = Arc::new(Recorder {
        label: "gate",
        reject: true,
        calls: calls.clone(),
    });
    journal.add_finalizer(recorder.clone());
    assert!(journal.remove_finalizer(&recorder));
    assert_eq!(journal.finalizer_count(), 0);

    let xact = transfer(&journal, "Tea", "Assets:Cash", "Expenses:Tea", dec!(3), dec!(3));
    journal.add_transaction(xact).expect("no finalizer left to refuse");
    assert!(calls.lock().unwrap().is_empty());
}

#[test]
fn removing_a_posted_account_invalidates_the_journal() {
    let (mut journal, accounts) = new_journal();
    journal.set_master(Some(accounts.borrow().root()));
    let xact = transfer(&journal, "Dinner", "Assets:Cash", "Expenses:Dining", dec!(40), dec!(40));
    journal.add_transaction(xact).unwrap();
    assert!(journal.is_valid());

    let dining = journal.find_account("Expenses:Dining", false).unwrap();
    assert!(journal.remove_account(dining));
    assert!(!journal.is_valid());
}

#[test]
fn first_balanced_add_keeps_journal_valid() {
    let (mut journal, accounts) = new_journal();
    assert!(journal.is_valid());
    let xact = transfer(&journal, "Lunch", "Assets:Cash", "Expenses:Food", dec!(9), dec!(9));
    journal.add_transaction(xact).unwrap();

    assert_eq!(journal.master(), Some(accounts.borrow().root()));
    assert!(journal.is_valid());

    journal.set_master(None);
    assert!(!journal.is_valid());
}

#[test]
fn committed_transaction_cannot_be_added_twice() {
    let (mut journal, _accounts) = new_journal();
    let xact = transfer(&journal, "Rent", "Assets:Bank", "Expenses:Rent", dec!(900), dec!(900));
    let id = journal.add_transaction(xact.clone()).unwrap();

    let err = journal.add_transaction(xact).unwrap_err();
    match err {
        JournalError::CandidateRejected { reason, .. } => assert_eq!(reason, "already committed"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(journal.len(), 1);
    assert!(journal.is_valid());

    journal.remove_transaction(id).unwrap();
    assert!(journal.is_empty());
    assert!(!journal.transactions().contains(id));
}

#[test]
fn template_ids_are_unique_across_registries() {
    let (mut journal, _accounts) = new_journal();
    let budget = journal.find_account("Budget:Food", true).unwrap();
    let rent = journal.find_account("Expenses:Rent", true).unwrap();

    let auto = AutomatedTransaction::new("^Expenses:Food")
        .with_posting(TemplatePosting {
            account: budget,
            amount: Some(Amount::new(dec!(-1), "USD")),
            is_virtual: true,
        });
    let auto_id = journal.add_automated_transaction(auto.clone()).unwrap();
    assert!(journal.add_automated_transaction(auto).is_err());

    let mut periodic = PeriodicTransaction::new("Monthly").with_posting(TemplatePosting {
        account: rent,
        amount: Some(Amount::new(dec!(900), "USD")),
        is_virtual: false,
    });
    periodic.id = auto_id;
    assert!(matches!(
        journal.add_periodic_transaction(periodic.clone()),
        Err(JournalError::CandidateRejected { .. })
    ));

    periodic.id = uuid::Uuid::new_v4();
    let periodic_id = journal.add_periodic_transaction(periodic).unwrap();
    assert_eq!(journal.automated_transactions().len(), 1);
    assert_eq!(journal.periodic_transactions().len(), 1);
    assert!(journal.is_valid());

    assert!(journal.remove_automated_transaction(auto_id).is_some());
    assert!(journal.remove_periodic_transaction(periodic_id).is_some());
    assert!(journal.automated_transactions().is_empty());
    assert!(journal.periodic_transactions().is_empty());
}

#[test]
fn restored_snapshot_with_duplicate_entry_is_invalid() {
    let (mut journal, accounts) = new_journal();
    let xact = transfer(&journal, "Gym", "Assets:Bank", "Expenses:Gym", dec!(30), dec!(30));
    journal.add_transaction(xact.clone()).unwrap();

    let mut snapshot = journal.snapshot();
    snapshot.transactions.push(xact, journal.id());
    let restored = Journal::restore(
        snapshot,
        accounts.clone(),
        Arc::new(CommodityBook::new()),
        Box::new(TextualParser::new()),
    );
    assert_eq!(restored.len(), 2);
    assert!(!restored.is_valid());
}

#[test]
fn strict_abort_on_a_fresh_journal_leaves_master_unset() {
    let (mut journal, _accounts) = new_journal();
    journal.add_finalizer(Arc::new(ElidedAmountFinalizer));

    let err = journal
        .parse(Cursor::new(SOURCE_B), &SessionScope::default(), None, None, true)
        .unwrap_err();
    assert!(matches!(err, JournalError::StrictModeAbort { .. }));
    assert!(journal.is_empty());
    assert_eq!(journal.master(), None);
    assert!(!journal.was_loaded());
    assert!(journal.is_valid());
}

#[test]
fn account_pattern_lookup_is_delegated() {
    let (journal, _accounts) = new_journal();
    let savings = journal.find_account("Assets:Savings", true).unwrap();
    assert_eq!(journal.find_account_re("Sav").unwrap(), Some(savings));
    assert_eq!(journal.find_account_re("^Income").unwrap(), None);
    assert!(matches!(
        journal.find_account_re("("),
        Err(JournalError::InvalidPattern(_))
    ));
    assert_eq!(journal.find_account("Liabilities:Card", false), None);
}
