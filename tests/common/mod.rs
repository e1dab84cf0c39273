#![allow(dead_code)]

use std::{
    cell::RefCell,
    fs,
    path::{Path, PathBuf},
    rc::Rc,
    sync::Arc,
};

use chrono::NaiveDate;
use journal_core::{
    account::AccountTree,
    commodity::{Amount, CommodityBook},
    journal::{Journal, Posting, Transaction},
    parser::TextualParser,
};
use rust_decimal::Decimal;

/// Builds an empty journal over a fresh account tree.
pub fn new_journal() -> (Journal, Rc<RefCell<AccountTree>>) {
    let accounts = Rc::new(RefCell::new(AccountTree::new()));
    let journal = Journal::new(
        accounts.clone(),
        Arc::new(CommodityBook::new()),
        Box::new(TextualParser::new()),
    );
    (journal, accounts)
}

pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, day).expect("valid day")
}

/// Two-posting USD transaction moving `amount` from `from` to `to`.
pub fn transfer(
    journal: &Journal,
    payee: &str,
    from: &str,
    to: &str,
    debit: Decimal,
    credit: Decimal,
) -> Transaction {
    let to = journal.find_account(to, true).expect("to account");
    let from = journal.find_account(from, true).expect("from account");
    Transaction::new(date(1), payee)
        .with_posting(Posting::new(to, Some(Amount::new(debit, "USD"))))
        .with_posting(Posting::new(from, Some(Amount::new(-credit, "USD"))))
}

pub fn write_source(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write journal source");
    path
}

pub const SOURCE_A: &str = "\
2024-01-01 * Opening balance
    Assets:Checking        1000.00 USD
    Equity:Opening

2024-01-03 Grocer
    Expenses:Food            42.10 USD
    Assets:Checking

2024-01-05 Landlord
    Expenses:Rent           900.00 USD
    Assets:Checking        -900.00 USD
";

pub const SOURCE_B: &str = "\
2024-02-01 Coffee shop
    Expenses:Coffee           4.50 USD
    Assets:Cash              -4.50 USD

2024-02-02 Typo
    Expenses:Books           20.00 USD
    Assets:Cash             -18.00 USD
";
