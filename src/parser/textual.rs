//! Minimal line-oriented journal grammar.
//!
//! ```text
//! ; comment
//! bucket Assets:Checking
//!
//! 2024-01-05 * (1042) Grocer ; weekly shop
//!     Expenses:Food        42.10 USD
//!     Assets:Checking
//!
//! = ^Expenses:Food
//!     (Budget:Food)        -1 USD
//!
//! ~ Monthly
//!     Expenses:Rent        1000 USD
//!     Assets:Checking
//! ```
//!
//! Account and amount are separated by a tab or at least two spaces.
//! `(Account)` marks an unbalanced virtual posting.

use std::str::FromStr;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;

use crate::{
    commodity::Amount,
    journal::{
        AutomatedTransaction, PeriodicTransaction, Posting, TemplatePosting, Transaction,
        TransactionState,
    },
};

use super::{Diagnostic, JournalParser, ParseContext, ParseOutput};

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

#[derive(Debug, Clone, Copy, Default)]
pub struct TextualParser;

impl TextualParser {
    pub fn new() -> Self {
        Self
    }
}

enum Entry {
    Xact(Transaction),
    Automated(AutomatedTransaction),
    Periodic(PeriodicTransaction),
    /// Header was unusable; its indented lines are ignored.
    Skipping,
}

struct PostingLine {
    account: String,
    is_virtual: bool,
    amount: Option<String>,
    note: Option<String>,
}

impl JournalParser for TextualParser {
    fn parse(&self, input: &str, ctx: &mut ParseContext<'_>) -> ParseOutput {
        let mut output = ParseOutput::default();
        let mut current: Option<(usize, Entry)> = None;

        for (index, raw) in input.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim_end();

            if line.trim().is_empty() {
                flush(&mut current, &mut output);
                continue;
            }

            if raw.starts_with([' ', '\t']) {
                match current.as_mut() {
                    Some((_, entry)) => {
                        indented_line(entry, line.trim(), line_no, ctx, &mut output)
                    }
                    None => output.diagnostics.push(Diagnostic::warning(
                        Some(line_no),
                        "indented line outside of an entry",
                    )),
                }
                continue;
            }

            flush(&mut current, &mut output);

            if line.starts_with([';', '#', '*', '%', '|']) {
                continue;
            }

            if let Some(name) = line
                .strip_prefix("bucket ")
                .or_else(|| line.strip_prefix("A "))
            {
                match ctx.resolve_account(name.trim()) {
                    Some(account) => output.basket = Some(account),
                    None => output.diagnostics.push(Diagnostic::error(
                        Some(line_no),
                        format!("invalid bucket account `{}`", name.trim()),
                    )),
                }
                continue;
            }

            if let Some(predicate) = line.strip_prefix('=') {
                let predicate = predicate.trim();
                let entry = match Regex::new(predicate) {
                    Ok(_) => Entry::Automated(AutomatedTransaction::new(predicate)),
                    Err(err) => {
                        output.diagnostics.push(Diagnostic::error(
                            Some(line_no),
                            format!("invalid automated predicate `{}`: {}", predicate, err),
                        ));
                        Entry::Skipping
                    }
                };
                current = Some((line_no, entry));
                continue;
            }

            if let Some(period) = line.strip_prefix('~') {
                current = Some((
                    line_no,
                    Entry::Periodic(PeriodicTransaction::new(period.trim())),
                ));
                continue;
            }

            if line.starts_with(|c: char| c.is_ascii_digit()) {
                let entry = match parse_header(line) {
                    Ok(xact) => Entry::Xact(xact),
                    Err(message) => {
                        output
                            .diagnostics
                            .push(Diagnostic::error(Some(line_no), message));
                        Entry::Skipping
                    }
                };
                current = Some((line_no, entry));
                continue;
            }

            output.diagnostics.push(Diagnostic::warning(
                Some(line_no),
                format!("unrecognized directive `{}`", first_word(line)),
            ));
        }

        flush(&mut current, &mut output);
        output
    }
}

fn flush(current: &mut Option<(usize, Entry)>, output: &mut ParseOutput) {
    let Some((line_no, entry)) = current.take() else {
        return;
    };
    match entry {
        Entry::Xact(xact) => output.transactions.push(xact),
        Entry::Automated(auto) if auto.postings.is_empty() => output.diagnostics.push(
            Diagnostic::warning(Some(line_no), "automated transaction has no postings"),
        ),
        Entry::Automated(auto) => output.automated.push(auto),
        Entry::Periodic(periodic) if periodic.postings.is_empty() => output.diagnostics.push(
            Diagnostic::warning(Some(line_no), "periodic transaction has no postings"),
        ),
        Entry::Periodic(periodic) => output.periodic.push(periodic),
        Entry::Skipping => {}
    }
}

fn indented_line(
    entry: &mut Entry,
    text: &str,
    line_no: usize,
    ctx: &mut ParseContext<'_>,
    output: &mut ParseOutput,
) {
    if let Some(note) = text.strip_prefix(';') {
        if let Entry::Xact(xact) = entry {
            append_note(&mut xact.note, note.trim());
        }
        return;
    }
    if matches!(entry, Entry::Skipping) {
        return;
    }

    // A bad posting drops the whole entry so no partial transaction survives.
    let posting = split_posting(text);
    let Some(account) = ctx.resolve_account(&posting.account) else {
        output.diagnostics.push(Diagnostic::error(
            Some(line_no),
            format!("invalid account name `{}`", posting.account),
        ));
        *entry = Entry::Skipping;
        return;
    };
    let amount = match posting.amount.as_deref() {
        Some(raw) => match parse_amount(raw, ctx) {
            Ok(amount) => Some(amount),
            Err(message) => {
                output
                    .diagnostics
                    .push(Diagnostic::error(Some(line_no), message));
                *entry = Entry::Skipping;
                return;
            }
        },
        None => None,
    };

    match entry {
        Entry::Xact(xact) => {
            let mut line = Posting::new(account, amount);
            line.is_virtual = posting.is_virtual;
            line.note = posting.note;
            xact.add_posting(line);
        }
        Entry::Automated(auto) => auto.postings.push(TemplatePosting {
            account,
            amount,
            is_virtual: posting.is_virtual,
        }),
        Entry::Periodic(periodic) => periodic.postings.push(TemplatePosting {
            account,
            amount,
            is_virtual: posting.is_virtual,
        }),
        Entry::Skipping => {}
    }
}

fn parse_header(line: &str) -> Result<Transaction, String> {
    let (body, note) = split_note(line);
    let (date_token, rest) = body.split_once(char::is_whitespace).unwrap_or((body, ""));

    let (primary, aux) = match date_token.split_once('=') {
        Some((primary, aux)) => (primary, Some(aux)),
        None => (date_token, None),
    };
    let date = parse_date(primary)?;
    let aux_date = aux.map(parse_date).transpose()?;

    let mut rest = rest.trim_start();
    let state = if let Some(tail) = rest.strip_prefix('*') {
        rest = tail.trim_start();
        TransactionState::Cleared
    } else if let Some(tail) = rest.strip_prefix('!') {
        rest = tail.trim_start();
        TransactionState::Pending
    } else {
        TransactionState::Uncleared
    };

    let mut code = None;
    if let Some(tail) = rest.strip_prefix('(') {
        let (inner, after) = tail
            .split_once(')')
            .ok_or_else(|| "unterminated transaction code".to_string())?;
        code = Some(inner.trim().to_string());
        rest = after.trim_start();
    }

    let mut xact = Transaction::new(date, rest.trim());
    xact.aux_date = aux_date;
    xact.state = state;
    xact.code = code;
    xact.note = note;
    Ok(xact)
}

fn parse_date(token: &str) -> Result<NaiveDate, String> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(token, format).ok())
        .ok_or_else(|| format!("invalid date `{}`", token))
}

fn split_posting(text: &str) -> PostingLine {
    let (body, note) = split_note(text);
    let (account, amount) = match body.find("  ").into_iter().chain(body.find('\t')).min() {
        Some(index) => (body[..index].trim(), Some(body[index..].trim())),
        None => (body.trim(), None),
    };
    let amount = amount.filter(|raw| !raw.is_empty()).map(str::to_string);

    let (account, is_virtual) = match account
        .strip_prefix('(')
        .and_then(|inner| inner.strip_suffix(')'))
    {
        Some(inner) => (inner, true),
        None => (
            account
                .strip_prefix('[')
                .and_then(|inner| inner.strip_suffix(']'))
                .unwrap_or(account),
            false,
        ),
    };

    PostingLine {
        account: account.trim().to_string(),
        is_virtual,
        amount,
        note,
    }
}

fn parse_amount(raw: &str, ctx: &ParseContext<'_>) -> Result<Amount, String> {
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    let (quantity, commodity) = match tokens.as_slice() {
        [first, second] => match parse_quantity(first) {
            Some(quantity) => (quantity, second.to_string()),
            None => (
                parse_quantity(second).ok_or_else(|| format!("invalid amount `{}`", raw))?,
                first.to_string(),
            ),
        },
        [single] => {
            let split = single
                .find(|c: char| c.is_ascii_digit() || matches!(c, '-' | '+' | '.'))
                .unwrap_or(single.len());
            let (symbol, number) = single.split_at(split);
            let quantity =
                parse_quantity(number).ok_or_else(|| format!("invalid amount `{}`", raw))?;
            if symbol.is_empty() {
                let commodity = ctx
                    .scope
                    .default_commodity
                    .as_ref()
                    .ok_or_else(|| format!("amount `{}` has no commodity", raw))?;
                (quantity, commodity.as_str().to_string())
            } else {
                (quantity, symbol.to_string())
            }
        }
        _ => return Err(format!("invalid amount `{}`", raw)),
    };
    Ok(Amount::new(quantity, commodity))
}

fn parse_quantity(token: &str) -> Option<Decimal> {
    Decimal::from_str(&token.replace(',', "")).ok()
}

fn split_note(text: &str) -> (&str, Option<String>) {
    match text.split_once(';') {
        Some((body, note)) => (body.trim_end(), Some(note.trim().to_string())),
        None => (text, None),
    }
}

fn append_note(target: &mut Option<String>, note: &str) {
    match target {
        Some(existing) => {
            existing.push('\n');
            existing.push_str(note);
        }
        None => *target = Some(note.to_string()),
    }
}

fn first_word(line: &str) -> &str {
    line.split_whitespace().next().unwrap_or(line)
}
