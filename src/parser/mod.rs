//! Contract between the journal and the grammar parser that produces
//! candidate entries from raw text.

pub mod textual;

use std::{fmt, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    account::{AccountId, AccountRegistry},
    commodity::CommodityCode,
    journal::{AutomatedTransaction, PeriodicTransaction, Transaction},
};

pub use textual::TextualParser;

/// Session-wide defaults the parser consults while reading.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionScope {
    /// Commodity applied to bare quantities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_commodity: Option<CommodityCode>,
}

impl SessionScope {
    pub fn with_default_commodity(commodity: impl Into<String>) -> Self {
        Self {
            default_commodity: Some(CommodityCode::new(commodity)),
        }
    }
}

/// Account-resolution context handed to the parser for one source.
pub struct ParseContext<'a> {
    pub accounts: &'a mut dyn AccountRegistry,
    /// Account names resolve below this node.
    pub master: AccountId,
    pub source: Option<&'a Path>,
    pub scope: &'a SessionScope,
}

impl ParseContext<'_> {
    pub fn resolve_account(&mut self, name: &str) -> Option<AccountId> {
        self.accounts.find_account_from(self.master, name, true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Error,
}

/// Problem found while reading a source or committing one of its candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// 1-based line number, when known.
    pub line: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(line: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            line,
            message: message.into(),
        }
    }

    pub fn error(line: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {}: {}", line, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Everything a parser produced for one source.
#[derive(Debug, Default)]
pub struct ParseOutput {
    pub transactions: Vec<Transaction>,
    pub automated: Vec<AutomatedTransaction>,
    pub periodic: Vec<PeriodicTransaction>,
    pub diagnostics: Vec<Diagnostic>,
    /// Catch-all account declared by the source, if any.
    pub basket: Option<AccountId>,
}

/// Grammar parser consumed by [`crate::journal::Journal::parse`].
///
/// Implementations may create accounts through the context but never touch
/// the journal itself.
pub trait JournalParser {
    fn parse(&self, input: &str, ctx: &mut ParseContext<'_>) -> ParseOutput;
}
