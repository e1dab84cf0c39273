//! Finalizer hook chain: ordered validation and derivation steps that every
//! candidate transaction passes before it is committed.

use std::{collections::BTreeMap, fmt, sync::Arc};

use rust_decimal::Decimal;

use crate::{commodity::CommodityCode, errors::FinalizeError};

use super::transaction::Transaction;

/// Pluggable step run on each candidate transaction.
///
/// A finalizer may mutate the transaction. When any finalizer fails the
/// transaction is discarded, so derivations need not be reversible.
pub trait TransactionFinalizer: Send + Sync {
    /// Finalizer name for logging/debugging
    fn name(&self) -> &str;

    fn process(&self, xact: &mut Transaction) -> Result<(), FinalizeError>;
}

/// First failure reported by a chain run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainFailure {
    pub finalizer: String,
    pub reason: String,
}

impl fmt::Display for ChainFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.finalizer, self.reason)
    }
}

/// Finalizers in registration order.
#[derive(Clone, Default)]
pub struct FinalizerChain {
    hooks: Vec<Arc<dyn TransactionFinalizer>>,
}

impl fmt::Debug for FinalizerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.hooks.iter().map(|hook| hook.name()))
            .finish()
    }
}

impl FinalizerChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_hook(&mut self, hook: Arc<dyn TransactionFinalizer>) {
        self.hooks.push(hook);
    }

    /// Removes the first registration of `hook` (compared by handle identity).
    pub fn remove_hook(&mut self, hook: &Arc<dyn TransactionFinalizer>) -> bool {
        match self.hooks.iter().position(|h| Arc::ptr_eq(h, hook)) {
            Some(index) => {
                self.hooks.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Runs every finalizer in order, stopping at the first failure.
    pub fn run(&self, xact: &mut Transaction) -> Result<(), ChainFailure> {
        for hook in &self.hooks {
            match hook.process(xact) {
                Ok(()) => {
                    tracing::debug!(finalizer = hook.name(), xact = %xact.id, "finalizer passed");
                }
                Err(err) => {
                    tracing::debug!(
                        finalizer = hook.name(),
                        xact = %xact.id,
                        reason = %err,
                        "finalizer rejected transaction"
                    );
                    return Err(ChainFailure {
                        finalizer: hook.name().to_string(),
                        reason: err.reason,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Fills the single posting without an amount with the negated balance of
/// the others. The others must share one commodity.
#[derive(Debug, Default)]
pub struct ElidedAmountFinalizer;

impl TransactionFinalizer for ElidedAmountFinalizer {
    fn name(&self) -> &str {
        "elided-amount"
    }

    fn process(&self, xact: &mut Transaction) -> Result<(), FinalizeError> {
        let mut elided = xact
            .postings
            .iter()
            .enumerate()
            .filter(|(_, p)| p.must_balance() && p.amount.is_none())
            .map(|(index, _)| index);
        let Some(target) = elided.next() else {
            return Ok(());
        };
        if elided.next().is_some() {
            return Err(FinalizeError::new("only one posting may omit its amount"));
        }

        let mut sums: BTreeMap<CommodityCode, Decimal> = BTreeMap::new();
        for amount in xact
            .postings
            .iter()
            .filter(|p| p.must_balance())
            .filter_map(|p| p.amount.as_ref())
        {
            *sums.entry(amount.commodity.clone()).or_default() += amount.quantity;
        }
        let mut residual = sums.into_iter().filter(|(_, sum)| !sum.is_zero());
        let fill = match (residual.next(), residual.next()) {
            (Some((commodity, sum)), None) => crate::commodity::Amount {
                quantity: -sum,
                commodity,
            },
            (None, _) => {
                return Err(FinalizeError::new(
                    "cannot infer an amount: other postings already balance",
                ))
            }
            (Some(_), Some(_)) => {
                return Err(FinalizeError::new(
                    "cannot infer an amount across several commodities",
                ))
            }
        };
        xact.postings[target].amount = Some(fill);
        Ok(())
    }
}

/// Rejects transactions with fewer than two postings.
#[derive(Debug, Default)]
pub struct MinimumPostingsFinalizer;

impl TransactionFinalizer for MinimumPostingsFinalizer {
    fn name(&self) -> &str {
        "minimum-postings"
    }

    fn process(&self, xact: &mut Transaction) -> Result<(), FinalizeError> {
        if xact.postings.len() < 2 {
            return Err(FinalizeError::new(format!(
                "expected at least two postings, found {}",
                xact.postings.len()
            )));
        }
        Ok(())
    }
}

/// Rejects transactions with a blank payee.
#[derive(Debug, Default)]
pub struct PayeeRequiredFinalizer;

impl TransactionFinalizer for PayeeRequiredFinalizer {
    fn name(&self) -> &str {
        "payee-required"
    }

    fn process(&self, xact: &mut Transaction) -> Result<(), FinalizeError> {
        if xact.payee.trim().is_empty() {
            return Err(FinalizeError::new("payee is empty"));
        }
        Ok(())
    }
}
