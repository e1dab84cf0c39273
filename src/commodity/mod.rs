use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::journal::Posting;

/// Commodity symbol such as `USD`, `EUR` or `AAPL`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct CommodityCode(pub String);

impl CommodityCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CommodityCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A quantity of one commodity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Amount {
    pub quantity: Decimal,
    pub commodity: CommodityCode,
}

impl Amount {
    pub fn new(quantity: Decimal, commodity: impl Into<String>) -> Self {
        Self {
            quantity,
            commodity: CommodityCode::new(commodity),
        }
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.quantity, self.commodity)
    }
}

/// Commodity normalization service shared between journals.
pub trait CommodityPool: Send + Sync {
    /// Whether the balancing postings net to zero across commodities.
    fn nets_to_zero(&self, postings: &[Posting]) -> bool;

    /// Display precision used when comparing quantities to zero.
    fn precision(&self, commodity: &CommodityCode) -> Option<u32>;
}

/// Conversion between two commodities: one `from` equals `rate` of `to`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRate {
    pub from: CommodityCode,
    pub to: CommodityCode,
    pub rate: Decimal,
}

impl ConversionRate {
    pub fn inverse(&self) -> Option<Self> {
        if self.rate.is_zero() {
            return None;
        }
        Some(Self {
            from: self.to.clone(),
            to: self.from.clone(),
            rate: Decimal::ONE / self.rate,
        })
    }
}

/// In-memory commodity pool holding display precisions and conversion rates.
///
/// Balancing rules:
/// - every posting that takes part in balancing must carry an amount;
/// - per-commodity sums are rounded to the commodity precision when known;
/// - a single non-zero commodity never balances;
/// - two non-zero commodities with no known rate balance as an implicit
///   exchange between them;
/// - otherwise every non-zero sum is converted into the first commodity and
///   the total must round to zero.
#[derive(Debug, Clone, Default)]
pub struct CommodityBook {
    precisions: HashMap<CommodityCode, u32>,
    rates: HashMap<(CommodityCode, CommodityCode), Decimal>,
}

impl CommodityBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_precision(&mut self, commodity: impl Into<String>, precision: u32) {
        self.precisions
            .insert(CommodityCode::new(commodity), precision);
    }

    pub fn add_rate(&mut self, rate: ConversionRate) {
        if let Some(inverse) = rate.inverse() {
            self.rates
                .insert((inverse.from.clone(), inverse.to.clone()), inverse.rate);
        }
        self.rates.insert((rate.from, rate.to), rate.rate);
    }

    pub fn lookup_rate(&self, from: &CommodityCode, to: &CommodityCode) -> Option<Decimal> {
        if from == to {
            return Some(Decimal::ONE);
        }
        self.rates.get(&(from.clone(), to.clone())).copied()
    }

    fn rounded(&self, commodity: &CommodityCode, quantity: Decimal) -> Decimal {
        match self.precision(commodity) {
            Some(dp) => quantity.round_dp(dp),
            None => quantity,
        }
    }
}

impl CommodityPool for CommodityBook {
    fn nets_to_zero(&self, postings: &[Posting]) -> bool {
        let mut order: Vec<CommodityCode> = Vec::new();
        let mut sums: BTreeMap<CommodityCode, Decimal> = BTreeMap::new();
        for posting in postings.iter().filter(|p| p.must_balance()) {
            let Some(amount) = posting.amount.as_ref() else {
                return false;
            };
            if !sums.contains_key(&amount.commodity) {
                order.push(amount.commodity.clone());
            }
            *sums.entry(amount.commodity.clone()).or_default() += amount.quantity;
        }

        let residual: Vec<(CommodityCode, Decimal)> = order
            .into_iter()
            .filter_map(|code| {
                let sum = sums.get(&code).copied().unwrap_or_default();
                let rounded = self.rounded(&code, sum);
                (!rounded.is_zero()).then_some((code, sum))
            })
            .collect();

        match residual.as_slice() {
            [] => true,
            [_] => false,
            [(first, _), rest @ ..] => {
                let known = rest
                    .iter()
                    .all(|(code, _)| self.lookup_rate(code, first).is_some());
                if !known {
                    return residual.len() == 2;
                }
                let total: Decimal = residual
                    .iter()
                    .map(|(code, sum)| {
                        *sum * self.lookup_rate(code, first).unwrap_or(Decimal::ONE)
                    })
                    .sum();
                self.rounded(first, total).is_zero()
            }
        }
    }

    fn precision(&self, commodity: &CommodityCode) -> Option<u32> {
        self.precisions.get(commodity).copied()
    }
}
