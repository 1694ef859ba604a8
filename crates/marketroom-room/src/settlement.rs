//! Round settlement: turns everyone's submissions into company growth and
//! player payouts.
//!
//! Pure and deterministic: the same submissions always settle to the same
//! numbers, independent of map iteration order.

use std::collections::{BTreeMap, HashMap};

use marketroom_protocol::PlayerId;

/// One player's amounts for one round, keyed by company name.
pub type Submission = BTreeMap<String, u64>;

/// Settled figures for one company.
#[derive(Debug, Clone, PartialEq)]
pub struct CompanyOutcome {
    pub name: String,
    pub total_investment: u64,
    /// Percent, always within `0.0..=max_growth`.
    pub growth: f64,
}

/// Result of settling a round.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    /// Same order as the company list passed in.
    pub companies: Vec<CompanyOutcome>,
    pub grand_total: u64,
    /// Payout per submitting player.
    pub final_values: HashMap<PlayerId, f64>,
}

impl Settlement {
    pub fn growth_of(&self, company: &str) -> Option<f64> {
        self.companies
            .iter()
            .find(|c| c.name == company)
            .map(|c| c.growth)
    }
}

/// Settles a round.
///
/// - `total_investment` of a company is the sum of every player's amount
///   for it.
/// - `growth = total_investment * max_growth / grand_total`, or `0` when
///   nothing was invested at all.
/// - a player's final value is `Σ amount * (100 + growth) / 100` over the
///   companies they backed.
///
/// Amounts for names not in `companies` are ignored.
pub fn settle(
    companies: &[String],
    submissions: &HashMap<PlayerId, Submission>,
    max_growth: f64,
) -> Settlement {
    let totals: Vec<u64> = companies
        .iter()
        .map(|name| {
            submissions
                .values()
                .filter_map(|sub| sub.get(name))
                .fold(0u64, |acc, amount| acc.saturating_add(*amount))
        })
        .collect();

    let grand_total = totals
        .iter()
        .fold(0u64, |acc, total| acc.saturating_add(*total));

    let outcomes: Vec<CompanyOutcome> = companies
        .iter()
        .zip(&totals)
        .map(|(name, &total)| CompanyOutcome {
            name: name.clone(),
            total_investment: total,
            growth: growth_share(total, grand_total, max_growth),
        })
        .collect();

    let final_values = submissions
        .iter()
        .map(|(player, sub)| {
            let value = outcomes
                .iter()
                .filter_map(|c| sub.get(&c.name).map(|amount| (*amount, c.growth)))
                .map(|(amount, growth)| amount as f64 * (100.0 + growth) / 100.0)
                .sum();
            (*player, value)
        })
        .collect();

    Settlement {
        companies: outcomes,
        grand_total,
        final_values,
    }
}

fn growth_share(total: u64, grand_total: u64, max_growth: f64) -> f64 {
    if grand_total == 0 {
        return 0.0;
    }
    // Multiply before dividing so whole-number shares stay exact.
    (total as f64 * max_growth / grand_total as f64).clamp(0.0, max_growth)
}
