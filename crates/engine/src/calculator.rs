//! Centralized financial calculator.
//!
//! A pure function from aggregated shift totals to the settlement figures:
//! gross revenue, net, company/driver shares and discounts. Which split
//! applies is data: an ordered table of [`SplitRule`]s resolved against the
//! shift's start date, so historical shifts keep settling under the rule
//! that was in force when they ran.
//!
//! No I/O happens here; everything is determined by the inputs, which keeps
//! recomputation idempotent and the math unit-testable in isolation.

use chrono::{DateTime, Utc};

use crate::money::split_basis_points;

/// One revenue-split rule, in force from `effective_from` until a later rule
/// supersedes it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitRule {
    pub effective_from: DateTime<Utc>,
    /// Company share of the net, in basis points.
    pub company_bp: i64,
    /// Driver share of the net, in basis points. Must complement
    /// `company_bp` to 10_000.
    pub driver_bp: i64,
    /// Human-readable label persisted in logs and reports ("ruleUsed").
    pub label: &'static str,
    /// When set, split-flagged costs are kept out of the net and instead
    /// deducted from each party after the split: the company absorbs this
    /// share (in basis points) of the split-cost total, the driver the
    /// remainder. When unset, split costs reduce the net exactly like
    /// normal costs and no discount is recorded.
    pub split_cost_share_bp: Option<i64>,
}

/// Aggregated inputs of one settlement run. All money in centavos.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SettlementInput {
    pub total_app: i64,
    pub total_particular: i64,
    pub custos_normais: i64,
    pub custos_divididos: i64,
    /// The shift's start timestamp; selects the applicable rule.
    pub shift_date: DateTime<Utc>,
}

/// Settlement figures for one shift. All money in centavos.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShiftFinancials {
    pub total_bruto: i64,
    pub liquido: i64,
    pub repasse_empresa: i64,
    pub repasse_motorista: i64,
    pub discount_company: i64,
    pub discount_driver: i64,
    pub rule_used: &'static str,
}

#[derive(Clone, Debug)]
pub struct FinancialCalculator {
    /// Sorted ascending by `effective_from`.
    rules: Vec<SplitRule>,
}

/// The split in force since the fleet opened: 60% company / 40% driver,
/// split costs subtracted from the net like any other cost.
const DEFAULT_RULE: SplitRule = SplitRule {
    effective_from: DateTime::UNIX_EPOCH,
    company_bp: 6_000,
    driver_bp: 4_000,
    label: "60/40 (padrão)",
    split_cost_share_bp: None,
};

impl Default for FinancialCalculator {
    fn default() -> Self {
        Self {
            rules: vec![DEFAULT_RULE],
        }
    }
}

impl FinancialCalculator {
    /// Builds a calculator from an explicit rule table.
    ///
    /// # Panics
    ///
    /// Panics if the table is empty or a rule's shares do not add up to
    /// 10_000 bp; rule tables are static configuration, so a malformed one
    /// is a programming error, not a runtime condition.
    pub fn with_rules(mut rules: Vec<SplitRule>) -> Self {
        assert!(!rules.is_empty(), "rule table must not be empty");
        for rule in &rules {
            assert_eq!(
                rule.company_bp + rule.driver_bp,
                10_000,
                "split rule {} does not cover the whole net",
                rule.label
            );
        }
        rules.sort_by_key(|rule| rule.effective_from);
        Self { rules }
    }

    /// The most recent rule not after `date`. Dates before the first rule
    /// fall back to the oldest one.
    fn rule_for(&self, date: DateTime<Utc>) -> &SplitRule {
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.effective_from <= date)
            .unwrap_or(&self.rules[0])
    }

    /// Computes the full settlement for one shift.
    ///
    /// The driver side of every split is the exact remainder of the company
    /// side, so shares always add back to the amount being divided
    /// regardless of rounding.
    pub fn calculate_shift_result(&self, input: &SettlementInput) -> ShiftFinancials {
        let rule = self.rule_for(input.shift_date);
        let total_bruto = input.total_app + input.total_particular;

        match rule.split_cost_share_bp {
            None => {
                let liquido = total_bruto - input.custos_normais - input.custos_divididos;
                let repasse_empresa = split_basis_points(liquido, rule.company_bp);
                ShiftFinancials {
                    total_bruto,
                    liquido,
                    repasse_empresa,
                    repasse_motorista: liquido - repasse_empresa,
                    discount_company: 0,
                    discount_driver: 0,
                    rule_used: rule.label,
                }
            }
            Some(share_bp) => {
                let liquido = total_bruto - input.custos_normais;
                let discount_company = split_basis_points(input.custos_divididos, share_bp);
                let discount_driver = input.custos_divididos - discount_company;
                let repasse_empresa = split_basis_points(liquido, rule.company_bp);
                ShiftFinancials {
                    total_bruto,
                    liquido,
                    repasse_empresa: repasse_empresa - discount_company,
                    repasse_motorista: (liquido - repasse_empresa) - discount_driver,
                    discount_company,
                    discount_driver,
                    rule_used: rule.label,
                }
            }
        }
    }
}
