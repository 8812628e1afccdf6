//! Ratio engine
//!
//! Derives the canonical ratio set per Company-Year from normalized statement
//! lines. Every division is guarded: a null operand or a null/zero denominator
//! yields a null ratio, never zero or infinity. The sanity gate in [`sanity`]
//! runs over the output before any rule engine may read it.

pub mod sanity;

use crate::normalizer::is_tax_line;
use finrisk_common::records::{DerivedAmounts, MissingDataWarning, RatioRecord, Ratios};
use finrisk_common::{Category, CompanyYear, EngineKind, NormalizedLine};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Ratio engine output for one run
#[derive(Debug, Clone, Default)]
pub struct RatioRun {
    /// One record per Company-Year, ordered by (Company, Year)
    pub records: Vec<RatioRecord>,
    /// Source lines that were absent (non-fatal)
    pub warnings: Vec<MissingDataWarning>,
}

/// Summed amounts for one Company-Year group
pub(crate) struct StatementLookup<'a> {
    lines: Vec<&'a NormalizedLine>,
}

impl<'a> StatementLookup<'a> {
    /// Sum of parsed amounts for a (category, subcategory) pair
    ///
    /// `None` when no line matches or none of the matches parsed.
    pub(crate) fn amount(&self, category: &Category, subcategory: &str) -> Option<f64> {
        sum_present(
            self.lines
                .iter()
                .copied()
                .filter(|l| &l.category == category && l.subcategory.trim() == subcategory),
        )
    }

    pub(crate) fn tax(&self) -> Option<f64> {
        sum_present(
            self.lines
                .iter()
                .copied()
                .filter(|l| is_tax_line(&l.category, &l.subcategory)),
        )
    }
}

fn sum_present<'b>(lines: impl Iterator<Item = &'b NormalizedLine>) -> Option<f64> {
    let amounts: Vec<f64> = lines.filter_map(|l| l.amount).collect();
    if amounts.is_empty() {
        None
    } else {
        Some(amounts.iter().sum())
    }
}

/// Additive aggregate: missing addends count as zero only if at least one is present
pub fn add_present(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (None, None) => None,
        _ => Some(a.unwrap_or(0.0) + b.unwrap_or(0.0)),
    }
}

/// Guarded division
pub fn safe_ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d != 0.0 => Some(n / d),
        _ => None,
    }
}

/// Source items whose absence nulls or understates at least one ratio
///
/// Non-current totals and inventory count as zero when absent next to a
/// present addend; their absence is still reported.
const TRACKED_ITEMS: [(Category, &str, &str); 11] = [
    (Category::Assets, "Current Assets", "Assets/Current Assets"),
    (Category::Assets, "Non-Current Assets", "Assets/Non-Current Assets"),
    (Category::Assets, "Inventory", "Assets/Inventory"),
    (Category::Liabilities, "Current Liabilities", "Liabilities/Current Liabilities"),
    (Category::Liabilities, "Non-Current Liabilities", "Liabilities/Non-Current Liabilities"),
    (Category::Revenue, "Revenue", "Revenue/Revenue"),
    (Category::Expenses, "COGS", "Expenses/COGS"),
    (Category::Expenses, "Operating Expenses", "Expenses/Operating Expenses"),
    (Category::Expenses, "Finance Costs", "Expenses/Finance Costs"),
    (Category::Equity, "Equity", "Equity/Equity"),
    (Category::Tax, "", "Tax"),
];

/// Group lines by Company-Year, ordered by (Company, Year)
pub(crate) fn group_statements(lines: &[NormalizedLine]) -> BTreeMap<CompanyYear, StatementLookup<'_>> {
    let mut groups: BTreeMap<CompanyYear, Vec<&NormalizedLine>> = BTreeMap::new();
    for line in lines {
        groups.entry(line.key()).or_default().push(line);
    }
    groups
        .into_iter()
        .map(|(key, lines)| (key, StatementLookup { lines }))
        .collect()
}

/// Compute ratio records for every Company-Year in the batch
pub fn compute_ratios(lines: &[NormalizedLine]) -> RatioRun {
    let mut run = RatioRun::default();

    for (key, lookup) in group_statements(lines) {

        for (category, subcategory, item) in &TRACKED_ITEMS {
            let present = if *category == Category::Tax {
                lookup.tax().is_some()
            } else {
                lookup.amount(category, subcategory).is_some()
            };
            if !present {
                let warning = MissingDataWarning {
                    company: key.company.clone(),
                    year: key.year,
                    item: *item,
                };
                warn!(company = %key.company, year = key.year, item = *item, "Missing data: source line absent");
                run.warnings.push(warning);
            }
        }

        let (metrics, derived) = derive(&lookup);
        debug!(company = %key.company, year = key.year, ?metrics, "Ratios derived");

        run.records.push(RatioRecord {
            engine: EngineKind::Ratio,
            company: key.company,
            year: key.year,
            metrics,
            derived,
        });
    }

    run
}

fn derive(lookup: &StatementLookup<'_>) -> (Ratios, DerivedAmounts) {
    let current_assets = lookup.amount(&Category::Assets, "Current Assets");
    let non_current_assets = lookup.amount(&Category::Assets, "Non-Current Assets");
    let inventory = lookup.amount(&Category::Assets, "Inventory");

    let current_liabilities = lookup.amount(&Category::Liabilities, "Current Liabilities");
    let non_current_liabilities = lookup.amount(&Category::Liabilities, "Non-Current Liabilities");

    let revenue = lookup.amount(&Category::Revenue, "Revenue");
    let cogs = lookup.amount(&Category::Expenses, "COGS");
    let opex = lookup.amount(&Category::Expenses, "Operating Expenses");
    let finance_costs = lookup.amount(&Category::Expenses, "Finance Costs");
    let tax = lookup.tax();

    let equity = lookup.amount(&Category::Equity, "Equity");

    let total_assets = add_present(current_assets, non_current_assets);
    let total_liabilities = add_present(current_liabilities, non_current_liabilities);

    let operating_profit = match (revenue, cogs, opex) {
        (Some(r), Some(c), Some(o)) => Some(r - c - o),
        _ => None,
    };
    let net_income = match (operating_profit, finance_costs, tax) {
        (Some(op), Some(f), Some(t)) => Some(op - f - t),
        _ => None,
    };

    let gross_profit = match (revenue, cogs) {
        (Some(r), Some(c)) => Some(r - c),
        _ => None,
    };
    let quick_assets = current_assets.map(|ca| ca - inventory.unwrap_or(0.0));

    let ratios = Ratios {
        current_ratio: safe_ratio(current_assets, current_liabilities),
        quick_ratio: safe_ratio(quick_assets, current_liabilities),
        gross_margin: safe_ratio(gross_profit, revenue),
        operating_margin: safe_ratio(operating_profit, revenue),
        net_margin: safe_ratio(net_income, revenue),
        debt_equity: safe_ratio(total_liabilities, equity),
        interest_coverage: safe_ratio(operating_profit, finance_costs),
        asset_turnover: safe_ratio(revenue, total_assets),
        roa: safe_ratio(net_income, total_assets),
        roe: safe_ratio(net_income, equity),
    };

    let derived = DerivedAmounts {
        total_assets,
        total_liabilities,
        operating_profit,
        net_income,
    };

    (ratios, derived)
}
