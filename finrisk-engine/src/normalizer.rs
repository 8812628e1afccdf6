//! Statement normalizer
//!
//! Cleans accounting-formatted amount strings into signed numerics and applies
//! category-aware sign conventions so downstream arithmetic can subtract
//! expense magnitudes uniformly.

use finrisk_common::{Category, NormalizedLine, StatementLine, TaxTag};
use tracing::debug;

/// Expense subcategories forced to absolute magnitude
const MAGNITUDE_EXPENSES: [&str; 3] = ["COGS", "Operating Expenses", "Finance Costs"];

/// Parse an accounting-formatted amount
///
/// Strips thousands separators, turns `(x)` into `-x`. Returns `None` for
/// empty, dash-only, unparsable or non-finite input.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter_map(|c| match c {
            ',' | ')' => None,
            '(' => Some('-'),
            other => Some(other),
        })
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "-" {
        return None;
    }

    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// True for lines carrying tax (the `Tax` category or `Expenses/Tax`)
pub fn is_tax_line(category: &Category, subcategory: &str) -> bool {
    match category {
        Category::Tax => true,
        Category::Expenses => subcategory.trim() == "Tax",
        _ => false,
    }
}

/// Normalize one statement line
pub fn normalize_line(line: &StatementLine) -> NormalizedLine {
    let parsed = parse_amount(&line.amount);
    if parsed.is_none() {
        debug!(
            company = %line.company,
            year = line.year,
            category = %line.category,
            subcategory = %line.subcategory,
            raw = %line.amount,
            "Unparsable amount coerced to null"
        );
    }

    let subcategory = line.subcategory.trim();
    let mut tax_tag = None;
    let amount = match &line.category {
        Category::Revenue => parsed.map(f64::abs),
        _ if is_tax_line(&line.category, subcategory) => {
            tax_tag = parsed.map(|v| if v < 0.0 { TaxTag::Credit } else { TaxTag::Expense });
            parsed
        }
        Category::Expenses if MAGNITUDE_EXPENSES.contains(&subcategory) => parsed.map(f64::abs),
        _ => parsed,
    };

    NormalizedLine {
        company: line.company.clone(),
        year: line.year,
        category: line.category.clone(),
        subcategory: line.subcategory.clone(),
        amount,
        tax_tag,
    }
}

/// Normalize a batch of statement lines (order preserved)
pub fn normalize(lines: &[StatementLine]) -> Vec<NormalizedLine> {
    let normalized: Vec<NormalizedLine> = lines.iter().map(normalize_line).collect();
    let unparsed = normalized.iter().filter(|l| l.amount.is_none()).count();
    debug!(
        lines = normalized.len(),
        unparsed,
        "Normalized statement lines"
    );
    normalized
}
