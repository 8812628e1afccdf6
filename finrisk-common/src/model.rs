//! Statement line data model
//!
//! Raw input rows arrive as [`StatementLine`] with an accounting-formatted
//! amount string. The normalizer turns them into [`NormalizedLine`] rows that
//! every downstream engine reads.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Financial statement category
///
/// Unrecognized categories are kept verbatim in `Other` so they pass through
/// normalization unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Assets,
    Liabilities,
    Equity,
    Revenue,
    Expenses,
    Tax,
    Other(String),
}

impl Category {
    pub fn as_str(&self) -> &str {
        match self {
            Category::Assets => "Assets",
            Category::Liabilities => "Liabilities",
            Category::Equity => "Equity",
            Category::Revenue => "Revenue",
            Category::Expenses => "Expenses",
            Category::Tax => "Tax",
            Category::Other(name) => name,
        }
    }
}

impl From<String> for Category {
    fn from(value: String) -> Self {
        match value.trim() {
            "Assets" => Category::Assets,
            "Liabilities" => Category::Liabilities,
            "Equity" => Category::Equity,
            "Revenue" => Category::Revenue,
            "Expenses" => Category::Expenses,
            "Tax" => Category::Tax,
            _ => Category::Other(value),
        }
    }
}

impl From<&str> for Category {
    fn from(value: &str) -> Self {
        Category::from(value.to_string())
    }
}

impl From<Category> for String {
    fn from(value: Category) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One raw statement line (immutable input)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementLine {
    #[serde(rename = "Company")]
    pub company: String,
    #[serde(rename = "Year")]
    pub year: i32,
    #[serde(rename = "FS Category")]
    pub category: Category,
    #[serde(rename = "FS Subcategory")]
    pub subcategory: String,
    /// Accounting-formatted amount, e.g. `"1,200"` or `"(350)"`
    #[serde(rename = "Amount")]
    pub amount: String,
}

impl StatementLine {
    pub fn new(
        company: impl Into<String>,
        year: i32,
        category: impl Into<Category>,
        subcategory: impl Into<String>,
        amount: impl Into<String>,
    ) -> Self {
        Self {
            company: company.into(),
            year,
            category: category.into(),
            subcategory: subcategory.into(),
            amount: amount.into(),
        }
    }
}

/// Traceability tag for tax lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxTag {
    /// Tax charge (amount >= 0)
    Expense,
    /// Tax credit (amount < 0)
    Credit,
}

/// Statement line with a numeric amount
///
/// `amount` is `None` when the raw string could not be parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedLine {
    #[serde(rename = "Company")]
    pub company: String,
    #[serde(rename = "Year")]
    pub year: i32,
    #[serde(rename = "FS Category")]
    pub category: Category,
    #[serde(rename = "FS Subcategory")]
    pub subcategory: String,
    #[serde(rename = "Amount")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_tag: Option<TaxTag>,
}

impl NormalizedLine {
    pub fn key(&self) -> CompanyYear {
        CompanyYear::new(self.company.clone(), self.year)
    }
}

/// Company-Year key joining all engine outputs for one entity-period
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompanyYear {
    pub company: String,
    pub year: i32,
}

impl CompanyYear {
    pub fn new(company: impl Into<String>, year: i32) -> Self {
        Self {
            company: company.into(),
            year,
        }
    }
}

impl fmt::Display for CompanyYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.company, self.year)
    }
}
