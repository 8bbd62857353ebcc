use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::apperror::{ApplicationError, ErrorType};

/***************** Demographic models *********************/

/**
 * Population totals for the whole village.
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulationRecord {
    /**
     * Always male + female. Recomputed on every write.
     */
    pub total: i64,
    pub male: i64,
    pub female: i64,
    pub last_updated: DateTime<Utc>,
}

impl PopulationRecord {
    /**
     * Creates a population record with the total derived from the gender counts.
     *
     * # Arguments
     * `male`: Number of male residents.
     * `female`: Number of female residents.
     */
    pub fn new(male: i64, female: i64) -> Self {
        PopulationRecord { total: male.saturating_add(female), male, female, last_updated: Utc::now() }
    }
}

/**
 * Records that carry a male/female split and a derived total.
 */
pub trait GenderedCount {
    fn male(&self) -> i64;
    fn female(&self) -> i64;
    fn set_total(&mut self, total: i64);

    /**
     * Restores the invariant total == male + female.
     */
    fn recompute_total(&mut self) {
        let total = self.male().saturating_add(self.female());
        self.set_total(total);
    }
}

/**
 * Number of residents per religion.
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReligionRecord {
    pub id: String,
    pub name: String,
    pub male: i64,
    pub female: i64,
    #[serde(default)]
    pub total: i64,
    pub icon: String,
}

/**
 * Number of residents per occupation.
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    pub label: String,
    pub male: i64,
    pub female: i64,
    #[serde(default)]
    pub total: i64,
}

/**
 * Number of residents per completed education level.
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EducationRecord {
    pub id: String,
    pub level: String,
    pub male: i64,
    pub female: i64,
    #[serde(default)]
    pub total: i64,
}

macro_rules! impl_gendered_count {
    ($($record:ty),*) => {
        $(impl GenderedCount for $record {
            fn male(&self) -> i64 {
                self.male
            }
            fn female(&self) -> i64 {
                self.female
            }
            fn set_total(&mut self, total: i64) {
                self.total = total;
            }
        })*
    };
}

impl_gendered_count!(ReligionRecord, JobRecord, EducationRecord);

/**
 * Outcome of an idempotent initialization routine.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SeedOutcome {
    Seeded,
    AlreadyInitialized,
    Failed,
}

/***************** Budget models *********************/

/**
 * A single revenue or expenditure line of the yearly village budget (APBD).
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetItem {
    pub id: String,
    pub name: String,
    pub amount: Decimal,
    pub year: i32,
    pub last_updated: DateTime<Utc>,
}

pub type RevenueItem = BudgetItem;
pub type ExpenditureItem = BudgetItem;

impl BudgetItem {
    pub fn new(id: &str, name: &str, amount: Decimal, year: i32) -> Self {
        BudgetItem { id: id.to_string(), name: name.to_string(), amount, year, last_updated: Utc::now() }
    }
}

/**
 * Sums the amounts of the given budget lines.
 *
 * # Returns
 * The sum, or a validation error when it does not fit in a `Decimal`.
 */
pub fn sum_amounts(items: &[BudgetItem]) -> Result<Decimal, ApplicationError> {
    items.iter().try_fold(Decimal::ZERO, |total, item| total.checked_add(item.amount)).ok_or_else(|| ApplicationError::validation("Budget total is out of range"))
}

/**
 * Derived aggregate of one fiscal year.
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetSummary {
    pub year: i32,
    pub total_revenue: Decimal,
    pub total_expenditure: Decimal,
    pub surplus: Decimal,
    pub last_updated: DateTime<Utc>,
}

impl BudgetSummary {
    /**
     * Computes the summary of a fiscal year from its revenue and expenditure lines.
     *
     * # Arguments
     * `year`: The fiscal year.
     * `revenue`: Revenue lines of the year.
     * `expenditure`: Expenditure lines of the year.
     *
     * # Returns
     * The summary, or a validation error when a total or the surplus is out of range.
     */
    pub fn from_items(year: i32, revenue: &[BudgetItem], expenditure: &[BudgetItem]) -> Result<Self, ApplicationError> {
        let total_revenue = sum_amounts(revenue)?;
        let total_expenditure = sum_amounts(expenditure)?;
        let surplus = total_revenue.checked_sub(total_expenditure).ok_or_else(|| ApplicationError::validation("Budget surplus is out of range"))?;
        Ok(BudgetSummary { year, total_revenue, total_expenditure, surplus, last_updated: Utc::now() })
    }
}

/***************** BUMDes models *********************/

/**
 * Operating status of a village-owned enterprise.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BumdesStatus {
    #[serde(rename = "Aktif")]
    Active,
    #[serde(rename = "Non-Aktif")]
    Inactive,
}

impl BumdesStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BumdesStatus::Active => "Aktif",
            BumdesStatus::Inactive => "Non-Aktif",
        }
    }
}

impl fmt::Display for BumdesStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BumdesStatus {
    type Err = ApplicationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Aktif" => Ok(BumdesStatus::Active),
            "Non-Aktif" => Ok(BumdesStatus::Inactive),
            other => Err(ApplicationError::new(ErrorType::Validation, format!("Unknown BUMDes status: {other}"))),
        }
    }
}

/**
 * A village-owned enterprise (BUMDes) entry of the catalog.
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BumdesItem {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub content: String,
    pub image: String,
    pub category: String,
    pub status: BumdesStatus,
    pub established: NaiveDate,
    pub manager: String,
    pub revenue: i64,
    pub employees: i64,
    pub location: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/**
 * Untrusted BUMDes form data as submitted by the admin form.
 */
#[derive(Debug, Clone)]
pub struct BumdesFormInput {
    pub title: String,
    pub description: String,
    pub content: String,
    pub category: String,
    pub status: BumdesStatus,
    pub established: String,
    pub manager: String,
    pub revenue: serde_json::Value,
    pub employees: serde_json::Value,
    pub location: String,
}

/**
 * Validated BUMDes fields ready to be written to the `bumdes` table.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct BumdesAddUpdateInputType {
    pub title: String,
    pub description: String,
    pub content: String,
    pub category: String,
    pub status: BumdesStatus,
    pub established: NaiveDate,
    pub manager: String,
    pub revenue: i64,
    pub employees: i64,
    pub location: String,
}

impl BumdesFormInput {
    /**
     * Validates the form. Required text fields must be non-blank, the establishment
     * date must be `YYYY-MM-DD`. Revenue and employees are coerced to integers.
     *
     * # Returns
     * The trimmed and coerced input or a validation error naming the first offending field.
     */
    pub fn validate(self) -> Result<BumdesAddUpdateInputType, ApplicationError> {
        let required = [
            (&self.title, "Title is required"),
            (&self.description, "Description is required"),
            (&self.content, "Content is required"),
            (&self.category, "Category is required"),
            (&self.established, "Establishment date is required"),
            (&self.manager, "Manager is required"),
            (&self.location, "Location is required"),
        ];
        if let Some((_, message)) = required.iter().find(|(value, _)| value.trim().is_empty()) {
            return Err(ApplicationError::validation(message));
        }
        let established = NaiveDate::parse_from_str(self.established.trim(), "%Y-%m-%d")
            .map_err(|err| ApplicationError::new(ErrorType::Validation, format!("Establishment date must be formatted YYYY-MM-DD: {err}")))?;
        Ok(BumdesAddUpdateInputType {
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            content: self.content.trim().to_string(),
            category: self.category.trim().to_string(),
            status: self.status,
            established,
            manager: self.manager.trim().to_string(),
            revenue: coerce_integer(&self.revenue),
            employees: coerce_integer(&self.employees),
            location: self.location.trim().to_string(),
        })
    }
}

/**
 * Coerces a loosely typed form value to an integer. Numbers are truncated, strings
 * contribute their leading integer (`"12 orang"` is 12), anything else is 0.
 */
pub fn coerce_integer(value: &serde_json::Value) -> i64 {
    match value {
        serde_json::Value::Number(number) => number.as_i64().or_else(|| number.as_f64().map(|float| float.trunc() as i64)).unwrap_or(0),
        serde_json::Value::String(text) => {
            let text = text.trim_start();
            let (sign, digits) = match text.strip_prefix('-') {
                Some(rest) => (-1, rest),
                None => (1, text.strip_prefix('+').unwrap_or(text)),
            };
            let digits: String = digits.chars().take_while(char::is_ascii_digit).collect();
            digits.parse::<i64>().map(|parsed| sign * parsed).unwrap_or(0)
        }
        _ => 0,
    }
}

/***************** Image models *********************/

/**
 * An image file received for upload.
 */
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/**
 * A stored object read back from image storage.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub content_type: String,
    pub bytes: Vec<u8>,
}
