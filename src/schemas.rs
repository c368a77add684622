use crate::money::Money;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type UserId = String;
pub type ExpenseId = String;
pub type PaymentId = String;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct UserProfile {
    pub id: UserId,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitMode {
    Equal,
    Custom,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub description: String,
    pub amount: Money,
    pub split_mode: SplitMode,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

/// The part of an expense a single participant is responsible for.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExpenseParticipantShare {
    pub expense_id: ExpenseId,
    pub user_id: UserId,
    pub amount: Money,
}

/// An expense before the store has assigned it an id.
#[derive(Clone, Debug, PartialEq)]
pub struct NewExpense {
    pub description: String,
    pub amount: Money,
    pub split_mode: SplitMode,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

/// A share before its expense exists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewShare {
    pub user_id: UserId,
    pub amount: Money,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Payment {
    pub id: PaymentId,
    pub from: UserId,
    pub to: UserId,
    pub amount: Money,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewPayment {
    pub from: UserId,
    pub to: UserId,
    pub amount: Money,
    pub created_at: DateTime<Utc>,
}

/// Request body shared by the split preview and expense creation.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ExpenseRequest {
    #[serde(default)]
    pub description: String,
    pub amount: Money,
    pub split_mode: SplitMode,
    pub participants: Vec<UserId>,
    #[serde(default)]
    pub custom_amounts: Option<HashMap<UserId, Money>>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct PaymentRequest {
    pub to: UserId,
    pub amount: Money,
}

/// Optional narrowing of a transaction list, taken from the query string.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ExpenseFilter {
    /// Case-insensitive part of the description.
    pub search: Option<String>,
    /// First day to include, in UTC.
    pub from: Option<NaiveDate>,
    /// Last day to include, in UTC.
    pub to: Option<NaiveDate>,
}

/// An expense together with all of its shares, as shown in a transaction list.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExpenseWithShares {
    #[serde(flatten)]
    pub expense: Expense,
    pub shares: Vec<ExpenseParticipantShare>,
}
