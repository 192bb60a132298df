use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Level {
    Beginner,
    Intermediate,
    Advanced,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "beginner" => Ok(Self::Beginner),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            other => Err(AppError::Validation(format!("unknown level: {other}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum PlanState {
    Active,
    Canceled,
    Finished,
}

impl PlanState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Canceled => "canceled",
            Self::Finished => "finished",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ContractState {
    Active,
    Canceled,
    Finished,
    Renewed,
}

impl ContractState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Canceled => "canceled",
            Self::Finished => "finished",
            Self::Renewed => "renewed",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum MovementKind {
    Inflow,
    Outflow,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inflow => "inflow",
            Self::Outflow => "outflow",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientInput {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub level: Level,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ClientChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub level: Option<Level>,
    pub active: Option<bool>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlanInput {
    pub name: String,
    pub level: Level,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContractInput {
    pub client_id: i64,
    pub plan_id: i64,
    pub price_cents: i64,
    pub months: u32,
    pub start: Option<NaiveDate>,
    pub record_payment: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RenewInput {
    pub months: u32,
    pub price_cents: Option<i64>,
    pub record_payment: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProgressInput {
    pub client_id: i64,
    pub contract_id: i64,
    pub date: Option<NaiveDate>,
    pub weight_kg: Option<f64>,
    pub body_fat_pct: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MovementInput {
    pub kind: MovementKind,
    pub amount_cents: i64,
    pub client_id: Option<i64>,
    pub contract_id: Option<i64>,
    pub description: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ContractQuery {
    pub client_id: Option<i64>,
    pub plan_id: Option<i64>,
    pub state: Option<ContractState>,
}

/// Parses a decimal money amount ("100", "99.5", "12.30") into integer cents.
pub fn parse_amount(value: &str) -> Result<i64, AppError> {
    let invalid = || AppError::Validation(format!("invalid amount: {value}"));
    let trimmed = value.trim();
    let (whole, fraction) = match trimmed.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (trimmed, ""),
    };
    if whole.is_empty() || fraction.len() > 2 {
        return Err(invalid());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }
    let whole: i64 = whole.parse().map_err(|_| invalid())?;
    let cents = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().map_err(|_| invalid())? * 10,
        _ => fraction.parse::<i64>().map_err(|_| invalid())?,
    };
    whole
        .checked_mul(100)
        .and_then(|value| value.checked_add(cents))
        .ok_or_else(invalid)
}

pub fn format_amount(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    format!("{sign}{}.{:02}", cents / 100, cents % 100)
}
