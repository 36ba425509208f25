//! Booking feature derivation.
//!
//! Turns the loosely-typed feature mapping posted by the frontend into the
//! fixed 28-column record the cancellation model was trained against.

use serde::Serialize;
use serde_json::{Map, Value};

// ---------- Schema ----------

pub const N_FEATURES: usize = 28;

pub const UNKNOWN: &str = "Unknown";
const UNKNOWN_PAIR: &str = "Unknown_Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
}

const fn num(name: &'static str) -> Column {
    Column { name, kind: ColumnKind::Numeric }
}

const fn cat(name: &'static str) -> Column {
    Column { name, kind: ColumnKind::Categorical }
}

/// Authoritative column order. Changing it requires retraining the artifact.
pub const SCHEMA: [Column; N_FEATURES] = [
    num("lead_time"),
    num("arrival_date_year"),
    num("arrival_date_week_number"),
    num("arrival_date_day_of_month"),
    num("stays_in_weekend_nights"),
    num("stays_in_week_nights"),
    num("adults"),
    num("children"),
    num("is_repeated_guest"),
    num("booking_changes"),
    num("agent"),
    num("adr"),
    num("required_car_parking_spaces"),
    num("total_of_special_requests"),
    num("prev_cancellation_ratio"),
    num("has_waiting_list"),
    num("room_honored"),
    num("engagement_score"),
    num("risk_segment_cancel_rate"),
    cat("hotel"),
    cat("meal"),
    cat("deposit_type"),
    cat("customer_type"),
    cat("arrival_season"),
    cat("country"),
    cat("room_pair"),
    cat("market_pair"),
    num("arrival_date_month"),
];

pub fn column_names() -> Vec<String> {
    SCHEMA.iter().map(|c| c.name.to_string()).collect()
}

// ---------- Values ----------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Category(String),
}

impl FeatureValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FeatureValue::Number(x) => Some(*x),
            FeatureValue::Category(_) => None,
        }
    }

    /// Token used as a category level. NaN has no level (it is treated as missing).
    pub fn level(&self) -> Option<String> {
        match self {
            FeatureValue::Number(x) if x.is_nan() => None,
            FeatureValue::Number(x) => Some(x.to_string()),
            FeatureValue::Category(s) => Some(s.clone()),
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(x: f64) -> Self {
        FeatureValue::Number(x)
    }
}

impl From<&str> for FeatureValue {
    fn from(s: &str) -> Self {
        FeatureValue::Category(s.to_string())
    }
}

// ---------- Record ----------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingFeatures {
    pub lead_time: f64,
    pub arrival_date_year: f64,
    pub arrival_date_week_number: f64,
    pub arrival_date_day_of_month: f64,
    pub stays_in_weekend_nights: f64,
    pub stays_in_week_nights: f64,
    pub adults: f64,
    pub children: f64,
    pub is_repeated_guest: f64,
    pub booking_changes: f64,
    pub agent: f64,
    pub adr: f64,
    pub required_car_parking_spaces: f64,
    pub total_of_special_requests: f64,
    pub prev_cancellation_ratio: f64,
    pub has_waiting_list: f64,
    pub room_honored: f64,
    pub engagement_score: f64,
    pub risk_segment_cancel_rate: f64,
    pub hotel: String,
    pub meal: String,
    pub deposit_type: String,
    pub customer_type: String,
    pub arrival_season: String,
    pub country: String,
    pub room_pair: String,
    pub market_pair: String,
    pub arrival_date_month: f64,
}

impl Default for BookingFeatures {
    fn default() -> Self {
        Self {
            lead_time: 0.0,
            arrival_date_year: 0.0,
            arrival_date_week_number: 0.0,
            arrival_date_day_of_month: 0.0,
            stays_in_weekend_nights: 0.0,
            stays_in_week_nights: 0.0,
            adults: 0.0,
            children: 0.0,
            is_repeated_guest: 0.0,
            booking_changes: 0.0,
            agent: 0.0,
            adr: 0.0,
            required_car_parking_spaces: 0.0,
            total_of_special_requests: 0.0,
            prev_cancellation_ratio: 0.0,
            has_waiting_list: 0.0,
            room_honored: 0.0,
            engagement_score: 0.0,
            risk_segment_cancel_rate: 0.0,
            hotel: UNKNOWN.to_string(),
            meal: UNKNOWN.to_string(),
            deposit_type: UNKNOWN.to_string(),
            customer_type: UNKNOWN.to_string(),
            arrival_season: UNKNOWN.to_string(),
            country: UNKNOWN.to_string(),
            room_pair: UNKNOWN.to_string(),
            market_pair: UNKNOWN.to_string(),
            arrival_date_month: 0.0,
        }
    }
}

impl BookingFeatures {
    /// Values in `SCHEMA` order.
    pub fn to_row(&self) -> Vec<FeatureValue> {
        use FeatureValue::{Category as C, Number as N};
        vec![
            N(self.lead_time),
            N(self.arrival_date_year),
            N(self.arrival_date_week_number),
            N(self.arrival_date_day_of_month),
            N(self.stays_in_weekend_nights),
            N(self.stays_in_week_nights),
            N(self.adults),
            N(self.children),
            N(self.is_repeated_guest),
            N(self.booking_changes),
            N(self.agent),
            N(self.adr),
            N(self.required_car_parking_spaces),
            N(self.total_of_special_requests),
            N(self.prev_cancellation_ratio),
            N(self.has_waiting_list),
            N(self.room_honored),
            N(self.engagement_score),
            N(self.risk_segment_cancel_rate),
            C(self.hotel.clone()),
            C(self.meal.clone()),
            C(self.deposit_type.clone()),
            C(self.customer_type.clone()),
            C(self.arrival_season.clone()),
            C(self.country.clone()),
            C(self.room_pair.clone()),
            C(self.market_pair.clone()),
            N(self.arrival_date_month),
        ]
    }

    pub fn get(&self, name: &str) -> Option<FeatureValue> {
        let idx = SCHEMA.iter().position(|c| c.name == name)?;
        Some(self.to_row().swap_remove(idx))
    }
}

// ---------- Derivation ----------

/// Derive the model record from a raw client mapping. Never fails: every
/// coercion falls back to a default.
pub fn derive(raw: &Map<String, Value>) -> BookingFeatures {
    let number = |key: &str| coerce_number(raw.get(key));

    let booking_changes = number("booking_changes");
    let total_of_special_requests = number("total_of_special_requests");
    let arrival_date_month = number("arrival_date_month");

    let reserved = present(raw.get("reserved_room_type"));
    let assigned = present(raw.get("assigned_room_type"));
    let (room_honored, room_pair) = match (reserved, assigned) {
        (Some(r), Some(a)) => (
            if r == a { 1.0 } else { 0.0 },
            format!("{}_{}", token(r), token(a)),
        ),
        _ => (0.0, UNKNOWN_PAIR.to_string()),
    };

    let market_pair = match (
        present(raw.get("market_segment")),
        present(raw.get("distribution_channel")),
    ) {
        (Some(m), Some(d)) => format!("{}_{}", token(m), token(d)),
        _ => UNKNOWN_PAIR.to_string(),
    };

    BookingFeatures {
        lead_time: number("lead_time"),
        arrival_date_year: number("arrival_date_year"),
        arrival_date_week_number: number("arrival_date_week_number"),
        arrival_date_day_of_month: number("arrival_date_day_of_month"),
        stays_in_weekend_nights: number("stays_in_weekend_nights"),
        stays_in_week_nights: number("stays_in_week_nights"),
        adults: number("adults"),
        children: number("children"),
        is_repeated_guest: yes_no(raw.get("is_repeated_guest")),
        booking_changes,
        agent: number("agent"),
        adr: number("adr"),
        required_car_parking_spaces: number("required_car_parking_spaces"),
        total_of_special_requests,
        // Not computable from a single request; always defaulted.
        prev_cancellation_ratio: 0.0,
        has_waiting_list: yes_no(raw.get("has_waiting_list")),
        room_honored,
        engagement_score: booking_changes * total_of_special_requests,
        risk_segment_cancel_rate: 0.0,
        hotel: categorical(raw.get("hotel")),
        meal: categorical(raw.get("meal")),
        deposit_type: categorical(raw.get("deposit_type")),
        customer_type: categorical(raw.get("customer_type")),
        arrival_season: season_for_month(arrival_date_month).to_string(),
        country: UNKNOWN.to_string(),
        room_pair,
        market_pair,
        arrival_date_month,
    }
}

fn yes_no(v: Option<&Value>) -> f64 {
    match v {
        Some(Value::String(s)) if s == "Yes" => 1.0,
        _ => 0.0,
    }
}

/// Lenient float coercion; anything unusable becomes 0.
pub fn coerce_number(v: Option<&Value>) -> f64 {
    match v {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        Some(Value::Bool(b)) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

pub fn season_for_month(month: f64) -> &'static str {
    if !month.is_finite() {
        return UNKNOWN;
    }
    match month.trunc() as i64 {
        12 | 1 | 2 => "Winter",
        3..=5 => "Spring",
        6..=8 => "Summer",
        9..=11 => "Fall",
        _ => UNKNOWN,
    }
}

/// Returns the value only if it is set to something non-empty.
fn present(v: Option<&Value>) -> Option<&Value> {
    v.filter(|v| match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |x| x != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    })
}

fn categorical(v: Option<&Value>) -> String {
    match v {
        None | Some(Value::Null) => UNKNOWN.to_string(),
        Some(v) => token(v),
    }
}

fn token(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        other => other.to_string(),
    }
}
