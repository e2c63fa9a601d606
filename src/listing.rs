// Normalization of raw proxy search records into `VehicleListing`.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{KslError, Result};

pub const DEFAULT_LISTING_BASE_URL: &str = "https://cars.ksl.com/listing";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// Keys consumed into typed fields; everything else is passed through.
const KNOWN_KEYS: &[&str] = &[
    "id",
    "makeYear",
    "make",
    "model",
    "trim",
    "price",
    "mileage",
    "newUsed",
    "city",
    "state",
    "vin",
    "body",
    "fuel",
    "transmission",
    "sellerType",
    "titleType",
    "displayTime",
];

// Serialized names of the typed fields. Raw keys that collide with them are
// dropped so they cannot shadow the normalized values.
const OUTPUT_KEYS: &[&str] = &[
    "listing_title",
    "year",
    "make",
    "model",
    "trim",
    "price",
    "miles",
    "new_or_used",
    "location",
    "vin",
    "body_type",
    "fuel_type",
    "transmission",
    "link",
    "seller_type",
    "title_type",
    "time_created_utc",
    "unix_timestamp",
];

/// A single normalized vehicle listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleListing {
    pub listing_title: String,
    pub year: i64,
    pub make: String,
    pub model: String,
    pub trim: Option<String>,
    pub price: i64,
    pub miles: Option<i64>,
    pub new_or_used: Option<String>,
    pub location: Option<String>,
    pub vin: Option<String>,
    pub body_type: Option<String>,
    pub fuel_type: Option<String>,
    pub transmission: Option<String>,
    pub link: String,
    pub seller_type: Option<String>,
    pub title_type: Option<String>,
    pub time_created_utc: String,
    pub unix_timestamp: i64,
    /// Raw fields without a typed counterpart, e.g. `paint`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VehicleListing {
    /// Builds a listing from one raw record of the search endpoint.
    ///
    /// Missing or unparseable required fields (`id`, `makeYear`, `make`,
    /// `model`, `price`, `displayTime`) fail the record instead of being
    /// defaulted.
    pub fn from_raw(raw: &Map<String, Value>, base_url: &str) -> Result<Self> {
        let id = required_text(raw, "id")?;
        let year = required_int(raw, "makeYear")?;
        let make = required_text(raw, "make")?;
        let model = required_text(raw, "model")?;
        let price = parse_price(raw)?;
        let unix_timestamp = required_int(raw, "displayTime")?;

        let time_created_utc = DateTime::from_timestamp(unix_timestamp, 0)
            .ok_or_else(|| {
                KslError::malformed_record("displayTime", format!("{} is out of range", unix_timestamp))
            })?
            .format(TIME_FORMAT)
            .to_string();

        let trim = optional_text(raw, "trim");
        let listing_title = match &trim {
            Some(trim) => format!("{} {} {} {}", year, make, model, trim),
            None => format!("{} {} {}", year, make, model),
        };

        let location = match (optional_text(raw, "city"), optional_text(raw, "state")) {
            (Some(city), Some(state)) => Some(format!("{}, {}", city, state)),
            _ => None,
        };

        let miles = match raw.get("mileage").filter(|v| !v.is_null()) {
            Some(v) => Some(
                as_int(v).ok_or_else(|| KslError::malformed_record("mileage", format!("not a number: {}", v)))?,
            ),
            None => None,
        };

        let extra = raw
            .iter()
            .filter(|(key, _)| !KNOWN_KEYS.contains(&key.as_str()) && !OUTPUT_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(Self {
            listing_title,
            year,
            make,
            model,
            trim,
            price,
            miles,
            new_or_used: optional_text(raw, "newUsed"),
            location,
            vin: optional_text(raw, "vin"),
            body_type: optional_text(raw, "body"),
            fuel_type: optional_text(raw, "fuel"),
            transmission: optional_text(raw, "transmission"),
            link: format!("{}/{}", base_url.trim_end_matches('/'), id),
            seller_type: optional_text(raw, "sellerType"),
            title_type: optional_text(raw, "titleType"),
            time_created_utc,
            unix_timestamp,
            extra,
        })
    }
}

fn missing_or_invalid(raw: &Map<String, Value>, field: &'static str) -> KslError {
    match raw.get(field) {
        None | Some(Value::Null) => KslError::malformed_record(field, "is missing"),
        Some(v) => KslError::malformed_record(field, format!("has an unusable value: {}", v)),
    }
}

fn required_text(raw: &Map<String, Value>, field: &'static str) -> Result<String> {
    optional_text(raw, field).ok_or_else(|| missing_or_invalid(raw, field))
}

// Whole numbers only: `"2010.7"` is rejected rather than rounded.
fn required_int(raw: &Map<String, Value>, field: &'static str) -> Result<i64> {
    raw.get(field)
        .and_then(as_whole_int)
        .ok_or_else(|| missing_or_invalid(raw, field))
}

// Strings and numbers both come back as text; empty strings count as absent.
fn optional_text(raw: &Map<String, Value>, field: &str) -> Option<String> {
    match raw.get(field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// Accepts 12345, 12345.0, "12345" and "12,345".
fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => {
            let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
            cleaned
                .parse::<i64>()
                .ok()
                .or_else(|| cleaned.parse::<f64>().ok().map(|f| f.round() as i64))
        }
        _ => None,
    }
}

// Accepts 2010, 2010.0 and "2010"; anything with a fraction is None.
fn as_whole_int(value: &Value) -> Option<i64> {
    let f = match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => return Some(i),
            None => n.as_f64()?,
        },
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(i) => return Some(i),
                Err(_) => s.parse::<f64>().ok()?,
            }
        }
        _ => return None,
    };
    (f.fract() == 0.0 && f.abs() < i64::MAX as f64).then_some(f as i64)
}

/// Strips currency symbols and separators: `"$8,000"` becomes `8000`.
fn parse_price(raw: &Map<String, Value>) -> Result<i64> {
    let parsed = match raw.get("price") {
        Some(Value::String(s)) => {
            let digits: String = s
                .trim()
                .trim_start_matches(|c: char| !c.is_ascii_digit() && c != '-')
                .chars()
                .filter(|c| *c != ',')
                .collect();
            as_int(&Value::String(digits))
        }
        Some(other) => as_int(other),
        None => None,
    };
    parsed.ok_or_else(|| missing_or_invalid(raw, "price"))
}
