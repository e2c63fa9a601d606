// Search filters accepted by the KSL proxy search endpoint.
//
// Every field is declared once in the table below together with the rule its
// value must satisfy. `FilterSet` runs that rule on every assignment, so a set
// that exists is always valid.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{KslError, Result};

/// A filter value: a scalar or an ordered collection of scalars.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Flag(bool),
    Integer(i64),
    Text(String),
    List(Vec<FilterValue>),
}

impl FilterValue {
    /// Wire form of the value: scalars as-is, collections joined with ';'.
    pub fn to_wire(&self) -> String {
        match self {
            FilterValue::Flag(b) => b.to_string(),
            FilterValue::Integer(i) => i.to_string(),
            FilterValue::Text(s) => s.clone(),
            FilterValue::List(items) => items
                .iter()
                .map(FilterValue::to_wire)
                .collect::<Vec<_>>()
                .join(";"),
        }
    }

    fn is_empty_list(&self) -> bool {
        matches!(self, FilterValue::List(items) if items.is_empty())
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Text(s) => write!(f, "{:?}", s),
            FilterValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            other => write!(f, "{}", other.to_wire()),
        }
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Flag(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Integer(value)
    }
}

impl From<i32> for FilterValue {
    fn from(value: i32) -> Self {
        FilterValue::Integer(value.into())
    }
}

impl From<u32> for FilterValue {
    fn from(value: u32) -> Self {
        FilterValue::Integer(value.into())
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(values: Vec<T>) -> Self {
        FilterValue::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<FilterValue>, const N: usize> From<[T; N]> for FilterValue {
    fn from(values: [T; N]) -> Self {
        FilterValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// Joins a collection with semicolons, which is how the proxy takes multiple
/// values for one filter. Scalars come back unchanged.
pub fn semicolonize(value: impl Into<FilterValue>) -> String {
    value.into().to_wire()
}

/// The rule a filter value has to satisfy.
#[derive(Debug, Clone, Copy)]
pub enum ValueKind {
    Text,
    Integer,
    Flag,
    /// Exact membership in a set of strings.
    OneOf(&'static [&'static str]),
    /// Exact membership in a set of integers.
    OneOfInt(&'static [i64]),
    /// A collection whose every element satisfies the inner rule.
    ListOf(&'static ValueKind),
    /// Valid if any branch is valid.
    AnyOf(&'static [ValueKind]),
}

impl ValueKind {
    pub fn matches(&self, value: &FilterValue) -> bool {
        match (self, value) {
            (ValueKind::AnyOf(branches), v) => branches.iter().any(|b| b.matches(v)),
            (ValueKind::ListOf(elem), FilterValue::List(items)) => {
                items.iter().all(|item| elem.matches(item))
            }
            (ValueKind::OneOf(allowed), FilterValue::Text(s)) => allowed.contains(&s.as_str()),
            (ValueKind::OneOfInt(allowed), FilterValue::Integer(i)) => allowed.contains(i),
            (ValueKind::Text, FilterValue::Text(_))
            | (ValueKind::Integer, FilterValue::Integer(_))
            | (ValueKind::Flag, FilterValue::Flag(_)) => true,
            _ => false,
        }
    }

    fn accepts_list(&self) -> bool {
        match self {
            ValueKind::ListOf(_) => true,
            ValueKind::AnyOf(branches) => branches.iter().any(ValueKind::accepts_list),
            _ => false,
        }
    }

    fn accepts_integer(&self) -> bool {
        match self {
            ValueKind::Integer | ValueKind::OneOfInt(_) => true,
            ValueKind::ListOf(elem) => elem.accepts_integer(),
            ValueKind::AnyOf(branches) => branches.iter().any(ValueKind::accepts_integer),
            _ => false,
        }
    }

    fn accepts_flag(&self) -> bool {
        match self {
            ValueKind::Flag => true,
            ValueKind::ListOf(elem) => elem.accepts_flag(),
            ValueKind::AnyOf(branches) => branches.iter().any(ValueKind::accepts_flag),
            _ => false,
        }
    }

    /// Best-effort typing of one piece of query-string text.
    fn parse_scalar(&self, raw: &str) -> FilterValue {
        if self.accepts_integer() {
            if let Ok(i) = raw.parse::<i64>() {
                return FilterValue::Integer(i);
            }
        }
        if self.accepts_flag() {
            match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => return FilterValue::Flag(true),
                "0" | "false" | "no" => return FilterValue::Flag(false),
                _ => {}
            }
        }
        FilterValue::Text(raw.to_string())
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Text => write!(f, "text"),
            ValueKind::Integer => write!(f, "an integer"),
            ValueKind::Flag => write!(f, "a boolean"),
            ValueKind::OneOf(allowed) => write!(f, "one of {:?}", allowed),
            ValueKind::OneOfInt(allowed) => write!(f, "one of {:?}", allowed),
            ValueKind::ListOf(elem) => write!(f, "a list of {}", elem),
            ValueKind::AnyOf(branches) => {
                for (i, branch) in branches.iter().enumerate() {
                    if i > 0 {
                        write!(f, " or ")?;
                    }
                    write!(f, "{}", branch)?;
                }
                Ok(())
            }
        }
    }
}

// A scalar of the given kind, or a list of them.
macro_rules! one_or_many {
    ($kind:expr) => {
        ValueKind::AnyOf(&[$kind, ValueKind::ListOf(&$kind)])
    };
}

pub const SELLER_TYPES: &[&str] = &["For Sale By Owner", "Dealership"];
pub const NEW_USED: &[&str] = &["Used", "New", "Certified"];
pub const TRANSMISSIONS: &[&str] = &["Automatic", "Manual", "CVT", "Automanual"];
pub const FUELS: &[&str] = &[
    "Compressed Natural Gas",
    "Diesel",
    "Electric",
    "Flex Fuel",
    "Gasoline",
    "Hybrid",
];
pub const DRIVES: &[&str] = &["2-Wheel Drive", "4-Wheel Drive", "AWD", "FWD", "RWD"];
pub const TITLE_TYPES: &[&str] = &[
    "Clean Title",
    "Dismantled Title",
    "Not Specified",
    "Rebuilt/Reconstructed Title",
    "Salvage Title",
];
pub const SEAT_COUNTS: &[i64] = &[2, 3, 4, 5, 6, 7, 8, 9, 10, 12, 15];
pub const CAB_SIZES: &[&str] = &["Crew Cab", "Extended Cab", "Regular Cab"];
pub const CYLINDER_COUNTS: &[i64] = &[2, 3, 4, 5, 6, 8, 10, 12];
pub const DOOR_COUNTS: &[i64] = &[2, 3, 4, 5];
pub const BED_SIZES: &[&str] = &["Short Bed", "Standard Bed", "Long Bed"];
pub const BODY_STYLES: &[&str] = &[
    "Convertible",
    "Coupe",
    "Crossover",
    "Hatchback",
    "Minivan",
    "Sedan",
    "SUV",
    "Truck",
    "Van",
    "Wagon",
];
pub const COLORS: &[&str] = &[
    "Beige", "Black", "Blue", "Brown", "Gold", "Gray", "Green", "Orange", "Purple", "Red",
    "Silver", "Tan", "White", "Yellow", "Other",
];
pub const CONDITIONS: &[&str] = &["Excellent", "Good", "Fair", "Poor"];
pub const SORT_ORDERS: &[i64] = &[0, 1, 2, 3, 4, 5, 6, 7];

const TEXT_OR_LIST: ValueKind = one_or_many!(ValueKind::Text);
const SELLER_TYPE: ValueKind = one_or_many!(ValueKind::OneOf(SELLER_TYPES));
const CONDITION_NEW_USED: ValueKind = one_or_many!(ValueKind::OneOf(NEW_USED));
const TRANSMISSION: ValueKind = one_or_many!(ValueKind::OneOf(TRANSMISSIONS));
const FUEL: ValueKind = one_or_many!(ValueKind::OneOf(FUELS));
const DRIVE: ValueKind = one_or_many!(ValueKind::OneOf(DRIVES));
const TITLE_TYPE: ValueKind = one_or_many!(ValueKind::OneOf(TITLE_TYPES));
const SEATS: ValueKind = one_or_many!(ValueKind::OneOfInt(SEAT_COUNTS));
const CAB_SIZE: ValueKind = one_or_many!(ValueKind::OneOf(CAB_SIZES));
const CYLINDERS: ValueKind = one_or_many!(ValueKind::OneOfInt(CYLINDER_COUNTS));
const DOORS: ValueKind = one_or_many!(ValueKind::OneOfInt(DOOR_COUNTS));
const BED_SIZE: ValueKind = one_or_many!(ValueKind::OneOf(BED_SIZES));
const BODY: ValueKind = one_or_many!(ValueKind::OneOf(BODY_STYLES));
const COLOR: ValueKind = one_or_many!(ValueKind::OneOf(COLORS));
const CONDITION: ValueKind = one_or_many!(ValueKind::OneOf(CONDITIONS));

macro_rules! filter_fields {
    ($($variant:ident => $name:literal : $kind:expr,)*) => {
        /// Every search dimension the proxy understands, in wire order.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum FilterField {
            $($variant,)*
        }

        impl FilterField {
            pub const ALL: &'static [FilterField] = &[$(FilterField::$variant,)*];

            /// Name used on the wire and in query strings.
            pub fn name(self) -> &'static str {
                match self {
                    $(FilterField::$variant => $name,)*
                }
            }

            pub fn kind(self) -> ValueKind {
                match self {
                    $(FilterField::$variant => $kind,)*
                }
            }
        }
    };
}

filter_fields! {
    SellerType => "sellerType": SELLER_TYPE,
    NewUsed => "newUsed": CONDITION_NEW_USED,
    Make => "make": TEXT_OR_LIST,
    Model => "model": TEXT_OR_LIST,
    PriceTo => "priceTo": ValueKind::Integer,
    PriceFrom => "priceFrom": ValueKind::Integer,
    MileageFrom => "mileageFrom": ValueKind::Integer,
    MileageTo => "mileageTo": ValueKind::Integer,
    YearFrom => "yearFrom": ValueKind::Integer,
    YearTo => "yearTo": ValueKind::Integer,
    Trim => "trim": TEXT_OR_LIST,
    Transmission => "transmission": TRANSMISSION,
    Keyword => "keyword": ValueKind::Text,
    Fuel => "fuel": FUEL,
    Drive => "drive": DRIVE,
    TitleType => "titleType": TITLE_TYPE,
    NumberOfSeats => "numberOfSeats": SEATS,
    CarfaxAvailable => "carfaxAvailable": ValueKind::Flag,
    HasPhotos => "hasPhotos": ValueKind::Flag,
    CabSize => "cabSize": CAB_SIZE,
    Cylinders => "cylinders": CYLINDERS,
    NumberDoors => "numberDoors": DOORS,
    BedSize => "bedSize": BED_SIZE,
    Body => "body": BODY,
    Paint => "paint": COLOR,
    Upholstery => "upholstery": COLOR,
    InteriorCondition => "interiorCondition": CONDITION,
    ExteriorCondition => "exteriorCondition": CONDITION,
    Liters => "liters": TEXT_OR_LIST,
    Sort => "sort": ValueKind::OneOfInt(SORT_ORDERS),
}

impl FilterField {
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }

    /// Types query-string text for this field: `"A;B"` becomes a collection
    /// when the field takes one, digits become integers for integer fields.
    /// The result still has to pass `validate`.
    pub fn parse(self, raw: &str) -> FilterValue {
        let kind = self.kind();
        if raw.contains(';') && kind.accepts_list() {
            FilterValue::List(
                raw.split(';')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(|part| kind.parse_scalar(part))
                    .collect(),
            )
        } else {
            kind.parse_scalar(raw.trim())
        }
    }
}

impl FromStr for FilterField {
    type Err = KslError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s).ok_or_else(|| KslError::UnknownFilter(s.to_string()))
    }
}

impl fmt::Display for FilterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Checks a value against the field's rule.
pub fn validate(field: FilterField, value: &FilterValue) -> Result<()> {
    let kind = field.kind();
    if kind.matches(value) {
        Ok(())
    } else {
        Err(KslError::InvalidFilter {
            field: field.name(),
            expected: kind.to_string(),
            actual: value.to_string(),
        })
    }
}

/// Result ordering supported by the `sort` filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    NewestListings = 0,
    OldestListings = 1,
    PriceLowToHigh = 2,
    PriceHighToLow = 3,
    MileageLowToHigh = 4,
    MileageHighToLow = 5,
    YearNewToOld = 6,
    YearOldToNew = 7,
}

impl From<SortOrder> for FilterValue {
    fn from(order: SortOrder) -> Self {
        FilterValue::Integer(order as i64)
    }
}

/// A validated set of search filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    values: BTreeMap<FilterField, FilterValue>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from `(name, value)` pairs, failing on the first unknown
    /// name or invalid value.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<FilterValue>,
    {
        let mut set = Self::new();
        for (name, value) in pairs {
            set.set_by_name(name.as_ref(), value)?;
        }
        Ok(set)
    }

    /// Builder-style `set`.
    pub fn with(mut self, field: FilterField, value: impl Into<FilterValue>) -> Result<Self> {
        self.set(field, value)?;
        Ok(self)
    }

    /// Validates and stores a value. On error the set is left untouched.
    /// An empty collection clears the field.
    pub fn set(&mut self, field: FilterField, value: impl Into<FilterValue>) -> Result<()> {
        let value = value.into();
        validate(field, &value)?;
        if value.is_empty_list() {
            self.values.remove(&field);
        } else {
            self.values.insert(field, value);
        }
        Ok(())
    }

    pub fn set_by_name(&mut self, name: &str, value: impl Into<FilterValue>) -> Result<()> {
        let field: FilterField = name.parse()?;
        self.set(field, value)
    }

    /// Parses query-string text for `name` and stores it.
    pub fn set_from_query(&mut self, name: &str, raw: &str) -> Result<()> {
        let field: FilterField = name.parse()?;
        self.set(field, field.parse(raw))
    }

    pub fn clear(&mut self, field: FilterField) -> Option<FilterValue> {
        self.values.remove(&field)
    }

    pub fn get(&self, field: FilterField) -> Option<&FilterValue> {
        self.values.get(&field)
    }

    pub fn keyword(&self) -> Option<&str> {
        match self.values.get(&FilterField::Keyword) {
            Some(FilterValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FilterField, &FilterValue)> {
        self.values.iter().map(|(field, value)| (*field, value))
    }

    /// Flat `[name, value, name, value, ...]` list for the proxy request body.
    pub fn to_list(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.values.len() * 2);
        for (field, value) in &self.values {
            let wire = match (field, value) {
                (FilterField::CarfaxAvailable, FilterValue::Flag(b)) => {
                    Some(if *b { "1" } else { "0" }.to_string())
                }
                (FilterField::HasPhotos, FilterValue::Flag(true)) => Some("Has Photos".to_string()),
                (FilterField::HasPhotos, _) => None,
                (_, v) => Some(v.to_wire()),
            };
            if let Some(wire) = wire {
                out.push(field.name().to_string());
                out.push(wire);
            }
        }
        out
    }
}
