//! The value object every other component reads from and writes to.

pub mod dates;

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};
use time::Date;

use crate::status::ItemStatus;
use crate::variant::{SelectRange, SelectionVariant};

pub use dates::{format_iso_date, parse_date_range, parse_iso_date, DateRange};

/// Names of the filter fields with dedicated handling.
pub mod keys {
    pub const KEY_DATE: &str = "KeyDate";
    pub const POSTING_DATE: &str = "PostingDate";
    pub const CLEARING_DATE: &str = "ClearingDate";
    pub const DISPLAY_CURRENCY: &str = "DisplayCurrency";
    pub const EXCHANGE_RATE_TYPE: &str = "ExchangeRateType";
    pub const EXCHANGE_RATE_DATE: &str = "ExchangeRateDate";
    pub const LEVEL_SELECTION: &str = "LevelSelection";
    pub const OPEN_ITEM_MANAGED: &str = "IsOpenItemManagedFlag";
    pub const ITEM_STATUS: &str = "ItemStatus";
    pub const LEDGER: &str = "Ledger";
}

/// Keys private to the variant custom-field block. They never appear as
/// ordinary selection fields.
pub const INTERNAL_FIELD_KEYS: [&str; 10] = [
    "fromDate",
    "toDate",
    "keyDate",
    "exRateDate",
    "expLevel",
    "exRateType",
    "dispCur",
    "status",
    "XOPVWselect",
    keys::DISPLAY_CURRENCY,
];

pub fn is_internal_key(name: &str) -> bool {
    INTERNAL_FIELD_KEYS.contains(&name)
}

/// Properties held in their own snapshot slots and carried in custom data.
pub const DEDICATED_FIELD_KEYS: [&str; 8] = [
    keys::KEY_DATE,
    keys::POSTING_DATE,
    keys::CLEARING_DATE,
    keys::EXCHANGE_RATE_TYPE,
    keys::EXCHANGE_RATE_DATE,
    keys::LEVEL_SELECTION,
    keys::OPEN_ITEM_MANAGED,
    keys::ITEM_STATUS,
];

/// True for keys that never live in the generic field map.
pub fn is_reserved_key(name: &str) -> bool {
    is_internal_key(name) || DEDICATED_FIELD_KEYS.contains(&name)
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum OpenItemFilter {
    #[default]
    #[serde(rename = "")]
    #[strum(serialize = "")]
    Unset,
    #[serde(rename = "DDLB_INCLUDE")]
    #[strum(serialize = "DDLB_INCLUDE")]
    Include,
    #[serde(rename = "DDLB_EXCLUDE")]
    #[strum(serialize = "DDLB_EXCLUDE")]
    Exclude,
}

/// Hierarchy expansion depth, written as `L<n>`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExpandLevel(pub u8);

impl fmt::Display for ExpandLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

impl FromStr for ExpandLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_start_matches(['L', 'l']);
        digits
            .parse::<u8>()
            .map(ExpandLevel)
            .map_err(|_| format!("invalid expand level '{s}'"))
    }
}

impl TryFrom<String> for ExpandLevel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ExpandLevel> for String {
    fn from(level: ExpandLevel) -> Self {
        level.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Parameter(String),
    Ranges(Vec<SelectRange>),
}

impl FieldValue {
    pub fn equal_to(value: impl Into<String>) -> Self {
        FieldValue::Ranges(vec![SelectRange::equal_to(value)])
    }

    /// Single value carried by a parameter or the first range.
    pub fn first_value(&self) -> Option<&str> {
        match self {
            FieldValue::Parameter(value) => Some(value.as_str()),
            FieldValue::Ranges(ranges) => ranges.first().map(|range| range.low.as_str()),
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Parameter(value) => value.is_empty(),
            FieldValue::Ranges(ranges) => ranges.is_empty(),
        }
    }
}

/// Ordinary selection fields keyed by property name. Internal custom-field
/// keys and the dedicated snapshot fields are refused on insert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SelectionFields(IndexMap<String, FieldValue>);

impl SelectionFields {
    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) -> bool {
        let name = name.into();
        if is_reserved_key(&name) {
            tracing::debug!(field = %name, "refusing reserved key as selection field");
            return false;
        }
        self.0.insert(name, value);
        true
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.0.shift_remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl<'de> Deserialize<'de> for SelectionFields {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = IndexMap::<String, FieldValue>::deserialize(deserializer)?;
        let mut fields = SelectionFields::default();
        for (name, value) in raw {
            fields.insert(name, value);
        }
        Ok(fields)
    }
}

/// Table personalization, owned by the table but carried with the filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,
    #[serde(default)]
    pub selection: Value,
    #[serde(default)]
    pub presentation: Value,
    #[serde(default)]
    pub dirty: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSnapshot {
    #[serde(default)]
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posting_date: Option<DateRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clearing_date: Option<DateRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_date: Option<Date>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange_rate_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange_rate_date: Option<Date>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_currency: Option<String>,
    #[serde(default)]
    pub expand_level: ExpandLevel,
    #[serde(default)]
    pub expand_level_visible: bool,
    #[serde(default)]
    pub open_item_filter: OpenItemFilter,
    #[serde(default)]
    pub fields: SelectionFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_state: Option<TableState>,
}

impl FilterSnapshot {
    /// Open items at today's key date with the default rate type.
    pub fn initial(today: Date, exchange_rate_type: &str) -> Self {
        Self {
            status: ItemStatus::Open,
            key_date: Some(today),
            exchange_rate_type: Some(exchange_rate_type.to_string()),
            exchange_rate_date: Some(today),
            ..Self::default()
        }
    }

    pub fn clearing_upper_bound(&self) -> Option<Date> {
        self.clearing_date.and_then(|range| range.upper_bound())
    }

    /// Routes the dedicated date fields to their ranges and everything else
    /// to the generic field map.
    pub fn apply_field(&mut self, name: &str, value: FieldValue) -> bool {
        match name {
            keys::POSTING_DATE => {
                self.posting_date = date_range_of(&value);
                true
            }
            keys::CLEARING_DATE => {
                self.clearing_date = date_range_of(&value);
                true
            }
            // an option without ranges selects nothing
            _ if matches!(&value, FieldValue::Ranges(ranges) if ranges.is_empty()) => {
                self.fields.remove(name);
                !is_reserved_key(name)
            }
            _ => self.fields.insert(name, value),
        }
    }

    pub fn apply_variant(&mut self, variant: &SelectionVariant) {
        for param in &variant.parameters {
            self.apply_field(
                &param.property_name,
                FieldValue::Parameter(param.property_value.clone()),
            );
        }
        for option in &variant.select_options {
            self.apply_field(
                &option.property_name,
                FieldValue::Ranges(option.ranges.clone()),
            );
        }
    }

    /// Selection fields as a variant. Dates go out as select options.
    pub fn to_variant(&self) -> SelectionVariant {
        let mut variant = SelectionVariant::default();
        for (name, value) in self.fields.iter() {
            match value {
                FieldValue::Parameter(text) => variant.set_parameter(name, text.clone()),
                FieldValue::Ranges(ranges) => {
                    for range in ranges {
                        variant.add_select_option(name, range.clone());
                    }
                }
            }
        }
        if let Some(range) = self.posting_date.and_then(|range| range.to_range()) {
            variant.add_select_option(keys::POSTING_DATE, range);
        }
        if let Some(range) = self.clearing_date.and_then(|range| range.to_range()) {
            variant.add_select_option(keys::CLEARING_DATE, range);
        }
        variant
    }

    /// Puts the leading ledger into an empty Ledger field.
    pub fn fill_ledger(&mut self, leading_ledger: &str) -> bool {
        let empty = self
            .fields
            .get(keys::LEDGER)
            .map_or(true, FieldValue::is_blank);
        if empty && !leading_ledger.is_empty() {
            self.fields
                .insert(keys::LEDGER, FieldValue::Parameter(leading_ledger.to_string()));
        }
        empty
    }

    pub fn clear_selection(&mut self) {
        self.fields.clear();
        self.posting_date = None;
        self.clearing_date = None;
    }
}

fn date_range_of(value: &FieldValue) -> Option<DateRange> {
    match value {
        FieldValue::Ranges(ranges) => DateRange::from_ranges(ranges),
        FieldValue::Parameter(text) => parse_iso_date(text).map(|day| DateRange::between(day, day)),
    }
}
