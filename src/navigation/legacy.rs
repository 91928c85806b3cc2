//! Filter-bar data sent in the old private navigation-key format.
//!
//! Senders of this format pass the raw filter-bar data instead of a
//! selection variant, and a few fields arrive in shapes the bar no longer
//! accepts. They are repaired in place, then flattened into selection
//! fields.

use std::str::FromStr;

use indexmap::IndexMap;
use serde_json::{json, Map, Value};

use crate::snapshot::{keys, FieldValue};
use crate::variant::{RangeOption, SelectRange, Sign};

/// Keys in the filter-bar data that are bookkeeping, not filters.
pub const IGNORED_KEYS: [&str; 2] = ["_CUSTOM", "sap-ushell-defaultedParameterNames"];

pub type FilterBarData = IndexMap<String, Value>;

pub fn repair_filter_data(data: &mut FilterBarData) {
    repair_ledger(data);
    repair_debit_credit_code(data);
    repair_functional_area(data);
    repair_fiscal_period(data);
    repair_fiscal_year(data);
}

/// A missing ledger stays empty so the first search reports it.
fn repair_ledger(data: &mut FilterBarData) {
    let ledger = data
        .get(keys::LEDGER)
        .filter(|value| is_filled(value))
        .cloned()
        .unwrap_or_else(|| Value::String(String::new()));
    let wrapped = if ledger.get("value").is_some() {
        ledger
    } else {
        json!({ "value": ledger })
    };
    data.insert(keys::LEDGER.to_string(), wrapped);
}

fn repair_debit_credit_code(data: &mut FilterBarData) {
    let Some(Value::Object(code)) = data.get_mut("DebitCreditCode") else {
        return;
    };
    let value = match code.get("value") {
        Some(Value::String(text)) if !text.is_empty() => text.clone(),
        _ => return,
    };
    let items = code
        .entry("items")
        .or_insert_with(|| Value::Array(Vec::new()));
    if let Value::Array(items) = items {
        items.push(json!({ "key": value }));
    }
    code.insert("value".to_string(), Value::String(String::new()));
}

fn repair_functional_area(data: &mut FilterBarData) {
    let value = match data.get("FunctionalArea").and_then(|area| area.get("value")) {
        Some(Value::String(text)) if !text.is_empty() => text.clone(),
        _ => return,
    };
    data.insert(
        "FunctionalArea".to_string(),
        ranges_wrapper("FunctionalArea", "EQ", &value, None),
    );
}

/// `LedgerFiscalPeriod` arrives either as `low = "001-012"` or as a
/// low/high pair; periods are the first three characters.
fn repair_fiscal_period(data: &mut FilterBarData) {
    let Some(period) = data.get("LedgerFiscalPeriod") else {
        return;
    };
    let low_raw = match period.get("low") {
        Some(Value::String(text)) if !text.is_empty() => text.as_str(),
        _ => return,
    };
    let (low, high): (String, String) = if low_raw.chars().count() == 7 {
        (prefix(low_raw, 3), low_raw.chars().skip(4).collect())
    } else {
        let low = prefix(low_raw, 3);
        let high = match period.get("high") {
            Some(Value::String(text)) if !text.is_empty() => prefix(text, 3),
            _ => low.clone(),
        };
        (low, high)
    };
    let wrapper = ranges_wrapper("FiscalPeriod", "BT", &low, Some(&high));
    data.insert("FiscalPeriod".to_string(), wrapper);
}

fn repair_fiscal_year(data: &mut FilterBarData) {
    let Some(year) = data.get("LedgerFiscalYear").filter(|value| is_filled(value)) else {
        return;
    };
    let year = match year.get("value") {
        Some(inner) if is_filled(inner) => inner,
        _ => year,
    };
    let Some(text) = scalar_text(year) else {
        return;
    };
    data.insert(
        "LedgerFiscalYear".to_string(),
        ranges_wrapper("LedgerFiscalYear", "EQ", &text, None),
    );
}

fn ranges_wrapper(key_field: &str, operation: &str, value1: &str, value2: Option<&str>) -> Value {
    json!({
        "items": [],
        "ranges": [{
            "exclude": false,
            "keyField": key_field,
            "operation": operation,
            "value1": value1,
            "value2": value2,
        }],
    })
}

fn prefix(text: &str, len: usize) -> String {
    text.chars().take(len).collect()
}

/// Truthiness of a filter-bar value: empty strings, null, false and zero
/// count as not filled.
pub fn is_filled(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::String(text) => !text.is_empty(),
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacySelection {
    pub fields: Vec<(String, FieldValue)>,
    /// Filled entries, which the filter bar has to show.
    pub filled: Vec<String>,
}

pub fn filter_data_to_fields(data: &FilterBarData) -> LegacySelection {
    let mut selection = LegacySelection::default();
    for (name, value) in data {
        if IGNORED_KEYS.contains(&name.as_str()) {
            continue;
        }
        if is_filled(value) {
            selection.filled.push(name.clone());
        }
        if let Some(field) = field_value(value) {
            selection.fields.push((name.clone(), field));
        }
    }
    selection
}

fn field_value(value: &Value) -> Option<FieldValue> {
    match value {
        Value::Object(object) => object_value(object),
        Value::Null | Value::Array(_) => None,
        scalar => scalar_text(scalar).map(FieldValue::Parameter),
    }
}

fn object_value(object: &Map<String, Value>) -> Option<FieldValue> {
    let mut ranges = Vec::new();
    if let Some(Value::Array(items)) = object.get("items") {
        ranges.extend(
            items
                .iter()
                .filter_map(|item| item.get("key").and_then(scalar_text))
                .map(SelectRange::equal_to),
        );
    }
    if let Some(Value::Array(entries)) = object.get("ranges") {
        ranges.extend(entries.iter().filter_map(range_of));
    }
    if let Some(low) = object.get("low").and_then(scalar_text) {
        let high = object.get("high").and_then(scalar_text).unwrap_or_default();
        ranges.push(if high.is_empty() {
            SelectRange::equal_to(low)
        } else {
            SelectRange::between(low, high)
        });
    }

    match object.get("value") {
        Some(value) if ranges.is_empty() => scalar_text(value).map(FieldValue::Parameter),
        Some(value) => {
            if let Some(text) = scalar_text(value).filter(|text| !text.is_empty()) {
                ranges.push(SelectRange::equal_to(text));
            }
            Some(FieldValue::Ranges(ranges))
        }
        None if ranges.is_empty() => None,
        None => Some(FieldValue::Ranges(ranges)),
    }
}

fn range_of(entry: &Value) -> Option<SelectRange> {
    let operation = entry.get("operation").and_then(Value::as_str)?;
    let Ok(option) = RangeOption::from_str(operation) else {
        tracing::warn!(operation, "skipping range with unknown operation");
        return None;
    };
    let low = entry.get("value1").and_then(scalar_text).unwrap_or_default();
    let high = entry.get("value2").and_then(scalar_text).unwrap_or_default();
    let mut range = SelectRange::new(option, low, high);
    if entry.get("exclude").and_then(Value::as_bool) == Some(true) {
        range.sign = Sign::Exclude;
    }
    Some(range)
}
