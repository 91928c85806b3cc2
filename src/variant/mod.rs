//! Selection-variant wire document.
//!
//! The document is the portable filter format exchanged with the token store
//! and with other applications: `{ Parameters: [...], SelectOptions: [...] }`.
//! The service rejects `null` values, so every string slot is deserialized
//! leniently (`null` becomes `""`, booleans and numbers become their text) and
//! nothing is ever written back as `null`.

use std::fmt;

use indexmap::IndexMap;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VariantVersion {
    #[serde(default, deserialize_with = "lenient_string")]
    pub major: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub minor: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub patch: String,
}

impl Default for VariantVersion {
    fn default() -> Self {
        Self {
            major: "1".into(),
            minor: "0".into(),
            patch: "0".into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SelectionVariant {
    #[serde(default)]
    pub version: VariantVersion,
    #[serde(
        rename = "SelectionVariantID",
        default,
        deserialize_with = "lenient_string"
    )]
    pub selection_variant_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub text: String,
    #[serde(
        rename = "ODataFilterExpression",
        default,
        deserialize_with = "lenient_string"
    )]
    pub odata_filter_expression: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub parameters: Vec<Parameter>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub select_options: Vec<SelectOption>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Parameter {
    pub property_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub property_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SelectOption {
    pub property_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ranges: Vec<SelectRange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SelectRange {
    #[serde(default)]
    pub sign: Sign,
    pub option: RangeOption,
    #[serde(default, deserialize_with = "lenient_string")]
    pub low: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub high: String,
}

impl SelectRange {
    pub fn new(option: RangeOption, low: impl Into<String>, high: impl Into<String>) -> Self {
        Self {
            sign: Sign::Include,
            option,
            low: low.into(),
            high: high.into(),
        }
    }

    pub fn equal_to(value: impl Into<String>) -> Self {
        Self::new(RangeOption::Eq, value, "")
    }

    pub fn between(low: impl Into<String>, high: impl Into<String>) -> Self {
        Self::new(RangeOption::Bt, low, high)
    }

    pub fn excluded(mut self) -> Self {
        self.sign = Sign::Exclude;
        self
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum Sign {
    #[default]
    #[serde(rename = "I")]
    #[strum(serialize = "I")]
    Include,
    #[serde(rename = "E")]
    #[strum(serialize = "E")]
    Exclude,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum RangeOption {
    Eq,
    Ne,
    Bt,
    Nb,
    Lt,
    Le,
    Gt,
    Ge,
    Cp,
    Np,
}

impl SelectionVariant {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn to_json(&self) -> String {
        // every slot is a plain string, so this cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Minimal variant for URL-parameter navigation: one EQ select option
    /// per supplied value, nothing else.
    pub fn from_url_params(params: &IndexMap<String, Vec<String>>) -> Self {
        let mut variant = Self::default();
        for (name, values) in params {
            for value in values {
                variant.add_select_option(name, SelectRange::equal_to(value.clone()));
            }
        }
        variant
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty() && self.select_options.is_empty()
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|param| param.property_name == name)
            .map(|param| param.property_value.as_str())
    }

    pub fn select_option(&self, name: &str) -> Option<&[SelectRange]> {
        self.select_options
            .iter()
            .find(|option| option.property_name == name)
            .map(|option| option.ranges.as_slice())
    }

    /// Replaces an existing parameter of the same name.
    pub fn set_parameter(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .parameters
            .iter_mut()
            .find(|param| param.property_name == name)
        {
            Some(param) => param.property_value = value,
            None => self.parameters.push(Parameter {
                property_name: name.to_string(),
                property_value: value,
            }),
        }
    }

    pub fn add_select_option(&mut self, name: &str, range: SelectRange) {
        match self
            .select_options
            .iter_mut()
            .find(|option| option.property_name == name)
        {
            Some(option) => option.ranges.push(range),
            None => self.select_options.push(SelectOption {
                property_name: name.to_string(),
                ranges: vec![range],
            }),
        }
    }

    pub fn remove_parameter(&mut self, name: &str) -> Option<String> {
        let idx = self
            .parameters
            .iter()
            .position(|param| param.property_name == name)?;
        Some(self.parameters.remove(idx).property_value)
    }

    pub fn remove_select_option(&mut self, name: &str) -> Option<Vec<SelectRange>> {
        let idx = self
            .select_options
            .iter()
            .position(|option| option.property_name == name)?;
        Some(self.select_options.remove(idx).ranges)
    }

    pub fn clear(&mut self) {
        self.parameters.clear();
        self.select_options.clear();
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .iter()
            .map(|param| param.property_name.as_str())
            .chain(
                self.select_options
                    .iter()
                    .map(|option| option.property_name.as_str()),
            )
    }

    /// Drops every parameter and select option whose name matches.
    pub fn retain_properties<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.parameters.retain(|param| keep(&param.property_name));
        self.select_options
            .retain(|option| keep(&option.property_name));
    }
}

impl fmt::Display for SelectionVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json())
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(String::new()),
        Value::String(text) => Ok(text),
        Value::Bool(flag) => Ok(flag.to_string()),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(de::Error::custom(format!(
            "expected a scalar value, found {other}"
        ))),
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts a selection variant given either as a JSON object or as a string
/// holding JSON, which is how navigation payloads usually carry it.
pub(crate) fn variant_from_string_or_object<'de, D>(
    deserializer: D,
) -> Result<Option<SelectionVariant>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(None),
        Value::String(raw) if raw.trim().is_empty() => Ok(None),
        Value::String(raw) => SelectionVariant::from_json(&raw)
            .map(Some)
            .map_err(de::Error::custom),
        other => serde_json::from_value(other)
            .map(Some)
            .map_err(de::Error::custom),
    }
}

pub(crate) fn variant_as_string<S>(
    variant: &SelectionVariant,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&variant.to_json())
}
