use serde::Serialize;
use strum::{AsRefStr, Display, EnumString};
use thiserror::Error;
use time::Date;

/// Keys of the user-visible messages the engine can report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString, AsRefStr,
)]
pub enum MessageKey {
    #[strum(serialize = "ERD1_KEYDATE")]
    #[serde(rename = "ERD1_KEYDATE")]
    KeyDateMissing,
    #[strum(serialize = "ERD2_KEYDATE")]
    #[serde(rename = "ERD2_KEYDATE")]
    KeyDateNotBeforeClearing,
    #[strum(serialize = "ERD1_PARAMS_DC")]
    #[serde(rename = "ERD1_PARAMS_DC")]
    DisplayCurrencyIncomplete,
    #[strum(serialize = "INBOUND_NAV_ERROR")]
    #[serde(rename = "INBOUND_NAV_ERROR")]
    InboundNavigation,
    #[strum(serialize = "SLIB_CONT")]
    #[serde(rename = "SLIB_CONT")]
    ClearingNotYetDone,
    #[strum(serialize = "ERROR_MES")]
    #[serde(rename = "ERROR_MES")]
    Transport,
}

impl MessageKey {
    /// English fallback text for the key.
    pub fn default_text(&self) -> &'static str {
        match self {
            MessageKey::KeyDateMissing => "Enter a key date to display open items.",
            MessageKey::KeyDateNotBeforeClearing => {
                "The key date must be earlier than the end of the clearing date range."
            }
            MessageKey::DisplayCurrencyIncomplete => {
                "Enter display currency, exchange rate type and exchange rate date."
            }
            MessageKey::InboundNavigation => "The navigation parameters could not be processed.",
            MessageKey::ClearingNotYetDone => "The item has not been cleared yet.",
            MessageKey::Transport => "The data could not be read.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidityError {
    #[error("open items need a key date")]
    KeyDateMissing,
    #[error("key date {key_date} is not before clearing date {clearing_to}")]
    KeyDateNotBeforeClearing { key_date: Date, clearing_to: Date },
}

impl ValidityError {
    pub fn message_key(&self) -> MessageKey {
        match self {
            ValidityError::KeyDateMissing => MessageKey::KeyDateMissing,
            ValidityError::KeyDateNotBeforeClearing { .. } => MessageKey::KeyDateNotBeforeClearing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisError {
    #[error(transparent)]
    Invalid(#[from] ValidityError),
    #[error("display currency parameters incomplete: {missing} missing")]
    DisplayCurrencyIncomplete { missing: &'static str },
}

impl SynthesisError {
    pub fn message_key(&self) -> MessageKey {
        match self {
            SynthesisError::Invalid(inner) => inner.message_key(),
            SynthesisError::DisplayCurrencyIncomplete { .. } => {
                MessageKey::DisplayCurrencyIncomplete
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid date '{value}' in {field}")]
    InvalidDate { field: &'static str, value: String },
    #[error("invalid expand level: {0}")]
    InvalidLevel(String),
    #[error("table state is not valid JSON")]
    TableState(#[source] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("inbound payload is not valid JSON")]
    Payload(#[from] serde_json::Error),
    #[error("inbound app state could not be restored")]
    Codec(#[from] CodecError),
    #[error("navigation token '{0}' not found")]
    UnknownToken(String),
}

impl NavigationError {
    pub fn message_key(&self) -> MessageKey {
        MessageKey::InboundNavigation
    }
}
