//! Compiles a filter snapshot into the single parameterized read the
//! result table binds to.

use indexmap::IndexSet;
use serde::Serialize;
use strum::{Display, EnumIter};
use time::Date;

use crate::config::QueryConfig;
use crate::error::SynthesisError;
use crate::snapshot::{format_iso_date, keys, ExpandLevel, FilterSnapshot, OpenItemFilter};
use crate::status::{FieldFilter, SortKey, StatusPolicy};

/// Projected fields that are computed in the display currency.
pub const DISPLAY_CURRENCY_FIELDS: [&str; 4] = [
    "AmountInDisplayCurrency",
    keys::DISPLAY_CURRENCY,
    keys::EXCHANGE_RATE_TYPE,
    keys::EXCHANGE_RATE_DATE,
];

/// (requested, companion) pairs; requesting the first pulls in the second
/// so navigation targets can render without another round trip.
const COMPANION_FIELDS: [(&str, &str); 3] = [
    ("MasterFixedAsset", "FixedAsset"),
    ("FixedAsset", "MasterFixedAsset"),
    ("OrderID", "OrderCategory"),
];

/// Ordered set of requested result columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Projection(IndexSet<String>);

impl Projection {
    /// Parses a comma separated `$select` list.
    pub fn from_select(select: &str) -> Self {
        select
            .split(',')
            .map(str::trim)
            .filter(|field| !field.is_empty())
            .collect()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains(field)
    }

    pub fn insert(&mut self, field: impl Into<String>) -> bool {
        self.0.insert(field.into())
    }

    pub fn to_select(&self) -> String {
        self.0.iter().map(String::as_str).collect::<Vec<_>>().join(",")
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn needs_display_currency(&self) -> bool {
        DISPLAY_CURRENCY_FIELDS
            .iter()
            .any(|field| self.contains(field))
    }

    /// Adds missing companion fields and returns the ones added.
    pub fn complete(&mut self) -> Vec<String> {
        let requested = self.clone();
        let mut added = Vec::new();
        for (field, companion) in COMPANION_FIELDS {
            if requested.contains(field) && !requested.contains(companion) && self.insert(companion) {
                added.push(companion.to_string());
            }
        }
        added
    }
}

impl<S: Into<String>> FromIterator<S> for Projection {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Projection(iter.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumIter)]
pub enum StatusTypeCode {
    #[strum(serialize = "All-items")]
    #[serde(rename = "All-items")]
    AllItems,
    #[strum(serialize = "Open-items-OIM-only")]
    #[serde(rename = "Open-items-OIM-only")]
    OpenItemsOimOnly,
    #[strum(serialize = "Open-items-all-accounts")]
    #[serde(rename = "Open-items-all-accounts")]
    OpenItemsAllAccounts,
    #[strum(serialize = "Cleared-items-with-keydate")]
    #[serde(rename = "Cleared-items-with-keydate")]
    ClearedWithKeyDate,
    #[strum(serialize = "Cleared-items-without-keydate")]
    #[serde(rename = "Cleared-items-without-keydate")]
    ClearedWithoutKeyDate,
}

impl StatusTypeCode {
    pub fn resolve(policy: &StatusPolicy) -> Self {
        match policy {
            StatusPolicy::All => StatusTypeCode::AllItems,
            StatusPolicy::Open {
                open_items: OpenItemFilter::Exclude,
                ..
            } => StatusTypeCode::OpenItemsOimOnly,
            StatusPolicy::Open { .. } => StatusTypeCode::OpenItemsAllAccounts,
            StatusPolicy::Cleared {
                key_date: Some(_), ..
            } => StatusTypeCode::ClearedWithKeyDate,
            StatusPolicy::Cleared { key_date: None, .. } => StatusTypeCode::ClearedWithoutKeyDate,
        }
    }

    /// Value of the `P_ClearingStatusSelection` parameter.
    pub fn wire_code(&self) -> &'static str {
        match self {
            StatusTypeCode::AllItems => "1",
            StatusTypeCode::OpenItemsOimOnly => "2",
            StatusTypeCode::OpenItemsAllAccounts => "3",
            StatusTypeCode::ClearedWithKeyDate => "4",
            StatusTypeCode::ClearedWithoutKeyDate => "5",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryParameters {
    pub display_currency: String,
    pub exchange_rate_type: String,
    pub exchange_rate_date: Date,
    pub key_date: Date,
    pub status: StatusTypeCode,
    /// Set when the currency triple is a stand-in and not user input.
    pub placeholders: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadDescriptor {
    pub entity_set: String,
    pub parameters: QueryParameters,
    pub projection: Projection,
    pub added_fields: Vec<String>,
    pub filters: Vec<FieldFilter>,
    pub sort: Vec<SortKey>,
    pub expand_level: ExpandLevel,
}

impl ReadDescriptor {
    pub fn path(&self) -> String {
        let params = &self.parameters;
        format!(
            "/{}(P_DisplayCurrency='{}',P_ExchangeRateType='{}',P_ExchangeRateDate=datetime'{}',P_KeyDate=datetime'{}',P_ClearingStatusSelection='{}')/Results",
            self.entity_set,
            params.display_currency,
            params.exchange_rate_type,
            datetime_literal(params.exchange_rate_date),
            datetime_literal(params.key_date),
            params.status.wire_code(),
        )
    }
}

/// Midnight date-time literal with the colons already URI-encoded.
fn datetime_literal(date: Date) -> String {
    format!("{}T00%3A00%3A00", format_iso_date(date))
}

#[derive(Debug, Clone)]
pub struct QuerySynthesizer {
    config: QueryConfig,
}

impl QuerySynthesizer {
    pub fn new(config: QueryConfig) -> Self {
        Self { config }
    }

    pub fn synthesize(
        &self,
        snapshot: &FilterSnapshot,
        projection: &Projection,
        today: Date,
    ) -> Result<ReadDescriptor, SynthesisError> {
        let policy = StatusPolicy::from_snapshot(snapshot);
        policy.validate()?;

        let (display_currency, exchange_rate_type, exchange_rate_date, placeholders) =
            if projection.needs_display_currency() {
                let currency = snapshot
                    .display_currency
                    .clone()
                    .filter(|value| !value.is_empty())
                    .ok_or(SynthesisError::DisplayCurrencyIncomplete {
                        missing: "display currency",
                    })?;
                let rate_type = snapshot
                    .exchange_rate_type
                    .clone()
                    .filter(|value| !value.is_empty())
                    .ok_or(SynthesisError::DisplayCurrencyIncomplete {
                        missing: "exchange rate type",
                    })?;
                let rate_date = snapshot.exchange_rate_date.ok_or(
                    SynthesisError::DisplayCurrencyIncomplete {
                        missing: "exchange rate date",
                    },
                )?;
                (currency, rate_type, rate_date, false)
            } else {
                (
                    self.config.placeholder_currency.clone(),
                    self.config.placeholder_rate_type.clone(),
                    today,
                    true,
                )
            };

        let status = StatusTypeCode::resolve(&policy);
        let key_date = match status {
            StatusTypeCode::AllItems | StatusTypeCode::ClearedWithoutKeyDate => today,
            _ => snapshot.key_date.unwrap_or(today),
        };

        let mut projection = projection.clone();
        let added_fields = projection.complete();

        let descriptor = ReadDescriptor {
            entity_set: self.config.entity_set.clone(),
            parameters: QueryParameters {
                display_currency,
                exchange_rate_type,
                exchange_rate_date,
                key_date,
                status,
                placeholders,
            },
            projection,
            added_fields,
            filters: policy.extra_filters(),
            sort: StatusPolicy::default_sort(),
            expand_level: snapshot.expand_level,
        };
        tracing::debug!(path = %descriptor.path(), status = %status, "read synthesized");
        Ok(descriptor)
    }
}
