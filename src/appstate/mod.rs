//! App-state documents: what gets stored behind a navigation token and how
//! a snapshot is rebuilt from one.

pub mod variant;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use time::Date;

use crate::config::DefaultsConfig;
use crate::error::CodecError;
use crate::snapshot::{
    format_iso_date, is_internal_key, keys, parse_iso_date, ExpandLevel, FilterSnapshot,
    OpenItemFilter, TableState,
};
use crate::status::ItemStatus;
use crate::surface::FilterSurface;
use crate::variant::{variant_as_string, variant_from_string_or_object, SelectionVariant};

/// Document persisted by the token store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    #[serde(
        default,
        serialize_with = "variant_as_string",
        deserialize_with = "variant_or_empty"
    )]
    pub selection_variant: SelectionVariant,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_variant_id: Option<String>,
    #[serde(default)]
    pub custom_data: CustomData,
}

impl AppState {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn variant_or_empty<'de, D>(deserializer: D) -> Result<SelectionVariant, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(variant_from_string_or_object(deserializer)?.unwrap_or_default())
}

/// Side channel for everything the selection variant must not carry.
/// An empty string is a value the user cleared, an absent key means the
/// field was not on the filter bar.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomData {
    pub item_status: Option<ItemStatus>,
    pub smart_table_state: Option<SmartTableState>,
    pub key_date: Option<String>,
    pub display_currency: Option<String>,
    pub exchange_rate_type: Option<String>,
    pub exchange_rate_date: Option<String>,
    pub level_selection: Option<String>,
    pub level_visibility: Option<bool>,
    pub is_open_item_managed_flag: Option<OpenItemFilter>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartTableState {
    #[serde(default)]
    pub table_selection_variant: String,
    #[serde(default)]
    pub table_presentation_variant: String,
    #[serde(default)]
    pub is_table_variant_dirty: bool,
}

#[derive(Debug, Clone)]
pub struct AppStateCodec {
    default_rate_type: String,
    default_expand_level: ExpandLevel,
}

impl AppStateCodec {
    pub fn new(defaults: &DefaultsConfig) -> Self {
        Self {
            default_rate_type: defaults.exchange_rate_type.clone(),
            default_expand_level: defaults.expand_level,
        }
    }

    pub fn serialize(&self, snapshot: &FilterSnapshot, surface: &dyn FilterSurface) -> AppState {
        let mut selection_variant = snapshot.to_variant();
        selection_variant.retain_properties(|name| !is_internal_key(name));

        let present = |name: &str| surface.is_field_present(name);
        let mut custom = CustomData {
            item_status: Some(snapshot.status),
            smart_table_state: snapshot.table_state.as_ref().map(|table| SmartTableState {
                table_selection_variant: table.selection.to_string(),
                table_presentation_variant: table.presentation.to_string(),
                is_table_variant_dirty: table.dirty,
            }),
            ..CustomData::default()
        };
        if present(keys::KEY_DATE) {
            custom.key_date = Some(snapshot.key_date.map(format_iso_date).unwrap_or_default());
        }
        if present(keys::DISPLAY_CURRENCY) {
            custom.display_currency = Some(snapshot.display_currency.clone().unwrap_or_default());
        }
        if present(keys::EXCHANGE_RATE_TYPE) {
            custom.exchange_rate_type =
                Some(snapshot.exchange_rate_type.clone().unwrap_or_default());
        }
        if present(keys::EXCHANGE_RATE_DATE) {
            custom.exchange_rate_date = Some(
                snapshot
                    .exchange_rate_date
                    .map(format_iso_date)
                    .unwrap_or_default(),
            );
        }
        if present(keys::LEVEL_SELECTION) {
            custom.level_selection = Some(snapshot.expand_level.to_string());
            custom.level_visibility = Some(snapshot.expand_level_visible);
        }
        if present(keys::OPEN_ITEM_MANAGED) {
            custom.is_open_item_managed_flag = Some(snapshot.open_item_filter);
        }

        AppState {
            selection_variant,
            table_variant_id: snapshot
                .table_state
                .as_ref()
                .and_then(|table| table.variant_id.clone()),
            custom_data: custom,
        }
    }

    /// Rebuilds a snapshot. Status comes first since it decides the key
    /// date default; a token without a status is read as Open.
    pub fn deserialize(&self, state: &AppState, today: Date) -> Result<FilterSnapshot, CodecError> {
        let mut snapshot = FilterSnapshot::default();
        snapshot.apply_variant(&state.selection_variant);
        self.restore_custom_data(&mut snapshot, &state.custom_data, ItemStatus::Open, today)?;
        snapshot.table_state = restore_table_state(state)?;
        Ok(snapshot)
    }

    pub fn restore_custom_data(
        &self,
        snapshot: &mut FilterSnapshot,
        custom: &CustomData,
        default_status: ItemStatus,
        today: Date,
    ) -> Result<(), CodecError> {
        snapshot.status = custom.item_status.unwrap_or(default_status);

        snapshot.key_date = match non_empty(&custom.key_date) {
            Some(raw) => Some(parse_date("KeyDate", raw)?),
            None if custom.key_date.is_some() => None,
            None if snapshot.status == ItemStatus::Open => Some(today),
            None => None,
        };
        snapshot.display_currency = non_empty(&custom.display_currency).map(str::to_string);
        snapshot.exchange_rate_type = match &custom.exchange_rate_type {
            Some(value) if value.is_empty() => None,
            Some(value) => Some(value.clone()),
            None => Some(self.default_rate_type.clone()),
        };
        snapshot.exchange_rate_date = match &custom.exchange_rate_date {
            Some(raw) if raw.is_empty() => None,
            Some(raw) => Some(parse_date("ExchangeRateDate", raw)?),
            None => Some(today),
        };
        match non_empty(&custom.level_selection) {
            Some(raw) => {
                snapshot.expand_level = raw.parse().map_err(CodecError::InvalidLevel)?;
                snapshot.expand_level_visible = custom.level_visibility.unwrap_or(false);
            }
            None => {
                snapshot.expand_level = self.default_expand_level;
                snapshot.expand_level_visible = false;
            }
        }
        snapshot.open_item_filter = custom.is_open_item_managed_flag.unwrap_or_default();
        Ok(())
    }

    /// Shows restored fields on the surface and deselects the ones the
    /// token does not mention.
    pub fn expose_restored_fields(custom: &CustomData, surface: &mut dyn FilterSurface) {
        let fields = [
            (keys::DISPLAY_CURRENCY, custom.display_currency.is_some()),
            (keys::EXCHANGE_RATE_TYPE, custom.exchange_rate_type.is_some()),
            (keys::EXCHANGE_RATE_DATE, custom.exchange_rate_date.is_some()),
        ];
        for (name, restored) in fields {
            if restored {
                surface.add_to_advanced_area(name);
            } else if surface.is_field_present(name) {
                surface.remove_from_current_variant(name);
            }
        }
        match non_empty(&custom.level_selection) {
            Some(_) if custom.level_visibility == Some(true) => {
                surface.add_to_advanced_area(keys::LEVEL_SELECTION)
            }
            Some(_) => {}
            None if surface.is_field_present(keys::LEVEL_SELECTION) => {
                surface.remove_from_current_variant(keys::LEVEL_SELECTION)
            }
            None => {}
        }
        if custom.key_date.is_some() {
            surface.add_to_advanced_area(keys::KEY_DATE);
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.is_empty())
}

fn parse_date(field: &'static str, raw: &str) -> Result<Date, CodecError> {
    parse_iso_date(raw).ok_or_else(|| CodecError::InvalidDate {
        field,
        value: raw.to_string(),
    })
}

impl SmartTableState {
    /// Unsaved table settings carry a presentation on top of the variant.
    pub fn has_unsaved_settings(&self) -> bool {
        self.is_table_variant_dirty && !self.table_presentation_variant.trim().is_empty()
    }

    pub fn to_table_state(&self, variant_id: Option<String>) -> Result<TableState, CodecError> {
        let parse = |raw: &str| -> Result<Value, CodecError> {
            if raw.trim().is_empty() {
                Ok(Value::Null)
            } else {
                serde_json::from_str(raw).map_err(CodecError::TableState)
            }
        };
        Ok(TableState {
            variant_id,
            selection: parse(&self.table_selection_variant)?,
            presentation: parse(&self.table_presentation_variant)?,
            dirty: self.is_table_variant_dirty,
        })
    }
}

fn restore_table_state(state: &AppState) -> Result<Option<TableState>, CodecError> {
    match &state.custom_data.smart_table_state {
        Some(table) => table.to_table_state(state.table_variant_id.clone()).map(Some),
        None => Ok(state.table_variant_id.clone().map(|id| TableState {
            variant_id: Some(id),
            ..TableState::default()
        })),
    }
}
