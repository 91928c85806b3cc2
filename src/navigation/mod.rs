//! Inbound navigation: turning an app-state token, a legacy navigation key
//! or plain URL parameters into the snapshot the session starts from.

pub mod legacy;
pub mod readiness;
pub mod smartlink;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use time::Date;

use crate::appstate::{AppState, AppStateCodec, CustomData};
use crate::config::NavigationConfig;
use crate::error::NavigationError;
use crate::snapshot::{keys, FilterSnapshot, OpenItemFilter, TableState};
use crate::status::{ItemStatus, LayoutMode, StatusPolicy};
use crate::surface::FilterSurface;
use crate::variant::{variant_from_string_or_object, RangeOption, SelectionVariant};

pub use readiness::{GateState, Readiness, ReadinessGate, ReadinessSender, StartupBarrier};
pub use smartlink::{row_details_link, table_cell_link, LinkTarget, SmartLinkOutcome, UseCase};

const USER_DEFAULT_LAYOUT: &str = "SelectUserDefaultLayoutVariant";
const ONLY_OIM_ACCOUNTS: &str = "SelectOnlyOIMAccounts";
const OPEN_AT_KEY_DATE: &str = "SelectForOpenAtKeydate";

const RESPONDER_ON: &str = "responderOn";
const PARAMETERS_PROVIDED: &str = "parametersProvided";
/// Navigation-only keys; they steer the resolution and are not filters.
const CONTROL_KEYS: [&str; 5] = [
    USER_DEFAULT_LAYOUT,
    ONLY_OIM_ACCOUNTS,
    OPEN_AT_KEY_DATE,
    RESPONDER_ON,
    PARAMETERS_PROVIDED,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NavType {
    #[default]
    #[serde(rename = "initial")]
    Initial,
    #[serde(rename = "iAppState")]
    IAppState,
    #[serde(rename = "xAppState")]
    XAppState,
    #[serde(rename = "URLParams")]
    UrlParams,
}

impl NavType {
    pub fn is_inbound(&self) -> bool {
        !matches!(self, NavType::Initial)
    }
}

/// Application data delivered with an inbound navigation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppData {
    /// The sender only forwarded the user's default values.
    #[serde(rename = "bNavSelVarHasDefaultsOnly", default)]
    pub defaults_only: bool,
    #[serde(default)]
    pub use_nav_key_format: bool,
    #[serde(rename = "oFilterBarFilterData", default)]
    pub filter_bar_data: legacy::FilterBarData,
    #[serde(default, deserialize_with = "variant_from_string_or_object")]
    pub selection_variant: Option<SelectionVariant>,
    #[serde(default)]
    pub table_variant_id: Option<String>,
    #[serde(default)]
    pub custom_data: CustomData,
}

impl From<AppState> for AppData {
    fn from(state: AppState) -> Self {
        Self {
            selection_variant: Some(state.selection_variant),
            table_variant_id: state.table_variant_id,
            custom_data: state.custom_data,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundNavigation {
    #[serde(default)]
    pub nav_type: NavType,
    #[serde(default)]
    pub app_data: AppData,
    #[serde(default)]
    pub url_params: IndexMap<String, Vec<String>>,
    /// Token of a stored app state, looked up before resolution.
    #[serde(default, alias = "sap-iapp-state")]
    pub app_state_key: Option<String>,
}

impl InboundNavigation {
    pub fn from_json(raw: &str) -> Result<Self, NavigationError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn initial() -> Self {
        Self::default()
    }

    /// Launched by a test responder with canned parameters. Such sessions
    /// never write app states.
    pub fn is_responder(&self) -> bool {
        [RESPONDER_ON, PARAMETERS_PROVIDED].iter().any(|key| {
            self.url_params
                .get(*key)
                .is_some_and(|values| values.iter().any(|value| !value.is_empty()))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum TableVariantDirective {
    /// Leave the table variant the surface picked on its own.
    Keep,
    Standard,
    Explicit(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub snapshot: FilterSnapshot,
    pub table_variant: TableVariantDirective,
    /// Run a search as soon as the surface is no longer pending.
    pub auto_search: bool,
    /// Fields made visible because the payload filled them.
    pub exposed_fields: Vec<String>,
}

impl Resolution {
    pub fn unchanged(current: &FilterSnapshot) -> Self {
        Self {
            snapshot: current.clone(),
            table_variant: TableVariantDirective::Keep,
            auto_search: false,
            exposed_fields: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NavigationResolver {
    codec: AppStateCodec,
    force_standard_table_variant: bool,
}

impl NavigationResolver {
    pub fn new(codec: AppStateCodec, config: &NavigationConfig) -> Self {
        Self {
            codec,
            force_standard_table_variant: config.force_standard_table_variant,
        }
    }

    pub fn resolve(
        &self,
        inbound: InboundNavigation,
        current: &FilterSnapshot,
        surface: &mut dyn FilterSurface,
        leading_ledger: Option<&str>,
        today: Date,
    ) -> Result<Resolution, NavigationError> {
        let nav_type = inbound.nav_type;
        if !nav_type.is_inbound() {
            return Ok(Resolution::unchanged(current));
        }

        let mut app_data = inbound.app_data;
        let defaults_only = app_data.defaults_only;
        let nav_key = nav_type == NavType::XAppState && app_data.use_nav_key_format;
        // user defaults must not override the status of the loaded variant
        if defaults_only {
            app_data.custom_data.item_status = Some(current.status);
        }
        let mut custom = app_data.custom_data;
        let mut snapshot = current.clone();
        let mut exposed_fields = Vec::new();
        let mut use_user_layout = false;

        let variant = app_data.selection_variant.or_else(|| {
            (nav_type == NavType::UrlParams && !inbound.url_params.is_empty())
                .then(|| SelectionVariant::from_url_params(&inbound.url_params))
        });

        if nav_key {
            let mut filter_data = app_data.filter_bar_data;
            legacy::repair_filter_data(&mut filter_data);
            let selection = legacy::filter_data_to_fields(&filter_data);
            snapshot.clear_selection();
            for (name, value) in selection.fields {
                snapshot.apply_field(&name, value);
            }
            for name in selection.filled {
                surface.add_to_advanced_area(&name);
                exposed_fields.push(name);
            }
            custom.item_status = Some(ItemStatus::All);
        } else if let Some(variant) = variant {
            if !defaults_only || surface.is_current_variant_standard() {
                for name in variant.property_names() {
                    if !CONTROL_KEYS.contains(&name) {
                        surface.add_to_advanced_area(name);
                        exposed_fields.push(name.to_string());
                    }
                }
                snapshot.clear_selection();
                snapshot.apply_variant(&variant);
                for key in CONTROL_KEYS {
                    snapshot.fields.remove(key);
                }
                if let Some(ledger) = leading_ledger {
                    snapshot.fill_ledger(ledger);
                }
            }
            use_user_layout = apply_control_keys(&variant, &mut custom);
        }

        let table_variant = match app_data.table_variant_id {
            Some(id) => TableVariantDirective::Explicit(id),
            None if self.force_standard_table_variant
                && !use_user_layout
                && (!defaults_only || nav_key) =>
            {
                TableVariantDirective::Standard
            }
            None => TableVariantDirective::Keep,
        };
        let explicit_id = match &table_variant {
            TableVariantDirective::Explicit(id) => Some(id.clone()),
            _ => None,
        };
        match custom
            .smart_table_state
            .as_ref()
            .filter(|table| table.has_unsaved_settings())
        {
            Some(table) => snapshot.table_state = Some(table.to_table_state(explicit_id)?),
            None => match &table_variant {
                TableVariantDirective::Explicit(id) => {
                    snapshot.table_state = Some(TableState {
                        variant_id: Some(id.clone()),
                        ..TableState::default()
                    })
                }
                TableVariantDirective::Standard => snapshot.table_state = None,
                TableVariantDirective::Keep => {}
            },
        }

        let full_restore = !defaults_only || nav_key;
        if full_restore {
            self.codec
                .restore_custom_data(&mut snapshot, &custom, ItemStatus::All, today)?;
            AppStateCodec::expose_restored_fields(&custom, surface);
            StatusPolicy::layout(
                snapshot.status,
                LayoutMode::PreserveDefaults,
                surface.has_fiscal_year_variant(),
            )
            .apply(&mut snapshot, surface, today);
        } else if let Some(currency) = &custom.display_currency {
            if surface.is_field_present(keys::DISPLAY_CURRENCY) {
                snapshot.display_currency = Some(currency.clone()).filter(|value| !value.is_empty());
            }
        }

        tracing::info!(
            ?nav_type,
            status = %snapshot.status,
            defaults_only,
            nav_key,
            table_variant = ?table_variant,
            "inbound navigation resolved"
        );
        Ok(Resolution {
            snapshot,
            table_variant,
            auto_search: full_restore,
            exposed_fields,
        })
    }
}

/// Applies the navigation-only keys of a selection variant to the custom
/// data. Returns whether the user's own table layout was requested.
fn apply_control_keys(variant: &SelectionVariant, custom: &mut CustomData) -> bool {
    let use_user_layout = first_value(variant, USER_DEFAULT_LAYOUT) == Some("true");
    if first_value(variant, ONLY_OIM_ACCOUNTS) == Some("false") {
        custom.is_open_item_managed_flag = Some(OpenItemFilter::Include);
    }
    if let Some(currency) = first_value(variant, keys::DISPLAY_CURRENCY) {
        custom.display_currency = Some(currency.to_string());
    }
    let open_at = variant
        .select_option(OPEN_AT_KEY_DATE)
        .and_then(|ranges| ranges.first())
        .filter(|range| range.option == RangeOption::Eq && !range.low.is_empty());
    if let Some(range) = open_at {
        custom.item_status = Some(ItemStatus::Open);
        custom.key_date = Some(range.low.clone());
    }
    use_user_layout
}

/// Low value of the first range, else the parameter value.
fn first_value<'a>(variant: &'a SelectionVariant, name: &str) -> Option<&'a str> {
    variant
        .select_option(name)
        .and_then(|ranges| ranges.first())
        .map(|range| range.low.as_str())
        .or_else(|| variant.parameter(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DefaultsConfig;
    use crate::snapshot::{DateRange, ExpandLevel, FieldValue};
    use crate::surface::InMemorySurface;
    use crate::variant::SelectRange;
    use assert_matches::assert_matches;
    use serde_json::json;
    use time::macros::date;

    const TODAY: Date = date!(2026 - 10 - 18);

    fn resolver() -> NavigationResolver {
        NavigationResolver::new(
            AppStateCodec::new(&DefaultsConfig::default()),
            &NavigationConfig::default(),
        )
    }

    fn start() -> FilterSnapshot {
        let mut snapshot = FilterSnapshot::initial(TODAY, "M");
        snapshot.fill_ledger("0L");
        snapshot
    }

    fn inbound(value: serde_json::Value) -> InboundNavigation {
        InboundNavigation::from_json(&value.to_string()).expect("inbound json")
    }

    fn resolve(nav: InboundNavigation, surface: &mut InMemorySurface) -> Resolution {
        resolver()
            .resolve(nav, &start(), surface, Some("0L"), TODAY)
            .expect("resolution")
    }

    #[test]
    fn initial_navigation_keeps_defaults() {
        let mut surface = InMemorySurface::new();
        let resolution = resolve(InboundNavigation::initial(), &mut surface);
        assert_eq!(resolution, Resolution::unchanged(&start()));
    }

    #[test]
    fn app_state_restores_status_and_table_variant() {
        let mut surface = InMemorySurface::new();
        let nav = inbound(json!({
            "navType": "xAppState",
            "appData": {
                "selectionVariant": "{\"SelectOptions\":[{\"PropertyName\":\"GLAccount\",\"Ranges\":[{\"Sign\":\"I\",\"Option\":\"EQ\",\"Low\":\"400000\",\"High\":null}]},{\"PropertyName\":\"ClearingDate\",\"Ranges\":[{\"Sign\":\"I\",\"Option\":\"BT\",\"Low\":\"2024-01-01\",\"High\":\"2024-06-30\"}]}]}",
                "tableVariantId": "ZLAYOUT",
                "customData": {
                    "ItemStatus": "Cleared",
                    "KeyDate": "2024-05-01",
                    "LevelSelection": "L2",
                    "LevelVisibility": true
                }
            }
        }));
        let resolution = resolve(nav, &mut surface);
        let snapshot = &resolution.snapshot;

        assert_eq!(snapshot.status, ItemStatus::Cleared);
        assert_eq!(snapshot.key_date, Some(date!(2024 - 05 - 01)));
        assert_eq!(
            snapshot.clearing_date,
            Some(DateRange::between(date!(2024 - 01 - 01), date!(2024 - 06 - 30)))
        );
        assert_eq!(snapshot.expand_level, ExpandLevel(2));
        assert_eq!(snapshot.fields.get(keys::LEDGER), Some(&FieldValue::Parameter("0L".into())));
        assert_eq!(resolution.table_variant, TableVariantDirective::Explicit("ZLAYOUT".into()));
        assert!(resolution.auto_search);
        assert!(surface.is_field_present("GLAccount"));
        assert!(surface.is_field_present(keys::KEY_DATE));
        assert!(surface.item(keys::CLEARING_DATE).expect("clearing").visible_in_bar);
    }

    #[test]
    fn defaults_only_keeps_current_status() {
        let mut surface = InMemorySurface::with_fields([keys::DISPLAY_CURRENCY]);
        let nav = inbound(json!({
            "navType": "xAppState",
            "appData": {
                "bNavSelVarHasDefaultsOnly": true,
                "selectionVariant": {
                    "Parameters": [{"PropertyName": "CompanyCode", "PropertyValue": "1010"}]
                },
                "customData": { "ItemStatus": "All", "DisplayCurrency": "USD" }
            }
        }));
        let resolution = resolve(nav, &mut surface);

        assert_eq!(resolution.snapshot.status, ItemStatus::Open);
        assert_eq!(resolution.snapshot.display_currency.as_deref(), Some("USD"));
        assert!(resolution.snapshot.fields.contains("CompanyCode"));
        assert_eq!(resolution.table_variant, TableVariantDirective::Keep);
        assert!(!resolution.auto_search);
    }

    #[test]
    fn defaults_only_does_not_override_a_loaded_variant() {
        let mut surface = InMemorySurface::new();
        surface.set_standard_variant(false);
        let nav = inbound(json!({
            "navType": "URLParams",
            "appData": {
                "bNavSelVarHasDefaultsOnly": true,
                "selectionVariant": {
                    "Parameters": [{"PropertyName": "CompanyCode", "PropertyValue": "1010"}]
                }
            }
        }));
        let resolution = resolve(nav, &mut surface);
        assert!(!resolution.snapshot.fields.contains("CompanyCode"));
        assert!(resolution.exposed_fields.is_empty());
    }

    #[test]
    fn control_keys_steer_status_and_layout() {
        let mut surface = InMemorySurface::new();
        let nav = inbound(json!({
            "navType": "xAppState",
            "appData": {
                "selectionVariant": {
                    "Parameters": [
                        {"PropertyName": "SelectUserDefaultLayoutVariant", "PropertyValue": "true"},
                        {"PropertyName": "SelectOnlyOIMAccounts", "PropertyValue": "false"},
                        {"PropertyName": "DisplayCurrency", "PropertyValue": "CHF"}
                    ],
                    "SelectOptions": [{
                        "PropertyName": "SelectForOpenAtKeydate",
                        "Ranges": [{"Sign": "I", "Option": "EQ", "Low": "2025-12-31", "High": null}]
                    }]
                }
            }
        }));
        let resolution = resolve(nav, &mut surface);
        let snapshot = &resolution.snapshot;

        assert_eq!(snapshot.status, ItemStatus::Open);
        assert_eq!(snapshot.key_date, Some(date!(2025 - 12 - 31)));
        assert_eq!(snapshot.open_item_filter, OpenItemFilter::Include);
        assert_eq!(snapshot.display_currency.as_deref(), Some("CHF"));
        assert!(!snapshot.fields.contains(OPEN_AT_KEY_DATE));
        assert!(!snapshot.fields.contains(USER_DEFAULT_LAYOUT));
        assert_eq!(resolution.table_variant, TableVariantDirective::Keep);
    }

    #[test]
    fn legacy_navigation_key_forces_all_items() {
        let mut surface = InMemorySurface::new();
        let nav = inbound(json!({
            "navType": "xAppState",
            "appData": {
                "bNavSelVarHasDefaultsOnly": true,
                "useNavKeyFormat": true,
                "oFilterBarFilterData": {
                    "CompanyCode": { "items": [{ "key": "1010" }] },
                    "LedgerFiscalYear": "2024",
                    "_CUSTOM": { "status": "Open" }
                },
                "customData": { "ItemStatus": "Open" }
            }
        }));
        let resolution = resolve(nav, &mut surface);
        let snapshot = &resolution.snapshot;

        assert_eq!(snapshot.status, ItemStatus::All);
        assert_eq!(snapshot.fields.get(keys::LEDGER), Some(&FieldValue::Parameter(String::new())));
        assert_eq!(snapshot.fields.get("LedgerFiscalYear"), Some(&FieldValue::equal_to("2024")));
        assert_eq!(resolution.table_variant, TableVariantDirective::Standard);
        assert!(resolution.auto_search);
        assert!(resolution.exposed_fields.contains(&"CompanyCode".to_string()));
        assert!(!surface.is_field_present("_CUSTOM"));
    }

    #[test]
    fn url_parameters_become_equality_filters() {
        let mut surface = InMemorySurface::new();
        let nav = inbound(json!({
            "navType": "URLParams",
            "urlParams": { "CompanyCode": ["1010", "1710"], "GLAccount": ["400000"] }
        }));
        let resolution = resolve(nav, &mut surface);

        assert_eq!(resolution.snapshot.status, ItemStatus::All);
        assert_eq!(
            resolution.snapshot.fields.get("CompanyCode"),
            Some(&FieldValue::Ranges(vec![
                SelectRange::equal_to("1010"),
                SelectRange::equal_to("1710")
            ]))
        );
        assert_eq!(resolution.table_variant, TableVariantDirective::Standard);
    }

    #[test]
    fn unsaved_table_settings_are_carried() {
        let mut surface = InMemorySurface::new();
        let nav = inbound(json!({
            "navType": "iAppState",
            "appData": {
                "customData": {
                    "ItemStatus": "All",
                    "SmartTableState": {
                        "tableSelectionVariant": "",
                        "tablePresentationVariant": "{\"SortOrder\":[]}",
                        "isTableVariantDirty": true
                    }
                }
            }
        }));
        let resolution = resolve(nav, &mut surface);
        let table = resolution.snapshot.table_state.expect("table state");
        assert!(table.dirty);
        assert_eq!(table.presentation, json!({"SortOrder": []}));
    }

    #[test]
    fn malformed_payloads_are_navigation_errors() {
        assert_matches!(
            InboundNavigation::from_json("{\"navType\": \"xAppState\", \"appData\": {\"selectionVariant\": \"{not json\"}}"),
            Err(NavigationError::Payload(_))
        );

        let mut surface = InMemorySurface::new();
        let nav = inbound(json!({
            "navType": "iAppState",
            "appData": { "customData": { "KeyDate": "tomorrow" } }
        }));
        assert_matches!(
            resolver().resolve(nav, &start(), &mut surface, None, TODAY),
            Err(NavigationError::Codec(_))
        );
    }
}
