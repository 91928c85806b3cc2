//! Filter-bar variants saved by variant management. The item-status state
//! travels in a `_CUSTOM` block next to the generic selection.

use serde::{Deserialize, Serialize};
use time::Date;

use crate::snapshot::{is_internal_key, FilterSnapshot};
use crate::status::{CustomFields, ItemStatus, LayoutMode, StatusPolicy};
use crate::surface::FilterSurface;
use crate::variant::SelectionVariant;

/// Which variant is being saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantContext {
    /// The standard variant is being initialized from the current bar.
    Standard,
    Personal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FilterBarVariant {
    #[serde(rename = "_CUSTOM", default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<CustomFields>,
    #[serde(default)]
    pub selection_variant: SelectionVariant,
}

impl FilterBarVariant {
    pub fn capture(
        snapshot: &FilterSnapshot,
        surface: &dyn FilterSurface,
        context: VariantContext,
    ) -> Self {
        let mut selection_variant = snapshot.to_variant();
        selection_variant.retain_properties(|name| !is_internal_key(name));
        Self {
            custom: Some(custom_fields_for_save(snapshot, surface, context)),
            selection_variant,
        }
    }

    /// Replaces the selection with the variant's and applies its custom
    /// block, if any.
    pub fn apply(&self, snapshot: &mut FilterSnapshot, surface: &mut dyn FilterSurface, today: Date) {
        snapshot.clear_selection();
        snapshot.apply_variant(&self.selection_variant);
        if let Some(custom) = &self.custom {
            apply_custom_fields(snapshot, custom, surface, today);
        }
    }
}

pub fn custom_fields_for_save(
    snapshot: &FilterSnapshot,
    surface: &dyn FilterSurface,
    context: VariantContext,
) -> CustomFields {
    match context {
        VariantContext::Standard => CustomFields {
            status: snapshot.status,
            from_date: true,
            to_date: true,
            key_date: match snapshot.status {
                ItemStatus::All => None,
                ItemStatus::Open | ItemStatus::Cleared => snapshot.key_date,
            },
            exchange_rate_date: snapshot.exchange_rate_date,
            exchange_rate_type: snapshot.exchange_rate_type.clone(),
            display_currency: snapshot.display_currency.clone(),
            expand_level: Some(snapshot.expand_level),
            open_item_filter: Some(snapshot.open_item_filter),
        },
        VariantContext::Personal => {
            StatusPolicy::from_snapshot(snapshot).custom_fields(snapshot, surface)
        }
    }
}

/// The exchange-rate date is always reset to today; an Open variant is
/// evaluated at today's key date.
pub fn apply_custom_fields(
    snapshot: &mut FilterSnapshot,
    custom: &CustomFields,
    surface: &mut dyn FilterSurface,
    today: Date,
) {
    snapshot.exchange_rate_date = Some(today);
    snapshot.exchange_rate_type = custom.exchange_rate_type.clone();
    snapshot.display_currency = custom
        .display_currency
        .clone()
        .filter(|currency| !currency.is_empty());
    if let Some(level) = custom.expand_level {
        snapshot.expand_level = level;
    }
    snapshot.open_item_filter = custom.open_item_filter.unwrap_or_default();

    let mode = LayoutMode::VariantLoad {
        from_date: custom.from_date,
        to_date: custom.to_date,
    };
    StatusPolicy::layout(custom.status, mode, surface.has_fiscal_year_variant())
        .apply(snapshot, surface, today);

    if custom.status == ItemStatus::Cleared {
        snapshot.key_date = custom.key_date;
    }
    tracing::debug!(status = %custom.status, "variant custom fields applied");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{keys, DateRange, ExpandLevel, FieldValue, OpenItemFilter};
    use crate::surface::InMemorySurface;
    use time::macros::date;

    const TODAY: Date = date!(2026 - 10 - 18);

    fn cleared_snapshot() -> FilterSnapshot {
        let mut snapshot = FilterSnapshot {
            status: ItemStatus::Cleared,
            key_date: Some(date!(2024 - 05 - 01)),
            clearing_date: Some(DateRange::until(date!(2024 - 06 - 30))),
            exchange_rate_type: Some("M".into()),
            exchange_rate_date: Some(date!(2024 - 01 - 01)),
            display_currency: Some("JPY".into()),
            expand_level: ExpandLevel(1),
            ..FilterSnapshot::default()
        };
        snapshot.apply_field("GLAccount", FieldValue::equal_to("400000"));
        snapshot
    }

    #[test]
    fn standard_context_captures_everything() {
        let surface = InMemorySurface::new();
        let fields = custom_fields_for_save(&cleared_snapshot(), &surface, VariantContext::Standard);
        assert!(fields.from_date && fields.to_date);
        assert_eq!(fields.display_currency.as_deref(), Some("JPY"));
        assert_eq!(fields.expand_level, Some(ExpandLevel(1)));
    }

    #[test]
    fn personal_context_hides_unexposed_currency() {
        let surface = InMemorySurface::with_fields([keys::EXCHANGE_RATE_TYPE]);
        let fields = custom_fields_for_save(&cleared_snapshot(), &surface, VariantContext::Personal);
        assert!(!fields.from_date);
        assert_eq!(fields.display_currency, None);
        assert_eq!(fields.exchange_rate_type.as_deref(), Some("M"));
        assert_eq!(fields.key_date, Some(date!(2024 - 05 - 01)));
    }

    #[test]
    fn loading_a_variant_resets_rate_date_and_restores_status() {
        let source = cleared_snapshot();
        let saved = FilterBarVariant::capture(&source, &InMemorySurface::new(), VariantContext::Standard);
        let json = serde_json::to_string(&saved).expect("serialize");
        assert!(json.contains("\"_CUSTOM\""));
        assert!(json.contains("\"keyDate\""));

        let reread: FilterBarVariant = serde_json::from_str(&json).expect("parse");
        let mut surface = InMemorySurface::new();
        let mut target = FilterSnapshot::initial(TODAY, "M");
        target.apply_field("CompanyCode", FieldValue::equal_to("1010"));
        reread.apply(&mut target, &mut surface, TODAY);

        assert_eq!(target.status, ItemStatus::Cleared);
        assert_eq!(target.key_date, Some(date!(2024 - 05 - 01)));
        assert_eq!(target.exchange_rate_date, Some(TODAY));
        assert_eq!(target.display_currency.as_deref(), Some("JPY"));
        assert!(target.fields.contains("GLAccount"));
        assert!(!target.fields.contains("CompanyCode"));
        assert!(surface.item(keys::CLEARING_DATE).expect("clearing").visible_in_bar);
    }

    #[test]
    fn open_variant_uses_today_as_key_date() {
        let custom = CustomFields {
            status: ItemStatus::Open,
            key_date: Some(date!(2020 - 01 - 01)),
            open_item_filter: Some(OpenItemFilter::Exclude),
            ..CustomFields::default()
        };
        let mut surface = InMemorySurface::new();
        let mut snapshot = FilterSnapshot::default();
        apply_custom_fields(&mut snapshot, &custom, &mut surface, TODAY);
        assert_eq!(snapshot.key_date, Some(TODAY));
        assert_eq!(snapshot.open_item_filter, OpenItemFilter::Exclude);
    }

    #[test]
    fn blank_variant_currency_reads_as_unset() {
        let custom = CustomFields {
            status: ItemStatus::All,
            display_currency: Some(String::new()),
            ..CustomFields::default()
        };
        let mut snapshot = FilterSnapshot::default();
        apply_custom_fields(&mut snapshot, &custom, &mut InMemorySurface::new(), TODAY);
        assert_eq!(snapshot.display_currency, None);
    }
}
