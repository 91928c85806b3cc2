//! Item-status rules: which dates are mandatory, which filters are injected,
//! and how the filter bar is laid out for Open, Cleared and All items.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use strum::{AsRefStr, Display, EnumIter, EnumString};
use time::Date;

use crate::error::ValidityError;
use crate::snapshot::{keys, DateRange, ExpandLevel, FilterSnapshot, OpenItemFilter};
use crate::surface::FilterSurface;
use crate::variant::RangeOption;

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum ItemStatus {
    #[default]
    Open,
    Cleared,
    All,
}

/// Status rules evaluated against the dates captured from a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusPolicy {
    Open {
        key_date: Option<Date>,
        open_items: OpenItemFilter,
    },
    Cleared {
        key_date: Option<Date>,
        clearing_to: Option<Date>,
    },
    All,
}

/// Extra data filter appended to the read, e.g. `IsOpenItemManaged eq 'X'`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldFilter {
    pub field: String,
    pub operator: RangeOption,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortKey {
    pub field: &'static str,
    pub direction: SortDirection,
    pub numeric_aware: bool,
}

impl SortKey {
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        let ordering = if self.numeric_aware {
            numeric_aware_cmp(a, b)
        } else {
            a.cmp(b)
        };
        match self.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

/// Compares digit runs by value so that `"9" < "10"`.
pub fn numeric_aware_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();
    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let ln = take_digits(&mut left);
                let rn = take_digits(&mut right);
                let lt = ln.trim_start_matches('0');
                let rt = rn.trim_start_matches('0');
                let ordering = lt.len().cmp(&rt.len()).then_with(|| lt.cmp(rt));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(l), Some(r)) => {
                if l != r {
                    return l.cmp(&r);
                }
                left.next();
                right.next();
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(ch) = chars.peek().copied() {
        if !ch.is_ascii_digit() {
            break;
        }
        digits.push(ch);
        chars.next();
    }
    digits
}

/// The `_CUSTOM` block saved with filter-bar variants.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomFields {
    #[serde(default)]
    pub status: ItemStatus,
    #[serde(rename = "fromDate", default)]
    pub from_date: bool,
    #[serde(rename = "toDate", default)]
    pub to_date: bool,
    #[serde(rename = "keyDate")]
    pub key_date: Option<Date>,
    #[serde(rename = "exRateDate")]
    pub exchange_rate_date: Option<Date>,
    #[serde(rename = "exRateType")]
    pub exchange_rate_type: Option<String>,
    #[serde(rename = "dispCur")]
    pub display_currency: Option<String>,
    #[serde(rename = "expLevel")]
    pub expand_level: Option<ExpandLevel>,
    #[serde(rename = "XOPVWselect")]
    pub open_item_filter: Option<OpenItemFilter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
pub enum DateOperation {
    #[strum(serialize = "DATERANGE")]
    DateRange,
    #[strum(serialize = "YEARTODATE")]
    YearToDate,
    #[strum(serialize = "FISCAL_YEAR_TO_DATE")]
    FiscalYearToDate,
}

impl DateOperation {
    /// Range implied by the operator right after it is set. The fiscal
    /// year start is only known to the surface, so only the end is fixed.
    pub fn initial_range(&self, today: Date) -> Option<DateRange> {
        match self {
            DateOperation::DateRange => None,
            DateOperation::YearToDate => Some(DateRange::year_to_date(today)),
            DateOperation::FiscalYearToDate => Some(DateRange::until(today)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemLayout {
    pub visible_in_bar: bool,
    pub operation: Option<DateOperation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDateReset {
    Today,
    Clear,
}

/// How the layout is being applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutMode {
    /// Interactive status switch: dates and operators are reset.
    Defaults,
    /// Restoring from a token: only item visibility changes.
    PreserveDefaults,
    /// Loading a filter-bar variant; the flags gate the date items.
    VariantLoad { from_date: bool, to_date: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLayout {
    pub status: ItemStatus,
    pub key_date_visible: bool,
    pub posting_date: Option<ItemLayout>,
    pub clearing_date: Option<ItemLayout>,
    pub key_date_reset: Option<KeyDateReset>,
}

impl StatusLayout {
    /// Pushes the layout to the surface and resets the affected snapshot
    /// values. Applying the same layout twice leaves the same state.
    pub fn apply(&self, snapshot: &mut FilterSnapshot, surface: &mut dyn FilterSurface, today: Date) {
        snapshot.status = self.status;
        if self.key_date_visible {
            surface.set_visible_in_bar(keys::KEY_DATE, true);
        }
        if let Some(item) = self.posting_date {
            surface.set_visible_in_bar(keys::POSTING_DATE, item.visible_in_bar);
            if let Some(operation) = item.operation {
                surface.set_date_operation(keys::POSTING_DATE, operation);
                snapshot.posting_date = operation.initial_range(today);
            }
        }
        if let Some(item) = self.clearing_date {
            surface.set_visible_in_bar(keys::CLEARING_DATE, item.visible_in_bar);
            if let Some(operation) = item.operation {
                surface.set_date_operation(keys::CLEARING_DATE, operation);
                snapshot.clearing_date = operation.initial_range(today);
            }
        }
        match self.key_date_reset {
            Some(KeyDateReset::Today) => snapshot.key_date = Some(today),
            Some(KeyDateReset::Clear) => snapshot.key_date = None,
            None => {}
        }
        tracing::debug!(status = %self.status, "status layout applied");
    }
}

impl StatusPolicy {
    pub fn from_snapshot(snapshot: &FilterSnapshot) -> Self {
        match snapshot.status {
            ItemStatus::Open => StatusPolicy::Open {
                key_date: snapshot.key_date,
                open_items: snapshot.open_item_filter,
            },
            ItemStatus::Cleared => StatusPolicy::Cleared {
                key_date: snapshot.key_date,
                clearing_to: snapshot.clearing_upper_bound(),
            },
            ItemStatus::All => StatusPolicy::All,
        }
    }

    pub fn status(&self) -> ItemStatus {
        match self {
            StatusPolicy::Open { .. } => ItemStatus::Open,
            StatusPolicy::Cleared { .. } => ItemStatus::Cleared,
            StatusPolicy::All => ItemStatus::All,
        }
    }

    pub fn validate(&self) -> Result<(), ValidityError> {
        match self {
            StatusPolicy::Open { key_date: None, .. } => Err(ValidityError::KeyDateMissing),
            StatusPolicy::Open { .. } => Ok(()),
            StatusPolicy::Cleared {
                key_date: Some(key_date),
                clearing_to: Some(clearing_to),
            } if key_date >= clearing_to => Err(ValidityError::KeyDateNotBeforeClearing {
                key_date: *key_date,
                clearing_to: *clearing_to,
            }),
            StatusPolicy::Cleared { .. } | StatusPolicy::All => Ok(()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn extra_filters(&self) -> Vec<FieldFilter> {
        match self {
            StatusPolicy::Open {
                open_items: OpenItemFilter::Exclude,
                ..
            } => vec![FieldFilter {
                field: "IsOpenItemManaged".to_string(),
                operator: RangeOption::Eq,
                value: "X".to_string(),
            }],
            _ => Vec::new(),
        }
    }

    pub fn default_sort() -> Vec<SortKey> {
        vec![
            SortKey {
                field: "AssignmentReference",
                direction: SortDirection::Descending,
                numeric_aware: true,
            },
            SortKey {
                field: "AccountingDocument",
                direction: SortDirection::Descending,
                numeric_aware: true,
            },
        ]
    }

    /// Custom-field record for variant save. Currency fields hidden from the
    /// surface are left out so stale values do not leak into the variant.
    pub fn custom_fields(&self, snapshot: &FilterSnapshot, surface: &dyn FilterSurface) -> CustomFields {
        let exposed = |name: &str, value: Option<String>| {
            if surface.is_field_present(name) {
                value
            } else {
                None
            }
        };
        CustomFields {
            status: self.status(),
            from_date: false,
            to_date: false,
            key_date: match self {
                StatusPolicy::Open { key_date, .. } | StatusPolicy::Cleared { key_date, .. } => {
                    *key_date
                }
                StatusPolicy::All => None,
            },
            exchange_rate_date: if surface.is_field_present(keys::EXCHANGE_RATE_DATE) {
                snapshot.exchange_rate_date
            } else {
                None
            },
            exchange_rate_type: exposed(
                keys::EXCHANGE_RATE_TYPE,
                snapshot.exchange_rate_type.clone(),
            ),
            display_currency: exposed(keys::DISPLAY_CURRENCY, snapshot.display_currency.clone()),
            expand_level: Some(snapshot.expand_level),
            open_item_filter: Some(snapshot.open_item_filter),
        }
    }

    pub fn layout(status: ItemStatus, mode: LayoutMode, fiscal_year_variant: bool) -> StatusLayout {
        let default_operation = if fiscal_year_variant {
            DateOperation::FiscalYearToDate
        } else {
            DateOperation::YearToDate
        };
        let explicit = Some(DateOperation::DateRange);
        let (resets, from_date, to_date) = match mode {
            LayoutMode::Defaults => (true, true, true),
            LayoutMode::PreserveDefaults => (false, false, false),
            LayoutMode::VariantLoad { from_date, to_date } => (false, from_date, to_date),
        };
        let item = |enabled: bool, visible_in_bar: bool, operation: Option<DateOperation>| {
            enabled.then_some(ItemLayout {
                visible_in_bar,
                operation,
            })
        };

        match status {
            ItemStatus::All => StatusLayout {
                status,
                key_date_visible: false,
                // posting date always goes to the bar for All
                posting_date: Some(ItemLayout {
                    visible_in_bar: true,
                    operation: from_date.then_some(default_operation),
                }),
                clearing_date: item(to_date, false, explicit),
                key_date_reset: None,
            },
            ItemStatus::Open => StatusLayout {
                status,
                key_date_visible: true,
                posting_date: item(from_date, false, explicit),
                clearing_date: item(to_date, false, explicit),
                key_date_reset: (resets || matches!(mode, LayoutMode::VariantLoad { .. }))
                    .then_some(KeyDateReset::Today),
            },
            ItemStatus::Cleared => StatusLayout {
                status,
                key_date_visible: true,
                posting_date: item(from_date, false, explicit),
                clearing_date: match mode {
                    LayoutMode::PreserveDefaults => Some(ItemLayout {
                        visible_in_bar: true,
                        operation: None,
                    }),
                    _ => item(to_date, true, Some(default_operation)),
                },
                key_date_reset: resets.then_some(KeyDateReset::Clear),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::InMemorySurface;
    use assert_matches::assert_matches;
    use time::macros::date;

    fn snapshot(status: ItemStatus) -> FilterSnapshot {
        FilterSnapshot {
            status,
            ..FilterSnapshot::default()
        }
    }

    #[test]
    fn open_requires_key_date() {
        let mut open = snapshot(ItemStatus::Open);
        assert_matches!(
            StatusPolicy::from_snapshot(&open).validate(),
            Err(ValidityError::KeyDateMissing)
        );

        open.key_date = Some(date!(2024 - 01 - 01));
        assert!(StatusPolicy::from_snapshot(&open).is_valid());
    }

    #[test]
    fn cleared_key_date_must_precede_clearing_bound() {
        let mut cleared = snapshot(ItemStatus::Cleared);
        cleared.key_date = Some(date!(2024 - 06 - 01));
        cleared.clearing_date = Some(DateRange::between(
            date!(2024 - 01 - 01),
            date!(2024 - 05 - 01),
        ));
        assert_matches!(
            StatusPolicy::from_snapshot(&cleared).validate(),
            Err(ValidityError::KeyDateNotBeforeClearing { .. })
        );

        cleared.clearing_date = Some(DateRange::until(date!(2024 - 07 - 01)));
        assert!(StatusPolicy::from_snapshot(&cleared).is_valid());

        // equal is not strictly before
        cleared.clearing_date = Some(DateRange::until(date!(2024 - 06 - 01)));
        assert!(!StatusPolicy::from_snapshot(&cleared).is_valid());

        cleared.key_date = None;
        assert!(StatusPolicy::from_snapshot(&cleared).is_valid());
    }

    #[test]
    fn single_day_and_open_ended_clearing_ranges_have_no_bound() {
        let mut cleared = snapshot(ItemStatus::Cleared);
        cleared.key_date = Some(date!(2024 - 06 - 01));

        cleared.clearing_date = Some(DateRange::between(
            date!(2024 - 03 - 01),
            date!(2024 - 03 - 01),
        ));
        assert!(StatusPolicy::from_snapshot(&cleared).is_valid());

        cleared.clearing_date = Some(DateRange::since(date!(2024 - 03 - 01)));
        assert!(StatusPolicy::from_snapshot(&cleared).is_valid());

        // an interval ending on the same day still counts
        cleared.clearing_date = Some(DateRange::between(
            date!(2024 - 02 - 01),
            date!(2024 - 03 - 01),
        ));
        assert!(!StatusPolicy::from_snapshot(&cleared).is_valid());
    }

    #[test]
    fn all_is_always_valid() {
        assert!(StatusPolicy::from_snapshot(&snapshot(ItemStatus::All)).is_valid());
    }

    #[test]
    fn excluded_non_oim_accounts_add_filter() {
        let mut open = snapshot(ItemStatus::Open);
        open.open_item_filter = OpenItemFilter::Exclude;
        let filters = StatusPolicy::from_snapshot(&open).extra_filters();
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].field, "IsOpenItemManaged");
        assert_eq!(filters[0].value, "X");

        open.open_item_filter = OpenItemFilter::Include;
        assert!(StatusPolicy::from_snapshot(&open).extra_filters().is_empty());
    }

    #[test]
    fn default_sort_is_numeric_aware_descending() {
        let sort = StatusPolicy::default_sort();
        let fields: Vec<_> = sort.iter().map(|key| key.field).collect();
        assert_eq!(fields, ["AssignmentReference", "AccountingDocument"]);

        let mut docs = vec!["100000009", "100000010", "99"];
        docs.sort_by(|a, b| sort[1].compare(a, b));
        assert_eq!(docs, ["100000010", "100000009", "99"]);
        assert_eq!(numeric_aware_cmp("A9", "A10"), Ordering::Less);
        assert_eq!(numeric_aware_cmp("007", "7"), Ordering::Equal);
    }

    #[test]
    fn custom_fields_drop_hidden_currency_values() {
        let mut open = snapshot(ItemStatus::Open);
        open.key_date = Some(date!(2024 - 03 - 31));
        open.display_currency = Some("USD".into());
        open.exchange_rate_type = Some("M".into());
        open.exchange_rate_date = Some(date!(2024 - 03 - 31));

        let surface = InMemorySurface::with_fields([keys::DISPLAY_CURRENCY]);
        let fields = StatusPolicy::from_snapshot(&open).custom_fields(&open, &surface);
        assert_eq!(fields.status, ItemStatus::Open);
        assert_eq!(fields.key_date, Some(date!(2024 - 03 - 31)));
        assert_eq!(fields.display_currency.as_deref(), Some("USD"));
        assert_eq!(fields.exchange_rate_type, None);
        assert_eq!(fields.exchange_rate_date, None);
    }

    #[test]
    fn status_switch_resets_dates() {
        let today = date!(2026 - 10 - 18);
        let mut surface = InMemorySurface::new();
        let mut state = FilterSnapshot::initial(today, "M");

        StatusPolicy::layout(ItemStatus::Cleared, LayoutMode::Defaults, false)
            .apply(&mut state, &mut surface, today);
        assert_eq!(state.status, ItemStatus::Cleared);
        assert_eq!(state.key_date, None);
        assert_eq!(state.posting_date, None);
        assert_eq!(state.clearing_date, Some(DateRange::year_to_date(today)));
        let clearing = surface.item(keys::CLEARING_DATE).expect("clearing item");
        assert!(clearing.visible_in_bar);
        assert_eq!(clearing.operation, Some(DateOperation::YearToDate));

        StatusPolicy::layout(ItemStatus::Open, LayoutMode::Defaults, false)
            .apply(&mut state, &mut surface, today);
        assert_eq!(state.key_date, Some(today));
        assert_eq!(state.clearing_date, None);
        assert!(!surface.item(keys::CLEARING_DATE).expect("item").visible_in_bar);
    }

    #[test]
    fn status_switch_is_idempotent() {
        let today = date!(2026 - 10 - 18);
        let layout = StatusPolicy::layout(ItemStatus::All, LayoutMode::Defaults, true);

        let mut surface = InMemorySurface::new();
        let mut state = FilterSnapshot::initial(today, "M");
        layout.apply(&mut state, &mut surface, today);
        let (first_state, first_surface) = (state.clone(), surface.clone());
        layout.apply(&mut state, &mut surface, today);

        assert_eq!(state, first_state);
        assert_eq!(
            surface.item(keys::POSTING_DATE),
            first_surface.item(keys::POSTING_DATE)
        );
        assert_eq!(
            surface.item(keys::POSTING_DATE).and_then(|item| item.operation),
            Some(DateOperation::FiscalYearToDate)
        );
    }

    #[test]
    fn preserving_layout_keeps_dates() {
        let today = date!(2026 - 10 - 18);
        let mut surface = InMemorySurface::new();
        let mut state = snapshot(ItemStatus::Cleared);
        state.key_date = Some(date!(2024 - 01 - 15));
        state.clearing_date = Some(DateRange::until(date!(2024 - 02 - 01)));
        let before = state.clone();

        StatusPolicy::layout(ItemStatus::Cleared, LayoutMode::PreserveDefaults, false)
            .apply(&mut state, &mut surface, today);
        assert_eq!(state, before);
        assert!(surface.is_field_present(keys::CLEARING_DATE));
    }
}
