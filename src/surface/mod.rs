//! The filter bar as seen by the engine.
//!
//! Rendering lives elsewhere; the engine only asks which fields are exposed,
//! whether the bar is mid-update, and pushes values and item layout back.

use indexmap::IndexMap;

use crate::snapshot::FieldValue;
use crate::status::DateOperation;

pub trait FilterSurface {
    /// Whether the field is currently shown as a filter item.
    fn is_field_present(&self, name: &str) -> bool;

    /// True while the bar is applying a change and values are unsettled.
    fn is_pending(&self) -> bool;

    fn field_value(&self, name: &str) -> Option<FieldValue>;

    fn set_field_value(&mut self, name: &str, value: Option<FieldValue>);

    fn set_visible_in_bar(&mut self, name: &str, visible: bool);

    fn set_date_operation(&mut self, name: &str, operation: DateOperation);

    /// Exposes the field in the advanced area so its value is honoured.
    fn add_to_advanced_area(&mut self, name: &str);

    /// Deselects the field from the current variant.
    fn remove_from_current_variant(&mut self, name: &str);

    fn is_current_variant_standard(&self) -> bool;

    fn has_fiscal_year_variant(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurfaceItem {
    pub present: bool,
    pub visible_in_bar: bool,
    pub operation: Option<DateOperation>,
}

/// Surface without a screen: the CLI and tests drive the engine through it.
#[derive(Debug, Clone, Default)]
pub struct InMemorySurface {
    items: IndexMap<String, SurfaceItem>,
    values: IndexMap<String, FieldValue>,
    pending: bool,
    standard_variant: bool,
    fiscal_year_variant: bool,
}

impl InMemorySurface {
    pub fn new() -> Self {
        Self {
            standard_variant: true,
            ..Self::default()
        }
    }

    pub fn with_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut surface = Self::new();
        for field in fields {
            surface.add_to_advanced_area(field.as_ref());
        }
        surface
    }

    pub fn set_pending(&mut self, pending: bool) {
        self.pending = pending;
    }

    pub fn set_standard_variant(&mut self, standard: bool) {
        self.standard_variant = standard;
    }

    pub fn set_fiscal_year_variant(&mut self, present: bool) {
        self.fiscal_year_variant = present;
    }

    pub fn item(&self, name: &str) -> Option<&SurfaceItem> {
        self.items.get(name)
    }
}

impl FilterSurface for InMemorySurface {
    fn is_field_present(&self, name: &str) -> bool {
        self.items.get(name).is_some_and(|item| item.present)
    }

    fn is_pending(&self) -> bool {
        self.pending
    }

    fn field_value(&self, name: &str) -> Option<FieldValue> {
        self.values.get(name).cloned()
    }

    fn set_field_value(&mut self, name: &str, value: Option<FieldValue>) {
        match value {
            Some(value) => {
                self.values.insert(name.to_string(), value);
            }
            None => {
                self.values.shift_remove(name);
            }
        }
    }

    fn set_visible_in_bar(&mut self, name: &str, visible: bool) {
        let item = self.items.entry(name.to_string()).or_default();
        item.visible_in_bar = visible;
        if visible {
            item.present = true;
        }
    }

    fn set_date_operation(&mut self, name: &str, operation: DateOperation) {
        self.items.entry(name.to_string()).or_default().operation = Some(operation);
    }

    fn add_to_advanced_area(&mut self, name: &str) {
        self.items.entry(name.to_string()).or_default().present = true;
    }

    fn remove_from_current_variant(&mut self, name: &str) {
        if let Some(item) = self.items.get_mut(name) {
            item.present = false;
            item.visible_in_bar = false;
        }
    }

    fn is_current_variant_standard(&self) -> bool {
        self.standard_variant
    }

    fn has_fiscal_year_variant(&self) -> bool {
        self.fiscal_year_variant
    }
}
