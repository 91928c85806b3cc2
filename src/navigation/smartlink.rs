//! Outbound smart links: how the current selection and the clicked row are
//! merged into the selection variant handed to the navigation target.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::error::MessageKey;
use crate::snapshot::keys;
use crate::variant::SelectionVariant;

/// Row keys that never become navigation parameters: ids, amounts,
/// quantities, currencies and OData bookkeeping.
static EXCLUDED_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"_metadata|ID|to_|Amount|Quantity|Currency|Parameters|Crcy")
        .expect("valid exclusion pattern")
});

/// Partner or alternative field and the business field it stands for.
const PARTNER_FIELDS: [(&str, &str); 10] = [
    ("AlternativeGLAccount", "GLAccount"),
    ("CountryChartOfAccounts", "ChartOfAccounts"),
    ("OffsettingAccount", "GLAccount"),
    ("PartnerCompanyCode", "CompanyCode"),
    ("PartnerProfitCenter", "ProfitCenter"),
    ("PartnerFunctionalArea", "FunctionalArea"),
    ("PartnerBusinessArea", "BusinessArea"),
    ("PartnerSegment", "Segment"),
    ("PartnerCostCenter", "CostCenter"),
    ("PartnerOrder", "OrderID"),
];

const CLEARING_DOCUMENT: &str = "ClearingAccountingDocument";
const CLEARING_FISCAL_YEAR: &str = "ClearingDocFiscalYear";
const NOT_CLEARED_YEAR: &str = "0000";
const CREATED_BY_USER: &str = "AccountingDocCreatedByUser";

/// Fields kept from the clearing context besides the document and year.
const CLEARING_CONTEXT: [&str; 4] = [keys::LEDGER, "CompanyCode", "ChartOfAccounts", "GLAccount"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseCase {
    /// Plain link: the whole row refines the current selection.
    Init,
    /// Partner field: only the counterpart business field is passed.
    Partner {
        link_field: &'static str,
        counterpart: &'static str,
    },
    /// Clearing document: navigate to the clearing entry instead.
    Clearing,
    /// Contact card link, the current selection is passed as is.
    PassThrough,
}

impl UseCase {
    /// Dispatches on the link field, with or without the binding slash.
    pub fn for_link_field(link_field: &str) -> Self {
        let field = link_field.trim_start_matches('/');
        if let Some((link_field, counterpart)) =
            PARTNER_FIELDS.iter().copied().find(|(partner, _)| *partner == field)
        {
            return UseCase::Partner {
                link_field,
                counterpart,
            };
        }
        match field {
            CLEARING_DOCUMENT | CLEARING_FISCAL_YEAR => UseCase::Clearing,
            CREATED_BY_USER => UseCase::PassThrough,
            _ => UseCase::Init,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkTarget {
    pub selection_variant: SelectionVariant,
    /// Replacement semantic attributes; `None` leaves the link's own.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_attributes: Option<IndexMap<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum SmartLinkOutcome {
    Navigate(LinkTarget),
    /// Navigation is replaced by an informational message.
    Suppressed { message: MessageKey },
}

/// Row entries eligible as parameters, converted to text.
pub fn candidate_fields(row: &IndexMap<String, Value>) -> impl Iterator<Item = (&str, String)> {
    row.iter().filter_map(|(key, value)| {
        if EXCLUDED_KEY.is_match(key) {
            return None;
        }
        let text = match value {
            Value::String(text) if !text.is_empty() => text.clone(),
            Value::Number(number) => number.to_string(),
            _ => return None,
        };
        Some((key.as_str(), text))
    })
}

/// Smart link from the row-details popup.
pub fn row_details_link(
    row: &IndexMap<String, Value>,
    link_field: &str,
    current: &SelectionVariant,
) -> SmartLinkOutcome {
    let use_case = UseCase::for_link_field(link_field);
    let mut variant = current.clone();
    match use_case {
        UseCase::PassThrough => {}
        UseCase::Init => {
            for (key, text) in candidate_fields(row) {
                variant.remove_select_option(key);
                variant.set_parameter(key, text);
            }
        }
        UseCase::Partner {
            link_field,
            counterpart,
        } => {
            variant.clear();
            if let Some((_, text)) = candidate_fields(row).find(|(key, _)| *key == link_field) {
                variant.set_parameter(counterpart, text);
            }
        }
        UseCase::Clearing => {
            if row.get(CLEARING_FISCAL_YEAR).and_then(Value::as_str) == Some(NOT_CLEARED_YEAR) {
                tracing::info!("clearing link on an uncleared item suppressed");
                return SmartLinkOutcome::Suppressed {
                    message: MessageKey::ClearingNotYetDone,
                };
            }
            variant.clear();
            for (key, text) in candidate_fields(row) {
                match key {
                    CLEARING_DOCUMENT => variant.set_parameter("AccountingDocument", text),
                    CLEARING_FISCAL_YEAR => variant.set_parameter("FiscalYear", text),
                    _ if CLEARING_CONTEXT.contains(&key) => variant.set_parameter(key, text),
                    _ => {}
                }
            }
        }
    }
    tracing::debug!(?use_case, link_field, "smart link prepared");
    SmartLinkOutcome::Navigate(LinkTarget {
        selection_variant: variant,
        semantic_attributes: None,
    })
}

/// Smart link on a result-table cell. Only clearing columns of the
/// accounting document are rewritten.
pub fn table_cell_link(
    semantic_object: &str,
    original_id: &str,
    attributes: &IndexMap<String, Value>,
    current: &SelectionVariant,
) -> SmartLinkOutcome {
    if semantic_object != "AccountingDocument" || !original_id.contains("Clearing") {
        return SmartLinkOutcome::Navigate(LinkTarget {
            selection_variant: current.clone(),
            semantic_attributes: None,
        });
    }
    if original_id.contains(CLEARING_FISCAL_YEAR)
        && attributes.get(CLEARING_FISCAL_YEAR).and_then(Value::as_str) == Some(NOT_CLEARED_YEAR)
    {
        return SmartLinkOutcome::Suppressed {
            message: MessageKey::ClearingNotYetDone,
        };
    }

    let mut reduced = IndexMap::new();
    for (key, value) in attributes {
        if CLEARING_CONTEXT.contains(&key.as_str()) || key == "AccountingDocument" {
            reduced.insert(key.clone(), value.clone());
        } else if key == CLEARING_FISCAL_YEAR {
            reduced.insert("FiscalYear".to_string(), value.clone());
        }
    }
    if let Some(document) = attributes.get(CLEARING_DOCUMENT).filter(|value| !is_blank(value)) {
        reduced.insert("AccountingDocument".to_string(), document.clone());
    }

    SmartLinkOutcome::Navigate(LinkTarget {
        selection_variant: SelectionVariant::default(),
        semantic_attributes: Some(reduced),
    })
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::SelectRange;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn row(value: Value) -> IndexMap<String, Value> {
        serde_json::from_value(value).expect("row")
    }

    fn current() -> SelectionVariant {
        let mut variant = SelectionVariant::default();
        variant.set_parameter("Ledger", "0L");
        variant.add_select_option("CompanyCode", SelectRange::equal_to("1010"));
        variant.add_select_option("GLAccount", SelectRange::between("400000", "499999"));
        variant
    }

    fn navigated(outcome: SmartLinkOutcome) -> LinkTarget {
        match outcome {
            SmartLinkOutcome::Navigate(target) => target,
            other => panic!("expected navigation, got {other:?}"),
        }
    }

    #[test]
    fn dispatch_by_link_field() {
        assert_eq!(
            UseCase::for_link_field("/PartnerCostCenter"),
            UseCase::Partner {
                link_field: "PartnerCostCenter",
                counterpart: "CostCenter"
            }
        );
        assert_eq!(UseCase::for_link_field("PartnerOrder"), UseCase::Partner {
            link_field: "PartnerOrder",
            counterpart: "OrderID"
        });
        assert_eq!(UseCase::for_link_field("/ClearingDocFiscalYear"), UseCase::Clearing);
        assert_eq!(UseCase::for_link_field("/AccountingDocCreatedByUser"), UseCase::PassThrough);
        assert_eq!(UseCase::for_link_field("/GLAccount"), UseCase::Init);
    }

    #[test]
    fn candidates_drop_ids_amounts_and_flags() {
        let data = row(json!({
            "__metadata": { "uri": "x" },
            "AccountingDocument": "100000001",
            "CompanyCodeID": "x",
            "AmountInCompanyCodeCurrency": "12.00",
            "CompanyCodeCurrency": "EUR",
            "to_JournalEntry": {},
            "IsReversal": true,
            "Segment": "",
            "Supplier": null,
            "FiscalYear": 2024,
        }));
        let keys: Vec<_> = candidate_fields(&data).map(|(key, _)| key).collect();
        assert_eq!(keys, vec!["AccountingDocument", "FiscalYear"]);
    }

    #[test]
    fn init_overrides_matching_select_options() {
        let data = row(json!({ "GLAccount": "400100", "ProfitCenter": "YB600" }));
        let target = navigated(row_details_link(&data, "/GLAccount", &current()));
        let variant = target.selection_variant;
        assert_eq!(variant.select_option("GLAccount"), None);
        assert_eq!(variant.parameter("GLAccount"), Some("400100"));
        assert_eq!(variant.parameter("ProfitCenter"), Some("YB600"));
        assert_eq!(variant.parameter("Ledger"), Some("0L"));
        assert!(variant.select_option("CompanyCode").is_some());
    }

    #[test]
    fn partner_field_replaces_origin_only() {
        let data = row(json!({ "PartnerCostCenter": "1000", "OtherField": "x" }));
        let target = navigated(row_details_link(&data, "/PartnerCostCenter", &current()));
        let variant = target.selection_variant;
        assert_eq!(variant.parameter("CostCenter"), Some("1000"));
        assert_eq!(variant.parameter("OtherField"), None);
        assert_eq!(variant.property_names().collect::<Vec<_>>(), vec!["CostCenter"]);
    }

    #[test]
    fn clearing_document_replaces_document_and_year() {
        let data = row(json!({
            "Ledger": "0L",
            "CompanyCode": "1010",
            "AccountingDocument": "100000001",
            "FiscalYear": "2023",
            "ClearingAccountingDocument": "150000007",
            "ClearingDocFiscalYear": "2024",
            "Supplier": "17300001",
        }));
        let target = navigated(row_details_link(&data, "/ClearingAccountingDocument", &current()));
        let variant = target.selection_variant;
        assert_eq!(variant.parameter("AccountingDocument"), Some("150000007"));
        assert_eq!(variant.parameter("FiscalYear"), Some("2024"));
        assert_eq!(variant.parameter("CompanyCode"), Some("1010"));
        assert_eq!(variant.parameter("Supplier"), None);
        assert!(variant.select_options.is_empty());
    }

    #[test]
    fn uncleared_year_suppresses_navigation() {
        let data = row(json!({
            "ClearingAccountingDocument": "",
            "ClearingDocFiscalYear": "0000",
        }));
        assert_matches!(
            row_details_link(&data, "/ClearingDocFiscalYear", &current()),
            SmartLinkOutcome::Suppressed { message: MessageKey::ClearingNotYetDone }
        );
    }

    #[test]
    fn created_by_user_passes_selection_through() {
        let data = row(json!({ "AccountingDocCreatedByUser": "JDOE" }));
        let target = navigated(row_details_link(&data, "/AccountingDocCreatedByUser", &current()));
        assert_eq!(target.selection_variant, current());
    }

    #[test]
    fn table_clearing_cell_reduces_attributes() {
        let attributes = row(json!({
            "Ledger": "0L",
            "CompanyCode": "1010",
            "AccountingDocument": "100000001",
            "ClearingAccountingDocument": "150000007",
            "ClearingDocFiscalYear": "2024",
            "Supplier": "17300001",
        }));
        let target = navigated(table_cell_link(
            "AccountingDocument",
            "glview--ClearingAccountingDocument",
            &attributes,
            &current(),
        ));
        assert!(target.selection_variant.is_empty());
        let reduced = target.semantic_attributes.expect("attributes");
        assert_eq!(reduced["AccountingDocument"], json!("150000007"));
        assert_eq!(reduced["FiscalYear"], json!("2024"));
        assert!(!reduced.contains_key("Supplier"));
        assert!(!reduced.contains_key("ClearingDocFiscalYear"));

        let mut uncleared = attributes.clone();
        uncleared.insert("ClearingDocFiscalYear".into(), json!("0000"));
        assert_matches!(
            table_cell_link("AccountingDocument", "ClearingDocFiscalYear", &uncleared, &current()),
            SmartLinkOutcome::Suppressed { .. }
        );
    }

    #[test]
    fn other_table_cells_are_untouched() {
        let attributes = row(json!({ "Supplier": "17300001" }));
        let target = navigated(table_cell_link("Supplier", "Supplier", &attributes, &current()));
        assert_eq!(target.selection_variant, current());
        assert_eq!(target.semantic_attributes, None);
    }
}
