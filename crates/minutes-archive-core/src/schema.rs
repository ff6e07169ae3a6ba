// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Static schema of the source list.
//!
//! Maps business keys to list columns. Required columns must be present and
//! non-null on every row; optional columns fall back to a typed default.

use std::collections::HashSet;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::{MeetingItem, NOT_ARCHIVED, PublishFlag, RawItem};

/// Column names used outside of item parsing.
pub mod columns {
    pub const TITLE: &str = "Title";
    pub const DESCRIPTION: &str = "smart_BeskrivelseAvSak";
    pub const ITEM_STATUS: &str = "smart_Status";
    pub const SORTING: &str = "smart_Sortering";
    pub const ITEM_TYPE: &str = "smart_Sakstype";
    pub const DECISION: &str = "smart_Beslutning";
    pub const PUBLISH_ITEM: &str = "smart_PublisereReferat";
    pub const PUBLISH_ATTACHMENT: &str = "smart_PublisereVedlegg";
    pub const MEETING_DATE: &str = "smart_Motedato";
    pub const ITEM_RESPONSIBLE_NAME: &str = "smart_AnsvarligForOppfolging";
    pub const ITEM_RESPONSIBLE_LOOKUP_ID: &str = "smart_AnsvarligForOppfolgingLookupId";
    pub const DOCUMENT_NUMBER: &str = "smart_DokumentNummer";
    pub const ARCHIVE_STATUS: &str = "smart_Arkiveringsstatus";
    pub const RE_ARCHIVE: &str = "smart_ArkiverPaaNytt";
    pub const MINUTES_ID: &str = "smart_ReferatID";
    pub const ELEMENT_VERSION: &str = "smart_Elementversjon";
    pub const HAS_ATTACHMENTS: &str = "Attachments";
}

/// Default for an optional column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldDefault {
    /// Required column, no default.
    Required,
    Null,
    Text(&'static str),
    Number(f64),
}

impl FieldDefault {
    fn to_value(self) -> Option<Value> {
        match self {
            FieldDefault::Required => None,
            FieldDefault::Null => Some(Value::Null),
            FieldDefault::Text(text) => Some(Value::from(text)),
            FieldDefault::Number(number) => Some(Value::from(number)),
        }
    }
}

/// One row of the schema table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub key: &'static str,
    pub column: &'static str,
    pub default: FieldDefault,
}

impl FieldSpec {
    pub fn is_required(&self) -> bool {
        self.default == FieldDefault::Required
    }
}

const fn field(key: &'static str, column: &'static str, default: FieldDefault) -> FieldSpec {
    FieldSpec {
        key,
        column,
        default,
    }
}

/// The source-list schema.
pub static FIELDS: [FieldSpec; 17] = [
    field("title", columns::TITLE, FieldDefault::Text("Tittel mangler")),
    field("description", columns::DESCRIPTION, FieldDefault::Text("Beskrivelse mangler")),
    field("itemStatus", columns::ITEM_STATUS, FieldDefault::Required),
    field("sorting", columns::SORTING, FieldDefault::Number(100.0)),
    field("itemType", columns::ITEM_TYPE, FieldDefault::Required),
    field("decision", columns::DECISION, FieldDefault::Text("Beslutning mangler")),
    field("publishItem", columns::PUBLISH_ITEM, FieldDefault::Required),
    field("publishAttachment", columns::PUBLISH_ATTACHMENT, FieldDefault::Required),
    field("meetingDate", columns::MEETING_DATE, FieldDefault::Required),
    field("itemResponsibleName", columns::ITEM_RESPONSIBLE_NAME, FieldDefault::Text("Ingen ansvarlig")),
    field("itemResponsibleLookupId", columns::ITEM_RESPONSIBLE_LOOKUP_ID, FieldDefault::Null),
    field("documentNumber", columns::DOCUMENT_NUMBER, FieldDefault::Text(NOT_ARCHIVED)),
    field("archiveStatus", columns::ARCHIVE_STATUS, FieldDefault::Text("Ikke arkivert")),
    field("reArchive", columns::RE_ARCHIVE, FieldDefault::Text("Nei")),
    field("minutesId", columns::MINUTES_ID, FieldDefault::Null),
    field("elementVersion", columns::ELEMENT_VERSION, FieldDefault::Text("Ingen versjon?")),
    field("hasAttachments", columns::HAS_ATTACHMENTS, FieldDefault::Required),
];

/// Check the schema table once at startup.
pub fn validate_schema() -> Result<()> {
    let mut keys = HashSet::new();
    let mut cols = HashSet::new();
    for spec in &FIELDS {
        if !keys.insert(spec.key) {
            return Err(Error::validation(spec.key, "duplicate schema key"));
        }
        if !cols.insert(spec.column) {
            return Err(Error::validation(spec.column, "duplicate schema column"));
        }
    }
    Ok(())
}

/// Comma separated column list for `$select` queries.
pub fn select_columns() -> String {
    FIELDS
        .iter()
        .map(|spec| spec.column)
        .collect::<Vec<_>>()
        .join(",")
}

fn spec(key: &str) -> Result<&'static FieldSpec> {
    FIELDS
        .iter()
        .find(|spec| spec.key == key)
        .ok_or_else(|| Error::validation(key, "not a schema key"))
}

/// Looks up and coerces columns of one raw row.
struct RowReader<'a> {
    raw: &'a RawItem,
}

impl RowReader<'_> {
    fn field_name(&self, column: &str) -> String {
        format!("item {} column {}", self.raw.id, column)
    }

    fn value(&self, key: &str) -> Result<(&'static FieldSpec, Value)> {
        let spec = spec(key)?;
        match self.raw.fields.get(spec.column) {
            Some(value) if !value.is_null() => Ok((spec, value.clone())),
            _ => spec
                .default
                .to_value()
                .map(|value| (spec, value))
                .ok_or_else(|| {
                    Error::validation(self.field_name(spec.column), "required field is missing")
                }),
        }
    }

    fn text(&self, key: &str) -> Result<String> {
        let (spec, value) = self.value(key)?;
        match value {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            _ => Err(Error::validation(
                self.field_name(spec.column),
                "expected a text value",
            )),
        }
    }

    fn optional_text(&self, key: &str) -> Result<Option<String>> {
        let (spec, value) = self.value(key)?;
        match value {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            Value::Number(n) => Ok(Some(n.to_string())),
            _ => Err(Error::validation(
                self.field_name(spec.column),
                "expected a text value",
            )),
        }
    }

    fn number(&self, key: &str) -> Result<f64> {
        let (spec, value) = self.value(key)?;
        let number = match &value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        number.ok_or_else(|| Error::validation(self.field_name(spec.column), "expected a number"))
    }

    fn flag(&self, key: &str) -> Result<PublishFlag> {
        let (spec, value) = self.value(key)?;
        value
            .as_str()
            .and_then(PublishFlag::parse)
            .ok_or_else(|| Error::validation(self.field_name(spec.column), "expected 'Ja' or 'Nei'"))
    }

    fn boolean(&self, key: &str) -> Result<bool> {
        let (spec, value) = self.value(key)?;
        value
            .as_bool()
            .ok_or_else(|| Error::validation(self.field_name(spec.column), "expected a boolean"))
    }
}

impl MeetingItem {
    /// Parse a raw source-list row with the static schema.
    pub fn from_raw(raw: &RawItem) -> Result<Self> {
        if raw.id.trim().is_empty() {
            return Err(Error::validation("item.id", "list item has no id"));
        }
        let row = RowReader { raw };
        Ok(MeetingItem {
            id: raw.id.clone(),
            title: row.text("title")?,
            description: row.text("description")?,
            item_status: row.text("itemStatus")?,
            sorting: row.number("sorting")?,
            item_type: row.text("itemType")?,
            decision: row.text("decision")?,
            publish_item: row.flag("publishItem")?,
            publish_attachment: row.flag("publishAttachment")?,
            meeting_date: row.text("meetingDate")?,
            item_responsible_name: row.text("itemResponsibleName")?,
            item_responsible_lookup_id: row.optional_text("itemResponsibleLookupId")?,
            document_number: row.text("documentNumber")?,
            archive_status: row.text("archiveStatus")?,
            re_archive: row.flag("reArchive")?,
            minutes_id: row.optional_text("minutesId")?,
            element_version: row.text("elementVersion")?,
            has_attachments: row.boolean("hasAttachments")?,
        })
    }
}

/// Parse every raw row. The first invalid row fails the whole set.
pub fn parse_items(raw: &[RawItem]) -> Result<Vec<MeetingItem>> {
    raw.iter().map(MeetingItem::from_raw).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(fields: Value) -> RawItem {
        RawItem {
            id: "42".to_string(),
            fields: fields.as_object().cloned().unwrap_or_default(),
        }
    }

    fn minimal_fields() -> Value {
        json!({
            "smart_Status": "Ferdig",
            "smart_Sakstype": "Orientering",
            "smart_PublisereReferat": "Ja",
            "smart_PublisereVedlegg": "Nei",
            "smart_Motedato": "2025-01-14T23:00:00Z",
            "Attachments": false
        })
    }

    #[test]
    fn test_schema_is_valid() {
        validate_schema().unwrap();
        assert_eq!(FIELDS.iter().filter(|f| f.is_required()).count(), 6);
        assert!(select_columns().starts_with("Title,smart_BeskrivelseAvSak,"));
    }

    #[test]
    fn test_defaults_fill_optional_fields() {
        let item = MeetingItem::from_raw(&raw(minimal_fields())).unwrap();
        assert_eq!(item.id, "42");
        assert_eq!(item.title, "Tittel mangler");
        assert_eq!(item.sorting, 100.0);
        assert_eq!(item.document_number, NOT_ARCHIVED);
        assert!(!item.is_archived());
        assert_eq!(item.re_archive, PublishFlag::No);
        assert_eq!(item.item_responsible_lookup_id, None);
        assert!(!item.has_attachments);
    }

    #[test]
    fn test_present_values_win() {
        let mut fields = minimal_fields();
        fields["Title"] = json!("Budsjett 2026");
        fields["smart_Sortering"] = json!("3");
        fields["smart_AnsvarligForOppfolgingLookupId"] = json!(17);
        fields["smart_BeskrivelseAvSak"] = Value::Null;
        fields["Attachments"] = json!(true);
        let item = MeetingItem::from_raw(&raw(fields)).unwrap();
        assert_eq!(item.title, "Budsjett 2026");
        assert_eq!(item.sorting, 3.0);
        assert_eq!(item.item_responsible_lookup_id.as_deref(), Some("17"));
        // null falls back to the default
        assert_eq!(item.description, "Beskrivelse mangler");
        assert!(item.has_attachments);
    }

    #[test]
    fn test_missing_required_field_names_item_and_column() {
        let mut fields = minimal_fields();
        fields["smart_Status"] = Value::Null;
        let err = MeetingItem::from_raw(&raw(fields)).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("item 42"));
        assert!(msg.contains("smart_Status"));
    }

    #[test]
    fn test_invalid_flag_is_rejected() {
        let mut fields = minimal_fields();
        fields["smart_PublisereReferat"] = json!("Kanskje");
        assert!(MeetingItem::from_raw(&raw(fields)).is_err());
    }

    #[test]
    fn test_parse_items_fails_on_first_bad_row() {
        let good = raw(minimal_fields());
        let bad = RawItem {
            id: "43".to_string(),
            fields: Default::default(),
        };
        assert_eq!(parse_items(std::slice::from_ref(&good)).unwrap().len(), 1);
        assert!(parse_items(&[good, bad]).is_err());
    }
}
