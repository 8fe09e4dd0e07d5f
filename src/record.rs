use serde::{Deserialize, Serialize};

use crate::table::Row;

/// One agency row of the enriched table. Column order is the output order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgencyRecord {
    pub inn: String,
    pub ogrn: String,
    pub name: String,
    pub full_name: String,
    pub site: String,
    pub region: String,
    pub address: String,
    pub contacts: String,
    pub email: String,
    pub revenue_year: String,
    pub revenue: String,
    pub segment_tag: String,
    pub source: String,
    pub doc_url: String,
    pub doc_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Inn,
    Ogrn,
    Name,
    FullName,
    Site,
    Region,
    Address,
    Contacts,
    Email,
    RevenueYear,
    Revenue,
    SegmentTag,
    Source,
    DocUrl,
    DocType,
}

impl Field {
    pub const ALL: [Field; 15] = [
        Field::Inn,
        Field::Ogrn,
        Field::Name,
        Field::FullName,
        Field::Site,
        Field::Region,
        Field::Address,
        Field::Contacts,
        Field::Email,
        Field::RevenueYear,
        Field::Revenue,
        Field::SegmentTag,
        Field::Source,
        Field::DocUrl,
        Field::DocType,
    ];

    /// Fields an extraction pass can supply.
    pub const EVIDENCE: [Field; 8] = [
        Field::Inn,
        Field::Ogrn,
        Field::FullName,
        Field::Region,
        Field::Address,
        Field::Contacts,
        Field::Email,
        Field::RevenueYear,
    ];

    pub fn column(self) -> &'static str {
        match self {
            Field::Inn => "inn",
            Field::Ogrn => "ogrn",
            Field::Name => "name",
            Field::FullName => "full_name",
            Field::Site => "site",
            Field::Region => "region",
            Field::Address => "address",
            Field::Contacts => "contacts",
            Field::Email => "email",
            Field::RevenueYear => "revenue_year",
            Field::Revenue => "revenue",
            Field::SegmentTag => "segment_tag",
            Field::Source => "source",
            Field::DocUrl => "doc_url",
            Field::DocType => "doc_type",
        }
    }
}

impl Row for AgencyRecord {
    const COLUMNS: &'static [&'static str] = &[
        "inn",
        "ogrn",
        "name",
        "full_name",
        "site",
        "region",
        "address",
        "contacts",
        "email",
        "revenue_year",
        "revenue",
        "segment_tag",
        "source",
        "doc_url",
        "doc_type",
    ];
}

impl AgencyRecord {
    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::Inn => &self.inn,
            Field::Ogrn => &self.ogrn,
            Field::Name => &self.name,
            Field::FullName => &self.full_name,
            Field::Site => &self.site,
            Field::Region => &self.region,
            Field::Address => &self.address,
            Field::Contacts => &self.contacts,
            Field::Email => &self.email,
            Field::RevenueYear => &self.revenue_year,
            Field::Revenue => &self.revenue,
            Field::SegmentTag => &self.segment_tag,
            Field::Source => &self.source,
            Field::DocUrl => &self.doc_url,
            Field::DocType => &self.doc_type,
        }
    }

    pub fn get_mut(&mut self, field: Field) -> &mut String {
        match field {
            Field::Inn => &mut self.inn,
            Field::Ogrn => &mut self.ogrn,
            Field::Name => &mut self.name,
            Field::FullName => &mut self.full_name,
            Field::Site => &mut self.site,
            Field::Region => &mut self.region,
            Field::Address => &mut self.address,
            Field::Contacts => &mut self.contacts,
            Field::Email => &mut self.email,
            Field::RevenueYear => &mut self.revenue_year,
            Field::Revenue => &mut self.revenue,
            Field::SegmentTag => &mut self.segment_tag,
            Field::Source => &mut self.source,
            Field::DocUrl => &mut self.doc_url,
            Field::DocType => &mut self.doc_type,
        }
    }

    pub fn is_filled(&self, field: Field) -> bool {
        !self.get(field).trim().is_empty()
    }

    /// Copy with every value trimmed; the shape extraction results are merged into.
    pub fn trimmed(&self) -> AgencyRecord {
        let mut out = self.clone();
        for field in Field::ALL {
            let value = out.get_mut(field);
            let trimmed = value.trim();
            if trimmed.len() != value.len() {
                *value = trimmed.to_string();
            }
        }
        out
    }

    /// Merge one extraction into this record.
    ///
    /// Only empty fields are filled. Document provenance is the exception:
    /// a PDF extraction carrying an identifier or a legal name always wins
    /// `doc_url`/`doc_type`, whatever they held before.
    pub fn merge(&mut self, incoming: &Extraction) {
        for field in Field::EVIDENCE {
            fill_if_empty(self.get_mut(field), incoming.evidence.get(field));
        }
        fill_if_empty(&mut self.doc_url, &incoming.doc_url);
        fill_if_empty(&mut self.doc_type, incoming.kind.as_str());

        if incoming.kind == DocKind::Pdf
            && incoming.evidence.has_primary_fields()
            && !incoming.doc_url.is_empty()
        {
            self.doc_url = incoming.doc_url.clone();
            self.doc_type = incoming.kind.as_str().to_string();
        }
    }
}

fn fill_if_empty(slot: &mut String, value: &str) {
    if slot.trim().is_empty() && !value.is_empty() {
        *slot = value.to_string();
    }
}

/// Where a text blob came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocKind {
    Homepage,
    Pdf,
}

impl DocKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DocKind::Homepage => "homepage",
            DocKind::Pdf => "pdf",
        }
    }
}

/// Candidate field values found in one text blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evidence {
    pub inn: String,
    pub ogrn: String,
    pub full_name: String,
    pub region: String,
    pub address: String,
    pub contacts: String,
    pub email: String,
    pub revenue_year: String,
}

impl Evidence {
    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::Inn => &self.inn,
            Field::Ogrn => &self.ogrn,
            Field::FullName => &self.full_name,
            Field::Region => &self.region,
            Field::Address => &self.address,
            Field::Contacts => &self.contacts,
            Field::Email => &self.email,
            Field::RevenueYear => &self.revenue_year,
            _ => "",
        }
    }

    fn slot(&mut self, field: Field) -> Option<&mut String> {
        match field {
            Field::Inn => Some(&mut self.inn),
            Field::Ogrn => Some(&mut self.ogrn),
            Field::FullName => Some(&mut self.full_name),
            Field::Region => Some(&mut self.region),
            Field::Address => Some(&mut self.address),
            Field::Contacts => Some(&mut self.contacts),
            Field::Email => Some(&mut self.email),
            Field::RevenueYear => Some(&mut self.revenue_year),
            _ => None,
        }
    }

    /// Take values from lower-priority evidence only where this one has none.
    pub fn fill_from(&mut self, other: &Evidence) {
        for field in Field::EVIDENCE {
            let value = other.get(field);
            if let Some(slot) = self.slot(field) {
                fill_if_empty(slot, value);
            }
        }
    }

    pub fn has_primary_fields(&self) -> bool {
        !self.inn.is_empty() || !self.ogrn.is_empty() || !self.full_name.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        Field::EVIDENCE.iter().all(|f| self.get(*f).is_empty())
    }
}

/// Evidence plus the provenance of the text it was found in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub evidence: Evidence,
    pub kind: DocKind,
    pub doc_url: String,
}

impl Extraction {
    pub fn homepage(evidence: Evidence) -> Self {
        Extraction {
            evidence,
            kind: DocKind::Homepage,
            doc_url: String::new(),
        }
    }

    pub fn pdf(evidence: Evidence, url: &str) -> Self {
        Extraction {
            evidence,
            kind: DocKind::Pdf,
            doc_url: url.to_string(),
        }
    }
}

/// Row-level "looks complete" test used to skip already enriched rows.
///
/// A row is complete when at least one `identity` field and at least one
/// `contact` field are non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletenessRule {
    pub identity: Vec<Field>,
    pub contact: Vec<Field>,
}

impl Default for CompletenessRule {
    fn default() -> Self {
        CompletenessRule {
            identity: vec![Field::Inn, Field::Ogrn, Field::FullName],
            contact: vec![Field::Contacts, Field::Email, Field::Address, Field::Region],
        }
    }
}

impl CompletenessRule {
    pub fn is_complete(&self, record: &AgencyRecord) -> bool {
        self.identity.iter().any(|f| record.is_filled(*f))
            && self.contact.iter().any(|f| record.is_filled(*f))
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn pdf_with_inn(url: &str, inn: &str) -> Extraction {
        Extraction::pdf(
            Evidence {
                inn: inn.into(),
                ..Default::default()
            },
            url,
        )
    }

    #[test]
    fn fills_only_empty_fields() {
        let mut rec = AgencyRecord {
            inn: "1111111111".into(),
            region: "  ".into(),
            ..Default::default()
        };
        let incoming = Extraction::homepage(Evidence {
            inn: "2222222222".into(),
            region: "г. Москва".into(),
            email: "a@b.ru".into(),
            ..Default::default()
        });
        rec.merge(&incoming);
        assert_eq!(rec.inn, "1111111111");
        assert_eq!(rec.region, "г. Москва");
        assert_eq!(rec.email, "a@b.ru");
        assert_eq!(rec.doc_type, "homepage");
        assert_eq!(rec.doc_url, "");
    }

    #[test]
    fn merging_empty_evidence_changes_nothing() {
        let mut rec = AgencyRecord {
            inn: "1234567890".into(),
            contacts: "+7 495 000-00-00".into(),
            doc_type: "pdf".into(),
            doc_url: "http://a.ru/x.pdf".into(),
            ..Default::default()
        };
        let before = rec.clone();
        rec.merge(&Extraction::pdf(Evidence::default(), "http://a.ru/y.pdf"));
        rec.merge(&Extraction::homepage(Evidence::default()));
        assert_eq!(rec, before);
    }

    #[test]
    fn pdf_identifier_overrides_provenance() {
        let mut rec = AgencyRecord {
            doc_url: "http://a.ru/old.pdf".into(),
            doc_type: "homepage".into(),
            ..Default::default()
        };
        rec.merge(&pdf_with_inn("http://a.ru/new.pdf", "1234567890"));
        assert_eq!(rec.doc_url, "http://a.ru/new.pdf");
        assert_eq!(rec.doc_type, "pdf");

        // A later PDF with an identifier moves provenance again, but the inn stays.
        rec.merge(&pdf_with_inn("http://a.ru/third.pdf", "0987654321"));
        assert_eq!(rec.inn, "1234567890");
        assert_eq!(rec.doc_url, "http://a.ru/third.pdf");
    }

    #[test]
    fn pdf_without_primary_fields_keeps_provenance() {
        let mut rec = AgencyRecord {
            doc_url: "http://a.ru/old.pdf".into(),
            doc_type: "pdf".into(),
            ..Default::default()
        };
        let incoming = Extraction::pdf(
            Evidence {
                email: "x@y.ru".into(),
                ..Default::default()
            },
            "http://a.ru/new.pdf",
        );
        rec.merge(&incoming);
        assert_eq!(rec.doc_url, "http://a.ru/old.pdf");
        assert_eq!(rec.email, "x@y.ru");
    }

    #[test]
    fn evidence_fill_keeps_higher_priority_values() {
        let mut regex = Evidence {
            inn: "1234567890".into(),
            ..Default::default()
        };
        let ner = Evidence {
            inn: "999999999999".into(),
            full_name: "ООО Ромашка".into(),
            ..Default::default()
        };
        regex.fill_from(&ner);
        assert_eq!(regex.inn, "1234567890");
        assert_eq!(regex.full_name, "ООО Ромашка");
    }

    #[test]
    fn completeness_rule_matches_default_heuristic() {
        let rule = CompletenessRule::default();
        let mut rec = AgencyRecord {
            ogrn: "1234567890123".into(),
            ..Default::default()
        };
        assert!(!rule.is_complete(&rec));
        rec.region = "г. Казань".into();
        assert!(rule.is_complete(&rec));

        let contacts_only = AgencyRecord {
            email: "a@b.ru".into(),
            ..Default::default()
        };
        assert!(!rule.is_complete(&contacts_only));
    }

    #[test]
    fn completeness_rule_is_configurable() {
        let rule = CompletenessRule {
            identity: vec![Field::Inn],
            contact: vec![Field::Contacts, Field::Email],
        };
        let rec = AgencyRecord {
            ogrn: "1234567890123".into(),
            region: "г. Казань".into(),
            ..Default::default()
        };
        assert!(!rule.is_complete(&rec));
    }

    #[test]
    fn columns_follow_field_order() {
        let columns: Vec<&str> = Field::ALL.iter().map(|f| f.column()).collect();
        assert_eq!(columns, AgencyRecord::COLUMNS);
    }

    #[test]
    fn trimmed_strips_whitespace() {
        let rec = AgencyRecord {
            site: "  http://a.ru ".into(),
            ..Default::default()
        };
        assert_eq!(rec.trimmed().site, "http://a.ru");
    }
}
