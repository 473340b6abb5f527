//! Flatten nested OpenAlex work records into fixed-schema CSV rows.
//!
//! Every lookup goes through [`JsonPath`], so a record with missing or
//! oddly-typed fields still produces a row, just with empty values.
//! Multi-valued fields are joined with `"; "`.

use crate::json_path::JsonPath;
use serde::Serialize;
use serde_json::Value;

/// Separator for multi-valued fields
const JOIN_SEP: &str = "; ";

/// Highest abstract word position honoured during reconstruction
const MAX_ABSTRACT_POSITION: u64 = 100_000;

/// CSV column order, identical to the field order of [`FlatRow`]
pub const FLAT_COLUMNS: &[&str] = &[
    "id",
    "doi",
    "title",
    "abstract",
    "publication_year",
    "publication_date",
    "created_date",
    "type",
    "cited_by_count",
    "is_retracted",
    "is_paratext",
    "journal",
    "author_count",
    "open_access",
    "oa_status",
    "affiliations",
    "concepts",
    "keywords",
    "topics",
    "subfields",
    "fields",
    "domains",
    "referenced_works_count",
    "referenced_works",
    "funding_details",
    "license",
    "metrics",
    "host_venue_issn",
    "publisher",
    "relevance_score",
    "language",
    "host_organization_name",
    "is_accepted",
    "type_crossref",
    "indexed_in",
];

/// One flattened work. Field order is the CSV column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlatRow {
    pub id: String,
    pub doi: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub publication_year: Option<i64>,
    pub publication_date: String,
    pub created_date: String,
    #[serde(rename = "type")]
    pub work_type: String,
    pub cited_by_count: Option<i64>,
    pub is_retracted: Option<bool>,
    pub is_paratext: Option<bool>,
    pub journal: String,
    pub author_count: usize,
    pub open_access: Option<bool>,
    pub oa_status: String,
    /// JSON array of [`AuthorInfo`]
    pub affiliations: String,
    pub concepts: String,
    pub keywords: String,
    pub topics: String,
    pub subfields: String,
    pub fields: String,
    pub domains: String,
    pub referenced_works_count: usize,
    pub referenced_works: String,
    pub funding_details: String,
    pub license: String,
    /// `counts_by_year` as compact JSON
    pub metrics: String,
    pub host_venue_issn: String,
    pub publisher: String,
    pub relevance_score: Option<f64>,
    pub language: String,
    pub host_organization_name: String,
    pub is_accepted: Option<bool>,
    pub type_crossref: String,
    pub indexed_in: String,
}

/// Author and first-institution details from one authorship entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuthorInfo {
    pub author_name: Option<String>,
    pub institution: Option<String>,
    pub institution_type: Option<String>,
    pub country_code: Option<String>,
    pub corresponding: bool,
    pub affiliation_strings: Vec<String>,
}

/// Flatten one raw work record. Never fails.
pub fn flatten(work: &Value) -> FlatRow {
    let authorships = work.array_at(&["authorships"]);
    let topics = work.array_at(&["topics"]);
    let referenced = work.array_at(&["referenced_works"]);

    let affiliations: Vec<AuthorInfo> = authorships.iter().map(extract_author_info).collect();

    FlatRow {
        id: work.string_at(&["id"]),
        doi: work.string_at(&["doi"]),
        title: work.string_at(&["title"]),
        abstract_text: work
            .at(&["abstract_inverted_index"])
            .map(reconstruct_abstract)
            .unwrap_or_default(),
        publication_year: work.i64_at(&["publication_year"]),
        publication_date: work.string_at(&["publication_date"]),
        created_date: work.string_at(&["created_date"]),
        work_type: work.string_at(&["type"]),
        cited_by_count: work.i64_at(&["cited_by_count"]),
        is_retracted: work.bool_at(&["is_retracted"]),
        is_paratext: work.bool_at(&["is_paratext"]),
        journal: work.string_at(&["primary_location", "source", "display_name"]),
        author_count: authorships.len(),
        open_access: work.bool_at(&["open_access", "is_oa"]),
        oa_status: work.string_at(&["open_access", "oa_status"]),
        affiliations: serde_json::to_string(&affiliations).unwrap_or_default(),
        concepts: join_names(work.array_at(&["concepts"]), &["display_name"]),
        keywords: join_names(work.array_at(&["keywords"]), &["display_name"]),
        topics: join_names(topics, &["display_name"]),
        subfields: join_names(topics, &["subfield", "display_name"]),
        fields: join_names(topics, &["field", "display_name"]),
        domains: join_names(topics, &["domain", "display_name"]),
        referenced_works_count: referenced.len(),
        referenced_works: referenced
            .iter()
            .map(|w| w.as_str().unwrap_or_default())
            .collect::<Vec<_>>()
            .join(JOIN_SEP),
        funding_details: funding_details(work),
        license: work
            .str_at(&["open_access", "license"])
            .or_else(|| work.str_at(&["primary_location", "license"]))
            .unwrap_or_default()
            .to_string(),
        metrics: work
            .at(&["counts_by_year"])
            .map(Value::to_string)
            .unwrap_or_default(),
        host_venue_issn: work.text_at(&["primary_location", "source", "issn"]),
        publisher: work.string_at(&["primary_location", "source", "publisher"]),
        relevance_score: work.f64_at(&["relevance_score"]),
        language: work.string_at(&["language"]),
        host_organization_name: work
            .string_at(&["primary_location", "source", "host_organization_name"]),
        is_accepted: work.bool_at(&["primary_location", "is_accepted"]),
        type_crossref: work.string_at(&["type_crossref"]),
        indexed_in: work.text_at(&["indexed_in"]),
    }
}

/// Extract author name, first institution, and affiliation strings.
///
/// Only the first listed institution is kept.
pub fn extract_author_info(authorship: &Value) -> AuthorInfo {
    let institution = authorship.array_at(&["institutions"]).first();
    let institution_str = |key: &str| {
        institution
            .and_then(|inst| inst.str_at(&[key]))
            .map(str::to_string)
    };

    AuthorInfo {
        author_name: authorship
            .str_at(&["author", "display_name"])
            .map(str::to_string),
        institution: institution_str("display_name"),
        institution_type: institution_str("type"),
        country_code: institution_str("country_code"),
        corresponding: authorship.bool_at(&["is_corresponding"]).unwrap_or(false),
        affiliation_strings: authorship
            .array_at(&["raw_affiliation_strings"])
            .iter()
            .filter_map(|s| s.as_str().map(str::to_string))
            .collect(),
    }
}

/// Reconstruct abstract text from an inverted index.
///
/// Each word is placed at every listed position in a slot vector sized to the
/// highest position; uncovered slots stay empty, so sparse indexes yield
/// blank words between the spaces.
pub fn reconstruct_abstract(inverted_index: &Value) -> String {
    let Some(index) = inverted_index.as_object() else {
        return String::new();
    };

    let mut placements: Vec<(usize, &str)> = Vec::new();
    for (word, positions) in index {
        for pos in positions.as_array().into_iter().flatten() {
            match pos.as_u64() {
                Some(p) if p <= MAX_ABSTRACT_POSITION => {
                    placements.push((p as usize, word.as_str()))
                }
                _ => {}
            }
        }
    }

    let Some(max_position) = placements.iter().map(|(p, _)| *p).max() else {
        return String::new();
    };

    let mut slots = vec![""; max_position + 1];
    for (position, word) in placements {
        slots[position] = word;
    }
    slots.join(" ")
}

/// Join the string at `path` of each entry; entries without it contribute "".
fn join_names(entries: &[Value], path: &[&str]) -> String {
    entries
        .iter()
        .map(|entry| entry.str_at(path).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(JOIN_SEP)
}

fn funding_details(work: &Value) -> String {
    if work.at(&["funding"]).is_some() {
        join_names(work.array_at(&["funding"]), &["display_name"])
    } else {
        join_names(work.array_at(&["grants"]), &["funder_display_name"])
    }
}
