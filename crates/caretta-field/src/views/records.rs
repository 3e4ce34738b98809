//! Searchable, sortable record lists.

use std::cmp::Ordering;
use std::str::FromStr;

use crate::catalog::{TagPosition, common_name};
use crate::error::Error;
use crate::mappers::parse_day;
use crate::models::{Nest, NestStatus, Turtle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NestSort {
    #[default]
    Code,
    Date,
    Status,
}

impl FromStr for NestSort {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "code" => Ok(NestSort::Code),
            "date" | "date_found" => Ok(NestSort::Date),
            "status" => Ok(NestSort::Status),
            other => Err(Error::msg(format!(
                "unknown sort key '{other}' (expected code, date or status)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NestQuery {
    pub search: Option<String>,
    pub status: Option<NestStatus>,
    pub beach: Option<String>,
    pub sort: NestSort,
    pub descending: bool,
    pub include_archived: bool,
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

/// Splits `KY-12R` into (`KY`, Some(12), `R`) so codes order by number
/// inside a beach prefix.
fn code_parts(code: &str) -> (String, Option<u64>, String) {
    let code = code.trim();
    let start = code.find(|c: char| c.is_ascii_digit());
    let Some(start) = start else {
        return (code.to_ascii_uppercase(), None, String::new());
    };
    let prefix = code[..start].trim_end_matches('-').to_ascii_uppercase();
    let rest = &code[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let num = rest[..end].parse().ok();
    (prefix, num, rest[end..].to_ascii_uppercase())
}

pub fn compare_codes(a: &str, b: &str) -> Ordering {
    code_parts(a).cmp(&code_parts(b))
}

fn status_rank(s: NestStatus) -> u8 {
    match s {
        NestStatus::Incubating => 0,
        NestStatus::Hatching => 1,
        NestStatus::Hatched => 2,
    }
}

pub fn filter_nests<'a>(nests: &'a [Nest], q: &NestQuery) -> Vec<&'a Nest> {
    let needle = q
        .search
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());
    let beach = q.beach.as_deref().map(str::trim).filter(|s| !s.is_empty());

    let mut out: Vec<&Nest> = nests
        .iter()
        .filter(|n| q.include_archived || !n.is_archived)
        .filter(|n| q.status.is_none_or(|s| n.status == s))
        .filter(|n| beach.is_none_or(|b| n.beach.eq_ignore_ascii_case(b)))
        .filter(|n| {
            needle
                .as_deref()
                .is_none_or(|s| contains_ci(&n.code, s) || contains_ci(&n.beach, s))
        })
        .collect();

    out.sort_by(|a, b| {
        let ord = match q.sort {
            NestSort::Code => compare_codes(&a.code, &b.code),
            NestSort::Date => parse_day(&a.date_found)
                .cmp(&parse_day(&b.date_found))
                .then_with(|| compare_codes(&a.code, &b.code)),
            NestSort::Status => status_rank(a.status)
                .cmp(&status_rank(b.status))
                .then_with(|| compare_codes(&a.code, &b.code)),
        };
        if q.descending { ord.reverse() } else { ord }
    });
    out
}

/// Matches any flipper tag, the species (scientific or common) or the
/// turtle id (`7` or `#7`).
pub fn search_turtles<'a>(turtles: &'a [Turtle], search: Option<&str>) -> Vec<&'a Turtle> {
    let needle = search.map(|s| s.trim().to_lowercase()).unwrap_or_default();
    if needle.is_empty() {
        return turtles.iter().collect();
    }
    let id_query: Option<i64> = needle.trim_start_matches('#').parse().ok();
    turtles
        .iter()
        .filter(|t| {
            id_query.is_some_and(|id| t.id == Some(id))
                || contains_ci(&t.species, &needle)
                || contains_ci(common_name(&t.species), &needle)
                || TagPosition::ALL
                    .iter()
                    .filter_map(|p| t.tags.tag(*p))
                    .any(|tag| contains_ci(tag, &needle))
        })
        .collect()
}
