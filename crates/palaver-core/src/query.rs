//! Collection queries and pages
//!
//! The query grammar the server understands: an optional sort by field
//! (`$sort`, 1 ascending / -1 descending) and an optional `$limit`. Find
//! results come back as a page envelope with the records under `data`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Sort direction for a query field
pub const ASCENDING: i8 = 1;
/// Sort direction for a query field
pub const DESCENDING: i8 = -1;

/// A find query: sort key and limit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    #[serde(rename = "$sort", default, skip_serializing_if = "BTreeMap::is_empty")]
    sort: BTreeMap<String, i8>,

    #[serde(rename = "$limit", default, skip_serializing_if = "Option::is_none")]
    limit: Option<u32>,
}

impl Query {
    /// Match everything, server default order
    pub fn all() -> Self {
        Self::default()
    }

    /// The latest `limit` records by `field`, newest first
    pub fn latest(field: &str, limit: u32) -> Self {
        Self::all().sort_desc(field).limit(limit)
    }

    /// Sort ascending by `field`
    pub fn sort_asc(mut self, field: &str) -> Self {
        self.sort.insert(field.to_string(), ASCENDING);
        self
    }

    /// Sort descending by `field`
    pub fn sort_desc(mut self, field: &str) -> Self {
        self.sort.insert(field.to_string(), DESCENDING);
        self
    }

    /// Cap the number of returned records
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A page of records returned by a find
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<R> {
    /// The records, in server order
    pub data: Vec<R>,
    /// Total matching records on the server, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// Applied limit, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Applied offset, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u32>,
}

impl<R> Page<R> {
    /// A page holding just the given records
    pub fn of(data: Vec<R>) -> Self {
        Self {
            data,
            total: None,
            limit: None,
            skip: None,
        }
    }
}
