//! Query descriptors, canonicalization, and cache-key derivation.
//!
//! A [`QueryDescriptor`] is the immutable value the presentation layer hands
//! to the cache: a dataset name, filter predicates, and an optional
//! aggregation spec. Before anything touches a tier the descriptor is
//! canonicalized so that semantically equivalent requests — permuted filters,
//! `3.0` vs `3`, duplicated predicates — collapse onto one [`CacheKey`].
//!
//! The canonical form is also the only thing the warehouse ever sees, as a
//! deterministic SQL rendering.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Failure to canonicalize a descriptor. Fatal for the single request that
/// carried it; nothing is cached and no tier is consulted.
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("dataset name is empty")]
    EmptyDataset,

    #[error("filter has an empty field name")]
    EmptyField,

    #[error("filter on {field:?} has a non-finite numeric value")]
    NonFiniteNumber { field: String },

    #[error("`in` filter on {field:?} has an empty value list")]
    EmptyInList { field: String },

    #[error("nested value lists are not supported (filter on {field:?})")]
    NestedList { field: String },

    #[error("failed to encode canonical descriptor: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Comparison operator for a filter predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
}

impl FilterOp {
    /// Stable ordering rank, used when sorting filters into canonical order.
    fn rank(&self) -> u8 {
        match self {
            FilterOp::Eq => 0,
            FilterOp::Ne => 1,
            FilterOp::Lt => 2,
            FilterOp::Le => 3,
            FilterOp::Gt => 4,
            FilterOp::Ge => 5,
            FilterOp::In => 6,
        }
    }

    /// SQL spelling of the operator.
    fn sql(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "!=",
            FilterOp::Lt => "<",
            FilterOp::Le => "<=",
            FilterOp::Gt => ">",
            FilterOp::Ge => ">=",
            FilterOp::In => "IN",
        }
    }
}

/// A filter value as received from the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<FilterValue>),
}

impl FilterValue {
    /// Normalize a scalar: integral floats become ints, non-finite floats are
    /// rejected. Lists are handled by the caller (they depend on the op).
    fn normalize_scalar(self, field: &str) -> Result<FilterValue, KeyError> {
        match self {
            FilterValue::Float(f) => {
                if !f.is_finite() {
                    return Err(KeyError::NonFiniteNumber {
                        field: field.to_string(),
                    });
                }
                // i64-representable whole floats collapse onto the int form
                // so `3.0` and `3` derive the same key.
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                    Ok(FilterValue::Int(f as i64))
                } else {
                    Ok(FilterValue::Float(f))
                }
            }
            other => Ok(other),
        }
    }

    /// Total-order sort key for canonical filter ordering. Prefixed with a
    /// type tag so heterogeneous values order deterministically.
    fn sort_key(&self) -> String {
        match self {
            FilterValue::Bool(b) => format!("b:{b}"),
            FilterValue::Int(i) => format!("i:{i:+021}"),
            FilterValue::Float(f) => format!("f:{f}"),
            FilterValue::Str(s) => format!("s:{s}"),
            FilterValue::List(items) => {
                let inner: Vec<String> = items.iter().map(|v| v.sort_key()).collect();
                format!("l:[{}]", inner.join(","))
            }
        }
    }

    /// SQL literal rendering.
    fn sql(&self) -> String {
        match self {
            FilterValue::Bool(b) => b.to_string().to_uppercase(),
            FilterValue::Int(i) => i.to_string(),
            FilterValue::Float(f) => f.to_string(),
            FilterValue::Str(s) => format!("'{}'", s.replace('\'', "''")),
            FilterValue::List(items) => {
                let inner: Vec<String> = items.iter().map(|v| v.sql()).collect();
                format!("({})", inner.join(", "))
            }
        }
    }
}

/// One filter predicate: `field op value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterPredicate {
    pub field: String,
    pub op: FilterOp,
    pub value: FilterValue,
}

/// Aggregate function applied to a metric column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggFunc {
    Sum,
    Avg,
    Min,
    Max,
    Count,
}

impl AggFunc {
    fn sql(&self) -> &'static str {
        match self {
            AggFunc::Sum => "SUM",
            AggFunc::Avg => "AVG",
            AggFunc::Min => "MIN",
            AggFunc::Max => "MAX",
            AggFunc::Count => "COUNT",
        }
    }
}

/// One aggregated output column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub column: String,
    pub func: AggFunc,
}

/// Grouping and aggregation spec. Column order is meaningful output shape and
/// is deliberately NOT reordered by canonicalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub group_by: Vec<String>,
    pub metrics: Vec<Metric>,
}

/// What the caller wants: dataset, filters, optional aggregation. Built per
/// request, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    pub dataset: String,
    #[serde(default)]
    pub filters: Vec<FilterPredicate>,
    #[serde(default)]
    pub aggregation: Option<Aggregation>,
}

impl QueryDescriptor {
    /// Canonicalize this descriptor.
    ///
    /// Normalization rules:
    /// - dataset and field names are trimmed; empty ones are malformed
    /// - integral floats become ints; non-finite floats are malformed
    /// - an `in` value list is sorted and deduplicated; a scalar under `in`
    ///   is promoted to a one-element list; an empty list is malformed
    /// - filters are sorted by (field, op, value) and exact duplicates
    ///   removed
    ///
    /// A descriptor with zero filters (full scan) canonicalizes like any
    /// other.
    pub fn canonicalize(&self) -> Result<CanonicalQuery, KeyError> {
        let dataset = self.dataset.trim().to_string();
        if dataset.is_empty() {
            return Err(KeyError::EmptyDataset);
        }

        let mut filters = Vec::with_capacity(self.filters.len());
        for filter in &self.filters {
            let field = filter.field.trim().to_string();
            if field.is_empty() {
                return Err(KeyError::EmptyField);
            }

            let value = match (&filter.op, filter.value.clone()) {
                (FilterOp::In, FilterValue::List(items)) => {
                    if items.is_empty() {
                        return Err(KeyError::EmptyInList { field });
                    }
                    let mut normalized = Vec::with_capacity(items.len());
                    for item in items {
                        if matches!(item, FilterValue::List(_)) {
                            return Err(KeyError::NestedList { field });
                        }
                        normalized.push(item.normalize_scalar(&field)?);
                    }
                    normalized.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
                    normalized.dedup();
                    FilterValue::List(normalized)
                }
                // A scalar under `in` is the one-element membership test.
                (FilterOp::In, scalar) => {
                    FilterValue::List(vec![scalar.normalize_scalar(&field)?])
                }
                (_, FilterValue::List(_)) => {
                    return Err(KeyError::NestedList { field });
                }
                (_, scalar) => scalar.normalize_scalar(&field)?,
            };

            filters.push(FilterPredicate {
                field,
                op: filter.op,
                value,
            });
        }

        filters.sort_by(|a, b| {
            (a.field.as_str(), a.op.rank(), a.value.sort_key()).cmp(&(
                b.field.as_str(),
                b.op.rank(),
                b.value.sort_key(),
            ))
        });
        filters.dedup();

        Ok(CanonicalQuery {
            descriptor: QueryDescriptor {
                dataset,
                filters,
                aggregation: self.aggregation.clone(),
            },
        })
    }
}

/// A descriptor in canonical form. Only constructible through
/// [`QueryDescriptor::canonicalize`], so holding one proves the
/// normalization rules have been applied.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalQuery {
    descriptor: QueryDescriptor,
}

impl CanonicalQuery {
    pub fn dataset(&self) -> &str {
        &self.descriptor.dataset
    }

    pub fn descriptor(&self) -> &QueryDescriptor {
        &self.descriptor
    }

    /// Derive the cache key: SHA-256 over the canonical descriptor's JSON
    /// encoding. Struct field order is fixed, filters are sorted, and float
    /// formatting is shortest-round-trip, so the encoding is deterministic.
    pub fn cache_key(&self) -> Result<CacheKey, KeyError> {
        let encoded = serde_json::to_vec(&self.descriptor)?;
        let digest = Sha256::digest(&encoded);
        Ok(CacheKey(digest.into()))
    }

    /// Render the canonical SQL text sent to the cold store.
    pub fn to_sql(&self) -> String {
        let select = match &self.descriptor.aggregation {
            None => "*".to_string(),
            Some(agg) => {
                let mut parts: Vec<String> = agg.group_by.clone();
                for metric in &agg.metrics {
                    parts.push(format!(
                        "{}({}) AS {}_{}",
                        metric.func.sql(),
                        metric.column,
                        metric.func.sql().to_lowercase(),
                        metric.column
                    ));
                }
                if parts.is_empty() {
                    "*".to_string()
                } else {
                    parts.join(", ")
                }
            }
        };

        let mut sql = format!("SELECT {} FROM {}", select, self.descriptor.dataset);

        if !self.descriptor.filters.is_empty() {
            let predicates: Vec<String> = self
                .descriptor
                .filters
                .iter()
                .map(|f| format!("{} {} {}", f.field, f.op.sql(), f.value.sql()))
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&predicates.join(" AND "));
        }

        if let Some(agg) = &self.descriptor.aggregation {
            if !agg.group_by.is_empty() {
                sql.push_str(" GROUP BY ");
                sql.push_str(&agg.group_by.join(", "));
            }
        }

        sql
    }
}

/// Fixed-length digest identifying one canonical query across all tiers.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex form, used for object keys and logs.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({})", self.to_hex())
    }
}
