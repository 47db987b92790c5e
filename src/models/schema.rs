//! Collection schema, metric and index configuration.

use std::collections::BTreeMap;
use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

pub const DEFAULT_VECTOR_FIELD: &str = "vector";
pub const DEFAULT_TEXT_FIELD: &str = "text";
pub const DEFAULT_TEXT_MAX_LEN: usize = 1000;
pub const DEFAULT_NLIST: u64 = 128;

/// Similarity metric used to rank search hits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Cosine,
    L2,
    Dot,
}

impl Metric {
    /// Whether a larger score means a closer match.
    ///
    /// Cosine and dot product are similarities; L2 is a distance.
    pub fn higher_is_better(self) -> bool {
        !matches!(self, Metric::L2)
    }

    /// Orders two scores best-first under this metric.
    pub fn compare(self, a: f32, b: f32) -> Ordering {
        let ord = a.partial_cmp(&b).unwrap_or(Ordering::Equal);
        if self.higher_is_better() {
            ord.reverse()
        } else {
            ord
        }
    }

    /// True when `a` ranks strictly before `b`.
    pub fn ranks_before(self, a: f32, b: f32) -> bool {
        self.compare(a, b) == Ordering::Less
    }
}

impl std::str::FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cosine" => Ok(Metric::Cosine),
            "l2" | "euclid" | "euclidean" => Ok(Metric::L2),
            "dot" | "ip" => Ok(Metric::Dot),
            _ => Err(format!("unknown metric: {}", s)),
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::Cosine => write!(f, "cosine"),
            Metric::L2 => write!(f, "l2"),
            Metric::Dot => write!(f, "dot"),
        }
    }
}

/// Kind of index built over a vector field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexType {
    /// Exact scan over every vector.
    Flat,
    /// Approximate, partitioned index.
    #[default]
    IvfFlat,
}

impl std::str::FromStr for IndexType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "flat" => Ok(IndexType::Flat),
            "ivf_flat" | "ivf" => Ok(IndexType::IvfFlat),
            _ => Err(format!("unknown index type: {}", s)),
        }
    }
}

impl std::fmt::Display for IndexType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexType::Flat => write!(f, "flat"),
            IndexType::IvfFlat => write!(f, "ivf_flat"),
        }
    }
}

/// Index definition for a collection's vector field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub field: String,
    pub index_type: IndexType,
    pub metric: Metric,
    #[serde(default)]
    pub params: BTreeMap<String, u64>,
}

impl IndexSpec {
    pub fn new(index_type: IndexType, metric: Metric) -> Self {
        Self {
            field: DEFAULT_VECTOR_FIELD.to_string(),
            index_type,
            metric,
            params: BTreeMap::new(),
        }
    }

    pub fn flat(metric: Metric) -> Self {
        Self::new(IndexType::Flat, metric)
    }

    pub fn ivf_flat(metric: Metric, nlist: u64) -> Self {
        Self::new(IndexType::IvfFlat, metric).with_param("nlist", nlist)
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: u64) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn param(&self, key: &str) -> Option<u64> {
        self.params.get(key).copied()
    }
}

/// How primary keys are assigned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimaryKeyPolicy {
    /// Ids are supplied by the caller with every insert.
    #[default]
    Manual,
}

/// Single description of a collection, supplied once at creation time.
///
/// Dimension, text length and metric are fixed for the life of the
/// collection. `normalized` records whether stored vectors were scaled to
/// unit length, so query-time embeddings can be checked against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    pub dimension: usize,
    pub text_max_len: usize,
    pub primary_key: PrimaryKeyPolicy,
    pub vector_field: String,
    pub text_field: String,
    pub metric: Metric,
    pub normalized: bool,
}

impl CollectionSchema {
    pub fn new(name: impl Into<String>, dimension: usize) -> Self {
        Self {
            name: name.into(),
            dimension,
            text_max_len: DEFAULT_TEXT_MAX_LEN,
            primary_key: PrimaryKeyPolicy::Manual,
            vector_field: DEFAULT_VECTOR_FIELD.to_string(),
            text_field: DEFAULT_TEXT_FIELD.to_string(),
            metric: Metric::Cosine,
            normalized: true,
        }
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_text_max_len(mut self, text_max_len: usize) -> Self {
        self.text_max_len = text_max_len;
        self
    }

    pub fn with_normalized(mut self, normalized: bool) -> Self {
        self.normalized = normalized;
        self
    }

    /// Checks that embeddings produced with `normalize` fit this collection.
    pub fn check_normalization(&self, normalize: bool) -> Result<(), String> {
        if self.metric == Metric::Cosine && !normalize {
            return Err(format!(
                "collection '{}' uses cosine similarity and requires normalized embeddings",
                self.name
            ));
        }
        if self.normalized != normalize {
            return Err(format!(
                "collection '{}' stores {} vectors but the embedder is configured with normalize={}",
                self.name,
                if self.normalized {
                    "normalized"
                } else {
                    "unnormalized"
                },
                normalize
            ));
        }
        Ok(())
    }

    /// Default index for this schema's vector field and metric.
    pub fn default_index(&self) -> IndexSpec {
        IndexSpec::ivf_flat(self.metric, DEFAULT_NLIST).with_field(self.vector_field.clone())
    }
}
