//! In-process backend used by tests: brute-force ranking, recorded calls and
//! injectable failures.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{
    Endpoint, Hit, InsertRow, SearchRequest, StoredCollection, VectorStoreBackend,
    VectorStoreSession,
};
use crate::error::VectorStoreError;
use crate::models::{CollectionSchema, IndexSpec, Metric};

#[derive(Debug, Default)]
pub struct MemoryCollection {
    pub schema: Option<CollectionSchema>,
    pub index: Option<IndexSpec>,
    pub rows: BTreeMap<i64, (Vec<f32>, String)>,
}

#[derive(Debug, Default)]
pub struct MemoryState {
    pub collections: BTreeMap<String, MemoryCollection>,
    /// Ids of every insert call, in call order.
    pub insert_calls: Vec<Vec<i64>>,
    /// Insert calls containing any of these ids fail.
    pub fail_insert_ids: HashSet<i64>,
    pub fail_list: bool,
    pub closes: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
    fail_connect: Arc<AtomicBool>,
    connects: Arc<AtomicUsize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorStoreBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn connect(
        &self,
        endpoint: &Endpoint,
    ) -> Result<Arc<dyn VectorStoreSession>, VectorStoreError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(VectorStoreError::Connection {
                endpoint: endpoint.url.clone(),
                message: "connection refused".to_string(),
            });
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemorySession {
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }))
    }
}

struct MemorySession {
    state: Arc<Mutex<MemoryState>>,
    closed: AtomicBool,
}

impl MemorySession {
    fn open(&self) -> Result<MutexGuard<'_, MemoryState>, VectorStoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(VectorStoreError::NotConnected);
        }
        Ok(self.state.lock().unwrap())
    }
}

fn score(metric: Metric, a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    match metric {
        Metric::Dot => dot,
        Metric::Cosine => {
            let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
            let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
            if na == 0.0 || nb == 0.0 {
                0.0
            } else {
                dot / (na * nb)
            }
        }
        Metric::L2 => a
            .iter()
            .zip(b)
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt(),
    }
}

#[async_trait]
impl VectorStoreSession for MemorySession {
    async fn close(&self) -> Result<(), VectorStoreError> {
        self.closed.store(true, Ordering::SeqCst);
        self.state.lock().unwrap().closes += 1;
        Ok(())
    }

    async fn has_collection(&self, name: &str) -> Result<bool, VectorStoreError> {
        Ok(self.open()?.collections.contains_key(name))
    }

    async fn create_collection(&self, schema: &CollectionSchema) -> Result<(), VectorStoreError> {
        let mut state = self.open()?;
        if state.collections.contains_key(&schema.name) {
            return Err(VectorStoreError::external(
                "create_collection",
                format!("collection '{}' already exists", schema.name),
            ));
        }
        state.collections.insert(
            schema.name.clone(),
            MemoryCollection {
                schema: Some(schema.clone()),
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<(), VectorStoreError> {
        self.open()?.collections.remove(name);
        Ok(())
    }

    async fn create_index(&self, name: &str, spec: &IndexSpec) -> Result<(), VectorStoreError> {
        let mut state = self.open()?;
        let collection = state
            .collections
            .get_mut(name)
            .ok_or_else(|| VectorStoreError::CollectionNotFound(name.to_string()))?;
        if let Some(ref schema) = collection.schema
            && schema.metric != spec.metric
        {
            return Err(VectorStoreError::external(
                "create_index",
                "metric differs from collection",
            ));
        }
        collection.index = Some(spec.clone());
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>, VectorStoreError> {
        let state = self.open()?;
        if state.fail_list {
            return Err(VectorStoreError::external("list_collections", "unavailable"));
        }
        Ok(state.collections.keys().cloned().collect())
    }

    async fn describe_collection(
        &self,
        name: &str,
        _vector_field: &str,
    ) -> Result<StoredCollection, VectorStoreError> {
        let state = self.open()?;
        let schema = state
            .collections
            .get(name)
            .and_then(|c| c.schema.as_ref())
            .ok_or_else(|| VectorStoreError::CollectionNotFound(name.to_string()))?;
        Ok(StoredCollection {
            dimension: schema.dimension,
            metric: schema.metric,
            normalized: Some(schema.normalized),
        })
    }

    async fn insert(
        &self,
        schema: &CollectionSchema,
        rows: Vec<InsertRow>,
    ) -> Result<(), VectorStoreError> {
        let mut state = self.open()?;
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        state.insert_calls.push(ids.clone());

        if ids.iter().any(|id| state.fail_insert_ids.contains(id)) {
            return Err(VectorStoreError::external("insert", "rejected by store"));
        }

        let collection = state
            .collections
            .get_mut(&schema.name)
            .ok_or_else(|| VectorStoreError::CollectionNotFound(schema.name.clone()))?;
        for row in rows {
            collection.rows.insert(row.id, (row.vector, row.text));
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        request: SearchRequest,
    ) -> Result<Vec<Hit>, VectorStoreError> {
        let state = self.open()?;
        let stored = state
            .collections
            .get(collection)
            .ok_or_else(|| VectorStoreError::CollectionNotFound(collection.to_string()))?;

        // Ranked by the metric the collection was created with.
        let metric = stored.schema.as_ref().map_or(request.metric, |s| s.metric);
        let mut hits: Vec<Hit> = stored
            .rows
            .iter()
            .map(|(&id, (vector, text))| {
                let mut payload = HashMap::new();
                if !request.output_fields.is_empty() {
                    payload.insert(request.output_fields[0].clone(), text.clone());
                }
                Hit {
                    id,
                    score: score(metric, &request.query_vector, vector),
                    payload,
                }
            })
            .collect();

        hits.sort_by(|a, b| metric.compare(a.score, b.score));
        hits.truncate(request.limit as usize);
        Ok(hits)
    }

    async fn count(&self, name: &str) -> Result<u64, VectorStoreError> {
        let state = self.open()?;
        Ok(state
            .collections
            .get(name)
            .map_or(0, |c| c.rows.len() as u64))
    }
}
