//! Qdrant vector store backend implementation.
//!
//! Collections use one named dense vector (the schema's vector field) and
//! store the text field in the point payload. The metric is fixed when the
//! collection is created; index creation tunes the HNSW graph: a flat index
//! disables the graph (exact scan), an IVF-style index builds it with
//! `ef_construct` taken from `nlist`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfigKind;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, HnswConfigDiffBuilder, PayloadIncludeSelector,
    PointStruct, ScoredPoint, SearchPointsBuilder, UpdateCollectionBuilder, UpsertPointsBuilder,
    VectorParamsBuilder, VectorsConfigBuilder,
};

use super::{
    Endpoint, Hit, InsertRow, SearchRequest, StoredCollection, VectorStoreBackend,
    VectorStoreSession,
};
use crate::error::VectorStoreError;
use crate::models::{CollectionSchema, IndexSpec, IndexType, Metric};

const DEFAULT_HNSW_M: u64 = 16;

/// Opens gRPC sessions against a Qdrant server.
#[derive(Debug, Clone, Copy, Default)]
pub struct QdrantBackend;

#[async_trait]
impl VectorStoreBackend for QdrantBackend {
    fn name(&self) -> &'static str {
        "qdrant"
    }

    async fn connect(
        &self,
        endpoint: &Endpoint,
    ) -> Result<Arc<dyn VectorStoreSession>, VectorStoreError> {
        let connection_error = |message: String| VectorStoreError::Connection {
            endpoint: endpoint.url.clone(),
            message,
        };

        let mut builder = Qdrant::from_url(&endpoint.url).timeout(endpoint.timeout);
        if let Some(ref api_key) = endpoint.api_key {
            builder = builder.api_key(api_key.clone());
        }

        let client = builder.build().map_err(|e| connection_error(e.to_string()))?;

        // The client connects lazily; a health check proves the server is reachable.
        client
            .health_check()
            .await
            .map_err(|e| connection_error(e.to_string()))?;

        Ok(Arc::new(QdrantSession {
            client,
            closed: AtomicBool::new(false),
        }))
    }
}

struct QdrantSession {
    client: Qdrant,
    closed: AtomicBool,
}

impl QdrantSession {
    fn ensure_open(&self) -> Result<(), VectorStoreError> {
        if self.closed.load(Ordering::Acquire) {
            Err(VectorStoreError::NotConnected)
        } else {
            Ok(())
        }
    }

    /// Size and distance configured for `field` when the collection was
    /// created.
    async fn vector_params(
        &self,
        name: &str,
        field: &str,
    ) -> Result<(u64, Distance), VectorStoreError> {
        let info = self
            .client
            .collection_info(name)
            .await
            .map_err(|e| VectorStoreError::external("collection_info", e))?;

        let config = info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config)
            .ok_or_else(|| {
                VectorStoreError::external("collection_info", "collection has no vector config")
            })?;

        let (size, raw) = match config {
            VectorsConfigKind::Params(params) => (params.size, params.distance),
            VectorsConfigKind::ParamsMap(map) => map
                .map
                .get(field)
                .map(|params| (params.size, params.distance))
                .ok_or_else(|| {
                    VectorStoreError::Validation(format!(
                        "collection '{}' has no vector field '{}'",
                        name, field
                    ))
                })?,
        };

        let distance = Distance::try_from(raw)
            .map_err(|_| VectorStoreError::external("collection_info", "unknown distance"))?;
        Ok((size, distance))
    }
}

fn to_distance(metric: Metric) -> Distance {
    match metric {
        Metric::Cosine => Distance::Cosine,
        Metric::L2 => Distance::Euclid,
        Metric::Dot => Distance::Dot,
    }
}

fn from_distance(distance: Distance) -> Option<Metric> {
    match distance {
        Distance::Cosine => Some(Metric::Cosine),
        Distance::Euclid => Some(Metric::L2),
        Distance::Dot => Some(Metric::Dot),
        _ => None,
    }
}

/// Converts a scored point; points without an int64 id are skipped.
fn to_hit(collection: &str, point: ScoredPoint) -> Option<Hit> {
    let id = match point.id.and_then(|id| id.point_id_options) {
        Some(PointIdOptions::Num(num)) => i64::try_from(num).ok(),
        _ => None,
    };
    let Some(id) = id else {
        tracing::warn!(
            collection = %collection,
            score = point.score,
            "Skipping hit without an int64 point id"
        );
        return None;
    };

    let payload = point
        .payload
        .iter()
        .filter_map(|(k, v)| payload_string(v).map(|s| (k.clone(), s)))
        .collect();
    Some(Hit {
        id,
        score: point.score,
        payload,
    })
}

fn payload_string(value: &qdrant_client::qdrant::Value) -> Option<String> {
    match &value.kind {
        Some(Kind::StringValue(s)) => Some(s.clone()),
        Some(Kind::IntegerValue(n)) => Some(n.to_string()),
        Some(Kind::DoubleValue(n)) => Some(n.to_string()),
        Some(Kind::BoolValue(b)) => Some(b.to_string()),
        _ => None,
    }
}

#[async_trait]
impl VectorStoreSession for QdrantSession {
    async fn close(&self) -> Result<(), VectorStoreError> {
        // Dropping the last handle tears down the gRPC channel.
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    async fn has_collection(&self, name: &str) -> Result<bool, VectorStoreError> {
        self.ensure_open()?;
        self.client
            .collection_exists(name)
            .await
            .map_err(|e| VectorStoreError::external("has_collection", e))
    }

    async fn create_collection(&self, schema: &CollectionSchema) -> Result<(), VectorStoreError> {
        self.ensure_open()?;

        let mut vectors_config = VectorsConfigBuilder::default();
        vectors_config.add_named_vector_params(
            &schema.vector_field,
            VectorParamsBuilder::new(schema.dimension as u64, to_distance(schema.metric)),
        );

        let create_collection =
            CreateCollectionBuilder::new(&schema.name).vectors_config(vectors_config);

        self.client
            .create_collection(create_collection)
            .await
            .map_err(|e| VectorStoreError::external("create_collection", e))?;

        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<(), VectorStoreError> {
        self.ensure_open()?;
        self.client
            .delete_collection(name)
            .await
            .map_err(|e| VectorStoreError::external("drop_collection", e))?;
        Ok(())
    }

    async fn create_index(&self, name: &str, spec: &IndexSpec) -> Result<(), VectorStoreError> {
        self.ensure_open()?;

        let (_, distance) = self.vector_params(name, &spec.field).await?;
        if distance != to_distance(spec.metric) {
            return Err(VectorStoreError::external(
                "create_index",
                format!(
                    "metric '{}' differs from the distance collection '{}' was created with ({})",
                    spec.metric,
                    name,
                    distance.as_str_name()
                ),
            ));
        }

        let hnsw = match spec.index_type {
            IndexType::Flat => HnswConfigDiffBuilder::default().m(0),
            IndexType::IvfFlat => {
                let mut hnsw = HnswConfigDiffBuilder::default()
                    .m(spec.param("m").unwrap_or(DEFAULT_HNSW_M));
                if let Some(nlist) = spec.param("nlist") {
                    hnsw = hnsw.ef_construct(nlist);
                }
                hnsw
            }
        };

        self.client
            .update_collection(UpdateCollectionBuilder::new(name).hnsw_config(hnsw))
            .await
            .map_err(|e| VectorStoreError::external("create_index", e))?;

        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>, VectorStoreError> {
        self.ensure_open()?;
        let response = self
            .client
            .list_collections()
            .await
            .map_err(|e| VectorStoreError::external("list_collections", e))?;

        Ok(response.collections.into_iter().map(|c| c.name).collect())
    }

    async fn describe_collection(
        &self,
        name: &str,
        vector_field: &str,
    ) -> Result<StoredCollection, VectorStoreError> {
        self.ensure_open()?;
        let (size, distance) = self.vector_params(name, vector_field).await?;
        let metric = from_distance(distance).ok_or_else(|| {
            VectorStoreError::Validation(format!(
                "collection '{}' uses unsupported distance {}",
                name,
                distance.as_str_name()
            ))
        })?;

        Ok(StoredCollection {
            dimension: size as usize,
            metric,
            // Qdrant normalises vectors on insert into cosine collections and
            // records nothing for the other distances.
            normalized: (metric == Metric::Cosine).then_some(true),
        })
    }

    async fn insert(
        &self,
        schema: &CollectionSchema,
        rows: Vec<InsertRow>,
    ) -> Result<(), VectorStoreError> {
        self.ensure_open()?;
        if rows.is_empty() {
            return Ok(());
        }

        let points: Vec<PointStruct> = rows
            .into_iter()
            .map(|row| {
                let vectors = HashMap::from([(schema.vector_field.clone(), row.vector)]);
                let mut payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
                payload.insert(schema.text_field.clone(), row.text.into());
                // Ids are validated to be >= 1 before reaching the store
                PointStruct::new(row.id as u64, vectors, payload)
            })
            .collect();

        let upsert = UpsertPointsBuilder::new(&schema.name, points).wait(true);

        self.client
            .upsert_points(upsert)
            .await
            .map_err(|e| VectorStoreError::external("insert", e))?;

        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        request: SearchRequest,
    ) -> Result<Vec<Hit>, VectorStoreError> {
        self.ensure_open()?;

        let search = SearchPointsBuilder::new(collection, request.query_vector, request.limit)
            .vector_name(request.vector_field)
            .with_payload(PayloadIncludeSelector {
                fields: request.output_fields,
            });

        let response = self
            .client
            .search_points(search)
            .await
            .map_err(|e| VectorStoreError::external("search", e))?;

        let hits = response
            .result
            .into_iter()
            .filter_map(|point| to_hit(collection, point))
            .collect();

        Ok(hits)
    }

    async fn count(&self, name: &str) -> Result<u64, VectorStoreError> {
        self.ensure_open()?;
        let info = self
            .client
            .collection_info(name)
            .await
            .map_err(|e| VectorStoreError::external("collection_info", e))?;
        Ok(info.result.map_or(0, |r| r.points_count.unwrap_or(0)))
    }
}
