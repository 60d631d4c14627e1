
use super::{ChunkVector, VectorMatch, cosine_similarity_from_distance};
use crate::SupportError;
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatchIterator, StringArray,
    UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::Utc;
use futures::TryStreamExt;
use itertools::Itertools;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase},
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

const TABLE_NAME: &str = "chunk_vectors";

type StoreResult<T> = Result<T, SupportError>;

fn db_error(context: &str, error: impl std::fmt::Display) -> SupportError {
    SupportError::Database(format!("{context}: {error}"))
}

/// Vector database store using LanceDB for similarity search
pub struct VectorStore {
    connection: Connection,
    table_name: String,
    vector_dimension: usize,
}

impl VectorStore {
    /// Open (or create) the vector database under `db_path`.
    ///
    /// `dimension` is used when the table has to be created; an existing table
    /// keeps the dimension it was created with.
    #[inline]
    pub async fn new(db_path: &Path, dimension: usize) -> StoreResult<Self> {
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(db_path)
            .map_err(|e| db_error("Failed to create vector database directory", e))?;

        let uri = db_path.to_string_lossy().into_owned();
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| db_error("Failed to connect to LanceDB", e))?;

        let mut store = Self {
            connection,
            table_name: TABLE_NAME.to_string(),
            vector_dimension: dimension,
        };
        store.initialize_table().await?;

        info!(
            "Vector store initialized with {} dimensions",
            store.vector_dimension
        );
        Ok(store)
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.vector_dimension
    }

    async fn initialize_table(&mut self) -> StoreResult<()> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| db_error("Failed to list tables", e))?;

        if table_names.contains(&self.table_name) {
            let existing = self.detect_existing_vector_dimension().await?;
            if existing != self.vector_dimension {
                warn!(
                    "Vector table was built with {} dimensions but {} are configured; keeping {}",
                    existing, self.vector_dimension, existing
                );
                self.vector_dimension = existing;
            }
            return Ok(());
        }

        info!(
            "Creating {} table with {} dimensions",
            self.table_name, self.vector_dimension
        );

        let schema = Self::create_schema(self.vector_dimension)?;
        self.connection
            .create_empty_table(&self.table_name, schema)
            .execute()
            .await
            .map_err(|e| db_error("Failed to create table", e))?;

        Ok(())
    }

    async fn detect_existing_vector_dimension(&self) -> StoreResult<usize> {
        let schema = self
            .open_table()
            .await?
            .schema()
            .await
            .map_err(|e| db_error("Failed to get table schema", e))?;

        schema
            .fields()
            .iter()
            .find(|field| field.name() == "vector")
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
                _ => None,
            })
            .ok_or_else(|| {
                SupportError::Database(
                    "Could not find vector column or determine dimension".to_string(),
                )
            })
    }

    fn create_schema(vector_dim: usize) -> StoreResult<Arc<Schema>> {
        let list_size = i32::try_from(vector_dim)
            .map_err(|e| db_error("Vector dimension out of range", e))?;

        Ok(Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    list_size,
                ),
                false,
            ),
            Field::new("tenant_id", DataType::Int64, false),
            Field::new("document_id", DataType::Int64, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, true),
            Field::new("created_at", DataType::Utf8, false),
        ])))
    }

    async fn open_table(&self) -> StoreResult<Table> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| db_error("Failed to open table", e))
    }

    /// Insert chunk vectors, replacing rows that share an id
    #[inline]
    pub async fn upsert(&self, records: &[ChunkVector]) -> StoreResult<()> {
        if records.is_empty() {
            debug!("No vectors to store");
            return Ok(());
        }

        if let Some(bad) = records
            .iter()
            .find(|r| r.vector.len() != self.vector_dimension)
        {
            return Err(SupportError::Database(format!(
                "Embedding dimension mismatch: got {}, the vector table expects {}",
                bad.vector.len(),
                self.vector_dimension
            )));
        }

        let table = self.open_table().await?;

        let id_list = records
            .iter()
            .map(|r| format!("'{}'", r.id.replace('\'', "''")))
            .join(", ");
        table
            .delete(&format!("id IN ({id_list})"))
            .await
            .map_err(|e| db_error("Failed to replace existing vectors", e))?;

        let record_batch = self.create_record_batch(records)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| db_error("Failed to insert vectors", e))?;

        debug!("Stored {} vectors", records.len());
        Ok(())
    }

    fn create_record_batch(&self, records: &[ChunkVector]) -> StoreResult<RecordBatch> {
        let vector_dim = self.vector_dimension;
        let created_at = Utc::now().to_rfc3339();

        let mut flat_values = Vec::with_capacity(records.len() * vector_dim);
        for record in records {
            flat_values.extend_from_slice(&record.vector);
        }

        let schema = Self::create_schema(vector_dim)?;
        let list_size = i32::try_from(vector_dim)
            .map_err(|e| db_error("Vector dimension out of range", e))?;
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            list_size,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| db_error("Failed to create vector array", e))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from_iter_values(
                records.iter().map(|r| r.id.as_str()),
            )),
            Arc::new(vector_array),
            Arc::new(Int64Array::from_iter_values(
                records.iter().map(|r| r.tenant_id),
            )),
            Arc::new(Int64Array::from_iter_values(
                records.iter().map(|r| r.document_id),
            )),
            Arc::new(UInt32Array::from_iter_values(
                records.iter().map(|r| r.chunk_index),
            )),
            Arc::new(StringArray::from_iter_values(
                records.iter().map(|r| r.content.as_str()),
            )),
            Arc::new(StringArray::from(
                records
                    .iter()
                    .map(|r| r.metadata.as_deref())
                    .collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from_iter_values(
                records.iter().map(|_| created_at.as_str()),
            )),
        ];

        RecordBatch::try_new(schema, arrays).map_err(|e| db_error("Failed to create record batch", e))
    }

    /// Top-`limit` chunks of one tenant by cosine similarity, best first
    #[inline]
    pub async fn search(
        &self,
        tenant_id: i64,
        query_vector: &[f32],
        limit: usize,
    ) -> StoreResult<Vec<VectorMatch>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        if query_vector.len() != self.vector_dimension {
            return Err(SupportError::Database(format!(
                "Query dimension mismatch: got {}, the vector table expects {}",
                query_vector.len(),
                self.vector_dimension
            )));
        }

        debug!(
            "Searching tenant {} for {} nearest chunks",
            tenant_id, limit
        );

        let table = self.open_table().await?;
        let mut results = table
            .vector_search(query_vector)
            .map_err(|e| db_error("Failed to create vector search", e))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .only_if(format!("tenant_id = {tenant_id}"))
            .limit(limit)
            .execute()
            .await
            .map_err(|e| db_error("Failed to execute search", e))?;

        let mut matches = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| db_error("Failed to read result stream", e))?
        {
            matches.extend(Self::parse_search_batch(&batch)?);
        }

        // The filter is pushed into the query; this guards the boundary regardless
        matches.retain(|m| m.tenant_id == tenant_id);
        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        matches.truncate(limit);

        debug!("Found {} matches for tenant {}", matches.len(), tenant_id);
        Ok(matches)
    }

    fn parse_search_batch(batch: &RecordBatch) -> StoreResult<Vec<VectorMatch>> {
        fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> StoreResult<&'a T> {
            batch
                .column_by_name(name)
                .ok_or_else(|| SupportError::Database(format!("Missing {name} column")))?
                .as_any()
                .downcast_ref::<T>()
                .ok_or_else(|| SupportError::Database(format!("Invalid {name} column type")))
        }

        let ids = column::<StringArray>(batch, "id")?;
        let tenant_ids = column::<Int64Array>(batch, "tenant_id")?;
        let document_ids = column::<Int64Array>(batch, "document_id")?;
        let chunk_indices = column::<UInt32Array>(batch, "chunk_index")?;
        let contents = column::<StringArray>(batch, "content")?;
        let metadata = column::<StringArray>(batch, "metadata")?;
        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

        let matches = (0..batch.num_rows())
            .map(|row| {
                let distance = distances.map_or(f32::NAN, |d| {
                    if d.is_null(row) { f32::NAN } else { d.value(row) }
                });
                VectorMatch {
                    id: ids.value(row).to_string(),
                    tenant_id: tenant_ids.value(row),
                    document_id: document_ids.value(row),
                    chunk_index: chunk_indices.value(row),
                    content: contents.value(row).to_string(),
                    metadata: (!metadata.is_null(row)).then(|| metadata.value(row).to_string()),
                    similarity: cosine_similarity_from_distance(distance),
                }
            })
            .collect();

        Ok(matches)
    }

    /// Remove every vector belonging to a document
    #[inline]
    pub async fn delete_document(&self, document_id: i64) -> StoreResult<()> {
        debug!("Deleting vectors for document {}", document_id);

        self.open_table()
            .await?
            .delete(&format!("document_id = {document_id}"))
            .await
            .map_err(|e| db_error("Failed to delete document vectors", e))?;

        Ok(())
    }

    /// Count stored vectors, optionally for one tenant only
    #[inline]
    pub async fn count(&self, tenant_id: Option<i64>) -> StoreResult<usize> {
        self.open_table()
            .await?
            .count_rows(tenant_id.map(|id| format!("tenant_id = {id}")))
            .await
            .map_err(|e| db_error("Failed to count rows", e))
    }
}
