use std::path::Path;
use std::sync::Arc;

use arrow_array::{Array, Float32Array, Int32Array, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use futures::StreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection};
use tokio::sync::mpsc;

use crate::protocol::{DocumentHit, VectorMsg};

/// Read-only view over the knowledge-base chunks in LanceDB.
///
/// Ingestion happens elsewhere; a collection that was never created is
/// treated as an empty store.
pub struct DocumentVectorStoreActor {
    rx: mpsc::Receiver<VectorMsg>,
    connection: Connection,
    collection: String,
    max_distance: Option<f32>,
}

impl DocumentVectorStoreActor {
    pub async fn new(
        rx: mpsc::Receiver<VectorMsg>,
        db_path: &Path,
        collection: String,
        max_distance: Option<f32>,
    ) -> Result<Self, String> {
        let uri = db_path.to_string_lossy();
        let connection = connect(&uri)
            .execute()
            .await
            .map_err(|e| format!("Failed to connect to LanceDB at {}: {}", uri, e))?;
        tracing::info!(path = %uri, %collection, "vector store connected");

        Ok(Self {
            rx,
            connection,
            collection,
            max_distance,
        })
    }

    pub async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            let connection = self.connection.clone();
            let collection = self.collection.clone();
            let max_distance = self.max_distance;

            tokio::spawn(async move {
                match msg {
                    VectorMsg::SearchDocuments {
                        query_vector,
                        limit,
                        respond_to,
                    } => {
                        let result = search_documents(
                            &connection,
                            &collection,
                            query_vector,
                            limit,
                            max_distance,
                        )
                        .await;
                        if let Err(e) = &result {
                            tracing::warn!(%collection, error = %e, "document search failed");
                        }
                        let _ = respond_to.send(result);
                    }
                }
            });
        }
    }
}

/// Schema the ingestion job writes document chunks with.
pub fn documents_table_schema(dimensions: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("source", DataType::Utf8, true),
        Field::new("page", DataType::Int64, true),
        Field::new("page_content", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dimensions,
            ),
            true,
        ),
    ]))
}

async fn search_documents(
    connection: &Connection,
    collection: &str,
    query_vector: Vec<f32>,
    limit: usize,
    max_distance: Option<f32>,
) -> Result<Vec<DocumentHit>, String> {
    let table_names = connection
        .table_names()
        .execute()
        .await
        .map_err(|e| format!("Failed to list tables: {}", e))?;
    if !table_names.iter().any(|name| name == collection) {
        tracing::debug!(%collection, "collection does not exist, returning no hits");
        return Ok(Vec::new());
    }

    let table = connection
        .open_table(collection)
        .execute()
        .await
        .map_err(|e| format!("Failed to open table {}: {}", collection, e))?;
    let row_count = table
        .count_rows(None)
        .await
        .map_err(|e| format!("Failed to count rows: {}", e))?;
    if row_count == 0 {
        return Ok(Vec::new());
    }

    // Results arrive closest first
    let mut stream = table
        .query()
        .nearest_to(query_vector)
        .map_err(|e| format!("Failed to create vector query: {}", e))?
        .limit(limit)
        .execute()
        .await
        .map_err(|e| format!("Vector search failed: {}", e))?;

    let mut hits = Vec::new();
    while let Some(batch) = stream.next().await {
        let batch = batch.map_err(|e| format!("Failed to read search results: {}", e))?;
        hits.extend(hits_from_batch(&batch)?);
    }

    if let Some(threshold) = max_distance {
        hits.retain(|hit| hit.distance <= threshold);
    }
    hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    hits.truncate(limit);
    Ok(hits)
}

fn hits_from_batch(batch: &RecordBatch) -> Result<Vec<DocumentHit>, String> {
    let contents = batch
        .column_by_name("page_content")
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| "Search results have no page_content column".to_string())?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>());
    let sources = batch
        .column_by_name("source")
        .and_then(|c| c.as_any().downcast_ref::<StringArray>());
    let page_column = batch.column_by_name("page");

    let mut hits = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let source = sources
            .filter(|s| !s.is_null(row))
            .map(|s| s.value(row).to_string());
        let page = page_column.and_then(|col| page_at(col.as_ref(), row));
        let distance = distances.map(|d| d.value(row)).unwrap_or(0.0);

        hits.push(DocumentHit {
            source,
            page,
            page_content: contents.value(row).to_string(),
            distance,
        });
    }
    Ok(hits)
}

/// Page numbers are written as either 64- or 32-bit integers.
fn page_at(column: &dyn Array, row: usize) -> Option<i64> {
    if column.is_null(row) {
        return None;
    }
    if let Some(pages) = column.as_any().downcast_ref::<Int64Array>() {
        return Some(pages.value(row));
    }
    column
        .as_any()
        .downcast_ref::<Int32Array>()
        .map(|pages| i64::from(pages.value(row)))
}
