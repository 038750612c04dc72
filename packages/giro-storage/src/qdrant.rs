pub const DENSE_VECTOR_NAME: &str = "dense";
pub const SPARSE_VECTOR_NAME: &str = "sparse";

use qdrant_client::qdrant::{
	CreateCollectionBuilder, CreateFieldIndexCollection, DeletePointsBuilder, Distance, FieldType,
	GetPointsBuilder, Modifier, PointId, PointStruct, RetrievedPoint, SparseVectorParamsBuilder,
	SparseVectorsConfigBuilder, UpsertPointsBuilder, VectorParamsBuilder, VectorsConfigBuilder,
};
use uuid::Uuid;

use crate::Result;

/// Payload fields carrying a native index, created alongside the
/// collection so spatial and temporal filters run index-side.
const PAYLOAD_INDEXES: [(&str, FieldType); 4] = [
	("event_id", FieldType::Keyword),
	("location", FieldType::Geo),
	("start_date", FieldType::Datetime),
	("end_date", FieldType::Datetime),
];

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &giro_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	/// Create the collection (named dense + sparse vectors) when missing
	/// and install the payload indexes the filters rely on.
	pub async fn ensure_collection(&self) -> Result<()> {
		if !self.client.collection_exists(&self.collection).await? {
			let mut vectors_config = VectorsConfigBuilder::default();

			vectors_config.add_named_vector_params(
				DENSE_VECTOR_NAME,
				VectorParamsBuilder::new(self.vector_dim.into(), Distance::Cosine),
			);

			let mut sparse_vectors_config = SparseVectorsConfigBuilder::default();

			sparse_vectors_config.add_named_vector_params(
				SPARSE_VECTOR_NAME,
				SparseVectorParamsBuilder::default().modifier(Modifier::Idf as i32),
			);

			let builder = CreateCollectionBuilder::new(self.collection.clone())
				.vectors_config(vectors_config)
				.sparse_vectors_config(sparse_vectors_config);

			self.client.create_collection(builder).await?;

			tracing::info!(collection = %self.collection, "Created collection.");
		}
		for (field_name, field_type) in PAYLOAD_INDEXES {
			let request = CreateFieldIndexCollection {
				collection_name: self.collection.clone(),
				wait: Some(true),
				field_name: field_name.to_string(),
				field_type: Some(field_type as i32),
				field_index_params: None,
				ordering: None,
			};

			if let Err(err) = self.client.create_field_index(request).await {
				// Recreating an existing index is not an error worth surfacing.
				tracing::debug!(error = %err, field_name, "Payload index creation skipped.");
			}
		}

		Ok(())
	}

	pub async fn upsert_points(&self, points: Vec<PointStruct>, wait: bool) -> Result<()> {
		let upsert = UpsertPointsBuilder::new(self.collection.clone(), points).wait(wait);

		self.client.upsert_points(upsert).await?;

		Ok(())
	}

	pub async fn delete_points(&self, ids: &[Uuid], wait: bool) -> Result<()> {
		if ids.is_empty() {
			return Ok(());
		}

		let ids: Vec<PointId> = ids.iter().map(|id| PointId::from(id.to_string())).collect();
		let delete = DeletePointsBuilder::new(self.collection.clone()).points(ids).wait(wait);

		self.client.delete_points(delete).await?;

		Ok(())
	}

	pub async fn get_points(&self, ids: &[Uuid]) -> Result<Vec<RetrievedPoint>> {
		if ids.is_empty() {
			return Ok(Vec::new());
		}

		let ids: Vec<PointId> = ids.iter().map(|id| PointId::from(id.to_string())).collect();
		let get = GetPointsBuilder::new(self.collection.clone(), ids).with_payload(true);
		let response = self.client.get_points(get).await?;

		Ok(response.result)
	}
}
