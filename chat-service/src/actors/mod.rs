pub mod embedding_actor;
pub mod model_gateway;
pub mod session_actor;
pub mod sql_actor;
pub mod vector_actor;

pub use embedding_actor::{EmbeddingActor, EmbeddingBackend};
pub use model_gateway::ModelGatewayActor;
pub use session_actor::ChatStoreActor;
pub use sql_actor::ReadOnlySqlActor;
pub use vector_actor::DocumentVectorStoreActor;
