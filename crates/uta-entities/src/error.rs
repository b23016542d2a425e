use thiserror::Error;

#[derive(Debug, Error)]
pub enum EntityError {
    #[error("map document parse error: {0}")]
    MapParse(#[from] serde_json::Error),

    #[error("map record {id} listed under the wrong section (kind {kind})")]
    MapKindMismatch { id: String, kind: String },

    #[error("duplicate map record {0}")]
    DuplicateMapRecord(String),

    #[error("route error: {0}")]
    Route(#[from] uta_route::RouteError),
}

pub type EntityResult<T> = Result<T, EntityError>;
