use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `POST /store_embedding` body.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StoreRequest {
    pub image_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StoreResponse {
    pub id: String,
}

/// `POST /compare` body.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CompareRequest {
    #[serde(rename = "image_path_A")]
    pub image_path_a: Option<String>,
    #[serde(rename = "image_path_B")]
    pub image_path_b: Option<String>,
}

/// `POST /search` body. `top_k` is kept raw so numeric strings are accepted.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    pub image_path: Option<String>,
    pub top_k: Option<Value>,
}

/// `GET /list` query.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    pub limit: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted_id: String,
}
