//! Success envelopes. Every body is `{ "data": ... }`; writes that pass with
//! soft warnings add `warnings`.

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct WarnedResponse<T: Serialize, W: Serialize> {
    pub data: T,
    pub warnings: Vec<W>,
}

/// `201 Created` with the new resource in the envelope.
pub type Created<T> = (StatusCode, Json<DataResponse<T>>);

pub fn created<T: Serialize>(data: T) -> Created<T> {
    (StatusCode::CREATED, Json(DataResponse { data }))
}
