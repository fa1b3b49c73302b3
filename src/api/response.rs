use crate::cache::{PageInfo, Paginated};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Failures a route handler can answer with. Every variant renders as
/// `{"error": "..."}` with the matching status code.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Internal server error")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(detail) => {
                error!(detail = %detail, "Request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct DataBody<T> {
    pub data: T,
}

pub fn data<T: Serialize>(value: T) -> Json<DataBody<T>> {
    Json(DataBody { data: value })
}

pub fn created<T: Serialize>(value: T) -> (StatusCode, Json<DataBody<T>>) {
    (StatusCode::CREATED, data(value))
}

pub fn paginated<T: Serialize>(items: Vec<T>, pagination: PageInfo) -> Json<DataBody<Paginated<T>>> {
    data(Paginated {
        data: items,
        pagination,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Envelope;

    async fn body_of(response: Response) -> (u16, Vec<u8>) {
        let status = response.status().as_u16();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn test_errors_decode_through_envelope() {
        let (status, body) = body_of(ApiError::Unauthorized.into_response()).await;
        assert_eq!(status, 401);
        assert_eq!(
            Envelope::decode(status, &body).unwrap(),
            Envelope::Failure {
                status: 401,
                message: "Unauthorized".into()
            }
        );

        let (status, body) =
            body_of(ApiError::Internal("db exploded".into()).into_response()).await;
        assert_eq!(status, 500);
        let text = String::from_utf8(body).unwrap();
        assert!(!text.contains("db exploded"));
    }

    #[tokio::test]
    async fn test_paginated_body_shape() {
        let response = paginated(
            vec![1, 2],
            PageInfo {
                page: Some(1),
                ..PageInfo::default()
            },
        )
        .into_response();
        let (status, body) = body_of(response).await;

        assert_eq!(
            Envelope::decode(status, &body).unwrap(),
            Envelope::Paginated(
                vec![json!(1), json!(2)],
                PageInfo {
                    page: Some(1),
                    ..PageInfo::default()
                }
            )
        );
    }
}
