use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{errors::ServiceError, services::exports::CsvExport};

/// JSON request body. Malformed or mistyped bodies are rejected as
/// `ValidationError` so they carry the usual error body and a 400.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// Body of bulk endpoints that only need ids.
#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkIdsRequest {
    pub ids: Vec<Uuid>,
}

/// `text/csv` download named by `Content-Disposition`.
pub fn csv_response(export: CsvExport) -> Result<Response, ServiceError> {
    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        export.filename
    ))
    .map_err(|e| ServiceError::InternalError(format!("invalid export filename: {}", e)))?;

    Ok((
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/csv; charset=utf-8"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        export.body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_download_headers() {
        let response = csv_response(CsvExport {
            filename: "orders-2026-01-09.csv".into(),
            body: "id\n1\n".into(),
        })
        .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/csv; charset=utf-8"
        );
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"orders-2026-01-09.csv\""
        );
    }
}
