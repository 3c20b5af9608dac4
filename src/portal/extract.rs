//! Request extractors whose rejections render as [`PortalError`] bodies.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{FromRequest, FromRequestParts};

use super::error::PortalError;

#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(PortalError))]
pub struct PortalJson<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(PortalError))]
pub struct PortalPath<T>(pub T);

impl From<JsonRejection> for PortalError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for PortalError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::response::IntoResponse;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Review {
        #[allow(dead_code)]
        status: String,
    }

    #[tokio::test]
    async fn test_missing_field_is_validation() {
        let request = Request::builder()
            .method("POST")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"comment":"x"}"#))
            .unwrap();
        let err = PortalJson::<Review>::from_request(request, &()).await.unwrap_err();
        assert!(matches!(err, PortalError::Validation(ref m) if m.contains("status")));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_wrong_content_type_is_validation() {
        let request = Request::builder()
            .method("POST")
            .body(Body::from(r#"{"status":"approved"}"#))
            .unwrap();
        let err = PortalJson::<Review>::from_request(request, &()).await.unwrap_err();
        assert!(matches!(err, PortalError::Validation(_)));
    }
}
