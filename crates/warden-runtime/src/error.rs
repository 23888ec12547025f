//! Mapping engine errors to caller-facing responses.

use crate::middleware::MiddlewareContext;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, warn};
use warden_core::EngineError;

const INTERNAL_MESSAGE: &str = "Internal server error";

/// Error body handed back to the route layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub status_code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Normalize `err` into a response and log it.
///
/// Client errors keep their message and structured data. Server errors are
/// logged in full and answered with a generic message.
pub fn error_handler(err: &EngineError, ctx: Option<&MiddlewareContext>) -> ErrorResponse {
    let status_code = err.status_code();
    let model = ctx.map(|c| c.model.as_str()).unwrap_or("-");
    let operation = ctx.map(|c| c.operation.as_str()).unwrap_or("-");
    let user = ctx.map(|c| c.user.id.as_str()).unwrap_or("-");

    if status_code >= 500 {
        error!(model, operation, user, status_code, error = %err, "Request failed");
        return ErrorResponse {
            status_code,
            message: INTERNAL_MESSAGE.to_string(),
            data: None,
        };
    }

    warn!(model, operation, user, status_code, error = %err, "Request rejected");
    ErrorResponse {
        status_code,
        message: err.to_string(),
        data: err.data(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Operation;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use warden_core::{PermissionError, Principal, StoreError, ValidationError};

    #[test]
    fn test_store_codes_map_to_status() {
        let cases = [("P2002", 409), ("P2025", 404), ("P2003", 400), ("P1008", 408), ("P5000", 500)];
        for (code, status) in cases {
            let err: EngineError = StoreError::from_code(code, "boom").into();
            assert_eq!(error_handler(&err, None).status_code, status, "{}", code);
        }
    }

    #[test]
    fn test_structured_errors_pass_through() {
        let err: EngineError = ValidationError::relation_not_included("author").into();
        let response = error_handler(&err, None);
        assert_eq!(response.status_code, 400);
        assert_eq!(response.data.as_ref().unwrap()["relation"], "author");
        assert_eq!(response.data.unwrap()["code"], "relation_not_included");

        let ctx = MiddlewareContext::new("Post", Operation::Update, Principal::new("u1", "viewer"));
        let err: EngineError = PermissionError::update_denied("Post").into();
        let response = error_handler(&err, Some(&ctx));
        assert_eq!(response.status_code, 403);
        assert_eq!(response.data, Some(json!({"model": "Post"})));
    }

    #[test]
    fn test_server_errors_hide_details() {
        let err: EngineError = StoreError::from_code("XX000", "relation \"post\" where id = 1 failed").into();
        let response = error_handler(&err, None);
        assert_eq!(response.status_code, 500);
        assert_eq!(response.message, "Internal server error");
        assert_eq!(response.data, None);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"status_code": 500, "message": "Internal server error"})
        );
    }
}
