use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;
use validator::{ValidationError, ValidationErrors, ValidationErrorsKind};

/// Field path (`components[1].weight`) to its error messages.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

// Postgres SQLSTATE codes we translate.
const UNIQUE_VIOLATION: &str = "23505";
const LOCK_NOT_AVAILABLE: &str = "55P03";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

#[derive(Debug, Error)]
pub enum DiaryError {
    #[error("validation error: {detail}")]
    Validation {
        detail: String,
        field_errors: Option<FieldErrors>,
    },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("permission denied: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("service busy: {0}")]
    Busy(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl DiaryError {
    pub fn invalid(detail: impl Into<String>) -> Self {
        Self::Validation {
            detail: detail.into(),
            field_errors: None,
        }
    }

    pub fn invalid_fields(field_errors: FieldErrors) -> Self {
        let detail = field_errors
            .iter()
            .map(|(field, messages)| format!("{}: {}", field, messages.join(", ")))
            .collect::<Vec<_>>()
            .join("; ");
        Self::Validation {
            detail,
            field_errors: Some(field_errors),
        }
    }

    pub fn meal_not_found(id: Uuid) -> Self {
        Self::NotFound(format!("Meal with id {} not found", id))
    }

    pub fn duplicate_meal() -> Self {
        Self::Conflict("A meal with these parameters already exists".into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            DiaryError::Validation { .. } => StatusCode::BAD_REQUEST,
            DiaryError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            DiaryError::Forbidden(_) => StatusCode::FORBIDDEN,
            DiaryError::NotFound(_) => StatusCode::NOT_FOUND,
            DiaryError::Conflict(_) => StatusCode::CONFLICT,
            DiaryError::Busy(_) => StatusCode::SERVICE_UNAVAILABLE,
            DiaryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for DiaryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => return Self::NotFound("record not found".into()),
            sqlx::Error::PoolTimedOut => {
                return Self::Busy("The database is currently busy. Please try again.".into())
            }
            _ => {}
        }

        let code = err
            .as_database_error()
            .and_then(|db| db.code())
            .map(|c| c.into_owned());
        match code.as_deref().and_then(from_sqlstate) {
            Some(mapped) => mapped,
            None => Self::Internal(anyhow::Error::new(err).context("database error")),
        }
    }
}

/// Postgres error codes with a dedicated meaning; everything else is internal.
fn from_sqlstate(code: &str) -> Option<DiaryError> {
    match code {
        UNIQUE_VIOLATION => Some(DiaryError::duplicate_meal()),
        LOCK_NOT_AVAILABLE | SERIALIZATION_FAILURE | DEADLOCK_DETECTED => Some(DiaryError::Busy(
            "The database is currently locked. Please try again.".into(),
        )),
        _ => None,
    }
}

impl From<ValidationErrors> for DiaryError {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields = FieldErrors::new();
        flatten_validation("", &errors, &mut fields);
        Self::invalid_fields(fields)
    }
}

fn flatten_validation(prefix: &str, errors: &ValidationErrors, out: &mut FieldErrors) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", prefix, field)
        };
        match kind {
            ValidationErrorsKind::Field(errs) => out
                .entry(path)
                .or_default()
                .extend(errs.iter().map(describe)),
            ValidationErrorsKind::Struct(inner) => flatten_validation(&path, inner, out),
            ValidationErrorsKind::List(items) => {
                for (idx, inner) in items {
                    flatten_validation(&format!("{}[{}]", path, idx), inner, out);
                }
            }
        }
    }
}

fn describe(err: &ValidationError) -> String {
    err.message
        .as_ref()
        .map(|m| m.to_string())
        .unwrap_or_else(|| format!("failed `{}` check", err.code))
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: &'static str,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_errors: Option<FieldErrors>,
}

impl IntoResponse for DiaryError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            DiaryError::Validation {
                detail,
                field_errors,
            } => ErrorBody {
                success: false,
                error: "Validation error",
                detail,
                field_errors,
            },
            DiaryError::Unauthorized(detail) => plain("Unauthorized", detail),
            DiaryError::Forbidden(detail) => plain("Permission denied", detail),
            DiaryError::NotFound(detail) => plain("Not found", detail),
            DiaryError::Conflict(detail) => plain("Conflict", detail),
            DiaryError::Busy(detail) => plain("Database busy", detail),
            DiaryError::Internal(e) => {
                tracing::error!(error = ?e, "unexpected error");
                plain("Internal server error", "An unexpected error occurred".into())
            }
        };
        (status, Json(body)).into_response()
    }
}

fn plain(error: &'static str, detail: String) -> ErrorBody {
    ErrorBody {
        success: false,
        error,
        detail,
        field_errors: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Item {
        #[validate(range(min = 1, message = "must be positive"))]
        qty: i32,
    }

    #[derive(Validate)]
    struct Order {
        #[validate(length(min = 1))]
        note: String,
        #[validate(nested)]
        items: Vec<Item>,
    }

    #[test]
    fn nested_validation_errors_are_flattened_with_paths() {
        let order = Order {
            note: String::new(),
            items: vec![Item { qty: 2 }, Item { qty: 0 }],
        };
        let err: DiaryError = order.validate().unwrap_err().into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let DiaryError::Validation { field_errors, .. } = err else {
            panic!("expected validation error");
        };
        let fields = field_errors.expect("field errors");
        assert_eq!(fields["items[1].qty"], vec!["must be positive".to_string()]);
        assert_eq!(fields["note"], vec!["failed `length` check".to_string()]);
        assert!(!fields.contains_key("items[0].qty"));
    }

    #[test]
    fn sqlx_errors_map_onto_taxonomy() {
        assert_eq!(
            DiaryError::from(sqlx::Error::RowNotFound).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            DiaryError::from(sqlx::Error::PoolTimedOut).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            DiaryError::from(sqlx::Error::PoolClosed).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn sqlstate_codes_map_onto_taxonomy() {
        let status = |code| from_sqlstate(code).map(|e| e.status());
        assert_eq!(status("23505"), Some(StatusCode::CONFLICT));
        assert_eq!(status("55P03"), Some(StatusCode::SERVICE_UNAVAILABLE));
        assert_eq!(status("40001"), Some(StatusCode::SERVICE_UNAVAILABLE));
        assert_eq!(status("40P01"), Some(StatusCode::SERVICE_UNAVAILABLE));
        assert_eq!(status("23503"), None);
    }

    #[tokio::test]
    async fn busy_renders_the_503_envelope() {
        let resp = from_sqlstate("55P03").unwrap().into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let bytes = http_body_util::BodyExt::collect(resp.into_body())
            .await
            .unwrap()
            .to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Database busy");
    }

    #[tokio::test]
    async fn internal_errors_do_not_leak_detail() {
        let err = DiaryError::Internal(anyhow::anyhow!("password=hunter2 leaked"));
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = http_body_util::BodyExt::collect(resp.into_body())
            .await
            .unwrap()
            .to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["detail"], "An unexpected error occurred");
        assert!(!String::from_utf8_lossy(&bytes).contains("hunter2"));
    }
}
