use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Message returned when a tax id is already stored in the selected database.
pub const DUPLICATE_TAX_ID: &str = "CPF/CNPJ already registered";
/// Message returned when an email is already stored in the selected database.
pub const DUPLICATE_EMAIL: &str = "Email already registered";
/// Message returned when no record matches the requested id or tax id.
pub const CONTRIBUINTE_NOT_FOUND: &str = "Contribuinte not found";

/// Application-specific error types.
#[derive(Debug)]
pub enum AppError {
    /// Unexpected database failure.
    DatabaseError(sqlx::Error),
    /// No record at the given id or tax id.
    NotFound(String),
    /// Well-formed but semantically invalid input (bad date, wrong file type).
    BadRequest(String),
    /// Payload failed field validation before reaching storage.
    Validation(String),
    /// Uniqueness violation on tax id or email.
    Conflict(String),
    /// Internal server error.
    InternalError(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl AppError {
    /// Unwraps context layers down to the originating error.
    pub fn root(&self) -> &AppError {
        match self {
            AppError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// HTTP status this error is reported with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::DatabaseError(_) | AppError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::WithContext { source, .. } => source.status_code(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::DatabaseError(e) => write!(f, "Database error: {}", e),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Maps each variant to its status code and a `{"detail": ...}` body.
    ///
    /// Only unexpected failures are logged as errors; the caller-recoverable
    /// outcomes carry their message through unchanged.
    fn into_response(self) -> Response {
        let status = self.status_code();
        let detail = match &self {
            AppError::WithContext { source, context } => {
                if status.is_server_error() {
                    tracing::error!("Error with context: {} -> {}", context, source);
                } else {
                    tracing::debug!("{} -> {}", context, source);
                }
                public_message(source.root())
            }
            other => {
                if let AppError::DatabaseError(e) = other {
                    tracing::error!("Database error: {:?}", e);
                } else if let AppError::InternalError(msg) = other {
                    tracing::error!("Internal error: {}", msg);
                }
                public_message(other)
            }
        };

        let body = Json(json!({
            "detail": detail,
        }));

        (status, body).into_response()
    }
}

/// The message safe to show to a caller: internal detail stays in the logs.
fn public_message(err: &AppError) -> String {
    match err {
        AppError::DatabaseError(_) => "Database error".to_string(),
        AppError::InternalError(_) => "Internal server error".to_string(),
        AppError::NotFound(msg)
        | AppError::BadRequest(msg)
        | AppError::Validation(msg)
        | AppError::Conflict(msg) => msg.clone(),
        AppError::WithContext { source, .. } => public_message(source),
    }
}

impl From<sqlx::Error> for AppError {
    /// Unique violations become conflicts; the storage constraint is the
    /// authoritative guard when two writers pass the pre-check together.
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                let on_email = db_err
                    .constraint()
                    .map(|c| c.contains("email"))
                    .unwrap_or(false);
                return AppError::Conflict(
                    if on_email { DUPLICATE_EMAIL } else { DUPLICATE_TAX_ID }.to_string(),
                );
            }
        }
        AppError::DatabaseError(err)
    }
}

impl From<axum::extract::multipart::MultipartError> for AppError {
    /// Malformed multipart framing is the caller's problem; anything else
    /// that goes wrong while reading the body is ours.
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        if err.status().is_client_error() {
            AppError::BadRequest(format!("Malformed upload: {}", err.body_text()))
        } else {
            AppError::InternalError(format!("Failed to read uploaded file: {}", err))
        }
    }
}

// Extractor rejections, reported with the same `{"detail": ...}` body.

impl From<JsonRejection> for AppError {
    /// A well-formed body with wrong or missing fields is a validation
    /// failure; anything unreadable as JSON is a bad request.
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(e) => AppError::Validation(e.body_text()),
            other => AppError::BadRequest(other.body_text()),
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}

/// Extension for sqlx::Error to add context
impl<T> ResultExt<T> for Result<T, sqlx::Error> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::from(e)),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::from(e)),
            context: f(),
        })
    }
}
