use crate::bulk_import::{decode_upload, has_allowed_extension, BulkImporter};
use crate::config::{Config, APP_NAME, APP_VERSION};
use crate::errors::{AppError, ResultExt};
use crate::models::*;
use crate::module_router::{Databases, ModuleQuery};
use crate::validation::require_iso_date;
use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Multipart, Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use serde_json::json;
use std::sync::Arc;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// One pool per module database.
    pub databases: Databases,
    /// Application configuration.
    pub config: Config,
}

/// GET /
///
/// Welcome payload. Touches no database.
pub async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": format!("Welcome to {}", APP_NAME),
        "version": APP_VERSION,
        "docs": "/docs",
        "openapi": "/api-docs/openapi.yml"
    }))
}

/// GET /health
///
/// Liveness only: answers even when every database is unreachable.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// POST /contribuinte/
///
/// Creates a record in the selected module database.
///
/// # Returns
///
/// * `Result<Json<Contribuinte>, AppError>` - The stored record with its generated id,
///   `Conflict` when the tax id or email is taken.
pub async fn create_contribuinte(
    State(state): State<Arc<AppState>>,
    selector: Result<Query<ModuleQuery>, QueryRejection>,
    payload: Result<Json<ContribuinteCreate>, JsonRejection>,
) -> Result<Json<Contribuinte>, AppError> {
    let Query(selector) = selector?;
    let Json(payload) = payload?;
    let module = selector.module();
    tracing::info!("POST /contribuinte - module {}", module);

    payload.validate()?;

    let created = state.databases.repository(module).create(&payload).await?;
    tracing::info!(
        "Created contribuinte {} in module {}",
        created.ref_id,
        module
    );

    Ok(Json(created))
}

/// GET /contribuinte/
///
/// Lists records in insertion order with `skip`/`limit` paging.
pub async fn list_contribuintes(
    State(state): State<Arc<AppState>>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<Contribuinte>>, AppError> {
    let Query(params) = params?;
    let module = params.module();
    tracing::info!(
        "GET /contribuinte - module {}, skip {}, limit {}",
        module,
        params.skip,
        params.limit
    );

    let rows = state
        .databases
        .repository(module)
        .list(params.skip, params.limit)
        .await?;

    Ok(Json(rows))
}

/// GET /contribuinte/by-date/:dat_proce
///
/// All records with the given process date. The date must be `YYYY-MM-DD`;
/// anything else is a 400, never an empty list.
pub async fn get_contribuintes_by_date(
    State(state): State<Arc<AppState>>,
    dat_proce: Result<Path<String>, PathRejection>,
    selector: Result<Query<ModuleQuery>, QueryRejection>,
) -> Result<Json<Vec<Contribuinte>>, AppError> {
    let Path(dat_proce) = dat_proce?;
    let Query(selector) = selector?;
    let module = selector.module();
    tracing::info!("GET /contribuinte/by-date/{} - module {}", dat_proce, module);

    let date = require_iso_date(&dat_proce)?;
    let rows = state
        .databases
        .repository(module)
        .find_by_process_date(date)
        .await?;

    Ok(Json(rows))
}

/// GET /contribuinte/by-client/:cliente
///
/// Case-insensitive substring search on the client name.
pub async fn get_contribuintes_by_client(
    State(state): State<Arc<AppState>>,
    cliente: Result<Path<String>, PathRejection>,
    selector: Result<Query<ModuleQuery>, QueryRejection>,
) -> Result<Json<Vec<Contribuinte>>, AppError> {
    let Path(cliente) = cliente?;
    let Query(selector) = selector?;
    let module = selector.module();
    tracing::info!("GET /contribuinte/by-client/{} - module {}", cliente, module);

    let rows = state
        .databases
        .repository(module)
        .find_by_client(&cliente)
        .await?;

    Ok(Json(rows))
}

/// GET /contribuinte/:ref_id
pub async fn get_contribuinte(
    State(state): State<Arc<AppState>>,
    ref_id: Result<Path<i32>, PathRejection>,
    selector: Result<Query<ModuleQuery>, QueryRejection>,
) -> Result<Json<Contribuinte>, AppError> {
    let Path(ref_id) = ref_id?;
    let Query(selector) = selector?;
    let module = selector.module();
    tracing::info!("GET /contribuinte/{} - module {}", ref_id, module);

    let record = state.databases.repository(module).get_by_id(ref_id).await?;
    Ok(Json(record))
}

/// GET /contribuinte/cpf/:cpf_cnpj
pub async fn get_contribuinte_by_cpf(
    State(state): State<Arc<AppState>>,
    cpf_cnpj: Result<Path<String>, PathRejection>,
    selector: Result<Query<ModuleQuery>, QueryRejection>,
) -> Result<Json<Contribuinte>, AppError> {
    let Path(cpf_cnpj) = cpf_cnpj?;
    let Query(selector) = selector?;
    let module = selector.module();
    tracing::info!("GET /contribuinte/cpf/{} - module {}", cpf_cnpj, module);

    let record = state
        .databases
        .repository(module)
        .get_by_tax_id(&cpf_cnpj)
        .await?;
    Ok(Json(record))
}

/// PUT /contribuinte/:ref_id
///
/// Partial update: fields missing from the body keep their stored value.
pub async fn update_contribuinte(
    State(state): State<Arc<AppState>>,
    ref_id: Result<Path<i32>, PathRejection>,
    selector: Result<Query<ModuleQuery>, QueryRejection>,
    patch: Result<Json<ContribuinteUpdate>, JsonRejection>,
) -> Result<Json<Contribuinte>, AppError> {
    let Path(ref_id) = ref_id?;
    let Query(selector) = selector?;
    let Json(patch) = patch?;
    let module = selector.module();
    tracing::info!("PUT /contribuinte/{} - module {}", ref_id, module);

    patch.validate()?;

    let updated = state
        .databases
        .repository(module)
        .update(ref_id, &patch)
        .await?;

    Ok(Json(updated))
}

/// DELETE /contribuinte/:ref_id
pub async fn delete_contribuinte(
    State(state): State<Arc<AppState>>,
    ref_id: Result<Path<i32>, PathRejection>,
    selector: Result<Query<ModuleQuery>, QueryRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Path(ref_id) = ref_id?;
    let Query(selector) = selector?;
    let module = selector.module();
    tracing::info!("DELETE /contribuinte/{} - module {}", ref_id, module);

    state.databases.repository(module).delete(ref_id).await?;

    Ok(Json(MessageResponse {
        message: "Contribuinte deleted successfully".to_string(),
    }))
}

/// POST /contribuinte/bulk-upload
///
/// Multipart upload with a `file` field (`.csv` or `.txt`). Row problems are
/// reported in the response body; only file-level failures turn into an
/// error status.
pub async fn bulk_upload(
    State(state): State<Arc<AppState>>,
    selector: Result<Query<ModuleQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<BulkUploadResponse>, AppError> {
    let Query(selector) = selector?;
    let mut multipart = multipart?;
    let module = selector.module();
    tracing::info!("POST /contribuinte/bulk-upload - module {}", module);

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        if !has_allowed_extension(&filename) {
            return Err(AppError::BadRequest(
                "Only .csv and .txt files are allowed".to_string(),
            ));
        }

        let bytes = field.bytes().await?;
        let content = decode_upload(&bytes)?;

        let importer = BulkImporter::new(state.databases.repository(module));
        let summary = importer
            .import(content)
            .await
            .with_context(|| format!("bulk upload of '{}' into module {}", filename, module))?;

        tracing::info!(
            "Bulk upload '{}' into module {}: {} inserted, {} errors",
            filename,
            module,
            summary.success_count,
            summary.error_count
        );
        return Ok(Json(summary));
    }

    Err(AppError::BadRequest("No file uploaded".to_string()))
}
