use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use common::{
    preview, DatasetInfo, DatasetPreview, JobRecord, JobRequest, ModelConfig,
    ModelConfigRequest, Project, ProjectRequest,
};
use serde::Deserialize;
use std::fs;
use std::io;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::state::AppState;
use crate::store::{JobStore, StoreError};

pub fn build_router(state: AppState) -> Router {
    let static_dir = state.config.static_dir.clone();

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/projects", post(create_project).get(list_projects))
        .route(
            "/api/v1/projects/:id",
            get(get_project).delete(delete_project),
        )
        .route(
            "/api/v1/projects/:id/datasets",
            post(upload_dataset).get(list_datasets),
        )
        .route("/api/v1/datasets/:id/preview", get(preview_dataset))
        .route(
            "/api/v1/projects/:id/models",
            post(create_model).get(list_models),
        )
        .route("/api/v1/models/:id", get(get_model))
        .route("/api/v1/projects/:id/jobs", post(create_job).get(list_jobs))
        .route("/api/v1/jobs/:id", get(get_job))
        .route("/api/v1/jobs/:id/cancel", post(cancel_job))
        // la UI estática (index.html + app.js) cuelga de la raíz
        .fallback_service(ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/* ---------------- handlers HTTP ---------------- */

async fn health() -> &'static str {
    "ok"
}

/* --------- proyectos --------- */

async fn create_project(
    State(state): State<AppState>,
    Json(req): Json<ProjectRequest>,
) -> Result<Json<Project>, (StatusCode, String)> {
    if req.name.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "name no puede ser vacío".to_string()));
    }

    let project = Project {
        id: uuid::Uuid::new_v4().to_string(),
        name: req.name,
        description: req.description,
        created_at: Utc::now(),
    };

    {
        let mut projects = state.projects.lock().unwrap();
        projects.insert(project.id.clone(), project.clone());
    }

    info!("proyecto creado: {} ({})", project.id, project.name);
    Ok(Json(project))
}

async fn list_projects(State(state): State<AppState>) -> Json<Vec<Project>> {
    let projects = state.projects.lock().unwrap();
    let mut out: Vec<Project> = projects.values().cloned().collect();
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Json(out)
}

async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Project>, StatusCode> {
    let projects = state.projects.lock().unwrap();

    if let Some(project) = projects.get(&id) {
        Ok(Json(project.clone()))
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

// Borra el proyecto y todo lo que cuelga de él: cancela jobs vivos,
// saca datasets (metadata + archivo en disco) y configs de modelo.
// Los registros de jobs terminales quedan consultables por id.
async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let removed = {
        let mut projects = state.projects.lock().unwrap();
        projects.remove(&id)
    };
    if removed.is_none() {
        return Err(StatusCode::NOT_FOUND);
    }

    // 1) cancelar los jobs que sigan corriendo
    for job in state.store.list_for_project(&id) {
        if !job.status.is_terminal() {
            let _ = state.simulator.cancel(&job.id);
        }
    }

    // 2) datasets: sacar metadata y borrar los archivos subidos
    let datasets_removed: Vec<DatasetInfo> = {
        let mut datasets = state.datasets.lock().unwrap();
        let ids: Vec<String> = datasets
            .values()
            .filter(|d| d.project_id == id)
            .map(|d| d.id.clone())
            .collect();
        ids.iter().filter_map(|did| datasets.remove(did)).collect()
    };
    for d in &datasets_removed {
        if let Err(e) = fs::remove_file(&d.stored_path) {
            warn!("no se pudo borrar {}: {}", d.stored_path, e);
        }
    }

    // 3) configs de modelo del proyecto
    {
        let mut models = state.models.lock().unwrap();
        models.retain(|_, m| m.project_id != id);
    }

    info!(
        "proyecto {} eliminado ({} datasets borrados)",
        id,
        datasets_removed.len()
    );
    Ok(StatusCode::NO_CONTENT)
}

/* --------- datasets --------- */

// Sube un archivo de dataset (multipart) y guarda los bytes bajo
// <data_dir>/uploads/<project_id>/.
async fn upload_dataset(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<DatasetInfo>, (StatusCode, String)> {
    // 1) el proyecto debe existir
    {
        let projects = state.projects.lock().unwrap();
        if !projects.contains_key(&project_id) {
            return Err((StatusCode::NOT_FOUND, "proyecto no encontrado".to_string()));
        }
    }

    // 2) tomar el primer campo del multipart que traiga archivo
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("multipart inválido: {e}")))?
    {
        let Some(original) = field.file_name().map(|s| s.to_string()) else {
            continue;
        };

        let bytes = field
            .bytes()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("error leyendo archivo: {e}")))?;

        let dataset_id = uuid::Uuid::new_v4().to_string();

        // quedarnos solo con el nombre, sin rutas que mande el cliente
        let filename = std::path::Path::new(&original)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "dataset.bin".to_string());

        let dir = state.config.uploads_dir().join(&project_id);
        fs::create_dir_all(&dir).map_err(internal_error)?;

        let stored = dir.join(format!("{}_{}", dataset_id, filename));
        fs::write(&stored, &bytes).map_err(internal_error)?;

        let dataset = DatasetInfo {
            id: dataset_id.clone(),
            project_id: project_id.clone(),
            filename,
            stored_path: stored.to_string_lossy().to_string(),
            size_bytes: bytes.len() as u64,
            uploaded_at: Utc::now(),
        };

        {
            let mut datasets = state.datasets.lock().unwrap();
            datasets.insert(dataset_id, dataset.clone());
        }

        info!(
            "dataset {} subido al proyecto {} ({} bytes)",
            dataset.id, project_id, dataset.size_bytes
        );
        return Ok(Json(dataset));
    }

    Err((
        StatusCode::BAD_REQUEST,
        "falta un campo de archivo en el multipart".to_string(),
    ))
}

async fn list_datasets(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<DatasetInfo>>, StatusCode> {
    {
        let projects = state.projects.lock().unwrap();
        if !projects.contains_key(&project_id) {
            return Err(StatusCode::NOT_FOUND);
        }
    }

    let datasets = state.datasets.lock().unwrap();
    let mut out: Vec<DatasetInfo> = datasets
        .values()
        .filter(|d| d.project_id == project_id)
        .cloned()
        .collect();
    out.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
    Ok(Json(out))
}

#[derive(Debug, Deserialize)]
struct PreviewParams {
    rows: Option<usize>,
}

// Primeras filas de un dataset (CSV o JSON) para la UI.
async fn preview_dataset(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<PreviewParams>,
) -> Result<Json<DatasetPreview>, (StatusCode, String)> {
    let stored_path = {
        let datasets = state.datasets.lock().unwrap();
        match datasets.get(&id) {
            Some(d) => d.stored_path.clone(),
            None => return Err((StatusCode::NOT_FOUND, "dataset no encontrado".to_string())),
        }
    };

    let rows = params.rows.unwrap_or(preview::DEFAULT_PREVIEW_ROWS);

    match preview::preview_file(&stored_path, rows) {
        Ok(p) => Ok(Json(p)),
        Err(e) if e.kind() == io::ErrorKind::InvalidData => {
            Err((StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err((
            StatusCode::NOT_FOUND,
            "el archivo del dataset ya no existe".to_string(),
        )),
        Err(e) => Err(internal_error(e)),
    }
}

/* --------- configs de modelo --------- */

async fn create_model(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(req): Json<ModelConfigRequest>,
) -> Result<Json<ModelConfig>, (StatusCode, String)> {
    {
        let projects = state.projects.lock().unwrap();
        if !projects.contains_key(&project_id) {
            return Err((StatusCode::NOT_FOUND, "proyecto no encontrado".to_string()));
        }
    }

    if req.name.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "name no puede ser vacío".to_string()));
    }
    if !req.hyperparams.is_object() {
        return Err((
            StatusCode::BAD_REQUEST,
            "hyperparams debe ser un objeto JSON".to_string(),
        ));
    }

    let model = ModelConfig {
        id: uuid::Uuid::new_v4().to_string(),
        project_id: project_id.clone(),
        name: req.name,
        hyperparams: req.hyperparams,
        created_at: Utc::now(),
    };

    {
        let mut models = state.models.lock().unwrap();
        models.insert(model.id.clone(), model.clone());
    }

    info!("config de modelo {} guardada en proyecto {}", model.id, project_id);
    Ok(Json(model))
}

async fn list_models(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<ModelConfig>>, StatusCode> {
    {
        let projects = state.projects.lock().unwrap();
        if !projects.contains_key(&project_id) {
            return Err(StatusCode::NOT_FOUND);
        }
    }

    let models = state.models.lock().unwrap();
    let mut out: Vec<ModelConfig> = models
        .values()
        .filter(|m| m.project_id == project_id)
        .cloned()
        .collect();
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(out))
}

async fn get_model(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ModelConfig>, StatusCode> {
    let models = state.models.lock().unwrap();

    if let Some(model) = models.get(&id) {
        Ok(Json(model.clone()))
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

/* --------- jobs de entrenamiento --------- */

// Crea la fila queued y se la entrega al simulador (fire-and-forget).
// Devuelve el registro tal como quedó tras el arranque.
async fn create_job(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(req): Json<JobRequest>,
) -> Result<Json<JobRecord>, (StatusCode, String)> {
    // 1) el proyecto debe existir
    {
        let projects = state.projects.lock().unwrap();
        if !projects.contains_key(&project_id) {
            return Err((StatusCode::NOT_FOUND, "proyecto no encontrado".to_string()));
        }
    }

    // 2) resolver la config: model_id guardado o config inline
    let (model_id, config) = match req.model_id {
        Some(mid) => {
            let models = state.models.lock().unwrap();
            match models.get(&mid) {
                Some(m) if m.project_id == project_id => {
                    (Some(mid.clone()), m.hyperparams.clone())
                }
                _ => {
                    return Err((
                        StatusCode::BAD_REQUEST,
                        format!("model_id desconocido para este proyecto: {mid}"),
                    ))
                }
            }
        }
        None => (None, req.config.unwrap_or_else(|| serde_json::json!({}))),
    };

    // 3) fila queued + arrancar el simulador
    let record = state
        .store
        .create_queued(&project_id, model_id, "training", config.clone());
    state.simulator.start(record.id.clone(), config);

    let job = state.store.get(&record.id).unwrap_or(record);
    Ok(Json(job))
}

async fn list_jobs(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<JobRecord>>, StatusCode> {
    {
        let projects = state.projects.lock().unwrap();
        if !projects.contains_key(&project_id) {
            return Err(StatusCode::NOT_FOUND);
        }
    }

    Ok(Json(state.store.list_for_project(&project_id)))
}

// El endpoint que la UI y el CLI pollean en loop.
async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobRecord>, StatusCode> {
    match state.store.get(&id) {
        Some(job) => Ok(Json(job)),
        None => Err(StatusCode::NOT_FOUND),
    }
}

async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobRecord>, StatusCode> {
    match state.simulator.cancel(&id) {
        Ok(job) => Ok(Json(job)),
        Err(StoreError::NotFound(_)) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!("error cancelando job {}: {}", id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn internal_error(e: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
