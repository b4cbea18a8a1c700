use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::project::ProjectId;

pub type DatasetId = String;

/* --------- Datasets subidos a un proyecto --------- */

/// Metadata de un archivo subido; los bytes viven en disco bajo el
/// directorio de datos del server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub id: DatasetId,
    pub project_id: ProjectId,

    /// Nombre original del archivo subido, ej: "ventas_2024.csv"
    pub filename: String,
    /// Ruta donde quedó guardado, ej: "./data/uploads/<project_id>/<id>_ventas_2024.csv"
    pub stored_path: String,

    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// Primeras N filas de un dataset, para mostrar en la UI antes de entrenar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetPreview {
    /// Nombres de columnas (header del CSV o claves del primer objeto JSON).
    pub columns: Vec<String>,
    /// Filas alineadas con `columns`.
    pub rows: Vec<Vec<Value>>,
}
