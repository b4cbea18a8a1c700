use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::ModelId;
use crate::project::ProjectId;

pub type JobId = String;

/* --------- Jobs de entrenamiento simulado --------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl JobStatus {
    /// Terminal = no admite más transiciones ni mutaciones del registro.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Canceled
        )
    }
}

/// Una muestra de métricas por paso de entrenamiento simulado.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Paso 1-based; las muestras van en orden estricto de step.
    pub step: u32,
    pub loss: f64,
    pub accuracy: f64,
    #[serde(rename = "elapsedMs")]
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub project_id: ProjectId,
    /// Config de modelo guardada de la que salió este job (si hubo).
    pub model_id: Option<ModelId>,
    /// Tipo de job; por ahora siempre "training".
    pub kind: String,

    pub status: JobStatus,
    /// Porcentaje 0-100, no decreciente mientras corre.
    pub progress: u8,
    /// Muestras persistidas hasta ahora, append-only.
    pub metrics: Vec<MetricSample>,

    /// Hiperparámetros con los que se lanzó el job (objeto JSON opaco,
    /// de solo lectura una vez creado).
    pub config: Value,
    /// Mensaje de error, solo presente cuando status == failed.
    pub error: Option<String>,

    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Body de POST /api/v1/projects/:id/jobs.
/// O bien referencia una config guardada (model_id), o trae la config inline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub model_id: Option<ModelId>,
    pub config: Option<Value>,
}
