use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::project::ProjectId;

pub type ModelId = String;

/* --------- Configs de modelo (hiperparámetros) --------- */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfigRequest {
    pub name: String,
    /// Objeto JSON opaco con los hiperparámetros, ej:
    /// {"epochs": 5, "stepsPerEpoch": 20, "learningRate": 0.001}
    pub hyperparams: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub id: ModelId,
    pub project_id: ProjectId,
    pub name: String,
    pub hyperparams: Value,
    pub created_at: DateTime<Utc>,
}
