use chrono::Utc;
use common::{JobId, JobRecord, JobStatus, MetricSample};
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::Mutex,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job {0} no encontrado")]
    NotFound(JobId),
    /// El job ya está en un estado terminal; la escritura no se aplica.
    #[error("job {0} ya está en estado terminal")]
    Terminal(JobId),
    #[error("error de persistencia: {0}")]
    Persistence(String),
}

/// Contrato de persistencia de jobs que consume el simulador.
/// Es un trait para poder inyectar stores aislados (o con fallos) en tests.
pub trait JobStore: Send + Sync {
    /// Crea la fila en `queued` y devuelve el registro completo.
    fn create_queued(
        &self,
        project_id: &str,
        model_id: Option<String>,
        kind: &str,
        config: Value,
    ) -> JobRecord;

    /// queued → running. Err(Terminal) si el job ya terminó.
    fn set_running(&self, id: &str) -> Result<(), StoreError>;

    /// Escribe (progress, metrics) de un job en curso.
    /// Err(Terminal) si el job ya terminó (la escritura tardía se descarta).
    fn update_progress(
        &self,
        id: &str,
        progress: u8,
        metrics: &[MetricSample],
    ) -> Result<(), StoreError>;

    /// Transición terminal (completed / canceled / failed). Idempotente:
    /// sobre un job ya terminal no muta nada y devuelve el registro actual.
    fn set_terminal(
        &self,
        id: &str,
        status: JobStatus,
        progress: u8,
        metrics: &[MetricSample],
        error: Option<String>,
    ) -> Result<JobRecord, StoreError>;

    fn get(&self, id: &str) -> Option<JobRecord>;

    fn list_for_project(&self, project_id: &str) -> Vec<JobRecord>;
}

/// Store en memoria sobre un HashMap con lock único.
/// El lock serializa todas las escrituras por job, así un flush de tick
/// en vuelo nunca pisa la escritura de una cancelación (ni al revés).
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<JobId, JobRecord>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    fn create_queued(
        &self,
        project_id: &str,
        model_id: Option<String>,
        kind: &str,
        config: Value,
    ) -> JobRecord {
        let record = JobRecord {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            model_id,
            kind: kind.to_string(),
            status: JobStatus::Queued,
            progress: 0,
            metrics: Vec::new(),
            config,
            error: None,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };

        let mut jobs = self.jobs.lock().unwrap();
        jobs.insert(record.id.clone(), record.clone());
        record
    }

    fn set_running(&self, id: &str) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if job.status.is_terminal() {
            return Err(StoreError::Terminal(id.to_string()));
        }

        job.status = JobStatus::Running;
        if job.started_at.is_none() {
            job.started_at = Some(Utc::now());
        }
        Ok(())
    }

    fn update_progress(
        &self,
        id: &str,
        progress: u8,
        metrics: &[MetricSample],
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if job.status.is_terminal() {
            return Err(StoreError::Terminal(id.to_string()));
        }

        // progress no decrece y metrics nunca se achica: un lector no puede
        // ver menos muestras de las que ya vio.
        if progress > job.progress {
            job.progress = progress;
        }
        if metrics.len() >= job.metrics.len() {
            job.metrics = metrics.to_vec();
        }
        Ok(())
    }

    fn set_terminal(
        &self,
        id: &str,
        status: JobStatus,
        progress: u8,
        metrics: &[MetricSample],
        error: Option<String>,
    ) -> Result<JobRecord, StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        // Ya terminal → no-op (esto hace idempotente a cancel).
        if job.status.is_terminal() {
            return Ok(job.clone());
        }

        job.status = status;
        job.progress = job.progress.max(progress);
        if metrics.len() >= job.metrics.len() {
            job.metrics = metrics.to_vec();
        }
        if error.is_some() {
            job.error = error;
        }
        job.finished_at = Some(Utc::now());

        Ok(job.clone())
    }

    fn get(&self, id: &str) -> Option<JobRecord> {
        let jobs = self.jobs.lock().unwrap();
        jobs.get(id).cloned()
    }

    fn list_for_project(&self, project_id: &str) -> Vec<JobRecord> {
        let jobs = self.jobs.lock().unwrap();
        let mut out: Vec<JobRecord> = jobs
            .values()
            .filter(|j| j.project_id == project_id)
            .cloned()
            .collect();
        // más recientes primero, para la tabla de la UI
        out.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        out
    }
}
