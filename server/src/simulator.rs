use common::{JobId, JobRecord, JobStatus, MetricSample};
use rand::Rng;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::registry::JobRegistry;
use crate::store::{JobStore, StoreError};

pub const DEFAULT_EPOCHS: u64 = 5;
pub const DEFAULT_STEPS_PER_EPOCH: u64 = 20;
/// Piso de pasos totales: todo job corre una cantidad acotada pero
/// no trivial de ticks, sin importar la config.
pub const MIN_TOTAL_STEPS: u64 = 20;

/// total_steps = max(epochs * stepsPerEpoch, 20).
/// Campos ausentes o no numéricos caen al default (5 / 20) en vez de fallar.
pub fn total_steps(config: &Value) -> u64 {
    let epochs = config
        .get("epochs")
        .and_then(Value::as_u64)
        .unwrap_or(DEFAULT_EPOCHS);
    let steps_per_epoch = config
        .get("stepsPerEpoch")
        .and_then(Value::as_u64)
        .unwrap_or(DEFAULT_STEPS_PER_EPOCH);

    epochs.saturating_mul(steps_per_epoch).max(MIN_TOTAL_STEPS)
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

/// Una muestra sintética para el paso `step` de `total`:
/// - loss: decaimiento exponencial 1.5·e^(-3t) + ruido uniforme [0, 0.05)
/// - accuracy: 0.5 + 0.5t + ruido uniforme [-0.025, 0.025)
/// Ambas redondeadas a 4 decimales.
fn synth_sample(step: u64, total: u64, started: Instant) -> MetricSample {
    let mut rng = rand::thread_rng();
    let t = step as f64 / total as f64;

    let loss = round4(1.5 * (-3.0 * t).exp() + rng.gen_range(0.0..0.05));
    let accuracy = round4(0.5 + 0.5 * t + rng.gen_range(-0.025..0.025));

    MetricSample {
        step: step as u32,
        loss,
        accuracy,
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}

fn progress_for(step: u64, total: u64) -> u8 {
    let pct = ((step as f64 / total as f64) * 100.0).round() as u64;
    pct.min(100) as u8
}

/// Corre el ciclo de vida completo del entrenamiento falso de cada job:
/// queued → running → ticks → completed | canceled | failed.
/// Un task de tokio + un token de cancelación por job; la cadencia del
/// tick es inyectable para que los tests no esperen 500 ms por paso.
#[derive(Clone)]
pub struct JobSimulator {
    store: Arc<dyn JobStore>,
    registry: Arc<JobRegistry>,
    tick: Duration,
    flush_every: u64,
}

impl JobSimulator {
    pub fn new(store: Arc<dyn JobStore>, tick: Duration, flush_every: u64) -> Self {
        Self {
            store,
            registry: Arc::new(JobRegistry::new()),
            tick,
            flush_every: flush_every.max(1),
        }
    }

    /// Arranca la simulación de un job recién creado. Fire-and-forget:
    /// cualquier error de arranque fuerza `failed`, nunca deja el job
    /// colgado en `queued`.
    pub fn start(&self, job_id: JobId, config: Value) {
        // 1) queued → running, visible antes de que dispare el primer tick
        match self.store.set_running(&job_id) {
            Ok(()) => {}
            Err(StoreError::Terminal(_)) => {
                // lo cancelaron antes de arrancar; no hay nada que simular
                debug!("job {}: ya terminal al arrancar, no se simula", job_id);
                return;
            }
            Err(e) => {
                error!("job {}: no se pudo pasar a running: {}", job_id, e);
                let _ = self.store.set_terminal(
                    &job_id,
                    JobStatus::Failed,
                    0,
                    &[],
                    Some(e.to_string()),
                );
                return;
            }
        }

        // 2) pasos totales a partir de la config (con defaults y piso)
        let total = total_steps(&config);

        // 3) registrar el timer antes de spawnear, así cancel() ya lo ve
        let token = self.registry.insert(&job_id);
        info!(
            "job {} arrancado: total_steps={} tick={:?}",
            job_id, total, self.tick
        );

        let sim = self.clone();
        tokio::spawn(async move {
            sim.run_job(job_id, total, token).await;
        });
    }

    /// Loop de ticks de un job. Entre ticks no se hace ningún trabajo.
    async fn run_job(self, job_id: JobId, total: u64, token: CancellationToken) {
        let started = Instant::now();
        let mut step: u64 = 0;
        let mut buffer: Vec<MetricSample> = Vec::with_capacity(total as usize);

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.tick) => {}
                _ = token.cancelled() => {
                    // quien canceló ya sacó la entrada del registry y
                    // persistió el estado congelado
                    debug!("job {}: timer detenido por cancelación en step {}", job_id, step);
                    return;
                }
            }

            // un tick = un step de entrenamiento simulado
            step += 1;
            buffer.push(synth_sample(step, total, started));
            let progress = progress_for(step, total);
            let is_last = step >= total;

            // cadencia de persistencia: cada `flush_every` ticks,
            // y el tick final siempre (progress=100 nunca se pierde)
            if !is_last && step % self.flush_every != 0 {
                continue;
            }

            let write = if is_last {
                // parar timer + desregistrar + persistir el estado final
                self.registry.remove(&job_id);
                self.store
                    .set_terminal(&job_id, JobStatus::Completed, 100, &buffer, None)
                    .map(|_| ())
            } else {
                self.store.update_progress(&job_id, progress, &buffer)
            };

            match write {
                Ok(()) => {
                    debug!(
                        "job {}: flush step {}/{} (progress={}%)",
                        job_id, step, total, progress
                    );
                }
                Err(StoreError::Terminal(_)) => {
                    // nos cancelaron entre el tick y el flush: el estado
                    // cancelado ya quedó persistido y gana; frenar sin más
                    self.registry.remove(&job_id);
                    return;
                }
                Err(e) => {
                    // no seguimos tickeando contra un estado posiblemente
                    // divergente: este job pasa a failed, el resto no se entera
                    error!("job {}: fallo de persistencia en step {}: {}", job_id, step, e);
                    self.registry.remove(&job_id);
                    let _ = self.store.set_terminal(
                        &job_id,
                        JobStatus::Failed,
                        progress,
                        &buffer,
                        Some(e.to_string()),
                    );
                    return;
                }
            }

            if is_last {
                info!(
                    "job {} completado: {} samples en {:?}",
                    job_id,
                    buffer.len(),
                    started.elapsed()
                );
                return;
            }
        }
    }

    /// Cancela un job. Idempotente: sobre un job ya terminal devuelve su
    /// registro tal como quedó; para ids desconocidos devuelve NotFound.
    /// El job queda congelado en su último estado *persistido* (el tick
    /// en memoria que todavía no se flusheó se descarta).
    pub fn cancel(&self, job_id: &str) -> Result<JobRecord, StoreError> {
        // 1) parar el timer si sigue vivo (no-op si ya terminó o nunca arrancó)
        let had_timer = self.registry.cancel(job_id);

        // 2) persistir canceled preservando progress/metrics ya flusheados
        let current = self
            .store
            .get(job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
        let record = self.store.set_terminal(
            job_id,
            JobStatus::Canceled,
            current.progress,
            &current.metrics,
            None,
        )?;

        if had_timer {
            info!(
                "job {} cancelado en progress={}% ({} samples)",
                job_id,
                record.progress,
                record.metrics.len()
            );
        }
        Ok(record)
    }

    /// ¿Tiene este job un timer vivo? (solo puede ser cierto en `running`)
    pub fn is_live(&self, job_id: &str) -> bool {
        self.registry.contains(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryJobStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Cadencia corta para que los tests no esperen 500 ms por paso.
    const TICK: Duration = Duration::from_millis(2);

    fn simulator(store: Arc<dyn JobStore>) -> JobSimulator {
        JobSimulator::new(store, TICK, 2)
    }

    /// Simulador con un tick enorme: el primer tick nunca llega a disparar
    /// dentro del test.
    fn simulator_sin_ticks(store: Arc<dyn JobStore>) -> JobSimulator {
        JobSimulator::new(store, Duration::from_secs(600), 2)
    }

    async fn wait_terminal(store: &dyn JobStore, id: &str) -> JobRecord {
        for _ in 0..2000 {
            if let Some(job) = store.get(id) {
                if job.status.is_terminal() {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("el job {} nunca llegó a un estado terminal", id);
    }

    /* ============
       total_steps
       ============ */

    #[test]
    fn total_steps_usa_defaults_con_config_vacia() {
        assert_eq!(total_steps(&json!({})), 100);
    }

    #[test]
    fn total_steps_ignora_valores_no_numericos() {
        assert_eq!(total_steps(&json!({"epochs": "tres"})), 100);
        assert_eq!(total_steps(&json!({"epochs": -2, "stepsPerEpoch": null})), 100);
    }

    #[test]
    fn total_steps_aplica_el_piso_de_20() {
        assert_eq!(total_steps(&json!({"epochs": 1, "stepsPerEpoch": 1})), 20);
        assert_eq!(total_steps(&json!({"epochs": 0})), 20);
    }

    #[test]
    fn total_steps_multiplica_epochs_por_steps() {
        assert_eq!(total_steps(&json!({"epochs": 2, "stepsPerEpoch": 30})), 60);
    }

    /* ==================
       ciclo de vida feliz
       ================== */

    #[tokio::test]
    async fn job_default_completa_con_100_samples_y_loss_decreciente() {
        let store = Arc::new(MemoryJobStore::new());
        let sim = simulator(store.clone());

        let job = store.create_queued("p1", None, "training", json!({}));
        sim.start(job.id.clone(), job.config.clone());

        let done = wait_terminal(store.as_ref(), &job.id).await;

        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, 100);
        assert_eq!(done.metrics.len(), 100);

        // steps contiguos 1-based
        for (i, m) in done.metrics.iter().enumerate() {
            assert_eq!(m.step as usize, i + 1);
        }

        // la tendencia de loss es decreciente de punta a punta
        let first = &done.metrics[0];
        let last = &done.metrics[99];
        assert!(last.loss < first.loss);

        // el timer quedó desregistrado
        assert!(!sim.is_live(&job.id));
    }

    #[tokio::test]
    async fn terminal_queda_congelado_en_lecturas_posteriores() {
        let store = Arc::new(MemoryJobStore::new());
        let sim = simulator(store.clone());

        let job = store.create_queued("p1", None, "training", json!({"epochs": 1, "stepsPerEpoch": 1}));
        sim.start(job.id.clone(), job.config.clone());

        let done = wait_terminal(store.as_ref(), &job.id).await;
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.metrics.len(), 20); // piso de 20 steps

        // ninguna lectura posterior ve otra cosa
        tokio::time::sleep(Duration::from_millis(30)).await;
        let again = store.get(&job.id).unwrap();
        assert_eq!(again.status, done.status);
        assert_eq!(again.progress, done.progress);
        assert_eq!(again.metrics.len(), done.metrics.len());
        assert_eq!(again.finished_at, done.finished_at);
    }

    #[tokio::test]
    async fn progress_persistido_es_no_decreciente() {
        let store = Arc::new(MemoryJobStore::new());
        let sim = simulator(store.clone());

        let job = store.create_queued("p1", None, "training", json!({}));
        sim.start(job.id.clone(), job.config.clone());

        let mut observed: Vec<(u8, usize)> = Vec::new();
        loop {
            let j = store.get(&job.id).unwrap();
            observed.push((j.progress, j.metrics.len()));
            if j.status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(3)).await;
        }

        for pair in observed.windows(2) {
            assert!(pair[1].0 >= pair[0].0, "progress retrocedió: {:?}", pair);
            assert!(pair[1].1 >= pair[0].1, "metrics se achicó: {:?}", pair);
        }
    }

    /* ============
       cancelación
       ============ */

    #[tokio::test]
    async fn cancelar_antes_del_primer_tick_congela_en_cero() {
        let store = Arc::new(MemoryJobStore::new());
        let sim = simulator_sin_ticks(store.clone());

        let job = store.create_queued("p1", None, "training", json!({"epochs": 1, "stepsPerEpoch": 1}));
        sim.start(job.id.clone(), job.config.clone());

        let canceled = sim.cancel(&job.id).unwrap();

        assert_eq!(canceled.status, JobStatus::Canceled);
        assert_eq!(canceled.progress, 0);
        assert!(canceled.metrics.is_empty());
        assert!(!sim.is_live(&job.id));
    }

    #[tokio::test]
    async fn cancelar_dos_veces_es_idempotente() {
        let store = Arc::new(MemoryJobStore::new());
        let sim = simulator_sin_ticks(store.clone());

        let job = store.create_queued("p1", None, "training", json!({}));
        sim.start(job.id.clone(), job.config.clone());

        let first = sim.cancel(&job.id).unwrap();
        let second = sim.cancel(&job.id).unwrap();

        assert_eq!(second.status, JobStatus::Canceled);
        assert_eq!(second.progress, first.progress);
        assert_eq!(second.metrics.len(), first.metrics.len());
        assert_eq!(second.finished_at, first.finished_at);
    }

    #[tokio::test]
    async fn cancelar_job_desconocido_devuelve_not_found() {
        let store = Arc::new(MemoryJobStore::new());
        let sim = simulator(store.clone());

        let res = sim.cancel("no-existe");
        assert!(matches!(res, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn cancelar_un_job_completado_devuelve_el_registro_completado() {
        let store = Arc::new(MemoryJobStore::new());
        let sim = simulator(store.clone());

        let job = store.create_queued("p1", None, "training", json!({"epochs": 1, "stepsPerEpoch": 1}));
        sim.start(job.id.clone(), job.config.clone());
        wait_terminal(store.as_ref(), &job.id).await;

        // cancelar después de completar no pisa el estado terminal
        let record = sim.cancel(&job.id).unwrap();
        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.progress, 100);
    }

    /* =====================
       fallos de persistencia
       ===================== */

    /// Store que delega en memoria pero falla update_progress a partir
    /// de la escritura número `fail_after` + 1. Si `fail_job` está seteado,
    /// solo cuenta (y falla) las escrituras de ese job.
    struct FailingStore {
        inner: MemoryJobStore,
        fail_after: u64,
        writes: AtomicU64,
        fail_job: std::sync::Mutex<Option<String>>,
    }

    impl FailingStore {
        fn new(fail_after: u64) -> Self {
            Self {
                inner: MemoryJobStore::new(),
                fail_after,
                writes: AtomicU64::new(0),
                fail_job: std::sync::Mutex::new(None),
            }
        }

        fn fail_only(&self, job_id: &str) {
            *self.fail_job.lock().unwrap() = Some(job_id.to_string());
        }
    }

    impl JobStore for FailingStore {
        fn create_queued(
            &self,
            project_id: &str,
            model_id: Option<String>,
            kind: &str,
            config: Value,
        ) -> JobRecord {
            self.inner.create_queued(project_id, model_id, kind, config)
        }

        fn set_running(&self, id: &str) -> Result<(), StoreError> {
            self.inner.set_running(id)
        }

        fn update_progress(
            &self,
            id: &str,
            progress: u8,
            metrics: &[MetricSample],
        ) -> Result<(), StoreError> {
            let applies = match self.fail_job.lock().unwrap().as_deref() {
                Some(target) => target == id,
                None => true,
            };
            if applies {
                let n = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
                if n > self.fail_after {
                    return Err(StoreError::Persistence("disco lleno".to_string()));
                }
            }
            self.inner.update_progress(id, progress, metrics)
        }

        fn set_terminal(
            &self,
            id: &str,
            status: JobStatus,
            progress: u8,
            metrics: &[MetricSample],
            error: Option<String>,
        ) -> Result<JobRecord, StoreError> {
            self.inner.set_terminal(id, status, progress, metrics, error)
        }

        fn get(&self, id: &str) -> Option<JobRecord> {
            self.inner.get(id)
        }

        fn list_for_project(&self, project_id: &str) -> Vec<JobRecord> {
            self.inner.list_for_project(project_id)
        }
    }

    #[tokio::test]
    async fn fallo_de_persistencia_marca_failed_y_no_hay_tick_siguiente() {
        let store = Arc::new(FailingStore::new(2));
        let sim = simulator(store.clone());

        let job = store.create_queued("p1", None, "training", json!({}));
        sim.start(job.id.clone(), job.config.clone());

        let failed = wait_terminal(store.as_ref() as &dyn JobStore, &job.id).await;

        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("error de persistencia: disco lleno"));
        // dos flushes buenos cada 2 ticks = 4 samples persistidos, más el
        // buffer del flush fallido que viaja en la escritura terminal
        assert!(failed.metrics.len() >= 4);
        assert!(!sim.is_live(&job.id));

        // no hay tick N+1: el registro no se mueve más
        tokio::time::sleep(Duration::from_millis(30)).await;
        let again = store.get(&job.id).unwrap();
        assert_eq!(again.metrics.len(), failed.metrics.len());
        assert_eq!(again.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn un_job_que_falla_no_afecta_a_otro_del_mismo_simulador() {
        let store = Arc::new(FailingStore::new(0));
        let sim = simulator(store.clone());

        let job_malo = store.create_queued("p1", None, "training", json!({}));
        let job_bueno =
            store.create_queued("p1", None, "training", json!({"epochs": 1, "stepsPerEpoch": 1}));
        store.fail_only(&job_malo.id);

        sim.start(job_malo.id.clone(), job_malo.config.clone());
        sim.start(job_bueno.id.clone(), job_bueno.config.clone());

        let malo = wait_terminal(store.as_ref() as &dyn JobStore, &job_malo.id).await;
        let bueno = wait_terminal(store.as_ref() as &dyn JobStore, &job_bueno.id).await;

        assert_eq!(malo.status, JobStatus::Failed);
        assert_eq!(bueno.status, JobStatus::Completed);
        assert!(!sim.is_live(&job_malo.id));
        assert!(!sim.is_live(&job_bueno.id));
    }
}
