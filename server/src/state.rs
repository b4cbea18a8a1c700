// server/src/state.rs

use common::{DatasetId, DatasetInfo, ModelConfig, ModelId, Project, ProjectId};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crate::config::Config;
use crate::simulator::JobSimulator;
use crate::store::MemoryJobStore;

#[derive(Clone)]
pub struct AppState {
    pub projects: Arc<Mutex<HashMap<ProjectId, Project>>>,
    pub datasets: Arc<Mutex<HashMap<DatasetId, DatasetInfo>>>,
    pub models: Arc<Mutex<HashMap<ModelId, ModelConfig>>>,

    /// Persistencia de jobs; la consumen los handlers y el simulador.
    pub store: Arc<MemoryJobStore>,
    /// El core: ciclo de vida de los entrenamientos simulados.
    pub simulator: JobSimulator,

    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let store = Arc::new(MemoryJobStore::new());
        let simulator = JobSimulator::new(store.clone(), config.tick, config.flush_every);

        Self {
            projects: Arc::new(Mutex::new(HashMap::new())),
            datasets: Arc::new(Mutex::new(HashMap::new())),
            models: Arc::new(Mutex::new(HashMap::new())),
            store,
            simulator,
            config,
        }
    }
}
