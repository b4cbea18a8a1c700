use common::JobId;
use std::{collections::HashMap, sync::Mutex};
use tokio_util::sync::CancellationToken;

/// Mapa de jobs vivos: job id → token de cancelación de su timer.
/// Es dueño del simulador que lo crea (no un singleton de proceso), así
/// los tests pueden levantar instancias aisladas.
///
/// Invariante: hay entrada si y solo si el job está en `running`; toda
/// transición terminal la saca antes de (o junto con) parar el timer.
#[derive(Default)]
pub struct JobRegistry {
    inner: Mutex<HashMap<JobId, CancellationToken>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra un job recién arrancado y devuelve el token de su timer.
    pub fn insert(&self, id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        let mut inner = self.inner.lock().unwrap();
        inner.insert(id.to_string(), token.clone());
        token
    }

    /// Saca la entrada sin cancelar (terminación natural o fallo:
    /// el propio loop del timer ya está frenando).
    pub fn remove(&self, id: &str) -> Option<CancellationToken> {
        let mut inner = self.inner.lock().unwrap();
        inner.remove(id)
    }

    /// Para el timer y saca la entrada en un solo paso bajo el lock,
    /// así nadie puede observar una entrada hacia un timer ya parado.
    /// Devuelve false si el job no estaba vivo (desconocido o terminal).
    pub fn cancel(&self, id: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.remove(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.contains_key(id)
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
