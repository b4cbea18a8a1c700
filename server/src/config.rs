use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8080;
/// Cadencia de referencia del simulador: un step cada 500 ms.
pub const DEFAULT_TICK_MS: u64 = 500;
/// Persistimos (progress, metrics) cada 2 ticks (el tick final siempre).
pub const DEFAULT_FLUSH_EVERY: u64 = 2;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Directorio base de datos del server (uploads van adentro).
    pub data_dir: PathBuf,
    /// Directorio con la UI estática (index.html, app.js).
    pub static_dir: PathBuf,
    pub tick: Duration,
    pub flush_every: u64,
}

impl Config {
    /// Lee la config desde variables de entorno, con defaults para correr local:
    /// PORT, DATA_DIR, STATIC_DIR, SIM_TICK_MS, SIM_FLUSH_EVERY.
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        let data_dir = env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());
        let static_dir = env::var("STATIC_DIR").unwrap_or_else(|_| "./static".to_string());

        let tick_ms = env::var("SIM_TICK_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TICK_MS);

        let flush_every = env::var("SIM_FLUSH_EVERY")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|n| *n >= 1)
            .unwrap_or(DEFAULT_FLUSH_EVERY);

        Self {
            port,
            data_dir: PathBuf::from(data_dir),
            static_dir: PathBuf::from(static_dir),
            tick: Duration::from_millis(tick_ms),
            flush_every,
        }
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }
}
