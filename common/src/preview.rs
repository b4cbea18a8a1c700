use serde_json::Value;
use std::{
    fs::File,
    io::{self, BufReader},
    path::Path,
};

use crate::dataset::DatasetPreview;

pub const DEFAULT_PREVIEW_ROWS: usize = 20;
pub const MAX_PREVIEW_ROWS: usize = 200;

/// Arma el preview de un dataset según su extensión:
/// - ".json" → array JSON de objetos
/// - cualquier otra cosa → CSV con header
/// `max_rows` se acota a [1, MAX_PREVIEW_ROWS].
pub fn preview_file(path: &str, max_rows: usize) -> io::Result<DatasetPreview> {
    let max_rows = max_rows.clamp(1, MAX_PREVIEW_ROWS);

    let is_json = Path::new(path)
        .extension()
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if is_json {
        preview_json(path, max_rows)
    } else {
        preview_csv(path, max_rows)
    }
}

/// Lee el header y las primeras `max_rows` filas de un CSV.
pub fn preview_csv(path: &str, max_rows: usize) -> io::Result<DatasetPreview> {
    let file = File::open(path)?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| invalid_data(format!("error al leer header CSV de {}: {e}", path)))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for result in reader.records().take(max_rows) {
        let record =
            result.map_err(|e| invalid_data(format!("error al parsear CSV {}: {e}", path)))?;
        rows.push(
            record
                .iter()
                .map(|field| Value::String(field.to_string()))
                .collect(),
        );
    }

    Ok(DatasetPreview { columns, rows })
}

/// Lee un array JSON de objetos y devuelve las primeras `max_rows` filas.
/// Las columnas salen de las claves del primer objeto; los objetos
/// siguientes se proyectan sobre esas columnas (faltantes → null).
pub fn preview_json(path: &str, max_rows: usize) -> io::Result<DatasetPreview> {
    let file = File::open(path)?;
    let value: Value = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| invalid_data(format!("error al parsear JSON {}: {e}", path)))?;

    let items = value
        .as_array()
        .ok_or_else(|| invalid_data(format!("{}: se esperaba un array JSON de objetos", path)))?;

    let columns: Vec<String> = match items.first().and_then(Value::as_object) {
        Some(obj) => obj.keys().cloned().collect(),
        None => Vec::new(),
    };

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for item in items.iter().take(max_rows) {
        let obj = item
            .as_object()
            .ok_or_else(|| invalid_data(format!("{}: elemento del array no es un objeto", path)))?;
        rows.push(
            columns
                .iter()
                .map(|c| obj.get(c).cloned().unwrap_or(Value::Null))
                .collect(),
        );
    }

    Ok(DatasetPreview { columns, rows })
}

fn invalid_data(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}
