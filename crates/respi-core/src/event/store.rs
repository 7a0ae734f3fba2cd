use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use indexmap::IndexSet;
use log::warn;
use uuid::Uuid;

use super::{BatchEvent, BatchEventKind};
use crate::errors::EventStoreError;

/// Almacenamiento de eventos append-only.
pub trait EventStore: Send {
    /// Agrega un evento a partir de su kind y devuelve el evento completo
    /// (con seq y ts).
    fn append_kind(&mut self, batch_id: Uuid, kind: BatchEventKind) -> Result<BatchEvent, EventStoreError>;
    /// Eventos de un batch (orden ascendente por seq).
    fn list(&self, batch_id: Uuid) -> Result<Vec<BatchEvent>, EventStoreError>;
    /// Batches conocidos, en orden de aparición.
    fn batch_ids(&self) -> Result<Vec<Uuid>, EventStoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: HashMap<Uuid, Vec<BatchEvent>>,
    order: Vec<Uuid>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventStore for InMemoryEventStore {
    fn append_kind(&mut self, batch_id: Uuid, kind: BatchEventKind) -> Result<BatchEvent, EventStoreError> {
        if !self.inner.contains_key(&batch_id) {
            self.order.push(batch_id);
        }
        let events = self.inner.entry(batch_id).or_default();
        let ev = BatchEvent { seq: events.len() as u64,
                              batch_id,
                              kind,
                              ts: Utc::now() };
        events.push(ev.clone());
        Ok(ev)
    }

    fn list(&self, batch_id: Uuid) -> Result<Vec<BatchEvent>, EventStoreError> {
        Ok(self.inner.get(&batch_id).cloned().unwrap_or_default())
    }

    fn batch_ids(&self) -> Result<Vec<Uuid>, EventStoreError> {
        Ok(self.order.clone())
    }
}

/// Log en disco: un `BatchEvent` JSON por línea.
///
/// Una última línea incompleta (crash a mitad de append) se ignora con un
/// warning; una línea ilegible en medio del archivo es `Malformed`.
#[derive(Debug)]
pub struct JsonlEventStore {
    path: PathBuf,
    next_seq: HashMap<Uuid, u64>,
}

fn io_err(path: &Path, e: std::io::Error) -> EventStoreError {
    EventStoreError::Io { path: path.display().to_string(),
                          message: e.to_string() }
}

impl JsonlEventStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, EventStoreError> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
        let mut store = Self { path,
                               next_seq: HashMap::new() };
        for ev in store.read_all()? {
            store.next_seq.insert(ev.batch_id, ev.seq + 1);
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Vec<BatchEvent>, EventStoreError> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&self.path, e)),
        };
        let lines: Vec<String> = BufReader::new(file).lines()
                                                      .collect::<Result<_, _>>()
                                                      .map_err(|e| io_err(&self.path, e))?;
        let mut events = Vec::with_capacity(lines.len());
        let last = lines.len().saturating_sub(1);
        for (idx, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<BatchEvent>(line) {
                Ok(ev) => events.push(ev),
                Err(e) if idx == last => {
                    warn!("ignoring truncated trailing event in {}: {e}", self.path.display());
                }
                Err(e) => {
                    return Err(EventStoreError::Malformed { line: idx + 1,
                                                            message: e.to_string() })
                }
            }
        }
        Ok(events)
    }
}

impl EventStore for JsonlEventStore {
    fn append_kind(&mut self, batch_id: Uuid, kind: BatchEventKind) -> Result<BatchEvent, EventStoreError> {
        let seq = self.next_seq.get(&batch_id).copied().unwrap_or(0);
        let ev = BatchEvent { seq,
                              batch_id,
                              kind,
                              ts: Utc::now() };
        let mut line = serde_json::to_string(&ev)?;
        line.push('\n');
        let mut file = OpenOptions::new().create(true)
                                         .append(true)
                                         .open(&self.path)
                                         .map_err(|e| io_err(&self.path, e))?;
        file.write_all(line.as_bytes()).map_err(|e| io_err(&self.path, e))?;
        file.flush().map_err(|e| io_err(&self.path, e))?;
        self.next_seq.insert(batch_id, seq + 1);
        Ok(ev)
    }

    fn list(&self, batch_id: Uuid) -> Result<Vec<BatchEvent>, EventStoreError> {
        Ok(self.read_all()?.into_iter().filter(|e| e.batch_id == batch_id).collect())
    }

    fn batch_ids(&self) -> Result<Vec<Uuid>, EventStoreError> {
        let ids: IndexSet<Uuid> = self.read_all()?.into_iter().map(|e| e.batch_id).collect();
        Ok(ids.into_iter().collect())
    }
}
