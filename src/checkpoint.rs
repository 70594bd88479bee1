use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::WorkflowState;

/// A point-in-time snapshot of a workflow run, durable enough to survive
/// a process restart — the optional persistence layer SPEC_FULL §6/§10
/// calls out as "if persistence is desired" on top of the in-memory
/// `WorkflowStateStore`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowCheckpoint {
    pub checkpoint_id: String,
    pub run_id:        String,
    pub state:         WorkflowState,
    pub timestamp:     chrono::DateTime<chrono::Utc>,
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, checkpoint: WorkflowCheckpoint) -> Result<(), String>;
    async fn load_latest(&self, run_id: &str) -> Result<Option<WorkflowCheckpoint>, String>;
    async fn load_by_id(&self, checkpoint_id: &str) -> Result<Option<WorkflowCheckpoint>, String>;
    async fn list_runs(&self) -> Result<Vec<String>, String>;
}

/// A simple in-memory store for tests and short-lived sessions.
pub struct MemoryCheckpointStore {
    checkpoints: std::sync::Mutex<HashMap<String, Vec<WorkflowCheckpoint>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self { checkpoints: std::sync::Mutex::new(HashMap::new()) }
    }
}

impl Default for MemoryCheckpointStore {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, checkpoint: WorkflowCheckpoint) -> Result<(), String> {
        self.checkpoints.lock().unwrap()
            .entry(checkpoint.run_id.clone())
            .or_default()
            .push(checkpoint);
        Ok(())
    }

    async fn load_latest(&self, run_id: &str) -> Result<Option<WorkflowCheckpoint>, String> {
        Ok(self.checkpoints.lock().unwrap().get(run_id).and_then(|v| v.last().cloned()))
    }

    async fn load_by_id(&self, checkpoint_id: &str) -> Result<Option<WorkflowCheckpoint>, String> {
        let store = self.checkpoints.lock().unwrap();
        for run_checkpoints in store.values() {
            if let Some(cp) = run_checkpoints.iter().find(|c| c.checkpoint_id == checkpoint_id) {
                return Ok(Some(cp.clone()));
            }
        }
        Ok(None)
    }

    async fn list_runs(&self) -> Result<Vec<String>, String> {
        Ok(self.checkpoints.lock().unwrap().keys().cloned().collect())
    }
}

/// A checkpoint store that saves each run to a separate JSON file.
pub struct FileCheckpointStore {
    base_path: std::path::PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        let path = path.into();
        let _ = std::fs::create_dir_all(&path);
        Self { base_path: path }
    }

    fn run_path(&self, run_id: &str) -> std::path::PathBuf {
        self.base_path.join(format!("{}.json", run_id))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, checkpoint: WorkflowCheckpoint) -> Result<(), String> {
        let path = self.run_path(&checkpoint.run_id);
        let mut checkpoints: Vec<WorkflowCheckpoint> = if path.exists() {
            let data = std::fs::read_to_string(&path).map_err(|e| e.to_string())?;
            serde_json::from_str(&data).map_err(|e| e.to_string())?
        } else {
            Vec::new()
        };
        checkpoints.push(checkpoint);
        let data = serde_json::to_string_pretty(&checkpoints).map_err(|e| e.to_string())?;
        std::fs::write(&path, data).map_err(|e| e.to_string())?;
        Ok(())
    }

    async fn load_latest(&self, run_id: &str) -> Result<Option<WorkflowCheckpoint>, String> {
        let path = self.run_path(run_id);
        if !path.exists() { return Ok(None); }
        let data = std::fs::read_to_string(&path).map_err(|e| e.to_string())?;
        let checkpoints: Vec<WorkflowCheckpoint> = serde_json::from_str(&data).map_err(|e| e.to_string())?;
        Ok(checkpoints.last().cloned())
    }

    async fn load_by_id(&self, checkpoint_id: &str) -> Result<Option<WorkflowCheckpoint>, String> {
        for entry in std::fs::read_dir(&self.base_path).map_err(|e| e.to_string())? {
            let entry = entry.map_err(|e| e.to_string())?;
            let data = std::fs::read_to_string(entry.path()).map_err(|e| e.to_string())?;
            let checkpoints: Vec<WorkflowCheckpoint> = serde_json::from_str(&data).map_err(|e| e.to_string())?;
            if let Some(cp) = checkpoints.iter().find(|c| c.checkpoint_id == checkpoint_id) {
                return Ok(Some(cp.clone()));
            }
        }
        Ok(None)
    }

    async fn list_runs(&self) -> Result<Vec<String>, String> {
        let mut runs = Vec::new();
        for entry in std::fs::read_dir(&self.base_path).map_err(|e| e.to_string())? {
            let entry = entry.map_err(|e| e.to_string())?;
            if let Some(stem) = entry.path().file_stem() {
                runs.push(stem.to_string_lossy().to_string());
            }
        }
        Ok(runs)
    }
}

/// A checkpoint store backed by SQLite.
pub struct SqliteCheckpointStore {
    path: std::path::PathBuf,
}

impl SqliteCheckpointStore {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Result<Self, String> {
        let path = path.into();
        let conn = rusqlite::Connection::open(&path).map_err(|e| e.to_string())?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                checkpoint_id TEXT PRIMARY KEY,
                run_id        TEXT NOT NULL,
                state         TEXT NOT NULL,
                timestamp     TEXT NOT NULL
            )",
            [],
        ).map_err(|e| e.to_string())?;
        Ok(Self { path })
    }

    fn get_conn(&self) -> Result<rusqlite::Connection, String> {
        rusqlite::Connection::open(&self.path).map_err(|e| e.to_string())
    }

    fn row_to_checkpoint(row: &rusqlite::Row) -> rusqlite::Result<(String, String, String, String)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
    }

    fn decode(checkpoint_id: String, run_id: String, state_json: String, timestamp_str: String) -> Result<WorkflowCheckpoint, String> {
        Ok(WorkflowCheckpoint {
            checkpoint_id,
            run_id,
            state: serde_json::from_str(&state_json).map_err(|e| e.to_string())?,
            timestamp: chrono::DateTime::parse_from_rfc3339(&timestamp_str)
                .map_err(|e| e.to_string())?.with_timezone(&chrono::Utc),
        })
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn save(&self, checkpoint: WorkflowCheckpoint) -> Result<(), String> {
        let conn = self.get_conn()?;
        let state_json = serde_json::to_string(&checkpoint.state).map_err(|e| e.to_string())?;

        conn.execute(
            "INSERT INTO checkpoints (checkpoint_id, run_id, state, timestamp) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                checkpoint.checkpoint_id,
                checkpoint.run_id,
                state_json,
                checkpoint.timestamp.to_rfc3339(),
            ],
        ).map_err(|e| e.to_string())?;
        Ok(())
    }

    async fn load_latest(&self, run_id: &str) -> Result<Option<WorkflowCheckpoint>, String> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT checkpoint_id, run_id, state, timestamp FROM checkpoints WHERE run_id = ?1 ORDER BY timestamp DESC LIMIT 1"
        ).map_err(|e| e.to_string())?;

        let mut rows = stmt.query(rusqlite::params![run_id]).map_err(|e| e.to_string())?;
        if let Some(row) = rows.next().map_err(|e| e.to_string())? {
            let (checkpoint_id, run_id, state_json, timestamp_str) = Self::row_to_checkpoint(row).map_err(|e| e.to_string())?;
            Ok(Some(Self::decode(checkpoint_id, run_id, state_json, timestamp_str)?))
        } else {
            Ok(None)
        }
    }

    async fn load_by_id(&self, checkpoint_id: &str) -> Result<Option<WorkflowCheckpoint>, String> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT checkpoint_id, run_id, state, timestamp FROM checkpoints WHERE checkpoint_id = ?1"
        ).map_err(|e| e.to_string())?;

        let mut rows = stmt.query(rusqlite::params![checkpoint_id]).map_err(|e| e.to_string())?;
        if let Some(row) = rows.next().map_err(|e| e.to_string())? {
            let (checkpoint_id, run_id, state_json, timestamp_str) = Self::row_to_checkpoint(row).map_err(|e| e.to_string())?;
            Ok(Some(Self::decode(checkpoint_id, run_id, state_json, timestamp_str)?))
        } else {
            Ok(None)
        }
    }

    async fn list_runs(&self) -> Result<Vec<String>, String> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT DISTINCT run_id FROM checkpoints").map_err(|e| e.to_string())?;
        let rows = stmt.query_map([], |row| row.get(0)).map_err(|e| e.to_string())?;
        let mut runs = Vec::new();
        for run in rows {
            runs.push(run.map_err(|e| e.to_string())?);
        }
        Ok(runs)
    }
}
