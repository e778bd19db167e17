//! SQLite-backed trace storage.

use crate::records::{CheckpointListing, CheckpointRecord, ReplayRecord};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, ToSql};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracelens_core::{
    Agent, AgentMessage, AnnotationSource, CoreError, FailureAnnotation, Span, TraceRecord,
};
use tracing::{debug, warn};

/// Errors from trace store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Lock error")]
    Lock,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// SQLite-backed storage for traces and everything derived from them.
pub struct TraceStore {
    conn: Mutex<Connection>,
}

const SPAN_COLUMNS: &str = "span_id, trace_id, parent_span_id, agent_id, name, kind, \
     start_time, end_time, status, model, input_tokens, output_tokens, cost_usd, \
     input, output, error, attributes";

const AGENT_COLUMNS: &str = "agent_id, trace_id, name, role, model, framework, config, \
     span_count, total_tokens, total_cost_usd, error_count";

const CHECKPOINT_COLUMNS: &str = "checkpoint_id, trace_id, span_id, agent_id, name, state, \
     state_hash, timestamp, replay_count, last_replayed";

const REPLAY_COLUMNS: &str = "replay_id, checkpoint_id, trace_id, config, original_output, \
     replay_output, diff, success, error, duration_ms, tokens_used, cost_usd, created_at";

impl TraceStore {
    /// Opens (or creates) a trace store at the given database path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;
        Ok(store)
    }

    /// Creates an in-memory trace store (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Lock)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS traces (
                trace_id TEXT PRIMARY KEY,
                name TEXT,
                start_time INTEGER NOT NULL,
                end_time INTEGER,
                status TEXT NOT NULL,
                metadata TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS agents (
                agent_id TEXT PRIMARY KEY,
                trace_id TEXT NOT NULL,
                name TEXT NOT NULL,
                role TEXT,
                model TEXT,
                framework TEXT,
                config TEXT NOT NULL,
                span_count INTEGER NOT NULL,
                total_tokens INTEGER NOT NULL,
                total_cost_usd REAL NOT NULL,
                error_count INTEGER NOT NULL,
                UNIQUE (trace_id, name)
            );

            CREATE TABLE IF NOT EXISTS spans (
                span_id TEXT PRIMARY KEY,
                trace_id TEXT NOT NULL,
                parent_span_id TEXT,
                agent_id TEXT,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                start_time INTEGER NOT NULL,
                end_time INTEGER,
                status TEXT NOT NULL,
                model TEXT,
                input_tokens INTEGER NOT NULL,
                output_tokens INTEGER NOT NULL,
                cost_usd REAL NOT NULL,
                input TEXT,
                output TEXT,
                error TEXT,
                attributes TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS agent_messages (
                message_id TEXT PRIMARY KEY,
                trace_id TEXT NOT NULL,
                span_id TEXT,
                from_agent_id TEXT NOT NULL,
                to_agent_id TEXT NOT NULL,
                message_type TEXT NOT NULL,
                content TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS failure_annotations (
                annotation_id TEXT PRIMARY KEY,
                trace_id TEXT NOT NULL,
                span_id TEXT,
                agent_id TEXT,
                category TEXT NOT NULL,
                failure_mode TEXT NOT NULL,
                confidence REAL NOT NULL,
                reasoning TEXT NOT NULL,
                source TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS checkpoints (
                checkpoint_id TEXT PRIMARY KEY,
                trace_id TEXT NOT NULL,
                span_id TEXT NOT NULL,
                agent_id TEXT,
                name TEXT NOT NULL,
                state TEXT NOT NULL,
                state_hash TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                replay_count INTEGER NOT NULL DEFAULT 0,
                last_replayed INTEGER
            );

            CREATE TABLE IF NOT EXISTS replays (
                replay_id TEXT PRIMARY KEY,
                checkpoint_id TEXT NOT NULL,
                trace_id TEXT NOT NULL,
                config TEXT NOT NULL,
                original_output TEXT,
                replay_output TEXT,
                diff TEXT,
                success INTEGER NOT NULL,
                error TEXT,
                duration_ms INTEGER NOT NULL,
                tokens_used INTEGER,
                cost_usd REAL,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_traces_status ON traces(status);
            CREATE INDEX IF NOT EXISTS idx_agents_trace ON agents(trace_id);
            CREATE INDEX IF NOT EXISTS idx_spans_trace ON spans(trace_id, start_time);
            CREATE INDEX IF NOT EXISTS idx_spans_agent ON spans(agent_id);
            CREATE INDEX IF NOT EXISTS idx_messages_trace ON agent_messages(trace_id);
            CREATE INDEX IF NOT EXISTS idx_annotations_trace ON failure_annotations(trace_id);
            CREATE INDEX IF NOT EXISTS idx_checkpoints_trace ON checkpoints(trace_id);
            CREATE INDEX IF NOT EXISTS idx_replays_trace ON replays(trace_id);
            CREATE INDEX IF NOT EXISTS idx_replays_checkpoint ON replays(checkpoint_id);
            "#,
        )?;

        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Ingestion-side writes
    // ─────────────────────────────────────────────────────────────────────

    /// Inserts a trace record.
    pub fn insert_trace(&self, trace: &TraceRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;

        conn.execute(
            r#"INSERT INTO traces (trace_id, name, start_time, end_time, status, metadata)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            params![
                trace.trace_id,
                trace.name,
                trace.start_time,
                trace.end_time,
                trace.status.as_str(),
                serde_json::to_string(&trace.metadata)?,
            ],
        )?;

        Ok(())
    }

    /// Inserts an agent record.
    pub fn insert_agent(&self, agent: &Agent) -> Result<(), StoreError> {
        let conn = self.lock()?;

        conn.execute(
            &format!(
                "INSERT INTO agents ({AGENT_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            params![
                agent.agent_id,
                agent.trace_id,
                agent.name,
                agent.role,
                agent.model,
                agent.framework,
                serde_json::to_string(&agent.config)?,
                agent.span_count,
                agent.total_tokens,
                agent.total_cost_usd,
                agent.error_count,
            ],
        )?;

        Ok(())
    }

    /// Inserts a span record.
    pub fn insert_span(&self, span: &Span) -> Result<(), StoreError> {
        let conn = self.lock()?;

        conn.execute(
            &format!(
                "INSERT INTO spans ({SPAN_COLUMNS}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
            ),
            params![
                span.span_id,
                span.trace_id,
                span.parent_span_id,
                span.agent_id,
                span.name,
                span.kind.as_str(),
                span.start_time,
                span.end_time,
                span.status.as_str(),
                span.model,
                span.input_tokens,
                span.output_tokens,
                span.cost_usd,
                opt_json(&span.input)?,
                opt_json(&span.output)?,
                opt_json(&span.error)?,
                serde_json::to_string(&span.attributes)?,
            ],
        )?;

        Ok(())
    }

    /// Inserts an inter-agent message.
    pub fn insert_message(&self, message: &AgentMessage) -> Result<(), StoreError> {
        let conn = self.lock()?;

        conn.execute(
            r#"INSERT INTO agent_messages
               (message_id, trace_id, span_id, from_agent_id, to_agent_id,
                message_type, content, timestamp)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                message.message_id,
                message.trace_id,
                message.span_id,
                message.from_agent_id,
                message.to_agent_id,
                message.message_type.as_str(),
                serde_json::to_string(&message.content)?,
                message.timestamp,
            ],
        )?;

        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Trace reads
    // ─────────────────────────────────────────────────────────────────────

    /// Retrieves a trace by ID.
    pub fn get_trace(&self, trace_id: &str) -> Result<Option<TraceRecord>, StoreError> {
        let conn = self.lock()?;

        let trace = conn
            .query_row(
                r#"SELECT trace_id, name, start_time, end_time, status, metadata
                   FROM traces WHERE trace_id = ?1"#,
                params![trace_id],
                |row| {
                    Ok(TraceRecord {
                        trace_id: row.get(0)?,
                        name: row.get(1)?,
                        start_time: row.get(2)?,
                        end_time: row.get(3)?,
                        status: enum_column(row, 4)?,
                        metadata: json_column(row, 5)?,
                    })
                },
            )
            .optional()?;

        Ok(trace)
    }

    /// Failed traces that carry no annotations yet, newest first.
    pub fn unclassified_failed_traces(&self, limit: u32) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"SELECT t.trace_id FROM traces t
               WHERE t.status = 'failed'
               AND NOT EXISTS (
                   SELECT 1 FROM failure_annotations fa WHERE fa.trace_id = t.trace_id
               )
               ORDER BY t.start_time DESC
               LIMIT ?1"#,
        )?;

        let rows = stmt.query_map(params![limit], |row| row.get(0))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }

        Ok(ids)
    }

    /// Gets all agents of a trace, ordered by name.
    pub fn get_agents(&self, trace_id: &str) -> Result<Vec<Agent>, StoreError> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {AGENT_COLUMNS} FROM agents WHERE trace_id = ?1 ORDER BY name"
        ))?;
        let rows = stmt.query_map(params![trace_id], agent_from_row)?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Gets a single agent by ID.
    pub fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>, StoreError> {
        let conn = self.lock()?;

        let agent = conn
            .query_row(
                &format!("SELECT {AGENT_COLUMNS} FROM agents WHERE agent_id = ?1"),
                params![agent_id],
                agent_from_row,
            )
            .optional()?;

        Ok(agent)
    }

    /// Gets all spans for a trace in chronological order.
    pub fn get_spans(&self, trace_id: &str) -> Result<Vec<Span>, StoreError> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {SPAN_COLUMNS} FROM spans WHERE trace_id = ?1 ORDER BY start_time, span_id"
        ))?;
        let rows = stmt.query_map(params![trace_id], span_from_row)?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Gets a single span by ID.
    pub fn get_span(&self, span_id: &str) -> Result<Option<Span>, StoreError> {
        let conn = self.lock()?;

        let span = conn
            .query_row(
                &format!("SELECT {SPAN_COLUMNS} FROM spans WHERE span_id = ?1"),
                params![span_id],
                span_from_row,
            )
            .optional()?;

        Ok(span)
    }

    /// Gets all messages for a trace in chronological order.
    pub fn get_messages(&self, trace_id: &str) -> Result<Vec<AgentMessage>, StoreError> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"SELECT message_id, trace_id, span_id, from_agent_id, to_agent_id,
               message_type, content, timestamp
               FROM agent_messages WHERE trace_id = ?1 ORDER BY timestamp, message_id"#,
        )?;

        let rows = stmt.query_map(params![trace_id], |row| {
            Ok(AgentMessage {
                message_id: row.get(0)?,
                trace_id: row.get(1)?,
                span_id: row.get(2)?,
                from_agent_id: row.get(3)?,
                to_agent_id: row.get(4)?,
                message_type: enum_column(row, 5)?,
                content: json_column(row, 6)?,
                timestamp: row.get(7)?,
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Failure annotations
    // ─────────────────────────────────────────────────────────────────────

    /// Replaces every automatic annotation of a trace in one transaction.
    ///
    /// Manual annotations are left untouched. Annotations passed in with a
    /// non-automatic source are skipped.
    pub fn replace_auto_annotations(
        &self,
        trace_id: &str,
        annotations: &[FailureAnnotation],
    ) -> Result<usize, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let removed = tx.execute(
            "DELETE FROM failure_annotations WHERE trace_id = ?1 AND source = 'auto'",
            params![trace_id],
        )?;

        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                r#"INSERT INTO failure_annotations
                   (annotation_id, trace_id, span_id, agent_id, category, failure_mode,
                    confidence, reasoning, source)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
            )?;

            for annotation in annotations {
                if annotation.source != AnnotationSource::Auto || annotation.trace_id != trace_id {
                    warn!(
                        annotation_id = %annotation.annotation_id,
                        "Skipping annotation that is not an automatic one for this trace"
                    );
                    continue;
                }
                stmt.execute(params_from_iter(annotation_params(annotation)))?;
                written += 1;
            }
        }

        tx.commit()?;
        debug!(trace_id, removed, written, "Replaced automatic annotations");

        Ok(written)
    }

    /// Inserts a single annotation (used for manual annotations).
    pub fn insert_annotation(&self, annotation: &FailureAnnotation) -> Result<(), StoreError> {
        let conn = self.lock()?;

        conn.execute(
            r#"INSERT INTO failure_annotations
               (annotation_id, trace_id, span_id, agent_id, category, failure_mode,
                confidence, reasoning, source)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
            params_from_iter(annotation_params(annotation)),
        )?;

        Ok(())
    }

    /// Gets all annotations of a trace, highest confidence first.
    pub fn get_annotations(&self, trace_id: &str) -> Result<Vec<FailureAnnotation>, StoreError> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"SELECT annotation_id, trace_id, span_id, agent_id, category, failure_mode,
               confidence, reasoning, source
               FROM failure_annotations WHERE trace_id = ?1
               ORDER BY confidence DESC, rowid"#,
        )?;

        let rows = stmt.query_map(params![trace_id], |row| {
            Ok(FailureAnnotation {
                annotation_id: row.get(0)?,
                trace_id: row.get(1)?,
                span_id: row.get(2)?,
                agent_id: row.get(3)?,
                category: enum_column(row, 4)?,
                failure_mode: enum_column(row, 5)?,
                confidence: row.get(6)?,
                reasoning: row.get(7)?,
                source: enum_column(row, 8)?,
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Checkpoints
    // ─────────────────────────────────────────────────────────────────────

    /// Inserts a checkpoint unless one with the same id already exists.
    ///
    /// Returns `true` when a row was written.
    pub fn insert_checkpoint(&self, checkpoint: &CheckpointRecord) -> Result<bool, StoreError> {
        let conn = self.lock()?;

        let changed = conn.execute(
            &format!(
                "INSERT OR IGNORE INTO checkpoints ({CHECKPOINT_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                checkpoint.checkpoint_id,
                checkpoint.trace_id,
                checkpoint.span_id,
                checkpoint.agent_id,
                checkpoint.name,
                serde_json::to_string(&checkpoint.state)?,
                checkpoint.state_hash,
                checkpoint.timestamp,
                checkpoint.replay_count,
                checkpoint.last_replayed,
            ],
        )?;

        Ok(changed == 1)
    }

    /// Retrieves a checkpoint by ID.
    pub fn get_checkpoint(&self, checkpoint_id: &str) -> Result<Option<CheckpointRecord>, StoreError> {
        let conn = self.lock()?;

        let checkpoint = conn
            .query_row(
                &format!("SELECT {CHECKPOINT_COLUMNS} FROM checkpoints WHERE checkpoint_id = ?1"),
                params![checkpoint_id],
                |row| {
                    Ok(CheckpointRecord {
                        checkpoint_id: row.get(0)?,
                        trace_id: row.get(1)?,
                        span_id: row.get(2)?,
                        agent_id: row.get(3)?,
                        name: row.get(4)?,
                        state: json_column(row, 5)?,
                        state_hash: row.get(6)?,
                        timestamp: row.get(7)?,
                        replay_count: row.get(8)?,
                        last_replayed: row.get(9)?,
                    })
                },
            )
            .optional()?;

        Ok(checkpoint)
    }

    /// Lists checkpoints of a trace joined with agent and span names.
    pub fn list_checkpoints(&self, trace_id: &str) -> Result<Vec<CheckpointListing>, StoreError> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"SELECT c.checkpoint_id, c.name, c.timestamp, c.span_id, c.agent_id,
               a.name, s.name, s.kind, c.replay_count
               FROM checkpoints c
               LEFT JOIN agents a ON c.agent_id = a.agent_id
               LEFT JOIN spans s ON c.span_id = s.span_id
               WHERE c.trace_id = ?1
               ORDER BY c.timestamp, s.start_time, c.checkpoint_id"#,
        )?;

        let rows = stmt.query_map(params![trace_id], |row| {
            Ok(CheckpointListing {
                checkpoint_id: row.get(0)?,
                name: row.get(1)?,
                timestamp: row.get(2)?,
                span_id: row.get(3)?,
                agent_id: row.get(4)?,
                agent_name: row.get(5)?,
                span_name: row.get(6)?,
                span_kind: row.get(7)?,
                replay_count: row.get(8)?,
            })
        })?;

        let mut listings = Vec::new();
        for row in rows {
            listings.push(row?);
        }

        Ok(listings)
    }

    /// Deletes a checkpoint. Returns `false` if it did not exist.
    pub fn delete_checkpoint(&self, checkpoint_id: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "DELETE FROM checkpoints WHERE checkpoint_id = ?1",
            params![checkpoint_id],
        )?;
        Ok(changed > 0)
    }

    /// Bumps the replay counter and last-replayed time of a checkpoint.
    pub fn record_checkpoint_replay(&self, checkpoint_id: &str, at: i64) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            r#"UPDATE checkpoints
               SET replay_count = replay_count + 1, last_replayed = ?2
               WHERE checkpoint_id = ?1"#,
            params![checkpoint_id, at],
        )?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Replay history
    // ─────────────────────────────────────────────────────────────────────

    /// Appends a replay attempt to history.
    pub fn insert_replay(&self, replay: &ReplayRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;

        conn.execute(
            &format!(
                "INSERT INTO replays ({REPLAY_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
            ),
            params![
                replay.replay_id,
                replay.checkpoint_id,
                replay.trace_id,
                serde_json::to_string(&replay.config)?,
                opt_json(&replay.original_output)?,
                opt_json(&replay.replay_output)?,
                opt_json(&replay.diff)?,
                replay.success,
                replay.error,
                replay.duration_ms,
                replay.tokens_used,
                replay.cost_usd,
                replay.created_at,
            ],
        )?;

        Ok(())
    }

    /// Retrieves a replay by ID.
    pub fn get_replay(&self, replay_id: &str) -> Result<Option<ReplayRecord>, StoreError> {
        let conn = self.lock()?;

        let replay = conn
            .query_row(
                &format!("SELECT {REPLAY_COLUMNS} FROM replays WHERE replay_id = ?1"),
                params![replay_id],
                replay_from_row,
            )
            .optional()?;

        Ok(replay)
    }

    /// Lists replays of a trace, newest first.
    pub fn list_replays_for_trace(&self, trace_id: &str) -> Result<Vec<ReplayRecord>, StoreError> {
        self.list_replays("trace_id", trace_id)
    }

    /// Lists replays of a checkpoint, newest first.
    pub fn list_replays_for_checkpoint(
        &self,
        checkpoint_id: &str,
    ) -> Result<Vec<ReplayRecord>, StoreError> {
        self.list_replays("checkpoint_id", checkpoint_id)
    }

    fn list_replays(&self, column: &str, value: &str) -> Result<Vec<ReplayRecord>, StoreError> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {REPLAY_COLUMNS} FROM replays WHERE {column} = ?1 \
             ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt.query_map(params![value], replay_from_row)?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row mapping
// ─────────────────────────────────────────────────────────────────────────────

fn span_from_row(row: &Row<'_>) -> rusqlite::Result<Span> {
    Ok(Span {
        span_id: row.get(0)?,
        trace_id: row.get(1)?,
        parent_span_id: row.get(2)?,
        agent_id: row.get(3)?,
        name: row.get(4)?,
        kind: enum_column(row, 5)?,
        start_time: row.get(6)?,
        end_time: row.get(7)?,
        status: enum_column(row, 8)?,
        model: row.get(9)?,
        input_tokens: row.get(10)?,
        output_tokens: row.get(11)?,
        cost_usd: row.get(12)?,
        input: opt_json_column(row, 13)?,
        output: opt_json_column(row, 14)?,
        error: opt_json_column(row, 15)?,
        attributes: json_column(row, 16)?,
    })
}

fn agent_from_row(row: &Row<'_>) -> rusqlite::Result<Agent> {
    Ok(Agent {
        agent_id: row.get(0)?,
        trace_id: row.get(1)?,
        name: row.get(2)?,
        role: row.get(3)?,
        model: row.get(4)?,
        framework: row.get(5)?,
        config: json_column(row, 6)?,
        span_count: row.get(7)?,
        total_tokens: row.get(8)?,
        total_cost_usd: row.get(9)?,
        error_count: row.get(10)?,
    })
}

fn replay_from_row(row: &Row<'_>) -> rusqlite::Result<ReplayRecord> {
    Ok(ReplayRecord {
        replay_id: row.get(0)?,
        checkpoint_id: row.get(1)?,
        trace_id: row.get(2)?,
        config: json_column(row, 3)?,
        original_output: opt_json_column(row, 4)?,
        replay_output: opt_json_column(row, 5)?,
        diff: opt_json_column(row, 6)?,
        success: row.get(7)?,
        error: row.get(8)?,
        duration_ms: row.get(9)?,
        tokens_used: row.get(10)?,
        cost_usd: row.get(11)?,
        created_at: row.get(12)?,
    })
}

fn annotation_params(annotation: &FailureAnnotation) -> Vec<Box<dyn ToSql + '_>> {
    vec![
        Box::new(&annotation.annotation_id),
        Box::new(&annotation.trace_id),
        Box::new(&annotation.span_id),
        Box::new(&annotation.agent_id),
        Box::new(annotation.category.as_str()),
        Box::new(annotation.failure_mode.as_str()),
        Box::new(annotation.confidence),
        Box::new(&annotation.reasoning),
        Box::new(annotation.source.as_str()),
    ]
}

fn opt_json(value: &Option<Value>) -> Result<Option<String>, StoreError> {
    Ok(value.as_ref().map(serde_json::to_string).transpose()?)
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn opt_json_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Value>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| conversion_error(idx, e))
}

fn enum_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = CoreError>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}
