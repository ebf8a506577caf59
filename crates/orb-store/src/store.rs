use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use orb_core::time::now_unix_secs;
use orb_core::{FieldSnapshot, Mode, Node, NodeKey, Pulse, PulseSource, StimulusKey, TraceEntry};

use crate::error::{Result, StoreError};
use crate::schema;

/// Counts reported by `orb stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub snapshot_nodes: u64,
    pub snapshot_taken_at: Option<u64>,
    pub crystals: u64,
    pub crystal_hits: u64,
    pub trace_entries: u64,
    pub sessions: u64,
    pub modes: BTreeMap<Mode, u64>,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // --- Metadata ---

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        set_metadata_on(&self.conn, key, value)
    }

    // --- Crystals ---

    /// Insert or replace the resolved pulse for `key`. Hit count survives.
    pub fn save_crystal(&self, key: &StimulusKey, pulse: &Pulse) -> Result<()> {
        let json = serde_json::to_string(pulse)?;
        self.conn.execute(
            "INSERT INTO crystals (stimulus_key, mode, confidence, pulse, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(stimulus_key) DO UPDATE SET
                mode = excluded.mode,
                confidence = excluded.confidence,
                pulse = excluded.pulse",
            params![
                key.as_str(),
                pulse.cognitive_mode.as_str(),
                pulse.glow_intensity,
                json,
                now_unix_secs() as i64,
            ],
        )?;
        Ok(())
    }

    /// Look up a crystallized pulse and count the hit.
    pub fn load_crystal(&self, key: &StimulusKey) -> Result<Option<Pulse>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT pulse FROM crystals WHERE stimulus_key = ?1",
                [key.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(json) = json else {
            return Ok(None);
        };
        self.conn.execute(
            "UPDATE crystals SET hits = hits + 1 WHERE stimulus_key = ?1",
            [key.as_str()],
        )?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    pub fn crystal_count(&self) -> Result<u64> {
        count(&self.conn, "SELECT COUNT(*) FROM crystals")
    }

    pub fn clear_crystals(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM crystals", [])?)
    }

    // --- Trace log ---

    /// Append a batch of entries in one transaction.
    pub fn append_trace(&self, session_id: &str, entries: &[TraceEntry]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO trace_log
                    (session_id, timestamp, stimulus_key, mode, confidence, field_density, source)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for entry in entries {
                stmt.execute(params![
                    session_id,
                    entry.timestamp,
                    entry.stimulus_key.as_str(),
                    entry.mode.as_str(),
                    entry.confidence,
                    entry.field_density as i64,
                    source_str(entry.source),
                ])?;
            }
        }
        tx.commit()?;
        Ok(entries.len())
    }

    pub fn trace_count(&self) -> Result<u64> {
        count(&self.conn, "SELECT COUNT(*) FROM trace_log")
    }

    /// Most recent entries, newest first.
    pub fn recent_trace(&self, limit: usize) -> Result<Vec<TraceEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT timestamp, stimulus_key, mode, confidence, field_density, source
             FROM trace_log ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], |row| {
            Ok((
                row.get::<_, f64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (timestamp, key, mode, confidence, density, source) = row?;
            entries.push(TraceEntry {
                timestamp,
                stimulus_key: StimulusKey::from_hex(key),
                mode: parse_mode(&mode)?,
                confidence,
                field_density: density.max(0) as usize,
                source: parse_source(&source)?,
            });
        }
        Ok(entries)
    }

    /// Trace entries per mode across all sessions.
    pub fn mode_counts(&self) -> Result<BTreeMap<Mode, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT mode, COUNT(*) FROM trace_log GROUP BY mode")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let (mode, n) = row?;
            counts.insert(parse_mode(&mode)?, n.max(0) as u64);
        }
        Ok(counts)
    }

    // --- Field snapshots ---

    /// Replace the persisted field with `snapshot`.
    pub fn save_snapshot(&self, snapshot: &FieldSnapshot) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;

        tx.execute("DELETE FROM field_nodes", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO field_nodes
                    (scale, depth, digest, coordinates, vivacity, occupancy, adjacency)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for node in &snapshot.nodes {
                stmt.execute(params![
                    node.key.scale,
                    node.key.depth,
                    node.key.digest as i64,
                    serde_json::to_string(&node.coordinates)?,
                    node.vivacity,
                    node.occupancy,
                    node.adjacency,
                ])?;
            }
        }

        set_metadata_on(&tx, "snapshot_version", &snapshot.version.to_string())?;
        set_metadata_on(&tx, "snapshot_taken_at", &snapshot.taken_at.to_string())?;
        set_metadata_on(&tx, "snapshot_dimension", &snapshot.dimension.to_string())?;
        set_metadata_on(&tx, "purge_active", &snapshot.purge_active.to_string())?;
        set_metadata_on(
            &tx,
            "last_density_breach",
            &snapshot.last_density_breach.to_string(),
        )?;

        tx.commit()?;
        tracing::debug!(nodes = snapshot.len(), "field snapshot saved");
        Ok(())
    }

    /// The persisted field, or `None` if nothing was ever saved.
    pub fn load_snapshot(&self) -> Result<Option<FieldSnapshot>> {
        let Some(version) = self.get_metadata("snapshot_version")? else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT scale, depth, digest, coordinates, vivacity, occupancy, adjacency
             FROM field_nodes ORDER BY scale, depth, digest",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, u32>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, u32>(5)?,
                row.get::<_, f64>(6)?,
            ))
        })?;

        let mut nodes = Vec::new();
        for row in rows {
            let (scale, depth, digest, coordinates, vivacity, occupancy, adjacency) = row?;
            nodes.push(Node {
                key: NodeKey {
                    scale,
                    depth,
                    digest: digest as u64,
                },
                coordinates: serde_json::from_str(&coordinates)?,
                vivacity,
                occupancy,
                adjacency,
            });
        }

        Ok(Some(FieldSnapshot {
            version: parse_number(&version, "snapshot_version")?,
            taken_at: self.metadata_number("snapshot_taken_at")?.unwrap_or(0),
            dimension: self.metadata_number("snapshot_dimension")?.unwrap_or(0),
            purge_active: self.get_metadata("purge_active")?.as_deref() == Some("true"),
            last_density_breach: self.metadata_number("last_density_breach")?.unwrap_or(0),
            nodes,
        }))
    }

    fn metadata_number<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>> {
        self.get_metadata(key)?
            .map(|v| parse_number(&v, key))
            .transpose()
    }

    // --- Stats ---

    pub fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            snapshot_nodes: count(&self.conn, "SELECT COUNT(*) FROM field_nodes")?,
            snapshot_taken_at: self.metadata_number("snapshot_taken_at")?,
            crystals: self.crystal_count()?,
            crystal_hits: count(&self.conn, "SELECT COALESCE(SUM(hits), 0) FROM crystals")?,
            trace_entries: self.trace_count()?,
            sessions: count(&self.conn, "SELECT COUNT(DISTINCT session_id) FROM trace_log")?,
            modes: self.mode_counts()?,
        })
    }
}

fn set_metadata_on(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

fn count(conn: &Connection, sql: &str) -> Result<u64> {
    let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(n.max(0) as u64)
}

fn parse_number<T: std::str::FromStr>(value: &str, key: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| StoreError::InvalidData(format!("metadata {key} is not a number: {value}")))
}

fn parse_mode(s: &str) -> Result<Mode> {
    Mode::parse(s).ok_or_else(|| StoreError::InvalidData(format!("unknown mode: {s}")))
}

fn source_str(source: PulseSource) -> &'static str {
    match source {
        PulseSource::Computed => "computed",
        PulseSource::Crystallized => "crystallized",
    }
}

fn parse_source(s: &str) -> Result<PulseSource> {
    match s {
        "computed" => Ok(PulseSource::Computed),
        "crystallized" => Ok(PulseSource::Crystallized),
        other => Err(StoreError::InvalidData(format!("unknown pulse source: {other}"))),
    }
}
