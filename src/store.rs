//! Position store
//!
//! SQLite-based persistence with JSON backup. The position table is
//! the only shared mutable resource in the engine, and every mutation
//! goes through a conditional commit: opens are check-and-insert
//! (no open position may exist for the symbol) and closes are
//! check-and-update (`status = 'open'` as a precondition), so
//! overlapping triggers degrade to no-ops instead of corrupting P&L.

use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, Connection, Row};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::types::{Position, Symbol};

/// Parameters for opening a position. The store assigns the id.
#[derive(Debug, Clone)]
pub struct NewPosition {
    pub symbol: Symbol,
    pub side: crate::Side,
    pub entry_price: f64,
    pub quantity: f64,
    pub stop_loss: f64,
    pub take_profit: Option<f64>,
    pub entry_fees: f64,
    pub signal_confidence: f64,
    pub predicted_price: f64,
    pub opened_at: DateTime<Utc>,
}

pub struct PositionStore {
    conn: Arc<Mutex<Connection>>,
    json_backup_path: PathBuf,
    auto_backup: bool,
}

impl PositionStore {
    pub fn new<P: AsRef<Path>>(
        db_path: P,
        json_backup_path: P,
        auto_backup: bool,
    ) -> EngineResult<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let conn = Connection::open(db_path)?;

        // WAL mode for better concurrency under overlapping triggers
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            json_backup_path: json_backup_path.as_ref().to_path_buf(),
            auto_backup,
        };

        store.create_tables()?;
        info!("Position store initialized: {}", db_path.display());

        Ok(store)
    }

    /// In-memory store for tests and dry runs
    pub fn in_memory() -> EngineResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            json_backup_path: PathBuf::new(),
            auto_backup: false,
        };
        store.create_tables()?;
        Ok(store)
    }

    fn create_tables(&self) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS positions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                entry_price REAL NOT NULL,
                quantity REAL NOT NULL,
                stop_loss REAL NOT NULL,
                take_profit REAL,
                status TEXT NOT NULL DEFAULT 'open',
                fees REAL NOT NULL DEFAULT 0,
                exit_price REAL,
                gross_pnl REAL,
                net_pnl REAL,
                exit_reason TEXT,
                signal_confidence REAL NOT NULL DEFAULT 0,
                predicted_price REAL NOT NULL DEFAULT 0,
                opened_at TEXT NOT NULL,
                closed_at TEXT,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                component TEXT NOT NULL,
                level TEXT NOT NULL,
                symbol TEXT,
                message TEXT NOT NULL,
                context TEXT DEFAULT '{}',
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS engine_config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_positions_symbol_status
             ON positions(symbol, status)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_positions_closed_at
             ON positions(closed_at)",
            [],
        )?;

        debug!("Database schema created/verified");
        Ok(())
    }

    /// Atomically insert a new open position, guarded by the
    /// one-open-position-per-symbol invariant. Returns None when an
    /// open position already exists for the symbol.
    pub fn open_position(&self, new: &NewPosition) -> EngineResult<Option<Position>> {
        let conn = self.conn.lock().unwrap();

        let inserted = conn.execute(
            "INSERT INTO positions
               (symbol, side, entry_price, quantity, stop_loss, take_profit,
                status, fees, signal_confidence, predicted_price, opened_at)
             SELECT ?1, ?2, ?3, ?4, ?5, ?6, 'open', ?7, ?8, ?9, ?10
             WHERE NOT EXISTS (
               SELECT 1 FROM positions WHERE symbol = ?1 AND status = 'open'
             )",
            params![
                new.symbol.as_str(),
                new.side.as_str(),
                new.entry_price,
                new.quantity,
                new.stop_loss,
                new.take_profit,
                new.entry_fees,
                new.signal_confidence,
                new.predicted_price,
                new.opened_at.to_rfc3339(),
            ],
        )?;

        if inserted == 0 {
            debug!("Open rejected: {} already has an open position", new.symbol);
            return Ok(None);
        }

        let id = conn.last_insert_rowid();
        let position = Self::fetch_position(&conn, id)?;

        debug!(
            "Position opened: #{} {} {} qty={:.6} @ {:.2}",
            id, new.side, new.symbol, new.quantity, new.entry_price
        );

        drop(conn);
        self.maybe_backup();

        Ok(position)
    }

    /// Atomically mark a position closed, writing the realized P&L.
    /// The update only applies while `status = 'open'`, so a second
    /// concurrent close becomes a no-op and None is returned.
    #[allow(clippy::too_many_arguments)]
    pub fn close_position(
        &self,
        id: i64,
        exit_price: f64,
        total_fees: f64,
        gross_pnl: f64,
        net_pnl: f64,
        exit_reason: &str,
        closed_at: DateTime<Utc>,
    ) -> EngineResult<Option<Position>> {
        let conn = self.conn.lock().unwrap();

        let updated = conn.execute(
            "UPDATE positions
             SET status = 'closed', exit_price = ?2, fees = ?3,
                 gross_pnl = ?4, net_pnl = ?5, exit_reason = ?6,
                 closed_at = ?7, updated_at = CURRENT_TIMESTAMP
             WHERE id = ?1 AND status = 'open'",
            params![
                id,
                exit_price,
                total_fees,
                gross_pnl,
                net_pnl,
                exit_reason,
                closed_at.to_rfc3339(),
            ],
        )?;

        if updated == 0 {
            debug!("Close skipped: position #{} not in open state", id);
            return Ok(None);
        }

        let position = Self::fetch_position(&conn, id)?;

        debug!(
            "Position closed: #{} @ {:.2} net={:.2} ({})",
            id, exit_price, net_pnl, exit_reason
        );

        drop(conn);
        self.maybe_backup();

        Ok(position)
    }

    pub fn get_position(&self, id: i64) -> EngineResult<Option<Position>> {
        let conn = self.conn.lock().unwrap();
        Self::fetch_position(&conn, id)
    }

    /// All open positions, optionally filtered by symbol
    pub fn open_positions(&self, symbol: Option<&Symbol>) -> EngineResult<Vec<Position>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {COLUMNS} FROM positions WHERE status = 'open' {} ORDER BY id",
            if symbol.is_some() { "AND symbol = ?1" } else { "" },
        );
        let mut stmt = conn.prepare(&sql)?;

        let rows = match symbol {
            Some(sym) => stmt.query_map(params![sym.as_str()], map_position)?,
            None => stmt.query_map([], map_position)?,
        };
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Most recently closed trades, newest first
    pub fn recent_trades(&self, limit: usize, symbol: Option<&Symbol>) -> EngineResult<Vec<Position>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {COLUMNS} FROM positions WHERE status = 'closed' {}
             ORDER BY closed_at DESC LIMIT {limit}",
            if symbol.is_some() { "AND symbol = ?1" } else { "" },
        );
        let mut stmt = conn.prepare(&sql)?;

        let rows = match symbol {
            Some(sym) => stmt.query_map(params![sym.as_str()], map_position)?,
            None => stmt.query_map([], map_position)?,
        };
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Closed trades since the cutoff, in chronological close order.
    /// The order matters: drawdown replay depends on it.
    pub fn closed_since(
        &self,
        cutoff: Option<DateTime<Utc>>,
        symbol: Option<&Symbol>,
    ) -> EngineResult<Vec<Position>> {
        let conn = self.conn.lock().unwrap();

        let mut clauses = vec!["status = 'closed'".to_string()];
        let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(cutoff) = cutoff {
            args.push(Box::new(cutoff.to_rfc3339()));
            clauses.push(format!("closed_at >= ?{}", args.len()));
        }
        if let Some(sym) = symbol {
            args.push(Box::new(sym.as_str().to_string()));
            clauses.push(format!("symbol = ?{}", args.len()));
        }

        let sql = format!(
            "SELECT {COLUMNS} FROM positions WHERE {} ORDER BY closed_at ASC, id ASC",
            clauses.join(" AND "),
        );
        let mut stmt = conn.prepare(&sql)?;
        let params = rusqlite::params_from_iter(args.iter().map(|a| a.as_ref()));
        let rows = stmt.query_map(params, map_position)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Sum of realized net P&L over closed trades in scope
    pub fn realized_net_pnl(&self, symbol: Option<&Symbol>) -> EngineResult<f64> {
        let conn = self.conn.lock().unwrap();
        let total: f64 = match symbol {
            Some(sym) => conn.query_row(
                "SELECT COALESCE(SUM(net_pnl), 0)
                 FROM positions WHERE status = 'closed' AND symbol = ?1",
                params![sym.as_str()],
                |row| row.get(0),
            )?,
            None => conn.query_row(
                "SELECT COALESCE(SUM(net_pnl), 0) FROM positions WHERE status = 'closed'",
                [],
                |row| row.get(0),
            )?,
        };
        Ok(total)
    }

    /// Append an entry to the audit log
    pub fn log_audit(
        &self,
        component: &str,
        level: &str,
        symbol: Option<&Symbol>,
        message: &str,
        context: serde_json::Value,
    ) -> EngineResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO audit_log (component, level, symbol, message, context)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                component,
                level,
                symbol.map(|s| s.as_str()),
                message,
                context.to_string(),
            ],
        )?;
        Ok(())
    }

    /// Snapshot the active configuration for post-hoc audit
    pub fn save_config_snapshot(&self, config: &EngineConfig) -> EngineResult<()> {
        let sections = [
            ("trading", serde_json::to_string(&config.trading)?),
            ("signal", serde_json::to_string(&config.signal)?),
            ("closure", serde_json::to_string(&config.closure)?),
        ];

        let conn = self.conn.lock().unwrap();
        for (key, value) in sections {
            conn.execute(
                "INSERT OR REPLACE INTO engine_config (key, value, updated_at)
                 VALUES (?1, ?2, CURRENT_TIMESTAMP)",
                params![key, value],
            )?;
        }
        debug!("Configuration snapshot saved");
        Ok(())
    }

    fn fetch_position(conn: &Connection, id: i64) -> EngineResult<Option<Position>> {
        let sql = format!("SELECT {COLUMNS} FROM positions WHERE id = ?1");
        let mut stmt = conn.prepare(&sql)?;
        match stmt.query_row(params![id], map_position) {
            Ok(pos) => Ok(Some(pos)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(EngineError::Persistence(e)),
        }
    }

    /// Best-effort backup after a committed transition. The row is
    /// already durable at this point; a failed export must not surface
    /// as a transition failure.
    fn maybe_backup(&self) {
        if !self.auto_backup {
            return;
        }
        if let Err(e) = self.export_json() {
            warn!("JSON backup failed after commit: {e}");
        }
    }

    /// Write a JSON snapshot of the open book next to the database
    pub fn export_json(&self) -> EngineResult<()> {
        let open = self.open_positions(None)?;
        let state = serde_json::json!({
            "exported_at": Utc::now().to_rfc3339(),
            "open_positions": open,
        });
        std::fs::write(
            &self.json_backup_path,
            serde_json::to_string_pretty(&state)?,
        )?;
        debug!("State exported to: {}", self.json_backup_path.display());
        Ok(())
    }
}

const COLUMNS: &str = "id, symbol, side, entry_price, quantity, stop_loss, take_profit, \
                       status, fees, exit_price, gross_pnl, net_pnl, exit_reason, \
                       signal_confidence, predicted_price, opened_at, closed_at";

fn map_position(row: &Row<'_>) -> rusqlite::Result<Position> {
    Ok(Position {
        id: row.get(0)?,
        symbol: Symbol::new(row.get::<_, String>(1)?),
        side: parse_column(row, 2)?,
        entry_price: row.get(3)?,
        quantity: row.get(4)?,
        stop_loss: row.get(5)?,
        take_profit: row.get(6)?,
        status: parse_column(row, 7)?,
        fees: row.get(8)?,
        exit_price: row.get(9)?,
        gross_pnl: row.get(10)?,
        net_pnl: row.get(11)?,
        exit_reason: row.get(12)?,
        signal_confidence: row.get(13)?,
        predicted_price: row.get(14)?,
        opened_at: parse_datetime(row, 15)?,
        closed_at: parse_optional_datetime(row, 16)?,
    })
}

fn parse_column<T: std::str::FromStr<Err = String>>(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn parse_datetime(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_optional_datetime(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(s) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}
