use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use crate::engine::AlertRecord;

pub type AlertDb = Arc<Mutex<Connection>>;

/// An alert as read back from the local log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredAlert {
    pub id: i64,
    #[serde(flatten)]
    pub record: AlertRecord,
}

/// Opens (or creates) the alert log and ensures the schema exists.
pub fn open_store(path: &str) -> Result<Connection, super::DispatchError> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    init_schema(&conn)?;
    tracing::info!("SQLite alert log initialized at {path}");
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS alerts (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            ts             INTEGER NOT NULL,
            network        TEXT NOT NULL,
            pair_address   TEXT,
            symbol         TEXT,
            price_usd      REAL NOT NULL,
            liquidity_usd  REAL NOT NULL,
            score          INTEGER NOT NULL,
            reasons        TEXT NOT NULL,
            link           TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_alerts_ts ON alerts (ts DESC);
        CREATE INDEX IF NOT EXISTS idx_alerts_network ON alerts (network);",
    )
}

pub fn insert_alert(conn: &Connection, record: &AlertRecord) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO alerts (ts, network, pair_address, symbol, price_usd, liquidity_usd, score, reasons, link)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            record.ts,
            record.network,
            record.pair_address,
            record.symbol,
            record.price_usd,
            record.liquidity_usd,
            record.score,
            record.reasons,
            record.link,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Latest alerts first, optionally for one network only.
pub fn recent_alerts(
    conn: &Connection,
    limit: u32,
    network: Option<&str>,
) -> rusqlite::Result<Vec<StoredAlert>> {
    let mut stmt = conn.prepare(
        "SELECT id, ts, network, pair_address, symbol, price_usd, liquidity_usd, score, reasons, link
         FROM alerts
         WHERE (?1 IS NULL OR network = ?1)
         ORDER BY ts DESC, id DESC
         LIMIT ?2",
    )?;
    let alerts = stmt
        .query_map(params![network, limit], |row| {
            Ok(StoredAlert {
                id: row.get(0)?,
                record: AlertRecord {
                    ts: row.get(1)?,
                    network: row.get(2)?,
                    pair_address: row.get(3)?,
                    symbol: row.get(4)?,
                    price_usd: row.get(5)?,
                    liquidity_usd: row.get(6)?,
                    score: row.get(7)?,
                    reasons: row.get(8)?,
                    link: row.get(9)?,
                },
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(alerts)
}

pub fn count_alerts(conn: &Connection) -> rusqlite::Result<u64> {
    conn.query_row("SELECT COUNT(*) FROM alerts", [], |row| row.get(0))
}

pub fn latest_alert_ts(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    conn.query_row("SELECT MAX(ts) FROM alerts", [], |row| row.get(0))
        .optional()
        .map(Option::flatten)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn record(ts: i64, network: &str, score: i64) -> AlertRecord {
        AlertRecord {
            ts,
            network: network.into(),
            pair_address: Some(format!("0x{ts}")),
            symbol: Some("CAKE/WBNB".into()),
            price_usd: 2.5,
            liquidity_usd: 750_000.0,
            score,
            reasons: "volume spike 5m 5.0x >= 2.0x, momentum 5m +8.0% >= 6.0%".into(),
            link: None,
        }
    }

    fn memory() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn insert_and_read_back_latest_first() {
        let conn = memory();
        insert_alert(&conn, &record(100, "bsc", 50)).unwrap();
        insert_alert(&conn, &record(300, "bsc", 70)).unwrap();
        let id = insert_alert(&conn, &record(200, "base", 60)).unwrap();
        assert_eq!(id, 3);

        let all = recent_alerts(&conn, 10, None).unwrap();
        let ts: Vec<i64> = all.iter().map(|a| a.record.ts).collect();
        assert_eq!(ts, vec![300, 200, 100]);
        assert_eq!(all[1].record, record(200, "base", 60));

        let limited = recent_alerts(&conn, 1, None).unwrap();
        assert_eq!(limited.len(), 1);

        let bsc = recent_alerts(&conn, 10, Some("bsc")).unwrap();
        assert_eq!(bsc.len(), 2);
        assert_eq!(count_alerts(&conn).unwrap(), 3);
        assert_eq!(latest_alert_ts(&conn).unwrap(), Some(300));
    }

    #[test]
    fn empty_log() {
        let conn = memory();
        assert_eq!(count_alerts(&conn).unwrap(), 0);
        assert_eq!(latest_alert_ts(&conn).unwrap(), None);
        assert!(recent_alerts(&conn, 50, None).unwrap().is_empty());
    }

    #[test]
    fn flattens_when_serialized() {
        let stored = StoredAlert {
            id: 7,
            record: record(1, "bsc", 80),
        };
        let json = serde_json::to_value(&stored).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["network"], "bsc");
        assert_eq!(json["score"], 80);
    }

    #[test]
    fn opens_on_disk_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("alerts.db");
        let path = path.to_str().unwrap();

        let conn = open_store(path).unwrap();
        insert_alert(&conn, &record(1, "bsc", 50)).unwrap();
        drop(conn);

        let conn = open_store(path).unwrap();
        assert_eq!(count_alerts(&conn).unwrap(), 1);
    }
}
