//! Relational staging store.
//!
//! Owns the SQLite connection and executes the queries from `queries`.
//! Row-level helpers take a plain `&Connection` so they run the same way
//! inside or outside a transaction.

use std::time::Duration;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

use crate::config::DataStoreConfig;
use crate::error::{Error, Result};
use crate::log_event;
use crate::logging::structured::LogContext;
use crate::staging::{BundleHeader, ReportHeader};
use crate::validation::tags::join_annotations;

use super::compression::compress;
use super::models::{BundleRow, ItemRow, ReportRow};
use super::queries::{
    build_assign_owner, build_bundle_insert, build_count, build_item_insert, build_report_delete,
    build_report_insert, build_select, build_select_ids, build_set_checksum, OwnerFilter,
    StagingTable, SCHEMA,
};

/// How long a writer waits for another connection's lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Row ids bound per UPDATE when assigning owners.
const ASSIGN_CHUNK: usize = 500;

/// SQLite-backed staging store.
pub struct StagingStore {
    conn: Connection,
    location: String,
}

impl StagingStore {
    /// Open the store described by `config` and create the schema.
    pub fn open(config: &DataStoreConfig) -> Result<Self> {
        if config.driver != "sqlite3" {
            return Err(Error::UnsupportedDriver(config.driver.clone()));
        }

        let in_memory = config.params.is_empty() || config.params == ":memory:";
        let location = if in_memory { ":memory:" } else { config.params.as_str() };
        let ctx = LogContext::component("storage").with("location", location);
        let conn = if in_memory {
            Connection::open_in_memory()?
        } else {
            Connection::open(&config.params)?
        };

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        if !in_memory {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
            log_event!(debug, ctx, "STAGING_JOURNAL_MODE", mode = mode);
        }
        conn.execute_batch(SCHEMA)?;

        log_event!(info, ctx, "STAGING_STORE_OPENED");

        Ok(Self {
            conn,
            location: config.params.clone(),
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Start a write transaction that takes the database write lock up front.
    pub fn begin_immediate(&mut self) -> Result<Transaction<'_>> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }
}

pub fn insert_item(
    conn: &Connection,
    uuid: &str,
    item_type: &str,
    timestamp: &str,
    annotations: &[String],
    body: &[u8],
    checksum: &str,
) -> Result<i64> {
    let data = compress(body)?;
    conn.execute(
        build_item_insert(),
        params![
            uuid,
            item_type,
            timestamp,
            join_annotations(annotations),
            data,
            checksum
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_bundle(conn: &Connection, header: &BundleHeader) -> Result<i64> {
    conn.execute(
        build_bundle_insert(),
        params![
            header.id,
            header.timestamp,
            header.client_id,
            header.customer_id,
            join_annotations(&header.annotations)
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_report(conn: &Connection, header: &ReportHeader) -> Result<i64> {
    conn.execute(
        build_report_insert(),
        params![
            header.id,
            header.timestamp,
            header.client_id,
            join_annotations(&header.annotations)
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn select_items(conn: &Connection, filter: &OwnerFilter) -> Result<Vec<ItemRow>> {
    let (sql, ids) = build_select(StagingTable::Items, filter);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(ids.iter()), item_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn select_bundles(conn: &Connection, filter: &OwnerFilter) -> Result<Vec<BundleRow>> {
    let (sql, ids) = build_select(StagingTable::Bundles, filter);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(ids.iter()), bundle_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn select_reports(conn: &Connection, filter: &OwnerFilter) -> Result<Vec<ReportRow>> {
    let (sql, ids) = build_select(StagingTable::Reports, filter);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(ids.iter()), report_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn select_ids(conn: &Connection, table: StagingTable, filter: &OwnerFilter) -> Result<Vec<i64>> {
    let (sql, ids) = build_select_ids(table, filter);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(ids.iter()), |row| row.get(0))?
        .collect::<std::result::Result<Vec<i64>, _>>()?;
    Ok(rows)
}

pub fn count_rows(conn: &Connection, table: StagingTable, filter: &OwnerFilter) -> Result<usize> {
    let (sql, ids) = build_count(table, filter);
    let count: i64 = conn.query_row(&sql, params_from_iter(ids.iter()), |row| row.get(0))?;
    Ok(count as usize)
}

/// Move still-unassigned rows under `owner`. Returns the number moved.
pub fn assign_owner(conn: &Connection, table: StagingTable, owner: i64, ids: &[i64]) -> Result<usize> {
    let mut moved = 0;
    for chunk in ids.chunks(ASSIGN_CHUNK) {
        let sql = build_assign_owner(table, chunk.len()).ok_or_else(|| {
            Error::InvalidState(format!("{} rows have no owner", table.name()))
        })?;
        let mut values = Vec::with_capacity(chunk.len() + 1);
        values.push(owner);
        values.extend_from_slice(chunk);
        moved += conn.execute(&sql, params_from_iter(values.iter()))?;
    }
    Ok(moved)
}

pub fn set_checksum(conn: &Connection, table: StagingTable, id: i64, checksum: &str) -> Result<()> {
    conn.execute(&build_set_checksum(table), params![checksum, id])?;
    Ok(())
}

pub fn find_report(conn: &Connection, uuid: &str) -> Result<Option<ReportRow>> {
    let sql = "SELECT id, uuid, timestamp, clientId, annotations, checksum FROM reports WHERE uuid = ?1";
    Ok(conn.query_row(sql, params![uuid], report_from_row).optional()?)
}

pub fn find_bundle(conn: &Connection, uuid: &str) -> Result<Option<BundleRow>> {
    let sql = "SELECT id, uuid, timestamp, clientId, customerId, annotations, checksum, reportId
               FROM bundles WHERE uuid = ?1";
    Ok(conn.query_row(sql, params![uuid], bundle_from_row).optional()?)
}

/// Delete a report by uuid; its bundles and their items go with it.
pub fn delete_report(conn: &Connection, uuid: &str) -> Result<bool> {
    Ok(conn.execute(build_report_delete(), params![uuid])? > 0)
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<ItemRow> {
    Ok(ItemRow {
        id: row.get(0)?,
        uuid: row.get(1)?,
        item_type: row.get(2)?,
        timestamp: row.get(3)?,
        annotations: row.get(4)?,
        data: row.get(5)?,
        checksum: row.get(6)?,
        bundle_id: row.get(7)?,
    })
}

fn bundle_from_row(row: &Row<'_>) -> rusqlite::Result<BundleRow> {
    Ok(BundleRow {
        id: row.get(0)?,
        uuid: row.get(1)?,
        timestamp: row.get(2)?,
        client_id: row.get(3)?,
        customer_id: row.get(4)?,
        annotations: row.get(5)?,
        checksum: row.get(6)?,
        report_id: row.get(7)?,
    })
}

fn report_from_row(row: &Row<'_>) -> rusqlite::Result<ReportRow> {
    Ok(ReportRow {
        id: row.get(0)?,
        uuid: row.get(1)?,
        timestamp: row.get(2)?,
        client_id: row.get(3)?,
        annotations: row.get(4)?,
        checksum: row.get(5)?,
    })
}
