//! SQL query builders.
//!
//! Generates the schema and the parameterized queries used by the staging
//! store. Owner-scoped queries take an explicit `OwnerFilter` and return the
//! SQL together with the ids to bind.

/// Which rows an owner-scoped query should match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerFilter {
    /// Every row.
    All,
    /// Rows whose owner foreign key is NULL.
    Unassigned,
    /// Rows owned by one of these row ids. For `reports`, which have no
    /// owner, the ids select the reports themselves.
    Owners(Vec<i64>),
}

/// The three staging tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingTable {
    Items,
    Bundles,
    Reports,
}

impl StagingTable {
    pub fn name(&self) -> &'static str {
        match self {
            StagingTable::Items => "items",
            StagingTable::Bundles => "bundles",
            StagingTable::Reports => "reports",
        }
    }

    /// Foreign key column pointing one level up the hierarchy.
    pub fn owner_column(&self) -> Option<&'static str> {
        match self {
            StagingTable::Items => Some("bundleId"),
            StagingTable::Bundles => Some("reportId"),
            StagingTable::Reports => None,
        }
    }

    fn columns(&self) -> &'static str {
        match self {
            StagingTable::Items => {
                "id, uuid, type, timestamp, annotations, data, checksum, bundleId"
            }
            StagingTable::Bundles => {
                "id, uuid, timestamp, clientId, customerId, annotations, checksum, reportId"
            }
            StagingTable::Reports => "id, uuid, timestamp, clientId, annotations, checksum",
        }
    }
}

/// Schema for all three tables. Safe to run on every open.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS reports (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid        TEXT NOT NULL UNIQUE,
    timestamp   TEXT NOT NULL,
    clientId    TEXT NOT NULL,
    annotations TEXT NOT NULL DEFAULT '',
    checksum    TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS bundles (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid        TEXT NOT NULL UNIQUE,
    timestamp   TEXT NOT NULL,
    clientId    TEXT NOT NULL,
    customerId  TEXT NOT NULL,
    annotations TEXT NOT NULL DEFAULT '',
    checksum    TEXT NOT NULL DEFAULT '',
    reportId    INTEGER NULL REFERENCES reports(id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_bundles_report ON bundles (reportId);
CREATE TABLE IF NOT EXISTS items (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid        TEXT NOT NULL UNIQUE,
    type        TEXT NOT NULL,
    timestamp   TEXT NOT NULL,
    annotations TEXT NOT NULL DEFAULT '',
    data        BLOB NOT NULL,
    checksum    TEXT NOT NULL,
    bundleId    INTEGER NULL REFERENCES bundles(id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_items_bundle ON items (bundleId);
"#;

/// Build the WHERE predicate for an owner filter.
///
/// `Unassigned` on `reports` matches nothing, as reports are never owned.
pub fn owner_predicate(table: StagingTable, filter: &OwnerFilter) -> (String, Vec<i64>) {
    let column = table.owner_column().unwrap_or("id");
    match filter {
        OwnerFilter::All => ("1 = 1".to_string(), Vec::new()),
        OwnerFilter::Unassigned if table.owner_column().is_none() => {
            ("1 = 0".to_string(), Vec::new())
        }
        OwnerFilter::Unassigned => (format!("{} IS NULL", column), Vec::new()),
        OwnerFilter::Owners(ids) if ids.is_empty() => ("1 = 0".to_string(), Vec::new()),
        OwnerFilter::Owners(ids) => (
            format!("{} IN ({})", column, placeholders(1, ids.len())),
            ids.clone(),
        ),
    }
}

/// Build a SELECT returning full rows, oldest first.
pub fn build_select(table: StagingTable, filter: &OwnerFilter) -> (String, Vec<i64>) {
    let (predicate, params) = owner_predicate(table, filter);
    (
        format!(
            "SELECT {} FROM {} WHERE {} ORDER BY id",
            table.columns(),
            table.name(),
            predicate
        ),
        params,
    )
}

/// Build a SELECT returning only row ids, oldest first.
pub fn build_select_ids(table: StagingTable, filter: &OwnerFilter) -> (String, Vec<i64>) {
    let (predicate, params) = owner_predicate(table, filter);
    (
        format!(
            "SELECT id FROM {} WHERE {} ORDER BY id",
            table.name(),
            predicate
        ),
        params,
    )
}

pub fn build_count(table: StagingTable, filter: &OwnerFilter) -> (String, Vec<i64>) {
    let (predicate, params) = owner_predicate(table, filter);
    (
        format!("SELECT COUNT(*) FROM {} WHERE {}", table.name(), predicate),
        params,
    )
}

/// Build the UPDATE that moves `count` rows under an owner.
///
/// Binds the owner id as `?1` followed by the row ids. Only rows that are
/// still unassigned are touched.
pub fn build_assign_owner(table: StagingTable, count: usize) -> Option<String> {
    let column = table.owner_column()?;
    Some(format!(
        "UPDATE {} SET {} = ?1 WHERE {} IS NULL AND id IN ({})",
        table.name(),
        column,
        column,
        placeholders(2, count)
    ))
}

pub fn build_set_checksum(table: StagingTable) -> String {
    format!("UPDATE {} SET checksum = ?1 WHERE id = ?2", table.name())
}

pub fn build_item_insert() -> &'static str {
    "INSERT INTO items (uuid, type, timestamp, annotations, data, checksum, bundleId)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL)"
}

pub fn build_bundle_insert() -> &'static str {
    "INSERT INTO bundles (uuid, timestamp, clientId, customerId, annotations, checksum, reportId)
     VALUES (?1, ?2, ?3, ?4, ?5, '', NULL)"
}

pub fn build_report_insert() -> &'static str {
    "INSERT INTO reports (uuid, timestamp, clientId, annotations, checksum)
     VALUES (?1, ?2, ?3, ?4, '')"
}

pub fn build_report_delete() -> &'static str {
    "DELETE FROM reports WHERE uuid = ?1"
}

/// `?start, ?start+1, ...` for `count` parameters.
fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unassigned_predicate() {
        let (sql, params) = owner_predicate(StagingTable::Items, &OwnerFilter::Unassigned);
        assert_eq!(sql, "bundleId IS NULL");
        assert!(params.is_empty());

        let (sql, _) = owner_predicate(StagingTable::Bundles, &OwnerFilter::Unassigned);
        assert_eq!(sql, "reportId IS NULL");
    }

    #[test]
    fn test_owner_set_predicate() {
        let (sql, params) =
            owner_predicate(StagingTable::Items, &OwnerFilter::Owners(vec![4, 9, 12]));
        assert_eq!(sql, "bundleId IN (?1, ?2, ?3)");
        assert_eq!(params, vec![4, 9, 12]);
    }

    #[test]
    fn test_empty_owner_set_matches_nothing() {
        let (sql, params) = owner_predicate(StagingTable::Items, &OwnerFilter::Owners(vec![]));
        assert_eq!(sql, "1 = 0");
        assert!(params.is_empty());
    }

    #[test]
    fn test_reports_filter_on_own_id() {
        let (sql, _) = owner_predicate(StagingTable::Reports, &OwnerFilter::Owners(vec![1]));
        assert_eq!(sql, "id IN (?1)");
        let (sql, _) = owner_predicate(StagingTable::Reports, &OwnerFilter::Unassigned);
        assert_eq!(sql, "1 = 0");
    }

    #[test]
    fn test_count_and_select_share_predicate() {
        let filter = OwnerFilter::Owners(vec![7]);
        let (count, _) = build_count(StagingTable::Bundles, &filter);
        let (select, _) = build_select(StagingTable::Bundles, &filter);
        assert_eq!(count, "SELECT COUNT(*) FROM bundles WHERE reportId IN (?1)");
        assert!(select.ends_with("FROM bundles WHERE reportId IN (?1) ORDER BY id"));
    }

    #[test]
    fn test_assign_owner_query() {
        let sql = build_assign_owner(StagingTable::Items, 2).unwrap();
        assert_eq!(
            sql,
            "UPDATE items SET bundleId = ?1 WHERE bundleId IS NULL AND id IN (?2, ?3)"
        );
        assert!(build_assign_owner(StagingTable::Reports, 2).is_none());
    }

    #[test]
    fn test_schema_is_idempotent_and_cascading() {
        assert_eq!(SCHEMA.matches("CREATE TABLE IF NOT EXISTS").count(), 3);
        assert_eq!(SCHEMA.matches("ON DELETE CASCADE").count(), 2);
    }
}
