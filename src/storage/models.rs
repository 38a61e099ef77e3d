//! Database models for the staging tables.
//!
//! These models represent rows as stored. The owner foreign key is `None`
//! while a row is unassigned.

/// Row of the `items` table. `data` holds the gzip-compressed body.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRow {
    pub id: i64,
    pub uuid: String,
    pub item_type: String,
    pub timestamp: String,
    pub annotations: String,
    pub data: Vec<u8>,
    pub checksum: String,
    pub bundle_id: Option<i64>,
}

/// Row of the `bundles` table.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleRow {
    pub id: i64,
    pub uuid: String,
    pub timestamp: String,
    pub client_id: String,
    pub customer_id: String,
    pub annotations: String,
    pub checksum: String,
    pub report_id: Option<i64>,
}

/// Row of the `reports` table.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub id: i64,
    pub uuid: String,
    pub timestamp: String,
    pub client_id: String,
    pub annotations: String,
    pub checksum: String,
}
