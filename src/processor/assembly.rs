//! Report assembly over the relational staging store.
//!
//! Coordinates the assembly-side workflow:
//! 1. Validate and stage incoming payloads as unassigned items
//! 2. Roll unassigned items into a new bundle
//! 3. Roll unassigned bundles into a new report
//! 4. Rebuild domain objects from rows, re-verifying every checksum
//!
//! Bundle and report generation each run in one immediate transaction, so
//! concurrent generators on separate connections never claim the same row.

use rusqlite::Connection;
use serde_json::{Map, Value};

use crate::config::{DataStoreConfig, ItemLimits};
use crate::error::{Error, Result};
use crate::log_event;
use crate::logging::structured::LogContext;
use crate::staging::{
    verify_checksum, BundleHeader, DataItemHeader, ReportHeader, TelemetryBundle,
    TelemetryDataItem, TelemetryReport,
};
use crate::storage::compression::decompress;
use crate::storage::models::{BundleRow, ItemRow, ReportRow};
use crate::storage::queries::{OwnerFilter, StagingTable};
use crate::storage::store::{self, StagingStore};
use crate::validation::payload::validate_payload;
use crate::validation::tags::{split_annotations, Tag, TelemetryType};

/// Assembles staged telemetry into bundles and reports.
pub struct Processor {
    store: StagingStore,
    limits: ItemLimits,
}

impl Processor {
    pub fn open(config: &DataStoreConfig, limits: ItemLimits) -> Result<Self> {
        Ok(Self {
            store: StagingStore::open(config)?,
            limits,
        })
    }

    pub fn store(&self) -> &StagingStore {
        &self.store
    }

    /// Validate a payload and stage it as an unassigned item.
    ///
    /// Returns the new item's id. Rejected payloads leave storage untouched.
    pub fn add_data(
        &mut self,
        telemetry_type: &TelemetryType,
        blob: &[u8],
        tags: &[Tag],
    ) -> Result<String> {
        let body = validate_payload(blob, &self.limits)?;
        let item = TelemetryDataItem::new(telemetry_type, body, tags)?;
        let encoded = serde_json::to_vec(&item.body)?;

        store::insert_item(
            self.store.conn(),
            &item.header.id,
            &item.header.telemetry_type,
            &item.header.timestamp,
            &item.header.annotations,
            &encoded,
            &item.footer.checksum,
        )?;

        log_event!(
            debug,
            processor_ctx(),
            "ITEM_STAGED",
            id = item.header.id,
            telemetry_type = item.header.telemetry_type,
            bytes = blob.len()
        );

        Ok(item.header.id)
    }

    /// Bundle every currently unassigned item.
    pub fn generate_bundle(
        &mut self,
        client_id: &str,
        customer_id: &str,
        tags: &[Tag],
    ) -> Result<TelemetryBundle> {
        let header = BundleHeader::new(
            client_id,
            customer_id,
            tags.iter().map(|t| t.to_string()).collect(),
        );

        let tx = self.store.begin_immediate()?;
        let bundle_row = store::insert_bundle(&tx, &header)?;
        let unassigned = store::select_ids(&tx, StagingTable::Items, &OwnerFilter::Unassigned)?;
        store::assign_owner(&tx, StagingTable::Items, bundle_row, &unassigned)?;

        let items = store::select_items(&tx, &OwnerFilter::Owners(vec![bundle_row]))?
            .iter()
            .map(|row| to_item(row))
            .collect::<Result<Vec<_>>>()?;
        let bundle = TelemetryBundle::assemble(header, items)?;
        store::set_checksum(&tx, StagingTable::Bundles, bundle_row, &bundle.footer.checksum)?;
        tx.commit()?;

        log_event!(
            info,
            LogContext::client(client_id),
            "BUNDLE_GENERATED",
            id = bundle.header.id,
            items = bundle.body.len()
        );

        Ok(bundle)
    }

    /// Roll every currently unassigned bundle into a new report.
    pub fn generate_report(&mut self, client_id: &str, tags: &[Tag]) -> Result<TelemetryReport> {
        let header = ReportHeader::new(client_id, tags.iter().map(|t| t.to_string()).collect());

        let tx = self.store.begin_immediate()?;
        let report_row = store::insert_report(&tx, &header)?;
        let unassigned =
            store::select_ids(&tx, StagingTable::Bundles, &OwnerFilter::Unassigned)?;
        store::assign_owner(&tx, StagingTable::Bundles, report_row, &unassigned)?;

        let bundles = store::select_bundles(&tx, &OwnerFilter::Owners(vec![report_row]))?
            .iter()
            .map(|row| to_bundle(&tx, row))
            .collect::<Result<Vec<_>>>()?;
        let report = TelemetryReport::assemble(header, bundles)?;
        store::set_checksum(&tx, StagingTable::Reports, report_row, &report.footer.checksum)?;
        tx.commit()?;

        log_event!(
            info,
            LogContext::client(client_id).with_report(&report.header.id),
            "REPORT_GENERATED",
            bundles = report.body.len(),
            items = report.item_count()
        );

        Ok(report)
    }

    pub fn get_items(&self, filter: &OwnerFilter) -> Result<Vec<ItemRow>> {
        store::select_items(self.store.conn(), filter)
    }

    pub fn get_bundles(&self, filter: &OwnerFilter) -> Result<Vec<BundleRow>> {
        store::select_bundles(self.store.conn(), filter)
    }

    pub fn get_reports(&self, filter: &OwnerFilter) -> Result<Vec<ReportRow>> {
        store::select_reports(self.store.conn(), filter)
    }

    pub fn item_count(&self, filter: &OwnerFilter) -> Result<usize> {
        store::count_rows(self.store.conn(), StagingTable::Items, filter)
    }

    pub fn bundle_count(&self, filter: &OwnerFilter) -> Result<usize> {
        store::count_rows(self.store.conn(), StagingTable::Bundles, filter)
    }

    pub fn report_count(&self) -> Result<usize> {
        store::count_rows(self.store.conn(), StagingTable::Reports, &OwnerFilter::All)
    }

    /// Number of items held by the bundle with this id.
    pub fn bundle_item_count(&self, bundle_id: &str) -> Result<usize> {
        let row = store::find_bundle(self.store.conn(), bundle_id)?
            .ok_or_else(|| Error::InvalidState(format!("unknown bundle {}", bundle_id)))?;
        self.item_count(&OwnerFilter::Owners(vec![row.id]))
    }

    /// Number of bundles held by the report with this id.
    pub fn report_bundle_count(&self, report_id: &str) -> Result<usize> {
        let row = store::find_report(self.store.conn(), report_id)?
            .ok_or_else(|| Error::InvalidState(format!("unknown report {}", report_id)))?;
        self.bundle_count(&OwnerFilter::Owners(vec![row.id]))
    }

    pub fn to_item(&self, row: &ItemRow) -> Result<TelemetryDataItem> {
        to_item(row)
    }

    pub fn to_bundle(&self, row: &BundleRow) -> Result<TelemetryBundle> {
        to_bundle(self.store.conn(), row)
    }

    pub fn to_report(&self, row: &ReportRow) -> Result<TelemetryReport> {
        to_report(self.store.conn(), row)
    }

    /// Every staged report, oldest first.
    pub fn reports(&self) -> Result<Vec<TelemetryReport>> {
        self.get_reports(&OwnerFilter::All)?
            .iter()
            .map(|row| self.to_report(row))
            .collect()
    }

    /// Delete a report together with its bundles and their items.
    pub fn delete_report(&mut self, report_id: &str) -> Result<bool> {
        let deleted = store::delete_report(self.store.conn(), report_id)?;
        if deleted {
            log_event!(info, processor_ctx().with("report", report_id), "REPORT_DELETED");
        }
        Ok(deleted)
    }
}

fn processor_ctx() -> LogContext {
    LogContext::component("processor")
}

/// Rebuild an item from its row and check it against the stored checksum.
fn to_item(row: &ItemRow) -> Result<TelemetryDataItem> {
    let raw = decompress(&row.uuid, &row.data)?;
    let body: Map<String, Value> = serde_json::from_slice(&raw)?;

    let item = TelemetryDataItem::assemble(
        DataItemHeader {
            id: row.uuid.clone(),
            telemetry_type: row.item_type.clone(),
            timestamp: row.timestamp.clone(),
            annotations: split_annotations(&row.annotations),
        },
        body,
    )?;
    verify_checksum("item", &row.uuid, &row.checksum, item.footer.checksum.clone())?;
    Ok(item)
}

fn to_bundle(conn: &Connection, row: &BundleRow) -> Result<TelemetryBundle> {
    let items = store::select_items(conn, &OwnerFilter::Owners(vec![row.id]))?
        .iter()
        .map(to_item)
        .collect::<Result<Vec<_>>>()?;

    let bundle = TelemetryBundle::assemble(
        BundleHeader {
            id: row.uuid.clone(),
            timestamp: row.timestamp.clone(),
            client_id: row.client_id.clone(),
            customer_id: row.customer_id.clone(),
            annotations: split_annotations(&row.annotations),
        },
        items,
    )?;
    verify_checksum("bundle", &row.uuid, &row.checksum, bundle.footer.checksum.clone())?;
    Ok(bundle)
}

fn to_report(conn: &Connection, row: &ReportRow) -> Result<TelemetryReport> {
    let bundles = store::select_bundles(conn, &OwnerFilter::Owners(vec![row.id]))?
        .iter()
        .map(|b| to_bundle(conn, b))
        .collect::<Result<Vec<_>>>()?;

    let report = TelemetryReport::assemble(
        ReportHeader {
            id: row.uuid.clone(),
            timestamp: row.timestamp.clone(),
            client_id: row.client_id.clone(),
            annotations: split_annotations(&row.annotations),
        },
        bundles,
    )?;
    verify_checksum("report", &row.uuid, &row.checksum, report.footer.checksum.clone())?;
    Ok(report)
}
