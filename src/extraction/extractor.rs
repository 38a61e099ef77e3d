//! Report extraction.
//!
//! Walks a received report back down the staging hierarchy:
//! 1. `add_report` stores the report under its id
//! 2. `report_to_bundles` stores every bundle of every staged report
//! 3. `bundles_to_items` stores every item of every staged bundle
//!
//! A parent is deleted only once all of its children are stored. A parent
//! that cannot be decoded or verified stays in place for a later run, and
//! children already stored from other parents are kept.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::ExtractionConfig;
use crate::error::Result;
use crate::kvstore::{open_store, KeyValueStore};
use crate::logging::structured::LogContext;
use crate::log_event;
use crate::staging::{TelemetryBundle, TelemetryDataItem, TelemetryReport};

/// Outcome of one extraction pass.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ExtractionSummary {
    /// Parents fully unpacked and deleted.
    pub extracted: usize,
    /// Children written.
    pub produced: usize,
    /// Parents left in place, with the reason.
    pub failed: Vec<(String, String)>,
}

impl ExtractionSummary {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Unpacks reports into bundles and bundles into items.
pub struct Extractor {
    items: Box<dyn KeyValueStore>,
    bundles: Box<dyn KeyValueStore>,
    reports: Box<dyn KeyValueStore>,
}

impl Extractor {
    pub fn open(config: &ExtractionConfig) -> Result<Self> {
        Ok(Self {
            items: open_store(&config.items)?,
            bundles: open_store(&config.bundles)?,
            reports: open_store(&config.reports)?,
        })
    }

    /// Build an extractor over already opened stores.
    pub fn with_stores(
        items: Box<dyn KeyValueStore>,
        bundles: Box<dyn KeyValueStore>,
        reports: Box<dyn KeyValueStore>,
    ) -> Self {
        Self {
            items,
            bundles,
            reports,
        }
    }

    /// Verify a received report and stage it under its id.
    pub fn add_report(&self, report: &TelemetryReport) -> Result<()> {
        report.validate()?;
        self.reports.add(report.id(), &serde_json::to_vec(report)?)?;

        let ctx = LogContext::client(&report.header.client_id).with_report(report.id());
        log_event!(
            info,
            ctx,
            "REPORT_RECEIVED",
            bundles = report.body.len(),
            items = report.item_count()
        );
        Ok(())
    }

    pub fn report_to_bundles(&self) -> Result<ExtractionSummary> {
        unpack(
            self.reports.as_ref(),
            self.bundles.as_ref(),
            |report: TelemetryReport| {
                report.validate()?;
                Ok(report.body)
            },
            TelemetryBundle::id,
        )
    }

    pub fn bundles_to_items(&self) -> Result<ExtractionSummary> {
        unpack(
            self.bundles.as_ref(),
            self.items.as_ref(),
            |bundle: TelemetryBundle| {
                bundle.validate()?;
                Ok(bundle.body)
            },
            TelemetryDataItem::id,
        )
    }

    /// Every extracted item currently staged.
    pub fn items(&self) -> Result<Vec<TelemetryDataItem>> {
        self.items
            .list()?
            .iter()
            .map(|key| -> Result<TelemetryDataItem> {
                Ok(serde_json::from_slice(&self.items.get(key)?)?)
            })
            .collect()
    }

    pub fn report_keys(&self) -> Result<Vec<String>> {
        self.reports.list()
    }

    pub fn bundle_keys(&self) -> Result<Vec<String>> {
        self.bundles.list()
    }
}

/// Unpack every entry of `parents` one level into `children`.
fn unpack<P, C>(
    parents: &dyn KeyValueStore,
    children: &dyn KeyValueStore,
    split: impl Fn(P) -> Result<Vec<C>>,
    child_key: impl Fn(&C) -> &str,
) -> Result<ExtractionSummary>
where
    P: DeserializeOwned,
    C: Serialize,
{
    let mut summary = ExtractionSummary::default();

    let ctx = LogContext::component("extraction").with("store", children.driver());
    for key in parents.list()? {
        let outcome = parents
            .get(&key)
            .and_then(|raw| Ok(serde_json::from_slice::<P>(&raw)?))
            .and_then(&split)
            .and_then(|entries| store_children(children, &entries, &child_key));

        match outcome {
            Ok(written) => {
                parents.delete(&key)?;
                summary.extracted += 1;
                summary.produced += written;
                log_event!(debug, ctx, "EXTRACTED", parent = key, children = written);
            }
            Err(e) => {
                log_event!(warn, ctx, "EXTRACTION_FAILED", parent = key, error = e);
                summary.failed.push((key, e.to_string()));
            }
        }
    }

    log_event!(
        info,
        ctx,
        "EXTRACTION_COMPLETE",
        extracted = summary.extracted,
        produced = summary.produced,
        failed = summary.failed.len()
    );
    Ok(summary)
}

fn store_children<C: Serialize>(
    children: &dyn KeyValueStore,
    entries: &[C],
    child_key: impl Fn(&C) -> &str,
) -> Result<usize> {
    for entry in entries {
        children.add(child_key(entry), &serde_json::to_vec(entry)?)?;
    }
    Ok(entries.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kvstore::MemoryStore;
    use crate::staging::{BundleHeader, ReportHeader};
    use crate::validation::tags::TelemetryType;
    use serde_json::{json, Value};

    fn extractor() -> Extractor {
        Extractor::with_stores(
            Box::new(MemoryStore::new()),
            Box::new(MemoryStore::new()),
            Box::new(MemoryStore::new()),
        )
    }

    fn item(n: u64) -> TelemetryDataItem {
        let body = json!({"version": 1, "n": n}).as_object().cloned().unwrap();
        TelemetryDataItem::new(&TelemetryType::parse("SLE-SERVER-Test").unwrap(), body, &[])
            .unwrap()
    }

    fn bundle(items: Vec<TelemetryDataItem>) -> TelemetryBundle {
        TelemetryBundle::assemble(BundleHeader::new("client", "0", vec![]), items).unwrap()
    }

    fn report(bundles: Vec<TelemetryBundle>) -> TelemetryReport {
        TelemetryReport::assemble(ReportHeader::new("client", vec![]), bundles).unwrap()
    }

    #[test]
    fn test_full_extraction() {
        let ex = extractor();
        ex.add_report(&report(vec![bundle(vec![item(1), item(2)]), bundle(vec![item(3)])]))
            .unwrap();

        let bundles = ex.report_to_bundles().unwrap();
        assert_eq!(bundles.extracted, 1);
        assert_eq!(bundles.produced, 2);
        assert!(ex.report_keys().unwrap().is_empty());

        let items = ex.bundles_to_items().unwrap();
        assert_eq!(items.extracted, 2);
        assert_eq!(items.produced, 3);
        assert!(ex.bundle_keys().unwrap().is_empty());

        let mut seen: Vec<Value> = ex
            .items()
            .unwrap()
            .into_iter()
            .map(|i| i.body["n"].clone())
            .collect();
        seen.sort_by_key(|v| v.as_u64());
        assert_eq!(seen, vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn test_tampered_report_rejected_on_add() {
        let ex = extractor();
        let mut r = report(vec![bundle(vec![item(1)])]);
        r.header.client_id = "someone-else".to_string();
        assert!(ex.add_report(&r).is_err());
        assert!(ex.report_keys().unwrap().is_empty());
    }

    #[test]
    fn test_undecodable_report_kept_and_siblings_extracted() {
        let ex = extractor();
        let good = report(vec![bundle(vec![item(1)])]);
        ex.add_report(&good).unwrap();
        ex.reports.add("broken", b"{not json").unwrap();

        let summary = ex.report_to_bundles().unwrap();
        assert_eq!(summary.extracted, 1);
        assert_eq!(summary.produced, 1);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "broken");
        assert!(!summary.is_clean());

        assert_eq!(ex.report_keys().unwrap(), vec!["broken"]);
        assert_eq!(ex.bundle_keys().unwrap(), vec![good.body[0].id().to_string()]);
    }

    #[test]
    fn test_corrupt_bundle_left_for_retry() {
        let ex = extractor();
        let mut b = bundle(vec![item(7)]);
        b.footer.checksum = "0".repeat(64);
        ex.bundles.add(b.id(), &serde_json::to_vec(&b).unwrap()).unwrap();

        let summary = ex.bundles_to_items().unwrap();
        assert_eq!(summary.extracted, 0);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(ex.bundle_keys().unwrap(), vec![b.id().to_string()]);
        assert!(ex.items().unwrap().is_empty());
    }

    #[test]
    fn test_open_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExtractionConfig {
            items: crate::config::DataStoreConfig::memory(),
            bundles: crate::config::DataStoreConfig::new(
                "file",
                dir.path().join("bundles").to_str().unwrap(),
            ),
            reports: crate::config::DataStoreConfig::sqlite_in_memory(),
        };
        let ex = Extractor::open(&config).unwrap();
        ex.add_report(&report(vec![bundle(vec![item(1)])])).unwrap();
        assert_eq!(ex.report_to_bundles().unwrap().produced, 1);
        assert_eq!(ex.bundles_to_items().unwrap().produced, 1);
        assert_eq!(ex.items().unwrap().len(), 1);
    }
}
