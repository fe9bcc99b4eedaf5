use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::fixture::Dataset;
use crate::store::{RecordStore, StoreError};

pub const SEEDED_MESSAGE: &str = "Sample data seeded successfully";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeedReport {
    pub message: String,
    pub count: usize,
    pub version: String,
    pub fingerprint: String,
}

/// A write failed partway through. Records written before it stay in place.
#[derive(Error, Debug)]
#[error("Seeding stopped at {product_id} after {written} writes: {source}")]
pub struct SeedError {
    pub product_id: String,
    pub written: usize,
    #[source]
    pub source: StoreError,
}

/// Writes every product in `dataset`, in order, stamped with `at`.
pub fn seed(store: &dyn RecordStore, dataset: &Dataset, at: DateTime<Utc>) -> Result<SeedReport, SeedError> {
    info!(version = %dataset.version, count = dataset.len(), "Starting data seeding");

    for (written, entry) in dataset.products.iter().enumerate() {
        store.put(&entry.stamp(at)).map_err(|source| {
            error!(product_id = %entry.product_id, written, error = %source, "Error seeding data");
            SeedError {
                product_id: entry.product_id.clone(),
                written,
                source,
            }
        })?;
        info!(product_id = %entry.product_id, "Inserted product");
    }

    info!("Data seeding completed successfully");
    Ok(SeedReport {
        message: SEEDED_MESSAGE.to_string(),
        count: dataset.len(),
        version: dataset.version.clone(),
        fingerprint: dataset.fingerprint.clone(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::product::Product;
    use crate::store::{MemoryStore, ProductScan, SledStore};

    fn all(store: &dyn RecordStore) -> Vec<Product> {
        let mut rows: Vec<Product> = store.scan_all().unwrap().map(Result::unwrap).collect();
        rows.sort_by(|a, b| a.product_id.cmp(&b.product_id));
        rows
    }

    /// Accepts `budget` writes, then reports the backend as unavailable.
    struct FlakyStore {
        inner: MemoryStore,
        budget: usize,
        writes: AtomicUsize,
    }

    impl RecordStore for FlakyStore {
        fn put(&self, record: &Product) -> Result<(), StoreError> {
            if self.writes.fetch_add(1, Ordering::SeqCst) >= self.budget {
                return Err(StoreError::Unavailable("throttled".into()));
            }
            self.inner.put(record)
        }

        fn get(&self, product_id: &str) -> Result<Option<Product>, StoreError> {
            self.inner.get(product_id)
        }

        fn scan_all(&self) -> Result<ProductScan<'_>, StoreError> {
            self.inner.scan_all()
        }
    }

    #[test]
    fn seeds_every_product_with_one_timestamp() {
        let store = SledStore::temporary("products").unwrap();
        let dataset = Dataset::builtin().unwrap();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let report = seed(&store, &dataset, at).unwrap();
        assert_eq!(report.message, SEEDED_MESSAGE);
        assert_eq!(report.count, 5);
        assert_eq!(report.version, "v1");
        assert_eq!(report.fingerprint, dataset.fingerprint);

        let rows = all(&store);
        assert_eq!(rows.len(), 5);
        for row in &rows {
            assert_eq!(row.created_at, "2024-05-01T12:00:00.000Z");
            assert_eq!(row.updated_at, row.created_at);
        }
    }

    #[test]
    fn seeded_records_round_trip_through_get() {
        let store = MemoryStore::new();
        let dataset = Dataset::builtin().unwrap();
        let at = Utc::now();
        seed(&store, &dataset, at).unwrap();

        for entry in &dataset.products {
            let stored = store.get(&entry.product_id).unwrap().unwrap();
            assert_eq!(stored, entry.stamp(at));
        }
    }

    #[test]
    fn reseeding_overwrites_with_fresh_timestamps() {
        let store = MemoryStore::new();
        let dataset = Dataset::builtin().unwrap();
        let first = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let second = first + Duration::minutes(10);

        seed(&store, &dataset, first).unwrap();
        let before = all(&store);
        seed(&store, &dataset, second).unwrap();
        let after = all(&store);

        assert_eq!(after.len(), 5);
        for (old, new) in before.iter().zip(&after) {
            assert_eq!(old.product_id, new.product_id);
            assert_eq!(old.product_name, new.product_name);
            assert_eq!(old.specifications, new.specifications);
            assert_eq!(new.created_at, "2024-05-01T12:10:00.000Z");
            assert_ne!(old.updated_at, new.updated_at);
        }
    }

    #[test]
    fn failure_aborts_remaining_writes_without_rollback() {
        let store = FlakyStore {
            inner: MemoryStore::new(),
            budget: 2,
            writes: AtomicUsize::new(0),
        };
        let dataset = Dataset::builtin().unwrap();

        let err = seed(&store, &dataset, Utc::now()).unwrap_err();
        assert_eq!(err.product_id, "prod-003");
        assert_eq!(err.written, 2);
        assert!(err.to_string().contains("throttled"));

        // Two good writes kept, one failed, two never attempted.
        assert_eq!(store.writes.load(Ordering::SeqCst), 3);
        let ids: Vec<String> = all(&store).into_iter().map(|p| p.product_id).collect();
        assert_eq!(ids, vec!["prod-001", "prod-002"]);
    }

    #[test]
    fn seeds_arbitrary_datasets() {
        let store = MemoryStore::new();
        let builtin = Dataset::builtin().unwrap();
        let laptops: Vec<_> = builtin
            .products
            .into_iter()
            .filter(|p| p.category == "Computers")
            .collect();
        let dataset = Dataset::new("laptops-only", laptops).unwrap();

        let report = seed(&store, &dataset, Utc::now()).unwrap();
        assert_eq!(report.count, 2);
        assert_eq!(report.version, "laptops-only");
        assert!(store.get("prod-002").unwrap().is_some());
        assert!(store.get("prod-001").unwrap().is_none());
    }
}
