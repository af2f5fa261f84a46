pub mod golden_record;
pub mod store;

pub use golden_record::{build_golden_record, build_golden_records, golden_id};
pub use store::{GoldenRecordStore, GoldenSnapshot, SnapshotInfo};
