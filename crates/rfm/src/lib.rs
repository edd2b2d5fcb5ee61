//! RFM (Recency / Frequency / Monetary) scoring and segmentation over a
//! tenant's active customer population. Scores are a view, recomputed on
//! every run — nothing here is persisted.

pub mod engine;
pub mod segment;

pub use engine::{RfmEngine, RfmReport, RfmScore};
pub use segment::RfmSegment;
