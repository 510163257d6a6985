//! Receipt ingestion: upload, vision extraction, and the month's expense recompute.

pub mod extractor;
pub mod pipeline;

pub use extractor::{ReceiptExtractor, VisionReceiptExtractor};
pub use pipeline::{
    delete_receipt, BatchProgress, BatchReport, ReceiptJob, ReceiptPipeline, RecomputeStatus,
    Rejection,
};
