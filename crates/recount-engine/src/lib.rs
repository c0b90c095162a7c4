// Analysis engine: pricing, the analyzer suite, and the pure parts of
// smart-recap generation. Everything here is CPU-only; I/O belongs to the
// runtime and store crates.

pub mod analyze;
pub mod pricing;
pub mod recap;

mod compute;

pub use compute::{ComputeResult, compute_from_file_collection, compute_from_jsonl};
pub use pricing::{ModelPricing, cost, model_family, pricing_for, total_cost};
