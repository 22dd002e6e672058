//! PIL 文献结构-性质提取流水线。

pub mod aggregator;
pub mod extractor;
pub mod field;
pub mod filter;
pub mod integrator;
pub mod merge;
pub mod processor;
pub mod schema;

pub use aggregator::CorpusAggregator;
pub use processor::DocumentProcessor;
