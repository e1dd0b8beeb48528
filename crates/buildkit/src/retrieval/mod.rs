//! Source retrieval: from a resolved bundle to a populated buildspace tree.

mod pipeline;
mod target;

pub use pipeline::{
    retrieve_and_extract, RetrievalOptions, RetrievalReport, SourceRetriever, TargetReport,
};
pub use target::{retrieval_targets, RetrievalTarget, MAIN_SOURCE_NAME};
