// error and configuration
pub mod error;
pub mod config;

// data module
pub mod data {
    pub mod peak;
    pub mod spectrum;
    pub mod cluster;
}

// algorithm module
pub mod algorithm {
    pub mod filter;
    pub mod consensus;
}

// similarity module
pub mod similarity {
    pub mod matching;
    pub mod checker;
    pub mod fisher;
    pub mod combined;
    pub mod dot_product;
    pub mod cdf;
}

// engine module
pub mod engine {
    pub mod traits;
    pub mod greedy;
    pub mod batch;
    pub mod factory;
}

pub mod pipeline;

pub use error::{Error, Result};
pub use config::{ClusteringParams, SimilarityKind};
pub use data::peak::Peak;
pub use data::spectrum::Spectrum;
pub use data::cluster::{Cluster, ClusterComparator, MzThenIdComparator};
pub use engine::traits::{ClusteringEngine, IncrementalClusteringEngine};
pub use engine::greedy::GreedyIncrementalClusteringEngine;
pub use engine::batch::BatchClusteringEngine;
