//! Regulatory knowledge base for tpforge.
//!
//! Holds chunks of transfer-pricing regulation text and implements the
//! `Retriever` capability over them: keyword ranking by default, or keyword
//! and embedding rankings fused with reciprocal rank fusion.

pub mod base;
pub mod chunk;
pub mod keyword;
pub mod vector;

pub use base::{KnowledgeBase, SearchMode};
pub use chunk::{KnowledgeChunk, load_dir};
pub use vector::{cosine_similarity, reciprocal_rank_fusion};
