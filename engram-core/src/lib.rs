#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_docs_in_private_items)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::float_cmp)]

//! # Engram Core
//!
//! Persistent long-term memory engine for AI assistants: chunk
//! conversational content, embed it, store it across a vector index and a
//! relational metadata store, and retrieve semantically similar prior
//! context with time decay and project/session scoping.
//!
//! ## Core Concepts
//!
//! - **Chunks**: atomic memory units with content, summary, tags, and an
//!   embedding of their project's fixed dimension
//! - **Sessions**: bounded activity windows; all writes are session-scoped
//! - **Patterns**: recurring signatures mined from chunks, confidence-scored
//! - **Conflicts**: detected contradictions between decisions or solutions
//!
//! ## Module Organization
//!
//! ### Primary APIs
//! - [`engine`]: store / retrieve / update / delete orchestration
//! - [`intelligence`]: pattern mining, conflicts, decay, suggestions
//! - [`chunker`]: emission triggers and content shaping
//! - [`embeddings`]: providers, caching, and fault-tolerant generation
//!
//! ### Support Modules
//! - [`types`]: common data model
//! - [`metadata`] / [`vector`]: the two storage surfaces
//! - [`reliability`]: retry, circuit breakers, connection pools
//! - [`events`] / [`session`] / [`audit`] / [`health`]: ambient services
//!
//! ## Quick Start
//!
//! ```no_run
//! use engram_core::audit::AuditLogger;
//! use engram_core::config::EngramConfig;
//! use engram_core::embeddings::EmbeddingService;
//! use engram_core::engine::{MemoryEngine, OpContext, RetrieveRequest};
//! use engram_core::events::EventBus;
//! use engram_core::metadata::MemoryMetadataStore;
//! use engram_core::reliability::{Dependency, ReliabilityManager};
//! use engram_core::types::{ChunkInput, ChunkType};
//! use engram_core::vector::InMemoryVectorIndex;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> engram_core::Result<()> {
//!     let config = EngramConfig::default();
//!     let reliability = Arc::new(ReliabilityManager::new(&config.reliability));
//!     let embeddings = Arc::new(EmbeddingService::from_settings(
//!         &config.embedding,
//!         reliability.breaker(Dependency::Embedding),
//!         reliability.retry_config(),
//!     ));
//!     let engine = MemoryEngine::new(
//!         config,
//!         embeddings,
//!         Arc::new(InMemoryVectorIndex::new()),
//!         Arc::new(MemoryMetadataStore::new()),
//!         EventBus::default(),
//!         reliability,
//!         AuditLogger::disabled(),
//!     );
//!
//!     let ctx = OpContext::new();
//!     let stored = engine
//!         .store(
//!             ChunkInput {
//!                 project_id: "acme/api".into(),
//!                 session_id: Some("s1".into()),
//!                 chunk_type: ChunkType::Solution,
//!                 content: "Use connection pooling for database access".into(),
//!                 summary: None,
//!                 tags: vec!["db".into()],
//!                 outcome: Default::default(),
//!                 difficulty: Default::default(),
//!                 supersedes: None,
//!                 visibility: Default::default(),
//!             },
//!             &ctx,
//!         )
//!         .await?;
//!     println!("stored {} chunk(s)", stored.chunk_ids.len());
//!
//!     let results = engine
//!         .retrieve(
//!             RetrieveRequest {
//!                 project_id: "acme/api".into(),
//!                 query: "database pooling".into(),
//!                 k: 5,
//!                 ..Default::default()
//!             },
//!             &ctx,
//!         )
//!         .await?;
//!     println!("found {} chunk(s)", results.items.len());
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod chunker;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod events;
pub mod health;
pub mod intelligence;
pub mod metadata;
pub mod reliability;
pub mod session;
pub mod types;
pub mod vector;

// Re-export commonly used types
pub use chunker::{ChunkDraft, Chunker, Emission, EmitTrigger, FlowContext, FlowPhase};
pub use config::EngramConfig;
pub use embeddings::{EmbeddingProvider, EmbeddingService, HashEmbedder, MockProvider};
pub use engine::{
    MemoryEngine, OpContext, RankedChunk, RetrieveRequest, RetrieveResult, StoreResult,
};
pub use error::{Error, Result};
pub use events::{EventBus, MemoryEvent};
pub use health::{ComponentHealth, SystemHealth};
pub use intelligence::IntelligenceService;
pub use metadata::{MemoryMetadataStore, MetadataFilter, MetadataStore};
pub use reliability::{CircuitBreaker, Dependency, ReliabilityManager};
pub use session::SessionManager;
pub use types::{
    Chunk, ChunkDelta, ChunkInput, ChunkType, ConflictRecord, ConflictSeverity, Difficulty,
    Outcome, Pattern, Project, Provenance, Scope, Session, SessionStatus, Visibility,
};
pub use vector::{Filter, InMemoryVectorIndex, ResilientVectorStore, VectorStore};
