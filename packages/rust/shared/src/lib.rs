//! Shared types, error model, and configuration for policytag.
//!
//! This crate is the foundation depended on by all other policytag crates.
//! It provides:
//! - [`PolicyTagError`]: the unified error type
//! - Domain types ([`PageDocument`], [`EnrichedPage`], [`Chunk`], [`Tag`])
//! - Closed label sets ([`ClauseType`], [`RiskDomain`], [`LabelSet`])
//! - Configuration ([`AppConfig`], config loading, credential lookup)
//! - The product lookup table ([`ProductTable`], [`Insurer`])

pub mod config;
pub mod error;
pub mod labels;
pub mod products;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CACHE_MAX_ENV, DefaultsConfig, PageFormat, TaggingConfig, UpstageConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from, require_api_key,
    resolve_api_key, validate_config,
};
pub use error::{PolicyTagError, Result};
pub use labels::{
    ClauseType, LabelSet, LlmPolicy, MAX_NOTE_CHARS, RiskDomain, Tag, TagMethod,
    normalize_domains, truncate_chars,
};
pub use products::{Insurer, ProductEntry, ProductTable, default_products, parse_file_identifiers};
pub use types::{
    Chunk, DOC_TYPE_TERMS, DocInfo, EnrichedPage, PageDocument, PageMetadata, TermRanges, TermType,
};
