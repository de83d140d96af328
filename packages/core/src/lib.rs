// ABOUTME: Core types, traits, and utilities for Vantage
// ABOUTME: Foundational package providing shared functionality across all Vantage packages

pub mod constants;
pub mod context;
pub mod ids;
pub mod validation;

// Re-export main types
pub use context::{Actor, ActorKind, RequestContext};

// Re-export constants
pub use constants::{database_file, vantage_dir};

// Re-export utilities
pub use ids::generate_id;

// Re-export validation
pub use validation::{
    require_email_shape, require_non_empty, require_unit_range, truncate, ValidationError,
};
