// ABOUTME: Core types and utilities shared across Berth packages
// ABOUTME: Foundational package providing the pagination cursor, error kinds and data-directory helpers

pub mod constants;
pub mod error;
pub mod pagination;

// Re-export constants
pub use constants::{berth_dir, BERTH_DIR_NAME};

pub use error::ErrorKind;

// Re-export pagination
pub use pagination::{paginate, parse_page_id, Page, DEFAULT_PAGE_LIMIT};
