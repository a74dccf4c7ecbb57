//! Starling Storage
//!
//! `SQLite` persistence layer for Starling's starred-repository mirror.
//!
//! # Architecture
//!
//! - **Vertical Slicing**: each concern owns its own queries and logic
//!   (`repos`, `history`, `conflicts`, `settings`)
//! - **Field Ownership**: remote-owned and local-owned repo columns are
//!   written through separate functions, so the sync engine can never clobber
//!   user annotations
//! - **Embedded Migrations**: schema ships with the binary and is applied at
//!   startup
//!
//! # Example
//!
//! ```rust,no_run
//! use starling_storage::{create_pool, run_migrations};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = create_pool("sqlite://starling.db").await?;
//! run_migrations(&pool).await?;
//!
//! let repos = starling_storage::repos::list_all(&pool).await?;
//! # Ok(())
//! # }
//! ```

mod database;
mod error;

// Vertical slices
pub mod conflicts;
pub mod history;
pub mod repos;
pub mod settings;

pub use database::{create_pool, run_migrations};
pub use error::{Result, StorageError};
