//! Discord command implementations organized by category.

#![allow(clippy::too_long_first_doc_paragraph)]

/// Owner-only maintenance commands
pub mod developer;

/// General utility commands
pub mod general;

/// Per-guild settings commands
pub mod guild;

// Export commands
pub use developer::*;
pub use general::*;
pub use guild::*;
