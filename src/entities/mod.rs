//! Entity module - persisted bot entities.
//! Each entity declares its column mapping through [`crate::db::Entity`] and is
//! loaded and saved through an [`crate::db::EntityCache`].

pub mod guild;

pub use guild::{Guild, GuildCache};
