//! # Composition
//!
//! Derives composed (child) resources from a composite resource.
//!
//! - `fieldpath.rs` - Field path parsing and JSON tree access
//! - `patch.rs` - Patch rules and value transforms
//! - `template.rs` - Composed resource templates
//! - `composed.rs` - Per-child reconciliation (instantiate, patch, apply, harvest)

pub mod composed;
pub mod fieldpath;
pub mod patch;
pub mod template;

pub use composed::{filter_connection_details, ComposedReconciler, Observation};
pub use patch::{apply_patches, Patch, PatchError, Transform, TransformType};
pub use template::{ComposedTemplate, ConnectionDetail};
