//! Resource abstraction layer
//!
//! Resource schemas are data, not code. Definitions are loaded from JSON
//! files at compile time, so a new sub-resource or manager object is a
//! JSON edit rather than a new module.
//!
//! # Resource Definitions
//!
//! Resources are defined in JSON files under `src/resources/`:
//! - `policy.json` - Policy API trees (Tier-0, Tier-1, segments) with their
//!   sub-resources, field allow-lists and reference rules
//! - `manager.json` - flat Manager API resources (IP pools, transport zones,
//!   host-switch profiles, transport nodes, ...)
//!
//! # Example
//!
//! ```ignore
//! use vmstate::resource::get_tree;
//!
//! let tier0 = get_tree("tier0").unwrap();
//! for child in tier0.root.ordered_children() {
//!     println!("{}", child.identifier);
//! }
//! ```

mod registry;

pub use registry::*;
