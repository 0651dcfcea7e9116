//! confshift document trees
//!
//! Addressable, mutable YAML-shaped documents for configuration migrations.
//!
//! # Core Concepts
//!
//! - [`Tree`]: tagged union of maps, lists and scalars
//! - [`Selector`]: parsed path such as `.foo."weird key".[2]`
//! - [`resolve`]: walks a tree to a concrete [`Location`]
//! - [`TreeNode`]: working copy of one location with map/list-aware edits
//! - [`drop_empty`] / [`mask_values`]: post-processing applied on save
//! - [`TreeDigest`]: content digest for before/after reporting
//!
//! # Example
//!
//! ```rust
//! use confshift_tree::{Tree, TreeNode};
//!
//! let mut tree = Tree::from_yaml_str("foo:\n  bar: [element1]\n").unwrap();
//! let mut node = TreeNode::resolve(&tree, ".foo.bar.[0]").unwrap();
//! node.set("x");
//! node.sync_into(&mut tree).unwrap();
//! assert_eq!(tree.select(".foo.bar.[0]").unwrap(), &Tree::from("x"));
//! ```

#![warn(unreachable_pub)]

mod digest;
mod error;
mod node;
mod selector;
mod transform;
mod value;

pub use digest::TreeDigest;
pub use error::{Result, TreeError};
pub use node::{Key, RemoveKey, TreeNode, ValueKind};
pub use selector::{resolve, Location, Selector, Step};
pub use transform::{drop_empty, mask_values, MASK};
pub use value::{Map, Tree};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
