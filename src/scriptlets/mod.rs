//! Concrete scriptlet variants.
//!
//! Scriptlets discovered from an upgrade directory are declarative
//! configuration edits; programmatic scriptlets implement
//! [`crate::scriptlet::Scriptlet`] directly and are added to a
//! [`crate::catalog::Catalog`] by hand.

pub mod config_edit;

pub use config_edit::{ConfigEditDefinition, ConfigEditScriptlet, ConfigEdits, InstanceEdits};
