//! Status enums for cart line items.

use serde::{Deserialize, Serialize};

/// An in-flight mutation on one cart line item.
///
/// At most one pending operation exists per product at a time; a line item
/// with no entry is idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PendingOperation {
    /// Merge-on-add in progress.
    Adding,
    /// Direct quantity overwrite in progress.
    Updating {
        /// Quantity being written.
        target: u32,
    },
    /// Removal in progress.
    Removing,
}

impl std::fmt::Display for PendingOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Adding => write!(f, "adding"),
            Self::Updating { target } => write!(f, "updating to {target}"),
            Self::Removing => write!(f, "removing"),
        }
    }
}
