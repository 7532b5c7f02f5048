//! # Settings
//!
//! Tunable session behaviour. Every field has a default, so an empty
//! configuration document is valid.

use crate::primitives::{DEFAULT_TRANSACTION_GROUP_LIMIT, UNBOUNDED_DEPTH};
use serde::{Deserialize, Serialize};

/// Session and store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Default activation depth for loads. Absent means unbounded.
    pub activation_depth: Option<u32>,
    /// Whether properties are indexed when a field does not say.
    pub index_by_default: bool,
    /// Partition groups one transaction may touch.
    pub transaction_group_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            activation_depth: None,
            index_by_default: true,
            transaction_group_limit: DEFAULT_TRANSACTION_GROUP_LIMIT,
        }
    }
}

impl Settings {
    /// The activation depth as a controller bound.
    #[must_use]
    pub fn depth_bound(&self) -> u32 {
        self.activation_depth.unwrap_or(UNBOUNDED_DEPTH)
    }
}
