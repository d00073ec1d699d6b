//! Authentication realms

use serde::{Deserialize, Serialize};

use crate::impl_label_conversions;

/// One of the two independent authentication domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Realm {
    /// The data catalog API
    Primary,
    /// The job orchestration API
    Orchestration,
}

impl_label_conversions!(Realm {
    Primary => "primary",
    Orchestration => "orchestration",
});

impl Realm {
    pub const ALL: [Self; 2] = [Self::Primary, Self::Orchestration];
}
