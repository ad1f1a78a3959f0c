//! Dataset identifiers and the active-dataset selection

use crate::SyncError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the fixed datasets served by the heatmap server
///
/// The declaration order matches the server's dataset index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetId {
    Ro,
    Ch,
    At,
    De,
}

impl DatasetId {
    pub fn all() -> &'static [Self] {
        &[Self::Ro, Self::Ch, Self::At, Self::De]
    }

    /// Short name used on the wire
    pub fn short_name(&self) -> &'static str {
        match self {
            Self::Ro => "ro",
            Self::Ch => "ch",
            Self::At => "at",
            Self::De => "de",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Ro => "Romania",
            Self::Ch => "Switzerland",
            Self::At => "Austria",
            Self::De => "Germany",
        }
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for DatasetId {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|id| id.short_name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SyncError::UnknownDataset(s.to_string()))
    }
}

/// The single active dataset plus its one-shot centering flag
///
/// `centering_pending` is set on every activation and cleared by the first
/// successful fetch that centers the map on the returned data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSelection {
    active: DatasetId,
    centering_pending: bool,
}

impl DatasetSelection {
    pub fn new(initial: DatasetId) -> Self {
        Self {
            active: initial,
            centering_pending: true,
        }
    }

    #[inline]
    pub fn active(&self) -> DatasetId {
        self.active
    }

    #[inline]
    pub fn centering_pending(&self) -> bool {
        self.centering_pending
    }

    /// Activate `id`, re-arming centering even when it is already active
    pub fn switch(&mut self, id: DatasetId) {
        if id != self.active {
            tracing::info!("Changing dataset from {} to {}", self.active, id);
        }
        self.active = id;
        self.centering_pending = true;
    }

    /// Consume the centering flag
    pub fn take_centering(&mut self) -> bool {
        std::mem::replace(&mut self.centering_pending, false)
    }
}
