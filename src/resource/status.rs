//! Local status of a cached resource.

use serde::Serialize;
use std::fmt;

/// Status of a resource as seen by the local cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceStatus {
    /// Referenced locally but never loaded.
    #[default]
    Unknown,
    /// A remote fetch is in flight.
    Loading,
    /// Loaded and present remotely.
    Ok,
    /// A create call is in flight.
    Creating,
    /// A restart call is in flight.
    Restarting,
    /// A delete call is in flight.
    Deleting,
    /// An update call is in flight.
    Updating,
    /// The last remote call for this resource failed.
    Error,
    /// Confirmed missing remotely.
    NotExist,
}

impl ResourceStatus {
    /// Returns true while a mutating remote call is outstanding.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Creating | Self::Restarting | Self::Deleting | Self::Updating
        )
    }

    /// Returns true if the status says the resource exists remotely.
    #[must_use]
    pub const fn is_present(self) -> bool {
        !matches!(self, Self::Unknown | Self::NotExist)
    }

    /// Returns the upper-case label of this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Loading => "LOADING",
            Self::Ok => "OK",
            Self::Creating => "CREATING",
            Self::Restarting => "RESTARTING",
            Self::Deleting => "DELETING",
            Self::Updating => "UPDATING",
            Self::Error => "ERROR",
            Self::NotExist => "NOT_EXIST",
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
