//! Resource state model
//!
//! Availability and instance status as reported by the IaaS API, plus the
//! `Resource` accessor trait the poller and the setup engine work against.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Resource ID as issued by the API. `0` means "not assigned".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub u64);

impl ResourceId {
    pub const EMPTY: ResourceId = ResourceId(0);

    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ResourceId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Lifecycle state of a resource on the platform
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    #[default]
    Unknown,
    /// Being copied from a source archive or disk
    Migrating,
    /// Receiving an upload
    Uploading,
    /// Being transferred between zones
    Transferring,
    Discontinued,
    Available,
    Failed,
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Availability::Failed)
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Availability::Unknown => write!(f, "unknown"),
            Availability::Migrating => write!(f, "migrating"),
            Availability::Uploading => write!(f, "uploading"),
            Availability::Transferring => write!(f, "transferring"),
            Availability::Discontinued => write!(f, "discontinued"),
            Availability::Available => write!(f, "available"),
            Availability::Failed => write!(f, "failed"),
        }
    }
}

/// Power state of a bootable resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    #[default]
    Unknown,
    Cleaning,
    Down,
    Up,
}

impl InstanceStatus {
    pub fn is_up(&self) -> bool {
        matches!(self, InstanceStatus::Up)
    }

    pub fn is_down(&self) -> bool {
        matches!(self, InstanceStatus::Down)
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceStatus::Unknown => write!(f, "unknown"),
            InstanceStatus::Cleaning => write!(f, "cleaning"),
            InstanceStatus::Down => write!(f, "down"),
            InstanceStatus::Up => write!(f, "up"),
        }
    }
}

/// Accessors every pollable resource snapshot provides.
///
/// Resources without a lifecycle or power state return `None` for the
/// corresponding accessor; the poller then judges the other dimension only.
pub trait Resource {
    fn id(&self) -> ResourceId;

    fn availability(&self) -> Option<Availability> {
        None
    }

    fn instance_status(&self) -> Option<InstanceStatus> {
        None
    }
}

/// Set of states used as a poll target or pending partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSet<T> {
    states: Vec<T>,
}

impl<T: PartialEq + Copy> StateSet<T> {
    pub fn new(states: impl IntoIterator<Item = T>) -> Self {
        Self {
            states: states.into_iter().collect(),
        }
    }

    pub fn empty() -> Self {
        Self { states: Vec::new() }
    }

    pub fn contains(&self, state: T) -> bool {
        self.states.contains(&state)
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.states.iter()
    }
}

impl<T: PartialEq + Copy> Default for StateSet<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: PartialEq + Copy> FromIterator<T> for StateSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter)
    }
}
