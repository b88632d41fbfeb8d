use crate::cluster::Member;

use std::fmt::{Display, Formatter};

/// Capability that bootstraps the initial peer set. Implementations return
/// the full current topology on every call; the membership layer diffs
/// consecutive snapshots into join/leave events.
///
/// The static list below ships in-tree; DNS and Kubernetes-label providers
/// are external plug-ins built on the published
/// [`labels`](crate::cluster::labels).
#[async_trait]
pub trait SeedNodeDiscovery: Send + Sync {
    async fn discover(&self) -> Result<Vec<Member>, DiscoveryErr>;
}

#[derive(Debug, Clone)]
pub struct DiscoveryErr {
    message: String,
}

impl DiscoveryErr {
    pub fn new(message: impl Into<String>) -> DiscoveryErr {
        DiscoveryErr {
            message: message.into(),
        }
    }
}

impl Display for DiscoveryErr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for DiscoveryErr {}

/// Fixed seed list, for static deployments and tests.
pub struct StaticSeedDiscovery {
    members: Vec<Member>,
}

impl StaticSeedDiscovery {
    pub fn new(members: Vec<Member>) -> StaticSeedDiscovery {
        StaticSeedDiscovery { members }
    }
}

#[async_trait]
impl SeedNodeDiscovery for StaticSeedDiscovery {
    async fn discover(&self) -> Result<Vec<Member>, DiscoveryErr> {
        Ok(self.members.clone())
    }
}
