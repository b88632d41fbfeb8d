use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Address used by actor systems that have no remote listener. Processes
/// registered under it are only reachable in-process.
pub const NONHOST_ADDRESS: &str = "nonhost";

/// Reserved address prefix for client identities - peers that connect
/// outbound only and have no stable `host:port` of their own.
pub const CLIENT_ADDRESS_PREFIX: &str = "$client";

lazy_static! {
    pub(crate) static ref NONHOST: Arc<str> = NONHOST_ADDRESS.into();
}

/// Routing token for a single process: a logical host address plus the
/// process id unique within that host.
///
/// Two pids are equal iff address and id are equal - `request_id` is
/// correlation state for in-flight request/response pairs and does not
/// contribute to identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pid {
    pub address: Arc<str>,
    pub id: Arc<str>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub request_id: u32,
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

impl Pid {
    pub fn new(address: impl Into<Arc<str>>, id: impl Into<Arc<str>>) -> Pid {
        Pid {
            address: address.into(),
            id: id.into(),
            request_id: 0,
        }
    }

    pub fn with_request_id(mut self, request_id: u32) -> Pid {
        self.request_id = request_id;
        self
    }

    /// True when the address carries the reserved client prefix.
    pub fn is_client(&self) -> bool {
        self.address.starts_with(CLIENT_ADDRESS_PREFIX)
    }

    /// The peer system id of a client identity, i.e. the part of the
    /// address following `$client/`.
    pub fn client_system_id(&self) -> Option<&str> {
        self.address
            .strip_prefix(CLIENT_ADDRESS_PREFIX)
            .and_then(|rest| rest.strip_prefix('/'))
    }
}

impl PartialEq for Pid {
    fn eq(&self, other: &Pid) -> bool {
        self.address == other.address && self.id == other.id
    }
}

impl Eq for Pid {}

impl Hash for Pid {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
        self.id.hash(state);
    }
}

impl Display for Pid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.address, self.id)
    }
}

/// Builds the address of a client-mode system from its system id.
pub fn client_address(system_id: &str) -> Arc<str> {
    format!("{}/{}", CLIENT_ADDRESS_PREFIX, system_id).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_equality_ignores_request_id() {
        let a = Pid::new("localhost:9000", "echo");
        let b = Pid::new("localhost:9000", "echo").with_request_id(42);
        assert_eq!(a, b);
    }

    #[test]
    fn client_addresses_are_recognised() {
        let pid = Pid::new(client_address("f3b0"), "relay");
        assert!(pid.is_client());
        assert_eq!(pid.client_system_id(), Some("f3b0"));
        assert!(!Pid::new("localhost:9000", "relay").is_client());
    }
}
