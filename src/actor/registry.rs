use crate::actor::pid::{Pid, NONHOST};
use crate::actor::process::ProcessRef;
use crate::actor::SpawnErr;
use crate::diagnostics::{DiagnosticEntry, Diagnostics};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Resolves pids whose address is not this host to a message sink. The
/// remote layer registers one that yields endpoint-backed proxies.
pub type HostResolver = Arc<dyn Fn(&Pid) -> Option<ProcessRef> + Send + Sync>;

/// Map from identity to message sink for every process hosted here, plus
/// the resolver chain for foreign addresses.
///
/// Resolution is total: a pid that matches nothing yields the dead-letter
/// sink, never an error.
pub struct ProcessRegistry {
    address: RwLock<Arc<str>>,
    processes: DashMap<Arc<str>, ProcessRef>,
    host_resolvers: RwLock<Vec<HostResolver>>,
    sequence: AtomicU64,
    dead_letter: ProcessRef,
}

impl ProcessRegistry {
    pub fn new(dead_letter: ProcessRef) -> ProcessRegistry {
        ProcessRegistry {
            address: RwLock::new(NONHOST.clone()),
            processes: DashMap::new(),
            host_resolvers: RwLock::new(Vec::new()),
            sequence: AtomicU64::new(1),
            dead_letter,
        }
    }

    /// The local host address. `nonhost` until a remote listener binds.
    pub fn address(&self) -> Arc<str> {
        self.address.read().clone()
    }

    pub(crate) fn set_address(&self, address: Arc<str>) {
        *self.address.write() = address;
    }

    /// Fresh id for an anonymous process.
    pub fn next_id(&self) -> String {
        format!("${}", self.sequence.fetch_add(1, Ordering::Relaxed))
    }

    /// Registers `process` under `id`. Ids are unique within a process;
    /// a taken id is an error.
    pub fn add(&self, id: &str, process: ProcessRef) -> Result<Pid, SpawnErr> {
        let id: Arc<str> = id.into();
        match self.processes.entry(id.clone()) {
            Entry::Occupied(_) => Err(SpawnErr::AlreadyExists(Pid {
                address: self.address(),
                id,
                request_id: 0,
            })),
            Entry::Vacant(entry) => {
                entry.insert(process);
                Ok(Pid {
                    address: self.address(),
                    id,
                    request_id: 0,
                })
            }
        }
    }

    pub fn remove(&self, pid: &Pid) {
        self.processes.remove(&pid.id);
    }

    /// Resolves `pid` to a sink. Local addresses are looked up in the local
    /// table; anything else walks the host resolvers in registration order.
    pub fn get(&self, pid: &Pid) -> ProcessRef {
        if self.is_local(pid) {
            return self
                .get_local(&pid.id)
                .unwrap_or_else(|| self.dead_letter.clone());
        }

        for resolver in self.host_resolvers.read().iter() {
            if let Some(process) = resolver(pid) {
                return process;
            }
        }

        self.dead_letter.clone()
    }

    pub fn get_local(&self, id: &str) -> Option<ProcessRef> {
        self.processes.get(id).map(|entry| entry.value().clone())
    }

    pub fn register_host_resolver(&self, resolver: HostResolver) {
        self.host_resolvers.write().push(resolver);
    }

    pub fn dead_letter(&self) -> ProcessRef {
        self.dead_letter.clone()
    }

    pub fn process_count(&self) -> usize {
        self.processes.len()
    }

    pub(crate) fn local_ids(&self) -> Vec<Arc<str>> {
        self.processes.iter().map(|e| e.key().clone()).collect()
    }

    fn is_local(&self, pid: &Pid) -> bool {
        let local = self.address.read();
        pid.address == *local || &*pid.address == &**NONHOST
    }
}

impl Diagnostics for ProcessRegistry {
    fn diagnostics(&self) -> Vec<DiagnosticEntry> {
        vec![
            DiagnosticEntry::new("registry", "address", self.address().to_string()),
            DiagnosticEntry::new("registry", "processes", self.processes.len().to_string()),
            DiagnosticEntry::new(
                "registry",
                "host_resolvers",
                self.host_resolvers.read().len().to_string(),
            ),
        ]
    }
}
