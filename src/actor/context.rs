use crate::actor::message::{Envelope, MessageHeaders, SystemMessage};
use crate::actor::pid::Pid;
use crate::actor::process::Process;
use crate::actor::props::Props;
use crate::actor::system::ActorSystem;
use crate::actor::SpawnErr;

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Where an actor is in its lifecycle.
///
/// `Starting -> Idle <-> Receiving -> Stopping -> Stopped`, with
/// `Restarting` reachable from every state except `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorStatus {
    Starting,
    Idle,
    Receiving,
    Restarting,
    Stopping,
    Stopped,
}

/// Per-actor view of the runtime, handed to every lifecycle hook and
/// `receive` call. Holds the identity, the children arena (pids, never
/// direct references), the watch set, and the sender/headers of the message
/// currently being processed.
pub struct ActorContext {
    system: ActorSystem,
    pid: Pid,
    parent: Option<Pid>,
    status: ActorStatus,
    children: HashMap<Arc<str>, Pid>,
    watchers: HashSet<Pid>,
    sender: Option<Pid>,
    headers: MessageHeaders,
}

impl ActorContext {
    pub(crate) fn new(system: ActorSystem, pid: Pid, parent: Option<Pid>) -> ActorContext {
        let mut watchers = HashSet::new();
        if let Some(parent) = &parent {
            // The parent implicitly watches every child so supervision
            // bookkeeping sees the child's termination.
            watchers.insert(parent.clone());
        }

        ActorContext {
            system,
            pid,
            parent,
            status: ActorStatus::Starting,
            children: HashMap::new(),
            watchers,
            sender: None,
            headers: MessageHeaders::default(),
        }
    }

    pub fn myself(&self) -> &Pid {
        &self.pid
    }

    pub fn system(&self) -> &ActorSystem {
        &self.system
    }

    pub fn parent(&self) -> Option<&Pid> {
        self.parent.as_ref()
    }

    pub fn status(&self) -> ActorStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: ActorStatus) {
        self.status = status;
    }

    /// Sender of the message currently being processed, if it carried one.
    pub fn sender(&self) -> Option<&Pid> {
        self.sender.as_ref()
    }

    /// Headers of the message currently being processed.
    pub fn headers(&self) -> &MessageHeaders {
        &self.headers
    }

    pub(crate) fn set_message_context(&mut self, sender: Option<Pid>, headers: MessageHeaders) {
        self.sender = sender;
        self.headers = headers;
    }

    pub fn children(&self) -> Vec<Pid> {
        self.children.values().cloned().collect()
    }

    pub fn child(&self, id: &str) -> Option<&Pid> {
        self.children.get(id)
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub(crate) fn remove_child(&mut self, id: &Arc<str>) -> bool {
        self.children.remove(id).is_some()
    }

    pub(crate) fn watchers(&self) -> &HashSet<Pid> {
        &self.watchers
    }

    pub(crate) fn add_watcher(&mut self, watcher: Pid) {
        self.watchers.insert(watcher);
    }

    pub(crate) fn remove_watcher(&mut self, watcher: &Pid) {
        self.watchers.remove(watcher);
    }

    /// Spawns a child under this actor with a generated id.
    pub fn spawn_child(&mut self, props: Props) -> Result<Pid, SpawnErr> {
        let id = format!("{}/{}", self.pid.id, self.system.registry().next_id());
        self.spawn_child_named(props, &id)
    }

    /// Spawns a child under this actor with an explicit id.
    pub fn spawn_child_named(&mut self, props: Props, id: &str) -> Result<Pid, SpawnErr> {
        let pid = self
            .system
            .spawn_with_parent(props, id, Some(self.pid.clone()))?;
        self.children.insert(pid.id.clone(), pid.clone());
        Ok(pid)
    }

    /// Fire-and-forget send with this actor as the sender.
    pub fn send<M: Any + Send + Sync>(&self, target: &Pid, message: M) {
        let envelope = Envelope::new(message)
            .with_target(target.clone())
            .with_sender(self.pid.clone());
        self.system.deliver(envelope);
    }

    /// Replies to the sender of the message currently being processed.
    /// Without a sender the reply is dead-lettered.
    pub fn respond<M: Any + Send + Sync>(&self, message: M) {
        match &self.sender {
            Some(sender) => self.send(sender, message),
            None => {
                let envelope = Envelope::new(message).with_sender(self.pid.clone());
                self.system.dead_letter().send_user(envelope);
            }
        }
    }

    /// Registers this actor for a `Terminated` notification when `subject`
    /// stops.
    pub fn watch(&self, subject: &Pid) {
        self.system
            .registry()
            .get(subject)
            .send_system(SystemMessage::Watch(self.pid.clone()));
    }

    pub fn unwatch(&self, subject: &Pid) {
        self.system
            .registry()
            .get(subject)
            .send_system(SystemMessage::Unwatch(self.pid.clone()));
    }

    /// Asks `target` to stop.
    pub fn stop(&self, target: &Pid) {
        self.system.stop(target);
    }

    /// Begins this actor's own stop procedure after the current message.
    pub fn stop_self(&self) {
        self.system.stop(&self.pid);
    }
}
