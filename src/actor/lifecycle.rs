use crate::actor::context::{ActorContext, ActorStatus};
use crate::actor::mailbox::{Mailbox, MessageInvoker};
use crate::actor::message::{
    Envelope, Failure, StopReason, SystemMessage, Terminated,
};
use crate::actor::pid::Pid;
use crate::actor::process::{ActorProcess, Process};
use crate::actor::props::Props;
use crate::actor::supervision::{Directive, FailureScope, RestartStatistics};
use crate::actor::system::ActorSystem;
use crate::actor::{Actor, ActorError, SpawnErr};

use parking_lot::Mutex as SyncMutex;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Creates the mailbox/process/cell triple for a new actor and enqueues
/// `Started`. Registration makes the pid routable before the first message
/// is processed.
pub(crate) fn spawn(
    system: &ActorSystem,
    id: &str,
    props: Props,
    parent: Option<Pid>,
) -> Result<Pid, SpawnErr> {
    let throughput = props
        .throughput()
        .unwrap_or_else(|| system.config().throughput);
    let mailbox = Mailbox::new(throughput);
    let process = Arc::new(ActorProcess::new(mailbox.clone()));

    let pid = system.registry().add(id, process)?;

    trace!(pid = %pid, "spawning actor");

    let cell = Arc::new(ActorCell::new(
        pid.clone(),
        system.clone(),
        props,
        mailbox.clone(),
        parent,
    ));
    mailbox.register_invoker(cell);
    mailbox.push_system(SystemMessage::Started);

    Ok(pid)
}

/// Work deferred until every child has reported `Terminated`.
enum PendingAction {
    None,
    Restart(ActorError),
    Stop,
}

struct CellState {
    actor: Box<dyn Actor>,
    ctx: ActorContext,
    pending: PendingAction,
    fail_reason: Option<String>,
}

/// Drives one actor instance through its lifecycle. The mailbox invokes the
/// cell one message at a time; the inner lock is never contended because at
/// most one dispatch loop runs per mailbox.
pub(crate) struct ActorCell {
    pid: Pid,
    system: ActorSystem,
    props: Props,
    mailbox: Mailbox,
    parent: Option<Pid>,
    restart_stats: Arc<SyncMutex<RestartStatistics>>,
    state: Mutex<CellState>,
}

impl ActorCell {
    fn new(
        pid: Pid,
        system: ActorSystem,
        props: Props,
        mailbox: Mailbox,
        parent: Option<Pid>,
    ) -> ActorCell {
        let actor = props.produce();
        let ctx = ActorContext::new(system.clone(), pid.clone(), parent.clone());

        ActorCell {
            pid,
            system,
            props,
            mailbox,
            parent,
            restart_stats: Arc::new(SyncMutex::new(RestartStatistics::new())),
            state: Mutex::new(CellState {
                actor,
                ctx,
                pending: PendingAction::None,
                fail_reason: None,
            }),
        }
    }

    async fn handle_started(&self, state: &mut CellState) {
        let CellState { actor, ctx, .. } = state;

        if let Err(reason) = actor.started(ctx).await {
            error!(pid = %self.pid, error = %reason, "actor failed to start");
            self.fail(state, reason).await;
            return;
        }

        state.ctx.set_status(ActorStatus::Idle);
    }

    async fn handle_stop(&self, state: &mut CellState) {
        match state.ctx.status() {
            ActorStatus::Stopping | ActorStatus::Stopped => return,
            _ => {}
        }

        state.ctx.set_status(ActorStatus::Stopping);

        let CellState { actor, ctx, .. } = state;
        actor.stopping(ctx).await;

        if state.ctx.child_count() == 0 {
            self.finalize_stop(state).await;
        } else {
            state.pending = PendingAction::Stop;
            for child in state.ctx.children() {
                self.system
                    .registry()
                    .get(&child)
                    .send_system(SystemMessage::Stop);
            }
        }
    }

    async fn handle_restart(&self, state: &mut CellState, reason: ActorError) {
        if state.ctx.status() == ActorStatus::Stopped {
            return;
        }

        // No user message reaches the old instance from here on; restart_now
        // resumes once the fresh instance has started.
        self.mailbox.suspend();
        state.ctx.set_status(ActorStatus::Restarting);

        if state.ctx.child_count() == 0 {
            self.restart_now(state, reason).await;
        } else {
            // Children are stopped before the new instance starts.
            state.pending = PendingAction::Restart(reason);
            for child in state.ctx.children() {
                self.system
                    .registry()
                    .get(&child)
                    .send_system(SystemMessage::Stop);
            }
        }
    }

    async fn restart_now(&self, state: &mut CellState, reason: ActorError) {
        debug!(pid = %self.pid, error = %reason, "restarting actor");

        state.pending = PendingAction::None;

        {
            let CellState { actor, ctx, .. } = state;
            actor.restarting(ctx).await;
        }

        state.actor = self.props.produce();
        state.ctx.set_status(ActorStatus::Starting);

        let CellState { actor, ctx, .. } = state;
        if let Err(reason) = actor.started(ctx).await {
            error!(pid = %self.pid, error = %reason, "actor failed to restart");
            self.fail(state, reason).await;
            return;
        }

        state.ctx.set_status(ActorStatus::Idle);

        // The failure that triggered the restart left the mailbox suspended;
        // queued user messages resume with the fresh instance.
        self.mailbox.resume();
    }

    async fn handle_terminated(&self, state: &mut CellState, who: Pid, reason: StopReason) {
        state.ctx.remove_child(&who.id);

        match (&state.pending, state.ctx.child_count()) {
            (PendingAction::Stop, 0) => {
                self.finalize_stop(state).await;
                return;
            }
            (PendingAction::Restart(_), 0) => {
                let PendingAction::Restart(reason) =
                    std::mem::replace(&mut state.pending, PendingAction::None)
                else {
                    unreachable!()
                };
                self.restart_now(state, reason).await;
                return;
            }
            _ => {}
        }

        if state.ctx.status() == ActorStatus::Stopping
            || state.ctx.status() == ActorStatus::Restarting
        {
            // Terminations while winding down only serve the bookkeeping
            // above; the instance is going away.
            return;
        }

        // Surface the notification to the actor itself.
        let envelope = Envelope::new(Terminated {
            who: who.clone(),
            reason,
        });
        let CellState { actor, ctx, .. } = state;
        ctx.set_message_context(Some(who), Default::default());
        ctx.set_status(ActorStatus::Receiving);
        let result = actor.receive(ctx, envelope).await;
        if ctx.status() == ActorStatus::Receiving {
            ctx.set_status(ActorStatus::Idle);
        }

        if let Err(reason) = result {
            self.fail(state, reason).await;
        }
    }

    async fn handle_failure(&self, state: &mut CellState, failure: Failure) {
        let directive = {
            let mut stats = failure.stats.lock();
            self.props.supervisor().decide(&failure.reason, &mut stats)
        };

        debug!(
            pid = %self.pid,
            child = %failure.who,
            error = %failure.reason,
            directive = ?directive,
            "supervising child failure"
        );

        let targets = match self.props.supervisor().scope() {
            FailureScope::One => vec![failure.who.clone()],
            FailureScope::All => state.ctx.children(),
        };

        match directive {
            Directive::Resume => {
                for target in targets {
                    self.system
                        .registry()
                        .get(&target)
                        .send_system(SystemMessage::Resume);
                }
            }
            Directive::Restart => {
                for target in targets {
                    self.system
                        .registry()
                        .get(&target)
                        .send_system(SystemMessage::Restart(failure.reason.clone()));
                }
            }
            Directive::Stop => {
                for target in targets {
                    self.system
                        .registry()
                        .get(&target)
                        .send_system(SystemMessage::Stop);
                }
            }
            Directive::Escalate => {
                self.fail(state, failure.reason).await;
            }
        }
    }

    /// This actor itself has failed: suspend the mailbox and report to the
    /// parent. Actors without a parent stop - there is nowhere to escalate.
    async fn fail(&self, state: &mut CellState, reason: ActorError) {
        state.fail_reason = Some(reason.to_string());
        self.mailbox.suspend();

        match &self.parent {
            Some(parent) => {
                self.system
                    .registry()
                    .get(parent)
                    .send_system(SystemMessage::Failure(Failure {
                        who: self.pid.clone(),
                        reason,
                        stats: self.restart_stats.clone(),
                    }));
            }
            None => {
                error!(pid = %self.pid, error = %reason, "unsupervised actor failed, stopping");
                self.mailbox.push_system(SystemMessage::Stop);
            }
        }
    }

    async fn finalize_stop(&self, state: &mut CellState) {
        {
            let CellState { actor, ctx, .. } = state;
            actor.stopped(ctx).await;
        }

        state.ctx.set_status(ActorStatus::Stopped);
        self.system.registry().remove(&self.pid);

        let reason = state
            .fail_reason
            .take()
            .map_or(StopReason::Stopped, StopReason::Failed);

        for watcher in state.ctx.watchers().clone() {
            self.system
                .registry()
                .get(&watcher)
                .send_system(SystemMessage::Terminated {
                    who: self.pid.clone(),
                    reason: reason.clone(),
                });
        }

        trace!(pid = %self.pid, "actor stopped");
    }
}

#[async_trait]
impl MessageInvoker for ActorCell {
    async fn invoke_system(&self, message: SystemMessage) -> Result<(), ActorError> {
        let mut state = self.state.lock().await;

        if state.ctx.status() == ActorStatus::Stopped {
            return Ok(());
        }

        match message {
            SystemMessage::Started => self.handle_started(&mut state).await,
            SystemMessage::Stop => self.handle_stop(&mut state).await,
            SystemMessage::Restart(reason) => self.handle_restart(&mut state, reason).await,
            SystemMessage::Watch(watcher) => {
                if state.ctx.status() == ActorStatus::Stopping {
                    // Too late to watch: answer immediately.
                    self.system
                        .registry()
                        .get(&watcher)
                        .send_system(SystemMessage::Terminated {
                            who: self.pid.clone(),
                            reason: StopReason::Stopped,
                        });
                } else {
                    state.ctx.add_watcher(watcher);
                }
            }
            SystemMessage::Unwatch(watcher) => state.ctx.remove_watcher(&watcher),
            SystemMessage::Terminated { who, reason } => {
                self.handle_terminated(&mut state, who, reason).await
            }
            SystemMessage::Failure(failure) => self.handle_failure(&mut state, failure).await,
            // Mailbox-internal; never reaches the cell.
            SystemMessage::Suspend | SystemMessage::Resume => {}
        }

        Ok(())
    }

    async fn invoke_user(&self, envelope: Envelope) -> Result<(), ActorError> {
        let mut state = self.state.lock().await;

        match state.ctx.status() {
            ActorStatus::Stopping | ActorStatus::Stopped => {
                self.system.dead_letter().send_user(envelope);
                return Ok(());
            }
            _ => {}
        }

        let CellState { actor, ctx, .. } = &mut *state;
        ctx.set_message_context(envelope.sender.clone(), envelope.headers.clone());
        ctx.set_status(ActorStatus::Receiving);

        let result = actor.receive(ctx, envelope).await;

        if ctx.status() == ActorStatus::Receiving {
            ctx.set_status(ActorStatus::Idle);
        }

        result
    }

    async fn escalate_failure(&self, reason: ActorError) {
        let mut state = self.state.lock().await;
        self.fail(&mut state, reason).await;
    }
}
