use crate::actor::message::{Envelope, SystemMessage};
use crate::actor::ActorError;

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Callback surface the mailbox drives. Implemented by the actor cell.
#[async_trait]
pub(crate) trait MessageInvoker: Send + Sync {
    /// Handle one system message. An error here is fatal to the actor.
    async fn invoke_system(&self, message: SystemMessage) -> Result<(), ActorError>;

    /// Handle one user message. An error suspends the mailbox and is
    /// escalated to the supervisor.
    async fn invoke_user(&self, envelope: Envelope) -> Result<(), ActorError>;

    /// Report a user-message failure to the supervisor. The mailbox is
    /// already suspended when this runs.
    async fn escalate_failure(&self, reason: ActorError);
}

/// FIFO queue pair buffering messages destined for one actor.
///
/// System messages always drain before the next user message is dequeued.
/// Pushes schedule a dispatcher onto the runtime unless one is already
/// running; the `scheduled` CAS guarantees at most one dispatch loop per
/// mailbox at any time.
#[derive(Clone)]
pub struct Mailbox {
    inner: Arc<MailboxInner>,
}

struct MailboxInner {
    system: Mutex<VecDeque<SystemMessage>>,
    user: Mutex<VecDeque<Envelope>>,
    scheduled: AtomicBool,
    suspended: AtomicBool,
    throughput: usize,
    invoker: OnceLock<Arc<dyn MessageInvoker>>,
}

impl Mailbox {
    pub fn new(throughput: usize) -> Mailbox {
        Mailbox {
            inner: Arc::new(MailboxInner {
                system: Mutex::new(VecDeque::new()),
                user: Mutex::new(VecDeque::new()),
                scheduled: AtomicBool::new(false),
                suspended: AtomicBool::new(false),
                throughput: throughput.max(1),
                invoker: OnceLock::new(),
            }),
        }
    }

    /// Wires the mailbox to the cell that consumes it. Must be called once,
    /// before the first push.
    pub(crate) fn register_invoker(&self, invoker: Arc<dyn MessageInvoker>) {
        if self.inner.invoker.set(invoker).is_err() {
            warn!("mailbox invoker registered twice, keeping the first");
        }
    }

    pub fn push_user(&self, envelope: Envelope) {
        self.inner.user.lock().push_back(envelope);
        self.schedule();
    }

    pub fn push_system(&self, message: SystemMessage) {
        self.inner.system.lock().push_back(message);
        self.schedule();
    }

    pub fn user_len(&self) -> usize {
        self.inner.user.lock().len()
    }

    pub fn system_len(&self) -> usize {
        self.inner.system.lock().len()
    }

    pub fn len(&self) -> usize {
        self.system_len() + self.user_len()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_messages()
    }

    pub fn has_messages(&self) -> bool {
        self.len() > 0
    }

    pub fn is_suspended(&self) -> bool {
        self.inner.suspended.load(Ordering::Acquire)
    }

    /// Stops user-message processing after the current message. System
    /// messages keep running.
    pub(crate) fn suspend(&self) {
        self.inner.suspended.store(true, Ordering::Release);
    }

    pub(crate) fn resume(&self) {
        self.inner.suspended.store(false, Ordering::Release);
        self.schedule();
    }

    fn schedule(&self) {
        if self
            .inner
            .scheduled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let inner = self.inner.clone();
            tokio::spawn(run_dispatch(inner));
        }
    }
}

impl MailboxInner {
    fn pop_system(&self) -> Option<SystemMessage> {
        self.system.lock().pop_front()
    }

    fn pop_user(&self) -> Option<Envelope> {
        self.user.lock().pop_front()
    }

    /// Anything the dispatcher could act on right now: a system message, or
    /// a user message while not suspended.
    fn has_processable(&self) -> bool {
        if !self.system.lock().is_empty() {
            return true;
        }

        !self.suspended.load(Ordering::Acquire) && !self.user.lock().is_empty()
    }
}

async fn run_dispatch(inner: Arc<MailboxInner>) {
    let Some(invoker) = inner.invoker.get().cloned() else {
        // Nothing can be delivered yet; the registering side will schedule
        // again once wired.
        inner.scheduled.store(false, Ordering::Release);
        return;
    };

    loop {
        process_batch(&inner, &invoker).await;

        inner.scheduled.store(false, Ordering::Release);

        // A push may have raced the flag reset. Re-acquire the dispatcher
        // role ourselves rather than spawning a fresh task.
        if inner.has_processable()
            && inner
                .scheduled
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            continue;
        }

        break;
    }
}

async fn process_batch(inner: &Arc<MailboxInner>, invoker: &Arc<dyn MessageInvoker>) {
    let mut processed = 0;

    loop {
        // All pending system messages run before the next user dequeue,
        // suspended or not.
        while let Some(message) = inner.pop_system() {
            match message {
                SystemMessage::Suspend => {
                    inner.suspended.store(true, Ordering::Release);
                }
                SystemMessage::Resume => {
                    inner.suspended.store(false, Ordering::Release);
                }
                message => {
                    let name = message.name();
                    if let Err(e) = invoker.invoke_system(message).await {
                        error!(
                            message = name,
                            error = %e,
                            "system message handling failed, stopping actor"
                        );
                        inner.system.lock().push_back(SystemMessage::Stop);
                    }
                }
            }
        }

        if inner.suspended.load(Ordering::Acquire) {
            return;
        }

        let Some(envelope) = inner.pop_user() else {
            return;
        };

        if let Err(reason) = invoker.invoke_user(envelope).await {
            inner.suspended.store(true, Ordering::Release);
            invoker.escalate_failure(reason).await;
            return;
        }

        processed += 1;
        if processed >= inner.throughput {
            // Yield so one busy actor cannot starve the executor.
            tokio::task::yield_now().await;
            processed = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::pid::Pid;
    use parking_lot::Mutex as SyncMutex;
    use std::time::Duration;

    struct RecordingInvoker {
        processed: Arc<SyncMutex<Vec<String>>>,
        user_delay: Duration,
        fail_on: Option<&'static str>,
        escalated: Arc<SyncMutex<Vec<ActorError>>>,
    }

    #[async_trait]
    impl MessageInvoker for RecordingInvoker {
        async fn invoke_system(&self, message: SystemMessage) -> Result<(), ActorError> {
            self.processed.lock().push(format!("sys:{}", message.name()));
            Ok(())
        }

        async fn invoke_user(&self, envelope: Envelope) -> Result<(), ActorError> {
            tokio::time::sleep(self.user_delay).await;
            let value = envelope
                .message
                .downcast_ref::<String>()
                .cloned()
                .unwrap_or_default();

            if Some(value.as_str()) == self.fail_on {
                return Err(ActorError::new(value));
            }

            self.processed.lock().push(format!("user:{}", value));
            Ok(())
        }

        async fn escalate_failure(&self, reason: ActorError) {
            self.escalated.lock().push(reason);
        }
    }

    fn recording_mailbox(
        user_delay: Duration,
        fail_on: Option<&'static str>,
    ) -> (Mailbox, Arc<SyncMutex<Vec<String>>>, Arc<SyncMutex<Vec<ActorError>>>) {
        let processed = Arc::new(SyncMutex::new(Vec::new()));
        let escalated = Arc::new(SyncMutex::new(Vec::new()));
        let mailbox = Mailbox::new(16);
        mailbox.register_invoker(Arc::new(RecordingInvoker {
            processed: processed.clone(),
            user_delay,
            fail_on,
            escalated: escalated.clone(),
        }));

        (mailbox, processed, escalated)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn system_messages_run_before_next_user_dequeue() {
        let (mailbox, processed, _) = recording_mailbox(Duration::from_millis(100), None);

        // The first user message is in flight when the system message
        // arrives; priority applies to the next dequeue, not preemption.
        mailbox.push_user(Envelope::new("one".to_string()));
        tokio::time::sleep(Duration::from_millis(30)).await;
        mailbox.push_system(SystemMessage::Watch(Pid::new("nonhost", "watcher")));
        mailbox.push_user(Envelope::new("two".to_string()));

        wait_until(|| processed.lock().len() == 3).await;
        assert_eq!(
            *processed.lock(),
            vec![
                "user:one".to_string(),
                "sys:Watch".to_string(),
                "user:two".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn user_failure_suspends_until_resume() {
        let (mailbox, processed, escalated) =
            recording_mailbox(Duration::from_millis(1), Some("boom"));

        mailbox.push_user(Envelope::new("boom".to_string()));
        mailbox.push_user(Envelope::new("after".to_string()));

        wait_until(|| escalated.lock().len() == 1).await;
        assert!(mailbox.is_suspended());
        assert_eq!(mailbox.user_len(), 1);
        assert!(processed.lock().is_empty());

        // Resume is absorbed by the mailbox itself and user processing
        // picks up where it left off.
        mailbox.push_system(SystemMessage::Resume);
        wait_until(|| processed.lock().len() == 1).await;
        assert_eq!(*processed.lock(), vec!["user:after".to_string()]);
        assert!(!mailbox.is_suspended());
    }

    #[tokio::test]
    async fn length_counts_both_queues() {
        let mailbox = Mailbox::new(16);

        // No invoker registered: pushes accumulate.
        mailbox.push_user(Envelope::new(1usize));
        mailbox.push_system(SystemMessage::Stop);

        // Allow the no-invoker dispatch attempt to settle.
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(mailbox.len(), 2);
        assert!(mailbox.has_messages());
    }
}
