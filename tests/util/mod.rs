use plexus::actor::context::ActorContext;
use plexus::actor::{Actor, ActorError, Envelope, Props};

use parking_lot::Mutex;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use async_trait::async_trait;

lazy_static::lazy_static! {
    static ref LOG_LEVEL: String = std::env::var("LOG_LEVEL").map_or(String::from("OFF"), |s| s);
}

pub fn create_trace_logger() {
    let _ = tracing_subscriber::fmt()
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .with_thread_names(true)
        .with_span_events(FmtSpan::NONE)
        .with_ansi(false)
        .with_max_level(
            LevelFilter::from_str(LOG_LEVEL.as_str())
                .expect("invalid `LOG_LEVEL` environment variable"),
        )
        .try_init();
}

/// Polls `condition` until it holds or `deadline` elapses.
pub async fn wait_until<F: FnMut() -> bool>(mut condition: F, deadline: Duration) -> bool {
    let started = std::time::Instant::now();
    loop {
        if condition() {
            return true;
        }
        if started.elapsed() > deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Records every `i64` payload it receives, in arrival order.
pub struct CollectingActor {
    values: Arc<Mutex<Vec<i64>>>,
}

#[async_trait]
impl Actor for CollectingActor {
    async fn receive(
        &mut self,
        _ctx: &mut ActorContext,
        envelope: Envelope,
    ) -> Result<(), ActorError> {
        if let Some(value) = envelope.message.downcast_ref::<i64>() {
            self.values.lock().push(*value);
        }
        Ok(())
    }
}

pub fn collecting_props() -> (Props, Arc<Mutex<Vec<i64>>>) {
    let values = Arc::new(Mutex::new(Vec::new()));
    let producer_values = values.clone();
    let props = Props::from_producer(move || CollectingActor {
        values: producer_values.clone(),
    });
    (props, values)
}
