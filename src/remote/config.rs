use crate::actor::props::Props;
use crate::remote::codec::MessageCodec;
use crate::remote::net::ChannelProvider;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for the remote layer. Built fluently and handed to
/// [`Remote::start`](crate::remote::Remote::start).
pub struct RemoteConfig {
    pub(crate) listen_address: Option<String>,
    pub(crate) advertised_address: Option<String>,
    /// How long a terminated endpoint's key stays blocklisted when the
    /// termination requested blocking.
    pub(crate) wait_after_endpoint_termination: Option<Duration>,
    /// Whether the post-termination grace also applies when the termination
    /// event did not request blocking.
    pub(crate) delay_without_block: bool,
    pub(crate) outbound_queue_capacity: usize,
    pub(crate) outbound_batch_size: usize,
    pub(crate) connect_backoff_initial: Duration,
    pub(crate) connect_backoff_max: Duration,
    /// Connection attempts before an endpoint gives up and terminates.
    /// `None` retries forever.
    pub(crate) max_connect_attempts: Option<u32>,
    /// Malformed inbound frames tolerated per connection before it is
    /// closed.
    pub(crate) malformed_frame_threshold: usize,
    pub(crate) max_frame_bytes: usize,
    pub(crate) handshake_timeout: Duration,
    pub(crate) kinds: HashMap<String, Props>,
    pub(crate) codec: Arc<MessageCodec>,
    pub(crate) channel_provider: Option<Arc<dyn ChannelProvider>>,
}

impl RemoteConfig {
    pub fn new() -> RemoteConfig {
        RemoteConfig {
            listen_address: None,
            advertised_address: None,
            wait_after_endpoint_termination: Some(Duration::from_secs(10)),
            delay_without_block: false,
            outbound_queue_capacity: 8192,
            outbound_batch_size: 64,
            connect_backoff_initial: Duration::from_millis(100),
            connect_backoff_max: Duration::from_secs(2),
            max_connect_attempts: Some(3),
            malformed_frame_threshold: 5,
            max_frame_bytes: 8 * 1024 * 1024,
            handshake_timeout: Duration::from_secs(5),
            kinds: HashMap::new(),
            codec: Arc::new(MessageCodec::new()),
            channel_provider: None,
        }
    }

    /// Binds a listener on `addr` and registers it as this system's
    /// address. Without one the system runs in client mode, addressed by a
    /// `$client/...` identity.
    pub fn with_listen_address(mut self, addr: impl Into<String>) -> Self {
        self.listen_address = Some(addr.into());
        self
    }

    /// Address other systems should dial, when it differs from the bind
    /// address.
    pub fn with_advertised_address(mut self, addr: impl Into<String>) -> Self {
        self.advertised_address = Some(addr.into());
        self
    }

    pub fn with_wait_after_endpoint_termination(mut self, wait: Option<Duration>) -> Self {
        self.wait_after_endpoint_termination = wait;
        self
    }

    pub fn with_delay_without_block(mut self, delay: bool) -> Self {
        self.delay_without_block = delay;
        self
    }

    pub fn with_outbound_queue_capacity(mut self, capacity: usize) -> Self {
        self.outbound_queue_capacity = capacity.max(1);
        self
    }

    pub fn with_outbound_batch_size(mut self, batch_size: usize) -> Self {
        self.outbound_batch_size = batch_size.max(1);
        self
    }

    pub fn with_connect_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.connect_backoff_initial = initial;
        self.connect_backoff_max = max;
        self
    }

    pub fn with_max_connect_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_connect_attempts = attempts;
        self
    }

    pub fn with_malformed_frame_threshold(mut self, threshold: usize) -> Self {
        self.malformed_frame_threshold = threshold;
        self
    }

    pub fn with_max_frame_bytes(mut self, bytes: usize) -> Self {
        self.max_frame_bytes = bytes;
        self
    }

    /// Registers an actor kind spawnable by remote peers through the
    /// activator.
    pub fn with_kind(mut self, kind: impl Into<String>, props: Props) -> Self {
        self.kinds.insert(kind.into(), props);
        self
    }

    /// Registers a message type on the wire codec under `type_tag`.
    pub fn with_message_type<M>(self, type_tag: &str) -> Self
    where
        M: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        self.codec.register::<M>(type_tag);
        self
    }

    /// Like [`with_message_type`](Self::with_message_type), with the
    /// encoded form cached per message instance.
    pub fn with_cached_message_type<M>(self, type_tag: &str) -> Self
    where
        M: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        self.codec.register_cached::<M>(type_tag);
        self
    }

    /// Overrides the TCP channel provider, e.g. for tests.
    pub fn with_channel_provider(mut self, provider: Arc<dyn ChannelProvider>) -> Self {
        self.channel_provider = Some(provider);
        self
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self::new()
    }
}
