use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::fmt::{Display, Formatter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::remote::net::codec::FrameCodec;

pub mod codec;
pub mod message;
pub mod server;

#[derive(Debug)]
pub enum ChannelErr {
    Io(std::io::Error),
    Closed,
}

impl Display for ChannelErr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelErr::Io(e) => write!(f, "channel i/o error: {}", e),
            ChannelErr::Closed => write!(f, "channel closed"),
        }
    }
}

impl std::error::Error for ChannelErr {}

impl From<std::io::Error> for ChannelErr {
    fn from(e: std::io::Error) -> Self {
        ChannelErr::Io(e)
    }
}

/// Ordered sink of opaque frames towards one peer. `send` may buffer;
/// `flush` pushes everything buffered onto the transport.
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: Vec<u8>) -> Result<(), ChannelErr>;

    async fn flush(&mut self) -> Result<(), ChannelErr>;
}

/// Ordered source of opaque frames from one peer. `None` means the peer
/// disconnected.
#[async_trait]
pub trait FrameSource: Send {
    async fn next(&mut self) -> Option<Result<Vec<u8>, ChannelErr>>;
}

/// One established bidirectional link.
pub struct Channel {
    pub sink: Box<dyn FrameSink>,
    pub source: Box<dyn FrameSource>,
}

/// Produces channels towards remote addresses. The in-tree implementation
/// speaks length-prefixed frames over TCP; alternative transports plug in
/// through this trait.
#[async_trait]
pub trait ChannelProvider: Send + Sync + 'static {
    async fn connect(&self, address: &str) -> Result<Channel, ChannelErr>;
}

pub struct TcpChannelProvider {
    max_frame_bytes: usize,
}

impl TcpChannelProvider {
    pub fn new(max_frame_bytes: usize) -> TcpChannelProvider {
        TcpChannelProvider { max_frame_bytes }
    }

    /// Wraps an already-accepted stream, used by the server side.
    pub(crate) fn channel_from_stream(stream: TcpStream, max_frame_bytes: usize) -> Channel {
        let (read, write) = stream.into_split();
        Channel {
            sink: Box::new(TcpFrameSink {
                write: FramedWrite::new(write, FrameCodec::new(max_frame_bytes)),
            }),
            source: Box::new(TcpFrameSource {
                read: FramedRead::new(read, FrameCodec::new(max_frame_bytes)),
            }),
        }
    }
}

#[async_trait]
impl ChannelProvider for TcpChannelProvider {
    async fn connect(&self, address: &str) -> Result<Channel, ChannelErr> {
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;
        Ok(Self::channel_from_stream(stream, self.max_frame_bytes))
    }
}

struct TcpFrameSink {
    write: FramedWrite<OwnedWriteHalf, FrameCodec>,
}

#[async_trait]
impl FrameSink for TcpFrameSink {
    async fn send(&mut self, frame: Vec<u8>) -> Result<(), ChannelErr> {
        self.write.feed(Bytes::from(frame)).await.map_err(Into::into)
    }

    async fn flush(&mut self) -> Result<(), ChannelErr> {
        SinkExt::flush(&mut self.write).await.map_err(Into::into)
    }
}

struct TcpFrameSource {
    read: FramedRead<OwnedReadHalf, FrameCodec>,
}

#[async_trait]
impl FrameSource for TcpFrameSource {
    async fn next(&mut self) -> Option<Result<Vec<u8>, ChannelErr>> {
        self.read.next().await.map(|r| r.map_err(Into::into))
    }
}
