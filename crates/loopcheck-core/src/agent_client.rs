//! One framed connection to the accessibility agent.
//!
//! [`AgentClient::call`] sends a [`Request`] and waits for its [`Reply`]
//! under a single deadline. The stream is moved out of the client for the
//! duration of a call and only put back when a full reply arrived, so a
//! call that fails, times out, or is cancelled leaves the client closed
//! rather than out of step with the agent.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

use crate::protocol::{body_len, ProtocolError, Reply, Request, HEADER_LEN};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Byte stream the client can run over: TCP in production, duplex pipes in tests.
pub trait AgentStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AgentStream for T {}

#[derive(Error, Debug)]
pub enum AgentClientError {
    #[error("connection to agent is closed")]
    Closed,

    #[error("could not reach agent at {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The agent understood the request and reported a failure.
    #[error("agent refused {request}: {message}")]
    Refused { request: &'static str, message: String },

    #[error("no reply within {0:?}")]
    TimedOut(Duration),
}

pub struct AgentClient {
    stream: Option<Box<dyn AgentStream>>,
}

impl AgentClient {
    /// Open a TCP connection to `addr`.
    pub async fn connect(addr: SocketAddr) -> Result<Self, AgentClientError> {
        debug!(%addr, "connecting to agent");
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| AgentClientError::TimedOut(CONNECT_TIMEOUT))?
            .map_err(|source| AgentClientError::Connect { addr, source })?;
        stream.set_nodelay(true)?;
        Ok(Self::over(stream))
    }

    /// Use an already open stream.
    pub fn over(stream: impl AgentStream + 'static) -> Self {
        Self { stream: Some(Box::new(stream)) }
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Send `request` and wait at most `deadline` for the whole exchange.
    ///
    /// An error reply from the agent becomes [`AgentClientError::Refused`]
    /// and keeps the connection open. Every other failure closes it.
    pub async fn call(&mut self, request: &Request, deadline: Duration) -> Result<Reply, AgentClientError> {
        let mut stream = self.stream.take().ok_or(AgentClientError::Closed)?;

        let exchanged = tokio::time::timeout(deadline, exchange(&mut stream, request)).await;
        let reply = match exchanged {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                warn!(request = request.name(), error = %e, "agent connection dropped");
                return Err(e);
            }
            Err(_) => {
                warn!(request = request.name(), ?deadline, "agent did not answer in time");
                return Err(AgentClientError::TimedOut(deadline));
            }
        };

        self.stream = Some(stream);
        match reply {
            Reply::Error(message) => Err(AgentClientError::Refused { request: request.name(), message }),
            reply => Ok(reply),
        }
    }
}

async fn exchange(stream: &mut Box<dyn AgentStream>, request: &Request) -> Result<Reply, AgentClientError> {
    let frame = request.encode();
    trace!(request = request.name(), bytes = frame.len(), "sending");
    stream.write_all(&frame).await?;
    stream.flush().await?;

    let mut header = [0u8; HEADER_LEN];
    stream.read_exact(&mut header).await?;
    let mut body = vec![0u8; body_len(header)?];
    stream.read_exact(&mut body).await?;
    trace!(request = request.name(), bytes = body.len(), "reply received");
    Ok(Reply::decode(&body)?)
}
