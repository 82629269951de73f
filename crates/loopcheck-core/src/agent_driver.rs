//! [`AutomationDriver`] backed by the TCP accessibility agent.
//!
//! ```no_run
//! use std::time::Duration;
//! use loopcheck_core::agent_driver::AgentDriver;
//! use loopcheck_core::driver::AutomationDriver;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let driver = AgentDriver::connect("localhost", 8080).await?;
//! driver.tap_label("Video11", Some(Duration::from_secs(8))).await?;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::agent_client::{AgentClient, AgentClientError};
use crate::driver::{AutomationDriver, DriverError};
use crate::element::{ElementQuery, UIElement};
use crate::protocol::{Reply, Request};

/// Deadline for requests that do not carry their own.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Headroom added to an agent-side wait before the host gives up on the reply.
const AGENT_WAIT_SLACK: Duration = Duration::from_secs(5);

fn map_client_error(err: AgentClientError) -> DriverError {
    match err {
        AgentClientError::Closed => DriverError::NotConnected,
        AgentClientError::Connect { .. } => DriverError::ConnectFailed(err.to_string()),
        AgentClientError::Io(e) => DriverError::Io(e),
        AgentClientError::Protocol(e) => DriverError::CommandFailed(e.to_string()),
        AgentClientError::Refused { message, .. } => DriverError::CommandFailed(message),
        AgentClientError::TimedOut(d) => DriverError::Timeout(d),
    }
}

fn unexpected(request: &Request, reply: Reply) -> DriverError {
    DriverError::CommandFailed(format!("unexpected reply to {}: {reply:?}", request.name()))
}

/// Drives the app through an agent reachable over TCP.
///
/// The driver never reconnects. Once a call fails below the agent's own
/// error replies, every later call reports [`DriverError::NotConnected`].
pub struct AgentDriver {
    addr: SocketAddr,
    client: Mutex<AgentClient>,
}

impl AgentDriver {
    /// Resolve `host:port`, connect, and prove the agent is alive with a heartbeat.
    #[instrument(level = "debug")]
    pub async fn connect(host: &str, port: u16) -> Result<Self, DriverError> {
        let host_port = format!("{host}:{port}");
        let addr = tokio::net::lookup_host(&host_port)
            .await
            .map_err(|e| DriverError::ConnectFailed(format!("{host_port}: {e}")))?
            .next()
            .ok_or_else(|| DriverError::ConnectFailed(format!("could not resolve {host_port}")))?;

        let client = AgentClient::connect(addr).await.map_err(map_client_error)?;
        let driver = Self::with_client(addr, client);
        driver.expect_ok(Request::Heartbeat, REQUEST_TIMEOUT).await?;
        debug!(%addr, "agent is up");
        Ok(driver)
    }

    pub(crate) fn with_client(addr: SocketAddr, client: AgentClient) -> Self {
        Self { addr, client: Mutex::new(client) }
    }

    async fn call(&self, request: &Request, deadline: Duration) -> Result<Reply, DriverError> {
        self.client.lock().await.call(request, deadline).await.map_err(map_client_error)
    }

    async fn expect_ok(&self, request: Request, deadline: Duration) -> Result<(), DriverError> {
        match self.call(&request, deadline).await? {
            Reply::Ok => Ok(()),
            other => Err(unexpected(&request, other)),
        }
    }
}

#[async_trait]
impl AutomationDriver for AgentDriver {
    #[instrument(skip(self), fields(agent = %self.addr), level = "debug")]
    async fn tap_at(&self, x: i32, y: i32) -> Result<(), DriverError> {
        self.expect_ok(Request::TapAt { x, y }, REQUEST_TIMEOUT).await
    }

    #[instrument(skip(self), fields(agent = %self.addr), level = "debug")]
    async fn tap_label(&self, label: &str, wait: Option<Duration>) -> Result<(), DriverError> {
        let request = Request::TapLabel {
            label: label.to_string(),
            wait_ms: wait.map(|w| w.as_millis() as u64),
        };
        let deadline = wait.map_or(REQUEST_TIMEOUT, |w| w + AGENT_WAIT_SLACK);
        self.expect_ok(request, deadline).await
    }

    #[instrument(skip(self), fields(agent = %self.addr), level = "debug")]
    async fn dump_tree(&self) -> Result<Vec<UIElement>, DriverError> {
        let request = Request::DumpTree;
        match self.call(&request, REQUEST_TIMEOUT).await? {
            Reply::Tree(json) => {
                let elements: Vec<UIElement> = serde_json::from_str(&json)?;
                debug!(element_count = elements.len(), "tree dumped");
                Ok(elements)
            }
            other => Err(unexpected(&request, other)),
        }
    }

    #[instrument(skip(self), fields(agent = %self.addr), level = "debug")]
    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        let request = Request::Screenshot;
        match self.call(&request, REQUEST_TIMEOUT).await? {
            Reply::Png(data) => {
                debug!(bytes = data.len(), "screenshot captured");
                Ok(data)
            }
            other => Err(unexpected(&request, other)),
        }
    }

    /// Looks the element up on the agent instead of shipping the whole tree.
    #[instrument(skip(self), fields(agent = %self.addr), level = "trace")]
    async fn find_element(&self, query: &ElementQuery, budget: Duration) -> Result<Option<UIElement>, DriverError> {
        let request = Request::FindElement {
            identifier: query.identifier.clone(),
            element_type: query.element_type.clone(),
        };
        match self.call(&request, budget).await? {
            Reply::Element(json) => Ok(serde_json::from_str(&json)?),
            other => Err(unexpected(&request, other)),
        }
    }
}
