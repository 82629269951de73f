//! Shared fixtures for loopcheck-core integration tests.
//!
//! Two stand-ins for the video player app:
//!
//! - [`ScriptedPlayer`]: an in-memory [`AutomationDriver`] whose loop counter
//!   is a function of (tokio) time since the play button was tapped. Pairs
//!   with paused-clock tests.
//! - [`fake_agent`]: a TCP server speaking the agent protocol and answering
//!   from the same kind of model, for driving the real [`AgentDriver`].
//!
//! Both screens carry a container that shares the counter's identifier but
//! is not a text element, as SwiftUI layouts often do.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::Instant;

use loopcheck_core::driver::{AutomationDriver, DriverError};
use loopcheck_core::element::{ElementFrame, ElementQuery, UIElement};
use loopcheck_core::protocol::{body_len, Reply, Request, HEADER_LEN};

pub const PLAY_LABEL: &str = "Video11";
pub const COUNTER_ID: &str = "loopCounterLabel";
pub const BACK_FRAME: ElementFrame = ElementFrame { x: 0.0, y: 47.0, width: 80.0, height: 44.0 };

/// Loop counter value as a function of time since playback started.
pub type CounterFn = Arc<dyn Fn(Duration) -> u64 + Send + Sync>;

/// Counter that reads `before` until `switch_at` has passed, then `after`.
pub fn step_counter(before: u64, after: u64, switch_at: Duration) -> CounterFn {
    Arc::new(move |elapsed| if elapsed < switch_at { before } else { after })
}

/// Counter that starts at 1 and goes up once per second of playback.
pub fn ticking_counter() -> CounterFn {
    Arc::new(|elapsed| 1 + elapsed.as_secs())
}

pub fn constant_counter(value: u64) -> CounterFn {
    Arc::new(move |_| value)
}

/// Everything the fake app tracks.
#[derive(Default)]
pub struct PlayerState {
    pub playing_since: Option<Instant>,
    pub label_taps: Vec<String>,
    pub coordinate_taps: Vec<(i32, i32)>,
    pub counter_lookups: u32,
}

/// Builds the accessibility tree of the player screen.
pub fn player_tree(counter_label: Option<String>) -> Vec<UIElement> {
    let mut children = vec![
        UIElement {
            identifier: Some(COUNTER_ID.to_string()),
            element_type: Some("Other".to_string()),
            ..Default::default()
        },
        UIElement {
            label: Some(PLAY_LABEL.to_string()),
            element_type: Some("NavigationBar".to_string()),
            children: vec![UIElement {
                label: Some("Back".to_string()),
                element_type: Some("Button".to_string()),
                frame: Some(BACK_FRAME),
                ..Default::default()
            }],
            ..Default::default()
        },
    ];
    if let Some(label) = counter_label {
        children.push(UIElement {
            identifier: Some(COUNTER_ID.to_string()),
            label: Some(label),
            element_type: Some("StaticText".to_string()),
            ..Default::default()
        });
    }
    vec![UIElement {
        element_type: Some("Window".to_string()),
        children,
        ..Default::default()
    }]
}

// ---------------------------------------------------------------------------
// In-memory driver
// ---------------------------------------------------------------------------

pub struct ScriptedPlayer {
    counter: CounterFn,
    /// When false the counter label never shows up.
    counter_visible: bool,
    pub state: Mutex<PlayerState>,
}

impl ScriptedPlayer {
    pub fn new(counter: CounterFn) -> Arc<Self> {
        Arc::new(Self { counter, counter_visible: true, state: Mutex::new(PlayerState::default()) })
    }

    pub fn without_counter() -> Arc<Self> {
        Arc::new(Self {
            counter: constant_counter(0),
            counter_visible: false,
            state: Mutex::new(PlayerState::default()),
        })
    }

    fn current_label(&self) -> Option<String> {
        let state = self.state.lock().unwrap();
        let since = state.playing_since?;
        if !self.counter_visible {
            return None;
        }
        Some(format!("Loop count {}", (self.counter)(since.elapsed())))
    }

    pub fn label_taps(&self) -> Vec<String> {
        self.state.lock().unwrap().label_taps.clone()
    }

    pub fn coordinate_taps(&self) -> Vec<(i32, i32)> {
        self.state.lock().unwrap().coordinate_taps.clone()
    }

    pub fn counter_lookups(&self) -> u32 {
        self.state.lock().unwrap().counter_lookups
    }
}

#[async_trait]
impl AutomationDriver for ScriptedPlayer {
    async fn tap_at(&self, x: i32, y: i32) -> Result<(), DriverError> {
        self.state.lock().unwrap().coordinate_taps.push((x, y));
        Ok(())
    }

    async fn tap_label(&self, label: &str, _wait: Option<Duration>) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        if label != PLAY_LABEL {
            return Err(DriverError::CommandFailed(format!("no element labelled '{label}'")));
        }
        state.label_taps.push(label.to_string());
        state.playing_since.get_or_insert_with(Instant::now);
        Ok(())
    }

    async fn dump_tree(&self) -> Result<Vec<UIElement>, DriverError> {
        Ok(player_tree(self.current_label()))
    }

    async fn find_element(&self, query: &ElementQuery, _budget: Duration) -> Result<Option<UIElement>, DriverError> {
        if query.identifier == COUNTER_ID {
            self.state.lock().unwrap().counter_lookups += 1;
        }
        let tree = self.dump_tree().await?;
        Ok(query.first_in(&tree).cloned())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        Ok(b"\x89PNG fake".to_vec())
    }
}

// ---------------------------------------------------------------------------
// Fake TCP agent
// ---------------------------------------------------------------------------

/// Starts a TCP agent that answers requests from a live player model.
///
/// Accepts one connection and serves until the peer hangs up. The returned
/// state can be inspected after the run.
pub async fn fake_agent(counter: CounterFn, counter_visible: bool) -> (SocketAddr, Arc<Mutex<PlayerState>>) {
    serve(counter, counter_visible, false).await
}

/// Like [`fake_agent`], but element lookups are read and never answered.
pub async fn stalling_agent(counter: CounterFn) -> (SocketAddr, Arc<Mutex<PlayerState>>) {
    serve(counter, true, true).await
}

async fn serve(counter: CounterFn, counter_visible: bool, stall_lookups: bool) -> (SocketAddr, Arc<Mutex<PlayerState>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(Mutex::new(PlayerState::default()));
    let shared = state.clone();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        loop {
            let mut header = [0u8; HEADER_LEN];
            if stream.read_exact(&mut header).await.is_err() {
                return;
            }
            let Ok(len) = body_len(header) else { return };
            let mut body = vec![0u8; len];
            if stream.read_exact(&mut body).await.is_err() {
                return;
            }
            let reply = match Request::decode(&body) {
                Ok(Request::FindElement { .. }) if stall_lookups => {
                    shared.lock().unwrap().counter_lookups += 1;
                    continue;
                }
                Ok(request) => answer(&shared, &counter, counter_visible, request),
                Err(e) => Reply::Error(e.to_string()),
            };
            if stream.write_all(&reply.encode()).await.is_err() {
                return;
            }
        }
    });

    (addr, state)
}

fn answer(state: &Mutex<PlayerState>, counter: &CounterFn, counter_visible: bool, request: Request) -> Reply {
    let mut state = state.lock().unwrap();
    let label = state
        .playing_since
        .filter(|_| counter_visible)
        .map(|since| format!("Loop count {}", counter(since.elapsed())));

    match request {
        Request::Heartbeat => Reply::Ok,
        Request::TapLabel { label: tapped, .. } if tapped == PLAY_LABEL => {
            state.label_taps.push(tapped);
            state.playing_since.get_or_insert_with(Instant::now);
            Reply::Ok
        }
        Request::TapLabel { label: tapped, .. } => Reply::Error(format!("element with label '{tapped}' not found")),
        Request::TapAt { x, y } => {
            state.coordinate_taps.push((x, y));
            Reply::Ok
        }
        Request::FindElement { identifier, element_type } => {
            if identifier == COUNTER_ID {
                state.counter_lookups += 1;
            }
            let query = ElementQuery { identifier, element_type };
            let tree = player_tree(label);
            Reply::Element(serde_json::to_string(&query.first_in(&tree)).unwrap())
        }
        Request::DumpTree => Reply::Tree(serde_json::to_string(&player_tree(label)).unwrap()),
        Request::Screenshot => Reply::Png(b"\x89PNG fake".to_vec()),
    }
}
