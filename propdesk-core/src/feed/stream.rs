//! Pushed aggregate-minute feed.
//!
//! Frames are JSON arrays of `{"ev":"AM",...}` bars and `{"ev":"status",...}`
//! notices, delivered through a channel. [`spawn_socket_reader`] fills the
//! channel from the websocket endpoint; [`spawn_line_reader`] covers any
//! line-framed reader (a pipe, a replay file).

use super::{Candle, FeedError, PriceFeed};
use crate::config::FeedConfig;
use chrono::DateTime;
use parking_lot::Mutex;
use serde::Deserialize;
use std::io::BufRead;
use std::net::TcpStream;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Error as WsError, Message, WebSocket};

/// Default endpoint of the futures aggregate stream.
pub const STREAM_URL: &str = "wss://socket.polygon.io/futures";

/// Subscription for every NQ contract's minute aggregates.
pub const NQ_AGGREGATES: &str = "AM.C:NQ*";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AggregateBar {
    #[serde(default)]
    pub sym: String,
    pub o: f64,
    pub h: f64,
    pub l: f64,
    pub c: f64,
    /// Bar start, epoch milliseconds.
    pub s: i64,
    #[serde(default)]
    pub e: Option<i64>,
}

impl AggregateBar {
    pub fn to_candle(&self) -> Option<Candle> {
        Some(Candle {
            time: DateTime::from_timestamp_millis(self.s)?,
            open: self.o,
            high: self.h,
            low: self.l,
            close: self.c,
            volume: 0.0,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "ev")]
pub enum StreamMessage {
    #[serde(rename = "status")]
    Status {
        status: String,
        #[serde(default)]
        message: String,
    },
    #[serde(rename = "AM")]
    Aggregate(AggregateBar),
    #[serde(other)]
    Other,
}

pub fn parse_frame(frame: &str) -> Result<Vec<StreamMessage>, FeedError> {
    serde_json::from_str(frame).map_err(|e| FeedError::ResponseFormat(e.to_string()))
}

pub fn auth_message(api_key: &str) -> String {
    serde_json::json!({ "action": "auth", "params": api_key }).to_string()
}

pub fn subscribe_message(params: &str) -> String {
    serde_json::json!({ "action": "subscribe", "params": params }).to_string()
}

/// Forward each non-empty line of `reader` as one frame. The channel closes
/// when the reader hits EOF or an I/O error.
pub fn spawn_line_reader<R>(reader: R) -> (Receiver<String>, JoinHandle<()>)
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        for line in reader.lines() {
            match line {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "stream reader stopped");
                    break;
                }
            }
        }
    });
    (rx, handle)
}

// ── Websocket transport ──

/// Where and how to connect the websocket reader.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEndpoint {
    pub url: String,
    pub api_key: String,
    /// Subscription sent once the server confirms authentication.
    pub subscription: String,
    /// Pause before reconnecting; `None` closes the channel on the first drop.
    pub reconnect: Option<Duration>,
}

impl StreamEndpoint {
    pub fn from_config(config: &FeedConfig, api_key: impl Into<String>) -> Self {
        Self {
            url: config.stream_url.clone(),
            api_key: api_key.into(),
            subscription: config.stream_subscription.clone(),
            reconnect: (config.stream_reconnect_secs > 0)
                .then(|| Duration::from_secs(config.stream_reconnect_secs)),
        }
    }
}

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

/// How one connection ended.
enum SessionEnd {
    /// The server or the network dropped the connection.
    Dropped,
    /// The frame receiver is gone; stop for good.
    ReceiverGone,
}

fn is_auth_success(frame: &str) -> bool {
    parse_frame(frame).is_ok_and(|messages| {
        messages
            .iter()
            .any(|m| matches!(m, StreamMessage::Status { status, .. } if status == "auth_success"))
    })
}

/// Authenticate, subscribe after `auth_success`, then forward every text
/// frame until the connection ends.
fn run_session(
    socket: &mut Socket,
    endpoint: &StreamEndpoint,
    tx: &Sender<String>,
) -> Result<SessionEnd, WsError> {
    socket.send(Message::Text(auth_message(&endpoint.api_key).into()))?;
    let mut subscribed = false;
    loop {
        let frame = match socket.read() {
            Ok(Message::Text(text)) => text.to_string(),
            Ok(Message::Close(frame)) => {
                debug!(?frame, "stream closed by server");
                return Ok(SessionEnd::Dropped);
            }
            Ok(_) => continue,
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => return Ok(SessionEnd::Dropped),
            Err(e) => return Err(e),
        };
        if !subscribed && is_auth_success(&frame) {
            socket.send(Message::Text(subscribe_message(&endpoint.subscription).into()))?;
            subscribed = true;
            info!(subscription = %endpoint.subscription, "stream subscribed");
        }
        if tx.send(frame).is_err() {
            return Ok(SessionEnd::ReceiverGone);
        }
    }
}

/// Connect to `endpoint` on a background thread and forward its frames.
///
/// The channel closes once the connection drops and reconnecting is
/// disabled, or when the receiver is dropped.
pub fn spawn_socket_reader(endpoint: StreamEndpoint) -> (Receiver<String>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || loop {
        match tungstenite::connect(endpoint.url.as_str()) {
            Ok((mut socket, _response)) => {
                info!(url = %endpoint.url, "stream connected");
                match run_session(&mut socket, &endpoint, &tx) {
                    Ok(SessionEnd::ReceiverGone) => {
                        let _ = socket.close(None);
                        return;
                    }
                    Ok(SessionEnd::Dropped) => warn!(url = %endpoint.url, "stream connection dropped"),
                    Err(e) => warn!(url = %endpoint.url, error = %e, "stream connection failed"),
                }
            }
            Err(e) => warn!(url = %endpoint.url, error = %e, "stream connect failed"),
        }
        match endpoint.reconnect {
            Some(delay) => thread::sleep(delay),
            None => return,
        }
    });
    (rx, handle)
}

// ── Feed ──

#[derive(Debug, Default)]
struct StreamState {
    authenticated: bool,
    last_bar: Option<AggregateBar>,
}

pub struct AggregateStreamFeed {
    frames: Mutex<Receiver<String>>,
    state: Mutex<StreamState>,
}

impl AggregateStreamFeed {
    pub fn new(frames: Receiver<String>) -> Self {
        Self { frames: Mutex::new(frames), state: Mutex::new(StreamState::default()) }
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.lock().authenticated
    }

    pub fn last_bar(&self) -> Option<AggregateBar> {
        self.state.lock().last_bar.clone()
    }

    fn apply(&self, frame: &str) {
        let messages = match parse_frame(frame) {
            Ok(messages) => messages,
            Err(e) => {
                warn!(error = %e, "malformed stream frame skipped");
                return;
            }
        };
        let mut state = self.state.lock();
        for message in messages {
            match message {
                StreamMessage::Status { status, message } => {
                    if status == "auth_success" {
                        state.authenticated = true;
                        info!("stream authenticated");
                    } else {
                        debug!(%status, %message, "stream status");
                    }
                }
                StreamMessage::Aggregate(bar) => state.last_bar = Some(bar),
                StreamMessage::Other => {}
            }
        }
    }

    /// Drain every queued frame. Returns false once the transport is gone.
    fn drain(&self) -> bool {
        let frames = self.frames.lock();
        loop {
            match frames.try_recv() {
                Ok(frame) => self.apply(&frame),
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }
}

impl PriceFeed for AggregateStreamFeed {
    fn name(&self) -> &str {
        "aggregate_stream"
    }

    fn fetch_price(&self) -> Result<f64, FeedError> {
        let connected = self.drain();
        match self.state.lock().last_bar.as_ref() {
            Some(bar) if connected => Ok(bar.c),
            _ if !connected => Err(FeedError::Disconnected),
            _ => Err(FeedError::NoData),
        }
    }

    fn is_available(&self) -> bool {
        true
    }
}
