use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use super::channel::{
    Binding, BindingKind, Channel, ChannelCallback, ChannelInfo, ChannelOptions, ChannelState,
    PostgresChangesFilter,
};
use super::error::RealtimeError;
use super::message::{
    self, broadcast_payload, channel_for, topic_for, track_payload, PhoenixMessage,
};
use crate::stop_flag::StopFlag;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
type WsSender = futures_util::stream::SplitSink<WsStream, Message>;
type WsReceiver = futures_util::stream::SplitStream<WsStream>;

#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    pub heartbeat_interval: Duration,
    pub join_timeout: Duration,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(25),
            join_timeout: Duration::from_secs(10),
        }
    }
}

/// Build the websocket endpoint from the project url.
pub fn build_websocket_url(url: &str, api_key: &str) -> Result<Url, RealtimeError> {
    let mut ws_url = Url::parse(url).map_err(|_| RealtimeError::InvalidUrl(url.to_string()))?;
    let scheme = match ws_url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(RealtimeError::InvalidUrl(url.to_string())),
    };
    ws_url
        .set_scheme(scheme)
        .map_err(|_| RealtimeError::InvalidUrl(url.to_string()))?;
    let path = format!(
        "{}/realtime/v1/websocket",
        ws_url.path().trim_end_matches('/')
    );
    ws_url.set_path(&path);
    ws_url
        .query_pairs_mut()
        .clear()
        .append_pair("apikey", api_key)
        .append_pair("vsn", message::PROTOCOL_VERSION);
    Ok(ws_url)
}

struct Shared {
    outgoing: mpsc::UnboundedSender<PhoenixMessage>,
    channels: Mutex<BTreeMap<String, Channel>>,
    pending: Mutex<HashMap<String, oneshot::Sender<PhoenixMessage>>>,
    next_ref: AtomicU64,
    access_token: Mutex<Option<SecretString>>,
    stop: StopFlag,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    config: RealtimeConfig,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Shared {
    fn make_ref(&self) -> String {
        (self.next_ref.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn push(&self, msg: PhoenixMessage) -> Result<(), RealtimeError> {
        if self.stop.is_stopped() {
            return Err(RealtimeError::NotConnected);
        }
        self.outgoing
            .send(msg)
            .map_err(|_| RealtimeError::NotConnected)
    }

    /// Push and wait for the `phx_reply` carrying the same ref.
    async fn request(
        &self,
        msg: PhoenixMessage,
        timeout: Duration,
    ) -> Result<Option<PhoenixMessage>, RealtimeError> {
        let msg_ref = msg.msg_ref.clone().unwrap_or_default();
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(msg_ref.clone(), tx);

        if let Err(e) = self.push(msg) {
            lock(&self.pending).remove(&msg_ref);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(Some(reply)),
            Ok(Err(_)) => Err(RealtimeError::NotConnected),
            Err(_) => {
                lock(&self.pending).remove(&msg_ref);
                Ok(None)
            }
        }
    }

    fn handle_frame(&self, text: &str) {
        let msg: PhoenixMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Ignoring malformed realtime frame: {}", e);
                return;
            }
        };

        if msg.event == message::PHX_REPLY {
            if let Some(msg_ref) = &msg.msg_ref {
                if let Some(waiter) = lock(&self.pending).remove(msg_ref) {
                    let _ = waiter.send(msg);
                    return;
                }
            }
        }

        let Some(name) = channel_for(&msg.topic) else {
            debug!("Realtime {} on {}", msg.event, msg.topic);
            return;
        };

        let deliveries = {
            let mut channels = lock(&self.channels);
            let Some(channel) = channels.get_mut(name) else {
                debug!("Realtime {} for unknown channel {}", msg.event, name);
                return;
            };
            match msg.event.as_str() {
                message::PHX_CLOSE => {
                    channel.state = ChannelState::Closed;
                    Vec::new()
                }
                message::PHX_ERROR => {
                    warn!("Channel {} errored: {}", name, msg.payload);
                    channel.state = ChannelState::Errored;
                    Vec::new()
                }
                event => channel.route(event, &msg.payload),
            }
        };

        for (callback, event) in deliveries {
            callback(name, event);
        }
    }

    fn disconnected(&self) {
        self.stop.stop();
        for channel in lock(&self.channels).values_mut() {
            channel.state = ChannelState::Closed;
        }
        lock(&self.pending).clear();
    }
}

/// A websocket connection to the realtime service and the channels joined
/// over it. Cloning shares the connection.
#[derive(Clone)]
pub struct RealtimeClient {
    shared: Arc<Shared>,
    endpoint: String,
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("endpoint", &self.endpoint)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl RealtimeClient {
    pub async fn connect(
        url: &str,
        api_key: &str,
        config: RealtimeConfig,
    ) -> Result<Self, RealtimeError> {
        let ws_url = build_websocket_url(url, api_key)?;
        let mut endpoint = ws_url.clone();
        endpoint.set_query(None);
        info!("Connecting to realtime at {}", endpoint);

        let (ws_stream, _) = connect_async(ws_url.as_str()).await?;
        let (ws_sender, ws_receiver) = ws_stream.split();
        let (tx, rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            outgoing: tx,
            channels: Mutex::new(BTreeMap::new()),
            pending: Mutex::new(HashMap::new()),
            next_ref: AtomicU64::new(0),
            access_token: Mutex::new(None),
            stop: StopFlag::new(),
            tasks: Mutex::new(Vec::new()),
            config,
        });

        let tasks = vec![
            tokio::spawn(write_loop(ws_sender, rx, shared.stop.clone())),
            tokio::spawn(read_loop(ws_receiver, shared.clone())),
            tokio::spawn(heartbeat_loop(shared.clone())),
        ];
        *lock(&shared.tasks) = tasks;

        Ok(Self {
            shared,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_connected(&self) -> bool {
        !self.shared.stop.is_stopped()
    }

    /// Token sent with every join. `None` joins as the anon role.
    pub fn set_access_token(&self, token: Option<SecretString>) {
        *lock(&self.shared.access_token) = token;
    }

    /// Join `name`. An existing channel of that name is returned as is.
    pub async fn subscribe(
        &self,
        name: &str,
        options: ChannelOptions,
    ) -> Result<ChannelInfo, RealtimeError> {
        let topic = topic_for(name);
        let join_ref = self.shared.make_ref();

        {
            let mut channels = lock(&self.shared.channels);
            if let Some(existing) = channels.get(name) {
                return Ok(existing.info());
            }
            channels.insert(
                name.to_string(),
                Channel::new(name, topic.clone(), join_ref.clone(), options.clone()),
            );
        }

        let mut payload = json!({ "config": options.join_config() });
        if let Some(token) = lock(&self.shared.access_token).as_ref() {
            payload["access_token"] = Value::String(token.expose_secret().to_string());
        }
        let join = PhoenixMessage::new(topic, message::PHX_JOIN, payload)
            .with_ref(join_ref.clone())
            .with_join_ref(Some(join_ref));

        debug!("Joining channel {}", name);
        let reply = self
            .shared
            .request(join, self.shared.config.join_timeout)
            .await;

        let mut channels = lock(&self.shared.channels);
        match reply {
            Ok(Some(reply)) if reply.reply_status() == Some("ok") => {
                let channel = channels
                    .get_mut(name)
                    .ok_or_else(|| RealtimeError::UnknownChannel(name.to_string()))?;
                channel.state = ChannelState::Joined;
                Ok(channel.info())
            }
            Ok(Some(reply)) => {
                channels.remove(name);
                let response = reply.reply_response();
                let reason = response
                    .get("reason")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| response.to_string());
                Err(RealtimeError::JoinRejected {
                    channel: name.to_string(),
                    reason,
                })
            }
            Ok(None) => {
                channels.remove(name);
                Err(RealtimeError::JoinTimeout(name.to_string()))
            }
            Err(e) => {
                channels.remove(name);
                Err(e)
            }
        }
    }

    pub async fn unsubscribe(&self, name: &str) -> Result<(), RealtimeError> {
        let channel = lock(&self.shared.channels)
            .remove(name)
            .ok_or_else(|| RealtimeError::UnknownChannel(name.to_string()))?;
        debug!("Leaving channel {}", name);
        self.shared.push(
            PhoenixMessage::new(channel.topic, message::PHX_LEAVE, json!({}))
                .with_ref(self.shared.make_ref())
                .with_join_ref(Some(channel.join_ref)),
        )
    }

    /// Leave every channel, keeping the connection.
    pub async fn unsubscribe_all(&self) -> Result<(), RealtimeError> {
        let names: Vec<String> = lock(&self.shared.channels).keys().cloned().collect();
        for name in names {
            self.unsubscribe(&name).await?;
        }
        Ok(())
    }

    pub fn channels(&self) -> Vec<ChannelInfo> {
        lock(&self.shared.channels)
            .values()
            .map(Channel::info)
            .collect()
    }

    fn bind(&self, name: &str, kind: BindingKind, callback: ChannelCallback) -> Result<(), RealtimeError> {
        let mut channels = lock(&self.shared.channels);
        let channel = channels
            .get_mut(name)
            .ok_or_else(|| RealtimeError::UnknownChannel(name.to_string()))?;
        channel.bindings.push(Binding { kind, callback });
        Ok(())
    }

    /// Call `callback` for broadcasts named `event` (`*` for all).
    pub fn on_broadcast(
        &self,
        name: &str,
        event: &str,
        callback: ChannelCallback,
    ) -> Result<(), RealtimeError> {
        self.bind(name, BindingKind::Broadcast(event.to_string()), callback)
    }

    /// Call `callback` on presence sync, join and leave.
    pub fn on_presence(&self, name: &str, callback: ChannelCallback) -> Result<(), RealtimeError> {
        self.bind(name, BindingKind::Presence, callback)
    }

    /// The channel must have been joined with `filter` in its options for
    /// the server to send anything.
    pub fn on_postgres_changes(
        &self,
        name: &str,
        filter: PostgresChangesFilter,
        callback: ChannelCallback,
    ) -> Result<(), RealtimeError> {
        self.bind(name, BindingKind::PostgresChanges(filter), callback)
    }

    pub fn on_system(&self, name: &str, callback: ChannelCallback) -> Result<(), RealtimeError> {
        self.bind(name, BindingKind::System, callback)
    }

    fn joined(&self, name: &str) -> Result<(String, String, bool), RealtimeError> {
        let channels = lock(&self.shared.channels);
        let channel = channels
            .get(name)
            .ok_or_else(|| RealtimeError::UnknownChannel(name.to_string()))?;
        Ok((
            channel.topic.clone(),
            channel.join_ref.clone(),
            channel.options.broadcast_ack,
        ))
    }

    pub async fn send_broadcast(
        &self,
        name: &str,
        event: &str,
        payload: Value,
    ) -> Result<(), RealtimeError> {
        let (topic, join_ref, ack) = self.joined(name)?;
        let msg = PhoenixMessage::new(topic, message::BROADCAST, broadcast_payload(event, payload))
            .with_ref(self.shared.make_ref())
            .with_join_ref(Some(join_ref));
        if ack {
            match self
                .shared
                .request(msg, self.shared.config.join_timeout)
                .await?
            {
                Some(_) => Ok(()),
                None => Err(RealtimeError::JoinTimeout(name.to_string())),
            }
        } else {
            self.shared.push(msg)
        }
    }

    pub async fn track(&self, name: &str, payload: Value) -> Result<(), RealtimeError> {
        let (topic, join_ref, _) = self.joined(name)?;
        self.shared.push(
            PhoenixMessage::new(topic, message::PRESENCE, track_payload(payload))
                .with_ref(self.shared.make_ref())
                .with_join_ref(Some(join_ref)),
        )
    }

    /// Store a new token and hand it to every joined channel.
    pub fn set_auth(&self, token: Option<SecretString>) -> Result<(), RealtimeError> {
        let value = token
            .as_ref()
            .map(|t| Value::String(t.expose_secret().to_string()))
            .unwrap_or(Value::Null);
        self.set_access_token(token);

        let joined: Vec<(String, String)> = lock(&self.shared.channels)
            .values()
            .filter(|c| c.state == ChannelState::Joined)
            .map(|c| (c.topic.clone(), c.join_ref.clone()))
            .collect();
        for (topic, join_ref) in joined {
            self.shared.push(
                PhoenixMessage::new(topic, message::ACCESS_TOKEN, json!({ "access_token": value }))
                    .with_ref(self.shared.make_ref())
                    .with_join_ref(Some(join_ref)),
            )?;
        }
        Ok(())
    }

    /// Leave all channels, stop the background tasks and close the socket.
    pub async fn close(&self) {
        if self.is_connected() {
            if let Err(e) = self.unsubscribe_all().await {
                debug!("Leaving channels on close: {}", e);
            }
        }
        self.shared.stop.stop();

        let tasks: Vec<JoinHandle<()>> = lock(&self.shared.tasks).drain(..).collect();
        for task in tasks {
            if tokio::time::timeout(Duration::from_secs(2), task).await.is_err() {
                warn!("Realtime task did not stop in time");
            }
        }
        self.shared.disconnected();
        info!("Realtime connection closed");
    }
}

async fn write_loop(
    mut sender: WsSender,
    mut outgoing: mpsc::UnboundedReceiver<PhoenixMessage>,
    stop: StopFlag,
) {
    loop {
        tokio::select! {
            biased;
            msg = outgoing.recv() => {
                let Some(msg) = msg else { break };
                let text = match serde_json::to_string(&msg) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to serialize realtime message: {}", e);
                        continue;
                    }
                };
                if let Err(e) = sender.send(Message::Text(text.into())).await {
                    warn!("Realtime send failed: {}", e);
                    stop.stop();
                    break;
                }
            }
            _ = stop.wait() => break,
        }
    }
    let _ = sender.send(Message::Close(None)).await;
    let _ = sender.close().await;
}

async fn read_loop(mut receiver: WsReceiver, shared: Arc<Shared>) {
    loop {
        tokio::select! {
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => shared.handle_frame(&text),
                Some(Ok(Message::Close(_))) | None => {
                    info!("Realtime server closed the connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Realtime connection error: {}", e);
                    break;
                }
            },
            _ = shared.stop.wait() => break,
        }
    }
    shared.disconnected();
}

async fn heartbeat_loop(shared: Arc<Shared>) {
    let mut ticker = tokio::time::interval(shared.config.heartbeat_interval);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if shared.push(PhoenixMessage::heartbeat(shared.make_ref())).is_err() {
                    break;
                }
            }
            _ = shared.stop.wait() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_url() {
        let url = build_websocket_url("http://127.0.0.1:54321", "anon").unwrap();
        assert_eq!(
            url.as_str(),
            "ws://127.0.0.1:54321/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );

        let url = build_websocket_url("https://abc.supabase.co/", "k").unwrap();
        assert_eq!(
            url.as_str(),
            "wss://abc.supabase.co/realtime/v1/websocket?apikey=k&vsn=1.0.0"
        );

        assert!(matches!(
            build_websocket_url("ftp://x", "k"),
            Err(RealtimeError::InvalidUrl(_))
        ));
    }
}
