use crate::error::{AppError, AppResult};
use crate::models::Notification;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::RwLock;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// A stream a client can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Personal inbox, `user:{id}`
    User(Uuid),
    /// Everything happening in one kameti, `kameti:{id}`
    Kameti(Uuid),
}

impl Channel {
    pub fn parse(s: &str) -> Option<Self> {
        let (prefix, id) = s.split_once(':')?;
        let id = Uuid::parse_str(id).ok()?;
        match prefix {
            "user" => Some(Channel::User(id)),
            "kameti" => Some(Channel::Kameti(id)),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::User(id) => write!(f, "user:{}", id),
            Channel::Kameti(id) => write!(f, "kameti:{}", id),
        }
    }
}

/// Decides whether the holder of a bearer token may listen on a channel
#[async_trait]
pub trait ChannelAuthorizer: Send + Sync {
    async fn authorize(&self, token: &str, channel: &Channel) -> bool;
}

/// WebSocket message types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsMessage {
    #[serde(rename = "subscribe")]
    Subscribe {
        channel: String, // "user:{id}" or "kameti:{id}"
        #[serde(default)]
        token: Option<String>,
    },
    #[serde(rename = "unsubscribe")]
    Unsubscribe {
        channel: String,
    },
    #[serde(rename = "notification")]
    Notification {
        channel: String,
        notification: Notification,
    },
    #[serde(rename = "payout_released")]
    PayoutReleased {
        channel: String,
        kameti_id: String,
        round: i32,
        recipient_id: String,
        amount: String,
    },
    #[serde(rename = "kameti_updated")]
    KametiUpdated {
        channel: String,
        kameti_id: String,
        status: String,
        current_round: i32,
    },
    #[serde(rename = "error")]
    Error {
        message: String,
    },
}

impl WsMessage {
    /// Channel a server-pushed message belongs to
    pub fn channel(&self) -> Option<&str> {
        match self {
            WsMessage::Notification { channel, .. }
            | WsMessage::PayoutReleased { channel, .. }
            | WsMessage::KametiUpdated { channel, .. } => Some(channel),
            _ => None,
        }
    }
}

/// WebSocket hub pushing notifications and kameti events to subscribers
pub struct WebSocketServer {
    /// Broadcast sender for sending messages to all clients
    tx: broadcast::Sender<WsMessage>,
    /// Active subscriptions: channel -> client IDs
    subscriptions: Arc<RwLock<HashMap<String, Vec<Uuid>>>>,
    /// Client subscriptions: client_id -> channels
    client_channels: Arc<RwLock<HashMap<Uuid, Vec<String>>>>,
    authorizer: Option<Arc<dyn ChannelAuthorizer>>,
}

impl WebSocketServer {
    /// Create a hub that refuses every subscription until an authorizer is set
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1000); // Buffer up to 1000 messages

        Self {
            tx,
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            client_channels: Arc::new(RwLock::new(HashMap::new())),
            authorizer: None,
        }
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn ChannelAuthorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    /// Get broadcast sender
    pub fn sender(&self) -> broadcast::Sender<WsMessage> {
        self.tx.clone()
    }

    /// Broadcast a message to all subscribers of its channel
    pub async fn broadcast(&self, message: WsMessage) {
        let Some(channel) = message.channel() else {
            return;
        };

        let subscriptions = self.subscriptions.read().await;
        let count = subscriptions.get(channel).map_or(0, Vec::len);
        if count == 0 {
            return;
        }

        debug!("Broadcasting to {} subscribers on channel {}", count, channel);
        if let Err(e) = self.tx.send(message.clone()) {
            warn!("Failed to broadcast message: {}", e);
        }
    }

    /// Subscribe a client to a channel
    pub async fn subscribe(&self, client_id: Uuid, channel: String) {
        let mut subscriptions = self.subscriptions.write().await;
        let mut client_channels = self.client_channels.write().await;

        let subscribers = subscriptions.entry(channel.clone()).or_default();
        if !subscribers.contains(&client_id) {
            subscribers.push(client_id);
        }

        let channels = client_channels.entry(client_id).or_default();
        if !channels.contains(&channel) {
            channels.push(channel.clone());
        }

        info!("Client {} subscribed to {}", client_id, channel);
    }

    /// Check the token against the channel, then subscribe
    pub async fn authorize_and_subscribe(
        &self,
        client_id: Uuid,
        channel: &str,
        token: Option<&str>,
    ) -> Result<(), String> {
        let parsed = Channel::parse(channel).ok_or_else(|| format!("Unknown channel: {}", channel))?;
        let token = token.ok_or_else(|| "A token is required to subscribe".to_string())?;
        let authorizer = self
            .authorizer
            .as_ref()
            .ok_or_else(|| "Subscriptions are not available".to_string())?;

        if !authorizer.authorize(token, &parsed).await {
            return Err(format!("Not allowed to subscribe to {}", channel));
        }

        self.subscribe(client_id, parsed.to_string()).await;
        Ok(())
    }

    /// Unsubscribe a client from a channel
    pub async fn unsubscribe(&self, client_id: Uuid, channel: &str) {
        let mut subscriptions = self.subscriptions.write().await;
        let mut client_channels = self.client_channels.write().await;

        if let Some(subscribers) = subscriptions.get_mut(channel) {
            subscribers.retain(|&id| id != client_id);
            if subscribers.is_empty() {
                subscriptions.remove(channel);
            }
        }

        if let Some(channels) = client_channels.get_mut(&client_id) {
            channels.retain(|c| c != channel);
        }

        info!("Client {} unsubscribed from {}", client_id, channel);
    }

    /// Drop every subscription a client holds
    pub async fn disconnect(&self, client_id: Uuid) {
        let channels = self.get_client_channels(client_id).await;
        for channel in channels {
            self.unsubscribe(client_id, &channel).await;
        }
        self.client_channels.write().await.remove(&client_id);
    }

    /// Get all channels a client is subscribed to
    pub async fn get_client_channels(&self, client_id: Uuid) -> Vec<String> {
        let client_channels = self.client_channels.read().await;
        client_channels.get(&client_id).cloned().unwrap_or_default()
    }

    /// Check if client is subscribed to a channel
    pub async fn is_client_subscribed(&self, client_id: Uuid, channel: &str) -> bool {
        let subscriptions = self.subscriptions.read().await;
        subscriptions
            .get(channel)
            .is_some_and(|subscribers| subscribers.contains(&client_id))
    }

    /// Handle a new WebSocket connection
    pub async fn handle_connection(&self, stream: tokio::net::TcpStream) -> AppResult<()> {
        let ws_stream = accept_async(stream)
            .await
            .map_err(|e| AppError::Message(format!("WebSocket handshake failed: {}", e)))?;

        let (ws_sender, mut ws_receiver) = ws_stream.split();
        let mut rx = self.tx.subscribe();
        let client_id = Uuid::new_v4();

        info!("New WebSocket connection: {}", client_id);

        // Both tasks write to the socket
        let ws_sender = Arc::new(tokio::sync::Mutex::new(ws_sender));

        let welcome = serde_json::json!({
            "type": "connected",
            "client_id": client_id.to_string(),
        });
        if let Err(e) = ws_sender.lock().await.send(Message::Text(welcome.to_string())).await {
            warn!("Failed to send welcome message: {}", e);
        }

        let hub = self.clone();
        let sender = ws_sender.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_receiver.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        let reply = match serde_json::from_str::<WsMessage>(&text) {
                            Ok(WsMessage::Subscribe { channel, token }) => {
                                match hub
                                    .authorize_and_subscribe(client_id, &channel, token.as_deref())
                                    .await
                                {
                                    Ok(()) => serde_json::json!({
                                        "type": "subscribed",
                                        "channel": channel,
                                    }),
                                    Err(message) => {
                                        warn!("Client {} refused on {}: {}", client_id, channel, message);
                                        serde_json::json!({ "type": "error", "message": message })
                                    }
                                }
                            }
                            Ok(WsMessage::Unsubscribe { channel }) => {
                                hub.unsubscribe(client_id, &channel).await;
                                serde_json::json!({
                                    "type": "unsubscribed",
                                    "channel": channel,
                                })
                            }
                            Ok(_) => {
                                warn!("Unexpected message type from client {}", client_id);
                                serde_json::json!({
                                    "type": "error",
                                    "message": "Unsupported message type",
                                })
                            }
                            Err(_) => {
                                warn!("Failed to parse message from client {}: {}", client_id, text);
                                serde_json::json!({
                                    "type": "error",
                                    "message": "Invalid message format",
                                })
                            }
                        };

                        let mut sender = sender.lock().await;
                        if let Err(e) = sender.send(Message::Text(reply.to_string())).await {
                            warn!("Failed to reply to client {}: {}", client_id, e);
                        }
                    }
                    Ok(Message::Close(_)) => {
                        info!("WebSocket connection closed: {}", client_id);
                        break;
                    }
                    Err(e) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }

            hub.disconnect(client_id).await;
        });

        let hub = self.clone();
        tokio::spawn(async move {
            loop {
                let msg = match rx.recv().await {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Client {} lagged, {} messages dropped", client_id, skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                let should_send = match msg.channel() {
                    Some(channel) => hub.is_client_subscribed(client_id, channel).await,
                    None => false,
                };
                if !should_send {
                    continue;
                }

                let json = match serde_json::to_string(&msg) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize message: {}", e);
                        continue;
                    }
                };

                let mut sender = ws_sender.lock().await;
                if let Err(e) = sender.send(Message::Text(json)).await {
                    debug!("Stopped forwarding to client {}: {}", client_id, e);
                    break;
                }
            }
        });

        Ok(())
    }

    /// Push a stored notification to its owner's channel
    pub async fn push_notification(&self, notification: &Notification) {
        let message = WsMessage::Notification {
            channel: Channel::User(notification.user_id).to_string(),
            notification: notification.clone(),
        };
        self.broadcast(message).await;
    }

    pub async fn broadcast_payout_released(
        &self,
        kameti_id: Uuid,
        round: i32,
        recipient_id: Uuid,
        amount: rust_decimal::Decimal,
    ) {
        let message = WsMessage::PayoutReleased {
            channel: Channel::Kameti(kameti_id).to_string(),
            kameti_id: kameti_id.to_string(),
            round,
            recipient_id: recipient_id.to_string(),
            amount: amount.to_string(),
        };
        self.broadcast(message).await;
    }

    pub async fn broadcast_kameti_updated(&self, kameti_id: Uuid, status: &str, current_round: i32) {
        let message = WsMessage::KametiUpdated {
            channel: Channel::Kameti(kameti_id).to_string(),
            kameti_id: kameti_id.to_string(),
            status: status.to_string(),
            current_round,
        };
        self.broadcast(message).await;
    }
}

impl Clone for WebSocketServer {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            subscriptions: Arc::clone(&self.subscriptions),
            client_channels: Arc::clone(&self.client_channels),
            authorizer: self.authorizer.clone(),
        }
    }
}

impl Default for WebSocketServer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OwnerOnly {
        token: &'static str,
        user_id: Uuid,
    }

    #[async_trait]
    impl ChannelAuthorizer for OwnerOnly {
        async fn authorize(&self, token: &str, channel: &Channel) -> bool {
            token == self.token && *channel == Channel::User(self.user_id)
        }
    }

    fn notification(user_id: Uuid) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            user_id,
            kind: "payment".to_string(),
            title: "Payment received".to_string(),
            message: "Round 1 contribution received".to_string(),
            reference_id: None,
            dedupe_key: None,
            is_read: false,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }

    #[test]
    fn test_channel_parse() {
        let id = Uuid::new_v4();
        assert_eq!(Channel::parse(&format!("user:{}", id)), Some(Channel::User(id)));
        assert_eq!(Channel::parse(&format!("kameti:{}", id)), Some(Channel::Kameti(id)));
        assert_eq!(Channel::parse(&format!("event:{}", id)), None);
        assert_eq!(Channel::parse("user:not-a-uuid"), None);
        assert_eq!(Channel::User(id).to_string(), format!("user:{}", id));
    }

    #[test]
    fn test_subscribe_message_parses_without_token() {
        let msg: WsMessage =
            serde_json::from_str(r#"{"type":"subscribe","channel":"user:abc"}"#).unwrap();
        assert!(matches!(msg, WsMessage::Subscribe { token: None, .. }));
    }

    #[tokio::test]
    async fn test_subscribe_and_unsubscribe() {
        let hub = WebSocketServer::new();
        let client = Uuid::new_v4();

        hub.subscribe(client, "kameti:1".to_string()).await;
        hub.subscribe(client, "kameti:1".to_string()).await;
        assert!(hub.is_client_subscribed(client, "kameti:1").await);
        assert_eq!(hub.get_client_channels(client).await, vec!["kameti:1".to_string()]);

        hub.unsubscribe(client, "kameti:1").await;
        assert!(!hub.is_client_subscribed(client, "kameti:1").await);
    }

    #[tokio::test]
    async fn test_authorization_is_enforced() {
        let owner = Uuid::new_v4();
        let hub = WebSocketServer::new().with_authorizer(Arc::new(OwnerOnly {
            token: "secret",
            user_id: owner,
        }));
        let client = Uuid::new_v4();
        let own_channel = format!("user:{}", owner);
        let other_channel = format!("user:{}", Uuid::new_v4());

        assert!(hub.authorize_and_subscribe(client, &own_channel, None).await.is_err());
        assert!(hub
            .authorize_and_subscribe(client, &own_channel, Some("wrong"))
            .await
            .is_err());
        assert!(hub
            .authorize_and_subscribe(client, &other_channel, Some("secret"))
            .await
            .is_err());
        assert!(hub
            .authorize_and_subscribe(client, &own_channel, Some("secret"))
            .await
            .is_ok());
        assert!(hub.is_client_subscribed(client, &own_channel).await);
    }

    #[tokio::test]
    async fn test_hub_without_authorizer_refuses() {
        let hub = WebSocketServer::new();
        let channel = format!("user:{}", Uuid::new_v4());
        assert!(hub
            .authorize_and_subscribe(Uuid::new_v4(), &channel, Some("token"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_broadcast_only_reaches_subscribed_channels() {
        let hub = WebSocketServer::new();
        let mut rx = hub.sender().subscribe();
        let user = Uuid::new_v4();

        // Nobody listening on the channel yet
        hub.push_notification(&notification(user)).await;
        assert!(rx.try_recv().is_err());

        hub.subscribe(Uuid::new_v4(), format!("user:{}", user)).await;
        hub.push_notification(&notification(user)).await;

        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.channel(), Some(format!("user:{}", user).as_str()));
    }

    #[tokio::test]
    async fn test_disconnect_clears_subscriptions() {
        let hub = WebSocketServer::new();
        let client = Uuid::new_v4();
        hub.subscribe(client, "user:a".to_string()).await;
        hub.subscribe(client, "kameti:b".to_string()).await;

        hub.disconnect(client).await;

        assert!(hub.get_client_channels(client).await.is_empty());
        assert!(!hub.is_client_subscribed(client, "kameti:b").await);
    }
}
