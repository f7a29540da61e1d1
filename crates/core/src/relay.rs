//! Group-broadcast relay between simulated nodes and the master.
//!
//! The relay is a registry mapping channel names to subscriber queues:
//!
//! ```text
//! node_<id>  one node's private channel
//! nodes      every connected node
//! master     the controlling endpoint(s)
//! ```
//!
//! Nodes send to the master or to another node; the master sends commands to
//! one node or to all of them. Delivery is at-most-once with no ordering
//! guarantee across channels and nothing is kept for endpoints that are not
//! connected.
//!
//! While the failure switch is on, node messages bound for the master are
//! dropped and reported as `DropReason::SimulatedOutage`, which callers can
//! tell apart from a packet lost by the transmission simulator.

use crate::error::{RelayError, Result};
use crate::transmission::FailureSwitch;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

/// Channel every master endpoint joins.
pub const MASTER: &str = "master";

/// Channel every node endpoint joins.
pub const NODES: &str = "nodes";

/// Target name a master uses to address every node.
pub const ALL_NODES: &str = "all";

/// Private channel of one node.
pub fn node_channel(node_id: &str) -> String {
    format!("node_{node_id}")
}

/// A relayed message as seen by the receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: String,
    pub message: Value,
}

/// Why a published message reached nobody.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    NoSubscribers,
    SimulatedOutage,
}

/// Result of one publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "delivery", rename_all = "snake_case")]
pub enum Delivery {
    Delivered { recipients: usize },
    Dropped { reason: DropReason },
}

/// Reply to a master command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandAck {
    pub status: String,
    pub command: String,
    pub target: String,
    pub delivery: Delivery,
}

/// Frame a node sends: `{"target": ..., "message": ...}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeFrame {
    #[serde(default)]
    pub target: Option<Value>,
    #[serde(default)]
    pub message: Value,
}

/// Frame the master sends: `{"command": ..., "target": ...}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MasterFrame {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub target: Option<Value>,
}

type SubscriberId = u64;
type Registry = HashMap<String, HashMap<SubscriberId, UnboundedSender<Envelope>>>;

#[derive(Debug)]
struct Shared {
    channels: Mutex<Registry>,
    next_id: AtomicU64,
    failure: Option<Arc<dyn FailureSwitch>>,
}

/// Channel registry with fan-out publish.
///
/// Cheap to clone; all clones share one registry.
#[derive(Debug, Clone)]
pub struct Relay {
    shared: Arc<Shared>,
}

impl Relay {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Drop master-bound traffic while `switch` reports an outage.
    pub fn with_failure_switch(switch: Arc<dyn FailureSwitch>) -> Self {
        Self::build(Some(switch))
    }

    fn build(failure: Option<Arc<dyn FailureSwitch>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                channels: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                failure,
            }),
        }
    }

    /// A fresh endpoint subscribed to nothing.
    pub fn endpoint(&self, name: impl Into<String>) -> Endpoint {
        let (tx, rx) = mpsc::unbounded_channel();
        Endpoint {
            id: self.shared.next_id.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            tx,
            rx,
            joined: BTreeSet::new(),
            relay: self.clone(),
        }
    }

    /// Endpoint for node `node_id`, joined to its own channel and `nodes`.
    pub fn connect_node(&self, node_id: &str) -> Endpoint {
        let mut endpoint = self.endpoint(node_id);
        endpoint.join(&node_channel(node_id));
        endpoint.join(NODES);
        info!(node_id, "node connected");
        endpoint
    }

    /// Endpoint for the master, joined to `master`.
    pub fn connect_master(&self) -> Endpoint {
        let mut endpoint = self.endpoint(MASTER);
        endpoint.join(MASTER);
        info!("master connected");
        endpoint
    }

    /// Deliver `envelope` to every current subscriber of `channel`.
    ///
    /// Subscribers whose endpoint has gone away are pruned.
    pub fn publish(&self, channel: &str, envelope: Envelope) -> Delivery {
        let mut channels = self.lock();
        let Some(subscribers) = channels.get_mut(channel) else {
            debug!(channel, "publish to empty channel");
            return Delivery::Dropped {
                reason: DropReason::NoSubscribers,
            };
        };

        subscribers.retain(|_, tx| tx.send(envelope.clone()).is_ok());
        let recipients = subscribers.len();
        if recipients == 0 {
            channels.remove(channel);
            return Delivery::Dropped {
                reason: DropReason::NoSubscribers,
            };
        }

        debug!(channel, recipients, from = %envelope.from, "published");
        Delivery::Delivered { recipients }
    }

    /// Route a node's message to the master or to another node.
    ///
    /// # Errors
    /// `RelayError::NoTarget` if `target` is empty.
    pub fn route_from_node(&self, node_id: &str, target: &str, message: Value) -> Result<Delivery> {
        if target.is_empty() {
            return Err(RelayError::NoTarget.into());
        }

        let envelope = Envelope {
            from: node_id.to_string(),
            message,
        };

        if target == MASTER {
            if self.is_failing() {
                warn!(node_id, "dropping master-bound message: simulated failure is active");
                return Ok(Delivery::Dropped {
                    reason: DropReason::SimulatedOutage,
                });
            }
            return Ok(self.publish(MASTER, envelope));
        }

        Ok(self.publish(&node_channel(target), envelope))
    }

    /// Send a master command to one node, or to every node with target `all`.
    ///
    /// # Errors
    /// `RelayError::NoCommand` if `command` is empty.
    pub fn command_from_master(&self, command: &str, target: &str) -> Result<CommandAck> {
        if command.is_empty() {
            return Err(RelayError::NoCommand.into());
        }

        let channel = if target == ALL_NODES {
            NODES.to_string()
        } else {
            node_channel(target)
        };
        let delivery = self.publish(
            &channel,
            Envelope {
                from: MASTER.to_string(),
                message: Value::String(command.to_string()),
            },
        );

        Ok(CommandAck {
            status: "Command sent".to_string(),
            command: command.to_string(),
            target: target.to_string(),
            delivery,
        })
    }

    /// Handle a raw frame from node `node_id`.
    pub fn handle_node_frame(&self, node_id: &str, frame: NodeFrame) -> Result<Delivery> {
        let target = frame.target.as_ref().and_then(target_name).unwrap_or_default();
        self.route_from_node(node_id, &target, frame.message)
    }

    /// Handle a raw frame from the master.
    pub fn handle_master_frame(&self, frame: MasterFrame) -> Result<CommandAck> {
        let command = frame.command.unwrap_or_default();
        let target = frame.target.as_ref().and_then(target_name).unwrap_or_default();
        self.command_from_master(&command, &target)
    }

    /// Number of live subscribers on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.lock().get(channel).map_or(0, HashMap::len)
    }

    fn join(&self, channel: &str, id: SubscriberId, tx: UnboundedSender<Envelope>) {
        self.lock().entry(channel.to_string()).or_default().insert(id, tx);
    }

    fn leave(&self, channel: &str, id: SubscriberId) {
        let mut channels = self.lock();
        if let Some(subscribers) = channels.get_mut(channel) {
            subscribers.remove(&id);
            if subscribers.is_empty() {
                channels.remove(channel);
            }
        }
    }

    fn is_failing(&self) -> bool {
        self.shared
            .failure
            .as_ref()
            .is_some_and(|switch| switch.is_failing())
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.shared
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}

/// Targets arrive as strings or bare numbers.
fn target_name(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// One connected endpoint and its inbox.
///
/// Dropping the endpoint leaves every channel it joined.
#[derive(Debug)]
pub struct Endpoint {
    id: SubscriberId,
    name: String,
    tx: UnboundedSender<Envelope>,
    rx: UnboundedReceiver<Envelope>,
    joined: BTreeSet<String>,
    relay: Relay,
}

impl Endpoint {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn join(&mut self, channel: &str) {
        if self.joined.insert(channel.to_string()) {
            self.relay.join(channel, self.id, self.tx.clone());
        }
    }

    pub fn leave(&mut self, channel: &str) {
        if self.joined.remove(channel) {
            self.relay.leave(channel, self.id);
        }
    }

    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.joined.iter().map(String::as_str)
    }

    /// Wait for the next message.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    /// Take the next message if one is queued.
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        for channel in std::mem::take(&mut self.joined) {
            self.relay.leave(&channel, self.id);
        }
        debug!(name = %self.name, "endpoint disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::transmission::AtomicFailureSwitch;
    use serde_json::json;

    #[tokio::test]
    async fn test_node_to_master() {
        let relay = Relay::new();
        let mut master = relay.connect_master();
        let _node = relay.connect_node("1");

        let delivery = relay.route_from_node("1", MASTER, json!("hello")).unwrap();
        assert_eq!(delivery, Delivery::Delivered { recipients: 1 });

        let envelope = master.recv().await.unwrap();
        assert_eq!(envelope.from, "1");
        assert_eq!(envelope.message, json!("hello"));
    }

    #[tokio::test]
    async fn test_node_to_node() {
        let relay = Relay::new();
        let _a = relay.connect_node("1");
        let mut b = relay.connect_node("2");

        relay.route_from_node("1", "2", json!({"bits": "1011"})).unwrap();

        let envelope = b.recv().await.unwrap();
        assert_eq!(envelope.from, "1");
        assert_eq!(envelope.message, json!({"bits": "1011"}));
    }

    #[test]
    fn test_missing_target() {
        let relay = Relay::new();
        let result = relay.route_from_node("1", "", json!("x"));
        assert!(matches!(result, Err(Error::Relay(RelayError::NoTarget))));

        let result = relay.handle_node_frame("1", NodeFrame::default());
        assert!(matches!(result, Err(Error::Relay(RelayError::NoTarget))));
    }

    #[test]
    fn test_broadcast_to_all_nodes() {
        let relay = Relay::new();
        let mut nodes: Vec<_> = ["1", "2", "3"].iter().map(|id| relay.connect_node(id)).collect();

        let ack = relay.command_from_master("start", ALL_NODES).unwrap();
        assert_eq!(ack.status, "Command sent");
        assert_eq!(ack.delivery, Delivery::Delivered { recipients: 3 });

        for node in &mut nodes {
            let envelope = node.try_recv().unwrap();
            assert_eq!(envelope.from, MASTER);
            assert_eq!(envelope.message, json!("start"));
        }
    }

    #[test]
    fn test_command_to_one_node() {
        let relay = Relay::new();
        let mut a = relay.connect_node("1");
        let mut b = relay.connect_node("2");

        relay.command_from_master("stop", "2").unwrap();
        assert!(a.try_recv().is_none());
        assert_eq!(b.try_recv().unwrap().message, json!("stop"));
    }

    #[test]
    fn test_missing_command() {
        let relay = Relay::new();
        let result = relay.handle_master_frame(MasterFrame::default());
        assert!(matches!(result, Err(Error::Relay(RelayError::NoCommand))));
    }

    #[test]
    fn test_disconnect_leaves_channels() {
        let relay = Relay::new();
        let node = relay.connect_node("7");
        assert_eq!(relay.subscriber_count("node_7"), 1);
        assert_eq!(relay.subscriber_count(NODES), 1);

        drop(node);
        assert_eq!(relay.subscriber_count("node_7"), 0);
        assert_eq!(relay.subscriber_count(NODES), 0);

        let delivery = relay.route_from_node("1", "7", json!("anyone?")).unwrap();
        assert_eq!(
            delivery,
            Delivery::Dropped {
                reason: DropReason::NoSubscribers
            }
        );
    }

    #[test]
    fn test_leave_single_channel() {
        let relay = Relay::new();
        let mut node = relay.connect_node("4");
        node.leave(NODES);

        assert_eq!(node.channels().collect::<Vec<_>>(), vec!["node_4"]);
        assert_eq!(
            relay.command_from_master("ping", ALL_NODES).unwrap().delivery,
            Delivery::Dropped {
                reason: DropReason::NoSubscribers
            }
        );
        relay.command_from_master("ping", "4").unwrap();
        assert!(node.try_recv().is_some());
    }

    #[test]
    fn test_outage_drops_master_traffic() {
        let switch = Arc::new(AtomicFailureSwitch::new());
        let relay = Relay::with_failure_switch(switch.clone());
        let mut master = relay.connect_master();
        let mut peer = relay.connect_node("2");

        switch.set(true);
        let delivery = relay.route_from_node("1", MASTER, json!("lost")).unwrap();
        assert_eq!(
            delivery,
            Delivery::Dropped {
                reason: DropReason::SimulatedOutage
            }
        );
        assert!(master.try_recv().is_none());

        // node-to-node traffic is unaffected
        relay.route_from_node("1", "2", json!("still here")).unwrap();
        assert!(peer.try_recv().is_some());

        switch.set(false);
        relay.route_from_node("1", MASTER, json!("back")).unwrap();
        assert_eq!(master.try_recv().unwrap().message, json!("back"));
    }

    #[test]
    fn test_frames_accept_numeric_targets() {
        let relay = Relay::new();
        let mut node = relay.connect_node("3");

        let frame: MasterFrame = serde_json::from_value(json!({"command": "go", "target": 3})).unwrap();
        let ack = relay.handle_master_frame(frame).unwrap();
        assert_eq!(ack.target, "3");
        assert_eq!(node.try_recv().unwrap().message, json!("go"));

        let frame: NodeFrame =
            serde_json::from_value(json!({"target": "master", "message": "hi"})).unwrap();
        assert_eq!(
            relay.handle_node_frame("3", frame).unwrap(),
            Delivery::Dropped {
                reason: DropReason::NoSubscribers
            }
        );
    }
}
