//! Notification and history logs.
//!
//! Every log here is a bounded ring buffer ordered most-recent-first.
//! Entries are immutable once pushed, apart from the read flag on messages.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::battle_log::LogEntry;
use crate::clock::Timestamp;
use crate::economy::ResourceKind;

/// Messages kept.
pub const MESSAGE_CAPACITY: usize = 50;
/// Battle records kept.
pub const BATTLE_HISTORY_CAPACITY: usize = 50;
/// NPC invasion results kept.
pub const INVASION_HISTORY_CAPACITY: usize = 20;

/// Fixed-capacity log, newest entry first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RingBuffer<T, const N: usize> {
    items: VecDeque<T>,
}

impl<T, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }
}

impl<T, const N: usize> RingBuffer<T, N> {
    /// Push to the front, evicting the oldest entry past capacity.
    pub fn push(&mut self, item: T) {
        self.items.push_front(item);
        self.items.truncate(N);
    }

    /// Entries, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Newest entry.
    #[must_use]
    pub fn latest(&self) -> Option<&T> {
        self.items.front()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Trim to capacity. Used after loading a save written with a larger cap.
    pub fn enforce_capacity(&mut self) {
        self.items.truncate(N);
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items.iter_mut()
    }
}

/// Severity of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Neutral notice.
    Info,
    /// Something went well.
    Success,
    /// Something needs attention.
    Warning,
    /// Village under attack.
    Danger,
}

/// Structured data attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePayload {
    /// No structured data.
    None,
    /// A neighbor appeared.
    NewNeighbor {
        /// The new neighbor.
        neighbor_id: u32,
    },
    /// A neighbor asked for a donation.
    DonationRequest {
        /// Request id.
        request_id: u64,
        /// Asking neighbor.
        neighbor_id: u32,
        /// Currency asked for.
        resource: ResourceKind,
        /// Amount asked for.
        amount: u64,
        /// Favor on fulfillment.
        reward: i32,
    },
    /// A donation request went unanswered.
    DonationExpired {
        /// Neighbor that asked.
        neighbor_id: u32,
    },
    /// A neighbor launched an invasion.
    Invasion {
        /// Attacking neighbor.
        neighbor_id: u32,
    },
    /// An NPC raiding party attacked.
    NpcInvasion {
        /// Attacker name.
        attacker: String,
    },
    /// An invasion was repelled.
    DefenseSuccess,
    /// An invasion got through.
    DefenseFail,
    /// A tree dropped gems.
    TreeReward {
        /// Gems found.
        gems: u64,
    },
}

/// One notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Monotonic id.
    pub id: u64,
    /// Severity.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Short title.
    pub title: String,
    /// Body text.
    pub content: String,
    /// Structured data.
    #[serde(default = "no_payload", rename = "data")]
    pub payload: MessagePayload,
    /// Creation time.
    #[serde(alias = "time")]
    pub at: Timestamp,
    /// Whether the player has seen it.
    #[serde(default)]
    pub read: bool,
}

const fn no_payload() -> MessagePayload {
    MessagePayload::None
}

/// Message inbox with an unread counter.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageLog {
    /// Messages, newest first.
    pub messages: RingBuffer<Message, MESSAGE_CAPACITY>,
    /// Unread count, including messages since evicted.
    pub unread: u32,
    /// Next message id.
    pub next_id: u64,
}

impl MessageLog {
    /// Append a message. Returns its id.
    pub fn push(
        &mut self,
        kind: MessageKind,
        title: impl Into<String>,
        content: impl Into<String>,
        payload: MessagePayload,
        at: Timestamp,
    ) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.messages.push(Message {
            id,
            kind,
            title: title.into(),
            content: content.into(),
            payload,
            at,
            read: false,
        });
        self.unread += 1;
        id
    }

    /// Mark one message read. Returns whether anything changed.
    pub fn mark_read(&mut self, id: u64) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id && !m.read) {
            Some(msg) => {
                msg.read = true;
                self.unread = self.unread.saturating_sub(1);
                true
            }
            None => false,
        }
    }

    /// Mark everything read.
    pub fn mark_all_read(&mut self) {
        for msg in self.messages.iter_mut() {
            msg.read = true;
        }
        self.unread = 0;
    }

    /// Drop every message.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.unread = 0;
    }
}

/// Which side the player was on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BattleKind {
    /// Player raided a neighbor.
    Attack,
    /// A neighbor invaded the player.
    Defense,
}

/// Resource movement from the player's point of view. Negative is a loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LootDelta {
    /// Gold.
    pub gold: i64,
    /// Elixir.
    pub elixir: i64,
    /// Dark elixir.
    pub dark: i64,
}

/// A finished battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleRecord {
    /// Monotonic id.
    pub id: u64,
    /// Attack or defense.
    #[serde(rename = "type")]
    pub kind: BattleKind,
    /// Opponent label.
    pub target: String,
    /// Whether the player won.
    pub victory: bool,
    /// Player-side power, whole units.
    pub player_power: u64,
    /// Opponent power, whole units.
    pub enemy_power: u64,
    /// Star rating for raids.
    #[serde(default)]
    pub stars: Option<u8>,
    /// Resources moved.
    #[serde(default)]
    pub loot: LootDelta,
    /// Narrative.
    #[serde(default)]
    pub battle_log: Vec<LogEntry>,
    /// When the battle ended.
    #[serde(alias = "time")]
    pub at: Timestamp,
}

/// Summary of an NPC invasion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvasionRecord {
    /// Attacker name.
    pub attacker_name: String,
    /// Attacker town level.
    pub attacker_town_level: u32,
    /// Whether the village held.
    pub defended: bool,
    /// Gold lost.
    pub gold_lost: u64,
    /// Elixir lost.
    pub elixir_lost: u64,
    /// Dark elixir lost.
    pub dark_lost: u64,
    /// Trophies lost.
    #[serde(default)]
    pub trophies_lost: u64,
    /// Final defense rate in whole percent.
    pub defense_rate: u32,
    /// When the invasion resolved.
    #[serde(alias = "time")]
    pub at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let mut rb: RingBuffer<u32, 3> = RingBuffer::default();
        for i in 0..5 {
            rb.push(i);
        }
        assert_eq!(rb.iter().copied().collect::<Vec<_>>(), vec![4, 3, 2]);
        assert_eq!(rb.latest(), Some(&4));
    }

    #[test]
    fn test_unread_counter() {
        let mut log = MessageLog::default();
        let a = log.push(MessageKind::Info, "a", "", MessagePayload::None, 1);
        let b = log.push(MessageKind::Info, "b", "", MessagePayload::None, 2);
        assert_ne!(a, b);
        assert_eq!(log.unread, 2);
        assert!(log.mark_read(a));
        assert!(!log.mark_read(a));
        assert_eq!(log.unread, 1);
        log.mark_all_read();
        assert_eq!(log.unread, 0);
        log.push(MessageKind::Danger, "c", "", MessagePayload::DefenseFail, 3);
        log.clear();
        assert!(log.messages.is_empty());
        assert_eq!(log.unread, 0);
    }

    #[test]
    fn test_message_capacity() {
        let mut log = MessageLog::default();
        for i in 0..(MESSAGE_CAPACITY as u64 + 10) {
            log.push(MessageKind::Info, "x", "", MessagePayload::None, i);
        }
        assert_eq!(log.messages.len(), MESSAGE_CAPACITY);
        assert_eq!(log.messages.latest().map(|m| m.at), Some(59));
    }

    #[test]
    fn test_payload_is_tagged() {
        let json = serde_json::to_value(MessagePayload::NewNeighbor { neighbor_id: 11 }).unwrap();
        assert_eq!(json["type"], "new_neighbor");
        assert_eq!(json["neighbor_id"], 11);
    }
}
