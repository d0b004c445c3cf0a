//! Typing indicators on both ends of the wire. Time is passed in so the
//! caller's clock (and tests) drive expiry.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use resortify_shared::constants::{TYPING_DEBOUNCE_MS, TYPING_IDLE_MS, TYPING_TTL_MS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    Start,
    Stop,
}

/// Writer side: at most one `Start` per debounce window while input keeps
/// coming, and a `Stop` after the idle period or on send.
#[derive(Debug)]
pub struct TypingDebouncer {
    debounce: Duration,
    idle: Duration,
    last_start: Option<Instant>,
    last_input: Option<Instant>,
}

impl Default for TypingDebouncer {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(TYPING_DEBOUNCE_MS),
            Duration::from_millis(TYPING_IDLE_MS),
        )
    }
}

impl TypingDebouncer {
    pub fn new(debounce: Duration, idle: Duration) -> Self {
        Self {
            debounce,
            idle,
            last_start: None,
            last_input: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.last_start.is_some()
    }

    pub fn on_input(&mut self, now: Instant) -> Option<TypingSignal> {
        self.last_input = Some(now);
        match self.last_start {
            Some(started) if now.duration_since(started) < self.debounce => None,
            _ => {
                self.last_start = Some(now);
                Some(TypingSignal::Start)
            }
        }
    }

    /// Call on a timer; yields `Stop` once input has been idle long enough.
    pub fn poll(&mut self, now: Instant) -> Option<TypingSignal> {
        let last_input = self.last_input?;
        if self.is_active() && now.duration_since(last_input) >= self.idle {
            self.reset();
            return Some(TypingSignal::Stop);
        }
        None
    }

    pub fn on_send(&mut self) -> Option<TypingSignal> {
        let was_active = self.is_active();
        self.reset();
        was_active.then_some(TypingSignal::Stop)
    }

    /// When `poll` should next be called.
    pub fn deadline(&self) -> Option<Instant> {
        if !self.is_active() {
            return None;
        }
        self.last_input.map(|t| t + self.idle)
    }

    fn reset(&mut self) {
        self.last_start = None;
        self.last_input = None;
    }
}

/// Reader side: who is typing right now. Entries lapse after the TTL even if
/// the stop event never arrives.
#[derive(Debug)]
pub struct TypingIndicators {
    me: String,
    ttl: Duration,
    typing: HashMap<String, Instant>,
}

impl TypingIndicators {
    pub fn new(me: impl Into<String>) -> Self {
        Self::with_ttl(me, Duration::from_millis(TYPING_TTL_MS))
    }

    pub fn with_ttl(me: impl Into<String>, ttl: Duration) -> Self {
        Self {
            me: me.into(),
            ttl,
            typing: HashMap::new(),
        }
    }

    pub fn apply(&mut self, user_id: &str, active: bool, now: Instant) {
        if user_id == self.me {
            return;
        }
        if active {
            self.typing.insert(user_id.to_string(), now);
        } else {
            self.typing.remove(user_id);
        }
    }

    /// A message from someone means they stopped typing.
    pub fn clear(&mut self, user_id: &str) {
        self.typing.remove(user_id);
    }

    pub fn active_users(&mut self, now: Instant) -> Vec<String> {
        let ttl = self.ttl;
        self.typing.retain(|_, seen| now.duration_since(*seen) < ttl);
        let mut users: Vec<String> = self.typing.keys().cloned().collect();
        users.sort();
        users
    }
}
