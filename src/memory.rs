//! Sliding-window conversation memory.
//!
//! Keeps the most recent `window` question/answer turns, oldest first.
//! Pushing past the window evicts the oldest turn.

use std::collections::VecDeque;

use chrono::Utc;

use crate::models::{ChatMessage, Turn};

pub const DEFAULT_WINDOW: usize = 5;

#[derive(Debug, Clone)]
pub struct ConversationMemory {
    window: usize,
    turns: VecDeque<Turn>,
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl ConversationMemory {
    /// A window of zero is treated as one.
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            turns: VecDeque::with_capacity(window),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn push(&mut self, query: impl Into<String>, answer: impl Into<String>) {
        if self.turns.len() == self.window {
            self.turns.pop_front();
        }
        self.turns.push_back(Turn {
            query: query.into(),
            answer: answer.into(),
            asked_at: Utc::now(),
        });
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    /// The retained turns as alternating user/assistant messages.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.turns
            .iter()
            .flat_map(|t| {
                [
                    ChatMessage::user(t.query.as_str()),
                    ChatMessage::assistant(t.answer.as_str()),
                ]
            })
            .collect()
    }

    /// Plain-text rendering used inside prompts.
    pub fn transcript(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("Human: {}\nAssistant: {}", t.query, t.answer))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
