//! Tabular action-value store

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::default_action_priority;
use crate::encoder::StateKey;
use crate::Action;

/// One exported cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QEntry {
    pub state: StateKey,
    pub action: Action,
    pub value: f64,
}

/// Lazily grown map from (state, action) to estimated value.
///
/// Cells that were never written read as `initial_value`.
#[derive(Debug, Clone)]
pub struct QTable {
    values: HashMap<(StateKey, Action), f64>,
    initial_value: f64,
    priority: Vec<Action>,
}

impl Default for QTable {
    fn default() -> Self {
        QTable::new(0.0, default_action_priority())
    }
}

impl QTable {
    /// `priority` orders tie-breaks in `best_action`, earliest wins
    pub fn new(initial_value: f64, priority: Vec<Action>) -> Self {
        QTable {
            values: HashMap::new(),
            initial_value,
            priority,
        }
    }

    pub fn initial_value(&self) -> f64 {
        self.initial_value
    }

    pub fn value(&self, state: &StateKey, action: Action) -> f64 {
        self.values
            .get(&(*state, action))
            .copied()
            .unwrap_or(self.initial_value)
    }

    /// Overwrite a single cell
    pub fn set(&mut self, state: StateKey, action: Action, value: f64) {
        self.values.insert((state, action), value);
    }

    fn rank(&self, action: Action) -> usize {
        self.priority
            .iter()
            .position(|a| *a == action)
            .unwrap_or(self.priority.len())
    }

    /// Highest-valued action among `available`. Ties go to the action listed
    /// first in the priority order. Empty `available` yields Hold.
    pub fn best_action(&self, state: &StateKey, available: &[Action]) -> Action {
        let mut best: Option<(Action, f64)> = None;
        for &action in available {
            let value = self.value(state, action);
            best = match best {
                None => Some((action, value)),
                Some((current, current_value)) => {
                    if value > current_value
                        || (value == current_value && self.rank(action) < self.rank(current))
                    {
                        Some((action, value))
                    } else {
                        Some((current, current_value))
                    }
                }
            };
        }
        best.map_or(Action::Hold, |(action, _)| action)
    }

    /// max over `available` of Q(state, a); initial value when `available` is empty
    pub fn max_value(&self, state: &StateKey, available: &[Action]) -> f64 {
        available
            .iter()
            .map(|&a| self.value(state, a))
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.max(v))))
            .unwrap_or(self.initial_value)
    }

    /// Temporal-difference update of one cell. Returns the new value.
    ///
    /// `next` is the following state and the actions available from the
    /// resulting position; `None` marks a terminal transition.
    pub fn update(
        &mut self,
        state: StateKey,
        action: Action,
        reward: f64,
        next: Option<(&StateKey, &[Action])>,
        alpha: f64,
        gamma: f64,
    ) -> f64 {
        let current = self.value(&state, action);
        let target = match next {
            Some((next_state, next_available)) => {
                reward + gamma * self.max_value(next_state, next_available)
            }
            None => reward,
        };
        let updated = current + alpha * (target - current);
        self.values.insert((state, action), updated);
        updated
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Every written cell, sorted by state then action
    pub fn entries(&self) -> Vec<QEntry> {
        let mut entries: Vec<QEntry> = self
            .values
            .iter()
            .map(|(&(state, action), &value)| QEntry { state, action, value })
            .collect();
        entries.sort_by(|a, b| (a.state, a.action).cmp(&(b.state, b.action)));
        entries
    }
}
