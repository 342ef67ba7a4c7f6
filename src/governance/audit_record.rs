// Audit Record - Per-agent rolling ledger of infractions
// Principle: Consumed infractions are cleared so nobody is punished twice for the same turn

use crate::types::{AgentId, Score};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Default window (turns remembered per agent)
pub const DEFAULT_AUDIT_WINDOW: usize = 5;

/// Smallest allowed window
pub const MIN_AUDIT_WINDOW: usize = 1;

/// Rolling infraction ledger
///
/// Each agent owns a FIFO of infraction counters, one entry per recorded turn.
/// The FIFO never holds more than `duration` entries; the oldest is evicted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    records: BTreeMap<AgentId, VecDeque<u32>>,
    duration: usize,
    cost_per_turn: Score,
}

impl Default for AuditRecord {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIT_WINDOW, 1)
    }
}

impl AuditRecord {
    pub fn new(duration: usize, cost_per_turn: Score) -> Self {
        Self {
            records: BTreeMap::new(),
            duration: duration.max(MIN_AUDIT_WINDOW),
            cost_per_turn,
        }
    }

    /// Append one turn's entry for `agent`
    pub fn add_record(&mut self, agent: AgentId, infraction: bool) {
        let duration = self.duration;
        let queue = self.records.entry(agent).or_default();
        queue.push_back(u32::from(infraction));
        while queue.len() > duration {
            queue.pop_front();
        }
    }

    /// Add an infraction to the most recent entry (creates one if the agent has none)
    pub fn increment_last_record(&mut self, agent: AgentId) {
        let queue = self.records.entry(agent).or_default();
        match queue.back_mut() {
            Some(last) => *last = last.saturating_add(1),
            None => queue.push_back(1),
        }
    }

    pub fn get_last_record(&self, agent: &AgentId) -> Option<u32> {
        self.records.get(agent).and_then(|q| q.back().copied())
    }

    /// Sum of infractions inside the window
    pub fn get_all_infractions(&self, agent: &AgentId) -> u32 {
        self.records
            .get(agent)
            .map(|q| q.iter().copied().fold(0u32, u32::saturating_add))
            .unwrap_or(0)
    }

    /// Zero every entry in the agent's window (window length is kept)
    pub fn clear_all_infractions(&mut self, agent: &AgentId) {
        if let Some(queue) = self.records.get_mut(agent) {
            queue.iter_mut().for_each(|entry| *entry = 0);
        }
    }

    /// Read the window and clear it in one step
    pub fn take_infractions(&mut self, agent: &AgentId) -> u32 {
        let total = self.get_all_infractions(agent);
        self.clear_all_infractions(agent);
        total
    }

    pub fn audit_duration(&self) -> usize {
        self.duration
    }

    /// Resize the window; existing queues are trimmed from the front
    pub fn set_audit_duration(&mut self, duration: usize) {
        self.duration = duration.max(MIN_AUDIT_WINDOW);
        let duration = self.duration;
        for queue in self.records.values_mut() {
            while queue.len() > duration {
                queue.pop_front();
            }
        }
    }

    /// Cost of one audit: per-turn cost times the window, at least 1
    pub fn audit_cost(&self) -> Score {
        self.cost_per_turn
            .saturating_mul(self.duration as Score)
            .max(1)
    }

    /// Drop the ledgers of agents no longer on the team
    pub fn retain(&mut self, members: &[AgentId]) {
        self.records.retain(|agent, _| members.contains(agent));
    }
}
