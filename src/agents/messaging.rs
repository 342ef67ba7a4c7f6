// Messaging - In-process scatter/gather and fire-and-forget notifications
// Principle: A gather returns only once every recipient has answered
//
// `gather` is the synchronous barrier used by sub-protocols (collect every
// proposal before aggregating). `broadcast` is a notification with no reply;
// callers choose the delivery order and recipients must not rely on it.

use super::{Agent, AgentDecisionSource, DecisionContext};
use crate::governance::GovernanceKind;
use crate::types::{AgentId, Score, TeamId};
use std::collections::BTreeMap;
use tracing::trace;

/// Read-only snapshot of a team handed along with each request
#[derive(Debug, Clone, Copy)]
pub struct TeamView<'a> {
    pub team: TeamId,
    pub members: &'a [AgentId],
    pub common_pool: Score,
    pub kind: GovernanceKind,
}

/// Every agent in the simulation, keyed by id
#[derive(Debug, Default)]
pub struct Roster {
    agents: BTreeMap<AgentId, Agent>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, agent: Agent) {
        self.agents.insert(agent.id, agent);
    }

    pub fn get(&self, id: &AgentId) -> Option<&Agent> {
        self.agents.get(id)
    }

    pub fn get_mut(&mut self, id: &AgentId) -> Option<&mut Agent> {
        self.agents.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn ids(&self) -> Vec<AgentId> {
        self.agents.keys().copied().collect()
    }

    pub fn living_ids(&self) -> Vec<AgentId> {
        self.agents.values().filter(|a| a.alive).map(|a| a.id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Agent> {
        self.agents.values_mut()
    }

    pub fn score_of(&self, id: &AgentId) -> Score {
        self.agents.get(id).map(|a| a.score).unwrap_or(0)
    }

    /// One request/response with a single living agent
    pub fn ask<T, F>(&mut self, id: AgentId, view: TeamView<'_>, ask: F) -> Option<T>
    where
        F: FnOnce(&mut dyn AgentDecisionSource, &DecisionContext<'_>) -> T,
    {
        let agent = self.agents.get_mut(&id).filter(|a| a.alive)?;
        let ctx = DecisionContext {
            agent: agent.id,
            score: agent.score,
            view,
        };
        Some(ask(agent.source_mut(), &ctx))
    }

    /// Ask every living member in turn and collect all replies
    pub fn gather<T, F>(&mut self, members: &[AgentId], view: TeamView<'_>, mut ask: F) -> BTreeMap<AgentId, T>
    where
        F: FnMut(&mut dyn AgentDecisionSource, &DecisionContext<'_>) -> T,
    {
        let mut replies = BTreeMap::new();
        for &id in members {
            if let Some(reply) = self.ask(id, view, &mut ask) {
                replies.insert(id, reply);
            }
        }
        trace!("Gathered {} of {} replies in {}", replies.len(), members.len(), view.team);
        replies
    }

    /// Notify every living recipient except `sender`, in the given order
    pub fn broadcast<F>(&mut self, recipients: &[AgentId], sender: AgentId, mut notify: F)
    where
        F: FnMut(&mut dyn AgentDecisionSource),
    {
        for id in recipients.iter().filter(|id| **id != sender) {
            if let Some(agent) = self.agents.get_mut(id).filter(|a| a.alive) {
                notify(agent.source_mut());
            }
        }
    }
}
