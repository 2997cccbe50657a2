//! Judgment: the decisions the agent delegates to a language/vision model
//!
//! Every method returns `Ok(None)` when the judge declines or its reply
//! carries no usable decision. That is a soft failure the caller absorbs;
//! `Err` is reserved for calls that failed outright.

pub mod llm_judge;
pub mod prompts;
pub mod tools;

#[cfg(test)]
pub(crate) mod scripted;

pub use llm_judge::LlmJudge;

use crate::actions::Operation;
use crate::core::error::{AgentError, Result};
use crate::core::types::{ClusterId, Screen, SkillId};
use crate::llm::Usage;
use crate::memory::records::{Skill, SkillCluster};
use std::thread;
use std::time::Duration;
use tracing::warn;

/// Outcome judgement for one skill replay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    /// The screen changed the way the skill's description says it should
    pub consistent: bool,
    /// The change moves the game toward the task
    pub progressive: bool,
}

impl Verdict {
    /// Fitness earned by this verdict: one point per positive answer
    pub fn reward(&self) -> i64 {
        self.consistent as i64 + self.progressive as i64
    }

    pub fn is_success(&self) -> bool {
        self.consistent && self.progressive
    }
}

/// Name and description for a freshly tried operation sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillNaming {
    pub name: String,
    pub description: String,
}

/// One group in a clustering or merge answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterProposal {
    /// Existing cluster to merge into; `None` asks for a new cluster
    pub cluster_id: Option<ClusterId>,
    pub name: String,
    pub description: String,
    pub members: Vec<SkillId>,
}

/// Decision-making collaborator
pub trait Judge {
    /// Pick the cluster whose goal fits the current screen best
    fn select_cluster(
        &mut self,
        task: &str,
        clusters: &[SkillCluster],
        screen: &Screen,
    ) -> Result<Option<ClusterId>>;

    /// Judge a replayed skill from before/after screenshots
    fn evaluate_skill(
        &mut self,
        task: &str,
        skill: &Skill,
        before: &Screen,
        after: &Screen,
    ) -> Result<Option<Verdict>>;

    /// Name a newly tried operation sequence, or `None` if it is meaningless
    fn name_skill(
        &mut self,
        operations: &[Operation],
        before: &Screen,
        after: &Screen,
    ) -> Result<Option<SkillNaming>>;

    /// Partition ungrouped skills into clusters
    fn cluster_skills(&mut self, skills: &[Skill]) -> Result<Option<Vec<ClusterProposal>>>;

    /// Assign new skills to existing clusters or fresh ones
    fn merge_skills(
        &mut self,
        clusters: &[SkillCluster],
        skills: &[Skill],
    ) -> Result<Option<Vec<ClusterProposal>>>;

    /// Next operation to perform directly (baseline mode)
    fn propose_operation(&mut self, _task: &str, _screen: &Screen) -> Result<Option<Operation>> {
        Ok(None)
    }

    /// Whether the last operation made progress (baseline mode)
    fn evaluate_progress(
        &mut self,
        _task: &str,
        _before: &Screen,
        _after: &Screen,
    ) -> Result<Option<bool>> {
        Ok(None)
    }

    /// Index into `candidates` of the operation worth trying next
    fn guide_operation(
        &mut self,
        _task: &str,
        _candidates: &[Operation],
        _screen: &Screen,
    ) -> Result<Option<usize>> {
        Ok(None)
    }

    /// Tokens spent so far
    fn usage(&self) -> Usage {
        Usage::default()
    }
}

/// Run `call` up to `max_attempts` times, sleeping `backoff` between tries
///
/// Exhausting the attempts yields the fatal [`AgentError::JudgeExhausted`].
pub fn with_retries<T, F>(max_attempts: u32, backoff: Duration, mut call: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let attempts = max_attempts.max(1);
    let mut last_error = String::new();
    for attempt in 1..=attempts {
        match call() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(attempt, max_attempts = attempts, error = %e, "judge call failed");
                last_error = e.to_string();
                if attempt < attempts {
                    thread::sleep(backoff);
                }
            }
        }
    }
    Err(AgentError::JudgeExhausted {
        attempts,
        last_error,
    })
}
