//! Per-run state carried between steps

use crate::core::types::ClusterId;
use crate::judge::Verdict;
use crate::llm::Usage;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Counters accumulated over a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub steps: u64,
    pub explore_decisions: u64,
    pub exploit_decisions: u64,
    pub skills_generated: u64,
    pub skills_deleted: u64,
    pub clusters_deleted: u64,
    pub evaluations: u64,
    pub consistent: u64,
    pub progressive: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl RunStats {
    pub fn record_verdict(&mut self, verdict: &Verdict) {
        self.evaluations += 1;
        if verdict.consistent {
            self.consistent += 1;
        }
        if verdict.progressive {
            self.progressive += 1;
        }
    }

    /// Take the judge's running token totals
    pub fn record_usage(&mut self, usage: Usage) {
        self.input_tokens = usage.input_tokens;
        self.output_tokens = usage.output_tokens;
    }

    pub fn log(&self, step: u64) {
        info!(
            step,
            explore = self.explore_decisions,
            exploit = self.exploit_decisions,
            skills_generated = self.skills_generated,
            skills_deleted = self.skills_deleted,
            consistent = self.consistent,
            progressive = self.progressive,
            input_tokens = self.input_tokens,
            output_tokens = self.output_tokens,
            "run stats"
        );
    }
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Clusters set aside after exploration failed with confidence
    pub suspended_clusters: Vec<ClusterId>,
    /// Index of the next step
    pub step: u64,
    pub stats: RunStats,
}

impl Session {
    pub fn starting_at(step: u64) -> Self {
        Self {
            step,
            ..Self::default()
        }
    }

    pub fn suspend(&mut self, id: ClusterId) {
        if !self.suspended_clusters.contains(&id) {
            self.suspended_clusters.push(id);
            info!(cluster_id = %id, "cluster suspended");
        }
    }

    pub fn clear_suspensions(&mut self) {
        self.suspended_clusters.clear();
    }

    pub fn is_suspended(&self, id: ClusterId) -> bool {
        self.suspended_clusters.contains(&id)
    }
}
