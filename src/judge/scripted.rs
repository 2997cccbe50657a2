//! Judge with canned answers for unit tests

use super::{ClusterProposal, Judge, SkillNaming, Verdict};
use crate::actions::Operation;
use crate::core::error::Result;
use crate::core::types::{ClusterId, Screen};
use crate::memory::records::{Skill, SkillCluster};
use std::collections::VecDeque;

#[derive(Default)]
pub struct ScriptedJudge {
    pub cluster_choice: Option<ClusterId>,
    pub verdicts: VecDeque<Option<Verdict>>,
    pub namings: VecDeque<Option<SkillNaming>>,
    pub clustering: Option<Vec<ClusterProposal>>,
    pub merging: Option<Vec<ClusterProposal>>,
    pub operations: VecDeque<Option<Operation>>,
    pub progress: Option<bool>,
    /// Calls made, by method name
    pub calls: Vec<&'static str>,
}

impl ScriptedJudge {
    pub fn named(name: &str) -> SkillNaming {
        SkillNaming {
            name: name.to_string(),
            description: format!("{} on the current screen", name),
        }
    }
}

impl Judge for ScriptedJudge {
    fn select_cluster(
        &mut self,
        _task: &str,
        _clusters: &[SkillCluster],
        _screen: &Screen,
    ) -> Result<Option<ClusterId>> {
        self.calls.push("select_cluster");
        Ok(self.cluster_choice)
    }

    fn evaluate_skill(
        &mut self,
        _task: &str,
        _skill: &Skill,
        _before: &Screen,
        _after: &Screen,
    ) -> Result<Option<Verdict>> {
        self.calls.push("evaluate_skill");
        Ok(self.verdicts.pop_front().flatten())
    }

    fn name_skill(
        &mut self,
        _operations: &[Operation],
        _before: &Screen,
        _after: &Screen,
    ) -> Result<Option<SkillNaming>> {
        self.calls.push("name_skill");
        Ok(self.namings.pop_front().flatten())
    }

    fn cluster_skills(&mut self, _skills: &[Skill]) -> Result<Option<Vec<ClusterProposal>>> {
        self.calls.push("cluster_skills");
        Ok(self.clustering.clone())
    }

    fn merge_skills(
        &mut self,
        _clusters: &[SkillCluster],
        _skills: &[Skill],
    ) -> Result<Option<Vec<ClusterProposal>>> {
        self.calls.push("merge_skills");
        Ok(self.merging.clone())
    }

    fn propose_operation(&mut self, _task: &str, _screen: &Screen) -> Result<Option<Operation>> {
        self.calls.push("propose_operation");
        Ok(self.operations.pop_front().flatten())
    }

    fn evaluate_progress(
        &mut self,
        _task: &str,
        _before: &Screen,
        _after: &Screen,
    ) -> Result<Option<bool>> {
        self.calls.push("evaluate_progress");
        Ok(self.progress)
    }
}
