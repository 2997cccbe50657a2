//! Exploitation: replaying a learned skill and scoring the outcome

use crate::actuation::{reset_episode, settle, Actuator};
use crate::agent::StepResult;
use crate::core::config::AgentConfig;
use crate::core::error::Result;
use crate::judge::{Judge, Verdict};
use crate::memory::records::Skill;
use crate::memory::MemoryStore;
use crate::perception::{acted, ground_operation, observe, Perception, TemplateGrounder};
use tracing::info;

#[derive(Debug, Clone)]
pub struct ExploitReport {
    pub result: StepResult,
    /// Skill with its evidence after this replay
    pub skill: Skill,
    /// Every step grounded and the screen changed
    pub acted: bool,
    pub verdict: Option<Verdict>,
}

pub struct ExploitLoop<'a> {
    pub config: &'a AgentConfig,
    pub store: &'a MemoryStore,
    pub grounder: &'a TemplateGrounder,
    pub perception: &'a mut dyn Perception,
    pub actuator: &'a mut dyn Actuator,
    pub judge: &'a mut dyn Judge,
}

impl<'a> ExploitLoop<'a> {
    fn report(&self, result: StepResult, skill: &Skill, acted: bool) -> ExploitReport {
        ExploitReport {
            result,
            skill: skill.clone(),
            acted,
            verdict: None,
        }
    }

    /// Replay `skill`, grounding each step on the live screen, then judge it
    ///
    /// Fitness rises by one per positive answer and the trial count by one;
    /// the update is stored whether the attempt continues or fails.
    pub fn exploit(&mut self, task: &str, skill: &Skill) -> Result<ExploitReport> {
        let origin = self.perception.window_origin();
        reset_episode(&mut *self.actuator, origin, &self.config.explore)?;
        let start = observe(&mut *self.perception)?;
        info!(skill_id = %skill.id, name = %skill.name, fitness = skill.fitness, trials = skill.trials, "replaying skill");

        for op in &skill.operations {
            let current = self.perception.capture_screen()?;
            let Some(grounded) = ground_operation(self.store, self.grounder, &current, op)? else {
                info!(skill_id = %skill.id, operation = %op, "replay lost its target");
                return Ok(self.report(StepResult::Fail, skill, false));
            };
            self.actuator.execute(&grounded, origin)?;
            settle(self.config.explore.replay_delay_secs);
        }
        let after = observe(&mut *self.perception)?;

        if !acted(
            &*self.perception,
            &start.screen,
            &after.screen,
            &self.config.perception,
        ) {
            info!(skill_id = %skill.id, "replay did not change the screen");
            return Ok(self.report(StepResult::Fail, skill, false));
        }
        if self.config.explore.close_evaluate {
            return Ok(self.report(StepResult::Continue, skill, true));
        }

        let Some(verdict) = self
            .judge
            .evaluate_skill(task, skill, &start.screen, &after.screen)?
        else {
            info!(skill_id = %skill.id, "judge gave no verdict");
            return Ok(self.report(StepResult::Fail, skill, true));
        };

        let mut updated = skill.clone();
        updated.fitness += verdict.reward();
        updated.trials += 1;
        self.store
            .update_skill_evidence(updated.id, updated.fitness, updated.trials)?;
        info!(
            skill_id = %updated.id,
            consistent = verdict.consistent,
            progressive = verdict.progressive,
            fitness = updated.fitness,
            trials = updated.trials,
            "skill evaluated"
        );

        let result = if verdict.is_success() {
            StepResult::Continue
        } else {
            StepResult::Fail
        };
        Ok(ExploitReport {
            result,
            skill: updated,
            acted: true,
            verdict: Some(verdict),
        })
    }
}
