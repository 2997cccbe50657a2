//! The agent step loop
//!
//! Each step resolves the current screen to a state, lets the judge pick one
//! of the state's skill clusters and then keeps choosing between the
//! cluster's skills and exploring until an attempt settles. Evolution runs on
//! the cluster afterwards.

pub mod controls;
pub mod session;

pub use controls::{prompt_channel, ControlKey, PromptLines, PromptSender, RunControls};
pub use session::{RunStats, Session};

use crate::actions::OperationKind;
use crate::actuation::{reset_episode, settle, Actuator};
use crate::core::config::AgentConfig;
use crate::core::error::Result;
use crate::core::types::{ClusterId, NodeId, SkillId};
use crate::exploit::ExploitLoop;
use crate::explore::{ExplorationEngine, ExploreReport};
use crate::guidance::OperationGuide;
use crate::judge::Judge;
use crate::memory::records::{Skill, SkillCluster, State};
use crate::memory::{MemoryStore, StateIndex};
use crate::perception::{observe, Perception, TemplateGrounder};
use crate::policy::{Choice, SelectionPolicy};
use crate::skills::{evolve, prune_clusters};
use tracing::{debug, info, warn};

/// Outcome of one attempt or one whole step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    Continue,
    /// Try another choice within the same step
    Retry,
    Fail,
    /// Exploration minted no skill
    ExploreFail,
}

/// Clusters still in play this session; all of them once every one is suspended
pub fn available_clusters(clusters: Vec<SkillCluster>, suspended: &[ClusterId]) -> Vec<SkillCluster> {
    let open: Vec<SkillCluster> = clusters
        .iter()
        .filter(|c| !suspended.contains(&c.id))
        .cloned()
        .collect();
    if open.is_empty() {
        clusters
    } else {
        open
    }
}

pub struct Agent {
    config: AgentConfig,
    store: MemoryStore,
    index: StateIndex,
    policy: SelectionPolicy,
    grounder: TemplateGrounder,
    perception: Box<dyn Perception>,
    actuator: Box<dyn Actuator>,
    guide: Box<dyn OperationGuide>,
    judge: Box<dyn Judge>,
    session: Session,
    controls: RunControls,
}

impl Agent {
    pub fn new(
        config: AgentConfig,
        store: MemoryStore,
        perception: Box<dyn Perception>,
        actuator: Box<dyn Actuator>,
        guide: Box<dyn OperationGuide>,
        judge: Box<dyn Judge>,
    ) -> Self {
        let index = StateIndex::new(config.memory.sim_threshold)
            .with_dump_dir(config.memory.state_dump_dir.clone());
        let policy =
            SelectionPolicy::from_config(&config.brain, config.explore.close_explore, config.seed);
        let grounder = TemplateGrounder::from_config(&config.perception);
        Self {
            config,
            store,
            index,
            policy,
            grounder,
            perception,
            actuator,
            guide,
            judge,
            session: Session::default(),
            controls: RunControls::new(),
        }
    }

    pub fn with_controls(mut self, controls: RunControls) -> Self {
        self.controls = controls;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn controls(&self) -> RunControls {
        self.controls.clone()
    }

    /// Run steps until `max_steps`, resuming after the last stored step
    ///
    /// Non-fatal errors fail their step and the run goes on; fatal ones end it.
    pub fn run(&mut self, task: &str, max_steps: u64) -> Result<RunStats> {
        let start = self.store.last_step()?.map(|s| s + 1).unwrap_or(0);
        self.session.step = start;
        if start > 0 {
            info!(step = start, "resuming run");
        }

        while self.session.step < max_steps {
            if !self.controls.checkpoint() {
                info!(step = self.session.step, "exit requested; stopping");
                break;
            }
            let step = self.session.step;
            let result = match self.run_step(task) {
                Ok(result) => result,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(step, error = %e, "step failed");
                    StepResult::Fail
                }
            };
            info!(step, result = ?result, "step finished");

            self.store.set_last_step(step)?;
            self.session.stats.steps += 1;
            self.session.stats.record_usage(self.judge.usage());
            self.session.stats.log(step);
            self.session.step += 1;
        }
        Ok(self.session.stats.clone())
    }

    /// One perceive, decide, act and evaluate cycle
    pub fn run_step(&mut self, task: &str) -> Result<StepResult> {
        if self.config.baseline {
            return self.baseline_step(task);
        }

        let observation = observe(&mut *self.perception)?;
        let mut state = self.index.resolve_or_create(
            &self.store,
            &observation.fingerprint,
            &observation.screen,
        )?;
        debug!(state_id = %state.id, clusters = state.cluster_ids.len(), "current state");

        let clusters = available_clusters(
            self.store.get_clusters(&state.cluster_ids)?,
            &self.session.suspended_clusters,
        );

        let result = if clusters.is_empty() {
            // nothing learned here yet
            self.session.stats.explore_decisions += 1;
            self.explore(&mut state, None)?.result
        } else {
            let choice = self.policy.select_cluster(
                &mut *self.judge,
                task,
                &clusters,
                &observation.screen,
            )?;
            let Some(cluster) = choice.and_then(|id| clusters.into_iter().find(|c| c.id == id))
            else {
                info!(state_id = %state.id, "no cluster selected");
                return Ok(StepResult::Continue);
            };
            info!(cluster_id = %cluster.id, name = %cluster.name, "cluster selected");
            let cluster_id = cluster.id;
            let result = self.work_cluster(task, &mut state, cluster)?;
            self.evolve_cluster(&mut state, cluster_id)?;
            result
        };

        if result == StepResult::Continue {
            self.session.clear_suspensions();
        }
        let origin = self.perception.window_origin();
        reset_episode(&mut *self.actuator, origin, &self.config.explore)?;
        Ok(result)
    }

    /// Choose, act and retry within one cluster until an attempt settles
    fn work_cluster(
        &mut self,
        task: &str,
        state: &mut State,
        mut cluster: SkillCluster,
    ) -> Result<StepResult> {
        let mut skills = self.store.get_skills(&cluster.members)?;
        let mut suspended_skills: Vec<SkillId> = Vec::new();

        loop {
            let selection = self
                .policy
                .select_skill(&skills, &cluster, &suspended_skills);
            let result = match selection.choice {
                Choice::Explore { origin } => {
                    self.session.stats.explore_decisions += 1;
                    info!(cluster_id = %cluster.id, origin = ?origin, "exploring");
                    let report = self.explore(state, origin)?;
                    cluster.explore_count += 1;
                    self.store
                        .update_cluster_explore_count(cluster.id, cluster.explore_count)?;
                    if report.result == StepResult::ExploreFail && selection.suspend {
                        self.session.suspend(cluster.id);
                    }
                    report.result
                }
                Choice::Skill(skill) => {
                    self.session.stats.exploit_decisions += 1;
                    match self.exploit(task, &skill, &mut skills)? {
                        StepResult::Fail => {
                            suspended_skills.push(skill.id);
                            StepResult::Retry
                        }
                        other => other,
                    }
                }
            };
            if result != StepResult::Retry {
                return Ok(result);
            }
            debug!(suspended = suspended_skills.len(), "retrying with another choice");
        }
    }

    fn explore(&mut self, state: &mut State, origin: Option<NodeId>) -> Result<ExploreReport> {
        let mut engine = ExplorationEngine {
            config: &self.config,
            store: &self.store,
            grounder: &self.grounder,
            perception: &mut *self.perception,
            actuator: &mut *self.actuator,
            guide: &mut *self.guide,
            judge: &mut *self.judge,
        };
        let report = engine.explore(state, origin)?;
        self.session.stats.skills_generated += report.new_skills.len() as u64;
        Ok(report)
    }

    /// Replay `skill` and write its new evidence back into `skills`
    fn exploit(&mut self, task: &str, skill: &Skill, skills: &mut [Skill]) -> Result<StepResult> {
        let mut exploit = ExploitLoop {
            config: &self.config,
            store: &self.store,
            grounder: &self.grounder,
            perception: &mut *self.perception,
            actuator: &mut *self.actuator,
            judge: &mut *self.judge,
        };
        let report = exploit.exploit(task, skill)?;
        if let Some(verdict) = &report.verdict {
            self.session.stats.record_verdict(verdict);
        }
        if let Some(slot) = skills.iter_mut().find(|s| s.id == report.skill.id) {
            *slot = report.skill;
        }
        Ok(report.result)
    }

    /// Retire weak skills of the cluster and forget clusters that vanished
    fn evolve_cluster(&mut self, state: &mut State, cluster_id: ClusterId) -> Result<()> {
        if let Some(cluster) = self.store.get_cluster(cluster_id)? {
            let skills = self.store.get_skills(&cluster.members)?;
            let outcome = evolve(
                &self.store,
                &cluster,
                &skills,
                self.config.evolution.observation_threshold,
                self.config.evolution.fitness_threshold,
            )?;
            self.session.stats.skills_deleted += outcome.deleted.len() as u64;
            if outcome.cluster_deleted {
                self.session.stats.clusters_deleted += 1;
            }
        }

        prune_clusters(&self.store, state)?;
        Ok(())
    }

    /// Let the judge play one operation directly, without skills
    fn baseline_step(&mut self, task: &str) -> Result<StepResult> {
        let before = self.perception.capture_screen()?;
        let Some(op) = self.judge.propose_operation(task, &before)? else {
            info!("judge proposed no operation");
            return Ok(StepResult::Continue);
        };
        info!(operation = %op, "baseline operation");
        if op.operate == OperationKind::Finished {
            info!("judge reports the task finished");
        }
        let origin = self.perception.window_origin();
        self.actuator.execute(&op, origin)?;
        settle(self.config.explore.exec_duration_secs);

        if self.config.explore.close_evaluate {
            return Ok(StepResult::Continue);
        }
        let after = self.perception.capture_screen()?;
        match self.judge.evaluate_progress(task, &before, &after)? {
            Some(true) => {
                self.session.stats.progressive += 1;
                Ok(StepResult::Continue)
            }
            Some(false) => Ok(StepResult::Fail),
            None => Ok(StepResult::Continue),
        }
    }
}
