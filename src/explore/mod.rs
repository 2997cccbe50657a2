//! Exploration: growing a state's search tree and minting skills
//!
//! One `augment` call replays a node's path from the episode start, offers
//! every untried operation on the visible objects to the guide, performs the
//! chosen one and records the attempt as a child node. Attempts that visibly
//! change the screen are handed to the judge to become skills.

use crate::actions::{Operation, OperationKind, OperationParams, ScrollDirection};
use crate::actuation::{reset_episode, settle, Actuator};
use crate::agent::StepResult;
use crate::core::config::AgentConfig;
use crate::core::error::Result;
use crate::core::types::NodeId;
use crate::guidance::OperationGuide;
use crate::judge::Judge;
use crate::memory::records::{Skill, State};
use crate::memory::MemoryStore;
use crate::perception::{
    acted, detect_objects, ground_operation, observe, DetectedObject, Perception, TemplateGrounder,
};
use crate::skills::{generate_and_save_skill, merge_and_save};
use tracing::{debug, info, warn};

/// How one augmentation attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AugmentStatus {
    /// No untried operation remains; the node is now fixed
    Exhausted,
    /// A step of the node's own path could not be grounded
    PathLost,
    /// The guide chose nothing
    Declined,
    /// The chosen operation did not change the screen
    NotActed,
    /// The screen changed but the judge found no meaning
    Unnamed,
    /// A new skill was saved
    Minted,
}

#[derive(Debug, Clone)]
pub struct AugmentOutcome {
    pub skill: Option<Skill>,
    /// Stop augmenting for this exploration
    pub stop: bool,
    pub status: AugmentStatus,
    /// Node created by this attempt
    pub node: Option<NodeId>,
}

impl AugmentOutcome {
    fn empty(status: AugmentStatus, stop: bool) -> Self {
        Self {
            skill: None,
            stop,
            status,
            node: None,
        }
    }
}

/// Result of a whole exploration
#[derive(Debug, Clone)]
pub struct ExploreReport {
    pub result: StepResult,
    pub new_skills: Vec<Skill>,
}

/// One candidate per object and configured kind
pub fn candidate_operations(objects: &[DetectedObject], kinds: &[OperationKind]) -> Vec<Operation> {
    let mut candidates = Vec::new();
    for kind in kinds {
        if !kind.is_pointed() {
            debug!(operation = %kind, "kind cannot target objects; not proposed");
            continue;
        }
        for object in objects {
            let Some(id) = object.id else { continue };
            let c = object.center();
            let params = match kind {
                OperationKind::Scroll => OperationParams::Scroll {
                    x: c.x,
                    y: c.y,
                    direction: ScrollDirection::Down,
                },
                _ => OperationParams::Point { x: c.x, y: c.y },
            };
            candidates.push(Operation {
                operate: *kind,
                object_id: Some(id),
                params: Some(params),
            });
        }
    }
    candidates
}

/// Drop candidates already tried as a child of the node
pub fn untried(candidates: Vec<Operation>, tried: &[Operation]) -> Vec<Operation> {
    candidates
        .into_iter()
        .filter(|c| !tried.iter().any(|t| t.same_action(c)))
        .collect()
}

pub struct ExplorationEngine<'a> {
    pub config: &'a AgentConfig,
    pub store: &'a MemoryStore,
    pub grounder: &'a TemplateGrounder,
    pub perception: &'a mut dyn Perception,
    pub actuator: &'a mut dyn Actuator,
    pub guide: &'a mut dyn OperationGuide,
    pub judge: &'a mut dyn Judge,
}

impl<'a> ExplorationEngine<'a> {
    fn act(&mut self, op: &Operation) -> Result<()> {
        let origin = self.perception.window_origin();
        self.actuator.execute(op, origin)?;
        settle(self.config.explore.exec_duration_secs);
        Ok(())
    }

    /// One attempt to extend `node` by a single operation
    pub fn augment(&mut self, state: &mut State, node_id: NodeId) -> Result<AugmentOutcome> {
        let path = match state.tree.get_node(node_id) {
            Some(node) => node.operations.clone(),
            None => {
                warn!(state_id = %state.id, node_id = %node_id, "node missing; nothing to augment");
                return Ok(AugmentOutcome::empty(AugmentStatus::PathLost, true));
            }
        };

        let origin = self.perception.window_origin();
        reset_episode(&mut *self.actuator, origin, &self.config.explore)?;
        let start = observe(&mut *self.perception)?;

        // walk back down to the node
        let mut current = start.clone();
        for op in &path {
            match ground_operation(self.store, self.grounder, &current.screen, op)? {
                Some(grounded) => self.act(&grounded)?,
                None => {
                    info!(node_id = %node_id, operation = %op, "could not replay node path");
                    return Ok(AugmentOutcome::empty(AugmentStatus::PathLost, true));
                }
            }
            current = observe(&mut *self.perception)?;
        }

        let known = self.store.get_objects(&state.object_ids)?;
        let mut objects = detect_objects(
            &mut *self.perception,
            &current.screen,
            &known,
            &self.config.perception,
        )?;
        let created = self.store.save_new_objects(state, &mut objects)?;
        debug!(detected = objects.len(), created, "objects updated");

        let tried = state.tree.child_operations(node_id);
        let candidates = untried(
            candidate_operations(&objects, &self.config.explore.operates),
            &tried,
        );
        if candidates.is_empty() {
            state.tree.set_fixed(node_id);
            info!(state_id = %state.id, node_id = %node_id, "node exhausted");
            return Ok(AugmentOutcome::empty(AugmentStatus::Exhausted, false));
        }

        let chosen = match self.guide.choose(&candidates, &current.screen)? {
            Some(op) => op,
            None => return Ok(AugmentOutcome::empty(AugmentStatus::Declined, false)),
        };
        let grounded = match ground_operation(self.store, self.grounder, &current.screen, &chosen)? {
            Some(op) => op,
            None => return Ok(AugmentOutcome::empty(AugmentStatus::Declined, false)),
        };
        self.act(&grounded)?;
        let after = observe(&mut *self.perception)?;

        let mut operations = path;
        operations.push(grounded.without_grounding());
        let changed = acted(
            &*self.perception,
            &current.screen,
            &after.screen,
            &self.config.perception,
        );

        let Some(child) = state
            .tree
            .expand(node_id, self.config.explore.augment_value, operations.clone())
        else {
            warn!(node_id = %node_id, "expansion rejected");
            return Ok(AugmentOutcome::empty(AugmentStatus::NotActed, false));
        };
        state.tree.visit(node_id);

        if !changed {
            // kept as a tried child so it is not offered again, but closed
            state.tree.set_fixed(child);
            info!(operation = %grounded, "operation did not change the screen");
            return Ok(AugmentOutcome {
                node: Some(child),
                ..AugmentOutcome::empty(AugmentStatus::NotActed, false)
            });
        }

        let skill = generate_and_save_skill(
            &mut *self.judge,
            self.store,
            state.id,
            child,
            &operations,
            &start.screen,
            &after.screen,
        )?;

        let similarity = start.fingerprint.cosine_similarity(&after.fingerprint);
        let stop = similarity < self.config.perception.state_change_threshold;
        if stop {
            state.tree.set_fixed(child);
            info!(node_id = %child, similarity, "state changed; branch closed");
        }

        Ok(AugmentOutcome {
            status: if skill.is_some() {
                AugmentStatus::Minted
            } else {
                AugmentStatus::Unnamed
            },
            skill,
            stop,
            node: Some(child),
        })
    }

    /// Augment `node` until it yields enough skills, runs dry or says stop
    fn pass(
        &mut self,
        state: &mut State,
        node_id: NodeId,
        new_skills: &mut Vec<Skill>,
        stop: &mut bool,
    ) -> Result<()> {
        let config = self.config;
        let explore = &config.explore;
        let (skills_per_pass, max_attempts) = (explore.skills_per_pass, explore.max_attempts_per_pass);
        match state.tree.get_node(node_id) {
            Some(node) if node.depth() < explore.max_operation_length => {}
            _ => return Ok(()),
        }

        let mut minted = 0;
        let mut attempts = 0;
        while !*stop && minted < skills_per_pass && attempts < max_attempts {
            let fixed = state.tree.get_node(node_id).map(|n| n.fixed).unwrap_or(true);
            if fixed {
                break;
            }
            attempts += 1;
            let outcome = self.augment(state, node_id)?;
            debug!(node_id = %node_id, attempt = attempts, status = ?outcome.status, "augment");
            *stop = outcome.stop;
            if let Some(skill) = outcome.skill {
                minted += 1;
                new_skills.push(skill);
            }
        }
        Ok(())
    }

    /// Explore from `origin` (or the root) and fold the new skills into clusters
    pub fn explore(&mut self, state: &mut State, origin: Option<NodeId>) -> Result<ExploreReport> {
        if self.config.explore.close_explore {
            return Ok(ExploreReport {
                result: StepResult::ExploreFail,
                new_skills: Vec::new(),
            });
        }

        let node_id = match origin {
            Some(id) if state.tree.get_node(id).is_some() => id,
            Some(id) => {
                warn!(node_id = %id, "origin node missing; exploring from the root");
                NodeId::ROOT
            }
            None => NodeId::ROOT,
        };
        let parent_id = state.tree.get_node(node_id).and_then(|n| n.parent_id);

        let mut new_skills = Vec::new();
        let mut stop = false;
        if let Some(parent_id) = parent_id {
            self.pass(state, parent_id, &mut new_skills, &mut stop)?;
        }
        self.pass(state, node_id, &mut new_skills, &mut stop)?;

        let result = if new_skills.is_empty() {
            info!(state_id = %state.id, "no new skills");
            StepResult::ExploreFail
        } else {
            info!(state_id = %state.id, count = new_skills.len(), "new skills generated");
            let existing = self.store.get_clusters(&state.cluster_ids)?;
            merge_and_save(&mut *self.judge, self.store, state, &existing, &new_skills)?;
            StepResult::Continue
        };
        // tried children and fixed flags must survive a restart either way
        self.store.update_state(state)?;

        Ok(ExploreReport { result, new_skills })
    }
}
