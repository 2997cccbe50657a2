//! Retiring skills that have had their chance
//!
//! A skill survives until it has been tried more than `observation_threshold`
//! times; after that it must keep its fitness at `fitness_threshold` or above.
//! Deletions are final.

use crate::core::error::Result;
use crate::core::types::SkillId;
use crate::core::types::ClusterId;
use crate::memory::records::{Skill, SkillCluster, State};
use crate::memory::MemoryStore;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvolutionOutcome {
    pub deleted: Vec<SkillId>,
    /// The cluster lost its last member and was deleted
    pub cluster_deleted: bool,
}

/// Ids of skills whose evidence says they should go
pub fn retired_skills(
    skills: &[Skill],
    observation_threshold: u32,
    fitness_threshold: i64,
) -> Vec<SkillId> {
    skills
        .iter()
        .filter(|s| s.trials > observation_threshold && s.fitness < fitness_threshold)
        .map(|s| s.id)
        .collect()
}

/// Delete retired skills of `cluster`, and the cluster itself once empty
pub fn evolve(
    store: &MemoryStore,
    cluster: &SkillCluster,
    skills: &[Skill],
    observation_threshold: u32,
    fitness_threshold: i64,
) -> Result<EvolutionOutcome> {
    let mut outcome = EvolutionOutcome::default();
    let mut cluster = cluster.clone();

    for id in retired_skills(skills, observation_threshold, fitness_threshold) {
        cluster.remove_member(id);
        store.delete_skill(id)?;
        info!(skill_id = %id, cluster_id = %cluster.id, "skill retired");
        outcome.deleted.push(id);
    }
    if outcome.deleted.is_empty() {
        return Ok(outcome);
    }

    if cluster.members.is_empty() {
        store.delete_cluster(cluster.id)?;
        outcome.cluster_deleted = true;
        info!(cluster_id = %cluster.id, "cluster emptied and deleted");
    } else {
        store.update_cluster(&cluster)?;
    }
    Ok(outcome)
}

/// Drop ids of deleted clusters from `state`; true when it changed
pub fn prune_clusters(store: &MemoryStore, state: &mut State) -> Result<bool> {
    let live: Vec<ClusterId> = store
        .get_clusters(&state.cluster_ids)?
        .iter()
        .map(|c| c.id)
        .collect();
    if live.len() == state.cluster_ids.len() {
        return Ok(false);
    }
    state.cluster_ids.retain(|id| live.contains(id));
    store.update_state(state)?;
    debug!(state_id = %state.id, clusters = live.len(), "pruned deleted clusters");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Operation;
    use crate::core::types::{Fingerprint, NodeId, Screen, StateId};
    use crate::memory::records::NewSkill;
    use crate::tree::SearchTree;
    use image::Rgb;

    fn stored_skill(store: &MemoryStore, fitness: i64, trials: u32) -> Skill {
        let image = Screen::from_pixel(2, 2, Rgb([0, 0, 0]));
        let skill = store
            .insert_skill(&NewSkill {
                name: "s".into(),
                description: String::new(),
                operations: vec![Operation::click(1, 1)],
                state_id: StateId(1),
                node_id: NodeId(1),
                image_before: image.clone(),
                image_after: image,
            })
            .unwrap();
        store.update_skill_evidence(skill.id, fitness, trials).unwrap();
        store.get_skill(skill.id).unwrap().unwrap()
    }

    #[test]
    fn test_thresholds_are_strict() {
        let store = MemoryStore::in_memory().unwrap();
        let skills = vec![
            stored_skill(&store, 1, 5), // retired
            stored_skill(&store, 1, 4), // not enough trials yet
            stored_skill(&store, 2, 9), // fit enough
        ];
        assert_eq!(retired_skills(&skills, 4, 2), vec![skills[0].id]);
    }

    #[test]
    fn test_evolve_keeps_cluster_with_survivors() {
        let store = MemoryStore::in_memory().unwrap();
        let weak = stored_skill(&store, 0, 6);
        let strong = stored_skill(&store, 5, 6);
        let cluster = store
            .insert_cluster(&Fingerprint::new(vec![1.0]), "c", "", &[weak.id, strong.id])
            .unwrap();

        let outcome = evolve(&store, &cluster, &[weak.clone(), strong.clone()], 4, 2).unwrap();
        assert_eq!(outcome.deleted, vec![weak.id]);
        assert!(!outcome.cluster_deleted);
        assert!(store.get_skill(weak.id).unwrap().is_none());
        let cluster = store.get_cluster(cluster.id).unwrap().unwrap();
        assert_eq!(cluster.members, vec![strong.id]);
    }

    #[test]
    fn test_evolve_deletes_emptied_cluster() {
        let store = MemoryStore::in_memory().unwrap();
        let weak = stored_skill(&store, 1, 5);
        let cluster = store
            .insert_cluster(&Fingerprint::new(vec![1.0]), "c", "", &[weak.id])
            .unwrap();
        let outcome = evolve(&store, &cluster, &[weak], 4, 2).unwrap();
        assert!(outcome.cluster_deleted);
        assert!(store.get_cluster(cluster.id).unwrap().is_none());
    }

    #[test]
    fn test_nothing_to_retire_touches_nothing() {
        let store = MemoryStore::in_memory().unwrap();
        let fresh = stored_skill(&store, 0, 1);
        let cluster = store
            .insert_cluster(&Fingerprint::new(vec![1.0]), "c", "", &[fresh.id])
            .unwrap();
        let outcome = evolve(&store, &cluster, &[fresh], 4, 2).unwrap();
        assert_eq!(outcome, EvolutionOutcome::default());
        assert!(store.get_cluster(cluster.id).unwrap().is_some());
    }

    #[test]
    fn test_prune_drops_deleted_cluster_ids() {
        let store = MemoryStore::in_memory().unwrap();
        let mut state = store
            .insert_state(&Fingerprint::new(vec![1.0]), &SearchTree::new(), None)
            .unwrap();
        let weak = stored_skill(&store, 0, 5);
        let fresh = stored_skill(&store, 0, 1);
        let doomed = store
            .insert_cluster(&state.fingerprint, "a", "", &[weak.id])
            .unwrap();
        let kept = store
            .insert_cluster(&state.fingerprint, "b", "", &[fresh.id])
            .unwrap();
        state.add_cluster(doomed.id);
        state.add_cluster(kept.id);
        store.update_state(&state).unwrap();

        assert!(!prune_clusters(&store, &mut state).unwrap());
        evolve(&store, &doomed, &[weak], 4, 2).unwrap();
        assert!(prune_clusters(&store, &mut state).unwrap());
        assert_eq!(state.cluster_ids, vec![kept.id]);
        let stored = store.get_state(state.id).unwrap().unwrap();
        assert_eq!(stored.cluster_ids, vec![kept.id]);
    }
}
