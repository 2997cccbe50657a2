//! Folding new skills into a state's clusters

use crate::core::error::Result;
use crate::core::types::{ClusterId, SkillId};
use crate::judge::{ClusterProposal, Judge};
use crate::memory::records::{Skill, SkillCluster, State};
use crate::memory::MemoryStore;
use ahash::AHashSet;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub created: Vec<ClusterId>,
    /// Existing clusters that gained members
    pub extended: Vec<ClusterId>,
}

/// Merge `new_skills` into the state's clusters and persist the result
///
/// With no existing clusters the judge partitions the new skills; otherwise
/// it assigns each to an existing cluster or a fresh one. Re-adding a member
/// is a no-op, so applying the same answer twice changes nothing. A skill the
/// judge leaves out (or every skill, if it gives no answer) gets a cluster of
/// its own so that no skill is left unreachable.
pub fn merge_and_save<J: Judge + ?Sized>(
    judge: &mut J,
    store: &MemoryStore,
    state: &mut State,
    existing: &[SkillCluster],
    new_skills: &[Skill],
) -> Result<MergeOutcome> {
    let mut outcome = MergeOutcome::default();
    if new_skills.is_empty() {
        return Ok(outcome);
    }

    let proposals = if existing.is_empty() {
        judge.cluster_skills(new_skills)?
    } else {
        judge.merge_skills(existing, new_skills)?
    };
    let proposals = proposals.unwrap_or_else(|| {
        warn!(state_id = %state.id, "judge gave no clustering; new skills kept apart");
        Vec::new()
    });

    let new_ids: AHashSet<SkillId> = new_skills.iter().map(|s| s.id).collect();
    let mut placed: AHashSet<SkillId> = AHashSet::new();

    for proposal in proposals {
        let target = proposal
            .cluster_id
            .and_then(|id| existing.iter().find(|c| c.id == id));
        match target {
            Some(cluster) => {
                if extend_cluster(store, cluster, &proposal, &new_ids, &mut placed)? {
                    outcome.extended.push(cluster.id);
                }
            }
            None => {
                // only skills from this batch may found a cluster
                let members: Vec<SkillId> = proposal
                    .members
                    .iter()
                    .copied()
                    .filter(|m| new_ids.contains(m) && !placed.contains(m))
                    .collect();
                if members.is_empty() {
                    continue;
                }
                // an answer already applied once finds its members clustered
                if let Some(cluster) = existing
                    .iter()
                    .find(|c| members.iter().all(|m| c.members.contains(m)))
                {
                    placed.extend(&members);
                    info!(cluster_id = %cluster.id, "skills already clustered");
                    continue;
                }
                let cluster = store.insert_cluster(
                    &state.fingerprint,
                    &proposal.name,
                    &proposal.description,
                    &members,
                )?;
                placed.extend(&members);
                state.add_cluster(cluster.id);
                outcome.created.push(cluster.id);
                info!(cluster_id = %cluster.id, name = %cluster.name, members = members.len(), "cluster created");
            }
        }
    }

    for skill in new_skills.iter().filter(|s| !placed.contains(&s.id)) {
        if let Some(cluster) = existing.iter().find(|c| c.members.contains(&skill.id)) {
            state.add_cluster(cluster.id);
            continue;
        }
        let cluster =
            store.insert_cluster(&state.fingerprint, &skill.name, &skill.description, &[skill.id])?;
        state.add_cluster(cluster.id);
        outcome.created.push(cluster.id);
        info!(cluster_id = %cluster.id, skill_id = %skill.id, "unassigned skill given its own cluster");
    }

    store.update_state(state)?;
    Ok(outcome)
}

/// Union proposal members into an existing cluster; returns whether it grew
fn extend_cluster(
    store: &MemoryStore,
    cluster: &SkillCluster,
    proposal: &ClusterProposal,
    new_ids: &AHashSet<SkillId>,
    placed: &mut AHashSet<SkillId>,
) -> Result<bool> {
    let mut updated = cluster.clone();
    let mut grew = false;
    for member in &proposal.members {
        // members of other clusters stay where they are
        if !new_ids.contains(member) && !cluster.members.contains(member) {
            continue;
        }
        if placed.contains(member) && !cluster.members.contains(member) {
            continue;
        }
        grew |= updated.add_member(*member);
        placed.insert(*member);
    }
    if !proposal.name.trim().is_empty() {
        updated.name = proposal.name.clone();
    }
    if !proposal.description.trim().is_empty() {
        updated.description = proposal.description.clone();
    }
    if updated != *cluster {
        store.update_cluster(&updated)?;
    }
    if grew {
        info!(cluster_id = %cluster.id, members = updated.members.len(), "cluster extended");
    }
    Ok(grew)
}
