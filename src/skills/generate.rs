//! Minting skills from operation sequences that changed the screen

use crate::actions::Operation;
use crate::core::error::Result;
use crate::core::types::{NodeId, Screen, StateId};
use crate::judge::Judge;
use crate::memory::records::{NewSkill, Skill};
use crate::memory::MemoryStore;
use tracing::info;

/// Ask the judge to name `operations`; persist the skill if it is meaningful
///
/// Coordinates of object-bound operations are dropped before storing, so a
/// replay grounds the object again on the live screen.
pub fn generate_and_save_skill<J: Judge + ?Sized>(
    judge: &mut J,
    store: &MemoryStore,
    state_id: StateId,
    node_id: NodeId,
    operations: &[Operation],
    before: &Screen,
    after: &Screen,
) -> Result<Option<Skill>> {
    let naming = match judge.name_skill(operations, before, after)? {
        Some(naming) => naming,
        None => {
            info!(state_id = %state_id, node_id = %node_id, "judge found no meaning in the operations");
            return Ok(None);
        }
    };

    let skill = store.insert_skill(&NewSkill {
        name: naming.name,
        description: naming.description,
        operations: operations.iter().map(Operation::without_grounding).collect(),
        state_id,
        node_id,
        image_before: before.clone(),
        image_after: after.clone(),
    })?;
    info!(skill_id = %skill.id, name = %skill.name, node_id = %node_id, "skill generated");
    Ok(Some(skill))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{OperationKind, OperationParams};
    use crate::core::types::{Fingerprint, ObjectId};
    use crate::judge::scripted::ScriptedJudge;
    use crate::memory::records::{INITIAL_FITNESS, INITIAL_TRIALS};
    use crate::tree::SearchTree;
    use image::Rgb;

    fn screen(v: u8) -> Screen {
        Screen::from_pixel(4, 4, Rgb([v, v, v]))
    }

    #[test]
    fn test_meaningful_sequence_is_saved_ungrounded() {
        let store = MemoryStore::in_memory().unwrap();
        let state = store
            .insert_state(&Fingerprint::new(vec![1.0]), &SearchTree::new(), None)
            .unwrap();
        let mut judge = ScriptedJudge::default();
        judge.namings.push_back(Some(ScriptedJudge::named("Open deck")));

        let mut grounded = Operation::on_object(OperationKind::Click, ObjectId(4));
        grounded.params = Some(OperationParams::Point { x: 30, y: 40 });
        let skill = generate_and_save_skill(
            &mut judge,
            &store,
            state.id,
            NodeId(1),
            &[grounded],
            &screen(0),
            &screen(200),
        )
        .unwrap()
        .unwrap();

        assert_eq!(skill.fitness, INITIAL_FITNESS);
        assert_eq!(skill.trials, INITIAL_TRIALS);
        assert_eq!(skill.node_id, Some(NodeId(1)));
        assert_eq!(skill.operations[0].params, None);
        assert_eq!(skill.operations[0].object_id, Some(ObjectId(4)));

        let (before, after) = store.skill_images(skill.id).unwrap().unwrap();
        assert_eq!(before, screen(0));
        assert_eq!(after, screen(200));
    }

    #[test]
    fn test_meaningless_sequence_is_not_saved() {
        let store = MemoryStore::in_memory().unwrap();
        let mut judge = ScriptedJudge::default();
        judge.namings.push_back(None);
        let skill = generate_and_save_skill(
            &mut judge,
            &store,
            StateId(1),
            NodeId(1),
            &[Operation::click(1, 1)],
            &screen(0),
            &screen(1),
        )
        .unwrap();
        assert!(skill.is_none());
        assert!(store.list_skills(None).unwrap().is_empty());
    }
}
