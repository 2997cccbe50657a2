//! Property tests for the search tree and the selection policy

use bottom_up_agent::actions::Operation;
use bottom_up_agent::core::types::{ClusterId, Fingerprint, NodeId, SkillId, StateId};
use bottom_up_agent::memory::records::{Skill, SkillCluster};
use bottom_up_agent::policy::{explore_score, skill_score, softmax, temperature, SelectionPolicy};
use bottom_up_agent::tree::SearchTree;
use proptest::prelude::*;

fn skill(id: i64, fitness: i64, trials: u32) -> Skill {
    Skill {
        id: SkillId(id),
        name: format!("s{}", id),
        description: String::new(),
        operations: vec![Operation::click(1, 1)],
        fitness,
        trials,
        state_id: StateId(1),
        node_id: Some(NodeId(id as u32)),
    }
}

fn cluster(members: &[Skill], explore_count: u32) -> SkillCluster {
    SkillCluster {
        id: ClusterId(1),
        name: "c".into(),
        description: String::new(),
        members: members.iter().map(|s| s.id).collect(),
        explore_count,
        fingerprint: Fingerprint::default(),
    }
}

proptest! {
    /// Test 1: Softmax over any finite scores is a distribution
    #[test]
    fn test_softmax_is_a_distribution(
        scores in prop::collection::vec(-50.0f64..50.0, 1..12),
        total in 0.0f64..200.0,
    ) {
        let probabilities = softmax(&scores, temperature(total));
        let sum: f64 = probabilities.iter().sum();
        prop_assert!((sum - 1.0).abs() < 1e-6);
        prop_assert!(probabilities.iter().all(|p| *p >= 0.0));
    }

    /// Test 2: Temperature cools monotonically and never drops below 0.1
    #[test]
    fn test_temperature_monotone(a in 0.0f64..500.0, b in 0.0f64..500.0) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(temperature(hi) <= temperature(lo));
        prop_assert!(temperature(hi) >= 0.1);
    }

    /// Test 3: Selection probabilities cover every candidate plus Explore
    #[test]
    fn test_selection_probabilities(
        arms in prop::collection::vec((-5i64..10, 1u32..20), 1..6),
        explore_count in 1u32..10,
        seed in any::<u64>(),
    ) {
        let skills: Vec<Skill> = arms
            .iter()
            .enumerate()
            .map(|(i, (f, t))| skill(i as i64 + 1, *f, *t))
            .collect();
        let cluster = cluster(&skills, explore_count);
        let mut policy = SelectionPolicy::new(1.0, 2.0, false, Some(seed));
        let selection = policy.select_skill(&skills, &cluster, &[]);

        prop_assert_eq!(selection.probabilities.len(), skills.len() + 1);
        let sum: f64 = selection.probabilities.iter().sum();
        prop_assert!((sum - 1.0).abs() < 1e-6);
        if selection.suspend {
            prop_assert!(selection.choice.is_explore());
        }
    }

    /// Test 4: A better record never scores lower
    #[test]
    fn test_scores_rise_with_fitness(
        fitness in -10i64..10,
        trials in 1u32..50,
        explore_count in 1u32..50,
    ) {
        let total = (trials + explore_count) as f64;
        prop_assert!(skill_score(fitness + 1, trials, total, 1.0) > skill_score(fitness, trials, total, 1.0));
        prop_assert!(explore_score(2.0, explore_count, total, 1.0) >= 2.0);
    }

    /// Test 5: Expansion appends one operation and links parent and child
    #[test]
    fn test_expand_appends(path in prop::collection::vec((0i32..100, 0i32..100), 1..8)) {
        let mut tree = SearchTree::new();
        let mut parent = NodeId::ROOT;
        let mut operations = Vec::new();
        for (x, y) in path {
            operations.push(Operation::click(x, y));
            let parent_len = tree.get_node(parent).unwrap().operations.len();
            let child = tree.expand(parent, 3.0, operations.clone()).unwrap();
            let node = tree.get_node(child).unwrap();
            prop_assert_eq!(node.operations.len(), parent_len + 1);
            prop_assert_eq!(node.parent_id, Some(parent));
            prop_assert!(tree.get_node(parent).unwrap().children_ids.contains(&child));
            parent = child;
        }

        let restored = SearchTree::from_json(&tree.to_json().unwrap()).unwrap();
        prop_assert_eq!(&restored, &tree);
        prop_assert_eq!(restored.next_id(), tree.next_id());
        prop_assert_eq!(restored.optimal_node_id(), tree.optimal_node_id());
    }

    /// Test 6: Deleting refuses inner nodes and detaches leaves
    #[test]
    fn test_delete_only_leaves(width in 1usize..6) {
        let mut tree = SearchTree::new();
        let inner = tree.expand(NodeId::ROOT, 3.0, vec![Operation::click(0, 0)]).unwrap();
        let mut leaves = Vec::new();
        for i in 0..width {
            let ops = vec![Operation::click(0, 0), Operation::click(i as i32 + 1, 0)];
            leaves.push(tree.expand(inner, 3.0, ops).unwrap());
        }

        let before = tree.clone();
        prop_assert!(!tree.delete_node(inner));
        prop_assert_eq!(&tree, &before);

        prop_assert!(tree.delete_node(leaves[0]));
        prop_assert_eq!(tree.get_node(inner).unwrap().children_ids.len(), width - 1);
        // ids are never handed out twice
        let next = tree.expand(inner, 3.0, vec![Operation::click(0, 0), Operation::click(99, 0)]).unwrap();
        prop_assert!(!leaves.contains(&next));
    }
}
