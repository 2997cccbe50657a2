//! Prompt templates for every judge decision

use crate::actions::Operation;
use crate::memory::records::{Skill, SkillCluster};
use serde_json::{json, Value};

fn skill_entry(skill: &Skill) -> Value {
    json!({
        "id": skill.id.0,
        "name": skill.name,
        "description": skill.description,
    })
}

fn cluster_entry(cluster: &SkillCluster) -> Value {
    json!({
        "cluster_id": cluster.id.0,
        "name": cluster.name,
        "description": cluster.description,
        "members": cluster.members.iter().map(|m| m.0).collect::<Vec<_>>(),
    })
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

pub fn operations_text(operations: &[Operation]) -> String {
    operations
        .iter()
        .map(|op| op.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

pub fn name_skill(operations: &[Operation]) -> String {
    format!(
        r#"You are playing a game.

Objective:
- Analyze the UI operations you just performed.

Inputs:
1. The operations, in order: '{ops}'
2. Screenshots taken before and after the operations.

Instructions:
1. Work out which UI elements the operations touched.
2. Describe how the screen changed.
3. Give the sequence a short **name** tied to what it actually does, and a
   **description** covering its effect and any precondition for using it.
4. If the operations achieved nothing meaningful, call `no_meaning_skill`.
5. Otherwise call `save_skill`.
6. Think step by step before deciding.
"#,
        ops = operations_text(operations)
    )
}

pub fn select_cluster(task: &str, clusters: &[SkillCluster]) -> String {
    let entries: Vec<Value> = clusters
        .iter()
        .map(|c| json!({"id": c.id.0, "name": c.name, "description": c.description}))
        .collect();
    format!(
        r#"You are playing a game. Your task is: '{task}'.

Objective:
- Choose the most suitable skill from the list below.

Inputs:
1. The learned skills.
2. A screenshot of the current game state.

Skills:
{skills}

Instructions:
1. Read the screenshot to understand the current state.
2. Discard every skill whose preconditions are not met on this screen.
3. Among the rest, pick the one that best advances the task.
4. Answer only through the `select_skill` tool with the skill id.
"#,
        task = task,
        skills = pretty(&Value::Array(entries))
    )
}

pub fn evaluate_skill(task: &str, skill: &Skill) -> String {
    format!(
        r#"Your only job is to judge one in-game action against a task and answer with exactly one call to `action_reflex`.

Task:
- '{task}'

Action:
- Name: {name}
- Description: {description}

Inputs:
- Two screenshots: the game before and after the action.

Steps:
1. From the description, state what should change if the action works.
2. List the changes actually visible between the screenshots.
3. `is_consistent` is true only if the visible change matches the expected one.
4. Name at least three concrete signs of progress toward the task.
5. `is_progressive` is true only if one of them is clearly met. Hovering,
   previewing or selecting without effect is not progress.
6. When unsure, answer false.
"#,
        task = task,
        name = skill.name,
        description = skill.description
    )
}

pub fn evaluate_progress(task: &str) -> String {
    format!(
        r#"Your only job is to judge whether the last action moved the game toward a task, answering with exactly one call to `action_reflex`.

Task:
- '{task}'

Inputs:
- Two screenshots: the game before and after the action.

Steps:
1. Name at least three concrete signs of progress toward the task.
2. `is_progressive` is true only if one of them is clearly met. Preparatory
   actions do not count.
3. When unsure, answer false.
"#,
        task = task
    )
}

pub fn propose_operation(task: &str) -> String {
    format!(
        r#"You are playing a game and your task is: '{task}'.

Decide the next single action from the current screenshot.

Instructions:
1. Read the screenshot to understand the game state.
2. Pick the action that makes the most progress on the task.
3. Use only the tools provided; coordinates are pixels of the screenshot.
"#,
        task = task
    )
}

pub fn propose_action_text(task: &str) -> String {
    format!(
        r#"You are playing a game and your task is: '{task}'.

Decide the next single action from the current screenshot.

## Output Format
```
Thought: ...
Action: ...
```

## Action Space

click(start_box='<|box_start|>(x1,y1)<|box_end|>')
right_single(start_box='<|box_start|>(x1,y1)<|box_end|>')
drag(start_box='<|box_start|>(x1,y1)<|box_end|>', end_box='<|box_start|>(x2,y2)<|box_end|>')
"#,
        task = task
    )
}

pub fn guide_operation(task: &str, candidates: &[Operation]) -> String {
    let entries: Vec<Value> = candidates
        .iter()
        .enumerate()
        .map(|(i, op)| json!({"index": i, "operation": op.to_string()}))
        .collect();
    format!(
        r#"You are a game coach. I am learning to: '{task}'.

These are the interactions I have not tried yet on the current screen:
{candidates}

Instructions:
1. Read the screenshot to understand the current state.
2. Choose the interaction most likely to teach me something useful.
3. Answer with the `give_guidance` tool and the index of your choice.
"#,
        task = task,
        candidates = pretty(&Value::Array(entries))
    )
}

pub fn cluster_skills(skills: &[Skill]) -> String {
    let entries: Vec<Value> = skills.iter().map(skill_entry).collect();
    format!(
        r#"You group skills that do the same thing.

Input: new_skills, each with id, name and description.

Rules:
- Put skills in one group only if they perform essentially the same
  function, however they are worded.
- Keep skills with different intentions apart, even if related.
- Give each group a representative name and description and list its
  member ids.

Answer with exactly one call to `cluster_skills` and no extra text.

new_skills:
{skills}
"#,
        skills = pretty(&Value::Array(entries))
    )
}

pub fn merge_skills(clusters: &[SkillCluster], skills: &[Skill]) -> String {
    let clusters: Vec<Value> = clusters.iter().map(cluster_entry).collect();
    let skills: Vec<Value> = skills.iter().map(skill_entry).collect();
    format!(
        r#"You merge new skills into existing skill clusters.

Inputs:
- existing_skill_clusters: cluster_id, name, description, members
- new_skills: id, name, description

Rules:
1. Group the new skills among themselves by function.
2. A group matching an existing cluster reuses its cluster_id; any other
   group gets cluster_id = -1.
3. Every output cluster carries cluster_id, a representative name and
   description, and the ids of its members.

Answer with exactly one call to `merge_skills` and no extra text.

existing_skill_clusters:
{clusters}

new_skills:
{skills}
"#,
        clusters = pretty(&Value::Array(clusters)),
        skills = pretty(&Value::Array(skills))
    )
}
