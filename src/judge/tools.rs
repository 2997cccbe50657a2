//! Tool schemas offered to the model and decoding of its calls
//!
//! Models are loose with JSON types (ids as floats or strings), so numbers
//! are read leniently.

use super::{ClusterProposal, SkillNaming, Verdict};
use crate::actions::{Operation, OperationKind, OperationParams, ScrollDirection};
use crate::core::types::{ClusterId, SkillId};
use crate::llm::{ToolCall, ToolSpec};
use serde_json::{json, Value};

pub const SELECT_SKILL: &str = "select_skill";
pub const ACTION_REFLEX: &str = "action_reflex";
pub const SAVE_SKILL: &str = "save_skill";
pub const NO_MEANING_SKILL: &str = "no_meaning_skill";
pub const CLUSTER_SKILLS: &str = "cluster_skills";
pub const MERGE_SKILLS: &str = "merge_skills";
pub const GIVE_GUIDANCE: &str = "give_guidance";

fn object(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

fn point_schema() -> Value {
    object(
        json!({"x": {"type": "number"}, "y": {"type": "number"}}),
        &["x", "y"],
    )
}

pub fn select_skill() -> Vec<ToolSpec> {
    vec![ToolSpec::new(
        SELECT_SKILL,
        "Select the skill to perform next",
        object(
            json!({"id": {"type": "number", "description": "Id of the selected skill"}}),
            &["id"],
        ),
    )]
}

/// Verdict tool; `with_consistency` adds the consistency question
pub fn action_reflex(with_consistency: bool) -> Vec<ToolSpec> {
    let parameters = if with_consistency {
        object(
            json!({
                "is_consistent": {"type": "boolean"},
                "is_progressive": {"type": "boolean"},
            }),
            &["is_consistent", "is_progressive"],
        )
    } else {
        object(
            json!({"is_progressive": {"type": "boolean"}}),
            &["is_progressive"],
        )
    };
    vec![ToolSpec::new(
        ACTION_REFLEX,
        "Report how the action affected the game",
        parameters,
    )]
}

pub fn name_skill() -> Vec<ToolSpec> {
    vec![
        ToolSpec::new(
            SAVE_SKILL,
            "Save the skill to long memory",
            object(
                json!({
                    "name": {"type": "string", "description": "The name of the skill"},
                    "description": {"type": "string", "description": "The description of the skill"},
                }),
                &["name", "description"],
            ),
        ),
        ToolSpec::new(
            NO_MEANING_SKILL,
            "The skill is meaningless",
            object(json!({}), &[]),
        ),
    ]
}

fn cluster_list(with_id: bool) -> Value {
    let mut properties = json!({
        "name": {"type": "string"},
        "description": {"type": "string"},
        "members": {"type": "array", "items": {"type": "integer"}},
    });
    let mut required = vec!["name", "description", "members"];
    if with_id {
        properties["cluster_id"] =
            json!({"type": "integer", "description": "Existing cluster id, or -1 for a new cluster"});
        required.insert(0, "cluster_id");
    }
    object(
        json!({"clusters": {"type": "array", "items": object(properties, &required)}}),
        &["clusters"],
    )
}

pub fn cluster_skills() -> Vec<ToolSpec> {
    vec![ToolSpec::new(
        CLUSTER_SKILLS,
        "Group functionally equivalent skills",
        cluster_list(false),
    )]
}

pub fn merge_skills() -> Vec<ToolSpec> {
    vec![ToolSpec::new(
        MERGE_SKILLS,
        "Merge new skills into existing clusters",
        cluster_list(true),
    )]
}

pub fn give_guidance() -> Vec<ToolSpec> {
    vec![ToolSpec::new(
        GIVE_GUIDANCE,
        "Recommend one of the listed interactions",
        object(json!({"index": {"type": "integer"}}), &["index"]),
    )]
}

/// One tool per operation kind the agent can perform
pub fn operations() -> Vec<ToolSpec> {
    let drag = object(
        json!({
            "x1": {"type": "number"}, "y1": {"type": "number"},
            "x2": {"type": "number"}, "y2": {"type": "number"},
        }),
        &["x1", "y1", "x2", "y2"],
    );
    let scroll = object(
        json!({
            "x": {"type": "number"}, "y": {"type": "number"},
            "direction": {"type": "string", "enum": ["up", "down"]},
        }),
        &["x", "y", "direction"],
    );
    vec![
        ToolSpec::new("Click", "Left click at the given coordinates", point_schema()),
        ToolSpec::new("RightSingle", "Right click at the given coordinates", point_schema()),
        ToolSpec::new("LeftDouble", "Double click at the given coordinates", point_schema()),
        ToolSpec::new("LongPress", "Press and hold at the given coordinates", point_schema()),
        ToolSpec::new("Drag", "Drag from the first point to the second", drag),
        ToolSpec::new("Scroll", "Scroll at the given coordinates", scroll),
        ToolSpec::new(
            "Type",
            "Type the given text",
            object(json!({"content": {"type": "string"}}), &["content"]),
        ),
        ToolSpec::new(
            "Hotkey",
            "Press a key combination such as ctrl+s",
            object(json!({"key": {"type": "string"}}), &["key"]),
        ),
        ToolSpec::new("Wait", "Wait for the game to respond", object(json!({}), &[])),
        ToolSpec::new("Finished", "The task is complete", object(json!({}), &[])),
    ]
}

/// Integer from a number, float or numeric string
pub fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.round() as i64),
        _ => None,
    }
}

fn int_field(input: &Value, key: &str) -> Option<i32> {
    input.get(key).and_then(as_int).map(|v| v as i32)
}

fn bool_field(input: &Value, key: &str) -> Option<bool> {
    match input.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn str_field(input: &Value, key: &str) -> Option<String> {
    input.get(key).and_then(Value::as_str).map(str::to_string)
}

fn expect<'a>(call: Option<&'a ToolCall>, name: &str) -> Option<&'a Value> {
    call.filter(|c| c.name == name).map(|c| &c.input)
}

pub fn decode_selection(call: Option<&ToolCall>) -> Option<i64> {
    expect(call, SELECT_SKILL).and_then(|input| input.get("id").and_then(as_int))
}

pub fn decode_verdict(call: Option<&ToolCall>) -> Option<Verdict> {
    let input = expect(call, ACTION_REFLEX)?;
    Some(Verdict {
        consistent: bool_field(input, "is_consistent")?,
        progressive: bool_field(input, "is_progressive")?,
    })
}

pub fn decode_progress(call: Option<&ToolCall>) -> Option<bool> {
    expect(call, ACTION_REFLEX).and_then(|input| bool_field(input, "is_progressive"))
}

/// `None` for `no_meaning_skill`, a missing call or an incomplete answer
pub fn decode_naming(call: Option<&ToolCall>) -> Option<SkillNaming> {
    let input = expect(call, SAVE_SKILL)?;
    let name = str_field(input, "name")?;
    if name.trim().is_empty() {
        return None;
    }
    Some(SkillNaming {
        name,
        description: str_field(input, "description").unwrap_or_default(),
    })
}

/// Cluster list from `cluster_skills` or `merge_skills`
///
/// A negative or absent `cluster_id` asks for a new cluster.
pub fn decode_clusters(call: Option<&ToolCall>, tool: &str) -> Option<Vec<ClusterProposal>> {
    let clusters = expect(call, tool)?.get("clusters")?.as_array()?;
    let proposals = clusters
        .iter()
        .filter_map(|c| {
            let members = c
                .get("members")?
                .as_array()?
                .iter()
                .filter_map(as_int)
                .map(SkillId)
                .collect();
            Some(ClusterProposal {
                cluster_id: c
                    .get("cluster_id")
                    .and_then(as_int)
                    .filter(|id| *id >= 0)
                    .map(ClusterId),
                name: str_field(c, "name").unwrap_or_default(),
                description: str_field(c, "description").unwrap_or_default(),
                members,
            })
        })
        .collect();
    Some(proposals)
}

pub fn decode_guidance(call: Option<&ToolCall>) -> Option<usize> {
    expect(call, GIVE_GUIDANCE)
        .and_then(|input| input.get("index").and_then(as_int))
        .and_then(|i| usize::try_from(i).ok())
}

/// Operation named by a tool call; unknown kinds and missing fields decode to `None`
pub fn decode_operation(call: Option<&ToolCall>) -> Option<Operation> {
    let call = call?;
    let kind = OperationKind::from_name(&call.name);
    let input = &call.input;
    let point = || {
        Some(OperationParams::Point {
            x: int_field(input, "x")?,
            y: int_field(input, "y")?,
        })
    };
    let params = match kind {
        OperationKind::Unknown => return None,
        OperationKind::Click
        | OperationKind::RightSingle
        | OperationKind::LeftDouble
        | OperationKind::LongPress => Some(point()?),
        OperationKind::Drag => Some(OperationParams::Drag {
            x1: int_field(input, "x1")?,
            y1: int_field(input, "y1")?,
            x2: int_field(input, "x2")?,
            y2: int_field(input, "y2")?,
        }),
        OperationKind::Scroll => Some(OperationParams::Scroll {
            x: int_field(input, "x")?,
            y: int_field(input, "y")?,
            direction: match str_field(input, "direction").as_deref() {
                Some("up") => ScrollDirection::Up,
                _ => ScrollDirection::Down,
            },
        }),
        OperationKind::Type => Some(OperationParams::Text {
            content: str_field(input, "content").or_else(|| str_field(input, "text"))?,
        }),
        OperationKind::Hotkey => Some(OperationParams::Key {
            key: str_field(input, "key")?,
        }),
        _ => None,
    };
    Some(Operation::new(kind, params))
}
