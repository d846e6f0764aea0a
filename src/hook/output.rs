//! Decision payloads in the JSON shape the agent reads from hook stdout.

use serde_json::{json, Map, Value};

use crate::decision::{Decision, PermissionDecision, QuestionDecision};
use crate::request::RequestKind;

/// Output for a permission request.
pub fn permission_output(decision: &PermissionDecision) -> Value {
    json!({
        "hookSpecificOutput": {
            "hookEventName": "PermissionRequest",
            "decision": decision,
        }
    })
}

/// Output for an `AskUserQuestion` pre-tool hook.
///
/// Selections are passed back as `updatedInput.answers` (question text to
/// comma-separated labels) and the tool is allowed to run. A free-text reply
/// blocks the tool and carries the text as the reason, which the agent reads
/// as the user's answer.
pub fn question_output(tool_input: &Value, decision: &QuestionDecision) -> Value {
    if let Some(reply) = &decision.reply {
        return json!({
            "hookSpecificOutput": {
                "hookEventName": "PreToolUse",
                "permissionDecision": "deny",
                "permissionDecisionReason": format!("The user answered: {reply}"),
            }
        });
    }

    let answers: Map<String, Value> = decision
        .answers
        .iter()
        .map(|a| (a.question.clone(), Value::String(a.labels.join(", "))))
        .collect();
    let mut updated = match tool_input {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    updated.insert("answers".into(), Value::Object(answers));

    json!({
        "hookSpecificOutput": {
            "hookEventName": "PreToolUse",
            "permissionDecision": "allow",
            "updatedInput": Value::Object(updated),
        }
    })
}

/// Encode a decision for a request of `kind`. A decision of the wrong kind
/// yields nothing, which the agent reads as "no special decision".
pub fn encode(kind: RequestKind, tool_input: &Value, decision: &Decision) -> Option<Value> {
    match (kind, decision) {
        (RequestKind::Permission, Decision::Permission(d)) => Some(permission_output(d)),
        (RequestKind::Question, Decision::Question(d)) => Some(question_output(tool_input, d)),
        _ => None,
    }
}
