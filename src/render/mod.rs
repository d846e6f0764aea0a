//! Prompt rendering: message bodies, button layouts, frozen variants.
//!
//! Rendering is presentation only. Nothing here touches the request store.

pub mod paginate;

use serde_json::Value;

use crate::channel::{Button, Keyboard};
use crate::decision::{Interaction, FROZEN_CALLBACK};
use crate::mirror::{PermissionState, QuestionState};
use crate::request::{Question, RequestPayload};

pub use paginate::split_pages;

pub const FOOTER_SUBMITTED: &str = "✅ Submitted";
pub const FOOTER_CANCELLED: &str = "❌ Cancelled";

/// Room kept free on the active page for a footer.
const FOOTER_RESERVE: usize = 64;

/// Longest tool input shown before it is cut.
const MAX_INPUT_PREVIEW: usize = 3000;

/// Full message body for a request.
pub fn body(payload: &RequestPayload) -> String {
    match payload {
        RequestPayload::Permission {
            tool_name,
            tool_input,
            ..
        } => format!(
            "🔐 Permission needed: {tool_name}\n\n{}",
            summarize_input(tool_name, tool_input)
        ),
        RequestPayload::Question { questions, .. } => question_body(questions),
    }
}

/// The body split into channel-sized pages. Buttons go on the last one.
pub fn pages(payload: &RequestPayload, max_len: usize) -> Vec<String> {
    split_pages(&body(payload), max_len.saturating_sub(FOOTER_RESERVE).max(1))
}

/// The page that carries the buttons.
pub fn active_page(payload: &RequestPayload, max_len: usize) -> String {
    pages(payload, max_len).pop().unwrap_or_default()
}

pub fn with_footer(text: &str, footer: &str) -> String {
    format!("{text}\n\n{footer}")
}

fn summarize_input(tool_name: &str, input: &Value) -> String {
    let field = |key: &str| input.get(key).and_then(Value::as_str);
    let summary = match tool_name {
        "Bash" => match (field("command"), field("description")) {
            (Some(cmd), Some(desc)) => format!("$ {cmd}\n\n{desc}"),
            (Some(cmd), None) => format!("$ {cmd}"),
            _ => pretty(input),
        },
        "Write" | "Edit" | "MultiEdit" | "Read" | "NotebookEdit" => field("file_path")
            .or_else(|| field("notebook_path"))
            .map(|path| format!("📄 {path}"))
            .unwrap_or_else(|| pretty(input)),
        "WebFetch" => field("url")
            .map(|url| format!("🌐 {url}"))
            .unwrap_or_else(|| pretty(input)),
        _ => pretty(input),
    };
    truncate(&summary, MAX_INPUT_PREVIEW)
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}…", truncated)
    }
}

fn question_body(questions: &[Question]) -> String {
    let numbered = questions.len() > 1;
    let mut out = String::new();
    for (qi, q) in questions.iter().enumerate() {
        if qi > 0 {
            out.push_str("\n\n");
        }
        if numbered {
            out.push_str(&format!("{}. ", qi + 1));
        }
        match &q.header {
            Some(header) => out.push_str(&format!("❓ [{header}] {}", q.question)),
            None => out.push_str(&format!("❓ {}", q.question)),
        }
        if q.multi_select {
            out.push_str(" (select any)");
        }
        for option in &q.options {
            match &option.description {
                Some(desc) => out.push_str(&format!("\n• {} — {desc}", option.label)),
                None => out.push_str(&format!("\n• {}", option.label)),
            }
        }
    }
    out
}

/// Short button label for an "always allow" suggestion.
pub fn suggestion_label(index: usize, suggestion: &Value) -> String {
    let rule = suggestion
        .get("rules")
        .and_then(Value::as_array)
        .and_then(|rules| rules.first());
    if let Some(rule) = rule {
        let tool = rule.get("toolName").and_then(Value::as_str).unwrap_or("tool");
        return match rule.get("ruleContent").and_then(Value::as_str) {
            Some(content) => truncate(&format!("Always allow {tool}({content})"), 48),
            None => format!("Always allow {tool}"),
        };
    }
    if let Some(mode) = suggestion.get("mode").and_then(Value::as_str) {
        return format!("Always: {mode}");
    }
    format!("Always allow #{}", index + 1)
}

/// Allow/Deny row plus one row per suggestion. When `frozen`, every button
/// is inert and `chosen` is marked.
pub fn permission_keyboard(
    state: &PermissionState,
    chosen: Option<&Interaction>,
    frozen: bool,
) -> Keyboard {
    let button = |label: String, action: Interaction| {
        let marked = chosen == Some(&action)
            || matches!(
                (chosen, &action),
                (Some(Interaction::Deny { .. }), Interaction::Deny { .. })
            );
        let text = if marked { format!("✅ {label}") } else { label };
        let data = if frozen {
            FROZEN_CALLBACK.to_string()
        } else {
            action.to_callback()
        };
        Button::new(text, data)
    };

    let mut rows = vec![vec![
        button("Allow".into(), Interaction::Allow),
        button("Deny".into(), Interaction::Deny { message: None }),
    ]];
    for (index, suggestion) in state.suggestions.iter().enumerate() {
        rows.push(vec![button(
            suggestion_label(index, suggestion),
            Interaction::AlwaysAllow { index },
        )]);
    }
    rows
}

/// One row per option with checkmarks on selections, plus Submit when the
/// prompt needs an explicit submit. Frozen keyboards drop Submit.
pub fn question_keyboard(state: &QuestionState, frozen: bool) -> Keyboard {
    let numbered = state.items.len() > 1;
    let mut rows = Vec::new();
    for (qi, item) in state.items.iter().enumerate() {
        for (oi, label) in item.labels.iter().enumerate() {
            let mut text = if numbered {
                format!("{}. {label}", qi + 1)
            } else {
                label.clone()
            };
            if item.selection.contains(oi) {
                text = format!("✅ {text}");
            }
            let data = if frozen {
                FROZEN_CALLBACK.to_string()
            } else {
                Interaction::Toggle {
                    question: qi,
                    option: oi,
                }
                .to_callback()
            };
            rows.push(vec![Button::new(text, data)]);
        }
    }
    if !frozen && !state.resolves_on_first_click() {
        rows.push(vec![Button::new("Submit", Interaction::Submit.to_callback())]);
    }
    rows
}
