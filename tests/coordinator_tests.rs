//! Bot-side processor/resolver behaviour against fake channel and terminal.

mod common;

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use hook_relay::channel::{InboundEvent, Transcriber};
use hook_relay::coordinator::Coordinator;
use hook_relay::decision::{Decision, Interaction, Outcome, PermissionDecision, FROZEN_CALLBACK};
use hook_relay::error::RelayError;
use hook_relay::event::{EventContext, HookEvent, ToolEvent};
use hook_relay::render::{FOOTER_CANCELLED, FOOTER_SUBMITTED};
use hook_relay::request::{ChannelMessageRef, RequestStatus};
use hook_relay::storage::file::FileRequestStore;

use common::*;

fn alive_pid() -> u32 {
    std::process::id()
}

fn context() -> EventContext {
    EventContext {
        session_id: "session-1".into(),
        cwd: "/work/app".into(),
        transcript_path: None,
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bash_prompt_renders_two_rows_and_moves_to_sent() {
    let tmp = TempDir::new().unwrap();
    let h = harness(tmp.path());
    let request = bash_request(alive_pid());
    h.coordinator.store().create(&request).unwrap();

    h.coordinator.process_pending(&request.id).await.unwrap();

    let sent = h.channel.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].text.contains("$ cargo test"));
    let keyboard = sent[0].keyboard.clone().unwrap();
    assert_eq!(keyboard.len(), 2);
    assert_eq!(keyboard[0][0].text, "Allow");
    assert_eq!(keyboard[0][1].text, "Deny");
    assert_eq!(keyboard[1][0].data, "p:s:0");

    let stored = h.coordinator.store().read(&request.id).unwrap();
    assert_eq!(stored.status, RequestStatus::Sent);
    assert_eq!(stored.channel_message, Some(sent[0].message));
    assert_eq!(
        h.coordinator.mirrors().request_for(&sent[0].message),
        Some(request.id.clone())
    );
}

#[tokio::test]
async fn repeated_signals_render_once() {
    let tmp = TempDir::new().unwrap();
    let h = harness(tmp.path());
    let request = bash_request(alive_pid());
    h.coordinator.store().create(&request).unwrap();

    h.coordinator.process_pending(&request.id).await.unwrap();
    h.coordinator.process_pending(&request.id).await.unwrap();

    assert_eq!(h.channel.sent().len(), 1);
}

#[tokio::test]
async fn missing_route_leaves_request_pending() {
    let tmp = TempDir::new().unwrap();
    let mut config = config(tmp.path());
    config.telegram.chat_id = None;
    let h = harness_with(config, 4096, &["%1"]);
    let request = bash_request(alive_pid());
    h.coordinator.store().create(&request).unwrap();

    let err = h.coordinator.process_pending(&request.id).await.unwrap_err();
    assert!(matches!(err, RelayError::NoRoute { .. }));
    assert_eq!(
        h.coordinator.store().read(&request.id).unwrap().status,
        RequestStatus::Pending
    );
    assert!(h.channel.sent().is_empty());
}

#[tokio::test]
async fn bound_target_routes_to_its_chat() {
    let tmp = TempDir::new().unwrap();
    let h = harness(tmp.path());
    h.coordinator.bindings().bind("%1", 555);
    let request = bash_request(alive_pid());
    h.coordinator.store().create(&request).unwrap();

    h.coordinator.process_pending(&request.id).await.unwrap();
    assert_eq!(h.channel.sent()[0].message.chat_id, 555);
}

#[tokio::test]
async fn long_prompt_is_paginated_with_buttons_on_last_page() {
    let tmp = TempDir::new().unwrap();
    let mut config = config(tmp.path());
    config.max_message_len = 300;
    let h = harness_with(config, 300, &["%1"]);

    let long_command = (0..60)
        .map(|i| format!("echo line-{i}"))
        .collect::<Vec<_>>()
        .join("\n");
    let mut request = bash_request(alive_pid());
    if let hook_relay::request::RequestPayload::Permission { tool_input, .. } = &mut request.payload
    {
        *tool_input = json!({ "command": long_command });
    }
    h.coordinator.store().create(&request).unwrap();
    h.coordinator.process_pending(&request.id).await.unwrap();

    let sent = h.channel.sent();
    assert!(sent.len() > 1);
    let (last, earlier) = sent.split_last().unwrap();
    assert!(earlier.iter().all(|m| m.keyboard.is_none()));
    assert!(last.keyboard.is_some());
    assert!(sent.iter().all(|m| m.text.chars().count() <= 300));
}

#[tokio::test]
async fn failed_keyboard_page_is_retried_without_repeating_earlier_pages() {
    let tmp = TempDir::new().unwrap();
    let mut config = config(tmp.path());
    config.max_message_len = 300;
    let h = harness_with(config, 300, &["%1"]);

    let long_command = (0..60)
        .map(|i| format!("echo line-{i}"))
        .collect::<Vec<_>>()
        .join("\n");
    let mut request = bash_request(alive_pid());
    if let hook_relay::request::RequestPayload::Permission { tool_input, .. } = &mut request.payload
    {
        *tool_input = json!({ "command": long_command });
    }
    h.coordinator.store().create(&request).unwrap();

    h.channel
        .fail_next_keyboard
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let err = h.coordinator.process_pending(&request.id).await.unwrap_err();
    assert!(matches!(err, RelayError::Channel { .. }));
    let leading = h.channel.sent();
    assert!(!leading.is_empty());
    assert!(leading.iter().all(|m| m.keyboard.is_none()));
    assert_eq!(
        h.coordinator.store().read(&request.id).unwrap().status,
        RequestStatus::Pending
    );

    h.coordinator.process_pending(&request.id).await.unwrap();
    let sent = h.channel.sent();
    assert_eq!(sent.len(), leading.len() + 1);
    assert!(sent.last().unwrap().keyboard.is_some());
    assert_eq!(
        h.coordinator.store().read(&request.id).unwrap().status,
        RequestStatus::Sent
    );
}

// ---------------------------------------------------------------------------
// Permission resolution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn always_allow_writes_suggestion_and_freezes_with_checkmark() {
    let tmp = TempDir::new().unwrap();
    let h = harness(tmp.path());
    let request = bash_request(alive_pid());
    h.coordinator.store().create(&request).unwrap();
    h.coordinator.process_pending(&request.id).await.unwrap();
    let message = h.channel.sent()[0].message;

    let outcome = h
        .coordinator
        .interact(message, Interaction::AlwaysAllow { index: 0 })
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Resolved);

    let stored = h.coordinator.store().read(&request.id).unwrap();
    assert_eq!(stored.status, RequestStatus::Answered);
    let decision = serde_json::to_value(stored.decision.unwrap()).unwrap();
    assert_eq!(
        decision,
        json!({"permission": {"behavior": "allow", "updatedPermissions": [always_allow_suggestion()]}})
    );

    let edits = h.channel.edits();
    assert_eq!(edits.len(), 1);
    assert!(edits[0].text.ends_with(FOOTER_SUBMITTED));
    let keyboard = edits[0].keyboard.clone().unwrap();
    assert!(keyboard[1][0].text.starts_with("✅ "));
    assert!(!keyboard[0][0].text.starts_with("✅ "));
    assert!(keyboard.iter().flatten().all(|b| b.data == FROZEN_CALLBACK));
}

#[tokio::test]
async fn second_resolution_is_rejected_and_writes_nothing() {
    let tmp = TempDir::new().unwrap();
    let h = harness(tmp.path());
    let request = bash_request(alive_pid());
    h.coordinator.store().create(&request).unwrap();
    h.coordinator.process_pending(&request.id).await.unwrap();
    let message = h.channel.sent()[0].message;

    let (first, second) = tokio::join!(
        h.coordinator.interact(message, Interaction::Allow),
        h.coordinator.interact(message, Interaction::Deny { message: None }),
    );
    let mut outcomes = vec![first.unwrap(), second.unwrap()];
    outcomes.sort_by_key(|o| format!("{o:?}"));
    assert_eq!(outcomes, vec![Outcome::AlreadyAnswered, Outcome::Resolved]);
    assert_eq!(h.channel.edits().len(), 1);

    // The written decision matches the frozen prompt.
    let stored = h.coordinator.store().read(&request.id).unwrap();
    let frozen = &h.channel.edits()[0];
    let allowed = matches!(
        stored.decision,
        Some(Decision::Permission(PermissionDecision::Allow { .. }))
    );
    let marked = frozen.keyboard.as_ref().unwrap()[0]
        .iter()
        .find(|b| b.text.starts_with("✅ "))
        .map(|b| b.text.clone())
        .unwrap();
    assert_eq!(marked == "✅ Allow", allowed);
}

#[tokio::test]
async fn free_text_reply_to_permission_is_a_deny_with_message() {
    let tmp = TempDir::new().unwrap();
    let h = harness(tmp.path());
    let request = bash_request(alive_pid());
    h.coordinator.store().create(&request).unwrap();
    h.coordinator.process_pending(&request.id).await.unwrap();
    let prompt = h.channel.sent()[0].message;

    h.coordinator
        .handle_inbound(InboundEvent::Text {
            message: ChannelMessageRef {
                chat_id: CHAT,
                message_id: 900,
            },
            reply_to: Some(prompt.message_id),
            text: "run only the unit tests".into(),
        })
        .await
        .unwrap();

    let stored = h.coordinator.store().read(&request.id).unwrap();
    assert_eq!(
        stored.decision,
        Some(Decision::Permission(PermissionDecision::deny(Some(
            "run only the unit tests".into()
        ))))
    );
    // Nothing was typed into the terminal.
    assert!(h.terminal.injected().is_empty());
}

#[tokio::test]
async fn question_controls_are_rejected_on_permission_prompts() {
    let tmp = TempDir::new().unwrap();
    let h = harness(tmp.path());
    let request = bash_request(alive_pid());
    h.coordinator.store().create(&request).unwrap();
    h.coordinator.process_pending(&request.id).await.unwrap();
    let message = h.channel.sent()[0].message;

    let outcome = h
        .coordinator
        .interact(message, Interaction::Submit)
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Rejected(_)));
    let outcome = h
        .coordinator
        .interact(message, Interaction::AlwaysAllow { index: 5 })
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Rejected(_)));
    assert_eq!(
        h.coordinator.store().read(&request.id).unwrap().status,
        RequestStatus::Sent
    );
}

// ---------------------------------------------------------------------------
// Question resolution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn single_select_question_resolves_on_first_click() {
    let tmp = TempDir::new().unwrap();
    let h = harness(tmp.path());
    let request = question_request(
        vec![question("Which db?", &["pg", "mysql", "sqlite", "redis", "mongo"], false)],
        alive_pid(),
    );
    h.coordinator.store().create(&request).unwrap();
    h.coordinator.process_pending(&request.id).await.unwrap();
    let sent = h.channel.sent();
    let keyboard = sent[0].keyboard.clone().unwrap();
    assert_eq!(keyboard.len(), 5, "no submit row");

    let outcome = h
        .coordinator
        .interact(
            sent[0].message,
            Interaction::Toggle {
                question: 0,
                option: 2,
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Resolved);

    let stored = h.coordinator.store().read(&request.id).unwrap();
    match stored.decision {
        Some(Decision::Question(d)) => {
            assert_eq!(d.answers[0].labels, vec!["sqlite".to_string()]);
            assert!(d.reply.is_none());
        }
        other => panic!("unexpected decision {other:?}"),
    }
    let frozen = h.channel.edits().pop().unwrap();
    assert_eq!(frozen.keyboard.unwrap()[2][0].text, "✅ sqlite");
}

#[tokio::test]
async fn multi_select_needs_submit_and_double_toggle_clears() {
    let tmp = TempDir::new().unwrap();
    let h = harness(tmp.path());
    let request = question_request(
        vec![question("Features?", &["auth", "billing", "search"], true)],
        alive_pid(),
    );
    h.coordinator.store().create(&request).unwrap();
    h.coordinator.process_pending(&request.id).await.unwrap();
    let message = h.channel.sent()[0].message;
    let toggle = |option| Interaction::Toggle {
        question: 0,
        option,
    };

    assert_eq!(
        h.coordinator.interact(message, toggle(1)).await.unwrap(),
        Outcome::Updated
    );
    assert_eq!(
        h.coordinator.interact(message, toggle(1)).await.unwrap(),
        Outcome::Updated
    );
    let state = h.coordinator.mirrors().question(&message).unwrap();
    assert!(state.items[0].selection.is_empty());
    assert!(!state.resolved);
    assert_eq!(
        h.coordinator.store().read(&request.id).unwrap().status,
        RequestStatus::Sent
    );

    // Submitting with nothing selected is refused.
    assert!(matches!(
        h.coordinator.interact(message, Interaction::Submit).await.unwrap(),
        Outcome::Rejected(_)
    ));

    h.coordinator.interact(message, toggle(0)).await.unwrap();
    h.coordinator.interact(message, toggle(2)).await.unwrap();
    let rerendered = h.channel.edits().pop().unwrap();
    let keyboard = rerendered.keyboard.unwrap();
    assert_eq!(keyboard[0][0].text, "✅ auth");
    assert_eq!(keyboard.last().unwrap()[0].text, "Submit");

    assert_eq!(
        h.coordinator.interact(message, Interaction::Submit).await.unwrap(),
        Outcome::Resolved
    );
    let stored = h.coordinator.store().read(&request.id).unwrap();
    match stored.decision {
        Some(Decision::Question(d)) => {
            assert_eq!(d.answers[0].labels, vec!["auth".to_string(), "search".to_string()])
        }
        other => panic!("unexpected decision {other:?}"),
    }
}

#[tokio::test]
async fn reply_to_answered_question_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let h = harness(tmp.path());
    let request = question_request(vec![question("Go?", &["yes", "no"], false)], alive_pid());
    h.coordinator.store().create(&request).unwrap();
    h.coordinator.process_pending(&request.id).await.unwrap();
    let message = h.channel.sent()[0].message;

    h.coordinator
        .interact(
            message,
            Interaction::Toggle {
                question: 0,
                option: 0,
            },
        )
        .await
        .unwrap();
    let outcome = h
        .coordinator
        .interact(
            message,
            Interaction::Reply {
                text: "actually no".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::AlreadyAnswered);

    let stored = h.coordinator.store().read(&request.id).unwrap();
    match stored.decision {
        Some(Decision::Question(d)) => assert!(d.reply.is_none()),
        other => panic!("unexpected decision {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Stale and cancelled prompts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dead_origin_freezes_as_cancelled_without_decision() {
    let tmp = TempDir::new().unwrap();
    let h = harness(tmp.path());
    let request = bash_request(dead_pid());
    h.coordinator.store().create(&request).unwrap();
    h.coordinator.process_pending(&request.id).await.unwrap();
    let message = h.channel.sent()[0].message;

    let outcome = h
        .coordinator
        .interact(message, Interaction::Allow)
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Stale);

    let stored = h.coordinator.store().read(&request.id).unwrap();
    assert_eq!(stored.status, RequestStatus::Cancelled);
    assert!(stored.decision.is_none());
    let frozen = h.channel.edits().pop().unwrap();
    assert!(frozen.text.ends_with(FOOTER_CANCELLED));
    assert!(h.coordinator.mirrors().request_for(&message).is_none());

    // Later clicks find nothing.
    assert_eq!(
        h.coordinator.interact(message, Interaction::Allow).await.unwrap(),
        Outcome::Expired
    );
}

#[tokio::test]
async fn sweep_cancels_only_dead_origins() {
    let tmp = TempDir::new().unwrap();
    let h = harness(tmp.path());
    let live = bash_request(alive_pid());
    let dead = bash_request(dead_pid());
    for request in [&live, &dead] {
        h.coordinator.store().create(request).unwrap();
        h.coordinator.process_pending(&request.id).await.unwrap();
    }

    assert_eq!(h.coordinator.sweep_stale().await.unwrap(), 1);
    assert_eq!(
        h.coordinator.store().read(&dead.id).unwrap().status,
        RequestStatus::Cancelled
    );
    assert_eq!(
        h.coordinator.store().read(&live.id).unwrap().status,
        RequestStatus::Sent
    );
}

#[tokio::test]
async fn sweep_forgets_prompts_once_settled() {
    let tmp = TempDir::new().unwrap();
    let h = harness(tmp.path());
    let mut answered = Vec::new();
    for _ in 0..5 {
        let request = bash_request(alive_pid());
        h.coordinator.store().create(&request).unwrap();
        h.coordinator.process_pending(&request.id).await.unwrap();
        answered.push(request.id);
    }
    let open = bash_request(alive_pid());
    h.coordinator.store().create(&open).unwrap();
    h.coordinator.process_pending(&open.id).await.unwrap();

    for (i, id) in answered.iter().enumerate() {
        let outcome = h
            .coordinator
            .resolve_by_id(id, Interaction::Allow)
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Resolved);
        // The hook consumes most answers; one is still on disk.
        if i > 0 {
            h.coordinator.store().delete(id).unwrap();
        }
    }
    assert_eq!(h.coordinator.mirrors().len(), 6);

    assert_eq!(h.coordinator.sweep_stale().await.unwrap(), 0);
    assert_eq!(h.coordinator.mirrors().len(), 1);
    assert_eq!(
        h.coordinator.mirrors().tracked()[0].1,
        open.id,
        "the open prompt stays clickable"
    );
}

#[tokio::test]
async fn resolving_unrendered_request_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let h = harness(tmp.path());
    let request = bash_request(alive_pid());
    h.coordinator.store().create(&request).unwrap();

    let outcome = h
        .coordinator
        .resolve_by_id(&request.id, Interaction::Allow)
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Rejected(_)));
    assert_eq!(
        h.coordinator.resolve_by_id("missing", Interaction::Allow).await.unwrap(),
        Outcome::Expired
    );
}

// ---------------------------------------------------------------------------
// Lifecycle events
// ---------------------------------------------------------------------------

#[tokio::test]
async fn prompt_submit_cancels_outstanding_prompts() {
    let tmp = TempDir::new().unwrap();
    let h = harness(tmp.path());
    let request = bash_request(alive_pid());
    h.coordinator.store().create(&request).unwrap();
    h.coordinator.process_pending(&request.id).await.unwrap();

    let event = HookEvent::UserPromptSubmit {
        context: context(),
        prompt: "never mind".into(),
    };
    h.coordinator.handle_event(&event, Some("%1")).await.unwrap();

    let stored = h.coordinator.store().read(&request.id).unwrap();
    assert_eq!(stored.status, RequestStatus::Cancelled);
    assert!(h.channel.edits()[0].text.ends_with(FOOTER_CANCELLED));
}

#[tokio::test]
async fn post_tool_use_cancels_only_the_matching_prompt() {
    let tmp = TempDir::new().unwrap();
    let h = harness(tmp.path());
    let matching = bash_request(alive_pid());
    let other = question_request(vec![question("Go?", &["yes", "no"], false)], alive_pid());
    for request in [&matching, &other] {
        h.coordinator.store().create(request).unwrap();
        h.coordinator.process_pending(&request.id).await.unwrap();
    }

    let event = HookEvent::PostToolUse(ToolEvent {
        context: context(),
        tool_name: "Bash".into(),
        tool_input: json!({"command": "cargo test", "description": "Run tests"}),
        permission_suggestions: vec![],
    });
    h.coordinator.handle_event(&event, Some("%1")).await.unwrap();

    assert_eq!(
        h.coordinator.store().read(&matching.id).unwrap().status,
        RequestStatus::Cancelled
    );
    assert_eq!(
        h.coordinator.store().read(&other.id).unwrap().status,
        RequestStatus::Sent
    );
}

#[tokio::test]
async fn session_end_drops_the_session() {
    let tmp = TempDir::new().unwrap();
    let h = harness(tmp.path());
    h.coordinator
        .handle_event(&HookEvent::SessionStart { context: context() }, Some("%1"))
        .await
        .unwrap();
    assert!(h.coordinator.sessions().get("session-1").is_some());

    h.coordinator
        .handle_event(&HookEvent::SessionEnd { context: context() }, None)
        .await
        .unwrap();
    assert!(h.coordinator.sessions().get("session-1").is_none());
}

#[tokio::test]
async fn permission_prompt_notifications_send_no_notice() {
    let tmp = TempDir::new().unwrap();
    let h = harness(tmp.path());
    let event = HookEvent::Notification {
        context: context(),
        message: "Claude needs your permission to use Bash".into(),
        notification_type: Some("permission_prompt".into()),
    };
    h.coordinator.handle_event(&event, Some("%1")).await.unwrap();
    assert!(h.channel.sent().is_empty());

    let event = HookEvent::Notification {
        context: context(),
        message: "Claude is waiting for your input".into(),
        notification_type: Some("idle_prompt".into()),
    };
    h.coordinator.handle_event(&event, Some("%1")).await.unwrap();
    assert!(h.channel.last_sent_text().contains("waiting for your input"));
}

// ---------------------------------------------------------------------------
// Operator input relay
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reply_to_notice_is_relayed_and_marked_until_agent_acts() {
    let tmp = TempDir::new().unwrap();
    let h = harness(tmp.path());
    h.coordinator
        .handle_event(&HookEvent::Stop { context: context() }, Some("%1"))
        .await
        .unwrap();
    let notice = h.channel.sent()[0].clone();
    assert!(notice.text.contains("app"));

    let operator_message = ChannelMessageRef {
        chat_id: CHAT,
        message_id: 500,
    };
    h.coordinator
        .handle_inbound(InboundEvent::Text {
            message: operator_message,
            reply_to: Some(notice.message.message_id),
            text: "now run the linter".into(),
        })
        .await
        .unwrap();

    assert_eq!(
        h.terminal.injected(),
        vec![("%1".to_string(), "now run the linter".to_string())]
    );
    assert_eq!(h.coordinator.reactions().count("%1"), 1);

    let event = HookEvent::PreToolUse(ToolEvent {
        context: context(),
        tool_name: "Bash".into(),
        tool_input: json!({"command": "cargo clippy"}),
        permission_suggestions: vec![],
    });
    h.coordinator.handle_event(&event, Some("%1")).await.unwrap();
    assert_eq!(h.coordinator.reactions().count("%1"), 0);
    let reactions = h.channel.reactions.lock().unwrap().clone();
    assert_eq!(reactions.last(), Some(&(operator_message, None)));
}

#[tokio::test]
async fn relay_to_dead_target_tears_down_binding() {
    let tmp = TempDir::new().unwrap();
    let h = harness(tmp.path());
    h.coordinator
        .handle_event(&HookEvent::SessionStart { context: context() }, Some("%1"))
        .await
        .unwrap();
    h.coordinator.bindings().bind("%1", CHAT);
    h.terminal.kill("%1");

    h.coordinator
        .handle_inbound(InboundEvent::Text {
            message: ChannelMessageRef {
                chat_id: CHAT,
                message_id: 501,
            },
            reply_to: None,
            text: "hello?".into(),
        })
        .await
        .unwrap();

    assert!(h.terminal.injected().is_empty());
    assert_eq!(h.coordinator.bindings().chat_for("%1"), None);
    assert!(h.coordinator.sessions().get("session-1").is_none());
    assert!(h.channel.last_sent_text().contains("has ended"));
}

#[tokio::test]
async fn unknown_chats_are_ignored() {
    let tmp = TempDir::new().unwrap();
    let h = harness(tmp.path());
    h.coordinator
        .handle_event(&HookEvent::SessionStart { context: context() }, Some("%1"))
        .await
        .unwrap();

    h.coordinator
        .handle_inbound(InboundEvent::Text {
            message: ChannelMessageRef {
                chat_id: 666,
                message_id: 1,
            },
            reply_to: None,
            text: "rm -rf /".into(),
        })
        .await
        .unwrap();

    assert!(h.terminal.injected().is_empty());
    assert!(h.channel.sent().is_empty());
}

#[tokio::test]
async fn button_press_is_acknowledged_with_outcome() {
    let tmp = TempDir::new().unwrap();
    let h = harness(tmp.path());
    let request = bash_request(alive_pid());
    h.coordinator.store().create(&request).unwrap();
    h.coordinator.process_pending(&request.id).await.unwrap();
    let message = h.channel.sent()[0].message;

    for callback_id in ["cb-1", "cb-2"] {
        h.coordinator
            .handle_inbound(InboundEvent::Callback {
                callback_id: callback_id.into(),
                message,
                data: "p:a".into(),
            })
            .await
            .unwrap();
    }

    let answers = h.channel.answers.lock().unwrap().clone();
    assert_eq!(answers[0], ("cb-1".to_string(), Some("✅ Submitted".to_string())));
    assert_eq!(answers[1], ("cb-2".to_string(), Some("Already answered".to_string())));
}

#[tokio::test]
async fn key_and_screen_commands_reach_the_terminal() {
    let tmp = TempDir::new().unwrap();
    let h = harness(tmp.path());
    h.coordinator
        .handle_event(&HookEvent::SessionStart { context: context() }, Some("%1"))
        .await
        .unwrap();
    *h.terminal.screen.lock().unwrap() = "$ cargo build\n   Compiling app".into();
    let text = |text: &str| InboundEvent::Text {
        message: ChannelMessageRef {
            chat_id: CHAT,
            message_id: 2,
        },
        reply_to: None,
        text: text.into(),
    };

    h.coordinator.handle_inbound(text("/key Escape")).await.unwrap();
    assert_eq!(
        h.terminal.keys.lock().unwrap().clone(),
        vec![("%1".to_string(), "Escape".to_string())]
    );

    h.coordinator.handle_inbound(text("/key rm")).await.unwrap();
    assert_eq!(h.terminal.keys.lock().unwrap().len(), 1);

    h.coordinator.handle_inbound(text("/screen")).await.unwrap();
    assert!(h.channel.last_sent_text().contains("Compiling app"));

    h.coordinator.handle_inbound(text("/sessions")).await.unwrap();
    assert!(h.channel.last_sent_text().contains("/work/app"));
}

#[tokio::test]
async fn voice_without_transcriber_is_declined() {
    let tmp = TempDir::new().unwrap();
    let h = harness(tmp.path());
    h.coordinator
        .handle_inbound(InboundEvent::Voice {
            message: ChannelMessageRef {
                chat_id: CHAT,
                message_id: 3,
            },
            reply_to: None,
            file_id: "voice-1".into(),
        })
        .await
        .unwrap();
    assert!(h.channel.last_sent_text().contains("aren't supported"));
}

struct FixedTranscriber(&'static str);

#[async_trait::async_trait]
impl Transcriber for FixedTranscriber {
    async fn transcribe(&self, _file_id: &str) -> hook_relay::error::Result<String> {
        Ok(self.0.to_string())
    }
}

#[tokio::test]
async fn transcribed_voice_reply_answers_the_prompt() {
    let tmp = TempDir::new().unwrap();
    let channel = Arc::new(FakeChannel::new(4096));
    let terminal = Arc::new(ScriptedTerminal::with_targets(&["%1"]));
    let config = config(tmp.path());
    let store = Arc::new(FileRequestStore::new(config.pending_dir()));
    let coordinator = Coordinator::new(config, store, channel.clone(), terminal)
        .with_transcriber(Arc::new(FixedTranscriber("  only the staging database  ")));

    let request = bash_request(alive_pid());
    coordinator.store().create(&request).unwrap();
    coordinator.process_pending(&request.id).await.unwrap();
    let prompt = channel.sent()[0].message;

    coordinator
        .handle_inbound(InboundEvent::Voice {
            message: ChannelMessageRef {
                chat_id: CHAT,
                message_id: 77,
            },
            reply_to: Some(prompt.message_id),
            file_id: "voice-2".into(),
        })
        .await
        .unwrap();

    let stored = coordinator.store().read(&request.id).unwrap();
    assert_eq!(
        stored.decision,
        Some(Decision::Permission(PermissionDecision::deny(Some(
            "only the staging database".into()
        ))))
    );
}
