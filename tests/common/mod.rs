//! Fakes for the channel and terminal boundaries.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use hook_relay::channel::{Channel, InboundEvent, Keyboard};
use hook_relay::config::RelayConfig;
use hook_relay::coordinator::Coordinator;
use hook_relay::error::{RelayError, Result};
use hook_relay::request::{ChannelMessageRef, PendingRequest, Question, QuestionOption, RequestPayload};
use hook_relay::storage::file::FileRequestStore;
use hook_relay::terminal::Terminal;

pub const CHAT: i64 = 100;

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub message: ChannelMessageRef,
    pub text: String,
    pub keyboard: Option<Keyboard>,
}

/// Channel that records every call.
pub struct FakeChannel {
    next_id: AtomicI64,
    max_len: usize,
    /// When set, the next send carrying a keyboard fails.
    pub fail_next_keyboard: AtomicBool,
    pub sent: Mutex<Vec<SentMessage>>,
    pub edits: Mutex<Vec<SentMessage>>,
    pub answers: Mutex<Vec<(String, Option<String>)>>,
    pub reactions: Mutex<Vec<(ChannelMessageRef, Option<String>)>>,
}

impl FakeChannel {
    pub fn new(max_len: usize) -> Self {
        Self {
            next_id: AtomicI64::new(1),
            max_len,
            fail_next_keyboard: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            edits: Mutex::new(Vec::new()),
            answers: Mutex::new(Vec::new()),
            reactions: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn edits(&self) -> Vec<SentMessage> {
        self.edits.lock().unwrap().clone()
    }

    pub fn last_sent_text(&self) -> String {
        self.sent().last().map(|m| m.text.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Channel for FakeChannel {
    async fn start(&self, _tx: mpsc::Sender<InboundEvent>) -> Result<()> {
        Ok(())
    }

    async fn send(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<ChannelMessageRef> {
        if text.chars().count() > self.max_len {
            return Err(RelayError::Channel {
                reason: format!("message too long: {}", text.chars().count()),
            });
        }
        if keyboard.is_some() && self.fail_next_keyboard.swap(false, Ordering::SeqCst) {
            return Err(RelayError::Channel {
                reason: "simulated send failure".into(),
            });
        }
        let message = ChannelMessageRef {
            chat_id,
            message_id: self.next_id.fetch_add(1, Ordering::SeqCst),
        };
        self.sent.lock().unwrap().push(SentMessage {
            message,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(message)
    }

    async fn edit(
        &self,
        message: &ChannelMessageRef,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<()> {
        self.edits.lock().unwrap().push(SentMessage {
            message: *message,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(())
    }

    async fn answer_interaction(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.answers
            .lock()
            .unwrap()
            .push((callback_id.to_string(), text.map(String::from)));
        Ok(())
    }

    async fn react(&self, message: &ChannelMessageRef, emoji: Option<&str>) -> Result<()> {
        self.reactions
            .lock()
            .unwrap()
            .push((*message, emoji.map(String::from)));
        Ok(())
    }

    fn max_message_len(&self) -> usize {
        self.max_len
    }
}

/// Terminal whose live targets are set by the test.
#[derive(Default)]
pub struct ScriptedTerminal {
    pub alive: Mutex<HashSet<String>>,
    pub injected: Mutex<Vec<(String, String)>>,
    pub keys: Mutex<Vec<(String, String)>>,
    pub screen: Mutex<String>,
}

impl ScriptedTerminal {
    pub fn with_targets(targets: &[&str]) -> Self {
        let terminal = Self::default();
        terminal
            .alive
            .lock()
            .unwrap()
            .extend(targets.iter().map(|t| t.to_string()));
        terminal
    }

    pub fn kill(&self, target: &str) {
        self.alive.lock().unwrap().remove(target);
    }

    pub fn injected(&self) -> Vec<(String, String)> {
        self.injected.lock().unwrap().clone()
    }
}

impl Terminal for ScriptedTerminal {
    fn exists(&self, target: &str) -> bool {
        self.alive.lock().unwrap().contains(target)
    }

    fn inject(&self, target: &str, text: &str) -> Result<()> {
        if !self.exists(target) {
            return Err(RelayError::Terminal {
                target: target.into(),
                reason: "no such pane".into(),
            });
        }
        self.injected
            .lock()
            .unwrap()
            .push((target.to_string(), text.to_string()));
        Ok(())
    }

    fn capture(&self, _target: &str) -> Result<String> {
        Ok(self.screen.lock().unwrap().clone())
    }

    fn send_key(&self, target: &str, key: &str) -> Result<()> {
        self.keys
            .lock()
            .unwrap()
            .push((target.to_string(), key.to_string()));
        Ok(())
    }
}

pub struct Harness {
    pub coordinator: Arc<Coordinator>,
    pub channel: Arc<FakeChannel>,
    pub terminal: Arc<ScriptedTerminal>,
}

pub fn config(state_dir: &Path) -> RelayConfig {
    let mut config = RelayConfig {
        state_dir: state_dir.to_path_buf(),
        ..RelayConfig::default()
    };
    config.telegram.chat_id = Some(CHAT);
    config
}

pub fn harness(state_dir: &Path) -> Harness {
    harness_with(config(state_dir), 4096, &["%1"])
}

pub fn harness_with(config: RelayConfig, max_len: usize, targets: &[&str]) -> Harness {
    let channel = Arc::new(FakeChannel::new(max_len));
    let terminal = Arc::new(ScriptedTerminal::with_targets(targets));
    let store = Arc::new(FileRequestStore::new(config.pending_dir()));
    let coordinator = Arc::new(Coordinator::new(
        config,
        store,
        channel.clone(),
        terminal.clone(),
    ));
    Harness {
        coordinator,
        channel,
        terminal,
    }
}

pub fn always_allow_suggestion() -> Value {
    json!({
        "type": "addRules",
        "rules": [{"toolName": "Bash", "ruleContent": "cargo test:*"}],
        "behavior": "allow",
        "destination": "localSettings"
    })
}

pub fn bash_request(pid: u32) -> PendingRequest {
    PendingRequest::new(
        RequestPayload::Permission {
            tool_name: "Bash".into(),
            tool_input: json!({"command": "cargo test", "description": "Run tests"}),
            suggestions: vec![always_allow_suggestion()],
        },
        "session-1",
        Some("%1".into()),
        "/work/app",
        pid,
    )
}

pub fn question(text: &str, labels: &[&str], multi: bool) -> Question {
    Question {
        question: text.into(),
        header: None,
        options: labels
            .iter()
            .map(|l| QuestionOption {
                label: l.to_string(),
                description: None,
            })
            .collect(),
        multi_select: multi,
    }
}

pub fn question_request(questions: Vec<Question>, pid: u32) -> PendingRequest {
    let tool_input = json!({ "questions": questions });
    PendingRequest::new(
        RequestPayload::Question {
            tool_input,
            questions,
        },
        "session-1",
        Some("%1".into()),
        "/work/app",
        pid,
    )
}

/// Pid of a process that has already exited.
pub fn dead_pid() -> u32 {
    let mut child = std::process::Command::new("true").spawn().unwrap();
    let pid = child.id();
    child.wait().unwrap();
    pid
}
