use std::process::{Command, Output, Stdio};

use crate::error::{RelayError, Result};

use super::Terminal;

/// tmux driven through its CLI.
#[derive(Debug, Clone)]
pub struct TmuxTerminal {
    program: String,
}

impl Default for TmuxTerminal {
    fn default() -> Self {
        Self {
            program: "tmux".into(),
        }
    }
}

impl TmuxTerminal {
    pub fn new() -> Self {
        Self::default()
    }

    fn run(&self, target: &str, args: &[&str]) -> Result<Output> {
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| RelayError::Terminal {
                target: target.to_string(),
                reason: format!("failed to run {}: {}", self.program, e),
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RelayError::Terminal {
                target: target.to_string(),
                reason: format!("{} {} failed: {}", self.program, args[0], stderr.trim()),
            });
        }
        Ok(output)
    }
}

impl Terminal for TmuxTerminal {
    fn exists(&self, target: &str) -> bool {
        self.run(target, &["display-message", "-p", "-t", target, "#{pane_id}"])
            .is_ok()
    }

    fn inject(&self, target: &str, text: &str) -> Result<()> {
        self.run(target, &literal_keys(target, text))?;
        self.run(target, &["send-keys", "-t", target, "Enter"])?;
        tracing::debug!(target, chars = text.chars().count(), "injected text");
        Ok(())
    }

    fn capture(&self, target: &str) -> Result<String> {
        let output = self.run(target, &["capture-pane", "-p", "-J", "-t", target])?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .trim_end()
            .to_string())
    }

    fn send_key(&self, target: &str, key: &str) -> Result<()> {
        self.run(target, &["send-keys", "-t", target, key])?;
        Ok(())
    }
}

/// `send-keys` arguments that type `text` verbatim. Literal mode keeps words
/// like "Enter" from being read as key names, and `--` keeps text such as
/// "-y" from being read as a flag.
fn literal_keys<'a>(target: &'a str, text: &'a str) -> [&'a str; 6] {
    ["send-keys", "-t", target, "-l", "--", text]
}
