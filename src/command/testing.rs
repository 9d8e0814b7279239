//! Scripted command runner for engine tests.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::command::{CommandOutput, CommandRunner};
use crate::utils::command_line;

/// A canned reply for every command line containing `pattern`.
struct Rule {
    pattern: String,
    output: CommandOutput,
}

/// Records every command and answers from a list of pattern rules.
///
/// The first rule whose pattern is a substring of the rendered command line
/// wins; unmatched commands succeed with empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every command containing `pattern` with the given stderr.
    pub fn fail_when(&self, pattern: &str, stderr: &str) -> &Self {
        self.reply_when(pattern, CommandOutput::from_exit(1, "", stderr))
    }

    /// Succeed every command containing `pattern` with the given stdout.
    pub fn respond_when(&self, pattern: &str, stdout: &str) -> &Self {
        self.reply_when(pattern, CommandOutput::from_exit(0, stdout, ""))
    }

    pub fn reply_when(&self, pattern: &str, output: CommandOutput) -> &Self {
        self.rules.lock().push(Rule {
            pattern: pattern.to_string(),
            output,
        });
        self
    }

    /// Rendered command lines, in invocation order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Number of recorded commands containing `pattern`.
    pub fn count_matching(&self, pattern: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.contains(pattern)).count()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[String]) -> CommandOutput {
        let line = command_line(program, args);
        self.calls.lock().push(line.clone());

        // Give concurrent callers a chance to interleave
        tokio::task::yield_now().await;

        self.rules
            .lock()
            .iter()
            .find(|rule| line.contains(&rule.pattern))
            .map(|rule| rule.output.clone())
            .unwrap_or_else(|| CommandOutput::from_exit(0, "", ""))
    }
}
