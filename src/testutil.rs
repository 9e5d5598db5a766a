//! Scripted doubles shared by the unit tests: a context that records every
//! line it is given and a command runner that replies from a script.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use crate::context::RequestContext;
use crate::runner::{CmdError, CmdResult, CommandExec, CommandSpec};

/// Context double that records each channel's lines for assertions.
pub struct RecordingContext {
    userid: String,
    sys: RefCell<Vec<String>>,
    announced: RefCell<Vec<String>>,
    noted: RefCell<Vec<String>>,
    warned: RefCell<Vec<String>>,
}

impl RecordingContext {
    pub fn new<U: Into<String>>(userid: U) -> Self {
        Self {
            userid: userid.into(),
            sys: RefCell::new(Vec::new()),
            announced: RefCell::new(Vec::new()),
            noted: RefCell::new(Vec::new()),
            warned: RefCell::new(Vec::new()),
        }
    }

    pub fn sys_lines(&self) -> Vec<String> {
        self.sys.borrow().clone()
    }

    pub fn announced(&self) -> Vec<String> {
        self.announced.borrow().clone()
    }

    pub fn noted(&self) -> Vec<String> {
        self.noted.borrow().clone()
    }

    pub fn warned(&self) -> Vec<String> {
        self.warned.borrow().clone()
    }
}

impl RequestContext for RecordingContext {
    fn userid(&self) -> &str {
        &self.userid
    }

    fn sys_log(&self, line: &str) {
        self.sys.borrow_mut().push(line.to_string());
    }

    fn announce(&self, line: &str) {
        self.announced.borrow_mut().push(line.to_string());
    }

    fn note(&self, line: &str) {
        self.noted.borrow_mut().push(line.to_string());
    }

    fn warn(&self, line: &str) {
        self.warned.borrow_mut().push(line.to_string());
    }
}

/// One scripted reply of the [`MockExec`] runner.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Clean exit with the given combined output.
    Ok(String),
    /// Non-zero exit with the given status and combined output.
    Exit(i32, String),
    /// Spawn failure with a permission-denied error.
    Denied,
    /// Supervision deadline expiry.
    TimedOut,
}

impl MockReply {
    fn produce(&self) -> CmdResult<String> {
        match self {
            MockReply::Ok(output) => Ok(output.clone()),
            MockReply::Exit(status, output) => Err(CmdError::NonZero {
                status: *status,
                output: output.clone(),
            }),
            MockReply::Denied => Err(CmdError::Spawn(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "sudo: permission denied",
            ))),
            MockReply::TimedOut => Err(CmdError::TimedOut {
                limit: Duration::from_secs(1),
                output: String::new(),
            }),
        }
    }
}

struct Rule {
    needle: String,
    replies: VecDeque<MockReply>,
}

/// Command runner double replying from substring-matched scripts.
///
/// The first rule whose needle occurs in the command's display line wins.
/// Sequenced rules pop one reply per call and repeat the last one once the
/// sequence is drained. Unmatched commands get a clean empty exit.
pub struct MockExec {
    rules: RefCell<Vec<Rule>>,
    calls: RefCell<Vec<String>>,
}

impl MockExec {
    pub fn new() -> Self {
        Self {
            rules: RefCell::new(Vec::new()),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Always reply with `reply` for commands containing `needle`.
    pub fn stub<N: Into<String>>(&self, needle: N, reply: MockReply) {
        self.stub_seq(needle, vec![reply]);
    }

    /// Reply in order for commands containing `needle`; the last entry
    /// repeats.
    pub fn stub_seq<N: Into<String>>(&self, needle: N, replies: Vec<MockReply>) {
        self.rules.borrow_mut().push(Rule {
            needle: needle.into(),
            replies: replies.into(),
        });
    }

    /// Display lines of every command executed, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl CommandExec for MockExec {
    fn execute(&self, _ctx: &dyn RequestContext, spec: &CommandSpec) -> CmdResult<String> {
        let line = spec.display_line();
        self.calls.borrow_mut().push(line.clone());

        let mut rules = self.rules.borrow_mut();
        for rule in rules.iter_mut() {
            if line.contains(&rule.needle) {
                let reply = if rule.replies.len() > 1 {
                    rule.replies.pop_front()
                } else {
                    rule.replies.front().cloned()
                };
                return reply.map(|r| r.produce()).unwrap_or_else(|| Ok(String::new()));
            }
        }
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequenced_replies_pop_then_repeat() {
        let mock = MockExec::new();
        mock.stub_seq(
            "tool",
            vec![
                MockReply::Exit(1, "first".into()),
                MockReply::Ok("second".into()),
            ],
        );
        let ctx = RecordingContext::new("MAINT");
        let spec = CommandSpec::argv(["tool"]);
        assert!(mock.execute(&ctx, &spec).is_err());
        assert_eq!(mock.execute(&ctx, &spec).unwrap(), "second");
        assert_eq!(mock.execute(&ctx, &spec).unwrap(), "second");
        assert_eq!(mock.calls().len(), 3);
    }

    #[test]
    fn unmatched_commands_exit_clean() {
        let mock = MockExec::new();
        let ctx = RecordingContext::new("MAINT");
        let spec = CommandSpec::argv(["something", "else"]);
        assert_eq!(mock.execute(&ctx, &spec).unwrap(), "");
    }
}
