use std::cell::RefCell;
use std::collections::VecDeque;

use kerbauth_core::{CommandOutcome, CommandRunner, Invocation};

/// Records every invocation and answers with scripted exit codes, in order.
///
/// Once the script runs out every command succeeds.
#[derive(Default)]
pub struct RecordingRunner {
    script: RefCell<VecDeque<std::io::Result<CommandOutcome>>>,
    calls: RefCell<Vec<Invocation>>,
}

#[allow(dead_code)]
impl RecordingRunner {
    pub fn with_exit_codes(codes: &[i32]) -> Self {
        let runner = Self::default();
        for &code in codes {
            runner.push(Ok(CommandOutcome::from_code(code)));
        }
        runner
    }

    pub fn push(&self, outcome: std::io::Result<CommandOutcome>) {
        self.script.borrow_mut().push_back(outcome);
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.borrow().clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .map(|call| call.program().to_owned())
            .collect()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, command: &Invocation) -> std::io::Result<CommandOutcome> {
        self.calls.borrow_mut().push(command.clone());
        self.script
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Ok(CommandOutcome::from_code(0)))
    }
}
