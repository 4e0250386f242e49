use std::sync::Mutex;

use anyhow::Result;
use rsansible::executor::{CommandExecutor, CommandSpec, ExecutionResult, OutputSink};

/// Records executed command specs in order, optionally failing specific
/// calls with a non-zero exit code and feeding scripted stdout lines to
/// the output sink.
#[allow(dead_code)]
pub struct MockExecutor {
    specs: Mutex<Vec<CommandSpec>>,
    /// If set, the Nth call (0-indexed) exits with code 2.
    fail_on_call: Option<usize>,
    stdout_lines: Vec<String>,
}

#[allow(dead_code)]
impl MockExecutor {
    pub fn new() -> Self {
        Self {
            specs: Mutex::new(Vec::new()),
            fail_on_call: None,
            stdout_lines: Vec::new(),
        }
    }

    pub fn failing_on(call_index: usize) -> Self {
        Self {
            specs: Mutex::new(Vec::new()),
            fail_on_call: Some(call_index),
            stdout_lines: Vec::new(),
        }
    }

    pub fn with_stdout(lines: Vec<String>) -> Self {
        Self {
            specs: Mutex::new(Vec::new()),
            fail_on_call: None,
            stdout_lines: lines,
        }
    }

    pub fn call_count(&self) -> usize {
        self.specs.lock().unwrap().len()
    }

    pub fn specs(&self) -> Vec<CommandSpec> {
        self.specs.lock().unwrap().clone()
    }

    /// Returns the recorded invocations as `[command, args...]` vectors.
    pub fn argv(&self) -> Vec<Vec<String>> {
        self.specs
            .lock()
            .unwrap()
            .iter()
            .map(|spec| {
                let mut argv = vec![spec.command.clone()];
                argv.extend(spec.args.iter().cloned());
                argv
            })
            .collect()
    }
}

impl CommandExecutor for MockExecutor {
    fn execute(&self, spec: &CommandSpec, output: &mut dyn OutputSink) -> Result<ExecutionResult> {
        let mut specs = self.specs.lock().unwrap();
        let index = specs.len();
        specs.push(spec.clone());
        drop(specs);

        for line in &self.stdout_lines {
            output.stdout_line(line);
        }

        if self.fail_on_call == Some(index) {
            return Ok(ExecutionResult { code: Some(2) });
        }
        Ok(ExecutionResult { code: Some(0) })
    }
}
