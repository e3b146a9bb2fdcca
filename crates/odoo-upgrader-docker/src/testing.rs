use std::{path::Path, sync::Mutex};

use crate::{Invocation, Output, Runner, UpgradeError};

type Respond = Box<dyn Fn(&str) -> Output + Send + Sync>;

/// Answers every invocation from a closure keyed on the rendered command
/// line and remembers what was asked.
pub struct ScriptedRunner {
    calls: Mutex<Vec<String>>,
    respond: Respond,
}

impl ScriptedRunner {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&str) -> Output + Send + Sync + 'static,
    {
        Self {
            calls: Mutex::new(vec![]),
            respond: Box::new(respond),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_matching(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.contains(needle))
            .count()
    }

    fn answer(&self, invocation: &Invocation) -> Output {
        let rendered = invocation.to_string();
        self.calls.lock().unwrap().push(rendered.clone());
        (self.respond)(&rendered)
    }
}

impl Runner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation) -> Result<Output, UpgradeError> {
        Ok(self.answer(invocation))
    }

    async fn stream<F>(&self, invocation: &Invocation, mut on_line: F) -> Result<Output, UpgradeError>
    where
        F: FnMut(&str) + Send,
    {
        let mut output = self.answer(invocation);
        for line in output.stdout.lines() {
            on_line(line);
        }
        output.stdout.clear();
        Ok(output)
    }

    async fn run_to_file(&self, invocation: &Invocation, dest: &Path) -> Result<Output, UpgradeError> {
        let mut output = self.answer(invocation);
        std::fs::write(dest, &output.stdout)?;
        output.stdout.clear();
        Ok(output)
    }
}

impl Output {
    pub fn ok(stdout: &str) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.to_owned(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: &str) -> Self {
        Self {
            code: Some(1),
            stdout: String::new(),
            stderr: stderr.to_owned(),
        }
    }
}
