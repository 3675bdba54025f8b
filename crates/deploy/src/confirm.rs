//! Operator approval of executor registry changes.

use std::io::{BufRead, Write};

use crate::registry::ExecutorEntry;

/// A proposed `setExecutors` batch awaiting approval.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorProposal<'a> {
    pub network: &'a str,
    pub executors: &'a [ExecutorEntry],
    /// Declared executors that are already registered and left out of the batch.
    pub already_set: &'a [ExecutorEntry],
}

impl std::fmt::Display for ExecutorProposal<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "The following executors will be set on {} ({} already set):",
            self.network,
            self.already_set.len()
        )?;
        for executor in self.executors {
            writeln!(f, "  {}: {}", executor.name, executor.address)?;
        }
        Ok(())
    }
}

/// Asks the operator whether a proposal may be submitted.
pub trait Confirm {
    /// `Ok(true)` only for an explicit approval.
    fn confirm(&mut self, proposal: &ExecutorProposal<'_>) -> anyhow::Result<bool>;
}

fn is_affirmative(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("yes")
}

/// Prints the proposal and reads the answer from a line-oriented reader.
pub struct Prompt<R, W> {
    input: R,
    output: W,
}

impl Prompt<std::io::StdinLock<'static>, std::io::Stdout> {
    /// Prompt on the controlling terminal.
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> Prompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> Confirm for Prompt<R, W> {
    fn confirm(&mut self, proposal: &ExecutorProposal<'_>) -> anyhow::Result<bool> {
        write!(
            self.output,
            "{proposal}Do you want to proceed with setting these executors? (yes/no): "
        )?;
        self.output.flush()?;

        // Anything that is not a readable "yes" declines.
        let mut answer = Vec::new();
        if let Err(e) = self.input.read_until(b'\n', &mut answer) {
            tracing::warn!(error = %e, "Failed to read confirmation, treating it as a refusal");
            return Ok(false);
        }
        Ok(is_affirmative(&String::from_utf8_lossy(&answer)))
    }
}

/// Approves every proposal without asking.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApprove;

impl Confirm for AutoApprove {
    fn confirm(&mut self, proposal: &ExecutorProposal<'_>) -> anyhow::Result<bool> {
        tracing::info!(
            network = proposal.network,
            count = proposal.executors.len(),
            "Auto-approving executor batch"
        );
        Ok(true)
    }
}
