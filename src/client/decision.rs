//! Operator decisions.
//!
//! Business logic asks a `DecisionProvider`; the CLI wires an interactive
//! prompt, `--yes` and tests wire a fixed answer.

use crate::models::{GiftdropError, Result};
use std::io::{self, BufRead, Write};
use std::sync::Mutex;
use tracing::info;

/// Answers yes/no questions.
pub trait DecisionProvider: Send + Sync {
    fn confirm(&self, question: &str) -> Result<bool>;
}

/// Asks on the terminal, defaulting to no.
#[derive(Debug, Default)]
pub struct InteractivePrompt;

impl DecisionProvider for InteractivePrompt {
    fn confirm(&self, question: &str) -> Result<bool> {
        let mut stdout = io::stdout();
        write!(stdout, "{question} [y/N] ").map_err(|e| GiftdropError::io("writing prompt", e))?;
        stdout
            .flush()
            .map_err(|e| GiftdropError::io("writing prompt", e))?;

        let mut input = String::new();
        io::stdin()
            .lock()
            .read_line(&mut input)
            .map_err(|e| GiftdropError::io("reading answer", e))?;

        Ok(matches!(
            input.trim().to_lowercase().as_str(),
            "y" | "yes"
        ))
    }
}

/// Gives the same answer to every question and remembers what was asked.
#[derive(Debug, Default)]
pub struct FixedDecision {
    answer: bool,
    asked: Mutex<Vec<String>>,
}

impl FixedDecision {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Questions asked so far.
    pub fn asked(&self) -> Vec<String> {
        self.asked
            .lock()
            .map(|asked| asked.clone())
            .unwrap_or_default()
    }
}

impl DecisionProvider for FixedDecision {
    fn confirm(&self, question: &str) -> Result<bool> {
        info!(question, answer = self.answer, "Answered without prompting");
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(question.to_string());
        }
        Ok(self.answer)
    }
}
