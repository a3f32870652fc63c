use anyhow::Result;
use chatrelay::conversation::{AssistantState, Conversation};
use chatrelay::models::role::Role;
use chatrelay::models::ui::{ToolOutcome, UiMessage};
use console::{style, Term};
use rustyline::error::ReadlineError;
use std::io::{self, Write};

use crate::session::{ChatSession, Submission};

const PROMPT: &str = "\x1b[1m\x1b[38;5;30m> \x1b[0m";

pub enum Input {
    Message(String),
    AskAgain,
    Exit,
}

/// Tracks how much of the streaming assistant message is already on screen
#[derive(Debug, Default)]
struct ReplyPrinter {
    printed: usize,
}

impl ReplyPrinter {
    /// The not yet printed tail of the open assistant message
    fn next_chunk<'a>(&mut self, conversation: &'a Conversation) -> Option<&'a str> {
        let AssistantState::OpenAssistantMessage { accumulator } = conversation.state() else {
            return None;
        };
        let chunk = accumulator.get(self.printed..)?;
        self.printed = accumulator.len();
        if chunk.is_empty() {
            None
        } else {
            Some(chunk)
        }
    }
}

/// A dim status line shown until the reply text starts
struct BusyLine {
    term: Term,
    shown: bool,
}

impl BusyLine {
    fn show(message: &str) -> Self {
        let term = Term::stdout();
        let mut line = Self { term, shown: false };
        line.update(message);
        line
    }

    fn update(&mut self, message: &str) {
        if !self.term.is_term() {
            return;
        }
        let _ = self.term.clear_line();
        let _ = self.term.write_str(&style(message).dim().to_string());
        self.shown = true;
    }

    fn clear(&mut self) {
        if self.shown {
            let _ = self.term.clear_line();
            self.shown = false;
        }
    }
}

/// The tool still running in the open reply, if any
fn pending_tool(conversation: &Conversation) -> Option<&str> {
    if !conversation.is_streaming() {
        return None;
    }
    conversation
        .last()?
        .tools
        .iter()
        .rev()
        .find(|t| t.outcome == ToolOutcome::Pending)
        .map(|t| t.tool_name.as_str())
}

/// One line per tool the assistant used for `message`
fn tool_lines(message: &UiMessage) -> Vec<String> {
    message
        .tools
        .iter()
        .map(|tool| {
            let outcome = match &tool.outcome {
                ToolOutcome::Pending => "(no result)".to_string(),
                ToolOutcome::Output(output) => output.to_string(),
                ToolOutcome::Error(error) => format!("error: {}", error),
            };
            format!("{} {} -> {}", tool.tool_name, tool.input, outcome)
        })
        .collect()
}

/// The terminal chat page: an input line above a growing transcript
pub struct ChatPage {
    session: ChatSession,
}

impl ChatPage {
    pub fn new(session: ChatSession) -> Self {
        Self { session }
    }

    pub async fn run(&self) -> Result<()> {
        println!(
            "chatrelay {}",
            style("- type \"exit\" to end the session").dim()
        );
        println!();

        let mut editor = rustyline::DefaultEditor::new()?;
        loop {
            match read_input(&mut editor) {
                Input::Message(text) => {
                    let _ = editor.add_history_entry(text.as_str());
                    self.send(&text).await;
                }
                Input::AskAgain => continue,
                Input::Exit => break,
            }
        }
        Ok(())
    }

    /// Send one message and stream its reply to stdout
    pub async fn send(&self, text: &str) {
        let mut printer = ReplyPrinter::default();
        let mut busy = BusyLine::show("Assistant is thinking...");
        let mut started = false;

        let result = self
            .session
            .submit(text, |conversation| {
                if let Some(chunk) = printer.next_chunk(conversation) {
                    if !started {
                        started = true;
                        busy.clear();
                        print!("{} ", style("assistant:").cyan().bold());
                    }
                    print!("{}", chunk);
                    let _ = io::stdout().flush();
                } else if !started {
                    if let Some(tool) = pending_tool(conversation) {
                        busy.update(&format!("Using {}...", tool));
                    }
                }
            })
            .await;
        busy.clear();

        match result {
            Submission::Completed(outcome) => {
                if outcome.deltas == 0 {
                    println!("{}", style("(no reply)").dim());
                } else {
                    println!();
                }
                if outcome.skipped_frames > 0 {
                    tracing::debug!(skipped = outcome.skipped_frames, "reply had malformed frames");
                }
                self.print_tools().await;
            }
            Submission::Failed(error) => {
                if started {
                    println!();
                }
                println!("{} {}", style("Error:").red().bold(), error);
            }
            Submission::Ignored => {}
        }
        println!();
    }

    async fn print_tools(&self) {
        let conversation = self.session.conversation().await;
        let Some(reply) = conversation.last().filter(|m| m.role == Role::Assistant) else {
            return;
        };
        let lines = tool_lines(reply);
        if lines.is_empty() {
            return;
        }
        println!("{}", style("Tools used:").dim().bold());
        for line in lines {
            println!("  {}", style(line).dim());
        }
    }
}

fn read_input(editor: &mut rustyline::DefaultEditor) -> Input {
    let line = match editor.readline(PROMPT) {
        Ok(line) => line,
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => return Input::Exit,
        Err(e) => {
            eprintln!("Input error: {}", e);
            return Input::Exit;
        }
    };

    let text = line.trim();
    if text.is_empty() {
        Input::AskAgain
    } else if text.eq_ignore_ascii_case("exit") || text.eq_ignore_ascii_case("quit") {
        Input::Exit
    } else {
        Input::Message(text.to_string())
    }
}
