//! Incremental terminal rendering of a streamed turn.

use std::io::{self, Write};

use chat_core::{Message, Role};
use crossterm::style::Stylize;

/// Prints the messages of one turn as they grow.
///
/// The reducer replaces the tail message on every delta, so the printer keeps
/// what it already wrote per message and only emits the new suffix.
#[derive(Debug)]
pub struct TurnPrinter {
    start: usize,
    styled: bool,
    printed: Vec<String>,
}

impl TurnPrinter {
    /// Track messages from index `start` onward.
    #[must_use]
    pub const fn new(start: usize, styled: bool) -> Self {
        Self {
            start,
            styled,
            printed: Vec::new(),
        }
    }

    /// Write whatever changed since the last call.
    pub fn render<W: Write>(&mut self, messages: &[Message], out: &mut W) -> io::Result<()> {
        let styled = self.styled;
        let turn = messages.get(self.start..).unwrap_or(&[]);

        for (offset, message) in turn.iter().enumerate() {
            if offset == self.printed.len() {
                if offset > 0 {
                    writeln!(out)?;
                }
                self.printed.push(String::new());
            }

            let Some(already) = self.printed.get_mut(offset) else {
                continue;
            };

            let fresh = match message.content.strip_prefix(already.as_str()) {
                Some(suffix) => suffix,
                None => {
                    // Content was rewritten rather than extended.
                    writeln!(out)?;
                    already.clear();
                    &message.content
                }
            };

            if !fresh.is_empty() {
                write_text(out, styled, message.role, fresh)?;
                already.push_str(fresh);
            }
        }

        out.flush()
    }

    /// Close the turn: tools used, reasoning, and a trailing newline.
    pub fn finish<W: Write>(&mut self, messages: &[Message], out: &mut W) -> io::Result<()> {
        self.render(messages, out)?;

        let turn = messages.get(self.start..).unwrap_or(&[]);

        let tools: Vec<&str> = turn
            .iter()
            .filter(|m| m.role == Role::Agent)
            .flat_map(|m| m.tool_calls.iter().flatten())
            .filter_map(|call| call.name())
            .collect();

        if !tools.is_empty() {
            writeln!(out)?;
            write_note(out, self.styled, &format!("tools: {}", tools.join(", ")))?;
        }

        let thinking = turn
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .and_then(|m| m.reasoning.as_ref());

        if let Some(reasoning) = thinking {
            writeln!(out)?;
            write_note(out, self.styled, &format!("thinking: {}", reasoning.thinking.trim()))?;
        }

        if !self.printed.is_empty() {
            writeln!(out)?;
        }

        out.flush()
    }
}

fn write_text<W: Write>(out: &mut W, styled: bool, role: Role, text: &str) -> io::Result<()> {
    if styled && role == Role::Agent {
        write!(out, "{}", text.dim())
    } else {
        write!(out, "{text}")
    }
}

fn write_note<W: Write>(out: &mut W, styled: bool, text: &str) -> io::Result<()> {
    if styled {
        write!(out, "{}", text.dark_grey().italic())
    } else {
        write!(out, "[{text}]")
    }
}
