//! Aggregation of streamed deltas into conversation messages.
//!
//! [`TurnState`] holds the accumulators for a single turn. Every delta is fed
//! through [`TurnState::apply`], which returns the agent and/or assistant
//! message that should now sit at the tail of the conversation, and
//! [`commit`] writes that emission into the message list by replacing the
//! in-flight tail entry of the same role. A run of small deltas therefore
//! grows one message instead of appending many.
//!
//! The state machine has two phases. While deltas carry `tool_calls` the turn
//! is in a tool-call sequence and any text that rides along is tool narration
//! (an `agent` message). The first content delta without tool calls ends the
//! sequence; from then on text goes to the final `assistant` answer.

use crate::chunk::Delta;
use crate::types::{Message, Role, ToolCall};

/// Accumulators for one streamed turn.
#[derive(Debug, Clone, Default)]
pub struct TurnState {
    content: String,
    reasoning: String,
    tool_message: String,
    tool_calls: Vec<ToolCall>,
    in_tool_call_sequence: bool,
}

/// Messages produced by a single delta.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Emission {
    pub agent: Option<Message>,
    pub assistant: Option<Message>,
}

impl Emission {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.agent.is_none() && self.assistant.is_none()
    }
}

impl TurnState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Final-answer text accumulated so far.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Reasoning text accumulated so far.
    #[must_use]
    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    /// Tool narration accumulated in the current tool-call sequence.
    #[must_use]
    pub fn tool_message(&self) -> &str {
        &self.tool_message
    }

    /// Tool calls seen in the current tool-call sequence, first copy per id.
    #[must_use]
    pub fn tool_calls(&self) -> &[ToolCall] {
        &self.tool_calls
    }

    #[must_use]
    pub const fn in_tool_call_sequence(&self) -> bool {
        self.in_tool_call_sequence
    }

    /// Fold one delta into the accumulators.
    pub fn apply(&mut self, delta: &Delta) -> Emission {
        let mut emission = Emission::default();

        if let Some(calls) = &delta.tool_calls {
            self.in_tool_call_sequence = true;
            self.merge_tool_calls(calls);

            if let Some(content) = &delta.content {
                join_tool_text(&mut self.tool_message, content);
                emission.agent = Some(Message::agent(
                    self.tool_message.clone(),
                    self.tool_calls.clone(),
                ));
            }
        }

        if let Some(content) = &delta.content {
            if delta.tool_calls.is_none() && self.in_tool_call_sequence {
                // Text without tool calls: the final answer has started.
                self.in_tool_call_sequence = false;
                self.tool_message.clear();
                self.tool_calls.clear();
            }

            if emission.agent.is_none() {
                self.content.push_str(content);
            }

            if let Some(reasoning) = &delta.reasoning {
                self.reasoning.push_str(reasoning);
            }

            if emission.agent.is_none() || !self.in_tool_call_sequence {
                emission.assistant = Some(Message::assistant(self.content.clone(), &self.reasoning));
            }
        }

        let ends_turn = delta
            .finish_reason
            .as_ref()
            .is_some_and(|reason| reason.is_end_of_turn());

        if ends_turn
            && self.in_tool_call_sequence
            && emission.assistant.is_none()
            && self.content.trim().is_empty()
        {
            emission.assistant = Some(Message::assistant(String::new(), &self.reasoning));
        }

        emission
    }

    // First write wins: a repeated id never replaces or extends the stored call.
    fn merge_tool_calls(&mut self, calls: &[ToolCall]) {
        for call in calls {
            if !self.tool_calls.iter().any(|existing| existing.id == call.id) {
                self.tool_calls.push(call.clone());
            }
        }
    }
}

/// Append a narration fragment, separating it from what came before.
///
/// A sentence-ending buffer gets a newline, anything else a single space. No
/// separator when either side already supplies a newline or the fragment is
/// blank.
fn join_tool_text(buffer: &mut String, fragment: &str) {
    let needs_separator = !buffer.is_empty()
        && !fragment.trim().is_empty()
        && !buffer.ends_with('\n')
        && !fragment.starts_with('\n');

    if needs_separator {
        if buffer.trim().ends_with(['.', '!', '?']) {
            buffer.push('\n');
        } else {
            buffer.push(' ');
        }
    }

    buffer.push_str(fragment);
}

/// Apply an emission to the published message list.
///
/// Each emitted message replaces the tail entry when the tail has the same
/// role, otherwise it is appended. When the tail is the in-flight agent entry
/// and the emission carries both messages, the agent entry is replaced and the
/// assistant entry is appended after it, so a tool-only turn still ends with
/// an answer slot. Returns `true` if the list changed.
pub fn commit(messages: &mut Vec<Message>, emission: Emission) -> bool {
    if emission.is_empty() {
        return false;
    }

    let Emission { agent, assistant } = emission;
    let tail_role = messages.last().map(|m| m.role);

    match (tail_role, agent, assistant) {
        (Some(Role::Agent), Some(agent), assistant) => {
            replace_tail(messages, agent);
            messages.extend(assistant);
        }
        (Some(Role::Assistant), None, Some(assistant)) => {
            replace_tail(messages, assistant);
        }
        (_, agent, assistant) => {
            messages.extend(agent);
            messages.extend(assistant);
        }
    }

    true
}

fn replace_tail(messages: &mut [Message], message: Message) {
    if let Some(last) = messages.last_mut() {
        *last = message;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replay(deltas: &[Delta]) -> Vec<Message> {
        let mut state = TurnState::new();
        let mut messages = vec![Message::user("question")];
        for delta in deltas {
            let emission = state.apply(delta);
            commit(&mut messages, emission);
        }
        messages
    }

    fn roles(messages: &[Message]) -> Vec<Role> {
        messages.iter().map(|m| m.role).collect()
    }

    #[test]
    fn content_deltas_concatenate_into_one_answer() {
        let messages = replay(&[
            Delta::content("Hel"),
            Delta::content("lo"),
            Delta::finish("stop"),
        ]);

        assert_eq!(roles(&messages), vec![Role::User, Role::Assistant]);
        assert_eq!(messages[1].content, "Hello");
        assert!(messages[1].reasoning.is_none());
    }

    #[test]
    fn concatenation_preserves_arrival_order() {
        let parts = ["The ", "quick ", "brown ", "fox", ".", " ", "Done!"];
        let deltas: Vec<Delta> = parts.iter().map(|p| Delta::content(*p)).collect();
        let messages = replay(&deltas);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, parts.concat());
    }

    #[test]
    fn tool_only_turn_closes_with_empty_assistant_slot() {
        let call = ToolCall::with_id("1");
        let messages = replay(&[
            Delta::tool_calls(vec![call.clone()]).with_content("Running tool..."),
            Delta::tool_calls(vec![call.clone()]),
            Delta::finish("stop").with_content(""),
        ]);

        assert_eq!(roles(&messages), vec![Role::User, Role::Agent, Role::Assistant]);
        assert_eq!(messages[1].content, "Running tool...");
        assert!(messages[1].is_tool_message);
        assert_eq!(messages[1].tool_calls.as_deref(), Some(&[call][..]));
        assert_eq!(messages[2].content, "");
    }

    #[test]
    fn untagged_text_between_tool_calls_becomes_the_answer() {
        let call = ToolCall::with_id("1");
        let messages = replay(&[
            Delta::tool_calls(vec![call.clone()]),
            Delta::content("Running tool..."),
            Delta::tool_calls(vec![call]),
            Delta::finish("stop").with_content(""),
        ]);

        assert_eq!(roles(&messages), vec![Role::User, Role::Assistant]);
        assert_eq!(messages[1].content, "Running tool...");
        assert!(messages[1].tool_calls.is_none());
    }

    #[test]
    fn agent_tail_and_answer_slot_in_one_delta() {
        let call = ToolCall::with_id("1");
        let mut messages = replay(&[Delta::tool_calls(vec![call.clone()]).with_content("Working")]);

        let mut state = TurnState::new();
        state.apply(&Delta::tool_calls(vec![call.clone()]).with_content("Working"));
        let emission = state.apply(&Delta {
            finish_reason: Some(crate::chunk::FinishReason::Stop),
            ..Delta::tool_calls(vec![call]).with_content("done")
        });
        assert!(emission.agent.is_some() && emission.assistant.is_some());

        assert!(commit(&mut messages, emission));
        assert_eq!(roles(&messages), vec![Role::User, Role::Agent, Role::Assistant]);
        assert_eq!(messages[1].content, "Working done");
        assert_eq!(messages[2].content, "");
    }

    #[test]
    fn content_without_tool_calls_ends_tool_sequence() {
        let mut state = TurnState::new();
        state.apply(&Delta::tool_calls(vec![ToolCall::with_id("1")]));
        assert!(state.in_tool_call_sequence());

        let emission = state.apply(&Delta::content("Running tool..."));
        assert!(!state.in_tool_call_sequence());
        assert!(state.tool_calls().is_empty());
        assert_eq!(state.content(), "Running tool...");
        assert!(emission.agent.is_none());
        assert_eq!(emission.assistant.unwrap().content, "Running tool...");
    }

    #[test]
    fn tool_narration_then_final_answer() {
        let messages = replay(&[
            Delta::tool_calls(vec![ToolCall::with_id("a")]).with_content("Checking schema."),
            Delta::tool_calls(vec![ToolCall::with_id("b")]).with_content("Running query"),
            Delta::tool_calls(vec![ToolCall::with_id("b")]).with_content("now"),
            Delta::content("There are "),
            Delta::content("3 tables."),
            Delta::finish("end_turn"),
        ]);

        assert_eq!(roles(&messages), vec![Role::User, Role::Agent, Role::Assistant]);
        assert_eq!(messages[1].content, "Checking schema.\nRunning query now");
        let ids: Vec<&str> = messages[1]
            .tool_calls
            .as_deref()
            .unwrap()
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(messages[2].content, "There are 3 tables.");
    }

    #[test]
    fn duplicate_tool_call_ids_keep_first_copy() {
        let first = ToolCall {
            id: "1".to_string(),
            call_type: Some("function".to_string()),
            function: Some(crate::types::FunctionCall {
                name: Some("code_exec_python".to_string()),
                arguments: Some(serde_json::Value::from("{\"co")),
            }),
        };
        let mut second = first.clone();
        second.function.as_mut().unwrap().arguments = Some(serde_json::Value::from("de\":1}"));

        let mut state = TurnState::new();
        state.apply(&Delta::tool_calls(vec![first.clone()]));
        state.apply(&Delta::tool_calls(vec![second]));

        assert_eq!(state.tool_calls(), &[first]);
    }

    #[test]
    fn reasoning_attaches_to_assistant() {
        let messages = replay(&[
            Delta::content("A").with_reasoning("think "),
            Delta::content("B").with_reasoning("more"),
        ]);

        assert_eq!(messages[1].content, "AB");
        assert_eq!(messages[1].reasoning.as_ref().unwrap().thinking, "think more");
    }

    #[test]
    fn reasoning_without_content_is_not_accumulated() {
        let mut state = TurnState::new();
        let emission = state.apply(&Delta::default().with_reasoning("silent"));
        assert!(emission.is_empty());
        assert_eq!(state.reasoning(), "");
    }

    #[test]
    fn completion_after_tools_carries_reasoning() {
        let mut state = TurnState::new();
        state.apply(&Delta::tool_calls(vec![ToolCall::with_id("1")]));
        // Reasoning rides along with tool narration, so it is accumulated.
        state.apply(
            &Delta::tool_calls(vec![ToolCall::with_id("1")])
                .with_content("working")
                .with_reasoning("plan"),
        );
        let emission = state.apply(&Delta::finish("stop"));

        let assistant = emission.assistant.unwrap();
        assert_eq!(assistant.content, "");
        assert_eq!(assistant.reasoning.unwrap().thinking, "plan");
    }

    #[test]
    fn non_terminal_finish_reason_does_not_synthesize() {
        let mut state = TurnState::new();
        state.apply(&Delta::tool_calls(vec![ToolCall::with_id("1")]));
        let emission = state.apply(&Delta::finish("tool_calls"));
        assert!(emission.is_empty());
    }

    #[test]
    fn finish_in_same_delta_as_tool_narration_appends_assistant_after_agent() {
        let messages = replay(&[
            Delta::tool_calls(vec![ToolCall::with_id("1")]).with_content("step one"),
            Delta::tool_calls(vec![ToolCall::with_id("1")])
                .with_content("step two")
                .with_finish("stop"),
        ]);

        assert_eq!(roles(&messages), vec![Role::User, Role::Agent, Role::Assistant]);
        assert_eq!(messages[1].content, "step one step two");
        assert_eq!(messages[2].content, "");
    }

    #[test]
    fn join_inserts_newline_after_sentence() {
        let mut buffer = String::from("Done!");
        join_tool_text(&mut buffer, "Next");
        assert_eq!(buffer, "Done!\nNext");
    }

    #[test]
    fn join_inserts_space_mid_sentence() {
        let mut buffer = String::from("Running");
        join_tool_text(&mut buffer, "query");
        assert_eq!(buffer, "Running query");
    }

    #[test]
    fn join_skips_separator_around_newlines_and_blanks() {
        let mut buffer = String::from("line\n");
        join_tool_text(&mut buffer, "next");
        assert_eq!(buffer, "line\nnext");

        let mut buffer = String::from("line");
        join_tool_text(&mut buffer, "\nnext");
        assert_eq!(buffer, "line\nnext");

        let mut buffer = String::from("line");
        join_tool_text(&mut buffer, "  ");
        assert_eq!(buffer, "line  ");

        let mut buffer = String::new();
        join_tool_text(&mut buffer, "first");
        assert_eq!(buffer, "first");
    }

    #[test]
    fn commit_replaces_tail_of_same_role() {
        let mut messages = vec![Message::user("q"), Message::assistant("He", "")];
        let changed = commit(
            &mut messages,
            Emission {
                agent: None,
                assistant: Some(Message::assistant("Hello", "")),
            },
        );

        assert!(changed);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "Hello");
    }

    #[test]
    fn commit_appends_when_tail_role_differs() {
        let mut messages = vec![Message::user("q"), Message::agent("tool", Vec::new())];
        commit(
            &mut messages,
            Emission {
                agent: None,
                assistant: Some(Message::assistant("answer", "")),
            },
        );
        assert_eq!(roles(&messages), vec![Role::User, Role::Agent, Role::Assistant]);
    }

    #[test]
    fn commit_of_empty_emission_is_noop() {
        let mut messages = vec![Message::user("q")];
        assert!(!commit(&mut messages, Emission::default()));
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn finalized_entries_before_the_tail_are_untouched() {
        let earlier = Message::assistant("previous answer", "");
        let mut messages = vec![Message::user("q1"), earlier.clone(), Message::user("q2")];
        let mut state = TurnState::new();
        for delta in [Delta::content("new"), Delta::content(" answer")] {
            let emission = state.apply(&delta);
            commit(&mut messages, emission);
        }

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1], earlier);
        assert_eq!(messages[3].content, "new answer");
    }
}
