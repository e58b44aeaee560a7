//! Prompt rendering for the agent and the evaluator.

use std::fmt::Write;

use crate::domain::models::{ConversationTurn, EvaluationContext, Role, TraceEntry};

const AGENT_PREAMBLE: &str =
    "You are a helpful assistant. Answer the user based on the conversation so far:\n\n";

/// Render the full-context prompt sent to the agent on every turn.
///
/// Earlier turns become `User:`/`Assistant:` lines; the last turn (the
/// current user input) is repeated after them with a trailing cue.
pub fn render_agent_prompt(history: &[ConversationTurn]) -> String {
    let mut prompt = String::from(AGENT_PREAMBLE);

    let Some((current, earlier)) = history.split_last() else {
        return prompt;
    };

    for turn in earlier {
        let _ = writeln!(prompt, "{}: {}", speaker(turn.role), turn.content);
    }
    let _ = write!(prompt, "User: {}\nAssistant: ", current.content);
    prompt
}

/// Render the supervisor prompt for an evaluation context.
pub fn render_evaluation_prompt(context: &EvaluationContext) -> String {
    let mut prompt = format!(
        "You are an expert at judging whether an AI agent has finished its task. \
         Analyse the agent's execution below and decide whether the task is complete.\n\n\
         The task was: {}\n\nAgent execution trace:\n",
        context.instruction
    );

    for (i, entry) in context.trace.iter().enumerate() {
        let n = i + 1;
        match entry {
            TraceEntry::Content { text, .. } => {
                let _ = writeln!(prompt, "{n}. Output: {text}");
            }
            TraceEntry::ToolCall { name, args, result } => {
                let _ = writeln!(prompt, "{n}. Tool call: {name}");
                let _ = writeln!(prompt, "   Arguments: {args}");
                let _ = writeln!(prompt, "   Result: {result}");
            }
            TraceEntry::Error { message } => {
                let _ = writeln!(prompt, "{n}. Error: {message}");
            }
            TraceEntry::Usage { .. } => {}
        }
    }

    prompt.push_str("\nConversation history:\n");
    for (i, turn) in context.history.iter().enumerate() {
        let _ = writeln!(prompt, "{}. {}: {}", i + 1, turn.role, turn.content);
    }

    let _ = write!(
        prompt,
        "\nConsider carefully:\n\
         1. What did the user originally ask for?\n\
         2. Has the agent completed it?\n\
         3. Is anything still missing?\n\n\
         If the task is not complete, use the original task and the agent's replies to \
         direct its next steps. If the agent asked you about requirements, answer with a \
         concrete, detailed choice so it can keep going.\n\n\
         If the task is complete, reply with \"{}\".\nYour answer:",
        context.completion_marker
    );
    prompt
}

const fn speaker(role: Role) -> &'static str {
    match role {
        Role::User => "User",
        Role::Assistant => "Assistant",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TASK_COMPLETE_MARKER;

    #[test]
    fn test_agent_prompt_ends_with_current_turn() {
        let history = vec![
            ConversationTurn::user("write a todo app"),
            ConversationTurn::assistant("which language?"),
            ConversationTurn::user("python"),
        ];
        let prompt = render_agent_prompt(&history);
        assert!(prompt.starts_with(AGENT_PREAMBLE));
        assert!(prompt.contains("User: write a todo app\n"));
        assert!(prompt.contains("Assistant: which language?\n"));
        assert!(prompt.ends_with("User: python\nAssistant: "));
        assert_eq!(prompt.matches("python").count(), 1);
    }

    #[test]
    fn test_agent_prompt_empty_history() {
        assert_eq!(render_agent_prompt(&[]), AGENT_PREAMBLE);
    }

    #[test]
    fn test_evaluation_prompt_contains_every_part() {
        let context = EvaluationContext {
            instruction: "build a music player".to_string(),
            trace: vec![
                TraceEntry::content("created player.py"),
                TraceEntry::ToolCall {
                    name: "write_file".to_string(),
                    args: serde_json::json!({"path": "player.py"}),
                    result: serde_json::json!("ok"),
                },
                TraceEntry::Error {
                    message: "lint failed".to_string(),
                },
            ],
            history: vec![
                ConversationTurn::user("build a music player"),
                ConversationTurn::assistant("done"),
            ],
            completion_marker: TASK_COMPLETE_MARKER.to_string(),
        };

        let prompt = render_evaluation_prompt(&context);
        assert!(prompt.contains("The task was: build a music player"));
        assert!(prompt.contains("1. Output: created player.py"));
        assert!(prompt.contains("2. Tool call: write_file"));
        assert!(prompt.contains("3. Error: lint failed"));
        assert!(prompt.contains("2. assistant: done"));
        assert!(prompt.contains(TASK_COMPLETE_MARKER));
    }
}
