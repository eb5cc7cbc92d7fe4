//! Pure merge of one stream event into a message record.
//!
//! The fold is total: events that do not apply to the record (unknown
//! tool call ids, results for calls the message never announced) are
//! absorbed with a warning rather than failing, since a broken
//! transcript is worse than a slightly incomplete one.

use fathom_types::events::StreamEvent;
use fathom_types::message::{Message, ToolCall};
use tracing::warn;

/// Folds `event` into `message`.
///
/// Content fragments append to the running buffer, tool-call argument
/// fragments accumulate per call id, results attach to their call, and
/// a terminal event clears the streaming flag. The update is atomic
/// with respect to the event: callers never observe a half-merged
/// record. Finalized content is immutable: deltas arriving after the
/// terminal event are dropped.
pub fn apply(message: &mut Message, event: &StreamEvent) {
    if message.is_final()
        && matches!(
            event,
            StreamEvent::ContentDelta { .. } | StreamEvent::ToolCallDelta { .. }
        )
    {
        warn!(id = %message.id, "delta for finalized message, dropping");
        return;
    }
    match event {
        StreamEvent::ContentDelta { delta, agent, .. } => {
            if message.agent.is_none() {
                message.agent = *agent;
            }
            if !delta.is_empty() {
                message.content.push_str(delta);
                message.content_chunks.push(delta.clone());
            }
        }
        StreamEvent::ToolCallDelta {
            call_id,
            name,
            args_delta,
            ..
        } => {
            merge_tool_call_delta(message, call_id, name.as_deref(), args_delta);
        }
        StreamEvent::ToolCallResult {
            call_id, result, ..
        } => {
            merge_tool_call_result(message, call_id, result);
        }
        StreamEvent::StreamEnd {
            finish_reason,
            options,
            agent,
            ..
        } => {
            if message.agent.is_none() {
                message.agent = *agent;
            }
            message.finish_reason = Some(*finish_reason);
            if let Some(options) = options {
                message.options = Some(options.clone());
            }
            message.is_streaming = false;
        }
    }
}

fn merge_tool_call_delta(
    message: &mut Message,
    call_id: &str,
    name: Option<&str>,
    args_delta: &str,
) {
    let calls = message.tool_calls.get_or_insert_with(Vec::new);

    let call = match calls.iter_mut().find(|call| call.id == call_id) {
        Some(call) => call,
        None => {
            let Some(name) = name else {
                warn!(call_id, "argument fragment for unannounced tool call, dropping");
                return;
            };
            calls.push(ToolCall::new(call_id, name));
            calls.last_mut().expect("just pushed")
        }
    };

    if !args_delta.is_empty() {
        call.args_chunks.push(args_delta.to_string());
    }

    // Re-parse whenever the accumulated fragments form a complete value;
    // partial JSON keeps the previous parse.
    let joined = call.args_chunks.concat();
    if let Ok(value) = serde_json::from_str(&joined) {
        call.args = value;
    }
}

fn merge_tool_call_result(message: &mut Message, call_id: &str, result: &str) {
    let found = message
        .tool_calls
        .as_mut()
        .and_then(|calls| calls.iter_mut().find(|call| call.id == call_id));
    match found {
        Some(call) => call.result = Some(result.to_string()),
        None => {
            warn!(
                message_id = %message.id,
                call_id,
                "tool result for unknown call, dropping"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use fathom_types::message::{Agent, FinishReason, MessageOption, Role};
    use serde_json::json;

    use super::*;

    fn content_delta(id: &str, delta: &str) -> StreamEvent {
        StreamEvent::ContentDelta {
            id: id.to_string(),
            thread_id: "t1".to_string(),
            agent: Some(Agent::Researcher),
            role: Role::Assistant,
            delta: delta.to_string(),
        }
    }

    #[test]
    fn content_concatenates_in_order() {
        let mut message = Message::streaming("m1", "t1", Role::Assistant, None);
        for chunk in ["Hel", "lo", ", ", "world"] {
            apply(&mut message, &content_delta("m1", chunk));
        }
        assert_eq!(message.content, "Hello, world");
        assert_eq!(message.content_chunks.len(), 4);
        assert_eq!(message.content, message.content_chunks.concat());
        assert!(message.is_streaming);
    }

    #[test]
    fn empty_delta_adds_no_chunk() {
        let mut message = Message::streaming("m1", "t1", Role::Assistant, None);
        apply(&mut message, &content_delta("m1", ""));
        assert!(message.content_chunks.is_empty());
    }

    #[test]
    fn tool_call_args_accumulate_and_parse() {
        let mut message = Message::streaming("m1", "t1", Role::Assistant, None);
        let fragments = [r#"{"que"#, r#"ry": "rust"#, r#""}"#];
        for (i, fragment) in fragments.iter().enumerate() {
            apply(
                &mut message,
                &StreamEvent::ToolCallDelta {
                    id: "m1".to_string(),
                    thread_id: "t1".to_string(),
                    agent: None,
                    role: Role::Assistant,
                    call_id: "call-1".to_string(),
                    name: (i == 0).then(|| "web_search".to_string()),
                    args_delta: (*fragment).to_string(),
                },
            );
        }
        let call = message.tool_call("call-1").unwrap();
        assert_eq!(call.name, "web_search");
        assert_eq!(call.args_chunks.len(), 3);
        assert_eq!(call.args, json!({"query": "rust"}));
    }

    #[test]
    fn tool_result_attaches_to_matching_call() {
        let mut message = Message::streaming("m1", "t1", Role::Assistant, None);
        apply(
            &mut message,
            &StreamEvent::ToolCallDelta {
                id: "m1".to_string(),
                thread_id: "t1".to_string(),
                agent: None,
                role: Role::Assistant,
                call_id: "call-1".to_string(),
                name: Some("web_search".to_string()),
                args_delta: "{}".to_string(),
            },
        );
        apply(
            &mut message,
            &StreamEvent::ToolCallResult {
                id: "m2".to_string(),
                thread_id: "t1".to_string(),
                call_id: "call-1".to_string(),
                result: "three results".to_string(),
            },
        );
        assert_eq!(
            message.tool_call("call-1").unwrap().result.as_deref(),
            Some("three results")
        );
    }

    #[test]
    fn result_for_unknown_call_is_absorbed() {
        let mut message = Message::streaming("m1", "t1", Role::Assistant, None);
        apply(
            &mut message,
            &StreamEvent::ToolCallResult {
                id: "m2".to_string(),
                thread_id: "t1".to_string(),
                call_id: "nope".to_string(),
                result: "ignored".to_string(),
            },
        );
        assert!(message.tool_calls.is_none());
    }

    #[test]
    fn deltas_after_finalize_are_dropped() {
        let mut message = Message::streaming("m1", "t1", Role::Assistant, None);
        apply(&mut message, &content_delta("m1", "Hello"));
        apply(
            &mut message,
            &StreamEvent::StreamEnd {
                id: "m1".to_string(),
                thread_id: "t1".to_string(),
                agent: None,
                role: Role::Assistant,
                finish_reason: FinishReason::Stop,
                options: None,
            },
        );

        apply(&mut message, &content_delta("m1", " late"));
        apply(
            &mut message,
            &StreamEvent::ToolCallDelta {
                id: "m1".to_string(),
                thread_id: "t1".to_string(),
                agent: None,
                role: Role::Assistant,
                call_id: "call-late".to_string(),
                name: Some("web_search".to_string()),
                args_delta: "{}".to_string(),
            },
        );

        assert_eq!(message.content, "Hello");
        assert_eq!(message.content_chunks.len(), 1);
        assert!(message.tool_calls.is_none());
        assert!(message.is_final());
    }

    #[test]
    fn stream_end_finalizes_and_sets_options() {
        let mut message = Message::streaming("m1", "t1", Role::Assistant, None);
        apply(
            &mut message,
            &StreamEvent::StreamEnd {
                id: "m1".to_string(),
                thread_id: "t1".to_string(),
                agent: Some(Agent::Planner),
                role: Role::Assistant,
                finish_reason: FinishReason::Interrupt,
                options: Some(vec![MessageOption {
                    text: "Start research".to_string(),
                    value: "accepted".to_string(),
                }]),
            },
        );
        assert!(message.is_final());
        assert_eq!(message.finish_reason, Some(FinishReason::Interrupt));
        assert_eq!(message.options.as_ref().unwrap().len(), 1);
        assert_eq!(message.agent, Some(Agent::Planner));
    }
}
