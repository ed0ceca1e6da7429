use enrich_core::Message;

/// Insert `context` as a system message after the leading system messages.
///
/// Existing messages keep their relative order; the only change is the one
/// inserted entry, placed before the first non-system message. A missing or
/// blank context returns the messages unchanged.
pub fn inject_context(messages: &[Message], context: Option<&str>) -> Vec<Message> {
    let Some(context) = context.filter(|c| !c.trim().is_empty()) else {
        return messages.to_vec();
    };

    let at = messages.iter().take_while(|m| m.is_system()).count();
    let mut out = Vec::with_capacity(messages.len() + 1);
    out.extend_from_slice(&messages[..at]);
    out.push(Message::system(context));
    out.extend_from_slice(&messages[at..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inserts_after_leading_system_messages() {
        let messages = vec![
            Message::system("sys1"),
            Message::system("sys2"),
            Message::user("user1")
        ];
        let out = inject_context(&messages, Some("ctx"));
        assert_eq!(
            out,
            vec![
                Message::system("sys1"),
                Message::system("sys2"),
                Message::system("ctx"),
                Message::user("user1")
            ]
        );
    }

    #[test]
    fn test_later_system_messages_stay_put() {
        let messages = vec![
            Message::user("hi"),
            Message::system("mid-conversation note"),
            Message::assistant("hello")
        ];
        let out = inject_context(&messages, Some("ctx"));
        assert_eq!(out[0], Message::system("ctx"));
        assert_eq!(&out[1..], &messages[..]);
    }

    #[test]
    fn test_missing_or_blank_context_is_a_no_op() {
        let messages = vec![Message::system("sys"), Message::user("q")];
        assert_eq!(inject_context(&messages, None), messages);
        assert_eq!(inject_context(&messages, Some("  \n")), messages);
    }

    #[test]
    fn test_all_system_and_empty_lists() {
        let only_system = vec![Message::system("a")];
        let out = inject_context(&only_system, Some("ctx"));
        assert_eq!(out, vec![Message::system("a"), Message::system("ctx")]);

        assert_eq!(inject_context(&[], Some("ctx")), vec![Message::system("ctx")]);
    }
}
