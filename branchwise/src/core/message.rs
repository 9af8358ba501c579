//! Commit message selection.

/// Pick the message for a squashed commit: the explicit message if it is
/// non-empty, otherwise the first non-empty existing message, in the order
/// given (oldest first).
pub fn first_non_empty<'a, I>(explicit: Option<&'a str>, existing: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    if let Some(message) = explicit
        && !message.trim().is_empty()
    {
        return Some(message.to_string());
    }
    existing
        .into_iter()
        .map(str::trim)
        .find(|message| !message.is_empty())
        .map(str::to_string)
}

/// Split a commit message into its subject line and the remaining body.
pub fn split_message(message: &str) -> (String, String) {
    let message = message.trim();
    match message.split_once('\n') {
        Some((subject, body)) => (subject.trim().to_string(), body.trim().to_string()),
        None => (message.to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_message_wins() {
        let message = first_non_empty(Some("squashed\n\n  body "), ["first", "second"]);
        assert_eq!(message.as_deref(), Some("squashed\n\n  body "));
    }

    #[test]
    fn falls_back_to_first_existing_message() {
        let message = first_non_empty(None, ["", "  ", "first real", "second"]);
        assert_eq!(message.as_deref(), Some("first real"));
    }

    #[test]
    fn empty_explicit_message_falls_through() {
        let message = first_non_empty(Some(""), ["existing"]);
        assert_eq!(message.as_deref(), Some("existing"));
    }

    #[test]
    fn all_empty_yields_none() {
        assert_eq!(first_non_empty(None, ["", "\n"]), None);
    }

    #[test]
    fn splits_subject_and_body() {
        assert_eq!(
            split_message("subject\n\nbody line\nmore\n"),
            ("subject".to_string(), "body line\nmore".to_string())
        );
        assert_eq!(
            split_message("only subject"),
            ("only subject".to_string(), String::new())
        );
    }
}
