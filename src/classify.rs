//! Loop avoidance: decides whether an inbound message was itself sent by a
//! machine (auto-responder, mailing list, bulk sender) and must not be
//! answered.
//!
//! Checks follow RFC 3834 (`Auto-Submitted`), RFC 2369/2919 (list headers)
//! and the vendor headers seen in the wild. The first matching check wins.

use std::fmt;

use crate::message::HeaderMap;

const SUPPRESS_VALUES: [&str; 3] = ["DR", "AutoReply", "All"];
const PRECEDENCE_VALUES: [&str; 3] = ["bulk", "auto_reply", "list"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    AutoSubmitted,
    SuppressHeader,
    ListHeader,
    FeedbackId,
    Precedence,
    LegacyHeader,
    None,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Reason::AutoSubmitted => "AUTO_SUBMITTED",
            Reason::SuppressHeader => "SUPPRESS_HEADER",
            Reason::ListHeader => "LIST_HEADER",
            Reason::FeedbackId => "FEEDBACK_ID",
            Reason::Precedence => "PRECEDENCE",
            Reason::LegacyHeader => "LEGACY_HEADER",
            Reason::None => "NONE",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub automated: bool,
    pub reason: Reason,
}

impl Verdict {
    fn automated(reason: Reason) -> Self {
        Self {
            automated: true,
            reason,
        }
    }
}

pub fn classify(headers: &HeaderMap) -> Verdict {
    if let Some(value) = headers.get("Auto-Submitted") {
        if !value.trim().eq_ignore_ascii_case("no") {
            return Verdict::automated(Reason::AutoSubmitted);
        }
    }

    if let Some(value) = headers.get("X-Auto-Response-Suppress") {
        if SUPPRESS_VALUES.contains(&value.trim()) {
            return Verdict::automated(Reason::SuppressHeader);
        }
    }

    if headers.contains("List-Id") || headers.contains("List-Unsubscribe") {
        return Verdict::automated(Reason::ListHeader);
    }

    if headers.contains("Feedback-ID") {
        return Verdict::automated(Reason::FeedbackId);
    }

    if let Some(value) = headers.get("Precedence") {
        let value = value.trim();
        if PRECEDENCE_VALUES
            .iter()
            .any(|p| value.eq_ignore_ascii_case(p))
        {
            return Verdict::automated(Reason::Precedence);
        }
    }

    if headers.contains("X-Autoreply") || headers.contains("X-Autorespond") {
        return Verdict::automated(Reason::LegacyHeader);
    }

    Verdict {
        automated: false,
        reason: Reason::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(headers: &[(&str, &str)]) -> Verdict {
        classify(&headers.iter().copied().collect())
    }

    #[test]
    fn plain_message_is_not_automated() {
        let v = verdict(&[("From", "a@x"), ("Subject", "Hi")]);
        assert!(!v.automated);
        assert_eq!(v.reason, Reason::None);
    }

    #[test]
    fn empty_headers_are_not_automated() {
        assert_eq!(verdict(&[]).reason, Reason::None);
    }

    #[test]
    fn auto_submitted_any_value_but_no() {
        for value in ["auto-replied", "auto-generated", "auto-notified", "yes", ""] {
            let v = verdict(&[("Auto-Submitted", value)]);
            assert!(v.automated, "value {:?}", value);
            assert_eq!(v.reason, Reason::AutoSubmitted);
        }
    }

    #[test]
    fn auto_submitted_no_is_ignored_case_insensitively() {
        for value in ["no", "No", " NO "] {
            assert_eq!(verdict(&[("auto-submitted", value)]).reason, Reason::None);
        }
    }

    #[test]
    fn suppress_header_exact_values_only() {
        for value in ["DR", "AutoReply", "All"] {
            assert_eq!(
                verdict(&[("X-Auto-Response-Suppress", value)]).reason,
                Reason::SuppressHeader
            );
        }
        for value in ["all", "autoreply", "OOF"] {
            assert_eq!(
                verdict(&[("X-Auto-Response-Suppress", value)]).reason,
                Reason::None
            );
        }
    }

    #[test]
    fn list_headers() {
        assert_eq!(verdict(&[("List-Id", "<l.example>")]).reason, Reason::ListHeader);
        assert_eq!(verdict(&[("List-Unsubscribe", "")]).reason, Reason::ListHeader);
    }

    #[test]
    fn feedback_id() {
        assert_eq!(verdict(&[("Feedback-ID", "1:2:3")]).reason, Reason::FeedbackId);
    }

    #[test]
    fn precedence_values() {
        for value in ["bulk", "Bulk", "auto_reply", "LIST"] {
            assert_eq!(verdict(&[("Precedence", value)]).reason, Reason::Precedence);
        }
        assert_eq!(verdict(&[("Precedence", "first-class")]).reason, Reason::None);
    }

    #[test]
    fn legacy_headers() {
        assert_eq!(verdict(&[("X-Autoreply", "yes")]).reason, Reason::LegacyHeader);
        assert_eq!(verdict(&[("X-Autorespond", "")]).reason, Reason::LegacyHeader);
    }

    #[test]
    fn first_matching_check_wins() {
        let v = verdict(&[
            ("X-Autoreply", "yes"),
            ("Precedence", "bulk"),
            ("List-Id", "l"),
            ("Auto-Submitted", "auto-replied"),
        ]);
        assert_eq!(v.reason, Reason::AutoSubmitted);

        let v = verdict(&[("Auto-Submitted", "no"), ("Precedence", "bulk"), ("List-Id", "l")]);
        assert_eq!(v.reason, Reason::ListHeader);
    }

    #[test]
    fn reason_codes_display() {
        assert_eq!(Reason::AutoSubmitted.to_string(), "AUTO_SUBMITTED");
        assert_eq!(Reason::None.to_string(), "NONE");
    }
}
