use log::debug;

use crate::config::ReplyRule;

/// A rule triggered by one of the envelope recipients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match<'a> {
    pub rule: &'a ReplyRule,
    /// The trigger address that was found among the recipients.
    pub address: &'a str,
}

/// Matches recipients against rules, in rule order then address order.
///
/// Comparison is byte-exact. A trigger address equal to the envelope sender
/// never matches.
pub fn match_rules<'a>(
    sender: &str,
    recipients: &[String],
    rules: &'a [ReplyRule],
) -> Vec<Match<'a>> {
    let mut matches = Vec::new();
    for rule in rules {
        for address in &rule.addresses {
            if !recipients.iter().any(|r| r == address) {
                continue;
            }
            if address == sender {
                debug!("[rules] skipping {}: same as envelope sender", address);
                continue;
            }
            matches.push(Match {
                rule,
                address: address.as_str(),
            });
        }
    }
    matches
}
