use log::debug;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::RenderError;

pub const ORIGINAL_SUBJECT: &str = "{ORIGINAL_SUBJECT}";
pub const ORIGINAL_DESTINATION: &str = "{ORIGINAL_DESTINATION}";

/// Placeholder token (braces included) to replacement value.
pub type Bindings<'a> = HashMap<&'a str, &'a str>;

/// Replaces every bound `{TOKEN}` in a single left-to-right pass. Unbound
/// tokens stay as they are and substituted text is never scanned again.
pub fn render(template: &str, bindings: &Bindings) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let candidate = &rest[open..];
        let replaced = candidate
            .find('}')
            .map(|close| &candidate[..=close])
            .and_then(|token| bindings.get(token).map(|value| (token.len(), *value)));
        match replaced {
            Some((len, value)) => {
                out.push_str(value);
                rest = &candidate[len..];
            }
            None => {
                out.push('{');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Loads an HTML body template from disk.
pub fn load_html(path: &Path) -> Result<String, RenderError> {
    debug!("[render] loading HTML body from {}", path.display());
    fs::read_to_string(path).map_err(|source| RenderError::HtmlBody {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings<'a>(pairs: &[(&'a str, &'a str)]) -> Bindings<'a> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn substitutes_bound_token() {
        let b = bindings(&[(ORIGINAL_SUBJECT, "Hi")]);
        assert_eq!(render("Re: {ORIGINAL_SUBJECT}", &b), "Re: Hi");
    }

    #[test]
    fn template_without_tokens_is_unchanged() {
        assert_eq!(render("no tokens", &Bindings::new()), "no tokens");
    }

    #[test]
    fn unbound_tokens_pass_through() {
        let b = bindings(&[(ORIGINAL_SUBJECT, "Hi")]);
        assert_eq!(
            render("{ORIGINAL_DESTINATION} {OTHER} {ORIGINAL_SUBJECT}", &b),
            "{ORIGINAL_DESTINATION} {OTHER} Hi"
        );
    }

    #[test]
    fn every_occurrence_is_replaced() {
        let b = bindings(&[(ORIGINAL_DESTINATION, "b@y")]);
        assert_eq!(
            render("{ORIGINAL_DESTINATION}/{ORIGINAL_DESTINATION}", &b),
            "b@y/b@y"
        );
    }

    #[test]
    fn substituted_text_is_not_rescanned() {
        let b = bindings(&[
            (ORIGINAL_SUBJECT, "{ORIGINAL_DESTINATION}"),
            (ORIGINAL_DESTINATION, "b@y"),
        ]);
        assert_eq!(
            render("{ORIGINAL_SUBJECT} to {ORIGINAL_DESTINATION}", &b),
            "{ORIGINAL_DESTINATION} to b@y"
        );
    }

    #[test]
    fn stray_braces_are_kept() {
        let b = bindings(&[(ORIGINAL_SUBJECT, "Hi")]);
        assert_eq!(render("{ {{ORIGINAL_SUBJECT}} }", &b), "{ {Hi} }");
        assert_eq!(render("open {ORIGINAL_SUBJECT", &b), "open {ORIGINAL_SUBJECT");
    }

    #[test]
    fn html_body_is_loaded_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("body.html");
        fs::write(&path, "<p>{ORIGINAL_SUBJECT}</p>").unwrap();
        assert_eq!(load_html(&path).unwrap(), "<p>{ORIGINAL_SUBJECT}</p>");
    }

    #[test]
    fn unreadable_html_body_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_html(&dir.path().join("missing.html")).unwrap_err();
        assert!(matches!(err, RenderError::HtmlBody { .. }));
    }
}
