//! `ignoreip` directive patching for fail2ban jail files.
//!
//! The only structure assumed in the jail file is a line matching `^ignoreip\s*=\s*(.*)$`
//! (plus indented continuation lines, which fail2ban's config parser folds into the value).
//! Everything else in the file is carried over untouched. Below the directive an optional
//! block of `# whitelist:` lines annotates each entry; that block is owned by us and replaced
//! wholesale on every run, so patching is idempotent.

use super::entry::WhitelistEntry;
use crate::errors::WardenError;
use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;

pub const ANNOTATION_PREFIX: &str = "# whitelist:";

static IGNOREIP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ignoreip\s*=\s*(.*)$").expect("static ignoreip regex"));

#[derive(Debug, Clone)]
pub struct PatchOptions<'a> {
    /// Line after which the directive is inserted when the file has none.
    pub anchor: &'a str,
    /// Emit one annotation line per commented entry.
    pub annotate: bool,
}

/// Space-joined directive value, in table order.
pub fn ignoreip_value(entries: &[WhitelistEntry]) -> String {
    entries
        .iter()
        .map(|e| e.ip_or_cidr.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Addresses currently configured in `content`, or `None` if there is no directive.
pub fn read_ignoreip(content: &str) -> Option<Vec<String>> {
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let idx = find_directive(&lines)?;
    let first = IGNOREIP_RE
        .captures(strip_eol(lines[idx]))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or("");

    let mut values: Vec<String> = first.split_whitespace().map(str::to_string).collect();
    for line in &lines[idx + 1..idx + 1 + continuation_len(&lines, idx)] {
        values.extend(strip_eol(line).split_whitespace().map(str::to_string));
    }
    Some(values)
}

/// Rewrite (or insert) the directive and its annotation block.
pub fn apply_ignoreip(
    content: &str,
    entries: &[WhitelistEntry],
    opts: &PatchOptions<'_>,
) -> Result<String> {
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let mut out = String::with_capacity(content.len() + 64 * (entries.len() + 1));

    if let Some(idx) = find_directive(&lines) {
        let eol = eol_of(lines[idx]);
        let mut end = idx + 1 + continuation_len(&lines, idx);
        while end < lines.len() && is_annotation(lines[end]) {
            end += 1;
        }
        lines[..idx].iter().for_each(|l| out.push_str(l));
        render_block(&mut out, entries, opts.annotate, eol);
        lines[end..].iter().for_each(|l| out.push_str(l));
        return Ok(out);
    }

    let anchor = opts.anchor.trim();
    let Some(idx) = lines.iter().position(|l| strip_eol(l).trim() == anchor) else {
        return Err(WardenError::AnchorNotFound(anchor.to_string()).into());
    };
    let eol = eol_of(lines[idx]);
    lines[..=idx].iter().for_each(|l| out.push_str(l));
    if !lines[idx].ends_with('\n') {
        out.push_str(eol);
    }
    render_block(&mut out, entries, opts.annotate, eol);
    lines[idx + 1..].iter().for_each(|l| out.push_str(l));
    Ok(out)
}

fn render_block(out: &mut String, entries: &[WhitelistEntry], annotate: bool, eol: &str) {
    let value = ignoreip_value(entries);
    if value.is_empty() {
        out.push_str("ignoreip =");
    } else {
        out.push_str("ignoreip = ");
        out.push_str(&value);
    }
    out.push_str(eol);

    if !annotate {
        return;
    }
    for entry in entries {
        let Some(comment) = entry.comment.as_deref().map(single_line) else {
            continue;
        };
        if comment.is_empty() {
            continue;
        }
        out.push_str(ANNOTATION_PREFIX);
        out.push(' ');
        out.push_str(&entry.ip_or_cidr);
        out.push_str(" - ");
        out.push_str(&comment);
        out.push_str(eol);
    }
}

fn find_directive(lines: &[&str]) -> Option<usize> {
    lines
        .iter()
        .position(|l| IGNOREIP_RE.is_match(strip_eol(l)))
}

/// Indented, non-blank lines right after the directive continue its value.
fn continuation_len(lines: &[&str], directive: usize) -> usize {
    lines[directive + 1..]
        .iter()
        .take_while(|l| {
            let body = strip_eol(l);
            body.starts_with(&[' ', '\t'][..]) && !body.trim().is_empty()
        })
        .count()
}

fn is_annotation(line: &str) -> bool {
    strip_eol(line).starts_with(ANNOTATION_PREFIX)
}

fn strip_eol(line: &str) -> &str {
    line.strip_suffix('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .unwrap_or(line)
}

fn eol_of(line: &str) -> &'static str {
    if line.ends_with("\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}

fn single_line(comment: &str) -> String {
    comment
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ip: &str, comment: Option<&str>) -> WhitelistEntry {
        WhitelistEntry {
            id: 0,
            ip_or_cidr: ip.to_string(),
            comment: comment.map(str::to_string),
            created_by: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn opts() -> PatchOptions<'static> {
        PatchOptions {
            anchor: "[opensips-brute-force]",
            annotate: true,
        }
    }

    const JAIL: &str = "[opensips-brute-force]\n\
enabled  = true\n\
filter   = opensips-brute-force\n\
ignoreip = 127.0.0.1/8 ::1\n\
bantime  = 3600\n";

    #[test]
    fn replaces_directive_and_annotates_commented_entries_only() {
        let entries = vec![entry("10.0.0.1", Some("office")), entry("10.0.0.0/24", None)];
        let out = apply_ignoreip(JAIL, &entries, &opts()).unwrap();
        assert_eq!(
            out,
            "[opensips-brute-force]\n\
enabled  = true\n\
filter   = opensips-brute-force\n\
ignoreip = 10.0.0.1 10.0.0.0/24\n\
# whitelist: 10.0.0.1 - office\n\
bantime  = 3600\n"
        );
        assert_eq!(
            read_ignoreip(&out).unwrap(),
            vec!["10.0.0.1", "10.0.0.0/24"]
        );
    }

    #[test]
    fn patching_is_idempotent() {
        let entries = vec![entry("10.0.0.1", Some("office")), entry("::1", Some("loopback"))];
        let once = apply_ignoreip(JAIL, &entries, &opts()).unwrap();
        let twice = apply_ignoreip(&once, &entries, &opts()).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.matches("ignoreip").count(), 1);
        assert_eq!(once.matches(ANNOTATION_PREFIX).count(), 2);
    }

    #[test]
    fn empty_whitelist_keeps_an_empty_directive() {
        let out = apply_ignoreip(JAIL, &[], &opts()).unwrap();
        assert!(out.contains("\nignoreip =\n"));
        assert_eq!(read_ignoreip(&out).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn inserts_after_anchor_when_missing() {
        let content = "# managed by ops\n[opensips-brute-force]\nenabled = true\n";
        let out = apply_ignoreip(content, &[entry("10.0.0.1", None)], &opts()).unwrap();
        assert_eq!(
            out,
            "# managed by ops\n[opensips-brute-force]\nignoreip = 10.0.0.1\nenabled = true\n"
        );
    }

    #[test]
    fn anchor_on_last_line_without_newline() {
        let out =
            apply_ignoreip("[opensips-brute-force]", &[entry("10.0.0.1", None)], &opts()).unwrap();
        assert_eq!(out, "[opensips-brute-force]\nignoreip = 10.0.0.1\n");
    }

    #[test]
    fn missing_directive_and_anchor_is_an_error() {
        let err = apply_ignoreip("[sshd]\nenabled = true\n", &[], &opts()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WardenError>(),
            Some(WardenError::AnchorNotFound(_))
        ));
    }

    #[test]
    fn continuation_lines_are_replaced_not_kept() {
        let content = "[opensips-brute-force]\nignoreip = 127.0.0.1/8\n           192.0.2.0/24\n\n# tuning\nmaxretry = 5\n";
        assert_eq!(
            read_ignoreip(content).unwrap(),
            vec!["127.0.0.1/8", "192.0.2.0/24"]
        );
        let out = apply_ignoreip(content, &[entry("10.0.0.1", None)], &opts()).unwrap();
        assert_eq!(
            out,
            "[opensips-brute-force]\nignoreip = 10.0.0.1\n\n# tuning\nmaxretry = 5\n"
        );
    }

    #[test]
    fn stale_annotations_are_dropped_and_user_comments_kept() {
        let content = "[opensips-brute-force]\nignoreip = 10.0.0.1 10.0.0.2\n# whitelist: 10.0.0.1 - old\n# whitelist: 10.0.0.2 - gone\n# hand-written note\n";
        let out = apply_ignoreip(content, &[entry("10.0.0.1", Some("new"))], &opts()).unwrap();
        assert_eq!(
            out,
            "[opensips-brute-force]\nignoreip = 10.0.0.1\n# whitelist: 10.0.0.1 - new\n# hand-written note\n"
        );
    }

    #[test]
    fn annotation_disabled_and_crlf_preserved() {
        let content = "[opensips-brute-force]\r\nignoreip = 1.1.1.1\r\n# whitelist: 1.1.1.1 - x\r\nbantime = 60\r\n";
        let no_notes = PatchOptions {
            annotate: false,
            ..opts()
        };
        let out =
            apply_ignoreip(content, &[entry("10.0.0.1", Some("office"))], &no_notes).unwrap();
        assert_eq!(
            out,
            "[opensips-brute-force]\r\nignoreip = 10.0.0.1\r\nbantime = 60\r\n"
        );
    }

    #[test]
    fn multiline_comments_are_flattened() {
        let out = apply_ignoreip(
            JAIL,
            &[entry("10.0.0.1", Some("line one\nline two"))],
            &opts(),
        )
        .unwrap();
        assert!(out.contains("# whitelist: 10.0.0.1 - line one line two\n"));
    }

    #[test]
    fn read_without_directive_is_none() {
        assert_eq!(read_ignoreip("[sshd]\n"), None);
    }
}
