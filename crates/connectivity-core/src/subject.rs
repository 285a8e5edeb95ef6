//! Certificate subject extraction.
//!
//! The TLS-terminating front door forwards the client certificate chain in
//! the `X-Forwarded-Client-Cert` header. Each certificate in the chain shows
//! up as a `Subject="<DN>"` element:
//!
//! ```text
//! Hash=abc;Subject="CN=app1,O=tenant1,OU=group1";URI=,By=spiffe://cluster.local
//! ```
//!
//! Only the subject DNs are of interest here. Parsing is lenient: a segment
//! without `=` contributes no attribute instead of failing the request.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Matches every `Subject="..."` element, non-greedy so that multiple
/// subjects in one header are yielded separately.
static SUBJECT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"Subject="(.*?)""#).expect("subject pattern is valid"));

// ─────────────────────────────────────────────────────────────────────────────
// Parsed subject
// ─────────────────────────────────────────────────────────────────────────────

/// Structured view of a certificate subject DN.
///
/// Attributes absent from the DN are empty strings, never `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedSubject {
    /// `CN`
    pub common_name: String,
    /// `O`
    pub organization: String,
    /// `OU`
    pub organizational_unit: String,
    /// `C`
    pub country: String,
    /// `L`
    pub locality: String,
    /// `ST`
    pub province: String,
}

impl ParsedSubject {
    /// Store `value` under the field named by the short attribute `key`.
    ///
    /// Unknown keys are ignored.
    fn assign(&mut self, key: &str, value: &str) {
        let field = match key {
            "CN" => &mut self.common_name,
            "O" => &mut self.organization,
            "OU" => &mut self.organizational_unit,
            "C" => &mut self.country,
            "L" => &mut self.locality,
            "ST" => &mut self.province,
            _ => return,
        };
        value.clone_into(field);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Extraction
// ─────────────────────────────────────────────────────────────────────────────

/// Extract the raw subject DNs from a forwarded-certificate header value.
///
/// Subjects are returned in header order. Empty `Subject=""` elements are
/// skipped.
#[must_use]
pub fn extract_subjects(header: &str) -> Vec<&str> {
    SUBJECT_PATTERN
        .captures_iter(header)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|subject| !subject.is_empty())
        .collect()
}

/// Parse a DN of the form `CN=a,O=b,OU=c`.
///
/// Each comma-separated segment is split on its first `=`. Keys and values
/// are taken verbatim, so padding is part of the value; when a key repeats
/// the last value wins.
#[must_use]
pub fn parse_subject(raw: &str) -> ParsedSubject {
    let mut subject = ParsedSubject::default();

    for segment in raw.split(',') {
        let Some((key, value)) = segment.split_once('=') else {
            continue;
        };
        subject.assign(key, value);
    }

    subject
}

/// Extract and parse every subject in a forwarded-certificate header.
#[must_use]
pub fn parse_subjects(header: &str) -> Vec<ParsedSubject> {
    extract_subjects(header)
        .into_iter()
        .map(parse_subject)
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // ── extract_subjects ─────────────────────────────────────────────────────

    #[test]
    fn extracts_single_subject() {
        let header = r#"Hash=abc;Subject="CN=app1,O=t1,OU=g1";URI="#;
        assert_eq!(extract_subjects(header), vec!["CN=app1,O=t1,OU=g1"]);
    }

    #[test]
    fn extracts_chain_in_header_order() {
        let header = r#"Subject="CN=leaf";By=x,Subject="CN=intermediate";Subject="CN=root""#;
        assert_eq!(
            extract_subjects(header),
            vec!["CN=leaf", "CN=intermediate", "CN=root"]
        );
    }

    #[test]
    fn no_subject_yields_empty() {
        assert!(extract_subjects("Hash=abc;URI=spiffe://x").is_empty());
        assert!(extract_subjects("").is_empty());
    }

    #[test]
    fn empty_subject_is_skipped() {
        let header = r#"Subject="";Subject="CN=app1""#;
        assert_eq!(extract_subjects(header), vec!["CN=app1"]);
    }

    #[test]
    fn unterminated_subject_is_ignored() {
        assert!(extract_subjects(r#"Subject="CN=app1"#).is_empty());
    }

    // ── parse_subject ────────────────────────────────────────────────────────

    #[test]
    fn parses_all_known_attributes() {
        let subject = parse_subject("CN=app1,O=tenant,OU=group,C=DE,L=Munich,ST=Bavaria");
        assert_eq!(
            subject,
            ParsedSubject {
                common_name: "app1".into(),
                organization: "tenant".into(),
                organizational_unit: "group".into(),
                country: "DE".into(),
                locality: "Munich".into(),
                province: "Bavaria".into(),
            }
        );
    }

    #[test]
    fn missing_attributes_are_empty_strings() {
        let subject = parse_subject("CN=app1");
        assert_eq!(subject.common_name, "app1");
        assert_eq!(subject.organization, "");
        assert_eq!(subject.organizational_unit, "");
        assert_eq!(subject.province, "");
    }

    #[test]
    fn segment_without_separator_contributes_nothing() {
        let subject = parse_subject("CN=app1,garbage,OU=g1");
        assert_eq!(subject.common_name, "app1");
        assert_eq!(subject.organizational_unit, "g1");
        assert_eq!(subject.organization, "");
    }

    #[test]
    fn only_separator_less_input_yields_default() {
        assert_eq!(parse_subject("nonsense"), ParsedSubject::default());
        assert_eq!(parse_subject(""), ParsedSubject::default());
    }

    #[test]
    fn value_keeps_everything_after_first_equals() {
        let subject = parse_subject("CN=a=b");
        assert_eq!(subject.common_name, "a=b");
    }

    #[test]
    fn unknown_and_lowercase_keys_are_ignored() {
        let subject = parse_subject("cn=lower,emailAddress=x@y,CN=upper");
        assert_eq!(subject.common_name, "upper");
    }

    #[test]
    fn padding_is_kept_verbatim() {
        let subject = parse_subject("CN= app1 , O=t1,OU=g1 ");
        assert_eq!(subject.common_name, " app1 ");
        assert_eq!(subject.organizational_unit, "g1 ");
        // " O" is not a known key
        assert_eq!(parse_subject("CN=app1, O=t1").organization, "");
    }

    #[test]
    fn repeated_key_last_wins() {
        assert_eq!(parse_subject("O=first,O=second").organization, "second");
    }

    #[test]
    fn parse_subjects_combines_both_steps() {
        let header = r#"Subject="CN=wrong";Subject="CN=app1,OU=g1""#;
        let subjects = parse_subjects(header);
        assert_eq!(subjects.len(), 2);
        assert_eq!(subjects[0].common_name, "wrong");
        assert_eq!(subjects[1].organizational_unit, "g1");
    }

    #[test]
    fn serializes_with_snake_case_fields() {
        let json = serde_json::to_value(parse_subject("CN=app1")).unwrap();
        assert_eq!(json["common_name"], "app1");
        assert_eq!(json["organizational_unit"], "");
    }
}
