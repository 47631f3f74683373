//! `virsh domstats` dump parsing

use crate::CollectError;
use crate::metric::MetricRecord;

/// Key whose value becomes the `state` tag
const STATE_KEY: &str = "state.state";

/// Suffix of informational keys such as `net.0.name` or `block.0.name`
const NAME_SUFFIX: &str = ".name";

/// Parse one domain's `key=value` stats dump into a record.
///
/// The first line (`Domain: '<name>'`) and blank lines are skipped.
/// `state.state` becomes the `state` tag, `*.name` keys are dropped, and
/// every other value must be an unsigned integer literal. Any bad line fails
/// the whole record.
pub fn parse_domain_stats(domain: &str, dump: &str) -> Result<MetricRecord, CollectError> {
    let mut record = MetricRecord::new(domain);

    for line in dump.split('\n').skip(1) {
        if line.trim().is_empty() {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            return Err(malformed(domain, line));
        };
        let key = key.trim();
        let value = value.trim();
        if key.is_empty() {
            return Err(malformed(domain, line));
        }

        if key == STATE_KEY {
            record.state = value.to_string();
        } else if key.ends_with(NAME_SUFFIX) {
            continue;
        } else {
            let parsed =
                parse_uint_literal(value).ok_or_else(|| CollectError::InvalidFieldValue {
                    domain: domain.to_string(),
                    key: key.to_string(),
                    value: value.to_string(),
                })?;
            record.fields.insert(key.to_string(), parsed);
        }
    }

    Ok(record)
}

fn malformed(domain: &str, line: &str) -> CollectError {
    CollectError::MalformedStatLine {
        domain: domain.to_string(),
        line: line.to_string(),
    }
}

/// Parse an unsigned integer literal, inferring the base from its prefix.
///
/// `0x`/`0X` is hex, `0o`/`0O` octal, `0b`/`0B` binary, a bare leading `0`
/// octal, anything else decimal. Underscores may separate digits or follow
/// a base prefix. Signs and overflow are rejected.
pub fn parse_uint_literal(text: &str) -> Option<u64> {
    let (radix, digits, prefixed) = match text.as_bytes() {
        [b'0', b'x' | b'X', ..] => (16, &text[2..], true),
        [b'0', b'o' | b'O', ..] => (8, &text[2..], true),
        [b'0', b'b' | b'B', ..] => (2, &text[2..], true),
        [b'0', _, ..] => (8, &text[1..], true),
        _ => (10, text, false),
    };

    if !underscores_ok(digits, prefixed) {
        return None;
    }

    let cleaned: String = digits.chars().filter(|&c| c != '_').collect();
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_digit(radix)) {
        return None;
    }

    u64::from_str_radix(&cleaned, radix).ok()
}

/// Every `_` must follow a digit or the base prefix and precede a digit
fn underscores_ok(digits: &str, prefixed: bool) -> bool {
    let mut after_digit = prefixed;
    for c in digits.chars() {
        if c == '_' {
            if !after_digit {
                return false;
            }
            after_digit = false;
        } else {
            after_digit = true;
        }
    }
    after_digit || digits.is_empty()
}
