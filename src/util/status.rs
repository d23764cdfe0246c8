//! Helpers for meter status fields: translated status flags from several
//! records are joined and normalized into one stable, sorted string.

use std::collections::BTreeSet;

/// Sort the space separated tokens of a status string, dropping duplicates.
pub fn sort_status_string(s: &str) -> String {
    let set: BTreeSet<&str> = s.split_whitespace().collect();
    set.into_iter().collect::<Vec<_>>().join(" ")
}

/// Join two status strings where "OK", "null" and empty all mean no error.
///
/// The result is "OK" when both sides are silent, otherwise the non-silent
/// tokens joined with a single space.
pub fn join_status_ok_strings(a: &str, b: &str) -> String {
    let silent = |s: &str| s.is_empty() || s == "OK" || s == "null";

    match (silent(a), silent(b)) {
        (true, true) => "OK".to_string(),
        (false, true) => a.to_string(),
        (true, false) => b.to_string(),
        (false, false) => format!("{} {}", a, b),
    }
}

/// Heuristic used by text fields: does this hex payload look like an ASCII
/// string? Leading NUL padding is accepted, anything else must be printable.
pub fn is_likely_ascii(hex: &str) -> bool {
    let Ok(bytes) = crate::util::hex::hex2bin(hex) else {
        return false;
    };

    let mut seen_text = false;
    for &b in &bytes {
        if b == 0 {
            if seen_text {
                return false; // NUL inside the text
            }
            continue;
        }
        if !(0x20..=0x7e).contains(&b) {
            return false;
        }
        seen_text = true;
    }
    seen_text
}
