//! Order marker codec
//!
//! Exercise order markers are human-facing labels like `A1`, `B2` or `AA3`.
//! The label is the durable display value; this module only turns it into an
//! integer sort key. There is no decode step.
//!
//! Each letter prefix owns 100 slots, so `A0..A99` all sort before `B0`.

use once_cell::sync::Lazy;
use regex::Regex;

/// Letter run followed by an optional digit run, nothing else
static RE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z]+)(\d*)$").expect("marker pattern is valid"));

/// Slots reserved per letter prefix
pub const SLOTS_PER_PREFIX: i64 = 100;

/// Convert an order marker into a stable sort integer.
///
/// Purely numeric markers are parsed directly. Otherwise the letters are read
/// as base-26 (A=0 … Z=25, case-insensitive) and multiplied by
/// [`SLOTS_PER_PREFIX`], then the numeric suffix is added (0 when absent).
/// Empty or unparseable input encodes to 0.
pub fn encode(marker: &str) -> i64 {
    let marker = marker.trim();
    if marker.is_empty() {
        return 0;
    }

    if marker.bytes().all(|b| b.is_ascii_digit()) {
        return marker.parse().unwrap_or(0);
    }

    let Some(caps) = RE_MARKER.captures(marker) else {
        return 0;
    };

    let letters = &caps[1];
    let digits = &caps[2];

    let Some(prefix) = letters_to_base26(letters) else {
        return 0;
    };
    let suffix: i64 = if digits.is_empty() {
        0
    } else {
        match digits.parse() {
            Ok(value) => value,
            Err(_) => return 0,
        }
    };

    prefix
        .checked_mul(SLOTS_PER_PREFIX)
        .and_then(|base| base.checked_add(suffix))
        .unwrap_or(0)
}

/// Positional base-26 value of a letter run (A=0)
fn letters_to_base26(letters: &str) -> Option<i64> {
    letters.bytes().try_fold(0i64, |acc, b| {
        let digit = i64::from(b.to_ascii_uppercase() - b'A');
        acc.checked_mul(26)?.checked_add(digit)
    })
}

/// Inverse of [`letters_to_base26`] for building new prefixes
fn base26_to_letters(mut value: i64) -> String {
    // Positional with A=0 means a single letter covers 0..=25 and "BA" is 26.
    let mut out = Vec::new();
    loop {
        out.push(b'A' + (value % 26) as u8);
        value /= 26;
        if value == 0 {
            break;
        }
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_else(|_| "A".to_string())
}

/// Marker that sorts after every marker in `existing`.
///
/// Takes the highest letter prefix in use and advances it by one, starting a
/// fresh group at `1`. An empty session starts at `A1`.
pub fn next_marker<'a, I>(existing: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let highest = existing.into_iter().map(encode).max();
    match highest {
        None => "A1".to_string(),
        Some(code) => {
            let next_prefix = code.div_euclid(SLOTS_PER_PREFIX) + 1;
            format!("{}1", base26_to_letters(next_prefix))
        }
    }
}
