//! Cleanup applied to chunk text right before it goes to a synthesizer.
//!
//! Word indices are always computed on the uncleaned text, so nothing here
//! has to preserve word boundaries exactly.

/// Typographic characters engines tend to mispronounce or read aloud.
const SUBSTITUTIONS: &[(char, &str)] = &[
    ('\u{2018}', "'"),
    ('\u{2019}', "'"),
    ('\u{201a}', "'"),
    ('\u{2032}', "'"),
    ('\u{201c}', "\""),
    ('\u{201d}', "\""),
    ('\u{201e}', "\""),
    ('\u{00ab}', "\""),
    ('\u{00bb}', "\""),
    ('\u{2033}', "\""),
    ('\u{2010}', "-"),
    ('\u{2011}', "-"),
    ('\u{2012}', "-"),
    ('\u{2013}', ", "),
    ('\u{2014}', ", "),
    ('\u{2015}', ", "),
    ('\u{2026}', "."),
    ('\u{00a0}', " "),
    ('\u{202f}', " "),
];

/// Characters dropped outright.
const INVISIBLE: &[char] = &['\u{200b}', '\u{200c}', '\u{200d}', '\u{2060}', '\u{feff}'];

/// Normalize text for a speech engine.
///
/// Replaces typographic punctuation with plain ASCII, drops invisible and
/// control characters, collapses runs of periods and whitespace into one.
pub fn clean_for_speech(text: &str) -> String {
    let mut out = String::with_capacity(text.len());

    for c in text.chars() {
        if let Some((_, plain)) = SUBSTITUTIONS.iter().find(|(from, _)| *from == c) {
            for p in plain.chars() {
                push_collapsed(&mut out, p);
            }
        } else if INVISIBLE.contains(&c) || (c.is_control() && !c.is_whitespace()) {
            continue;
        } else {
            push_collapsed(&mut out, c);
        }
    }

    // Dash substitutions can leave " , " or ",," behind
    let out = out.replace(" ,", ",").replace(",,", ",");
    out.trim().to_string()
}

/// Push `c`, folding whitespace runs into one space and period runs into one period.
fn push_collapsed(out: &mut String, c: char) {
    let last = out.chars().next_back();

    if c.is_whitespace() {
        if !matches!(last, None | Some(' ')) {
            out.push(' ');
        }
    } else if c == '.' && last == Some('.') {
        // keep the first period only
    } else {
        out.push(c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smart_quotes() {
        let cleaned = clean_for_speech("\u{201c}Hi,\u{201d} she said. \u{2018}Fine.\u{2019}");
        assert_eq!(cleaned, "\"Hi,\" she said. 'Fine.'");
    }

    #[test]
    fn test_dashes_become_pauses() {
        assert_eq!(clean_for_speech("wait\u{2014}what"), "wait, what");
        assert_eq!(clean_for_speech("wait \u{2014} what"), "wait, what");
        assert_eq!(clean_for_speech("well\u{2011}known"), "well-known");
    }

    #[test]
    fn test_periods_collapse() {
        assert_eq!(clean_for_speech("So... then\u{2026} fine...."), "So. then. fine.");
    }

    #[test]
    fn test_whitespace_collapses() {
        assert_eq!(clean_for_speech("  a \t b\n\nc  "), "a b c");
    }

    #[test]
    fn test_invisible_and_control_dropped() {
        assert_eq!(clean_for_speech("a\u{200b}b\u{feff}c\x07d"), "abcd");
    }

    #[test]
    fn test_plain_text_unchanged() {
        let text = "Alpha one. Beta two.";
        assert_eq!(clean_for_speech(text), text);
    }
}
