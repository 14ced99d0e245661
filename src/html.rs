use once_cell::sync::Lazy;
use regex::Regex;

static NEWLINE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n+").unwrap());

/// Longest entity name we try to decode, not counting `&` and `;`.
const MAX_ENTITY_LEN: usize = 10;

/// Strips markup and decodes entities, then collapses newline runs.
pub fn normalize(fragment: &str, keep_newlines: bool) -> String {
    collapse_newlines(&strip(fragment), keep_newlines)
}

/// Removes tags and comments, keeping character data in document order.
///
/// Never fails: a `<` that does not open a well-formed tag is kept as text, and an
/// unknown or unterminated entity is copied through unchanged.
pub fn strip(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut rest = fragment;

    while let Some(pos) = rest.find(['<', '&']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with('<') {
            match markup_len(tail) {
                Some(len) => rest = &tail[len..],
                None => {
                    out.push('<');
                    rest = &tail[1..];
                }
            }
        } else {
            match decode_entity(tail) {
                Some((decoded, len)) => {
                    out.push(decoded);
                    rest = &tail[len..];
                }
                None => {
                    out.push('&');
                    rest = &tail[1..];
                }
            }
        }
    }

    out.push_str(rest);
    out
}

/// Byte length of the tag, comment or declaration at the start of `s`, if it is one.
fn markup_len(s: &str) -> Option<usize> {
    let after = &s[1..];
    if after.starts_with("!--") {
        return after[3..].find("-->").map(|end| 1 + 3 + end + 3);
    }

    let first = after.chars().next()?;
    let opens_tag = first.is_ascii_alphabetic() || matches!(first, '/' | '!' | '?');
    if !opens_tag {
        return None;
    }

    tag_end(after).map(|end| 1 + end + 1)
}

/// Finds the closing `>` of a tag body, skipping over quoted attribute values.
fn tag_end(s: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '>' => return Some(i),
                // A new tag opening before this one closed means this one never closes.
                '<' => return None,
                _ => {}
            },
        }
    }
    None
}

/// Decodes the entity at the start of `s`, returning the character and bytes consumed.
fn decode_entity(s: &str) -> Option<(char, usize)> {
    let body = &s[1..];
    let semi = body
        .char_indices()
        .take(MAX_ENTITY_LEN + 1)
        .find(|(_, c)| *c == ';')?
        .0;
    let name = &body[..semi];
    if name.is_empty() {
        return None;
    }

    let decoded = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "hellip" => '\u{2026}',
        "mdash" => '\u{2014}',
        "ndash" => '\u{2013}',
        "rsquo" => '\u{2019}',
        "lsquo" => '\u{2018}',
        "rdquo" => '\u{201d}',
        "ldquo" => '\u{201c}',
        "copy" => '\u{a9}',
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse::<u32>().ok()?,
            };
            char::from_u32(code)?
        }
    };

    Some((decoded, 1 + name.len() + 1))
}

/// Replaces each run of `\n` with one `\n` (keep) or one space (don't keep).
pub fn collapse_newlines(text: &str, keep: bool) -> String {
    let replacement = if keep { "\n" } else { " " };
    NEWLINE_RUN.replace_all(text, replacement).into_owned()
}
