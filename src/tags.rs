//! StackExchange tag lists.
//!
//! Older dumps write `Tags="<python><xml>"`; dumps from 2024 onward use `Tags="|python|xml|"`.
//! Both decode to the same ordered list.

use memchr::memchr;

/// Decodes a raw `Tags` attribute. Missing, empty, and tag-less values all mean "no tags".
///
/// An empty `<>` pair is an empty tag, so bracket lists round-trip through [`encode`].
pub fn decode(raw: Option<&str>) -> Option<Vec<String>> {
    let raw = raw?;
    if raw.is_empty() {
        return None;
    }

    let tags = if raw.starts_with('|') {
        raw.split('|')
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>()
    } else {
        decode_brackets(raw)
    };

    if tags.is_empty() {
        None
    } else {
        Some(tags)
    }
}

/// Every substring strictly between a `<` and the next `>`, left to right.
fn decode_brackets(raw: &str) -> Vec<String> {
    let bytes = raw.as_bytes();
    let mut tags = Vec::new();
    let mut pos = 0;

    while let Some(open) = memchr(b'<', &bytes[pos..]) {
        let start = pos + open + 1;
        match memchr(b'>', &bytes[start..]) {
            Some(close) => {
                let end = start + close;
                tags.push(raw[start..end].to_string());
                pos = end + 1;
            }
            None => break,
        }
    }

    tags
}

/// Joins tags in the bracket form. An empty list encodes to `""`, which decodes to `None`.
pub fn encode<S: AsRef<str>>(tags: &[S]) -> String {
    let mut out = String::with_capacity(tags.iter().map(|t| t.as_ref().len() + 2).sum());
    for tag in tags {
        out.push('<');
        out.push_str(tag.as_ref());
        out.push('>');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_bracket_list() {
        assert_eq!(
            decode(Some("<python><xml><parsing>")),
            Some(vec![
                "python".to_string(),
                "xml".to_string(),
                "parsing".to_string()
            ])
        );
    }

    #[test]
    fn decode_missing_and_empty() {
        assert_eq!(decode(None), None);
        assert_eq!(decode(Some("")), None);
    }

    #[test]
    fn decode_keeps_duplicates_and_order() {
        assert_eq!(
            decode(Some("<b><a><b>")),
            Some(vec!["b".to_string(), "a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn decode_pipe_list() {
        assert_eq!(
            decode(Some("|machine-learning|neural-networks|")),
            Some(vec![
                "machine-learning".to_string(),
                "neural-networks".to_string()
            ])
        );
    }

    #[test]
    fn decode_ignores_unterminated_brackets() {
        assert_eq!(decode(Some("<a>< b")), Some(vec!["a".to_string()]));
        assert_eq!(decode(Some("no-brackets")), None);
    }

    #[test]
    fn decode_keeps_empty_brackets() {
        assert_eq!(
            decode(Some("<a><>")),
            Some(vec!["a".to_string(), String::new()])
        );
        assert_eq!(decode(Some("<>")), Some(vec![String::new()]));
    }

    #[test]
    fn decode_multibyte_tags() {
        assert_eq!(
            decode(Some("<日本語><c++>")),
            Some(vec!["日本語".to_string(), "c++".to_string()])
        );
    }

    #[test]
    fn decode_inverts_encode() {
        let cases: Vec<Vec<&str>> = vec![
            vec!["python"],
            vec!["python", "xml"],
            vec!["c#", ".net", "c#"],
            vec!["a b", "tag-with-dash", "ü"],
            vec!["a", ""],
            vec![""],
        ];
        for tags in cases {
            let encoded = encode(&tags);
            let decoded = decode(Some(&encoded)).unwrap();
            assert_eq!(decoded, tags);
        }
    }

    #[test]
    fn encode_empty() {
        assert_eq!(encode::<&str>(&[]), "");
    }
}
