// src/arrangement/naming.rs
//
// Split halves get ordinal suffixes on the parent's base name:
// A..Z, then "Z 2", "Z 3", ... The next free index is found by scanning
// sibling names sharing the same base.

/// 1-based ordinal -> "A".."Z", then "Z 2", "Z 3", ...
pub fn suffix(index: usize) -> String {
    if index <= 26 {
        ((b'@' + index as u8) as char).to_string()
    } else {
        format!("Z {}", index - 26)
    }
}

/// If `name` ends in a generated suffix, return `(base, index)`.
/// "Take B" -> ("Take", 2); "Take Z 3" -> ("Take", 29).
pub fn parse_suffix(name: &str) -> Option<(&str, usize)> {
    let (head, last) = name.rsplit_once(' ')?;
    if let Some(index) = letter_index(last) {
        return Some((head, index));
    }
    // "<base> <letter> <n>" form; only Z carries a numeric extension.
    let n: usize = last.parse().ok()?;
    let (base, letter) = head.rsplit_once(' ')?;
    let index = letter_index(letter)?;
    if letter == "Z" && n > 0 {
        Some((base, 26 + n))
    } else {
        Some((base, index))
    }
}

fn letter_index(token: &str) -> Option<usize> {
    let mut chars = token.chars();
    let c = chars.next()?;
    if chars.next().is_none() && c.is_ascii_uppercase() {
        Some((c as u8 - b'@') as usize)
    } else {
        None
    }
}

/// Suffix index of `name` relative to `base`, if `name` is "<base> <suffix>".
pub fn suffix_index_of(name: &str, base: &str) -> Option<usize> {
    let rest = name.strip_prefix(base)?.strip_prefix(' ')?;
    let (parsed_base, index) = parse_suffix(name)?;
    // Guard against a longer base swallowing part of the suffix.
    (parsed_base == base && !rest.is_empty()).then_some(index)
}

/// Names for the two halves of a split. A first-generation split takes the
/// next two free suffixes; splitting an already-suffixed clip keeps its own
/// name for the left half and allocates one new suffix for the right.
pub fn split_names<'a>(name: &str, siblings: impl Iterator<Item = &'a str>) -> (String, String) {
    let (base, is_child) = match parse_suffix(name) {
        Some((base, _)) => (base, true),
        None => (name, false),
    };

    let mut max_index = 0usize;
    for sibling in siblings {
        if let Some(index) = suffix_index_of(sibling, base) {
            max_index = max_index.max(index);
        }
    }

    if is_child {
        (name.to_string(), format!("{base} {}", suffix(max_index + 1)))
    } else {
        (
            format!("{base} {}", suffix((max_index + 1).max(1))),
            format!("{base} {}", suffix((max_index + 2).max(2))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_sequence() {
        assert_eq!(suffix(1), "A");
        assert_eq!(suffix(26), "Z");
        assert_eq!(suffix(27), "Z 1");
        assert_eq!(suffix(30), "Z 4");
    }

    #[test]
    fn parse_round_trips() {
        assert_eq!(parse_suffix("Take A"), Some(("Take", 1)));
        assert_eq!(parse_suffix("Take Z 3"), Some(("Take", 29)));
        assert_eq!(parse_suffix("Take"), None);
        assert_eq!(parse_suffix("lowercase a"), None);
    }

    #[test]
    fn first_split_allocates_a_and_b() {
        let siblings: Vec<&str> = vec!["Guitar"];
        let (l, r) = split_names("Guitar", siblings.into_iter());
        assert_eq!(l, "Guitar A");
        assert_eq!(r, "Guitar B");
    }

    #[test]
    fn child_split_keeps_left_name() {
        let siblings = vec!["Guitar A", "Guitar B"];
        let (l, r) = split_names("Guitar B", siblings.into_iter());
        assert_eq!(l, "Guitar B");
        assert_eq!(r, "Guitar C");
    }

    #[test]
    fn beyond_z_uses_numbers() {
        let names: Vec<String> = (1..=26).map(|i| format!("Take {}", suffix(i))).collect();
        let (l, r) = split_names("Take Z", names.iter().map(|s| s.as_str()));
        assert_eq!(l, "Take Z");
        assert_eq!(r, "Take Z 1");
    }
}
