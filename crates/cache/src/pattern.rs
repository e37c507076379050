//! Glob matching for `delete_pattern`, mirroring Redis `SCAN MATCH`.
//!
//! Supported syntax: `*` (any run, including none), `?` (one byte),
//! `[abc]`, `[a-z]` and `[^a]` classes, and `\` to escape the next byte.

/// Escapes the glob metacharacters in `literal` so it matches only itself.
pub fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Returns true if `key` matches `pattern`.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let pattern = pattern.as_bytes();
    let key = key.as_bytes();
    let (mut p, mut k) = (0, 0);
    let mut star: Option<usize> = None;
    let mut resume = 0;

    while k < key.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            star = Some(p);
            resume = k;
            p += 1;
        } else if let Some(next) = match_one(pattern, p, key[k]) {
            p = next;
            k += 1;
        } else if let Some(s) = star {
            p = s + 1;
            resume += 1;
            k = resume;
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}

/// Matches one key byte against the token at `pattern[p]` and returns the
/// index after that token.
fn match_one(pattern: &[u8], p: usize, byte: u8) -> Option<usize> {
    match *pattern.get(p)? {
        b'?' => Some(p + 1),
        b'\\' if p + 1 < pattern.len() => (pattern[p + 1] == byte).then_some(p + 2),
        b'[' => match_class(pattern, p + 1, byte),
        literal => (literal == byte).then_some(p + 1),
    }
}

/// Matches `byte` against a `[...]` class starting after the `[`. An
/// unterminated class matches nothing.
fn match_class(pattern: &[u8], mut i: usize, byte: u8) -> Option<usize> {
    let negate = pattern.get(i) == Some(&b'^');
    if negate {
        i += 1;
    }

    let mut matched = false;
    while i < pattern.len() && pattern[i] != b']' {
        if pattern[i] == b'\\' && i + 1 < pattern.len() {
            matched |= pattern[i + 1] == byte;
            i += 2;
        } else if i + 2 < pattern.len() && pattern[i + 1] == b'-' && pattern[i + 2] != b']' {
            let (lo, hi) = if pattern[i] <= pattern[i + 2] {
                (pattern[i], pattern[i + 2])
            } else {
                (pattern[i + 2], pattern[i])
            };
            matched |= (lo..=hi).contains(&byte);
            i += 3;
        } else {
            matched |= pattern[i] == byte;
            i += 1;
        }
    }

    if i >= pattern.len() {
        return None;
    }
    (matched != negate).then_some(i + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_patterns() {
        assert!(glob_match("order:1", "order:1"));
        assert!(!glob_match("order:1", "order:12"));
    }

    #[test]
    fn trailing_star() {
        assert!(glob_match("orders:user:u1:*", "orders:user:u1:page:1:size:10"));
        assert!(!glob_match("orders:user:u1:*", "orders:user:u10"));
        assert!(glob_match("orders:user:u1:*", "orders:user:u1:"));
    }

    #[test]
    fn inner_stars() {
        assert!(glob_match("orders:*:page:*", "orders:user:u1:page:2"));
        assert!(!glob_match("orders:*:page:*", "orders:user:u1:size:2"));
        assert!(glob_match("*", ""));
    }

    #[test]
    fn question_mark_matches_one_byte() {
        assert!(glob_match("order:?", "order:7"));
        assert!(!glob_match("order:?", "order:"));
        assert!(!glob_match("order:?", "order:77"));
    }

    #[test]
    fn character_classes() {
        assert!(glob_match("u[12]:*", "u2:page"));
        assert!(!glob_match("u[12]:*", "u3:page"));
        assert!(glob_match("u[a-c]", "ub"));
        assert!(glob_match("u[c-a]", "ub"));
        assert!(glob_match("u[^a]", "ub"));
        assert!(!glob_match("u[^a]", "ua"));
        assert!(!glob_match("u[ab", "ua"));
    }

    #[test]
    fn backslash_escapes_metacharacters() {
        assert!(glob_match(r"a\*b", "a*b"));
        assert!(!glob_match(r"a\*b", "axxb"));
        assert!(glob_match(r"a\?", "a?"));
        assert!(!glob_match(r"a\?", "ab"));
        assert!(glob_match(r"\[x\]", "[x]"));
    }

    #[test]
    fn escaped_literal_matches_only_itself() {
        for literal in ["a?b", "[1]", "x*y", r"back\slash", "plain"] {
            let pattern = format!("{}:*", escape_glob(literal));
            assert!(glob_match(&pattern, &format!("{literal}:page:1")), "{literal}");
        }
        let pattern = format!("{}:*", escape_glob("a?b"));
        assert!(!glob_match(&pattern, "axb:page:1"));
        assert_eq!(escape_glob("u[1]*"), r"u\[1\]\*");
    }
}
