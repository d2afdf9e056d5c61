//! LIKE, GLOB and REGEXP matching.

use std::cell::RefCell;
use std::collections::HashMap;

use regex::Regex;

/// Most distinct REGEXP patterns kept compiled per thread.
const REGEX_CACHE_CAPACITY: usize = 64;

thread_local! {
    /// Compiled REGEXP patterns; `None` records a pattern that failed to compile.
    static REGEX_CACHE: RefCell<HashMap<String, Option<Regex>>> = RefCell::new(HashMap::new());
}

/// One pattern element. Every `Atom` consumes exactly one character.
#[derive(Debug)]
enum Token<A> {
    /// Zero or more characters.
    Star,
    /// Exactly one character.
    One,
    Atom(A),
}

/// Wildcard matching with a single backtrack point: on a mismatch the last
/// star absorbs one more character. Quadratic at worst.
fn wildcard_match<A>(
    tokens: &[Token<A>],
    text: &[char],
    atom_matches: impl Fn(&A, char) -> bool,
) -> bool {
    let (mut p, mut t) = (0, 0);
    // Token after the last star, and the text position that star resumes from.
    let mut resume: Option<(usize, usize)> = None;
    while t < text.len() {
        match tokens.get(p) {
            Some(Token::Star) => {
                p += 1;
                resume = Some((p, t));
                continue;
            }
            Some(Token::One) => {
                p += 1;
                t += 1;
                continue;
            }
            Some(Token::Atom(atom)) if atom_matches(atom, text[t]) => {
                p += 1;
                t += 1;
                continue;
            }
            _ => {}
        }
        let Some((after_star, from)) = resume else {
            return false;
        };
        p = after_star;
        t = from + 1;
        resume = Some((after_star, t));
    }
    tokens[p..].iter().all(|token| matches!(token, Token::Star))
}

/// Match a string against a SQL LIKE pattern.
///
/// - `%` matches zero or more characters.
/// - `_` matches exactly one character.
/// - Case-insensitive for ASCII A-Z only.
/// - `escape` optionally specifies the escape character for literal `%`/`_`.
///
/// A pattern ending in a lone escape character matches nothing.
pub fn like(pattern: &str, text: &str, escape: Option<char>) -> bool {
    let Some(tokens) = like_tokens(pattern, escape) else {
        return false;
    };
    let text: Vec<char> = text.chars().collect();
    wildcard_match(&tokens, &text, |&p, c| ascii_ci_eq(p, c))
}

fn like_tokens(pattern: &str, escape: Option<char>) -> Option<Vec<Token<char>>> {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        let token = if Some(c) == escape {
            Token::Atom(chars.next()?)
        } else {
            match c {
                '%' => Token::Star,
                '_' => Token::One,
                _ => Token::Atom(c),
            }
        };
        tokens.push(token);
    }
    Some(tokens)
}

fn ascii_ci_eq(a: char, b: char) -> bool {
    a == b || (a.is_ascii() && b.is_ascii() && a.eq_ignore_ascii_case(&b))
}

/// A literal or a bracketed character class in a GLOB pattern.
#[derive(Debug)]
enum GlobAtom {
    Literal(char),
    Class { negate: bool, ranges: Vec<(char, char)> },
}

impl GlobAtom {
    fn matches(&self, c: char) -> bool {
        match self {
            Self::Literal(l) => *l == c,
            Self::Class { negate, ranges } => {
                ranges.iter().any(|&(lo, hi)| lo <= c && c <= hi) != *negate
            }
        }
    }
}

/// GLOB pattern matching (case-sensitive; `*`, `?` and `[...]` classes).
///
/// A class may start with `^` to negate it and with `]` to include a literal
/// bracket. A pattern with an unterminated class matches nothing.
pub fn glob(pattern: &str, text: &str) -> bool {
    let Some(tokens) = glob_tokens(pattern) else {
        return false;
    };
    let text: Vec<char> = text.chars().collect();
    wildcard_match(&tokens, &text, GlobAtom::matches)
}

fn glob_tokens(pattern: &str) -> Option<Vec<Token<GlobAtom>>> {
    let pat: Vec<char> = pattern.chars().collect();
    let mut tokens = Vec::new();
    let mut pi = 0;
    while pi < pat.len() {
        let token = match pat[pi] {
            '*' => Token::Star,
            '?' => Token::One,
            '[' => {
                pi += 1;
                let negate = pat.get(pi) == Some(&'^');
                if negate {
                    pi += 1;
                }
                let mut ranges = Vec::new();
                let mut first = true;
                while pi < pat.len() && (first || pat[pi] != ']') {
                    first = false;
                    if pi + 2 < pat.len() && pat[pi + 1] == '-' && pat[pi + 2] != ']' {
                        ranges.push((pat[pi], pat[pi + 2]));
                        pi += 3;
                    } else {
                        ranges.push((pat[pi], pat[pi]));
                        pi += 1;
                    }
                }
                if pi >= pat.len() {
                    return None;
                }
                Token::Atom(GlobAtom::Class { negate, ranges })
            }
            c => Token::Atom(GlobAtom::Literal(c)),
        };
        tokens.push(token);
        pi += 1;
    }
    Some(tokens)
}

/// `text REGEXP pattern`: unanchored regular-expression search.
///
/// Returns `None` when the pattern does not compile. Compiled patterns are
/// cached per thread, so a pattern is compiled once per statement rather
/// than once per row.
pub fn regexp(pattern: &str, text: &str) -> Option<bool> {
    compiled(pattern).map(|re| re.is_match(text))
}

fn compiled(pattern: &str) -> Option<Regex> {
    REGEX_CACHE.with(|cache| {
        if let Some(hit) = cache.borrow().get(pattern) {
            return hit.clone();
        }
        let re = Regex::new(pattern).ok();
        let mut cache = cache.borrow_mut();
        if cache.len() >= REGEX_CACHE_CAPACITY {
            cache.clear();
        }
        cache.insert(pattern.to_owned(), re.clone());
        re
    })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn like_wildcards_and_case() {
        assert!(like("b%", "Bar", None));
        assert!(like("_ar", "bar", None));
        assert!(like("%", "", None));
        assert!(!like("_", "", None));
        assert!(like("%o%", "Four", None));
        assert!(!like("b%", "Four", None));
    }

    #[test]
    fn like_escape() {
        assert!(like("100\\%", "100%", Some('\\')));
        assert!(!like("100\\%", "1000", Some('\\')));
        assert!(!like("abc\\", "abc", Some('\\')));
    }

    #[test]
    fn like_unicode_is_case_sensitive() {
        assert!(!like("ä", "Ä", None));
        assert!(like("ä", "ä", None));
    }

    #[test]
    fn glob_basics() {
        assert!(glob("T*", "Three"));
        assert!(!glob("t*", "Three"));
        assert!(glob("F?ur", "Four"));
        assert!(glob("[A-F]*", "Four"));
        assert!(!glob("[^A-F]*", "Four"));
        assert!(glob("*", ""));
        assert!(!glob("[abc", "a"));
    }

    #[test]
    fn regexp_search() {
        assert_eq!(regexp("^Th", "Three"), Some(true));
        assert_eq!(regexp("our$", "Three"), Some(false));
        assert_eq!(regexp("(", "Three"), None);
    }

    fn cached_patterns() -> usize {
        REGEX_CACHE.with(|cache| cache.borrow().len())
    }

    #[test]
    fn regexp_compiles_each_pattern_once() {
        let before = cached_patterns();
        for text in ["abbc", "ac", "xabcx", "abd"] {
            regexp("ab+c", text);
        }
        assert_eq!(cached_patterns(), before + 1);
        assert_eq!(regexp("ab+c", "zabbbc"), Some(true));
        assert_eq!(regexp("ab+c", "ac"), Some(false));
        regexp("[unclosed", "x");
        regexp("[unclosed", "y");
        assert_eq!(cached_patterns(), before + 2);
        assert_eq!(regexp("[unclosed", "z"), None);
    }

    #[test]
    fn regexp_cache_is_bounded() {
        for i in 0..REGEX_CACHE_CAPACITY * 2 {
            assert_eq!(regexp(&format!("^n{i}$"), &format!("n{i}")), Some(true));
        }
        assert!(cached_patterns() <= REGEX_CACHE_CAPACITY);
    }

    #[test]
    fn many_wildcards_fail_fast() {
        let text = "a".repeat(500);
        assert!(!like("%a%a%a%a%a%a%a%a%b", &text, None));
        assert!(like("%a%a%a%a%a%a%a%a%", &text, None));
        assert!(!glob("*a*a*a*a*a*a*a*a*b", &text));
        assert!(glob("*a*a*a*a*a*a*a*a", &text));
    }

    #[test]
    fn stars_backtrack_past_partial_matches() {
        assert!(like("%abc", "ababc", None));
        assert!(like("a%b%c", "aXbYbZc", None));
        assert!(!like("a%b%c", "aXbYcZ", None));
        assert!(like("%\\%%", "50% off", Some('\\')));
        assert!(!like("%\\%%", "50 off", Some('\\')));
        assert!(glob("*[0-9]", "ab12"));
        assert!(!glob("*[0-9]x", "ab12"));
        assert!(glob("[]]*", "]x"));
        assert!(glob("*.rs", "main.rs"));
        assert!(!glob("*.rs", "main.rsx"));
    }

    /// Translate a LIKE pattern over `a`, `b`, `%` and `_` into a regex.
    fn like_as_regex(pattern: &str) -> Regex {
        let body: String = pattern
            .chars()
            .map(|c| match c {
                '%' => "(?s:.*)".to_owned(),
                '_' => "(?s:.)".to_owned(),
                c => format!("(?i:{c})"),
            })
            .collect();
        Regex::new(&format!("^{body}$")).unwrap()
    }

    proptest! {
        #[test]
        fn prop_like_agrees_with_regex(pattern in "[ab%_]{0,8}", text in "[abAB]{0,10}") {
            prop_assert_eq!(like(&pattern, &text, None), like_as_regex(&pattern).is_match(&text));
        }

        #[test]
        fn prop_glob_agrees_with_like_on_shared_syntax(
            pattern in "[ab*?]{0,8}",
            text in "[ab]{0,10}",
        ) {
            let translated: String = pattern
                .chars()
                .map(|c| match c {
                    '*' => '%',
                    '?' => '_',
                    c => c,
                })
                .collect();
            prop_assert_eq!(glob(&pattern, &text), like(&translated, &text, None));
        }
    }
}
