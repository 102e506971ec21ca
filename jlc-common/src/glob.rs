//! Test-match glob patterns.
//!
//! Jest `testMatch` entries use the micromatch dialect, including extglobs
//! such as `?(*.)+(spec|test)`. Patterns are translated to anchored regexes
//! once and then matched against bare instance names.
//!
//! Supported syntax:
//!
//! | Pattern     | Meaning                                      |
//! |-------------|----------------------------------------------|
//! | `*`         | any run of characters except `/`             |
//! | `**`        | any run of characters including `/`          |
//! | `**/`       | zero or more leading directories             |
//! | `/**`       | optional trailing directories (at the end)   |
//! | `?`         | one character except `/`                     |
//! | `[a-z]`     | character class, `[!..]` / `[^..]` negates   |
//! | `{a,b}`     | alternation                                  |
//! | `?(a\|b)`   | zero or one occurrence                       |
//! | `*(a\|b)`   | zero or more occurrences                     |
//! | `+(a\|b)`   | one or more occurrences                      |
//! | `@(a\|b)`   | exactly one occurrence                       |

use regex::Regex;
use thiserror::Error;

/// Errors produced while compiling a glob pattern.
#[derive(Debug, Error)]
pub enum GlobError {
    /// `!(..)` needs look-around, which the regex engine does not offer.
    #[error("Negated extglob is not supported in pattern '{pattern}'")]
    NegatedExtglob { pattern: String },

    /// The translated pattern was rejected by the regex engine.
    #[error("Invalid glob pattern '{pattern}': {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A single compiled glob.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    raw: String,
    regex: Regex,
}

impl GlobPattern {
    /// Compile a micromatch-style glob.
    pub fn new(pattern: &str) -> Result<Self, GlobError> {
        let chars: Vec<char> = pattern.chars().collect();
        let body = translate(&chars, pattern)?;
        let regex = Regex::new(&format!("^(?:{body})$")).map_err(|source| GlobError::Regex {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            raw: pattern.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_match(&self, candidate: &str) -> bool {
        self.regex.is_match(candidate)
    }
}

/// A set of globs; a name matches when any member matches.
#[derive(Debug, Clone, Default)]
pub struct TestMatcher {
    patterns: Vec<GlobPattern>,
}

impl TestMatcher {
    pub fn new<I, S>(patterns: I) -> Result<Self, GlobError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|pattern| GlobPattern::new(pattern.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.is_match(name))
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(GlobPattern::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

fn translate(chars: &[char], pattern: &str) -> Result<String, GlobError> {
    let mut out = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match c {
            '\\' => {
                match next {
                    Some(escaped) => push_literal(&mut out, escaped),
                    None => push_literal(&mut out, '\\'),
                }
                i += 2;
            }
            '/' if is_trailing_globstar(&chars[i + 1..]) => {
                out.push_str("(?:/.*)?");
                i = chars.len();
            }
            '*' if next == Some('*') => {
                let segment_start = i == 0 || chars[i - 1] == '/';
                if segment_start && chars.get(i + 2) == Some(&'/') {
                    out.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
            }
            '*' | '?' | '+' | '@' | '!' if next == Some('(') => {
                let Some(close) = find_close(chars, i + 1, '(', ')') else {
                    push_literal(&mut out, c);
                    i += 1;
                    continue;
                };
                let quantifier = match c {
                    '*' => "*",
                    '?' => "?",
                    '+' => "+",
                    '@' => "",
                    _ => {
                        return Err(GlobError::NegatedExtglob {
                            pattern: pattern.to_string(),
                        });
                    }
                };
                let alternatives = split_top_level(&chars[i + 2..close], '|')
                    .into_iter()
                    .map(|alt| translate(alt, pattern))
                    .collect::<Result<Vec<_>, _>>()?;
                out.push_str(&format!("(?:{}){quantifier}", alternatives.join("|")));
                i = close + 1;
            }
            '*' => {
                out.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                out.push_str("[^/]");
                i += 1;
            }
            '[' => match find_class_end(chars, i) {
                Some(end) => {
                    push_class(&mut out, &chars[i + 1..end]);
                    i = end + 1;
                }
                None => {
                    push_literal(&mut out, '[');
                    i += 1;
                }
            },
            '{' => match find_close(chars, i, '{', '}') {
                Some(close) => {
                    let alternatives = split_top_level(&chars[i + 1..close], ',');
                    if alternatives.len() > 1 {
                        let translated = alternatives
                            .into_iter()
                            .map(|alt| translate(alt, pattern))
                            .collect::<Result<Vec<_>, _>>()?;
                        out.push_str(&format!("(?:{})", translated.join("|")));
                    } else {
                        // `{a}` is not an alternation; keep the braces literally.
                        push_literal(&mut out, '{');
                        out.push_str(&translate(&chars[i + 1..close], pattern)?);
                        push_literal(&mut out, '}');
                    }
                    i = close + 1;
                }
                None => {
                    push_literal(&mut out, '{');
                    i += 1;
                }
            },
            _ => {
                push_literal(&mut out, c);
                i += 1;
            }
        }
    }

    Ok(out)
}

fn push_literal(out: &mut String, c: char) {
    out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4])));
}

/// `rest` follows a `/`: true when it is `**` or `**/*` up to the end.
fn is_trailing_globstar(rest: &[char]) -> bool {
    rest == ['*', '*'] || rest == ['*', '*', '/', '*']
}

/// Index of the delimiter closing the group opened at `open_at`.
fn find_close(chars: &[char], open_at: usize, open: char, close: char) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = open_at;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Index of the `]` closing the class opened at `open_at`.
fn find_class_end(chars: &[char], open_at: usize) -> Option<usize> {
    let mut i = open_at + 1;
    if matches!(chars.get(i), Some('!' | '^')) {
        i += 1;
    }
    // A leading `]` is a member, not the terminator.
    if chars.get(i) == Some(&']') {
        i += 1;
    }
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            ']' => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

fn push_class(out: &mut String, members: &[char]) {
    out.push('[');
    let mut i = 0;
    if matches!(members.first(), Some('!' | '^')) {
        out.push('^');
        i = 1;
    }
    let start = i;
    while i < members.len() {
        let c = members[i];
        if c == '\\' && i + 1 < members.len() {
            push_class_member(out, members[i + 1]);
            i += 2;
            continue;
        }
        if c == '-' && i > start && i + 1 < members.len() {
            out.push('-');
        } else {
            push_class_member(out, c);
        }
        i += 1;
    }
    out.push(']');
}

fn push_class_member(out: &mut String, c: char) {
    if matches!(c, '[' | ']' | '\\' | '^' | '-' | '&' | '~') {
        out.push('\\');
    }
    out.push(c);
}

/// Split on `separator` where it is not nested inside a group or class.
fn split_top_level(chars: &[char], separator: char) -> Vec<&[char]> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '(' | '{' | '[' => depth += 1,
            ')' | '}' | ']' => depth = depth.saturating_sub(1),
            c if c == separator && depth == 0 => {
                parts.push(&chars[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&chars[start.min(chars.len())..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn matches(pattern: &str, name: &str) -> bool {
        GlobPattern::new(pattern).unwrap().is_match(name)
    }

    #[test]
    fn test_default_spec_pattern() {
        let pattern = "**/?(*.)+(spec|test)";
        assert!(matches(pattern, "util.spec"));
        assert!(matches(pattern, "util.test"));
        assert!(matches(pattern, "spec"));
        assert!(matches(pattern, "deep/nested/util.spec"));
        assert!(matches(pattern, "a.b.spec"));
        assert!(!matches(pattern, "util"));
        assert!(!matches(pattern, "util.spec.lua"));
        assert!(!matches(pattern, "util.specs"));
    }

    #[test]
    fn test_default_tests_dir_pattern() {
        let pattern = "**/__tests__/**/*";
        assert!(matches(pattern, "__tests__"));
        assert!(matches(pattern, "__tests__/foo"));
        assert!(matches(pattern, "src/__tests__/foo"));
        assert!(!matches(pattern, "tests"));
        assert!(!matches(pattern, "__tests__foo"));
    }

    #[test]
    fn test_star_does_not_cross_separator() {
        assert!(matches("*.spec", "foo.spec"));
        assert!(!matches("*.spec", "dir/foo.spec"));
        assert!(matches("**.spec", "dir/foo.spec"));
    }

    #[test]
    fn test_question_mark() {
        assert!(matches("a?c", "abc"));
        assert!(!matches("a?c", "ac"));
        assert!(!matches("a?c", "a/c"));
    }

    #[test]
    fn test_character_classes() {
        assert!(matches("file[0-9]", "file7"));
        assert!(!matches("file[0-9]", "filex"));
        assert!(matches("file[!0-9]", "filex"));
        assert!(matches("file[^0-9]", "filex"));
        assert!(!matches("file[!0-9]", "file3"));
        assert!(matches("a[]]b", "a]b"));
        assert!(matches("a[-x]b", "a-b"));
    }

    #[test]
    fn test_braces() {
        assert!(matches("*.{spec,test}", "a.spec"));
        assert!(matches("*.{spec,test}", "a.test"));
        assert!(!matches("*.{spec,test}", "a.story"));
        assert!(matches("{a}", "{a}"));
        assert!(matches("a{b", "a{b"));
    }

    #[test]
    fn test_extglobs() {
        assert!(matches("@(foo|bar).spec", "foo.spec"));
        assert!(!matches("@(foo|bar).spec", "foobar.spec"));
        assert!(matches("*(ab)c", "c"));
        assert!(matches("*(ab)c", "ababc"));
        assert!(matches("+(ab)c", "abc"));
        assert!(!matches("+(ab)c", "c"));
        assert!(matches("x?(y)", "x"));
        assert!(matches("x?(y)", "xy"));
    }

    #[test]
    fn test_negated_extglob_is_rejected() {
        let err = GlobPattern::new("!(foo)").unwrap_err();
        assert!(matches!(err, GlobError::NegatedExtglob { .. }));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        assert!(matches("a.b", "a.b"));
        assert!(!matches("a.b", "axb"));
        assert!(matches("a$b^c", "a$b^c"));
        assert!(matches(r"a\*b", "a*b"));
        assert!(!matches(r"a\*b", "axxb"));
    }

    #[test]
    fn test_matcher_any_semantics() {
        let matcher = TestMatcher::new(["*.spec", "*.test"]).unwrap();
        assert!(matcher.is_match("a.spec"));
        assert!(matcher.is_match("a.test"));
        assert!(!matcher.is_match("a.lua"));
        assert_eq!(matcher.patterns().count(), 2);

        let empty = TestMatcher::new(Vec::<String>::new()).unwrap();
        assert!(empty.is_empty());
        assert!(!empty.is_match("anything"));
    }

    proptest! {
        #[test]
        fn prop_literal_patterns_match_only_themselves(name in "[A-Za-z0-9_. $^+()|-]{1,16}", other in "[A-Za-z0-9_]{1,16}") {
            let escaped: String = name
                .chars()
                .flat_map(|c| {
                    if "*?[]{}()!+@\\".contains(c) {
                        vec!['\\', c]
                    } else {
                        vec![c]
                    }
                })
                .collect();
            let pattern = GlobPattern::new(&escaped).unwrap();
            prop_assert!(pattern.is_match(&name));
            if other != name {
                prop_assert!(!pattern.is_match(&other));
            }
        }
    }
}
