//! Trie-based wildcard matching.
//!
//! Patterns are inserted one character per node. A `*` becomes a glob node
//! that may absorb any number of candidate characters (including none) before
//! matching continues with its children; a `?` (when enabled) becomes a
//! single-char edge that consumes exactly one arbitrary character. Nothing
//! else is special: matching is case-sensitive and `/` is an ordinary
//! character.
//!
//! Matching is a backtracking descent with failure memoisation keyed by
//! `(node, position)`, so adjacent wildcards (`**`, `*?`, `?*`) cannot blow up
//! the search.

use std::collections::{HashMap, HashSet};

const GLOB_WILDCARD: char = '*';
const SINGLE_CHAR_WILDCARD: char = '?';

/// Which wildcard characters are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatchOptions {
    /// Treat `?` as "exactly one character" instead of a literal `?`.
    pub single_char_wildcard: bool,
}

impl MatchOptions {
    /// `*` only; `?` is literal.
    pub const fn glob_only() -> Self {
        Self {
            single_char_wildcard: false,
        }
    }

    /// `*` and `?`.
    pub const fn with_single_char_wildcard() -> Self {
        Self {
            single_char_wildcard: true,
        }
    }
}

#[derive(Debug, Default)]
struct TrieNode {
    terminal: bool,
    /// Set on nodes reached through a `*`: they may absorb input.
    glob: bool,
    children: HashMap<char, TrieNode>,
    glob_child: Option<Box<TrieNode>>,
    single_child: Option<Box<TrieNode>>,
}

impl TrieNode {
    fn glob_node() -> Self {
        Self {
            glob: true,
            ..Self::default()
        }
    }
}

/// Set of wildcard patterns; matches a candidate if any pattern does.
#[derive(Debug, Default)]
pub struct WildcardTrie {
    options: MatchOptions,
    root: TrieNode,
}

impl WildcardTrie {
    /// An empty trie interpreting wildcards per `options`. It matches
    /// nothing until a pattern is added.
    pub fn new(options: MatchOptions) -> Self {
        Self {
            options,
            root: TrieNode::default(),
        }
    }

    /// Builder-style [`WildcardTrie::add`].
    pub fn with_pattern(mut self, pattern: &str) -> Self {
        self.add(pattern);
        self
    }

    /// Insert `pattern`. Every string is a valid pattern; the empty pattern
    /// matches only the empty string.
    pub fn add(&mut self, pattern: &str) {
        let single = self.options.single_char_wildcard;
        let mut node = &mut self.root;
        for c in pattern.chars() {
            node = if c == GLOB_WILDCARD {
                if node.glob {
                    // `**` behaves like `*`
                    node
                } else {
                    &mut **node
                        .glob_child
                        .get_or_insert_with(|| Box::new(TrieNode::glob_node()))
                }
            } else if single && c == SINGLE_CHAR_WILDCARD {
                &mut **node.single_child.get_or_insert_with(Box::default)
            } else {
                node.children.entry(c).or_default()
            };
        }
        node.terminal = true;
    }

    /// Whether `candidate` matches any pattern in the trie.
    ///
    /// The whole candidate must be consumed: `a*` matches `abc` but `a?`
    /// does not. An empty trie matches nothing.
    ///
    /// ```
    /// use clientauth_authorization::wildcard::{MatchOptions, WildcardTrie};
    ///
    /// let trie = WildcardTrie::new(MatchOptions::glob_only()).with_pattern("lamp-*");
    /// assert!(trie.matches("lamp-kitchen"));
    /// assert!(!trie.matches("fan"));
    /// ```
    pub fn matches(&self, candidate: &str) -> bool {
        let chars: Vec<char> = candidate.chars().collect();
        let mut matcher = Matcher {
            input: &chars,
            failed: HashSet::new(),
        };
        matcher.at(&self.root, 0)
    }
}

struct Matcher<'a> {
    input: &'a [char],
    failed: HashSet<(usize, usize)>,
}

impl Matcher<'_> {
    /// Whether the input from `pos` on is accepted starting at `node`.
    fn at(&mut self, node: &TrieNode, pos: usize) -> bool {
        let key = (node as *const TrieNode as usize, pos);
        if self.failed.contains(&key) {
            return false;
        }

        let matched = if node.glob {
            (pos..=self.input.len()).any(|start| self.step(node, start))
        } else {
            self.step(node, pos)
        };

        if !matched {
            self.failed.insert(key);
        }
        matched
    }

    /// Leave `node` through one of its edges with the input at `pos`.
    fn step(&mut self, node: &TrieNode, pos: usize) -> bool {
        if pos == self.input.len() {
            if node.terminal {
                return true;
            }
            // Only a glob can still match the empty remainder
            return match &node.glob_child {
                Some(glob) => self.at(glob, pos),
                None => false,
            };
        }

        if let Some(child) = node.children.get(&self.input[pos]) {
            if self.at(child, pos + 1) {
                return true;
            }
        }
        if let Some(single) = &node.single_child {
            if self.at(single, pos + 1) {
                return true;
            }
        }
        if let Some(glob) = &node.glob_child {
            if self.at(glob, pos) {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trie(pattern: &str) -> WildcardTrie {
        WildcardTrie::new(MatchOptions::with_single_char_wildcard()).with_pattern(pattern)
    }

    fn assert_matches_all(pattern: &str, candidates: &[&str]) {
        let trie = trie(pattern);
        for candidate in candidates {
            assert!(
                trie.matches(candidate),
                "\"{candidate}\" did not match the pattern \"{pattern}\""
            );
        }
    }

    fn assert_matches_none(pattern: &str, candidates: &[&str]) {
        let trie = trie(pattern);
        for candidate in candidates {
            assert!(
                !trie.matches(candidate),
                "\"{candidate}\" incorrectly matched the pattern \"{pattern}\""
            );
        }
    }

    #[test]
    fn literal_patterns() {
        assert_matches_all("foo", &["foo"]);
        assert_matches_all("foo/bar", &["foo/bar"]);
        assert_matches_none("foo", &["bar", "fo", "foox", "Foo"]);
        assert_matches_none("foo/bar", &["bar/foo"]);
    }

    #[test]
    fn glob_wildcard() {
        assert_matches_all(
            "*",
            &["", "foo", "foo/bar", "foo/bar/baz", "$foo/bar", "foo*", "foo?", "***", "???"],
        );
        assert_matches_all("*test", &["test", "*test", "**test", "testtest", "test*test"]);
        assert_matches_all("test*", &["test", "test*", "testA", "test**"]);
        assert_matches_all("test*test", &["testtest", "testAtest", "test*test"]);
        assert_matches_all("test*test*", &["testtest", "testtesttesttest", "test*test*"]);
        assert_matches_all(
            "*test*test",
            &["Atesttest", "testAtest", "AtestAtest", "testtest", "*test*test"],
        );
        assert_matches_all(
            "*test*test*",
            &["testtest", "Atesttest", "testAtest", "testtestA", "AtestAtestA"],
        );
    }

    #[test]
    fn glob_wildcard_rejections() {
        assert_matches_none("*test", &["testA", "*testA", "AtestA", "bar"]);
        assert_matches_none("test*", &["Atest", "Atest*", "AtestA", "bar"]);
        assert_matches_none("test*test", &["Atesttest", "testAtestA", "testbar"]);
        assert_matches_none("*test*test", &["AtestAtestA", "test*bar", "bartest"]);
        assert_matches_none("*test*test*", &["AtestAbar", "testbar", "bartest"]);
    }

    #[test]
    fn single_char_wildcard() {
        assert_matches_all("?", &["f", "*", "?"]);
        assert_matches_all("??", &["ff", "**", "??", "*?"]);
        assert_matches_all("?f?", &["fff", "*f*"]);
        assert_matches_all("a?b", &["acb"]);

        assert_matches_none("?", &["", "aa", "??"]);
        assert_matches_none("??", &["a", "aaa", "???"]);
        assert_matches_none("?f?", &["ff", "f", "*f", "f*"]);
        assert_matches_none("a?b", &["ab"]);
    }

    #[test]
    fn adjacent_wildcards() {
        for pattern in ["?*", "*?", "*?*"] {
            assert_matches_all(pattern, &["?", "*", "a", "ab", "***", "abc"]);
            assert_matches_none(pattern, &[""]);
        }
        assert_matches_all("?*?", &["??", "aa", "aaa", "aaaa"]);
        assert_matches_none("?*?", &["a", "?", "*"]);
        assert_matches_all("**", &["", "anything"]);

        for pattern in ["a?*b", "a*?b"] {
            assert_matches_all(pattern, &["acb", "a?b", "a*b", "a?cb"]);
            assert_matches_none(pattern, &["ab", "abc"]);
        }
    }

    #[test]
    fn empty_pattern_only_matches_empty_string() {
        assert_matches_all("", &[""]);
        assert_matches_none("", &["a", "*"]);
    }

    #[test]
    fn question_mark_is_literal_without_single_char_mode() {
        let trie = WildcardTrie::new(MatchOptions::glob_only()).with_pattern("a?b");
        assert!(trie.matches("a?b"));
        assert!(!trie.matches("acb"));
    }

    #[test]
    fn any_pattern_in_the_set_matches() {
        let mut trie = WildcardTrie::new(MatchOptions::glob_only());
        trie.add("mqtt:topic:a/*");
        trie.add("mqtt:topic:b");

        assert!(trie.matches("mqtt:topic:a/x/y"));
        assert!(trie.matches("mqtt:topic:b"));
        assert!(!trie.matches("mqtt:topic:bb"));
    }

    #[test]
    fn pathological_pattern_terminates() {
        let pattern = "*a".repeat(20) + "b";
        let candidate = "a".repeat(60);
        assert!(!trie(&pattern).matches(&candidate));
    }

    #[test]
    fn non_ascii_characters_are_single_characters() {
        assert_matches_all("?ü*", &["äü", "äüß"]);
        assert_matches_none("?ü", &["ü"]);
    }
}
