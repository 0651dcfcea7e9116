//! Selector parsing and resolution
//!
//! A selector addresses one location in a [`Tree`]:
//!
//! ```text
//! .                       root
//! .foo.bar                map keys
//! .foo."weird.key"        quoted key (may contain `.`)
//! .servers.[2].host       list index
//! ```
//!
//! The leading `.` is optional. Parsing produces [`Step`]s; resolving walks
//! a concrete tree and produces a [`Location`] whose steps match the actual
//! container kinds met on the way.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use crate::error::{Result, TreeError};
use crate::value::Tree;

/// One step of a selector or location
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Step {
    /// Map key, bare or quoted
    Key(String),
    /// List index, written `[n]`
    Index(usize),
}

impl Display for Step {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) if is_bare(key) => f.write_str(key),
            Self::Key(key) => write!(f, "\"{key}\""),
            Self::Index(index) => write!(f, "[{index}]"),
        }
    }
}

fn is_bare(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn write_steps(f: &mut Formatter<'_>, steps: &[Step]) -> fmt::Result {
    if steps.is_empty() {
        return f.write_str(".");
    }
    for step in steps {
        write!(f, ".{step}")?;
    }
    Ok(())
}

/// Parsed selector
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Selector {
    steps: Vec<Step>,
}

impl Selector {
    /// Selector for the document root
    #[inline]
    #[must_use]
    pub fn root() -> Self {
        Self { steps: Vec::new() }
    }

    /// Parse a selector string
    ///
    /// # Errors
    /// Returns `SelectorSyntax` for the empty string, empty segments,
    /// unterminated quotes, characters after a closing quote and malformed
    /// or non-numeric brackets
    pub fn parse(input: &str) -> Result<Self> {
        if input.is_empty() {
            return Err(TreeError::syntax(input, "empty selector"));
        }
        if input == "." {
            return Ok(Self::root());
        }

        let body = input.strip_prefix('.').unwrap_or(input);
        let chars: Vec<char> = body.chars().collect();
        let mut steps = Vec::new();
        let mut pos = 0;

        loop {
            let (step, next) = match chars.get(pos) {
                None | Some('.') => return Err(TreeError::syntax(input, "empty segment")),
                Some('"') => parse_quoted(input, &chars, pos)?,
                Some('[') => parse_index(input, &chars, pos)?,
                Some(_) => parse_bare(input, &chars, pos)?,
            };
            steps.push(step);

            match chars.get(next) {
                None => break,
                Some('.') => {
                    pos = next + 1;
                    if pos == chars.len() {
                        return Err(TreeError::syntax(input, "trailing `.`"));
                    }
                }
                Some(c) => {
                    return Err(TreeError::syntax(
                        input,
                        format!("unexpected `{c}` after segment"),
                    ))
                }
            }
        }

        Ok(Self { steps })
    }

    /// Parsed steps
    #[inline]
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Check if this selector denotes the root
    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of steps
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Same as [`is_root`](Self::is_root)
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

fn parse_quoted(input: &str, chars: &[char], start: usize) -> Result<(Step, usize)> {
    let close = chars[start + 1..]
        .iter()
        .position(|&c| c == '"')
        .ok_or_else(|| TreeError::syntax(input, "unterminated quote"))?;
    let end = start + 1 + close;
    let key: String = chars[start + 1..end].iter().collect();

    match chars.get(end + 1) {
        None | Some('.') => Ok((Step::Key(key), end + 1)),
        Some(_) => Err(TreeError::syntax(input, "characters after closing quote")),
    }
}

fn parse_index(input: &str, chars: &[char], start: usize) -> Result<(Step, usize)> {
    let close = chars[start + 1..]
        .iter()
        .position(|&c| c == ']')
        .ok_or_else(|| TreeError::syntax(input, "unclosed `[`"))?;
    let end = start + 1 + close;
    let digits: String = chars[start + 1..end].iter().collect();

    if digits.is_empty() {
        return Err(TreeError::syntax(input, "empty index"));
    }
    if digits.starts_with('-') {
        return Err(TreeError::syntax(input, format!("negative index `{digits}`")));
    }
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(TreeError::syntax(input, format!("non-numeric index `{digits}`")));
    }
    let index = digits
        .parse::<usize>()
        .map_err(|_| TreeError::syntax(input, format!("index `{digits}` out of range")))?;

    Ok((Step::Index(index), end + 1))
}

fn parse_bare(input: &str, chars: &[char], start: usize) -> Result<(Step, usize)> {
    let end = chars[start..]
        .iter()
        .position(|&c| c == '.')
        .map_or(chars.len(), |offset| start + offset);
    let key: String = chars[start..end].iter().collect();

    if key.contains('"') {
        return Err(TreeError::syntax(input, "quote inside bare segment"));
    }
    if key.contains('[') || key.contains(']') {
        return Err(TreeError::syntax(input, "malformed brackets"));
    }

    Ok((Step::Key(key), end))
}

impl FromStr for Selector {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Display for Selector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write_steps(f, &self.steps)
    }
}

/// Concrete path into a specific tree
///
/// Produced by [`resolve`]; each step matches the container kind actually
/// present, so `Key` always addresses a map and `Index` always a list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Location {
    steps: Vec<Step>,
}

impl Location {
    /// Location of the root
    #[inline]
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Concrete steps
    #[inline]
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Check if this is the root
    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write_steps(f, &self.steps)
    }
}

/// Walk `tree` along `selector`
///
/// A key step against a list is tried as a numeric index; an index step
/// against a map is tried as the key `"n"`.
///
/// # Errors
/// Returns `SelectorNotFound` at the first step without a matching child
pub fn resolve(tree: &Tree, selector: &Selector) -> Result<Location> {
    let mut current = tree;
    let mut steps = Vec::with_capacity(selector.len());

    for step in selector.steps() {
        let (child, concrete) = match (current, step) {
            (Tree::Map(map), Step::Key(key)) => (map.get(key), Step::Key(key.clone())),
            (Tree::Map(map), Step::Index(index)) => {
                let key = index.to_string();
                (map.get(&key), Step::Key(key))
            }
            (Tree::List(list), Step::Index(index)) => (list.get(*index), Step::Index(*index)),
            (Tree::List(list), Step::Key(key)) => match key.parse::<usize>() {
                Ok(index) => (list.get(index), Step::Index(index)),
                Err(_) => (None, Step::Key(key.clone())),
            },
            (_, other) => (None, other.clone()),
        };

        match child {
            Some(child) => {
                current = child;
                steps.push(concrete);
            }
            None => {
                return Err(TreeError::not_found(selector.to_string(), step.to_string()));
            }
        }
    }

    tracing::debug!(selector = %selector, depth = steps.len(), "resolved selector");
    Ok(Location { steps })
}

impl Tree {
    /// Follow a resolved location
    #[must_use]
    pub fn at(&self, location: &Location) -> Option<&Tree> {
        location
            .steps()
            .iter()
            .try_fold(self, |node, step| match (node, step) {
                (Tree::Map(map), Step::Key(key)) => map.get(key),
                (Tree::List(list), Step::Index(index)) => list.get(*index),
                _ => None,
            })
    }

    /// Follow a resolved location mutably
    pub fn at_mut(&mut self, location: &Location) -> Option<&mut Tree> {
        location
            .steps()
            .iter()
            .try_fold(self, |node, step| match (node, step) {
                (Tree::Map(map), Step::Key(key)) => map.get_mut(key),
                (Tree::List(list), Step::Index(index)) => list.get_mut(*index),
                _ => None,
            })
    }

    /// Parse, resolve and borrow in one go
    ///
    /// # Errors
    /// Returns selector syntax or lookup errors
    pub fn select(&self, selector: &str) -> Result<&Tree> {
        let parsed = Selector::parse(selector)?;
        let location = resolve(self, &parsed)?;
        self.at(&location)
            .ok_or_else(|| TreeError::not_found(selector, location.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(names: &[&str]) -> Vec<Step> {
        names.iter().map(|n| Step::Key((*n).to_string())).collect()
    }

    #[test]
    fn parse_root() {
        assert!(Selector::parse(".").unwrap().is_root());
    }

    #[test]
    fn parse_bare_keys() {
        let sel = Selector::parse(".foo.bar").unwrap();
        assert_eq!(sel.steps(), keys(&["foo", "bar"]).as_slice());
    }

    #[test]
    fn parse_without_leading_dot() {
        assert_eq!(
            Selector::parse("foo.bar").unwrap(),
            Selector::parse(".foo.bar").unwrap()
        );
    }

    #[test]
    fn parse_quoted_key() {
        let sel = Selector::parse(r#".foo."weird.key".bar"#).unwrap();
        assert_eq!(sel.steps(), keys(&["foo", "weird.key", "bar"]).as_slice());
    }

    #[test]
    fn parse_index() {
        let sel = Selector::parse(".foo.bar.[0]").unwrap();
        assert_eq!(sel.steps()[2], Step::Index(0));
    }

    #[test]
    fn parse_errors() {
        for bad in ["", "..", "a..b", "a.", r#"."open"#, r#"."a"b"#, ".[x]", ".[-1]", ".[]", ".[1", ".a[1]", r#".a"b"#] {
            let err = Selector::parse(bad).unwrap_err();
            assert!(
                matches!(err, TreeError::SelectorSyntax { .. }),
                "expected syntax error for {bad:?}"
            );
        }
    }

    #[test]
    fn display_canonical() {
        let sel: Selector = r#"foo."a b".[3]"#.parse().unwrap();
        assert_eq!(sel.to_string(), r#".foo."a b".[3]"#);
        assert_eq!(Selector::root().to_string(), ".");
    }

    #[test]
    fn resolve_nested_list() {
        let tree = Tree::from_yaml_str("foo:\n  bar:\n    - element1\n").unwrap();
        let sel = Selector::parse(".foo.bar.[0]").unwrap();
        let loc = resolve(&tree, &sel).unwrap();
        assert_eq!(tree.at(&loc), Some(&Tree::from("element1")));
    }

    #[test]
    fn resolve_key_against_list_uses_index() {
        let tree = Tree::from_yaml_str("items: [a, b]").unwrap();
        let sel = Selector::parse(".items.1").unwrap();
        let loc = resolve(&tree, &sel).unwrap();
        assert_eq!(loc.steps()[1], Step::Index(1));
        assert_eq!(tree.at(&loc), Some(&Tree::from("b")));
    }

    #[test]
    fn resolve_index_against_map_uses_key() {
        let tree = Tree::from_yaml_str("0: zero").unwrap();
        let loc = resolve(&tree, &Selector::parse(".[0]").unwrap()).unwrap();
        assert_eq!(loc.steps(), &[Step::Key("0".to_string())]);
    }

    #[test]
    fn resolve_missing_step() {
        let tree = Tree::from_yaml_str("foo: {bar: 1}").unwrap();
        let err = resolve(&tree, &Selector::parse(".foo.baz.qux").unwrap()).unwrap_err();
        assert_eq!(err, TreeError::not_found(".foo.baz.qux", "baz"));
    }

    #[test]
    fn resolve_through_scalar_fails() {
        let tree = Tree::from_yaml_str("foo: 1").unwrap();
        assert!(resolve(&tree, &Selector::parse(".foo.bar").unwrap()).is_err());
    }

    #[test]
    fn at_mut_writes_in_place() {
        let mut tree = Tree::from_yaml_str("a: {b: 1}").unwrap();
        let loc = resolve(&tree, &Selector::parse(".a.b").unwrap()).unwrap();
        *tree.at_mut(&loc).unwrap() = Tree::from(2);
        assert_eq!(tree.select(".a.b").unwrap(), &Tree::from(2));
    }
}
