//! Mutable node handles
//!
//! A [`TreeNode`] holds a working copy of the value found at a resolved
//! [`Location`]. Edits stay on the node until [`TreeNode::sync_into`]
//! writes the value back into the owning tree.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use crate::error::{Result, TreeError};
use crate::selector::{resolve, Location, Selector};
use crate::value::{Map, Tree};

/// Key of a direct child: a map key or a list index
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// Map key, or a list value to match when non-numeric
    Name(String),
    /// List position, or map key `"n"`
    Index(usize),
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self::Name(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self::Name(value)
    }
}

impl From<usize> for Key {
    fn from(value: usize) -> Self {
        Self::Index(value)
    }
}

/// Argument to [`TreeNode::remove`]: one key or several
#[derive(Debug, Clone, PartialEq)]
pub enum RemoveKey {
    /// Single key
    One(Key),
    /// Several keys removed together
    Many(Vec<Key>),
    /// First list entry equal to this value
    Value(Tree),
}

/// One removal target after normalization
enum Needle {
    Key(Key),
    Value(Tree),
}

impl Display for Needle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => key.fmt(f),
            Self::Value(value) => value.fmt(f),
        }
    }
}

impl RemoveKey {
    fn into_needles(self) -> Vec<Needle> {
        match self {
            Self::One(key) => vec![Needle::Key(key)],
            Self::Many(keys) => keys.into_iter().map(Needle::Key).collect(),
            Self::Value(value) => vec![Needle::Value(value)],
        }
    }
}

impl From<Tree> for RemoveKey {
    fn from(value: Tree) -> Self {
        Self::Value(value)
    }
}

impl From<Key> for RemoveKey {
    fn from(value: Key) -> Self {
        Self::One(value)
    }
}

impl From<&str> for RemoveKey {
    fn from(value: &str) -> Self {
        Self::One(value.into())
    }
}

impl From<String> for RemoveKey {
    fn from(value: String) -> Self {
        Self::One(value.into())
    }
}

impl From<usize> for RemoveKey {
    fn from(value: usize) -> Self {
        Self::One(value.into())
    }
}

impl<T: Into<Key>> From<Vec<T>> for RemoveKey {
    fn from(value: Vec<T>) -> Self {
        Self::Many(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Key>, const N: usize> From<[T; N]> for RemoveKey {
    fn from(value: [T; N]) -> Self {
        Self::Many(value.into_iter().map(Into::into).collect())
    }
}

/// Scalar kinds recognized by [`TreeNode::contains_type`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Integer scalar
    Integer,
    /// String scalar
    String,
    /// Floating point scalar
    Float,
    /// Boolean scalar
    Boolean,
}

impl ValueKind {
    /// Check whether `value` is of this kind
    #[must_use]
    pub fn matches(self, value: &Tree) -> bool {
        matches!(
            (self, value),
            (Self::Integer, Tree::Integer(_))
                | (Self::String, Tree::String(_))
                | (Self::Float, Tree::Float(_))
                | (Self::Boolean, Tree::Bool(_))
        )
    }

    /// Kind name as written in configuration
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::String => "string",
            Self::Float => "float",
            Self::Boolean => "boolean",
        }
    }
}

impl FromStr for ValueKind {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "integer" => Ok(Self::Integer),
            "string" => Ok(Self::String),
            "float" => Ok(Self::Float),
            "boolean" => Ok(Self::Boolean),
            other => Err(TreeError::UnknownValueKind(other.to_string())),
        }
    }
}

impl Display for ValueKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle bound to one resolved location
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    value: Tree,
    location: Location,
    selector: String,
}

impl TreeNode {
    /// Resolve `selector` in `tree` and take a working copy of the value
    ///
    /// # Errors
    /// Returns selector syntax or lookup errors
    pub fn resolve(tree: &Tree, selector: &str) -> Result<Self> {
        let parsed = Selector::parse(selector)?;
        let location = resolve(tree, &parsed)?;
        let value = tree
            .at(&location)
            .cloned()
            .ok_or_else(|| TreeError::not_found(selector, location.to_string()))?;

        Ok(Self {
            value,
            location,
            selector: selector.to_string(),
        })
    }

    /// Current working value
    #[inline]
    #[must_use]
    pub fn get(&self) -> &Tree {
        &self.value
    }

    /// Originating selector string
    #[inline]
    #[must_use]
    pub fn selector(&self) -> &str {
        &self.selector
    }

    /// Resolved location
    #[inline]
    #[must_use]
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Replace the value
    pub fn set(&mut self, value: impl Into<Tree>) -> &mut Self {
        self.value = value.into();
        self
    }

    /// Add a value
    ///
    /// Maps merge maps (added keys win) and take anything else under the
    /// next free integer key. Lists append list elements in order and push
    /// anything else. A null node is replaced outright.
    ///
    /// # Errors
    /// Returns `NotMergeable` when the node is a scalar and `value` is not null
    pub fn add(&mut self, value: impl Into<Tree>) -> Result<&mut Self> {
        let value = value.into();
        match &mut self.value {
            Tree::Null => self.value = value,
            Tree::Map(map) => match value {
                Tree::Map(other) => map.extend(other),
                Tree::List(items) => {
                    for item in items {
                        let key = next_free_key(map);
                        map.insert(key, item);
                    }
                }
                other => {
                    let key = next_free_key(map);
                    map.insert(key, other);
                }
            },
            Tree::List(list) => match value {
                Tree::List(items) => list.extend(items),
                other => list.push(other),
            },
            _ if value.is_null() => {}
            _ => {
                return Err(TreeError::NotMergeable {
                    selector: self.selector.clone(),
                })
            }
        }
        Ok(self)
    }

    /// Remove one or more keys
    ///
    /// Map keys are removed by name. List entries are removed by index, or
    /// by the first equal value: a non-numeric name matches a string entry
    /// and [`RemoveKey::Value`] matches any entry, containers included.
    /// Indices refer to positions before the call and the list is
    /// compacted afterwards. Nothing is removed unless every key is found.
    ///
    /// # Errors
    /// Returns `KeyNotFound` for the first absent key
    pub fn remove(&mut self, keys: impl Into<RemoveKey>) -> Result<&mut Self> {
        let needles = keys.into().into_needles();
        let selector = self.selector.clone();
        let missing = |needle: &Needle| TreeError::KeyNotFound {
            selector: selector.clone(),
            key: needle.to_string(),
        };

        match &mut self.value {
            Tree::Map(map) => {
                let mut names: Vec<String> = Vec::with_capacity(needles.len());
                for needle in &needles {
                    let name = match needle {
                        Needle::Key(key) => Some(key.to_string()),
                        Needle::Value(value) => value.as_str().map(str::to_string),
                    };
                    match name {
                        Some(name) if map.contains_key(&name) && !names.contains(&name) => {
                            names.push(name);
                        }
                        _ => return Err(missing(needle)),
                    }
                }
                for name in &names {
                    map.shift_remove(name);
                }
            }
            Tree::List(list) => {
                let mut selected = vec![false; list.len()];
                for needle in &needles {
                    let first_equal = |wanted: &Tree| {
                        list.iter()
                            .enumerate()
                            .position(|(i, item)| !selected[i] && item == wanted)
                    };
                    let position = match needle {
                        Needle::Key(Key::Index(index)) => Some(*index),
                        Needle::Key(Key::Name(name)) => match name.parse::<usize>() {
                            Ok(index) => Some(index),
                            Err(_) => first_equal(&Tree::from(name.as_str())),
                        },
                        Needle::Value(value) => first_equal(value),
                    };
                    match position {
                        Some(i) if i < list.len() && !selected[i] => selected[i] = true,
                        _ => return Err(missing(needle)),
                    }
                }
                let mut flags = selected.into_iter();
                list.retain(|_| !flags.next().unwrap_or(false));
            }
            _ => {
                if let Some(needle) = needles.first() {
                    return Err(missing(needle));
                }
            }
        }
        Ok(self)
    }

    /// Check for a direct child
    ///
    /// On a list, numeric keys are checked against the index range.
    #[must_use]
    pub fn has(&self, key: impl Into<Key>) -> bool {
        self.child(&key.into()).is_some()
    }

    /// Check for a direct child holding a list
    #[must_use]
    pub fn contains_array(&self, key: impl Into<Key>) -> bool {
        matches!(self.child(&key.into()), Some(Tree::List(_)))
    }

    /// Check for a direct child holding a scalar of `kind`
    #[must_use]
    pub fn contains_type(&self, key: impl Into<Key>, kind: ValueKind) -> bool {
        self.child(&key.into()).is_some_and(|child| kind.matches(child))
    }

    fn child(&self, key: &Key) -> Option<&Tree> {
        match (&self.value, key) {
            (Tree::Map(map), key) => map.get(&key.to_string()),
            (Tree::List(list), Key::Index(index)) => list.get(*index),
            (Tree::List(list), Key::Name(name)) => {
                name.parse::<usize>().ok().and_then(|index| list.get(index))
            }
            _ => None,
        }
    }

    /// Write the working value back into `tree`
    ///
    /// # Errors
    /// Returns `SelectorNotFound` if the location no longer exists
    pub fn sync_into(&self, tree: &mut Tree) -> Result<()> {
        let slot = tree
            .at_mut(&self.location)
            .ok_or_else(|| TreeError::not_found(&self.selector, self.location.to_string()))?;
        slot.clone_from(&self.value);
        Ok(())
    }

    /// Consume the node, returning its value
    #[must_use]
    pub fn into_value(self) -> Tree {
        self.value
    }
}

/// One past the largest non-negative integer key, or 0
fn next_free_key(map: &Map) -> String {
    map.keys()
        .filter_map(|key| key.parse::<u64>().ok())
        .max()
        .map_or(0, |max| max + 1)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn node(yaml: &str, selector: &str) -> TreeNode {
        TreeNode::resolve(&Tree::from_yaml_str(yaml).unwrap(), selector).unwrap()
    }

    fn yaml(text: &str) -> Tree {
        Tree::from_yaml_str(text).unwrap()
    }

    #[test]
    fn set_replaces_value() {
        let mut n = node("foo: bar", ".foo");
        n.set("baz");
        assert_eq!(n.get(), &Tree::from("baz"));
    }

    #[test]
    fn add_merges_maps() {
        let mut n = node("a: 1\nb: 2", ".");
        n.add(yaml("b: 3\nc: 4")).unwrap();
        assert_eq!(n.get(), &yaml("a: 1\nb: 3\nc: 4"));
    }

    #[test]
    fn add_scalar_to_map_uses_next_key() {
        let mut n = node("foo: bar", ".");
        n.add("element").unwrap();
        assert_eq!(n.get().get("0"), Some(&Tree::from("element")));

        let mut n = node("3: x\nname: y", ".");
        n.add("z").unwrap();
        assert_eq!(n.get().get("4"), Some(&Tree::from("z")));
    }

    #[test]
    fn add_list_to_map_uses_successive_keys() {
        let mut n = node("name: y", ".");
        n.add(vec!["a", "b"]).unwrap();
        assert_eq!(n.get(), &yaml("name: y\n0: a\n1: b"));
    }

    #[test]
    fn add_appends_to_list() {
        let mut n = node("items: [a]", ".items");
        n.add(vec!["b", "c"]).unwrap().add("d").unwrap();
        assert_eq!(n.get(), &Tree::from(vec!["a", "b", "c", "d"]));
    }

    #[test]
    fn add_replaces_null() {
        let mut n = TreeNode::resolve(&Tree::Null, ".").unwrap();
        n.add(yaml("foo: bar")).unwrap();
        assert_eq!(n.get(), &yaml("foo: bar"));
    }

    #[test]
    fn add_to_scalar() {
        let mut n = node("foo: bar", ".foo");
        assert!(n.add(Tree::Null).is_ok());
        assert_eq!(n.get(), &Tree::from("bar"));
        assert_eq!(
            n.add("x").unwrap_err(),
            TreeError::NotMergeable {
                selector: ".foo".to_string()
            }
        );
    }

    #[test]
    fn remove_map_keys() {
        let mut n = node("a: 1\nb: 2\nc: 3", ".");
        n.remove(["a", "c"]).unwrap();
        assert_eq!(n.get(), &yaml("b: 2"));
    }

    #[test]
    fn remove_list_indices_compacts() {
        let mut n = node("[a, b, c, d]", ".");
        n.remove(vec![0usize, 1]).unwrap();
        assert_eq!(n.get(), &Tree::from(vec!["c", "d"]));
    }

    #[test]
    fn remove_list_by_value() {
        let mut n = node("[a, b, a]", ".");
        n.remove("a").unwrap();
        assert_eq!(n.get(), &Tree::from(vec!["b", "a"]));
    }

    #[test]
    fn remove_list_by_typed_value() {
        let mut n = node("[1, true, {name: db}, 1]", ".");
        n.remove(Tree::Integer(1)).unwrap();
        assert_eq!(n.get(), &yaml("[true, {name: db}, 1]"));

        n.remove(Tree::Bool(true)).unwrap();
        n.remove(yaml("{name: db}")).unwrap();
        assert_eq!(n.get(), &yaml("[1]"));

        let err = n.remove(Tree::Integer(7)).unwrap_err();
        assert!(matches!(err, TreeError::KeyNotFound { ref key, .. } if key == "7"));
        assert_eq!(n.get(), &yaml("[1]"));
    }

    #[test]
    fn remove_value_from_map_uses_string_name() {
        let mut n = node("a: 1\nb: 2", ".");
        n.remove(Tree::from("a")).unwrap();
        assert_eq!(n.get(), &yaml("b: 2"));
        assert!(n.remove(Tree::Integer(2)).is_err());
    }

    #[test]
    fn remove_is_atomic() {
        let mut n = node("a: 1\nb: 2", ".");
        let err = n.remove(["a", "missing"]).unwrap_err();
        assert!(matches!(err, TreeError::KeyNotFound { ref key, .. } if key == "missing"));
        assert_eq!(n.get(), &yaml("a: 1\nb: 2"));
    }

    #[test]
    fn remove_out_of_range() {
        let mut n = node("[a]", ".");
        assert!(n.remove(3usize).is_err());
        assert!(n.remove(vec![0usize, 0]).is_err());
    }

    #[test]
    fn remove_from_scalar_fails() {
        let mut n = node("foo: bar", ".foo");
        assert!(n.remove("x").is_err());
    }

    #[test]
    fn child_queries() {
        let n = node("a: [1]\nb: 2\nc: 1.5\nd: true\ne: text", ".");
        assert!(n.has("a"));
        assert!(!n.has("z"));
        assert!(n.contains_array("a"));
        assert!(!n.contains_array("b"));
        assert!(n.contains_type("b", ValueKind::Integer));
        assert!(n.contains_type("c", ValueKind::Float));
        assert!(n.contains_type("d", ValueKind::Boolean));
        assert!(n.contains_type("e", ValueKind::String));
        assert!(!n.contains_type("e", ValueKind::Integer));
    }

    #[test]
    fn child_queries_on_list_and_scalar() {
        let list = node("[x, y]", ".");
        assert!(list.has(0usize));
        assert!(list.has("1"));
        assert!(!list.has(2usize));
        let scalar = node("foo: bar", ".foo");
        assert!(!scalar.has("foo"));
    }

    #[test]
    fn value_kind_from_str() {
        assert_eq!("float".parse::<ValueKind>().unwrap(), ValueKind::Float);
        assert!("date".parse::<ValueKind>().is_err());
    }

    #[test]
    fn sync_writes_back() {
        let mut tree = yaml("foo:\n  bar:\n    - element1\n");
        let mut n = TreeNode::resolve(&tree, ".foo.bar.[0]").unwrap();
        assert_eq!(n.get(), &Tree::from("element1"));
        n.set("x");
        n.sync_into(&mut tree).unwrap();
        assert_eq!(tree, yaml("foo:\n  bar:\n    - x\n"));
    }
}
