//! Whole-tree post-processing applied when a document is saved

use crate::value::Tree;

/// Replacement written over every scalar by [`mask_values`]
pub const MASK: &str = "(masked)";

/// Recursively remove empty maps and lists
///
/// Children are cleaned first, so a map whose only child was an empty
/// list disappears too. The root itself is kept even when it ends up empty.
#[must_use]
pub fn drop_empty(tree: Tree) -> Tree {
    match tree {
        Tree::Map(map) => Tree::Map(
            map.into_iter()
                .map(|(key, value)| (key, drop_empty(value)))
                .filter(|(_, value)| !value.is_empty_container())
                .collect(),
        ),
        Tree::List(list) => Tree::List(
            list.into_iter()
                .map(drop_empty)
                .filter(|value| !value.is_empty_container())
                .collect(),
        ),
        scalar => scalar,
    }
}

/// Replace every non-null scalar with [`MASK`], keeping the shape
#[must_use]
pub fn mask_values(tree: Tree) -> Tree {
    match tree {
        Tree::Map(map) => Tree::Map(
            map.into_iter()
                .map(|(key, value)| (key, mask_values(value)))
                .collect(),
        ),
        Tree::List(list) => Tree::List(list.into_iter().map(mask_values).collect()),
        Tree::Null => Tree::Null,
        _ => Tree::from(MASK),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn yaml(text: &str) -> Tree {
        Tree::from_yaml_str(text).unwrap()
    }

    #[test]
    fn drop_empty_nested() {
        let tree = yaml("foo:\n  bar: {}\n  baz: []\nkeep: 1\nlist: [[], {a: {}}, x]\n");
        assert_eq!(drop_empty(tree), yaml("keep: 1\nlist: [x]\n"));
    }

    #[test]
    fn drop_empty_keeps_root() {
        assert_eq!(drop_empty(yaml("a: {}")), Tree::map());
    }

    #[test]
    fn drop_empty_keeps_null_scalars() {
        assert_eq!(drop_empty(yaml("a: ~\nb: ''")), yaml("a: ~\nb: ''"));
    }

    #[test]
    fn mask_keeps_shape() {
        let tree = yaml("db:\n  user: admin\n  port: 5432\n  hosts: [a, b]\nnone: ~\n");
        let masked = mask_values(tree);
        assert_eq!(
            masked,
            yaml("db:\n  user: (masked)\n  port: (masked)\n  hosts: [(masked), (masked)]\nnone: ~\n")
        );
    }
}
