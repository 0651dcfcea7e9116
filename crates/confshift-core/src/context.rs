//! Per-unit migration context
//!
//! Unit code reaches the document only through a [`MigrationContext`]. At
//! most one [`TreeNode`] is active at a time; asking for another one writes
//! the previous node back first, so later selectors see earlier edits.

use std::sync::Arc;

use confshift_ledger::LedgerScope;
use confshift_tree::{drop_empty, mask_values, Tree, TreeError, TreeNode};

use crate::catalog::MigrationUnit;
use crate::config::SaveConfig;
use crate::error::SecretError;
use crate::secrets::{resolve_secret, SecretProvider, SecretRules};

/// Document access for one unit invocation
pub struct MigrationContext {
    unit: MigrationUnit,
    scope: LedgerScope,
    tree: Tree,
    active: Option<TreeNode>,
    save: SaveConfig,
    secrets: Arc<dyn SecretProvider>,
}

impl MigrationContext {
    /// Context over `tree` for `unit`
    pub fn new(
        unit: MigrationUnit,
        scope: LedgerScope,
        tree: Tree,
        save: SaveConfig,
        secrets: Arc<dyn SecretProvider>,
    ) -> Self {
        Self {
            unit,
            scope,
            tree,
            active: None,
            save,
            secrets,
        }
    }

    /// Unit being run
    #[must_use]
    pub fn unit(&self) -> &MigrationUnit {
        &self.unit
    }

    /// Environment name
    #[must_use]
    pub fn environment(&self) -> &str {
        &self.scope.environment
    }

    /// Configuration identifier
    #[must_use]
    pub fn config_id(&self) -> &str {
        &self.scope.config_id
    }

    /// Resolve `selector` and make it the active node
    ///
    /// # Errors
    /// Returns selector syntax or lookup errors
    pub fn get(&mut self, selector: &str) -> Result<&mut TreeNode, TreeError> {
        self.sync()?;
        let node = TreeNode::resolve(&self.tree, selector)?;
        Ok(self.active.insert(node))
    }

    /// Check whether `selector` resolves; errors count as absent
    ///
    /// Pending edits on the active node are seen, but not written back.
    #[must_use]
    pub fn exists(&self, selector: &str) -> bool {
        match &self.active {
            None => TreeNode::resolve(&self.tree, selector).is_ok(),
            Some(node) => {
                let mut view = self.tree.clone();
                node.sync_into(&mut view).is_ok() && TreeNode::resolve(&view, selector).is_ok()
            }
        }
    }

    /// Write the active node back and apply save post-processing
    ///
    /// # Errors
    /// Returns `SelectorNotFound` if the active node's location vanished
    pub fn save(&mut self) -> Result<(), TreeError> {
        self.sync()?;
        if self.save.remove_empty_nodes {
            self.tree = drop_empty(std::mem::take(&mut self.tree));
        }
        if self.save.mask_values {
            self.tree = mask_values(std::mem::take(&mut self.tree));
        }
        Ok(())
    }

    /// Look up a secret and apply `rules`
    ///
    /// # Errors
    /// Returns secret lookup or validation errors
    pub fn secret(&self, name: &str, rules: &SecretRules) -> Result<Tree, SecretError> {
        tracing::debug!(unit = %self.unit, secret = name, provider = self.secrets.name(), "secret lookup");
        resolve_secret(self.secrets.as_ref(), name, rules)
    }

    /// Current document, with the active node written back
    ///
    /// # Errors
    /// Returns `SelectorNotFound` if the active node's location vanished
    pub fn tree(&mut self) -> Result<&Tree, TreeError> {
        self.sync()?;
        Ok(&self.tree)
    }

    /// Final document after sync and post-processing
    ///
    /// # Errors
    /// Same as [`save`](Self::save)
    pub fn into_tree(mut self) -> Result<Tree, TreeError> {
        self.save()?;
        Ok(self.tree)
    }

    fn sync(&mut self) -> Result<(), TreeError> {
        if let Some(node) = self.active.take() {
            node.sync_into(&mut self.tree)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::MemorySecretProvider;
    use pretty_assertions::assert_eq;

    fn context(yaml: &str, save: SaveConfig) -> MigrationContext {
        MigrationContext::new(
            MigrationUnit::parse("2020_01_01_000000_test_unit").unwrap(),
            LedgerScope::new("config", "default"),
            Tree::from_yaml_str(yaml).unwrap(),
            save,
            Arc::new(MemorySecretProvider::new().with("/db/port", "5432")),
        )
    }

    fn yaml(text: &str) -> Tree {
        Tree::from_yaml_str(text).unwrap()
    }

    #[test]
    fn list_element_roundtrip() {
        let mut ctx = context("foo:\n  bar:\n    - element1\n", SaveConfig::default());
        assert_eq!(ctx.get(".foo.bar.[0]").unwrap().get(), &Tree::from("element1"));
        ctx.get(".foo.bar.[0]").unwrap().set("x");
        assert_eq!(ctx.into_tree().unwrap(), yaml("foo:\n  bar:\n    - x\n"));
    }

    #[test]
    fn later_selectors_see_earlier_edits() {
        let mut ctx = context("foo: {}", SaveConfig::default());
        ctx.get(".foo").unwrap().add(yaml("bar: {baz: 1}")).unwrap();
        ctx.get(".foo.bar").unwrap().add(yaml("qux: 2")).unwrap();
        assert_eq!(ctx.tree().unwrap(), &yaml("foo: {bar: {baz: 1, qux: 2}}"));
    }

    #[test]
    fn exists_sees_pending_edits_without_writing() {
        let mut ctx = context("foo: {bar: 1}", SaveConfig::default());
        ctx.get(".foo").unwrap().add(yaml("baz: 2")).unwrap();

        assert!(ctx.exists(".foo.baz"));
        assert!(ctx.active.is_some());
        assert_eq!(ctx.tree, yaml("foo: {bar: 1}"));
        assert_eq!(ctx.tree().unwrap(), &yaml("foo: {bar: 1, baz: 2}"));
    }

    #[test]
    fn exists_swallows_errors() {
        let ctx = context("foo: {bar: 1}", SaveConfig::default());
        assert!(ctx.exists(".foo.bar"));
        assert!(!ctx.exists(".foo.missing"));
        assert!(!ctx.exists("bad..selector"));
    }

    #[test]
    fn save_drops_empty_nodes() {
        let save = SaveConfig {
            remove_empty_nodes: true,
            ..SaveConfig::default()
        };
        let mut ctx = context("foo:\n  bar:\n    baz: 1\nkeep: 1\n", save);
        ctx.get(".foo.bar").unwrap().remove("baz").unwrap();
        assert_eq!(ctx.into_tree().unwrap(), yaml("keep: 1"));
    }

    #[test]
    fn save_masks_values() {
        let save = SaveConfig {
            mask_values: true,
            ..SaveConfig::default()
        };
        let ctx = context("user: admin", save);
        assert_eq!(ctx.into_tree().unwrap(), yaml("user: (masked)"));
    }

    #[test]
    fn interim_save_keeps_empty_until_enabled() {
        let mut ctx = context("foo: {bar: 1}", SaveConfig::default());
        ctx.get(".foo").unwrap().remove("bar").unwrap();
        ctx.save().unwrap();
        assert_eq!(ctx.tree().unwrap(), &yaml("foo: {}"));
    }

    #[test]
    fn secret_lookup() {
        let ctx = context("{}", SaveConfig::default());
        let rules = SecretRules::new().with_kind(confshift_tree::ValueKind::Integer);
        assert_eq!(ctx.secret("/db/port", &rules).unwrap(), Tree::Integer(5432));
        assert_eq!(ctx.environment(), "default");
        assert_eq!(ctx.config_id(), "config");
    }
}
