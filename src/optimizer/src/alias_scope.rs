use crate::predicate::TableAliasSet;

/// Table aliases produced by the part of a FROM clause transformed so far.
///
/// Join and derived-table processing save the enclosing set with [`AliasScope::take`],
/// work in an empty scope, and then either merge back with [`AliasScope::exit`] or
/// discard their aliases with [`AliasScope::restore`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AliasScope {
    aliases: TableAliasSet,
}

impl AliasScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an alias, lowercased.
    pub fn insert(&mut self, alias: &str) {
        self.aliases.insert(alias.to_lowercase());
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.aliases.contains(&alias.to_lowercase())
    }

    pub fn aliases(&self) -> &TableAliasSet {
        &self.aliases
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// Adds every alias of `other` to this scope.
    pub fn merge(&mut self, other: AliasScope) {
        self.aliases.extend(other.aliases);
    }

    /// Returns the current aliases and leaves the scope empty.
    pub fn take(&mut self) -> AliasScope {
        std::mem::take(self)
    }

    /// Replaces the current aliases with a previously taken scope.
    pub fn restore(&mut self, saved: AliasScope) {
        *self = saved;
    }

    /// Reinstates a previously taken scope, keeping the aliases added since.
    pub fn exit(&mut self, saved: AliasScope) {
        let inner = self.take();
        *self = saved;
        self.merge(inner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(names: &[&str]) -> AliasScope {
        let mut scope = AliasScope::new();
        for name in names {
            scope.insert(name);
        }
        scope
    }

    #[test]
    fn test_insert_lowercases() {
        let scope = scope(&["A", "b"]);
        assert!(scope.contains("a"));
        assert!(scope.contains("B"));
        assert_eq!(scope.len(), 2);
    }

    #[test]
    fn test_take_and_exit() {
        let mut current = scope(&["a"]);
        let saved = current.take();
        assert!(current.is_empty());
        current.insert("b");
        current.insert("c");
        current.exit(saved);
        assert_eq!(current, scope(&["a", "b", "c"]));
    }

    #[test]
    fn test_restore_discards_inner_aliases() {
        let mut current = scope(&["a"]);
        let saved = current.take();
        current.insert("inner");
        current.restore(saved);
        current.insert("d");
        assert_eq!(current, scope(&["a", "d"]));
    }

    #[test]
    fn test_merge_keeps_both_sides() {
        let mut left = scope(&["a"]);
        left.merge(scope(&["b", "A"]));
        assert_eq!(left, scope(&["a", "b"]));
    }
}
