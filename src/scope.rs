//! The arena-indexed scope tree: modules, perspectives and local (let/for)
//! scopes, all stored as plain `Vec` entries addressed by index.
//!
//! Replaces the teacher's `Rc<RefCell<SymbolTable>>` with `Weak` parent
//! back-pointers (compiler/definitions.rs `SymbolTable`) with index-based
//! parent links into a single arena, per spec.md §9's guidance to avoid
//! raw cyclic references; the declare/lookup vocabulary itself is kept
//! close to the teacher's `SymbolTable::insert_symbol`/`resolve_symbol`.

use std::collections::HashMap;

use anyhow::{bail, Result};

use crate::binding::{Binding, BindingArena, BindingId, PendingBinding};
use crate::path::Path;

pub type ScopeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Module,
    Perspective,
    Local,
}

#[derive(Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    pub name: String,
    pub parent: Option<ScopeId>,
    /// `false` inside a `defpurefun` body (and any scope nested within
    /// one); an impure call found there is rejected during resolution
    /// (spec.md §3's `LocalScope`/§4.5's purity-compatibility rule).
    pub pure: bool,
    children: Vec<ScopeId>,
    symbols: HashMap<(String, bool), BindingId>,
}

/// Owns both the scope tree and the binding arena it refers into: the two
/// are built up together (a declaration always both installs a symbol
/// table entry and a pending binding) so keeping them in one value avoids
/// threading two mutable handles everywhere.
#[derive(Debug)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
    pub bindings: BindingArena,
}

impl ScopeTree {
    pub fn new() -> Self {
        let root = Scope {
            kind: ScopeKind::Module,
            name: "".into(),
            parent: None,
            pure: false,
            children: vec![],
            symbols: HashMap::new(),
        };
        ScopeTree {
            scopes: vec![root],
            bindings: BindingArena::new(),
        }
    }

    pub fn root(&self) -> ScopeId {
        0
    }

    /// Open a child scope that inherits its parent's purity (the common
    /// case: `let`/`for`/module/perspective scopes are neither more nor
    /// less pure than where they're opened).
    pub fn enter(&mut self, parent: ScopeId, kind: ScopeKind, name: impl Into<String>) -> ScopeId {
        let pure = self.scopes[parent].pure;
        self.enter_pure(parent, kind, name, pure)
    }

    /// Open a child scope with an explicit purity, overriding the
    /// parent's - used for a `defun`/`defpurefun` body scope, whose
    /// purity is fixed by which form declared it rather than inherited
    /// from whatever module it was declared in.
    pub fn enter_pure(
        &mut self,
        parent: ScopeId,
        kind: ScopeKind,
        name: impl Into<String>,
        pure: bool,
    ) -> ScopeId {
        let id = self.scopes.len();
        self.scopes.push(Scope {
            kind,
            name: name.into(),
            parent: Some(parent),
            pure,
            children: vec![],
            symbols: HashMap::new(),
        });
        self.scopes[parent].children.push(id);
        id
    }

    pub fn is_pure(&self, scope: ScopeId) -> bool {
        self.scopes[scope].pure
    }

    pub fn parent_of(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope].parent
    }

    pub fn children_of(&self, scope: ScopeId) -> &[ScopeId] {
        &self.scopes[scope].children
    }

    pub fn kind_of(&self, scope: ScopeId) -> ScopeKind {
        self.scopes[scope].kind
    }

    /// Declare a new symbol in `scope`, installing a [`Binding::Pending`]
    /// placeholder. Fails if the (name, is_function) pair is already
    /// declared in this exact scope (shadowing an outer scope is fine;
    /// redeclaring within the same one is not).
    pub fn declare(&mut self, scope: ScopeId, path: Path, is_function: bool) -> Result<BindingId> {
        let key = (path.last().to_owned(), is_function);
        if self.scopes[scope].symbols.contains_key(&key) {
            bail!("{} is already declared in this scope", path);
        }
        let id = self.bindings.declare(PendingBinding {
            path,
            is_function,
        });
        self.scopes[scope].symbols.insert(key, id);
        Ok(id)
    }

    /// Install an already-final binding directly under `name` (used for
    /// local variables bound by `let`/`for`, and for perspective/module
    /// aliases that point at an existing binding rather than declaring a
    /// fresh one).
    pub fn bind(
        &mut self,
        scope: ScopeId,
        name: impl Into<String>,
        is_function: bool,
        id: BindingId,
    ) -> Result<()> {
        let key = (name.into(), is_function);
        if self.scopes[scope].symbols.contains_key(&key) {
            bail!("{:?} is already declared in this scope", key.0);
        }
        self.scopes[scope].symbols.insert(key, id);
        Ok(())
    }

    /// Alias an existing binding under a new name in `scope` (`defalias`,
    /// or a perspective bringing a parent module's column into scope).
    pub fn alias(
        &mut self,
        scope: ScopeId,
        alias: impl Into<String>,
        is_function: bool,
        target: BindingId,
    ) -> Result<()> {
        self.bind(scope, alias, is_function, target)
    }

    /// Lexical lookup: walks outward through parent scopes until the
    /// symbol is found or the root is exhausted.
    pub fn lookup(&self, scope: ScopeId, name: &str, is_function: bool) -> Option<BindingId> {
        let key = (name.to_owned(), is_function);
        let mut cur = Some(scope);
        while let Some(s) = cur {
            if let Some(id) = self.scopes[s].symbols.get(&key) {
                return Some(*id);
            }
            cur = self.scopes[s].parent;
        }
        None
    }

    /// Non-recursive lookup: only `scope`'s own symbol table, never a
    /// parent's (spec.md §4.2's `bind` uses this for the final segment of
    /// both the absolute and relative descent cases).
    pub fn lookup_local(&self, scope: ScopeId, name: &str, is_function: bool) -> Option<BindingId> {
        self.scopes[scope].symbols.get(&(name.to_owned(), is_function)).copied()
    }

    /// The direct child of `scope` named `name`, if any (a submodule or
    /// perspective).
    pub fn child_named(&self, scope: ScopeId, name: &str) -> Option<ScopeId> {
        self.scopes[scope]
            .children
            .iter()
            .copied()
            .find(|&c| self.scopes[c].name == name)
    }

    pub fn name_of(&self, scope: ScopeId) -> &str {
        &self.scopes[scope].name
    }

    /// All `(name, is_function, BindingId)` triples declared directly in
    /// `scope` (non-recursive).
    pub fn local_symbols(&self, scope: ScopeId) -> Vec<(String, bool, BindingId)> {
        self.scopes[scope]
            .symbols
            .iter()
            .map(|((n, f), id)| (n.clone(), *f, *id))
            .collect()
    }

    /// Every binding reachable from `scope`'s subtree, flattened
    /// depth-first; used by the environment builder to enumerate the
    /// final column set.
    pub fn flatten(&self, scope: ScopeId) -> Vec<BindingId> {
        let mut out: Vec<BindingId> = self.scopes[scope].symbols.values().copied().collect();
        for child in &self.scopes[scope].children {
            out.extend(self.flatten(*child));
        }
        out
    }

    pub fn get_binding(&self, id: BindingId) -> Option<&Binding> {
        self.bindings.get(id)
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }
}

impl Default for ScopeTree {
    fn default() -> Self {
        ScopeTree::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::ConstantBinding;
    use crate::types::Type;
    use num_bigint::BigInt;

    #[test]
    fn declare_then_lookup_in_same_scope() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        let id = tree.declare(root, Path::new("X"), false).unwrap();
        assert_eq!(tree.lookup(root, "X", false), Some(id));
    }

    #[test]
    fn redeclaration_in_same_scope_fails() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        tree.declare(root, Path::new("X"), false).unwrap();
        assert!(tree.declare(root, Path::new("X"), false).is_err());
    }

    #[test]
    fn child_scope_sees_parent_declarations() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        let id = tree.declare(root, Path::new("X"), false).unwrap();
        let child = tree.enter(root, ScopeKind::Local, "let");
        assert_eq!(tree.lookup(child, "X", false), Some(id));
    }

    #[test]
    fn child_scope_can_shadow_parent() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        let outer = tree.declare(root, Path::new("X"), false).unwrap();
        let child = tree.enter(root, ScopeKind::Local, "let");
        let inner = tree.declare(child, Path::new("X"), false).unwrap();
        assert_ne!(outer, inner);
        assert_eq!(tree.lookup(child, "X", false), Some(inner));
        assert_eq!(tree.lookup(root, "X", false), Some(outer));
    }

    #[test]
    fn parent_scope_does_not_see_child_declarations() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        let child = tree.enter(root, ScopeKind::Local, "let");
        tree.declare(child, Path::new("Y"), false).unwrap();
        assert_eq!(tree.lookup(root, "Y", false), None);
    }

    #[test]
    fn flatten_collects_nested_scopes() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        tree.declare(root, Path::new("A"), false).unwrap();
        let child = tree.enter(root, ScopeKind::Module, "m");
        tree.declare(child, Path::new("B"), false).unwrap();
        assert_eq!(tree.flatten(root).len(), 2);
    }

    #[test]
    fn enter_pure_overrides_inherited_purity_and_children_inherit_it() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        assert!(!tree.is_pure(root));
        let pure_scope = tree.enter_pure(root, ScopeKind::Local, "purefun", true);
        assert!(tree.is_pure(pure_scope));
        let nested = tree.enter(pure_scope, ScopeKind::Local, "let");
        assert!(tree.is_pure(nested));
    }

    #[test]
    fn alias_points_at_same_binding_as_original() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        let id = tree.declare(root, Path::new("X"), false).unwrap();
        tree.bindings
            .finalize(
                id,
                Binding::Constant(ConstantBinding {
                    path: Path::new("X"),
                    value: BigInt::from(1),
                    datatype: Type::field(),
                }),
            )
            .unwrap();
        let child = tree.enter(root, ScopeKind::Perspective, "p");
        tree.alias(child, "Y", false, id).unwrap();
        assert_eq!(tree.lookup(child, "Y", false), Some(id));
    }
}
