//! The table of built-in forms: natives (ordinary callable functions like
//! `+`/`eq`/`force-bool`) and intrinsics (forms with their own evaluation
//! rule - `let`, `for`, `if`, `reduce`, `debug` - that the preprocessor
//! and type checker special-case rather than treating as ordinary calls).
//!
//! Grounded on the teacher's `BUILTINS` static table and `Form`/`Arity`/
//! `FuncVerifier`/`Handle` types (compiler/common.rs), generalized here
//! into two registries instead of one so a user `defun` can be rejected
//! up front when it collides with either (spec.md §4.2/§4.5).

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::binding::{Arity, Binding, IntrinsicDefinition, NativeDefinition};
use crate::path::Path;
use crate::scope::ScopeTree;

static NATIVES: Lazy<HashMap<&'static str, Arity>> = Lazy::new(|| {
    use Arity::*;
    let mut m = HashMap::new();
    m.insert("+", AtLeast(1));
    m.insert("-", AtLeast(1));
    m.insert("*", AtLeast(1));
    m.insert("~", Exact(1)); // normalise
    m.insert("shift", Exact(2));
    m.insert("eq", Exact(2));
    m.insert("neq", Exact(2));
    m.insert("not", Exact(1));
    m.insert("and", AtLeast(1));
    m.insert("or", AtLeast(1));
    m.insert("force-bool", Exact(1));
    m.insert("is-zero", Exact(1));
    m.insert("is-binary", Exact(1));
    m.insert("nth", Exact(2));
    m.insert("len", Exact(1));
    m
});

static INTRINSICS: Lazy<HashMap<&'static str, Arity>> = Lazy::new(|| {
    use Arity::*;
    let mut m = HashMap::new();
    m.insert("let", Exact(2));
    m.insert("for", Exact(3));
    m.insert("if", Range(2, 3));
    m.insert("if-not", Range(2, 3));
    m.insert("if-zero", Range(2, 3));
    m.insert("if-not-zero", Range(2, 3));
    m.insert("reduce", Exact(2));
    m.insert("debug", Exact(1));
    m.insert("defun", AtLeast(2));
    m.insert("defcolumns", AtLeast(1));
    m.insert("defconst", AtLeast(2));
    m.insert("defconstraint", AtLeast(2));
    m.insert("defperspective", AtLeast(2));
    m
});

pub fn native_arity(name: &str) -> Option<Arity> {
    NATIVES.get(name).copied()
}

pub fn intrinsic_arity(name: &str) -> Option<Arity> {
    INTRINSICS.get(name).copied()
}

pub fn is_native(name: &str) -> bool {
    NATIVES.contains_key(name)
}

pub fn is_intrinsic(name: &str) -> bool {
    INTRINSICS.contains_key(name)
}

/// `true` for any name a user `defun`/`defalias` may not shadow.
pub fn is_reserved(name: &str) -> bool {
    is_native(name) || is_intrinsic(name)
}

/// Install every native and intrinsic into the tree's root scope, in
/// function position, so ordinary symbol resolution finds them the same
/// way it finds a user `defun`.
pub fn install_builtins(tree: &mut ScopeTree) {
    let root = tree.root();
    for (name, arity) in NATIVES.iter() {
        let id = tree.bindings.insert(Binding::Native(NativeDefinition {
            name: (*name).to_owned(),
            arity: *arity,
            pure: true,
        }));
        tree.bind(root, *name, true, id)
            .expect("builtin names are installed once, before user declarations");
        let _ = Path::new(*name);
    }
    for (name, arity) in INTRINSICS.iter() {
        let id = tree
            .bindings
            .insert(Binding::Intrinsic(IntrinsicDefinition {
                name: (*name).to_owned(),
                arity: *arity,
            }));
        tree.bind(root, *name, true, id)
            .expect("builtin names are installed once, before user declarations");
    }
}
