//! The expression tree, source-preserving substitution, and shallow copy.
//!
//! Generalizes the teacher's `Expression` enum (compiler/generator.rs:
//! `Funcall`/`Const`/`Column`/`ArrayColumn`/`List`/`Void`) with the
//! additional node kinds spec.md §3 requires, and replaces the teacher's
//! inline-by-nested-scope call convention with the explicit
//! `Substitute`/`ShallowCopy` operations spec.md §4.4 specifies (see
//! SPEC_FULL.md's note on this).
//!
//! Every interior expression is reached through a [`Node`], a reference-
//! counted handle so that [`shallow_copy`] can produce a fresh outer node
//! while sharing inner children, exactly as spec.md §4.4/§9 describe.

use num_bigint::BigInt;
use num_traits::{One, Zero};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::binding::{Binding, BindingArena, BindingId};
use crate::context::Context;
use crate::path::Path;
use crate::types::Type;

pub type NodeId = u64;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

fn fresh_id() -> NodeId {
    NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IfKind {
    Unknown,
    IfZero,
    IfNotZero,
}

/// A reference to a column/constant/function/local, in either value- or
/// function-position, resolved write-once to a [`BindingId`].
#[derive(Debug, Clone)]
pub struct Symbol {
    pub path: Path,
    pub is_function: bool,
    binding: Rc<RefCell<Option<BindingId>>>,
}

impl Symbol {
    pub fn new(path: Path, is_function: bool) -> Self {
        Symbol {
            path,
            is_function,
            binding: Rc::new(RefCell::new(None)),
        }
    }

    pub fn binding(&self) -> Option<BindingId> {
        *self.binding.borrow()
    }

    pub fn is_resolved(&self) -> bool {
        self.binding.borrow().is_some()
    }

    /// Attach the resolved binding. Resolution is write-once: calling this
    /// twice on the same symbol is a logic error.
    pub fn resolve(&self, id: BindingId) {
        let mut slot = self.binding.borrow_mut();
        assert!(slot.is_none(), "symbol {} resolved twice", self.path);
        *slot = Some(id);
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

/// An overload/variadic-call signature, attached to `Invoke`/`Reduce`
/// nodes by the type checker.
#[derive(Debug, Clone)]
pub struct Signature {
    pub param_types: Vec<Type>,
    pub return_type: Option<Type>,
    pub defun: BindingId,
}

#[derive(Debug, Clone)]
pub enum Expression {
    Constant(BigInt),
    VariableAccess(Symbol),
    ArrayAccess {
        symbol: Symbol,
        index: Node,
    },
    Add(Vec<Node>),
    Sub(Vec<Node>),
    Mul(Vec<Node>),
    List(Vec<Node>),
    Normalise(Node),
    Exp {
        arg: Node,
        pow: Node,
    },
    Shift {
        arg: Node,
        shift: Node,
    },
    Cast {
        arg: Node,
        bitwidth: u16,
    },
    If {
        kind: Cell<IfKind>,
        cond: Node,
        then_branch: Option<Node>,
        else_branch: Option<Node>,
    },
    For {
        loop_var: Symbol,
        start: i64,
        end: i64,
        body: Node,
    },
    Let {
        vars: Vec<Symbol>,
        args: Vec<Node>,
        body: Node,
    },
    Invoke {
        callee: Symbol,
        signature: RefCell<Option<Signature>>,
        args: Vec<Node>,
    },
    Reduce {
        callee: Symbol,
        signature: RefCell<Option<Signature>>,
        arg: Node,
    },
    Debug(Node),
    Void,
}

struct NodeInner {
    id: NodeId,
    expr: Expression,
}

/// A reference-counted AST node. Cloning a `Node` is a pointer clone; use
/// [`shallow_copy`] to obtain a fresh node (new id) sharing the same
/// children.
#[derive(Clone)]
pub struct Node(Rc<NodeInner>);

impl Node {
    pub fn new(expr: Expression) -> Node {
        Node(Rc::new(NodeInner {
            id: fresh_id(),
            expr,
        }))
    }

    pub fn id(&self) -> NodeId {
        self.0.id
    }

    pub fn expr(&self) -> &Expression {
        &self.0.expr
    }

    pub fn constant(v: impl Into<BigInt>) -> Node {
        Node::new(Expression::Constant(v.into()))
    }

    pub fn void() -> Node {
        Node::new(Expression::Void)
    }

    /// Evaluate a compile-time-known value, the `as_constant()` operation
    /// of spec.md §3/§4.5 (used e.g. to finalise `defconst` values and
    /// range bounds).
    pub fn as_constant(&self) -> Option<BigInt> {
        match &self.0.expr {
            Expression::Constant(v) => Some(v.clone()),
            Expression::Add(xs) => xs.iter().try_fold(BigInt::zero(), |acc, x| {
                x.as_constant().map(|v| acc + v)
            }),
            Expression::Sub(xs) => {
                let mut it = xs.iter();
                let first = it.next()?.as_constant()?;
                it.try_fold(first, |acc, x| x.as_constant().map(|v| acc - v))
            }
            Expression::Mul(xs) => xs.iter().try_fold(BigInt::one(), |acc, x| {
                x.as_constant().map(|v| acc * v)
            }),
            Expression::Exp { arg, pow } => {
                let base = arg.as_constant()?;
                let exp = pow.as_constant()?;
                let exp: u32 = exp.try_into().ok()?;
                Some(base.pow(exp))
            }
            Expression::Cast { arg, .. } => arg.as_constant(),
            Expression::List(xs) if xs.len() == 1 => xs[0].as_constant(),
            _ => None,
        }
    }

    /// Product of child multiplicities, with `List` and `For` following
    /// the literal rules of spec.md §3.
    pub fn multiplicity(&self) -> usize {
        match &self.0.expr {
            Expression::Constant(_)
            | Expression::VariableAccess(_)
            | Expression::ArrayAccess { .. }
            | Expression::Void => 1,
            Expression::Add(xs) | Expression::Sub(xs) | Expression::Mul(xs) => {
                xs.iter().map(Node::multiplicity).product()
            }
            Expression::List(xs) => xs.iter().map(Node::multiplicity).product::<usize>().max(1),
            Expression::Normalise(a) | Expression::Cast { arg: a, .. } | Expression::Debug(a) => {
                a.multiplicity()
            }
            Expression::Exp { arg, .. } | Expression::Shift { arg, .. } => arg.multiplicity(),
            Expression::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                cond.multiplicity()
                    * then_branch.as_ref().map_or(1, Node::multiplicity)
                    * else_branch.as_ref().map_or(1, Node::multiplicity)
            }
            Expression::For { start, end, .. } => ((end - start + 1).max(0)) as usize,
            Expression::Let { body, .. } => body.multiplicity(),
            Expression::Invoke { args, .. } => args.iter().map(Node::multiplicity).product(),
            Expression::Reduce { arg, .. } => arg.multiplicity(),
        }
    }

    /// Symbols appearing in this expression, with loop/let-bound
    /// occurrences of their own binder excluded (spec.md §4.4).
    pub fn dependencies(&self) -> Vec<Symbol> {
        let mut out = vec![];
        collect_dependencies(self, &mut out);
        out
    }

    /// The `(module, multiplier)` context this expression belongs to,
    /// computed as the join over every `ColumnBinding` dependency's own
    /// context.
    pub fn context(&self, bindings: &BindingArena) -> Context {
        self.dependencies().into_iter().fold(Context::Void, |acc, sym| {
            let ctx = sym
                .binding()
                .and_then(|id| bindings.get(id))
                .and_then(|b| match b {
                    Binding::Column(c) => Some(Context::concrete(
                        c.context_path.clone(),
                        c.multiplier.max(1),
                    )),
                    _ => None,
                })
                .unwrap_or(Context::Void);
            acc.join(&ctx)
        })
    }
}

fn collect_dependencies(node: &Node, out: &mut Vec<Symbol>) {
    match node.expr() {
        Expression::Constant(_) | Expression::Void => {}
        Expression::VariableAccess(sym) => out.push(sym.clone()),
        Expression::ArrayAccess { symbol, index } => {
            out.push(symbol.clone());
            collect_dependencies(index, out);
        }
        Expression::Add(xs) | Expression::Sub(xs) | Expression::Mul(xs) | Expression::List(xs) => {
            for x in xs {
                collect_dependencies(x, out);
            }
        }
        Expression::Normalise(a) | Expression::Cast { arg: a, .. } | Expression::Debug(a) => {
            collect_dependencies(a, out)
        }
        Expression::Exp { arg, pow } => {
            collect_dependencies(arg, out);
            collect_dependencies(pow, out);
        }
        Expression::Shift { arg, shift } => {
            collect_dependencies(arg, out);
            collect_dependencies(shift, out);
        }
        Expression::If {
            cond,
            then_branch,
            else_branch,
            ..
        } => {
            collect_dependencies(cond, out);
            if let Some(t) = then_branch {
                collect_dependencies(t, out);
            }
            if let Some(e) = else_branch {
                collect_dependencies(e, out);
            }
        }
        Expression::For {
            loop_var, body, ..
        } => {
            let mut inner = vec![];
            collect_dependencies(body, &mut inner);
            let loop_path = &loop_var.path;
            out.extend(inner.into_iter().filter(|s| &s.path != loop_path));
        }
        Expression::Let { vars, args, body } => {
            for a in args {
                collect_dependencies(a, out);
            }
            let mut inner = vec![];
            collect_dependencies(body, &mut inner);
            let bound: Vec<&Path> = vars.iter().map(|v| &v.path).collect();
            out.extend(inner.into_iter().filter(|s| !bound.contains(&&s.path)));
        }
        Expression::Invoke { args, .. } => {
            for a in args {
                collect_dependencies(a, out);
            }
        }
        Expression::Reduce { arg, .. } => collect_dependencies(arg, out),
    }
}

/// Fresh outer node sharing the same children as `node` (spec.md §4.4):
/// used so that a single subtree can be substituted at multiple call
/// sites while each occurrence keeps a distinct identity for source-map
/// purposes.
pub fn shallow_copy(node: &Node) -> Node {
    let expr = match node.expr() {
        Expression::Constant(v) => Expression::Constant(v.clone()),
        Expression::VariableAccess(s) => Expression::VariableAccess(s.clone()),
        Expression::ArrayAccess { symbol, index } => Expression::ArrayAccess {
            symbol: symbol.clone(),
            index: index.clone(),
        },
        Expression::Add(xs) => Expression::Add(xs.clone()),
        Expression::Sub(xs) => Expression::Sub(xs.clone()),
        Expression::Mul(xs) => Expression::Mul(xs.clone()),
        Expression::List(xs) => Expression::List(xs.clone()),
        Expression::Normalise(a) => Expression::Normalise(a.clone()),
        Expression::Exp { arg, pow } => Expression::Exp {
            arg: arg.clone(),
            pow: pow.clone(),
        },
        Expression::Shift { arg, shift } => Expression::Shift {
            arg: arg.clone(),
            shift: shift.clone(),
        },
        Expression::Cast { arg, bitwidth } => Expression::Cast {
            arg: arg.clone(),
            bitwidth: *bitwidth,
        },
        Expression::If {
            kind,
            cond,
            then_branch,
            else_branch,
        } => Expression::If {
            kind: Cell::new(kind.get()),
            cond: cond.clone(),
            then_branch: then_branch.clone(),
            else_branch: else_branch.clone(),
        },
        Expression::For {
            loop_var,
            start,
            end,
            body,
        } => Expression::For {
            loop_var: loop_var.clone(),
            start: *start,
            end: *end,
            body: body.clone(),
        },
        Expression::Let { vars, args, body } => Expression::Let {
            vars: vars.clone(),
            args: args.clone(),
            body: body.clone(),
        },
        Expression::Invoke {
            callee,
            signature,
            args,
        } => Expression::Invoke {
            callee: callee.clone(),
            signature: RefCell::new(signature.borrow().clone()),
            args: args.clone(),
        },
        Expression::Reduce {
            callee,
            signature,
            arg,
        } => Expression::Reduce {
            callee: callee.clone(),
            signature: RefCell::new(signature.borrow().clone()),
            arg: arg.clone(),
        },
        Expression::Debug(a) => Expression::Debug(a.clone()),
        Expression::Void => Expression::Void,
    };
    Node::new(expr)
}

/// Structural substitution: recreates every interior node (so that
/// source-map associations may be rebound to fresh nodes), replacing a
/// `VariableAccess` bound to local-variable index `i` in `map` with
/// `shallow_copy(map[i])`.
///
/// `srcmap`, if given, is called `(new_id, original_id)` for every freshly
/// created node so a caller can thread source-span data through the
/// rewrite, per spec.md §9's suggestion.
pub fn substitute(
    node: &Node,
    map: &HashMap<usize, Node>,
    bindings: &BindingArena,
    srcmap: Option<&mut dyn FnMut(NodeId, NodeId)>,
) -> Node {
    let mut srcmap = srcmap;
    substitute_inner(node, map, bindings, &mut srcmap)
}

fn substitute_inner(
    node: &Node,
    map: &HashMap<usize, Node>,
    bindings: &BindingArena,
    srcmap: &mut Option<&mut dyn FnMut(NodeId, NodeId)>,
) -> Node {
    let record = |new: &Node, srcmap: &mut Option<&mut dyn FnMut(NodeId, NodeId)>| {
        if let Some(f) = srcmap.as_mut() {
            f(new.id(), node.id());
        }
    };

    if let Expression::VariableAccess(sym) = node.expr() {
        if let Some(id) = sym.binding() {
            if let Some(Binding::LocalVariable(lv)) = bindings.get(id) {
                if let Some(replacement) = map.get(&lv.index) {
                    let copy = shallow_copy(replacement);
                    record(&copy, srcmap);
                    return copy;
                }
            }
        }
    }

    let sub1 = |n: &Node, srcmap: &mut Option<&mut dyn FnMut(NodeId, NodeId)>| {
        substitute_inner(n, map, bindings, srcmap)
    };
    let subvec = |xs: &[Node], srcmap: &mut Option<&mut dyn FnMut(NodeId, NodeId)>| -> Vec<Node> {
        xs.iter()
            .map(|x| substitute_inner(x, map, bindings, srcmap))
            .collect()
    };

    let new_expr = match node.expr() {
        Expression::Constant(v) => Expression::Constant(v.clone()),
        Expression::VariableAccess(s) => Expression::VariableAccess(s.clone()),
        Expression::ArrayAccess { symbol, index } => Expression::ArrayAccess {
            symbol: symbol.clone(),
            index: sub1(index, srcmap),
        },
        Expression::Add(xs) => Expression::Add(subvec(xs, srcmap)),
        Expression::Sub(xs) => Expression::Sub(subvec(xs, srcmap)),
        Expression::Mul(xs) => Expression::Mul(subvec(xs, srcmap)),
        Expression::List(xs) => Expression::List(subvec(xs, srcmap)),
        Expression::Normalise(a) => Expression::Normalise(sub1(a, srcmap)),
        Expression::Exp { arg, pow } => Expression::Exp {
            arg: sub1(arg, srcmap),
            pow: sub1(pow, srcmap),
        },
        Expression::Shift { arg, shift } => Expression::Shift {
            arg: sub1(arg, srcmap),
            shift: sub1(shift, srcmap),
        },
        Expression::Cast { arg, bitwidth } => Expression::Cast {
            arg: sub1(arg, srcmap),
            bitwidth: *bitwidth,
        },
        Expression::If {
            kind,
            cond,
            then_branch,
            else_branch,
        } => Expression::If {
            kind: Cell::new(kind.get()),
            cond: sub1(cond, srcmap),
            then_branch: then_branch.as_ref().map(|n| sub1(n, srcmap)),
            else_branch: else_branch.as_ref().map(|n| sub1(n, srcmap)),
        },
        Expression::For {
            loop_var,
            start,
            end,
            body,
        } => Expression::For {
            loop_var: loop_var.clone(),
            start: *start,
            end: *end,
            body: sub1(body, srcmap),
        },
        Expression::Let { vars, args, body } => Expression::Let {
            vars: vars.clone(),
            args: subvec(args, srcmap),
            body: sub1(body, srcmap),
        },
        Expression::Invoke {
            callee,
            signature,
            args,
        } => Expression::Invoke {
            callee: callee.clone(),
            signature: RefCell::new(signature.borrow().clone()),
            args: subvec(args, srcmap),
        },
        Expression::Reduce {
            callee,
            signature,
            arg,
        } => Expression::Reduce {
            callee: callee.clone(),
            signature: RefCell::new(signature.borrow().clone()),
            arg: sub1(arg, srcmap),
        },
        Expression::Debug(a) => Expression::Debug(sub1(a, srcmap)),
        Expression::Void => Expression::Void,
    };
    let new_node = Node::new(new_expr);
    record(&new_node, srcmap);
    new_node
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Node#{}({:?})", self.id(), self.expr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{BindingArena, LocalVariableBinding};

    fn local_access(bindings: &mut BindingArena, index: usize) -> Node {
        let id = bindings.insert(Binding::LocalVariable(LocalVariableBinding {
            name: format!("v{}", index),
            datatype: Type::field(),
            index,
        }));
        let sym = Symbol::new(Path::new(format!("v{}", index)), false);
        sym.resolve(id);
        Node::new(Expression::VariableAccess(sym))
    }

    #[test]
    fn constant_folds_arithmetic() {
        let a = Node::constant(3);
        let b = Node::constant(4);
        let sum = Node::new(Expression::Add(vec![a, b]));
        assert_eq!(sum.as_constant(), Some(BigInt::from(7)));
    }

    #[test]
    fn non_constant_expression_has_no_constant_value() {
        let bindings = BindingArena::new();
        let sym = Symbol::new(Path::new("x"), false);
        let _ = &bindings;
        let n = Node::new(Expression::VariableAccess(sym));
        assert!(n.as_constant().is_none());
    }

    #[test]
    fn multiplicity_of_for_is_end_minus_start_plus_one() {
        let body = Node::constant(0);
        let for_node = Node::new(Expression::For {
            loop_var: Symbol::new(Path::new("i"), false),
            start: 1,
            end: 5,
            body,
        });
        assert_eq!(for_node.multiplicity(), 5);
    }

    #[test]
    fn multiplicity_of_list_multiplies_children() {
        let xs = vec![Node::constant(0), Node::constant(0)];
        let list = Node::new(Expression::List(xs));
        assert_eq!(list.multiplicity(), 1); // constants have multiplicity 1 each
    }

    #[test]
    fn for_loop_variable_is_excluded_from_dependencies() {
        let mut bindings = BindingArena::new();
        let loop_sym = Symbol::new(Path::new("i"), false);
        let loop_access = Node::new(Expression::VariableAccess(loop_sym.clone()));
        let other = local_access(&mut bindings, 0);
        let body = Node::new(Expression::Add(vec![loop_access, other]));
        let for_node = Node::new(Expression::For {
            loop_var: loop_sym,
            start: 0,
            end: 2,
            body,
        });
        let deps = for_node.dependencies();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].path.to_string(), "v0");
    }

    #[test]
    fn substitute_replaces_local_variable_access() {
        let mut bindings = BindingArena::new();
        let param = local_access(&mut bindings, 0);
        let mut map = HashMap::new();
        map.insert(0usize, Node::constant(42));
        let replaced = substitute(&param, &map, &bindings, None);
        assert_eq!(replaced.as_constant(), Some(BigInt::from(42)));
        assert_ne!(replaced.id(), param.id());
    }

    #[test]
    fn substitute_with_empty_map_is_identity_in_shape() {
        let bindings = BindingArena::new();
        let e = Node::new(Expression::Add(vec![Node::constant(1), Node::constant(2)]));
        let map = HashMap::new();
        let copy = substitute(&e, &map, &bindings, None);
        assert_eq!(copy.as_constant(), e.as_constant());
        assert_ne!(copy.id(), e.id());
    }

    #[test]
    fn shallow_copy_shares_children_but_has_fresh_id() {
        let inner = Node::constant(9);
        let outer = Node::new(Expression::Normalise(inner.clone()));
        let copy = shallow_copy(&outer);
        assert_ne!(copy.id(), outer.id());
        if let (Expression::Normalise(a), Expression::Normalise(b)) = (outer.expr(), copy.expr()) {
            assert_eq!(a.id(), b.id());
        } else {
            panic!("expected Normalise");
        }
    }
}
