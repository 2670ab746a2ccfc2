//! Macro/loop/reduction expansion (spec.md §4.7): `for`-loop unrolling,
//! user-function inlining, left-fold reduction, and debug-statement
//! pruning, run to a fixed point since any one rewrite can expose another
//! (an unrolled loop body may itself invoke a function; inlining that
//! invocation may expose a further reduction).
//!
//! Grounded on the teacher's `reduce`/`reduce_toplevel` fixed-point loop
//! over `Expression` (compiler/generator.rs), generalized to the
//! dedicated node kinds (`For`, `Let`, `Invoke`, `Reduce`, `Debug`)
//! spec.md §3/§4.7 add on top of the teacher's plain `Funcall`.

use std::collections::HashMap;

use crate::ast::{substitute, Expression, Node};
use crate::binding::{Binding, BindingArena};
use crate::diagnostics::{Category, Diagnostic};

pub const DEFAULT_MAX_PASSES: usize = 32;

#[derive(Debug, Clone, Copy)]
pub struct PreprocessOptions {
    /// Keep `debug` wrappers in the tree (a `--debug` compile run);
    /// otherwise they are transparently removed.
    pub keep_debug: bool,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        PreprocessOptions { keep_debug: false }
    }
}

fn err(message: impl Into<String>) -> Diagnostic {
    Diagnostic::new(Category::Structural, None, message.into())
}

/// Run one bottom-up rewrite pass, reporting whether anything changed.
fn pass(
    node: &Node,
    bindings: &BindingArena,
    opts: PreprocessOptions,
    changed: &mut bool,
) -> Result<Node, Diagnostic> {
    let rewritten = match node.expr() {
        Expression::Constant(_) | Expression::Void | Expression::VariableAccess(_) => {
            node.clone()
        }

        Expression::ArrayAccess { symbol, index } => {
            let index = pass(index, bindings, opts, changed)?;
            Node::new(Expression::ArrayAccess {
                symbol: symbol.clone(),
                index,
            })
        }

        Expression::Add(xs) => rebuild_variadic(xs, bindings, opts, changed, Expression::Add)?,
        Expression::Sub(xs) => rebuild_variadic(xs, bindings, opts, changed, Expression::Sub)?,
        Expression::Mul(xs) => rebuild_variadic(xs, bindings, opts, changed, Expression::Mul)?,
        Expression::List(xs) => rebuild_variadic(xs, bindings, opts, changed, Expression::List)?,

        Expression::Normalise(a) => {
            Node::new(Expression::Normalise(pass(a, bindings, opts, changed)?))
        }
        Expression::Exp { arg, pow } => Node::new(Expression::Exp {
            arg: pass(arg, bindings, opts, changed)?,
            pow: pass(pow, bindings, opts, changed)?,
        }),
        Expression::Shift { arg, shift } => Node::new(Expression::Shift {
            arg: pass(arg, bindings, opts, changed)?,
            shift: pass(shift, bindings, opts, changed)?,
        }),
        Expression::Cast { arg, bitwidth } => Node::new(Expression::Cast {
            arg: pass(arg, bindings, opts, changed)?,
            bitwidth: *bitwidth,
        }),

        Expression::If {
            kind,
            cond,
            then_branch,
            else_branch,
        } => Node::new(Expression::If {
            kind: std::cell::Cell::new(kind.get()),
            cond: pass(cond, bindings, opts, changed)?,
            then_branch: then_branch
                .as_ref()
                .map(|n| pass(n, bindings, opts, changed))
                .transpose()?,
            else_branch: else_branch
                .as_ref()
                .map(|n| pass(n, bindings, opts, changed))
                .transpose()?,
        }),

        Expression::For {
            loop_var,
            start,
            end,
            body,
        } => {
            *changed = true;
            let local_id = loop_var
                .binding()
                .ok_or_else(|| err("for loop variable was never bound"))?;
            let index = match bindings.get(local_id) {
                Some(Binding::LocalVariable(lv)) => lv.index,
                _ => return Err(err("for loop variable does not resolve to a local")),
            };
            let mut items = vec![];
            for i in *start..=*end {
                let mut map = HashMap::new();
                map.insert(index, Node::constant(i));
                items.push(substitute(body, &map, bindings, None));
            }
            let unrolled = Node::new(Expression::List(items));
            pass(&unrolled, bindings, opts, changed)?
        }

        Expression::Let { vars, args, body } => {
            *changed = true;
            let args: Vec<Node> = args
                .iter()
                .map(|a| pass(a, bindings, opts, changed))
                .collect::<Result<_, _>>()?;
            let mut map = HashMap::new();
            for (v, a) in vars.iter().zip(args.iter()) {
                let id = v
                    .binding()
                    .ok_or_else(|| err("let-bound name was never bound"))?;
                if let Some(Binding::LocalVariable(lv)) = bindings.get(id) {
                    map.insert(lv.index, a.clone());
                }
            }
            let substituted = substitute(body, &map, bindings, None);
            pass(&substituted, bindings, opts, changed)?
        }

        Expression::Invoke {
            callee,
            signature,
            args,
        } => {
            let args: Vec<Node> = args
                .iter()
                .map(|a| pass(a, bindings, opts, changed))
                .collect::<Result<_, _>>()?;
            let id = callee
                .binding()
                .ok_or_else(|| err(format!("{} was never resolved", callee.path)))?;
            match bindings.get(id) {
                Some(Binding::Defun(d)) => {
                    *changed = true;
                    let applied = d.apply(&args, bindings).map_err(|e| err(e.to_string()))?;
                    pass(&applied, bindings, opts, changed)?
                }
                Some(Binding::Overloaded(_)) => {
                    let chosen = signature.borrow().as_ref().map(|s| s.defun);
                    match chosen.and_then(|id| bindings.get(id)) {
                        Some(Binding::Defun(d)) => {
                            *changed = true;
                            let applied =
                                d.apply(&args, bindings).map_err(|e| err(e.to_string()))?;
                            pass(&applied, bindings, opts, changed)?
                        }
                        _ => return Err(err(format!(
                            "{} was not resolved to a concrete overload before preprocessing",
                            callee.path
                        ))),
                    }
                }
                Some(Binding::Native(n)) => match lower_native(&n.name, args.clone()) {
                    Some(lowered) => {
                        *changed = true;
                        pass(&lowered, bindings, opts, changed)?
                    }
                    None => Node::new(Expression::Invoke {
                        callee: callee.clone(),
                        signature: std::cell::RefCell::new(signature.borrow().clone()),
                        args,
                    }),
                },
                _ => return Err(err(format!("{} is not callable", callee.path))),
            }
        }

        Expression::Reduce {
            callee,
            signature,
            arg,
        } => {
            let arg = pass(arg, bindings, opts, changed)?;
            match arg.expr() {
                Expression::List(items) if !items.is_empty() => {
                    *changed = true;
                    let defun_id = signature
                        .borrow()
                        .as_ref()
                        .map(|s| s.defun)
                        .or_else(|| callee.binding())
                        .ok_or_else(|| err(format!("{} was never resolved", callee.path)))?;
                    let defun = match bindings.get(defun_id) {
                        Some(Binding::Defun(d)) => d,
                        _ => return Err(err(format!("{} is not a valid reduction function", callee.path))),
                    };
                    let mut acc = items[0].clone();
                    for item in &items[1..] {
                        acc = defun
                            .apply(&[acc, item.clone()], bindings)
                            .map_err(|e| err(e.to_string()))?;
                    }
                    pass(&acc, bindings, opts, changed)?
                }
                Expression::List(_) => {
                    return Err(err(format!("{} over an empty sequence has no value", callee.path)))
                }
                _ => Node::new(Expression::Reduce {
                    callee: callee.clone(),
                    signature: std::cell::RefCell::new(signature.borrow().clone()),
                    arg,
                }),
            }
        }

        Expression::Debug(a) => {
            let inner = pass(a, bindings, opts, changed)?;
            if opts.keep_debug {
                Node::new(Expression::Debug(inner))
            } else {
                *changed = true;
                inner
            }
        }
    };
    Ok(rewritten)
}

/// Rebuild an `Add`/`Sub`/`Mul`/`List` node from its recursively
/// preprocessed children, dropping any `Void` children per spec.md
/// §4.7's void-expression rule (a pruned `debug` or an empty branch
/// should not poison an otherwise meaningful arithmetic expression). A
/// node left with no children at all collapses to `Void`.
fn rebuild_variadic(
    xs: &[Node],
    bindings: &BindingArena,
    opts: PreprocessOptions,
    changed: &mut bool,
    ctor: fn(Vec<Node>) -> Expression,
) -> Result<Node, Diagnostic> {
    let mut out = vec![];
    for x in xs {
        let rewritten = pass(x, bindings, opts, changed)?;
        if matches!(rewritten.expr(), Expression::Void) {
            *changed = true;
            continue;
        }
        out.push(rewritten);
    }
    if out.is_empty() {
        Ok(Node::void())
    } else {
        Ok(Node::new(ctor(out)))
    }
}

fn lower_native(name: &str, mut args: Vec<Node>) -> Option<Expression> {
    match name {
        "+" => Some(Expression::Add(args)),
        "-" => Some(Expression::Sub(args)),
        "*" => Some(Expression::Mul(args)),
        "~" if args.len() == 1 => Some(Expression::Normalise(args.pop().unwrap())),
        "shift" if args.len() == 2 => {
            let shift = args.pop().unwrap();
            let arg = args.pop().unwrap();
            Some(Expression::Shift { arg, shift })
        }
        _ => None,
    }
}

/// Run [`pass`] to a fixed point: repeatedly rewrite until a pass makes
/// no further change, or `max_passes` is reached.
pub fn preprocess(
    node: &Node,
    bindings: &BindingArena,
    opts: PreprocessOptions,
    max_passes: usize,
) -> Result<Node, Diagnostic> {
    let mut current = node.clone();
    for _ in 0..max_passes {
        let mut changed = false;
        current = pass(&current, bindings, opts, &mut changed)?;
        if !changed {
            return Ok(current);
        }
    }
    Err(err(format!(
        "preprocessing did not reach a fixed point within {} pass(es)",
        max_passes
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Symbol;
    use crate::binding::{DefunBinding, LocalVariableBinding};
    use crate::path::Path;
    use crate::types::Type;
    use num_bigint::BigInt;

    fn local(bindings: &mut BindingArena, index: usize) -> (Symbol, crate::binding::BindingId) {
        let id = bindings.insert(Binding::LocalVariable(LocalVariableBinding {
            name: format!("i{}", index),
            datatype: Type::field(),
            index,
        }));
        let sym = Symbol::new(Path::new(format!("i{}", index)), false);
        sym.resolve(id);
        (sym, id)
    }

    #[test]
    fn for_loop_unrolls_into_a_list_of_constants() {
        let mut bindings = BindingArena::new();
        let (loop_var, _) = local(&mut bindings, 0);
        let body = Node::new(Expression::VariableAccess(loop_var.clone()));
        let for_node = Node::new(Expression::For {
            loop_var,
            start: 0,
            end: 2,
            body,
        });
        let result = preprocess(&for_node, &bindings, PreprocessOptions::default(), DEFAULT_MAX_PASSES)
            .unwrap();
        match result.expr() {
            Expression::List(items) => {
                assert_eq!(items.len(), 3);
                assert_eq!(items[0].as_constant(), Some(BigInt::from(0)));
                assert_eq!(items[2].as_constant(), Some(BigInt::from(2)));
            }
            other => panic!("expected List, got {:?}", other),
        }
    }

    #[test]
    fn invoke_of_a_defun_is_inlined() {
        let mut bindings = BindingArena::new();
        let (param, _) = local(&mut bindings, 0);
        let body = Node::new(Expression::Mul(vec![
            Node::new(Expression::VariableAccess(param.clone())),
            Node::constant(2),
        ]));
        let defun_id = bindings.insert(Binding::Defun(DefunBinding {
            path: Path::new("double"),
            params: vec![("x".into(), Type::field())],
            body,
            return_type: Some(Type::field()),
            pure: false,
        }));
        let callee = Symbol::new(Path::new("double"), true);
        callee.resolve(defun_id);
        let invoke = Node::new(Expression::Invoke {
            callee,
            signature: std::cell::RefCell::new(None),
            args: vec![Node::constant(21)],
        });
        let result =
            preprocess(&invoke, &bindings, PreprocessOptions::default(), DEFAULT_MAX_PASSES)
                .unwrap();
        assert_eq!(result.as_constant(), Some(BigInt::from(42)));
    }

    #[test]
    fn reduce_left_folds_over_a_list() {
        let mut bindings = BindingArena::new();
        let (a, _) = local(&mut bindings, 0);
        let (b, _) = local(&mut bindings, 1);
        let body = Node::new(Expression::Add(vec![
            Node::new(Expression::VariableAccess(a.clone())),
            Node::new(Expression::VariableAccess(b.clone())),
        ]));
        let defun_id = bindings.insert(Binding::Defun(DefunBinding {
            path: Path::new("plus"),
            params: vec![("a".into(), Type::field()), ("b".into(), Type::field())],
            body,
            return_type: Some(Type::field()),
            pure: false,
        }));
        let callee = Symbol::new(Path::new("plus"), true);
        callee.resolve(defun_id);
        let list = Node::new(Expression::List(vec![
            Node::constant(1),
            Node::constant(2),
            Node::constant(3),
        ]));
        let reduce = Node::new(Expression::Reduce {
            callee,
            signature: std::cell::RefCell::new(None),
            arg: list,
        });
        let result =
            preprocess(&reduce, &bindings, PreprocessOptions::default(), DEFAULT_MAX_PASSES)
                .unwrap();
        assert_eq!(result.as_constant(), Some(BigInt::from(6)));
    }

    #[test]
    fn debug_is_pruned_by_default_but_kept_when_requested() {
        let bindings = BindingArena::new();
        let debug = Node::new(Expression::Debug(Node::constant(7)));
        let pruned =
            preprocess(&debug, &bindings, PreprocessOptions::default(), DEFAULT_MAX_PASSES)
                .unwrap();
        assert_eq!(pruned.as_constant(), Some(BigInt::from(7)));

        let kept = preprocess(
            &debug,
            &bindings,
            PreprocessOptions { keep_debug: true },
            DEFAULT_MAX_PASSES,
        )
        .unwrap();
        assert!(matches!(kept.expr(), Expression::Debug(_)));
    }

    #[test]
    fn pruned_debug_child_is_dropped_from_surrounding_list() {
        let bindings = BindingArena::new();
        let list = Node::new(Expression::List(vec![
            Node::constant(1),
            Node::new(Expression::Debug(Node::void())),
        ]));
        let result =
            preprocess(&list, &bindings, PreprocessOptions::default(), DEFAULT_MAX_PASSES)
                .unwrap();
        match result.expr() {
            Expression::List(items) => assert_eq!(items.len(), 1),
            other => panic!("expected List, got {:?}", other),
        }
    }
}
