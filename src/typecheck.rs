//! Bidirectional type checking over the expression tree (spec.md §4.6):
//! `infer` synthesises a type bottom-up, `check` verifies an expression
//! against an expected type by inferring and testing subtyping, overload
//! candidates are narrowed with [`crate::binding::OverloadedBinding::select`],
//! and `If` nodes have their loobean/boolean reading attached as a side
//! effect once their condition's type is known.
//!
//! Grounded on the teacher's `Type::max`/arity-checking pass in
//! compiler/generator.rs (`Expression::len`, `Builtin::typer`),
//! generalized with the explicit infer/check split and the dual loobean
//! semantics spec.md §4.1/§4.6 add on top of the teacher's single
//! `Magma` tag.

use crate::ast::{Expression, IfKind, Node};
use crate::binding::{Binding, BindingArena};
use crate::diagnostics::{Category, Diagnostic};
use crate::types::{Semantic, Type};

type TypeResult = Result<Type, Diagnostic>;

fn err(message: impl Into<String>) -> Diagnostic {
    Diagnostic::new(Category::Typing, None, message.into())
}

/// Synthesise the type of `node`, attaching any side-effects (overload
/// selection, `If`-kind inference) the teacher's single-pass typer would
/// have folded into evaluation.
pub fn infer(node: &Node, bindings: &BindingArena) -> TypeResult {
    match node.expr() {
        Expression::Constant(v) => Ok(Type::uint(v.bits().max(1) as u16)),
        Expression::Void => Ok(Type::field()),

        Expression::VariableAccess(sym) => {
            let id = sym
                .binding()
                .ok_or_else(|| err(format!("{} was never resolved", sym.path)))?;
            match bindings.get(id) {
                Some(Binding::Column(c)) => Ok(c.datatype.clone()),
                Some(Binding::Constant(c)) => Ok(c.datatype.clone()),
                Some(Binding::LocalVariable(lv)) => Ok(lv.datatype.clone()),
                Some(other) => Err(err(format!(
                    "{} denotes a {}, not a value",
                    sym.path,
                    other.kind_name()
                ))),
                None => Err(err(format!("{} has a dangling binding id", sym.path))),
            }
        }

        Expression::ArrayAccess { symbol, index } => {
            let index_ty = infer(index, bindings)?;
            if index_ty.as_uint().is_none() && !matches!(index_ty.as_underlying(), crate::types::Underlying::Field) {
                return Err(err(format!("array index must be numeric in {}", symbol)));
            }
            let id = symbol
                .binding()
                .ok_or_else(|| err(format!("{} was never resolved", symbol.path)))?;
            match bindings.get(id) {
                Some(Binding::Column(c)) => c
                    .datatype
                    .as_array()
                    .map(|(elem, _, _)| elem)
                    .ok_or_else(|| err(format!("{} is not an array column", symbol.path))),
                Some(other) => Err(err(format!(
                    "{} denotes a {}, not an array",
                    symbol.path,
                    other.kind_name()
                ))),
                None => Err(err(format!("{} has a dangling binding id", symbol.path))),
            }
        }

        Expression::Add(xs) | Expression::Sub(xs) => join_all(xs, bindings),

        // Mul narrows rather than widens: the product of a narrow and a
        // wide operand is only as trustworthy as the narrow one (spec.md
        // §4.6, scenario S1: `(* X X)` with `X :byte` types as `Uint(8)`,
        // not the joined width).
        Expression::Mul(xs) => glb_all(xs, bindings),

        Expression::List(xs) => join_all(xs, bindings),

        Expression::Normalise(a) => {
            infer(a, bindings)?;
            Ok(Type::uint(1))
        }

        Expression::Exp { arg, pow } => {
            let ty = infer(arg, bindings)?;
            let _ = infer(pow, bindings)?;
            if pow.as_constant().is_none() {
                return Err(err("exponent must be a compile-time constant"));
            }
            Ok(ty)
        }

        Expression::Shift { arg, shift } => {
            let ty = infer(arg, bindings)?;
            let _ = infer(shift, bindings)?;
            if shift.as_constant().is_none() {
                return Err(err("shift amount must be a compile-time constant"));
            }
            Ok(ty)
        }

        Expression::Cast { arg, .. } => infer(arg, bindings),

        Expression::If {
            kind,
            cond,
            then_branch,
            else_branch,
        } => {
            let cond_ty = infer(cond, bindings)?;
            kind.set(infer_if_kind(&cond_ty));
            let then_ty = then_branch
                .as_ref()
                .map(|n| infer(n, bindings))
                .transpose()?;
            let else_ty = else_branch
                .as_ref()
                .map(|n| infer(n, bindings))
                .transpose()?;
            Ok(match (then_ty, else_ty) {
                (Some(a), Some(b)) => a.glb(&b),
                (Some(a), None) | (None, Some(a)) => a,
                (None, None) => Type::field(),
            })
        }

        Expression::For {
            loop_var: _,
            body,
            ..
        } => infer(body, bindings),

        Expression::Let { args, body, vars } => {
            if args.len() != vars.len() {
                return Err(err("let binds a different number of names than values"));
            }
            for a in args {
                infer(a, bindings)?;
            }
            infer(body, bindings)
        }

        Expression::Invoke {
            callee,
            signature,
            args,
        } => {
            let arg_types: Vec<Type> = args
                .iter()
                .map(|a| infer(a, bindings))
                .collect::<Result<_, _>>()?;
            let id = callee
                .binding()
                .ok_or_else(|| err(format!("{} was never resolved", callee.path)))?;
            match bindings.get(id) {
                Some(Binding::Native(n)) => {
                    if !n.arity.accepts(args.len()) {
                        return Err(err(format!(
                            "{} called with {} argument(s)",
                            n.name,
                            args.len()
                        )));
                    }
                    native_return_type(&n.name, &arg_types)
                }
                Some(Binding::Defun(d)) => {
                    if d.params.len() != args.len() {
                        return Err(err(format!(
                            "{} expects {} argument(s), got {}",
                            callee.path,
                            d.params.len(),
                            args.len()
                        )));
                    }
                    for (at, (_, pt)) in arg_types.iter().zip(d.params.iter()) {
                        if !at.subtype_of(pt) {
                            return Err(err(format!(
                                "argument type {} is not compatible with parameter type {} in {}",
                                at, pt, callee.path
                            )));
                        }
                    }
                    *signature.borrow_mut() = Some(crate::ast::Signature {
                        param_types: d.params.iter().map(|(_, t)| t.clone()).collect(),
                        return_type: d.return_type.clone(),
                        defun: id,
                    });
                    Ok(d.return_type.clone().unwrap_or_else(Type::field))
                }
                Some(Binding::Overloaded(o)) => {
                    let chosen = o
                        .select(&arg_types, bindings)
                        .ok_or_else(|| err(format!("no overload of {} matches the argument types", callee.path)))?;
                    if let Some(Binding::Defun(d)) = bindings.get(chosen) {
                        *signature.borrow_mut() = Some(crate::ast::Signature {
                            param_types: d.params.iter().map(|(_, t)| t.clone()).collect(),
                            return_type: d.return_type.clone(),
                            defun: chosen,
                        });
                        Ok(d.return_type.clone().unwrap_or_else(Type::field))
                    } else {
                        Err(err(format!("overload resolution for {} picked a non-function binding", callee.path)))
                    }
                }
                Some(other) => Err(err(format!(
                    "{} denotes a {}, not something callable",
                    callee.path,
                    other.kind_name()
                ))),
                None => Err(err(format!("{} has a dangling binding id", callee.path))),
            }
        }

        Expression::Reduce {
            callee,
            signature,
            arg,
        } => {
            let arg_ty = infer(arg, bindings)?;
            let (elem_ty, _, _) = arg_ty
                .as_array()
                .ok_or_else(|| err(format!("{} can only reduce over an array", callee.path)))?;
            let id = callee
                .binding()
                .ok_or_else(|| err(format!("{} was never resolved", callee.path)))?;
            match bindings.get(id) {
                Some(Binding::Defun(d)) if d.params.len() == 2 => {
                    *signature.borrow_mut() = Some(crate::ast::Signature {
                        param_types: d.params.iter().map(|(_, t)| t.clone()).collect(),
                        return_type: d.return_type.clone(),
                        defun: id,
                    });
                    Ok(d.return_type.clone().unwrap_or(elem_ty))
                }
                Some(Binding::Native(n)) if n.arity.accepts(2) => native_return_type(&n.name, &[elem_ty.clone(), elem_ty]),
                _ => Err(err(format!("{} is not a valid reduction function", callee.path))),
            }
        }

        Expression::Debug(a) => infer(a, bindings),
    }
}

/// Verify `node` against `expected`: infer, then require subtyping.
pub fn check(node: &Node, expected: &Type, bindings: &BindingArena) -> Result<(), Diagnostic> {
    let actual = infer(node, bindings)?;
    if actual.subtype_of(expected) {
        Ok(())
    } else {
        Err(err(format!(
            "expected a value of type {}, found {}",
            expected, actual
        )))
    }
}

fn join_all(xs: &[Node], bindings: &BindingArena) -> TypeResult {
    let mut iter = xs.iter();
    let first = iter
        .next()
        .ok_or_else(|| err("expected at least one operand"))?;
    let mut ty = infer(first, bindings)?;
    for x in iter {
        ty = ty.join(&infer(x, bindings)?);
    }
    Ok(ty)
}

fn glb_all(xs: &[Node], bindings: &BindingArena) -> TypeResult {
    let mut iter = xs.iter();
    let first = iter
        .next()
        .ok_or_else(|| err("expected at least one operand"))?;
    let mut ty = infer(first, bindings)?;
    for x in iter {
        ty = ty.glb(&infer(x, bindings)?);
    }
    Ok(ty)
}

/// Predicate semantics `If` attaches to an `unknown`-kind node once its
/// condition's type is known: a loobean-tagged condition reads `0` as
/// true (`ifzero`), everything else reads nonzero as true (`ifnotzero`).
fn infer_if_kind(cond_ty: &Type) -> IfKind {
    if cond_ty.is_loobean() {
        IfKind::IfZero
    } else {
        IfKind::IfNotZero
    }
}

fn native_return_type(name: &str, arg_types: &[Type]) -> TypeResult {
    match name {
        "+" | "-" | "*" | "~" | "shift" => {
            let mut iter = arg_types.iter();
            let first = iter
                .next()
                .cloned()
                .ok_or_else(|| err(format!("{} needs at least one argument", name)))?;
            Ok(iter.fold(first, |acc, t| acc.join(t)))
        }
        "eq" | "neq" | "not" | "is-zero" | "is-binary" => {
            Type::uint(1).with_loobean_semantics().map_err(|e| err(e.to_string()))
        }
        "and" | "or" => {
            let sem = arg_types
                .first()
                .map(Type::semantic)
                .unwrap_or(Semantic::None);
            let base = Type::uint(1);
            match sem {
                Semantic::Boolean => base.with_boolean_semantics().map_err(|e| err(e.to_string())),
                _ => base.with_loobean_semantics().map_err(|e| err(e.to_string())),
            }
        }
        "force-bool" => Type::uint(1).with_boolean_semantics().map_err(|e| err(e.to_string())),
        "nth" => arg_types
            .first()
            .and_then(|t| t.as_array())
            .map(|(elem, _, _)| elem)
            .ok_or_else(|| err("nth's first argument must be an array")),
        "len" => Ok(Type::field()),
        _ => Err(err(format!("unknown native {}", name))),
    }
}
