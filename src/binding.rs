//! The finalisable binding union: what a [`crate::ast::Symbol`] resolves
//! to, once the resolver has run.
//!
//! Generalizes the teacher's in-place `Option<Box<Node>>`/`Option<Type>`
//! mutation (compiler/definitions.rs `Symbol`, `ComputationTable`) into an
//! explicit `Pending -> Final` state transition per spec.md §9's design
//! note: every binding starts life as [`Binding::Pending`] and is
//! finalised exactly once, so a double-finalisation is a catchable bug
//! rather than a silently overwritten value.

use std::collections::HashMap;

use anyhow::{bail, Result};
use num_bigint::BigInt;

use crate::ast::{substitute, Node};
use crate::path::Path;
use crate::types::Type;

pub type BindingId = usize;

/// How many arguments a native or intrinsic form accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Range(usize, usize),
    Any,
}

impl Arity {
    pub fn accepts(&self, n: usize) -> bool {
        match self {
            Arity::Exact(k) => n == *k,
            Arity::AtLeast(k) => n >= *k,
            Arity::Range(lo, hi) => n >= *lo && n <= *hi,
            Arity::Any => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ColumnBinding {
    pub path: Path,
    pub context_path: String,
    /// Set for a target column of a native/interleaving/permutation
    /// declaration rather than a plain `defcolumns` entry (spec.md §3).
    pub computed: bool,
    /// The `@prove` suffix (spec.md §6): whether the translator must emit
    /// a standalone well-formedness proof obligation for this column
    /// rather than relying on it being fully constrained elsewhere.
    pub must_prove: bool,
    pub multiplier: usize,
    pub datatype: Type,
    pub padding_value: Option<BigInt>,
}

#[derive(Debug, Clone)]
pub struct ConstantBinding {
    pub path: Path,
    pub value: BigInt,
    pub datatype: Type,
}

#[derive(Debug, Clone)]
pub struct LocalVariableBinding {
    pub name: String,
    pub datatype: Type,
    pub index: usize,
}

#[derive(Debug, Clone)]
pub struct DefunBinding {
    pub path: Path,
    pub params: Vec<(String, Type)>,
    pub body: Node,
    pub return_type: Option<Type>,
    /// `true` for `defpurefun`, `false` for `defun` (spec.md §3): a pure
    /// function's body may only call other pure functions, and all
    /// overloads sharing a name must agree on this flag.
    pub pure: bool,
}

impl DefunBinding {
    /// Beta-reduce the body against `args`, substituting each parameter's
    /// local-variable occurrence for the corresponding argument node
    /// (spec.md §4.4/§4.7, grounded on the teacher's
    /// `Function::apply`/`FunctionClass::reduce` in compiler/generator.rs).
    pub fn apply(&self, args: &[Node], bindings: &BindingArena) -> Result<Node> {
        if args.len() != self.params.len() {
            bail!(
                "{} expects {} argument(s), got {}",
                self.path,
                self.params.len(),
                args.len()
            );
        }
        let map: HashMap<usize, Node> = args.iter().cloned().enumerate().collect();
        Ok(substitute(&self.body, &map, bindings, None))
    }
}

/// A set of `defun` candidates sharing a name, disambiguated by argument
/// types at each call site.
#[derive(Debug, Clone)]
pub struct OverloadedBinding {
    pub path: Path,
    pub candidates: Vec<BindingId>,
}

impl OverloadedBinding {
    /// Select the most specific candidate whose parameter types are all
    /// supertypes of the corresponding argument types, following the
    /// GLB-under-subtype-preorder rule of spec.md §4.6. Returns `None` on
    /// no match or an ambiguous match.
    pub fn select(&self, arg_types: &[Type], bindings: &BindingArena) -> Option<BindingId> {
        let applicable: Vec<(&BindingId, &DefunBinding)> = self
            .candidates
            .iter()
            .filter_map(|id| match bindings.get(*id) {
                Some(Binding::Defun(d)) => Some((id, d)),
                _ => None,
            })
            .filter(|(_, d)| {
                d.params.len() == arg_types.len()
                    && d.params
                        .iter()
                        .zip(arg_types.iter())
                        .all(|((_, pt), at)| at.subtype_of(pt))
            })
            .collect();

        match applicable.len() {
            0 => None,
            1 => Some(*applicable[0].0),
            _ => {
                // Most specific: one whose every param is a subtype of every
                // other applicable candidate's corresponding param.
                applicable
                    .iter()
                    .find(|(_, d)| {
                        applicable.iter().all(|(_, other)| {
                            d.params
                                .iter()
                                .zip(other.params.iter())
                                .all(|((_, p), (_, op))| p.subtype_of(op))
                        })
                    })
                    .map(|(id, _)| **id)
            }
        }
    }

    /// The purity shared by every overload (spec.md §3's `OverloadedBinding`
    /// invariant: "no two overloads have structurally equal parameter-type
    /// lists" implies they all share purity too, since overloading mixes
    /// only on argument shape). Defaults to `true` - the pure, more
    /// restrictive reading - if no candidate is resolvable yet.
    pub fn pure(&self, bindings: &BindingArena) -> bool {
        self.candidates
            .iter()
            .find_map(|id| match bindings.get(*id) {
                Some(Binding::Defun(d)) => Some(d.pure),
                _ => None,
            })
            .unwrap_or(true)
    }
}

#[derive(Debug, Clone)]
pub struct NativeDefinition {
    pub name: String,
    pub arity: Arity,
    /// DESIGN.md's Open Question decision: every native is a deterministic
    /// function of its inputs, so natives are treated as pure and may be
    /// called from within a `defpurefun` body.
    pub pure: bool,
}

#[derive(Debug, Clone)]
pub struct IntrinsicDefinition {
    pub name: String,
    pub arity: Arity,
}

#[derive(Debug, Clone)]
pub struct PerspectiveBinding {
    pub path: Path,
    pub guard: Option<Node>,
}

/// A declared-but-not-yet-resolved binding: a placeholder created when a
/// symbol table entry is first installed (at declaration order), before
/// the resolver has determined what it actually denotes.
#[derive(Debug, Clone)]
pub struct PendingBinding {
    pub path: Path,
    pub is_function: bool,
}

#[derive(Debug, Clone)]
pub enum Binding {
    Pending(PendingBinding),
    Column(ColumnBinding),
    Constant(ConstantBinding),
    LocalVariable(LocalVariableBinding),
    Defun(DefunBinding),
    Overloaded(OverloadedBinding),
    Native(NativeDefinition),
    Intrinsic(IntrinsicDefinition),
    Perspective(PerspectiveBinding),
}

impl Binding {
    pub fn is_pending(&self) -> bool {
        matches!(self, Binding::Pending(_))
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Binding::Pending(p) => Some(&p.path),
            Binding::Column(c) => Some(&c.path),
            Binding::Constant(c) => Some(&c.path),
            Binding::Defun(d) => Some(&d.path),
            Binding::Overloaded(o) => Some(&o.path),
            Binding::Perspective(p) => Some(&p.path),
            Binding::LocalVariable(_) | Binding::Native(_) | Binding::Intrinsic(_) => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Binding::Pending(_) => "pending",
            Binding::Column(_) => "column",
            Binding::Constant(_) => "constant",
            Binding::LocalVariable(_) => "local variable",
            Binding::Defun(_) => "function",
            Binding::Overloaded(_) => "overloaded function",
            Binding::Native(_) => "native",
            Binding::Intrinsic(_) => "intrinsic",
            Binding::Perspective(_) => "perspective",
        }
    }
}

/// The arena all bindings are stored in; symbols refer to entries by
/// [`BindingId`] rather than owning them directly, mirroring the
/// arena-indexed scope tree in `scope.rs`.
#[derive(Debug, Default)]
pub struct BindingArena {
    slots: Vec<Binding>,
}

impl BindingArena {
    pub fn new() -> Self {
        BindingArena { slots: vec![] }
    }

    pub fn declare(&mut self, pending: PendingBinding) -> BindingId {
        self.slots.push(Binding::Pending(pending));
        self.slots.len() - 1
    }

    /// Insert an already-final binding directly (used for natives,
    /// intrinsics, and local variables, which never pass through a
    /// pending state).
    pub fn insert(&mut self, binding: Binding) -> BindingId {
        self.slots.push(binding);
        self.slots.len() - 1
    }

    pub fn get(&self, id: BindingId) -> Option<&Binding> {
        self.slots.get(id)
    }

    /// Replace a pending binding with its final content. Errors if `id`
    /// was already finalised.
    pub fn finalize(&mut self, id: BindingId, binding: Binding) -> Result<()> {
        match self.slots.get(id) {
            Some(Binding::Pending(_)) => {
                self.slots[id] = binding;
                Ok(())
            }
            Some(other) => bail!(
                "binding {} already finalised as {}",
                id,
                other.kind_name()
            ),
            None => bail!("no such binding {}", id),
        }
    }

    pub fn is_pending(&self, id: BindingId) -> bool {
        self.slots.get(id).map_or(false, Binding::is_pending)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (BindingId, &Binding)> {
        self.slots.iter().enumerate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expression;

    #[test]
    fn pending_binding_finalises_once() {
        let mut arena = BindingArena::new();
        let id = arena.declare(PendingBinding {
            path: Path::new("X"),
            is_function: false,
        });
        assert!(arena.is_pending(id));
        arena
            .finalize(
                id,
                Binding::Constant(ConstantBinding {
                    path: Path::new("X"),
                    value: BigInt::from(7),
                    datatype: Type::field(),
                }),
            )
            .unwrap();
        assert!(!arena.is_pending(id));
        let err = arena.finalize(
            id,
            Binding::Constant(ConstantBinding {
                path: Path::new("X"),
                value: BigInt::from(8),
                datatype: Type::field(),
            }),
        );
        assert!(err.is_err());
    }

    #[test]
    fn overload_selects_unique_applicable_candidate() {
        let mut arena = BindingArena::new();
        let narrow = arena.insert(Binding::Defun(DefunBinding {
            path: Path::new("f"),
            params: vec![("x".into(), Type::uint(8))],
            body: Node::new(Expression::Void),
            return_type: None,
            pure: false,
        }));
        let wide = arena.insert(Binding::Defun(DefunBinding {
            path: Path::new("f"),
            params: vec![("x".into(), Type::field())],
            body: Node::new(Expression::Void),
            return_type: None,
            pure: false,
        }));
        let overload = OverloadedBinding {
            path: Path::new("f"),
            candidates: vec![narrow, wide],
        };
        // A uint(8) argument is applicable to both, but uint(8) is the most
        // specific (narrow is a subtype of wide's param), so it wins.
        let chosen = overload.select(&[Type::uint(8)], &arena);
        assert_eq!(chosen, Some(narrow));
    }

    #[test]
    fn overload_selection_fails_with_no_applicable_candidate() {
        let mut arena = BindingArena::new();
        let narrow = arena.insert(Binding::Defun(DefunBinding {
            path: Path::new("f"),
            params: vec![("x".into(), Type::uint(8))],
            body: Node::new(Expression::Void),
            return_type: None,
            pure: false,
        }));
        let overload = OverloadedBinding {
            path: Path::new("f"),
            candidates: vec![narrow],
        };
        assert_eq!(overload.select(&[Type::array(Type::field(), 1, 1)], &arena), None);
    }

    #[test]
    fn defun_apply_substitutes_parameters() {
        let mut arena = BindingArena::new();
        let param_binding = arena.insert(Binding::LocalVariable(LocalVariableBinding {
            name: "x".into(),
            datatype: Type::field(),
            index: 0,
        }));
        let sym = crate::ast::Symbol::new(Path::new("x"), false);
        sym.resolve(param_binding);
        let body = Node::new(Expression::VariableAccess(sym));
        let defun = DefunBinding {
            path: Path::new("id"),
            params: vec![("x".into(), Type::field())],
            body,
            return_type: Some(Type::field()),
            pure: false,
        };
        let result = defun.apply(&[Node::constant(5)], &arena).unwrap();
        assert_eq!(result.as_constant(), Some(BigInt::from(5)));
    }

    #[test]
    fn arity_range_accepts_inclusive_bounds() {
        let a = Arity::Range(1, 3);
        assert!(a.accepts(1));
        assert!(a.accepts(3));
        assert!(!a.accepts(4));
    }
}
