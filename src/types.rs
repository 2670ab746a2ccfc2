//! Dual-semantics type lattice: field / fixed-width-uint / array types, each
//! carrying at most one semantic tag (none / loobean / boolean).
//!
//! Generalizes the teacher's `Magma { Boolean, Integer }` +
//! `Type { Scalar, Column, List, Void }` (compiler/common.rs,
//! compiler/generator.rs) into the richer dual-semantics model spec.md
//! §4.1 requires.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::cmp::max;
use std::fmt;

/// How a value is meant to be read as a boolean predicate.
///
/// Loobean semantics reads `0` as true (`¬x` is stable under the
/// constraint `x·(1-x)=0` style encodings used by vanishing arithmetic);
/// boolean semantics is the conventional `0` = false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Semantic {
    None,
    Loobean,
    Boolean,
}

/// The underlying (semantic-tag-free) shape of a type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Underlying {
    Field,
    Uint(u16),
    Array {
        element: Box<Underlying>,
        min: usize,
        max: usize,
    },
}

impl Underlying {
    fn join(&self, other: &Underlying) -> Underlying {
        match (self, other) {
            (Underlying::Uint(a), Underlying::Uint(b)) => Underlying::Uint(max(*a, *b)),
            (
                Underlying::Array {
                    element: ea,
                    min: mina,
                    max: maxa,
                },
                Underlying::Array {
                    element: eb,
                    min: minb,
                    max: maxb,
                },
            ) => Underlying::Array {
                element: Box::new(ea.join(eb)),
                min: max(*mina, *minb),
                max: max(*maxa, *maxb),
            },
            _ => Underlying::Field,
        }
    }

    fn glb(&self, other: &Underlying) -> Underlying {
        match (self, other) {
            (Underlying::Uint(a), Underlying::Uint(b)) => Underlying::Uint(*a.min(b)),
            (Underlying::Field, x) | (x, Underlying::Field) => x.clone(),
            (
                Underlying::Array {
                    element: ea,
                    min: mina,
                    max: maxa,
                },
                Underlying::Array {
                    element: eb,
                    min: minb,
                    max: maxb,
                },
            ) => Underlying::Array {
                element: Box::new(ea.glb(eb)),
                min: *mina.min(minb),
                max: *maxa.min(maxb),
            },
            _ => Underlying::Field,
        }
    }

    fn subtype_of(&self, other: &Underlying) -> bool {
        match (self, other) {
            (_, Underlying::Field) => true,
            (Underlying::Uint(a), Underlying::Uint(b)) => a <= b,
            (
                Underlying::Array {
                    element: ea,
                    min: mina,
                    max: maxa,
                },
                Underlying::Array {
                    element: eb,
                    min: minb,
                    max: maxb,
                },
            ) => ea.subtype_of(eb) && mina == minb && maxa == maxb,
            _ => false,
        }
    }
}

impl fmt::Display for Underlying {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Underlying::Field => write!(f, "FIELD"),
            Underlying::Uint(n) => write!(f, "u{}", n),
            Underlying::Array { element, min, max } => write!(f, "{}[{}:{}]", element, min, max),
        }
    }
}

/// A type: an underlying shape plus at most one semantic tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Type {
    underlying: Underlying,
    semantic: Semantic,
}

impl Type {
    pub fn field() -> Type {
        Type {
            underlying: Underlying::Field,
            semantic: Semantic::None,
        }
    }

    pub fn uint(bitwidth: u16) -> Type {
        Type {
            underlying: Underlying::Uint(bitwidth),
            semantic: Semantic::None,
        }
    }

    pub fn array(element: Type, min: usize, max: usize) -> Type {
        Type {
            underlying: Underlying::Array {
                element: Box::new(element.underlying),
                min,
                max,
            },
            semantic: Semantic::None,
        }
    }

    /// Build a type from its raw parts. Used by the type checker to
    /// reconstruct an array's element type, which is not otherwise
    /// reachable through the public constructors.
    pub(crate) fn from_parts(underlying: Underlying, semantic: Semantic) -> Type {
        Type { underlying, semantic }
    }

    pub fn as_uint(&self) -> Option<u16> {
        match self.underlying {
            Underlying::Uint(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_underlying(&self) -> &Underlying {
        &self.underlying
    }

    /// Element type and `(min, max)` length bounds, if this is an array
    /// type. The element type carries this type's own semantic tag.
    pub fn as_array(&self) -> Option<(Type, usize, usize)> {
        match &self.underlying {
            Underlying::Array { element, min, max } => Some((
                Type::from_parts((**element).clone(), self.semantic),
                *min,
                *max,
            )),
            _ => None,
        }
    }

    pub fn semantic(&self) -> Semantic {
        self.semantic
    }

    pub fn is_loobean(&self) -> bool {
        self.semantic == Semantic::Loobean
    }

    pub fn is_boolean(&self) -> bool {
        self.semantic == Semantic::Boolean
    }

    /// Attach loobean semantics; fails if boolean semantics is already set
    /// (a type may carry at most one semantic tag, per spec.md §3).
    pub fn with_loobean_semantics(&self) -> Result<Type> {
        if self.semantic == Semantic::Boolean {
            bail!("cannot attach loobean semantics: type already carries boolean semantics");
        }
        Ok(Type {
            underlying: self.underlying.clone(),
            semantic: Semantic::Loobean,
        })
    }

    pub fn with_boolean_semantics(&self) -> Result<Type> {
        if self.semantic == Semantic::Loobean {
            bail!("cannot attach boolean semantics: type already carries loobean semantics");
        }
        Ok(Type {
            underlying: self.underlying.clone(),
            semantic: Semantic::Boolean,
        })
    }

    pub fn without_semantics(&self) -> Type {
        Type {
            underlying: self.underlying.clone(),
            semantic: Semantic::None,
        }
    }

    /// Least upper bound: underlying types join; the semantic tag is kept
    /// only if both sides agree, otherwise cleared.
    pub fn join(&self, other: &Type) -> Type {
        Type {
            underlying: self.underlying.join(&other.underlying),
            semantic: if self.semantic == other.semantic {
                self.semantic
            } else {
                Semantic::None
            },
        }
    }

    /// Greatest lower bound: dual of `join` on the underlying type; same
    /// semantic-tag rule.
    pub fn glb(&self, other: &Type) -> Type {
        Type {
            underlying: self.underlying.glb(&other.underlying),
            semantic: if self.semantic == other.semantic {
                self.semantic
            } else {
                Semantic::None
            },
        }
    }

    /// Subtyping: `Uint(n) <: Uint(m)` iff `n <= m`; everything is a
    /// subtype of `Field`; array subtyping compares element types and
    /// intervals; semantic tags must match exactly.
    pub fn subtype_of(&self, other: &Type) -> bool {
        self.semantic == other.semantic && self.underlying.subtype_of(&other.underlying)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.semantic {
            Semantic::None => write!(f, "{}", self.underlying),
            Semantic::Loobean => write!(f, "{}@loob", self.underlying),
            Semantic::Boolean => write!(f, "{}@bool", self.underlying),
        }
    }
}
