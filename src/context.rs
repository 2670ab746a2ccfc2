//! The `(module, length-multiplier)` context an expression belongs to, and
//! its conflict lattice `Void ⊑ Concrete(m,μ) ⊑ Conflicted`.
//!
//! New relative to the teacher, which has no multi-table/perspective
//! notion; shaped after the teacher's own least-upper-bound pattern
//! (`Type::max`, compiler/generator.rs) applied to this different domain.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Context {
    Void,
    Concrete { module: String, multiplier: usize },
    Conflicted,
}

impl Context {
    pub fn concrete<S: Into<String>>(module: S, multiplier: usize) -> Context {
        Context::Concrete {
            module: module.into(),
            multiplier,
        }
    }

    /// Join two contexts along the conflict lattice: `Void` is the
    /// identity, two distinct concretes (differing module or multiplier)
    /// collapse to `Conflicted`.
    pub fn join(&self, other: &Context) -> Context {
        match (self, other) {
            (Context::Void, x) | (x, Context::Void) => x.clone(),
            (Context::Conflicted, _) | (_, Context::Conflicted) => Context::Conflicted,
            (
                Context::Concrete {
                    module: m1,
                    multiplier: mu1,
                },
                Context::Concrete {
                    module: m2,
                    multiplier: mu2,
                },
            ) => {
                if m1 == m2 && mu1 == mu2 {
                    self.clone()
                } else {
                    Context::Conflicted
                }
            }
        }
    }

    pub fn is_conflicted(&self) -> bool {
        matches!(self, Context::Conflicted)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Context::Void)
    }

    pub fn module(&self) -> Option<&str> {
        match self {
            Context::Concrete { module, .. } => Some(module),
            _ => None,
        }
    }

    pub fn multiplier(&self) -> Option<usize> {
        match self {
            Context::Concrete { multiplier, .. } => Some(*multiplier),
            _ => None,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::Void
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Context::Void => write!(f, "<void>"),
            Context::Concrete { module, multiplier } => write!(f, "{}×{}", module, multiplier),
            Context::Conflicted => write!(f, "<conflicted>"),
        }
    }
}
