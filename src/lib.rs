//! Symbol resolution, type checking, macro expansion and register
//! allocation for the arithmetic constraint DSL middle-end.
//!
//! This crate picks up after an external parser has turned source text
//! into an expression tree plus a flat list of (as yet unresolved)
//! declarations - see `resolver::Declaration` - and carries that tree
//! through to a fully resolved, type-checked, preprocessed and
//! register-allocated [`environment::Environment`]. Everything outside
//! that pipeline - parsing, trace computation, constraint export - is
//! out of scope (see `compile`'s module docs for the full boundary).
//!
//! The pipeline mirrors the teacher's five-pass structure
//! (definitions -> generation -> reduction -> column assembly) but with
//! each pass's partial failures accumulated rather than aborting the
//! whole compile on the first one, per the per-pass `Outcome`
//! accumulator in `diagnostics`.

pub mod ast;
pub mod binding;
pub mod context;
pub mod declarations;
pub mod diagnostics;
pub mod environment;
pub mod native;
pub mod path;
pub mod preprocess;
pub mod register;
pub mod resolver;
pub mod scope;
pub mod typecheck;
pub mod types;

use log::{debug, info};

use diagnostics::{Category, Diagnostic, Outcome};

/// Knobs exposed to callers that the teacher hard-coded as constants
/// (the resolver's iteration cap, compiler/definitions.rs) or never had
/// to think about at all (debug-statement retention, allocator choice).
#[derive(Debug, Clone)]
pub struct CompileSettings {
    pub max_resolver_iterations: usize,
    pub max_preprocess_passes: usize,
    pub keep_debug: bool,
    pub legacy_register_allocator: bool,
}

impl Default for CompileSettings {
    fn default() -> Self {
        CompileSettings {
            max_resolver_iterations: resolver::DEFAULT_MAX_ITERATIONS,
            max_preprocess_passes: preprocess::DEFAULT_MAX_PASSES,
            keep_debug: false,
            legacy_register_allocator: false,
        }
    }
}

/// The output of a successful (or partially successful) compile: every
/// top-level constraint, fully preprocessed, plus the register
/// environment its columns were packed into.
#[derive(Debug)]
pub struct CompiledUnit {
    pub environment: environment::Environment,
    pub constraints: Vec<ast::Node>,
}

/// A top-level `defconstraint`, handed to [`compile`] as a unit: the body
/// must carry loobean semantics once checked, and the optional guard
/// must not (spec.md §4.6's constraint-domain table).
#[derive(Debug, Clone)]
pub struct ConstraintWork {
    pub label: String,
    pub body: ast::Node,
    pub guard: Option<ast::Node>,
}

/// Run the full middle-end pipeline over an already-populated scope tree:
/// resolve declarations to a fixed point, type check every top-level
/// constraint, preprocess (unroll/inline/reduce/prune) each one, then
/// assemble the column/register environment.
///
/// Each stage accumulates its own diagnostics rather than stopping at the
/// first error (spec.md §7); a constraint that fails type checking is
/// simply dropped from `constraints` with its diagnostic recorded,
/// leaving the rest of the compile to proceed.
pub fn compile(
    mut tree: scope::ScopeTree,
    declarations: Vec<resolver::Declaration>,
    constraints: Vec<ConstraintWork>,
    settings: &CompileSettings,
) -> Outcome<CompiledUnit> {
    let mut diagnostics: Vec<Diagnostic> = vec![];

    info!("resolving {} declaration(s)", declarations.len());
    let resolved = resolver::resolve(&mut tree, declarations, settings.max_resolver_iterations);
    diagnostics.extend(resolved.diagnostics);

    // Top-level constraints carry no scope of their own in this
    // signature, so they are bound against the root scope; a caller with
    // constraints nested inside a perspective should resolve those
    // separately before handing them to `compile`. Body and guard are
    // resolved as two separately labelled items rather than packed into
    // one node, so a genuinely 2-element list body can never be
    // mistaken for a (body, guard) pair.
    let root = tree.root();
    let mut work = vec![];
    for c in &constraints {
        work.push(resolver::ExprWork {
            label: format!("{}:body", c.label),
            scope: root,
            node: c.body.clone(),
        });
        if let Some(g) = &c.guard {
            work.push(resolver::ExprWork {
                label: format!("{}:guard", c.label),
                scope: root,
                node: g.clone(),
            });
        }
    }
    let resolved_work = resolver::resolve_expressions(&tree, work, settings.max_resolver_iterations);
    diagnostics.extend(resolved_work.diagnostics);
    let resolved_labels: std::collections::HashSet<String> =
        resolved_work.value.into_iter().map(|item| item.label).collect();

    // spec.md §4.6: a constraint body must infer to a loobean type; its
    // guard, if present, must not - the two are dual checks.
    info!("type checking {} top-level constraint(s)", constraints.len());
    let mut checked = vec![];
    for c in &constraints {
        if !resolved_labels.contains(&format!("{}:body", c.label)) {
            continue;
        }
        if c.guard.is_some() && !resolved_labels.contains(&format!("{}:guard", c.label)) {
            continue;
        }

        let body_ty = match typecheck::infer(&c.body, &tree.bindings) {
            Ok(ty) => ty,
            Err(d) => {
                diagnostics.push(d);
                continue;
            }
        };
        if !body_ty.is_loobean() {
            diagnostics.push(Diagnostic::new(
                Category::Typing,
                None,
                format!("{}: expected loobean constraint, found {}", c.label, body_ty),
            ));
            continue;
        }

        if let Some(g) = &c.guard {
            let guard_ty = match typecheck::infer(g, &tree.bindings) {
                Ok(ty) => ty,
                Err(d) => {
                    diagnostics.push(d);
                    continue;
                }
            };
            if guard_ty.is_loobean() {
                diagnostics.push(Diagnostic::new(
                    Category::Typing,
                    None,
                    format!("{}: guard must not be loobean, found {}", c.label, guard_ty),
                ));
                continue;
            }
        }

        debug!("constraint {} inferred as {}", c.label, body_ty);
        checked.push(c.body.clone());
    }

    let opts = preprocess::PreprocessOptions {
        keep_debug: settings.keep_debug,
    };
    info!("preprocessing {} checked constraint(s)", checked.len());
    let mut processed = vec![];
    for node in checked {
        match preprocess::preprocess(&node, &tree.bindings, opts, settings.max_preprocess_passes) {
            Ok(n) => processed.push(n),
            Err(d) => diagnostics.push(d),
        }
    }

    let environment = environment::build_environment(&tree, settings.legacy_register_allocator);
    info!(
        "assembled {} column(s) into {} register(s)",
        environment.registers.len(),
        environment.active_count()
    );

    Outcome::new(
        CompiledUnit {
            environment,
            constraints: processed,
        },
        diagnostics,
    )
}
