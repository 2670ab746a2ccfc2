//! Builds the final register environment from a fully resolved and
//! type-checked [`ScopeTree`]: every `Binding::Column` becomes one
//! register, grouped into per-`(module, multiplier)` "views" (spec.md
//! §4.8: "operates on one view per (module, multiplier) context"), which
//! [`crate::register`] then packs down.
//!
//! Grounded on the teacher's final column-set assembly in src/column.rs
//! (`ColumnSet`), generalized to go through the explicit slot/group model
//! of `register.rs` instead of mutating column handles in place.

use std::collections::HashMap;

use crate::binding::Binding;
use crate::register::{self, Register, RegisterSource, Unit};
use crate::scope::ScopeTree;

#[derive(Debug)]
pub struct Environment {
    /// Every register, in declaration-derived order. A register that was
    /// folded into another by allocation is left in place with
    /// `active = false`; its sources have been moved onto the register
    /// that absorbed it.
    pub registers: Vec<Register>,
}

impl Environment {
    pub fn active_count(&self) -> usize {
        self.registers.iter().filter(|r| r.active).count()
    }
}

struct ColumnEntry {
    register_id: usize,
    context_path: String,
    multiplier: usize,
    is_virtual: bool,
    perspective_key: Option<String>,
    base_name: String,
}

/// Assemble the environment: one register per declared column, then run
/// the chosen allocator independently over each `(module, multiplier)`
/// view's virtual (perspective-owned) registers. Non-virtual columns are
/// never offered to the allocator at all, per spec.md §4.8.
pub fn build_environment(tree: &ScopeTree, legacy: bool) -> Environment {
    let mut registers: Vec<Register> = vec![];
    let mut entries: Vec<ColumnEntry> = vec![];

    for (_, binding) in tree.bindings.iter() {
        if let Binding::Column(c) = binding {
            let register_id = registers.len();
            let parent_path = c.path.parent();
            // A column is virtual (perspective-owned) when it has a
            // qualifying parent segment that is not simply its own
            // module context - a bare, unqualified column path (no
            // parent at all) is always module-level (spec.md §3:
            // `is_virtual = path.parent != context`).
            let is_virtual = match &parent_path {
                Some(p) => p.to_string() != c.context_path,
                None => false,
            };
            let perspective_key = if is_virtual {
                parent_path.map(|p| p.to_string())
            } else {
                None
            };
            registers.push(Register {
                context: c.context_path.clone(),
                datatype: c.datatype.clone(),
                sources: vec![RegisterSource {
                    context_prefix: c.context_path.clone(),
                    source_path: c.path.to_string(),
                    multiplier: c.multiplier.max(1),
                    datatype: c.datatype.clone(),
                    must_prove: c.must_prove,
                    is_computed: c.computed,
                    display: None,
                }],
                active: true,
            });
            entries.push(ColumnEntry {
                register_id,
                context_path: c.context_path.clone(),
                multiplier: c.multiplier.max(1),
                is_virtual,
                perspective_key,
                base_name: c.path.last().to_owned(),
            });
        }
    }

    // Partition into views by (module, multiplier) (spec.md §4.8).
    let mut views: HashMap<(String, usize), Vec<usize>> = HashMap::new();
    for (i, e) in entries.iter().enumerate() {
        views
            .entry((e.context_path.clone(), e.multiplier))
            .or_default()
            .push(i);
    }

    let mut slot_of: HashMap<String, usize> = HashMap::new();
    let mut next_slot = 0usize;

    // Deterministic view order: by (module, multiplier) so the same
    // input always produces the same output (spec.md §5).
    let mut view_keys: Vec<(String, usize)> = views.keys().cloned().collect();
    view_keys.sort();

    for key in view_keys {
        let mut idxs = views.remove(&key).unwrap();
        // Sort by source column name, tie-broken by perspective name
        // within the same base (spec.md §4.8 step 1), so same-named
        // columns from different perspectives sit adjacent and the
        // forward-scanning `compact_by` can find them.
        idxs.sort_by(|&a, &b| {
            let ea = &entries[a];
            let eb = &entries[b];
            ea.base_name
                .cmp(&eb.base_name)
                .then_with(|| ea.perspective_key.cmp(&eb.perspective_key))
        });

        let mut units = vec![];
        for &i in &idxs {
            let e = &entries[i];
            if !e.is_virtual {
                continue;
            }
            let pk = e.perspective_key.clone().unwrap();
            let slot = *slot_of.entry(pk).or_insert_with(|| {
                let s = next_slot;
                next_slot += 1;
                s
            });
            units.push(Unit {
                register_id: e.register_id,
                slot: Some(slot),
            });
        }

        let groups = if legacy {
            register::legacy_allocate(&units, &registers)
        } else {
            register::default_allocate(&units, &registers)
        };
        apply_groups(&mut registers, &groups);
    }

    Environment { registers }
}

/// Fold every non-target member of each group into the member with the
/// smallest register id, widening that target's datatype to the group's
/// joined type and marking the absorbed registers inactive (spec.md
/// §4.8 step 4).
fn apply_groups(registers: &mut [Register], groups: &[register::RegisterGroup]) {
    for g in groups {
        let Some(target) = g.members.iter().map(|(_, id)| *id).min() else {
            continue;
        };
        registers[target].datatype = g.datatype.clone();
        for &(_, id) in &g.members {
            if id == target {
                continue;
            }
            let moved = std::mem::take(&mut registers[id].sources);
            registers[target].sources.extend(moved);
            registers[id].active = false;
        }
    }
}
