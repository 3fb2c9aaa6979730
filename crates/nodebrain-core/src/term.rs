//! Terms and glossaries (spec §4.6): named bindings from identifier to a
//! definition cell, with dotted-path child-glossary scoping.
//!
//! A glossary owns its terms; a term is itself a cell (allocated through
//! [`crate::engine::Graph::alloc_term_cell`]) whose value aliases its
//! current definition. Reassignment goes through `Graph::reassign_term`,
//! which already implements the atomic drop-old/grab-new/publish sequence
//! (spec §4.6); this module adds the name → term lookup, dotted-path walk,
//! and the welded-definition guard on top of it.

use crate::engine::Graph;
use crate::ids::CellId;
use crate::types::TypeAttrs;
use nodebrain_common::{NbError, NbErrorKind};
use rustc_hash::FxHashMap;

/// A named binding owning a term cell and, if it has been used as a
/// dotted-path prefix (`node.sub.leaf`), a child glossary of its own.
pub struct Term {
    pub cell: CellId,
    pub children: Glossary,
}

impl Term {
    fn new(cell: CellId) -> Self {
        Self {
            cell,
            children: Glossary::new(),
        }
    }
}

/// A scope mapping identifier to term (spec §4.6 "A glossary is a mapping
/// from identifier to term, owning term objects"). Nested scopes (node
/// local glossaries, rule context glossaries) are just a fresh `Glossary`,
/// reached by walking `Term::children`.
#[derive(Default)]
pub struct Glossary {
    entries: FxHashMap<String, Term>,
}

impl Glossary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to a freshly allocated term pointing at `definition`.
    /// Returns the existing term's cell unchanged if `name` is already
    /// bound — re-defining an existing name is a reassignment, not a new
    /// binding (use [`Glossary::reassign`] for that).
    pub fn define(&mut self, graph: &mut Graph, name: &str, definition: CellId) -> CellId {
        if let Some(term) = self.entries.get(name) {
            return term.cell;
        }
        let cell = graph.alloc_term_cell(definition);
        self.entries.insert(name.to_string(), Term::new(cell));
        cell
    }

    /// Look up a single (non-dotted) identifier in this scope.
    pub fn get(&self, name: &str) -> Option<CellId> {
        self.entries.get(name).map(|t| t.cell)
    }

    /// Walk a dotted path (`a.b.c`) through nested child glossaries,
    /// returning the leaf term's cell (spec §4.6 "Dotted paths ... walk
    /// child glossaries").
    pub fn resolve(&self, path: &str) -> Option<CellId> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut term = self.entries.get(first)?;
        for segment in segments {
            term = term.children.entries.get(segment)?;
        }
        Some(term.cell)
    }

    /// The child glossary nested under `name`, creating it (with no bound
    /// term of its own) if absent — used when a node or rule context needs
    /// a fresh local scope addressed by a dotted prefix.
    pub fn child_mut(&mut self, graph: &mut Graph, name: &str, definition: CellId) -> &mut Glossary {
        self.entries
            .entry(name.to_string())
            .or_insert_with(|| Term::new(graph.alloc_term_cell(definition)));
        &mut self.entries.get_mut(name).unwrap().children
    }

    /// Reassign the term at `path` to `new_definition` (spec §4.6
    /// "Assigning a term ... atomically"). Fails with [`NbErrorKind::Logic`]
    /// if the term's current definition is `welded` and has not first been
    /// explicitly undefined (spec: "Special welded definitions require an
    /// explicit undefine before reassignment").
    pub fn reassign(
        &mut self,
        graph: &mut Graph,
        path: &str,
        new_definition: CellId,
    ) -> Result<CellId, NbError> {
        let cell = self
            .resolve(path)
            .ok_or_else(|| NbError::from(NbErrorKind::Parse).with_term_path(path))?;
        let old_definition = graph.term_definition(cell);
        if graph.attrs(old_definition).contains(TypeAttrs::WELDED) {
            return Err(NbError::logic(format!(
                "term '{path}' has a welded definition; undefine it before reassigning"
            ))
            .with_term_path(path));
        }
        graph.reassign_term(cell, new_definition);
        Ok(cell)
    }

    /// Undefine (clear) a welded term so it may subsequently be reassigned:
    /// rebinds it to the engine's `Placeholder` special (spec §4.4), which
    /// is never itself welded.
    pub fn undefine(&mut self, graph: &mut Graph, path: &str) -> Result<(), NbError> {
        let cell = self
            .resolve(path)
            .ok_or_else(|| NbError::from(NbErrorKind::Parse).with_term_path(path))?;
        graph.reassign_term(cell, graph.placeholder);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::Value;

    #[test]
    fn define_then_resolve_round_trips() {
        let mut g = Graph::new();
        let mut glossary = Glossary::new();
        let one = g.intern_literal(Value::Real(1.0));
        let cell = glossary.define(&mut g, "x", one);
        assert_eq!(glossary.resolve("x"), Some(cell));
    }

    #[test]
    fn dotted_path_walks_child_glossaries() {
        let mut g = Graph::new();
        let mut glossary = Glossary::new();
        let zero = g.intern_literal(Value::Real(0.0));
        glossary.define(&mut g, "node", zero);
        let leaf_def = g.intern_literal(Value::Real(9.0));
        let leaf_cell = {
            let child = glossary.child_mut(&mut g, "node", zero);
            child.define(&mut g, "sub", leaf_def)
        };
        assert_eq!(glossary.resolve("node.sub"), Some(leaf_cell));
    }

    #[test]
    fn reassign_updates_value_through_react() {
        let mut g = Graph::new();
        let mut glossary = Glossary::new();
        let one = g.intern_literal(Value::Real(1.0));
        let term = glossary.define(&mut g, "x", one);
        g.force_enable_root(term);
        assert_eq!(g.value(term), &Value::Real(1.0));
        let five = g.intern_literal(Value::Real(5.0));
        glossary.reassign(&mut g, "x", five).unwrap();
        g.react();
        assert_eq!(g.value(term), &Value::Real(5.0));
    }

    #[test]
    fn welded_definition_blocks_reassignment_until_undefined() {
        let mut g = Graph::new();
        let mut glossary = Glossary::new();
        let one = g.intern_literal(Value::Real(1.0));
        g.add_attrs(one, TypeAttrs::WELDED);
        glossary.define(&mut g, "x", one);

        let five = g.intern_literal(Value::Real(5.0));
        assert!(glossary.reassign(&mut g, "x", five).is_err());

        glossary.undefine(&mut g, "x").unwrap();
        assert!(glossary.reassign(&mut g, "x", five).is_ok());
    }
}
