//! The compilation session.
//!
//! A [`Driver`] owns everything a translation needs: the action table, the
//! identifier/progress/menu tables, the published-process cache, the
//! parametric registry with its dependency graph, and the translator context
//! (variable bindings, unresolved names, parameter bindings, nesting stack).

use std::collections::VecDeque;
use std::rc::Rc;

use indexmap::IndexMap;

use fspx_core::{ActionSet, ActionTable, Context, ProgressSpec, SymbolTable, Value};
use fspx_lts::{Lts, UnresolvedNames};

use crate::ast;
use crate::diagnostics::Span;
use crate::names::{name_extension, parse_extended_name};
use crate::SemanticError;

/// Handle to an untranslated process definition.
#[derive(Debug, Clone)]
pub enum Definition {
    Process(Rc<ast::ProcessDef>),
    Composite(Rc<ast::CompositeDef>),
}

impl Definition {
    pub fn is_composite(&self) -> bool {
        matches!(self, Definition::Composite(_))
    }

    pub fn name(&self) -> &str {
        match self {
            Definition::Process(d) => &d.name,
            Definition::Composite(d) => &d.name,
        }
    }

    pub fn name_span(&self) -> Span {
        match self {
            Definition::Process(d) => d.name_span,
            Definition::Composite(d) => d.name_span,
        }
    }

    pub fn params(&self) -> &[ast::Param] {
        match self {
            Definition::Process(d) => &d.params,
            Definition::Composite(d) => &d.params,
        }
    }
}

/// A registered parametric process: parameter names, default values, and the
/// untranslated definition.
#[derive(Debug, Clone)]
pub struct ParametricProcess {
    pub names: Vec<String>,
    pub defaults: Vec<i64>,
    pub def: Definition,
}

/// Static dependency graph between non-local process definitions.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    table: IndexMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Records `depends -> on`; duplicates are ignored.
    pub fn add(&mut self, depends: &str, on: &str) -> bool {
        let entry = self.table.entry(depends.to_owned()).or_default();
        if entry.iter().any(|d| d == on) {
            return false;
        }
        entry.push(on.to_owned());
        true
    }

    /// BFS closure of the names `depends` (transitively) references, in
    /// reverse discovery order so callers can translate leaf-first.
    pub fn find_dependencies(&self, depends: &str) -> Vec<String> {
        let mut result = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut frontier = VecDeque::from([depends.to_owned()]);
        seen.insert(depends.to_owned());

        while let Some(id) = frontier.pop_front() {
            if let Some(deps) = self.table.get(&id) {
                for d in deps {
                    if seen.insert(d.clone()) {
                        frontier.push_back(d.clone());
                    }
                }
            }
            result.push(id);
        }

        result.reverse();
        result
    }
}

pub(crate) struct NestingFrame {
    pub ctx: Context,
    pub unres: UnresolvedNames,
    pub parameters: Vec<(String, i64)>,
    pub overridden: Vec<(String, Value)>,
}

/// The compilation session and translator state.
pub struct Driver {
    /// Interned action labels; id 0 is tau, stable for the session.
    pub actions: ActionTable,
    /// Constants, ranges, sets and (while translating) parameters.
    pub identifiers: SymbolTable<Value>,
    /// Published processes, keyed `Base` or `Base(v1,v2,...)`.
    pub processes: IndexMap<String, Rc<Lts>>,
    pub progresses: SymbolTable<ProgressSpec>,
    pub menus: SymbolTable<ActionSet>,
    /// The parametric registry, in declaration order.
    pub parametric: SymbolTable<ParametricProcess>,
    pub deps: DependencyGraph,

    pub(crate) ctx: Context,
    pub(crate) unres: UnresolvedNames,
    pub(crate) parameters: Vec<(String, i64)>,
    pub(crate) overridden: Vec<(String, Value)>,
    nesting_stack: Vec<NestingFrame>,
    max_depth: usize,
    interactive: bool,
}

impl Driver {
    pub fn new(max_depth: usize, interactive: bool) -> Self {
        Self {
            actions: ActionTable::new(),
            identifiers: SymbolTable::new(),
            processes: IndexMap::new(),
            progresses: SymbolTable::new(),
            menus: SymbolTable::new(),
            parametric: SymbolTable::new(),
            deps: DependencyGraph::default(),
            ctx: Context::new(),
            unres: UnresolvedNames::new(),
            parameters: Vec::new(),
            overridden: Vec::new(),
            nesting_stack: Vec::new(),
            max_depth,
            interactive,
        }
    }

    pub fn interactive(&self) -> bool {
        self.interactive
    }

    /// Runs the whole translation: declarations, registry collection,
    /// dependency pass, then definition translation in declaration order
    /// (composites deferred in interactive mode).
    pub fn compile(&mut self, root: &ast::Root) -> Result<(), SemanticError> {
        self.translate_declarations(root)?;
        self.find_parametric_processes(root)?;
        self.compute_dependency_graph();
        self.translate_process_definitions()?;
        Ok(())
    }

    pub(crate) fn compute_dependency_graph(&mut self) {
        let mut pairs = Vec::new();
        for (name, pp) in self.parametric.iter() {
            let refs = match &pp.def {
                Definition::Process(d) => d.collect_refs(),
                Definition::Composite(d) => d.collect_refs(),
            };
            for r in refs {
                pairs.push((name.to_owned(), r));
            }
        }
        for (depends, on) in pairs {
            self.deps.add(&depends, &on);
        }
    }

    /// In interactive mode, composite definitions (and definitions that
    /// transitively depend on one) are deferred until demanded by name.
    pub(crate) fn should_translate_now(&self, name: &str) -> bool {
        if !self.interactive {
            return true;
        }
        let Some(pp) = self.parametric.lookup(name) else {
            return false;
        };
        if pp.def.is_composite() {
            return false;
        }
        for dep in self.deps.find_dependencies(name) {
            if let Some(dp) = self.parametric.lookup(&dep) {
                if dp.def.is_composite() {
                    return false;
                }
            }
        }
        true
    }

    pub(crate) fn translate_process_definitions(&mut self) -> Result<(), SemanticError> {
        let entries: Vec<(String, Span)> = self
            .parametric
            .iter()
            .map(|(name, pp)| (name.to_owned(), pp.def.name_span()))
            .collect();

        for (name, span) in entries {
            if self.should_translate_now(&name) {
                self.process_ref_translate(&name, None, span)?;
            }
        }
        Ok(())
    }

    /// Looks up (and, when `create` is set, demand-translates) the process a
    /// user-supplied extended name refers to. `None` means the name does not
    /// denote anything; translation failures surface as errors.
    pub fn get_lts(
        &mut self,
        name: &str,
        create: bool,
    ) -> Result<Option<Rc<Lts>>, SemanticError> {
        let Some((base, args)) = parse_extended_name(name) else {
            return Ok(None);
        };

        if self.parametric.is_empty() {
            // Loaded from an image: only the published cache is available.
            let full = format!("{base}{}", name_extension(&args));
            return Ok(self.processes.get(&full).cloned());
        }

        let Some(pp) = self.parametric.lookup(&base) else {
            return Ok(None);
        };
        if !args.is_empty() && args.len() != pp.defaults.len() {
            return Ok(None);
        }
        let args = if args.is_empty() {
            pp.defaults.clone()
        } else {
            args
        };
        let span = pp.def.name_span();

        if create {
            self.process_ref_translate(&base, Some(&args), span)?;
        }

        let full = format!("{base}{}", name_extension(&args));
        Ok(self.processes.get(&full).cloned())
    }

    pub(crate) fn nesting_save(&mut self) -> bool {
        if self.nesting_stack.len() > self.max_depth {
            return false;
        }
        self.nesting_stack.push(NestingFrame {
            ctx: std::mem::take(&mut self.ctx),
            unres: std::mem::take(&mut self.unres),
            parameters: std::mem::take(&mut self.parameters),
            overridden: std::mem::take(&mut self.overridden),
        });
        true
    }

    pub(crate) fn nesting_restore(&mut self) {
        // Drop the identifiers the last parameter list introduced, then put
        // back anything they shadowed.
        let parameters = std::mem::take(&mut self.parameters);
        for (name, _) in &parameters {
            self.identifiers.remove(name);
        }
        for (name, value) in std::mem::take(&mut self.overridden) {
            let inserted = self.identifiers.insert(name, value);
            debug_assert!(inserted);
        }

        let frame = self
            .nesting_stack
            .pop()
            .expect("unbalanced nesting restore");
        self.ctx = frame.ctx;
        self.unres = frame.unres;
        self.parameters = frame.parameters;
        self.overridden = frame.overridden;
    }
}
