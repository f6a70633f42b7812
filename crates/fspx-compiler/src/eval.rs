//! The context-threaded evaluator.
//!
//! Translation walks the typed AST recursively, carrying the driver's
//! variable context. Label chains are re-translated per variable binding
//! (an action range in the middle of a chain can influence everything to its
//! right), prefix chains build incomplete placeholder graphs bottom-up, and
//! whole definitions run the register → resolve → operator pipeline before
//! publication.

use fspx_core::{
    ActionSet, HidingSpec, LabelSet, PrioritySpec, ProgressSpec, RangeValue, RelabelingSpec,
    Value,
};
use fspx_lts::Lts;

use crate::ast::{
    ActionLabels, ActionPrefix, ActionRange, BaseProcess, BinOp, CompositeBody, CompositeDef,
    Decl, Expr, ExprKind, LabelElem, LocalDef, LocalProcess, ProcessDef, ProcessRef, RangeKind,
    RelabelDef, Root, SetExpr, UnOp,
};
use crate::diagnostics::Span;
use crate::driver::{Definition, Driver, ParametricProcess};
use crate::names::name_extension;
use crate::{SemanticError, SemanticErrorKind as K};

type Res<T> = Result<T, SemanticError>;

fn err(kind: K, span: Span) -> SemanticError {
    SemanticError::new(kind, span)
}

/// Advances a per-element index vector to the next combination, the first
/// element varying fastest and carrying into the next one on wraparound.
/// Returns `false` once every combination has been produced.
fn next_combination(sizes: &[usize], indexes: &mut [usize]) -> bool {
    for (j, &size) in sizes.iter().enumerate() {
        if size > 1 {
            indexes[j] += 1;
            if indexes[j] == size {
                indexes[j] = 0;
            } else {
                return true;
            }
        }
    }
    false
}

impl Driver {
    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub(crate) fn eval_expr(&mut self, e: &Expr) -> Res<i64> {
        match &e.kind {
            ExprKind::Int(v) => Ok(*v),
            ExprKind::Variable(name) => {
                let Some(value) = self.ctx.lookup(name) else {
                    return Err(err(
                        K::Undeclared {
                            what: "variable",
                            name: name.clone(),
                        },
                        e.span,
                    ));
                };
                value.parse::<i64>().map_err(|_| {
                    err(
                        K::TypeMismatch {
                            name: name.clone(),
                            expected: "numeric value",
                            found: "label",
                        },
                        e.span,
                    )
                })
            }
            ExprKind::Ident(name) => match self.identifiers.lookup(name) {
                Some(Value::Int(v)) => Ok(*v),
                Some(v) => Err(err(
                    K::TypeMismatch {
                        name: name.clone(),
                        expected: "const",
                        found: v.kind(),
                    },
                    e.span,
                )),
                None => Err(err(
                    K::Undeclared {
                        what: "const/parameter",
                        name: name.clone(),
                    },
                    e.span,
                )),
            },
            ExprKind::Unary(op, inner) => {
                let v = self.eval_expr(inner)?;
                Ok(match op {
                    UnOp::Plus => v,
                    UnOp::Minus => v.wrapping_neg(),
                    UnOp::Not => (v == 0) as i64,
                })
            }
            ExprKind::Binary(op, left, right) => {
                let l = self.eval_expr(left)?;
                let r = self.eval_expr(right)?;
                Ok(match op {
                    BinOp::LogOr => (l != 0 || r != 0) as i64,
                    BinOp::LogAnd => (l != 0 && r != 0) as i64,
                    BinOp::BitOr => l | r,
                    BinOp::BitXor => l ^ r,
                    BinOp::BitAnd => l & r,
                    BinOp::Eq => (l == r) as i64,
                    BinOp::Ne => (l != r) as i64,
                    BinOp::Lt => (l < r) as i64,
                    BinOp::Gt => (l > r) as i64,
                    BinOp::Le => (l <= r) as i64,
                    BinOp::Ge => (l >= r) as i64,
                    BinOp::Shl => l.wrapping_shl(r as u32),
                    BinOp::Shr => l.wrapping_shr(r as u32),
                    BinOp::Add => l.wrapping_add(r),
                    BinOp::Sub => l.wrapping_sub(r),
                    BinOp::Mul => l.wrapping_mul(r),
                    BinOp::Div => {
                        if r == 0 {
                            return Err(err(K::DivisionByZero, e.span));
                        }
                        l.wrapping_div(r)
                    }
                    BinOp::Rem => {
                        if r == 0 {
                            return Err(err(K::DivisionByZero, e.span));
                        }
                        l.wrapping_rem(r)
                    }
                })
            }
        }
    }

    // ------------------------------------------------------------------
    // Sets, ranges and label chains
    // ------------------------------------------------------------------

    pub(crate) fn eval_set_expr(&mut self, s: &SetExpr) -> Res<LabelSet> {
        match s {
            SetExpr::Ref { name, span } => match self.identifiers.lookup(name) {
                Some(Value::Set(set)) => Ok(set.clone()),
                Some(v) => Err(err(
                    K::TypeMismatch {
                        name: name.clone(),
                        expected: "set",
                        found: v.kind(),
                    },
                    *span,
                )),
                None => Err(err(
                    K::Undeclared {
                        what: "set",
                        name: name.clone(),
                    },
                    *span,
                )),
            },
            SetExpr::Lit { elems } => {
                let mut out = LabelSet::new();
                for labels in elems {
                    let part = self.eval_action_labels(labels)?;
                    out.extend_from(&part);
                }
                Ok(out)
            }
        }
    }

    /// Evaluates an action range to the label set it denotes. A bare
    /// upper-case identifier resolves by stored kind: constant, range or set.
    pub(crate) fn eval_action_range(&mut self, ar: &ActionRange) -> Res<LabelSet> {
        let mut set = match &ar.kind {
            RangeKind::Expr(e) => {
                if let ExprKind::Ident(name) = &e.kind {
                    match self.identifiers.lookup(name) {
                        Some(Value::Int(v)) => LabelSet::singleton(v.to_string()),
                        Some(Value::Range(r)) => r.to_label_set(),
                        Some(Value::Set(s)) => s.clone(),
                        None => {
                            return Err(err(
                                K::Undeclared {
                                    what: "identifier",
                                    name: name.clone(),
                                },
                                e.span,
                            ));
                        }
                    }
                } else {
                    LabelSet::singleton(self.eval_expr(e)?.to_string())
                }
            }
            RangeKind::Interval(low, high) => {
                let lo = self.eval_expr(low)?;
                let hi = self.eval_expr(high)?;
                RangeValue::new(lo, hi).to_label_set()
            }
            RangeKind::Set(se) => self.eval_set_expr(se)?,
        };

        if let Some(var) = &ar.var {
            set.set_variable(var.clone());
        }
        Ok(set)
    }

    pub(crate) fn eval_action_labels(&mut self, labels: &ActionLabels) -> Res<LabelSet> {
        self.compute_action_labels(LabelSet::new(), &labels.elems, 0, labels.span)
    }

    /// Computes the label set of an arbitrarily complex chain such as
    /// `a[i:1..2].b.{h,j,k}.c[3][j:i..2*i][j*i+3]`.
    ///
    /// Elements are translated left to right; when an action range binds a
    /// variable that later elements can see, the computation splits into one
    /// recursive sub-translation per value, each under the extended context.
    fn compute_action_labels(
        &mut self,
        base: LabelSet,
        elems: &[LabelElem],
        idx: usize,
        span: Span,
    ) -> Res<LabelSet> {
        let mut base = base;

        match &elems[idx] {
            LabelElem::Name(s) => {
                if idx == 0 {
                    base = LabelSet::singleton(s.clone());
                } else {
                    base.dotcat(s);
                }
            }
            LabelElem::Set(se) => {
                let set = self.eval_set_expr(se)?;
                if idx == 0 {
                    base = set;
                } else {
                    base.dotcat_set(&set);
                }
            }
            LabelElem::Range(ar) => {
                let ar_set = self.eval_action_range(ar)?;
                if ar_set.is_empty() {
                    return Err(err(K::EmptyLabelSet, ar.span));
                }
                let binds_later = ar_set.has_variable() && idx + 1 < elems.len();
                if binds_later {
                    let var = ar_set.variable().expect("checked variable").to_owned();
                    let mut ret = LabelSet::new();
                    for i in 0..ar_set.len() {
                        let mut next_base = base.clone();
                        next_base.indexize_str(ar_set.get(i));
                        if !self.ctx.insert(&var, ar_set.get(i)) {
                            return Err(err(
                                K::Duplicate {
                                    what: "variable",
                                    name: var,
                                },
                                ar.span,
                            ));
                        }
                        let sub = self.compute_action_labels(next_base, elems, idx + 1, span)?;
                        ret.extend_from(&sub);
                        self.ctx.remove(&var);
                    }
                    return Ok(ret);
                }
                base.indexize_set(&ar_set);
            }
        }

        if idx + 1 >= elems.len() {
            Ok(base)
        } else {
            self.compute_action_labels(base, elems, idx + 1, span)
        }
    }

    // ------------------------------------------------------------------
    // Prefix chains
    // ------------------------------------------------------------------

    /// Builds the incomplete LTS of a prefix chain
    /// `labels -> labels -> ... -> <tail>`.
    ///
    /// The last chain element creates an Incomplete node per distinct
    /// context; the context is saved in `ctxcache` and its index recorded in
    /// the node's alias, so the caller can translate the trailing local
    /// process once per saved context and splice with `incompcat`.
    fn compute_prefix_actions(
        &mut self,
        chain: &[ActionLabels],
        idx: usize,
        ctxcache: &mut Vec<fspx_core::Context>,
    ) -> Res<Lts> {
        let labels = &chain[idx];
        let elems = &labels.elems;
        let mut indexes = vec![0usize; elems.len()];
        let mut sizes = vec![1usize; elems.len()];
        let saved_ctx = self.ctx.clone();
        let mut lts = Lts::stop();

        loop {
            let mut label = String::new();

            for (j, elem) in elems.iter().enumerate() {
                match elem {
                    LabelElem::Name(s) => {
                        sizes[j] = 1;
                        if j == 0 {
                            label.push_str(s);
                        } else {
                            label.push('.');
                            label.push_str(s);
                        }
                    }
                    LabelElem::Set(se) => {
                        let set = self.eval_set_expr(se)?;
                        if set.is_empty() {
                            return Err(err(K::EmptyLabelSet, labels.span));
                        }
                        sizes[j] = set.len();
                        let val = set.get(indexes[j].min(set.len() - 1));
                        if j == 0 {
                            label.push_str(val);
                        } else {
                            label.push('.');
                            label.push_str(val);
                        }
                    }
                    LabelElem::Range(ar) => {
                        let ar_set = self.eval_action_range(ar)?;
                        if ar_set.is_empty() {
                            return Err(err(K::EmptyLabelSet, ar.span));
                        }
                        sizes[j] = ar_set.len();
                        let val = ar_set.get(indexes[j].min(ar_set.len() - 1)).to_owned();
                        label.push('[');
                        label.push_str(&val);
                        label.push(']');
                        if let Some(var) = ar_set.variable() {
                            if !self.ctx.insert(var, val.as_str()) {
                                return Err(err(
                                    K::Duplicate {
                                        what: "variable",
                                        name: var.to_owned(),
                                    },
                                    ar.span,
                                ));
                            }
                        }
                    }
                }
            }

            let next = if idx + 1 >= chain.len() {
                // Last chain element: defer the tail translation, keyed by
                // the current context. Avoid duplicating the last cached
                // context.
                if ctxcache.last() != Some(&self.ctx) {
                    ctxcache.push(self.ctx.clone());
                }
                Lts::incomplete((ctxcache.len() - 1) as u32)
            } else {
                self.compute_prefix_actions(chain, idx + 1, ctxcache)?
            };

            lts.zerocat(&next, &label, &mut self.actions);
            self.ctx = saved_ctx.clone();

            if !next_combination(&sizes, &mut indexes) {
                break;
            }
        }

        Ok(lts)
    }

    fn eval_action_prefix(&mut self, ap: &ActionPrefix) -> Res<Lts> {
        if let Some(guard) = &ap.guard {
            // A disabled guard contributes no transitions to the choice.
            if self.eval_expr(guard)? == 0 {
                return Ok(Lts::stop());
            }
        }

        let saved_ctx = self.ctx.clone();
        let mut ctxcache = Vec::new();
        let mut lts = self.compute_prefix_actions(&ap.chain, 0, &mut ctxcache)?;

        let mut tails = Vec::with_capacity(ctxcache.len());
        for cached in &ctxcache {
            self.ctx = cached.clone();
            tails.push(self.eval_local_process(&ap.tail)?);
        }
        lts.incompcat(&tails);

        self.ctx = saved_ctx;
        Ok(lts)
    }

    // ------------------------------------------------------------------
    // Local processes
    // ------------------------------------------------------------------

    fn eval_base_process(&mut self, bp: &BaseProcess) -> Res<Lts> {
        match bp {
            BaseProcess::End => Ok(Lts::end()),
            BaseProcess::Stop => Ok(Lts::stop()),
            BaseProcess::Error => Ok(Lts::error()),
            BaseProcess::Ref {
                name,
                indices,
                span,
            } => {
                let mut full = name.clone();
                for e in indices {
                    let v = self.eval_expr(e)?;
                    full.push('[');
                    full.push_str(&v.to_string());
                    full.push(']');
                }
                let mut lts = Lts::unresolved_pending();
                self.update_unres(&mut lts, &full, false, *span)?;
                Ok(lts)
            }
        }
    }

    fn eval_local_process(&mut self, lp: &LocalProcess) -> Res<Lts> {
        match lp {
            LocalProcess::Base(bp) => self.eval_base_process(bp),
            LocalProcess::Choice(prefixes) => {
                let mut result = self.eval_action_prefix(&prefixes[0])?;
                for ap in &prefixes[1..] {
                    let lts = self.eval_action_prefix(ap)?;
                    result.zeromerge(&lts);
                }
                Ok(result)
            }
            LocalProcess::IfElse {
                cond,
                then_branch,
                else_branch,
            } => {
                if self.eval_expr(cond)? != 0 {
                    self.eval_local_process(then_branch)
                } else if let Some(els) = else_branch {
                    self.eval_local_process(els)
                } else {
                    Ok(Lts::stop())
                }
            }
            LocalProcess::Seq { refs, tail } => {
                let mut result = self.process_ref_lts(&refs[0])?;
                for r in &refs[1..] {
                    let next = self.process_ref_lts(r)?;
                    result.endcat(&next);
                }
                let t = self.eval_base_process(tail)?;
                result.endcat(&t);
                Ok(result)
            }
        }
    }

    /// Registers `name` as an alias for the node 0 of `lts` in the
    /// unresolved-names table, keeping node aliases consistent when two
    /// groups turn out to name the same node.
    fn update_unres(&mut self, lts: &mut Lts, name: &str, define: bool, span: Span) -> Res<()> {
        if define && self.unres.defined(name) {
            return Err(err(
                K::Duplicate {
                    what: "process",
                    name: name.to_owned(),
                },
                span,
            ));
        }

        match lts.alias(0) {
            None => {
                let alias = self.unres.insert(name, define);
                lts.set_alias(0, Some(alias));
            }
            Some(alias) => {
                if let Some(merged_from) = self.unres.append(name, alias, define) {
                    lts.replace_alias(alias, merged_from);
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Index-range combinations
    // ------------------------------------------------------------------

    /// Runs `f` once per combination of the index ranges, with the range
    /// variables bound in the context and the `[v0][v1]...` index string of
    /// the combination. With no ranges, `f` runs once with an empty string.
    fn for_each_range_combination<F>(&mut self, ranges: &[ActionRange], mut f: F) -> Res<()>
    where
        F: FnMut(&mut Self, &str, bool) -> Res<()>,
    {
        let saved_ctx = self.ctx.clone();
        let mut indexes = vec![0usize; ranges.len()];
        let mut sizes = vec![1usize; ranges.len()];
        let mut first = true;

        loop {
            let mut index_string = String::new();
            for (j, range) in ranges.iter().enumerate() {
                let set = self.eval_action_range(range)?;
                if set.is_empty() {
                    return Err(err(K::EmptyLabelSet, range.span));
                }
                sizes[j] = set.len();
                let val = set.get(indexes[j].min(set.len() - 1));
                index_string.push('[');
                index_string.push_str(val);
                index_string.push(']');
                if let Some(var) = set.variable() {
                    if !self.ctx.insert(var, val) {
                        return Err(err(
                            K::Duplicate {
                                what: "variable",
                                name: var.to_owned(),
                            },
                            range.span,
                        ));
                    }
                }
            }

            f(self, &index_string, first)?;
            first = false;
            self.ctx = saved_ctx.clone();

            if !next_combination(&sizes, &mut indexes) {
                break;
            }
        }
        Ok(())
    }

    /// One `Q[i:R][j:S] = local_process` clause: translate and register one
    /// definition per index combination, appending them into one graph.
    fn eval_local_def(&mut self, def: &LocalDef) -> Res<Lts> {
        let mut result: Option<Lts> = None;
        self.for_each_range_combination(&def.ranges, |me, index, _first| {
            let mut lts = me.eval_local_process(&def.body)?;
            let name = format!("{}{}", def.name, index);
            me.update_unres(&mut lts, &name, true, def.span)?;
            if let Some(acc) = result.as_mut() {
                acc.append(&lts, 0);
            } else {
                result = Some(lts);
            }
            Ok(())
        })?;
        Ok(result.expect("at least one combination"))
    }

    // ------------------------------------------------------------------
    // Relabeling clauses
    // ------------------------------------------------------------------

    fn eval_relabel_defs(&mut self, defs: &[RelabelDef]) -> Res<RelabelingSpec> {
        let mut spec = RelabelingSpec::default();
        for def in defs {
            match def {
                RelabelDef::Pair {
                    new_labels,
                    old_labels,
                } => {
                    let new_set = self.eval_action_labels(new_labels)?;
                    let old_set = self.eval_action_labels(old_labels)?;
                    spec.add(new_set, old_set);
                }
                RelabelDef::Forall { ranges, defs } => {
                    let mut acc = RelabelingSpec::default();
                    self.for_each_range_combination(ranges, |me, _index, _first| {
                        let sub = me.eval_relabel_defs(defs)?;
                        acc.merge(sub);
                        Ok(())
                    })?;
                    spec.merge(acc);
                }
            }
        }
        Ok(spec)
    }

    // ------------------------------------------------------------------
    // Definitions
    // ------------------------------------------------------------------

    pub(crate) fn process_def_translate(&mut self, def: &ProcessDef) -> Res<()> {
        let mut body = self.eval_local_process(&def.body)?;
        for local in &def.locals {
            let lts = self.eval_local_def(local)?;
            body.append(&lts, 0);
        }

        self.update_unres(&mut body, &def.name, true, def.name_span)?;
        if let Err(alias) = body.resolve() {
            let name = self
                .unres
                .lookup(alias)
                .unwrap_or_else(|| alias.to_string());
            return Err(err(K::UnresolvedReference { name }, def.name_span));
        }
        body.merge_end_nodes();

        if let Some(alpha) = &def.alpha_ext {
            let set = self.eval_set_expr(alpha)?;
            for (label, _) in set.iter() {
                let id = self.actions.insert(label);
                body.update_alphabet(id);
            }
        }

        if let Some(defs) = &def.relabel {
            let spec = self.eval_relabel_defs(defs)?;
            body.apply_relabeling(&spec, &mut self.actions);
        }

        if let Some(hiding) = &def.hiding {
            let spec = HidingSpec {
                set: self.eval_set_expr(&hiding.set)?,
                interface: hiding.interface,
            };
            body.hiding(&spec, &self.actions);
        }

        if def.property && !body.property() {
            return Err(err(
                K::NondeterministicProperty {
                    name: def.name.clone(),
                },
                def.name_span,
            ));
        }

        self.post_process_definition(body, &def.name, def.name_span)
    }

    fn apply_composite_ops(
        &mut self,
        lts: &mut Lts,
        sharing: &Option<ActionLabels>,
        labeling: &Option<ActionLabels>,
        relabel: &Option<Vec<RelabelDef>>,
    ) -> Res<()> {
        if let Some(lb) = labeling {
            let set = self.eval_action_labels(lb)?;
            lts.labeling(&set, &mut self.actions);
        }
        if let Some(sh) = sharing {
            let set = self.eval_action_labels(sh)?;
            lts.sharing(&set, &mut self.actions);
        }
        if let Some(defs) = relabel {
            let spec = self.eval_relabel_defs(defs)?;
            lts.apply_relabeling(&spec, &mut self.actions);
        }
        Ok(())
    }

    fn eval_composite_body(&mut self, cb: &CompositeBody) -> Res<Lts> {
        match cb {
            CompositeBody::Ref {
                sharing,
                labeling,
                pref,
                relabel,
            } => {
                let mut lts = self.process_ref_lts(pref)?;
                self.apply_composite_ops(&mut lts, sharing, labeling, relabel)?;
                Ok(lts)
            }
            CompositeBody::Parallel {
                sharing,
                labeling,
                bodies,
                relabel,
            } => {
                let mut parts = Vec::with_capacity(bodies.len());
                for body in bodies {
                    parts.push(self.eval_composite_body(body)?);
                }
                // Labeling, sharing and relabeling apply to each component
                // before the composition.
                for part in &mut parts {
                    self.apply_composite_ops(part, sharing, labeling, relabel)?;
                }
                let mut iter = parts.into_iter();
                let mut lts = iter.next().expect("empty parallel composition");
                for part in iter {
                    lts.compose(&part);
                }
                Ok(lts)
            }
            CompositeBody::Forall { ranges, body } => {
                let mut result: Option<Lts> = None;
                self.for_each_range_combination(ranges, |me, _index, _first| {
                    let lts = me.eval_composite_body(body)?;
                    if let Some(acc) = result.as_mut() {
                        acc.compose(&lts);
                    } else {
                        result = Some(lts);
                    }
                    Ok(())
                })?;
                Ok(result.expect("at least one combination"))
            }
            CompositeBody::IfElse {
                cond,
                then_branch,
                else_branch,
            } => {
                if self.eval_expr(cond)? != 0 {
                    self.eval_composite_body(then_branch)
                } else if let Some(els) = else_branch {
                    self.eval_composite_body(els)
                } else {
                    Ok(Lts::stop())
                }
            }
        }
    }

    pub(crate) fn composite_def_translate(&mut self, def: &CompositeDef) -> Res<()> {
        let mut body = self.eval_composite_body(&def.body)?;

        if let Some(priority) = &def.priority {
            let spec = PrioritySpec {
                set: self.eval_set_expr(&priority.set)?,
                low: priority.low,
            };
            body.priority(&spec, &self.actions);
        }
        if let Some(hiding) = &def.hiding {
            let spec = HidingSpec {
                set: self.eval_set_expr(&hiding.set)?,
                interface: hiding.interface,
            };
            body.hiding(&spec, &self.actions);
        }

        self.post_process_definition(body, &def.name, def.name_span)
    }

    /// Publishes a translated definition under its extended name.
    fn post_process_definition(&mut self, mut lts: Lts, name: &str, span: Span) -> Res<()> {
        let values: Vec<i64> = self.parameters.iter().map(|(_, v)| *v).collect();
        let full = format!("{name}{}", name_extension(&values));
        lts.name = full.clone();
        lts.clear_aliases();

        if self.processes.contains_key(&full) {
            return Err(err(
                K::Duplicate {
                    what: "process",
                    name: full,
                },
                span,
            ));
        }
        self.processes.insert(full, std::rc::Rc::new(lts));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Process references
    // ------------------------------------------------------------------

    fn process_ref_lts(&mut self, r: &ProcessRef) -> Res<Lts> {
        let args: Option<Vec<i64>> = if r.args.is_empty() {
            None
        } else {
            let mut values = Vec::with_capacity(r.args.len());
            for e in &r.args {
                values.push(self.eval_expr(e)?);
            }
            Some(values)
        };
        self.process_ref_translate(&r.name, args.as_deref(), r.span)
    }

    /// Resolves a reference to a parametric process: looks up the cache
    /// under the extended name and, on a miss, translates the definition
    /// under a fresh nesting frame with the arguments bound as parameters.
    /// Returns a clone of the published LTS.
    pub(crate) fn process_ref_translate(
        &mut self,
        name: &str,
        args: Option<&[i64]>,
        span: Span,
    ) -> Res<Lts> {
        let Some(pp) = self.parametric.lookup(name) else {
            return Err(err(
                K::Undeclared {
                    what: "process",
                    name: name.to_owned(),
                },
                span,
            ));
        };
        let pp: ParametricProcess = pp.clone();

        let arguments: Vec<i64> = match args {
            Some(a) => a.to_vec(),
            None => pp.defaults.clone(),
        };
        if arguments.len() != pp.defaults.len() {
            return Err(err(
                K::ArityMismatch {
                    name: name.to_owned(),
                    expected: pp.defaults.len(),
                    got: arguments.len(),
                },
                span,
            ));
        }

        let full = format!("{name}{}", name_extension(&arguments));

        if !self.processes.contains_key(&full) {
            if !self.nesting_save() {
                return Err(err(K::DepthExceeded { name: full }, span));
            }

            // Bind the arguments as constant identifiers, shadowing (and
            // remembering) anything with the same name.
            for (i, pname) in pp.names.iter().enumerate() {
                if let Some(value) = self.identifiers.lookup(pname) {
                    self.overridden.push((pname.clone(), value.clone()));
                    self.identifiers.remove(pname);
                }
                self.identifiers.insert(pname.clone(), Value::Int(arguments[i]));
                self.parameters.push((pname.clone(), arguments[i]));
            }

            let result = match &pp.def {
                Definition::Process(d) => self.process_def_translate(&d.clone()),
                Definition::Composite(d) => self.composite_def_translate(&d.clone()),
            };
            self.nesting_restore();
            result?;
        }

        let lts = self
            .processes
            .get(&full)
            .expect("translation did not publish the process");
        Ok((**lts).clone())
    }

    // ------------------------------------------------------------------
    // Declaration passes
    // ------------------------------------------------------------------

    pub(crate) fn translate_declarations(&mut self, root: &Root) -> Res<()> {
        for decl in &root.decls {
            match decl {
                Decl::Const { name, span, value } => {
                    let v = self.eval_expr(value)?;
                    if !self.identifiers.insert(name.clone(), Value::Int(v)) {
                        return Err(err(
                            K::Duplicate {
                                what: "const",
                                name: name.clone(),
                            },
                            *span,
                        ));
                    }
                }
                Decl::Range {
                    name,
                    span,
                    low,
                    high,
                } => {
                    let lo = self.eval_expr(low)?;
                    let hi = self.eval_expr(high)?;
                    if !self
                        .identifiers
                        .insert(name.clone(), Value::Range(RangeValue::new(lo, hi)))
                    {
                        return Err(err(
                            K::Duplicate {
                                what: "range",
                                name: name.clone(),
                            },
                            *span,
                        ));
                    }
                }
                Decl::Set { name, span, value } => {
                    let set = self.eval_set_expr(value)?;
                    if !self.identifiers.insert(name.clone(), Value::Set(set)) {
                        return Err(err(
                            K::Duplicate {
                                what: "set",
                                name: name.clone(),
                            },
                            *span,
                        ));
                    }
                }
                Decl::Progress {
                    name,
                    span,
                    ranges,
                    condition,
                    set,
                } => {
                    self.translate_progress(name, *span, ranges, condition, set)?;
                }
                Decl::Menu { name, span, set } => {
                    let labels = self.eval_set_expr(set)?;
                    let actions = ActionSet::from_label_set(&labels, &mut self.actions);
                    if !self.menus.insert(name.clone(), actions) {
                        return Err(err(
                            K::Duplicate {
                                what: "menu",
                                name: name.clone(),
                            },
                            *span,
                        ));
                    }
                }
                Decl::Process(_) | Decl::Composite(_) => {}
            }
        }
        Ok(())
    }

    fn translate_progress(
        &mut self,
        name: &str,
        span: Span,
        ranges: &[ActionRange],
        condition: &Option<SetExpr>,
        set: &SetExpr,
    ) -> Res<()> {
        let mut collected: Vec<(String, ProgressSpec)> = Vec::new();
        self.for_each_range_combination(ranges, |me, index, _first| {
            let set_labels = me.eval_set_expr(set)?;
            let set_actions = ActionSet::from_label_set(&set_labels, &mut me.actions);
            let cond_actions = match condition {
                Some(c) => {
                    let labels = me.eval_set_expr(c)?;
                    Some(ActionSet::from_label_set(&labels, &mut me.actions))
                }
                None => None,
            };
            collected.push((
                format!("{name}{index}"),
                ProgressSpec {
                    condition: cond_actions,
                    set: set_actions,
                },
            ));
            Ok(())
        })?;

        for (full, spec) in collected {
            if !self.progresses.insert(full.clone(), spec) {
                return Err(err(
                    K::Duplicate {
                        what: "progress",
                        name: full,
                    },
                    span,
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn find_parametric_processes(&mut self, root: &Root) -> Res<()> {
        for decl in &root.decls {
            let def = match decl {
                Decl::Process(d) => Definition::Process(d.clone()),
                Decl::Composite(d) => Definition::Composite(d.clone()),
                _ => continue,
            };

            let mut names = Vec::new();
            let mut defaults = Vec::new();
            for param in def.params() {
                if names.contains(&param.name) {
                    return Err(err(
                        K::Duplicate {
                            what: "parameter",
                            name: param.name.clone(),
                        },
                        param.span,
                    ));
                }
                let value = self.eval_expr(&param.default)?;
                names.push(param.name.clone());
                defaults.push(value);
            }

            let name = def.name().to_owned();
            let span = def.name_span();
            if !self.parametric.insert(
                name.clone(),
                ParametricProcess {
                    names,
                    defaults,
                    def,
                },
            ) {
                return Err(err(
                    K::Duplicate {
                        what: "process",
                        name,
                    },
                    span,
                ));
            }
        }
        Ok(())
    }
}
