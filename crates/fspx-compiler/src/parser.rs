//! Recursive-descent parser for FSP.
//!
//! One function per nonterminal, lookahead on token kind, C-precedence
//! climbing for expressions. Errors are collected as diagnostics; a failed
//! definition synchronizes to the next `.` and parsing continues, so one
//! pass reports as much as possible.

use std::rc::Rc;

use crate::ast::*;
use crate::diagnostics::{Diagnostics, Span};
use crate::lexer::{lex, token_text, Tok, Token};

type PResult<T> = Result<T, ()>;

/// Parses an FSP source into its typed tree, or the diagnostics explaining
/// why it could not be parsed.
pub fn parse(source: &str) -> Result<Root, Diagnostics> {
    let mut parser = Parser::new(source);
    let mut decls = Vec::new();

    while !parser.at_eof() {
        match parser.parse_decl() {
            Ok(decl) => decls.push(decl),
            Err(()) => {
                parser.sync_to_dot();
                if parser.diags.error_count() > 20 {
                    break;
                }
            }
        }
    }

    if parser.diags.has_errors() {
        Err(parser.diags)
    } else {
        Ok(Root { decls })
    }
}

struct Parser<'s> {
    src: &'s str,
    tokens: Vec<Token>,
    pos: usize,
    diags: Diagnostics,
}

impl<'s> Parser<'s> {
    fn new(src: &'s str) -> Self {
        Self {
            src,
            tokens: lex(src),
            pos: 0,
            diags: Diagnostics::new(),
        }
    }

    fn peek(&self) -> Tok {
        self.nth(0)
    }

    fn nth(&self, n: usize) -> Tok {
        self.tokens
            .get(self.pos + n)
            .map(|t| t.kind)
            .unwrap_or(Tok::Eof)
    }

    fn peek_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|t| t.span)
            .unwrap_or_else(|| Span::new(self.src.len() as u32, self.src.len() as u32))
    }

    fn prev_span(&self) -> Span {
        self.tokens
            .get(self.pos.saturating_sub(1))
            .map(|t| t.span)
            .unwrap_or_default()
    }

    fn at_eof(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn at(&self, kind: Tok) -> bool {
        self.peek() == kind
    }

    fn bump(&mut self) -> Token {
        let token = self.tokens.get(self.pos).copied().unwrap_or(Token::new(
            Tok::Eof,
            Span::new(self.src.len() as u32, self.src.len() as u32),
        ));
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: Tok) -> bool {
        if self.at(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: Tok, what: &str) -> PResult<Token> {
        if self.at(kind) {
            Ok(self.bump())
        } else {
            self.error_here(format!("expected {what}"));
            Err(())
        }
    }

    fn error_here(&mut self, msg: String) {
        let span = self.peek_span();
        self.diags.error(msg, span).emit();
    }

    fn text(&self, token: Token) -> &'s str {
        token_text(self.src, &token)
    }

    fn sync_to_dot(&mut self) {
        while !self.at_eof() {
            if self.bump().kind == Tok::Dot {
                break;
            }
        }
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn parse_decl(&mut self) -> PResult<Decl> {
        match self.peek() {
            Tok::ConstKwd => self.parse_const_def(),
            Tok::RangeKwd => self.parse_range_def(),
            Tok::SetKwd => self.parse_set_def(),
            Tok::ProgressKwd => self.parse_progress_def(),
            Tok::MenuKwd => self.parse_menu_def(),
            Tok::PropertyKwd => {
                self.bump();
                self.parse_process_def(true)
            }
            Tok::OrOr => self.parse_composite_def(),
            Tok::UpperId => self.parse_process_def(false),
            _ => {
                self.error_here("expected a definition".to_owned());
                Err(())
            }
        }
    }

    /// Declarations accept an optional `.` or `;` terminator.
    fn eat_decl_terminator(&mut self) {
        if !self.eat(Tok::Dot) {
            self.eat(Tok::Semicolon);
        }
    }

    fn parse_const_def(&mut self) -> PResult<Decl> {
        self.bump();
        let name = self.expect(Tok::UpperId, "a constant name")?;
        self.expect(Tok::Eq, "`=`")?;
        let value = self.parse_expr()?;
        self.eat_decl_terminator();
        Ok(Decl::Const {
            name: self.text(name).to_owned(),
            span: name.span,
            value,
        })
    }

    fn parse_range_def(&mut self) -> PResult<Decl> {
        self.bump();
        let name = self.expect(Tok::UpperId, "a range name")?;
        self.expect(Tok::Eq, "`=`")?;
        let low = self.parse_expr()?;
        self.expect(Tok::DotDot, "`..`")?;
        let high = self.parse_expr()?;
        self.eat_decl_terminator();
        Ok(Decl::Range {
            name: self.text(name).to_owned(),
            span: name.span,
            low,
            high,
        })
    }

    fn parse_set_def(&mut self) -> PResult<Decl> {
        self.bump();
        let name = self.expect(Tok::UpperId, "a set name")?;
        self.expect(Tok::Eq, "`=`")?;
        let value = self.parse_set_expr()?;
        self.eat_decl_terminator();
        Ok(Decl::Set {
            name: self.text(name).to_owned(),
            span: name.span,
            value,
        })
    }

    fn parse_progress_def(&mut self) -> PResult<Decl> {
        self.bump();
        let name = self.expect(Tok::UpperId, "a progress property name")?;
        let ranges = self.parse_index_ranges()?;
        self.expect(Tok::Eq, "`=`")?;

        let (condition, set) = if self.eat(Tok::IfKwd) {
            let condition = self.parse_set_expr()?;
            self.expect(Tok::ThenKwd, "`then`")?;
            (Some(condition), self.parse_set_expr()?)
        } else {
            (None, self.parse_set_expr()?)
        };
        self.eat_decl_terminator();

        Ok(Decl::Progress {
            name: self.text(name).to_owned(),
            span: name.span,
            ranges,
            condition,
            set,
        })
    }

    fn parse_menu_def(&mut self) -> PResult<Decl> {
        self.bump();
        let name = self.expect(Tok::UpperId, "a menu name")?;
        self.expect(Tok::Eq, "`=`")?;
        let set = self.parse_set_expr()?;
        self.eat_decl_terminator();
        Ok(Decl::Menu {
            name: self.text(name).to_owned(),
            span: name.span,
            set,
        })
    }

    // ------------------------------------------------------------------
    // Process definitions
    // ------------------------------------------------------------------

    fn parse_process_def(&mut self, property: bool) -> PResult<Decl> {
        let name = self.expect(Tok::UpperId, "a process name")?;
        let params = self.parse_param_list()?;
        self.expect(Tok::Eq, "`=`")?;

        let body = self.parse_local_process()?;
        let mut locals = Vec::new();
        while self.eat(Tok::Comma) {
            locals.push(self.parse_local_def()?);
        }

        let alpha_ext = if self.eat(Tok::Plus) {
            Some(self.parse_set_expr()?)
        } else {
            None
        };
        let relabel = if self.at(Tok::Slash) {
            Some(self.parse_relabel_clause()?)
        } else {
            None
        };
        let hiding = self.parse_hiding_clause()?;
        self.expect(Tok::Dot, "`.` to end the process definition")?;

        Ok(Decl::Process(Rc::new(ProcessDef {
            property,
            name: self.text(name).to_owned(),
            name_span: name.span,
            params,
            body,
            locals,
            alpha_ext,
            relabel,
            hiding,
        })))
    }

    fn parse_param_list(&mut self) -> PResult<Vec<Param>> {
        let mut params = Vec::new();
        if !self.eat(Tok::LParen) {
            return Ok(params);
        }
        loop {
            let name = self.expect(Tok::UpperId, "a parameter name")?;
            self.expect(Tok::Eq, "`=`")?;
            let default = self.parse_expr()?;
            params.push(Param {
                name: self.text(name).to_owned(),
                default,
                span: name.span,
            });
            if !self.eat(Tok::Comma) {
                break;
            }
        }
        self.expect(Tok::RParen, "`)`")?;
        Ok(params)
    }

    fn parse_local_def(&mut self) -> PResult<LocalDef> {
        let name = self.expect(Tok::UpperId, "a local process name")?;
        let ranges = self.parse_index_ranges()?;
        self.expect(Tok::Eq, "`=`")?;
        let body = self.parse_local_process()?;
        Ok(LocalDef {
            name: self.text(name).to_owned(),
            ranges,
            body,
            span: name.span,
        })
    }

    fn parse_hiding_clause(&mut self) -> PResult<Option<HidingClause>> {
        let interface = match self.peek() {
            Tok::Backslash => false,
            Tok::At => true,
            _ => return Ok(None),
        };
        self.bump();
        let set = self.parse_set_expr()?;
        Ok(Some(HidingClause { interface, set }))
    }

    fn parse_relabel_clause(&mut self) -> PResult<Vec<RelabelDef>> {
        self.expect(Tok::Slash, "`/`")?;
        self.expect(Tok::LBrace, "`{`")?;
        let mut defs = vec![self.parse_relabel_def()?];
        while self.eat(Tok::Comma) {
            defs.push(self.parse_relabel_def()?);
        }
        self.expect(Tok::RBrace, "`}`")?;
        Ok(defs)
    }

    fn parse_relabel_def(&mut self) -> PResult<RelabelDef> {
        if self.eat(Tok::ForallKwd) {
            let ranges = self.parse_index_ranges()?;
            self.expect(Tok::LBrace, "`{`")?;
            let mut defs = vec![self.parse_relabel_def()?];
            while self.eat(Tok::Comma) {
                defs.push(self.parse_relabel_def()?);
            }
            self.expect(Tok::RBrace, "`}`")?;
            return Ok(RelabelDef::Forall { ranges, defs });
        }

        let new_labels = self.parse_action_labels()?;
        self.expect(Tok::Slash, "`/`")?;
        let old_labels = self.parse_action_labels()?;
        Ok(RelabelDef::Pair {
            new_labels,
            old_labels,
        })
    }

    // ------------------------------------------------------------------
    // Local processes
    // ------------------------------------------------------------------

    fn parse_local_process(&mut self) -> PResult<LocalProcess> {
        match self.peek() {
            Tok::EndKwd => {
                self.bump();
                Ok(LocalProcess::Base(BaseProcess::End))
            }
            Tok::StopKwd => {
                self.bump();
                Ok(LocalProcess::Base(BaseProcess::Stop))
            }
            Tok::ErrorKwd => {
                self.bump();
                Ok(LocalProcess::Base(BaseProcess::Error))
            }
            Tok::IfKwd => {
                self.bump();
                let cond = self.parse_expr()?;
                self.expect(Tok::ThenKwd, "`then`")?;
                let then_branch = Box::new(self.parse_local_process()?);
                let else_branch = if self.eat(Tok::ElseKwd) {
                    Some(Box::new(self.parse_local_process()?))
                } else {
                    None
                };
                Ok(LocalProcess::IfElse {
                    cond,
                    then_branch,
                    else_branch,
                })
            }
            Tok::LParen => {
                self.bump();
                let choice = self.parse_choice()?;
                self.expect(Tok::RParen, "`)`")?;
                Ok(choice)
            }
            Tok::UpperId => self.parse_ref_or_seq(),
            _ => {
                self.error_here("expected a local process".to_owned());
                Err(())
            }
        }
    }

    /// An upper-case name in local-process position: a plain (possibly
    /// indexed) local reference, or the head of a sequential composition.
    fn parse_ref_or_seq(&mut self) -> PResult<LocalProcess> {
        let name = self.bump();
        debug_assert_eq!(name.kind, Tok::UpperId);

        if self.at(Tok::LParen) || self.at(Tok::Semicolon) {
            let args = if self.at(Tok::LParen) {
                self.parse_arguments()?
            } else {
                Vec::new()
            };
            let mut refs = vec![ProcessRef {
                name: self.text(name).to_owned(),
                args,
                span: name.span,
            }];
            loop {
                self.expect(Tok::Semicolon, "`;`")?;
                match self.peek() {
                    Tok::EndKwd => {
                        self.bump();
                        return Ok(LocalProcess::Seq {
                            refs,
                            tail: BaseProcess::End,
                        });
                    }
                    Tok::StopKwd => {
                        self.bump();
                        return Ok(LocalProcess::Seq {
                            refs,
                            tail: BaseProcess::Stop,
                        });
                    }
                    Tok::ErrorKwd => {
                        self.bump();
                        return Ok(LocalProcess::Seq {
                            refs,
                            tail: BaseProcess::Error,
                        });
                    }
                    Tok::UpperId => {
                        let next = self.bump();
                        if self.at(Tok::LParen) {
                            let args = self.parse_arguments()?;
                            refs.push(ProcessRef {
                                name: self.text(next).to_owned(),
                                args,
                                span: next.span,
                            });
                            // A parenthesized reference continues the list.
                            continue;
                        }
                        if self.at(Tok::Semicolon) {
                            refs.push(ProcessRef {
                                name: self.text(next).to_owned(),
                                args: Vec::new(),
                                span: next.span,
                            });
                            continue;
                        }
                        let indices = self.parse_base_indices()?;
                        return Ok(LocalProcess::Seq {
                            refs,
                            tail: BaseProcess::Ref {
                                name: self.text(next).to_owned(),
                                indices,
                                span: next.span,
                            },
                        });
                    }
                    _ => {
                        self.error_here("expected a process after `;`".to_owned());
                        return Err(());
                    }
                }
            }
        }

        let indices = self.parse_base_indices()?;
        Ok(LocalProcess::Base(BaseProcess::Ref {
            name: self.text(name).to_owned(),
            indices,
            span: name.span,
        }))
    }

    fn parse_base_indices(&mut self) -> PResult<Vec<Expr>> {
        let mut indices = Vec::new();
        while self.eat(Tok::LBracket) {
            indices.push(self.parse_expr()?);
            self.expect(Tok::RBracket, "`]`")?;
        }
        Ok(indices)
    }

    fn parse_arguments(&mut self) -> PResult<Vec<Expr>> {
        self.expect(Tok::LParen, "`(`")?;
        let mut args = vec![self.parse_expr()?];
        while self.eat(Tok::Comma) {
            args.push(self.parse_expr()?);
        }
        self.expect(Tok::RParen, "`)`")?;
        Ok(args)
    }

    fn parse_choice(&mut self) -> PResult<LocalProcess> {
        let mut prefixes = vec![self.parse_action_prefix()?];
        while self.eat(Tok::Or) {
            prefixes.push(self.parse_action_prefix()?);
        }
        Ok(LocalProcess::Choice(prefixes))
    }

    fn starts_action_labels(&self) -> bool {
        match self.peek() {
            Tok::LowerId | Tok::LBrace => true,
            // An upper-case id is a label chain only when it clearly
            // continues as one (set-ref followed by a label component) or is
            // a labeling/sharing operand; a bare reference wins otherwise.
            Tok::UpperId => match self.nth(1) {
                Tok::Dot => matches!(self.nth(2), Tok::LowerId | Tok::UpperId | Tok::LBrace),
                Tok::Colon | Tok::ColonColon => true,
                _ => false,
            },
            _ => false,
        }
    }

    fn parse_action_prefix(&mut self) -> PResult<ActionPrefix> {
        let guard = if self.eat(Tok::WhenKwd) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let mut chain = vec![self.parse_action_labels()?];
        self.expect(Tok::Arrow, "`->`")?;
        loop {
            if self.starts_action_labels() {
                chain.push(self.parse_action_labels()?);
                self.expect(Tok::Arrow, "`->`")?;
            } else {
                let tail = Box::new(self.parse_local_process()?);
                return Ok(ActionPrefix { guard, chain, tail });
            }
        }
    }

    // ------------------------------------------------------------------
    // Labels, sets and ranges
    // ------------------------------------------------------------------

    fn parse_action_labels(&mut self) -> PResult<ActionLabels> {
        let start = self.peek_span();
        let mut elems = Vec::new();

        match self.peek() {
            Tok::LowerId => {
                let token = self.bump();
                elems.push(LabelElem::Name(self.text(token).to_owned()));
            }
            Tok::LBrace => elems.push(LabelElem::Set(self.parse_set_expr()?)),
            Tok::UpperId => {
                let token = self.bump();
                elems.push(LabelElem::Set(SetExpr::Ref {
                    name: self.text(token).to_owned(),
                    span: token.span,
                }));
            }
            _ => {
                self.error_here("expected an action label".to_owned());
                return Err(());
            }
        }

        loop {
            if self.eat(Tok::Dot) {
                match self.peek() {
                    Tok::LowerId => {
                        let token = self.bump();
                        elems.push(LabelElem::Name(self.text(token).to_owned()));
                    }
                    Tok::UpperId => {
                        let token = self.bump();
                        elems.push(LabelElem::Set(SetExpr::Ref {
                            name: self.text(token).to_owned(),
                            span: token.span,
                        }));
                    }
                    Tok::LBrace => elems.push(LabelElem::Set(self.parse_set_expr()?)),
                    _ => {
                        self.error_here("expected a label component after `.`".to_owned());
                        return Err(());
                    }
                }
            } else if self.eat(Tok::LBracket) {
                let range = self.parse_action_range()?;
                self.expect(Tok::RBracket, "`]`")?;
                elems.push(LabelElem::Range(range));
            } else {
                break;
            }
        }

        Ok(ActionLabels {
            elems,
            span: start.cover(self.prev_span()),
        })
    }

    fn parse_set_expr(&mut self) -> PResult<SetExpr> {
        if self.at(Tok::UpperId) {
            let token = self.bump();
            return Ok(SetExpr::Ref {
                name: self.text(token).to_owned(),
                span: token.span,
            });
        }

        self.expect(Tok::LBrace, "`{`")?;
        let mut elems = vec![self.parse_action_labels()?];
        while self.eat(Tok::Comma) {
            elems.push(self.parse_action_labels()?);
        }
        self.expect(Tok::RBrace, "`}`")?;
        Ok(SetExpr::Lit { elems })
    }

    fn parse_action_range(&mut self) -> PResult<ActionRange> {
        let start = self.peek_span();

        let var = if self.at(Tok::LowerId) && self.nth(1) == Tok::Colon {
            let token = self.bump();
            self.bump();
            Some(self.text(token).to_owned())
        } else {
            None
        };

        let kind = if self.at(Tok::LBrace) {
            RangeKind::Set(self.parse_set_expr()?)
        } else {
            let expr = self.parse_expr()?;
            if self.eat(Tok::DotDot) {
                let high = self.parse_expr()?;
                RangeKind::Interval(expr, high)
            } else {
                RangeKind::Expr(expr)
            }
        };

        Ok(ActionRange {
            var,
            kind,
            span: start.cover(self.prev_span()),
        })
    }

    fn parse_index_ranges(&mut self) -> PResult<Vec<ActionRange>> {
        let mut ranges = Vec::new();
        while self.eat(Tok::LBracket) {
            ranges.push(self.parse_action_range()?);
            self.expect(Tok::RBracket, "`]`")?;
        }
        Ok(ranges)
    }

    // ------------------------------------------------------------------
    // Composite definitions
    // ------------------------------------------------------------------

    fn parse_composite_def(&mut self) -> PResult<Decl> {
        self.expect(Tok::OrOr, "`||`")?;
        let name = self.expect(Tok::UpperId, "a composite process name")?;
        let params = self.parse_param_list()?;
        self.expect(Tok::Eq, "`=`")?;
        let body = self.parse_composite_body()?;

        let priority = match self.peek() {
            Tok::Shr => {
                self.bump();
                Some(PriorityClause {
                    low: true,
                    set: self.parse_set_expr()?,
                })
            }
            Tok::Shl => {
                self.bump();
                Some(PriorityClause {
                    low: false,
                    set: self.parse_set_expr()?,
                })
            }
            _ => None,
        };
        let hiding = self.parse_hiding_clause()?;
        self.expect(Tok::Dot, "`.` to end the composite definition")?;

        Ok(Decl::Composite(Rc::new(CompositeDef {
            name: self.text(name).to_owned(),
            name_span: name.span,
            params,
            body,
            priority,
            hiding,
        })))
    }

    fn parse_composite_body(&mut self) -> PResult<CompositeBody> {
        match self.peek() {
            Tok::ForallKwd => {
                self.bump();
                let ranges = self.parse_index_ranges()?;
                let body = Box::new(self.parse_composite_body()?);
                Ok(CompositeBody::Forall { ranges, body })
            }
            Tok::IfKwd => {
                self.bump();
                let cond = self.parse_expr()?;
                self.expect(Tok::ThenKwd, "`then`")?;
                let then_branch = Box::new(self.parse_composite_body()?);
                let else_branch = if self.eat(Tok::ElseKwd) {
                    Some(Box::new(self.parse_composite_body()?))
                } else {
                    None
                };
                Ok(CompositeBody::IfElse {
                    cond,
                    then_branch,
                    else_branch,
                })
            }
            _ => {
                let (sharing, labeling) = self.parse_prefix_ops()?;

                if self.eat(Tok::LParen) {
                    let mut bodies = vec![self.parse_composite_body()?];
                    while self.eat(Tok::OrOr) {
                        bodies.push(self.parse_composite_body()?);
                    }
                    self.expect(Tok::RParen, "`)`")?;
                    let relabel = if self.at(Tok::Slash) {
                        Some(self.parse_relabel_clause()?)
                    } else {
                        None
                    };
                    Ok(CompositeBody::Parallel {
                        sharing,
                        labeling,
                        bodies,
                        relabel,
                    })
                } else {
                    let name = self.expect(Tok::UpperId, "a process reference")?;
                    let args = if self.at(Tok::LParen) {
                        self.parse_arguments()?
                    } else {
                        Vec::new()
                    };
                    let relabel = if self.at(Tok::Slash) {
                        Some(self.parse_relabel_clause()?)
                    } else {
                        None
                    };
                    Ok(CompositeBody::Ref {
                        sharing,
                        labeling,
                        pref: ProcessRef {
                            name: self.text(name).to_owned(),
                            args,
                            span: name.span,
                        },
                        relabel,
                    })
                }
            }
        }
    }

    /// Optional `labels ::` (sharing) and `labels :` (labeling) prefixes of
    /// a composite body.
    fn parse_prefix_ops(&mut self) -> PResult<(Option<ActionLabels>, Option<ActionLabels>)> {
        let mut sharing = None;
        let mut labeling = None;

        if self.starts_action_labels() {
            let labels = self.parse_action_labels()?;
            if self.eat(Tok::ColonColon) {
                sharing = Some(labels);
                if self.starts_action_labels() {
                    let second = self.parse_action_labels()?;
                    self.expect(Tok::Colon, "`:`")?;
                    labeling = Some(second);
                }
            } else {
                self.expect(Tok::Colon, "`:` or `::`")?;
                labeling = Some(labels);
            }
        }

        Ok((sharing, labeling))
    }

    // ------------------------------------------------------------------
    // Expressions (C precedence)
    // ------------------------------------------------------------------

    fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_binary(0)
    }

    fn binop_at(&self, level: usize) -> Option<BinOp> {
        let op = match (level, self.peek()) {
            (0, Tok::OrOr) => BinOp::LogOr,
            (1, Tok::AndAnd) => BinOp::LogAnd,
            (2, Tok::Or) => BinOp::BitOr,
            (3, Tok::Caret) => BinOp::BitXor,
            (4, Tok::And) => BinOp::BitAnd,
            (5, Tok::EqEq) => BinOp::Eq,
            (5, Tok::NotEq) => BinOp::Ne,
            (6, Tok::Lt) => BinOp::Lt,
            (6, Tok::Gt) => BinOp::Gt,
            (6, Tok::Le) => BinOp::Le,
            (6, Tok::Ge) => BinOp::Ge,
            (7, Tok::Shl) => BinOp::Shl,
            (7, Tok::Shr) => BinOp::Shr,
            (8, Tok::Plus) => BinOp::Add,
            (8, Tok::Minus) => BinOp::Sub,
            (9, Tok::Star) => BinOp::Mul,
            (9, Tok::Slash) => BinOp::Div,
            (9, Tok::Percent) => BinOp::Rem,
            _ => return None,
        };
        Some(op)
    }

    fn parse_binary(&mut self, level: usize) -> PResult<Expr> {
        if level > 9 {
            return self.parse_unary();
        }

        let mut left = self.parse_binary(level + 1)?;
        while let Some(op) = self.binop_at(level) {
            self.bump();
            let right = self.parse_binary(level + 1)?;
            let span = left.span.cover(right.span);
            left = Expr {
                kind: ExprKind::Binary(op, Box::new(left), Box::new(right)),
                span,
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let op = match self.peek() {
            Tok::Plus => Some(UnOp::Plus),
            Tok::Minus => Some(UnOp::Minus),
            Tok::Not => Some(UnOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            let start = self.peek_span();
            self.bump();
            let inner = self.parse_unary()?;
            let span = start.cover(inner.span);
            return Ok(Expr {
                kind: ExprKind::Unary(op, Box::new(inner)),
                span,
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        match self.peek() {
            Tok::Int => {
                let token = self.bump();
                let Ok(value) = self.text(token).parse::<i64>() else {
                    self.diags
                        .error("integer literal out of range", token.span)
                        .emit();
                    return Err(());
                };
                Ok(Expr {
                    kind: ExprKind::Int(value),
                    span: token.span,
                })
            }
            Tok::LowerId => {
                let token = self.bump();
                Ok(Expr {
                    kind: ExprKind::Variable(self.text(token).to_owned()),
                    span: token.span,
                })
            }
            Tok::UpperId => {
                let token = self.bump();
                Ok(Expr {
                    kind: ExprKind::Ident(self.text(token).to_owned()),
                    span: token.span,
                })
            }
            Tok::LParen => {
                self.bump();
                let expr = self.parse_expr()?;
                self.expect(Tok::RParen, "`)`")?;
                Ok(expr)
            }
            _ => {
                self.error_here("expected an expression".to_owned());
                Err(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Root {
        match parse(source) {
            Ok(root) => root,
            Err(diags) => panic!("parse failed:\n{}", diags.printer().source(source).render()),
        }
    }

    #[test]
    fn parses_simple_process() {
        let root = parse_ok("P = (a -> b -> STOP).");
        assert_eq!(root.decls.len(), 1);
        let Decl::Process(def) = &root.decls[0] else {
            panic!("expected process definition");
        };
        assert_eq!(def.name, "P");
        let LocalProcess::Choice(prefixes) = &def.body else {
            panic!("expected a choice body");
        };
        assert_eq!(prefixes.len(), 1);
        assert_eq!(prefixes[0].chain.len(), 2);
    }

    #[test]
    fn parses_declarations_and_parameters() {
        let root = parse_ok(
            "const N = 2\n\
             range T = 0..N\n\
             set Alpha = {a, b.c, d[0..1]}\n\
             A(I=0) = (a[I] -> A).",
        );
        assert_eq!(root.decls.len(), 4);
        let Decl::Process(def) = &root.decls[3] else {
            panic!("expected process definition");
        };
        assert_eq!(def.params.len(), 1);
        assert_eq!(def.params[0].name, "I");
    }

    #[test]
    fn parses_local_definitions_and_guards() {
        let root = parse_ok(
            "Count(N=3) = Count[0],\n\
             Count[i:0..3] = (when i<N inc -> Count[i+1]\n\
                             | when i>0 dec -> Count[i-1]).",
        );
        let Decl::Process(def) = &root.decls[0] else {
            panic!("expected process definition");
        };
        assert_eq!(def.locals.len(), 1);
        assert_eq!(def.locals[0].name, "Count");
        assert_eq!(def.locals[0].ranges.len(), 1);
    }

    #[test]
    fn parses_composite_with_operators() {
        let root = parse_ok(
            "P = (a -> P).\n\
             Q = (b -> Q).\n\
             ||S = (P || Q) >> {a} \\ {b}.",
        );
        let Decl::Composite(def) = &root.decls[2] else {
            panic!("expected composite definition");
        };
        let CompositeBody::Parallel { bodies, .. } = &def.body else {
            panic!("expected parallel composition");
        };
        assert_eq!(bodies.len(), 2);
        assert!(def.priority.as_ref().unwrap().low);
        assert!(!def.hiding.as_ref().unwrap().interface);
    }

    #[test]
    fn parses_labeling_and_sharing() {
        let root = parse_ok("P = (a -> P).\n||S = x::y:P /{c/y.a}.");
        let Decl::Composite(def) = &root.decls[1] else {
            panic!("expected composite definition");
        };
        let CompositeBody::Ref {
            sharing,
            labeling,
            relabel,
            ..
        } = &def.body
        else {
            panic!("expected a reference body");
        };
        assert!(sharing.is_some());
        assert!(labeling.is_some());
        assert!(relabel.is_some());
    }

    #[test]
    fn parses_sequential_composition() {
        let root = parse_ok("P = (a -> END).\nQ = P;P;END.");
        let Decl::Process(def) = &root.decls[1] else {
            panic!("expected process definition");
        };
        let LocalProcess::Seq { refs, tail } = &def.body else {
            panic!("expected sequential composition");
        };
        assert_eq!(refs.len(), 2);
        assert!(matches!(tail, BaseProcess::End));
    }

    #[test]
    fn parses_property_and_progress() {
        let root = parse_ok(
            "property SAFE = (a -> b -> SAFE).\n\
             progress LIVE = {a}\n\
             progress COND = if {a} then {b}",
        );
        let Decl::Process(def) = &root.decls[0] else {
            panic!("expected process definition");
        };
        assert!(def.property);
        assert!(matches!(&root.decls[1], Decl::Progress { condition: None, .. }));
        assert!(matches!(
            &root.decls[2],
            Decl::Progress {
                condition: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn reports_errors_with_spans() {
        let err = parse("P = (a -> ").unwrap_err();
        assert!(err.has_errors());
    }

    #[test]
    fn expression_precedence() {
        let root = parse_ok("const X = 1 + 2 * 3 == 7\nP = (a -> STOP).");
        let Decl::Const { value, .. } = &root.decls[0] else {
            panic!("expected const");
        };
        // Top node must be the comparison.
        assert!(matches!(
            &value.kind,
            ExprKind::Binary(BinOp::Eq, _, _)
        ));
    }
}
