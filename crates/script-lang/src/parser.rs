//! Recursive-descent parser over the laid-out token stream.

use std::sync::Arc;

use crate::ast::*;
use crate::error::CompileFailure;
use crate::lexer::{tokenize, LexKind, Lexeme, Token};

type PResult<T> = Result<T, CompileFailure>;

/// Deepest nesting of expressions, and separately of blocks, the parser
/// will recurse into.
pub const MAX_NESTING: u32 = 100;

/// Tokenize and parse `source`, attributing failures to `file`.
pub fn parse(source: &str, file: &str) -> PResult<Block> {
    let tokens = tokenize(source, file)?;
    Parser::new(tokens, source, file).parse_program()
}

pub struct Parser<'a> {
    tokens: Vec<Lexeme>,
    pos: usize,
    source: &'a str,
    file: &'a str,
    /// Enclosing `def` bodies.
    function_depth: u32,
    /// Enclosing loops in the innermost function.
    loop_depth: u32,
    /// Current expression recursion depth.
    nesting: u32,
    /// Enclosing indented blocks.
    block_depth: u32,
}

impl<'a> Parser<'a> {
    /// `tokens` must come from [`tokenize`], which always ends with END.
    pub fn new(tokens: Vec<Lexeme>, source: &'a str, file: &'a str) -> Self {
        Self {
            tokens,
            pos: 0,
            source,
            file,
            function_depth: 0,
            loop_depth: 0,
            nesting: 0,
            block_depth: 0,
        }
    }

    /// Run `parse` one nesting level deeper, failing past [`MAX_NESTING`].
    fn nested<T>(
        &mut self,
        message: &str,
        parse: impl FnOnce(&mut Self) -> PResult<T>,
    ) -> PResult<T> {
        if self.nesting >= MAX_NESTING {
            return Err(self.fail_here(message));
        }
        self.nesting += 1;
        let result = parse(self);
        self.nesting -= 1;
        result
    }

    pub fn parse_program(mut self) -> PResult<Block> {
        let mut body = Vec::new();
        while !self.at_end() {
            body.push(self.statement()?);
        }
        Ok(body)
    }

    // ── Cursor ──────────────────────────────────────────────────────────

    fn current(&self) -> &Lexeme {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn kind(&self) -> &LexKind {
        &self.current().kind
    }

    fn token(&self) -> Option<&Token> {
        match self.kind() {
            LexKind::Token(t) => Some(t),
            _ => None,
        }
    }

    fn peek_token(&self, ahead: usize) -> Option<&Token> {
        match self.tokens.get(self.pos + ahead).map(|l| &l.kind) {
            Some(LexKind::Token(t)) => Some(t),
            _ => None,
        }
    }

    fn at_end(&self) -> bool {
        matches!(self.kind(), LexKind::End)
    }

    fn advance(&mut self) -> Lexeme {
        let lexeme = self.current().clone();
        if !self.at_end() {
            self.pos += 1;
        }
        lexeme
    }

    fn check(&self, token: &Token) -> bool {
        self.token() == Some(token)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> PResult<Lexeme> {
        if self.check(token) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&format!("expected '{}'", token.describe())))
        }
    }

    fn ident(&mut self, what: &str) -> PResult<String> {
        match self.token() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected(&format!("expected {what}"))),
        }
    }

    // ── Failures ────────────────────────────────────────────────────────

    fn fail_at(&self, line: u32, column: u32, message: impl Into<String>) -> CompileFailure {
        CompileFailure {
            message: message.into(),
            file: self.file.to_string(),
            line,
            column,
            text: self
                .source
                .lines()
                .nth((line as usize).saturating_sub(1))
                .map(str::to_string),
        }
    }

    fn fail_here(&self, message: impl Into<String>) -> CompileFailure {
        let at = self.current();
        self.fail_at(at.line, at.column, message)
    }

    fn unexpected(&self, expected: &str) -> CompileFailure {
        let message = match self.kind() {
            LexKind::Indent => "unexpected indent".to_string(),
            LexKind::Dedent => format!("invalid syntax: {expected}, found unindent"),
            LexKind::End => format!("unexpected end of input: {expected}"),
            LexKind::Token(t) => format!("invalid syntax: {expected}, found '{}'", t.describe()),
        };
        self.fail_here(message)
    }

    // ── Statements ──────────────────────────────────────────────────────

    fn statement(&mut self) -> PResult<Stmt> {
        let line = self.current().line;
        let kind = match self.kind().clone() {
            LexKind::Indent => return Err(self.fail_here("unexpected indent")),
            LexKind::Dedent | LexKind::End => {
                return Err(self.unexpected("expected a statement"))
            }
            LexKind::Token(Token::If) => self.if_statement()?,
            LexKind::Token(Token::While) => {
                self.advance();
                let cond = self.expression()?;
                let body = self.loop_body()?;
                StmtKind::While { cond, body }
            }
            LexKind::Token(Token::For) => {
                self.advance();
                let var = self.ident("a loop variable")?;
                self.expect(&Token::In)?;
                let iter = self.expression()?;
                let body = self.loop_body()?;
                StmtKind::For { var, iter, body }
            }
            LexKind::Token(Token::Def) => self.def_statement()?,
            LexKind::Token(Token::Try) => self.try_statement()?,
            LexKind::Token(_) => {
                let kind = self.simple_statement()?;
                self.end_of_line()?;
                kind
            }
        };
        Ok(Stmt { line, kind })
    }

    fn end_of_line(&mut self) -> PResult<()> {
        if self.eat(&Token::Newline) {
            Ok(())
        } else {
            Err(self.unexpected("expected end of line"))
        }
    }

    /// `':' NEWLINE INDENT stmt+ DEDENT`, or a single simple statement on
    /// the same line as the colon.
    fn block(&mut self) -> PResult<Block> {
        if self.block_depth >= MAX_NESTING {
            return Err(self.fail_here("too many statically nested blocks"));
        }
        self.block_depth += 1;
        let body = self.block_body();
        self.block_depth -= 1;
        body
    }

    fn block_body(&mut self) -> PResult<Block> {
        self.expect(&Token::Colon)?;
        if !self.check(&Token::Newline) {
            let line = self.current().line;
            let kind = self.simple_statement()?;
            self.end_of_line()?;
            return Ok(vec![Stmt { line, kind }]);
        }
        self.advance();
        if !matches!(self.kind(), LexKind::Indent) {
            return Err(self.fail_here("expected an indented block"));
        }
        self.advance();

        let mut body = Vec::new();
        while !matches!(self.kind(), LexKind::Dedent | LexKind::End) {
            body.push(self.statement()?);
        }
        if matches!(self.kind(), LexKind::Dedent) {
            self.advance();
        }
        Ok(body)
    }

    fn loop_body(&mut self) -> PResult<Block> {
        self.loop_depth += 1;
        let body = self.block();
        self.loop_depth -= 1;
        body
    }

    fn if_statement(&mut self) -> PResult<StmtKind> {
        let line = self.advance().line;
        let cond = self.expression()?;
        let body = self.block()?;
        let mut branches = vec![IfBranch { line, cond, body }];
        let mut orelse = None;

        loop {
            if self.check(&Token::Elif) {
                let line = self.advance().line;
                let cond = self.expression()?;
                let body = self.block()?;
                branches.push(IfBranch { line, cond, body });
            } else if self.eat(&Token::Else) {
                orelse = Some(self.block()?);
                break;
            } else {
                break;
            }
        }
        Ok(StmtKind::If { branches, orelse })
    }

    fn def_statement(&mut self) -> PResult<StmtKind> {
        let line = self.advance().line;
        let name = self.ident("a function name")?;
        self.expect(&Token::LParen)?;

        let mut params: Vec<Param> = Vec::new();
        while !self.check(&Token::RParen) {
            let at = self.current().clone();
            let pname = self.ident("a parameter name")?;
            if params.iter().any(|p| p.name == pname) {
                return Err(self.fail_at(
                    at.line,
                    at.column,
                    format!("duplicate argument '{pname}' in function definition"),
                ));
            }
            let default = if self.eat(&Token::Assign) {
                Some(self.expression()?)
            } else {
                None
            };
            if default.is_none() && params.iter().any(|p| p.default.is_some()) {
                return Err(self.fail_at(
                    at.line,
                    at.column,
                    "non-default argument follows default argument",
                ));
            }
            params.push(Param {
                name: pname,
                default,
            });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen)?;

        let outer_loops = std::mem::replace(&mut self.loop_depth, 0);
        self.function_depth += 1;
        let body = self.block();
        self.function_depth -= 1;
        self.loop_depth = outer_loops;
        let body = body?;

        Ok(StmtKind::Def(Arc::new(FunctionDef {
            name,
            params,
            body,
            line,
        })))
    }

    fn try_statement(&mut self) -> PResult<StmtKind> {
        self.advance();
        let body = self.block()?;

        let mut handlers = Vec::new();
        while self.check(&Token::Except) {
            let line = self.advance().line;
            let kind = match self.token() {
                Some(Token::Ident(_)) => Some(self.ident("an error kind")?),
                _ => None,
            };
            let binding = if kind.is_some() && self.eat(&Token::As) {
                Some(self.ident("a name after 'as'")?)
            } else {
                None
            };
            let body = self.block()?;
            handlers.push(Handler {
                line,
                kind,
                binding,
                body,
            });
        }
        let finally = if self.eat(&Token::Finally) {
            Some(self.block()?)
        } else {
            None
        };
        if handlers.is_empty() && finally.is_none() {
            return Err(self.unexpected("expected 'except' or 'finally' block"));
        }
        Ok(StmtKind::Try {
            body,
            handlers,
            finally,
        })
    }

    fn simple_statement(&mut self) -> PResult<StmtKind> {
        match self.token().cloned() {
            Some(Token::Pass) => {
                self.advance();
                Ok(StmtKind::Pass)
            }
            Some(Token::Break) => {
                if self.loop_depth == 0 {
                    return Err(self.fail_here("'break' outside loop"));
                }
                self.advance();
                Ok(StmtKind::Break)
            }
            Some(Token::Continue) => {
                if self.loop_depth == 0 {
                    return Err(self.fail_here("'continue' not properly in loop"));
                }
                self.advance();
                Ok(StmtKind::Continue)
            }
            Some(Token::Return) => {
                if self.function_depth == 0 {
                    return Err(self.fail_here("'return' outside function"));
                }
                self.advance();
                if self.check(&Token::Newline) {
                    Ok(StmtKind::Return(None))
                } else {
                    Ok(StmtKind::Return(Some(self.expression()?)))
                }
            }
            Some(Token::Raise) => {
                self.advance();
                Ok(StmtKind::Raise(self.expression()?))
            }
            Some(Token::Import) => {
                self.advance();
                let module = self.ident("a module name")?;
                let alias = if self.eat(&Token::As) {
                    Some(self.ident("a name after 'as'")?)
                } else {
                    None
                };
                Ok(StmtKind::Import { module, alias })
            }
            Some(Token::From) => {
                self.advance();
                let module = self.ident("a module name")?;
                self.expect(&Token::Import)?;
                let mut names = vec![self.ident("a name to import")?];
                while self.eat(&Token::Comma) {
                    names.push(self.ident("a name to import")?);
                }
                Ok(StmtKind::FromImport { module, names })
            }
            _ => self.expression_statement(),
        }
    }

    fn expression_statement(&mut self) -> PResult<StmtKind> {
        let (line, column) = (self.current().line, self.current().column);
        let expr = self.expression()?;

        if self.eat(&Token::Assign) {
            let target = self.to_target(expr, line, column)?;
            let value = self.expression()?;
            return Ok(StmtKind::Assign { target, value });
        }

        let aug = match self.token() {
            Some(Token::PlusAssign) => Some(BinOp::Add),
            Some(Token::MinusAssign) => Some(BinOp::Sub),
            Some(Token::StarAssign) => Some(BinOp::Mul),
            Some(Token::SlashAssign) => Some(BinOp::Div),
            _ => None,
        };
        if let Some(op) = aug {
            self.advance();
            let target = self.to_target(expr, line, column)?;
            let value = self.expression()?;
            return Ok(StmtKind::AugAssign { target, op, value });
        }

        Ok(StmtKind::Expr(expr))
    }

    fn to_target(&self, expr: Expr, line: u32, column: u32) -> PResult<Target> {
        match expr {
            Expr::Name(name) => Ok(Target::Name(name)),
            Expr::Index { object, index } => Ok(Target::Index {
                object: *object,
                index: *index,
            }),
            Expr::Call { .. } => Err(self.fail_at(line, column, "cannot assign to function call")),
            _ => Err(self.fail_at(line, column, "cannot assign to expression")),
        }
    }

    // ── Expressions ─────────────────────────────────────────────────────

    pub fn expression(&mut self) -> PResult<Expr> {
        self.nested("too many nested parentheses", Self::or_expr)
    }

    fn or_expr(&mut self) -> PResult<Expr> {
        let mut left = self.and_expr()?;
        while self.eat(&Token::Or) {
            let right = self.and_expr()?;
            left = Expr::BoolOp {
                op: BoolOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> PResult<Expr> {
        let mut left = self.not_expr()?;
        while self.eat(&Token::And) {
            let right = self.not_expr()?;
            left = Expr::BoolOp {
                op: BoolOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> PResult<Expr> {
        if self.eat(&Token::Not) {
            let operand = self.nested("too many nested operators", Self::not_expr)?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> PResult<Expr> {
        let first = self.arith()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.token() {
                Some(Token::EqEq) => CmpOp::Eq,
                Some(Token::NotEq) => CmpOp::NotEq,
                Some(Token::Lt) => CmpOp::Lt,
                Some(Token::LtEq) => CmpOp::LtEq,
                Some(Token::Gt) => CmpOp::Gt,
                Some(Token::GtEq) => CmpOp::GtEq,
                Some(Token::In) => CmpOp::In,
                Some(Token::Not) if self.peek_token(1) == Some(&Token::In) => {
                    self.advance();
                    CmpOp::NotIn
                }
                _ => break,
            };
            self.advance();
            rest.push((op, self.arith()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare {
                first: Box::new(first),
                rest,
            })
        }
    }

    fn arith(&mut self) -> PResult<Expr> {
        let mut left = self.term()?;
        loop {
            let op = match self.token() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.term()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn term(&mut self) -> PResult<Expr> {
        let mut left = self.factor()?;
        loop {
            let op = match self.token() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::SlashSlash) => BinOp::FloorDiv,
                Some(Token::Percent) => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.factor()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn factor(&mut self) -> PResult<Expr> {
        let op = match self.token() {
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Plus) => UnaryOp::Pos,
            _ => return self.power(),
        };
        self.advance();
        let operand = self.nested("too many nested operators", Self::factor)?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    /// `**` binds tighter than unary minus on its left, looser on its right.
    fn power(&mut self) -> PResult<Expr> {
        let base = self.postfix()?;
        if self.eat(&Token::StarStar) {
            let exponent = self.nested("too many nested operators", Self::factor)?;
            return Ok(binary(BinOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.atom()?;
        loop {
            if self.eat(&Token::LParen) {
                let (args, kwargs) = self.call_args()?;
                expr = Expr::Call {
                    func: Box::new(expr),
                    args,
                    kwargs,
                };
            } else if self.eat(&Token::Dot) {
                let name = self.ident("an attribute name")?;
                expr = Expr::Attribute {
                    object: Box::new(expr),
                    name,
                };
            } else if self.eat(&Token::LBracket) {
                let index = self.expression()?;
                self.expect(&Token::RBracket)?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                return Ok(expr);
            }
        }
    }

    /// Arguments after an opening `(`, through the closing `)`.
    fn call_args(&mut self) -> PResult<(Vec<Expr>, Vec<(String, Expr)>)> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        while !self.check(&Token::RParen) {
            let keyword = match (self.token(), self.peek_token(1)) {
                (Some(Token::Ident(name)), Some(Token::Assign)) => Some(name.clone()),
                _ => None,
            };
            match keyword {
                Some(name) => {
                    if kwargs.iter().any(|(k, _)| *k == name) {
                        return Err(self.fail_here(format!("keyword argument repeated: {name}")));
                    }
                    self.advance();
                    self.advance();
                    kwargs.push((name, self.expression()?));
                }
                None => {
                    if !kwargs.is_empty() {
                        return Err(self.fail_here("positional argument follows keyword argument"));
                    }
                    args.push(self.expression()?);
                }
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen)?;
        Ok((args, kwargs))
    }

    fn atom(&mut self) -> PResult<Expr> {
        let token = match self.token() {
            Some(t) => t.clone(),
            None => return Err(self.unexpected("expected an expression")),
        };
        let expr = match token {
            Token::Int(n) => Expr::Int(n),
            Token::Float(x) => Expr::Float(x),
            Token::Str(s) => Expr::Str(s),
            Token::True => Expr::Bool(true),
            Token::False => Expr::Bool(false),
            Token::None => Expr::None,
            Token::Ident(name) => Expr::Name(name),
            Token::LParen => {
                self.advance();
                return self.parenthesized();
            }
            Token::LBracket => {
                self.advance();
                let items = self.sequence(&Token::RBracket)?;
                return Ok(Expr::List(items));
            }
            Token::LBrace => {
                self.advance();
                return self.dict_display();
            }
            _ => return Err(self.unexpected("expected an expression")),
        };
        self.advance();
        Ok(expr)
    }

    /// `(expr)` groups; `()` and `(a, b)` build lists.
    fn parenthesized(&mut self) -> PResult<Expr> {
        if self.eat(&Token::RParen) {
            return Ok(Expr::List(Vec::new()));
        }
        let first = self.expression()?;
        if self.eat(&Token::Comma) {
            let mut items = vec![first];
            items.extend(self.sequence(&Token::RParen)?);
            return Ok(Expr::List(items));
        }
        self.expect(&Token::RParen)?;
        Ok(first)
    }

    /// Comma-separated expressions through `close`, trailing comma allowed.
    fn sequence(&mut self, close: &Token) -> PResult<Vec<Expr>> {
        let mut items = Vec::new();
        while !self.check(close) {
            items.push(self.expression()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(close)?;
        Ok(items)
    }

    fn dict_display(&mut self) -> PResult<Expr> {
        let mut entries = Vec::new();
        while !self.check(&Token::RBrace) {
            let key = self.expression()?;
            self.expect(&Token::Colon)?;
            let value = self.expression()?;
            entries.push((key, value));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RBrace)?;
        Ok(Expr::Dict(entries))
    }
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Block {
        parse(source, "<test>").unwrap()
    }

    fn parse_err(source: &str) -> CompileFailure {
        parse(source, "<test>").unwrap_err()
    }

    fn only_expr(source: &str) -> Expr {
        match parse_ok(source).remove(0).kind {
            StmtKind::Expr(e) => e,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn statements_carry_their_start_line() {
        let body = parse_ok("a = 1\n\n# note\nb = 2\nif a:\n    c = 3\n");
        let lines: Vec<u32> = body.iter().map(|s| s.line).collect();
        assert_eq!(lines, vec![1, 4, 5]);
        match &body[2].kind {
            StmtKind::If { branches, .. } => assert_eq!(branches[0].body[0].line, 6),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let e = only_expr("1 + 2 * 3");
        match e {
            Expr::Binary {
                op: BinOp::Add,
                right,
                ..
            } => assert!(matches!(*right, Expr::Binary { op: BinOp::Mul, .. })),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unary_minus_applies_after_power() {
        // -2 ** 2 == -(2 ** 2)
        let e = only_expr("-2 ** 2");
        match e {
            Expr::Unary {
                op: UnaryOp::Neg,
                operand,
            } => assert!(matches!(*operand, Expr::Binary { op: BinOp::Pow, .. })),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn chained_comparison_keeps_all_operands() {
        match only_expr("0 < x <= 10") {
            Expr::Compare { rest, .. } => {
                let ops: Vec<CmpOp> = rest.iter().map(|(op, _)| *op).collect();
                assert_eq!(ops, vec![CmpOp::Lt, CmpOp::LtEq]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            only_expr("k not in d"),
            Expr::Compare { ref rest, .. } if rest[0].0 == CmpOp::NotIn
        ));
    }

    #[test]
    fn call_with_keyword_arguments() {
        match only_expr("show_object(result, name='x', options={'color': 'red'})") {
            Expr::Call { args, kwargs, .. } => {
                assert_eq!(args.len(), 1);
                let names: Vec<&str> = kwargs.iter().map(|(k, _)| k.as_str()).collect();
                assert_eq!(names, vec!["name", "options"]);
                assert!(matches!(kwargs[1].1, Expr::Dict(ref e) if e.len() == 1));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn method_call_chain() {
        match only_expr("box(1, 1, 1).translate((1, 0, 0)).union(b)") {
            Expr::Call { func, args, .. } => {
                assert_eq!(args.len(), 1);
                assert!(matches!(*func, Expr::Attribute { ref name, .. } if name == "union"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn tuple_display_becomes_list() {
        assert_eq!(
            only_expr("(1, 2)"),
            Expr::List(vec![Expr::Int(1), Expr::Int(2)])
        );
        assert_eq!(only_expr("(1)"), Expr::Int(1));
    }

    #[test]
    fn def_with_defaults() {
        let body = parse_ok("def plate(w, h=2.0):\n    return box(w, h, 1)\n");
        match &body[0].kind {
            StmtKind::Def(def) => {
                assert_eq!(def.name, "plate");
                assert_eq!(def.line, 1);
                assert!(def.params[0].default.is_none());
                assert_eq!(def.params[1].default, Some(Expr::Float(2.0)));
                assert_eq!(def.body[0].line, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn if_elif_else() {
        let body = parse_ok("if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n");
        match &body[0].kind {
            StmtKind::If { branches, orelse } => {
                assert_eq!(branches.len(), 2);
                assert_eq!(branches[1].line, 3);
                assert_eq!(orelse.as_ref().map(|b| b.len()), Some(1));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn try_except_finally() {
        let src = "try:\n    f()\nexcept ValueError as e:\n    pass\nexcept:\n    pass\nfinally:\n    g()\n";
        match &parse_ok(src)[0].kind {
            StmtKind::Try {
                handlers, finally, ..
            } => {
                assert_eq!(handlers[0].kind.as_deref(), Some("ValueError"));
                assert_eq!(handlers[0].binding.as_deref(), Some("e"));
                assert!(handlers[1].kind.is_none());
                assert!(finally.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn imports() {
        let body = parse_ok("import helpers as h\nfrom parts import bracket, plate\n");
        assert_eq!(
            body[0].kind,
            StmtKind::Import {
                module: "helpers".into(),
                alias: Some("h".into())
            }
        );
        assert_eq!(
            body[1].kind,
            StmtKind::FromImport {
                module: "parts".into(),
                names: vec!["bracket".into(), "plate".into()]
            }
        );
    }

    #[test]
    fn index_and_augmented_assignment() {
        let body = parse_ok("d['k'] = 1\nn += 2\n");
        assert!(matches!(
            body[0].kind,
            StmtKind::Assign {
                target: Target::Index { .. },
                ..
            }
        ));
        assert!(matches!(
            body[1].kind,
            StmtKind::AugAssign { op: BinOp::Add, .. }
        ));
    }

    #[test]
    fn single_line_suite() {
        let body = parse_ok("for i in range(3): total += i\n");
        match &body[0].kind {
            StmtKind::For { body, .. } => assert_eq!(body.len(), 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_colon_is_reported_at_the_line() {
        let err = parse_err("x = 1\nif x\n    y = 2\n");
        assert_eq!(err.line, 2);
        assert!(err.message.contains("expected ':'"), "{}", err.message);
        assert_eq!(err.text.as_deref(), Some("if x"));
    }

    #[test]
    fn missing_indented_block() {
        let err = parse_err("def f():\nreturn 1\n");
        assert_eq!(err.line, 2);
        assert_eq!(err.message, "expected an indented block");
    }

    #[test]
    fn unexpected_indent() {
        let err = parse_err("a = 1\n    b = 2\n");
        assert_eq!(err.line, 2);
        assert_eq!(err.message, "unexpected indent");
    }

    #[test]
    fn assignment_to_call_is_rejected() {
        let err = parse_err("f() = 3");
        assert_eq!(err.message, "cannot assign to function call");
    }

    #[test]
    fn positional_after_keyword_is_rejected() {
        let err = parse_err("f(a=1, 2)");
        assert_eq!(err.message, "positional argument follows keyword argument");
    }

    #[test]
    fn try_without_handlers_is_rejected() {
        let err = parse_err("try:\n    pass\nx = 1\n");
        assert!(err.message.contains("'except' or 'finally'"));
    }

    #[test]
    fn control_flow_outside_its_construct_is_rejected() {
        assert_eq!(parse_err("return 1\n").message, "'return' outside function");
        assert_eq!(parse_err("break\n").message, "'break' outside loop");
        let err = parse_err("for i in x:\n    def f():\n        continue\n");
        assert_eq!(err.line, 3);
        assert!(parse(
            "def f():\n    while True:\n        break\n    return 1\n",
            "<test>"
        )
        .is_ok());
    }

    #[test]
    fn unclosed_call_reports_end_of_input() {
        let err = parse_err("show_object(box(1, 2, 3)");
        assert_eq!(err.line, 1);
        assert!(err.message.contains("never closed"), "{}", err.message);
    }
}
