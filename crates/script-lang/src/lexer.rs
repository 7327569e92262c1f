//! Lexical analysis for CAD scripts.
//!
//! Tokenization uses logos; a layout pass then turns physical lines into
//! logical lines with INDENT/DEDENT markers.
//!
//! - Comments (`# ...`) and intra-line whitespace are skipped by logos
//! - Newlines inside `()`, `[]` and `{}` are dropped (implicit joining)
//! - Blank and comment-only lines never produce tokens

use logos::Logos;

use crate::error::CompileFailure;

/// Script token.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\f]+")]
#[logos(skip r"#[^\n]*")]
pub enum Token {
    // === Keywords ===
    #[token("def")]
    Def,
    #[token("return")]
    Return,
    #[token("if")]
    If,
    #[token("elif")]
    Elif,
    #[token("else")]
    Else,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("while")]
    While,
    #[token("import")]
    Import,
    #[token("from")]
    From,
    #[token("as")]
    As,
    #[token("pass")]
    Pass,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("not")]
    Not,
    #[token("True")]
    True,
    #[token("False")]
    False,
    #[token("None")]
    None,
    #[token("try")]
    Try,
    #[token("except")]
    Except,
    #[token("finally")]
    Finally,
    #[token("raise")]
    Raise,

    // === Operators ===
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("//")]
    SlashSlash,
    #[token("%")]
    Percent,
    #[token("**")]
    StarStar,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    LtEq,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtEq,
    #[token("=")]
    Assign,
    #[token("+=")]
    PlusAssign,
    #[token("-=")]
    MinusAssign,
    #[token("*=")]
    StarAssign,
    #[token("/=")]
    SlashAssign,

    // === Delimiters ===
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,
    #[token("\n")]
    Newline,

    // === Literals ===
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| unescape(lex.slice()))]
    #[regex(r"'([^'\\\n]|\\.)*'", |lex| unescape(lex.slice()))]
    Str(String),

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
}

impl Token {
    /// Source-level spelling, for error messages.
    pub fn describe(&self) -> String {
        let fixed = match self {
            Token::Int(n) => return n.to_string(),
            Token::Float(x) => return x.to_string(),
            Token::Str(s) => return format!("'{s}'"),
            Token::Ident(name) => return name.clone(),
            Token::Newline => "end of line",
            Token::Def => "def",
            Token::Return => "return",
            Token::If => "if",
            Token::Elif => "elif",
            Token::Else => "else",
            Token::For => "for",
            Token::In => "in",
            Token::While => "while",
            Token::Import => "import",
            Token::From => "from",
            Token::As => "as",
            Token::Pass => "pass",
            Token::Break => "break",
            Token::Continue => "continue",
            Token::And => "and",
            Token::Or => "or",
            Token::Not => "not",
            Token::True => "True",
            Token::False => "False",
            Token::None => "None",
            Token::Try => "try",
            Token::Except => "except",
            Token::Finally => "finally",
            Token::Raise => "raise",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::SlashSlash => "//",
            Token::Percent => "%",
            Token::StarStar => "**",
            Token::EqEq => "==",
            Token::NotEq => "!=",
            Token::Lt => "<",
            Token::LtEq => "<=",
            Token::Gt => ">",
            Token::GtEq => ">=",
            Token::Assign => "=",
            Token::PlusAssign => "+=",
            Token::MinusAssign => "-=",
            Token::StarAssign => "*=",
            Token::SlashAssign => "/=",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::Comma => ",",
            Token::Colon => ":",
            Token::Dot => ".",
        };
        fixed.to_string()
    }
}

/// Strip quotes and resolve escapes. Unknown escapes are rejected.
fn unescape(quoted: &str) -> Option<String> {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            _ => return None,
        }
    }
    Some(out)
}

/// What the parser sees after layout.
#[derive(Debug, Clone, PartialEq)]
pub enum LexKind {
    Token(Token),
    Indent,
    Dedent,
    End,
}

/// A positioned lexeme (1-based line and column).
#[derive(Debug, Clone, PartialEq)]
pub struct Lexeme {
    pub kind: LexKind,
    pub line: u32,
    pub column: u32,
}

/// Maps byte offsets to line/column positions.
#[derive(Debug, Clone)]
pub struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    /// 1-based (line, column) of a byte offset.
    pub fn position(&self, offset: usize) -> (u32, u32) {
        let line = match self.starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        ((line + 1) as u32, (offset - self.starts[line] + 1) as u32)
    }

    pub fn line_count(&self) -> usize {
        self.starts.len()
    }
}

/// Tokenize `source` and apply the indentation layout.
///
/// The stream always ends with NEWLINE (if any statement was open), the
/// DEDENTs needed to close every block, then END.
pub fn tokenize(source: &str, file: &str) -> Result<Vec<Lexeme>, CompileFailure> {
    let index = LineIndex::new(source);
    let fail = |offset: usize, message: &str| {
        let (line, column) = index.position(offset);
        CompileFailure {
            message: message.to_string(),
            file: file.to_string(),
            line,
            column,
            text: source.lines().nth(line as usize - 1).map(str::to_string),
        }
    };

    let mut out = Vec::new();
    let mut indents: Vec<u32> = vec![1];
    // Byte offsets of open brackets.
    let mut open: Vec<usize> = Vec::new();
    let mut at_line_start = true;

    let mut lexer = Token::lexer(source);
    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let token = result.map_err(|_| fail(span.start, "invalid syntax"))?;
        let (line, column) = index.position(span.start);

        if token == Token::Newline {
            if open.is_empty() && !at_line_start {
                out.push(Lexeme {
                    kind: LexKind::Token(Token::Newline),
                    line,
                    column,
                });
                at_line_start = true;
            }
            continue;
        }

        if at_line_start && open.is_empty() {
            let current = *indents.last().unwrap_or(&1);
            if column > current {
                indents.push(column);
                out.push(Lexeme {
                    kind: LexKind::Indent,
                    line,
                    column,
                });
            } else {
                while column < *indents.last().unwrap_or(&1) {
                    indents.pop();
                    out.push(Lexeme {
                        kind: LexKind::Dedent,
                        line,
                        column,
                    });
                }
                if column != *indents.last().unwrap_or(&1) {
                    return Err(fail(
                        span.start,
                        "unindent does not match any outer indentation level",
                    ));
                }
            }
            at_line_start = false;
        }

        match token {
            Token::LParen | Token::LBracket | Token::LBrace => open.push(span.start),
            Token::RParen | Token::RBracket | Token::RBrace => {
                if open.pop().is_none() {
                    return Err(fail(span.start, "unmatched closing bracket"));
                }
            }
            _ => {}
        }

        out.push(Lexeme {
            kind: LexKind::Token(token),
            line,
            column,
        });
    }

    let (last_line, _) = index.position(source.len());
    if let Some(&offset) = open.last() {
        let bracket = &source[offset..offset + 1];
        return Err(fail(offset, &format!("'{bracket}' was never closed")));
    }
    if !at_line_start {
        out.push(Lexeme {
            kind: LexKind::Token(Token::Newline),
            line: last_line,
            column: 1,
        });
    }
    while indents.len() > 1 {
        indents.pop();
        out.push(Lexeme {
            kind: LexKind::Dedent,
            line: last_line,
            column: 1,
        });
    }
    out.push(Lexeme {
        kind: LexKind::End,
        line: last_line,
        column: 1,
    });
    Ok(out)
}
