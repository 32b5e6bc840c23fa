//! Lightweight SQL tokenizer for the query gate.
//!
//! Produces a stream of [`Token`]s from the SQL text an LLM hands us. It is
//! built for structural analysis (table references, predicate regions), NOT
//! for full AST construction. The lexer never fails: anything it cannot
//! classify becomes a [`TokenKind::Unknown`] token.
//!
//! Tokens are zero-copy `&str` slices into the source with a byte offset and
//! a 1-based line/column position. The lexer handles:
//!
//! - keywords (case-insensitive) and identifiers, including `$` and Unicode
//! - quoted identifiers: `` `backtick` `` (doubled-backtick escape) and
//!   `"double-quoted"` (doubled-quote and backslash escapes, as MySQL reads
//!   a double-quoted string)
//! - string literals with both `''` and MySQL backslash escapes
//! - number literals (integer, decimal, scientific notation)
//! - bind parameters: `?`, `:name`, `$1`, `%s`, `%(name)s`
//! - operators, including MySQL's `<=>`, `||` and `&&`
//! - line comments (`# ...`, and `-- ...` only when whitespace, a control
//!   character or end of input follows the dashes, so `--1` is two minus
//!   signs and a number)
//! - block comments, which end at the first `*/` and never nest
//! - executable comments (`/*! ... */`, `/*M! ... */`) and optimizer hints
//!   (`/*+ ... */`), kept apart from ordinary comments because the server
//!   reads their bodies

/// A token kind produced by the SQL lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// SQL keyword: SELECT, FROM, WHERE, JOIN, AND, ...
    Keyword,
    /// Unquoted identifier: table_name, column_name.
    Identifier,
    /// Quoted identifier: backtick-quoted or double-quoted.
    QuotedIdent,
    /// Single-quoted string literal.
    StringLiteral,
    /// Numeric literal: integer, decimal, or scientific notation.
    NumberLiteral,
    /// Bind parameter placeholder whose value the gate cannot see.
    Parameter,
    /// Comparison, logical or arithmetic operator.
    Operator,
    /// Left parenthesis `(`.
    LeftParen,
    /// Right parenthesis `)`.
    RightParen,
    /// Comma `,`.
    Comma,
    /// Semicolon `;`.
    Semicolon,
    /// Dot `.`.
    Dot,
    /// Line comment `-- ...` or `# ...`.
    LineComment,
    /// Block comment `/* ... */`, ended by the first `*/`.
    BlockComment,
    /// `/*! ... */`, `/*M! ... */` or `/*+ ... */`: a comment whose body the
    /// server reads as SQL or as optimizer hints.
    ExecutableComment,
    /// Spaces and tabs.
    Whitespace,
    /// `\n` or `\r\n`.
    Newline,
    /// Unrecognized character.
    Unknown,
}

/// A single token with its kind, text slice, and position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    /// The kind of token.
    pub kind: TokenKind,
    /// Zero-copy slice into the original source text.
    pub text: &'a str,
    /// Byte offset in the source.
    pub offset: usize,
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub column: u32,
}

impl Token<'_> {
    /// Byte offset one past the end of this token.
    #[must_use]
    pub fn end(&self) -> usize {
        self.offset + self.text.len()
    }

    /// Whether this token is the keyword `word` (case-insensitive).
    #[must_use]
    pub fn is_keyword(&self, word: &str) -> bool {
        self.kind == TokenKind::Keyword && self.text.eq_ignore_ascii_case(word)
    }

    /// Whether this token is the operator `op`.
    #[must_use]
    pub fn is_operator(&self, op: &str) -> bool {
        self.kind == TokenKind::Operator && self.text == op
    }

    /// Whether this token can name a table or column.
    #[must_use]
    pub fn is_name(&self) -> bool {
        matches!(self.kind, TokenKind::Identifier | TokenKind::QuotedIdent)
    }

    /// The lowercase, unquoted name this token spells, if it is a name.
    #[must_use]
    pub fn name(&self) -> Option<String> {
        match self.kind {
            TokenKind::Identifier => Some(self.text.to_lowercase()),
            TokenKind::QuotedIdent => Some(unquote(self.text).to_lowercase()),
            _ => None,
        }
    }
}

/// Strip the surrounding quote characters from a quoted identifier.
fn unquote(text: &str) -> &str {
    let inner = text
        .strip_prefix('`')
        .or_else(|| text.strip_prefix('"'))
        .unwrap_or(text);
    inner
        .strip_suffix('`')
        .or_else(|| inner.strip_suffix('"'))
        .unwrap_or(inner)
}

/// SQL keywords recognized by the lexer (uppercase, sorted for binary search).
const SQL_KEYWORDS: &[&str] = &[
    "ALL",
    "AND",
    "ANY",
    "AS",
    "ASC",
    "BETWEEN",
    "BY",
    "CALL",
    "CASE",
    "CAST",
    "CREATE",
    "CROSS",
    "DELETE",
    "DESC",
    "DESCRIBE",
    "DISTINCT",
    "DIV",
    "DO",
    "DROP",
    "ELSE",
    "END",
    "EXCEPT",
    "EXISTS",
    "EXPLAIN",
    "FALSE",
    "FETCH",
    "FOR",
    "FROM",
    "FULL",
    "GRANT",
    "GROUP",
    "HANDLER",
    "HAVING",
    "IF",
    "IN",
    "INNER",
    "INSERT",
    "INTERSECT",
    "INTERVAL",
    "INTO",
    "IS",
    "JOIN",
    "LATERAL",
    "LEFT",
    "LIKE",
    "LIMIT",
    "LOAD",
    "LOCK",
    "MOD",
    "NATURAL",
    "NOT",
    "NULL",
    "OFFSET",
    "ON",
    "OR",
    "ORDER",
    "OUTER",
    "OVER",
    "PARTITION",
    "RECURSIVE",
    "REGEXP",
    "RENAME",
    "REPLACE",
    "RIGHT",
    "RLIKE",
    "SELECT",
    "SET",
    "SHOW",
    "STRAIGHT_JOIN",
    "TABLE",
    "THEN",
    "TRUE",
    "TRUNCATE",
    "UNION",
    "UPDATE",
    "USE",
    "USING",
    "VALUES",
    "WHEN",
    "WHERE",
    "WINDOW",
    "WITH",
    "XOR",
];

/// Check whether an identifier string is a SQL keyword (case-insensitive).
fn is_keyword(word: &str) -> bool {
    let upper = word.to_ascii_uppercase();
    SQL_KEYWORDS.binary_search(&upper.as_str()).is_ok()
}

/// Byte cursor over the source that keeps line/column in sync.
struct Cursor<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
}

impl<'a> Cursor<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    fn current_char(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    /// Advance past one character, counting `\n` and `\r\n` as line breaks.
    fn bump(&mut self) {
        match self.peek(0) {
            None => {}
            Some(b'\n') => {
                self.pos += 1;
                self.line += 1;
                self.column = 1;
            }
            Some(b'\r') => {
                self.pos += if self.peek(1) == Some(b'\n') { 2 } else { 1 };
                self.line += 1;
                self.column = 1;
            }
            Some(b) if b < 128 => {
                self.pos += 1;
                self.column += 1;
            }
            Some(_) => {
                self.pos += self.current_char().map_or(1, char::len_utf8);
                self.column += 1;
            }
        }
    }

    fn bump_n(&mut self, n: usize) {
        for _ in 0..n {
            self.bump();
        }
    }

    fn bump_while(&mut self, mut keep: impl FnMut(char) -> bool) {
        while let Some(c) = self.current_char() {
            if !keep(c) {
                break;
            }
            self.bump();
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Tokenize a SQL source string into a vector of [`Token`]s.
#[must_use]
pub fn tokenize(source: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut cur = Cursor::new(source);

    while !cur.at_end() {
        let start = cur.pos;
        let line = cur.line;
        let column = cur.column;
        let kind = lex_one(&mut cur);
        tokens.push(Token {
            kind,
            text: &source[start..cur.pos],
            offset: start,
            line,
            column,
        });
    }

    tokens
}

/// Consume exactly one token at the cursor and return its kind.
fn lex_one(cur: &mut Cursor<'_>) -> TokenKind {
    let Some(ch) = cur.peek(0) else {
        return TokenKind::Unknown;
    };
    let next = cur.peek(1);

    match ch {
        b'\n' | b'\r' => {
            cur.bump();
            TokenKind::Newline
        }
        b' ' | b'\t' => {
            cur.bump_while(|c| c == ' ' || c == '\t');
            TokenKind::Whitespace
        }
        b'-' if next == Some(b'-')
            && cur.peek(2).map_or(true, |b| b.is_ascii_whitespace() || b.is_ascii_control()) =>
        {
            cur.bump_while(|c| c != '\n' && c != '\r');
            TokenKind::LineComment
        }
        b'#' => {
            cur.bump_while(|c| c != '\n' && c != '\r');
            TokenKind::LineComment
        }
        b'/' if next == Some(b'*') => {
            let executable = matches!(
                (cur.peek(2), cur.peek(3)),
                (Some(b'!' | b'+'), _) | (Some(b'M'), Some(b'!'))
            );
            lex_block_comment(cur);
            if executable {
                TokenKind::ExecutableComment
            } else {
                TokenKind::BlockComment
            }
        }
        b'\'' => {
            lex_quoted(cur, b'\'', true);
            TokenKind::StringLiteral
        }
        b'"' => {
            lex_quoted(cur, b'"', true);
            TokenKind::QuotedIdent
        }
        b'`' => {
            lex_quoted(cur, b'`', false);
            TokenKind::QuotedIdent
        }
        b'0'..=b'9' => {
            lex_number(cur);
            TokenKind::NumberLiteral
        }
        b'?' => {
            cur.bump();
            TokenKind::Parameter
        }
        b':' if next.is_some_and(|b| b.is_ascii_alphabetic() || b == b'_') => {
            cur.bump();
            cur.bump_while(is_ident_char);
            TokenKind::Parameter
        }
        b'$' if next.is_some_and(|b| b.is_ascii_digit()) => {
            cur.bump();
            cur.bump_while(|c| c.is_ascii_digit());
            TokenKind::Parameter
        }
        b'%' if next == Some(b's') => {
            cur.bump_n(2);
            TokenKind::Parameter
        }
        b'%' if next == Some(b'(') => {
            cur.bump_while(|c| c != ')');
            cur.bump();
            if cur.peek(0) == Some(b's') {
                cur.bump();
            }
            TokenKind::Parameter
        }
        b'(' => {
            cur.bump();
            TokenKind::LeftParen
        }
        b')' => {
            cur.bump();
            TokenKind::RightParen
        }
        b',' => {
            cur.bump();
            TokenKind::Comma
        }
        b';' => {
            cur.bump();
            TokenKind::Semicolon
        }
        b'.' => {
            cur.bump();
            TokenKind::Dot
        }
        b'<' => {
            cur.bump();
            if cur.peek(0) == Some(b'=') && cur.peek(1) == Some(b'>') {
                cur.bump_n(2);
            } else if matches!(cur.peek(0), Some(b'>' | b'=')) {
                cur.bump();
            }
            TokenKind::Operator
        }
        b'>' | b'!' => {
            cur.bump();
            if cur.peek(0) == Some(b'=') {
                cur.bump();
            }
            TokenKind::Operator
        }
        b'|' if next == Some(b'|') => {
            cur.bump_n(2);
            TokenKind::Operator
        }
        b'&' if next == Some(b'&') => {
            cur.bump_n(2);
            TokenKind::Operator
        }
        b'=' | b'+' | b'-' | b'*' | b'/' | b'%' => {
            cur.bump();
            TokenKind::Operator
        }
        _ => {
            let c = cur.current_char().unwrap_or('\u{fffd}');
            if c.is_alphabetic() || c == '_' || c == '$' {
                let start = cur.pos;
                cur.bump_while(is_ident_char);
                if is_keyword(&cur.source[start..cur.pos]) {
                    TokenKind::Keyword
                } else {
                    TokenKind::Identifier
                }
            } else {
                cur.bump();
                TokenKind::Unknown
            }
        }
    }
}

/// Consume a `/* ... */` comment up to the first `*/`. Unterminated
/// comments run to the end of input.
fn lex_block_comment(cur: &mut Cursor<'_>) {
    cur.bump_n(2);
    while !cur.at_end() {
        if cur.peek(0) == Some(b'*') && cur.peek(1) == Some(b'/') {
            cur.bump_n(2);
            return;
        }
        cur.bump();
    }
}

/// Consume a literal delimited by `quote`, where a doubled quote stands for
/// itself and, with `backslash`, `\\` escapes the next character.
fn lex_quoted(cur: &mut Cursor<'_>, quote: u8, backslash: bool) {
    cur.bump();
    while let Some(b) = cur.peek(0) {
        if backslash && b == b'\\' {
            cur.bump_n(2);
        } else if b == quote && cur.peek(1) == Some(quote) {
            cur.bump_n(2);
        } else if b == quote {
            cur.bump();
            return;
        } else {
            cur.bump();
        }
    }
}

fn lex_number(cur: &mut Cursor<'_>) {
    cur.bump_while(|c| c.is_ascii_digit());
    if cur.peek(0) == Some(b'.') && cur.peek(1).is_some_and(|b| b.is_ascii_digit()) {
        cur.bump();
        cur.bump_while(|c| c.is_ascii_digit());
    }
    if matches!(cur.peek(0), Some(b'e' | b'E')) {
        let signed = matches!(cur.peek(1), Some(b'+' | b'-'));
        let digit_at = if signed { 2 } else { 1 };
        if cur.peek(digit_at).is_some_and(|b| b.is_ascii_digit()) {
            cur.bump_n(digit_at);
            cur.bump_while(|c| c.is_ascii_digit());
        }
    }
}

/// Filter a token stream to only "meaningful" tokens: those that are not
/// whitespace, newlines, or comments.
#[must_use]
pub fn meaningful_tokens<'a>(tokens: &'a [Token<'a>]) -> Vec<&'a Token<'a>> {
    tokens
        .iter()
        .filter(|t| {
            !matches!(
                t.kind,
                TokenKind::Whitespace
                    | TokenKind::Newline
                    | TokenKind::LineComment
                    | TokenKind::BlockComment
                    | TokenKind::ExecutableComment
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
