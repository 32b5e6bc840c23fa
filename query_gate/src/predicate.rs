//! Structured view of WHERE / ON predicates.
//!
//! A predicate region is parsed into an OR / AND / NOT tree whose leaves are
//! equality comparisons between simple operands. Anything the parser does
//! not understand becomes [`Predicate::Opaque`], which never counts as a
//! self filter. The parser is total: any token slice yields a tree.

use crate::sql_lexer::{Token, TokenKind};

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// `name`, `qualifier.name` or `schema.qualifier.name` (lowercased).
    Column {
        qualifier: Option<String>,
        name: String,
    },
    /// Numeric literal text.
    Number(String),
    /// Contents of a single-quoted string literal.
    Text(String),
    /// Bind parameter; its value is unknown to the gate.
    Parameter,
    /// Any other expression.
    Other,
}

impl Operand {
    /// Whether this operand is a literal that compares equal to `id`.
    #[must_use]
    pub fn equals_id(&self, id: u64) -> bool {
        match self {
            Self::Number(text) => text.parse::<u64>() == Ok(id),
            Self::Text(text) => text.trim().parse::<u64>() == Ok(id),
            _ => false,
        }
    }
}

/// A parsed predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Or(Vec<Predicate>),
    And(Vec<Predicate>),
    Not(Box<Predicate>),
    /// `left = right` or `left <=> right`.
    Equals(Operand, Operand),
    Opaque,
}

impl Predicate {
    /// Whether every row this predicate admits has a target column equal to
    /// `id`. `is_target` decides which column operands count.
    ///
    /// `AND` needs one pinned branch, `OR` needs all of them, `NOT` and
    /// opaque expressions never pin.
    pub fn pins(&self, id: u64, is_target: &dyn Fn(&Operand) -> bool) -> bool {
        match self {
            Self::Equals(left, right) => {
                (is_target(left) && right.equals_id(id)) || (is_target(right) && left.equals_id(id))
            }
            Self::And(items) => items.iter().any(|p| p.pins(id, is_target)),
            Self::Or(items) => !items.is_empty() && items.iter().all(|p| p.pins(id, is_target)),
            Self::Not(_) | Self::Opaque => false,
        }
    }

    /// Top-level conjuncts: the children of a (nested) `AND`, or the
    /// predicate itself.
    #[must_use]
    pub fn conjuncts(&self) -> Vec<&Predicate> {
        match self {
            Self::And(items) => items.iter().flat_map(Predicate::conjuncts).collect(),
            other => vec![other],
        }
    }
}

/// Parse a predicate region (meaningful tokens only, without the leading
/// `WHERE` / `ON`).
#[must_use]
pub fn parse_predicate(tokens: &[&Token<'_>]) -> Predicate {
    if tokens.is_empty() {
        return Predicate::Opaque;
    }
    let mut parser = Parser { tokens, pos: 0 };
    let predicate = parser.parse_or();
    if parser.pos < tokens.len() {
        // Unbalanced input: refuse to interpret it.
        return Predicate::Opaque;
    }
    predicate
}

fn is_or(tok: &Token<'_>) -> bool {
    tok.is_keyword("OR") || tok.is_keyword("XOR") || tok.is_operator("||")
}

fn is_and(tok: &Token<'_>) -> bool {
    tok.is_keyword("AND") || tok.is_operator("&&")
}

fn is_not(tok: &Token<'_>) -> bool {
    tok.is_keyword("NOT") || tok.is_operator("!")
}

/// Index of the `)` matching the `(` at `open`, if any.
pub(crate) fn matching_paren(tokens: &[&Token<'_>], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, tok) in tokens.iter().enumerate().skip(open) {
        match tok.kind {
            TokenKind::LeftParen => depth += 1,
            TokenKind::RightParen => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

struct Parser<'t, 'a> {
    tokens: &'t [&'t Token<'a>],
    pos: usize,
}

impl Parser<'_, '_> {
    fn peek(&self) -> Option<&Token<'_>> {
        self.tokens.get(self.pos).copied()
    }

    fn parse_or(&mut self) -> Predicate {
        let mut items = vec![self.parse_and()];
        while self.peek().is_some_and(is_or) {
            self.pos += 1;
            items.push(self.parse_and());
        }
        if items.len() == 1 {
            items.remove(0)
        } else {
            Predicate::Or(items)
        }
    }

    fn parse_and(&mut self) -> Predicate {
        let mut items = vec![self.parse_not()];
        while self.peek().is_some_and(is_and) {
            self.pos += 1;
            items.push(self.parse_not());
        }
        if items.len() == 1 {
            items.remove(0)
        } else {
            Predicate::And(items)
        }
    }

    fn parse_not(&mut self) -> Predicate {
        if self.peek().is_some_and(is_not) {
            self.pos += 1;
            return Predicate::Not(Box::new(self.parse_not()));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Predicate {
        if let Some(group) = self.parenthesized_group() {
            return group;
        }

        let start = self.pos;
        let mut depth = 0usize;
        let mut case_depth = 0usize;
        let mut between_pending = false;
        while let Some(tok) = self.peek() {
            match tok.kind {
                TokenKind::LeftParen => depth += 1,
                TokenKind::RightParen => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                _ if depth > 0 => {}
                _ if tok.is_keyword("CASE") => case_depth += 1,
                _ if tok.is_keyword("END") => case_depth = case_depth.saturating_sub(1),
                _ if case_depth > 0 => {}
                _ if tok.is_keyword("BETWEEN") => between_pending = true,
                _ if is_and(tok) && between_pending => between_pending = false,
                _ if is_and(tok) || is_or(tok) => break,
                _ => {}
            }
            self.pos += 1;
        }
        classify_atom(&self.tokens[start..self.pos])
    }

    /// `( predicate )` standing alone as an operand of AND/OR/NOT.
    fn parenthesized_group(&mut self) -> Option<Predicate> {
        let open = self.pos;
        if self.peek()?.kind != TokenKind::LeftParen {
            return None;
        }
        let close = matching_paren(self.tokens, open)?;
        let first = self.tokens.get(open + 1)?;
        if first.is_keyword("SELECT") || first.is_keyword("WITH") {
            return None;
        }
        let standalone = self
            .tokens
            .get(close + 1)
            .map_or(true, |next| is_and(next) || is_or(next) || next.kind == TokenKind::RightParen);
        if !standalone {
            return None;
        }
        self.pos = close + 1;
        Some(parse_predicate(&self.tokens[open + 1..close]))
    }
}

/// Turn a comparison's tokens into [`Predicate::Equals`] when it is exactly
/// `operand = operand`; otherwise [`Predicate::Opaque`].
fn classify_atom(tokens: &[&Token<'_>]) -> Predicate {
    let mut equals_at = None;
    let mut depth = 0usize;
    for (i, tok) in tokens.iter().enumerate() {
        match tok.kind {
            TokenKind::LeftParen => depth += 1,
            TokenKind::RightParen => depth = depth.saturating_sub(1),
            TokenKind::Operator if depth == 0 => {
                if tok.text == "=" || tok.text == "<=>" {
                    if equals_at.is_some() {
                        return Predicate::Opaque;
                    }
                    equals_at = Some(i);
                }
            }
            _ => {}
        }
    }
    let Some(at) = equals_at else {
        return Predicate::Opaque;
    };
    Predicate::Equals(parse_operand(&tokens[..at]), parse_operand(&tokens[at + 1..]))
}

fn parse_operand(tokens: &[&Token<'_>]) -> Operand {
    match tokens {
        [tok] => match tok.kind {
            TokenKind::NumberLiteral => Operand::Number(tok.text.to_owned()),
            TokenKind::StringLiteral => Operand::Text(string_contents(tok.text)),
            TokenKind::Parameter => Operand::Parameter,
            TokenKind::Identifier | TokenKind::QuotedIdent => Operand::Column {
                qualifier: None,
                name: tok.name().unwrap_or_default(),
            },
            _ => Operand::Other,
        },
        [q, dot, c] if dot.kind == TokenKind::Dot && q.is_name() && c.is_name() => {
            Operand::Column {
                qualifier: q.name(),
                name: c.name().unwrap_or_default(),
            }
        }
        [s, d1, q, d2, c]
            if s.is_name()
                && d1.kind == TokenKind::Dot
                && q.is_name()
                && d2.kind == TokenKind::Dot
                && c.is_name() =>
        {
            Operand::Column {
                qualifier: q.name(),
                name: c.name().unwrap_or_default(),
            }
        }
        _ => Operand::Other,
    }
}

fn string_contents(literal: &str) -> String {
    literal
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .unwrap_or(literal)
        .replace("''", "'")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql_lexer::{meaningful_tokens, tokenize};

    fn parse(sql: &str) -> Predicate {
        let all = tokenize(sql);
        let meaningful = meaningful_tokens(&all);
        parse_predicate(&meaningful)
    }

    fn col(name: &str) -> Operand {
        Operand::Column {
            qualifier: None,
            name: name.to_owned(),
        }
    }

    fn is_student_id(op: &Operand) -> bool {
        matches!(op, Operand::Column { name, .. } if name == "student_id")
    }

    fn pins_42(sql: &str) -> bool {
        parse(sql).pins(42, &is_student_id)
    }

    #[test]
    fn test_simple_equality() {
        assert_eq!(
            parse("student_id = 42"),
            Predicate::Equals(col("student_id"), Operand::Number("42".to_owned()))
        );
    }

    #[test]
    fn test_qualified_columns() {
        assert_eq!(
            parse("s.ID = school.students.id"),
            Predicate::Equals(
                Operand::Column {
                    qualifier: Some("s".to_owned()),
                    name: "id".to_owned()
                },
                Operand::Column {
                    qualifier: Some("students".to_owned()),
                    name: "id".to_owned()
                },
            )
        );
    }

    #[test]
    fn test_spacing_and_reversed_order_pin() {
        assert!(pins_42("student_id=42"));
        assert!(pins_42("student_id =     42"));
        assert!(pins_42("42 = student_id"));
        assert!(pins_42("student_id <=> 42"));
        assert!(pins_42("student_id = '42'"));
    }

    #[test]
    fn test_wrong_id_or_operator_does_not_pin() {
        assert!(!pins_42("student_id = 8"));
        assert!(!pins_42("student_id = 420"));
        assert!(!pins_42("student_id >= 42"));
        assert!(!pins_42("student_id = ?"));
        assert!(!pins_42("student_id = 42 + 0"));
        assert!(!pins_42("student_id != 42"));
    }

    #[test]
    fn test_or_needs_every_branch() {
        assert!(!pins_42("1=1 OR student_id=42"));
        assert!(!pins_42("student_id = 42 || 1 = 1"));
        assert!(pins_42("student_id = 42 OR (status = 'x' AND student_id = 42)"));
    }

    #[test]
    fn test_and_needs_one_branch() {
        assert!(pins_42("status = 'absent' AND student_id = 42"));
        assert!(pins_42("(status = 'absent' OR status = 'late') AND student_id = 42"));
        assert!(!pins_42("status = 'absent' OR status = 'late' AND student_id = 42"));
    }

    #[test]
    fn test_not_never_pins() {
        assert!(!pins_42("NOT student_id = 42"));
        assert!(!pins_42("NOT (student_id <> 42)"));
    }

    #[test]
    fn test_between_and_is_not_a_conjunction() {
        let p = parse("marks BETWEEN 40 AND 60 AND student_id = 42");
        assert_eq!(p.conjuncts().len(), 2);
        assert!(p.pins(42, &is_student_id));
    }

    #[test]
    fn test_case_expression_is_one_atom() {
        let p = parse("CASE WHEN a = 1 AND b = 2 THEN 1 ELSE 0 END = 1 AND student_id = 42");
        assert_eq!(p.conjuncts().len(), 2);
    }

    #[test]
    fn test_subquery_comparison_is_opaque() {
        assert_eq!(
            parse("student_id = (SELECT 42)"),
            Predicate::Equals(col("student_id"), Operand::Other)
        );
        assert!(!pins_42("(SELECT student_id FROM attendance) = 42"));
    }

    #[test]
    fn test_unbalanced_and_dangling_input() {
        assert_eq!(parse("student_id = 42)"), Predicate::Opaque);
        assert!(!pins_42("student_id = 42 AND"));
        assert_eq!(parse(""), Predicate::Opaque);
    }

    #[test]
    fn test_conjuncts_flatten_nested_groups() {
        let p = parse("(a = 1 AND b = 2) AND c = 3");
        assert_eq!(p.conjuncts().len(), 3);
    }
}
