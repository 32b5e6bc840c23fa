//! Structural analysis of a candidate query.
//!
//! The token stream is split into statements; each statement is walked once,
//! tracking parenthesis kinds so that every `SELECT` (including subqueries,
//! derived tables, CTE bodies and UNION arms) becomes its own
//! [`QueryBlock`] with its table references, WHERE predicate and ON
//! predicates. Table references are the targets of `FROM`, `JOIN`, comma
//! lists, `UPDATE`, `INSERT INTO` and `DELETE FROM`.

use std::collections::BTreeSet;
use std::ops::Range;

use crate::predicate::{matching_paren, parse_predicate, Predicate};
use crate::sql_lexer::{meaningful_tokens, tokenize, Token, TokenKind};

/// Names that parse as table references but never hold rows.
const PSEUDO_TABLES: &[&str] = &["dual"];

/// A table named in a FROM / JOIN position, with its alias if one was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
    /// The alias, or the last name segment, exactly as written in the query.
    pub qualifier_text: String,
}

impl TableRef {
    /// The name other clauses use to qualify this table's columns.
    #[must_use]
    pub fn binding(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Whether a column qualifier refers to this reference. An aliased
    /// table answers only to its alias.
    #[must_use]
    pub fn answers_to(&self, qualifier: &str) -> bool {
        self.binding() == qualifier
    }
}

/// The statement form that opened a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Select,
    Update,
    Delete,
    Insert,
}

impl BlockKind {
    fn opened_by(tok: &Token<'_>) -> Option<Self> {
        if tok.is_keyword("UPDATE") {
            Some(Self::Update)
        } else if tok.is_keyword("DELETE") {
            Some(Self::Delete)
        } else if tok.is_keyword("INSERT") || tok.is_keyword("REPLACE") {
            Some(Self::Insert)
        } else {
            None
        }
    }

    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Insert => "INSERT",
        }
    }
}

/// One `SELECT` (or write) scope with its own FROM list and WHERE clause.
#[derive(Debug, Clone)]
pub struct QueryBlock {
    pub kind: BlockKind,
    /// Parenthesis nesting depth; `0` for top-level blocks.
    pub depth: usize,
    /// Byte offset of the keyword that opened the block.
    pub start: usize,
    pub tables: Vec<TableRef>,
    /// Parsed WHERE predicate, if the block has a WHERE clause.
    pub filter: Option<Predicate>,
    /// Parsed ON predicates of the block's joins.
    pub join_conditions: Vec<Predicate>,
    /// Byte range of the WHERE predicate text (without the keyword).
    pub where_span: Option<Range<usize>>,
    /// The WHERE clause is empty or ends in an operator or connective.
    pub where_dangling: bool,
    /// Byte offset just past the FROM / WHERE body, before any
    /// GROUP BY / ORDER BY / LIMIT / set-operation tail.
    pub insert_at: usize,
}

/// One `;`-separated statement.
#[derive(Debug, Clone)]
pub struct Statement {
    /// Uppercased leading keyword, or `(` for a parenthesized query.
    pub keyword: String,
    pub blocks: Vec<QueryBlock>,
    /// Tables named outside any query block (`SHOW COLUMNS FROM t`,
    /// `DESCRIBE t`, ...) or read whole by `TABLE t` at any depth.
    pub loose_tables: Vec<TableRef>,
    /// Names introduced by `WITH name AS (...)`.
    pub cte_names: BTreeSet<String>,
    /// A `SELECT ... INTO` target was seen.
    pub selects_into: bool,
}

impl Statement {
    pub fn top_level_blocks(&self) -> impl Iterator<Item = &QueryBlock> {
        self.blocks.iter().filter(|b| b.depth == 0)
    }

    /// Every table reference in the statement.
    pub fn table_refs(&self) -> impl Iterator<Item = &TableRef> {
        self.blocks
            .iter()
            .flat_map(|b| b.tables.iter())
            .chain(self.loose_tables.iter())
    }

    /// The first keyword that makes this statement something other than a
    /// plain read, if any.
    #[must_use]
    pub fn write_keyword(&self) -> Option<&str> {
        if !matches!(self.keyword.as_str(), "SELECT" | "WITH" | "(") {
            return Some(self.keyword.as_str());
        }
        if let Some(block) = self.blocks.iter().find(|b| b.kind != BlockKind::Select) {
            return Some(block.kind.keyword());
        }
        self.selects_into.then_some("INTO")
    }
}

/// A SQL query proposed for execution, with everything the rules need.
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    raw_text: String,
    extracted_tables: BTreeSet<String>,
    statements: Vec<Statement>,
    identifiers: BTreeSet<String>,
    executable_comment: bool,
}

impl CandidateQuery {
    /// Analyze `sql`. Never fails: text the analyzer cannot follow simply
    /// yields fewer recognized structures.
    #[must_use]
    pub fn parse(sql: &str) -> Self {
        let all = tokenize(sql);
        let executable_comment = all.iter().any(|t| t.kind == TokenKind::ExecutableComment);
        let toks = meaningful_tokens(&all);

        let identifiers = toks.iter().filter_map(|t| t.name()).collect();
        let statements: Vec<Statement> = toks
            .split(|t| t.kind == TokenKind::Semicolon)
            .filter(|piece| !piece.is_empty())
            .map(analyze_statement)
            .collect();
        let extracted_tables = statements
            .iter()
            .flat_map(Statement::table_refs)
            .map(|r| r.name.clone())
            .collect();

        Self {
            raw_text: sql.to_owned(),
            extracted_tables,
            statements,
            identifiers,
            executable_comment,
        }
    }

    #[must_use]
    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    /// Lowercased names of every table in a FROM / JOIN position.
    #[must_use]
    pub fn extracted_tables(&self) -> &BTreeSet<String> {
        &self.extracted_tables
    }

    #[must_use]
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Whether any identifier token spells `name` (case-insensitive).
    #[must_use]
    pub fn mentions_identifier(&self, name: &str) -> bool {
        self.identifiers.contains(&name.to_lowercase())
    }

    /// The text holds a `/*! ... */` or `/*+ ... */` comment, whose body
    /// the analysis above does not see.
    #[must_use]
    pub fn has_executable_comment(&self) -> bool {
        self.executable_comment
    }

    /// Names declared as CTEs anywhere in the query.
    pub fn cte_names(&self) -> impl Iterator<Item = &String> {
        self.statements.iter().flat_map(|s| s.cte_names.iter())
    }

    /// No statement survived tokenization (empty, whitespace, comments).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Names of every table referenced in a FROM / JOIN position of `sql`,
/// lowercased and deduplicated.
#[must_use]
pub fn extract_tables(sql: &str) -> BTreeSet<String> {
    CandidateQuery::parse(sql).extracted_tables
}

// ---------------------------------------------------------------------------
// Statement walker
// ---------------------------------------------------------------------------

fn analyze_statement(toks: &[&Token<'_>]) -> Statement {
    let keyword = match toks.first() {
        Some(t) if t.kind == TokenKind::LeftParen => "(".to_owned(),
        Some(t) => t.text.to_ascii_uppercase(),
        None => String::new(),
    };

    let mut walker = Walker {
        toks,
        parens: Vec::new(),
        open: Vec::new(),
        blocks: Vec::new(),
        loose_tables: Vec::new(),
        selects_into: false,
    };
    let mut i = 0;
    while i < toks.len() {
        i = walker.step(i);
    }
    while let Some(block) = walker.open.pop() {
        walker.finish(block, toks.len());
    }
    walker.blocks.sort_by_key(|b| b.start);

    Statement {
        keyword,
        blocks: walker.blocks,
        loose_tables: walker.loose_tables,
        cte_names: cte_names(toks),
        selects_into: walker.selects_into,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParenKind {
    Subquery,
    Call,
    Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Clause {
    Head,
    From,
    Join,
    On,
    Where,
    Tail,
    Other,
}

/// Where a token sits relative to the innermost open block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Block,
    FromGroup,
    Nested,
}

struct OpenBlock {
    kind: BlockKind,
    depth: usize,
    start: usize,
    clause: Clause,
    expect_table: bool,
    tables: Vec<TableRef>,
    join_conditions: Vec<Predicate>,
    /// Token index where the current ON predicate starts, and the paren
    /// depth it started at.
    on_region: Option<(usize, usize)>,
    where_start: Option<usize>,
    where_end: Option<usize>,
    tail_at: Option<usize>,
}

impl OpenBlock {
    fn new(kind: BlockKind, depth: usize, start: usize) -> Self {
        let (clause, expect_table) = match kind {
            // `UPDATE a, b SET ...` lists its targets directly.
            BlockKind::Update => (Clause::From, true),
            _ => (Clause::Head, false),
        };
        Self {
            kind,
            depth,
            start,
            clause,
            expect_table,
            tables: Vec::new(),
            join_conditions: Vec::new(),
            on_region: None,
            where_start: None,
            where_end: None,
            tail_at: None,
        }
    }

    fn end_on(&mut self, toks: &[&Token<'_>], at: usize) {
        if let Some((start, _)) = self.on_region.take() {
            let region = &toks[start.min(at)..at];
            self.join_conditions.push(parse_predicate(region));
        }
    }

    fn enter(&mut self, toks: &[&Token<'_>], at: usize, clause: Clause, expect_table: bool) {
        self.end_on(toks, at);
        self.clause = clause;
        self.expect_table = expect_table;
    }

    fn enter_tail(&mut self, toks: &[&Token<'_>], at: usize) {
        if self.clause == Clause::Where {
            self.where_end = Some(at);
        }
        self.tail_at.get_or_insert(at);
        self.enter(toks, at, Clause::Tail, false);
    }
}

struct Walker<'t, 'a> {
    toks: &'t [&'t Token<'a>],
    parens: Vec<ParenKind>,
    open: Vec<OpenBlock>,
    blocks: Vec<QueryBlock>,
    loose_tables: Vec<TableRef>,
    selects_into: bool,
}

impl Walker<'_, '_> {
    fn step(&mut self, i: usize) -> usize {
        let tok = self.toks[i];
        let depth = self.parens.len();

        match tok.kind {
            TokenKind::LeftParen => {
                self.open_paren(i);
                return i + 1;
            }
            TokenKind::RightParen => {
                self.close_paren(i);
                return i + 1;
            }
            _ => {}
        }

        let owns_depth = self.open.last().is_some_and(|b| b.depth == depth);
        if tok.is_keyword("SELECT") {
            if owns_depth {
                if let Some(prev) = self.open.pop() {
                    self.finish(prev, i);
                }
            }
            self.open.push(OpenBlock::new(BlockKind::Select, depth, tok.offset));
            return i + 1;
        }
        if let Some(kind) = BlockKind::opened_by(tok) {
            let is_call = self.next_is(i, TokenKind::LeftParen);
            if !owns_depth && !is_call {
                self.open.push(OpenBlock::new(kind, depth, tok.offset));
                return i + 1;
            }
        }

        if tok.is_keyword("TABLE") {
            // `TABLE t` reads all of `t`, including as a subquery operand.
            return self.loose(i);
        }

        match self.level() {
            None => self.loose(i),
            Some(Level::Nested) => i + 1,
            Some(level) => self.clause_token(i, level == Level::Block),
        }
    }

    fn next_is(&self, i: usize, kind: TokenKind) -> bool {
        self.toks.get(i + 1).is_some_and(|t| t.kind == kind)
    }

    /// `None` when no block is open.
    fn level(&self) -> Option<Level> {
        let block = self.open.last()?;
        let above = self.parens.get(block.depth..).unwrap_or(&[]);
        if above.is_empty() {
            return Some(Level::Block);
        }
        let in_from = matches!(block.clause, Clause::From | Clause::Join | Clause::On);
        if in_from && above.iter().all(|k| *k == ParenKind::Group) {
            Some(Level::FromGroup)
        } else {
            Some(Level::Nested)
        }
    }

    fn open_paren(&mut self, i: usize) {
        let next = self.toks.get(i + 1);
        let prev = i.checked_sub(1).and_then(|p| self.toks.get(p));
        let kind = if next.is_some_and(|t| {
            t.is_keyword("SELECT") || t.is_keyword("WITH") || t.is_keyword("TABLE")
        }) {
            ParenKind::Subquery
        } else if prev.is_some_and(|t| t.is_name()) {
            ParenKind::Call
        } else {
            ParenKind::Group
        };
        if kind == ParenKind::Subquery {
            if let Some(block) = self.open.last_mut() {
                // A derived table stands where a table name would.
                block.expect_table = false;
            }
        }
        self.parens.push(kind);
    }

    fn close_paren(&mut self, i: usize) {
        self.parens.pop();
        let depth = self.parens.len();
        while self.open.last().is_some_and(|b| b.depth > depth) {
            if let Some(block) = self.open.pop() {
                self.finish(block, i);
            }
        }
        if let Some(block) = self.open.last_mut() {
            if block.on_region.is_some_and(|(_, d)| depth < d) {
                block.end_on(self.toks, i);
            }
        }
    }

    fn clause_token(&mut self, i: usize, at_block: bool) -> usize {
        let toks = self.toks;
        let tok = toks[i];
        let next_is_paren = self.next_is(i, TokenKind::LeftParen);
        let depth = self.parens.len();
        let Some(block) = self.open.last_mut() else {
            return i + 1;
        };

        if tok.kind == TokenKind::Comma {
            let listing = if at_block {
                matches!(block.clause, Clause::From | Clause::Join | Clause::On)
            } else {
                matches!(block.clause, Clause::From | Clause::Join)
            };
            if listing {
                block.enter(toks, i, Clause::From, true);
            }
            return i + 1;
        }

        if tok.kind == TokenKind::Keyword {
            let word = tok.text.to_ascii_uppercase();
            let in_from = matches!(block.clause, Clause::From | Clause::Join | Clause::On);
            match word.as_str() {
                "FROM" if at_block => block.enter(toks, i, Clause::From, true),
                "JOIN" | "STRAIGHT_JOIN" if in_from => block.enter(toks, i, Clause::Join, true),
                "NATURAL" | "LEFT" | "RIGHT" | "INNER" | "OUTER" | "CROSS" | "FULL"
                    if in_from && !next_is_paren =>
                {
                    block.enter(toks, i, Clause::Join, false);
                }
                "ON" if in_from => {
                    block.enter(toks, i, Clause::On, false);
                    block.on_region = Some((i + 1, depth));
                }
                "USING" if in_from => block.enter(toks, i, Clause::Other, false),
                "INTO" if at_block => {
                    if block.kind == BlockKind::Select {
                        self.selects_into = true;
                        block.enter(toks, i, Clause::Other, false);
                    } else {
                        block.enter(toks, i, Clause::From, true);
                    }
                }
                "WHERE" if at_block => {
                    block.enter(toks, i, Clause::Where, false);
                    block.where_start = Some(i + 1);
                }
                "SET" | "VALUES" if at_block => block.enter(toks, i, Clause::Other, false),
                "GROUP" | "HAVING" | "ORDER" | "LIMIT" | "WINDOW" | "FOR" | "OFFSET" | "FETCH"
                    if at_block =>
                {
                    block.enter_tail(toks, i);
                }
                "UNION" | "EXCEPT" | "INTERSECT" if at_block => {
                    block.enter_tail(toks, i);
                    if let Some(done) = self.open.pop() {
                        self.finish(done, i);
                    }
                }
                _ => {}
            }
            return i + 1;
        }

        if block.expect_table && tok.is_name() {
            return self.table_ref(i);
        }
        i + 1
    }

    /// Parse `[schema.]name [[AS] alias]` at `i`; returns the next index.
    fn table_ref(&mut self, i: usize) -> usize {
        let toks = self.toks;
        let Some(block) = self.open.last_mut() else {
            return i + 1;
        };
        let (name, mut j) = dotted_name(toks, i);
        block.expect_table = false;

        if block.kind == BlockKind::Select && toks.get(j).is_some_and(|t| t.kind == TokenKind::LeftParen) {
            // Table function such as JSON_TABLE(...).
            return j;
        }

        let mut alias = None;
        let mut qualifier_text = toks[j - 1].text;
        if toks.get(j).is_some_and(|t| t.is_keyword("AS")) {
            if let Some(tok) = toks.get(j + 1).filter(|t| t.is_name()) {
                alias = tok.name();
                qualifier_text = tok.text;
                j += 2;
            }
        } else if let Some(tok) = toks.get(j).filter(|t| t.is_name()) {
            alias = tok.name();
            qualifier_text = tok.text;
            j += 1;
        }

        if let Some(name) = name {
            if !PSEUDO_TABLES.contains(&name.as_str()) {
                block.tables.push(TableRef {
                    name,
                    alias,
                    qualifier_text: qualifier_text.to_owned(),
                });
            }
        }
        j
    }

    /// Handle a token outside every block.
    fn loose(&mut self, i: usize) -> usize {
        const INTRODUCERS: &[&str] = &[
            "DESC", "DESCRIBE", "EXPLAIN", "FROM", "INTO", "JOIN", "TABLE",
        ];
        let tok = self.toks[i];
        let in_call = self.parens.last() == Some(&ParenKind::Call);
        let introduces = tok.kind == TokenKind::Keyword
            && INTRODUCERS.iter().any(|w| tok.is_keyword(w));
        if in_call || !introduces || !self.toks.get(i + 1).is_some_and(|t| t.is_name()) {
            return i + 1;
        }
        let (name, next) = dotted_name(self.toks, i + 1);
        if let Some(name) = name {
            self.loose_tables.push(TableRef {
                name,
                alias: None,
                qualifier_text: self.toks[next - 1].text.to_owned(),
            });
        }
        next
    }

    fn finish(&mut self, mut block: OpenBlock, end: usize) {
        let toks = self.toks;
        block.end_on(toks, end);

        let (filter, where_span, where_dangling) = match block.where_start {
            Some(start) => {
                let stop = block.where_end.unwrap_or(end);
                let region = &toks[start.min(stop)..stop];
                let span = region
                    .first()
                    .zip(region.last())
                    .map(|(first, last)| first.offset..last.end());
                let dangling = region.last().map_or(true, |t| dangles(t));
                (Some(parse_predicate(region)), span, dangling)
            }
            None => (None, None, false),
        };
        let body_end = block.tail_at.unwrap_or(end);
        let insert_at = toks[..body_end].last().map_or(0, |t| t.end());

        self.blocks.push(QueryBlock {
            kind: block.kind,
            depth: block.depth,
            start: block.start,
            tables: block.tables,
            filter,
            join_conditions: block.join_conditions,
            where_span,
            where_dangling,
            insert_at,
        });
    }
}

/// Read `a.b.c` starting at `i`; returns the last segment and the index
/// after the name.
fn dotted_name(toks: &[&Token<'_>], i: usize) -> (Option<String>, usize) {
    let mut j = i;
    let mut name = toks.get(j).and_then(|t| t.name());
    while toks.get(j + 1).is_some_and(|t| t.kind == TokenKind::Dot)
        && toks.get(j + 2).is_some_and(|t| t.is_name())
    {
        j += 2;
        name = toks[j].name();
    }
    (name, j + 1)
}

/// Whether a WHERE clause ending in `tok` is incomplete.
fn dangles(tok: &Token<'_>) -> bool {
    match tok.kind {
        TokenKind::Operator | TokenKind::Comma | TokenKind::LeftParen => true,
        TokenKind::Keyword => !["TRUE", "FALSE", "NULL", "END"]
            .iter()
            .any(|w| tok.is_keyword(w)),
        _ => false,
    }
}

/// Names declared by every `WITH [RECURSIVE] name [(cols)] AS (...)` list.
fn cte_names(toks: &[&Token<'_>]) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let is_paren = |j: usize| toks.get(j).is_some_and(|t| t.kind == TokenKind::LeftParen);

    for (idx, _) in toks.iter().enumerate().filter(|(_, t)| t.is_keyword("WITH")) {
        let mut j = idx + 1;
        if toks.get(j).is_some_and(|t| t.is_keyword("RECURSIVE")) {
            j += 1;
        }
        while let Some(name) = toks.get(j).and_then(|t| t.name()) {
            j += 1;
            if is_paren(j) {
                match matching_paren(toks, j) {
                    Some(close) => j = close + 1,
                    None => break,
                }
            }
            if !toks.get(j).is_some_and(|t| t.is_keyword("AS")) || !is_paren(j + 1) {
                break;
            }
            names.insert(name);
            match matching_paren(toks, j + 1) {
                Some(close) => j = close + 1,
                None => break,
            }
            if toks.get(j).is_some_and(|t| t.kind == TokenKind::Comma) {
                j += 1;
            } else {
                break;
            }
        }
    }
    names
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn tables(sql: &str) -> Vec<String> {
        extract_tables(sql).into_iter().collect()
    }

    fn set(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn test_join_with_aliases_is_case_insensitive() {
        let sql = "SELECT * FROM Students s JOIN Attendance a ON s.id = a.student_id";
        assert_eq!(tables(sql), set(&["attendance", "students"]));

        let q = CandidateQuery::parse(sql);
        let block = &q.statements()[0].blocks[0];
        assert_eq!(block.tables[0].alias.as_deref(), Some("s"));
        assert_eq!(block.tables[1].binding(), "a");
        assert_eq!(block.join_conditions.len(), 1);
    }

    #[test]
    fn test_comma_list_and_quoted_names() {
        assert_eq!(
            tables("SELECT * FROM `fee_payments` AS f, school.\"Attendance\" a"),
            set(&["attendance", "fee_payments"])
        );
    }

    #[test]
    fn test_subqueries_and_derived_tables() {
        let sql = "SELECT * FROM (SELECT * FROM teachers) t \
                   WHERE t.id IN (SELECT teacher_id FROM academic_marks)";
        assert_eq!(tables(sql), set(&["academic_marks", "teachers"]));
        let q = CandidateQuery::parse(sql);
        assert_eq!(q.statements()[0].blocks.len(), 3);
        assert_eq!(q.statements()[0].top_level_blocks().count(), 1);
    }

    #[test]
    fn test_function_from_is_not_a_table() {
        assert_eq!(
            tables("SELECT EXTRACT(YEAR FROM paid_on), TRIM(LEADING '0' FROM code) FROM fee_payments"),
            set(&["fee_payments"])
        );
        assert_eq!(tables("SELECT 1 FROM dual"), Vec::<String>::new());
    }

    #[test]
    fn test_write_statement_targets() {
        assert_eq!(tables("UPDATE attendance SET status = 'x'"), set(&["attendance"]));
        assert_eq!(tables("DELETE FROM fee_payments WHERE id = 1"), set(&["fee_payments"]));
        assert_eq!(
            tables("INSERT INTO academic_marks (student_id, mark) VALUES (1, 2)"),
            set(&["academic_marks"])
        );
        assert_eq!(tables("DESCRIBE teachers"), set(&["teachers"]));
    }

    #[test]
    fn test_cte_names_are_collected() {
        let q = CandidateQuery::parse(
            "WITH mine AS (SELECT * FROM attendance WHERE student_id = 1), \
                  other (x) AS (SELECT 1) \
             SELECT * FROM mine",
        );
        let ctes: Vec<&String> = q.cte_names().collect();
        assert_eq!(ctes, vec!["mine", "other"]);
        assert!(q.extracted_tables().contains("mine"));
        assert!(q.extracted_tables().contains("attendance"));
    }

    #[test]
    fn test_statements_split_on_semicolons() {
        let q = CandidateQuery::parse("SELECT 1; ; DROP TABLE students;");
        assert_eq!(q.statements().len(), 2);
        assert_eq!(q.statements()[1].write_keyword(), Some("DROP"));
        assert!(q.extracted_tables().contains("students"));
    }

    #[test]
    fn test_empty_and_comment_only_queries() {
        assert!(CandidateQuery::parse("").is_empty());
        assert!(CandidateQuery::parse("  -- nothing\n /* here */ ;").is_empty());
    }

    #[test]
    fn test_write_keyword_detection() {
        let read = CandidateQuery::parse("WITH x AS (SELECT 1) SELECT * FROM x");
        assert_eq!(read.statements()[0].write_keyword(), None);

        let cte_delete = CandidateQuery::parse("WITH x AS (SELECT 1) DELETE FROM attendance");
        assert_eq!(cte_delete.statements()[0].write_keyword(), Some("DELETE"));

        let into = CandidateQuery::parse("SELECT * INTO OUTFILE '/tmp/x' FROM attendance");
        assert_eq!(into.statements()[0].write_keyword(), Some("INTO"));

        let locking = CandidateQuery::parse("SELECT * FROM attendance FOR UPDATE");
        assert_eq!(locking.statements()[0].write_keyword(), None);
    }

    #[test]
    fn test_where_span_and_insert_point() {
        let sql = "SELECT * FROM attendance WHERE status = 'late' ORDER BY day";
        let q = CandidateQuery::parse(sql);
        let block = &q.statements()[0].blocks[0];
        let span = block.where_span.clone().expect("where span");
        assert_eq!(&sql[span], "status = 'late'");
        assert!(!block.where_dangling);

        let bare = "SELECT * FROM attendance  GROUP BY day";
        let q = CandidateQuery::parse(bare);
        let block = &q.statements()[0].blocks[0];
        assert_eq!(&bare[..block.insert_at], "SELECT * FROM attendance");
    }

    #[test]
    fn test_dangling_where_is_flagged() {
        for sql in [
            "SELECT * FROM attendance WHERE",
            "SELECT * FROM attendance WHERE status = 'x' AND",
            "SELECT * FROM attendance WHERE status =",
        ] {
            let q = CandidateQuery::parse(sql);
            assert!(q.statements()[0].blocks[0].where_dangling, "{sql}");
        }
    }

    #[test]
    fn test_where_predicate_excludes_tail() {
        let q = CandidateQuery::parse(
            "SELECT * FROM attendance WHERE student_id = 4 LIMIT 10",
        );
        let filter = q.statements()[0].blocks[0].filter.clone().expect("filter");
        assert!(matches!(filter, Predicate::Equals(..)));
    }

    #[test]
    fn test_union_arms_are_separate_blocks() {
        let q = CandidateQuery::parse(
            "SELECT a FROM attendance WHERE student_id = 1 UNION SELECT b FROM fee_payments",
        );
        let blocks = &q.statements()[0].blocks;
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].filter.is_some());
        assert!(blocks[1].filter.is_none());
        assert_eq!(blocks[1].tables[0].name, "fee_payments");
    }

    #[test]
    fn test_parenthesized_join_group() {
        assert_eq!(
            tables("SELECT * FROM (attendance a JOIN fee_payments f ON a.student_id = f.student_id)"),
            set(&["attendance", "fee_payments"])
        );
    }

    #[test]
    fn test_mentions_identifier() {
        let q = CandidateQuery::parse("SELECT * FROM attendance WHERE `Student_ID` = 3");
        assert!(q.mentions_identifier("student_id"));
        assert!(!q.mentions_identifier("teacher_id"));
    }

    #[test]
    fn test_table_operand_is_read_at_any_depth() {
        let sql = "SELECT * FROM attendance WHERE student_id = 42 AND EXISTS (TABLE teachers)";
        assert_eq!(tables(sql), set(&["attendance", "teachers"]));
        assert_eq!(
            tables("SELECT * FROM attendance WHERE ROW(1, 'x') IN (TABLE school.students)"),
            set(&["attendance", "students"])
        );
        assert_eq!(
            tables("SELECT * FROM (TABLE students) s"),
            set(&["students"])
        );
        assert_eq!(
            tables("SELECT id FROM attendance UNION TABLE teachers"),
            set(&["attendance", "teachers"])
        );

        let q = CandidateQuery::parse(sql);
        let statement = &q.statements()[0];
        assert_eq!(statement.loose_tables.len(), 1);
        assert_eq!(statement.loose_tables[0].name, "teachers");
        // The enclosing block keeps only its own FROM list and filter.
        assert_eq!(statement.blocks.len(), 1);
        assert_eq!(statement.blocks[0].tables.len(), 1);
    }

    #[test]
    fn test_executable_comment_is_flagged() {
        let q = CandidateQuery::parse("SELECT * FROM attendance WHERE student_id = 42 /*! OR 1=1 */");
        assert!(q.has_executable_comment());
        assert!(!CandidateQuery::parse("SELECT 1 /* plain */").has_executable_comment());
    }
}
