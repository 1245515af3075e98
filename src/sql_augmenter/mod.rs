//! Geometry filter injection for sub-layer SQL.
//!
//! Sub-layer queries are arbitrary user-authored SELECT statements. Before a
//! query is sent to the SQL API it is parsed with `sqlparser`, a
//! `"the_geom" IS NOT NULL` predicate is merged into its WHERE clause, and the
//! statement is rendered back to a single line.

use sqlparser::ast::{BinaryOperator, Expr, Ident, SetExpr, SetOperator, Statement};
use sqlparser::dialect::{Dialect, GenericDialect, dialect_from_str};
use sqlparser::parser::{Parser, ParserError};
use sqlparser::tokenizer::{Token, TokenWithSpan, Tokenizer, TokenizerError, Whitespace};
use thiserror::Error;
use tracing::{debug, warn};

/// Column every exported feature must have.
pub const DEFAULT_GEOMETRY_COLUMN: &str = "the_geom";

#[derive(Error, Debug)]
pub enum SqlAugmentError {
    #[error("{0}")]
    Parse(#[from] ParserError),
    #[error("{0}")]
    Tokenize(#[from] TokenizerError),
    #[error("empty SQL statement")]
    Empty,
    #[error("expected a single statement, found {0}")]
    MultipleStatements(usize),
    #[error("cannot add a geometry filter to {0}")]
    Unsupported(String),
}

/// Adds a geometry-not-null filter to SELECT statements.
#[derive(Debug, Clone)]
pub struct SqlAugmenter {
    dialect_name: String,
    geometry_column: String,
}

impl SqlAugmenter {
    pub fn new() -> Self {
        Self {
            dialect_name: "generic".to_string(),
            geometry_column: DEFAULT_GEOMETRY_COLUMN.to_string(),
        }
    }

    /// Parse with a named `sqlparser` dialect (postgresql, mysql, bigquery, ...).
    ///
    /// Unknown names fall back to the generic dialect.
    pub fn with_dialect_name(dialect_name: &str) -> Self {
        let dialect_name = match dialect_name.to_lowercase().as_str() {
            "postgres" => "postgresql".to_string(),
            "mssql" | "sqlserver" => "mssql".to_string(),
            other => other.to_string(),
        };

        if dialect_from_str(&dialect_name).is_none() {
            warn!(
                "[SqlAugmenter] Unknown dialect '{}', using generic",
                dialect_name
            );
            return Self::new();
        }

        Self {
            dialect_name,
            ..Self::new()
        }
    }

    pub fn with_geometry_column(mut self, column: impl Into<String>) -> Self {
        self.geometry_column = column.into();
        self
    }

    pub fn dialect_name(&self) -> &str {
        &self.dialect_name
    }

    pub fn geometry_column(&self) -> &str {
        &self.geometry_column
    }

    fn dialect(&self) -> Box<dyn Dialect> {
        dialect_from_str(&self.dialect_name).unwrap_or_else(|| Box::new(GenericDialect {}))
    }

    /// Parse `sql`, add the geometry filter and render the result on one line.
    ///
    /// Applying this twice nests the predicate twice; duplicates are not
    /// detected.
    pub fn augment(&self, sql: &str) -> Result<String, SqlAugmentError> {
        let dialect = self.dialect();
        let mut statements = Parser::parse_sql(&*dialect, sql)?;

        let statement = match statements.len() {
            0 => return Err(SqlAugmentError::Empty),
            1 => statements.remove(0),
            n => return Err(SqlAugmentError::MultipleStatements(n)),
        };

        let augmented = self.augment_statement(&statement)?;
        let rendered = self.render(&augmented)?;
        debug!("[SqlAugmenter] {} -> {}", sql.trim(), rendered);
        Ok(rendered)
    }

    /// Return a copy of `statement` with the geometry filter applied.
    pub fn augment_statement(&self, statement: &Statement) -> Result<Statement, SqlAugmentError> {
        let mut augmented = statement.clone();
        match &mut augmented {
            Statement::Query(query) => self.augment_set_expr(&mut query.body)?,
            other => {
                return Err(SqlAugmentError::Unsupported(format!(
                    "non-query statement `{}`",
                    other
                )));
            }
        }
        Ok(augmented)
    }

    fn augment_set_expr(&self, body: &mut SetExpr) -> Result<(), SqlAugmentError> {
        match body {
            SetExpr::Select(select) => {
                let predicate = self.geometry_predicate();
                select.selection = Some(match select.selection.take() {
                    None => predicate,
                    Some(existing) => Expr::BinaryOp {
                        left: Box::new(nested(existing)),
                        op: BinaryOperator::And,
                        right: Box::new(predicate),
                    },
                });
                Ok(())
            }
            SetExpr::Query(query) => self.augment_set_expr(&mut query.body),
            SetExpr::SetOperation {
                op, left, right, ..
            } => {
                self.augment_set_expr(left)?;
                // Filtering the right side of EXCEPT would let more rows through.
                if matches!(op, SetOperator::Union | SetOperator::Intersect) {
                    self.augment_set_expr(right)?;
                }
                Ok(())
            }
            other => Err(SqlAugmentError::Unsupported(format!(
                "query body `{}`",
                other
            ))),
        }
    }

    /// `("<geometry_column>" IS NOT NULL)`
    fn geometry_predicate(&self) -> Expr {
        Expr::Nested(Box::new(Expr::IsNotNull(Box::new(Expr::Identifier(
            Ident::with_quote('"', self.geometry_column.clone()),
        )))))
    }

    /// Render on a single line with double-quoted identifiers.
    ///
    /// The printed statement is copied token by token from its own source
    /// text, so literals keep their exact escaping. Only newlines and
    /// backtick-quoted identifiers are rewritten.
    fn render(&self, statement: &Statement) -> Result<String, SqlAugmentError> {
        let sql = statement.to_string();
        let dialect = self.dialect();
        let tokens = Tokenizer::new(&*dialect, &sql)
            .with_unescape(false)
            .tokenize_with_location()?;
        let offsets = token_offsets(&sql, &tokens);

        let mut rendered = String::with_capacity(sql.len());
        for (i, token) in tokens.iter().enumerate() {
            let start = offsets[i];
            let end = offsets.get(i + 1).copied().unwrap_or(sql.len());
            match &token.token {
                Token::Whitespace(Whitespace::Newline) => rendered.push(' '),
                Token::Word(word) if word.quote_style == Some('`') => {
                    rendered.push_str(&double_quoted(&word.value));
                }
                _ => rendered.push_str(&sql[start..end]),
            }
        }
        Ok(rendered)
    }
}

impl Default for SqlAugmenter {
    fn default() -> Self {
        Self::new()
    }
}

fn nested(expr: Expr) -> Expr {
    match expr {
        Expr::Nested(_) => expr,
        other => Expr::Nested(Box::new(other)),
    }
}

/// Byte offset of each token's start in `sql`.
///
/// Token locations are 1-based line and character columns.
fn token_offsets(sql: &str, tokens: &[TokenWithSpan]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(tokens.len());
    let mut chars = sql.char_indices().peekable();
    let (mut line, mut column) = (1u64, 1u64);

    for token in tokens {
        let start = token.span.start;
        while (line, column) < (start.line, start.column) {
            match chars.next() {
                Some((_, '\n')) => {
                    line += 1;
                    column = 1;
                }
                Some(_) => column += 1,
                None => break,
            }
        }
        offsets.push(chars.peek().map_or(sql.len(), |&(i, _)| i));
    }
    offsets
}

/// Requote a backtick identifier body (with `` ` `` still doubled) in double quotes.
fn double_quoted(backticked: &str) -> String {
    format!(
        "\"{}\"",
        backticked.replace("``", "`").replace('"', "\"\"")
    )
}

/// Augment `sql` with the default generic dialect and `the_geom` column.
pub fn augment_sql(sql: &str) -> Result<String, SqlAugmentError> {
    SqlAugmenter::new().augment(sql)
}
