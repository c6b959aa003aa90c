use crate::common::Result;
use crate::errinput;
use crate::types::Field;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Name of the pseudo column holding a document's relevance score.
pub const SCORE_COLUMN: &str = "_score";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
    Not,
    IsNull,
}

impl Operator {
    /// Whether `left <op> right` holds given `left.cmp(right)`, `None` if this
    /// isn't a comparison operator.
    pub fn compare(&self, ordering: Ordering) -> Option<bool> {
        Some(match self {
            Operator::Eq => ordering == Ordering::Equal,
            Operator::NotEq => ordering != Ordering::Equal,
            Operator::Lt => ordering == Ordering::Less,
            Operator::Lte => ordering != Ordering::Greater,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Gte => ordering != Ordering::Less,
            Operator::And | Operator::Or | Operator::Not | Operator::IsNull => return None,
        })
    }

    /// The operator with its operands swapped, e.g. `1 < a` is `a > 1`.
    pub fn flip(&self) -> Operator {
        match self {
            Operator::Lt => Operator::Gt,
            Operator::Lte => Operator::Gte,
            Operator::Gt => Operator::Lt,
            Operator::Gte => Operator::Lte,
            other => *other,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operator::Eq => "=",
            Operator::NotEq => "<>",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::And => "AND",
            Operator::Or => "OR",
            Operator::Not => "NOT",
            Operator::IsNull => "IS NULL",
        })
    }
}

/// An analyzed expression, as handed over by the planner.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Symbol {
    Literal(Field),
    Reference(String),
    /// The `_score` pseudo column.
    Score,
    Function {
        operator: Operator,
        arguments: Vec<Symbol>,
    },
}

impl Symbol {
    pub fn column(name: &str) -> Self {
        Symbol::Reference(name.to_string())
    }

    pub fn literal(value: impl Into<Field>) -> Self {
        Symbol::Literal(value.into())
    }

    pub fn function(operator: Operator, arguments: Vec<Symbol>) -> Self {
        Symbol::Function {
            operator,
            arguments,
        }
    }

    pub fn compare(left: Symbol, operator: Operator, right: Symbol) -> Self {
        Symbol::function(operator, vec![left, right])
    }

    pub fn and(arguments: Vec<Symbol>) -> Self {
        Symbol::function(Operator::And, arguments)
    }

    pub fn or(arguments: Vec<Symbol>) -> Self {
        Symbol::function(Operator::Or, arguments)
    }

    pub fn not(argument: Symbol) -> Self {
        Symbol::function(Operator::Not, vec![argument])
    }

    pub fn is_null(argument: Symbol) -> Self {
        Symbol::function(Operator::IsNull, vec![argument])
    }

    /// Whether the symbol refers to `_score` anywhere.
    pub fn contains_score(&self) -> bool {
        match self {
            Symbol::Score => true,
            Symbol::Literal(_) | Symbol::Reference(_) => false,
            Symbol::Function { arguments, .. } => arguments.iter().any(Symbol::contains_score),
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Literal(value) => value.fmt(f),
            Symbol::Reference(name) => f.write_str(name),
            Symbol::Score => f.write_str(SCORE_COLUMN),
            Symbol::Function {
                operator,
                arguments,
            } => match (operator, arguments.as_slice()) {
                (Operator::Not, [argument]) => write!(f, "(NOT {argument})"),
                (Operator::IsNull, [argument]) => write!(f, "({argument} IS NULL)"),
                (operator, [left, right]) => write!(f, "({left} {operator} {right})"),
                (operator, arguments) => {
                    write!(f, "{operator}({})", arguments.iter().join(", "))
                }
            },
        }
    }
}

/// The requested ordering of a collect phase.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    symbols: Vec<Symbol>,
    reverse: Vec<bool>,
    nulls_first: Vec<Option<bool>>,
}

impl OrderBy {
    /// Fails unless there is one `reverse` and one `nulls_first` entry per symbol.
    pub fn new(
        symbols: Vec<Symbol>,
        reverse: Vec<bool>,
        nulls_first: Vec<Option<bool>>,
    ) -> Result<Self> {
        if symbols.is_empty() {
            return errinput!("ORDER BY needs at least one symbol");
        }
        if symbols.len() != reverse.len() || symbols.len() != nulls_first.len() {
            return errinput!(
                "ORDER BY has {} symbols but {} reverse flags and {} nulls first flags",
                symbols.len(),
                reverse.len(),
                nulls_first.len()
            );
        }
        Ok(Self {
            symbols,
            reverse,
            nulls_first,
        })
    }

    pub fn asc(symbol: Symbol) -> Self {
        Self {
            symbols: vec![symbol],
            reverse: vec![false],
            nulls_first: vec![None],
        }
    }

    pub fn desc(symbol: Symbol) -> Self {
        Self {
            symbols: vec![symbol],
            reverse: vec![true],
            nulls_first: vec![None],
        }
    }

    /// Adds a tie-breaking ordering.
    pub fn then(mut self, symbol: Symbol, reverse: bool, nulls_first: Option<bool>) -> Self {
        self.symbols.push(symbol);
        self.reverse.push(reverse);
        self.nulls_first.push(nulls_first);
        self
    }

    /// `(symbol, reverse, nulls_first)` triples in priority order.
    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, bool, Option<bool>)> {
        self.symbols
            .iter()
            .zip(self.reverse.iter().copied())
            .zip(self.nulls_first.iter().copied())
            .map(|((symbol, reverse), nulls_first)| (symbol, reverse, nulls_first))
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }
}
