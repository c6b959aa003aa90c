use crate::collect::{Operator, Symbol};
use crate::common::{Error, Result};
use crate::config::config::QUERY_CACHE_CAPACITY;
use crate::storage::{Row, ShardId};
use crate::types::{DataType, Field, Mapping};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A native query, compiled against a shard's mapping. Columns are positions
/// in the stored documents.
#[derive(Clone, Debug, PartialEq)]
pub enum Query {
    MatchAll,
    MatchNone,
    Compare {
        column: usize,
        operator: Operator,
        value: Field,
    },
    IsNull(usize),
    And(Vec<Query>),
    Or(Vec<Query>),
    Not(Box<Query>),
}

impl Query {
    /// The document's score, or `None` if it doesn't match.
    pub fn score(&self, row: &Row) -> Result<Option<f32>> {
        let (matches, score) = self.evaluate(row)?;
        Ok(match matches {
            Some(true) => Some(score),
            _ => None,
        })
    }

    /// Three-valued evaluation: `None` when a NULL makes the outcome unknown.
    /// Every matching leaf contributes 1.0 to the score.
    fn evaluate(&self, row: &Row) -> Result<(Option<bool>, f32)> {
        Ok(match self {
            Query::MatchAll => (Some(true), 1.0),
            Query::MatchNone => (Some(false), 0.0),
            Query::Compare {
                column,
                operator,
                value,
            } => {
                let field = row.field(*column).ok_or(Error::OutOfBounds)?;
                if field.is_null() || value.is_null() {
                    return Ok((None, 0.0));
                }
                let holds = operator.compare(field.cmp(value)).ok_or_else(|| {
                    Error::Internal(format!("{operator} is not a comparison"))
                })?;
                (Some(holds), if holds { 1.0 } else { 0.0 })
            }
            Query::IsNull(column) => {
                let null = row.field(*column).ok_or(Error::OutOfBounds)?.is_null();
                (Some(null), if null { 1.0 } else { 0.0 })
            }
            Query::And(queries) => {
                let mut outcome = Some(true);
                let mut score = 0.0;
                for query in queries {
                    let (matches, s) = query.evaluate(row)?;
                    match matches {
                        Some(false) => return Ok((Some(false), 0.0)),
                        None => outcome = None,
                        Some(true) => score += s,
                    }
                }
                (outcome, score)
            }
            Query::Or(queries) => {
                let mut outcome = Some(false);
                let mut score = 0.0;
                for query in queries {
                    let (matches, s) = query.evaluate(row)?;
                    match matches {
                        Some(true) => {
                            outcome = Some(true);
                            score += s;
                        }
                        None if outcome == Some(false) => outcome = None,
                        _ => {}
                    }
                }
                (outcome, score)
            }
            Query::Not(query) => match query.evaluate(row)?.0 {
                Some(matches) => (Some(!matches), if matches { 0.0 } else { 1.0 }),
                None => (None, 0.0),
            },
        })
    }
}

/// A converted where clause: the native query plus the minimum score a
/// document needs to be collected.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryContext {
    pub query: Arc<Query>,
    pub min_score: Option<f32>,
}

impl QueryContext {
    /// The document's score if it matches and reaches the minimum score.
    pub fn score(&self, row: &Row) -> Result<Option<f32>> {
        Ok(self
            .query
            .score(row)?
            .filter(|score| self.min_score.map_or(true, |min| *score >= min)))
    }
}

/// Shard scoped services a query is converted with.
pub struct QueryShardContext<'a> {
    pub shard_id: &'a ShardId,
    pub mapping: &'a Mapping,
    pub cache: &'a QueryCache,
}

/// Converts a where clause into a native query.
pub trait QueryBuilder: Send + Sync {
    fn convert(
        &self,
        where_clause: Option<&Symbol>,
        context: &QueryShardContext<'_>,
    ) -> Result<QueryContext>;
}

/// Compiled queries of a shard, keyed by the where clause they were compiled
/// from. Holds at most `capacity` queries; inserting into a full cache evicts
/// an arbitrary entry.
#[derive(Debug)]
pub struct QueryCache {
    queries: DashMap<Symbol, Arc<Query>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(QUERY_CACHE_CAPACITY)
    }
}

impl QueryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            queries: DashMap::new(),
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get_or_try_insert<F>(&self, key: &Symbol, compile: F) -> Result<Arc<Query>>
    where
        F: FnOnce() -> Result<Query>,
    {
        if let Some(query) = self.queries.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(query.value().clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let query = Arc::new(compile()?);
        if self.queries.len() >= self.capacity {
            self.evict_one();
        }
        Ok(self.queries.entry(key.clone()).or_insert(query).value().clone())
    }

    /// Drops every compiled query, e.g. after the shard's mapping changed.
    pub fn clear(&self) {
        self.queries.clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    fn evict_one(&self) {
        // the iterator holds a shard lock, so take the key out before removing.
        let victim = self.queries.iter().next().map(|entry| entry.key().clone());
        if let Some(victim) = victim {
            self.queries.remove(&victim);
        }
    }
}

/// Converts symbol trees over the shard's mapping. A `_score >= <number>`
/// condition at the top level of the where clause, alone or as a conjunct,
/// becomes the minimum score; `_score` anywhere else can't be converted.
#[derive(Clone, Copy, Debug, Default)]
pub struct SymbolQueryBuilder;

impl QueryBuilder for SymbolQueryBuilder {
    fn convert(
        &self,
        where_clause: Option<&Symbol>,
        context: &QueryShardContext<'_>,
    ) -> Result<QueryContext> {
        let Some(where_clause) = where_clause else {
            return Ok(QueryContext {
                query: Arc::new(Query::MatchAll),
                min_score: None,
            });
        };
        let (filter, min_score) = split_min_score(where_clause)?;
        let query = match filter {
            None => Arc::new(Query::MatchAll),
            Some(filter) => context
                .cache
                .get_or_try_insert(&filter, || to_query(&filter, context.mapping))
                .map_err(|e| match e {
                    Error::Translation(_) => e,
                    other => Error::Translation(format!(
                        "{where_clause} on shard {}: {other}",
                        context.shard_id
                    )),
                })?,
        };
        Ok(QueryContext { query, min_score })
    }
}

/// Splits the where clause into the filter and the minimum score.
fn split_min_score(where_clause: &Symbol) -> Result<(Option<Symbol>, Option<f32>)> {
    if let Some(min_score) = as_min_score(where_clause)? {
        return Ok((None, Some(min_score)));
    }
    let Symbol::Function {
        operator: Operator::And,
        arguments,
    } = where_clause
    else {
        return Ok((Some(where_clause.clone()), None));
    };

    let mut min_score: Option<f32> = None;
    let mut rest = Vec::with_capacity(arguments.len());
    for argument in arguments {
        match as_min_score(argument)? {
            Some(score) => min_score = Some(min_score.map_or(score, |m| m.max(score))),
            None => rest.push(argument.clone()),
        }
    }
    let filter = match rest.len() {
        0 => None,
        1 => rest.pop(),
        _ => Some(Symbol::and(rest)),
    };
    Ok((filter, min_score))
}

/// `Some(x)` for `_score >= x`.
fn as_min_score(symbol: &Symbol) -> Result<Option<f32>> {
    match symbol {
        Symbol::Function {
            operator: Operator::Gte,
            arguments,
        } => match arguments.as_slice() {
            [Symbol::Score, Symbol::Literal(Field::Integer(i))] => Ok(Some(*i as f32)),
            [Symbol::Score, Symbol::Literal(Field::Float(f))] => Ok(Some(*f)),
            [Symbol::Score, other] => Err(Error::Translation(format!(
                "_score can only be compared to a number, got {other}"
            ))),
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}

fn to_query(symbol: &Symbol, mapping: &Mapping) -> Result<Query> {
    match symbol {
        Symbol::Literal(Field::Boolean(true)) => Ok(Query::MatchAll),
        Symbol::Literal(Field::Boolean(false)) | Symbol::Literal(Field::Null) => {
            Ok(Query::MatchNone)
        }
        Symbol::Literal(other) => Err(Error::Translation(format!(
            "can't use {other} as a condition"
        ))),
        Symbol::Reference(name) => {
            let column = column_index(mapping, name)?;
            match mapping.get_column(column).map(|c| c.data_type()) {
                Some(DataType::Boolean) => Ok(Query::Compare {
                    column,
                    operator: Operator::Eq,
                    value: Field::Boolean(true),
                }),
                _ => Err(Error::Translation(format!(
                    "column {name} is not a boolean and can't be used as a condition"
                ))),
            }
        }
        Symbol::Score => Err(Error::Translation(
            "_score is only supported in `_score >= <number>` at the top level of WHERE"
                .to_string(),
        )),
        Symbol::Function {
            operator,
            arguments,
        } => match (operator, arguments.as_slice()) {
            (Operator::And, arguments) => Ok(Query::And(
                arguments
                    .iter()
                    .map(|a| to_query(a, mapping))
                    .collect::<Result<_>>()?,
            )),
            (Operator::Or, arguments) => Ok(Query::Or(
                arguments
                    .iter()
                    .map(|a| to_query(a, mapping))
                    .collect::<Result<_>>()?,
            )),
            (Operator::Not, [argument]) => Ok(Query::Not(Box::new(to_query(argument, mapping)?))),
            (Operator::IsNull, [Symbol::Reference(name)]) => {
                Ok(Query::IsNull(column_index(mapping, name)?))
            }
            (Operator::IsNull, [Symbol::Literal(value)]) => match value.is_null() {
                true => Ok(Query::MatchAll),
                false => Ok(Query::MatchNone),
            },
            (operator, [Symbol::Reference(name), Symbol::Literal(value)]) => {
                compare(mapping, name, *operator, value)
            }
            (operator, [Symbol::Literal(value), Symbol::Reference(name)]) => {
                compare(mapping, name, operator.flip(), value)
            }
            _ => Err(Error::Translation(format!("unsupported condition {symbol}"))),
        },
    }
}

fn compare(mapping: &Mapping, name: &str, operator: Operator, value: &Field) -> Result<Query> {
    if operator.compare(std::cmp::Ordering::Equal).is_none() {
        return Err(Error::Translation(format!("{operator} is not a comparison")));
    }
    let column = column_index(mapping, name)?;
    if value.is_null() {
        // comparisons with NULL never match.
        return Ok(Query::MatchNone);
    }
    let data_type = mapping
        .get_column(column)
        .map(|c| c.data_type())
        .ok_or(Error::OutOfBounds)?;
    let value = value
        .cast(data_type)
        .map_err(|e| Error::Translation(format!("can't compare {name} with {value}: {e}")))?;
    Ok(Query::Compare {
        column,
        operator,
        value,
    })
}

fn column_index(mapping: &Mapping, name: &str) -> Result<usize> {
    mapping
        .column_index(name)
        .ok_or_else(|| Error::Translation(format!("unknown column {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_errors;
    use crate::common::utility::users_mapping;

    fn convert(where_clause: &Symbol) -> Result<QueryContext> {
        let shard_id = ShardId::new("users", 0);
        let mapping = users_mapping();
        let cache = QueryCache::default();
        SymbolQueryBuilder.convert(
            Some(where_clause),
            &QueryShardContext {
                shard_id: &shard_id,
                mapping: &mapping,
                cache: &cache,
            },
        )
    }

    fn row(id: i32, name: Option<&str>) -> Row {
        let name = name.map_or(Field::Null, Field::from);
        Row::from(vec![Field::from(id), name, Field::Float(1.0), Field::from(true)])
    }

    #[test]
    fn test_comparison_casts_literal() {
        let context = convert(&Symbol::compare(
            Symbol::literal(3.0_f32),
            Operator::Lt,
            Symbol::column("id"),
        ))
        .unwrap();
        assert_eq!(
            *context.query,
            Query::Compare {
                column: 0,
                operator: Operator::Gt,
                value: Field::from(3)
            }
        );
        assert_eq!(context.score(&row(4, None)).unwrap(), Some(1.0));
        assert_eq!(context.score(&row(3, None)).unwrap(), None);
    }

    #[test]
    fn test_null_semantics() {
        let not_a = Symbol::not(Symbol::compare(
            Symbol::column("name"),
            Operator::Eq,
            Symbol::literal("a"),
        ));
        let context = convert(&not_a).unwrap();
        assert_eq!(context.score(&row(1, Some("b"))).unwrap(), Some(1.0));
        assert_eq!(context.score(&row(1, Some("a"))).unwrap(), None);
        // NOT of unknown is unknown.
        assert_eq!(context.score(&row(1, None)).unwrap(), None);

        let is_null = convert(&Symbol::is_null(Symbol::column("name"))).unwrap();
        assert_eq!(is_null.score(&row(1, None)).unwrap(), Some(1.0));
    }

    #[test]
    fn test_min_score_from_top_level_conjunct() {
        let where_clause = Symbol::and(vec![
            Symbol::compare(Symbol::column("id"), Operator::Gte, Symbol::literal(0)),
            Symbol::compare(Symbol::Score, Operator::Gte, Symbol::literal(2)),
            Symbol::column("active"),
        ]);
        let context = convert(&where_clause).unwrap();
        assert_eq!(context.min_score, Some(2.0));
        assert_eq!(context.score(&row(1, None)).unwrap(), Some(2.0));

        let only_score = convert(&Symbol::compare(
            Symbol::Score,
            Operator::Gte,
            Symbol::literal(0.5_f32),
        ))
        .unwrap();
        assert_eq!(*only_score.query, Query::MatchAll);
        assert_eq!(only_score.min_score, Some(0.5));
    }

    #[test]
    fn test_translation_failures() {
        let nested_score = Symbol::or(vec![
            Symbol::compare(Symbol::Score, Operator::Gte, Symbol::literal(1)),
            Symbol::column("active"),
        ]);
        assert_errors!(convert(&nested_score), Error::Translation(_));
        assert_errors!(convert(&Symbol::column("missing")), Error::Translation(_));
        assert_errors!(convert(&Symbol::column("name")), Error::Translation(_));
        assert_errors!(
            convert(&Symbol::compare(Symbol::column("id"), Operator::Eq, Symbol::literal("x"))),
            Error::Translation(_)
        );
        assert_errors!(
            convert(&Symbol::compare(Symbol::column("id"), Operator::Eq, Symbol::column("id"))),
            Error::Translation(_)
        );
    }

    #[test]
    fn test_cache_reuses_compiled_queries() {
        let shard_id = ShardId::new("users", 0);
        let mapping = users_mapping();
        let cache = QueryCache::default();
        let context = QueryShardContext {
            shard_id: &shard_id,
            mapping: &mapping,
            cache: &cache,
        };
        let where_clause = Symbol::column("active");
        let first = SymbolQueryBuilder.convert(Some(&where_clause), &context).unwrap();
        let second = SymbolQueryBuilder.convert(Some(&where_clause), &context).unwrap();
        assert!(Arc::ptr_eq(&first.query, &second.query));
        assert_eq!((cache.len(), cache.hits(), cache.misses()), (1, 1, 1));
    }

    #[test]
    fn test_cache_is_keyed_on_symbols_and_bounded() {
        let shard_id = ShardId::new("users", 0);
        let mapping = users_mapping();
        let cache = QueryCache::new(2);
        let context = QueryShardContext {
            shard_id: &shard_id,
            mapping: &mapping,
            cache: &cache,
        };
        for id in 0..5 {
            let where_clause =
                Symbol::compare(Symbol::column("id"), Operator::Eq, Symbol::literal(id));
            SymbolQueryBuilder.convert(Some(&where_clause), &context).unwrap();
            assert!(cache.len() <= cache.capacity());
        }
        assert_eq!((cache.len(), cache.misses()), (2, 5));

        // the most recent query survives eviction.
        let last = Symbol::compare(Symbol::column("id"), Operator::Eq, Symbol::literal(4));
        SymbolQueryBuilder.convert(Some(&last), &context).unwrap();
        assert_eq!(cache.hits(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }
}
