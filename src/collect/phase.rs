use crate::collect::{OrderBy, Symbol};
use crate::common::Result;
use crate::config::Paging;
use crate::errinput;
use crate::jobs::JobId;
use crate::storage::ShardId;
use std::collections::BTreeMap;

/// A collect phase routed to concrete shards: what each node has to read,
/// filter and return for one relation.
#[derive(Clone, Debug, PartialEq)]
pub struct RoutedCollectPhase {
    job_id: JobId,
    phase_id: i32,
    name: String,
    relation_id: String,
    routing: BTreeMap<String, Vec<ShardId>>,
    where_clause: Option<Symbol>,
    to_collect: Vec<Symbol>,
    order_by: Option<OrderBy>,
    limit: Option<usize>,
    node_page_size_hint: Option<usize>,
}

impl RoutedCollectPhase {
    pub fn builder(job_id: JobId, phase_id: i32) -> RoutedCollectPhaseBuilder {
        RoutedCollectPhaseBuilder {
            job_id,
            phase_id,
            name: "collect".to_string(),
            relation_id: String::new(),
            routing: BTreeMap::new(),
            where_clause: None,
            to_collect: Vec::new(),
            order_by: None,
            limit: None,
            node_page_size_hint: None,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn phase_id(&self) -> i32 {
        self.phase_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn relation_id(&self) -> &str {
        &self.relation_id
    }

    pub fn shards_on(&self, node_id: &str) -> &[ShardId] {
        self.routing.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn where_clause(&self) -> Option<&Symbol> {
        self.where_clause.as_ref()
    }

    pub fn to_collect(&self) -> &[Symbol] {
        &self.to_collect
    }

    pub fn order_by(&self) -> Option<&OrderBy> {
        self.order_by.as_ref()
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn node_page_size_hint(&self) -> Option<usize> {
        self.node_page_size_hint
    }

    /// Rows one shard on `node_id` should deliver per batch. The node's row
    /// budget (the page size hint, or the configured page size) is split
    /// between the shards the phase reads on that node.
    pub fn shard_queue_size(&self, node_id: &str, paging: &Paging) -> usize {
        let shards = self.shards_on(node_id).len().max(1);
        let paging = Paging {
            page_size: self.node_page_size_hint.unwrap_or(paging.page_size),
            ..*paging
        };
        paging.weighted_page_size(self.limit, 1.0 / shards as f64)
    }
}

pub struct RoutedCollectPhaseBuilder {
    job_id: JobId,
    phase_id: i32,
    name: String,
    relation_id: String,
    routing: BTreeMap<String, Vec<ShardId>>,
    where_clause: Option<Symbol>,
    to_collect: Vec<Symbol>,
    order_by: Option<OrderBy>,
    limit: Option<usize>,
    node_page_size_hint: Option<usize>,
}

impl RoutedCollectPhaseBuilder {
    pub fn name(&mut self, name: &str) -> &mut Self {
        self.name = name.to_string();
        self
    }

    pub fn relation_id(&mut self, relation_id: &str) -> &mut Self {
        self.relation_id = relation_id.to_string();
        self
    }

    pub fn route(&mut self, node_id: &str, shards: Vec<ShardId>) -> &mut Self {
        self.routing
            .entry(node_id.to_string())
            .or_default()
            .extend(shards);
        self
    }

    pub fn where_clause(&mut self, where_clause: Symbol) -> &mut Self {
        self.where_clause = Some(where_clause);
        self
    }

    pub fn to_collect(&mut self, to_collect: Vec<Symbol>) -> &mut Self {
        self.to_collect = to_collect;
        self
    }

    pub fn order_by(&mut self, order_by: OrderBy) -> &mut Self {
        self.order_by = Some(order_by);
        self
    }

    pub fn limit(&mut self, limit: usize) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn node_page_size_hint(&mut self, hint: usize) -> &mut Self {
        self.node_page_size_hint = Some(hint);
        self
    }

    pub fn build(&self) -> Result<RoutedCollectPhase> {
        if self.to_collect.is_empty() {
            return errinput!("collect phase {} has nothing to collect", self.phase_id);
        }
        if self.limit == Some(0) || self.node_page_size_hint == Some(0) {
            return errinput!("collect phase {} has a zero row budget", self.phase_id);
        }
        Ok(RoutedCollectPhase {
            job_id: self.job_id,
            phase_id: self.phase_id,
            name: self.name.clone(),
            relation_id: self.relation_id.clone(),
            routing: self.routing.clone(),
            where_clause: self.where_clause.clone(),
            to_collect: self.to_collect.clone(),
            order_by: self.order_by.clone(),
            limit: self.limit,
            node_page_size_hint: self.node_page_size_hint,
        })
    }
}
