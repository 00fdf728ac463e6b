//! Pattern-mining driver contract: generalize a cluster, then score coverage.
//!
//! The clustering, ranking and search loops that drive these calls live with
//! the caller. This module only answers two questions: which schema does a set
//! of candidate units generalize to, and how cheaply does a schema reproduce
//! each example of a corpus.

use std::collections::BTreeMap;
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, trace};

use crate::diff::CandidateUnit;
use crate::ir::node::{Node, deep_eq};
use crate::schema::{Generalizer, Schema, SchemaInstance};
use crate::scope::TieredBudget;
use crate::session::Session;

pub type ExampleId = usize;

/// One training example: a candidate unit drawn from a before/after file pair.
#[derive(Debug, Clone)]
pub struct Example {
    pub id: ExampleId,
    pub unit: CandidateUnit,
}

impl Example {
    pub fn new(id: ExampleId, unit: CandidateUnit) -> Self {
        Example { id, unit }
    }
}

/// Generalizes `units`, rejecting schemas whose common kind is the universal top
/// (when configured) or that need more free variables than allowed.
pub fn generalize(session: &Session, units: &[CandidateUnit]) -> Option<Schema> {
    let schema = Generalizer::new(session).generalize(units)?;
    let config = session.config();
    if config.reject_top_kind && schema.root_sig().is_top() {
        debug!("Rejected schema `{}`: common kind is the universal top", schema);
        return None;
    }
    if schema.free_var_count() > config.max_free_vars {
        debug!(
            "Rejected schema `{}`: {} free variables exceed the limit of {}",
            schema,
            schema.free_var_count(),
            config.max_free_vars
        );
        return None;
    }
    Some(schema)
}

/// Cost for `schema` to reproduce each covered example; uncovered examples are absent.
/// Zero means exact reproduction without any search.
pub fn coverage(session: &Session, schema: &Schema, corpus: &[Example]) -> BTreeMap<ExampleId, u64> {
    let covered: BTreeMap<ExampleId, u64> = corpus
        .par_iter()
        .filter_map(|example| reproduction_cost(session, schema, &example.unit).map(|cost| (example.id, cost)))
        .collect();
    info!(
        "Schema `{}` covers {} of {} examples",
        schema,
        covered.len(),
        corpus.len()
    );
    covered
}

/// Cost for `schema` to turn `unit.before` into `unit.after`, or `None` when it cannot.
pub fn reproduction_cost(session: &Session, schema: &Schema, unit: &CandidateUnit) -> Option<u64> {
    if !schema.applies_in(&unit.context) {
        return None;
    }
    let mut instance = SchemaInstance::new(schema, session);
    if !instance.match_node(unit.before_node()) {
        return None;
    }
    if let Ok(Some(rebuilt)) = instance.rebuild() {
        if deep_eq(&rebuilt, &unit.after) {
            return Some(0);
        }
    }
    if !instance.bind_post_from(&unit.after) {
        trace!("post pattern cannot produce the after-fragment");
        return None;
    }
    let analyzer = session.analyzer(&unit.before);
    let mut demand = TieredBudget::zero();
    let mut cost = 0u64;
    for id in schema.post_only_vars() {
        let binding: &Arc<Node> = instance.binding(id)?;
        cost += binding.node_count() as u64;
        for reference in binding.references() {
            let tier = analyzer.classify(reference)?;
            demand.add(tier, 1);
            cost += analyzer.supply_at(reference, tier) as u64;
        }
    }
    if !session.config().search_budget().greater_eq(&demand) {
        trace!("demand {} exceeds the search budget", demand);
        return None;
    }
    let rebuilt = instance.rebuild().ok()??;
    deep_eq(&rebuilt, &unit.after).then_some(cost)
}

/// Serializable coverage report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageReport {
    pub schema: crate::schema::SchemaSummary,
    pub covered: BTreeMap<ExampleId, u64>,
    pub total: usize,
}

impl CoverageReport {
    pub fn new(session: &Session, schema: &Schema, corpus: &[Example]) -> Self {
        CoverageReport {
            schema: schema.summary(),
            covered: coverage(session, schema, corpus),
            total: corpus.len(),
        }
    }

    /// Covered examples reproduced without search.
    pub fn exact(&self) -> usize {
        self.covered.values().filter(|cost| **cost == 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::ir::build::*;
    use crate::ir::kind::KindTag;
    use crate::ir::node::{BinaryOp, Visibility, preorder};
    use crate::ir::site::Site;
    use crate::ir::types::JavaType;

    fn in_method(params: &[&str], statement: Node) -> Arc<Node> {
        Arc::new(unit(
            "p",
            vec![class(modifiers(Visibility::Public, false), "A", None, vec![method(
                modifiers(Visibility::Public, false),
                "f",
                JavaType::int(),
                params.iter().map(|p| parameter(JavaType::int(), p)).collect(),
                Some(block(vec![statement])),
            )])],
        ))
    }

    fn unit_for(params: &[&str], before: Node, after: Node) -> CandidateUnit {
        let root = in_method(params, before);
        let statement = preorder(&root)
            .into_iter()
            .find(|n| n.is_statement() && n.tag() != KindTag::Block)
            .unwrap();
        CandidateUnit::new(Site::locate(&root, &statement).unwrap(), Arc::new(after))
    }

    fn increment(name: &str) -> CandidateUnit {
        let k = || read_param(name, JavaType::int());
        unit_for(
            &[name],
            local_var(JavaType::int(), "x", Some(k())),
            local_var(JavaType::int(), "x", Some(binary(BinaryOp::Add, k(), int(1)))),
        )
    }

    #[test]
    fn test_training_examples_reproduce_exactly() {
        let session = Session::from_units(&[], EngineConfig::default());
        let units = vec![increment("a"), increment("b")];
        let schema = generalize(&session, &units).unwrap();
        let corpus: Vec<Example> = units.into_iter().enumerate().map(|(id, u)| Example::new(id, u)).collect();
        let covered = coverage(&session, &schema, &corpus);
        assert_eq!(covered, BTreeMap::from([(0, 0), (1, 0)]));
    }

    #[test]
    fn test_too_many_free_variables_is_rejected() {
        let config = EngineConfig {
            max_free_vars: 1,
            ..EngineConfig::default()
        };
        let session = Session::from_units(&[], config);
        assert!(generalize(&session, &[increment("a")]).is_none());
    }

    #[test]
    fn test_unmatched_example_is_absent() {
        let session = Session::from_units(&[], EngineConfig::default());
        let schema = generalize(&session, &[increment("a")]).unwrap();
        let other = unit_for(&["n"], ret(Some(int(0))), ret(Some(int(1))));
        let corpus = vec![Example::new(0, increment("c")), Example::new(7, other)];
        let report = CoverageReport::new(&session, &schema, &corpus);
        assert_eq!(report.total, 2);
        assert!(report.covered.contains_key(&0));
        assert!(!report.covered.contains_key(&7));
        assert_eq!(report.exact(), 1);
    }

    #[test]
    fn test_post_only_variable_is_searched_within_budget() {
        let session = Session::from_units(&[], EngineConfig::default());
        let returning = |name: &str| {
            unit_for(&["k", "m"], ret(Some(int(0))), ret(Some(read_param(name, JavaType::int()))))
        };
        let units = vec![returning("k"), returning("m")];
        let schema = generalize(&session, &units).unwrap();
        assert_eq!(schema.post_only_vars().len(), 1);
        let corpus: Vec<Example> = units.into_iter().enumerate().map(|(id, u)| Example::new(id, u)).collect();
        let covered = coverage(&session, &schema, &corpus);
        // One reference node plus the two variables of the routine.
        assert_eq!(covered, BTreeMap::from([(0, 3), (1, 3)]));

        let starved = Session::from_units(&[], EngineConfig {
            search_budget: [0, 0, 0, 0],
            ..EngineConfig::default()
        });
        assert!(coverage(&starved, &schema, &corpus).is_empty());
    }
}
