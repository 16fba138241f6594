use super::*;
use crate::context::Params;
use fxhash::FxHashMap;
use std::collections::BTreeMap;
use std::fmt;

type RoutineFactory = Box<dyn Fn() -> Box<dyn Routine>>;

/// One implementation of a flow, guarded by predicates over the node's parameters.
///
/// Parameters the variant has no predicate for are ignored when matching.
///
pub struct Variant {
    priority: i32,
    predicates: BTreeMap<String, Predicate>,
    factory: RoutineFactory,
}

impl Variant {
    pub fn new<F, R>(priority: i32, factory: F) -> Self
    where
        F: Fn() -> R + 'static,
        R: Routine + 'static,
    {
        Self {
            priority,
            predicates: BTreeMap::new(),
            factory: Box::new(move || Box::new(factory())),
        }
    }

    pub fn when<K, P>(mut self, param: K, predicate: P) -> Self
    where
        K: Into<String>,
        P: Into<Predicate>,
    {
        self.predicates.insert(param.into(), predicate.into());
        self
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn matches(&self, params: &Params) -> bool {
        self.predicates
            .iter()
            .all(|(name, predicate)| predicate.accepts(params.get(name)))
    }

    pub(crate) fn instantiate(&self) -> Box<dyn Routine> {
        (self.factory)()
    }
}

impl fmt::Debug for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variant")
            .field("priority", &self.priority)
            .field("predicates", &self.predicates)
            .finish_non_exhaustive()
    }
}

/// The position of a node in the priority levels of its group.
///
/// Candidates are produced lazily: the next level is only looked at once the current variant
/// declines, and it is matched against the node's parameters as they are at that point.
///
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Chain {
    level: usize,
}

/// A named flow: its variants, and the nodes created for it so far.
///
pub struct FlowGroup {
    name: String,
    variants: Vec<Variant>,
    nodes: FxHashMap<Params, NodeId>,
}

impl FlowGroup {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            variants: vec![],
            nodes: FxHashMap::default(),
        }
    }

    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.add_variant(variant);
        self
    }

    pub fn add_variant(&mut self, variant: Variant) {
        self.variants.push(variant);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    /// The number of distinct parameter sets this group has been invoked with.
    ///
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn cached(&self, params: &Params) -> Option<NodeId> {
        self.nodes.get(params).copied()
    }

    pub(crate) fn remember(&mut self, params: Params, node: NodeId) {
        self.nodes.insert(params, node);
    }

    /// Distinct priorities, highest first.
    fn levels(&self) -> Vec<i32> {
        let mut levels: Vec<i32> = self.variants.iter().map(Variant::priority).collect();
        levels.sort_unstable_by(|a, b| b.cmp(a));
        levels.dedup();
        levels
    }

    /// Find the next variant to run, continuing from where `chain` left off.
    ///
    pub(crate) fn next_candidate(
        &self,
        chain: &mut Chain,
        params: &Params,
    ) -> Result<&Variant, FlowError> {
        let levels = self.levels();
        while let Some(priority) = levels.get(chain.level).copied() {
            chain.level += 1;
            let found: Vec<&Variant> = self
                .variants
                .iter()
                .filter(|v| v.priority == priority && v.matches(params))
                .collect();
            match found.as_slice() {
                [] => continue,
                [variant] => return Ok(variant),
                many => {
                    return Err(FlowError::AmbiguousMatch {
                        group: self.name.clone(),
                        params: params.to_string(),
                        priority,
                        candidates: many.len(),
                    })
                }
            }
        }
        Err(FlowError::NoMatch {
            group: self.name.clone(),
            params: params.to_string(),
        })
    }
}

impl fmt::Debug for FlowGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowGroup")
            .field("name", &self.name)
            .field("variants", &self.variants)
            .field("nodes", &self.nodes.len())
            .finish()
    }
}
