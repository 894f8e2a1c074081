//! Tree ensemble loaded from an XGBoost JSON dump
//!
//! Accepted documents:
//!
//! ```text
//! [ {tree}, {tree}, ... ]
//! { "objective": "binary:logistic", "base_margin": -1.0, "trees": [ ... ] }
//! ```
//!
//! Each tree is the nested `dump_model(..., dump_format="json")` form:
//! split nodes carry `nodeid`, `split`, `split_condition`, `yes`, `no`,
//! `missing` and `children`; leaves carry `nodeid` and `leaf`. `cover` is
//! optional for scoring but required for attribution.
//!
//! Routing follows XGBoost: `x < split_condition` takes `yes`, NaN takes
//! `missing`, everything else takes `no`.

use serde::Deserialize;
use tracing::debug;

use super::{check_vector, sigmoid, Classifier};
use crate::error::{ChurnError, ChurnResult};
use crate::models::EncodedVector;
use crate::schema::FeatureSchema;

const SUPPORTED_OBJECTIVE: &str = "binary:logistic";

// ---------------------------------------------------------------------------
// Dump format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DumpDocument {
    Wrapped {
        #[serde(default)]
        objective: Option<String>,
        #[serde(default)]
        base_margin: f64,
        trees: Vec<DumpNode>,
    },
    Bare(Vec<DumpNode>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SplitRef {
    Index(usize),
    Name(String),
}

#[derive(Debug, Deserialize)]
struct DumpNode {
    #[serde(default)]
    nodeid: Option<u32>,
    #[serde(default)]
    split: Option<SplitRef>,
    #[serde(default)]
    split_condition: Option<f64>,
    #[serde(default)]
    yes: Option<u32>,
    #[serde(default)]
    no: Option<u32>,
    #[serde(default)]
    missing: Option<u32>,
    #[serde(default)]
    leaf: Option<f64>,
    #[serde(default)]
    cover: Option<f64>,
    #[serde(default)]
    children: Vec<DumpNode>,
}

// ---------------------------------------------------------------------------
// Flattened trees
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Split {
        feature: usize,
        threshold: f64,
        yes: usize,
        no: usize,
        missing_yes: bool,
        cover: Option<f64>,
    },
    Leaf {
        value: f64,
        cover: Option<f64>,
    },
}

impl Node {
    pub(crate) fn cover(&self) -> Option<f64> {
        match self {
            Node::Split { cover, .. } | Node::Leaf { cover, .. } => *cover,
        }
    }
}

/// One regression tree, root at index 0
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub(crate) fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    /// Child taken by `x` at a split node
    pub(crate) fn route(&self, index: usize, x: &[f64]) -> Option<usize> {
        match &self.nodes[index] {
            Node::Split {
                feature,
                threshold,
                yes,
                no,
                missing_yes,
                ..
            } => {
                let value = x[*feature];
                let go_yes = if value.is_nan() {
                    *missing_yes
                } else {
                    value < *threshold
                };
                Some(if go_yes { *yes } else { *no })
            }
            Node::Leaf { .. } => None,
        }
    }

    fn leaf_value(&self, x: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match self.route(index, x) {
                Some(next) => index = next,
                None => {
                    if let Node::Leaf { value, .. } = self.nodes[index] {
                        return value;
                    }
                    return 0.0;
                }
            }
        }
    }

    fn has_cover(&self) -> bool {
        self.nodes.iter().all(|n| match n {
            Node::Split { cover, .. } => cover.is_some_and(|c| c > 0.0),
            Node::Leaf { cover, .. } => cover.is_some_and(|c| c >= 0.0),
        })
    }

    /// Cover-weighted mean leaf value (the tree's expectation)
    pub(crate) fn expected_value(&self) -> f64 {
        self.expected_from(0)
    }

    fn expected_from(&self, index: usize) -> f64 {
        match &self.nodes[index] {
            Node::Leaf { value, .. } => *value,
            Node::Split { yes, no, cover, .. } => {
                let parent = cover.unwrap_or(0.0);
                if parent <= 0.0 {
                    return 0.5 * (self.expected_from(*yes) + self.expected_from(*no));
                }
                let w_yes = self.nodes[*yes].cover().unwrap_or(0.0) / parent;
                let w_no = self.nodes[*no].cover().unwrap_or(0.0) / parent;
                w_yes * self.expected_from(*yes) + w_no * self.expected_from(*no)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Ensemble
// ---------------------------------------------------------------------------

/// Additive tree ensemble with a logistic link
#[derive(Debug, Clone, PartialEq)]
pub struct TreeEnsemble {
    trees: Vec<Tree>,
    base_margin: f64,
    feature_count: usize,
    schema_fingerprint: String,
    explainable: bool,
}

impl TreeEnsemble {
    /// Parse a dump and bind its split features to `schema`.
    ///
    /// Split features may be schema column names or `f<index>`; anything
    /// else is a `SchemaMismatch`.
    pub fn from_json(json: &str, schema: &FeatureSchema) -> ChurnResult<Self> {
        let document: DumpDocument = serde_json::from_str(json)
            .map_err(|e| ChurnError::ModelLoad(format!("invalid tree dump: {e}")))?;

        let (base_margin, dumps) = match document {
            DumpDocument::Wrapped {
                objective,
                base_margin,
                trees,
            } => {
                if let Some(objective) = objective {
                    if objective != SUPPORTED_OBJECTIVE {
                        return Err(ChurnError::ModelLoad(format!(
                            "unsupported objective '{objective}', expected '{SUPPORTED_OBJECTIVE}'"
                        )));
                    }
                }
                (base_margin, trees)
            }
            DumpDocument::Bare(trees) => (0.0, trees),
        };

        if !base_margin.is_finite() {
            return Err(ChurnError::ModelLoad("base_margin is not finite".into()));
        }
        if dumps.is_empty() {
            return Err(ChurnError::ModelLoad("tree dump contains no trees".into()));
        }

        let mut trees = Vec::with_capacity(dumps.len());
        for (i, dump) in dumps.iter().enumerate() {
            let mut nodes = Vec::new();
            flatten(dump, schema, &mut nodes)
                .map_err(|e| annotate(e, &format!("tree {i}")))?;
            trees.push(Tree { nodes });
        }

        let explainable = trees.iter().all(Tree::has_cover);
        debug!(
            trees = trees.len(),
            base_margin, explainable, "loaded tree ensemble"
        );

        Ok(Self {
            trees,
            base_margin,
            feature_count: schema.len(),
            schema_fingerprint: schema.fingerprint().to_string(),
            explainable,
        })
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub fn base_margin(&self) -> f64 {
        self.base_margin
    }

    /// True when every node carries cover statistics
    pub fn is_explainable(&self) -> bool {
        self.explainable
    }

    pub(crate) fn trees(&self) -> &[Tree] {
        &self.trees
    }

    /// Raw additive score (log-odds) for a row already checked against
    /// `feature_count`
    pub(crate) fn margin(&self, x: &[f64]) -> f64 {
        self.base_margin + self.trees.iter().map(|t| t.leaf_value(x)).sum::<f64>()
    }
}

impl Classifier for TreeEnsemble {
    fn kind(&self) -> &'static str {
        "tree_ensemble"
    }

    fn feature_count(&self) -> usize {
        self.feature_count
    }

    fn schema_fingerprint(&self) -> &str {
        &self.schema_fingerprint
    }

    fn predict_probability(&self, vector: &EncodedVector) -> ChurnResult<f64> {
        check_vector(self, vector)?;
        Ok(sigmoid(self.margin(vector.values())))
    }

    fn as_tree_ensemble(&self) -> Option<&TreeEnsemble> {
        Some(self)
    }
}

fn annotate(err: ChurnError, context: &str) -> ChurnError {
    match err {
        ChurnError::SchemaMismatch(msg) => ChurnError::SchemaMismatch(format!("{context}: {msg}")),
        ChurnError::ModelLoad(msg) => ChurnError::ModelLoad(format!("{context}: {msg}")),
        other => other,
    }
}

fn resolve_feature(split: &SplitRef, schema: &FeatureSchema) -> ChurnResult<usize> {
    let index = match split {
        SplitRef::Index(i) => Some(*i),
        SplitRef::Name(name) => schema.index_of(name).or_else(|| {
            name.strip_prefix('f')
                .and_then(|rest| rest.parse::<usize>().ok())
        }),
    };

    match index {
        Some(i) if i < schema.len() => Ok(i),
        _ => {
            let shown = match split {
                SplitRef::Index(i) => format!("f{i}"),
                SplitRef::Name(name) => name.clone(),
            };
            Err(ChurnError::SchemaMismatch(format!(
                "split feature '{shown}' is not in the feature schema ({} columns)",
                schema.len()
            )))
        }
    }
}

/// Depth-first flatten; returns the index of `dump` in `out`.
fn flatten(dump: &DumpNode, schema: &FeatureSchema, out: &mut Vec<Node>) -> ChurnResult<usize> {
    let index = out.len();

    if let Some(value) = dump.leaf {
        if !value.is_finite() {
            return Err(ChurnError::ModelLoad("leaf value is not finite".into()));
        }
        out.push(Node::Leaf {
            value,
            cover: dump.cover,
        });
        return Ok(index);
    }

    let node_label = dump
        .nodeid
        .map_or_else(|| "?".to_string(), |id| id.to_string());
    let missing_part =
        |what: &str| ChurnError::ModelLoad(format!("split node {node_label} has no '{what}'"));

    let split = dump.split.as_ref().ok_or_else(|| missing_part("split"))?;
    let threshold = dump
        .split_condition
        .ok_or_else(|| missing_part("split_condition"))?;
    let yes_id = dump.yes.ok_or_else(|| missing_part("yes"))?;
    let no_id = dump.no.ok_or_else(|| missing_part("no"))?;
    let missing_id = dump.missing.unwrap_or(yes_id);
    let feature = resolve_feature(split, schema)?;

    let child = |id: u32| {
        dump.children
            .iter()
            .find(|c| c.nodeid == Some(id))
            .ok_or_else(|| {
                ChurnError::ModelLoad(format!("split node {node_label} has no child {id}"))
            })
    };
    let yes_dump = child(yes_id)?;
    let no_dump = child(no_id)?;

    // Placeholder; children indices are known only after they are flattened.
    out.push(Node::Leaf {
        value: 0.0,
        cover: None,
    });
    let yes = flatten(yes_dump, schema, out)?;
    let no = flatten(no_dump, schema, out)?;

    out[index] = Node::Split {
        feature,
        threshold,
        yes,
        no,
        missing_yes: missing_id == yes_id,
        cover: dump.cover,
    };
    Ok(index)
}
