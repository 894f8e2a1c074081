//! Exact path-dependent TreeSHAP
//!
//! Lundberg, Erion & Lee, "Consistent Individualized Feature Attribution
//! for Tree Ensembles" (Algorithm 2). Runs in margin space, so for every
//! row:
//!
//! ```text
//! base_value + sum(phi) == margin(x)
//! ```
//!
//! `base_value` is the ensemble's cover-weighted expectation.

use crate::classifier::tree::{Node, Tree};
use crate::classifier::TreeEnsemble;

/// Attributions for one row
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ShapValues {
    pub base_value: f64,
    pub margin: f64,
    /// One entry per schema column
    pub phi: Vec<f64>,
}

#[derive(Debug, Clone, Copy)]
struct PathElement {
    feature: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    pweight: f64,
}

/// Compute SHAP values for `x` over every tree of the ensemble.
///
/// Callers must check `TreeEnsemble::is_explainable` and the row length
/// first; without cover statistics the result is meaningless.
pub(crate) fn shap_values(model: &TreeEnsemble, x: &[f64]) -> ShapValues {
    let mut phi = vec![0.0; x.len()];
    let mut base_value = model.base_margin();

    for tree in model.trees() {
        base_value += tree.expected_value();
        recurse(tree, 0, x, &mut phi, &[], 1.0, 1.0, None);
    }

    ShapValues {
        base_value,
        margin: model.margin(x),
        phi,
    }
}

#[allow(clippy::too_many_arguments)]
fn recurse(
    tree: &Tree,
    index: usize,
    x: &[f64],
    phi: &mut [f64],
    parent_path: &[PathElement],
    zero_fraction: f64,
    one_fraction: f64,
    feature: Option<usize>,
) {
    let mut path = Vec::with_capacity(parent_path.len() + 1);
    path.extend_from_slice(parent_path);
    extend(&mut path, zero_fraction, one_fraction, feature);

    match tree.node(index) {
        Node::Leaf { value, .. } => {
            for i in 1..path.len() {
                let w = unwound_sum(&path, i);
                let el = path[i];
                if let Some(f) = el.feature {
                    phi[f] += w * (el.one_fraction - el.zero_fraction) * value;
                }
            }
        }
        Node::Split {
            feature: split,
            yes,
            no,
            cover,
            ..
        } => {
            let split = *split;
            let hot = tree.route(index, x).unwrap_or(*yes);
            let cold = if hot == *yes { *no } else { *yes };

            let node_cover = cover.unwrap_or(0.0);
            let hot_cover = tree.node(hot).cover().unwrap_or(0.0);
            let cold_cover = tree.node(cold).cover().unwrap_or(0.0);

            let mut incoming_zero = 1.0;
            let mut incoming_one = 1.0;
            if let Some(k) = path.iter().position(|el| el.feature == Some(split)) {
                incoming_zero = path[k].zero_fraction;
                incoming_one = path[k].one_fraction;
                unwind(&mut path, k);
            }

            let hot_zero = incoming_zero * hot_cover / node_cover;
            let cold_zero = incoming_zero * cold_cover / node_cover;

            for (child, zero, one) in [(hot, hot_zero, incoming_one), (cold, cold_zero, 0.0)] {
                // Unreachable by x and by the background: contributes nothing
                if zero > 0.0 || one > 0.0 {
                    recurse(tree, child, x, phi, &path, zero, one, Some(split));
                }
            }
        }
    }
}

fn extend(path: &mut Vec<PathElement>, zero_fraction: f64, one_fraction: f64, feature: Option<usize>) {
    let depth = path.len();
    path.push(PathElement {
        feature,
        zero_fraction,
        one_fraction,
        pweight: if depth == 0 { 1.0 } else { 0.0 },
    });

    let denom = (depth + 1) as f64;
    for i in (0..depth).rev() {
        path[i + 1].pweight += one_fraction * path[i].pweight * (i + 1) as f64 / denom;
        path[i].pweight = zero_fraction * path[i].pweight * (depth - i) as f64 / denom;
    }
}

fn unwind(path: &mut Vec<PathElement>, index: usize) {
    let last = path.len() - 1;
    let one = path[index].one_fraction;
    let zero = path[index].zero_fraction;
    let denom = (last + 1) as f64;
    let mut next = path[last].pweight;

    for j in (0..last).rev() {
        if one != 0.0 {
            let tmp = path[j].pweight;
            path[j].pweight = next * denom / ((j + 1) as f64 * one);
            next = tmp - path[j].pweight * zero * (last - j) as f64 / denom;
        } else {
            path[j].pweight = path[j].pweight * denom / (zero * (last - j) as f64);
        }
    }

    for j in index..last {
        path[j].feature = path[j + 1].feature;
        path[j].zero_fraction = path[j + 1].zero_fraction;
        path[j].one_fraction = path[j + 1].one_fraction;
    }
    path.pop();
}

fn unwound_sum(path: &[PathElement], index: usize) -> f64 {
    let last = path.len() - 1;
    let one = path[index].one_fraction;
    let zero = path[index].zero_fraction;
    let denom = (last + 1) as f64;
    let mut next = path[last].pweight;
    let mut total = 0.0;

    for j in (0..last).rev() {
        if one != 0.0 {
            let tmp = next * denom / ((j + 1) as f64 * one);
            total += tmp;
            next = path[j].pweight - tmp * zero * (last - j) as f64 / denom;
        } else {
            total += path[j].pweight / zero * denom / (last - j) as f64;
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FeatureSchema;

    fn assert_local_accuracy(values: &ShapValues) {
        let total = values.base_value + values.phi.iter().sum::<f64>();
        assert!(
            (total - values.margin).abs() < 1e-9,
            "base {} + sum(phi) {} != margin {}",
            values.base_value,
            values.phi.iter().sum::<f64>(),
            values.margin
        );
    }

    #[test]
    fn test_one_split_by_hand() {
        // covers 10 -> 4 / 6, leaves 1 / 2; E = 0.4*1 + 0.6*2 = 1.6
        let schema = FeatureSchema::new(["tenure", "unused"]).unwrap();
        let json = r#"[{"nodeid": 0, "split": "tenure", "split_condition": 12.5,
            "yes": 1, "no": 2, "cover": 10.0,
            "children": [{"nodeid": 1, "leaf": 1.0, "cover": 4.0},
                         {"nodeid": 2, "leaf": 2.0, "cover": 6.0}]}]"#;
        let model = TreeEnsemble::from_json(json, &schema).unwrap();

        let left = shap_values(&model, &[1.0, 0.0]);
        assert!((left.base_value - 1.6).abs() < 1e-12);
        assert!((left.phi[0] - (-0.6)).abs() < 1e-12);
        assert_eq!(left.phi[1], 0.0);
        assert_local_accuracy(&left);

        let right = shap_values(&model, &[24.0, 0.0]);
        assert!((right.phi[0] - 0.4).abs() < 1e-12);
        assert_local_accuracy(&right);
    }

    #[test]
    fn test_repeated_feature_on_path() {
        // tenure splits twice on the same path
        let schema = FeatureSchema::new(["tenure", "MonthlyCharges"]).unwrap();
        let json = r#"[{"nodeid": 0, "split": "tenure", "split_condition": 12.0,
            "yes": 1, "no": 2, "cover": 100.0,
            "children": [
              {"nodeid": 1, "split": "MonthlyCharges", "split_condition": 70.0,
               "yes": 3, "no": 4, "cover": 40.0,
               "children": [
                 {"nodeid": 3, "split": "tenure", "split_condition": 3.0,
                  "yes": 5, "no": 6, "cover": 25.0,
                  "children": [{"nodeid": 5, "leaf": 0.9, "cover": 10.0},
                               {"nodeid": 6, "leaf": 0.2, "cover": 15.0}]},
                 {"nodeid": 4, "leaf": 0.6, "cover": 15.0}]},
              {"nodeid": 2, "leaf": -0.7, "cover": 60.0}]}]"#;
        let model = TreeEnsemble::from_json(json, &schema).unwrap();

        for x in [[1.0, 50.0], [5.0, 50.0], [5.0, 90.0], [30.0, 90.0], [30.0, 10.0]] {
            assert_local_accuracy(&shap_values(&model, &x));
        }
    }

    #[test]
    fn test_zero_cover_branch() {
        let schema = FeatureSchema::new(["a"]).unwrap();
        let json = r#"[{"nodeid": 0, "split": "a", "split_condition": 0.5,
            "yes": 1, "no": 2, "cover": 5.0,
            "children": [{"nodeid": 1, "leaf": 1.0, "cover": 5.0},
                         {"nodeid": 2, "leaf": 3.0, "cover": 0.0}]}]"#;
        let model = TreeEnsemble::from_json(json, &schema).unwrap();
        let values = shap_values(&model, &[0.0]);
        assert!(values.phi.iter().all(|v| v.is_finite()));
        assert_local_accuracy(&values);
        assert_local_accuracy(&shap_values(&model, &[1.0]));
    }
}
