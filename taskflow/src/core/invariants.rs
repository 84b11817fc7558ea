//! Semantic invariants of protocol documents not expressible via JSON Schema.

use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use crate::protocol::{TaskSpec, TimerSpec};

static DATASET_NAME_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^[A-Za-z0-9_.-]+$").expect("dataset name pattern should be valid")
});

/// True if `name` can be used as a dataset (and file) name.
pub fn valid_dataset_name(name: &str) -> bool {
    DATASET_NAME_RE.is_match(name) && name != "." && name != ".."
}

/// Check semantic invariants not expressible in JSON Schema:
/// - No duplicate explicit ids or dataset names
/// - A node is not both navigable and repeat
/// - Timer bounds are finite, non-negative and `min <= max`
/// - Repeat outputs are valid dataset names with unique, non-empty columns
/// - Behaviors sit below the ancestors they need
pub fn validate_invariants(root: &TaskSpec) -> Vec<String> {
    let mut state = Walk::default();
    validate_node(root, Ancestors::default(), &mut state, &root.name);
    state.errors
}

#[derive(Default)]
struct Walk {
    ids: HashSet<u32>,
    datasets: HashSet<String>,
    errors: Vec<String>,
}

#[derive(Clone, Copy, Default)]
struct Ancestors {
    navigable: bool,
    repeat: bool,
}

fn validate_node(node: &TaskSpec, ancestors: Ancestors, walk: &mut Walk, path: &str) {
    if node.name.trim().is_empty() {
        walk.errors.push(format!("{path}: name must not be empty"));
    }
    if let Some(id) = node.id {
        if !walk.ids.insert(id) {
            walk.errors.push(format!("duplicate id {id} at {path}"));
        }
    }
    if node.navigable && node.repeat.is_some() {
        walk.errors
            .push(format!("{path}: a task cannot be both navigable and repeat"));
    }
    if let Some(timer) = node.timer {
        validate_timer(timer, path, &mut walk.errors);
    }
    if let Some(repeat) = &node.repeat {
        if let Some(dataset) = node.dataset_name() {
            if !valid_dataset_name(dataset) {
                walk.errors
                    .push(format!("{path}: invalid dataset name '{dataset}'"));
            } else if !walk.datasets.insert(dataset.to_string()) {
                walk.errors
                    .push(format!("{path}: dataset '{dataset}' is written by another task"));
            }
        }
        let mut seen = BTreeSet::new();
        for column in &repeat.columns {
            if column.is_empty() {
                walk.errors.push(format!("{path}: empty output column"));
            } else if !seen.insert(column.as_str()) {
                walk.errors
                    .push(format!("{path}: duplicate output column '{column}'"));
            }
        }
    }
    if let Some(behavior) = &node.behavior {
        let needs = behavior.requirements();
        if needs.repeat_ancestor && !ancestors.repeat {
            walk.errors.push(format!(
                "{path}: {} behavior must be inside a repeat task",
                behavior.type_name()
            ));
        }
        if needs.navigable_ancestor && !ancestors.navigable {
            walk.errors.push(format!(
                "{path}: {} behavior must be inside a navigable task",
                behavior.type_name()
            ));
        }
    }

    let below = Ancestors {
        navigable: ancestors.navigable || node.navigable,
        repeat: ancestors.repeat || node.repeat.is_some(),
    };
    for child in &node.children {
        let child_path = format!("{path}/{}", child.name);
        validate_node(child, below, walk, &child_path);
    }
}

fn validate_timer(timer: TimerSpec, path: &str, errors: &mut Vec<String>) {
    let usable = |value: f64| value.is_finite() && value >= 0.0;
    match timer {
        TimerSpec::Fixed { seconds } if !usable(seconds) => {
            errors.push(format!("{path}: timer seconds must be finite and >= 0"));
        }
        TimerSpec::Randomized { min, max } if !usable(min) || !usable(max) => {
            errors.push(format!("{path}: timer bounds must be finite and >= 0"));
        }
        TimerSpec::Randomized { min, max } if min > max => {
            errors.push(format!("{path}: timer min {min} exceeds max {max}"));
        }
        _ => {}
    }
}
