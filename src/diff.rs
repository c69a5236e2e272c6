//! The diff pipeline.
//!
//! Computes a hierarchical edit script between two documents in seven
//! phases, after the approach of Cobéna and Marian's "Detecting
//! Changes in XML Documents": build fingerprinted trees for both
//! inputs, match identical subtrees through a registry of old-tree
//! fingerprints, propagate matches up and down in a peephole pass, and
//! fold the unmatched remainder of the old tree into the new tree as
//! deletes, inserts, and updates.
//!
//! Fingerprinting makes the pipeline near-linear in document size
//! rather than quadratic like classic tree-edit-distance algorithms,
//! at the price of never promising a provably minimal script.

use std::fmt;

use tracing::debug;

use crate::cancel::CancelToken;
use crate::delta::Deltas;
use crate::error::DiffResult;
use crate::extract::{calc_deltas, ExtractOptions};
use crate::hash::{fnv_factory, HashFactory};
use crate::matcher::queue_match;
use crate::optimize::optimize;
use crate::stats::Stats;
use crate::tree::prep_trees;
use crate::value::Value;

/// Optimization rounds per run. Large-subtree matches diffuse through
/// chains of single-fingerprint collisions one hop per round; three
/// rounds settle the graphs seen in practice.
const OPTIMIZE_PASSES: usize = 3;

// =============================================================================
// Options
// =============================================================================

/// Configuration for a [`Differ`].
#[derive(Clone)]
pub struct DiffOptions {
    /// Surface scalar changes as in-place updates instead of
    /// delete+insert pairs. Off by default.
    pub calc_changes: bool,
    /// Detect cross-parent moves and same-parent reorders.
    /// Experimental, off by default.
    pub move_deltas: bool,
    /// Fingerprint hash to use. Defaults to 64-bit FNV.
    pub hasher: HashFactory,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            calc_changes: false,
            move_deltas: false,
            hasher: fnv_factory(),
        }
    }
}

impl fmt::Debug for DiffOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiffOptions")
            .field("calc_changes", &self.calc_changes)
            .field("move_deltas", &self.move_deltas)
            .finish_non_exhaustive()
    }
}

impl DiffOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Surface scalar changes as in-place updates.
    pub fn with_updates(mut self) -> Self {
        self.calc_changes = true;
        self
    }

    /// Enable experimental move detection.
    pub fn with_moves(mut self) -> Self {
        self.move_deltas = true;
        self
    }

    /// Replace the fingerprint hash.
    pub fn with_hasher(mut self, hasher: HashFactory) -> Self {
        self.hasher = hasher;
        self
    }
}

// =============================================================================
// Differ
// =============================================================================

/// A configured diff pipeline, reusable across runs.
#[derive(Debug, Clone, Default)]
pub struct Differ {
    options: DiffOptions,
}

impl Differ {
    /// Build a differ with the given options.
    pub fn new(options: DiffOptions) -> Self {
        Self { options }
    }

    /// The options this differ runs with.
    pub fn options(&self) -> &DiffOptions {
        &self.options
    }

    /// Compute the edit script turning `a` into `b`.
    pub fn diff(&self, cancel: &CancelToken, a: &Value, b: &Value) -> DiffResult<Deltas> {
        self.run(cancel, a, b, None)
    }

    /// Compute only the diff statistics for `a` and `b`.
    pub fn stat(&self, cancel: &CancelToken, a: &Value, b: &Value) -> DiffResult<Stats> {
        let mut stats = Stats::default();
        self.run(cancel, a, b, Some(&mut stats))?;
        Ok(stats)
    }

    /// Compute the edit script and its statistics in one pass.
    pub fn stat_diff(
        &self,
        cancel: &CancelToken,
        a: &Value,
        b: &Value,
    ) -> DiffResult<(Deltas, Stats)> {
        let mut stats = Stats::default();
        let deltas = self.run(cancel, a, b, Some(&mut stats))?;
        Ok((deltas, stats))
    }

    fn run(
        &self,
        cancel: &CancelToken,
        a: &Value,
        b: &Value,
        mut stats: Option<&mut Stats>,
    ) -> DiffResult<Deltas> {
        let mut trees = prep_trees(a, b, &self.options.hasher, cancel, stats.as_deref_mut())?;
        debug!(
            nodes = trees.arena.len(),
            fingerprints = trees.registry.len(),
            "trees built"
        );

        queue_match(&mut trees.arena, &trees.registry, trees.t2, cancel)?;
        for _ in 0..OPTIMIZE_PASSES {
            optimize(&mut trees.arena, trees.t1, trees.t2, cancel)?;
        }
        debug!("matching settled");

        let extract = ExtractOptions {
            calc_changes: self.options.calc_changes,
            move_deltas: self.options.move_deltas,
        };
        let deltas = calc_deltas(&mut trees.arena, trees.t1, trees.t2, &extract, cancel, stats)?;
        debug!(deltas = deltas.len(), "script extracted");
        Ok(deltas)
    }
}

// =============================================================================
// Convenience entry points
// =============================================================================

/// Diff two documents with default options and no cancellation.
pub fn diff(a: &Value, b: &Value) -> DiffResult<Deltas> {
    Differ::default().diff(&CancelToken::new(), a, b)
}

/// Diff statistics for two documents with default options.
pub fn stat(a: &Value, b: &Value) -> DiffResult<Stats> {
    Differ::default().stat(&CancelToken::new(), a, b)
}

/// Edit script plus statistics with default options.
pub fn stat_diff(a: &Value, b: &Value) -> DiffResult<(Deltas, Stats)> {
    Differ::default().stat_diff(&CancelToken::new(), a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::Addr;
    use crate::delta::{Delta, Op};
    use crate::error::DiffError;
    use crate::patch::patch;
    use serde_json::json;

    fn v(j: serde_json::Value) -> Value {
        Value::try_from(j).unwrap()
    }

    /// Diff, check the expected script, then patch a copy of the source
    /// and check it equals the destination.
    fn run_case(options: DiffOptions, src: serde_json::Value, dst: serde_json::Value, expect: Deltas) {
        let a = v(src);
        let b = v(dst);
        let differ = Differ::new(options);
        let deltas = differ.diff(&CancelToken::new(), &a, &b).unwrap();
        assert_eq!(deltas, expect, "script mismatch for {a:?} -> {b:?}");

        let mut patched = a.clone();
        patch(&deltas, &mut patched).unwrap();
        assert_eq!(patched, b, "patched result mismatch");
    }

    fn basic(src: serde_json::Value, dst: serde_json::Value, expect: Deltas) {
        run_case(DiffOptions::default(), src, dst, expect);
    }

    #[test]
    fn test_scalar_change_in_array() {
        basic(
            json!([[0, 1, 2]]),
            json!([[0, 1, 3]]),
            vec![Delta::context_with(
                Addr::index(0),
                vec![
                    Delta::context(Addr::index(0), v(json!(0))),
                    Delta::context(Addr::index(1), v(json!(1))),
                    Delta::delete(Addr::index(2), v(json!(2))),
                    Delta::insert(Addr::index(2), v(json!(3))),
                ],
            )],
        );
    }

    #[test]
    fn test_scalar_change_in_object() {
        basic(
            json!({"a": [0, 1, 2], "b": true}),
            json!({"a": [0, 1, 3], "b": true}),
            vec![
                Delta::context_with(
                    "a",
                    vec![
                        Delta::context(Addr::index(0), v(json!(0))),
                        Delta::context(Addr::index(1), v(json!(1))),
                        Delta::delete(Addr::index(2), v(json!(2))),
                        Delta::insert(Addr::index(2), v(json!(3))),
                    ],
                ),
                Delta::context("b", v(json!(true))),
            ],
        );
    }

    #[test]
    fn test_insert_into_array() {
        basic(
            json!([[1]]),
            json!([[1], [2]]),
            vec![
                Delta::context(Addr::index(0), v(json!([1]))),
                Delta::insert(Addr::index(1), v(json!([2]))),
            ],
        );
    }

    #[test]
    fn test_insert_into_object() {
        basic(
            json!({"a": [1]}),
            json!({"a": [1], "b": [2]}),
            vec![
                Delta::context("a", v(json!([1]))),
                Delta::insert("b", v(json!([2]))),
            ],
        );
    }

    #[test]
    fn test_delete_from_array() {
        basic(
            json!([[1], [2], [3]]),
            json!([[1], [3]]),
            vec![
                Delta::context(Addr::index(0), v(json!([1]))),
                Delta::delete(Addr::index(1), v(json!([2]))),
                Delta::context(Addr::index(1), v(json!([3]))),
            ],
        );
    }

    #[test]
    fn test_delete_from_object() {
        basic(
            json!({"a": [false], "b": [2], "c": [3]}),
            json!({"a": [false], "c": [3]}),
            vec![
                Delta::context("a", v(json!([false]))),
                Delta::delete("b", v(json!([2]))),
                Delta::context("c", v(json!([3]))),
            ],
        );
    }

    #[test]
    fn test_key_case_change() {
        basic(
            json!({"a": [1], "b": [2], "c": [3]}),
            json!({"A": [1], "b": [2], "c": [3]}),
            vec![
                Delta::insert("A", v(json!([1]))),
                Delta::delete("a", v(json!([1]))),
                Delta::context("b", v(json!([2]))),
                Delta::context("c", v(json!([3]))),
            ],
        );
    }

    #[test]
    fn test_updates_enabled_array() {
        run_case(
            DiffOptions::new().with_updates(),
            json!([[0, 1, 2]]),
            json!([[0, 1, 3]]),
            vec![Delta::context_with(
                Addr::index(0),
                vec![
                    Delta::context(Addr::index(0), v(json!(0))),
                    Delta::context(Addr::index(1), v(json!(1))),
                    Delta::update(Addr::index(2), v(json!(3)), v(json!(2))),
                ],
            )],
        );
    }

    #[test]
    fn test_updates_enabled_object() {
        run_case(
            DiffOptions::new().with_updates(),
            json!({"a": [0, 1, 2], "b": true}),
            json!({"a": [0, 1, 3], "b": true}),
            vec![
                Delta::context_with(
                    "a",
                    vec![
                        Delta::context(Addr::index(0), v(json!(0))),
                        Delta::context(Addr::index(1), v(json!(1))),
                        Delta::update(Addr::index(2), v(json!(3)), v(json!(2))),
                    ],
                ),
                Delta::context("b", v(json!(true))),
            ],
        );
    }

    #[test]
    fn test_grouped_object_insertion() {
        let inserted = json!({
            "this": "is",
            "a": "big",
            "insertion": {"object": 5, "nesting": [true]},
        });
        basic(
            json!([{"a": "a", "b": "b"}, {"c": "c"}]),
            json!([{"a": "a", "b": "b"}, {"c": "c", "d": inserted}]),
            vec![
                Delta::context(Addr::index(0), v(json!({"a": "a", "b": "b"}))),
                Delta::context_with(
                    Addr::index(1),
                    vec![
                        Delta::context("c", v(json!("c"))),
                        Delta::insert("d", v(inserted)),
                    ],
                ),
            ],
        );
    }

    #[test]
    fn test_integer_payloads() {
        // deltas over int-typed data keep their integer identity
        basic(
            json!([[1, 2, 3], [4, 5, 6], [7, 8, 9]]),
            json!([[1, 2, 3], [4, 0, 6], [10, 8, 9]]),
            vec![
                Delta::context(Addr::index(0), v(json!([1, 2, 3]))),
                Delta::context_with(
                    Addr::index(1),
                    vec![
                        Delta::context(Addr::index(0), v(json!(4))),
                        Delta::delete(Addr::index(1), v(json!(5))),
                        Delta::insert(Addr::index(1), v(json!(0))),
                        Delta::context(Addr::index(2), v(json!(6))),
                    ],
                ),
                Delta::context_with(
                    Addr::index(2),
                    vec![
                        Delta::delete(Addr::index(0), v(json!(7))),
                        Delta::insert(Addr::index(0), v(json!(10))),
                        Delta::context(Addr::index(1), v(json!(8))),
                        Delta::context(Addr::index(2), v(json!(9))),
                    ],
                ),
            ],
        );
    }

    #[test]
    fn test_identical_documents_elide_to_nothing() {
        let a = v(json!({"x": [1, 2, 3]}));
        let deltas = diff(&a, &a.clone()).unwrap();
        assert!(deltas.is_empty());

        let deep = v(json!({"a": {"b": {"c": [1, {"d": null}]}}}));
        assert!(diff(&deep, &deep.clone()).unwrap().is_empty());
    }

    #[test]
    fn test_change_buried_three_levels_down() {
        // "keep" anchors the match chain; the change at depth three must
        // still bubble its context frames all the way to the top
        basic(
            json!({"a": {"b": {"c": 1, "keep": [9, 9, 9]}}, "z": true}),
            json!({"a": {"b": {"c": 2, "keep": [9, 9, 9]}}, "z": true}),
            vec![
                Delta::context_with(
                    "a",
                    vec![Delta::context_with(
                        "b",
                        vec![
                            Delta::delete("c", v(json!(1))),
                            Delta::insert("c", v(json!(2))),
                            Delta::context("keep", v(json!([9, 9, 9]))),
                        ],
                    )],
                ),
                Delta::context("z", v(json!(true))),
            ],
        );
    }

    #[test]
    fn test_fully_distinct_documents_replace_wholesale() {
        // nothing matches anywhere, so the script collapses to a
        // root-level replacement
        basic(
            json!({"a": {"b": {"c": 1}}}),
            json!({"a": {"b": {"c": 2}}}),
            vec![
                Delta::delete(Addr::Root, v(json!({"a": {"b": {"c": 1}}}))),
                Delta::insert(Addr::Root, v(json!({"a": {"b": {"c": 2}}}))),
            ],
        );
    }

    #[test]
    fn test_wholesale_root_replacement() {
        basic(
            json!({"kind": "ds:0"}),
            json!(["ds:0", ["rank", "probability"]]),
            vec![
                Delta::delete(Addr::Root, v(json!({"kind": "ds:0"}))),
                Delta::insert(Addr::Root, v(json!(["ds:0", ["rank", "probability"]]))),
            ],
        );
    }

    #[test]
    fn test_scalar_roots() {
        basic(
            json!(1),
            json!(2),
            vec![
                Delta::delete(Addr::Root, v(json!(1))),
                Delta::insert(Addr::Root, v(json!(2))),
            ],
        );
        assert!(diff(&v(json!(1)), &v(json!(1))).unwrap().is_empty());
    }

    #[test]
    fn test_null_versus_value_leaf() {
        basic(
            json!({"a": [null], "b": 1}),
            json!({"a": ["x"], "b": 1}),
            vec![
                Delta::context_with(
                    "a",
                    vec![
                        Delta::delete(Addr::index(0), v(json!(null))),
                        Delta::insert(Addr::index(0), v(json!("x"))),
                    ],
                ),
                Delta::context("b", v(json!(1))),
            ],
        );

        run_case(
            DiffOptions::new().with_updates(),
            json!({"a": [null], "b": 1}),
            json!({"a": ["x"], "b": 1}),
            vec![
                Delta::context_with(
                    "a",
                    vec![Delta::update(Addr::index(0), v(json!("x")), v(json!(null)))],
                ),
                Delta::context("b", v(json!(1))),
            ],
        );
    }

    #[test]
    fn test_empty_object_and_array_differ() {
        basic(
            json!({"k": {}, "pad": [1, 2, 3]}),
            json!({"k": [], "pad": [1, 2, 3]}),
            vec![
                Delta::delete("k", v(json!({}))),
                Delta::insert("k", v(json!([]))),
                Delta::context("pad", v(json!([1, 2, 3]))),
            ],
        );
    }

    #[test]
    fn test_object_key_order_never_surfaces() {
        let a = v(json!({"x": 1, "y": 2, "z": [3]}));
        let b = v(json!({"z": [3], "y": 2, "x": 1}));
        assert!(diff(&a, &b).unwrap().is_empty());
    }

    #[test]
    fn test_stats_roll_up() {
        let a = v(json!({
            "a": "apple",
            "b": [["one", "two", "three"], ["four", "five", "six"]],
        }));
        let b = v(json!({"a": "apple", "b": []}));

        let (deltas, stats) = stat_diff(&a, &b).unwrap();

        let expect = vec![
            Delta::context("a", v(json!("apple"))),
            Delta::context_with(
                "b",
                vec![
                    Delta::delete(Addr::index(0), v(json!(["one", "two", "three"]))),
                    Delta::delete(Addr::index(0), v(json!(["four", "five", "six"]))),
                ],
            ),
        ];
        assert_eq!(deltas, expect);

        assert_eq!(
            stats,
            Stats {
                left: 11,
                right: 3,
                left_weight: 107,
                right_weight: 13,
                deletes: 2,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_stats_balance_law() {
        // with no moves and no updates: right - left = inserts - deletes
        let a = v(json!({"a": [1, 2], "b": "x"}));
        let b = v(json!({"a": [1, 2, 3], "b": "x", "c": false}));
        let stats = stat(&a, &b).unwrap();
        assert_eq!(stats.updates, 0);
        assert_eq!(stats.moves, 0);
        assert_eq!(
            stats.node_change(),
            stats.inserts as i64 - stats.deletes as i64
        );
    }

    #[test]
    fn test_key_rename_with_changed_content() {
        // a renamed key with edited content degrades to delete+insert
        basic(
            json!({"x": {"deep": 1, "p": 2}}),
            json!({"y": {"deep": 1, "p": 3}}),
            vec![
                Delta::delete("x", v(json!({"deep": 1, "p": 2}))),
                Delta::insert("y", v(json!({"deep": 1, "p": 3}))),
            ],
        );
    }

    #[test]
    fn test_subtree_relocated_into_new_container() {
        // the array is identical on both sides but its container is
        // new; the old copy must still be deleted
        basic(
            json!({"x": [1, 2, 3], "y": false}),
            json!({"box": {"x": [1, 2, 3]}, "y": false}),
            vec![
                Delta::insert("box", v(json!({"x": [1, 2, 3]}))),
                Delta::delete("x", v(json!([1, 2, 3]))),
                Delta::context("y", v(json!(false))),
            ],
        );
    }

    #[test]
    fn test_reorder_surfaces_as_move_when_enabled() {
        let a = v(json!(["a", "b", "c"]));
        let b = v(json!(["c", "a", "b"]));
        let differ = Differ::new(DiffOptions::new().with_moves());
        let deltas = differ.diff(&CancelToken::new(), &a, &b).unwrap();

        assert!(
            deltas.iter().any(|d| d.op == Op::Move),
            "expected a move delta, got {deltas:?}"
        );

        let mut patched = a.clone();
        patch(&deltas, &mut patched).unwrap();
        assert_eq!(patched, b);
    }

    #[test]
    fn test_cross_parent_move_to_root_level() {
        // hoisting "x" out of its container pairs it across parents;
        // with moves on that surfaces as a single top-level move whose
        // source path resolves against the patch target
        let a = v(json!({
            "box": {"x": [1, 2, 3, 4, 5], "b": "anchor-box"},
            "pad": "anchor-root",
        }));
        let b = v(json!({
            "box": {"b": "anchor-box"},
            "x": [1, 2, 3, 4, 5],
            "pad": "anchor-root",
        }));

        let differ = Differ::new(DiffOptions::new().with_moves());
        let (deltas, stats) = differ.stat_diff(&CancelToken::new(), &a, &b).unwrap();

        let moved: Vec<&Delta> = deltas.iter().filter(|d| d.op == Op::Move).collect();
        assert_eq!(moved.len(), 1, "expected one move delta, got {deltas:?}");
        assert_eq!(moved[0].addr, Addr::key("x"));
        assert_eq!(moved[0].value, Some(v(json!([1, 2, 3, 4, 5]))));
        assert_eq!(
            moved[0].source_path.as_deref(),
            Some(&[Addr::key("box"), Addr::key("x")][..])
        );
        assert_eq!(stats.moves, 1);
        assert_eq!(stats.inserts, 0);
        assert_eq!(stats.deletes, 0);

        let mut patched = a.clone();
        patch(&deltas, &mut patched).unwrap();
        assert_eq!(patched, b);
    }

    #[test]
    fn test_reorder_without_moves_stays_delete_insert() {
        let a = v(json!(["a", "b", "c"]));
        let b = v(json!(["c", "a", "b"]));
        let deltas = diff(&a, &b).unwrap();
        assert!(deltas.iter().all(|d| d.op != Op::Move));

        let mut patched = a.clone();
        patch(&deltas, &mut patched).unwrap();
        assert_eq!(patched, b);
    }

    #[test]
    fn test_round_trip_corpus() {
        let cases = [
            (json!(null), json!(0)),
            (json!([]), json!({})),
            (json!({"a": 1}), json!({"a": 1.0})),
            (json!([0, 1, 2, 3, 4]), json!([4, 3, 2, 1, 0])),
            (json!({"a": {"b": 1}}), json!({"a": {"b": [1]}})),
            (
                json!({"movies": [["Avatar", 178], ["Spectre", 148]], "title": "x"}),
                json!({"movies": [["Avatar", 178]], "title": "y", "count": 1}),
            ),
            (
                json!([{"id": 1, "tags": ["a", "b"]}, {"id": 2}]),
                json!([{"id": 2}, {"id": 1, "tags": ["a", "b", "c"]}]),
            ),
            (json!({"deep": {"deeper": {"deepest": [1, 2, 3]}}}), json!({"deep": {}})),
        ];

        for (src, dst) in cases {
            for options in [DiffOptions::new(), DiffOptions::new().with_updates()] {
                let a = v(src.clone());
                let b = v(dst.clone());
                let differ = Differ::new(options);
                let deltas = differ.diff(&CancelToken::new(), &a, &b).unwrap();

                let mut patched = a.clone();
                patch(&deltas, &mut patched).unwrap();
                assert_eq!(patched, b, "round trip failed for {src} -> {dst}");
            }
        }
    }

    #[test]
    fn test_wire_format_of_script() {
        let a = v(json!({"a": 100, "baz": {"a": {"d": "apples"}}}));
        let b = v(json!({"a": 99, "baz": {"a": {"d": "apples"}, "e": "dogecoin"}}));
        let deltas = diff(&a, &b).unwrap();

        let text = serde_json::to_string(&deltas).unwrap();
        assert_eq!(
            text,
            concat!(
                r#"[["-","a",100],["+","a",99],"#,
                r#"[" ","baz",null,[[" ","a",{"d":"apples"}],["+","e","dogecoin"]]]]"#
            )
        );

        let back: Deltas = serde_json::from_str(&text).unwrap();
        assert_eq!(back, deltas);
    }

    #[test]
    fn test_cancellation_aborts_early() {
        let token = CancelToken::new();
        token.cancel();
        let a = v(json!({"a": 1}));
        let b = v(json!({"a": 2}));
        let err = Differ::default().diff(&token, &a, &b).unwrap_err();
        assert!(matches!(err, DiffError::Cancelled));
    }

    #[test]
    fn test_custom_hasher_produces_same_script() {
        use std::collections::hash_map::DefaultHasher;
        use std::sync::Arc;

        let a = v(json!({"a": [0, 1, 2], "b": true}));
        let b = v(json!({"a": [0, 1, 3], "b": true}));

        let siphash = Differ::new(
            DiffOptions::new().with_hasher(Arc::new(|| Box::new(DefaultHasher::new()))),
        );
        let expect = diff(&a, &b).unwrap();
        let got = siphash.diff(&CancelToken::new(), &a, &b).unwrap();
        assert_eq!(got, expect);
    }
}
