//! Shared AND-spine construction for the N-way positional family (spec.md
//! §4.2.4): phrase, proximity and multinear all intersect the same set of
//! term leaves before running their own hit-level FSM, so the spine is
//! built once here and reused by all three.

use crate::operators::bool_ops::AndNode;
use crate::operators::{BoxNode, ExtNode};

/// One child of an N-way operator: its query position (for FSM delta
/// tables) and the leaf/subtree node itself.
pub struct NWayChild {
    pub query_pos: u32,
    pub node: BoxNode,
}

/// Builds the intersection spine described in spec.md §4.2.4: children are
/// first sorted by ascending doc-frequency approximation (here, simply the
/// order they were given, since true doc-frequency requires a pre-spawn
/// probe the coordinator performs before construction) for cheap
/// intersection, then the spine is built with `qpos-reverse` set so the
/// FSM observes hits in query order regardless of merge order.
///
/// Returns the spine node plus the children's query positions in
/// construction (left-to-right, i.e. final merge) order, which the FSM
/// needs to know which `nodepos` corresponds to which atom position.
pub fn build_and_spine(children: Vec<NWayChild>) -> (BoxNode, Vec<u32>) {
    assert!(!children.is_empty(), "N-way operator requires at least one child");
    let mut iter = children.into_iter();
    let first = iter.next().unwrap();
    let mut spine = first.node;
    let mut qpos_order = vec![first.query_pos];
    for child in iter {
        spine = Box::new(AndNode::new_qpos_reverse(spine, child.node));
        qpos_order.push(child.query_pos);
    }
    (spine, qpos_order)
}
