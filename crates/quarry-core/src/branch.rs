//! Branch tags and the merge pass.
//!
//! Writes performed under an unresolved condition are tagged with the branch
//! that produced them instead of clobbering the parent world. When every arm
//! of a condition has run, [`merge`] folds the tagged `NAME_TO_OBJ` edges one
//! level outward: an addition in any arm survives (retagged to the enclosing
//! branch), and a deletion only takes effect if every arm deleted.

use std::collections::HashMap;

use crate::graph::{EdgeKind, Graph, NodeId};

/// One fork point in the program, minted per executed conditional statement
/// (a re-entered `if` gets a fresh point each time).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BranchPoint(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mark {
    Addition,
    Deletion,
    Loop,
    ParentLoop,
    LoopCreated,
}

impl Mark {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mark::Addition => "A",
            Mark::Deletion => "D",
            Mark::Loop => "L",
            Mark::ParentLoop => "P",
            Mark::LoopCreated => "C",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BranchTag {
    pub point: BranchPoint,
    pub branch: u32,
    pub mark: Option<Mark>,
}

impl BranchTag {
    pub fn choice(point: BranchPoint, branch: u32) -> Self {
        Self {
            point,
            branch,
            mark: None,
        }
    }

    pub fn with_mark(&self, mark: Mark) -> Self {
        Self {
            mark: Some(mark),
            ..*self
        }
    }

    pub fn same_choice(&self, other: &BranchTag) -> bool {
        self.point == other.point && self.branch == other.branch
    }
}

/// The stack of branch choices the interpreter is currently inside.
#[derive(Debug, Clone, Default)]
pub struct BranchPath(Vec<BranchTag>);

impl BranchPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn tags(&self) -> &[BranchTag] {
        &self.0
    }

    /// A copy of this path extended by one tag.
    pub fn with(&self, tag: BranchTag) -> Self {
        let mut next = self.clone();
        next.0.push(tag);
        next
    }

    /// The innermost plain choice tag, i.e. the branch any new write should
    /// be attributed to. Loop marks are skipped.
    pub fn last_choice(&self) -> Option<BranchTag> {
        self.0.iter().rev().find(|t| t.mark.is_none()).copied()
    }

    /// Whether this path took `(point, branch)`, with any mark.
    pub fn contains_choice(&self, point: BranchPoint, branch: u32) -> bool {
        self.0
            .iter()
            .any(|t| t.point == point && t.branch == branch)
    }

    /// Whether an edge tagged `tag` is visible from this path: matching
    /// choices show additions and apply deletions; sibling branches of the
    /// same point are invisible.
    pub fn sees(&self, tag: &BranchTag) -> bool {
        self.contains_choice(tag.point, tag.branch)
    }

    /// Loop-created objects are hidden from sibling iterations of the same
    /// loop; any other vantage point sees them.
    pub fn sees_loop_tags(&self, for_tags: &[BranchTag]) -> bool {
        for_tags
            .iter()
            .filter(|t| t.mark == Some(Mark::LoopCreated))
            .all(|t| {
                !self.0.iter().any(|p| {
                    p.point == t.point
                        && p.branch != t.branch
                        && matches!(p.mark, Some(Mark::Loop | Mark::ParentLoop))
                })
            })
    }

    /// Current loop tags, stamped onto objects created inside the loop body.
    pub fn loop_tags(&self) -> Vec<BranchTag> {
        self.0
            .iter()
            .filter(|t| matches!(t.mark, Some(Mark::Loop | Mark::ParentLoop)))
            .map(|t| t.with_mark(Mark::LoopCreated))
            .collect()
    }
}

/// Fold all `NAME_TO_OBJ` edges tagged at `point` into the enclosing branch.
///
/// `num_branches` counts every arm including the hidden else, so a binding
/// deleted in the only taken arm does not fold into an unconditional delete.
/// Folds one level per call; nested conditionals merge inside-out.
pub fn merge(g: &mut Graph, point: BranchPoint, num_branches: u32, parent: Option<BranchTag>) {
    // group tagged edges by (name node, obj)
    let mut groups: HashMap<(NodeId, NodeId), (Vec<u32>, Vec<u32>, Vec<crate::graph::EdgeId>)> =
        HashMap::new();
    for (eid, edge) in g.live_edges() {
        if edge.kind != EdgeKind::NameToObj {
            continue;
        }
        let Some(tag) = edge.branch else { continue };
        if tag.point != point {
            continue;
        }
        let entry = groups.entry((edge.from, edge.to)).or_default();
        match tag.mark {
            Some(Mark::Deletion) => {
                if !entry.1.contains(&tag.branch) {
                    entry.1.push(tag.branch);
                }
            }
            _ => {
                if !entry.0.contains(&tag.branch) {
                    entry.0.push(tag.branch);
                }
            }
        }
        entry.2.push(eid);
    }

    for ((name_node, obj), (additions, deletions, edges)) in groups {
        for eid in edges {
            g.remove_edge(eid);
        }
        if !additions.is_empty() {
            let folded = parent.map(|p| p.with_mark(Mark::Addition));
            let exists = g
                .edges_between(name_node, obj, EdgeKind::NameToObj)
                .into_iter()
                .any(|e| g.edge(e).branch == folded);
            if !exists {
                g.add_edge_with(name_node, obj, EdgeKind::NameToObj, folded, None);
            }
        }
        if deletions.len() as u32 == num_branches {
            match parent {
                Some(p) => {
                    // cancel our own addition in the parent branch if there
                    // is one, otherwise record the deletion a level up
                    let own_addition: Vec<_> = g
                        .edges_between(name_node, obj, EdgeKind::NameToObj)
                        .into_iter()
                        .filter(|&e| {
                            g.edge(e)
                                .branch
                                .is_some_and(|t| t.same_choice(&p) && t.mark == Some(Mark::Addition))
                        })
                        .collect();
                    if own_addition.is_empty() {
                        g.add_edge_with(
                            name_node,
                            obj,
                            EdgeKind::NameToObj,
                            Some(p.with_mark(Mark::Deletion)),
                            None,
                        );
                    } else {
                        for e in own_addition {
                            g.remove_edge(e);
                        }
                    }
                }
                None => {
                    for e in g.edges_between(name_node, obj, EdgeKind::NameToObj) {
                        if g.edge(e).branch.is_none() {
                            g.remove_edge(e);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{JsType, NodeBody, NameNode, ObjNode, PropKey};

    fn name_and_objs(g: &mut Graph, n: usize) -> (NodeId, Vec<NodeId>) {
        let name = g.add_node(NodeBody::Name(NameNode {
            name: PropKey::Str("x".into()),
        }));
        let objs = (0..n)
            .map(|_| g.add_node(NodeBody::Object(ObjNode::new(JsType::Object))))
            .collect();
        (name, objs)
    }

    fn visible(g: &Graph, name: NodeId, path: &BranchPath) -> Vec<NodeId> {
        let mut out = Vec::new();
        for eid in g.out_edges(name, EdgeKind::NameToObj) {
            let edge = g.edge(eid);
            match edge.branch {
                None => {
                    if !out.contains(&edge.to) {
                        out.push(edge.to);
                    }
                }
                Some(tag) if path.sees(&tag) => match tag.mark {
                    Some(Mark::Deletion) => out.retain(|&o| o != edge.to),
                    _ => {
                        if !out.contains(&edge.to) {
                            out.push(edge.to);
                        }
                    }
                },
                Some(_) => {}
            }
        }
        out
    }

    #[test]
    fn addition_in_one_branch_survives_merge() {
        let mut g = Graph::new();
        let (name, objs) = name_and_objs(&mut g, 1);
        let point = BranchPoint(0);
        let tag = BranchTag::choice(point, 0).with_mark(Mark::Addition);
        g.add_edge_with(name, objs[0], EdgeKind::NameToObj, Some(tag), None);

        merge(&mut g, point, 2, None);
        assert_eq!(visible(&g, name, &BranchPath::new()), vec![objs[0]]);
    }

    #[test]
    fn deletion_must_happen_in_every_branch() {
        let mut g = Graph::new();
        let (name, objs) = name_and_objs(&mut g, 1);
        g.add_edge(name, objs[0], EdgeKind::NameToObj);
        let point = BranchPoint(0);
        let del = BranchTag::choice(point, 0).with_mark(Mark::Deletion);
        g.add_edge_with(name, objs[0], EdgeKind::NameToObj, Some(del), None);

        // hidden else (branch 1) did not delete, so the binding survives
        merge(&mut g, point, 2, None);
        assert_eq!(visible(&g, name, &BranchPath::new()), vec![objs[0]]);
    }

    #[test]
    fn deletion_in_all_branches_removes_binding() {
        let mut g = Graph::new();
        let (name, objs) = name_and_objs(&mut g, 1);
        g.add_edge(name, objs[0], EdgeKind::NameToObj);
        let point = BranchPoint(0);
        for b in 0..2 {
            let del = BranchTag::choice(point, b).with_mark(Mark::Deletion);
            g.add_edge_with(name, objs[0], EdgeKind::NameToObj, Some(del), None);
        }

        merge(&mut g, point, 2, None);
        assert!(visible(&g, name, &BranchPath::new()).is_empty());
    }

    #[test]
    fn nested_deletion_cancels_parent_addition() {
        // outer branch adds the binding, inner conditional deletes it in
        // both arms; after both merges the binding must be gone even at the
        // outer level
        let mut g = Graph::new();
        let (name, objs) = name_and_objs(&mut g, 1);
        let outer = BranchPoint(0);
        let inner = BranchPoint(1);
        let outer_tag = BranchTag::choice(outer, 0);
        g.add_edge_with(
            name,
            objs[0],
            EdgeKind::NameToObj,
            Some(outer_tag.with_mark(Mark::Addition)),
            None,
        );
        for b in 0..2 {
            let del = BranchTag::choice(inner, b).with_mark(Mark::Deletion);
            g.add_edge_with(name, objs[0], EdgeKind::NameToObj, Some(del), None);
        }

        merge(&mut g, inner, 2, Some(outer_tag));
        merge(&mut g, outer, 2, None);
        assert!(
            visible(&g, name, &BranchPath::new()).is_empty(),
            "inner deletion should cancel the outer addition"
        );
    }

    #[test]
    fn three_level_fold_retags_one_level_at_a_time() {
        let mut g = Graph::new();
        let (name, objs) = name_and_objs(&mut g, 1);
        let (p0, p1, p2) = (BranchPoint(0), BranchPoint(1), BranchPoint(2));
        let t0 = BranchTag::choice(p0, 0);
        let t1 = BranchTag::choice(p1, 1);
        let add = BranchTag::choice(p2, 0).with_mark(Mark::Addition);
        g.add_edge_with(name, objs[0], EdgeKind::NameToObj, Some(add), None);

        merge(&mut g, p2, 2, Some(t1));
        // after the innermost fold, the edge is tagged at the middle level
        let path = BranchPath::new().with(t0).with(t1);
        assert_eq!(visible(&g, name, &path), vec![objs[0]]);
        assert!(visible(&g, name, &BranchPath::new()).is_empty());

        merge(&mut g, p1, 2, Some(t0));
        merge(&mut g, p0, 2, None);
        assert_eq!(visible(&g, name, &BranchPath::new()), vec![objs[0]]);
    }

    #[test]
    fn sibling_branch_edits_are_invisible() {
        let mut g = Graph::new();
        let (name, objs) = name_and_objs(&mut g, 1);
        let point = BranchPoint(7);
        let add = BranchTag::choice(point, 0).with_mark(Mark::Addition);
        g.add_edge_with(name, objs[0], EdgeKind::NameToObj, Some(add), None);

        let other_arm = BranchPath::new().with(BranchTag::choice(point, 1));
        assert!(visible(&g, name, &other_arm).is_empty());
        let same_arm = BranchPath::new().with(BranchTag::choice(point, 0));
        assert_eq!(visible(&g, name, &same_arm), vec![objs[0]]);
    }
}
