//! Positional reconciliation of a committed sibling list against a candidate.
//!
//! Children are compared index by index. Islands that agree on kind and key
//! are patched in place so their node ids, transform state and host-side
//! listeners survive the pass; everything else is replaced only when it
//! structurally differs.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use crate::core::PassContext;
use crate::tree::node::{Body, IslandKind, Node, NodeId, Part};

/// One applied change, in application order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Append { index: usize, id: NodeId },
    Replace { index: usize, old: NodeId, new: NodeId },
    Remove { index: usize, id: NodeId },
    /// Island attributes or bookkeeping changed; no child was touched.
    PatchAttrs { index: usize, id: NodeId },
    /// Header or body content of an island was rewritten in place.
    PatchPart { index: usize, id: NodeId, part: Part },
    InsertPreview { index: usize, id: NodeId },
    RemovePreview { index: usize, id: NodeId },
    SwapPreview { index: usize, old: NodeId, new: NodeId },
    PatchTable { index: usize, id: NodeId },
}

type Cleanup = Box<dyn FnOnce() + Send>;

#[derive(Default)]
pub struct Reconciler {
    committed: Vec<Node>,
    cleanups: HashMap<NodeId, Cleanup>,
    degraded: usize,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("committed", &self.committed.len())
            .field("cleanups", &self.cleanups.len())
            .field("degraded", &self.degraded)
            .finish()
    }
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn committed(&self) -> &[Node] {
        &self.committed
    }

    pub fn committed_mut(&mut self) -> &mut [Node] {
        &mut self.committed
    }

    /// Number of nodes that fell back to wholesale replacement after a panic.
    pub fn degraded(&self) -> usize {
        self.degraded
    }

    /// Attaches teardown for host-side listeners on `id`. It runs exactly once,
    /// when that node leaves the committed tree.
    pub fn register_cleanup(&mut self, id: NodeId, cleanup: impl FnOnce() + Send + 'static) {
        if let Some(previous) = self.cleanups.insert(id, Box::new(cleanup)) {
            run_cleanup(id, previous);
        }
    }

    /// Drops the committed tree and releases every registered cleanup.
    pub fn reset(&mut self) {
        self.committed.clear();
        for (id, cleanup) in self.cleanups.drain() {
            run_cleanup(id, cleanup);
        }
    }

    pub fn reconcile(&mut self, candidate: Vec<Node>, context: PassContext) -> Vec<Mutation> {
        let mut mutations = Vec::new();
        let candidate_len = candidate.len();

        for (index, next) in candidate.into_iter().enumerate() {
            if index >= self.committed.len() {
                mutations.push(Mutation::Append { index, id: next.id });
                self.committed.push(next);
                continue;
            }

            let mut patched = Vec::new();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                patch_node(
                    &mut self.committed[index],
                    &next,
                    index,
                    context,
                    &mut patched,
                )
            }));

            match outcome {
                Ok(Patch::Kept) => {
                    for id in released_ids(&patched) {
                        self.release(id);
                    }
                    mutations.append(&mut patched);
                }
                Ok(Patch::Replace) => self.replace(index, next, &mut mutations),
                Err(_) => {
                    self.degraded += 1;
                    tracing::warn!(index, "node patch panicked; replacing wholesale");
                    // Previews already swapped out by the aborted patch are no
                    // longer reachable from the committed node.
                    for id in released_ids(&patched) {
                        self.release(id);
                    }
                    self.replace(index, next, &mut mutations);
                }
            }
        }

        while self.committed.len() > candidate_len {
            let index = self.committed.len() - 1;
            if let Some(old) = self.committed.pop() {
                mutations.push(Mutation::Remove { index, id: old.id });
                self.release_subtree(&old);
            }
        }

        mutations
    }

    fn replace(&mut self, index: usize, next: Node, mutations: &mut Vec<Mutation>) {
        let old = std::mem::replace(&mut self.committed[index], next);
        mutations.push(Mutation::Replace {
            index,
            old: old.id,
            new: self.committed[index].id,
        });
        self.release_subtree(&old);
    }

    fn release_subtree(&mut self, node: &Node) {
        let mut ids = Vec::new();
        node.walk(&mut |visited| ids.push(visited.id));
        for id in ids {
            self.release(id);
        }
    }

    fn release(&mut self, id: NodeId) {
        if let Some(cleanup) = self.cleanups.remove(&id) {
            run_cleanup(id, cleanup);
        }
    }
}

impl Drop for Reconciler {
    fn drop(&mut self) {
        self.reset();
    }
}

fn run_cleanup(id: NodeId, cleanup: Cleanup) {
    if panic::catch_unwind(AssertUnwindSafe(cleanup)).is_err() {
        tracing::warn!(node = id.raw(), "cleanup panicked");
    }
}

/// Preview nodes discarded by a patch whose cleanups must run.
fn released_ids(mutations: &[Mutation]) -> Vec<NodeId> {
    mutations
        .iter()
        .filter_map(|mutation| match mutation {
            Mutation::SwapPreview { old, .. } => Some(*old),
            Mutation::RemovePreview { id, .. } => Some(*id),
            _ => None,
        })
        .collect()
}

enum Patch {
    Kept,
    Replace,
}

fn patch_node(
    committed: &mut Node,
    next: &Node,
    index: usize,
    context: PassContext,
    mutations: &mut Vec<Mutation>,
) -> Patch {
    let islands = committed
        .island
        .as_ref()
        .zip(next.island.as_ref())
        .map(|(old, new)| (old.kind, new.kind, old.key == new.key));

    match islands {
        Some((old, new, true)) if old == new => match old {
            IslandKind::Table => patch_table(committed, next, index, mutations),
            IslandKind::CodeShell | IslandKind::Diagram | IslandKind::Document => {
                patch_island(committed, next, index, context, mutations)
            }
        },
        Some((IslandKind::Table, IslandKind::Table, false))
            if committed.tag == next.tag && committed.attrs == next.attrs =>
        {
            patch_table(committed, next, index, mutations)
        }
        // Only the fade mark may differ; keep the committed node.
        _ if committed.same_structure(next) => Patch::Kept,
        _ => Patch::Replace,
    }
}

fn patch_table(committed: &mut Node, next: &Node, index: usize, mutations: &mut Vec<Mutation>) -> Patch {
    let (Some(old_inner), Some(new_inner)) = (
        committed.part_index(Part::TableInner),
        next.find_part(Part::TableInner),
    ) else {
        return Patch::Replace;
    };
    if committed.tag != next.tag {
        return Patch::Replace;
    }

    let id = committed.id;
    if let Some(children) = committed.child_nodes_mut() {
        let inner = &mut children[old_inner];
        if inner.body != new_inner.body || inner.source != new_inner.source {
            inner.body = new_inner.body.clone();
            inner.source = new_inner.source.clone();
            inner.status = new_inner.status;
            mutations.push(Mutation::PatchTable { index, id });
        }
    }
    sync_bookkeeping(committed, next, index, mutations);
    Patch::Kept
}

fn patch_island(
    committed: &mut Node,
    next: &Node,
    index: usize,
    context: PassContext,
    mutations: &mut Vec<Mutation>,
) -> Patch {
    if committed.child_nodes_mut().is_none() || !matches!(next.body, Body::Children(_)) {
        return Patch::Replace;
    }

    let source_changed = committed.source != next.source;

    patch_header(committed, next, index, mutations);
    patch_body(committed, next, index, source_changed, mutations);
    patch_preview(committed, next, index, source_changed, context, mutations);
    #[cfg(test)]
    fault::trip();
    sync_bookkeeping(committed, next, index, mutations);
    Patch::Kept
}

fn patch_header(committed: &mut Node, next: &Node, index: usize, mutations: &mut Vec<Mutation>) {
    let id = committed.id;
    let Some(new_header) = next.find_part(Part::Header) else {
        return;
    };
    let Some(old_index) = committed.part_index(Part::Header) else {
        return;
    };
    if let Some(children) = committed.child_nodes_mut() {
        let header = &mut children[old_index];
        if !header.same_structure(new_header) {
            copy_content(header, new_header);
            mutations.push(Mutation::PatchPart {
                index,
                id,
                part: Part::Header,
            });
        }
    }
}

fn patch_body(
    committed: &mut Node,
    next: &Node,
    index: usize,
    source_changed: bool,
    mutations: &mut Vec<Mutation>,
) {
    let id = committed.id;
    let new_body = next.find_part(Part::Body);
    let old_index = committed.part_index(Part::Body);

    match (old_index, new_body) {
        (Some(old_index), Some(new_body)) => {
            if let Some(children) = committed.child_nodes_mut() {
                let body = &mut children[old_index];
                let status_changed = body.status != new_body.status;
                if source_changed || status_changed {
                    copy_content(body, new_body);
                    mutations.push(Mutation::PatchPart {
                        index,
                        id,
                        part: Part::Body,
                    });
                }
            }
        }
        (None, Some(new_body)) => {
            if let Some(children) = committed.child_nodes_mut() {
                children.push(new_body.clone());
                mutations.push(Mutation::PatchPart {
                    index,
                    id,
                    part: Part::Body,
                });
            }
        }
        (Some(old_index), None) => {
            if let Some(children) = committed.child_nodes_mut() {
                children.remove(old_index);
                mutations.push(Mutation::PatchPart {
                    index,
                    id,
                    part: Part::Body,
                });
            }
        }
        (None, None) => {}
    }
}

fn patch_preview(
    committed: &mut Node,
    next: &Node,
    index: usize,
    source_changed: bool,
    context: PassContext,
    mutations: &mut Vec<Mutation>,
) {
    let streaming = context.phase.is_streaming();
    let old_index = committed.part_index(Part::Preview);
    let new_preview = next.find_part(Part::Preview);
    let Some(children) = committed.child_nodes_mut() else {
        return;
    };

    match (old_index, new_preview) {
        (Some(old_index), Some(new_preview)) => {
            let old = &children[old_index];
            let unchanged = !source_changed && old.status.is_success() && !context.phase_transition;
            if unchanged || old.same_structure(new_preview) {
                return;
            }

            let keep_old = !new_preview.status.is_success() && old.status.is_success() && streaming;
            if keep_old {
                return;
            }

            let mut replacement = new_preview.clone();
            if let Some(handle) = old.transform.clone() {
                replacement.transform = Some(handle);
            }
            let old_id = old.id;
            let new_id = replacement.id;
            children[old_index] = replacement;
            mutations.push(Mutation::SwapPreview {
                index,
                old: old_id,
                new: new_id,
            });
        }
        (None, Some(new_preview)) => {
            let at = children
                .iter()
                .position(|child| child.part == Some(Part::Header))
                .map(|header| header + 1)
                .unwrap_or(0);
            let preview = new_preview.clone();
            let id = preview.id;
            children.insert(at, preview);
            mutations.push(Mutation::InsertPreview { index, id });
        }
        (Some(old_index), None) => {
            if streaming && children[old_index].status.is_success() {
                return;
            }
            let removed = children.remove(old_index);
            mutations.push(Mutation::RemovePreview {
                index,
                id: removed.id,
            });
        }
        (None, None) => {}
    }
}

/// Overwrites renderable content while keeping the target's id and handle.
fn copy_content(target: &mut Node, source: &Node) {
    target.tag = source.tag;
    target.attrs = source.attrs.clone();
    target.body = source.body.clone();
    target.source = source.source.clone();
    target.status = source.status;
    target.span = source.span.clone();
}

fn sync_bookkeeping(committed: &mut Node, next: &Node, index: usize, mutations: &mut Vec<Mutation>) {
    if committed.attrs != next.attrs {
        committed.attrs = next.attrs.clone();
        mutations.push(Mutation::PatchAttrs {
            index,
            id: committed.id,
        });
    }
    committed.island = next.island.clone();
    committed.source = next.source.clone();
    committed.status = next.status;
    committed.span = next.span.clone();
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::core::Phase;
    use crate::tree::node::{RenderStatus, TransformHandle, TransformState};

    fn diagram(source: &str, preview: Option<(&str, RenderStatus)>) -> Node {
        let mut children = vec![Node::new("div").part(Part::Header).text("mermaid")];
        if let Some((markup, status)) = preview {
            children.push(
                Node::new("div")
                    .part(Part::Preview)
                    .markup(markup)
                    .status(status)
                    .transform(TransformHandle::new()),
            );
        }
        children.push(Node::new("pre").part(Part::Body).text(source));
        Node::new("div")
            .island(IslandKind::Diagram, "diagram-0")
            .source(source)
            .children(children)
    }

    fn preview_of(node: &Node) -> Option<&Node> {
        node.find_part(Part::Preview)
    }

    #[test]
    fn first_pass_appends_everything() {
        let mut reconciler = Reconciler::new();
        let mutations = reconciler.reconcile(
            vec![Node::new("p").text("a"), Node::new("p").text("b")],
            PassContext::streaming(),
        );
        assert_eq!(mutations.len(), 2);
        assert!(matches!(mutations[0], Mutation::Append { index: 0, .. }));
    }

    #[test]
    fn unchanged_successful_island_is_untouched() {
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(vec![diagram("a", Some(("<svg>a</svg>", RenderStatus::Ready)))], PassContext::streaming());
        let island_id = reconciler.committed()[0].id;
        let preview_id = preview_of(&reconciler.committed()[0]).map(|node| node.id);

        let mutations = reconciler.reconcile(
            vec![diagram("a", Some(("<svg>a</svg>", RenderStatus::Ready)))],
            PassContext::streaming(),
        );

        assert!(mutations.is_empty());
        assert_eq!(reconciler.committed()[0].id, island_id);
        assert_eq!(preview_of(&reconciler.committed()[0]).map(|node| node.id), preview_id);
    }

    #[test]
    fn failed_preview_never_replaces_a_good_one_while_streaming() {
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(vec![diagram("a", Some(("<svg>a</svg>", RenderStatus::Ready)))], PassContext::streaming());

        reconciler.reconcile(
            vec![diagram("a -", Some(("", RenderStatus::Pending)))],
            PassContext::streaming(),
        );
        let committed = &reconciler.committed()[0];
        assert_eq!(preview_of(committed).map(|node| node.status), Some(RenderStatus::Ready));
        assert_eq!(committed.source.as_deref(), Some("a -"));

        reconciler.reconcile(
            vec![diagram("a -", Some(("error", RenderStatus::Failed)))],
            PassContext {
                phase: Phase::Finished,
                phase_transition: true,
            },
        );
        let committed = &reconciler.committed()[0];
        assert_eq!(preview_of(committed).map(|node| node.status), Some(RenderStatus::Failed));
    }

    #[test]
    fn swapped_preview_keeps_transform_and_runs_cleanup() {
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(vec![diagram("a", Some(("<svg>a</svg>", RenderStatus::Ready)))], PassContext::streaming());
        let old_preview = preview_of(&reconciler.committed()[0]).cloned().expect("preview");
        let handle = old_preview.transform.clone().expect("handle");
        handle.set(TransformState {
            pan_x: 10.0,
            pan_y: 5.0,
            zoom: 2.0,
        });

        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        reconciler.register_cleanup(old_preview.id, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mutations = reconciler.reconcile(
            vec![diagram("b", Some(("<svg>b</svg>", RenderStatus::Ready)))],
            PassContext::streaming(),
        );

        assert!(mutations
            .iter()
            .any(|mutation| matches!(mutation, Mutation::SwapPreview { old, .. } if *old == old_preview.id)));
        let new_preview = preview_of(&reconciler.committed()[0]).expect("preview");
        assert_ne!(new_preview.id, old_preview.id);
        assert!(new_preview.transform.as_ref().is_some_and(|next| next.ptr_eq(&handle)));
        assert_eq!(released.load(Ordering::SeqCst), 1);

        reconciler.reset();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_patch_degrades_to_a_replacement() {
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(vec![diagram("a", Some(("", RenderStatus::Pending)))], PassContext::streaming());
        let island = reconciler.committed()[0].id;
        let old_preview = preview_of(&reconciler.committed()[0]).map(|node| node.id).expect("preview");

        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        reconciler.register_cleanup(old_preview, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // The patch swaps the pending preview, then fails before finishing.
        let next = diagram("b", Some(("<svg>b</svg>", RenderStatus::Ready)));
        let next_id = next.id;
        fault::arm();
        let mutations = reconciler.reconcile(vec![next], PassContext::streaming());

        assert_eq!(
            mutations,
            vec![Mutation::Replace {
                index: 0,
                old: island,
                new: next_id
            }]
        );
        assert_eq!(reconciler.degraded(), 1);
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(reconciler.committed()[0].id, next_id);

        let mutations = reconciler.reconcile(
            vec![diagram("b", Some(("<svg>b</svg>", RenderStatus::Ready)))],
            PassContext::streaming(),
        );
        assert!(mutations.is_empty());
        assert_eq!(reconciler.committed()[0].id, next_id);
        assert_eq!(reconciler.degraded(), 1);

        reconciler.reset();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn preview_is_inserted_after_header_and_removed_when_gone() {
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(vec![diagram("a", None)], PassContext::streaming());

        let mutations = reconciler.reconcile(
            vec![diagram("a", Some(("<svg/>", RenderStatus::Ready)))],
            PassContext::streaming(),
        );
        assert!(matches!(mutations[0], Mutation::InsertPreview { index: 0, .. }));
        assert_eq!(reconciler.committed()[0].part_index(Part::Preview), Some(1));

        reconciler.reconcile(vec![diagram("a", None)], PassContext::finished());
        assert!(preview_of(&reconciler.committed()[0]).is_none());
    }

    #[test]
    fn table_inner_is_patched_and_wrapper_kept() {
        let table = |markup: &str| {
            Node::new("div")
                .class("table-wrapper")
                .island(IslandKind::Table, "table-0")
                .children(vec![Node::new("table").part(Part::TableInner).markup(markup)])
        };
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(vec![table("<tr>1</tr>")], PassContext::streaming());
        let wrapper = reconciler.committed()[0].id;

        let mutations = reconciler.reconcile(vec![table("<tr>1</tr><tr>2</tr>")], PassContext::streaming());
        assert_eq!(mutations, vec![Mutation::PatchTable { index: 0, id: wrapper }]);
        assert_eq!(reconciler.committed()[0].id, wrapper);
    }

    #[test]
    fn plain_nodes_are_replaced_only_when_different() {
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(vec![Node::new("p").text("a")], PassContext::streaming());
        let first = reconciler.committed()[0].id;

        assert!(reconciler
            .reconcile(vec![Node::new("p").text("a")], PassContext::streaming())
            .is_empty());
        assert_eq!(reconciler.committed()[0].id, first);

        let mutations = reconciler.reconcile(vec![Node::new("p").text("ab")], PassContext::streaming());
        assert!(matches!(mutations[0], Mutation::Replace { old, .. } if old == first));
    }

    #[test]
    fn trailing_nodes_are_removed() {
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(
            vec![Node::new("p").text("a"), Node::new("p").text("b"), Node::new("p").text("c")],
            PassContext::streaming(),
        );
        let mutations = reconciler.reconcile(vec![Node::new("p").text("a")], PassContext::streaming());
        assert_eq!(mutations.len(), 2);
        assert!(matches!(mutations[0], Mutation::Remove { index: 2, .. }));
        assert!(matches!(mutations[1], Mutation::Remove { index: 1, .. }));
        assert_eq!(reconciler.committed().len(), 1);
    }

    #[test]
    fn different_island_keys_replace_wholesale() {
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(vec![diagram("a", None)], PassContext::streaming());
        let mut other = diagram("a", None);
        other.island = Some(crate::tree::node::Island {
            kind: IslandKind::Diagram,
            key: "diagram-1".to_string(),
        });
        let mutations = reconciler.reconcile(vec![other], PassContext::streaming());
        assert!(matches!(mutations[0], Mutation::Replace { .. }));
    }
}
