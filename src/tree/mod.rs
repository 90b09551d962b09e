//! The committed output tree and its reconciler.

pub mod node;
pub mod reconcile;

pub use node::{
    Body, FadeMark, Island, IslandKind, Node, NodeId, Part, RenderStatus, TransformHandle,
    TransformState,
};
pub use reconcile::{Mutation, Reconciler};
