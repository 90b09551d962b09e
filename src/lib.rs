//! Streaming rich-content rendering and reconciliation.
//!
//! Invariant: the committed output tree of a message is only mutated by
//! [`Reconciler::reconcile`], one pass at a time.
//!
//! # Public API Overview
//! - Segment a growing buffer with [`Segmenter`] (math, fenced code, diagrams,
//!   embedded documents, prose).
//! - Render a pass into a candidate tree with [`DeferredRenderer`], backed by
//!   optional engines collected in an [`EngineSet`].
//! - Patch the committed tree with [`Reconciler`]; islands keep their node
//!   identity, pan/zoom state and host listeners across passes.
//! - Drive a turn from transport records with [`StreamSession`] and [`pump`],
//!   feeding a [`SessionHost`] such as [`Transcript`].

pub mod config;
pub mod logging;

pub mod core;
pub mod render;
pub mod runtime;
pub mod tree;
pub mod widgets;

/// Text-level scanning, normalization and segmentation.
pub use crate::core::language::{resolve_language, Language};
pub use crate::core::normalize::normalize;
pub use crate::core::scanner::{find_closing, find_closing_streaming, find_next, is_escaped};
pub use crate::core::segment::{segment_text, Segment, SegmentKey, SegmentKind, SegmentPass, Segmenter};
pub use crate::core::table_guard::{guard_tables, TABLE_PLACEHOLDER};
pub use crate::core::{PassContext, Phase};

/// Rendering engines, cache and the deferred renderer.
pub use crate::render::{
    ContentEngine, DeferredRenderer, EngineError, EngineSet, Highlighter, RenderCache, RenderEngine,
    RenderOutcome, RenderedPass,
};

/// Output tree and reconciliation.
pub use crate::tree::{Body, IslandKind, Mutation, Node, NodeId, Part, Reconciler, RenderStatus, TransformHandle};

/// Session state machine, transport pump and fade tracking.
pub use crate::runtime::{
    pump, FadeTracker, Message, MessageId, PumpOptions, Role, SessionHost, SessionState, StreamSession,
    ToolAcknowledgement, UiWrite,
};

/// Host glue.
pub use crate::widgets::{MessageView, Transcript};

pub use crate::config::EnvConfig;
