//! Node context injection
//!
//! A simulation drives many nodes from one thread. This module keeps the
//! node currently being driven in thread-local storage so every span opened
//! while it is set can be stamped with that node.

use std::cell::RefCell;

use ferry_core::NodeId;

/// Node context data stored in thread-local storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeContextData {
    /// The node being driven
    pub node: NodeId,
    /// Optional label for the run (scenario name, strategy, ...)
    pub run: Option<String>,
}

thread_local! {
    static NODE_CONTEXT: RefCell<Option<NodeContextData>> = const { RefCell::new(None) };
}

/// RAII guard for node context
///
/// Creating the guard sets the node context for the current thread. Dropping
/// it restores whatever context was active before.
///
/// # Example
///
/// ```ignore
/// use ferry_logging::NodeContextGuard;
/// use ferry_core::NodeId;
///
/// let _guard = NodeContextGuard::new(NodeId(3));
/// // Spans opened in this scope carry node = "n3"
/// policy.tick(&world, &buffer, &connections, &mut scheduler)?;
/// ```
pub struct NodeContextGuard {
    previous: Option<NodeContextData>,
}

impl NodeContextGuard {
    pub fn new(node: NodeId) -> Self {
        Self::set(NodeContextData { node, run: None })
    }

    /// Set the node together with a run label
    pub fn with_run(node: NodeId, run: impl Into<String>) -> Self {
        Self::set(NodeContextData {
            node,
            run: Some(run.into()),
        })
    }

    fn set(data: NodeContextData) -> Self {
        let previous = NODE_CONTEXT.with(|ctx| ctx.borrow_mut().replace(data));
        Self { previous }
    }

    /// Get the current node context (if any)
    pub fn current() -> Option<NodeContextData> {
        NODE_CONTEXT.with(|ctx| ctx.borrow().clone())
    }

    /// Get the current node (if set)
    pub fn current_node() -> Option<NodeId> {
        NODE_CONTEXT.with(|ctx| ctx.borrow().as_ref().map(|c| c.node))
    }
}

impl Drop for NodeContextGuard {
    fn drop(&mut self) {
        NODE_CONTEXT.with(|ctx| *ctx.borrow_mut() = self.previous.take());
    }
}

/// Run a block with the node context set
///
/// # Example
///
/// ```ignore
/// with_node_context!(NodeId(1), {
///     tracing::info!("Ticking");
/// });
/// ```
#[macro_export]
macro_rules! with_node_context {
    ($node:expr, $body:block) => {{
        let _guard = $crate::context::NodeContextGuard::new($node);
        $body
    }};
}
