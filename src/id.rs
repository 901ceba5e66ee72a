//! Process-wide identifiers.
//!
//! Every id is drawn from its own monotonically increasing counter and is
//! never reused while the process lives.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use navcore_messages::NavigationId;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $counter:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
        pub struct $name(u32);

        static $counter: AtomicU32 = AtomicU32::new(1);

        impl $name {
            /// Allocate a fresh id.
            pub fn new() -> Self {
                Self($counter.fetch_add(1, Ordering::Relaxed))
            }

            /// The raw integer value.
            pub fn get(&self) -> u32 {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", $label, self.0)
            }
        }
    };
}

id_type!(
    /// Identifies a node of a frame tree.
    FrameTreeNodeId,
    FRAME_TREE_NODE_ID_COUNTER,
    "FrameTreeNode"
);
id_type!(
    /// Identifies a page, i.e. one frame tree.
    PageId,
    PAGE_ID_COUNTER,
    "Page"
);
id_type!(
    /// Identifies an isolated execution context.
    SiteInstanceId,
    SITE_INSTANCE_ID_COUNTER,
    "SiteInstance"
);
id_type!(
    /// Identifies a group of related site instances.
    BrowsingInstanceId,
    BROWSING_INSTANCE_ID_COUNTER,
    "BrowsingInstance"
);
id_type!(
    /// Identifies a frame host.
    RenderFrameHostId,
    RENDER_FRAME_HOST_ID_COUNTER,
    "RenderFrameHost"
);
id_type!(
    /// Identifies a browser context (profile).
    BrowserContextId,
    BROWSER_CONTEXT_ID_COUNTER,
    "BrowserContext"
);

static NAVIGATION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh [`NavigationId`].
pub fn next_navigation_id() -> NavigationId {
    NavigationId(NAVIGATION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
}
