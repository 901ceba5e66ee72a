use navcore_messages::NavigationId;

use crate::id::{FrameTreeNodeId, PageId, RenderFrameHostId, SiteInstanceId};

/// Convenient type alias of Result type for the navigation core.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the navigation core.
#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// No frame tree node with this id exists.
    #[error("unknown frame tree node {0}")]
    FrameTreeNodeNotFound(FrameTreeNodeId),
    /// No page with this id exists.
    #[error("unknown page {0}")]
    PageNotFound(PageId),
    /// No live navigation request with this id exists.
    #[error("unknown navigation {0}")]
    NavigationNotFound(NavigationId),
    /// The frame host is not attached to the given node.
    #[error("unknown render frame host {0}")]
    RenderFrameHostNotFound(RenderFrameHostId),
    /// No site instance with this id exists.
    #[error("unknown site instance {0}")]
    SiteInstanceNotFound(SiteInstanceId),
    /// The frame has no navigation waiting for a throttle decision.
    #[error("no deferred navigation in frame tree node {0}")]
    NoDeferredNavigation(FrameTreeNodeId),
    /// The loader service went away.
    #[error("loader channel disconnected")]
    LoaderDisconnected,
    /// URL parse errors.
    #[error(transparent)]
    UrlParse(#[from] url::ParseError),
    /// IO errors while reading configuration.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON errors while reading configuration.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Command line parse errors.
    #[error(transparent)]
    Getopts(#[from] getopts::Fail),
}
