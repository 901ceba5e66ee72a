use url::Url;

use crate::id::{FrameTreeNodeId, PageId, RenderFrameHostId};
use crate::navigation_handle::NavigationHandle;
use crate::navigation_throttle::NavigationThrottle;

/// Hooks the owner of the frame trees (a tab strip, a webview host) gets
/// called on. Every method has a no-op default.
pub trait NavigationDelegate {
    /// A navigation started. Called once per handle.
    fn did_start_navigation(&self, _handle: &NavigationHandle) {}

    /// A redirect passed the throttles and will be followed.
    fn did_redirect_navigation(&self, _handle: &NavigationHandle) {}

    /// The navigation picked its frame host and is about to commit.
    fn ready_to_commit_navigation(&self, _handle: &NavigationHandle) {}

    /// The navigation committed, failed or was abandoned. Called exactly
    /// once per handle.
    fn did_finish_navigation(&self, _handle: &NavigationHandle) {}

    /// Whether a renderer-initiated navigation may move to another frame
    /// host.
    fn should_transfer_navigation(&self, _is_main_frame: bool) -> bool {
        true
    }

    /// Throttles to register on a navigation about to start its request.
    fn create_throttles_for_navigation(
        &self,
        _handle: &NavigationHandle,
    ) -> Vec<Box<dyn NavigationThrottle>> {
        Vec::new()
    }

    /// Embedder override forcing a navigation into a new browsing instance.
    fn should_swap_browsing_instances_for_navigation(
        &self,
        _current_url: Option<&Url>,
        _dest_url: &Url,
    ) -> bool {
        false
    }

    /// The current frame host of a node was replaced.
    fn notify_swapped_from_render_manager(
        &self,
        _frame_tree_node_id: FrameTreeNodeId,
        _old_host: RenderFrameHostId,
        _new_host: RenderFrameHostId,
        _is_main_frame: bool,
    ) {
    }

    /// A frame host without a live renderer became current; show a crash
    /// placeholder for it.
    fn render_process_gone_from_render_manager(&self, _frame_tree_node_id: FrameTreeNodeId) {}

    /// A page started loading.
    fn did_start_loading(&self, _frame_tree_node_id: FrameTreeNodeId, _to_different_document: bool) {
    }

    /// A page stopped loading.
    fn did_stop_loading(&self, _page_id: PageId) {}

    /// The load progress of a page changed.
    fn load_progress_changed(&self, _page_id: PageId, _progress: f64) {}
}

/// A delegate that only logs.
#[derive(Debug, Default)]
pub struct LoggingDelegate;

impl NavigationDelegate for LoggingDelegate {
    fn did_start_navigation(&self, handle: &NavigationHandle) {
        log::info!("Navigation started: {} {}", handle.navigation_id(), handle.url());
    }

    fn did_finish_navigation(&self, handle: &NavigationHandle) {
        log::info!(
            "Navigation finished: {} {} committed={} error={}",
            handle.navigation_id(),
            handle.url(),
            handle.has_committed(),
            handle.net_error()
        );
    }
}
