//! Frame hosts (the rendering end of a frame in one site instance) and
//! proxies (placeholders through which other site instances address it).

use navcore_messages::{
    CommonNavigationParams, NavigationId, NetError, PageTransition, RequestNavigationParams,
    ResponseHead, StreamHandle,
};
use url::{Origin, Url};

use crate::frame_tree_node::SandboxFlags;
use crate::id::{FrameTreeNodeId, RenderFrameHostId, SiteInstanceId};
use crate::navigation_handle::NavigationHandle;

/// The widget of a live frame host.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FrameView {
    visible: bool,
    focused: bool,
}

impl FrameView {
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }
}

/// What a frame host receives to commit a navigation.
#[derive(Clone, Debug)]
pub struct CommitNavigationParams {
    pub navigation_id: NavigationId,
    pub common_params: CommonNavigationParams,
    pub request_params: RequestNavigationParams,
    /// `None` for navigations that never hit the network.
    pub response: Option<ResponseHead>,
    pub body: Option<StreamHandle>,
    /// Set when the commit shows an error page.
    pub net_error: NetError,
}

impl CommitNavigationParams {
    pub fn is_error_page(&self) -> bool {
        self.net_error.is_error()
    }
}

/// The renderer's acknowledgement of a commit.
#[derive(Clone, Debug, PartialEq)]
pub struct DidCommitProvisionalLoadParams {
    pub url: Url,
    pub origin: Origin,
    pub method: http::Method,
    pub transition: PageTransition,
    pub has_user_gesture: bool,
    pub url_is_unreachable: bool,
    pub was_within_same_document: bool,
    pub nav_entry_id: i32,
    pub is_view_source: bool,
    pub did_replace_entry: bool,
}

impl DidCommitProvisionalLoadParams {
    /// The acknowledgement a well-behaved renderer sends for `params`.
    pub fn for_commit(params: &CommitNavigationParams, has_user_gesture: bool) -> Self {
        let url = params.common_params.url.clone();
        let url_is_unreachable = params.is_error_page();
        Self {
            origin: if url_is_unreachable {
                Origin::new_opaque()
            } else {
                url.origin()
            },
            url,
            method: params.common_params.method.clone(),
            transition: params.common_params.transition,
            has_user_gesture,
            url_is_unreachable,
            was_within_same_document: params.common_params.navigation_type.is_same_document(),
            nav_entry_id: params.request_params.nav_entry_id,
            is_view_source: params.request_params.is_view_source,
            did_replace_entry: params.common_params.should_replace_current_entry,
        }
    }

    /// A renderer-only commit of `url`, such as the initial empty document.
    pub fn for_url(url: Url) -> Self {
        Self {
            origin: url.origin(),
            url,
            method: http::Method::GET,
            transition: PageTransition::default(),
            has_user_gesture: false,
            url_is_unreachable: false,
            was_within_same_document: false,
            nav_entry_id: 0,
            is_view_source: false,
            did_replace_entry: false,
        }
    }
}

/// A frame rendered in one site instance.
#[derive(Debug)]
pub struct RenderFrameHost {
    id: RenderFrameHostId,
    frame_tree_node_id: FrameTreeNodeId,
    site_instance: SiteInstanceId,
    is_live: bool,
    is_swapped_out: bool,
    view: Option<FrameView>,
    last_committed_url: Option<Url>,
    last_committed_origin: Option<Origin>,
    last_successful_url: Option<Url>,
    has_before_unload_handler: bool,
    navigation_handle: Option<NavigationHandle>,
    last_commit_params: Option<CommitNavigationParams>,
    commit_count: usize,
    stop_count: usize,
}

impl RenderFrameHost {
    pub(crate) fn new(frame_tree_node_id: FrameTreeNodeId, site_instance: SiteInstanceId) -> Self {
        Self {
            id: RenderFrameHostId::new(),
            frame_tree_node_id,
            site_instance,
            is_live: false,
            is_swapped_out: false,
            view: None,
            last_committed_url: None,
            last_committed_origin: None,
            last_successful_url: None,
            has_before_unload_handler: false,
            navigation_handle: None,
            last_commit_params: None,
            commit_count: 0,
            stop_count: 0,
        }
    }

    pub fn id(&self) -> RenderFrameHostId {
        self.id
    }

    pub fn frame_tree_node_id(&self) -> FrameTreeNodeId {
        self.frame_tree_node_id
    }

    pub fn site_instance(&self) -> SiteInstanceId {
        self.site_instance
    }

    /// Whether a renderer backs this frame host.
    pub fn is_render_frame_live(&self) -> bool {
        self.is_live
    }

    pub fn is_swapped_out(&self) -> bool {
        self.is_swapped_out
    }

    /// Start the renderer side of the frame. Creates its view.
    pub(crate) fn init_render_frame(&mut self) {
        if self.is_live {
            return;
        }
        log::trace!("RenderFrameHost: {} is now live", self.id);
        self.is_live = true;
        self.view.get_or_insert_with(FrameView::default);
    }

    /// The renderer went away; the view goes with it.
    pub(crate) fn render_process_gone(&mut self) {
        self.is_live = false;
        self.view = None;
        self.has_before_unload_handler = false;
    }

    pub(crate) fn set_swapped_out(&mut self) {
        self.is_swapped_out = true;
        if let Some(view) = self.view.as_mut() {
            view.visible = false;
            view.focused = false;
        }
    }

    pub fn view(&self) -> Option<&FrameView> {
        self.view.as_ref()
    }

    pub fn is_visible(&self) -> bool {
        self.view.is_some_and(|view| view.visible)
    }

    pub fn is_focused(&self) -> bool {
        self.view.is_some_and(|view| view.focused)
    }

    pub(crate) fn show(&mut self) {
        if let Some(view) = self.view.as_mut() {
            view.visible = true;
        }
    }

    pub(crate) fn hide(&mut self) {
        if let Some(view) = self.view.as_mut() {
            view.visible = false;
        }
    }

    pub(crate) fn focus(&mut self) {
        if let Some(view) = self.view.as_mut() {
            view.focused = true;
        }
    }

    pub(crate) fn blur(&mut self) {
        if let Some(view) = self.view.as_mut() {
            view.focused = false;
        }
    }

    pub fn last_committed_url(&self) -> Option<&Url> {
        self.last_committed_url.as_ref()
    }

    pub fn last_committed_origin(&self) -> Option<&Origin> {
        self.last_committed_origin.as_ref()
    }

    /// The last committed URL that was not an error page.
    pub fn last_successful_url(&self) -> Option<&Url> {
        self.last_successful_url.as_ref()
    }

    pub(crate) fn set_last_committed(&mut self, params: &DidCommitProvisionalLoadParams) {
        self.last_committed_url = Some(params.url.clone());
        self.last_committed_origin = Some(params.origin.clone());
        if !params.url_is_unreachable {
            self.last_successful_url = Some(params.url.clone());
        }
    }

    pub fn has_before_unload_handler(&self) -> bool {
        self.has_before_unload_handler
    }

    pub(crate) fn set_has_before_unload_handler(&mut self, has_handler: bool) {
        self.has_before_unload_handler = has_handler;
    }

    pub fn navigation_handle(&self) -> Option<&NavigationHandle> {
        self.navigation_handle.as_ref()
    }

    pub(crate) fn set_navigation_handle(&mut self, handle: NavigationHandle) {
        if let Some(previous) = self.navigation_handle.replace(handle) {
            log::debug!(
                "RenderFrameHost: {} drops unfinished {}",
                self.id,
                previous.navigation_id()
            );
        }
    }

    pub(crate) fn take_navigation_handle(&mut self) -> Option<NavigationHandle> {
        self.navigation_handle.take()
    }

    /// Hand the buffered response over to the renderer.
    pub(crate) fn commit_navigation(&mut self, params: CommitNavigationParams) {
        log::debug!(
            "RenderFrameHost: {} commits {} ({})",
            self.id,
            params.common_params.url,
            params.navigation_id
        );
        self.init_render_frame();
        self.commit_count += 1;
        self.last_commit_params = Some(params);
    }

    /// Parameters of the last commit sent to the renderer.
    pub fn last_commit_params(&self) -> Option<&CommitNavigationParams> {
        self.last_commit_params.as_ref()
    }

    /// Number of commits sent to the renderer.
    pub fn commit_count(&self) -> usize {
        self.commit_count
    }

    /// Tell the renderer its navigation was stopped by the browser.
    pub(crate) fn stop(&mut self) {
        self.stop_count += 1;
    }

    /// Number of stop notices sent to the renderer.
    pub fn stop_count(&self) -> usize {
        self.stop_count
    }
}

/// A placeholder for a frame in a site instance that does not render it.
#[derive(Debug)]
pub struct RenderFrameProxyHost {
    frame_tree_node_id: FrameTreeNodeId,
    site_instance: SiteInstanceId,
    is_live: bool,
    opener: Option<FrameTreeNodeId>,
    sandbox_flags: SandboxFlags,
}

impl RenderFrameProxyHost {
    pub(crate) fn new(frame_tree_node_id: FrameTreeNodeId, site_instance: SiteInstanceId) -> Self {
        Self {
            frame_tree_node_id,
            site_instance,
            is_live: false,
            opener: None,
            sandbox_flags: SandboxFlags::empty(),
        }
    }

    pub fn frame_tree_node_id(&self) -> FrameTreeNodeId {
        self.frame_tree_node_id
    }

    pub fn site_instance(&self) -> SiteInstanceId {
        self.site_instance
    }

    pub fn is_render_frame_proxy_live(&self) -> bool {
        self.is_live
    }

    pub(crate) fn init_render_frame_proxy(&mut self) {
        self.is_live = true;
    }

    pub(crate) fn render_process_gone(&mut self) {
        self.is_live = false;
    }

    /// The opener this proxy advertises to its site instance.
    pub fn opener(&self) -> Option<FrameTreeNodeId> {
        self.opener
    }

    pub(crate) fn update_opener(&mut self, opener: Option<FrameTreeNodeId>) {
        self.opener = opener;
    }

    /// The sandbox flags replicated to this proxy.
    pub fn sandbox_flags(&self) -> SandboxFlags {
        self.sandbox_flags
    }

    pub(crate) fn set_sandbox_flags(&mut self, flags: SandboxFlags) {
        self.sandbox_flags = flags;
    }
}
