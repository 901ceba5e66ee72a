//! A node in a page's frame tree.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use url::{Origin, Url};

use crate::frame_host::RenderFrameHost;
use crate::id::{FrameTreeNodeId, PageId};
use crate::navigation_request::NavigationRequest;
use crate::render_frame_host_manager::RenderManagerState;

bitflags! {
    /// Features disabled in a sandboxed frame.
    #[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
    pub struct SandboxFlags: u32 {
        const NAVIGATION = 1;
        const PLUGINS = 1 << 1;
        const ORIGIN = 1 << 2;
        const FORMS = 1 << 3;
        const SCRIPTS = 1 << 4;
        const TOP_NAVIGATION = 1 << 5;
        const POPUPS = 1 << 6;
        const AUTOMATIC_FEATURES = 1 << 7;
        const POINTER_LOCK = 1 << 8;
        const DOCUMENT_DOMAIN = 1 << 9;
        const ORIENTATION_LOCK = 1 << 10;
        const PROPAGATES_TO_AUXILIARY_BROWSING_CONTEXTS = 1 << 11;
        const MODALS = 1 << 12;
        const PRESENTATION = 1 << 13;
    }
}

bitflags! {
    /// How a frame treats insecure subresource requests.
    #[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
    pub struct InsecureRequestPolicy: u8 {
        const BLOCK_ALL_MIXED_CONTENT = 1;
        const UPGRADE_INSECURE_REQUESTS = 1 << 1;
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ContentSecurityPolicyType {
    Report,
    Enforce,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ContentSecurityPolicySource {
    Http,
    Meta,
}

/// A content security policy header delivered with a document.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ContentSecurityPolicyHeader {
    pub header_value: String,
    pub policy_type: ContentSecurityPolicyType,
    pub source: ContentSecurityPolicySource,
}

/// Frame state mirrored into every site instance that has a proxy for the
/// frame.
#[derive(Clone, Debug)]
pub struct FrameReplicationState {
    pub name: String,
    pub unique_name: String,
    pub origin: Origin,
    /// The flags in effect for the current document.
    pub sandbox_flags: SandboxFlags,
    pub accumulated_csp_headers: Vec<ContentSecurityPolicyHeader>,
    pub insecure_request_policy: InsecureRequestPolicy,
}

impl Default for FrameReplicationState {
    fn default() -> Self {
        Self {
            name: String::new(),
            unique_name: String::new(),
            origin: Origin::new_opaque(),
            sandbox_flags: SandboxFlags::empty(),
            accumulated_csp_headers: Vec::new(),
            insecure_request_policy: InsecureRequestPolicy::empty(),
        }
    }
}

/// One frame of a page. Nodes are owned by the
/// [`FrameTree`](crate::frame_tree::FrameTree) and refer to each other by id.
#[derive(Debug)]
pub struct FrameTreeNode {
    id: FrameTreeNodeId,
    page_id: PageId,
    parent: Option<FrameTreeNodeId>,
    pub(crate) children: Vec<FrameTreeNodeId>,
    pub(crate) opener: Option<FrameTreeNodeId>,
    pub(crate) replication_state: FrameReplicationState,
    /// Flags to apply on the next commit, including the inherited ones.
    pub(crate) pending_sandbox_flags: SandboxFlags,
    pub(crate) loading_progress: f64,
    pub(crate) has_committed_real_load: bool,
    pub(crate) navigation_request: Option<Box<NavigationRequest>>,
    pub(crate) render_manager: RenderManagerState,
}

impl FrameTreeNode {
    pub(crate) fn new(
        id: FrameTreeNodeId,
        page_id: PageId,
        parent: Option<FrameTreeNodeId>,
        name: String,
        unique_name: String,
        sandbox_flags: SandboxFlags,
        render_manager: RenderManagerState,
    ) -> Self {
        Self {
            id,
            page_id,
            parent,
            children: Vec::new(),
            opener: None,
            replication_state: FrameReplicationState {
                name,
                unique_name,
                sandbox_flags,
                ..FrameReplicationState::default()
            },
            pending_sandbox_flags: sandbox_flags,
            loading_progress: 0.0,
            has_committed_real_load: false,
            navigation_request: None,
            render_manager,
        }
    }

    pub fn id(&self) -> FrameTreeNodeId {
        self.id
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn parent(&self) -> Option<FrameTreeNodeId> {
        self.parent
    }

    pub fn children(&self) -> &[FrameTreeNodeId] {
        &self.children
    }

    /// A node is the main frame iff it is the root of its tree.
    pub fn is_main_frame(&self) -> bool {
        self.parent.is_none()
    }

    pub fn opener(&self) -> Option<FrameTreeNodeId> {
        self.opener
    }

    pub fn frame_name(&self) -> &str {
        &self.replication_state.name
    }

    pub fn unique_name(&self) -> &str {
        &self.replication_state.unique_name
    }

    pub fn current_origin(&self) -> &Origin {
        &self.replication_state.origin
    }

    pub fn replication_state(&self) -> &FrameReplicationState {
        &self.replication_state
    }

    pub fn effective_sandbox_flags(&self) -> SandboxFlags {
        self.replication_state.sandbox_flags
    }

    pub fn pending_sandbox_flags(&self) -> SandboxFlags {
        self.pending_sandbox_flags
    }

    /// Apply the pending flags. Returns whether they changed.
    pub(crate) fn commit_pending_sandbox_flags(&mut self) -> bool {
        let changed = self.pending_sandbox_flags != self.replication_state.sandbox_flags;
        self.replication_state.sandbox_flags = self.pending_sandbox_flags;
        changed
    }

    pub fn insecure_request_policy(&self) -> InsecureRequestPolicy {
        self.replication_state.insecure_request_policy
    }

    pub fn content_security_policies(&self) -> &[ContentSecurityPolicyHeader] {
        &self.replication_state.accumulated_csp_headers
    }

    pub fn loading_progress(&self) -> f64 {
        self.loading_progress
    }

    /// Whether the frame has an ongoing navigation or an unfinished load.
    pub fn is_loading(&self) -> bool {
        self.navigation_request.is_some()
            || (self.loading_progress > 0.0 && self.loading_progress < 1.0)
    }

    pub fn has_committed_real_load(&self) -> bool {
        self.has_committed_real_load
    }

    pub fn navigation_request(&self) -> Option<&NavigationRequest> {
        self.navigation_request.as_deref()
    }

    pub fn render_manager(&self) -> &RenderManagerState {
        &self.render_manager
    }

    pub fn current_frame_host(&self) -> &RenderFrameHost {
        self.render_manager.current()
    }

    pub fn current_url(&self) -> Option<&Url> {
        self.current_frame_host().last_committed_url()
    }
}
