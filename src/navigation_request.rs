//! One navigation, from the moment a frame decides to navigate until the
//! response commits, fails into an error page or is abandoned.
//!
//! A request lives in its [`FrameTreeNode`](crate::frame_tree_node::FrameTreeNode).
//! Every step takes it out of the node (`self: Box<Self>`) and either puts it
//! back, commits it or drops it, so that the node never observes a half
//! finished transition.

use std::fmt;
use std::rc::Rc;
use std::time::Instant;

use crossbeam_channel::Sender;
use headers::HeaderMapExt;
use navcore_messages::{
    BeginNavigationParams, CommonNavigationParams, NavigationData, NavigationId,
    NavigationRequestInfo, NetError, RedirectInfo, RequestNavigationParams, ResponseHead,
    RestoreType, StreamHandle,
};
use url::Url;

use crate::delegate::NavigationDelegate;
use crate::errors::{Error, Result};
use crate::frame_host::{CommitNavigationParams, DidCommitProvisionalLoadParams};
use crate::frame_tree::FrameTree;
use crate::frame_tree_node::{FrameTreeNode, SandboxFlags};
use crate::id::{next_navigation_id, FrameTreeNodeId, RenderFrameHostId, SiteInstanceId};
use crate::loader::{NavigationLoader, NavigationLoaderFactory};
use crate::navigation_handle::{
    NavigationHandle, NavigationHandleInit, ThrottleChecksFinishedCallback,
};
use crate::navigation_throttle::{Checkpoint, ThrottleCheckResult};
use crate::navigator::NavigatorTask;
use crate::render_frame_host_manager::NavigationTarget;
use crate::service_worker::ServiceWorkerContext;
use crate::site::{
    should_make_network_request_for_url, ProcessPrivilege, SiteIsolationPolicy, ABOUT_SCHEME,
    DATA_SCHEME, JAVASCRIPT_SCHEME, VIEW_SOURCE_SCHEME,
};
use crate::site_instance::SiteInstance;

/// Schemes the browser loads itself rather than handing to an external
/// application.
const HANDLED_SCHEMES: &[&str] = &[
    "http",
    "https",
    "file",
    "blob",
    "filesystem",
    ABOUT_SCHEME,
    DATA_SCHEME,
    JAVASCRIPT_SCHEME,
    VIEW_SOURCE_SCHEME,
];

/// Where a [`NavigationRequest`] is in its lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NavigationState {
    NotStarted,
    /// Waiting for the current document to run its before-unload handler.
    WaitingForRendererResponse,
    Started,
    ResponseStarted,
    Failed,
}

/// Which frame host of the node the navigation is expected to commit in.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum AssociatedSiteInstanceType {
    #[default]
    None,
    Current,
    Speculative,
}

/// Everything a request step may touch besides the request itself.
pub(crate) struct NavigationContext<'a> {
    pub frame_tree: &'a mut FrameTree,
    pub loader_factory: &'a dyn NavigationLoaderFactory,
    pub service_worker_context: Option<&'a dyn ServiceWorkerContext>,
    pub tasks: &'a Sender<NavigatorTask>,
}

/// Drives one navigation through the throttles, the loader and placement.
pub struct NavigationRequest {
    navigation_id: NavigationId,
    frame_tree_node_id: FrameTreeNodeId,
    common_params: CommonNavigationParams,
    begin_params: BeginNavigationParams,
    request_params: RequestNavigationParams,
    browser_initiated: bool,
    restore_type: RestoreType,
    /// The instance of the frame that asked for the navigation.
    source_site_instance: Option<SiteInstanceId>,
    /// An instance the navigation must commit in, e.g. from session history.
    dest_site_instance: Option<SiteInstanceId>,
    state: NavigationState,
    associated_site_instance_type: AssociatedSiteInstanceType,
    before_unload_deadline: Option<Instant>,
    navigation_handle: Option<NavigationHandle>,
    /// Present while the network request is outstanding.
    loader: Option<Box<dyn NavigationLoader>>,
    response: Option<ResponseHead>,
    body: Option<StreamHandle>,
    net_error: NetError,
    has_stale_copy_in_cache: bool,
    navigation_start: Instant,
}

impl NavigationRequest {
    /// A navigation started by the browser: typed URLs, bookmarks, history
    /// and reloads.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn create_browser_initiated(
        frame_tree_node_id: FrameTreeNodeId,
        common_params: CommonNavigationParams,
        begin_params: BeginNavigationParams,
        request_params: RequestNavigationParams,
        restore_type: RestoreType,
        source_site_instance: Option<SiteInstanceId>,
        dest_site_instance: Option<SiteInstanceId>,
    ) -> Box<Self> {
        Box::new(Self::new(
            frame_tree_node_id,
            common_params,
            begin_params,
            request_params,
            true,
            restore_type,
            source_site_instance,
            dest_site_instance,
        ))
    }

    /// A navigation the document of a frame asked for: links, forms and
    /// script.
    pub(crate) fn create_renderer_initiated(
        frame_tree_node_id: FrameTreeNodeId,
        common_params: CommonNavigationParams,
        begin_params: BeginNavigationParams,
        has_committed_real_load: bool,
        source_site_instance: Option<SiteInstanceId>,
    ) -> Box<Self> {
        let request_params = RequestNavigationParams {
            has_committed_real_load,
            intended_as_new_entry: !common_params.should_replace_current_entry,
            ..RequestNavigationParams::default()
        };
        Box::new(Self::new(
            frame_tree_node_id,
            common_params,
            begin_params,
            request_params,
            false,
            RestoreType::None,
            source_site_instance,
            None,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn new(
        frame_tree_node_id: FrameTreeNodeId,
        common_params: CommonNavigationParams,
        begin_params: BeginNavigationParams,
        request_params: RequestNavigationParams,
        browser_initiated: bool,
        restore_type: RestoreType,
        source_site_instance: Option<SiteInstanceId>,
        dest_site_instance: Option<SiteInstanceId>,
    ) -> Self {
        let navigation_id = next_navigation_id();
        log::debug!(
            "NavigationRequest: {navigation_id} to {} in {frame_tree_node_id} ({})",
            common_params.url,
            if browser_initiated { "browser" } else { "renderer" }
        );
        Self {
            navigation_id,
            frame_tree_node_id,
            common_params,
            begin_params,
            request_params,
            browser_initiated,
            restore_type,
            source_site_instance,
            dest_site_instance,
            state: NavigationState::NotStarted,
            associated_site_instance_type: AssociatedSiteInstanceType::None,
            before_unload_deadline: None,
            navigation_handle: None,
            loader: None,
            response: None,
            body: None,
            net_error: NetError::Ok,
            has_stale_copy_in_cache: false,
            navigation_start: Instant::now(),
        }
    }

    pub fn navigation_id(&self) -> NavigationId {
        self.navigation_id
    }

    pub fn frame_tree_node_id(&self) -> FrameTreeNodeId {
        self.frame_tree_node_id
    }

    pub fn state(&self) -> NavigationState {
        self.state
    }

    /// The URL the request currently targets, after redirects.
    pub fn url(&self) -> &Url {
        &self.common_params.url
    }

    pub fn common_params(&self) -> &CommonNavigationParams {
        &self.common_params
    }

    pub fn begin_params(&self) -> &BeginNavigationParams {
        &self.begin_params
    }

    pub fn request_params(&self) -> &RequestNavigationParams {
        &self.request_params
    }

    pub fn is_browser_initiated(&self) -> bool {
        self.browser_initiated
    }

    pub fn restore_type(&self) -> RestoreType {
        self.restore_type
    }

    pub fn source_site_instance(&self) -> Option<SiteInstanceId> {
        self.source_site_instance
    }

    pub fn dest_site_instance(&self) -> Option<SiteInstanceId> {
        self.dest_site_instance
    }

    pub fn associated_site_instance_type(&self) -> AssociatedSiteInstanceType {
        self.associated_site_instance_type
    }

    pub(crate) fn set_associated_site_instance_type(&mut self, kind: AssociatedSiteInstanceType) {
        self.associated_site_instance_type = kind;
    }

    pub fn navigation_handle(&self) -> Option<&NavigationHandle> {
        self.navigation_handle.as_ref()
    }

    pub(crate) fn navigation_handle_mut(&mut self) -> Option<&mut NavigationHandle> {
        self.navigation_handle.as_mut()
    }

    pub fn net_error(&self) -> NetError {
        self.net_error
    }

    pub(crate) fn set_net_error(&mut self, net_error: NetError) {
        self.net_error = net_error;
        if let Some(handle) = self.navigation_handle.as_mut() {
            handle.set_net_error(net_error);
        }
    }

    pub fn has_stale_copy_in_cache(&self) -> bool {
        self.has_stale_copy_in_cache
    }

    /// The buffered response, until it is handed to a frame host.
    pub fn response(&self) -> Option<&ResponseHead> {
        self.response.as_ref()
    }

    /// Whether the network request is still outstanding.
    pub fn has_loader(&self) -> bool {
        self.loader.is_some()
    }

    pub fn before_unload_deadline(&self) -> Option<Instant> {
        self.before_unload_deadline
    }

    /// Hold the request until the current document ran its before-unload
    /// handler, or until `deadline`.
    pub(crate) fn set_waiting_for_renderer_response(&mut self, deadline: Instant) {
        assert_eq!(
            self.state,
            NavigationState::NotStarted,
            "{} already started",
            self.navigation_id
        );
        self.state = NavigationState::WaitingForRendererResponse;
        self.before_unload_deadline = Some(deadline);
    }

    /// What placement needs to know about this request.
    pub(crate) fn navigation_target(&self) -> NavigationTarget {
        NavigationTarget {
            url: self.common_params.url.clone(),
            source_site_instance: self.source_site_instance,
            dest_site_instance: self.dest_site_instance,
            transition: self.common_params.transition,
            is_restore: self.restore_type != RestoreType::None,
            is_view_source: self.request_params.is_view_source,
            is_renderer_initiated: !self.browser_initiated,
            was_redirected: !self.request_params.redirects.is_empty(),
        }
    }

    /// Create the handle delegates and throttles observe. The request must
    /// already sit in its node.
    pub(crate) fn create_navigation_handle(
        &mut self,
        is_main_frame: bool,
        delegate: Rc<dyn NavigationDelegate>,
    ) {
        assert!(
            self.navigation_handle.is_none(),
            "{} already has a handle",
            self.navigation_id
        );
        let handle = NavigationHandle::new(
            NavigationHandleInit {
                navigation_id: self.navigation_id,
                url: self.common_params.url.clone(),
                frame_tree_node_id: self.frame_tree_node_id,
                is_main_frame,
                is_renderer_initiated: !self.browser_initiated,
                is_same_document: self.common_params.navigation_type.is_same_document(),
                navigation_start: self.navigation_start,
                pending_nav_entry_id: self.request_params.nav_entry_id,
            },
            delegate,
        );
        self.navigation_handle = Some(handle);
    }

    fn handle_mut(&mut self) -> &mut NavigationHandle {
        match self.navigation_handle.as_mut() {
            Some(handle) => handle,
            None => panic!("{} has no navigation handle", self.navigation_id),
        }
    }

    /// Start the navigation. URLs that need no network request commit
    /// right away.
    pub(crate) fn begin_navigation(mut self: Box<Self>, cx: &mut NavigationContext<'_>) -> Result<()> {
        assert!(
            matches!(
                self.state,
                NavigationState::NotStarted | NavigationState::WaitingForRendererResponse
            ),
            "{} cannot begin in {:?}",
            self.navigation_id,
            self.state
        );
        self.state = NavigationState::Started;
        self.before_unload_deadline = None;

        if should_make_network_request_for_url(&self.common_params.url) {
            let callback = self.checks_callback(cx.tasks, Checkpoint::WillStartRequest);
            let is_external_protocol =
                !is_handled_url(&self.common_params.url, cx.frame_tree.policy());
            let method = self.common_params.method.clone();
            let referrer = self.common_params.referrer.clone();
            let has_user_gesture = self.begin_params.has_user_gesture;
            let transition = self.common_params.transition;
            let request_context_type = self.begin_params.request_context_type;
            self.handle_mut().will_start_request(
                method,
                referrer,
                has_user_gesture,
                transition,
                is_external_protocol,
                request_context_type,
                callback,
            );
            cx.frame_tree.restore_navigation_request(self);
            return Ok(());
        }

        self.state = NavigationState::ResponseStarted;
        let (host, instance, _) = self.frame_host_for_navigation(cx)?;
        self.handle_mut().ready_to_commit_navigation(host, instance);
        self.commit_navigation(cx)
    }

    /// The throttles ruled on the start of the request.
    pub(crate) fn on_start_checks_complete(
        mut self: Box<Self>,
        result: ThrottleCheckResult,
        cx: &mut NavigationContext<'_>,
    ) -> Result<()> {
        assert_ne!(result, ThrottleCheckResult::Defer);
        match result {
            ThrottleCheckResult::Proceed => {}
            ThrottleCheckResult::BlockRequest => {
                return self.on_request_failed(false, NetError::BlockedByClient, cx);
            }
            _ => {
                log::debug!(
                    "NavigationRequest: {} cancelled before start ({result:?})",
                    self.navigation_id
                );
                cx.frame_tree.discard_navigation_request(self, false);
                return Ok(());
            }
        }

        let id = self.frame_tree_node_id;
        let Some(node) = cx.frame_tree.node(id) else {
            return Err(Error::FrameTreeNodeNotFound(id));
        };
        let is_main_frame = node.is_main_frame();
        let parent_is_main_frame = node
            .parent()
            .and_then(|parent| cx.frame_tree.node(parent))
            .is_some_and(FrameTreeNode::is_main_frame);
        let sandboxed_origin = node.pending_sandbox_flags().contains(SandboxFlags::ORIGIN);
        self.request_params.has_committed_real_load = node.has_committed_real_load();

        if let Some(context) = cx.service_worker_context {
            let url = &self.common_params.url;
            if matches!(url.scheme(), "http" | "https")
                && !self.begin_params.skip_service_worker
                && !sandboxed_origin
            {
                self.handle_mut().init_service_worker_handle(context);
            }
        }

        let info = NavigationRequestInfo {
            navigation_id: self.navigation_id,
            common_params: self.common_params.clone(),
            begin_params: self.begin_params.clone(),
            is_main_frame,
            parent_is_main_frame,
            frame_tree_node_id: id.get(),
        };
        self.loader = Some(cx.loader_factory.create_loader(info));
        cx.frame_tree.restore_navigation_request(self);
        Ok(())
    }

    /// The loader reports a redirect.
    pub(crate) fn on_request_redirected(
        mut self: Box<Self>,
        redirect_info: RedirectInfo,
        response: ResponseHead,
        cx: &mut NavigationContext<'_>,
    ) -> Result<()> {
        assert_eq!(
            self.state,
            NavigationState::Started,
            "{} redirected outside of its request",
            self.navigation_id
        );
        let RedirectInfo {
            new_method,
            new_url,
            new_referrer,
            ..
        } = redirect_info;
        log::debug!(
            "NavigationRequest: {} redirected from {} to {new_url}",
            self.navigation_id,
            self.common_params.url
        );

        let previous_url = std::mem::replace(&mut self.common_params.url, new_url.clone());
        self.request_params.redirects.push(previous_url);
        // A history navigation that redirects lands wherever the redirect
        // leads, not in the instance it was restored into.
        self.dest_site_instance = None;
        if new_method != http::Method::POST {
            self.common_params.post_data = None;
        }
        self.common_params.method = new_method.clone();
        self.common_params.referrer.url = new_referrer.clone();

        if !self.browser_initiated && self.redirects_into_privileged_url(&new_url, cx.frame_tree) {
            log::warn!(
                "NavigationRequest: {} may not redirect into {new_url}",
                self.navigation_id
            );
            self.set_net_error(NetError::Aborted);
            cx.frame_tree.discard_navigation_request(self, false);
            return Ok(());
        }

        let callback = self.checks_callback(cx.tasks, Checkpoint::WillRedirectRequest);
        let is_external_protocol = !is_handled_url(&new_url, cx.frame_tree.policy());
        self.handle_mut().will_redirect_request(
            new_url,
            new_method,
            new_referrer,
            is_external_protocol,
            response.headers,
            response.connection_info,
            callback,
        );
        cx.frame_tree.restore_navigation_request(self);
        Ok(())
    }

    /// A renderer in an ordinary instance may not be led into a privileged
    /// one through a redirect.
    fn redirects_into_privileged_url(&self, url: &Url, frame_tree: &FrameTree) -> bool {
        let source_privilege = self
            .source_site_instance
            .and_then(|source| frame_tree.site_instances().get(source))
            .map(SiteInstance::privilege);
        source_privilege == Some(ProcessPrivilege::Normal)
            && frame_tree.policy().privilege_for_url(url) != ProcessPrivilege::Normal
    }

    /// The throttles ruled on a redirect.
    pub(crate) fn on_redirect_checks_complete(
        mut self: Box<Self>,
        result: ThrottleCheckResult,
        cx: &mut NavigationContext<'_>,
    ) -> Result<()> {
        assert_ne!(result, ThrottleCheckResult::Defer);
        if result != ThrottleCheckResult::Proceed {
            log::debug!(
                "NavigationRequest: {} cancelled at redirect ({result:?})",
                self.navigation_id
            );
            cx.frame_tree.discard_navigation_request(self, false);
            return Ok(());
        }
        if let Some(loader) = self.loader.as_mut() {
            loader.follow_redirect();
        }
        cx.frame_tree.restore_navigation_request(self);
        Ok(())
    }

    /// The loader reports the final response.
    pub(crate) fn on_response_started(
        mut self: Box<Self>,
        response: ResponseHead,
        body: StreamHandle,
        navigation_data: Option<NavigationData>,
        cx: &mut NavigationContext<'_>,
    ) -> Result<()> {
        assert_eq!(
            self.state,
            NavigationState::Started,
            "{} got a response outside of its request",
            self.navigation_id
        );
        self.state = NavigationState::ResponseStarted;

        // No content: the current document stays.
        if response.is_no_content() {
            log::debug!(
                "NavigationRequest: {} got {}, nothing to commit",
                self.navigation_id,
                response.status
            );
            self.loader = None;
            cx.frame_tree.discard_navigation_request(self, false);
            return Ok(());
        }

        let (host, instance, is_current) = self.frame_host_for_navigation(cx)?;
        if !self.browser_initiated && !is_current {
            let is_main_frame = cx
                .frame_tree
                .node(self.frame_tree_node_id)
                .is_some_and(FrameTreeNode::is_main_frame);
            if !cx.frame_tree.delegate().should_transfer_navigation(is_main_frame) {
                log::debug!(
                    "NavigationRequest: transfer of {} vetoed",
                    self.navigation_id
                );
                self.set_net_error(NetError::Aborted);
                cx.frame_tree.discard_navigation_request(self, false);
                return Ok(());
            }
        }

        let provider_id = self
            .navigation_handle
            .as_ref()
            .and_then(NavigationHandle::service_worker_handle)
            .and_then(|handle| handle.provider_id());
        self.request_params.service_worker_provider_id = provider_id;
        if let Some(navigation_data) = navigation_data {
            self.handle_mut().set_navigation_data(navigation_data);
        }

        let mime_type = response
            .mime_type
            .as_deref()
            .and_then(|mime_type| mime_type.parse::<mime::Mime>().ok())
            .or_else(|| {
                response
                    .headers
                    .typed_get::<headers::ContentType>()
                    .map(mime::Mime::from)
            });
        let headers = response.headers.clone();
        let connection_info = response.connection_info;
        self.response = Some(response);
        self.body = Some(body);

        let callback = self.checks_callback(cx.tasks, Checkpoint::WillProcessResponse);
        self.handle_mut().will_process_response(
            host,
            instance,
            headers,
            connection_info,
            mime_type,
            callback,
        );
        cx.frame_tree.restore_navigation_request(self);
        Ok(())
    }

    /// The throttles ruled on the response.
    pub(crate) fn on_will_process_response_checks_complete(
        mut self: Box<Self>,
        result: ThrottleCheckResult,
        cx: &mut NavigationContext<'_>,
    ) -> Result<()> {
        assert_ne!(result, ThrottleCheckResult::Defer);
        if result != ThrottleCheckResult::Proceed {
            log::debug!(
                "NavigationRequest: {} cancelled at response ({result:?})",
                self.navigation_id
            );
            cx.frame_tree.discard_navigation_request(self, false);
            return Ok(());
        }
        if let Some(mut loader) = self.loader.take() {
            loader.proceed_with_response();
        }
        self.commit_navigation(cx)
    }

    /// The loader reports a failure. Anything but an abort shows an error
    /// page.
    pub(crate) fn on_request_failed(
        mut self: Box<Self>,
        has_stale_copy_in_cache: bool,
        net_error: NetError,
        cx: &mut NavigationContext<'_>,
    ) -> Result<()> {
        assert_eq!(
            self.state,
            NavigationState::Started,
            "{} failed outside of its request",
            self.navigation_id
        );
        log::debug!(
            "NavigationRequest: {} to {} failed with {net_error}",
            self.navigation_id,
            self.common_params.url
        );
        self.state = NavigationState::Failed;
        self.has_stale_copy_in_cache = has_stale_copy_in_cache;
        self.set_net_error(net_error);
        self.loader = None;

        if net_error == NetError::Aborted {
            cx.frame_tree.discard_navigation_request(self, false);
            return Ok(());
        }

        let (host, instance, _) = self.frame_host_for_navigation(cx)?;
        self.handle_mut().ready_to_commit_navigation(host, instance);
        self.commit_navigation(cx)
    }

    /// Hand the navigation to the frame host picked for it. The request is
    /// gone afterwards.
    fn commit_navigation(mut self: Box<Self>, cx: &mut NavigationContext<'_>) -> Result<()> {
        assert!(
            matches!(
                self.state,
                NavigationState::ResponseStarted | NavigationState::Failed
            ),
            "{} cannot commit in {:?}",
            self.navigation_id,
            self.state
        );
        let id = self.frame_tree_node_id;
        let Some(handle) = self.navigation_handle.take() else {
            panic!("{} commits without a handle", self.navigation_id);
        };
        let Some(host_id) = handle.render_frame_host() else {
            panic!("{} commits before picking a frame host", self.navigation_id);
        };

        let params = CommitNavigationParams {
            navigation_id: self.navigation_id,
            common_params: self.common_params.clone(),
            request_params: self.request_params.clone(),
            response: self.response.take(),
            body: self.body.take(),
            net_error: self.net_error,
        };
        let ack = DidCommitProvisionalLoadParams::for_commit(&params, self.begin_params.has_user_gesture);

        match cx.frame_tree.render_frame_host_mut(id, host_id) {
            Some(host) => {
                host.set_navigation_handle(handle);
                host.commit_navigation(params);
            }
            None => {
                log::warn!(
                    "NavigationRequest: {host_id} of {} went away before commit",
                    self.navigation_id
                );
                drop(handle);
                cx.frame_tree.discard_navigation_request(self, false);
                return Err(Error::RenderFrameHostNotFound(host_id));
            }
        }
        drop(self);
        cx.frame_tree.did_commit_provisional_load(id, host_id, ack)
    }

    /// Ask placement for the frame host to commit in. Returns the host, its
    /// instance and whether it is the current one.
    fn frame_host_for_navigation(
        &mut self,
        cx: &mut NavigationContext<'_>,
    ) -> Result<(RenderFrameHostId, SiteInstanceId, bool)> {
        let id = self.frame_tree_node_id;
        let target = self.navigation_target();
        let (host, is_current) = {
            let mut manager = cx.frame_tree.render_manager(id)?;
            let host = manager.get_frame_host_for_navigation(&target);
            (host, host == manager.current_host_id())
        };
        let instance = cx
            .frame_tree
            .render_frame_host(id, host)
            .map(|host| host.site_instance())
            .ok_or(Error::RenderFrameHostNotFound(host))?;
        self.associated_site_instance_type = if is_current {
            AssociatedSiteInstanceType::Current
        } else {
            AssociatedSiteInstanceType::Speculative
        };
        Ok((host, instance, is_current))
    }

    /// A continuation that reports the verdict of `checkpoint` back to the
    /// navigator.
    fn checks_callback(
        &self,
        tasks: &Sender<NavigatorTask>,
        checkpoint: Checkpoint,
    ) -> ThrottleChecksFinishedCallback {
        let tasks = tasks.clone();
        let frame_tree_node_id = self.frame_tree_node_id;
        let navigation_id = self.navigation_id;
        Box::new(move |result| {
            let task = NavigatorTask::ChecksComplete {
                frame_tree_node_id,
                navigation_id,
                checkpoint,
                result,
            };
            if tasks.send(task).is_err() {
                log::warn!("NavigationRequest: navigator is gone, dropping verdict for {navigation_id}");
            }
        })
    }
}

impl Drop for NavigationRequest {
    fn drop(&mut self) {
        if let Some(mut loader) = self.loader.take() {
            log::debug!(
                "NavigationRequest: {} dropped with its request outstanding",
                self.navigation_id
            );
            loader.abandon();
        }
    }
}

impl fmt::Debug for NavigationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigationRequest")
            .field("navigation_id", &self.navigation_id)
            .field("frame_tree_node_id", &self.frame_tree_node_id)
            .field("url", &self.common_params.url.as_str())
            .field("state", &self.state)
            .field("browser_initiated", &self.browser_initiated)
            .field("net_error", &self.net_error)
            .finish()
    }
}

/// Whether the browser loads `url` itself.
pub fn is_handled_url(url: &Url, policy: &SiteIsolationPolicy) -> bool {
    HANDLED_SCHEMES.contains(&url.scheme())
        || policy.is_web_ui_url(url)
        || policy.requires_privileged_process(url)
}

#[cfg(test)]
mod tests {
    use crate::config::Config;

    use super::*;

    fn request(url: &str) -> Box<NavigationRequest> {
        NavigationRequest::create_renderer_initiated(
            FrameTreeNodeId::new(),
            CommonNavigationParams::new(Url::parse(url).unwrap()),
            BeginNavigationParams::default(),
            false,
            None,
        )
    }

    #[test]
    fn test_is_handled_url() {
        let policy = SiteIsolationPolicy::new(&Config::default());
        assert!(is_handled_url(&Url::parse("https://a.test/").unwrap(), &policy));
        assert!(is_handled_url(&Url::parse("about:blank").unwrap(), &policy));
        assert!(is_handled_url(&Url::parse("webui://settings").unwrap(), &policy));
        assert!(!is_handled_url(&Url::parse("mailto:someone@a.test").unwrap(), &policy));
    }

    #[test]
    fn test_navigation_target_tracks_redirects() {
        let mut request = request("https://a.test/");
        let target = request.navigation_target();
        assert!(target.is_renderer_initiated);
        assert!(!target.was_redirected);

        request
            .request_params
            .redirects
            .push(Url::parse("https://a.test/").unwrap());
        request.common_params.url = Url::parse("https://b.test/").unwrap();
        let target = request.navigation_target();
        assert!(target.was_redirected);
        assert_eq!(target.url.as_str(), "https://b.test/");
    }

    #[test]
    fn test_waiting_for_renderer_response() {
        let mut request = request("https://a.test/");
        let deadline = Instant::now();
        request.set_waiting_for_renderer_response(deadline);
        assert_eq!(request.state(), NavigationState::WaitingForRendererResponse);
        assert_eq!(request.before_unload_deadline(), Some(deadline));
    }

    #[test]
    #[should_panic(expected = "already started")]
    fn test_waiting_twice_panics() {
        let mut request = request("https://a.test/");
        request.set_waiting_for_renderer_response(Instant::now());
        request.set_waiting_for_renderer_response(Instant::now());
    }
}
