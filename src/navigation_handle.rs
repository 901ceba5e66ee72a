//! The per-navigation state machine exposed to delegates and throttles.

use std::fmt;
use std::mem;
use std::rc::Rc;
use std::time::Instant;

use navcore_messages::{
    ConnectionInfo, NavigationData, NavigationId, NetError, PageTransition, Referrer,
    RequestContextType,
};
use url::Url;

use crate::delegate::NavigationDelegate;
use crate::frame_host::DidCommitProvisionalLoadParams;
use crate::id::{FrameTreeNodeId, RenderFrameHostId, SiteInstanceId};
use crate::navigation_throttle::{
    Checkpoint, NavigationThrottle, ThrottleChain, ThrottleCheckResult,
};
use crate::service_worker::{ServiceWorkerContext, ServiceWorkerNavigationHandle};
use crate::site::is_renderer_debug_url;

/// Continuation run once the throttles of a checkpoint reached a verdict.
pub type ThrottleChecksFinishedCallback = Box<dyn FnOnce(ThrottleCheckResult)>;

/// Lifecycle of a [`NavigationHandle`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HandleState {
    Initial,
    WillSendRequest,
    DeferringStart,
    WillRedirectRequest,
    DeferringRedirect,
    WillProcessResponse,
    DeferringResponse,
    Canceling,
    ReadyToCommit,
    DidCommit,
    DidCommitErrorPage,
}

impl HandleState {
    /// Position in the lifecycle. States of one checkpoint share a stage so
    /// that a checkpoint can defer and be re-entered.
    fn stage(self) -> u8 {
        match self {
            HandleState::Initial => 0,
            HandleState::WillSendRequest | HandleState::DeferringStart => 1,
            HandleState::WillRedirectRequest | HandleState::DeferringRedirect => 2,
            HandleState::WillProcessResponse | HandleState::DeferringResponse => 3,
            HandleState::Canceling => 4,
            HandleState::ReadyToCommit => 5,
            HandleState::DidCommit | HandleState::DidCommitErrorPage => 6,
        }
    }

    /// Whether a throttle deferred the navigation.
    pub fn is_deferring(self) -> bool {
        matches!(
            self,
            HandleState::DeferringStart
                | HandleState::DeferringRedirect
                | HandleState::DeferringResponse
        )
    }
}

/// Facts known when a navigation is created.
#[derive(Clone, Debug)]
pub struct NavigationHandleInit {
    pub navigation_id: NavigationId,
    pub url: Url,
    pub frame_tree_node_id: FrameTreeNodeId,
    pub is_main_frame: bool,
    pub is_renderer_initiated: bool,
    pub is_same_document: bool,
    pub navigation_start: Instant,
    pub pending_nav_entry_id: i32,
}

/// Tracks one navigation from its start until it commits or is abandoned.
///
/// Dropping the handle finishes the navigation: an outstanding throttle
/// callback is run with [`ThrottleCheckResult::CancelAndIgnore`] and the
/// delegate is told the navigation finished.
pub struct NavigationHandle {
    navigation_id: NavigationId,
    frame_tree_node_id: FrameTreeNodeId,
    is_main_frame: bool,
    url: Url,
    original_url: Url,
    redirect_chain: Vec<Url>,
    method: http::Method,
    referrer: Referrer,
    has_user_gesture: bool,
    transition: PageTransition,
    is_external_protocol: bool,
    request_context_type: RequestContextType,
    net_error: NetError,
    response_headers: Option<http::HeaderMap>,
    connection_info: ConnectionInfo,
    mime_type: Option<mime::Mime>,
    is_same_document: bool,
    is_renderer_initiated: bool,
    was_redirected: bool,
    did_replace_entry: bool,
    state: HandleState,
    navigation_start: Instant,
    pending_nav_entry_id: i32,
    throttle_chain: ThrottleChain,
    complete_callback: Option<ThrottleChecksFinishedCallback>,
    render_frame_host: Option<RenderFrameHostId>,
    site_instance: Option<SiteInstanceId>,
    service_worker_handle: Option<Box<dyn ServiceWorkerNavigationHandle>>,
    navigation_data: Option<NavigationData>,
    delegate: Rc<dyn NavigationDelegate>,
}

impl NavigationHandle {
    /// Create a handle and tell the delegate the navigation started.
    pub fn new(init: NavigationHandleInit, delegate: Rc<dyn NavigationDelegate>) -> Self {
        let handle = Self {
            navigation_id: init.navigation_id,
            frame_tree_node_id: init.frame_tree_node_id,
            is_main_frame: init.is_main_frame,
            redirect_chain: vec![init.url.clone()],
            original_url: init.url.clone(),
            url: init.url,
            method: http::Method::GET,
            referrer: Referrer::default(),
            has_user_gesture: false,
            transition: PageTransition::default(),
            is_external_protocol: false,
            request_context_type: RequestContextType::default(),
            net_error: NetError::Ok,
            response_headers: None,
            connection_info: ConnectionInfo::default(),
            mime_type: None,
            is_same_document: init.is_same_document,
            is_renderer_initiated: init.is_renderer_initiated,
            was_redirected: false,
            did_replace_entry: false,
            state: HandleState::Initial,
            navigation_start: init.navigation_start,
            pending_nav_entry_id: init.pending_nav_entry_id,
            throttle_chain: ThrottleChain::default(),
            complete_callback: None,
            render_frame_host: None,
            site_instance: None,
            service_worker_handle: None,
            navigation_data: None,
            delegate,
        };
        handle.delegate.did_start_navigation(&handle);
        handle
    }

    pub fn navigation_id(&self) -> NavigationId {
        self.navigation_id
    }

    pub fn frame_tree_node_id(&self) -> FrameTreeNodeId {
        self.frame_tree_node_id
    }

    pub fn is_main_frame(&self) -> bool {
        self.is_main_frame
    }

    /// The current URL, updated on every redirect.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The URL the navigation started with. Never changes.
    pub fn original_url(&self) -> &Url {
        &self.original_url
    }

    /// Every URL the navigation went through, the current one last.
    pub fn redirect_chain(&self) -> &[Url] {
        &self.redirect_chain
    }

    pub fn was_redirected(&self) -> bool {
        self.was_redirected
    }

    pub fn method(&self) -> &http::Method {
        self.assert_started("method");
        &self.method
    }

    pub fn is_post(&self) -> bool {
        self.assert_started("is_post");
        self.method == http::Method::POST
    }

    pub fn referrer(&self) -> &Referrer {
        self.assert_started("referrer");
        &self.referrer
    }

    pub fn has_user_gesture(&self) -> bool {
        self.assert_started("has_user_gesture");
        self.has_user_gesture
    }

    pub fn transition(&self) -> PageTransition {
        self.assert_started("transition");
        self.transition
    }

    pub fn is_external_protocol(&self) -> bool {
        self.assert_started("is_external_protocol");
        self.is_external_protocol
    }

    pub fn request_context_type(&self) -> RequestContextType {
        self.assert_started("request_context_type");
        self.request_context_type
    }

    pub fn net_error(&self) -> NetError {
        self.net_error
    }

    pub fn set_net_error(&mut self, net_error: NetError) {
        self.net_error = net_error;
    }

    /// Headers of the last redirect or of the response.
    pub fn response_headers(&self) -> Option<&http::HeaderMap> {
        self.response_headers.as_ref()
    }

    pub fn connection_info(&self) -> ConnectionInfo {
        self.connection_info
    }

    pub fn mime_type(&self) -> Option<&mime::Mime> {
        self.mime_type.as_ref()
    }

    pub fn is_same_document(&self) -> bool {
        self.is_same_document
    }

    pub fn is_renderer_initiated(&self) -> bool {
        self.is_renderer_initiated
    }

    pub fn did_replace_entry(&self) -> bool {
        self.did_replace_entry
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    pub fn navigation_start(&self) -> Instant {
        self.navigation_start
    }

    pub fn pending_nav_entry_id(&self) -> i32 {
        self.pending_nav_entry_id
    }

    /// The frame host picked to commit, known once the response arrived.
    pub fn render_frame_host(&self) -> Option<RenderFrameHostId> {
        self.render_frame_host
    }

    /// The site instance of [`Self::render_frame_host`].
    pub fn site_instance(&self) -> Option<SiteInstanceId> {
        self.site_instance
    }

    pub fn has_committed(&self) -> bool {
        matches!(
            self.state,
            HandleState::DidCommit | HandleState::DidCommitErrorPage
        )
    }

    pub fn is_error_page(&self) -> bool {
        self.state == HandleState::DidCommitErrorPage
    }

    /// Whether a throttle callback is outstanding.
    pub fn has_pending_callback(&self) -> bool {
        self.complete_callback.is_some()
    }

    pub fn service_worker_handle(&self) -> Option<&dyn ServiceWorkerNavigationHandle> {
        self.service_worker_handle.as_deref()
    }

    /// Start the service worker lookup for this navigation.
    pub fn init_service_worker_handle(&mut self, context: &dyn ServiceWorkerContext) {
        self.service_worker_handle = Some(context.create_navigation_handle(&self.url));
    }

    pub fn navigation_data(&self) -> Option<&NavigationData> {
        self.navigation_data.as_ref()
    }

    pub fn set_navigation_data(&mut self, navigation_data: NavigationData) {
        self.navigation_data = Some(navigation_data);
    }

    /// Register throttles directly, in addition to the delegate's.
    pub fn register_throttles(&mut self, throttles: Vec<Box<dyn NavigationThrottle>>) {
        self.throttle_chain.register(throttles);
    }

    /// The request is about to start.
    #[allow(clippy::too_many_arguments)]
    pub fn will_start_request(
        &mut self,
        method: http::Method,
        referrer: Referrer,
        has_user_gesture: bool,
        transition: PageTransition,
        is_external_protocol: bool,
        request_context_type: RequestContextType,
        callback: ThrottleChecksFinishedCallback,
    ) {
        self.method = method;
        self.referrer = referrer;
        self.has_user_gesture = has_user_gesture;
        self.transition = transition;
        self.is_external_protocol = is_external_protocol;
        self.request_context_type = request_context_type;
        self.set_state(HandleState::WillSendRequest);
        self.set_complete_callback(callback);

        let throttles = self.delegate.create_throttles_for_navigation(self);
        self.throttle_chain.register(throttles);

        let result = self.check_will_start_request();
        if result != ThrottleCheckResult::Defer {
            self.run_complete_callback(result);
        }
    }

    /// A redirect to `new_url` is about to be followed.
    #[allow(clippy::too_many_arguments)]
    pub fn will_redirect_request(
        &mut self,
        new_url: Url,
        new_method: http::Method,
        new_referrer: Option<Url>,
        is_external_protocol: bool,
        response_headers: http::HeaderMap,
        connection_info: ConnectionInfo,
        callback: ThrottleChecksFinishedCallback,
    ) {
        self.redirect_chain.push(new_url.clone());
        self.url = new_url;
        self.method = new_method;
        self.referrer.url = new_referrer;
        self.is_external_protocol = is_external_protocol;
        self.response_headers = Some(response_headers);
        self.connection_info = connection_info;
        self.was_redirected = true;
        self.set_state(HandleState::WillRedirectRequest);
        self.set_complete_callback(callback);

        let result = self.check_will_redirect_request();
        if result != ThrottleCheckResult::Defer {
            self.run_complete_callback(result);
        }
    }

    /// The response arrived and will be committed in `render_frame_host`.
    pub fn will_process_response(
        &mut self,
        render_frame_host: RenderFrameHostId,
        site_instance: SiteInstanceId,
        response_headers: http::HeaderMap,
        connection_info: ConnectionInfo,
        mime_type: Option<mime::Mime>,
        callback: ThrottleChecksFinishedCallback,
    ) {
        self.render_frame_host = Some(render_frame_host);
        self.site_instance = Some(site_instance);
        self.response_headers = Some(response_headers);
        self.connection_info = connection_info;
        self.mime_type = mime_type;
        self.set_state(HandleState::WillProcessResponse);
        self.set_complete_callback(callback);

        let result = self.check_will_process_response();
        if result == ThrottleCheckResult::Proceed {
            self.ready_to_commit_navigation(render_frame_host, site_instance);
        }
        if result != ThrottleCheckResult::Defer {
            self.run_complete_callback(result);
        }
    }

    /// Resume a deferred navigation. Does nothing unless a throttle deferred.
    pub fn resume(&mut self) {
        let result = match self.state {
            HandleState::DeferringStart => self.check_will_start_request(),
            HandleState::DeferringRedirect => self.check_will_redirect_request(),
            HandleState::DeferringResponse => {
                let result = self.check_will_process_response();
                if result == ThrottleCheckResult::Proceed {
                    if let (Some(rfh), Some(site_instance)) =
                        (self.render_frame_host, self.site_instance)
                    {
                        self.ready_to_commit_navigation(rfh, site_instance);
                    }
                }
                result
            }
            _ => return,
        };
        if result != ThrottleCheckResult::Defer {
            self.run_complete_callback(result);
        }
    }

    /// Cancel a deferred navigation with `result`.
    ///
    /// Blocking is only allowed while deferring the start of the request and
    /// leads to an error page rather than a cancellation.
    pub fn cancel_deferred_navigation(&mut self, result: ThrottleCheckResult) {
        assert!(
            self.state.is_deferring(),
            "{} is not deferred ({:?})",
            self.navigation_id,
            self.state
        );
        assert!(
            result.is_cancel() || result == ThrottleCheckResult::BlockRequest,
            "{result:?} does not cancel a navigation"
        );
        if result == ThrottleCheckResult::BlockRequest {
            assert_eq!(
                self.state,
                HandleState::DeferringStart,
                "a request can only be blocked before it starts"
            );
        } else {
            self.set_state(HandleState::Canceling);
        }
        self.run_complete_callback(result);
    }

    /// The navigation will commit in `render_frame_host`.
    pub fn ready_to_commit_navigation(
        &mut self,
        render_frame_host: RenderFrameHostId,
        site_instance: SiteInstanceId,
    ) {
        self.render_frame_host = Some(render_frame_host);
        self.site_instance = Some(site_instance);
        self.set_state(HandleState::ReadyToCommit);
        if !is_renderer_debug_url(&self.url) && !self.is_same_document {
            self.delegate.ready_to_commit_navigation(self);
        }
    }

    /// The renderer committed the navigation.
    pub fn did_commit_navigation(
        &mut self,
        params: &DidCommitProvisionalLoadParams,
        did_replace_entry: bool,
        render_frame_host: RenderFrameHostId,
        site_instance: SiteInstanceId,
    ) {
        assert_eq!(
            self.url, params.url,
            "{} committed a different URL",
            self.navigation_id
        );
        self.did_replace_entry = did_replace_entry;
        self.method = params.method.clone();
        self.has_user_gesture = params.has_user_gesture;
        self.transition = params.transition;
        self.render_frame_host = Some(render_frame_host);
        self.site_instance = Some(site_instance);
        if params.url_is_unreachable || self.net_error != NetError::Ok {
            self.set_state(HandleState::DidCommitErrorPage);
        } else {
            self.set_state(HandleState::DidCommit);
        }
    }

    fn check_will_start_request(&mut self) -> ThrottleCheckResult {
        debug_assert!(matches!(
            self.state,
            HandleState::WillSendRequest | HandleState::DeferringStart
        ));
        match self.run_throttles(Checkpoint::WillStartRequest) {
            ThrottleCheckResult::Proceed => {
                self.set_state(HandleState::WillSendRequest);
                ThrottleCheckResult::Proceed
            }
            ThrottleCheckResult::Defer => {
                self.set_state(HandleState::DeferringStart);
                ThrottleCheckResult::Defer
            }
            ThrottleCheckResult::BlockRequest => ThrottleCheckResult::BlockRequest,
            result => {
                self.set_state(HandleState::Canceling);
                result
            }
        }
    }

    fn check_will_redirect_request(&mut self) -> ThrottleCheckResult {
        debug_assert!(matches!(
            self.state,
            HandleState::WillRedirectRequest | HandleState::DeferringRedirect
        ));
        match self.run_throttles(Checkpoint::WillRedirectRequest) {
            ThrottleCheckResult::Proceed => {
                self.set_state(HandleState::WillRedirectRequest);
                self.delegate.did_redirect_navigation(self);
                ThrottleCheckResult::Proceed
            }
            ThrottleCheckResult::Defer => {
                self.set_state(HandleState::DeferringRedirect);
                ThrottleCheckResult::Defer
            }
            result => {
                self.set_state(HandleState::Canceling);
                result
            }
        }
    }

    fn check_will_process_response(&mut self) -> ThrottleCheckResult {
        debug_assert!(matches!(
            self.state,
            HandleState::WillProcessResponse | HandleState::DeferringResponse
        ));
        match self.run_throttles(Checkpoint::WillProcessResponse) {
            ThrottleCheckResult::Proceed => {
                self.set_state(HandleState::WillProcessResponse);
                ThrottleCheckResult::Proceed
            }
            ThrottleCheckResult::Defer => {
                self.set_state(HandleState::DeferringResponse);
                ThrottleCheckResult::Defer
            }
            result => {
                self.set_state(HandleState::Canceling);
                result
            }
        }
    }

    fn run_throttles(&mut self, checkpoint: Checkpoint) -> ThrottleCheckResult {
        let mut chain = mem::take(&mut self.throttle_chain);
        let result = chain.check(checkpoint, self);
        self.throttle_chain = chain;
        log::debug!(
            "NavigationHandle: {} {checkpoint:?} -> {result:?}",
            self.navigation_id
        );
        result
    }

    fn set_complete_callback(&mut self, callback: ThrottleChecksFinishedCallback) {
        assert!(
            self.complete_callback.is_none(),
            "{} already has a pending throttle callback",
            self.navigation_id
        );
        self.complete_callback = Some(callback);
    }

    fn run_complete_callback(&mut self, result: ThrottleCheckResult) {
        debug_assert_ne!(result, ThrottleCheckResult::Defer);
        if let Some(callback) = self.complete_callback.take() {
            callback(result);
        }
    }

    fn set_state(&mut self, state: HandleState) {
        assert!(
            state.stage() >= self.state.stage(),
            "{} cannot go from {:?} to {state:?}",
            self.navigation_id,
            self.state
        );
        self.state = state;
    }

    fn assert_started(&self, accessor: &str) {
        assert_ne!(
            self.state,
            HandleState::Initial,
            "NavigationHandle::{accessor} called before the request started"
        );
    }
}

impl fmt::Debug for NavigationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigationHandle")
            .field("navigation_id", &self.navigation_id)
            .field("frame_tree_node_id", &self.frame_tree_node_id)
            .field("url", &self.url.as_str())
            .field("state", &self.state)
            .field("net_error", &self.net_error)
            .finish()
    }
}

impl Drop for NavigationHandle {
    fn drop(&mut self) {
        if self.complete_callback.is_some() {
            log::debug!(
                "NavigationHandle: {} dropped with a pending callback",
                self.navigation_id
            );
            self.run_complete_callback(ThrottleCheckResult::CancelAndIgnore);
        }
        if !is_renderer_debug_url(&self.url) {
            self.delegate.did_finish_navigation(self);
        }
    }
}
