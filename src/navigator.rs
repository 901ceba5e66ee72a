//! The entry points of the navigation core.
//!
//! A [`Navigator`] owns the frame trees of every page and routes the events
//! of the outside world (user navigations, renderer messages, loader events,
//! throttle decisions) to the navigation requests they concern. Throttle
//! verdicts come back as [`NavigatorTask`]s and are run once the entry
//! point that triggered them is done, so a request is never re-entered.

use std::rc::Rc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use navcore_messages::{
    BeginNavigationParams, CommonNavigationParams, FromLoaderMessage, LoadFlags, LoaderEvent,
    NavigationId, NavigationType, NetError, PageTransition, Referrer, RequestContextType,
    RequestNavigationParams, RestoreType,
};
use url::Url;

use crate::config::Config;
use crate::delegate::NavigationDelegate;
use crate::errors::{Error, Result};
use crate::frame_host::DidCommitProvisionalLoadParams;
use crate::frame_tree::{FrameTree, FrameTreeNodeObserver};
use crate::frame_tree_node::{ContentSecurityPolicyHeader, InsecureRequestPolicy, SandboxFlags};
use crate::id::{BrowserContextId, FrameTreeNodeId, PageId, RenderFrameHostId, SiteInstanceId};
use crate::loader::NavigationLoaderFactory;
use crate::navigation_request::{NavigationContext, NavigationRequest, NavigationState};
use crate::navigation_throttle::{Checkpoint, ThrottleCheckResult};
use crate::service_worker::ServiceWorkerContext;
use crate::site::{should_make_network_request_for_url, strip_view_source};

/// Parameters of a navigation asked for by the browser or by a document.
#[derive(Clone, Debug)]
pub struct NavigateParams {
    pub url: Url,
    pub referrer: Referrer,
    pub transition: PageTransition,
    pub navigation_type: NavigationType,
    pub method: http::Method,
    pub post_data: Option<Vec<u8>>,
    pub extra_headers: http::HeaderMap,
    pub load_flags: LoadFlags,
    pub has_user_gesture: bool,
    pub should_replace_current_entry: bool,
    pub skip_service_worker: bool,
    pub request_context_type: RequestContextType,
    /// Set when restoring a session.
    pub restore_type: RestoreType,
    /// Id of the history entry being navigated to, 0 for a new entry.
    pub nav_entry_id: i32,
    /// Instance of the frame that initiated the navigation.
    pub source_site_instance: Option<SiteInstanceId>,
    /// Instance the navigation must commit in, if already known.
    pub dest_site_instance: Option<SiteInstanceId>,
}

impl NavigateParams {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            referrer: Referrer::default(),
            transition: PageTransition::default(),
            navigation_type: NavigationType::default(),
            method: http::Method::GET,
            post_data: None,
            extra_headers: http::HeaderMap::new(),
            load_flags: LoadFlags::empty(),
            has_user_gesture: false,
            should_replace_current_entry: false,
            skip_service_worker: false,
            request_context_type: RequestContextType::default(),
            restore_type: RestoreType::None,
            nav_entry_id: 0,
            source_site_instance: None,
            dest_site_instance: None,
        }
    }

    fn into_params(
        self,
    ) -> (
        CommonNavigationParams,
        BeginNavigationParams,
        bool,
        RestoreType,
        i32,
    ) {
        let (url, is_view_source) = match strip_view_source(&self.url) {
            Some(inner) => (inner, true),
            None => (self.url, false),
        };
        let common_params = CommonNavigationParams {
            url,
            referrer: self.referrer,
            transition: self.transition,
            navigation_type: self.navigation_type,
            method: self.method,
            should_replace_current_entry: self.should_replace_current_entry,
            post_data: self.post_data,
        };
        let begin_params = BeginNavigationParams {
            headers: self.extra_headers,
            load_flags: self.load_flags,
            has_user_gesture: self.has_user_gesture,
            skip_service_worker: self.skip_service_worker,
            request_context_type: self.request_context_type,
        };
        (
            common_params,
            begin_params,
            is_view_source,
            self.restore_type,
            self.nav_entry_id,
        )
    }
}

/// Work queued while a request was taken out of its node.
#[derive(Debug)]
pub(crate) enum NavigatorTask {
    /// The throttles of `checkpoint` reached `result`.
    ChecksComplete {
        frame_tree_node_id: FrameTreeNodeId,
        navigation_id: NavigationId,
        checkpoint: Checkpoint,
        result: ThrottleCheckResult,
    },
}

/// Coordinates navigations across every page.
pub struct Navigator {
    frame_tree: FrameTree,
    loader_factory: Box<dyn NavigationLoaderFactory>,
    service_worker_context: Option<Box<dyn ServiceWorkerContext>>,
    task_sender: Sender<NavigatorTask>,
    task_receiver: Receiver<NavigatorTask>,
    loader_event_sender: Sender<LoaderEvent>,
    loader_event_receiver: Receiver<LoaderEvent>,
}

impl Navigator {
    pub fn new(
        config: Config,
        delegate: Rc<dyn NavigationDelegate>,
        loader_factory: Box<dyn NavigationLoaderFactory>,
    ) -> Self {
        let (task_sender, task_receiver) = crossbeam_channel::unbounded();
        let (loader_event_sender, loader_event_receiver) = crossbeam_channel::unbounded();
        Self {
            frame_tree: FrameTree::new(config, delegate),
            loader_factory,
            service_worker_context: None,
            task_sender,
            task_receiver,
            loader_event_sender,
            loader_event_receiver,
        }
    }

    /// Look up service workers for http(s) navigations in `context`.
    pub fn with_service_worker_context(mut self, context: Box<dyn ServiceWorkerContext>) -> Self {
        self.service_worker_context = Some(context);
        self
    }

    pub fn frame_tree(&self) -> &FrameTree {
        &self.frame_tree
    }

    pub fn config(&self) -> &Config {
        self.frame_tree.config()
    }

    /// Where loaders deliver their events, picked up by
    /// [`Navigator::process_loader_events`].
    pub fn loader_event_sender(&self) -> Sender<LoaderEvent> {
        self.loader_event_sender.clone()
    }

    /// The navigation in flight in `id`, if any.
    pub fn navigation_request(&self, id: FrameTreeNodeId) -> Option<&NavigationRequest> {
        self.frame_tree.node(id)?.navigation_request()
    }

    pub fn add_observer(&mut self, observer: Rc<dyn FrameTreeNodeObserver>) {
        self.frame_tree.add_observer(observer);
    }

    fn context(&mut self) -> NavigationContext<'_> {
        NavigationContext {
            frame_tree: &mut self.frame_tree,
            loader_factory: &*self.loader_factory,
            service_worker_context: self.service_worker_context.as_deref(),
            tasks: &self.task_sender,
        }
    }

    /// Run `result` to completion, then everything it queued.
    fn finish<T>(&mut self, result: Result<T>) -> Result<T> {
        self.run_tasks();
        result
    }

    pub fn create_page(&mut self, browser_context: BrowserContextId) -> PageId {
        self.frame_tree.create_page(browser_context)
    }

    /// Open a popup from `opener`, see [`FrameTree::create_popup`].
    pub fn create_popup(
        &mut self,
        opener: FrameTreeNodeId,
        name: &str,
        noopener: bool,
    ) -> Result<PageId> {
        self.frame_tree.create_popup(opener, name, noopener)
    }

    pub fn close_page(&mut self, page_id: PageId) -> Result<()> {
        let result = self.frame_tree.close_page(page_id);
        self.finish(result)
    }

    pub fn add_child_frame(
        &mut self,
        parent: FrameTreeNodeId,
        name: &str,
        sandbox_flags: SandboxFlags,
    ) -> Result<FrameTreeNodeId> {
        self.frame_tree.add_child(parent, name, sandbox_flags)
    }

    pub fn remove_frame(&mut self, id: FrameTreeNodeId) -> Result<()> {
        let result = self.frame_tree.remove_frame(id);
        self.finish(result)
    }

    /// Start a browser-initiated navigation of `id`.
    ///
    /// A live document with a before-unload handler gets to run it first:
    /// the request waits until [`Navigator::on_before_unload_ack`] or until
    /// the configured timeout passes in [`Navigator::tick`].
    pub fn navigate(&mut self, id: FrameTreeNodeId, params: NavigateParams) -> Result<NavigationId> {
        self.check_site_instances(&params)?;
        let node = self
            .frame_tree
            .node(id)
            .ok_or(Error::FrameTreeNodeNotFound(id))?;
        let has_committed_real_load = node.has_committed_real_load();
        let current = node.current_frame_host();
        let source_site_instance = params.source_site_instance;
        let dest_site_instance = params.dest_site_instance;
        let is_same_document = params.navigation_type.is_same_document();
        let (common_params, begin_params, is_view_source, restore_type, nav_entry_id) =
            params.into_params();
        let waits_for_before_unload = current.is_render_frame_live()
            && current.has_before_unload_handler()
            && !is_same_document
            && should_make_network_request_for_url(&common_params.url);

        let request_params = RequestNavigationParams {
            nav_entry_id,
            is_view_source,
            has_committed_real_load,
            intended_as_new_entry: nav_entry_id == 0 && !common_params.should_replace_current_entry,
            ..RequestNavigationParams::default()
        };
        let mut request = NavigationRequest::create_browser_initiated(
            id,
            common_params,
            begin_params,
            request_params,
            restore_type,
            source_site_instance,
            dest_site_instance,
        );
        let navigation_id = request.navigation_id();
        if waits_for_before_unload {
            let deadline = Instant::now() + self.frame_tree.config().before_unload_timeout;
            log::debug!("Navigator: {navigation_id} waits for before-unload of {id}");
            request.set_waiting_for_renderer_response(deadline);
        }

        let result = self
            .frame_tree
            .created_navigation_request(request)
            .and_then(|()| {
                if waits_for_before_unload {
                    Ok(())
                } else {
                    self.begin_navigation(id)
                }
            });
        self.finish(result).map(|()| navigation_id)
    }

    /// Start a navigation the document of `id` asked for.
    ///
    /// Returns `None` when the navigation is ignored: without a user gesture
    /// a document may not interrupt a browser-initiated navigation that
    /// already started.
    pub fn begin_renderer_navigation(
        &mut self,
        id: FrameTreeNodeId,
        params: NavigateParams,
    ) -> Result<Option<NavigationId>> {
        self.check_site_instances(&params)?;
        let node = self
            .frame_tree
            .node(id)
            .ok_or(Error::FrameTreeNodeNotFound(id))?;
        if let Some(ongoing) = node.navigation_request() {
            if ongoing.is_browser_initiated()
                && ongoing.state() != NavigationState::NotStarted
                && !params.has_user_gesture
            {
                log::debug!(
                    "Navigator: ignoring renderer navigation of {id} to {}, {} is in flight",
                    params.url,
                    ongoing.navigation_id()
                );
                return Ok(None);
            }
        }
        let has_committed_real_load = node.has_committed_real_load();
        let source_site_instance = params
            .source_site_instance
            .or(Some(node.current_frame_host().site_instance()));
        let (common_params, begin_params, ..) = params.into_params();

        let request = NavigationRequest::create_renderer_initiated(
            id,
            common_params,
            begin_params,
            has_committed_real_load,
            source_site_instance,
        );
        let navigation_id = request.navigation_id();
        let result = self
            .frame_tree
            .created_navigation_request(request)
            .and_then(|()| self.begin_navigation(id));
        self.finish(result).map(|()| Some(navigation_id))
    }

    /// Site instances named by `params` must still be alive.
    fn check_site_instances(&self, params: &NavigateParams) -> Result<()> {
        let instances = [params.source_site_instance, params.dest_site_instance];
        match instances
            .into_iter()
            .flatten()
            .find(|&instance| self.frame_tree.site_instances().get(instance).is_none())
        {
            Some(instance) => Err(Error::SiteInstanceNotFound(instance)),
            None => Ok(()),
        }
    }

    fn begin_navigation(&mut self, id: FrameTreeNodeId) -> Result<()> {
        let request = self
            .frame_tree
            .take_navigation_request(id)
            .ok_or(Error::FrameTreeNodeNotFound(id))?;
        request.begin_navigation(&mut self.context())
    }

    /// Deliver one loader event. Events for navigations that are gone
    /// report [`Error::NavigationNotFound`].
    pub fn handle_loader_event(&mut self, event: LoaderEvent) -> Result<()> {
        let result = self.dispatch_loader_event(event);
        self.finish(result)
    }

    /// Deliver every loader event received so far.
    pub fn process_loader_events(&mut self) {
        let events: Vec<LoaderEvent> = self.loader_event_receiver.try_iter().collect();
        for event in events {
            self.deliver_loader_event(event);
        }
    }

    /// Block until a loader event arrives or `timeout` passes, then deliver
    /// it and whatever arrived with it. Returns whether anything arrived.
    pub fn wait_for_loader_events(&mut self, timeout: Duration) -> bool {
        match self.loader_event_receiver.recv_timeout(timeout) {
            Ok(event) => {
                self.deliver_loader_event(event);
                self.process_loader_events();
                true
            }
            Err(_) => false,
        }
    }

    fn deliver_loader_event(&mut self, event: LoaderEvent) {
        match self.handle_loader_event(event) {
            Ok(()) => {}
            Err(Error::NavigationNotFound(navigation_id)) => {
                log::debug!("Navigator: dropping loader event of finished {navigation_id}");
            }
            Err(error) => log::warn!("Navigator: loader event failed: {error}"),
        }
    }

    fn dispatch_loader_event(&mut self, event: LoaderEvent) -> Result<()> {
        let LoaderEvent {
            navigation_id,
            message,
        } = event;
        let id = self
            .find_navigation(navigation_id)
            .ok_or(Error::NavigationNotFound(navigation_id))?;
        let Some(request) = self.frame_tree.take_navigation_request(id) else {
            return Err(Error::NavigationNotFound(navigation_id));
        };
        let waiting_for_loader = request.state() == NavigationState::Started
            && request.has_loader()
            && !request
                .navigation_handle()
                .is_some_and(|handle| handle.has_pending_callback());
        if !waiting_for_loader {
            log::warn!(
                "Navigator: {navigation_id} is not waiting for the loader, dropping {message:?}"
            );
            self.frame_tree.restore_navigation_request(request);
            return Ok(());
        }

        let mut cx = self.context();
        match message {
            FromLoaderMessage::Redirected {
                redirect_info,
                response,
            } => request.on_request_redirected(redirect_info, response, &mut cx),
            FromLoaderMessage::ResponseStarted {
                response,
                body,
                navigation_data,
            } => request.on_response_started(response, body, navigation_data, &mut cx),
            FromLoaderMessage::Failed {
                has_stale_copy_in_cache,
                net_error,
            } => request.on_request_failed(has_stale_copy_in_cache, net_error, &mut cx),
        }
    }

    fn find_navigation(&self, navigation_id: NavigationId) -> Option<FrameTreeNodeId> {
        self.frame_tree
            .nodes
            .iter()
            .find(|(_, node)| {
                node.navigation_request()
                    .is_some_and(|request| request.navigation_id() == navigation_id)
            })
            .map(|(id, _)| *id)
    }

    /// Resume the navigation of `id` if a throttle deferred it.
    pub fn resume_navigation(&mut self, id: FrameTreeNodeId) -> Result<()> {
        let mut request = self
            .frame_tree
            .take_navigation_request(id)
            .ok_or(Error::NoDeferredNavigation(id))?;
        if let Some(handle) = request.navigation_handle_mut() {
            handle.resume();
        }
        self.frame_tree.restore_navigation_request(request);
        self.finish(Ok(()))
    }

    /// Cancel the deferred navigation of `id` on behalf of a throttle.
    /// [`ThrottleCheckResult::BlockRequest`] is only valid while the start
    /// of the request is deferred and shows an error page.
    pub fn cancel_deferred_navigation(
        &mut self,
        id: FrameTreeNodeId,
        result: ThrottleCheckResult,
    ) -> Result<()> {
        let is_deferred = self
            .navigation_request(id)
            .and_then(NavigationRequest::navigation_handle)
            .is_some_and(|handle| handle.state().is_deferring());
        if !is_deferred {
            return Err(Error::NoDeferredNavigation(id));
        }
        let mut request = self
            .frame_tree
            .take_navigation_request(id)
            .ok_or(Error::NoDeferredNavigation(id))?;
        if let Some(handle) = request.navigation_handle_mut() {
            handle.cancel_deferred_navigation(result);
        }
        self.frame_tree.restore_navigation_request(request);
        self.finish(Ok(()))
    }

    /// The document of `id` ran its before-unload handler.
    pub fn on_before_unload_ack(&mut self, id: FrameTreeNodeId, proceed: bool) -> Result<()> {
        let is_waiting = self
            .navigation_request(id)
            .is_some_and(|request| request.state() == NavigationState::WaitingForRendererResponse);
        if !is_waiting {
            log::debug!("Navigator: unexpected before-unload ack from {id}");
            return Ok(());
        }
        let result = if proceed {
            self.begin_navigation(id)
        } else {
            log::debug!("Navigator: before-unload of {id} cancelled the navigation");
            if let Some(mut request) = self.frame_tree.take_navigation_request(id) {
                request.set_net_error(NetError::Aborted);
                self.frame_tree.discard_navigation_request(request, false);
            }
            Ok(())
        };
        self.finish(result)
    }

    /// Start every navigation whose before-unload wait expired by `now`.
    pub fn tick(&mut self, now: Instant) {
        let expired: Vec<FrameTreeNodeId> = self
            .frame_tree
            .nodes
            .iter()
            .filter(|(_, node)| {
                node.navigation_request().is_some_and(|request| {
                    request.state() == NavigationState::WaitingForRendererResponse
                        && request
                            .before_unload_deadline()
                            .is_some_and(|deadline| deadline <= now)
                })
            })
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            log::warn!("Navigator: before-unload of {id} timed out, proceeding");
            let result = self.begin_navigation(id);
            if let Err(error) = self.finish(result) {
                log::warn!("Navigator: navigation of {id} failed to start: {error}");
            }
        }
    }

    /// Stop every navigation and load of a page.
    pub fn stop(&mut self, page_id: PageId) -> Result<()> {
        if self.frame_tree.page(page_id).is_none() {
            return Err(Error::PageNotFound(page_id));
        }
        for id in self.frame_tree.nodes_of_page(page_id) {
            if let Some(mut request) = self.frame_tree.take_navigation_request(id) {
                request.set_net_error(NetError::Aborted);
                self.frame_tree.discard_navigation_request(request, false);
            }
            if self.frame_tree.node(id).is_some_and(|node| node.is_loading()) {
                self.frame_tree.did_stop_loading(id);
            }
        }
        self.finish(Ok(()))
    }

    /// A renderer committed a document on its own, e.g. a same-document
    /// navigation or the initial empty document.
    pub fn did_commit_provisional_load(
        &mut self,
        id: FrameTreeNodeId,
        host: RenderFrameHostId,
        params: DidCommitProvisionalLoadParams,
    ) -> Result<()> {
        let result = self.frame_tree.did_commit_provisional_load(id, host, params);
        self.finish(result)
    }

    pub fn on_swap_out_ack(&mut self, id: FrameTreeNodeId, host: RenderFrameHostId) -> Result<()> {
        self.frame_tree.on_swap_out_ack(id, host)
    }

    pub fn render_process_gone(&mut self, instance: SiteInstanceId) {
        self.frame_tree.render_process_gone(instance);
        self.run_tasks();
    }

    pub fn set_opener(&mut self, id: FrameTreeNodeId, opener: Option<FrameTreeNodeId>) -> Result<()> {
        self.frame_tree.set_opener(id, opener)
    }

    pub fn set_frame_name(&mut self, id: FrameTreeNodeId, name: &str, unique_name: &str) -> Result<()> {
        self.frame_tree.set_frame_name(id, name, unique_name)
    }

    pub fn set_has_before_unload_handler(
        &mut self,
        id: FrameTreeNodeId,
        has_handler: bool,
    ) -> Result<()> {
        self.frame_tree.set_has_before_unload_handler(id, has_handler)
    }

    pub fn add_content_security_policy(
        &mut self,
        id: FrameTreeNodeId,
        header: ContentSecurityPolicyHeader,
    ) -> Result<()> {
        self.frame_tree.add_content_security_policy(id, header)
    }

    pub fn reset_content_security_policy(&mut self, id: FrameTreeNodeId) -> Result<()> {
        self.frame_tree.reset_content_security_policy(id)
    }

    pub fn set_insecure_request_policy(
        &mut self,
        id: FrameTreeNodeId,
        policy: InsecureRequestPolicy,
    ) -> Result<()> {
        self.frame_tree.set_insecure_request_policy(id, policy)
    }

    pub fn update_sandbox_flags(&mut self, id: FrameTreeNodeId, flags: SandboxFlags) -> Result<()> {
        self.frame_tree.update_sandbox_flags(id, flags)
    }

    pub fn set_page_hidden(&mut self, page_id: PageId, hidden: bool) -> Result<()> {
        self.frame_tree.set_page_hidden(page_id, hidden)
    }

    pub fn focus_frame(&mut self, id: FrameTreeNodeId) -> Result<()> {
        self.frame_tree.focus_frame(id)
    }

    /// The document of `id` started loading on its own.
    pub fn did_start_loading(&mut self, id: FrameTreeNodeId, to_different_document: bool) -> Result<()> {
        let page_id = self
            .frame_tree
            .node(id)
            .ok_or(Error::FrameTreeNodeNotFound(id))?
            .page_id();
        let was_previously_loading = self.frame_tree.is_page_loading(page_id);
        self.frame_tree
            .did_start_loading(id, to_different_document, was_previously_loading);
        Ok(())
    }

    pub fn did_stop_loading(&mut self, id: FrameTreeNodeId) -> Result<()> {
        if self.frame_tree.node(id).is_none() {
            return Err(Error::FrameTreeNodeNotFound(id));
        }
        self.frame_tree.did_stop_loading(id);
        Ok(())
    }

    /// The document of `id` reports its load progress, between 0 and 1.
    pub fn set_loading_progress(&mut self, id: FrameTreeNodeId, progress: f64) -> Result<()> {
        if self.frame_tree.node(id).is_none() {
            return Err(Error::FrameTreeNodeNotFound(id));
        }
        self.frame_tree
            .did_change_load_progress(id, progress.clamp(0.0, 1.0));
        Ok(())
    }

    fn run_tasks(&mut self) {
        while let Ok(task) = self.task_receiver.try_recv() {
            if let Err(error) = self.run_task(task) {
                log::warn!("Navigator: {error}");
            }
        }
    }

    fn run_task(&mut self, task: NavigatorTask) -> Result<()> {
        match task {
            NavigatorTask::ChecksComplete {
                frame_tree_node_id,
                navigation_id,
                checkpoint,
                result,
            } => {
                let is_current = self
                    .navigation_request(frame_tree_node_id)
                    .is_some_and(|request| request.navigation_id() == navigation_id);
                if !is_current {
                    log::trace!(
                        "Navigator: dropping {checkpoint:?} verdict of finished {navigation_id}"
                    );
                    return Ok(());
                }
                let Some(request) = self.frame_tree.take_navigation_request(frame_tree_node_id)
                else {
                    return Ok(());
                };
                log::trace!("Navigator: {navigation_id} {checkpoint:?} -> {result:?}");
                let mut cx = self.context();
                match checkpoint {
                    Checkpoint::WillStartRequest => {
                        request.on_start_checks_complete(result, &mut cx)
                    }
                    Checkpoint::WillRedirectRequest => {
                        request.on_redirect_checks_complete(result, &mut cx)
                    }
                    Checkpoint::WillProcessResponse => {
                        request.on_will_process_response_checks_complete(result, &mut cx)
                    }
                }
            }
        }
    }
}
