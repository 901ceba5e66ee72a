//! Placement of navigations into site instances, and the swap of a node's
//! current frame host once a navigation to another instance commits.

use std::collections::HashMap;

use navcore_messages::{PageTransition, PageTransitionType};
use url::Url;

use crate::config::ProcessModel;
use crate::frame_host::{RenderFrameHost, RenderFrameProxyHost};
use crate::frame_tree::FrameTree;
use crate::frame_tree_node::FrameTreeNode;
use crate::id::{BrowserContextId, FrameTreeNodeId, PageId, RenderFrameHostId, SiteInstanceId};
use crate::page::Page;
use crate::site::{
    is_about_blank, is_renderer_debug_url, is_same_web_site, should_assign_site_for_url,
    should_make_network_request_for_url, ProcessPrivilege, Site, DATA_SCHEME, DEVTOOLS_SCHEME,
    GUEST_SCHEME,
};
use crate::site_instance::SiteInstance;

/// The frame hosts and proxies of one node.
#[derive(Debug)]
pub struct RenderManagerState {
    pub(crate) current: RenderFrameHost,
    pub(crate) speculative: Option<RenderFrameHost>,
    pub(crate) proxies: HashMap<SiteInstanceId, RenderFrameProxyHost>,
    pub(crate) pending_delete: Vec<RenderFrameHost>,
    /// Whether the last commit was a view-source page. `None` before the
    /// first commit.
    pub(crate) current_is_view_source: Option<bool>,
}

impl RenderManagerState {
    pub(crate) fn new(current: RenderFrameHost) -> Self {
        Self {
            current,
            speculative: None,
            proxies: HashMap::new(),
            pending_delete: Vec::new(),
            current_is_view_source: None,
        }
    }

    pub fn current(&self) -> &RenderFrameHost {
        &self.current
    }

    /// The host a navigation to another site instance will commit in.
    pub fn speculative(&self) -> Option<&RenderFrameHost> {
        self.speculative.as_ref()
    }

    pub fn proxy(&self, instance: SiteInstanceId) -> Option<&RenderFrameProxyHost> {
        self.proxies.get(&instance)
    }

    pub fn proxies(&self) -> impl Iterator<Item = &RenderFrameProxyHost> {
        self.proxies.values()
    }

    pub fn proxy_count(&self) -> usize {
        self.proxies.len()
    }

    /// Swapped out hosts waiting for their renderer to acknowledge.
    pub fn pending_delete(&self) -> &[RenderFrameHost] {
        &self.pending_delete
    }

    pub fn current_is_view_source(&self) -> Option<bool> {
        self.current_is_view_source
    }
}

/// What placement needs to know about a navigation.
#[derive(Clone, Debug)]
pub(crate) struct NavigationTarget {
    pub url: Url,
    pub source_site_instance: Option<SiteInstanceId>,
    pub dest_site_instance: Option<SiteInstanceId>,
    pub transition: PageTransition,
    pub is_restore: bool,
    pub is_view_source: bool,
    pub is_renderer_initiated: bool,
    pub was_redirected: bool,
}

/// Where a navigation should run, before the instance is materialized.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum SiteInstanceDescriptor {
    Existing(SiteInstanceId),
    /// The instance for the URL's site in the current browsing instance.
    Related(Url),
    /// A fresh instance in a new browsing instance.
    Unrelated(Url),
    /// The shared instance of cross-site subframes.
    DefaultSubframe,
}

/// The placement and commit engine of one node, borrowed from the
/// [`FrameTree`] for the duration of an operation.
pub(crate) struct RenderFrameHostManager<'a> {
    frame_tree: &'a mut FrameTree,
    frame_tree_node_id: FrameTreeNodeId,
}

impl<'a> RenderFrameHostManager<'a> {
    pub(crate) fn new(frame_tree: &'a mut FrameTree, frame_tree_node_id: FrameTreeNodeId) -> Self {
        Self {
            frame_tree,
            frame_tree_node_id,
        }
    }

    fn node(&self) -> &FrameTreeNode {
        let id = self.frame_tree_node_id;
        match self.frame_tree.nodes.get(&id) {
            Some(node) => node,
            None => panic!("{id} left the frame tree while being managed"),
        }
    }

    fn node_mut(&mut self) -> &mut FrameTreeNode {
        let id = self.frame_tree_node_id;
        match self.frame_tree.nodes.get_mut(&id) {
            Some(node) => node,
            None => panic!("{id} left the frame tree while being managed"),
        }
    }

    fn state(&self) -> &RenderManagerState {
        &self.node().render_manager
    }

    fn state_mut(&mut self) -> &mut RenderManagerState {
        &mut self.node_mut().render_manager
    }

    fn is_main_frame(&self) -> bool {
        self.node().is_main_frame()
    }

    fn page_id(&self) -> PageId {
        self.node().page_id()
    }

    fn is_page_hidden(&self) -> bool {
        self.frame_tree
            .page(self.page_id())
            .is_some_and(Page::is_hidden)
    }

    pub(crate) fn current_host_id(&self) -> RenderFrameHostId {
        self.state().current.id()
    }

    fn current_instance(&self) -> SiteInstanceId {
        self.state().current.site_instance()
    }

    fn browser_context(&self) -> Option<BrowserContextId> {
        self.frame_tree.page(self.page_id()).map(Page::browser_context)
    }

    /// `instance` if it is still alive and belongs to the browser context of
    /// this page.
    fn usable_instance(&self, instance: Option<SiteInstanceId>) -> Option<SiteInstanceId> {
        let browser_context = self.browser_context();
        instance.filter(|&id| {
            self.frame_tree
                .site_instances
                .get(id)
                .is_some_and(|instance| Some(instance.browser_context()) == browser_context)
        })
    }

    fn instance_of(&self, node: FrameTreeNodeId) -> Option<SiteInstanceId> {
        self.frame_tree
            .node(node)
            .map(|node| node.current_frame_host().site_instance())
    }

    /// Pick the frame host `target` will commit in, creating a speculative
    /// one if the navigation leaves the current site instance.
    pub(crate) fn get_frame_host_for_navigation(
        &mut self,
        target: &NavigationTarget,
    ) -> RenderFrameHostId {
        let id = self.frame_tree_node_id;
        let current_instance = self.current_instance();
        let dest_instance = self.get_site_instance_for_navigation_request(target);

        if dest_instance == current_instance {
            self.clean_up_navigation();
        } else {
            let speculative_matches = self
                .state()
                .speculative
                .as_ref()
                .is_some_and(|host| host.site_instance() == dest_instance);
            if !speculative_matches {
                self.clean_up_navigation();
                self.create_speculative_render_frame_host(current_instance, dest_instance);
            }
            // Nothing to swap out: commit right away so the navigation does
            // not wait behind a dead frame.
            if !self.state().current.is_render_frame_live() {
                log::debug!(
                    "RenderFrameHostManager: current host of {id} is not live, swapping in {dest_instance} now"
                );
                self.commit_pending();
            }
        }

        let hidden = self.is_page_hidden();
        let state = self.state_mut();
        let host = match state.speculative.as_mut() {
            Some(speculative) => speculative,
            None => &mut state.current,
        };
        if !host.is_render_frame_live() {
            host.init_render_frame();
            if !hidden {
                host.show();
            }
        }
        host.id()
    }

    fn create_speculative_render_frame_host(
        &mut self,
        old_instance: SiteInstanceId,
        new_instance: SiteInstanceId,
    ) {
        let id = self.frame_tree_node_id;
        self.create_proxies_for_new_render_frame_host(old_instance, new_instance);
        let mut host = self.frame_tree.new_render_frame_host(id, new_instance);
        host.init_render_frame();
        log::debug!(
            "RenderFrameHostManager: speculative {} for {id} in {new_instance}",
            host.id()
        );
        self.state_mut().speculative = Some(host);
    }

    /// The site instance a navigation request should commit in.
    pub(crate) fn get_site_instance_for_navigation_request(
        &mut self,
        target: &NavigationTarget,
    ) -> SiteInstanceId {
        let current_instance = self.current_instance();
        let no_swap_allowed = if self.is_main_frame() {
            let can_renderer_initiate_transfer = self.state().current.is_render_frame_live()
                && should_make_network_request_for_url(&target.url)
                && self.is_renderer_transfer_needed(&target.url);
            target.is_renderer_initiated && !can_renderer_initiate_transfer
        } else {
            !self.can_subframe_swap_process(
                &target.url,
                target.source_site_instance,
                target.dest_site_instance,
            )
        };
        if no_swap_allowed && !target.was_redirected {
            return current_instance;
        }

        let candidate = self
            .state()
            .speculative
            .as_ref()
            .map(RenderFrameHost::site_instance);
        self.get_site_instance_for_navigation(target, candidate)
    }

    fn get_site_instance_for_navigation(
        &mut self,
        target: &NavigationTarget,
        candidate: Option<SiteInstanceId>,
    ) -> SiteInstanceId {
        let current_instance = self.current_instance();
        let current_site = self
            .frame_tree
            .site_instances
            .get(current_instance)
            .and_then(SiteInstance::site)
            .cloned();
        if current_site
            .as_ref()
            .is_some_and(|site| site.scheme() == GUEST_SCHEME)
        {
            return current_instance;
        }

        let current_url = self
            .state()
            .current
            .last_committed_url()
            .cloned()
            .or_else(|| current_site.as_ref().and_then(Site::to_url));
        let current_is_view_source = self
            .state()
            .current_is_view_source
            .unwrap_or(target.is_view_source);
        let source_instance = self.usable_instance(target.source_site_instance);
        let dest_instance = self.usable_instance(target.dest_site_instance);
        if dest_instance != target.dest_site_instance {
            log::debug!(
                "RenderFrameHostManager: ignoring destination {:?} of {}",
                target.dest_site_instance,
                self.frame_tree_node_id
            );
        }
        let force_swap = self.should_swap_browsing_instances(
            current_url.as_ref(),
            current_is_view_source,
            dest_instance,
            &target.url,
            target.is_view_source,
        );

        let descriptor = if self.frame_tree.policy().should_transition_cross_site() || force_swap {
            self.determine_site_instance_for_url(
                target,
                source_instance,
                dest_instance,
                force_swap,
            )
        } else {
            SiteInstanceDescriptor::Existing(current_instance)
        };
        let instance = self.convert_to_site_instance(descriptor, candidate);
        if force_swap {
            assert_ne!(
                instance, current_instance,
                "a browsing instance swap must leave {current_instance}"
            );
        }
        instance
    }

    /// Whether navigating to `dest_url` must leave the current browsing
    /// instance.
    fn should_swap_browsing_instances(
        &self,
        current_url: Option<&Url>,
        current_is_view_source: bool,
        dest_instance: Option<SiteInstanceId>,
        dest_url: &Url,
        dest_is_view_source: bool,
    ) -> bool {
        if !self.is_main_frame() {
            return false;
        }
        let current_instance = self.current_instance();
        let registry = &self.frame_tree.site_instances;
        if let Some(dest_instance) = dest_instance {
            return !registry.is_related(current_instance, dest_instance);
        }

        // Debug URLs run in whatever renderer is current.
        if is_renderer_debug_url(dest_url) {
            return false;
        }

        let current = registry.get(current_instance);
        if current.map(SiteInstance::browser_context) != self.browser_context() {
            return true;
        }

        let policy = self.frame_tree.policy();
        if current.is_some_and(|current| current.privilege() == ProcessPrivilege::WebUi) {
            if !policy.is_url_acceptable_for_web_ui(dest_url) {
                return true;
            }
        } else if policy.is_web_ui_url(dest_url) {
            return true;
        }
        if let Some(current_url) = current_url {
            if policy.is_web_ui_url(current_url)
                && policy.is_web_ui_url(dest_url)
                && policy.web_ui_type_for_url(current_url) != policy.web_ui_type_for_url(dest_url)
            {
                return true;
            }
        }

        if self
            .frame_tree
            .delegate()
            .should_swap_browsing_instances_for_navigation(current_url, dest_url)
        {
            return true;
        }

        // Switching in or out of view-source needs a fresh session history.
        current_is_view_source != dest_is_view_source
    }

    fn determine_site_instance_for_url(
        &mut self,
        target: &NavigationTarget,
        source_instance: Option<SiteInstanceId>,
        dest_instance: Option<SiteInstanceId>,
        force_swap: bool,
    ) -> SiteInstanceDescriptor {
        let current_instance = self.current_instance();
        let url = &target.url;

        if let Some(dest_instance) = dest_instance {
            if force_swap {
                assert!(
                    !self
                        .frame_tree
                        .site_instances
                        .is_related(dest_instance, current_instance),
                    "{dest_instance} is related to {current_instance} despite a forced swap"
                );
            }
            return SiteInstanceDescriptor::Existing(dest_instance);
        }

        if force_swap {
            return SiteInstanceDescriptor::Unrelated(url.clone());
        }

        let policy = self.frame_tree.policy();
        // Generated navigations are mostly searches whose results lead
        // elsewhere; do not pin them on the search engine's process.
        if policy.process_model() == ProcessModel::ProcessPerSite
            && target.transition.core_type_is(PageTransitionType::Generated)
        {
            return SiteInstanceDescriptor::Existing(current_instance);
        }

        let registry = &self.frame_tree.site_instances;
        let Some(current) = registry.get(current_instance) else {
            return SiteInstanceDescriptor::Unrelated(url.clone());
        };
        if !current.has_site() {
            let use_process_per_site = policy.should_use_process_per_site(url)
                && registry.has_process_for_site(current.browser_context(), url);
            if registry.has_related_site_instance(current_instance, url) || use_process_per_site {
                return SiteInstanceDescriptor::Related(url.clone());
            }
            if registry.has_wrong_process_for_url(current_instance, url) {
                return SiteInstanceDescriptor::Related(url.clone());
            }
            if target.is_view_source || policy.is_web_ui_url(url) {
                return SiteInstanceDescriptor::Unrelated(url.clone());
            }
            // Restored pages load all at once; assign the site now so they
            // can share processes.
            if target.is_restore && should_assign_site_for_url(url) {
                self.frame_tree.site_instances.set_site(current_instance, url);
            }
            return SiteInstanceDescriptor::Existing(current_instance);
        }

        if self
            .state()
            .current_is_view_source
            .is_some_and(|is_view_source| is_view_source != target.is_view_source)
            && !is_renderer_debug_url(url)
        {
            return SiteInstanceDescriptor::Unrelated(url.clone());
        }

        // The source controls the content of blank and data documents.
        if let Some(source_instance) = source_instance {
            if is_about_blank(url) || url.scheme() == DATA_SCHEME {
                return SiteInstanceDescriptor::Existing(source_instance);
            }
        }

        if self.is_currently_same_site(self.frame_tree_node_id, url) {
            return SiteInstanceDescriptor::Existing(current_instance);
        }

        let policy = self.frame_tree.policy();
        let top_document_isolation = policy.is_top_document_isolation_enabled();
        let dest_requires_dedicated_process = policy.does_site_require_dedicated_process(url);

        if top_document_isolation {
            if let Some(root) = self.frame_tree.root(self.page_id()) {
                if self.is_currently_same_site(root, url) {
                    if let Some(instance) = self.instance_of(root) {
                        return SiteInstanceDescriptor::Existing(instance);
                    }
                }
            }
            if let Some(opener) = self.node().opener() {
                if self.frame_tree.node(opener).is_some() && self.is_currently_same_site(opener, url)
                {
                    if let Some(instance) = self.instance_of(opener) {
                        return SiteInstanceDescriptor::Existing(instance);
                    }
                }
            }
        }

        if !self.is_main_frame() && top_document_isolation && !dest_requires_dedicated_process {
            return SiteInstanceDescriptor::DefaultSubframe;
        }

        SiteInstanceDescriptor::Related(url.clone())
    }

    fn convert_to_site_instance(
        &mut self,
        descriptor: SiteInstanceDescriptor,
        candidate: Option<SiteInstanceId>,
    ) -> SiteInstanceId {
        let current_instance = self.current_instance();
        let page_browser_context = self.browser_context();
        let registry = &mut self.frame_tree.site_instances;
        match descriptor {
            SiteInstanceDescriptor::Existing(instance) => instance,
            SiteInstanceDescriptor::Related(url) => {
                registry.get_related_site_instance(current_instance, &url)
            }
            SiteInstanceDescriptor::DefaultSubframe => {
                registry.get_default_subframe_site_instance(current_instance)
            }
            SiteInstanceDescriptor::Unrelated(url) => {
                if let Some(candidate) = candidate {
                    let site = Site::for_url(&url);
                    let reusable = !registry.is_related(current_instance, candidate)
                        && registry
                            .get(candidate)
                            .and_then(SiteInstance::site)
                            .is_some_and(|candidate_site| *candidate_site == site);
                    if reusable {
                        return candidate;
                    }
                }
                let browser_context = page_browser_context
                    .or_else(|| registry.get(current_instance).map(SiteInstance::browser_context))
                    .unwrap_or_default();
                registry.create_for_url(browser_context, &url)
            }
        }
    }

    /// Whether the current document of `node` is same-site with `url`.
    fn is_currently_same_site(&self, node: FrameTreeNodeId, url: &Url) -> bool {
        let Some(host) = self.frame_tree.node(node).map(FrameTreeNode::current_frame_host) else {
            return false;
        };
        let registry = &self.frame_tree.site_instances;
        let instance = host.site_instance();
        if registry.has_wrong_process_for_url(instance, url) {
            return false;
        }

        let Some(last_successful_url) = host.last_successful_url() else {
            // Nothing trustworthy committed yet, fall back to the site.
            return match registry.get(instance).and_then(SiteInstance::site).and_then(Site::to_url) {
                Some(site_url) => is_same_web_site(&site_url, url),
                None => is_about_blank(url),
            };
        };
        if is_same_web_site(last_successful_url, url) {
            return true;
        }

        // The last URL may carry no host (about:blank); its origin might.
        match host.last_committed_origin() {
            Some(origin) if origin.is_tuple() => Url::parse(&origin.ascii_serialization())
                .is_ok_and(|origin_url| is_same_web_site(&origin_url, url)),
            _ => false,
        }
    }

    /// Whether a navigation of the current document to `url` has to move
    /// to another renderer.
    fn is_renderer_transfer_needed(&self, url: &Url) -> bool {
        let current_instance = self.current_instance();
        let Some(current) = self.frame_tree.site_instances.get(current_instance) else {
            return false;
        };
        if !current.has_site()
            || current.site_scheme_is(GUEST_SCHEME)
            || current.site_scheme_is(DEVTOOLS_SCHEME)
        {
            return false;
        }
        if self.is_currently_same_site(self.frame_tree_node_id, url) {
            return false;
        }

        let policy = self.frame_tree.policy();
        if current.requires_dedicated_process() || policy.does_site_require_dedicated_process(url)
        {
            return true;
        }
        policy.is_top_document_isolation_enabled()
            && (!self.is_main_frame() || current.is_default_subframe())
    }

    fn can_subframe_swap_process(
        &self,
        url: &Url,
        source_instance: Option<SiteInstanceId>,
        dest_instance: Option<SiteInstanceId>,
    ) -> bool {
        if !self.frame_tree.policy().are_cross_process_frames_possible() {
            return false;
        }

        // Opaque destinations take the site of whoever created them.
        let resolved = if url.origin().is_tuple() {
            url.clone()
        } else {
            let site_url = source_instance
                .or(dest_instance)
                .and_then(|instance| self.frame_tree.site_instances.get(instance))
                .and_then(SiteInstance::site)
                .and_then(Site::to_url);
            match site_url {
                Some(site_url) => site_url,
                None => return false,
            }
        };
        self.is_renderer_transfer_needed(&resolved)
    }

    /// Make the speculative host current.
    pub(crate) fn commit_pending(&mut self) {
        let id = self.frame_tree_node_id;
        let is_main_frame = self.is_main_frame();
        let hidden = self.is_page_hidden();
        let had_focus = self.state().current.is_focused();

        // The children belong to the old document.
        self.frame_tree.reset_for_new_process(id);

        let state = self.state_mut();
        let Some(new_host) = state.speculative.take() else {
            panic!("{id} has no speculative frame host to commit");
        };
        let mut old_host = std::mem::replace(&mut state.current, new_host);
        let old_instance = old_host.site_instance();
        let new_instance = state.current.site_instance();
        let new_host_id = state.current.id();

        if is_main_frame {
            old_host.hide();
            let registry = &mut self.frame_tree.site_instances;
            if !registry.is_related(old_instance, new_instance) {
                registry.decrement_active_contents_count(old_instance);
                registry.increment_active_contents_count(new_instance);
            }
        }

        let current = &mut self.state_mut().current;
        if current.view().is_some() {
            if !hidden {
                current.show();
            }
            if had_focus {
                current.focus();
            }
        } else {
            // The renderer died while the page was hidden.
            self.frame_tree
                .delegate()
                .render_process_gone_from_render_manager(id);
        }

        self.frame_tree.delegate().notify_swapped_from_render_manager(
            id,
            old_host.id(),
            new_host_id,
            is_main_frame,
        );
        log::debug!(
            "RenderFrameHostManager: {id} swapped {} ({old_instance}) for {new_host_id} ({new_instance})",
            old_host.id()
        );

        self.swap_out_old_frame(old_host);

        if let Some(proxy) = self.state_mut().proxies.remove(&new_instance) {
            self.frame_tree.destroy_proxy(proxy);
        }
        if let Some(parent_instance) = self.node().parent().and_then(|p| self.instance_of(p)) {
            if self.state().proxies.contains_key(&parent_instance) {
                log::trace!("RenderFrameHostManager: {id} attached to its proxy in {parent_instance}");
            }
        }

        assert!(
            !self.state().proxies.contains_key(&new_instance),
            "{id} has a proxy in its current {new_instance}"
        );
    }

    fn swap_out_old_frame(&mut self, mut old_host: RenderFrameHost) {
        if !old_host.is_render_frame_live() {
            self.frame_tree.destroy_render_frame_host(old_host);
            return;
        }

        drop(old_host.take_navigation_handle());
        let instance = old_host.site_instance();
        let active_frame_count = self
            .frame_tree
            .site_instances
            .get(instance)
            .map_or(0, SiteInstance::active_frame_count);
        // Other frames still render in the old instance: they need a proxy
        // to keep addressing this frame.
        if active_frame_count > 1 {
            self.create_render_frame_proxy(instance);
        }
        self.frame_tree.swap_out_render_frame_host(&mut old_host);
        self.state_mut().pending_delete.push(old_host);
    }

    fn discard_unused_frame(&mut self, host: RenderFrameHost) {
        let instance = host.site_instance();
        let keep_proxy = self
            .frame_tree
            .site_instances
            .get(instance)
            .is_some_and(|instance| instance.has_site() && instance.active_frame_count() > 1);
        if keep_proxy {
            self.create_render_frame_proxy(instance);
        }
        self.frame_tree.destroy_render_frame_host(host);
    }

    /// Drop the speculative host of an abandoned navigation.
    pub(crate) fn clean_up_navigation(&mut self) {
        if let Some(speculative) = self.state_mut().speculative.take() {
            log::debug!(
                "RenderFrameHostManager: discarding speculative {} of {}",
                speculative.id(),
                self.frame_tree_node_id
            );
            self.discard_unused_frame(speculative);
        }
    }

    /// A frame host of this node committed.
    pub(crate) fn did_navigate_frame(
        &mut self,
        host: RenderFrameHostId,
        has_user_gesture: bool,
        was_within_same_document: bool,
    ) {
        let state = self.state();
        let is_speculative = state.speculative.as_ref().is_some_and(|s| s.id() == host);
        if is_speculative {
            self.commit_pending();
        } else if state.current.id() == host
            && state.speculative.is_some()
            && has_user_gesture
            && !was_within_same_document
        {
            // The user acted on the current document while another instance
            // was being prepared: the pending navigation is stale.
            let id = self.frame_tree_node_id;
            log::debug!("RenderFrameHostManager: gesture commit in {id} cancels its pending navigation");
            self.frame_tree.reset_navigation_request(id, false);
            self.clean_up_navigation();
        }
        self.commit_pending_sandbox_flags();
    }

    fn commit_pending_sandbox_flags(&mut self) {
        if !self.node_mut().commit_pending_sandbox_flags() {
            return;
        }
        let parent = self.node().parent();
        assert!(parent.is_some(), "sandbox flags of a main frame cannot change");
        let parent_instance = parent.and_then(|parent| self.instance_of(parent));
        let flags = self.node().effective_sandbox_flags();
        for proxy in self.state_mut().proxies.values_mut() {
            if Some(proxy.site_instance()) != parent_instance {
                proxy.set_sandbox_flags(flags);
            }
        }
    }

    fn create_proxies_for_new_render_frame_host(
        &mut self,
        old_instance: SiteInstanceId,
        new_instance: SiteInstanceId,
    ) {
        let id = self.frame_tree_node_id;
        if self
            .frame_tree
            .site_instances
            .is_related(new_instance, old_instance)
        {
            self.create_opener_proxies(new_instance, Some(id));
        } else if self.frame_tree.policy().are_cross_process_frames_possible() {
            let page_id = self.page_id();
            self.frame_tree
                .create_proxies_for_site_instance(page_id, Some(id), new_instance);
        }
    }

    /// Make this node's page and every page reachable through openers
    /// addressable from `instance`.
    pub(crate) fn create_opener_proxies(
        &mut self,
        instance: SiteInstanceId,
        skip: Option<FrameTreeNodeId>,
    ) {
        let (opener_pages, back_links) = self.collect_opener_frame_trees();
        // Furthest openers first so each page finds its opener's proxies.
        for page_id in opener_pages.iter().rev() {
            let Some(root) = self.frame_tree.root(*page_id) else {
                continue;
            };
            RenderFrameHostManager::new(&mut *self.frame_tree, root)
                .create_opener_proxies_for_frame_tree(instance, skip);
        }
        // Openers on a cycle did not exist yet when the proxy was created.
        for node in back_links {
            let Some(frame) = self.frame_tree.nodes.get_mut(&node) else {
                continue;
            };
            let opener = frame.opener;
            if let Some(proxy) = frame.render_manager.proxies.get_mut(&instance) {
                proxy.update_opener(opener);
            }
        }
    }

    /// Breadth-first walk over the opener graph starting from this page.
    /// Returns the pages in visiting order and the nodes whose opener
    /// points back to an already visited page.
    fn collect_opener_frame_trees(&self) -> (Vec<PageId>, Vec<FrameTreeNodeId>) {
        let mut pages = vec![self.page_id()];
        let mut back_links = Vec::new();
        let mut visited = 0;
        while visited < pages.len() {
            let page_id = pages[visited];
            visited += 1;
            for node in self.frame_tree.nodes_of_page(page_id) {
                let Some(opener) = self.frame_tree.node(node).and_then(FrameTreeNode::opener) else {
                    continue;
                };
                let Some(opener_page) = self.frame_tree.node(opener).map(FrameTreeNode::page_id)
                else {
                    continue;
                };
                match pages.iter().position(|page| *page == opener_page) {
                    None => pages.push(opener_page),
                    Some(position) if position < visited => {
                        if !back_links.contains(&node) {
                            back_links.push(node);
                        }
                    }
                    Some(_) => {}
                }
            }
        }
        (pages, back_links)
    }

    fn create_opener_proxies_for_frame_tree(
        &mut self,
        instance: SiteInstanceId,
        skip: Option<FrameTreeNodeId>,
    ) {
        assert!(self.is_main_frame(), "opener proxies are created from the root");
        let page_id = self.page_id();
        let skip = skip.filter(|skip| {
            self.frame_tree
                .node(*skip)
                .is_some_and(|node| node.page_id() == page_id)
        });
        if self.frame_tree.policy().are_cross_process_frames_possible() {
            self.frame_tree
                .create_proxies_for_site_instance(page_id, skip, instance);
        } else {
            if self.frame_tree.page_has_frame_in_instance(page_id, instance) {
                return;
            }
            self.create_render_frame_proxy(instance);
        }
    }

    /// Ensure this node has a live proxy in `instance`.
    pub(crate) fn create_render_frame_proxy(&mut self, instance: SiteInstanceId) {
        let id = self.frame_tree_node_id;
        assert_ne!(
            instance,
            self.current_instance(),
            "{id} cannot have a proxy in its current site instance"
        );
        if self
            .state()
            .proxies
            .get(&instance)
            .is_some_and(RenderFrameProxyHost::is_render_frame_proxy_live)
        {
            return;
        }
        if !self.state().proxies.contains_key(&instance) {
            let proxy = self.frame_tree.new_proxy(id, instance);
            self.state_mut().proxies.insert(instance, proxy);
            log::trace!("RenderFrameHostManager: proxy of {id} in {instance}");
        }

        let node = self.node();
        let opener = node.opener();
        let flags = node.effective_sandbox_flags();
        if let Some(proxy) = self.state_mut().proxies.get_mut(&instance) {
            proxy.init_render_frame_proxy();
            proxy.update_opener(opener);
            proxy.set_sandbox_flags(flags);
        }
    }

    /// A main frame opened with a name becomes reachable from the instances
    /// of its opener's ancestors.
    pub(crate) fn create_proxies_for_new_named_frame(&mut self) {
        if !self.frame_tree.policy().are_cross_process_frames_possible() {
            return;
        }
        let node = self.node();
        let Some(opener) = node.opener() else {
            return;
        };
        if !node.is_main_frame() {
            return;
        }

        let current_instance = self.current_instance();
        let mut instances = Vec::new();
        // The opener's own instance already has this frame's host.
        let mut ancestor = self.frame_tree.node(opener).and_then(FrameTreeNode::parent);
        while let Some(ancestor_id) = ancestor {
            let Some(ancestor_node) = self.frame_tree.node(ancestor_id) else {
                break;
            };
            let instance = ancestor_node.current_frame_host().site_instance();
            if instance != current_instance && !instances.contains(&instance) {
                instances.push(instance);
            }
            ancestor = ancestor_node.parent();
        }
        for instance in instances {
            self.create_render_frame_proxy(instance);
        }
    }

    /// A new child needs a proxy wherever its parent has one.
    pub(crate) fn create_proxies_for_child_frame(&mut self) {
        let Some(parent) = self.node().parent() else {
            return;
        };
        let instances: Vec<SiteInstanceId> = match self.frame_tree.node(parent) {
            Some(parent) => parent.render_manager.proxies.keys().copied().collect(),
            None => return,
        };
        for instance in instances {
            self.create_render_frame_proxy(instance);
        }
    }

    /// The renderer in `source_instance` changed this frame's opener.
    pub(crate) fn did_change_opener(
        &mut self,
        opener: Option<FrameTreeNodeId>,
        source_instance: SiteInstanceId,
    ) {
        if self.node().opener() == opener {
            return;
        }
        self.node_mut().opener = opener;
        for proxy in self.state_mut().proxies.values_mut() {
            if proxy.site_instance() != source_instance {
                proxy.update_opener(opener);
            }
        }
    }
}
