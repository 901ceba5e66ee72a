//! The forest of frame trees, one per page, and the bookkeeping shared by
//! their nodes: frame host lifetimes, proxies, openers and load progress.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::Instant;

use crate::config::Config;
use crate::delegate::NavigationDelegate;
use crate::errors::{Error, Result};
use crate::frame_host::{DidCommitProvisionalLoadParams, RenderFrameHost, RenderFrameProxyHost};
use crate::frame_tree_node::{
    ContentSecurityPolicyHeader, FrameTreeNode, InsecureRequestPolicy, SandboxFlags,
};
use crate::id::{
    next_navigation_id, BrowserContextId, FrameTreeNodeId, PageId, RenderFrameHostId,
    SiteInstanceId,
};
use crate::navigation_handle::{NavigationHandle, NavigationHandleInit};
use crate::navigation_request::{AssociatedSiteInstanceType, NavigationRequest};
use crate::page::{Page, PageManager};
use crate::render_frame_host_manager::{RenderFrameHostManager, RenderManagerState};
use crate::site::{is_about_blank, should_assign_site_for_url, SiteIsolationPolicy};
use crate::site_instance::SiteInstanceRegistry;

/// Load progress reported when a frame starts loading.
pub const LOADING_PROGRESS_MINIMUM: f64 = 0.1;
/// Load progress of a frame that finished loading.
pub const LOADING_PROGRESS_DONE: f64 = 1.0;

/// Gets told when a node leaves the tree.
pub trait FrameTreeNodeObserver {
    fn on_frame_tree_node_destroyed(&self, frame_tree_node_id: FrameTreeNodeId);
}

/// Owns every frame tree node, every page and every site instance.
pub struct FrameTree {
    pub(crate) nodes: HashMap<FrameTreeNodeId, FrameTreeNode>,
    pages: PageManager,
    pub(crate) site_instances: SiteInstanceRegistry,
    config: Config,
    delegate: Rc<dyn NavigationDelegate>,
    observers: Vec<Rc<dyn FrameTreeNodeObserver>>,
}

impl FrameTree {
    pub fn new(config: Config, delegate: Rc<dyn NavigationDelegate>) -> Self {
        let policy = SiteIsolationPolicy::new(&config);
        Self {
            nodes: HashMap::new(),
            pages: PageManager::new(),
            site_instances: SiteInstanceRegistry::new(policy),
            config,
            delegate,
            observers: Vec::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn policy(&self) -> &SiteIsolationPolicy {
        self.site_instances.policy()
    }

    pub fn site_instances(&self) -> &SiteInstanceRegistry {
        &self.site_instances
    }

    pub fn delegate(&self) -> &Rc<dyn NavigationDelegate> {
        &self.delegate
    }

    pub fn pages(&self) -> &PageManager {
        &self.pages
    }

    pub fn page(&self, page_id: PageId) -> Option<&Page> {
        self.pages.page(page_id)
    }

    /// The root node of a page.
    pub fn root(&self, page_id: PageId) -> Option<FrameTreeNodeId> {
        self.pages.page(page_id).map(Page::root)
    }

    pub fn node(&self, id: FrameTreeNodeId) -> Option<&FrameTreeNode> {
        self.nodes.get(&id)
    }

    pub(crate) fn node_mut(&mut self, id: FrameTreeNodeId) -> Result<&mut FrameTreeNode> {
        self.nodes.get_mut(&id).ok_or(Error::FrameTreeNodeNotFound(id))
    }

    /// Number of live nodes across every page.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn add_observer(&mut self, observer: Rc<dyn FrameTreeNodeObserver>) {
        self.observers.push(observer);
    }

    /// The placement and commit engine of a node.
    pub(crate) fn render_manager(
        &mut self,
        id: FrameTreeNodeId,
    ) -> Result<RenderFrameHostManager<'_>> {
        if self.nodes.contains_key(&id) {
            Ok(RenderFrameHostManager::new(self, id))
        } else {
            Err(Error::FrameTreeNodeNotFound(id))
        }
    }

    /// Find a frame host of `node` by id, wherever it sits in the node.
    pub fn render_frame_host(
        &self,
        node: FrameTreeNodeId,
        id: RenderFrameHostId,
    ) -> Option<&RenderFrameHost> {
        let state = self.nodes.get(&node)?.render_manager();
        std::iter::once(state.current())
            .chain(state.speculative())
            .chain(state.pending_delete())
            .find(|host| host.id() == id)
    }

    /// The current or speculative frame host of `node` with id `id`.
    pub(crate) fn render_frame_host_mut(
        &mut self,
        node: FrameTreeNodeId,
        id: RenderFrameHostId,
    ) -> Option<&mut RenderFrameHost> {
        let state = &mut self.nodes.get_mut(&node)?.render_manager;
        std::iter::once(&mut state.current)
            .chain(state.speculative.as_mut())
            .find(|host| host.id() == id)
    }

    /// Open a new page in a fresh browsing instance.
    pub fn create_page(&mut self, browser_context: BrowserContextId) -> PageId {
        let instance = self
            .site_instances
            .create_for_new_browsing_instance(browser_context);
        self.create_page_in(instance, browser_context)
    }

    /// Open a popup of `opener`. Unless `noopener` is set the popup starts in
    /// the opener's site instance and keeps a reference to it.
    pub fn create_popup(
        &mut self,
        opener: FrameTreeNodeId,
        name: &str,
        noopener: bool,
    ) -> Result<PageId> {
        let opener_node = self
            .nodes
            .get(&opener)
            .ok_or(Error::FrameTreeNodeNotFound(opener))?;
        let browser_context = self
            .pages
            .page(opener_node.page_id())
            .map(Page::browser_context)
            .ok_or(Error::PageNotFound(opener_node.page_id()))?;
        let instance = if noopener {
            self.site_instances
                .create_for_new_browsing_instance(browser_context)
        } else {
            opener_node.current_frame_host().site_instance()
        };

        let page_id = self.create_page_in(instance, browser_context);
        let root = self.root(page_id).ok_or(Error::PageNotFound(page_id))?;
        if !name.is_empty() {
            let node = self.node_mut(root)?;
            node.replication_state.name = name.to_string();
            node.replication_state.unique_name = name.to_string();
        }
        if !noopener {
            self.node_mut(root)?.opener = Some(opener);
            if !name.is_empty() {
                self.render_manager(root)?.create_proxies_for_new_named_frame();
            }
        }
        Ok(page_id)
    }

    fn create_page_in(
        &mut self,
        instance: SiteInstanceId,
        browser_context: BrowserContextId,
    ) -> PageId {
        let page_id = PageId::new();
        let root = FrameTreeNodeId::new();
        let host = self.new_render_frame_host(root, instance);
        self.site_instances.increment_active_contents_count(instance);
        self.nodes.insert(
            root,
            FrameTreeNode::new(
                root,
                page_id,
                None,
                String::new(),
                String::new(),
                SandboxFlags::empty(),
                RenderManagerState::new(host),
            ),
        );
        let focused = self.pages.count() == 0;
        self.pages
            .append_page(Page::new(page_id, root, browser_context), focused);
        log::debug!("FrameTree: created {page_id} with root {root} in {instance}");
        page_id
    }

    /// Close a page and tear down its whole tree.
    pub fn close_page(&mut self, page_id: PageId) -> Result<()> {
        let root = self.root(page_id).ok_or(Error::PageNotFound(page_id))?;
        self.destroy_node(root);
        self.pages.close_page(page_id)?;
        log::debug!("FrameTree: closed {page_id}");
        Ok(())
    }

    /// Add a child frame, created by the parent's renderer in the parent's
    /// site instance.
    pub fn add_child(
        &mut self,
        parent: FrameTreeNodeId,
        name: &str,
        sandbox_flags: SandboxFlags,
    ) -> Result<FrameTreeNodeId> {
        let parent_node = self
            .nodes
            .get(&parent)
            .ok_or(Error::FrameTreeNodeNotFound(parent))?;
        let page_id = parent_node.page_id();
        let instance = parent_node.current_frame_host().site_instance();
        let parent_is_live = parent_node.current_frame_host().is_render_frame_live();
        let flags = sandbox_flags | parent_node.effective_sandbox_flags();
        let unique_name = if name.is_empty() {
            format!(
                "{}/<!--frame{}-->",
                parent_node.unique_name(),
                parent_node.children().len()
            )
        } else {
            name.to_string()
        };
        let hidden = self.pages.page(page_id).is_none_or(Page::is_hidden);

        let id = FrameTreeNodeId::new();
        let mut host = self.new_render_frame_host(id, instance);
        if parent_is_live {
            host.init_render_frame();
            if !hidden {
                host.show();
            }
        }
        self.nodes.insert(
            id,
            FrameTreeNode::new(
                id,
                page_id,
                Some(parent),
                name.to_string(),
                unique_name,
                flags,
                RenderManagerState::new(host),
            ),
        );
        self.node_mut(parent)?.children.push(id);
        self.render_manager(id)?.create_proxies_for_child_frame();
        log::debug!("FrameTree: added {id} under {parent} in {instance}");
        Ok(id)
    }

    /// Remove a frame and its subtree. Removing a main frame closes its page.
    pub fn remove_frame(&mut self, id: FrameTreeNodeId) -> Result<()> {
        let node = self.nodes.get(&id).ok_or(Error::FrameTreeNodeNotFound(id))?;
        match node.parent() {
            Some(parent) => {
                if let Some(parent) = self.nodes.get_mut(&parent) {
                    parent.children.retain(|child| *child != id);
                }
                self.destroy_node(id);
                Ok(())
            }
            None => self.close_page(node.page_id()),
        }
    }

    /// Detach every child of `id`; the next document recreates its own.
    pub(crate) fn reset_for_new_process(&mut self, id: FrameTreeNodeId) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        let children = std::mem::take(&mut node.children);
        for child in children {
            self.destroy_node(child);
        }
    }

    fn destroy_node(&mut self, id: FrameTreeNodeId) {
        let children = match self.nodes.get(&id) {
            Some(node) => node.children.clone(),
            None => return,
        };
        for child in children {
            self.destroy_node(child);
        }
        let Some(mut node) = self.nodes.remove(&id) else {
            return;
        };
        drop(node.navigation_request.take());
        let page_id = node.page_id();
        if node.is_main_frame() {
            self.site_instances
                .decrement_active_contents_count(node.current_frame_host().site_instance());
        }

        let RenderManagerState {
            current,
            speculative,
            proxies,
            pending_delete,
            ..
        } = node.render_manager;
        for host in std::iter::once(current)
            .chain(speculative)
            .chain(pending_delete)
        {
            self.destroy_render_frame_host(host);
        }
        for proxy in proxies.into_values() {
            self.destroy_proxy(proxy);
        }

        for other in self.nodes.values_mut() {
            if other.opener == Some(id) {
                other.opener = None;
                for proxy in other.render_manager.proxies.values_mut() {
                    proxy.update_opener(None);
                }
            }
        }
        if let Some(page) = self.pages.page_mut(page_id) {
            if page.focused_frame() == Some(id) {
                page.set_focused_frame(None);
            }
        }
        for observer in &self.observers {
            observer.on_frame_tree_node_destroyed(id);
        }
        log::debug!("FrameTree: destroyed {id}");
    }

    /// Every node of a page, parents before children.
    pub fn nodes_of_page(&self, page_id: PageId) -> Vec<FrameTreeNodeId> {
        match self.root(page_id) {
            Some(root) => self.subtree(root),
            None => Vec::new(),
        }
    }

    /// `id` and its descendants, parents before children.
    pub fn subtree(&self, id: FrameTreeNodeId) -> Vec<FrameTreeNodeId> {
        let mut result = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let Some(node) = self.nodes.get(&next) else {
                continue;
            };
            result.push(next);
            stack.extend(node.children.iter().rev());
        }
        result
    }

    pub fn previous_sibling(&self, id: FrameTreeNodeId) -> Option<FrameTreeNodeId> {
        let siblings = self.siblings(id)?;
        let index = siblings.iter().position(|sibling| *sibling == id)?;
        index.checked_sub(1).map(|index| siblings[index])
    }

    pub fn next_sibling(&self, id: FrameTreeNodeId) -> Option<FrameTreeNodeId> {
        let siblings = self.siblings(id)?;
        let index = siblings.iter().position(|sibling| *sibling == id)?;
        siblings.get(index + 1).copied()
    }

    fn siblings(&self, id: FrameTreeNodeId) -> Option<&[FrameTreeNodeId]> {
        let parent = self.nodes.get(&id)?.parent()?;
        self.nodes.get(&parent).map(FrameTreeNode::children)
    }

    /// Give every node of `page_id` outside the subtree of `source` a proxy
    /// in `instance`, unless the node already renders in it.
    pub(crate) fn create_proxies_for_site_instance(
        &mut self,
        page_id: PageId,
        source: Option<FrameTreeNodeId>,
        instance: SiteInstanceId,
    ) {
        let skipped: HashSet<FrameTreeNodeId> = source
            .map(|source| self.subtree(source).into_iter().collect())
            .unwrap_or_default();
        for id in self.nodes_of_page(page_id) {
            if skipped.contains(&id) {
                continue;
            }
            let current_instance = self.nodes[&id].current_frame_host().site_instance();
            if current_instance == instance {
                continue;
            }
            if let Ok(mut manager) = self.render_manager(id) {
                manager.create_render_frame_proxy(instance);
            }
        }
    }

    /// Whether some frame of `page_id` currently renders in `instance`.
    pub(crate) fn page_has_frame_in_instance(
        &self,
        page_id: PageId,
        instance: SiteInstanceId,
    ) -> bool {
        self.nodes_of_page(page_id)
            .iter()
            .any(|id| self.nodes[id].current_frame_host().site_instance() == instance)
    }

    pub(crate) fn new_render_frame_host(
        &mut self,
        node: FrameTreeNodeId,
        instance: SiteInstanceId,
    ) -> RenderFrameHost {
        self.site_instances.add_ref(instance);
        self.site_instances.increment_active_frame_count(instance);
        RenderFrameHost::new(node, instance)
    }

    /// Stop counting `host` as an active frame of its instance.
    pub(crate) fn swap_out_render_frame_host(&mut self, host: &mut RenderFrameHost) {
        if host.is_swapped_out() {
            return;
        }
        host.set_swapped_out();
        let instance = host.site_instance();
        if self.site_instances.decrement_active_frame_count(instance) == 0 {
            self.on_active_frame_count_zero(instance);
        }
    }

    pub(crate) fn destroy_render_frame_host(&mut self, host: RenderFrameHost) {
        let instance = host.site_instance();
        if !host.is_swapped_out() && self.site_instances.decrement_active_frame_count(instance) == 0
        {
            self.on_active_frame_count_zero(instance);
        }
        log::trace!("FrameTree: destroying {}", host.id());
        drop(host);
        self.site_instances.release(instance);
    }

    pub(crate) fn new_proxy(
        &mut self,
        node: FrameTreeNodeId,
        instance: SiteInstanceId,
    ) -> RenderFrameProxyHost {
        self.site_instances.add_ref(instance);
        RenderFrameProxyHost::new(node, instance)
    }

    pub(crate) fn destroy_proxy(&mut self, proxy: RenderFrameProxyHost) {
        log::trace!(
            "FrameTree: destroying proxy of {} in {}",
            proxy.frame_tree_node_id(),
            proxy.site_instance()
        );
        self.site_instances.release(proxy.site_instance());
    }

    /// No frame renders in `instance` anymore: nothing needs to address
    /// frames from it, so every proxy in it goes away.
    fn on_active_frame_count_zero(&mut self, instance: SiteInstanceId) {
        log::debug!("FrameTree: no active frames left in {instance}, removing its proxies");
        let ids: Vec<FrameTreeNodeId> = self.nodes.keys().copied().collect();
        for id in ids {
            let proxy = self
                .nodes
                .get_mut(&id)
                .and_then(|node| node.render_manager.proxies.remove(&instance));
            if let Some(proxy) = proxy {
                self.destroy_proxy(proxy);
            }
        }
    }

    /// Install a new navigation request in its node, finishing the one
    /// already there.
    pub(crate) fn created_navigation_request(
        &mut self,
        mut request: Box<NavigationRequest>,
    ) -> Result<()> {
        let id = request.frame_tree_node_id();
        let page_id = self
            .nodes
            .get(&id)
            .ok_or(Error::FrameTreeNodeNotFound(id))?
            .page_id();
        let was_previously_loading = self.is_page_loading(page_id);
        if let Some(mut previous) = self.node_mut(id)?.navigation_request.take() {
            log::debug!(
                "FrameTree: {} replaces {} in {id}",
                request.navigation_id(),
                previous.navigation_id()
            );
            previous.set_net_error(navcore_messages::NetError::Aborted);
            drop(previous);
        }

        let target = request.navigation_target();
        let associated = {
            let mut manager = self.render_manager(id)?;
            manager.clean_up_navigation();
            let host = manager.get_frame_host_for_navigation(&target);
            if host == manager.current_host_id() {
                AssociatedSiteInstanceType::Current
            } else {
                AssociatedSiteInstanceType::Speculative
            }
        };
        request.set_associated_site_instance_type(associated);
        self.node_mut(id)?.navigation_request = Some(request);
        self.did_start_loading(id, true, was_previously_loading);

        let delegate = self.delegate.clone();
        let is_main_frame = self.nodes[&id].is_main_frame();
        if let Some(request) = self.node_mut(id)?.navigation_request.as_mut() {
            request.create_navigation_handle(is_main_frame, delegate);
        }
        Ok(())
    }

    pub(crate) fn take_navigation_request(
        &mut self,
        id: FrameTreeNodeId,
    ) -> Option<Box<NavigationRequest>> {
        self.nodes.get_mut(&id)?.navigation_request.take()
    }

    /// Put a request that is still in flight back in its node.
    pub(crate) fn restore_navigation_request(&mut self, request: Box<NavigationRequest>) {
        let id = request.frame_tree_node_id();
        match self.nodes.get_mut(&id) {
            Some(node) => {
                assert!(
                    node.navigation_request.is_none(),
                    "{id} already has a navigation request"
                );
                node.navigation_request = Some(request);
            }
            None => log::debug!(
                "FrameTree: {} outlived {id}, dropping it",
                request.navigation_id()
            ),
        }
    }

    /// Finish the request of `id` without committing.
    pub(crate) fn reset_navigation_request(&mut self, id: FrameTreeNodeId, keep_state: bool) {
        if let Some(request) = self.take_navigation_request(id) {
            self.discard_navigation_request(request, keep_state);
        }
    }

    /// Destroy a request taken out of its node. Unless `keep_state` is set
    /// the node stops loading, drops its speculative host and a renderer
    /// that started the navigation is told it stopped.
    pub(crate) fn discard_navigation_request(
        &mut self,
        request: Box<NavigationRequest>,
        keep_state: bool,
    ) {
        let id = request.frame_tree_node_id();
        let was_renderer_initiated = !request.is_browser_initiated();
        drop(request);
        if keep_state || !self.nodes.contains_key(&id) {
            return;
        }
        self.did_stop_loading(id);
        if let Ok(mut manager) = self.render_manager(id) {
            manager.clean_up_navigation();
        }
        if was_renderer_initiated {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.render_manager.current.stop();
            }
        }
    }

    /// The renderer of `host` committed a document in `node`.
    pub fn did_commit_provisional_load(
        &mut self,
        node: FrameTreeNodeId,
        host: RenderFrameHostId,
        params: DidCommitProvisionalLoadParams,
    ) -> Result<()> {
        let state = self
            .nodes
            .get(&node)
            .ok_or(Error::FrameTreeNodeNotFound(node))?
            .render_manager();
        let is_known = state.current().id() == host
            || state.speculative().is_some_and(|speculative| speculative.id() == host);
        if !is_known {
            return Err(Error::RenderFrameHostNotFound(host));
        }

        self.render_manager(node)?.did_navigate_frame(
            host,
            params.has_user_gesture,
            params.was_within_same_document,
        );

        let delegate = self.delegate.clone();
        let frame = self.node_mut(node)?;
        let is_main_frame = frame.is_main_frame();
        frame.replication_state.origin = params.origin.clone();
        if !is_about_blank(&params.url) {
            frame.has_committed_real_load = true;
        }
        if !params.was_within_same_document {
            frame.replication_state.accumulated_csp_headers.clear();
            frame.replication_state.insecure_request_policy = InsecureRequestPolicy::empty();
        }
        frame.render_manager.current_is_view_source = Some(params.is_view_source);
        let current = &mut frame.render_manager.current;
        current.set_last_committed(&params);
        let instance = current.site_instance();
        let pending_handle = current.take_navigation_handle();

        if !self.site_instances.instance(instance).has_site()
            && should_assign_site_for_url(&params.url)
            && !params.url_is_unreachable
        {
            self.site_instances.set_site(instance, &params.url);
        }

        let from_navigation = pending_handle.is_some();
        let mut handle = match pending_handle {
            Some(handle) if *handle.url() == params.url => handle,
            other => {
                drop(other);
                NavigationHandle::new(
                    NavigationHandleInit {
                        navigation_id: next_navigation_id(),
                        url: params.url.clone(),
                        frame_tree_node_id: node,
                        is_main_frame,
                        is_renderer_initiated: true,
                        is_same_document: params.was_within_same_document,
                        navigation_start: Instant::now(),
                        pending_nav_entry_id: params.nav_entry_id,
                    },
                    delegate,
                )
            }
        };
        handle.did_commit_navigation(&params, params.did_replace_entry, host, instance);
        log::debug!(
            "FrameTree: {node} committed {} in {instance}{}",
            params.url,
            if params.url_is_unreachable { " (error page)" } else { "" }
        );
        drop(handle);
        if from_navigation {
            self.did_stop_loading(node);
        }
        Ok(())
    }

    /// The renderer of `id` changed its opener, for example by clearing
    /// `window.opener`.
    pub fn set_opener(
        &mut self,
        id: FrameTreeNodeId,
        opener: Option<FrameTreeNodeId>,
    ) -> Result<()> {
        if let Some(opener) = opener {
            if !self.nodes.contains_key(&opener) {
                return Err(Error::FrameTreeNodeNotFound(opener));
            }
        }
        let source_instance = self
            .nodes
            .get(&id)
            .ok_or(Error::FrameTreeNodeNotFound(id))?
            .current_frame_host()
            .site_instance();
        self.render_manager(id)?
            .did_change_opener(opener, source_instance);
        Ok(())
    }

    /// Rename a frame. A frame that gets its first name becomes reachable
    /// by name from its opener's ancestors.
    pub fn set_frame_name(
        &mut self,
        id: FrameTreeNodeId,
        name: &str,
        unique_name: &str,
    ) -> Result<()> {
        let node = self.node_mut(id)?;
        let was_unnamed = node.replication_state.name.is_empty();
        node.replication_state.name = name.to_string();
        node.replication_state.unique_name = unique_name.to_string();
        if was_unnamed && !name.is_empty() {
            self.render_manager(id)?.create_proxies_for_new_named_frame();
        }
        Ok(())
    }

    /// Set the flags the parent declared for `id`. They apply on the next
    /// commit of the frame.
    pub fn update_sandbox_flags(&mut self, id: FrameTreeNodeId, flags: SandboxFlags) -> Result<()> {
        let parent = self
            .nodes
            .get(&id)
            .ok_or(Error::FrameTreeNodeNotFound(id))?
            .parent();
        let Some(parent) = parent else {
            log::warn!("FrameTree: ignoring sandbox flags for main frame {id}");
            return Ok(());
        };
        let parent_node = &self.nodes[&parent];
        let parent_flags = parent_node.effective_sandbox_flags();
        let parent_instance = parent_node.current_frame_host().site_instance();
        let node = self.node_mut(id)?;
        node.pending_sandbox_flags = flags | parent_flags;
        let pending = node.pending_sandbox_flags;
        if let Some(proxy) = node.render_manager.proxies.get_mut(&parent_instance) {
            proxy.set_sandbox_flags(pending);
        }
        Ok(())
    }

    pub fn add_content_security_policy(
        &mut self,
        id: FrameTreeNodeId,
        header: ContentSecurityPolicyHeader,
    ) -> Result<()> {
        self.node_mut(id)?
            .replication_state
            .accumulated_csp_headers
            .push(header);
        Ok(())
    }

    pub fn reset_content_security_policy(&mut self, id: FrameTreeNodeId) -> Result<()> {
        self.node_mut(id)?
            .replication_state
            .accumulated_csp_headers
            .clear();
        Ok(())
    }

    pub fn set_insecure_request_policy(
        &mut self,
        id: FrameTreeNodeId,
        policy: InsecureRequestPolicy,
    ) -> Result<()> {
        self.node_mut(id)?.replication_state.insecure_request_policy = policy;
        Ok(())
    }

    pub fn set_has_before_unload_handler(
        &mut self,
        id: FrameTreeNodeId,
        has_handler: bool,
    ) -> Result<()> {
        self.node_mut(id)?
            .render_manager
            .current
            .set_has_before_unload_handler(has_handler);
        Ok(())
    }

    /// Show or hide every frame of a page.
    pub fn set_page_hidden(&mut self, page_id: PageId, hidden: bool) -> Result<()> {
        self.pages
            .page_mut(page_id)
            .ok_or(Error::PageNotFound(page_id))?
            .set_hidden(hidden);
        for id in self.nodes_of_page(page_id) {
            if let Some(node) = self.nodes.get_mut(&id) {
                let current = &mut node.render_manager.current;
                if hidden {
                    current.hide();
                } else {
                    current.show();
                }
            }
        }
        Ok(())
    }

    /// Give focus to a frame, taking it from the previously focused one.
    pub fn focus_frame(&mut self, id: FrameTreeNodeId) -> Result<()> {
        let page_id = self
            .nodes
            .get(&id)
            .ok_or(Error::FrameTreeNodeNotFound(id))?
            .page_id();
        let previous = self.pages.page(page_id).and_then(Page::focused_frame);
        if let Some(previous) = previous.and_then(|previous| self.nodes.get_mut(&previous)) {
            previous.render_manager.current.blur();
        }
        self.node_mut(id)?.render_manager.current.focus();
        if let Some(page) = self.pages.page_mut(page_id) {
            page.set_focused_frame(Some(id));
        }
        self.pages.focus_page(page_id);
        Ok(())
    }

    /// The renderer of `host` finished running its unload handler.
    pub fn on_swap_out_ack(&mut self, node: FrameTreeNodeId, host: RenderFrameHostId) -> Result<()> {
        let frame = self.node_mut(node)?;
        let index = frame
            .render_manager
            .pending_delete
            .iter()
            .position(|pending| pending.id() == host)
            .ok_or(Error::RenderFrameHostNotFound(host))?;
        let host = frame.render_manager.pending_delete.remove(index);
        self.destroy_render_frame_host(host);
        Ok(())
    }

    /// The renderer process behind `instance` died.
    pub fn render_process_gone(&mut self, instance: SiteInstanceId) {
        log::warn!("FrameTree: renderer of {instance} is gone");
        let ids: Vec<FrameTreeNodeId> = self.nodes.keys().copied().collect();
        let mut dead_hosts = Vec::new();
        let mut crashed_main_frames = Vec::new();
        for id in ids {
            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };
            let is_main_frame = node.is_main_frame();
            let page_id = node.page_id();
            let state = &mut node.render_manager;
            if state.current.site_instance() == instance {
                state.current.render_process_gone();
                if is_main_frame {
                    crashed_main_frames.push((id, page_id));
                }
            }
            if let Some(speculative) = state.speculative.as_mut() {
                if speculative.site_instance() == instance {
                    speculative.render_process_gone();
                }
            }
            let (dead, alive): (Vec<_>, Vec<_>) = std::mem::take(&mut state.pending_delete)
                .into_iter()
                .partition(|host| host.site_instance() == instance);
            state.pending_delete = alive;
            dead_hosts.extend(dead);
            if let Some(proxy) = state.proxies.get_mut(&instance) {
                proxy.render_process_gone();
            }
        }
        for host in dead_hosts {
            self.destroy_render_frame_host(host);
        }
        for (id, page_id) in crashed_main_frames {
            if self.pages.page(page_id).is_some_and(|page| !page.is_hidden()) {
                self.delegate.render_process_gone_from_render_manager(id);
            }
        }
    }

    /// Whether any frame of a page is loading.
    pub fn is_page_loading(&self, page_id: PageId) -> bool {
        self.nodes_of_page(page_id)
            .iter()
            .any(|id| self.nodes[id].is_loading())
    }

    pub(crate) fn did_start_loading(
        &mut self,
        id: FrameTreeNodeId,
        to_different_document: bool,
        was_previously_loading: bool,
    ) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        let page_id = node.page_id();
        if to_different_document && node.is_main_frame() {
            self.reset_load_progress(page_id);
        }
        if !was_previously_loading {
            if let Some(page) = self.pages.page_mut(page_id) {
                page.set_loading(true);
            }
            self.delegate.did_start_loading(id, to_different_document);
        }
        self.did_change_load_progress(id, LOADING_PROGRESS_MINIMUM);
    }

    pub(crate) fn did_stop_loading(&mut self, id: FrameTreeNodeId) {
        let Some(page_id) = self.nodes.get(&id).map(FrameTreeNode::page_id) else {
            return;
        };
        self.did_change_load_progress(id, LOADING_PROGRESS_DONE);
        if !self.is_page_loading(page_id) {
            let was_loading = self.pages.page(page_id).is_some_and(Page::is_loading);
            if let Some(page) = self.pages.page_mut(page_id) {
                page.set_loading(false);
            }
            if was_loading {
                self.delegate.did_stop_loading(page_id);
            }
        }
    }

    pub(crate) fn did_change_load_progress(&mut self, id: FrameTreeNodeId, progress: f64) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        node.loading_progress = progress;
        let page_id = node.page_id();
        self.update_load_progress(page_id);
    }

    fn update_load_progress(&mut self, page_id: PageId) {
        let nodes = self.nodes_of_page(page_id);
        if nodes.is_empty() {
            return;
        }
        let total: f64 = nodes.iter().map(|id| self.nodes[id].loading_progress).sum();
        let progress = total / nodes.len() as f64;
        let Some(page) = self.pages.page_mut(page_id) else {
            return;
        };
        if page.load_progress() != progress {
            page.set_load_progress(progress);
            self.delegate.load_progress_changed(page_id, progress);
        }
    }

    fn reset_load_progress(&mut self, page_id: PageId) {
        for id in self.nodes_of_page(page_id) {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.loading_progress = 0.0;
            }
        }
        if let Some(page) = self.pages.page_mut(page_id) {
            page.set_load_progress(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use navcore_messages::PageTransition;
    use url::Url;

    use super::*;
    use crate::delegate::LoggingDelegate;
    use crate::render_frame_host_manager::NavigationTarget;

    #[derive(Default)]
    struct DestroyedFrames(RefCell<Vec<FrameTreeNodeId>>);

    impl FrameTreeNodeObserver for DestroyedFrames {
        fn on_frame_tree_node_destroyed(&self, frame_tree_node_id: FrameTreeNodeId) {
            self.0.borrow_mut().push(frame_tree_node_id);
        }
    }

    fn frame_tree() -> FrameTree {
        FrameTree::new(Config::default(), Rc::new(LoggingDelegate))
    }

    fn page_with_root(frame_tree: &mut FrameTree) -> (PageId, FrameTreeNodeId) {
        let page = frame_tree.create_page(BrowserContextId::new());
        (page, frame_tree.root(page).unwrap())
    }

    #[test]
    fn test_children_and_siblings() {
        let mut frame_tree = frame_tree();
        let (page, root) = page_with_root(&mut frame_tree);
        let first = frame_tree.add_child(root, "first", SandboxFlags::empty()).unwrap();
        let second = frame_tree.add_child(root, "", SandboxFlags::empty()).unwrap();
        let grandchild = frame_tree.add_child(first, "", SandboxFlags::empty()).unwrap();

        assert_eq!(frame_tree.nodes_of_page(page), vec![root, first, grandchild, second]);
        assert_eq!(frame_tree.next_sibling(first), Some(second));
        assert_eq!(frame_tree.previous_sibling(second), Some(first));
        assert_eq!(frame_tree.previous_sibling(first), None);
        assert_eq!(frame_tree.node(second).unwrap().unique_name(), "/<!--frame1-->");
        // Children start in their parent's site instance.
        let instance = frame_tree.node(root).unwrap().current_frame_host().site_instance();
        assert_eq!(
            frame_tree.node(grandchild).unwrap().current_frame_host().site_instance(),
            instance
        );
    }

    #[test]
    fn test_remove_frame_destroys_the_subtree() {
        let mut frame_tree = frame_tree();
        let observer = Rc::new(DestroyedFrames::default());
        frame_tree.add_observer(observer.clone());
        let (page, root) = page_with_root(&mut frame_tree);
        let child = frame_tree.add_child(root, "", SandboxFlags::empty()).unwrap();
        let grandchild = frame_tree.add_child(child, "", SandboxFlags::empty()).unwrap();

        frame_tree.remove_frame(child).unwrap();
        assert!(frame_tree.node(child).is_none());
        assert!(frame_tree.node(grandchild).is_none());
        assert!(frame_tree.node(root).unwrap().children().is_empty());
        assert_eq!(*observer.0.borrow(), vec![grandchild, child]);

        // Removing a main frame closes its page.
        frame_tree.remove_frame(root).unwrap();
        assert!(frame_tree.page(page).is_none());
        assert_eq!(frame_tree.node_count(), 0);
        assert!(frame_tree.site_instances().is_empty());
    }

    #[test]
    fn test_closing_the_opener_clears_it() {
        let mut frame_tree = frame_tree();
        let (opener_page, opener_root) = page_with_root(&mut frame_tree);
        let popup = frame_tree.create_popup(opener_root, "popup", false).unwrap();
        let popup_root = frame_tree.root(popup).unwrap();
        let opener_instance = frame_tree
            .node(opener_root)
            .unwrap()
            .current_frame_host()
            .site_instance();
        let popup_node = frame_tree.node(popup_root).unwrap();
        assert_eq!(popup_node.opener(), Some(opener_root));
        assert_eq!(popup_node.frame_name(), "popup");
        assert_eq!(popup_node.current_frame_host().site_instance(), opener_instance);

        frame_tree.close_page(opener_page).unwrap();
        assert_eq!(frame_tree.node(popup_root).unwrap().opener(), None);
    }

    #[test]
    fn test_navigation_leaves_an_instance_of_another_browser_context() {
        let mut frame_tree = frame_tree();
        let (_, other_root) = page_with_root(&mut frame_tree);
        let host = frame_tree.node(other_root).unwrap().current_frame_host();
        let (host, other_instance) = (host.id(), host.site_instance());
        let url = Url::parse("https://a.test/").unwrap();
        frame_tree
            .did_commit_provisional_load(
                other_root,
                host,
                DidCommitProvisionalLoadParams::for_url(url.clone()),
            )
            .unwrap();

        let browser_context = BrowserContextId::new();
        let page = frame_tree.create_page_in(other_instance, browser_context);
        let root = frame_tree.root(page).unwrap();
        let target = NavigationTarget {
            url,
            source_site_instance: None,
            dest_site_instance: None,
            transition: PageTransition::default(),
            is_restore: false,
            is_view_source: false,
            is_renderer_initiated: false,
            was_redirected: false,
        };
        let host = frame_tree
            .render_manager(root)
            .unwrap()
            .get_frame_host_for_navigation(&target);

        let instance = frame_tree.render_frame_host(root, host).unwrap().site_instance();
        assert_ne!(instance, other_instance);
        assert!(!frame_tree.site_instances().is_related(instance, other_instance));
        assert_eq!(
            frame_tree.site_instances().instance(instance).browser_context(),
            browser_context
        );
    }

    #[test]
    fn test_noopener_popup_is_unrelated() {
        let mut frame_tree = frame_tree();
        let (_, opener_root) = page_with_root(&mut frame_tree);
        let popup = frame_tree.create_popup(opener_root, "", true).unwrap();
        let popup_root = frame_tree.root(popup).unwrap();
        let instance_of = |id| {
            frame_tree
                .node(id)
                .unwrap()
                .current_frame_host()
                .site_instance()
        };
        assert!(!frame_tree
            .site_instances()
            .is_related(instance_of(opener_root), instance_of(popup_root)));
        assert_eq!(frame_tree.node(popup_root).unwrap().opener(), None);
    }

    #[test]
    fn test_sandbox_flags_wait_for_the_next_commit() {
        let mut frame_tree = frame_tree();
        let (_, root) = page_with_root(&mut frame_tree);
        let child = frame_tree.add_child(root, "", SandboxFlags::SCRIPTS).unwrap();
        let grandchild = frame_tree.add_child(child, "", SandboxFlags::FORMS).unwrap();
        assert_eq!(
            frame_tree.node(grandchild).unwrap().effective_sandbox_flags(),
            SandboxFlags::SCRIPTS | SandboxFlags::FORMS
        );

        frame_tree
            .update_sandbox_flags(child, SandboxFlags::SCRIPTS | SandboxFlags::POPUPS)
            .unwrap();
        let node = frame_tree.node(child).unwrap();
        assert_eq!(node.effective_sandbox_flags(), SandboxFlags::SCRIPTS);
        assert_eq!(
            node.pending_sandbox_flags(),
            SandboxFlags::SCRIPTS | SandboxFlags::POPUPS
        );

        let host = node.current_frame_host().id();
        let url = Url::parse("https://a.test/").unwrap();
        frame_tree
            .did_commit_provisional_load(child, host, DidCommitProvisionalLoadParams::for_url(url))
            .unwrap();
        assert_eq!(
            frame_tree.node(child).unwrap().effective_sandbox_flags(),
            SandboxFlags::SCRIPTS | SandboxFlags::POPUPS
        );
    }

    #[test]
    fn test_renderer_commit_assigns_the_site() {
        let mut frame_tree = frame_tree();
        let (_, root) = page_with_root(&mut frame_tree);
        let host = frame_tree.node(root).unwrap().current_frame_host();
        let (host, instance) = (host.id(), host.site_instance());

        let blank = Url::parse("about:blank").unwrap();
        frame_tree
            .did_commit_provisional_load(root, host, DidCommitProvisionalLoadParams::for_url(blank))
            .unwrap();
        assert!(!frame_tree.site_instances().instance(instance).has_site());
        assert!(!frame_tree.node(root).unwrap().has_committed_real_load());

        let url = Url::parse("https://www.a.test/").unwrap();
        frame_tree
            .did_commit_provisional_load(root, host, DidCommitProvisionalLoadParams::for_url(url))
            .unwrap();
        assert_eq!(
            frame_tree
                .site_instances()
                .instance(instance)
                .site()
                .map(ToString::to_string)
                .as_deref(),
            Some("https://a.test")
        );
        assert!(frame_tree.node(root).unwrap().has_committed_real_load());

        let unknown = RenderFrameHostId::new();
        let url = Url::parse("https://a.test/").unwrap();
        assert!(matches!(
            frame_tree.did_commit_provisional_load(
                root,
                unknown,
                DidCommitProvisionalLoadParams::for_url(url)
            ),
            Err(Error::RenderFrameHostNotFound(_))
        ));
    }

    #[test]
    fn test_focus_and_visibility() {
        let mut frame_tree = frame_tree();
        let (page, root) = page_with_root(&mut frame_tree);
        let child = frame_tree.add_child(root, "", SandboxFlags::empty()).unwrap();

        frame_tree.focus_frame(root).unwrap();
        frame_tree.focus_frame(child).unwrap();
        assert_eq!(frame_tree.page(page).unwrap().focused_frame(), Some(child));
        assert!(!frame_tree.node(root).unwrap().current_frame_host().is_focused());

        frame_tree.set_page_hidden(page, true).unwrap();
        assert!(frame_tree.page(page).unwrap().is_hidden());
        assert!(!frame_tree.node(root).unwrap().current_frame_host().is_visible());
    }
}
