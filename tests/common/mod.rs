#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use navcore::config::Config;
use navcore::frame_host::RenderFrameHost;
use navcore::frame_tree_node::FrameTreeNode;
use navcore::id::{BrowserContextId, FrameTreeNodeId, PageId, RenderFrameHostId, SiteInstanceId};
use navcore::messages::{
    LoaderEvent, NavigationId, NavigationRequestInfo, NetError, RedirectInfo, ResponseHead,
};
use navcore::{
    NavigateParams, NavigationDelegate, NavigationHandle, NavigationLoader,
    NavigationLoaderFactory, NavigationThrottle, Navigator, ThrottleCheckResult,
};
use url::Url;

pub fn url(url: &str) -> Url {
    Url::parse(url).unwrap()
}

/// What a loader was asked to do.
#[derive(Clone, Debug, PartialEq)]
pub enum LoaderCommand {
    FollowRedirect(NavigationId),
    ProceedWithResponse(NavigationId),
    Abandon(NavigationId),
}

#[derive(Debug, Default)]
pub struct LoaderLog {
    pub started: Vec<(NavigationId, Url)>,
    pub commands: Vec<LoaderCommand>,
}

struct RecordingLoader {
    navigation_id: NavigationId,
    log: Rc<RefCell<LoaderLog>>,
}

impl NavigationLoader for RecordingLoader {
    fn follow_redirect(&mut self) {
        self.log
            .borrow_mut()
            .commands
            .push(LoaderCommand::FollowRedirect(self.navigation_id));
    }

    fn proceed_with_response(&mut self) {
        self.log
            .borrow_mut()
            .commands
            .push(LoaderCommand::ProceedWithResponse(self.navigation_id));
    }

    fn abandon(&mut self) {
        self.log
            .borrow_mut()
            .commands
            .push(LoaderCommand::Abandon(self.navigation_id));
    }
}

struct RecordingLoaderFactory {
    log: Rc<RefCell<LoaderLog>>,
}

impl NavigationLoaderFactory for RecordingLoaderFactory {
    fn create_loader(&self, info: NavigationRequestInfo) -> Box<dyn NavigationLoader> {
        self.log
            .borrow_mut()
            .started
            .push((info.navigation_id, info.common_params.url.clone()));
        Box::new(RecordingLoader {
            navigation_id: info.navigation_id,
            log: self.log.clone(),
        })
    }
}

/// Verdicts a throttle hands out for URLs of one host.
#[derive(Clone, Copy, Debug)]
pub struct Script {
    pub start: ThrottleCheckResult,
    pub redirect: ThrottleCheckResult,
    pub response: ThrottleCheckResult,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            start: ThrottleCheckResult::Proceed,
            redirect: ThrottleCheckResult::Proceed,
            response: ThrottleCheckResult::Proceed,
        }
    }
}

/// Looks the verdict up by the host the navigation targets at each
/// checkpoint.
struct ScriptedThrottle {
    scripts: Rc<RefCell<HashMap<String, Script>>>,
}

impl ScriptedThrottle {
    fn script(&self, handle: &NavigationHandle) -> Script {
        let host = handle.url().host_str().unwrap_or_default();
        self.scripts.borrow().get(host).copied().unwrap_or_default()
    }
}

impl NavigationThrottle for ScriptedThrottle {
    fn will_start_request(&mut self, handle: &NavigationHandle) -> ThrottleCheckResult {
        self.script(handle).start
    }

    fn will_redirect_request(&mut self, handle: &NavigationHandle) -> ThrottleCheckResult {
        self.script(handle).redirect
    }

    fn will_process_response(&mut self, handle: &NavigationHandle) -> ThrottleCheckResult {
        self.script(handle).response
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// A finished navigation as the delegate saw it.
#[derive(Clone, Debug)]
pub struct Finished {
    pub navigation_id: NavigationId,
    pub url: Url,
    pub original_url: Url,
    pub redirect_count: usize,
    pub has_committed: bool,
    pub is_error_page: bool,
    pub net_error: NetError,
}

pub struct RecordingDelegate {
    pub started: RefCell<Vec<NavigationId>>,
    pub ready_to_commit: RefCell<Vec<(NavigationId, RenderFrameHostId)>>,
    pub finished: RefCell<Vec<Finished>>,
    pub swaps: RefCell<Vec<(RenderFrameHostId, RenderFrameHostId)>>,
    pub scripts: Rc<RefCell<HashMap<String, Script>>>,
    pub allow_transfer: Cell<bool>,
}

impl Default for RecordingDelegate {
    fn default() -> Self {
        Self {
            started: RefCell::default(),
            ready_to_commit: RefCell::default(),
            finished: RefCell::default(),
            swaps: RefCell::default(),
            scripts: Rc::default(),
            allow_transfer: Cell::new(true),
        }
    }
}

impl RecordingDelegate {
    pub fn script(&self, host: &str, script: Script) {
        self.scripts.borrow_mut().insert(host.to_string(), script);
    }

    pub fn finished_for(&self, navigation_id: NavigationId) -> Vec<Finished> {
        self.finished
            .borrow()
            .iter()
            .filter(|finished| finished.navigation_id == navigation_id)
            .cloned()
            .collect()
    }
}

impl NavigationDelegate for RecordingDelegate {
    fn did_start_navigation(&self, handle: &NavigationHandle) {
        self.started.borrow_mut().push(handle.navigation_id());
    }

    fn ready_to_commit_navigation(&self, handle: &NavigationHandle) {
        if let Some(host) = handle.render_frame_host() {
            self.ready_to_commit
                .borrow_mut()
                .push((handle.navigation_id(), host));
        }
    }

    fn did_finish_navigation(&self, handle: &NavigationHandle) {
        self.finished.borrow_mut().push(Finished {
            navigation_id: handle.navigation_id(),
            url: handle.url().clone(),
            original_url: handle.original_url().clone(),
            redirect_count: handle.redirect_chain().len() - 1,
            has_committed: handle.has_committed(),
            is_error_page: handle.is_error_page(),
            net_error: handle.net_error(),
        });
    }

    fn should_transfer_navigation(&self, _is_main_frame: bool) -> bool {
        self.allow_transfer.get()
    }

    fn create_throttles_for_navigation(
        &self,
        _handle: &NavigationHandle,
    ) -> Vec<Box<dyn NavigationThrottle>> {
        vec![Box::new(ScriptedThrottle {
            scripts: self.scripts.clone(),
        })]
    }

    fn notify_swapped_from_render_manager(
        &self,
        _frame_tree_node_id: FrameTreeNodeId,
        old_host: RenderFrameHostId,
        new_host: RenderFrameHostId,
        _is_main_frame: bool,
    ) {
        self.swaps.borrow_mut().push((old_host, new_host));
    }
}

/// A navigator with one page, a recording delegate and a recording loader.
pub struct Harness {
    pub navigator: Navigator,
    pub delegate: Rc<RecordingDelegate>,
    pub loader: Rc<RefCell<LoaderLog>>,
    pub page: PageId,
    pub root: FrameTreeNodeId,
}

impl Harness {
    pub fn new(config: Config) -> Self {
        Self::with_navigator(config, |navigator| navigator)
    }

    pub fn with_navigator(config: Config, setup: impl FnOnce(Navigator) -> Navigator) -> Self {
        let delegate = Rc::new(RecordingDelegate::default());
        let loader = Rc::new(RefCell::new(LoaderLog::default()));
        let navigator = Navigator::new(
            config,
            delegate.clone(),
            Box::new(RecordingLoaderFactory {
                log: loader.clone(),
            }),
        );
        let mut navigator = setup(navigator);
        let page = navigator.create_page(BrowserContextId::new());
        let root = navigator.frame_tree().root(page).unwrap();
        Self {
            navigator,
            delegate,
            loader,
            page,
            root,
        }
    }

    pub fn navigate(&mut self, url: &str) -> NavigationId {
        self.navigate_frame(self.root, url)
    }

    pub fn navigate_frame(&mut self, id: FrameTreeNodeId, target: &str) -> NavigationId {
        self.navigator
            .navigate(id, NavigateParams::new(url(target)))
            .unwrap()
    }

    pub fn respond(&mut self, navigation_id: NavigationId) {
        self.respond_with(navigation_id, ResponseHead::ok());
    }

    pub fn respond_with(&mut self, navigation_id: NavigationId, response: ResponseHead) {
        self.navigator
            .handle_loader_event(LoaderEvent::response_started(navigation_id, response))
            .unwrap();
    }

    pub fn redirect(&mut self, navigation_id: NavigationId, to: &str) {
        self.navigator
            .handle_loader_event(LoaderEvent::redirected(
                navigation_id,
                RedirectInfo::found(url(to)),
            ))
            .unwrap();
    }

    /// Navigate the main frame and let the response through.
    pub fn load(&mut self, url: &str) -> NavigationId {
        let navigation_id = self.navigate(url);
        self.respond(navigation_id);
        navigation_id
    }

    /// The browser context of the harness page.
    pub fn browser_context(&self) -> BrowserContextId {
        self.navigator
            .frame_tree()
            .page(self.page)
            .unwrap()
            .browser_context()
    }

    pub fn node(&self, id: FrameTreeNodeId) -> &FrameTreeNode {
        self.navigator.frame_tree().node(id).unwrap()
    }

    pub fn current_host(&self, id: FrameTreeNodeId) -> &RenderFrameHost {
        self.node(id).current_frame_host()
    }

    pub fn current_instance(&self, id: FrameTreeNodeId) -> SiteInstanceId {
        self.current_host(id).site_instance()
    }

    pub fn site_of(&self, instance: SiteInstanceId) -> Option<String> {
        self.navigator
            .frame_tree()
            .site_instances()
            .instance(instance)
            .site()
            .map(ToString::to_string)
    }

    pub fn committed_url(&self, id: FrameTreeNodeId) -> Option<String> {
        self.current_host(id)
            .last_committed_url()
            .map(|url| url.to_string())
    }

    pub fn started_loads(&self) -> usize {
        self.loader.borrow().started.len()
    }

    pub fn commands(&self) -> Vec<LoaderCommand> {
        self.loader.borrow().commands.clone()
    }
}
