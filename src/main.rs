use std::collections::HashMap;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use navcore::config::{parse_cli_args, Config};
use navcore::delegate::LoggingDelegate;
use navcore::id::{BrowserContextId, FrameTreeNodeId};
use navcore::messages::{
    LoaderEvent, NavigationId, NetError, RedirectInfo, ResponseHead, ToLoaderMessage,
};
use navcore::{ChannelLoaderFactory, Error, NavigateParams, Navigator, Result};
use url::Url;

/// Pages the demo visits when no URL is given.
const DEMO_URLS: &[&str] = &[
    "https://a.test/",
    "https://a.test/next",
    "https://redirect.b.test/",
    "about:blank",
    "https://nocontent.test/",
    "https://unreachable.invalid/",
];

fn main() -> Result<()> {
    env_logger::init();

    let cli_args = parse_cli_args()?;
    let config = Config::from_cli_args(cli_args)?;
    let urls = if config.initial_urls.is_empty() {
        DEMO_URLS
            .iter()
            .map(|url| Url::parse(url))
            .collect::<std::result::Result<Vec<_>, _>>()?
    } else {
        config.initial_urls.clone()
    };

    let (loader_factory, loader_receiver) = ChannelLoaderFactory::unbounded();
    let mut navigator = Navigator::new(
        config,
        Rc::new(LoggingDelegate),
        Box::new(loader_factory),
    );
    let events = navigator.loader_event_sender();
    let network = thread::Builder::new()
        .name("loopback-network".to_string())
        .spawn(move || run_loopback_network(loader_receiver, events))?;

    let page = navigator.create_page(BrowserContextId::new());
    let root = navigator
        .frame_tree()
        .root(page)
        .ok_or(Error::PageNotFound(page))?;

    for url in urls {
        navigator.navigate(root, NavigateParams::new(url.clone()))?;
        while navigator.navigation_request(root).is_some() {
            if network.is_finished() {
                return Err(Error::LoaderDisconnected);
            }
            navigator.wait_for_loader_events(Duration::from_millis(100));
        }
        log_placement(&navigator, root, &url)?;
    }

    drop(navigator);
    network.join().map_err(|_| Error::LoaderDisconnected)?;
    Ok(())
}

fn log_placement(navigator: &Navigator, root: FrameTreeNodeId, url: &Url) -> Result<()> {
    let frame_tree = navigator.frame_tree();
    let node = frame_tree
        .node(root)
        .ok_or(Error::FrameTreeNodeNotFound(root))?;
    let host = node.current_frame_host();
    let instance = frame_tree.site_instances().instance(host.site_instance());
    log::info!(
        "{url}: showing {} in {} ({}, site {})",
        host.last_committed_url()
            .map(Url::as_str)
            .unwrap_or("nothing"),
        instance.id(),
        instance.browsing_instance(),
        instance
            .site()
            .map(ToString::to_string)
            .unwrap_or_else(|| "unassigned".to_string()),
    );
    Ok(())
}

/// Answers every request locally:
/// - `*.invalid` hosts fail to resolve,
/// - `nocontent.*` hosts answer `204 No Content`,
/// - `redirect.*` hosts redirect to the same URL without the prefix,
/// - everything else is an HTML page.
fn run_loopback_network(requests: Receiver<ToLoaderMessage>, events: Sender<LoaderEvent>) {
    let mut pending_redirects: HashMap<NavigationId, Url> = HashMap::new();
    for message in requests {
        let event = match message {
            ToLoaderMessage::Start(info) => respond(info.navigation_id, &info.common_params.url),
            ToLoaderMessage::FollowRedirect(navigation_id) => {
                match pending_redirects.remove(&navigation_id) {
                    Some(url) => respond(navigation_id, &url),
                    None => continue,
                }
            }
            ToLoaderMessage::ProceedWithResponse(navigation_id) => {
                log::trace!("Network: streaming body of {navigation_id}");
                continue;
            }
            ToLoaderMessage::Abandon(navigation_id) => {
                log::debug!("Network: {navigation_id} abandoned");
                pending_redirects.remove(&navigation_id);
                continue;
            }
            other => {
                log::warn!("Network: unsupported message {other:?}");
                continue;
            }
        };
        if let LoaderEvent {
            navigation_id,
            message: navcore::messages::FromLoaderMessage::Redirected { redirect_info, .. },
        } = &event
        {
            pending_redirects.insert(*navigation_id, redirect_info.new_url.clone());
        }
        if events.send(event).is_err() {
            break;
        }
    }
    log::debug!("Network: shutting down");
}

fn respond(navigation_id: NavigationId, url: &Url) -> LoaderEvent {
    let host = url.host_str().unwrap_or_default();
    if host.ends_with(".invalid") {
        return LoaderEvent::failed(navigation_id, NetError::NameNotResolved);
    }
    if host.starts_with("nocontent.") {
        return LoaderEvent::response_started(
            navigation_id,
            ResponseHead::new(http::StatusCode::NO_CONTENT),
        );
    }
    if let Some(target) = host.strip_prefix("redirect.") {
        let mut new_url = url.clone();
        if new_url.set_host(Some(target)).is_ok() {
            return LoaderEvent::redirected(navigation_id, RedirectInfo::found(new_url));
        }
    }
    let mut response = ResponseHead::ok();
    response.mime_type = Some(mime::TEXT_HTML.to_string());
    LoaderEvent::response_started(navigation_id, response)
}
