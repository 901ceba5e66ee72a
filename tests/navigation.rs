mod common;

use std::time::{Duration, Instant};

use navcore::config::Config;
use navcore::frame_tree_node::SandboxFlags;
use navcore::id::BrowserContextId;
use navcore::messages::{LoaderEvent, NetError, ResponseHead};
use navcore::navigation_request::{AssociatedSiteInstanceType, NavigationState};
use navcore::service_worker::ScopedServiceWorkerContext;
use navcore::{Error, HandleState, NavigateParams, ThrottleCheckResult};

use common::{url, Harness, LoaderCommand, Script};

fn isolating(origin: &str) -> Config {
    Config {
        isolated_origins: vec![url(origin)],
        ..Config::default()
    }
}

#[test]
fn test_first_navigation_reuses_the_empty_instance() {
    let mut h = Harness::new(Config::default());
    let initial_instance = h.current_instance(h.root);
    assert_eq!(h.site_of(initial_instance), None);

    let navigation_id = h.navigate("https://a.test/");
    let request = h.navigator.navigation_request(h.root).unwrap();
    assert_eq!(request.state(), NavigationState::Started);
    assert_eq!(
        request.associated_site_instance_type(),
        AssociatedSiteInstanceType::Current
    );
    assert_eq!(
        h.loader.borrow().started,
        vec![(navigation_id, url("https://a.test/"))]
    );
    assert!(h.node(h.root).render_manager().speculative().is_none());

    h.respond(navigation_id);
    assert!(h.navigator.navigation_request(h.root).is_none());
    assert_eq!(h.current_instance(h.root), initial_instance);
    assert_eq!(h.site_of(initial_instance).as_deref(), Some("https://a.test"));
    assert_eq!(h.committed_url(h.root).as_deref(), Some("https://a.test/"));
    assert_eq!(
        h.commands(),
        vec![LoaderCommand::ProceedWithResponse(navigation_id)]
    );
    assert!(h.node(h.root).has_committed_real_load());

    let finished = h.delegate.finished_for(navigation_id);
    assert_eq!(finished.len(), 1);
    assert!(finished[0].has_committed);
    assert!(!finished[0].is_error_page);
    assert!(h.delegate.swaps.borrow().is_empty());
}

#[test]
fn test_isolated_site_commits_in_a_speculative_host() {
    let mut h = Harness::new(isolating("https://b.test"));
    h.load("https://a.test/");
    let old_host = h.current_host(h.root).id();
    let old_instance = h.current_instance(h.root);

    let navigation_id = h.navigate("https://b.test/");
    let speculative = h
        .node(h.root)
        .render_manager()
        .speculative()
        .map(|host| (host.id(), host.site_instance()))
        .unwrap();
    assert_ne!(speculative.1, old_instance);
    assert_eq!(
        h.navigator
            .navigation_request(h.root)
            .unwrap()
            .associated_site_instance_type(),
        AssociatedSiteInstanceType::Speculative
    );

    h.respond(navigation_id);
    let manager = h.node(h.root).render_manager();
    assert_eq!(manager.current().id(), speculative.0);
    assert!(manager.speculative().is_none());
    assert_eq!(h.site_of(speculative.1).as_deref(), Some("https://b.test"));
    assert!(
        h.navigator
            .frame_tree()
            .site_instances()
            .instance(speculative.1)
            .requires_dedicated_process()
    );
    assert_eq!(*h.delegate.swaps.borrow(), vec![(old_host, speculative.0)]);

    // Nothing else renders in the old instance: no proxy is kept for it.
    let manager = h.node(h.root).render_manager();
    assert!(manager.proxy(old_instance).is_none());
    assert!(manager.proxy(speculative.1).is_none());
    assert_eq!(manager.pending_delete().len(), 1);
    assert_eq!(manager.pending_delete()[0].id(), old_host);

    h.navigator.on_swap_out_ack(h.root, old_host).unwrap();
    assert!(h.node(h.root).render_manager().pending_delete().is_empty());
}

#[test]
fn test_opener_keeps_the_old_instance_reachable_through_a_proxy() {
    let mut h = Harness::new(isolating("https://b.test"));
    h.load("https://a.test/");
    let old_instance = h.current_instance(h.root);
    let popup = h.navigator.create_popup(h.root, "", false).unwrap();
    let popup_root = h.navigator.frame_tree().root(popup).unwrap();
    assert_eq!(h.current_instance(popup_root), old_instance);

    let navigation_id = h.navigate("https://b.test/");
    h.respond(navigation_id);

    let manager = h.node(h.root).render_manager();
    assert_ne!(manager.current().site_instance(), old_instance);
    assert!(manager
        .proxy(old_instance)
        .is_some_and(|proxy| proxy.is_render_frame_proxy_live()));

    // Once the popup is gone nothing renders in the old instance.
    h.navigator.close_page(popup).unwrap();
    assert!(h.node(h.root).render_manager().proxy(old_instance).is_none());
    assert_eq!(h.node(h.root).render_manager().proxy_count(), 0);
}

#[test]
fn test_mutual_openers_get_proxies_in_the_new_instance() {
    let mut h = Harness::new(isolating("https://b.test"));
    h.load("https://a.test/");
    let old_instance = h.current_instance(h.root);
    let popup = h.navigator.create_popup(h.root, "", false).unwrap();
    let popup_root = h.navigator.frame_tree().root(popup).unwrap();
    h.navigator.set_opener(h.root, Some(popup_root)).unwrap();
    assert_eq!(h.node(h.root).opener(), Some(popup_root));
    assert_eq!(h.node(popup_root).opener(), Some(h.root));

    let navigation_id = h.navigate_frame(popup_root, "https://b.test/");
    let new_instance = h
        .node(popup_root)
        .render_manager()
        .speculative()
        .map(|host| host.site_instance())
        .unwrap();
    assert!(h
        .navigator
        .frame_tree()
        .site_instances()
        .is_related(new_instance, old_instance));
    // The opener of the popup is reachable from the new instance, and its
    // own opener points back at the popup.
    let proxy = h.node(h.root).render_manager().proxy(new_instance).unwrap();
    assert!(proxy.is_render_frame_proxy_live());
    assert_eq!(proxy.opener(), Some(popup_root));

    h.respond(navigation_id);
    assert_eq!(h.current_instance(popup_root), new_instance);
    let proxy = h.node(popup_root).render_manager().proxy(old_instance).unwrap();
    assert_eq!(proxy.opener(), Some(h.root));
    assert!(h.node(popup_root).render_manager().proxy(new_instance).is_none());
}

#[test]
fn test_cancelled_start_leaves_the_document_alone() {
    let mut h = Harness::new(Config::default());
    h.load("https://a.test/");
    let host = h.current_host(h.root).id();
    h.delegate.script(
        "blocked.test",
        Script {
            start: ThrottleCheckResult::Cancel,
            ..Script::default()
        },
    );

    let navigation_id = h.navigate("https://blocked.test/");
    assert!(h.navigator.navigation_request(h.root).is_none());
    assert_eq!(h.started_loads(), 1);
    assert_eq!(h.current_host(h.root).id(), host);
    assert_eq!(h.committed_url(h.root).as_deref(), Some("https://a.test/"));
    assert!(h.node(h.root).render_manager().speculative().is_none());
    assert!(!h.node(h.root).is_loading());

    let finished = h.delegate.finished_for(navigation_id);
    assert_eq!(finished.len(), 1);
    assert!(!finished[0].has_committed);
}

#[test]
fn test_no_content_response_keeps_the_previous_document() {
    for status in [http::StatusCode::NO_CONTENT, http::StatusCode::RESET_CONTENT] {
        let mut h = Harness::new(Config::default());
        h.load("https://a.test/");
        let host = h.current_host(h.root).id();
        let commits = h.current_host(h.root).commit_count();

        let navigation_id = h.navigate("https://nocontent.test/");
        h.respond_with(navigation_id, ResponseHead::new(status));

        assert!(h.navigator.navigation_request(h.root).is_none());
        assert_eq!(h.current_host(h.root).id(), host);
        assert_eq!(h.current_host(h.root).commit_count(), commits);
        assert_eq!(h.committed_url(h.root).as_deref(), Some("https://a.test/"));
        assert!(h.node(h.root).render_manager().speculative().is_none());
        assert!(h.delegate.swaps.borrow().is_empty());

        let finished = h.delegate.finished_for(navigation_id);
        assert_eq!(finished.len(), 1);
        assert!(!finished[0].has_committed);
        assert_eq!(finished[0].net_error, NetError::Ok);
    }
}

#[test]
fn test_about_blank_commits_in_the_source_instance() {
    let mut h = Harness::new(Config::default());
    h.load("https://a.test/");

    let other_page = h.navigator.create_page(h.browser_context());
    let other_root = h.navigator.frame_tree().root(other_page).unwrap();
    let navigation_id = h.navigate_frame(other_root, "https://c.test/");
    h.respond(navigation_id);
    let source = h.current_instance(other_root);
    assert_ne!(source, h.current_instance(h.root));

    let mut params = NavigateParams::new(url("about:blank"));
    params.source_site_instance = Some(source);
    let navigation_id = h.navigator.navigate(h.root, params).unwrap();

    assert!(h.navigator.navigation_request(h.root).is_none());
    assert_eq!(h.current_instance(h.root), source);
    assert_eq!(h.committed_url(h.root).as_deref(), Some("about:blank"));
    assert_eq!(h.site_of(source).as_deref(), Some("https://c.test"));
    let finished = h.delegate.finished_for(navigation_id);
    assert!(finished[0].has_committed);
    // No request is made for about:blank.
    assert_eq!(h.started_loads(), 2);
}

#[test]
fn test_instances_of_another_browser_context_are_not_reused() {
    let mut h = Harness::new(Config::default());
    let browser_context = h.browser_context();
    let initial_instance = h.current_instance(h.root);

    let other_page = h.navigator.create_page(BrowserContextId::new());
    let other_root = h.navigator.frame_tree().root(other_page).unwrap();
    let navigation_id = h.navigate_frame(other_root, "https://c.test/");
    h.respond(navigation_id);
    let foreign = h.current_instance(other_root);

    let mut params = NavigateParams::new(url("https://c.test/"));
    params.dest_site_instance = Some(foreign);
    let navigation_id = h.navigator.navigate(h.root, params).unwrap();
    h.respond(navigation_id);
    assert_eq!(h.current_instance(h.root), initial_instance);
    assert_eq!(h.site_of(initial_instance).as_deref(), Some("https://c.test"));
    assert_eq!(h.committed_url(h.root).as_deref(), Some("https://c.test/"));

    let mut params = NavigateParams::new(url("about:blank"));
    params.source_site_instance = Some(foreign);
    h.navigator.navigate(h.root, params).unwrap();
    let instance = h.current_instance(h.root);
    let site_instances = h.navigator.frame_tree().site_instances();
    assert_ne!(instance, foreign);
    assert!(!site_instances.is_related(instance, foreign));
    assert_eq!(site_instances.instance(instance).browser_context(), browser_context);
    assert_eq!(h.committed_url(h.root).as_deref(), Some("about:blank"));
}

#[test]
fn test_navigation_with_a_destroyed_site_instance_is_rejected() {
    let mut h = Harness::new(Config::default());
    h.load("https://a.test/");
    let other_page = h.navigator.create_page(h.browser_context());
    let other_root = h.navigator.frame_tree().root(other_page).unwrap();
    let navigation_id = h.navigate_frame(other_root, "https://c.test/");
    h.respond(navigation_id);
    let stale = h.current_instance(other_root);
    h.navigator.close_page(other_page).unwrap();
    assert!(h.navigator.frame_tree().site_instances().get(stale).is_none());

    let mut params = NavigateParams::new(url("https://c.test/"));
    params.dest_site_instance = Some(stale);
    assert!(matches!(
        h.navigator.navigate(h.root, params),
        Err(Error::SiteInstanceNotFound(id)) if id == stale
    ));

    let mut params = NavigateParams::new(url("about:blank"));
    params.source_site_instance = Some(stale);
    assert!(matches!(
        h.navigator.begin_renderer_navigation(h.root, params),
        Err(Error::SiteInstanceNotFound(id)) if id == stale
    ));

    assert!(h.navigator.navigation_request(h.root).is_none());
    assert_eq!(h.committed_url(h.root).as_deref(), Some("https://a.test/"));
    assert_eq!(h.started_loads(), 2);
}

#[test]
fn test_webui_navigations_switch_browsing_instances() {
    let mut h = Harness::new(Config::default());
    h.load("https://a.test/");
    let web_instance = h.current_instance(h.root);

    h.load("webui://settings/");
    let settings_instance = h.current_instance(h.root);
    assert_eq!(h.committed_url(h.root).as_deref(), Some("webui://settings/"));
    assert!(!h
        .navigator
        .frame_tree()
        .site_instances()
        .is_related(settings_instance, web_instance));

    // Another kind of WebUI page does not share the bindings.
    h.load("webui://history/");
    let history_instance = h.current_instance(h.root);
    assert!(!h
        .navigator
        .frame_tree()
        .site_instances()
        .is_related(history_instance, settings_instance));

    h.load("https://b.test/");
    let leaving_instance = h.current_instance(h.root);
    assert_eq!(h.committed_url(h.root).as_deref(), Some("https://b.test/"));
    assert!(!h
        .navigator
        .frame_tree()
        .site_instances()
        .is_related(leaving_instance, history_instance));
}

#[test]
fn test_view_source_toggle_switches_browsing_instances() {
    let mut h = Harness::new(Config::default());
    h.load("https://a.test/");
    let page_instance = h.current_instance(h.root);

    h.load("view-source:https://a.test/");
    let source_instance = h.current_instance(h.root);
    assert!(!h
        .navigator
        .frame_tree()
        .site_instances()
        .is_related(source_instance, page_instance));
    assert_eq!(
        h.node(h.root).render_manager().current_is_view_source(),
        Some(true)
    );

    h.load("https://a.test/");
    assert!(!h
        .navigator
        .frame_tree()
        .site_instances()
        .is_related(h.current_instance(h.root), source_instance));
    assert_eq!(
        h.node(h.root).render_manager().current_is_view_source(),
        Some(false)
    );
}

#[test]
fn test_redirect_chain_keeps_the_original_url() {
    let mut h = Harness::new(Config::default());
    h.load("https://a.test/");
    let host = h.current_host(h.root).id();

    let navigation_id = h.navigate("https://a.test/start");
    h.redirect(navigation_id, "https://b.test/");
    {
        let handle = h
            .navigator
            .navigation_request(h.root)
            .and_then(|request| request.navigation_handle())
            .unwrap();
        assert_eq!(handle.original_url().as_str(), "https://a.test/start");
        assert_eq!(handle.url().as_str(), "https://b.test/");
    }
    h.redirect(navigation_id, "https://a.test/end");
    {
        let handle = h
            .navigator
            .navigation_request(h.root)
            .and_then(|request| request.navigation_handle())
            .unwrap();
        assert_eq!(handle.original_url().as_str(), "https://a.test/start");
        assert_eq!(handle.redirect_chain().len(), 3);
    }
    assert_eq!(
        h.commands()
            .iter()
            .filter(|command| **command == LoaderCommand::FollowRedirect(navigation_id))
            .count(),
        2
    );

    h.respond(navigation_id);
    // Only the final hop counts: a.test stays where it is.
    assert_eq!(h.current_host(h.root).id(), host);
    assert!(h.delegate.swaps.borrow().is_empty());
    assert_eq!(h.committed_url(h.root).as_deref(), Some("https://a.test/end"));

    let finished = h.delegate.finished_for(navigation_id);
    assert_eq!(finished[0].original_url.as_str(), "https://a.test/start");
    assert_eq!(finished[0].redirect_count, 2);
    assert!(finished[0].has_committed);
}

#[test]
fn test_cross_site_redirect_moves_placement() {
    let mut h = Harness::new(Config::default());
    h.load("https://a.test/");
    let old_instance = h.current_instance(h.root);
    h.delegate.script(
        "b.test",
        Script {
            response: ThrottleCheckResult::Defer,
            ..Script::default()
        },
    );

    let navigation_id = h.navigate("https://a.test/go");
    assert!(h.node(h.root).render_manager().speculative().is_none());
    h.redirect(navigation_id, "https://b.test/");
    h.respond(navigation_id);

    let speculative = h
        .node(h.root)
        .render_manager()
        .speculative()
        .map(|host| (host.id(), host.site_instance()))
        .unwrap();
    assert_ne!(speculative.1, old_instance);
    let handle = h
        .navigator
        .navigation_request(h.root)
        .and_then(|request| request.navigation_handle())
        .unwrap();
    assert_eq!(handle.state(), HandleState::DeferringResponse);
    assert_eq!(handle.render_frame_host(), Some(speculative.0));

    h.navigator.resume_navigation(h.root).unwrap();
    assert_eq!(h.current_host(h.root).id(), speculative.0);
    assert_eq!(h.site_of(speculative.1).as_deref(), Some("https://b.test"));
    assert!(h
        .navigator
        .frame_tree()
        .site_instances()
        .is_related(old_instance, speculative.1));
    assert!(h.delegate.finished_for(navigation_id)[0].has_committed);
}

#[test]
fn test_blocked_deferred_start_shows_an_error_page() {
    let mut h = Harness::new(Config::default());
    h.load("https://a.test/");
    h.delegate.script(
        "blocked.test",
        Script {
            start: ThrottleCheckResult::Defer,
            ..Script::default()
        },
    );

    let navigation_id = h.navigate("https://blocked.test/");
    let handle = h
        .navigator
        .navigation_request(h.root)
        .and_then(|request| request.navigation_handle())
        .unwrap();
    assert_eq!(handle.state(), HandleState::DeferringStart);
    assert_eq!(h.started_loads(), 1);

    h.navigator
        .cancel_deferred_navigation(h.root, ThrottleCheckResult::BlockRequest)
        .unwrap();
    assert!(h.navigator.navigation_request(h.root).is_none());
    assert_eq!(h.started_loads(), 1);
    assert_eq!(
        h.committed_url(h.root).as_deref(),
        Some("https://blocked.test/")
    );
    assert!(h
        .current_host(h.root)
        .last_commit_params()
        .is_some_and(|params| params.is_error_page()));

    let finished = h.delegate.finished_for(navigation_id);
    assert_eq!(finished.len(), 1);
    assert!(finished[0].has_committed);
    assert!(finished[0].is_error_page);
    assert_eq!(finished[0].net_error, NetError::BlockedByClient);
}

#[test]
fn test_deferred_start_resumes_into_the_loader() {
    let mut h = Harness::new(Config::default());
    h.delegate.script(
        "slow.test",
        Script {
            start: ThrottleCheckResult::Defer,
            ..Script::default()
        },
    );
    let navigation_id = h.navigate("https://slow.test/");
    assert_eq!(h.started_loads(), 0);

    h.navigator.resume_navigation(h.root).unwrap();
    assert_eq!(h.started_loads(), 1);
    h.respond(navigation_id);
    assert_eq!(h.committed_url(h.root).as_deref(), Some("https://slow.test/"));
}

#[test]
fn test_cancelling_a_deferred_start_discards_the_navigation() {
    let mut h = Harness::new(Config::default());
    h.delegate.script(
        "slow.test",
        Script {
            start: ThrottleCheckResult::Defer,
            ..Script::default()
        },
    );
    let navigation_id = h.navigate("https://slow.test/");
    h.navigator
        .cancel_deferred_navigation(h.root, ThrottleCheckResult::Cancel)
        .unwrap();

    assert!(h.navigator.navigation_request(h.root).is_none());
    assert_eq!(h.started_loads(), 0);
    let finished = h.delegate.finished_for(navigation_id);
    assert_eq!(finished.len(), 1);
    assert!(!finished[0].has_committed);
}

#[test]
fn test_resume_without_deferral_is_a_no_op() {
    let mut h = Harness::new(Config::default());
    assert!(matches!(
        h.navigator.resume_navigation(h.root),
        Err(Error::NoDeferredNavigation(_))
    ));

    let navigation_id = h.navigate("https://a.test/");
    h.navigator.resume_navigation(h.root).unwrap();
    let request = h.navigator.navigation_request(h.root).unwrap();
    assert_eq!(request.navigation_id(), navigation_id);
    assert_eq!(request.state(), NavigationState::Started);
    assert_eq!(h.started_loads(), 1);
    assert!(h.delegate.finished.borrow().is_empty());

    assert!(matches!(
        h.navigator
            .cancel_deferred_navigation(h.root, ThrottleCheckResult::Cancel),
        Err(Error::NoDeferredNavigation(_))
    ));
}

#[test]
fn test_network_failure_commits_an_error_page() {
    let mut h = Harness::new(Config::default());
    let instance = h.current_instance(h.root);
    let navigation_id = h.navigate("https://unreachable.invalid/");
    h.navigator
        .handle_loader_event(LoaderEvent::failed(
            navigation_id,
            NetError::NameNotResolved,
        ))
        .unwrap();

    assert!(h.navigator.navigation_request(h.root).is_none());
    assert_eq!(
        h.committed_url(h.root).as_deref(),
        Some("https://unreachable.invalid/")
    );
    // Error pages do not pin the instance to a site.
    assert_eq!(h.site_of(instance), None);
    let finished = h.delegate.finished_for(navigation_id);
    assert!(finished[0].is_error_page);
    assert_eq!(finished[0].net_error, NetError::NameNotResolved);
}

#[test]
fn test_aborted_request_commits_nothing() {
    let mut h = Harness::new(Config::default());
    h.load("https://a.test/");
    let navigation_id = h.navigate("https://a.test/next");
    h.navigator
        .handle_loader_event(LoaderEvent::failed(navigation_id, NetError::Aborted))
        .unwrap();

    assert!(h.navigator.navigation_request(h.root).is_none());
    assert_eq!(h.committed_url(h.root).as_deref(), Some("https://a.test/"));
    let finished = h.delegate.finished_for(navigation_id);
    assert!(!finished[0].has_committed);
    assert_eq!(finished[0].net_error, NetError::Aborted);
}

#[test]
fn test_new_navigation_replaces_the_one_in_flight() {
    let mut h = Harness::new(Config::default());
    let first = h.navigate("https://a.test/");
    let second = h.navigate("https://b.test/");

    assert_eq!(
        h.navigator.navigation_request(h.root).map(|r| r.navigation_id()),
        Some(second)
    );
    assert!(h.commands().contains(&LoaderCommand::Abandon(first)));
    let finished = h.delegate.finished_for(first);
    assert_eq!(finished.len(), 1);
    assert!(!finished[0].has_committed);
    assert_eq!(finished[0].net_error, NetError::Aborted);

    // The loader of the first navigation may still be talking.
    assert!(matches!(
        h.navigator
            .handle_loader_event(LoaderEvent::response_started(first, ResponseHead::ok())),
        Err(Error::NavigationNotFound(id)) if id == first
    ));
    h.respond(second);
    assert_eq!(h.committed_url(h.root).as_deref(), Some("https://b.test/"));
}

#[test]
fn test_events_for_a_deferred_request_are_dropped() {
    let mut h = Harness::new(Config::default());
    h.delegate.script(
        "b.test",
        Script {
            redirect: ThrottleCheckResult::Defer,
            ..Script::default()
        },
    );
    let navigation_id = h.navigate("https://a.test/");
    h.redirect(navigation_id, "https://b.test/");
    assert_eq!(
        h.navigator
            .navigation_request(h.root)
            .and_then(|request| request.navigation_handle())
            .map(|handle| handle.state()),
        Some(HandleState::DeferringRedirect)
    );

    // The loader may not answer before the redirect is followed.
    h.respond(navigation_id);
    assert_eq!(
        h.navigator.navigation_request(h.root).map(|r| r.state()),
        Some(NavigationState::Started)
    );

    h.navigator.resume_navigation(h.root).unwrap();
    assert!(h.commands().contains(&LoaderCommand::FollowRedirect(navigation_id)));
    h.respond(navigation_id);
    assert_eq!(h.committed_url(h.root).as_deref(), Some("https://b.test/"));
}

#[test]
fn test_before_unload_holds_the_navigation() {
    let mut h = Harness::new(Config::default());
    h.load("https://a.test/");
    h.navigator.set_has_before_unload_handler(h.root, true).unwrap();

    h.navigate("https://b.test/");
    assert_eq!(
        h.navigator.navigation_request(h.root).map(|r| r.state()),
        Some(NavigationState::WaitingForRendererResponse)
    );
    assert_eq!(h.started_loads(), 1);

    h.navigator.on_before_unload_ack(h.root, true).unwrap();
    assert_eq!(
        h.navigator.navigation_request(h.root).map(|r| r.state()),
        Some(NavigationState::Started)
    );
    assert_eq!(h.started_loads(), 2);
}

#[test]
fn test_before_unload_can_cancel_the_navigation() {
    let mut h = Harness::new(Config::default());
    h.load("https://a.test/");
    h.navigator.set_has_before_unload_handler(h.root, true).unwrap();

    let navigation_id = h.navigate("https://b.test/");
    h.navigator.on_before_unload_ack(h.root, false).unwrap();

    assert!(h.navigator.navigation_request(h.root).is_none());
    assert_eq!(h.started_loads(), 1);
    let finished = h.delegate.finished_for(navigation_id);
    assert!(!finished[0].has_committed);
    assert_eq!(finished[0].net_error, NetError::Aborted);
}

#[test]
fn test_before_unload_times_out() {
    let mut h = Harness::new(Config::default());
    h.load("https://a.test/");
    h.navigator.set_has_before_unload_handler(h.root, true).unwrap();
    h.navigate("https://b.test/");

    h.navigator.tick(Instant::now());
    assert_eq!(h.started_loads(), 1);

    let timeout = h.navigator.config().before_unload_timeout;
    h.navigator
        .tick(Instant::now() + timeout + Duration::from_secs(1));
    assert_eq!(
        h.navigator.navigation_request(h.root).map(|r| r.state()),
        Some(NavigationState::Started)
    );
    assert_eq!(h.started_loads(), 2);
}

#[test]
fn test_renderer_navigation_without_gesture_is_ignored() {
    let mut h = Harness::new(Config::default());
    h.load("https://a.test/");
    let browser_navigation = h.navigate("https://b.test/");

    let ignored = h
        .navigator
        .begin_renderer_navigation(h.root, NavigateParams::new(url("https://c.test/")))
        .unwrap();
    assert_eq!(ignored, None);
    assert_eq!(
        h.navigator.navigation_request(h.root).map(|r| r.navigation_id()),
        Some(browser_navigation)
    );

    let mut params = NavigateParams::new(url("https://c.test/"));
    params.has_user_gesture = true;
    let renderer_navigation = h
        .navigator
        .begin_renderer_navigation(h.root, params)
        .unwrap()
        .unwrap();
    let request = h.navigator.navigation_request(h.root).unwrap();
    assert_eq!(request.navigation_id(), renderer_navigation);
    assert!(!request.is_browser_initiated());
}

#[test]
fn test_renderer_navigation_stays_in_the_current_instance() {
    let mut h = Harness::new(Config::default());
    h.load("https://a.test/");
    let instance = h.current_instance(h.root);

    let navigation_id = h
        .navigator
        .begin_renderer_navigation(h.root, NavigateParams::new(url("https://b.test/")))
        .unwrap()
        .unwrap();
    assert!(h.node(h.root).render_manager().speculative().is_none());
    h.respond(navigation_id);
    assert_eq!(h.current_instance(h.root), instance);
    assert_eq!(h.committed_url(h.root).as_deref(), Some("https://b.test/"));
}

#[test]
fn test_vetoed_transfer_is_aborted() {
    let mut h = Harness::new(isolating("https://b.test"));
    h.load("https://a.test/");
    h.delegate.allow_transfer.set(false);

    let navigation_id = h
        .navigator
        .begin_renderer_navigation(h.root, NavigateParams::new(url("https://b.test/")))
        .unwrap()
        .unwrap();
    assert!(h.node(h.root).render_manager().speculative().is_some());
    h.respond(navigation_id);

    assert!(h.navigator.navigation_request(h.root).is_none());
    assert!(h.node(h.root).render_manager().speculative().is_none());
    assert_eq!(h.committed_url(h.root).as_deref(), Some("https://a.test/"));
    let finished = h.delegate.finished_for(navigation_id);
    assert!(!finished[0].has_committed);
    assert_eq!(finished[0].net_error, NetError::Aborted);
}

#[test]
fn test_renderer_redirect_into_privileged_scheme_is_aborted() {
    let mut h = Harness::new(Config::default());
    h.load("https://a.test/");
    let navigation_id = h
        .navigator
        .begin_renderer_navigation(h.root, NavigateParams::new(url("https://a.test/go")))
        .unwrap()
        .unwrap();
    h.redirect(navigation_id, "extension://abcdef/page.html");

    assert!(h.navigator.navigation_request(h.root).is_none());
    assert!(h.commands().contains(&LoaderCommand::Abandon(navigation_id)));
    assert_eq!(h.committed_url(h.root).as_deref(), Some("https://a.test/"));
    let finished = h.delegate.finished_for(navigation_id);
    assert_eq!(finished[0].net_error, NetError::Aborted);
}

#[test]
fn test_stop_aborts_the_navigations_of_a_page() {
    let mut h = Harness::new(Config::default());
    h.load("https://a.test/");
    let navigation_id = h.navigate("https://b.test/");
    assert!(h.navigator.frame_tree().is_page_loading(h.page));

    h.navigator.stop(h.page).unwrap();
    assert!(h.navigator.navigation_request(h.root).is_none());
    assert!(h.commands().contains(&LoaderCommand::Abandon(navigation_id)));
    assert!(!h.navigator.frame_tree().is_page_loading(h.page));
    assert_eq!(h.committed_url(h.root).as_deref(), Some("https://a.test/"));
}

#[test]
fn test_view_source_is_stripped_and_flagged() {
    let mut h = Harness::new(Config::default());
    let navigation_id = h.navigate("view-source:https://a.test/");
    assert_eq!(
        h.loader.borrow().started,
        vec![(navigation_id, url("https://a.test/"))]
    );
    assert!(h
        .navigator
        .navigation_request(h.root)
        .unwrap()
        .request_params()
        .is_view_source);

    h.respond(navigation_id);
    assert_eq!(
        h.node(h.root).render_manager().current_is_view_source(),
        Some(true)
    );
}

#[test]
fn test_service_worker_provider_reaches_the_commit() {
    let mut h = Harness::with_navigator(Config::default(), |navigator| {
        navigator.with_service_worker_context(Box::new(ScopedServiceWorkerContext::new(vec![
            url("https://a.test/app/"),
        ])))
    });

    let navigation_id = h.navigate("https://a.test/app/index.html");
    let provider_id = h
        .navigator
        .navigation_request(h.root)
        .and_then(|request| request.navigation_handle())
        .and_then(|handle| handle.service_worker_handle())
        .and_then(|handle| handle.provider_id());
    assert!(provider_id.is_some());

    h.respond(navigation_id);
    let committed = h
        .current_host(h.root)
        .last_commit_params()
        .and_then(|params| params.request_params.service_worker_provider_id);
    assert_eq!(committed, provider_id);

    let mut params = NavigateParams::new(url("https://a.test/app/other.html"));
    params.skip_service_worker = true;
    h.navigator.navigate(h.root, params).unwrap();
    assert!(h
        .navigator
        .navigation_request(h.root)
        .and_then(|request| request.navigation_handle())
        .unwrap()
        .service_worker_handle()
        .is_none());
}

#[test]
fn test_isolated_subframe_gets_its_own_instance() {
    let config = Config {
        site_per_process: true,
        ..Config::default()
    };
    let mut h = Harness::new(config);
    h.load("https://a.test/");
    let parent_instance = h.current_instance(h.root);
    let child = h
        .navigator
        .add_child_frame(h.root, "child", SandboxFlags::empty())
        .unwrap();
    assert_eq!(h.current_instance(child), parent_instance);

    let navigation_id = h.navigate_frame(child, "https://b.test/");
    h.respond(navigation_id);

    let child_instance = h.current_instance(child);
    assert_ne!(child_instance, parent_instance);
    assert_eq!(h.site_of(child_instance).as_deref(), Some("https://b.test"));
    // Each side can address the other through a proxy.
    assert!(h.node(h.root).render_manager().proxy(child_instance).is_some());
    assert!(h.node(child).render_manager().proxy(parent_instance).is_some());
    assert!(h.node(child).render_manager().proxy(child_instance).is_none());
}

#[test]
fn test_same_site_subframe_shares_the_parent_instance() {
    let mut h = Harness::new(Config::default());
    h.load("https://a.test/");
    let child = h
        .navigator
        .add_child_frame(h.root, "", SandboxFlags::empty())
        .unwrap();

    let navigation_id = h.navigate_frame(child, "https://a.test/frame.html");
    h.respond(navigation_id);
    assert_eq!(h.current_instance(child), h.current_instance(h.root));
    assert_eq!(
        h.committed_url(child).as_deref(),
        Some("https://a.test/frame.html")
    );
}

#[test]
fn test_subframe_leaving_an_isolated_site_does_not_return_to_its_parent() {
    let mut h = Harness::new(isolating("https://b.test"));
    h.load("https://a.test/");
    let parent_instance = h.current_instance(h.root);
    let child = h
        .navigator
        .add_child_frame(h.root, "", SandboxFlags::empty())
        .unwrap();

    let navigation_id = h.navigate_frame(child, "https://b.test/");
    h.respond(navigation_id);
    let isolated_instance = h.current_instance(child);
    assert_ne!(isolated_instance, parent_instance);

    let navigation_id = h.navigate_frame(child, "https://c.test/");
    h.respond(navigation_id);
    let child_instance = h.current_instance(child);
    assert_ne!(child_instance, parent_instance);
    assert_ne!(child_instance, isolated_instance);
    assert_eq!(h.site_of(child_instance).as_deref(), Some("https://c.test"));
    assert!(h
        .navigator
        .frame_tree()
        .site_instances()
        .is_related(child_instance, parent_instance));
    assert_eq!(h.committed_url(child).as_deref(), Some("https://c.test/"));
}
