//! Execution contexts ("site instances") and their relatedness groups
//! ("browsing instances").

use std::collections::HashMap;

use url::Url;

use crate::id::{BrowserContextId, BrowsingInstanceId, SiteInstanceId};
use crate::site::{ProcessPrivilege, Site, SiteIsolationPolicy};

/// An isolated execution context, committed to at most one site.
#[derive(Debug)]
pub struct SiteInstance {
    id: SiteInstanceId,
    browsing_instance: BrowsingInstanceId,
    browser_context: BrowserContextId,
    site: Option<Site>,
    requires_dedicated_process: bool,
    privilege: ProcessPrivilege,
    is_default_subframe: bool,
    ref_count: usize,
    active_frame_count: usize,
}

impl SiteInstance {
    pub fn id(&self) -> SiteInstanceId {
        self.id
    }

    /// The relatedness group this instance belongs to.
    pub fn browsing_instance(&self) -> BrowsingInstanceId {
        self.browsing_instance
    }

    pub fn browser_context(&self) -> BrowserContextId {
        self.browser_context
    }

    /// The committed site, `None` while the instance is still unused.
    pub fn site(&self) -> Option<&Site> {
        self.site.as_ref()
    }

    pub fn has_site(&self) -> bool {
        self.site.is_some()
    }

    /// Whether the site scheme of this instance is `scheme`.
    pub fn site_scheme_is(&self, scheme: &str) -> bool {
        self.site.as_ref().is_some_and(|site| site.scheme() == scheme)
    }

    pub fn requires_dedicated_process(&self) -> bool {
        self.requires_dedicated_process
    }

    pub fn privilege(&self) -> ProcessPrivilege {
        self.privilege
    }

    /// Whether this is the shared context of cross-site subframes.
    pub fn is_default_subframe(&self) -> bool {
        self.is_default_subframe
    }

    /// Number of frame hosts and proxies holding this instance.
    pub fn ref_count(&self) -> usize {
        self.ref_count
    }

    /// Number of frames actively rendering in this instance.
    pub fn active_frame_count(&self) -> usize {
        self.active_frame_count
    }
}

/// A group of site instances that may script each other.
#[derive(Debug)]
pub struct BrowsingInstance {
    id: BrowsingInstanceId,
    browser_context: BrowserContextId,
    site_instance_map: HashMap<Site, SiteInstanceId>,
    default_subframe_site_instance: Option<SiteInstanceId>,
    active_contents_count: usize,
    instance_count: usize,
}

impl BrowsingInstance {
    pub fn id(&self) -> BrowsingInstanceId {
        self.id
    }

    pub fn browser_context(&self) -> BrowserContextId {
        self.browser_context
    }

    /// Number of pages whose main frame lives in this group.
    pub fn active_contents_count(&self) -> usize {
        self.active_contents_count
    }

    /// The instance registered for `site` in this group.
    pub fn site_instance_for_site(&self, site: &Site) -> Option<SiteInstanceId> {
        self.site_instance_map.get(site).copied()
    }
}

/// Owns every site instance and browsing instance.
#[derive(Debug)]
pub struct SiteInstanceRegistry {
    policy: SiteIsolationPolicy,
    instances: HashMap<SiteInstanceId, SiteInstance>,
    browsing_instances: HashMap<BrowsingInstanceId, BrowsingInstance>,
}

impl SiteInstanceRegistry {
    pub fn new(policy: SiteIsolationPolicy) -> Self {
        Self {
            policy,
            instances: HashMap::new(),
            browsing_instances: HashMap::new(),
        }
    }

    pub fn policy(&self) -> &SiteIsolationPolicy {
        &self.policy
    }

    /// Get a site instance by id.
    pub fn get(&self, id: SiteInstanceId) -> Option<&SiteInstance> {
        self.instances.get(&id)
    }

    /// Get a site instance that is known to be alive.
    pub fn instance(&self, id: SiteInstanceId) -> &SiteInstance {
        &self.instances[&id]
    }

    /// Get a browsing instance by id.
    pub fn browsing_instance(&self, id: BrowsingInstanceId) -> Option<&BrowsingInstance> {
        self.browsing_instances.get(&id)
    }

    /// Number of live site instances.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Create an unused instance in a brand new browsing instance.
    pub fn create_for_new_browsing_instance(
        &mut self,
        browser_context: BrowserContextId,
    ) -> SiteInstanceId {
        let browsing_instance = self.new_browsing_instance(browser_context);
        self.new_instance(browsing_instance, browser_context)
    }

    /// Create an instance for `url` in a brand new browsing instance.
    pub fn create_for_url(
        &mut self,
        browser_context: BrowserContextId,
        url: &Url,
    ) -> SiteInstanceId {
        let browsing_instance = self.new_browsing_instance(browser_context);
        self.site_instance_for_url_in(browsing_instance, url)
    }

    /// The instance for the site of `url` in the group of `id`, reused if
    /// the group already has one.
    pub fn get_related_site_instance(&mut self, id: SiteInstanceId, url: &Url) -> SiteInstanceId {
        match self.instances.get(&id) {
            Some(instance) => {
                let browsing_instance = instance.browsing_instance;
                self.site_instance_for_url_in(browsing_instance, url)
            }
            None => {
                log::warn!("SiteInstance: related instance requested for unknown {id}");
                let browsing_instance = self.new_browsing_instance(BrowserContextId::new());
                self.site_instance_for_url_in(browsing_instance, url)
            }
        }
    }

    /// Whether the group of `id` already has an instance for the site of `url`.
    pub fn has_related_site_instance(&self, id: SiteInstanceId, url: &Url) -> bool {
        self.instances
            .get(&id)
            .and_then(|instance| self.browsing_instances.get(&instance.browsing_instance))
            .is_some_and(|bi| bi.site_instance_for_site(&Site::for_url(url)).is_some())
    }

    /// The shared default subframe instance of the group of `id`.
    pub fn get_default_subframe_site_instance(&mut self, id: SiteInstanceId) -> SiteInstanceId {
        let Some(instance) = self.instances.get(&id) else {
            log::warn!("SiteInstance: default subframe instance requested for unknown {id}");
            return id;
        };
        let browsing_instance = instance.browsing_instance;
        let browser_context = instance.browser_context;
        if let Some(existing) = self
            .browsing_instances
            .get(&browsing_instance)
            .and_then(|bi| bi.default_subframe_site_instance)
        {
            return existing;
        }

        let default_subframe = self.new_instance(browsing_instance, browser_context);
        if let Some(instance) = self.instances.get_mut(&default_subframe) {
            instance.is_default_subframe = true;
            instance.site = Some(Site::default_subframe());
        }
        if let Some(bi) = self.browsing_instances.get_mut(&browsing_instance) {
            bi.default_subframe_site_instance = Some(default_subframe);
        }
        log::debug!("SiteInstance: created default subframe instance {default_subframe}");
        default_subframe
    }

    /// Whether two instances belong to the same browsing instance.
    pub fn is_related(&self, a: SiteInstanceId, b: SiteInstanceId) -> bool {
        match (self.instances.get(&a), self.instances.get(&b)) {
            (Some(a), Some(b)) => a.browsing_instance == b.browsing_instance,
            _ => false,
        }
    }

    /// Commit `id` to the site of `url`. A site can only be set once.
    pub fn set_site(&mut self, id: SiteInstanceId, url: &Url) {
        let site = Site::for_url(url);
        let requires_dedicated_process = self.policy.does_site_require_dedicated_process(url);
        let privilege = self.policy.privilege_for_url(url);
        let Some(instance) = self.instances.get_mut(&id) else {
            log::warn!("SiteInstance: set_site on unknown instance {id}");
            return;
        };
        assert!(
            instance.site.is_none(),
            "site of {id} is already set to {:?}",
            instance.site
        );
        log::debug!("SiteInstance: {id} committed to site {site}");
        instance.site = Some(site.clone());
        instance.requires_dedicated_process = requires_dedicated_process;
        instance.privilege = privilege;
        let browsing_instance = instance.browsing_instance;
        if let Some(bi) = self.browsing_instances.get_mut(&browsing_instance) {
            bi.site_instance_map.entry(site).or_insert(id);
        }
    }

    /// Whether the process bound to `id` cannot render `url`.
    pub fn has_wrong_process_for_url(&self, id: SiteInstanceId, url: &Url) -> bool {
        let Some(instance) = self.instances.get(&id) else {
            return false;
        };
        // An instance without a site and without frames has not picked a
        // process yet.
        if !instance.has_site() && instance.active_frame_count == 0 {
            return false;
        }
        if instance.privilege != self.policy.privilege_for_url(url) {
            return true;
        }
        match &instance.site {
            Some(site) if instance.requires_dedicated_process && !instance.is_default_subframe => {
                !site.matches_url(url)
            }
            _ => false,
        }
    }

    /// Whether some instance of `browser_context` already renders the site
    /// of `url`.
    pub fn has_process_for_site(&self, browser_context: BrowserContextId, url: &Url) -> bool {
        let site = Site::for_url(url);
        self.instances.values().any(|instance| {
            instance.browser_context == browser_context
                && instance.active_frame_count > 0
                && instance.site.as_ref() == Some(&site)
        })
    }

    pub fn add_ref(&mut self, id: SiteInstanceId) {
        if let Some(instance) = self.instances.get_mut(&id) {
            instance.ref_count += 1;
        }
    }

    /// Drop a reference; the instance is destroyed with its last reference.
    pub fn release(&mut self, id: SiteInstanceId) {
        let Some(instance) = self.instances.get_mut(&id) else {
            log::warn!("SiteInstance: release of unknown instance {id}");
            return;
        };
        instance.ref_count = instance.ref_count.saturating_sub(1);
        if instance.ref_count == 0 {
            self.destroy(id);
        }
    }

    pub fn increment_active_frame_count(&mut self, id: SiteInstanceId) {
        if let Some(instance) = self.instances.get_mut(&id) {
            instance.active_frame_count += 1;
        }
    }

    /// Returns the remaining count.
    pub fn decrement_active_frame_count(&mut self, id: SiteInstanceId) -> usize {
        match self.instances.get_mut(&id) {
            Some(instance) => {
                instance.active_frame_count = instance.active_frame_count.saturating_sub(1);
                instance.active_frame_count
            }
            None => 0,
        }
    }

    pub fn increment_active_contents_count(&mut self, id: SiteInstanceId) {
        let Some(instance) = self.instances.get(&id) else {
            return;
        };
        if let Some(bi) = self.browsing_instances.get_mut(&instance.browsing_instance) {
            bi.active_contents_count += 1;
        }
    }

    pub fn decrement_active_contents_count(&mut self, id: SiteInstanceId) {
        let Some(instance) = self.instances.get(&id) else {
            return;
        };
        if let Some(bi) = self.browsing_instances.get_mut(&instance.browsing_instance) {
            bi.active_contents_count = bi.active_contents_count.saturating_sub(1);
        }
    }

    fn new_browsing_instance(&mut self, browser_context: BrowserContextId) -> BrowsingInstanceId {
        let id = BrowsingInstanceId::new();
        self.browsing_instances.insert(
            id,
            BrowsingInstance {
                id,
                browser_context,
                site_instance_map: HashMap::new(),
                default_subframe_site_instance: None,
                active_contents_count: 0,
                instance_count: 0,
            },
        );
        id
    }

    fn new_instance(
        &mut self,
        browsing_instance: BrowsingInstanceId,
        browser_context: BrowserContextId,
    ) -> SiteInstanceId {
        let id = SiteInstanceId::new();
        self.instances.insert(
            id,
            SiteInstance {
                id,
                browsing_instance,
                browser_context,
                site: None,
                requires_dedicated_process: false,
                privilege: ProcessPrivilege::Normal,
                is_default_subframe: false,
                ref_count: 0,
                active_frame_count: 0,
            },
        );
        if let Some(bi) = self.browsing_instances.get_mut(&browsing_instance) {
            bi.instance_count += 1;
        }
        log::trace!("SiteInstance: created {id} in {browsing_instance}");
        id
    }

    fn site_instance_for_url_in(
        &mut self,
        browsing_instance: BrowsingInstanceId,
        url: &Url,
    ) -> SiteInstanceId {
        let site = Site::for_url(url);
        let (existing, browser_context) = match self.browsing_instances.get(&browsing_instance) {
            Some(bi) => (bi.site_instance_for_site(&site), bi.browser_context),
            None => (None, BrowserContextId::new()),
        };
        if let Some(existing) = existing {
            return existing;
        }
        let id = self.new_instance(browsing_instance, browser_context);
        self.set_site(id, url);
        id
    }

    fn destroy(&mut self, id: SiteInstanceId) {
        let Some(instance) = self.instances.remove(&id) else {
            return;
        };
        log::trace!("SiteInstance: destroyed {id}");
        let browsing_instance = instance.browsing_instance;
        let mut now_empty = false;
        if let Some(bi) = self.browsing_instances.get_mut(&browsing_instance) {
            if let Some(site) = &instance.site {
                if bi.site_instance_map.get(site) == Some(&id) {
                    bi.site_instance_map.remove(site);
                }
            }
            if bi.default_subframe_site_instance == Some(id) {
                bi.default_subframe_site_instance = None;
            }
            bi.instance_count = bi.instance_count.saturating_sub(1);
            now_empty = bi.instance_count == 0;
        }
        if now_empty {
            self.browsing_instances.remove(&browsing_instance);
        }
    }
}
