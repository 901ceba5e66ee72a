//! Site computation and the isolation policy built on top of it.

use std::fmt;

use url::{Host, Origin, Url};

use crate::config::{Config, ProcessModel};

/// Scheme used by guest (embedded webview) content.
pub const GUEST_SCHEME: &str = "guest";
/// Scheme used by developer tools front-ends.
pub const DEVTOOLS_SCHEME: &str = "devtools";
/// Scheme prefix that asks for the source of a page.
pub const VIEW_SOURCE_SCHEME: &str = "view-source";
pub const ABOUT_SCHEME: &str = "about";
pub const DATA_SCHEME: &str = "data";
pub const JAVASCRIPT_SCHEME: &str = "javascript";

/// Renderer debug pages that are handled without a navigation.
const RENDERER_DEBUG_PAGES: [&str; 3] = ["crash", "kill", "hang"];

/// The site of a URL: its scheme plus registrable domain.
///
/// Two URLs with the same site may script each other and therefore have to
/// share an execution context.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Site {
    scheme: String,
    domain: Option<String>,
}

impl Site {
    /// Compute the site of `url`.
    pub fn for_url(url: &Url) -> Self {
        Self {
            scheme: url.scheme().to_string(),
            domain: url.host().map(registrable_domain),
        }
    }

    /// Compute the site of a tuple origin. Opaque origins have no site.
    pub fn for_origin(origin: &Origin) -> Option<Self> {
        match origin {
            Origin::Opaque(_) => None,
            Origin::Tuple(scheme, host, _) => Some(Self {
                scheme: scheme.clone(),
                domain: Some(registrable_domain(host.clone())),
            }),
        }
    }

    /// The placeholder site of the shared default subframe context.
    pub fn default_subframe() -> Self {
        Self {
            scheme: "http".to_string(),
            domain: Some("web-iframe".to_string()),
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The registrable domain, `None` for host-less schemes.
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// Whether `url` belongs to this site.
    pub fn matches_url(&self, url: &Url) -> bool {
        if is_about_blank(url) || url.scheme() == JAVASCRIPT_SCHEME {
            return true;
        }
        *self == Site::for_url(url)
    }

    /// A URL standing for this site, used where a site has to be fed back
    /// into URL based checks.
    pub fn to_url(&self) -> Option<Url> {
        match &self.domain {
            Some(domain) => Url::parse(&format!("{}://{}/", self.scheme, domain)).ok(),
            None => None,
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.domain {
            Some(domain) => write!(f, "{}://{}", self.scheme, domain),
            None => write!(f, "{}:", self.scheme),
        }
    }
}

fn registrable_domain<S: AsRef<str>>(host: Host<S>) -> String {
    match host {
        Host::Domain(domain) => {
            let labels: Vec<&str> = domain.as_ref().trim_end_matches('.').split('.').collect();
            if labels.len() <= 2 {
                labels.join(".")
            } else {
                labels[labels.len() - 2..].join(".")
            }
        }
        ip => ip.to_string(),
    }
}

/// Whether two URLs belong to the same web site.
///
/// `about:blank` and `javascript:` URLs are considered same-site with
/// anything since they inherit the site of whoever hosts them.
pub fn is_same_web_site(src: &Url, dest: &Url) -> bool {
    if is_about_blank(dest) || dest.scheme() == JAVASCRIPT_SCHEME {
        return true;
    }
    Site::for_url(src) == Site::for_url(dest)
}

/// Whether `url` is exactly `about:blank` (ignoring query and fragment).
pub fn is_about_blank(url: &Url) -> bool {
    url.scheme() == ABOUT_SCHEME && url.path() == "blank"
}

/// Whether `url` is handled in the renderer without a navigation.
pub fn is_renderer_debug_url(url: &Url) -> bool {
    url.scheme() == JAVASCRIPT_SCHEME
        || (url.scheme() == ABOUT_SCHEME && RENDERER_DEBUG_PAGES.contains(&url.path()))
}

/// Whether loading `url` goes through the network loader.
pub fn should_make_network_request_for_url(url: &Url) -> bool {
    !matches!(url.scheme(), ABOUT_SCHEME | DATA_SCHEME | JAVASCRIPT_SCHEME)
}

/// Whether a site may be recorded on an execution context after committing
/// `url`.
pub fn should_assign_site_for_url(url: &Url) -> bool {
    !is_about_blank(url)
}

/// Split a `view-source:` URL into its inner URL.
pub fn strip_view_source(url: &Url) -> Option<Url> {
    if url.scheme() != VIEW_SOURCE_SCHEME {
        return None;
    }
    Url::parse(url.path()).ok()
}

/// The privilege a process needs to render a URL.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ProcessPrivilege {
    #[default]
    Normal,
    /// Extension-like content.
    Privileged,
    /// Browser UI pages with bindings.
    WebUi,
}

/// Answers process model and isolation questions derived from [`Config`].
#[derive(Clone, Debug)]
pub struct SiteIsolationPolicy {
    process_model: ProcessModel,
    site_per_process: bool,
    top_document_isolation: bool,
    isolated_origins: Vec<Origin>,
    webui_schemes: Vec<String>,
    privileged_schemes: Vec<String>,
}

impl SiteIsolationPolicy {
    pub fn new(config: &Config) -> Self {
        Self {
            process_model: config.process_model,
            site_per_process: config.site_per_process,
            top_document_isolation: config.top_document_isolation,
            isolated_origins: config.isolated_origins.iter().map(Url::origin).collect(),
            webui_schemes: config.webui_schemes.clone(),
            privileged_schemes: config.privileged_schemes.clone(),
        }
    }

    /// The process model in effect.
    pub fn process_model(&self) -> ProcessModel {
        self.process_model
    }

    /// Whether frames of one page can end up in different contexts.
    pub fn are_cross_process_frames_possible(&self) -> bool {
        self.process_model != ProcessModel::SingleProcess
            && (self.site_per_process
                || self.top_document_isolation
                || !self.isolated_origins.is_empty())
    }

    /// Whether cross-site navigations move to another context at all.
    pub fn should_transition_cross_site(&self) -> bool {
        match self.process_model {
            ProcessModel::SingleProcess => false,
            ProcessModel::ProcessPerTab => self.are_cross_process_frames_possible(),
            ProcessModel::ProcessPerSiteInstance | ProcessModel::ProcessPerSite => true,
        }
    }

    /// Whether a single process is shared by every instance of a site.
    pub fn should_use_process_per_site(&self, url: &Url) -> bool {
        self.process_model == ProcessModel::ProcessPerSite || self.is_web_ui_url(url)
    }

    /// Whether the site of `url` must never share a context with other sites.
    pub fn does_site_require_dedicated_process(&self, url: &Url) -> bool {
        if self.process_model == ProcessModel::SingleProcess {
            return false;
        }
        if self.site_per_process && url.host().is_some() {
            return true;
        }
        if self.requires_privileged_process(url) {
            return true;
        }
        let origin = url.origin();
        self.isolated_origins.iter().any(|isolated| *isolated == origin)
    }

    /// Top-document isolation only applies when full site isolation is off.
    pub fn is_top_document_isolation_enabled(&self) -> bool {
        self.top_document_isolation && !self.site_per_process
    }

    /// Whether `url` is served by a WebUI page.
    pub fn is_web_ui_url(&self, url: &Url) -> bool {
        self.webui_schemes.iter().any(|scheme| scheme == url.scheme())
    }

    /// The WebUI type of `url`, `None` for regular content.
    pub fn web_ui_type_for_url<'u>(&self, url: &'u Url) -> Option<&'u str> {
        if self.is_web_ui_url(url) {
            Some(url.host_str().unwrap_or_default())
        } else {
            None
        }
    }

    /// Whether a process with WebUI bindings may load `url`.
    pub fn is_url_acceptable_for_web_ui(&self, url: &Url) -> bool {
        self.is_web_ui_url(url) || matches!(url.scheme(), ABOUT_SCHEME | JAVASCRIPT_SCHEME)
    }

    /// Whether `url` needs an extension-like privileged process.
    pub fn requires_privileged_process(&self, url: &Url) -> bool {
        self.privileged_schemes.iter().any(|scheme| scheme == url.scheme())
    }

    /// The process privilege `url` needs.
    pub fn privilege_for_url(&self, url: &Url) -> ProcessPrivilege {
        if self.is_web_ui_url(url) {
            ProcessPrivilege::WebUi
        } else if self.requires_privileged_process(url) {
            ProcessPrivilege::Privileged
        } else {
            ProcessPrivilege::Normal
        }
    }
}
