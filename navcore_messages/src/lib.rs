//! Message and parameter types shared between the navigation core and the
//! collaborators it talks to (renderers, the network loader, the controller).
//!
//! Nothing in here depends on the core itself, so a loader or a controller
//! living in another process only has to pull in this crate.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Identifies one navigation from the moment it is created until it is
/// committed or abandoned. Never reused within a process.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct NavigationId(pub u64);

impl fmt::Display for NavigationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Navigation#{}", self.0)
    }
}

/// The core type of a page transition, i.e. what the user did to start it.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum PageTransitionType {
    /// The user followed a link.
    #[default]
    Link,
    /// The user typed the URL in the location bar.
    Typed,
    /// The user picked a bookmark or a suggestion that is not a search.
    AutoBookmark,
    /// A subframe navigation the user did not explicitly ask for.
    AutoSubframe,
    /// A subframe navigation the user explicitly requested.
    ManualSubframe,
    /// The URL was generated, typically by a search engine from the location bar.
    Generated,
    /// A top-level navigation not caused by the user (e.g. opened by the embedder).
    AutoToplevel,
    /// The user submitted a form.
    FormSubmit,
    /// The user reloaded the page.
    Reload,
    /// A keyword search.
    Keyword,
}

bitflags! {
    /// Qualifiers that can be combined with a [`PageTransitionType`].
    #[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
    pub struct PageTransitionQualifiers: u32 {
        /// The user used the back or forward buttons.
        const FORWARD_BACK = 1 << 0;
        /// The navigation was initiated from the address bar.
        const FROM_ADDRESS_BAR = 1 << 1;
        /// The navigation started at the home page.
        const HOME_PAGE = 1 << 2;
        /// The transition originated from an external application.
        const FROM_API = 1 << 3;
        /// The navigation is the beginning of a redirect chain.
        const CHAIN_START = 1 << 4;
        /// The navigation is the last step of a redirect chain.
        const CHAIN_END = 1 << 5;
        /// The navigation was caused by script or a meta refresh.
        const CLIENT_REDIRECT = 1 << 6;
        /// The navigation was caused by a server-side redirect.
        const SERVER_REDIRECT = 1 << 7;
    }
}

/// How a navigation was started: a core type plus qualifiers.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PageTransition {
    /// The core type.
    pub core: PageTransitionType,
    /// The qualifiers.
    pub qualifiers: PageTransitionQualifiers,
}

impl PageTransition {
    /// Create a transition without qualifiers.
    pub fn new(core: PageTransitionType) -> Self {
        Self {
            core,
            qualifiers: PageTransitionQualifiers::empty(),
        }
    }

    /// Add qualifiers to this transition.
    pub fn with_qualifiers(mut self, qualifiers: PageTransitionQualifiers) -> Self {
        self.qualifiers |= qualifiers;
        self
    }

    /// Whether the core type of this transition is `core`, ignoring qualifiers.
    pub fn core_type_is(&self, core: PageTransitionType) -> bool {
        self.core == core
    }

    /// Whether this is a session history traversal.
    pub fn is_forward_back(&self) -> bool {
        self.qualifiers.contains(PageTransitionQualifiers::FORWARD_BACK)
    }
}

/// Referrer policy applied to a [`Referrer`].
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum ReferrerPolicy {
    Always,
    #[default]
    NoReferrerWhenDowngrade,
    Never,
    Origin,
    OriginWhenCrossOrigin,
    StrictOriginWhenCrossOrigin,
}

/// The referrer sent with a navigation request.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Referrer {
    /// The referring URL, `None` if no referrer should be sent.
    pub url: Option<url::Url>,
    /// The policy used to compute the outgoing header.
    pub policy: ReferrerPolicy,
}

impl Referrer {
    /// Create a referrer for `url` with the default policy.
    pub fn new(url: url::Url) -> Self {
        Self {
            url: Some(url),
            policy: ReferrerPolicy::default(),
        }
    }
}

/// What kind of navigation the renderer is asked to perform.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum NavigationType {
    #[default]
    Different,
    Reload,
    ReloadBypassingCache,
    Restore,
    HistoryDifferentDocument,
    SameDocument,
    HistorySameDocument,
}

impl NavigationType {
    /// Whether the navigation stays in the current document.
    pub fn is_same_document(&self) -> bool {
        matches!(self, Self::SameDocument | Self::HistorySameDocument)
    }
}

/// Whether the navigation restores an entry from a previous session.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum RestoreType {
    #[default]
    None,
    LastSessionExitedCleanly,
    LastSessionCrashed,
    CurrentSession,
}

bitflags! {
    /// Cache behavior requested for the navigation's network request.
    #[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
    pub struct LoadFlags: u32 {
        const VALIDATE_CACHE = 1 << 0;
        const BYPASS_CACHE = 1 << 1;
        const SKIP_CACHE_VALIDATION = 1 << 2;
        const ONLY_FROM_CACHE = 1 << 3;
        const DISABLE_CACHE = 1 << 4;
        const DO_NOT_SEND_COOKIES = 1 << 5;
    }
}

/// The context a navigation request is made from.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum RequestContextType {
    #[default]
    Location,
    Form,
    Hyperlink,
    Iframe,
    Frame,
    Internal,
}

/// Navigation parameters known to both the browser and the renderer.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct CommonNavigationParams {
    /// The URL to navigate to, updated on every redirect.
    pub url: url::Url,
    /// The referrer, updated on every redirect.
    pub referrer: Referrer,
    /// How the navigation was started.
    pub transition: PageTransition,
    /// The kind of navigation.
    pub navigation_type: NavigationType,
    /// The HTTP method, updated on every redirect.
    #[serde(with = "http_serde_ext::method")]
    pub method: http::Method,
    /// Whether the new document replaces the current session history entry.
    pub should_replace_current_entry: bool,
    /// The upload body for POST navigations.
    pub post_data: Option<Vec<u8>>,
}

impl CommonNavigationParams {
    /// Parameters for a plain GET navigation to `url`.
    pub fn new(url: url::Url) -> Self {
        Self {
            url,
            referrer: Referrer::default(),
            transition: PageTransition::default(),
            navigation_type: NavigationType::default(),
            method: http::Method::GET,
            should_replace_current_entry: false,
            post_data: None,
        }
    }
}

/// Parameters sent by the renderer (or synthesized by the browser) when a
/// navigation begins.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct BeginNavigationParams {
    /// Extra request headers.
    #[serde(with = "http_serde_ext::header_map")]
    pub headers: http::HeaderMap,
    /// Cache behavior.
    pub load_flags: LoadFlags,
    /// Whether the navigation was triggered by a user gesture.
    pub has_user_gesture: bool,
    /// Whether service workers must be bypassed.
    pub skip_service_worker: bool,
    /// Where the request comes from.
    pub request_context_type: RequestContextType,
}

/// Browser-side bookkeeping sent to the renderer with the commit.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct RequestNavigationParams {
    /// Every URL the navigation went through before the final one.
    pub redirects: Vec<url::Url>,
    /// Id of the pending session history entry, 0 if none.
    pub nav_entry_id: i32,
    /// Whether the navigation shows the source of the page.
    pub is_view_source: bool,
    /// Whether the frame had already committed a non-blank document.
    pub has_committed_real_load: bool,
    /// Whether the navigation should create a new session history entry.
    pub intended_as_new_entry: bool,
    /// The service worker provider id resolved for this navigation.
    pub service_worker_provider_id: Option<i64>,
}

/// Protocol used by the connection that produced a response.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum ConnectionInfo {
    #[default]
    Unknown,
    Http1,
    Http2,
    Quic,
}

/// The head of a response delivered by the loader.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ResponseHead {
    /// HTTP status.
    #[serde(with = "http_serde_ext::status_code")]
    pub status: http::StatusCode,
    /// Response headers.
    #[serde(with = "http_serde_ext::header_map")]
    pub headers: http::HeaderMap,
    /// MIME type sniffed or declared for the body.
    pub mime_type: Option<String>,
    /// Connection metadata.
    pub connection_info: ConnectionInfo,
    /// Whether the response came from the cache.
    pub was_fetched_via_cache: bool,
}

impl ResponseHead {
    /// A response head with the given status and no headers.
    pub fn new(status: http::StatusCode) -> Self {
        Self {
            status,
            headers: http::HeaderMap::new(),
            mime_type: None,
            connection_info: ConnectionInfo::default(),
            was_fetched_via_cache: false,
        }
    }

    /// A `200 OK` response head.
    pub fn ok() -> Self {
        Self::new(http::StatusCode::OK)
    }

    /// Whether this response must not produce a new document (`204`/`205`).
    pub fn is_no_content(&self) -> bool {
        self.status == http::StatusCode::NO_CONTENT || self.status == http::StatusCode::RESET_CONTENT
    }
}

/// Describes one redirect hop.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RedirectInfo {
    /// Status of the redirect response.
    #[serde(with = "http_serde_ext::status_code")]
    pub status_code: http::StatusCode,
    /// Method to use for the next hop.
    #[serde(with = "http_serde_ext::method")]
    pub new_method: http::Method,
    /// URL of the next hop.
    pub new_url: url::Url,
    /// Referrer for the next hop.
    pub new_referrer: Option<url::Url>,
}

impl RedirectInfo {
    /// A `302 Found` redirect to `new_url` that keeps using GET.
    pub fn found(new_url: url::Url) -> Self {
        Self {
            status_code: http::StatusCode::FOUND,
            new_method: http::Method::GET,
            new_url,
            new_referrer: None,
        }
    }
}

/// Handle to the body stream of a response, owned by the network layer.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct StreamHandle(pub uuid::Uuid);

impl StreamHandle {
    /// Create a handle for a new stream.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for StreamHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Opaque data the embedder attached to the navigation in the network layer.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct NavigationData(pub Vec<u8>);

/// Network error codes surfaced by the loader and throttles.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[repr(i32)]
pub enum NetError {
    #[default]
    Ok = 0,
    IoPending = -1,
    Failed = -2,
    Aborted = -3,
    InvalidArgument = -4,
    FileNotFound = -6,
    TimedOut = -7,
    AccessDenied = -10,
    BlockedByClient = -20,
    BlockedByAdministrator = -22,
    BlockedByResponse = -27,
    ConnectionClosed = -100,
    ConnectionReset = -101,
    ConnectionRefused = -102,
    ConnectionFailed = -104,
    NameNotResolved = -105,
    InternetDisconnected = -106,
    SslProtocolError = -107,
    CertCommonNameInvalid = -200,
    InvalidUrl = -300,
    DisallowedUrlScheme = -301,
    UnknownUrlScheme = -302,
    TooManyRedirects = -310,
    UnsafeRedirect = -311,
    InvalidResponse = -320,
    EmptyResponse = -324,
}

impl NetError {
    /// The numeric error code.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Whether this code signals an error at all.
    pub fn is_error(self) -> bool {
        self != NetError::Ok
    }

    /// The symbolic name of this error, e.g. `net::ERR_ABORTED`.
    pub fn name(self) -> &'static str {
        match self {
            NetError::Ok => "net::OK",
            NetError::IoPending => "net::ERR_IO_PENDING",
            NetError::Failed => "net::ERR_FAILED",
            NetError::Aborted => "net::ERR_ABORTED",
            NetError::InvalidArgument => "net::ERR_INVALID_ARGUMENT",
            NetError::FileNotFound => "net::ERR_FILE_NOT_FOUND",
            NetError::TimedOut => "net::ERR_TIMED_OUT",
            NetError::AccessDenied => "net::ERR_ACCESS_DENIED",
            NetError::BlockedByClient => "net::ERR_BLOCKED_BY_CLIENT",
            NetError::BlockedByAdministrator => "net::ERR_BLOCKED_BY_ADMINISTRATOR",
            NetError::BlockedByResponse => "net::ERR_BLOCKED_BY_RESPONSE",
            NetError::ConnectionClosed => "net::ERR_CONNECTION_CLOSED",
            NetError::ConnectionReset => "net::ERR_CONNECTION_RESET",
            NetError::ConnectionRefused => "net::ERR_CONNECTION_REFUSED",
            NetError::ConnectionFailed => "net::ERR_CONNECTION_FAILED",
            NetError::NameNotResolved => "net::ERR_NAME_NOT_RESOLVED",
            NetError::InternetDisconnected => "net::ERR_INTERNET_DISCONNECTED",
            NetError::SslProtocolError => "net::ERR_SSL_PROTOCOL_ERROR",
            NetError::CertCommonNameInvalid => "net::ERR_CERT_COMMON_NAME_INVALID",
            NetError::InvalidUrl => "net::ERR_INVALID_URL",
            NetError::DisallowedUrlScheme => "net::ERR_DISALLOWED_URL_SCHEME",
            NetError::UnknownUrlScheme => "net::ERR_UNKNOWN_URL_SCHEME",
            NetError::TooManyRedirects => "net::ERR_TOO_MANY_REDIRECTS",
            NetError::UnsafeRedirect => "net::ERR_UNSAFE_REDIRECT",
            NetError::InvalidResponse => "net::ERR_INVALID_RESPONSE",
            NetError::EmptyResponse => "net::ERR_EMPTY_RESPONSE",
        }
    }
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

/// Everything the loader needs to start the network request of a navigation.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct NavigationRequestInfo {
    /// The navigation this request belongs to.
    pub navigation_id: NavigationId,
    /// Common parameters at the time the request starts.
    pub common_params: CommonNavigationParams,
    /// Begin parameters.
    pub begin_params: BeginNavigationParams,
    /// Whether the navigated frame is a main frame.
    pub is_main_frame: bool,
    /// Whether the parent of the navigated frame is a main frame.
    pub parent_is_main_frame: bool,
    /// Frame tree node id of the navigated frame.
    pub frame_tree_node_id: u32,
}

/// Commands sent from the core to a loader.
#[derive(Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub enum ToLoaderMessage {
    /// Start the network request described by the info.
    Start(Box<NavigationRequestInfo>),
    /// Follow the redirect that was last reported.
    FollowRedirect(NavigationId),
    /// Start delivering the body of the response that was reported.
    ProceedWithResponse(NavigationId),
    /// Forget about the request; no further events are expected.
    Abandon(NavigationId),
}

/// Events sent from a loader back to the core.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum FromLoaderMessage {
    /// The request was redirected. Sent zero or more times.
    Redirected {
        redirect_info: RedirectInfo,
        response: ResponseHead,
    },
    /// The final response started. Terminal.
    ResponseStarted {
        response: ResponseHead,
        body: StreamHandle,
        navigation_data: Option<NavigationData>,
    },
    /// The request failed. Terminal.
    Failed {
        has_stale_copy_in_cache: bool,
        net_error: NetError,
    },
}

impl FromLoaderMessage {
    /// Whether no further events follow this one.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FromLoaderMessage::Redirected { .. })
    }
}

/// A loader event addressed to a navigation.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct LoaderEvent {
    /// The navigation the event is for.
    pub navigation_id: NavigationId,
    /// The event itself.
    pub message: FromLoaderMessage,
}

impl LoaderEvent {
    /// A redirect event.
    pub fn redirected(navigation_id: NavigationId, redirect_info: RedirectInfo) -> Self {
        let response = ResponseHead::new(redirect_info.status_code);
        Self {
            navigation_id,
            message: FromLoaderMessage::Redirected {
                redirect_info,
                response,
            },
        }
    }

    /// A response-started event with a fresh body stream.
    pub fn response_started(navigation_id: NavigationId, response: ResponseHead) -> Self {
        Self {
            navigation_id,
            message: FromLoaderMessage::ResponseStarted {
                response,
                body: StreamHandle::new(),
                navigation_data: None,
            },
        }
    }

    /// A failure event.
    pub fn failed(navigation_id: NavigationId, net_error: NetError) -> Self {
        Self {
            navigation_id,
            message: FromLoaderMessage::Failed {
                has_stale_copy_in_cache: false,
                net_error,
            },
        }
    }
}

/// The process model used to map site instances to processes.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum ProcessModel {
    /// One process per site instance.
    #[default]
    ProcessPerSiteInstance,
    /// One process per site, shared across pages.
    ProcessPerSite,
    /// One process per page.
    ProcessPerTab,
    /// Everything in a single process.
    SingleProcess,
}

/// Configuration supplied by a controller, typically as JSON.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct ConfigFromController {
    /// Process model. Defaults to one process per site instance.
    pub process_model: Option<ProcessModel>,
    /// Isolate every site in its own site instance, subframes included.
    pub site_per_process: bool,
    /// Keep cross-site subframes out of the main frame's site instance.
    pub top_document_isolation: bool,
    /// Origins that always get a dedicated site instance.
    pub isolated_origins: Vec<url::Url>,
    /// Schemes served by privileged WebUI pages.
    pub webui_schemes: Option<Vec<String>>,
    /// Schemes that need a specially privileged process (extension-like).
    pub privileged_schemes: Option<Vec<String>>,
    /// How long to wait for a before-unload acknowledgment.
    pub before_unload_timeout_ms: Option<u64>,
    /// URLs the demo navigates through.
    pub initial_urls: Vec<url::Url>,
}
