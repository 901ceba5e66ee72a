//! navcore is the browser side of navigation: it takes a request to load a
//! URL in a frame through the throttles and the network loader, decides which
//! site instance renders the result and swaps frame hosts when it commits.
//!
//! Most embedders only need the [`Navigator`], a [`NavigationDelegate`] and a
//! [`NavigationLoaderFactory`].

#![deny(unsafe_code)]

/// Configuration of the navigation core.
pub mod config;
/// Hooks the embedder implements.
pub mod delegate;
/// Error and result types.
pub mod errors;
/// Frame hosts and proxies.
pub mod frame_host;
/// The forest of frame trees.
pub mod frame_tree;
/// Frame tree nodes and their replicated state.
pub mod frame_tree_node;
/// Typed ids.
pub mod id;
/// The network loader seam.
pub mod loader;
/// The per-navigation handle.
pub mod navigation_handle;
/// The per-navigation request.
pub mod navigation_request;
/// Navigation throttles.
pub mod navigation_throttle;
/// Public entry points.
pub mod navigator;
/// Pages.
pub mod page;
/// Placement and the commit-time swap.
pub mod render_frame_host_manager;
/// Service worker handshake.
pub mod service_worker;
/// Sites and the isolation policy.
pub mod site;
/// Site and browsing instances.
pub mod site_instance;

pub use delegate::NavigationDelegate;
pub use errors::{Error, Result};
pub use loader::{ChannelLoaderFactory, NavigationLoader, NavigationLoaderFactory};
pub use navcore_messages as messages;
pub use navigation_handle::{HandleState, NavigationHandle};
pub use navigation_throttle::{NavigationThrottle, ThrottleCheckResult};
pub use navigator::{NavigateParams, Navigator};
