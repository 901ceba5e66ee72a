//! The seam between navigation requests and the network layer.
//!
//! A request asks its [`NavigationLoaderFactory`] for a loader once the
//! start checks passed. The loader reports back with
//! [`LoaderEvent`](navcore_messages::LoaderEvent)s delivered to the
//! [`Navigator`](crate::navigator::Navigator).

use crossbeam_channel::{Receiver, Sender};
use navcore_messages::{NavigationId, NavigationRequestInfo, ToLoaderMessage};

/// The network request of one navigation.
pub trait NavigationLoader {
    /// Follow the redirect that was last reported.
    fn follow_redirect(&mut self);

    /// Start delivering the body of the reported response.
    fn proceed_with_response(&mut self);

    /// Give up on the request. No more events are expected for it.
    fn abandon(&mut self);
}

/// Starts network requests for navigations.
pub trait NavigationLoaderFactory {
    fn create_loader(&self, info: NavigationRequestInfo) -> Box<dyn NavigationLoader>;
}

/// Forwards loader commands to a network service over a channel.
#[derive(Clone, Debug)]
pub struct ChannelLoaderFactory {
    sender: Sender<ToLoaderMessage>,
}

impl ChannelLoaderFactory {
    pub fn new(sender: Sender<ToLoaderMessage>) -> Self {
        Self { sender }
    }

    /// A factory plus the receiving end the network service reads from.
    pub fn unbounded() -> (Self, Receiver<ToLoaderMessage>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Self::new(sender), receiver)
    }
}

impl NavigationLoaderFactory for ChannelLoaderFactory {
    fn create_loader(&self, info: NavigationRequestInfo) -> Box<dyn NavigationLoader> {
        let loader = ChannelLoader {
            navigation_id: info.navigation_id,
            sender: self.sender.clone(),
        };
        log::debug!(
            "NavigationLoader: starting {} for {}",
            info.navigation_id,
            info.common_params.url
        );
        loader.send(ToLoaderMessage::Start(Box::new(info)));
        Box::new(loader)
    }
}

struct ChannelLoader {
    navigation_id: NavigationId,
    sender: Sender<ToLoaderMessage>,
}

impl ChannelLoader {
    fn send(&self, message: ToLoaderMessage) {
        if let Err(error) = self.sender.send(message) {
            log::warn!(
                "NavigationLoader: network service is gone, dropping {:?}",
                error.into_inner()
            );
        }
    }
}

impl NavigationLoader for ChannelLoader {
    fn follow_redirect(&mut self) {
        self.send(ToLoaderMessage::FollowRedirect(self.navigation_id));
    }

    fn proceed_with_response(&mut self) {
        self.send(ToLoaderMessage::ProceedWithResponse(self.navigation_id));
    }

    fn abandon(&mut self) {
        self.send(ToLoaderMessage::Abandon(self.navigation_id));
    }
}

#[cfg(test)]
mod tests {
    use navcore_messages::{BeginNavigationParams, CommonNavigationParams};
    use url::Url;

    use super::*;

    fn info(navigation_id: NavigationId) -> NavigationRequestInfo {
        NavigationRequestInfo {
            navigation_id,
            common_params: CommonNavigationParams::new(Url::parse("https://a.test/").unwrap()),
            begin_params: BeginNavigationParams::default(),
            is_main_frame: true,
            parent_is_main_frame: false,
            frame_tree_node_id: 1,
        }
    }

    #[test]
    fn test_channel_loader_forwards_commands() {
        let (factory, receiver) = ChannelLoaderFactory::unbounded();
        let id = NavigationId(42);
        let mut loader = factory.create_loader(info(id));
        loader.follow_redirect();
        loader.proceed_with_response();

        let messages: Vec<ToLoaderMessage> = receiver.try_iter().collect();
        assert_eq!(messages.len(), 3);
        assert!(matches!(&messages[0], ToLoaderMessage::Start(info) if info.navigation_id == id));
        assert!(matches!(messages[1], ToLoaderMessage::FollowRedirect(n) if n == id));
        assert!(matches!(messages[2], ToLoaderMessage::ProceedWithResponse(n) if n == id));
    }

    #[test]
    fn test_send_after_disconnect_does_not_panic() {
        let (factory, receiver) = ChannelLoaderFactory::unbounded();
        let mut loader = factory.create_loader(info(NavigationId(1)));
        drop(receiver);
        loader.abandon();
    }
}
