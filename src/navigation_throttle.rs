//! Pluggable checks consulted at the three navigation checkpoints.

use crate::navigation_handle::NavigationHandle;

/// The verdict of a throttle, or of a whole chain.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ThrottleCheckResult {
    /// Let the navigation continue.
    Proceed,
    /// Pause the navigation until it is resumed or cancelled.
    Defer,
    /// Cancel the navigation.
    Cancel,
    /// Cancel the navigation silently.
    CancelAndIgnore,
    /// Block the request; only valid when the request starts. Shows an
    /// error page.
    BlockRequest,
}

impl ThrottleCheckResult {
    /// Whether the navigation stops without committing anything.
    pub fn is_cancel(self) -> bool {
        matches!(self, Self::Cancel | Self::CancelAndIgnore)
    }
}

/// The three points at which throttles are consulted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Checkpoint {
    WillStartRequest,
    WillRedirectRequest,
    WillProcessResponse,
}

/// An interceptor consulted during a navigation.
///
/// Every method defaults to [`ThrottleCheckResult::Proceed`], so a throttle
/// only overrides the checkpoints it is interested in.
pub trait NavigationThrottle {
    /// Called when the network request is about to start.
    fn will_start_request(&mut self, _handle: &NavigationHandle) -> ThrottleCheckResult {
        ThrottleCheckResult::Proceed
    }

    /// Called when a redirect is about to be followed.
    fn will_redirect_request(&mut self, _handle: &NavigationHandle) -> ThrottleCheckResult {
        ThrottleCheckResult::Proceed
    }

    /// Called when the response is about to be committed.
    fn will_process_response(&mut self, _handle: &NavigationHandle) -> ThrottleCheckResult {
        ThrottleCheckResult::Proceed
    }

    /// Name used in logs.
    fn name(&self) -> &'static str;
}

/// An ordered list of throttles with a resumable cursor.
#[derive(Default)]
pub struct ThrottleChain {
    throttles: Vec<Box<dyn NavigationThrottle>>,
    next_index: usize,
}

impl ThrottleChain {
    pub fn new(throttles: Vec<Box<dyn NavigationThrottle>>) -> Self {
        Self {
            throttles,
            next_index: 0,
        }
    }

    /// Append throttles at the end of the chain.
    pub fn register(&mut self, throttles: Vec<Box<dyn NavigationThrottle>>) {
        self.throttles.extend(throttles);
    }

    pub fn len(&self) -> usize {
        self.throttles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.throttles.is_empty()
    }

    /// Where the next check resumes.
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    /// Run `checkpoint` from the cursor on and fold the verdicts.
    ///
    /// A deferral leaves the cursor on the throttle after the deferring one,
    /// so the next call resumes there. A full pass resets the cursor.
    pub fn check(
        &mut self,
        checkpoint: Checkpoint,
        handle: &NavigationHandle,
    ) -> ThrottleCheckResult {
        for index in self.next_index..self.throttles.len() {
            let throttle = &mut self.throttles[index];
            let result = match checkpoint {
                Checkpoint::WillStartRequest => throttle.will_start_request(handle),
                Checkpoint::WillRedirectRequest => throttle.will_redirect_request(handle),
                Checkpoint::WillProcessResponse => throttle.will_process_response(handle),
            };
            log::trace!(
                "ThrottleChain: {} returned {result:?} at {checkpoint:?}",
                throttle.name()
            );
            match result {
                ThrottleCheckResult::Proceed => continue,
                ThrottleCheckResult::Defer => {
                    self.next_index = index + 1;
                    return result;
                }
                ThrottleCheckResult::BlockRequest => {
                    assert_eq!(
                        checkpoint,
                        Checkpoint::WillStartRequest,
                        "{} blocked a request after it started",
                        throttle.name()
                    );
                    self.next_index = 0;
                    return result;
                }
                ThrottleCheckResult::Cancel | ThrottleCheckResult::CancelAndIgnore => {
                    self.next_index = 0;
                    return result;
                }
            }
        }
        self.next_index = 0;
        ThrottleCheckResult::Proceed
    }
}
