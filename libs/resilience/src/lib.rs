/// Resilience patterns for the analysis pipeline's external collaborators
///
/// The fetcher and link-checker are explicitly out-of-scope externals, but
/// whatever wraps a call to them still needs a timeout — this crate
/// provides that, independent of the outbox's own backoff strategy (see
/// `transactional-outbox::backoff`, which implements the jittered-exponential
/// formula the publisher loop is specified against).
pub mod timeout;

pub use timeout::{with_timeout, with_timeout_result, TimeoutConfig, TimeoutError};
