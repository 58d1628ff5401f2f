//! Error Hierarchy for the Sync Core
//!
//! Defines the error types for both consistency engines, categorized by
//! subsystem (feed/router, billing, storage) and operational concerns.

use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Infrastructure-level failures (feed channels, storage, serialization)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Configuration loading failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Configuration validation failures
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Webhook admission and billing reconciliation failures
    #[error(transparent)]
    Billing(#[from] BillingError),

    /// Subscription router contract violations
    #[error(transparent)]
    Router(#[from] RouterError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    // Change-feed layer
    #[error("Change feed error: {0}")]
    Feed(#[from] FeedError),

    // Storage layer
    #[error("Storage operation failed")]
    Storage(#[from] StorageError),

    // Basic service operations
    #[error("Service failed to start: {0}")]
    StartupFailed(String),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    #[error("{0}")]
    SignalSendFailed(String),
}

/// Failures on the push channel between the router and the remote change
/// feed. All of these are router-internal: they trigger reconnection with
/// backoff and are never surfaced to subscribers.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The push channel dropped; missed events cannot be recovered
    /// individually, so reconnection is followed by a catch-up sweep.
    #[error("Change channel disconnected for {entity}")]
    ChannelDisconnected { entity: String },

    /// The remote feed rejected or failed the subscription request
    #[error("Subscribe failed for {entity}: {reason}")]
    SubscribeFailed { entity: String, reason: String },

    /// Retry policy exhaustion while reconnecting
    #[error("Reconnect retries exhausted after {0:?}")]
    RetryExhausted(Duration),

    /// Single connection attempt timeout
    #[error("Connect attempt timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// A wire row could not be decoded into the entity's typed shape
    #[error("Malformed change event for {entity}: {reason}")]
    MalformedEvent { entity: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Embedded database errors; infrastructure-transient from the
    /// webhook sender's point of view, surfaced as a retryable response.
    #[error("Embedded database error: {0}")]
    Sled(#[from] sled::Error),

    /// Serialization failures for persisted billing records
    #[error(transparent)]
    Bincode(#[from] bincode::Error),

    /// Filesystem errors around database and log directories
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing store write failed for infrastructure reasons;
    /// the delivery should be retried by the sender.
    #[error("Transient store failure: {0}")]
    Transient(String),

    /// A persisted record failed integrity checks on load
    #[error("Data corruption detected at {location}")]
    DataCorruption { location: String },
}

/// Webhook admission gate and reconciliation errors.
///
/// `SignatureInvalid` and `MalformedPayload` are fatal for the delivery and
/// map to a 400 response; they are never retried internally.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// Signature mismatch or unusable signature header; rejected before
    /// any payload inspection or record lookup.
    #[error("Webhook signature invalid: {0}")]
    SignatureInvalid(&'static str),

    /// Payload passed the signature check but could not be parsed
    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// `entity` did not name a known logical entity
    #[error("Unknown entity type: {0}")]
    UnknownEntity(String),

    /// Filter or target template referenced a column the entity's schema
    /// does not carry
    #[error("Column {column} is not part of the {entity} schema")]
    UnknownColumn { entity: String, column: String },

    /// Filter expression could not be parsed
    #[error("Invalid filter expression: {0}")]
    InvalidFilter(String),

    /// Invalidation target pattern could not be parsed
    #[error("Invalid invalidation target: {0}")]
    InvalidTarget(String),

    /// A subscription was requested with no invalidation targets
    #[error("Subscription declares no invalidation targets")]
    EmptyTargets,
}

// ============== Conversion Implementations ============== //
impl From<FeedError> for Error {
    fn from(e: FeedError) -> Self {
        Error::System(SystemError::Feed(e))
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Error::System(SystemError::Storage(e))
    }
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        StorageError::Sled(err).into()
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        StorageError::Bincode(err).into()
    }
}

impl From<JoinError> for Error {
    fn from(err: JoinError) -> Self {
        Error::System(SystemError::TaskFailed(err))
    }
}

impl Error {
    /// Whether a webhook delivery failing with this error should be
    /// retried by the external sender (non-2xx response) or is
    /// permanently rejected (4xx).
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            Error::Billing(_) | Error::Router(_) | Error::Config(_) | Error::InvalidConfig(_)
        )
    }
}
