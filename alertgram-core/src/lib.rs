//! # alertgram: Sentry alert routing to Telegram
//!
//! alertgram takes normalized monitoring alerts ([`Event`]) and decides,
//! per configured destination, whether to forward them to a Telegram chat
//! (optionally a forum thread). Each destination carries its own filter
//! expression and message template options.
//!
//! ## Processing Pipeline
//!
//! ```text
//! RelayConfig -> DestinationRegistry          (once, at startup)
//! Event -> Router -> Dispatcher -> MessageSender   (per event)
//! ```
//!
//! - [`filter`]: predicates and AND / OR filter trees, plus parsing from the
//!   configuration document (including the legacy `filters` syntax).
//! - [`registry`]: the ordered, immutable list of destinations.
//! - [`router`]: pure selection of the destinations an event goes to.
//! - [`dispatch`]: formatting ([`template`]) and delivery with bounded
//!   retries and timeouts, isolating failures per destination.
//! - [`sender`]: the outbound capability and its Telegram Bot API
//!   implementation.
//! - [`relay`]: wires everything together behind [`Relay::process`].
//!
//! ## Error Handling
//!
//! Malformed configuration fails at load time with a
//! [`config::ConfigError`]. Bad regex patterns are logged and make their
//! predicate evaluate false. Delivery failures never escape
//! [`Relay::process`]; they are reported per destination as
//! [`DeliveryResult::Failed`].

pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod filter;
pub mod registry;
pub mod relay;
pub mod router;
pub mod sender;
pub mod template;

// Re-exports
pub use config::{ConfigError, RelayConfig};
pub use dispatch::{DeliveryReport, DeliveryResult, Dispatcher};
pub use error::*;
pub use event::{Event, Level};
pub use filter::FilterExpression;
pub use registry::{Destination, DestinationRegistry};
pub use relay::Relay;
pub use router::route;
