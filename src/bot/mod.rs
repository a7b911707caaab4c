//! Stock-quote bot: the command dispatcher, the response relay and the
//! quote provider they depend on.

pub mod dispatcher;
pub mod quote_provider;
pub mod relay;

pub use dispatcher::CommandDispatcher;
pub use quote_provider::{Quote, QuoteError, QuoteProvider, StooqQuoteProvider};
pub use relay::ResponseRelay;
