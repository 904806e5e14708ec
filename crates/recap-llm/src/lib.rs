pub mod mock;
pub mod provider;
pub mod reliable;

pub use mock::{MockCompletion, MockResponse};
pub use provider::{ApiKey, MessagesApiConfig, MessagesApiProvider};
pub use reliable::{ReliableCompletion, ReliableConfig};
