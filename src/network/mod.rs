pub mod domain_policy;
pub mod http_pool;

pub use domain_policy::{AllowList, DomainPolicy, DomainState};
pub use http_pool::{HttpChannelPool, HttpPoolOptions};
