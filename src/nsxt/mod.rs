//! NSX-T REST access: transport, client, paths and pagination

pub mod client;
pub mod fetcher;
pub mod http;
pub mod urls;

pub use client::NsxtClient;
pub use fetcher::ListParams;
pub use http::{NsxtError, NsxtHttpClient};
