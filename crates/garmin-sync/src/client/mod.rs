pub mod api;
pub mod session;

pub use api::GarminClient;
pub use session::{OAuth2Token, TokenStore};
