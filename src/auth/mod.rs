// Authentication module
// Manages the OAuth2 token lifecycle and its persistence

mod authorization;
mod clock;
mod exchange;
mod manager;
mod store;
mod types;

pub use authorization::{authorization_url, extract_authorization_code};
pub use clock::{Clock, ManualClock, SystemClock};
pub use exchange::TokenClient;
pub use manager::TokenManager;
pub use store::{
    MemoryStore, SqliteStore, TokenStore, ACCESS_TIME_KEY, ACCESS_TOKEN_KEY, REFRESH_TIME_KEY,
    REFRESH_TOKEN_KEY,
};
pub use types::{
    AuthorizationGrant, BearerCredential, RefreshGrant, TokenState, TokenStatus,
    ACCESS_TOKEN_TTL_SECS, REFRESH_TOKEN_TTL_SECS,
};
