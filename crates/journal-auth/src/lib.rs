//! Account sign-in over AT Protocol OAuth and the account cookie that
//! carries the signed-in DID between requests.

pub mod client;
pub mod config;
pub mod cookie;
pub mod discovery;
pub mod dpop;
pub mod error;
pub mod identity;
pub mod pkce;
pub mod resolver;

pub use client::{AccountSession, AuthorizeOptions, CallbackParams, HttpOAuthClient, OAuthClient};
pub use config::OAuthConfig;
pub use cookie::{clear_account_cookie, get_account_cookie, set_account_cookie, ACCOUNT_COOKIE};
pub use error::AuthError;
pub use identity::IdentityService;
pub use resolver::{DohHandleResolver, HandleResolver};
