// Authorization-code flow helpers

use crate::error::{AuthError, Result};

/// Suffix the consent page expects on the app's API key
const CLIENT_ID_SUFFIX: &str = "@AMER.OAUTHAP";

/// Build the consent page URL the user opens in a browser
pub fn authorization_url(auth_url: &str, api_key: &str, redirect_uri: &str) -> String {
    format!(
        "{}?response_type=code&redirect_uri={}&client_id={}",
        auth_url,
        urlencoding::encode(redirect_uri),
        urlencoding::encode(&format!("{}{}", api_key, CLIENT_ID_SUFFIX)),
    )
}

/// Pull the URL-decoded authorization code out of the redirect URI
pub fn extract_authorization_code(redirect_uri: &str) -> Result<String> {
    let start = redirect_uri.find("code=").ok_or_else(|| {
        AuthError::MalformedAuthorizationRedirect(format!(
            "no code= parameter in {}",
            redirect_uri
        ))
    })? + "code=".len();

    let rest = &redirect_uri[start..];
    let raw = rest.split(['&', '#']).next().unwrap_or_default();

    if raw.is_empty() {
        return Err(AuthError::MalformedAuthorizationRedirect(
            "empty code= parameter".to_string(),
        ));
    }

    urlencoding::decode(raw)
        .map(|code| code.into_owned())
        .map_err(|e| {
            AuthError::MalformedAuthorizationRedirect(format!("code is not valid UTF-8: {}", e))
        })
}
