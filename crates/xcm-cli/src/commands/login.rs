//! `xcm login`: store an API token for later commands.
//!
//! The token's `typ` claim decides whether it is kept as an access token or a
//! refresh token. Encrypted tokens are always refresh tokens.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use clap::Args;
use tracing::debug;

use crate::config::ApiConfig;
use crate::{Error, Result};

const DEFAULT_URL: &str = "https://api.openshift.com";
const DEFAULT_TOKEN_URL: &str =
    "https://sso.redhat.com/auth/realms/redhat-external/protocol/openid-connect/token";
const DEFAULT_SCOPES: &[&str] = &["openid"];

/// Log in to xCM
#[derive(Args, Debug)]
pub struct LoginArgs {
    /// API token for authentication
    #[arg(long)]
    pub token: String,

    /// URL of the xCM API gateway
    #[arg(long, default_value = DEFAULT_URL)]
    pub url: String,

    /// OpenID token URL
    #[arg(long, default_value = DEFAULT_TOKEN_URL)]
    pub token_url: String,

    /// Skip TLS certificate verification (for development)
    #[arg(long, default_value = "false")]
    pub insecure: bool,
}

/// Where a token lands in the config
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Access,
    Refresh,
}

/// Run the login command.
pub async fn run(args: LoginArgs) -> Result<()> {
    let mut config = ApiConfig::load()?;
    apply_login(&mut config, &args)?;
    config.save()?;
    println!("Login successful");
    Ok(())
}

fn apply_login(config: &mut ApiConfig, args: &LoginArgs) -> Result<()> {
    validate_url(&args.url)?;
    if args.token.is_empty() {
        return Err(Error::validation("flag '--token' is mandatory"));
    }

    match classify_token(&args.token)? {
        TokenKind::Access => {
            config.access_token = args.token.clone();
            config.refresh_token.clear();
        }
        TokenKind::Refresh => {
            config.access_token.clear();
            config.refresh_token = args.token.clone();
        }
    }
    config.token_url = args.token_url.clone();
    config.scopes = DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect();
    config.url = args.url.clone();
    config.insecure = args.insecure;
    config.last_login = Some(chrono::Utc::now().to_rfc3339());
    Ok(())
}

fn validate_url(url: &str) -> Result<()> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| {
            Error::validation(format!("URL '{}' must use the http or https scheme", url))
        })?;
    if rest.trim_end_matches('/').is_empty() {
        return Err(Error::validation(format!("URL '{}' has no host", url)));
    }
    Ok(())
}

fn classify_token(token: &str) -> Result<TokenKind> {
    let segments: Vec<&str> = token.split('.').collect();
    match segments.len() {
        5 => {
            debug!("encrypted token, storing as refresh token");
            Ok(TokenKind::Refresh)
        }
        3 => {
            let typ = token_type(segments[1])?;
            match typ.as_str() {
                "Bearer" | "" => Ok(TokenKind::Access),
                "Refresh" | "Offline" => Ok(TokenKind::Refresh),
                other => Err(Error::validation(format!(
                    "unknown token type '{}'",
                    other
                ))),
            }
        }
        n => Err(Error::validation(format!(
            "cannot parse token: expected 3 segments, found {}",
            n
        ))),
    }
}

/// Reads the `typ` claim without verifying the signature
fn token_type(payload: &str) -> Result<String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| Error::validation(format!("cannot decode token payload: {}", e)))?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|e| Error::validation(format!("cannot parse token claims: {}", e)))?;
    match claims.get("typ") {
        None | Some(serde_json::Value::Null) => Ok(String::new()),
        Some(serde_json::Value::String(typ)) => Ok(typ.clone()),
        Some(other) => Err(Error::validation(format!(
            "'typ' claim must be a string, found {}",
            other
        ))),
    }
}
