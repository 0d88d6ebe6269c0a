//! Carrying tokens between client and server.
//!
//! Latchkey never touches HTTP itself. The host hands in a
//! [`RequestContext`] to read the presented token, and gets back a
//! [`TokenEmission`] describing what to attach to the response.
//!
//! | Client | Request carries  | Response sets                 | Cleared with           |
//! |--------|------------------|-------------------------------|------------------------|
//! | Web    | cookie           | `Set-Cookie`                  | expiry in the past     |
//! | Mobile | header           | same header                   | value `REMOVE`         |

use chrono::DateTime;
use latchkey_protocol::UnixTime;
use latchkey_session::TokenDirective;

use crate::config::{ClientConfig, CookieConfig};

/// Header value that tells a mobile client to forget its token.
pub const MOBILE_CLEAR_VALUE: &str = "REMOVE";

const COOKIE_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// How a client carries its token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientKind {
    /// Browsers: a cookie.
    Web,

    /// Native apps: a request/response header.
    Mobile,
}

/// The host's view of one incoming request.
pub trait RequestContext {
    /// Which transport this request's client uses.
    fn client_kind(&self) -> ClientKind;

    /// `true` for routes that mutate session state and must hold the
    /// session lock for the whole request.
    fn is_blocking(&self) -> bool;

    /// A request cookie by name.
    fn cookie(&self, name: &str) -> Option<&str>;

    /// A request header by name.
    fn header(&self, name: &str) -> Option<&str>;
}

/// What to attach to the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenEmission {
    /// A full `Set-Cookie` header value.
    SetCookie(String),

    /// A response header.
    Header { name: String, value: String },
}

/// The sealed token presented by this request, if any.
pub fn presented_token<'c, C: RequestContext + ?Sized>(
    ctx: &'c C,
    client: &ClientConfig,
) -> Option<&'c str> {
    let token = match ctx.client_kind() {
        ClientKind::Web => ctx.cookie(&client.web_cookie),
        ClientKind::Mobile => ctx.header(&client.mobile_header),
    }?;
    (!token.is_empty() && token != MOBILE_CLEAR_VALUE).then_some(token)
}

/// The remember-me id presented by this request, if any.
///
/// Remember-me ids always travel in a cookie, whatever the client kind.
pub fn presented_remember_id<'c, C: RequestContext + ?Sized>(
    ctx: &'c C,
    client: &ClientConfig,
) -> Option<&'c str> {
    ctx.cookie(&client.remember_cookie).filter(|id| !id.is_empty())
}

/// A `Set-Cookie` handing out a remember-me id, or clearing the cookie
/// when `id` is `None`.
pub fn emit_remember_id(
    id: Option<&str>,
    expires_at: UnixTime,
    cookie: &CookieConfig,
    client: &ClientConfig,
) -> TokenEmission {
    let (value, expires_at) = match id {
        Some(id) => (id, expires_at),
        None => ("", 0),
    };
    TokenEmission::SetCookie(set_cookie(
        &client.remember_cookie,
        value,
        expires_at,
        cookie,
    ))
}

/// Translates a directive into what the response must carry.
///
/// Returns `None` for [`TokenDirective::Unchanged`].
pub fn emit(
    directive: &TokenDirective,
    kind: ClientKind,
    cookie: &CookieConfig,
    client: &ClientConfig,
) -> Option<TokenEmission> {
    let emission = match (directive, kind) {
        (TokenDirective::Unchanged, _) => return None,
        (TokenDirective::Set { sealed, expires_at }, ClientKind::Web) => {
            TokenEmission::SetCookie(set_cookie(
                &client.web_cookie,
                sealed,
                *expires_at,
                cookie,
            ))
        }
        (TokenDirective::Clear, ClientKind::Web) => {
            TokenEmission::SetCookie(set_cookie(&client.web_cookie, "", 0, cookie))
        }
        (TokenDirective::Set { sealed, .. }, ClientKind::Mobile) => {
            TokenEmission::Header {
                name: client.mobile_header.clone(),
                value: sealed.clone(),
            }
        }
        (TokenDirective::Clear, ClientKind::Mobile) => TokenEmission::Header {
            name: client.mobile_header.clone(),
            value: MOBILE_CLEAR_VALUE.to_string(),
        },
    };
    Some(emission)
}

/// Renders a `Set-Cookie` value expiring at `expires_at`.
pub fn set_cookie(
    name: &str,
    value: &str,
    expires_at: UnixTime,
    cookie: &CookieConfig,
) -> String {
    let mut header = format!(
        "{name}={value}; Expires={}; Path=/",
        http_date(expires_at)
    );
    if cookie.secure {
        header.push_str("; Secure");
    }
    if cookie.http_only {
        header.push_str("; HttpOnly");
    }
    header.push_str(&format!("; SameSite={}", cookie.same_site));
    header
}

/// Formats a unix time as an HTTP date, clamping out-of-range values to
/// the epoch.
fn http_date(t: UnixTime) -> String {
    DateTime::from_timestamp(t, 0)
        .unwrap_or(DateTime::UNIX_EPOCH)
        .format(COOKIE_DATE_FORMAT)
        .to_string()
}
