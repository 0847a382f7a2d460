//! Cookie-bearing HTTP session and portal addressing.

use std::time::{Duration, Instant};

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response};
use tracing::{debug, trace};
use url::Url;

use crate::portal::errors::PortalError;
use crate::utils::{fmt_duration, log_if_slow};

/// Timeout for page and AJAX catalog fetches.
pub const PAGE_TIMEOUT: Duration = Duration::from_secs(20);

/// Timeout for authentication POSTs, their follow-ups, and event fetches.
pub const LONG_TIMEOUT: Duration = Duration::from_secs(30);

const SLOW_REQUEST: Duration = Duration::from_secs(5);

const USER_AGENT: &str = "Mozilla/5.0";
const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

const LOGIN_PAGE: &str = "/index.php?lang=k";
const CALENDAR_PAGE: &str = "/index.php?mid=K06&lang=k";
const DIRECT_LOGIN: &str = "/index.php?mid=K00";
const AJAX: &str = "/ys_ajax.php";

/// Absolute URLs of every endpoint the crawler talks to.
#[derive(Debug, Clone)]
pub struct Endpoints {
    base: Url,
    auth: Url,
}

impl Endpoints {
    pub fn new(base_url: &str, auth_url: &str) -> Result<Self, PortalError> {
        let parse = |name: &str, raw: &str| {
            Url::parse(raw)
                .map_err(|e| PortalError::Configuration(format!("invalid {name} '{raw}': {e}")))
        };
        Ok(Self {
            base: parse("base_url", base_url)?,
            auth: parse("auth_url", auth_url)?,
        })
    }

    fn on_base(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        match path.split_once('?') {
            Some((p, q)) => {
                url.set_path(p);
                url.set_query(Some(q));
            }
            None => {
                url.set_path(path);
                url.set_query(None);
            }
        }
        url
    }

    /// `scheme://host[:port]` of the portal, used as the `Origin` header.
    pub fn origin(&self) -> String {
        self.base.origin().ascii_serialization()
    }

    pub fn login_page(&self) -> Url {
        self.on_base(LOGIN_PAGE)
    }

    /// Authenticated-only landing page; also primes AJAX session state.
    pub fn calendar_page(&self) -> Url {
        self.on_base(CALENDAR_PAGE)
    }

    pub fn direct_login(&self) -> Url {
        self.on_base(DIRECT_LOGIN)
    }

    pub fn ajax(&self) -> Url {
        self.on_base(AJAX)
    }

    /// Delegated authentication endpoint on the university's SSO host.
    pub fn auth(&self) -> &Url {
        &self.auth
    }

    /// Whether `url` is served by the authentication host.
    pub fn is_auth_host(&self, url: &Url) -> bool {
        url.origin() == self.auth.origin()
    }
}

/// A fetched response body together with the URL it was finally served from.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: Url,
    pub body: String,
}

/// Owns the cookie jar; every portal request goes through one of these.
pub struct Session {
    client: Client,
}

impl Session {
    pub fn new() -> Result<Self, PortalError> {
        Ok(Self {
            client: build_client()?,
        })
    }

    /// Drop all cookies by replacing the underlying client.
    pub fn reset(&mut self) -> Result<(), PortalError> {
        self.client = build_client()?;
        debug!("Session cookies cleared");
        Ok(())
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Send `request`, require a 2xx status and read the body as text.
    pub async fn fetch(&self, request: RequestBuilder) -> Result<Page, PortalError> {
        let request = request
            .build()
            .map_err(PortalError::transport("<unbuilt request>"))?;
        let target = request.url().to_string();
        let method = request.method().clone();
        let start = Instant::now();

        let response = self
            .client
            .execute(request)
            .await
            .and_then(Response::error_for_status)
            .map_err(PortalError::transport(&target))?;
        let url = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(PortalError::transport(&target))?;

        log_if_slow(start, SLOW_REQUEST, &target);
        trace!(
            %method,
            url = %url,
            bytes = body.len(),
            duration = fmt_duration(start.elapsed()),
            "Response received"
        );
        Ok(Page { url, body })
    }
}

fn build_client() -> Result<Client, PortalError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(HTML_ACCEPT));

    Client::builder()
        .cookie_store(true)
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(10))
        .timeout(LONG_TIMEOUT)
        .build()
        .map_err(|e| PortalError::Configuration(format!("failed to build HTTP client: {e}")))
}
