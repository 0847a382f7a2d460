//! Login flow and session verification.
//!
//! The portal offers two login protocols depending on the account category:
//! university members authenticate against the SSO host with base64-encoded
//! credentials (followed by a script redirect and an auto-submitted
//! confirmation form), while registered groups post directly to the portal.
//! Either way, the outcome is decided solely by [`is_authenticated`].

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use html_scraper::{ElementRef, Html, Selector};
use regex::Regex;
use reqwest::header::{ORIGIN, REFERER};
use reqwest::{Client, RequestBuilder};
use tracing::{debug, info, warn};
use url::Url;

use crate::portal::errors::PortalError;
use crate::portal::session::{Endpoints, LONG_TIMEOUT, PAGE_TIMEOUT, Page, Session};
use crate::utils::mask_identifier;

const LOGIN_FORM: &str = "fflogin";
const CONFIRM_FORM: &str = "Chk";
const AUTO_SUBMIT_MARKER: &str = "document.Chk.submit()";

const LOGOUT_MARKER: &str = "로그아웃";
const LOGGED_IN_TAB_MARKER: &str = "usertab04on";

/// Account category selector (`gOpt`) offered by the login form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountCategory {
    Undergraduate,
    Graduate,
    Staff,
    Alumni,
    RegisteredGroup,
}

impl AccountCategory {
    pub fn code(self) -> &'static str {
        match self {
            Self::Undergraduate => "A",
            Self::Graduate => "B",
            Self::Staff => "C",
            Self::RegisteredGroup => "D",
            Self::Alumni => "E",
        }
    }

    pub fn scheme(self) -> LoginScheme {
        match self {
            Self::RegisteredGroup => LoginScheme::Direct,
            member => LoginScheme::Delegated {
                category: member.code(),
            },
        }
    }
}

impl FromStr for AccountCategory {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(Self::Undergraduate),
            "B" => Ok(Self::Graduate),
            "C" => Ok(Self::Staff),
            "D" => Ok(Self::RegisteredGroup),
            "E" => Ok(Self::Alumni),
            other => Err(PortalError::Configuration(format!(
                "unknown account category '{other}' (expected one of A, B, C, D, E)"
            ))),
        }
    }
}

impl fmt::Display for AccountCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Account identifier and secret. `Debug` never prints the secret.
#[derive(Clone)]
pub struct Credentials {
    id: String,
    secret: String,
}

impl Credentials {
    pub fn new(id: &str, secret: &str) -> Result<Self, PortalError> {
        let (id, secret) = (id.trim(), secret.trim());
        if id.is_empty() || secret.is_empty() {
            return Err(PortalError::Configuration(
                "account_id and account_password (YONSEI_ID / YONSEI_PW) must be set".into(),
            ));
        }
        Ok(Self {
            id: id.to_owned(),
            secret: secret.to_owned(),
        })
    }

    pub fn masked_id(&self) -> String {
        mask_identifier(&self.id)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("id", &self.masked_id())
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Hidden fields scraped from the login page's `fflogin` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginParameters {
    pub keyid: String,
    pub returl: String,
    pub waction: Option<String>,
}

impl LoginParameters {
    pub fn from_login_page(body: &str) -> Result<Self, PortalError> {
        let html = Html::parse_document(body);
        let form = find_form(&html, LOGIN_FORM).ok_or_else(|| {
            PortalError::Extraction(format!("login form '{LOGIN_FORM}' not found"))
        })?;

        let fields = hidden_inputs(form);
        let take = |name: &str| {
            fields
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
                .filter(|v| !v.is_empty())
        };

        match (take("keyid"), take("returl")) {
            (Some(keyid), Some(returl)) => Ok(Self {
                keyid,
                returl,
                waction: take("waction"),
            }),
            _ => Err(PortalError::Extraction(
                "login parameters keyid/returl missing from login form".into(),
            )),
        }
    }
}

/// How credentials are submitted for a given account category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginScheme {
    /// SSO login on the authentication host, tagged with the category code.
    Delegated { category: &'static str },
    /// Registered groups post straight to the portal.
    Direct,
}

impl LoginScheme {
    pub fn request(
        self,
        credentials: &Credentials,
        params: &LoginParameters,
        endpoints: &Endpoints,
    ) -> LoginRequest {
        match self {
            Self::Delegated { category } => {
                delegated_request(category, credentials, params, endpoints)
            }
            Self::Direct => direct_request(credentials, endpoints),
        }
    }
}

/// A fully described credential POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub url: Url,
    pub query: Vec<(&'static str, String)>,
    pub form: Vec<(&'static str, String)>,
}

impl LoginRequest {
    fn into_builder(self, client: &Client, endpoints: &Endpoints) -> RequestBuilder {
        let mut builder = client.post(self.url);
        if !self.query.is_empty() {
            builder = builder.query(&self.query);
        }
        builder
            .form(&self.form)
            .header(REFERER, endpoints.login_page().as_str())
            .header(ORIGIN, endpoints.origin())
            .timeout(LONG_TIMEOUT)
    }
}

fn delegated_request(
    category: &'static str,
    credentials: &Credentials,
    params: &LoginParameters,
    endpoints: &Endpoints,
) -> LoginRequest {
    let mut form = vec![
        ("id", BASE64.encode(credentials.id.to_uppercase())),
        ("pw", BASE64.encode(&credentials.secret)),
        ("gOpt", category.to_owned()),
        ("act", "lok".to_owned()),
    ];
    if let Some(waction) = &params.waction {
        form.push(("waction", waction.clone()));
    }

    LoginRequest {
        url: endpoints.auth().clone(),
        query: vec![
            ("req_key", params.keyid.clone()),
            ("returl", params.returl.clone()),
        ],
        form,
    }
}

fn direct_request(credentials: &Credentials, endpoints: &Endpoints) -> LoginRequest {
    LoginRequest {
        url: endpoints.direct_login(),
        query: Vec::new(),
        form: vec![
            ("act", "lok".to_owned()),
            ("gOpt", AccountCategory::RegisteredGroup.code().to_owned()),
            ("gid", credentials.id.clone()),
            ("gpwd", credentials.secret.clone()),
        ],
    }
}

/// Target of a `location.href = '...'` instruction in an SSO response.
pub fn find_script_redirect(body: &str) -> Option<String> {
    static REDIRECT_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"location\.href\s*=\s*['"]([^'"]+)['"]"#).unwrap()
    });
    REDIRECT_RE.captures(body).map(|caps| caps[1].to_string())
}

/// The `Chk` confirmation form the SSO host asks the browser to auto-submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoSubmitForm {
    /// Raw `action` attribute; empty means "post back to the same page".
    pub action: String,
    pub fields: Vec<(String, String)>,
}

impl AutoSubmitForm {
    pub fn find(body: &str) -> Option<Self> {
        let html = Html::parse_document(body);
        let form = find_form(&html, CONFIRM_FORM)?;
        Some(Self {
            action: form.attr("action").unwrap_or_default().trim().to_owned(),
            fields: hidden_inputs(form),
        })
    }
}

fn find_form<'a>(html: &'a Html, name: &str) -> Option<ElementRef<'a>> {
    let form_sel = Selector::parse("form").unwrap();
    html.select(&form_sel)
        .find(|form| form.attr("name") == Some(name))
}

fn hidden_inputs(form: ElementRef<'_>) -> Vec<(String, String)> {
    let input_sel = Selector::parse("input").unwrap();
    form.select(&input_sel)
        .filter(|input| {
            input
                .attr("type")
                .is_some_and(|t| t.eq_ignore_ascii_case("hidden"))
        })
        .filter_map(|input| {
            let name = input.attr("name").filter(|n| !n.is_empty())?;
            Some((name.to_owned(), input.attr("value").unwrap_or_default().to_owned()))
        })
        .collect()
}

/// Whether a page rendered for the current session shows the signed-in UI.
pub fn shows_signed_in(body: &str) -> bool {
    body.contains(LOGOUT_MARKER) || body.contains(LOGGED_IN_TAB_MARKER)
}

/// Trimmed `<title>` text, for diagnostics.
pub fn page_title(body: &str) -> Option<String> {
    let html = Html::parse_document(body);
    let title_sel = Selector::parse("title").unwrap();
    html.select(&title_sel)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_owned())
        .filter(|t| !t.is_empty())
}

/// GET the login page and extract its hidden parameters.
pub async fn fetch_login_parameters(
    session: &Session,
    endpoints: &Endpoints,
) -> Result<LoginParameters, PortalError> {
    let page = session
        .fetch(
            session
                .client()
                .get(endpoints.login_page())
                .timeout(PAGE_TIMEOUT),
        )
        .await?;
    LoginParameters::from_login_page(&page.body)
}

/// Fetch the calendar page (only reachable when signed in) and look for the
/// signed-in markers. This is the only authority on login success.
pub async fn is_authenticated(
    session: &Session,
    endpoints: &Endpoints,
) -> Result<bool, PortalError> {
    Ok(shows_signed_in(
        &fetch_calendar_page(session, endpoints).await?.body,
    ))
}

pub(crate) async fn fetch_calendar_page(
    session: &Session,
    endpoints: &Endpoints,
) -> Result<Page, PortalError> {
    session
        .fetch(
            session
                .client()
                .get(endpoints.calendar_page())
                .timeout(PAGE_TIMEOUT),
        )
        .await
}

/// Run the full login sequence on a fresh cookie jar and report whether the
/// session ended up authenticated.
pub async fn login(
    session: &mut Session,
    endpoints: &Endpoints,
    credentials: &Credentials,
    category: AccountCategory,
) -> Result<bool, PortalError> {
    session.reset()?;

    let params = fetch_login_parameters(session, endpoints).await?;
    debug!(
        has_waction = params.waction.is_some(),
        "Login parameters extracted"
    );

    let scheme = category.scheme();
    info!(
        account = %credentials.masked_id(),
        category = %category,
        scheme = ?scheme,
        "Submitting credentials"
    );

    let request = scheme.request(credentials, &params, endpoints);
    let page = session
        .fetch(request.into_builder(session.client(), endpoints))
        .await?;

    if let LoginScheme::Delegated { .. } = scheme {
        complete_sso_handshake(session, endpoints, &page).await;
    }

    is_authenticated(session, endpoints).await
}

/// Best-effort follow-ups after the SSO POST. Failures are logged only; the
/// verifier decides whether the handshake worked.
async fn complete_sso_handshake(session: &Session, endpoints: &Endpoints, page: &Page) {
    if let Some(target) = find_script_redirect(&page.body) {
        match page.url.join(&target) {
            Ok(url) => {
                let request = session.client().get(url).timeout(LONG_TIMEOUT);
                match session.fetch(request).await {
                    Ok(followed) => debug!(url = %followed.url, "Followed script redirect"),
                    Err(e) => warn!(error = ?e, "Script redirect failed"),
                }
            }
            Err(e) => warn!(redirect = %target, error = %e, "Unresolvable script redirect"),
        }
    }

    if !(endpoints.is_auth_host(&page.url) && page.body.contains(AUTO_SUBMIT_MARKER)) {
        return;
    }

    let Some(form) = AutoSubmitForm::find(&page.body) else {
        warn!("Auto-submit script present but confirmation form not found");
        return;
    };

    let action = match page.url.join(&form.action) {
        Ok(url) => url,
        Err(e) => {
            warn!(action = %form.action, error = %e, "Unresolvable confirmation form action");
            return;
        }
    };

    debug!(
        action = %action,
        fields = form.fields.len(),
        "Submitting SSO confirmation form"
    );
    let request = session
        .client()
        .post(action)
        .form(&form.fields)
        .timeout(LONG_TIMEOUT);
    match session.fetch(request).await {
        Ok(done) => debug!(url = %done.url, "SSO confirmation submitted"),
        Err(e) => warn!(error = ?e, "SSO confirmation submit failed"),
    }
}
