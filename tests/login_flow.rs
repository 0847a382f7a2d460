//! Login, catalog and event fetches against an in-process fake portal.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{Form, Query, State};
use axum::http::{HeaderMap, header};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::NaiveDate;
use spacecrawl::portal::{
    AccountCategory, BookingPortal, Credentials, Endpoints, PortalError, SpacePortal,
};

const PASSWORD: &str = "s3cret!";

#[derive(Debug, Clone)]
struct Hit {
    method: &'static str,
    path: String,
    params: HashMap<String, String>,
}

#[derive(Clone)]
struct FakePortal {
    hits: Arc<Mutex<Vec<Hit>>>,
    serve_login_form: bool,
    accepted_password: Arc<Mutex<String>>,
}

impl FakePortal {
    fn record(&self, method: &'static str, path: &str, params: HashMap<String, String>) {
        self.hits.lock().unwrap().push(Hit {
            method,
            path: path.to_owned(),
            params,
        });
    }

    fn accepts(&self, password: &str) -> bool {
        *self.accepted_password.lock().unwrap() == password
    }

    fn set_password(&self, password: &str) {
        *self.accepted_password.lock().unwrap() = password.to_owned();
    }

    fn hits(&self) -> Vec<Hit> {
        self.hits.lock().unwrap().clone()
    }
}

type Params = HashMap<String, String>;

fn signed_in(headers: &HeaderMap) -> bool {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|c| c.contains("sess=ok"))
}

async fn index_page(
    State(fake): State<FakePortal>,
    Query(query): Query<Params>,
    headers: HeaderMap,
) -> Html<String> {
    fake.record("GET", "/index.php", query.clone());

    if query.get("mid").map(String::as_str) == Some("K06") {
        return Html(if signed_in(&headers) {
            r#"<html><head><title>공간대관</title></head><body><li class="usertab04on"><a>로그아웃</a></li></body></html>"#.to_owned()
        } else {
            "<html><head><title>로그인이 필요합니다</title></head><body>login</body></html>".to_owned()
        });
    }

    if !fake.serve_login_form {
        return Html("<html><body>maintenance</body></html>".to_owned());
    }
    Html(
        r#"<html><body>
        <form name="fflogin" method="post">
          <input type="hidden" name="keyid" value="KEY-1">
          <input type="hidden" name="returl" value="/index.php?mid=K06">
          <input type="text" name="id">
        </form></body></html>"#
            .to_owned(),
    )
}

async fn direct_login(
    State(fake): State<FakePortal>,
    Query(query): Query<Params>,
    Form(form): Form<Params>,
) -> impl IntoResponse {
    let ok = query.get("mid").map(String::as_str) == Some("K00")
        && form.get("gpwd").is_some_and(|pw| fake.accepts(pw));
    fake.record("POST", "/index.php", form);

    let cookie = if ok { "sess=ok; Path=/" } else { "sess=no; Path=/" };
    ([(header::SET_COOKIE, cookie)], Html("<script>history.back();</script>"))
}

async fn sso_login(
    State(fake): State<FakePortal>,
    Query(query): Query<Params>,
    Form(form): Form<Params>,
) -> Html<String> {
    let ok = query.get("req_key").map(String::as_str) == Some("KEY-1")
        && form
            .get("pw")
            .and_then(|pw| BASE64.decode(pw).ok())
            .and_then(|pw| String::from_utf8(pw).ok())
            .is_some_and(|pw| fake.accepts(&pw));
    let mut params = query;
    params.extend(form);
    fake.record("POST", "/lauth/YLLOGIN.do", params);

    if !ok {
        return Html("<script>alert('로그인 실패');</script>".to_owned());
    }
    Html(
        r#"<html><body>
        <script>location.href = '/lauth/relay';</script>
        <form name="Chk" method="post" action="/lauth/confirm">
          <input type="hidden" name="token" value="T-9">
        </form>
        <script>document.Chk.submit();</script>
        </body></html>"#
            .to_owned(),
    )
}

async fn sso_relay(State(fake): State<FakePortal>) -> Html<&'static str> {
    fake.record("GET", "/lauth/relay", Params::new());
    Html("<html><body>relay</body></html>")
}

async fn sso_confirm(State(fake): State<FakePortal>, Form(form): Form<Params>) -> impl IntoResponse {
    let ok = form.get("token").map(String::as_str) == Some("T-9");
    fake.record("POST", "/lauth/confirm", form);

    let cookie = if ok { "sess=ok; Path=/" } else { "sess=no; Path=/" };
    ([(header::SET_COOKIE, cookie)], Html("<html><body>done</body></html>"))
}

async fn ajax_options(State(fake): State<FakePortal>, Form(form): Form<Params>) -> Html<String> {
    let act = form.get("act").cloned().unwrap_or_default();
    fake.record("POST", "/ys_ajax.php", form);

    Html(match act.as_str() {
        "getUserBuilding4" => r#"<option value="">-- 선택 --</option><option value="B1">백양관</option><option value="B2">공학관</option>"#.to_owned(),
        "getUserRoomB" => r#"<option value="">-- 선택 --</option><option value="R1">101호</option>"#.to_owned(),
        _ => String::new(),
    })
}

async fn ajax_events(State(fake): State<FakePortal>, Query(query): Query<Params>) -> impl IntoResponse {
    let uid = query.get("uid").cloned().unwrap_or_default();
    fake.record("GET", "/ys_ajax.php", query);

    if uid == "R1" {
        (
            [(header::CONTENT_TYPE, "application/json")],
            r##"[{"id":"5","title":" 동아리 ","start":"1756684800","end":1756688400,"color":"#f00","textColor":"#fff"}]"##,
        )
    } else {
        ([(header::CONTENT_TYPE, "text/html")], "<html>세션이 만료되었습니다</html>")
    }
}

async fn serve(serve_login_form: bool) -> (FakePortal, SocketAddr) {
    let fake = FakePortal {
        hits: Arc::default(),
        serve_login_form,
        accepted_password: Arc::new(Mutex::new(PASSWORD.to_owned())),
    };
    let app = Router::new()
        .route("/index.php", get(index_page).post(direct_login))
        .route("/lauth/YLLOGIN.do", post(sso_login))
        .route("/lauth/relay", get(sso_relay))
        .route("/lauth/confirm", post(sso_confirm))
        .route("/ys_ajax.php", get(ajax_events).post(ajax_options))
        .with_state(fake.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (fake, addr)
}

fn portal(addr: SocketAddr, category: AccountCategory, password: &str) -> SpacePortal {
    let base = format!("http://{addr}");
    let endpoints = Endpoints::new(&base, &format!("{base}/lauth/YLLOGIN.do")).unwrap();
    let credentials = Credentials::new("ab2021", password).unwrap();
    SpacePortal::new(endpoints, credentials, category).unwrap()
}

#[tokio::test]
async fn registered_group_posts_directly_to_portal() {
    let (fake, addr) = serve(true).await;
    let mut portal = portal(addr, AccountCategory::RegisteredGroup, PASSWORD);

    assert!(portal.login().await.unwrap());

    let hits = fake.hits();
    assert!(hits.iter().all(|h| !h.path.starts_with("/lauth")));
    let post = hits.iter().find(|h| h.method == "POST").unwrap();
    let mut fields: Vec<_> = post.params.keys().cloned().collect();
    fields.sort();
    assert_eq!(fields, ["act", "gOpt", "gid", "gpwd"]);
    assert_eq!(post.params["gOpt"], "D");
    assert_eq!(post.params["gid"], "ab2021");
}

#[tokio::test]
async fn delegated_login_completes_sso_handshake() {
    let (fake, addr) = serve(true).await;
    let mut portal = portal(addr, AccountCategory::Undergraduate, PASSWORD);

    assert!(portal.login().await.unwrap());

    let hits = fake.hits();
    let sso = hits.iter().find(|h| h.path == "/lauth/YLLOGIN.do").unwrap();
    assert_eq!(sso.params["req_key"], "KEY-1");
    assert_eq!(sso.params["id"], BASE64.encode("AB2021"));
    assert_eq!(sso.params["gOpt"], "A");
    assert_eq!(sso.params["act"], "lok");
    assert!(hits.iter().any(|h| h.path == "/lauth/relay"));
    let confirm = hits.iter().find(|h| h.path == "/lauth/confirm").unwrap();
    assert_eq!(confirm.params["token"], "T-9");
}

#[tokio::test]
async fn wrong_password_is_reported_as_not_authenticated() {
    let (fake, addr) = serve(true).await;
    let mut portal = portal(addr, AccountCategory::Graduate, "nope");

    assert!(!portal.login().await.unwrap());
    assert!(fake.hits().iter().all(|h| h.path != "/lauth/confirm"));
    assert_eq!(
        portal.calendar_title().await.unwrap().as_deref(),
        Some("로그인이 필요합니다")
    );
}

#[tokio::test]
async fn relogin_starts_from_an_empty_cookie_jar() {
    let (fake, addr) = serve(true).await;
    let mut portal = portal(addr, AccountCategory::Undergraduate, PASSWORD);
    assert!(portal.login().await.unwrap());

    // The account password changes server-side; the old session cookie must not carry over
    fake.set_password("rotated");
    assert!(!portal.login().await.unwrap());
    assert_eq!(
        portal.calendar_title().await.unwrap().as_deref(),
        Some("로그인이 필요합니다")
    );
}

#[tokio::test]
async fn missing_login_form_is_an_extraction_error() {
    let (_fake, addr) = serve(false).await;
    let mut portal = portal(addr, AccountCategory::Undergraduate, PASSWORD);

    let err = portal.login().await.unwrap_err();
    assert!(matches!(err, PortalError::Extraction(_)), "{err:?}");
}

#[tokio::test]
async fn catalog_and_events_after_login() {
    let (fake, addr) = serve(true).await;
    let mut portal = portal(addr, AccountCategory::RegisteredGroup, PASSWORD);
    assert!(portal.login().await.unwrap());
    portal.prepare_calendar().await.unwrap();

    let buildings = portal.list_buildings("SC").await.unwrap();
    let ids: Vec<_> = buildings.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, ["B1", "B2"]);
    assert_eq!(buildings[0].name, "백양관");

    let rooms = portal.list_rooms("SC", "B1").await.unwrap();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].uid, "R1");

    let room_post = fake
        .hits()
        .into_iter()
        .find(|h| h.params.get("act").map(String::as_str) == Some("getUserRoomB"))
        .unwrap();
    assert_eq!(room_post.params["a"], "SC");
    assert_eq!(room_post.params["b"], "B1");

    let monday = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
    let sunday = NaiveDate::from_ymd_opt(2025, 9, 7).unwrap();
    let events = portal.fetch_events("R1", monday, sunday).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].bounds().unwrap(), (1_756_684_800, 1_756_688_400));

    let query = fake
        .hits()
        .into_iter()
        .find(|h| h.method == "GET" && h.path == "/ys_ajax.php")
        .unwrap();
    assert_eq!(query.params["act"], "bookingstatus3");
    // 2025-09-01 00:00 KST to 2025-09-08 00:00 KST
    assert_eq!(query.params["start"], "1756652400");
    assert_eq!(query.params["end"], "1757257200");
}

#[tokio::test]
async fn non_json_event_body_is_a_format_error() {
    let (_fake, addr) = serve(true).await;
    let mut portal = portal(addr, AccountCategory::RegisteredGroup, PASSWORD);
    assert!(portal.login().await.unwrap());

    let monday = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
    let sunday = NaiveDate::from_ymd_opt(2025, 9, 7).unwrap();
    let err = portal.fetch_events("R-GONE", monday, sunday).await.unwrap_err();
    assert!(matches!(err, PortalError::Format { .. }), "{err:?}");
}
