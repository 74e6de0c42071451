//! Cookie- and CSRF-aware HTTP session against the site.
//!
//! Every page parsed through [`Session::parse`] refreshes the CSRF state from
//! its `<meta name="csrf-param">` / `<meta name="csrf-token">` tags. A token is
//! handed out once and then forgotten, so each mutation uses the token of the
//! most recently parsed page, or of a fresh home page fetch when none is held.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Client, Method, RequestBuilder};
use scraper::Html;
use tracing::{debug, info, instrument};
use url::Url;

use storygraph_shared::{Result, SessionConfig, StoryGraphError};

use crate::form::{Fields, Form, MethodLink};
use crate::markup::{main_html, select_first, selector};
use crate::pager::{FromFragment, Pager};

/// Name of the site's session cookie.
pub const SESSION_COOKIE: &str = "_storygraph_session";

/// Form field carrying the token when the site never advertised one.
const DEFAULT_CSRF_PARAM: &str = "authenticity_token";

/// Header carrying the token on script-style form posts.
const CSRF_HEADER: &str = "X-CSRF-Token";

/// Sign-in page and form action.
const SIGN_IN_PATH: &str = "/users/sign_in";

/// User-Agent string for all requests.
const USER_AGENT: &str = concat!("storygraph/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Page
// ---------------------------------------------------------------------------

/// A successfully fetched response, after redirects.
#[derive(Debug, Clone)]
pub struct Page {
    /// Final URL.
    pub url: Url,
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: String,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct CsrfState {
    param: Option<String>,
    token: Option<String>,
}

struct Inner {
    client: Client,
    jar: Arc<Jar>,
    base_url: Url,
    csrf: Mutex<CsrfState>,
    username: Mutex<Option<String>>,
}

/// Handle to one logged-in (or anonymous) browsing session.
///
/// Clones share the cookie jar, CSRF state and username.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.inner.base_url.as_str())
            .field("username", &self.username())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session with an empty cookie jar.
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .cookie_provider(jar.clone())
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StoryGraphError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                jar,
                base_url: config.base_url.clone(),
                csrf: Mutex::new(CsrfState::default()),
                username: Mutex::new(None),
            }),
        })
    }

    /// Origin all paths are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Username discovered by the last successful [`login`](Self::login).
    pub fn username(&self) -> Option<String> {
        lock(&self.inner.username).clone()
    }

    /// Resolve a site path (or absolute URL) against the base URL.
    ///
    /// Site paths are absolute, so only the origin of the base URL survives.
    pub fn url(&self, path: &str) -> Result<Url> {
        self.inner
            .base_url
            .join(path)
            .map_err(|e| StoryGraphError::parse(format!("invalid path {path:?}: {e}")))
    }

    // -- cookies ------------------------------------------------------------

    /// Current value of the session cookie, if the jar holds one.
    pub fn cookie(&self) -> Option<String> {
        let header = self.inner.jar.cookies(&self.inner.base_url)?;
        let header = header.to_str().ok()?;
        header
            .split(';')
            .map(str::trim)
            .find_map(|pair| pair.strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
            .map(str::to_string)
    }

    /// Plant a previously saved session cookie.
    pub fn set_cookie(&self, value: &str) {
        let cookie = format!("{SESSION_COOKIE}={value}; Path=/");
        self.inner.jar.add_cookie_str(&cookie, &self.inner.base_url);
        debug!("restored session cookie");
    }

    // -- requests -----------------------------------------------------------

    /// Send an arbitrary request to a site path.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        build: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> Result<Page> {
        let url = self.url(path)?;
        let request = build(self.inner.client.request(method.clone(), url.clone()));
        self.send(&method, &url, request).await
    }

    /// GET a site path.
    pub async fn get(&self, path: &str) -> Result<Page> {
        self.get_query(path, &[]).await
    }

    /// GET a site path with extra query parameters.
    pub async fn get_query(&self, path: &str, query: &[(String, String)]) -> Result<Page> {
        self.request(Method::GET, path, |req| {
            if query.is_empty() { req } else { req.query(query) }
        })
        .await
    }

    /// POST urlencoded fields, optionally with a one-shot token in the CSRF header.
    pub async fn post(&self, path: &str, fields: &[(String, String)], csrf: bool) -> Result<Page> {
        let token = if csrf {
            Some(self.csrf_token().await?)
        } else {
            None
        };
        self.request(Method::POST, path, |req| {
            let req = req.form(fields);
            match token {
                Some(token) => req.header(CSRF_HEADER, token),
                None => req,
            }
        })
        .await
    }

    async fn send(&self, method: &Method, url: &Url, request: RequestBuilder) -> Result<Page> {
        debug!(%method, %url, "request");

        let response = request
            .send()
            .await
            .map_err(|e| StoryGraphError::Network(format!("{method} {url}: {e}")))?;

        let status = response.status();
        let final_url = response.url().clone();

        if !status.is_success() {
            return Err(StoryGraphError::Network(format!(
                "{method} {final_url}: HTTP {status}"
            )));
        }

        let body = response.text().await.map_err(|e| {
            StoryGraphError::Network(format!("{final_url}: body read failed: {e}"))
        })?;

        Ok(Page {
            url: final_url,
            status: status.as_u16(),
            body,
        })
    }

    // -- CSRF ---------------------------------------------------------------

    /// Parse a page, remembering any CSRF param/token it advertises.
    pub fn parse(&self, page: &Page) -> Html {
        let doc = Html::parse_document(&page.body);
        self.harvest_csrf(&doc);
        doc
    }

    fn harvest_csrf(&self, doc: &Html) {
        let meta = |name: &str| -> Option<String> {
            let sel = selector(&format!(r#"meta[name="{name}"]"#)).ok()?;
            doc.select(&sel)
                .next()
                .and_then(|el| el.value().attr("content"))
                .map(str::to_string)
        };

        let param = meta("csrf-param");
        let token = meta("csrf-token");

        let mut state = lock(&self.inner.csrf);
        if param.is_some() {
            state.param = param;
        }
        if token.is_some() {
            state.token = token;
        }
    }

    /// Take the held CSRF token, fetching the home page if none is held.
    ///
    /// The token is forgotten once returned.
    pub async fn csrf_token(&self) -> Result<String> {
        if let Some(token) = self.take_token() {
            return Ok(token);
        }

        debug!("no CSRF token held, fetching home page");
        let page = self.get("/").await?;
        self.parse(&page);

        self.take_token()
            .ok_or_else(|| StoryGraphError::Csrf("no CSRF token".into()))
    }

    fn take_token(&self) -> Option<String> {
        lock(&self.inner.csrf).token.take()
    }

    fn csrf_param(&self) -> String {
        lock(&self.inner.csrf)
            .param
            .clone()
            .unwrap_or_else(|| DEFAULT_CSRF_PARAM.to_string())
    }

    // -- forms and links ----------------------------------------------------

    /// Replay a `data-method` link as a POST with `_method` and a CSRF field.
    #[instrument(skip_all, fields(href = %link.href, verb = %link.verb))]
    pub async fn follow(&self, link: &MethodLink) -> Result<Page> {
        let token = self.csrf_token().await?;
        let fields = vec![
            ("_method".to_string(), link.verb.clone()),
            (self.csrf_param(), token),
        ];
        self.post(&link.href, &fields, false).await
    }

    /// Submit a harvested form with `overrides` layered over its defaults.
    #[instrument(skip_all, fields(action = %form.action))]
    pub async fn submit(&self, form: &Form, overrides: Fields, csrf: bool) -> Result<Page> {
        let data = form.fill(overrides);
        self.post(&form.action, &data, csrf).await
    }

    /// GET a page and return the outer HTML of its `<main>` element.
    pub async fn fetch_main(&self, path: &str) -> Result<String> {
        let page = self.get(path).await?;
        let doc = self.parse(&page);
        main_html(&doc)
    }

    /// Lazily page through a listing.
    ///
    /// `container` is the class of the element whose direct `div` children are
    /// the items; `query` is only sent with the first request, later pages
    /// follow the `#next_link` href verbatim.
    pub fn paged<T: FromFragment>(
        &self,
        path: &str,
        container: &str,
        query: Vec<(String, String)>,
    ) -> Pager<T> {
        Pager::new(self.clone(), path, container, query)
    }

    // -- login --------------------------------------------------------------

    /// Sign in (unless the cookie is still good) and discover the username.
    #[instrument(skip_all)]
    pub async fn login(&self, email: &str, password: &str) -> Result<String> {
        let page = self.get(SIGN_IN_PATH).await?;

        let page = if page.url.path().ends_with(SIGN_IN_PATH) {
            let form = {
                let doc = self.parse(&page);
                Form::find(&doc, &format!(r#"form[action="{SIGN_IN_PATH}"]"#))?
            };
            debug!("submitting sign-in form");
            let overrides = vec![
                ("user[email]".to_string(), email.to_string()),
                ("user[password]".to_string(), password.to_string()),
            ];
            self.submit(&form, overrides, false).await?
        } else {
            debug!(url = %page.url, "session cookie still valid");
            page
        };

        let username = {
            let doc = self.parse(&page);
            profile_username(&doc)?
        }
        .ok_or_else(|| StoryGraphError::Auth("no username".into()))?;

        *lock(&self.inner.username) = Some(username.clone());
        info!(%username, "logged in");
        Ok(username)
    }
}

/// Username from the first `/profile/<name>` link in the page's `<nav>`.
fn profile_username(doc: &Html) -> Result<Option<String>> {
    let nav = select_first(doc, "nav")?
        .ok_or_else(|| StoryGraphError::parse("page has no <nav> element"))?;

    Ok(nav
        .select(&selector("a[href]")?)
        .filter_map(|a| a.value().attr("href"))
        .find(|href| href.starts_with("/profile/"))
        .and_then(|href| href.rsplit('/').next())
        .map(str::to_string))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn page_with_token(token: &str, body: &str) -> String {
        format!(
            r#"<html><head>
                <meta name="csrf-param" content="authenticity_token">
                <meta name="csrf-token" content="{token}">
            </head><body>{body}</body></html>"#
        )
    }

    fn signed_in_page(token: &str) -> String {
        page_with_token(
            token,
            r#"<nav><a href="/">Home</a><a href="/profile/alice">Profile</a></nav><main></main>"#,
        )
    }

    fn session_for(server: &MockServer) -> Session {
        let config = SessionConfig::for_base_url(Url::parse(&server.uri()).unwrap());
        Session::new(&config).unwrap()
    }

    #[tokio::test]
    async fn csrf_token_is_consumed_once() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/books/1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(page_with_token("page-token", "")),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(page_with_token("home-token", "")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let session = session_for(&server);
        let page = session.get("/books/1").await.unwrap();
        session.parse(&page);

        assert_eq!(session.csrf_token().await.unwrap(), "page-token");
        // Token consumed; next call has to fetch the home page.
        assert_eq!(session.csrf_token().await.unwrap(), "home-token");
    }

    #[tokio::test]
    async fn csrf_token_missing_everywhere() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let session = session_for(&server);
        let err = session.csrf_token().await.unwrap_err();
        assert!(matches!(err, StoryGraphError::Csrf(_)));
    }

    #[tokio::test]
    async fn post_with_csrf_header() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page_with_token("tok", "")))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/update-progress"))
            .and(header("X-CSRF-Token", "tok"))
            .and(body_string_contains("read_status%5Bprogress_number%5D=42"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let session = session_for(&server);
        let fields = vec![("read_status[progress_number]".to_string(), "42".to_string())];
        let page = session.post("/update-progress", &fields, true).await.unwrap();
        assert_eq!(page.body, "ok");
    }

    #[tokio::test]
    async fn follow_sends_method_and_token() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page_with_token("tok", "")))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/journal_entries/7"))
            .and(body_string_contains("_method=delete"))
            .and(body_string_contains("authenticity_token=tok"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let session = session_for(&server);
        let link = MethodLink {
            href: "/journal_entries/7".into(),
            verb: "delete".into(),
        };
        session.follow(&link).await.unwrap();
    }

    #[tokio::test]
    async fn error_status_is_network_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let session = session_for(&server);
        let err = session.get("/missing").await.unwrap_err();
        assert!(matches!(err, StoryGraphError::Network(_)));
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn login_submits_sign_in_form() {
        let server = MockServer::start().await;

        let sign_in = page_with_token(
            "login-token",
            r#"<main><form action="/users/sign_in" method="post">
                <input type="hidden" name="authenticity_token" value="login-token">
                <input type="email" name="user[email]">
                <input type="password" name="user[password]">
                <input type="checkbox" name="user[remember_me]" value="1">
            </form></main>"#,
        );

        Mock::given(method("GET"))
            .and(path("/users/sign_in"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sign_in))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/users/sign_in"))
            .and(body_string_contains("user%5Bemail%5D=reader%40example.com"))
            .and(body_string_contains("user%5Bpassword%5D=secret"))
            .and(body_string_contains("authenticity_token=login-token"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", "/home")
                    .insert_header("Set-Cookie", "_storygraph_session=fresh; Path=/"),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/home"))
            .respond_with(ResponseTemplate::new(200).set_body_string(signed_in_page("t")))
            .mount(&server)
            .await;

        let session = session_for(&server);
        let username = session.login("reader@example.com", "secret").await.unwrap();

        assert_eq!(username, "alice");
        assert_eq!(session.username().as_deref(), Some("alice"));
        assert_eq!(session.cookie().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn login_skips_form_when_cookie_valid() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/users/sign_in"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/"))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(signed_in_page("t")))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let session = session_for(&server);
        session.set_cookie("saved");
        assert_eq!(session.cookie().as_deref(), Some("saved"));

        let username = session.login("reader@example.com", "secret").await.unwrap();
        assert_eq!(username, "alice");
    }

    #[tokio::test]
    async fn login_without_profile_link_fails() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/users/sign_in"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/"))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html><body><nav><a href=\"/\">Home</a></nav></body></html>"),
            )
            .mount(&server)
            .await;

        let session = session_for(&server);
        let err = session.login("a@b.c", "pw").await.unwrap_err();
        assert!(matches!(err, StoryGraphError::Auth(_)));
        assert!(session.username().is_none());
    }

    #[tokio::test]
    async fn fetch_main_returns_main_element() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/books/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<html><body><nav></nav><main><h3>Dune</h3></main></body></html>",
            ))
            .mount(&server)
            .await;

        let session = session_for(&server);
        let main = session.fetch_main("/books/abc").await.unwrap();
        assert_eq!(main, "<main><h3>Dune</h3></main>");
    }
}
