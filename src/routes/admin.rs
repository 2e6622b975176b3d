//! Admin console: a password-gated dashboard listing all users with a
//! one-click fixed point grant per user. The grant goes straight through the
//! store, bypassing the economy service's cooldown rules; that is the
//! intended administrative override.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::request::Parts,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::db::{User, UserRepository};
use crate::error::{AppError, AppResult};
use crate::AppState;

/// Fixed grant applied by the dashboard's "auto-farm" button.
pub const AUTO_FARM_POINTS: i64 = 1000;

const SESSION_COOKIE: &str = "admin_session";

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin", get(login_page))
        .route("/admin/login", post(login))
        .route("/admin/dashboard", get(dashboard))
        .route("/admin/auto-farm/:telegram_id", post(auto_farm))
        .route("/admin/logout", get(logout))
}

// ============================================================================
// Session cookie (HS256 token carried in an HttpOnly cookie)
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    sub: String,
    iat: usize,
    exp: usize,
}

fn issue_session(config: &Config) -> AppResult<String> {
    let now = Utc::now();
    let claims = SessionClaims {
        sub: "admin".to_string(),
        iat: now.timestamp() as usize,
        exp: (now + Duration::hours(config.admin.session_ttl_hours)).timestamp() as usize,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.admin.session_secret.as_bytes()),
    )
    .map_err(AppError::Jwt)?;
    Ok(token)
}

fn session_is_valid(config: &Config, jar: &CookieJar) -> bool {
    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        return false;
    };
    decode::<SessionClaims>(
        cookie.value(),
        &DecodingKey::from_secret(config.admin.session_secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims.sub == "admin")
    .unwrap_or(false)
}

/// Extractor guarding authenticated admin routes. Rejection is a redirect to
/// the login page, never an error body.
pub struct AdminSession;

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminSession {
    type Rejection = Redirect;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_request_parts(parts, state)
            .await
            .map_err(|_| Redirect::to("/admin"))?;

        if session_is_valid(&state.config, &jar) {
            Ok(AdminSession)
        } else {
            tracing::debug!("admin request without a valid session");
            Err(Redirect::to("/admin"))
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Debug, Deserialize)]
struct LoginPageQuery {
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    password: String,
}

async fn login_page(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<LoginPageQuery>,
) -> Response {
    if session_is_valid(&state.config, &jar) {
        return Redirect::to("/admin/dashboard").into_response();
    }
    let show_error = query.error.as_deref() == Some("invalid");
    Html(login_page_html(show_error)).into_response()
}

async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<(CookieJar, Redirect), AppError> {
    if form.password == state.config.admin.password {
        let token = issue_session(&state.config)?;
        let cookie = Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .build();
        Ok((jar.add(cookie), Redirect::to("/admin/dashboard")))
    } else {
        tracing::warn!("failed admin login attempt");
        Ok((jar, Redirect::to("/admin?error=invalid")))
    }
}

async fn dashboard(
    State(state): State<Arc<AppState>>,
    _session: AdminSession,
) -> Result<Html<String>, AppError> {
    let users = UserRepository::list_all(&state.db).await?;
    Ok(Html(dashboard_html(&users)))
}

/// The admin override: a fixed grant straight into the store, regardless of
/// cooldown state. An unknown id is a silent no-op, matching the store's
/// "absence is normal" contract.
async fn auto_farm(
    State(state): State<Arc<AppState>>,
    _session: AdminSession,
    Path(telegram_id): Path<i64>,
) -> Result<Redirect, AppError> {
    UserRepository::add_points(&state.db, telegram_id, AUTO_FARM_POINTS).await?;
    tracing::info!("admin granted {} points to {}", AUTO_FARM_POINTS, telegram_id);
    Ok(Redirect::to("/admin/dashboard"))
}

async fn logout(jar: CookieJar) -> (CookieJar, Redirect) {
    let removal = Cookie::build(SESSION_COOKIE).path("/").build();
    (jar.remove(removal), Redirect::to("/admin"))
}

// ============================================================================
// Inline views (no template engine in scope)
// ============================================================================

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn login_page_html(show_error: bool) -> String {
    let error_banner = if show_error {
        "<p class=\"error\">Invalid password</p>"
    } else {
        ""
    };
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<title>Grow Spark Admin</title>\n\
         <style>body{{font-family:sans-serif;max-width:24rem;margin:4rem auto}}.error{{color:#c00}}</style>\n\
         </head>\n<body>\n<h1>Admin Login</h1>\n{}\n\
         <form method=\"post\" action=\"/admin/login\">\n\
         <input type=\"password\" name=\"password\" placeholder=\"Password\" autofocus>\n\
         <button type=\"submit\">Log in</button>\n</form>\n</body>\n</html>",
        error_banner
    )
}

fn dashboard_html(users: &[User]) -> String {
    let mut rows = String::new();
    for user in users {
        let last_farm = user
            .last_farm
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td>\
             <td><form method=\"post\" action=\"/admin/auto-farm/{}\">\
             <button type=\"submit\">Grant {}</button></form></td></tr>\n",
            user.telegram_id,
            escape_html(&user.username),
            user.points,
            user.referrals,
            last_farm,
            user.created_at.format("%Y-%m-%d %H:%M"),
            user.telegram_id,
            AUTO_FARM_POINTS,
        ));
    }

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<title>Grow Spark Admin</title>\n\
         <style>body{{font-family:sans-serif;margin:2rem}}table{{border-collapse:collapse}}\
         td,th{{border:1px solid #ccc;padding:0.3rem 0.6rem}}</style>\n\
         </head>\n<body>\n<h1>Users</h1>\n<p><a href=\"/admin/logout\">Log out</a></p>\n\
         <table>\n<tr><th>Telegram ID</th><th>Username</th><th>Points</th>\
         <th>Referrals</th><th>Last farm</th><th>Created</th><th></th></tr>\n{}\
         </table>\n</body>\n</html>",
        rows
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::memory_pool;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn test_state() -> Arc<AppState> {
        let pool = memory_pool().await;
        let mut config = Config::default();
        config.admin.password = "hunter2".to_string();
        config.admin.session_secret = "test-secret".to_string();
        Arc::new(AppState { db: pool, config })
    }

    fn app(state: Arc<AppState>) -> Router {
        router().with_state(state)
    }

    async fn login_cookie(state: Arc<AppState>) -> String {
        let res = app(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/admin/login")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("password=hunter2"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        let set_cookie = res.headers()[header::SET_COOKIE].to_str().unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    #[tokio::test]
    async fn login_page_shows_form() {
        let state = test_state().await;
        let res = app(state)
            .oneshot(Request::builder().uri("/admin").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = res.into_body().collect().await.unwrap().to_bytes();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("Admin Login"));
        assert!(!html.contains("Invalid password"));
    }

    #[tokio::test]
    async fn wrong_password_redirects_with_error() {
        let state = test_state().await;
        let res = app(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/admin/login")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("password=wrong"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers()[header::LOCATION], "/admin?error=invalid");
        assert!(res.headers().get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn dashboard_requires_session() {
        let state = test_state().await;
        let res = app(state)
            .oneshot(
                Request::builder()
                    .uri("/admin/dashboard")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers()[header::LOCATION], "/admin");
    }

    #[tokio::test]
    async fn dashboard_lists_users_after_login() {
        let state = test_state().await;
        let now = Utc::now().naive_utc();
        UserRepository::create_if_absent(&state.db, 42, "alice", now)
            .await
            .unwrap();

        let cookie = login_cookie(state.clone()).await;
        let res = app(state)
            .oneshot(
                Request::builder()
                    .uri("/admin/dashboard")
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = res.into_body().collect().await.unwrap().to_bytes();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("alice"));
        assert!(html.contains("/admin/auto-farm/42"));
    }

    #[tokio::test]
    async fn auto_farm_grants_fixed_bonus_regardless_of_cooldown() {
        let state = test_state().await;
        let now = Utc::now().naive_utc();
        UserRepository::create_if_absent(&state.db, 42, "alice", now)
            .await
            .unwrap();
        // A fresh farm stamp does not block the admin grant.
        UserRepository::try_grant_farm(&state.db, 42, 100, now, now)
            .await
            .unwrap();

        let cookie = login_cookie(state.clone()).await;
        let res = app(state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/admin/auto-farm/42")
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers()[header::LOCATION], "/admin/dashboard");

        let user = UserRepository::find_by_telegram_id(&state.db, 42)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.points, 1100);
    }

    #[tokio::test]
    async fn auto_farm_requires_session() {
        let state = test_state().await;
        let res = app(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/admin/auto-farm/42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers()[header::LOCATION], "/admin");
    }

    #[tokio::test]
    async fn logout_clears_session() {
        let state = test_state().await;
        let cookie = login_cookie(state.clone()).await;
        let res = app(state)
            .oneshot(
                Request::builder()
                    .uri("/admin/logout")
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers()[header::LOCATION], "/admin");
        let set_cookie = res.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(set_cookie.starts_with("admin_session="));
    }

    #[test]
    fn escape_html_neutralizes_markup() {
        assert_eq!(
            escape_html("<script>\"&\"</script>"),
            "&lt;script&gt;&quot;&amp;&quot;&lt;/script&gt;"
        );
    }

    #[test]
    fn session_round_trip() {
        let mut config = Config::default();
        config.admin.session_secret = "test-secret".to_string();

        let token = issue_session(&config).unwrap();
        let jar = CookieJar::new().add(Cookie::new(SESSION_COOKIE, token));
        assert!(session_is_valid(&config, &jar));

        // A token signed with a different secret is rejected.
        let mut other = Config::default();
        other.admin.session_secret = "other-secret".to_string();
        assert!(!session_is_valid(&other, &jar));
    }
}
