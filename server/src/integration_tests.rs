//! Integration tests for Raidbot — cross-layer tests that drive the REST
//! router end to end: login, raid commands, long polling and the notices
//! forwarded to the chat platform.
//!
//! Each test builds its own engine and router so tests are fully isolated.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use axum::response::Response;
    use chrono::Utc;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    use crate::auth::config::AuthConfig;
    use crate::auth::token::{api_key, create_session_token, login_signature};
    use crate::engine::outcome::Notice;
    use crate::engine::raid_engine::RaidEngine;
    use crate::slack::SlackNotifier;
    use crate::web::app_state::AppState;
    use crate::web::router::build_router;

    const LOGIN_SECRET: &str = "test-login-secret";
    const SESSION_SECRET: &str = "test-session-secret";

    // ── Helpers ──────────────────────────────────────────────────

    struct Harness {
        app: Router,
        engine: Arc<RaidEngine>,
        notices: mpsc::Receiver<Notice>,
    }

    fn setup_with_poll_timeout(long_poll_timeout: Duration) -> Harness {
        let engine = Arc::new(RaidEngine::new(
            vec!["admin".to_string()],
            chrono::Duration::hours(6),
        ));
        let (slack, notices) = SlackNotifier::detached(64);
        let state = Arc::new(AppState {
            engine: engine.clone(),
            slack,
            auth_config: AuthConfig {
                login_secret: LOGIN_SECRET.into(),
                session_secret: SESSION_SECRET.into(),
                session_expiry_hours: 1,
                login_max_age_secs: 300,
                public_url: "http://localhost:8080".into(),
            },
            slash_command: "/raid".into(),
            login_redirect: "/team/".into(),
            long_poll_timeout,
        });
        Harness {
            app: build_router(state, "www"),
            engine,
            notices,
        }
    }

    fn setup() -> Harness {
        setup_with_poll_timeout(Duration::from_secs(5))
    }

    /// A session cookie whose API key was minted `age_secs` ago.
    fn cookie_for(user: &str, age_secs: i64) -> String {
        let key = api_key(LOGIN_SECRET, user, Utc::now().timestamp() - age_secs, 0);
        let jwt = create_session_token(user, &key, SESSION_SECRET, 1).unwrap();
        format!("raidbot_session={jwt}")
    }

    async fn command(app: &Router, user: &str, action: &str, channel: &str, raid: &str) -> Response {
        let req = Request::builder()
            .method("POST")
            .uri(format!("/rest/raid/{action}"))
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::COOKIE, cookie_for(user, 0))
            .body(Body::from(format!("channel={channel}&raid={raid}")))
            .unwrap();
        app.clone().oneshot(req).await.unwrap()
    }

    async fn get(app: &Router, uri: &str, cookie: Option<&str>) -> Response {
        let mut req = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            req = req.header(header::COOKIE, cookie);
        }
        app.clone()
            .oneshot(req.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_text(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        serde_json::from_str(&body_text(resp).await).unwrap()
    }

    fn drain(rx: &mut mpsc::Receiver<Notice>) -> Vec<Notice> {
        let mut out = Vec::new();
        while let Ok(n) = rx.try_recv() {
            out.push(n);
        }
        out
    }

    // ═══════════════════════════════════════════════════════════════
    //  1. Login
    // ═══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn test_signed_login_sets_session_and_redirects() {
        let h = setup();
        let t = Utc::now().timestamp() - 5;
        let sig = login_signature(LOGIN_SECRET, "alice", t);

        let resp = get(
            &h.app,
            &format!("/rest/login?username=alice&t={t}&signature={sig}"),
            None,
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers()[header::LOCATION], "/team/");
        let cookie = resp.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("raidbot_session="));

        // The issued cookie is good for raid commands.
        let session = cookie.split(';').next().unwrap().to_string();
        let req = Request::builder()
            .method("POST")
            .uri("/rest/raid/host")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::COOKIE, session)
            .body(Body::from("channel=chan&raid=op1"))
            .unwrap();
        let resp = h.app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_login_rejections() {
        let h = setup();
        let now = Utc::now().timestamp();

        let sig = login_signature(LOGIN_SECRET, "alice", now);
        let resp = get(
            &h.app,
            &format!("/rest/login?username=mallory&t={now}&signature={sig}"),
            None,
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let old = now - 600;
        let sig = login_signature(LOGIN_SECRET, "alice", old);
        let resp = get(
            &h.app,
            &format!("/rest/login?username=alice&t={old}&signature={sig}"),
            None,
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let future = now + 600;
        let sig = login_signature(LOGIN_SECRET, "alice", future);
        let resp = get(
            &h.app,
            &format!("/rest/login?username=alice&t={future}&signature={sig}"),
            None,
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = get(&h.app, "/rest/login?username=alice&t=soon&signature=x", None).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = get(
            &h.app,
            &format!("/rest/login?username=alice&t={}&signature=00", i64::MIN),
            None,
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_check_reports_user_and_command() {
        let h = setup();

        let resp = get(&h.app, "/rest/login/check", None).await;
        let json = body_json(resp).await;
        assert_eq!(json["cmd"], "/raid");
        assert!(json.get("username").is_none());

        let cookie = cookie_for("alice", 0);
        let resp = get(&h.app, "/rest/login/check", Some(&cookie)).await;
        assert!(resp.headers().contains_key(header::SET_COOKIE));
        let json = body_json(resp).await;
        assert_eq!(json["username"], "alice");
    }

    #[tokio::test]
    async fn test_logout_clears_cookie() {
        let h = setup();
        let resp = get(&h.app, "/rest/login/logout", Some(&cookie_for("alice", 0))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let cookie = resp.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.contains("Max-Age=0"));
    }

    // ═══════════════════════════════════════════════════════════════
    //  2. Command authentication
    // ═══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn test_command_requires_session() {
        let h = setup();
        let req = Request::builder()
            .method("POST")
            .uri("/rest/raid/host")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("channel=chan&raid=op1"))
            .unwrap();
        let resp = h.app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(h.engine.registry().raid_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_api_key_is_rejected() {
        let h = setup();
        let req = Request::builder()
            .method("POST")
            .uri("/rest/raid/host")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::COOKIE, cookie_for("alice", 11 * 3600))
            .body(Body::from("channel=chan&raid=op1"))
            .unwrap();
        let resp = h.app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_commands_only_accept_post() {
        let h = setup();
        let resp = get(&h.app, "/rest/raid/join", Some(&cookie_for("alice", 0))).await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    // ═══════════════════════════════════════════════════════════════
    //  3. Raid lifecycle over REST
    // ═══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn test_register_join_finish_scenario() {
        let mut h = setup();

        let resp = command(&h.app, "alice", "host", "chan", "op1").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_text(resp).await, "Registered raid op1 on chan");

        let resp = command(&h.app, "bob", "join", "chan", "op1").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let roster = h.engine.registry().list_members("chan", "op1").unwrap();
        assert_eq!(roster.members, vec!["alice", "bob"]);

        let resp = command(&h.app, "bob", "finish", "chan", "op1").await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_text(resp).await, "Only the raid leader can do that");

        let resp = command(&h.app, "alice", "finish", "chan", "op1").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(h.engine.registry().list_members("chan", "op1").is_err());

        let notices = drain(&mut h.notices);
        assert!(notices.contains(&Notice::direct("alice", "@bob joined your raid op1 on chan")));
        assert!(notices.contains(&Notice::direct("bob", "op1 on chan has finished")));
    }

    #[tokio::test]
    async fn test_duplicate_host_is_conflict() {
        let h = setup();
        command(&h.app, "alice", "host", "chan", "op1").await;
        let resp = command(&h.app, "bob", "host", "chan", "op1").await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert_eq!(
            body_text(resp).await,
            "A raid by this name is already registered"
        );
    }

    #[tokio::test]
    async fn test_unknown_raid_is_not_found() {
        let h = setup();
        let resp = command(&h.app, "bob", "join", "chan", "missing").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = command(&h.app, "bob", "leave-alt", "nochan", "missing").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_alt_round_trip() {
        let h = setup();
        command(&h.app, "alice", "host", "chan", "op1").await;

        let resp = command(&h.app, "carol", "join-alt", "chan", "op1").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            h.engine.registry().list_members("chan", "op1").unwrap().alts,
            vec!["carol"]
        );

        let resp = command(&h.app, "carol", "leave-alt", "chan", "op1").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(
            h.engine
                .registry()
                .list_members("chan", "op1")
                .unwrap()
                .alts
                .is_empty()
        );

        let resp = command(&h.app, "carol", "leave-alt", "chan", "op1").await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let resp = command(&h.app, "carol", "leave", "chan", "op1").await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_ping_and_admin_finish() {
        let mut h = setup();
        command(&h.app, "alice", "host", "chan", "op1").await;
        command(&h.app, "bob", "join", "chan", "op1").await;
        drain(&mut h.notices);

        let resp = command(&h.app, "alice", "ping", "chan", "op1").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            drain(&mut h.notices),
            vec![Notice::direct(
                "bob",
                "@alice is pinging you for op1 on chan"
            )]
        );

        let resp = command(&h.app, "admin", "finish", "chan", "op1").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(h.engine.registry().raid_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_raid_name_is_bad_request() {
        let h = setup();
        let resp = command(&h.app, "alice", "host", "chan", "").await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    // ═══════════════════════════════════════════════════════════════
    //  4. Long polling
    // ═══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn test_poll_without_version_returns_snapshot() {
        let h = setup();
        command(&h.app, "alice", "host", "chan", "op1").await;

        let resp = get(&h.app, "/rest/get", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(
            json["version"].as_u64().unwrap(),
            h.engine.notifier().current().version
        );
        assert_eq!(json["raids"]["chan"][0]["name"], "op1");
        assert_eq!(json["raids"]["chan"][0]["members"][0], "alice");
    }

    #[tokio::test]
    async fn test_poll_times_out_with_no_content() {
        let h = setup_with_poll_timeout(Duration::from_millis(50));
        let version = h.engine.notifier().current().version;
        let resp = get(&h.app, &format!("/rest/get?since={version}"), None).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(h.engine.notifier().waiting(), 0);
    }

    #[tokio::test]
    async fn test_poll_with_garbage_version_returns_at_once() {
        let h = setup_with_poll_timeout(Duration::from_secs(60));
        let resp = get(&h.app, "/rest/get?since=yesterday", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_command_wakes_all_pollers() {
        let h = setup();
        let version = h.engine.notifier().current().version;

        let mut pollers = Vec::new();
        for _ in 0..3 {
            let app = h.app.clone();
            let uri = format!("/rest/get?since={version}");
            pollers.push(tokio::spawn(async move {
                let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
                app.oneshot(req).await.unwrap()
            }));
        }
        while h.engine.notifier().waiting() < 3 {
            tokio::task::yield_now().await;
        }

        let resp = command(&h.app, "alice", "host", "chan", "op1").await;
        assert_eq!(resp.status(), StatusCode::OK);

        for poller in pollers {
            let resp = poller.await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
            let json = body_json(resp).await;
            assert_ne!(json["version"].as_u64().unwrap(), version);
            assert_eq!(json["raids"]["chan"][0]["name"], "op1");
        }
    }

    #[tokio::test]
    async fn test_failed_command_does_not_wake_pollers() {
        let h = setup_with_poll_timeout(Duration::from_millis(100));
        let version = h.engine.notifier().current().version;

        let poll = {
            let app = h.app.clone();
            tokio::spawn(async move {
                let req = Request::builder()
                    .uri(format!("/rest/get?since={version}"))
                    .body(Body::empty())
                    .unwrap();
                app.oneshot(req).await.unwrap()
            })
        };
        let resp = command(&h.app, "bob", "join", "chan", "missing").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        assert_eq!(poll.await.unwrap().status(), StatusCode::NO_CONTENT);
    }
}
