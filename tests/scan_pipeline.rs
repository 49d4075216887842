//! End-to-end tests against a scripted local HTTP server.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use bec_scan::auth::TokenProvider;
use bec_scan::fetch::PageFetcher;
use bec_scan::progress::PlainProgress;
use bec_scan::{output, Config, MatchRecord, ScanDriver};
use tempfile::TempDir;

struct ScriptedResponse {
    status: u16,
    headers: Vec<(&'static str, String)>,
    body: String,
}

impl ScriptedResponse {
    fn json(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: vec![("Content-Type", "application/json".to_string())],
            body: body.into(),
        }
    }
}

/// Start a local server that answers with the scripted responses in order
/// and records the path of every request it sees.
fn scripted_server(responses: Vec<ScriptedResponse>) -> (u16, Arc<Mutex<Vec<String>>>) {
    let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
    let port = server.server_addr().to_ip().unwrap().port();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let seen_writer = Arc::clone(&seen);
    thread::spawn(move || {
        for scripted in responses {
            let request = match server.recv() {
                Ok(request) => request,
                Err(_) => return,
            };
            seen_writer.lock().unwrap().push(request.url().to_string());

            let mut response = tiny_http::Response::from_string(scripted.body)
                .with_status_code(scripted.status);
            for (name, value) in &scripted.headers {
                response.add_header(
                    tiny_http::Header::from_bytes(name.as_bytes(), value.as_bytes()).unwrap(),
                );
            }
            let _ = request.respond(response);
        }
    });

    (port, seen)
}

fn test_config(port: u16, dir: &Path) -> Config {
    Config {
        tenant_id: "test-tenant".to_string(),
        client_id: "test-client".to_string(),
        mailbox: "me".to_string(),
        scope: "Mail.Read".to_string(),
        days_back: 5,
        max_scan: 100,
        max_results: 100,
        page_size: 50,
        cache_path: dir.join("tokens.json"),
        output_path: dir.join("hits.csv"),
        graph_base_url: format!("http://127.0.0.1:{}/v1.0", port),
        authority_base_url: format!("http://127.0.0.1:{}", port),
    }
}

fn message_json(id: &str, subject: &str, preview: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "subject": subject,
        "from": { "emailAddress": { "address": format!("{}@example.com", id) } },
        "receivedDateTime": "2026-08-20T09:15:00Z",
        "webLink": format!("https://outlook.example/owa/?ItemID={}", id),
        "internetMessageId": format!("<{}@example.com>", id),
        "bodyPreview": preview
    })
}

fn page_json(
    messages: Vec<serde_json::Value>,
    count: Option<u64>,
    next_link: Option<String>,
) -> String {
    let mut page = serde_json::json!({ "value": messages });
    if let Some(count) = count {
        page["@odata.count"] = count.into();
    }
    if let Some(link) = next_link {
        page["@odata.nextLink"] = link.into();
    }
    page.to_string()
}

#[test]
fn test_pagination_follows_next_link_and_stops() {
    let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
    let port = server.server_addr().to_ip().unwrap().port();
    let next_link = format!("http://127.0.0.1:{}/v1.0/me/messages?$skip=50", port);

    let page_one = page_json(
        vec![
            message_json("m1", "please update our bank account", "details attached"),
            message_json("m2", "lunch?", "friday works"),
        ],
        Some(3),
        Some(next_link),
    );
    let page_two = page_json(
        vec![message_json("m3", "change billing address", "effective now")],
        None,
        None,
    );

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_writer = Arc::clone(&seen);
    thread::spawn(move || {
        for body in [page_one, page_two] {
            let request = server.recv().unwrap();
            seen_writer.lock().unwrap().push(request.url().to_string());
            let response = tiny_http::Response::from_string(body).with_header(
                tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                    .unwrap(),
            );
            let _ = request.respond(response);
        }
    });

    let dir = TempDir::new().unwrap();
    let config = test_config(port, dir.path());
    let http = reqwest::blocking::Client::new();

    let pages = PageFetcher::new(&config, &http, "token-1".to_string()).unwrap();
    let outcome = ScanDriver::new(&config)
        .run(pages, &mut PlainProgress::default())
        .unwrap();

    assert_eq!(outcome.scanned, 3);
    assert_eq!(outcome.total_estimate, Some(3));
    let ids: Vec<&str> = outcome.matches.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, ["m1", "m3"]);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].contains("%24count=true"));
    assert!(seen[1].contains("$skip=50") || seen[1].contains("%24skip=50"));
}

#[test]
fn test_throttled_request_is_retried_after_delay() {
    let body = page_json(vec![message_json("m1", "hello", "world")], Some(1), None);
    let (port, seen) = scripted_server(vec![
        ScriptedResponse {
            status: 429,
            headers: vec![("Retry-After", "1".to_string())],
            body: String::new(),
        },
        ScriptedResponse::json(200, body),
    ]);

    let dir = TempDir::new().unwrap();
    let config = test_config(port, dir.path());
    let http = reqwest::blocking::Client::new();

    let started = Instant::now();
    let pages = PageFetcher::new(&config, &http, "token-1".to_string()).unwrap();
    let outcome = ScanDriver::new(&config)
        .run(pages, &mut PlainProgress::default())
        .unwrap();

    assert!(started.elapsed().as_millis() >= 1000);
    assert_eq!(outcome.scanned, 1);

    // Same request, re-issued verbatim
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], seen[1]);
}

#[test]
fn test_server_error_fails_the_run() {
    let (port, _seen) = scripted_server(vec![ScriptedResponse::json(
        503,
        r#"{"error":{"code":"ServiceUnavailable"}}"#,
    )]);

    let dir = TempDir::new().unwrap();
    let config = test_config(port, dir.path());
    let http = reqwest::blocking::Client::new();

    let pages = PageFetcher::new(&config, &http, "token-1".to_string()).unwrap();
    let result = ScanDriver::new(&config).run(pages, &mut PlainProgress::default());

    match result {
        Err(bec_scan::ScanError::Fetch { status, message }) => {
            assert_eq!(status, 503);
            assert!(message.contains("ServiceUnavailable"));
        }
        other => panic!("expected fetch error, got {:?}", other.map(|o| o.scanned)),
    }
}

#[test]
fn test_scan_cap_limits_work() {
    let messages = (0..10)
        .map(|n| message_json(&format!("m{}", n), "newsletter", "nothing here"))
        .collect();
    let (port, _seen) = scripted_server(vec![ScriptedResponse::json(
        200,
        page_json(messages, Some(10), None),
    )]);

    let dir = TempDir::new().unwrap();
    let mut config = test_config(port, dir.path());
    config.max_scan = 3;
    let http = reqwest::blocking::Client::new();

    let pages = PageFetcher::new(&config, &http, "token-1".to_string()).unwrap();
    let outcome = ScanDriver::new(&config)
        .run(pages, &mut PlainProgress::default())
        .unwrap();

    assert_eq!(outcome.scanned, 3);
    assert!(outcome.matches.is_empty());
}

#[test]
fn test_result_cap_short_circuits() {
    let messages = vec![
        message_json("m1", "update wire instructions", "see attached"),
        message_json("m2", "change routing number", "see attached"),
        message_json("m3", "amend bank details", "see attached"),
    ];
    let (port, _seen) = scripted_server(vec![ScriptedResponse::json(
        200,
        page_json(messages, None, None),
    )]);

    let dir = TempDir::new().unwrap();
    let mut config = test_config(port, dir.path());
    config.max_results = 1;
    let http = reqwest::blocking::Client::new();

    let pages = PageFetcher::new(&config, &http, "token-1".to_string()).unwrap();
    let outcome = ScanDriver::new(&config)
        .run(pages, &mut PlainProgress::default())
        .unwrap();

    assert_eq!(outcome.scanned, 1);
    assert_eq!(outcome.matches.len(), 1);
    assert_eq!(outcome.matches[0].id, "m1");
}

#[test]
fn test_report_written_and_parseable() {
    let messages = vec![
        message_json("m1", "re: invoice, \"urgent\" bank account update", "new details"),
        message_json("m2", "weekly digest", "nothing relevant"),
    ];
    let (port, _seen) = scripted_server(vec![ScriptedResponse::json(
        200,
        page_json(messages, None, None),
    )]);

    let dir = TempDir::new().unwrap();
    let config = test_config(port, dir.path());
    let http = reqwest::blocking::Client::new();

    let pages = PageFetcher::new(&config, &http, "token-1".to_string()).unwrap();
    let outcome = ScanDriver::new(&config)
        .run(pages, &mut PlainProgress::default())
        .unwrap();

    assert!(output::persist_if_any(&outcome.matches, &config.output_path).unwrap());

    let mut reader = csv::Reader::from_path(&config.output_path).unwrap();
    let rows: Vec<MatchRecord> = reader.deserialize().collect::<Result<_, _>>().unwrap();
    assert_eq!(rows, outcome.matches);
    assert_eq!(rows[0].id, "m1");
    assert_eq!(rows[0].sender.as_deref(), Some("m1@example.com"));
}

#[test]
fn test_console_output_contract() {
    let messages = vec![
        message_json("m1", "please update our bank account", "details attached"),
        message_json("m2", "lunch?", "friday works"),
        message_json("m3", "change billing address", "effective now"),
    ];
    let (port, _seen) = scripted_server(vec![ScriptedResponse::json(
        200,
        page_json(messages, Some(3), None),
    )]);

    let dir = TempDir::new().unwrap();
    let config = test_config(port, dir.path());
    let http = reqwest::blocking::Client::new();

    let pages = PageFetcher::new(&config, &http, "token-1".to_string()).unwrap();
    let mut out = Vec::new();
    let outcome = ScanDriver::new(&config)
        .run_with_output(pages, &mut PlainProgress::default(), &mut out)
        .unwrap();
    assert_eq!(outcome.matches.len(), 2);

    let printed = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = printed.lines().collect();
    // Header and one rule up front, then one tab-separated line per match
    assert_eq!(lines[0], "email_address\treceivedDateTime\tsubject");
    assert_eq!(lines[1], "-".repeat(90));
    assert_eq!(
        lines[2],
        "m1@example.com\t2026-08-20T09:15:00Z\tplease update our bank account"
    );
    assert_eq!(
        lines[3],
        "m3@example.com\t2026-08-20T09:15:00Z\tchange billing address"
    );
    assert_eq!(lines.len(), 4);
}

#[test]
fn test_clean_mailbox_leaves_no_report() {
    let (port, _seen) = scripted_server(vec![ScriptedResponse::json(
        200,
        page_json(vec![message_json("m1", "minutes", "attached")], Some(1), None),
    )]);

    let dir = TempDir::new().unwrap();
    let config = test_config(port, dir.path());
    let http = reqwest::blocking::Client::new();

    let pages = PageFetcher::new(&config, &http, "token-1".to_string()).unwrap();
    let outcome = ScanDriver::new(&config)
        .run(pages, &mut PlainProgress::default())
        .unwrap();

    assert!(outcome.matches.is_empty());
    assert!(!output::persist_if_any(&outcome.matches, &config.output_path).unwrap());
    assert!(!config.output_path.exists());
}

#[test]
fn test_device_code_flow_polls_until_issued() {
    let (port, seen) = scripted_server(vec![
        ScriptedResponse::json(
            200,
            r#"{
                "device_code": "dc-1",
                "user_code": "ABCD-EFGH",
                "verification_uri": "https://microsoft.com/devicelogin",
                "expires_in": 900,
                "interval": 1
            }"#,
        ),
        ScriptedResponse::json(400, r#"{"error": "authorization_pending"}"#),
        ScriptedResponse::json(
            200,
            r#"{"access_token": "at-1", "refresh_token": "rt-1", "expires_in": 3600}"#,
        ),
    ]);

    let dir = TempDir::new().unwrap();
    let config = test_config(port, dir.path());
    let http = reqwest::blocking::Client::new();

    let token = TokenProvider::new(&config, &http).get_token().unwrap();
    assert_eq!(token, "at-1");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    assert!(seen[0].contains("/devicecode"));
    assert!(seen[1].contains("/token"));

    // Tokens land in the cache for the next run
    let cached = std::fs::read_to_string(&config.cache_path).unwrap();
    assert!(cached.contains("at-1"));
    assert!(cached.contains("rt-1"));
}

#[test]
fn test_refresh_token_skips_interactive_sign_in() {
    let (port, seen) = scripted_server(vec![ScriptedResponse::json(
        200,
        r#"{"access_token": "at-2", "expires_in": 3600}"#,
    )]);

    let dir = TempDir::new().unwrap();
    let config = test_config(port, dir.path());
    std::fs::write(
        &config.cache_path,
        r#"{"access_token": "at-stale", "refresh_token": "rt-1", "expires_at": 1000000000}"#,
    )
    .unwrap();

    let http = reqwest::blocking::Client::new();
    let token = TokenProvider::new(&config, &http).get_token().unwrap();
    assert_eq!(token, "at-2");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].contains("/token"));
}

#[test]
fn test_cached_token_needs_no_network() {
    let dir = TempDir::new().unwrap();
    // Unroutable authority; any request would fail
    let config = test_config(1, dir.path());

    let expires_at = chrono::Utc::now().timestamp() + 3600;
    std::fs::write(
        &config.cache_path,
        format!(r#"{{"access_token": "at-3", "expires_at": {}}}"#, expires_at),
    )
    .unwrap();

    let http = reqwest::blocking::Client::new();
    let token = TokenProvider::new(&config, &http).get_token().unwrap();
    assert_eq!(token, "at-3");
}

#[test]
fn test_denied_sign_in_is_an_auth_error() {
    let (port, _seen) = scripted_server(vec![
        ScriptedResponse::json(
            200,
            r#"{
                "device_code": "dc-1",
                "user_code": "ABCD-EFGH",
                "verification_uri": "https://microsoft.com/devicelogin",
                "expires_in": 900,
                "interval": 1
            }"#,
        ),
        ScriptedResponse::json(
            400,
            r#"{"error": "access_denied", "error_description": "user declined"}"#,
        ),
    ]);

    let dir = TempDir::new().unwrap();
    let config = test_config(port, dir.path());
    let http = reqwest::blocking::Client::new();

    let result = TokenProvider::new(&config, &http).get_token();
    match result {
        Err(bec_scan::ScanError::Auth(message)) => {
            assert!(message.contains("access_denied"));
            assert!(message.contains("user declined"));
        }
        other => panic!("expected auth error, got {:?}", other),
    }
}
