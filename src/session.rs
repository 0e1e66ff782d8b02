// ABOUTME: Reads ids, cookies and OAuth credentials from a live Chrome tab
// ABOUTME: Talks to the DevTools HTTP endpoint and protocol WebSocket, read-only

use crate::{config::ExportConfig, oauth::Credentials, Error, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};
use tungstenite::Message;
use url::Url;

/// Everything the exporter needs from the logged-in browser tab.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub journal_id: String,
    pub entry_id: Option<String>,
    pub cookie_header: String,
    pub user_agent: String,
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DevToolsTarget {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "webSocketDebuggerUrl", default)]
    pub ws_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Cookie {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct PageState {
    #[serde(default)]
    session: Option<String>,
    #[serde(rename = "userAgent", default)]
    user_agent: String,
}

const PAGE_STATE_JS: &str = "JSON.stringify({\
    session: window.localStorage.getItem('pz-session'), \
    userAgent: navigator.userAgent})";

pub fn devtools_url(port: u16) -> String {
    format!("http://localhost:{}", port)
}

pub fn list_targets(devtools_base: &str) -> Result<Vec<DevToolsTarget>> {
    let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
    let url = format!("{}/json/list", devtools_base.trim_end_matches('/'));
    let targets = client.get(&url).send()?.error_for_status()?.json()?;
    Ok(targets)
}

/// First page tab on the service's domain; DevTools and worker targets are skipped.
pub fn find_service_page<'a>(
    targets: &'a [DevToolsTarget],
    domain: &str,
) -> Option<&'a DevToolsTarget> {
    targets
        .iter()
        .find(|t| t.kind == "page" && t.url.contains(domain))
}

/// Journal and entry ids from `/p/<journal>/<entry>`. `new` is not an entry.
pub fn parse_page_url(page_url: &str) -> Option<(String, Option<String>)> {
    let parsed = Url::parse(page_url).ok()?;
    let segments: Vec<&str> = parsed.path_segments()?.collect();

    let journal = segments.get(1).filter(|s| !s.is_empty())?;
    let entry = segments
        .get(2)
        .filter(|s| !s.is_empty() && **s != "new")
        .map(|s| s.to_string());

    Some((journal.to_string(), entry))
}

/// Credentials from the `pz-session` local storage JSON.
pub fn parse_pz_session(raw: &str) -> Option<Credentials> {
    let session: Value = serde_json::from_str(raw).ok()?;
    let access = session.get("access_token")?;
    let app = access.get("client_application");

    let field = |v: Option<&Value>, key: &str| {
        v.and_then(|v| v.get(key))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    Some(Credentials {
        consumer_key: field(app, "key")?,
        consumer_secret: field(app, "secret").unwrap_or_default(),
        token: field(Some(access), "token")?,
        token_secret: field(Some(access), "secret").unwrap_or_default(),
    })
}

fn cookie_header(cookies: &[Cookie]) -> String {
    cookies
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Minimal synchronous DevTools protocol connection to one target.
struct CdpConnection {
    socket: tungstenite::WebSocket<tungstenite::stream::MaybeTlsStream<std::net::TcpStream>>,
    next_id: u64,
}

impl CdpConnection {
    fn open(ws_url: &str) -> Result<Self> {
        let (socket, _) = tungstenite::connect(ws_url)?;
        Ok(CdpConnection { socket, next_id: 1 })
    }

    fn call(&mut self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;

        let request = json!({ "id": id, "method": method, "params": params });
        self.socket.send(Message::Text(request.to_string()))?;

        // Events may arrive before our reply; skip anything without our id
        loop {
            let text = match self.socket.read()? {
                Message::Text(text) => text,
                Message::Close(_) => {
                    return Err(Error::Browser(format!("connection closed during {}", method)))
                }
                _ => continue,
            };
            let reply: Value = serde_json::from_str(&text)?;
            if reply.get("id").and_then(Value::as_u64) != Some(id) {
                continue;
            }
            if let Some(err) = reply.get("error") {
                return Err(Error::Browser(format!("{} failed: {}", method, err)));
            }
            return Ok(reply.get("result").cloned().unwrap_or(Value::Null));
        }
    }

    fn close(mut self) {
        let _ = self.socket.close(None);
    }
}

impl SessionContext {
    /// Connect to the debugging Chrome instance and capture the session.
    pub fn from_browser(config: &ExportConfig) -> Result<Self> {
        info!("Connecting to Chrome debugger...");
        let targets = list_targets(&devtools_url(config.chrome_debug_port))?;
        let domain = config.service_domain();

        let page = find_service_page(&targets, domain).ok_or_else(|| {
            Error::Session(format!(
                "No {} page found. Open one in the debugging Chrome window.",
                domain
            ))
        })?;

        let (journal_id, entry_id) = parse_page_url(&page.url).ok_or_else(|| {
            Error::Session(format!(
                "Could not extract journal ID from {}. Open a journal page (/p/<journal-id>).",
                page.url
            ))
        })?;
        info!(journal_id = %journal_id, "Found journal");
        match &entry_id {
            Some(id) => info!(entry_id = %id, "Found entry"),
            None => info!("No entry open in browser; latest entry will be looked up"),
        }

        let ws_url = page
            .ws_url
            .as_deref()
            .ok_or_else(|| Error::Browser("page target has no WebSocket URL".into()))?;
        let mut cdp = CdpConnection::open(ws_url)?;

        let cookies = cdp.call("Network.getCookies", json!({ "urls": [page.url] }))?;
        let cookies: Vec<Cookie> = cookies
            .get("cookies")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();
        debug!(count = cookies.len(), "Read cookies");

        let evaluated = cdp.call(
            "Runtime.evaluate",
            json!({ "expression": PAGE_STATE_JS, "returnByValue": true }),
        )?;
        cdp.close();

        let state_json = evaluated
            .pointer("/result/value")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Browser("page state evaluation returned no value".into()))?;
        let state: PageState = serde_json::from_str(state_json)?;

        let credentials = state
            .session
            .as_deref()
            .and_then(parse_pz_session)
            .ok_or_else(|| {
                Error::Auth(
                    "No OAuth credentials found. Log in to Penzu in the debugging Chrome window."
                        .into(),
                )
            })?;
        info!("Found OAuth credentials");

        Ok(SessionContext {
            journal_id,
            entry_id,
            cookie_header: cookie_header(&cookies),
            user_agent: state.user_agent,
            credentials,
        })
    }

    pub fn with_overrides(mut self, journal_id: Option<String>, entry_id: Option<String>) -> Self {
        if let Some(journal_id) = journal_id {
            self.journal_id = journal_id;
        }
        if entry_id.is_some() {
            self.entry_id = entry_id;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page_url_with_entry() {
        let parsed = parse_page_url("https://penzu.com/p/12345/67890").unwrap();
        assert_eq!(parsed, ("12345".into(), Some("67890".into())));
    }

    #[test]
    fn test_parse_page_url_journal_only() {
        let parsed = parse_page_url("https://penzu.com/p/12345").unwrap();
        assert_eq!(parsed, ("12345".into(), None));
    }

    #[test]
    fn test_parse_page_url_new_entry() {
        let parsed = parse_page_url("https://penzu.com/p/12345/new").unwrap();
        assert_eq!(parsed, ("12345".into(), None));
    }

    #[test]
    fn test_parse_page_url_missing_journal() {
        assert!(parse_page_url("https://penzu.com/").is_none());
        assert!(parse_page_url("https://penzu.com/p/").is_none());
        assert!(parse_page_url("garbage").is_none());
    }

    #[test]
    fn test_find_service_page_skips_non_pages() {
        let targets: Vec<DevToolsTarget> = serde_json::from_str(
            r#"[
                {"type": "service_worker", "url": "https://penzu.com/sw.js"},
                {"type": "page", "url": "https://example.com/"},
                {"type": "page", "url": "https://penzu.com/p/1/2", "webSocketDebuggerUrl": "ws://localhost:9222/devtools/page/A"}
            ]"#,
        )
        .unwrap();
        let page = find_service_page(&targets, "penzu.com").unwrap();
        assert_eq!(page.url, "https://penzu.com/p/1/2");
        assert!(page.ws_url.is_some());

        assert!(find_service_page(&targets[..2], "penzu.com").is_none());
    }

    #[test]
    fn test_parse_pz_session() {
        let raw = r#"{
            "access_token": {
                "token": "tok",
                "secret": "toksecret",
                "client_application": {"key": "ck", "secret": "cs"}
            }
        }"#;
        let creds = parse_pz_session(raw).unwrap();
        assert_eq!(creds.consumer_key, "ck");
        assert_eq!(creds.consumer_secret, "cs");
        assert_eq!(creds.token, "tok");
        assert_eq!(creds.token_secret, "toksecret");
    }

    #[test]
    fn test_parse_pz_session_missing_token() {
        let raw = r#"{"access_token": {"client_application": {"key": "ck"}}}"#;
        assert!(parse_pz_session(raw).is_none());
        assert!(parse_pz_session("not json").is_none());
        assert!(parse_pz_session("{}").is_none());
    }

    #[test]
    fn test_cookie_header() {
        let cookies = vec![
            Cookie {
                name: "a".into(),
                value: "1".into(),
            },
            Cookie {
                name: "b".into(),
                value: "2".into(),
            },
        ];
        assert_eq!(cookie_header(&cookies), "a=1; b=2");
        assert_eq!(cookie_header(&[]), "");
    }

    #[test]
    fn test_with_overrides() {
        let ctx = SessionContext {
            journal_id: "j".into(),
            entry_id: Some("e".into()),
            cookie_header: String::new(),
            user_agent: String::new(),
            credentials: parse_pz_session(
                r#"{"access_token": {"token": "t", "client_application": {"key": "k"}}}"#,
            )
            .unwrap(),
        };
        let ctx = ctx.with_overrides(None, None);
        assert_eq!(ctx.journal_id, "j");
        assert_eq!(ctx.entry_id.as_deref(), Some("e"));

        let ctx = ctx.with_overrides(Some("j2".into()), Some("e2".into()));
        assert_eq!(ctx.journal_id, "j2");
        assert_eq!(ctx.entry_id.as_deref(), Some("e2"));
    }
}

#[cfg(test)]
mod cdp_tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    /// One-connection DevTools stand-in. `reply` maps each request's id and
    /// method to the frames sent back, in order.
    fn spawn_devtools<F>(reply: F) -> (String, thread::JoinHandle<()>)
    where
        F: Fn(u64, &str) -> Vec<Message> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut ws = tungstenite::accept(stream).unwrap();
            loop {
                let text = match ws.read() {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => continue,
                };
                let request: Value = serde_json::from_str(&text).unwrap();
                let id = request["id"].as_u64().unwrap();
                let method = request["method"].as_str().unwrap_or_default().to_string();
                for frame in reply(id, &method) {
                    let _ = ws.send(frame);
                }
            }
        });

        (format!("ws://127.0.0.1:{}/devtools/page/T", port), handle)
    }

    #[test]
    fn test_call_skips_events_and_other_ids() {
        let (url, server) = spawn_devtools(|id, method| {
            vec![
                Message::Text(r#"{"method":"Network.dataReceived","params":{}}"#.into()),
                Message::Binary(vec![1, 2, 3]),
                Message::Text(json!({ "id": id + 100, "result": { "stale": true } }).to_string()),
                Message::Text(json!({ "id": id, "result": { "method": method, "id": id } }).to_string()),
            ]
        });

        let mut cdp = CdpConnection::open(&url).unwrap();
        let first = cdp.call("Network.getCookies", json!({})).unwrap();
        assert_eq!(first, json!({ "method": "Network.getCookies", "id": 1 }));

        let second = cdp.call("Runtime.evaluate", json!({})).unwrap();
        assert_eq!(second, json!({ "method": "Runtime.evaluate", "id": 2 }));

        cdp.close();
        server.join().unwrap();
    }

    #[test]
    fn test_call_missing_result_is_null() {
        let (url, server) = spawn_devtools(|id, _| vec![Message::Text(json!({ "id": id }).to_string())]);

        let mut cdp = CdpConnection::open(&url).unwrap();
        assert_eq!(cdp.call("Page.enable", json!({})).unwrap(), Value::Null);

        cdp.close();
        server.join().unwrap();
    }

    #[test]
    fn test_call_error_reply() {
        let (url, server) = spawn_devtools(|id, _| {
            vec![Message::Text(
                json!({ "id": id, "error": { "code": -32601, "message": "method not found" } })
                    .to_string(),
            )]
        });

        let mut cdp = CdpConnection::open(&url).unwrap();
        match cdp.call("Bogus.method", json!({})) {
            Err(Error::Browser(msg)) => {
                assert!(msg.contains("Bogus.method failed"));
                assert!(msg.contains("method not found"));
            }
            other => panic!("Expected browser error, got {:?}", other),
        }

        cdp.close();
        server.join().unwrap();
    }

    #[test]
    fn test_call_close_before_reply() {
        let (url, server) = spawn_devtools(|_, _| vec![Message::Close(None)]);

        let mut cdp = CdpConnection::open(&url).unwrap();
        match cdp.call("Runtime.evaluate", json!({})) {
            Err(Error::Browser(msg)) => {
                assert_eq!(msg, "connection closed during Runtime.evaluate")
            }
            other => panic!("Expected browser error, got {:?}", other),
        }

        drop(cdp);
        server.join().unwrap();
    }
}
