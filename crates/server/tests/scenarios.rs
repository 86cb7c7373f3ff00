//! End-to-end request scenarios against a full server instance.

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::collections::VecDeque;
use std::io::{Cursor, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use xscript_cache::DocCache;
use xscript_core::{Registry, RequestData};
use xscript_http::{Encoder, Request};
use xscript_http_block::{Connector, HttpExtension, Transport, Url};
use xscript_mist::MistExtension;
use xscript_server::{Server, ServerSettings};
use xscript_xml::{Document, Node, Selector};
use xscript_xslt::{FnEngine, StylesheetCache, XsltValue};

struct ScriptedTransport {
    reader: Cursor<Vec<u8>>,
    written: Arc<Mutex<Vec<u8>>>,
}

impl Read for ScriptedTransport {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Write for ScriptedTransport {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.written.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct MockConnector {
    responses: Mutex<VecDeque<Vec<u8>>>,
    requests: Mutex<Vec<Arc<Mutex<Vec<u8>>>>>,
}

impl MockConnector {
    fn new(responses: Vec<Vec<u8>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn request_text(&self, index: usize) -> String {
        String::from_utf8_lossy(&self.requests.lock()[index].lock()).into_owned()
    }
}

impl Connector for MockConnector {
    fn connect(&self, _url: &Url, _timeout: Duration) -> std::io::Result<Box<dyn Transport>> {
        let response = self.responses.lock().pop_front().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "no scripted response")
        })?;
        let written = Arc::new(Mutex::new(Vec::new()));
        self.requests.lock().push(written.clone());
        Ok(Box::new(ScriptedTransport {
            reader: Cursor::new(response),
            written,
        }))
    }
}

fn http_response(status: &str, headers: &[&str], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(format!("HTTP/1.1 {status}\r\n").as_bytes());
    for header in headers {
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
    out.extend_from_slice(body);
    out
}

fn script_root(name: &str, source: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("xscript-scenarios-{name}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("page.xml"), source).unwrap();
    dir
}

fn settings(root: PathBuf) -> ServerSettings {
    ServerSettings {
        root_dir: root,
        pool_size: 2,
        ..ServerSettings::default()
    }
}

fn request(env: &[&str]) -> RequestData {
    let mut lines = vec!["REQUEST_METHOD=GET", "SCRIPT_NAME=/page.xml"];
    lines.extend_from_slice(env);
    RequestData::new(Request::from_env_lines(&lines, Vec::new(), &Encoder::cp1251()).unwrap())
}

fn body_of(data: &RequestData) -> String {
    String::from_utf8(data.response.body()).unwrap()
}

#[test]
fn echo_query_scenario() {
    let root = script_root(
        "echo",
        r#"<page xmlns:x="http://www.yandex.ru/xscript">
<x:mist method="echoQuery"><x:param type="string">request_</x:param></x:mist>
</page>"#,
    );
    let mut registry = Registry::new();
    registry.register(Arc::new(MistExtension::new())).unwrap();
    let server = Server::new(settings(root), registry, None, None);

    let data = request(&["QUERY_STRING=text=moscow", "HTTP_HOST=help.example"]);
    server.handle(data.clone()).unwrap();

    assert_eq!(data.response.status(), 200);
    let body = body_of(&data);
    assert!(
        body.contains("<request_><arg name=\"text\">moscow</arg></request_>"),
        "{body}"
    );
}

#[test]
fn guard_skip_scenario() {
    let source = |expected: &str| {
        format!(
            r#"<page xmlns:x="http://www.yandex.ru/xscript">
<x:mist method="setStateString">
  <x:param type="string">flag</x:param><x:param type="string">1</x:param>
</x:mist>
<x:mist method="echoQuery">
  <x:guard state="flag" value="{expected}"/>
  <x:param type="string">ok_</x:param>
</x:mist>
</page>"#
        )
    };

    // matching guard: the block's output appears
    let root = script_root("guard-match", &source("1"));
    let mut registry = Registry::new();
    registry.register(Arc::new(MistExtension::new())).unwrap();
    let server = Server::new(settings(root), registry, None, None);
    let data = request(&[]);
    server.handle(data.clone()).unwrap();
    assert!(body_of(&data).contains("<ok_/>"), "{}", body_of(&data));

    // failing guard: the splice point disappears entirely
    let root = script_root("guard-skip", &source("2"));
    let mut registry = Registry::new();
    registry.register(Arc::new(MistExtension::new())).unwrap();
    let server = Server::new(settings(root), registry, None, None);
    let data = request(&[]);
    server.handle(data.clone()).unwrap();
    let body = body_of(&data);
    assert!(!body.contains("ok_"), "{body}");
}

#[test]
fn http_fetch_with_stylesheet_scenario() {
    let root = script_root(
        "fetch-xslt",
        r#"<page xmlns:x="http://www.yandex.ru/xscript" x:stylesheet="copy-a.xsl">
<x:http method="getHttp"><x:param type="string">http://upstream/x</x:param></x:http>
</page>"#,
    );
    let connector = MockConnector::new(vec![http_response(
        "200 OK",
        &["Content-Type: application/xml"],
        b"<r><a>1</a></r>",
    )]);
    let mut registry = Registry::new();
    registry
        .register(Arc::new(
            HttpExtension::new().with_connector(connector.clone()),
        ))
        .unwrap();

    // the stylesheet copies //a to the output root
    let engine = FnEngine::new(|doc, _tc| {
        let selector = Selector::parse("//a").unwrap();
        let mut out = Node::new("out");
        if let Some(root) = doc.root() {
            for node in selector.select(root) {
                out.push_element(node.clone());
            }
        }
        let only_child = out.first_element().cloned().unwrap_or(out);
        Ok(Document::with_root(only_child))
    });
    let transformer = Arc::new(StylesheetCache::new(Arc::new(engine)));
    let server = Server::new(settings(root), registry, None, Some(transformer));

    let data = request(&[]);
    server.handle(data.clone()).unwrap();

    assert_eq!(data.response.status(), 200);
    let body = body_of(&data);
    assert!(body.contains("<a>1</a>"), "{body}");
    assert!(data
        .response
        .header("Content-Type")
        .unwrap()
        .starts_with("text/xml"));
}

#[test]
fn retry_on_5xx_scenario() {
    let root = script_root(
        "retry",
        r#"<page xmlns:x="http://www.yandex.ru/xscript">
<x:http method="getHttp" retry-count="2"><x:param type="string">http://upstream/x</x:param></x:http>
</page>"#,
    );
    let connector = MockConnector::new(vec![
        http_response("503 Service Unavailable", &[], b""),
        http_response("503 Service Unavailable", &[], b""),
        http_response("200 OK", &["Content-Type: text/xml"], b"<r/>"),
    ]);
    let mut registry = Registry::new();
    registry
        .register(Arc::new(
            HttpExtension::new().with_connector(connector.clone()),
        ))
        .unwrap();
    let server = Server::new(settings(root), registry, None, None);

    let data = request(&[]);
    server.handle(data.clone()).unwrap();

    assert_eq!(connector.request_count(), 3);
    assert_eq!(data.response.status(), 200);
    assert!(body_of(&data).contains("<r/>"), "{}", body_of(&data));
}

#[test]
fn conditional_cache_hit_scenario() {
    let root = script_root(
        "cache-ims",
        r#"<page xmlns:x="http://www.yandex.ru/xscript">
<x:http method="getHttp" tag="yes"><x:param type="string">http://upstream/x</x:param></x:http>
</page>"#,
    );
    let connector = MockConnector::new(vec![
        http_response(
            "200 OK",
            &[
                "Content-Type: text/xml",
                "Last-Modified: Sun, 06 Nov 1994 08:49:37 GMT",
            ],
            b"<r><cached/></r>",
        ),
        http_response("304 Not Modified", &[], b""),
    ]);
    let mut registry = Registry::new();
    registry
        .register(Arc::new(
            HttpExtension::new().with_connector(connector.clone()),
        ))
        .unwrap();
    let cache = Arc::new(DocCache::new(64));
    let server = Server::new(settings(root), registry, Some(cache), None);

    let first = request(&[]);
    server.handle(first.clone()).unwrap();
    let first_body = body_of(&first);
    assert!(first_body.contains("<cached/>"), "{first_body}");
    assert_eq!(connector.request_count(), 1);

    let second = request(&[]);
    server.handle(second.clone()).unwrap();
    let second_body = body_of(&second);
    // the conditional request went out and the cached copy was served
    assert_eq!(connector.request_count(), 2);
    let conditional = connector.request_text(1);
    assert!(
        conditional.contains("If-Modified-Since: Sun, 06 Nov 1994 08:49:37 GMT"),
        "{conditional}"
    );
    assert_eq!(second_body, first_body);
}

#[test]
fn stylesheet_redirect_scenario() {
    let root = script_root(
        "redirect",
        r#"<page xmlns:x="http://www.yandex.ru/xscript" x:stylesheet="redirect.xsl">
<x:mist method="echoQuery"><x:param type="string">q_</x:param></x:mist>
</page>"#,
    );
    let mut registry = Registry::new();
    registry.register(Arc::new(MistExtension::new())).unwrap();

    let engine = FnEngine::new(|doc, tc| {
        tc.call("http-redirect", &[XsltValue::from("/new")]);
        Ok(doc.clone())
    });
    let transformer = Arc::new(StylesheetCache::new(Arc::new(engine)));
    let server = Server::new(settings(root), registry, None, Some(transformer));

    let data = request(&[]);
    server.handle(data.clone()).unwrap();

    assert_eq!(data.response.status(), 302);
    assert_eq!(data.response.header("Location").unwrap(), "/new");
    assert!(data.response.body().is_empty());

    let mut out = Vec::new();
    data.response.serialize(&mut out).unwrap();
    // once the response is on the wire no further mutation is accepted
    assert!(data.response.set_header("X-Late", "1").is_err());
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("Status: 302 Found\r\n"), "{text}");
}

#[test]
fn missing_script_is_a_500() {
    let root = script_root("missing", "<page/>");
    let server = Server::new(settings(root), Registry::new(), None, None);
    let data = request(&["SCRIPT_NAME=/no-such-page.xml"]);
    assert!(server.handle(data.clone()).is_err());
    assert_eq!(data.response.status(), 500);
}
