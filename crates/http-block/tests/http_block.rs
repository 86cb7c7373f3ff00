use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::collections::VecDeque;
use std::io::{Cursor, Read, Write};
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use xscript_core::{
    Context, InvokeContext, InvokeErrorKind, Invoker, Registry, RequestData, Script, Tag,
    WorkerPool,
};
use xscript_http::{Encoder, Request};
use xscript_http_block::{Connector, HttpExtension, Transport};

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

/// Serves canned responses, one per connection, recording each request.
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
        let requests = self.requests.lock();
        let entry = requests[index].lock();
        String::from_utf8_lossy(&entry).into_owned()
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

fn setup(
    script_source: &str,
    env: &[&str],
    responses: Vec<Vec<u8>>,
) -> (Arc<MockConnector>, Arc<Context>, Arc<Script>) {
    let connector = MockConnector::new(responses);
    let mut registry = Registry::new();
    registry
        .register(Arc::new(
            HttpExtension::new().with_connector(connector.clone()),
        ))
        .unwrap();
    let script = Script::parse(&registry, script_source, "page.xml").unwrap();
    let mut lines = vec!["REQUEST_METHOD=GET"];
    lines.extend_from_slice(env);
    let request = Request::from_env_lines(&lines, Vec::new(), &Encoder::cp1251()).unwrap();
    let ctx = Context::new(script.clone(), RequestData::new(request));
    (connector, ctx, script)
}

fn invoke_first_block(ctx: &Arc<Context>, script: &Arc<Script>) -> InvokeContext {
    let handler = script.blocks()[0].clone();
    let mut invoke_ctx = InvokeContext::new();
    handler.create_arg_list(ctx, &mut invoke_ctx).unwrap();
    invoke_ctx.set_tagged(handler.core().tagged.tagged);
    match handler.invoke(ctx, &mut invoke_ctx) {
        Ok(doc) => invoke_ctx.set_doc(doc),
        Err(error) => invoke_ctx.set_error(error),
    }
    invoke_ctx
}

const SIMPLE_GET: &str = r#"<page xmlns:x="http://www.yandex.ru/xscript">
<x:http method="getHttp"><x:param type="string">http://upstream/x</x:param></x:http>
</page>"#;

#[test]
fn xml_response_is_parsed() {
    let (_, ctx, script) = setup(
        SIMPLE_GET,
        &[],
        vec![http_response(
            "200 OK",
            &["Content-Type: application/xml"],
            b"<r><a>1</a></r>",
        )],
    );
    let invoke_ctx = invoke_first_block(&ctx, &script);
    assert_eq!(
        invoke_ctx.doc().unwrap().serialize_root(),
        "<r><a>1</a></r>"
    );
}

#[test]
fn text_response_is_wrapped() {
    let (_, ctx, script) = setup(
        SIMPLE_GET,
        &[],
        vec![http_response(
            "200 OK",
            &["Content-Type: text/plain"],
            b"hello",
        )],
    );
    let invoke_ctx = invoke_first_block(&ctx, &script);
    assert_eq!(invoke_ctx.doc().unwrap().serialize_root(), "<text>hello</text>");
}

#[test]
fn empty_text_response_is_empty_element() {
    let (_, ctx, script) = setup(
        SIMPLE_GET,
        &[],
        vec![http_response("200 OK", &["Content-Type: text/plain"], b"")],
    );
    let invoke_ctx = invoke_first_block(&ctx, &script);
    assert_eq!(invoke_ctx.doc().unwrap().serialize_root(), "<text/>");
}

#[test]
fn json_response_is_converted() {
    let (_, ctx, script) = setup(
        SIMPLE_GET,
        &[],
        vec![http_response(
            "200 OK",
            &["Content-Type: application/json"],
            br#"{"city":"moscow"}"#,
        )],
    );
    let invoke_ctx = invoke_first_block(&ctx, &script);
    assert_eq!(
        invoke_ctx.doc().unwrap().serialize_root(),
        "<data><city>moscow</city></data>"
    );
}

#[test]
fn unknown_content_type_is_an_error() {
    let (_, ctx, script) = setup(
        SIMPLE_GET,
        &[],
        vec![http_response(
            "200 OK",
            &["Content-Type: application/octet-stream"],
            b"\x01\x02",
        )],
    );
    let invoke_ctx = invoke_first_block(&ctx, &script);
    let error = invoke_ctx.error().unwrap();
    assert!(error.message().contains("format is not recognized"));
}

#[test]
fn status_4xx_is_invoke_error() {
    let (_, ctx, script) = setup(
        SIMPLE_GET,
        &[],
        vec![http_response("404 Not Found", &[], b"")],
    );
    let invoke_ctx = invoke_first_block(&ctx, &script);
    assert_eq!(invoke_ctx.error().unwrap().kind(), InvokeErrorKind::Error);
}

#[test]
fn status_5xx_is_retryable() {
    let (_, ctx, script) = setup(
        SIMPLE_GET,
        &[],
        vec![http_response("503 Service Unavailable", &[], b"")],
    );
    let invoke_ctx = invoke_first_block(&ctx, &script);
    assert_eq!(invoke_ctx.error().unwrap().kind(), InvokeErrorKind::Retry);
}

#[test]
fn not_modified_without_conditional_is_an_error() {
    let (_, ctx, script) = setup(SIMPLE_GET, &[], vec![http_response("304 Not Modified", &[], b"")]);
    let invoke_ctx = invoke_first_block(&ctx, &script);
    assert!(invoke_ctx
        .error()
        .unwrap()
        .message()
        .contains("if-modified-since was not sent"));
}

#[test]
fn not_modified_with_cached_copy_yields_unmodified_empty_doc() {
    let tagged = r#"<page xmlns:x="http://www.yandex.ru/xscript">
<x:http method="getHttp" tag="yes"><x:param type="string">http://upstream/x</x:param></x:http>
</page>"#;
    let (connector, ctx, script) = setup(
        tagged,
        &[],
        vec![http_response("304 Not Modified", &[], b"")],
    );
    let handler = script.blocks()[0].clone();
    let mut invoke_ctx = InvokeContext::new();
    handler.create_arg_list(&ctx, &mut invoke_ctx).unwrap();
    invoke_ctx.set_tagged(true);
    invoke_ctx.set_have_cached_copy(true);
    invoke_ctx.set_tag(Tag {
        last_modified: Some(std::time::SystemTime::UNIX_EPOCH),
        ..Tag::new()
    });

    let doc = handler.invoke(&ctx, &mut invoke_ctx).unwrap();
    assert!(doc.is_empty());
    assert!(!invoke_ctx.tag().modified);
    let sent = connector.request_text(0);
    assert!(sent.contains("If-Modified-Since: Thu, 01 Jan 1970"), "{sent}");
}

#[test]
fn retry_count_drives_three_attempts() {
    let retried = r#"<page xmlns:x="http://www.yandex.ru/xscript">
<x:http method="getHttp" retry-count="2"><x:param type="string">http://upstream/x</x:param></x:http>
</page>"#;
    let (connector, ctx, _script) = setup(
        retried,
        &[],
        vec![
            http_response("503 Service Unavailable", &[], b""),
            http_response("503 Service Unavailable", &[], b""),
            http_response("200 OK", &["Content-Type: text/xml"], b"<r/>"),
        ],
    );
    let response = ctx.response_arc();
    let invoker = Invoker::new(Arc::new(WorkerPool::new(2)));
    invoker.invoke(&ctx).unwrap();
    assert_eq!(connector.request_count(), 3);
    let body = String::from_utf8(response.body()).unwrap();
    assert!(body.contains("<r/>"), "{body}");
    assert_eq!(response.status(), 200);
}

#[test]
fn proxy_skips_hop_headers_and_xff_is_recalculated() {
    let proxied = r#"<page xmlns:x="http://www.yandex.ru/xscript">
<x:http method="getHttp" proxy="yes" x-forwarded-for="yes">
  <x:param type="string">http://upstream/x</x:param>
  <x:header id="X-Block-Header" type="string">from-block</x:header>
</x:http>
</page>"#;
    let (connector, ctx, script) = setup(
        proxied,
        &[
            "REMOTE_ADDR=10.1.2.3",
            "HTTP_HOST=front.example",
            "HTTP_CONNECTION=keep-alive",
            "HTTP_ACCEPT_ENCODING=gzip",
            "HTTP_USER_AGENT=tester/1.0",
            "HTTP_X_FORWARDED_FOR=203.0.113.9",
        ],
        vec![http_response("200 OK", &["Content-Type: text/xml"], b"<r/>")],
    );
    invoke_first_block(&ctx, &script);

    let sent = connector.request_text(0);
    // Host comes only from the URL authority
    assert!(sent.contains("Host: upstream\r\n"), "{sent}");
    assert!(!sent.contains("front.example"), "{sent}");
    assert!(!sent.contains("keep-alive"), "{sent}");
    assert!(!sent.contains("Accept-Encoding"), "{sent}");
    assert!(sent.contains("User-Agent: tester/1.0"), "{sent}");
    assert!(sent.contains("X-Block-Header: from-block"), "{sent}");
    // inbound chain extended with the peer address
    assert!(sent.contains("X-Forwarded-For: 203.0.113.9, 10.1.2.3"), "{sent}");
    assert!(sent.contains("Connection: close"), "{sent}");
}

#[test]
fn post_sends_form_encoded_query_params() {
    let posted = r#"<page xmlns:x="http://www.yandex.ru/xscript">
<x:http method="post">
  <x:param type="string">http://upstream/submit</x:param>
  <x:query-param id="city" type="string">москва</x:query-param>
  <x:query-param id="limit" type="string">10</x:query-param>
</x:http>
</page>"#;
    let (connector, ctx, script) = setup(
        posted,
        &[],
        vec![http_response("200 OK", &["Content-Type: text/xml"], b"<ok/>")],
    );
    invoke_first_block(&ctx, &script);

    let sent = connector.request_text(0);
    assert!(sent.starts_with("POST /submit HTTP/1.1\r\n"), "{sent}");
    assert!(
        sent.ends_with("city=%D0%BC%D0%BE%D1%81%D0%BA%D0%B2%D0%B0&limit=10"),
        "{sent}"
    );
}

#[test]
fn get_by_state_appends_state_entries() {
    let by_state = r#"<page xmlns:x="http://www.yandex.ru/xscript">
<x:http method="getByState"><x:param type="string">http://upstream/x</x:param></x:http>
</page>"#;
    let (connector, ctx, script) = setup(
        by_state,
        &[],
        vec![http_response("200 OK", &["Content-Type: text/xml"], b"<r/>")],
    );
    ctx.state().set_string("region", "msk");
    ctx.state().set_long("page", 2);
    invoke_first_block(&ctx, &script);

    let sent = connector.request_text(0);
    assert!(sent.starts_with("GET /x?page=2&region=msk HTTP/1.1\r\n"), "{sent}");
}

#[test]
fn file_scheme_is_rejected() {
    let file_url = r#"<page xmlns:x="http://www.yandex.ru/xscript">
<x:http method="getHttp"><x:param type="string">file:///etc/passwd</x:param></x:http>
</page>"#;
    let (connector, ctx, script) = setup(file_url, &[], vec![]);
    let invoke_ctx = invoke_first_block(&ctx, &script);
    assert!(invoke_ctx
        .error()
        .unwrap()
        .message()
        .contains("File scheme is not allowed"));
    assert_eq!(connector.request_count(), 0);
}

#[test]
fn bad_arity_is_critical() {
    let empty = r#"<page xmlns:x="http://www.yandex.ru/xscript">
<x:http method="getHttp"/>
</page>"#;
    let (_, ctx, script) = setup(empty, &[], vec![]);
    let invoke_ctx = invoke_first_block(&ctx, &script);
    assert_eq!(
        invoke_ctx.error().unwrap().kind(),
        InvokeErrorKind::Critical
    );
}
