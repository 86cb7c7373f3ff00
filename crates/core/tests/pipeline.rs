use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use xscript_core::{
    BlockCore, BlockExtension, BlockHandler, Context, InvokeContext, InvokeError, Invoker,
    Registry, RequestData, Script, ScriptError, WorkerPool,
};
use xscript_http::{Encoder, Request};
use xscript_xml::{Document, Node};

/// A block extension driving the pipeline from tests: methods cover
/// echoing, state writes, failures and slowness.
struct TestExtension {
    calls: Arc<AtomicUsize>,
}

struct TestHandler {
    core: BlockCore,
    calls: Arc<AtomicUsize>,
}

impl BlockExtension for TestExtension {
    fn name(&self) -> &'static str {
        "test"
    }

    fn create(
        &self,
        core: BlockCore,
        _element: &Node,
        _leftover: Vec<Node>,
    ) -> Result<Arc<dyn BlockHandler>, ScriptError> {
        match core.method.as_str() {
            "echo" | "setState" | "fail" | "failCritical" | "retryForever" | "slow" => {}
            other => return Err(ScriptError::UnknownMethod(other.to_owned())),
        }
        Ok(Arc::new(TestHandler {
            core,
            calls: self.calls.clone(),
        }))
    }
}

impl BlockHandler for TestHandler {
    fn core(&self) -> &BlockCore {
        &self.core
    }

    fn invoke(
        &self,
        ctx: &Arc<Context>,
        invoke_ctx: &mut InvokeContext,
    ) -> Result<Document, InvokeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.core.method.as_str() {
            "echo" => {
                let mut node = Node::new("echo");
                for arg in invoke_ctx.args().iter() {
                    node.push_element(Node::new("arg").with_text(arg));
                }
                Ok(Document::with_root(node))
            }
            "setState" => {
                let key = invoke_ctx.args().at(0).to_owned();
                let value = invoke_ctx.args().at(1).to_owned();
                ctx.state().set_string(&key, value);
                Ok(Document::with_root(Node::new("ok")))
            }
            "fail" => Err(InvokeError::new("deliberate failure").with("detail", "from test")),
            "failCritical" => Err(InvokeError::critical("deliberate critical failure")),
            "retryForever" => Err(InvokeError::retry("upstream unhappy")),
            "slow" => {
                std::thread::sleep(Duration::from_millis(300));
                Ok(Document::with_root(Node::new("slow")))
            }
            _ => unreachable!(),
        }
    }
}

fn registry(calls: Arc<AtomicUsize>) -> Registry {
    let mut registry = Registry::new();
    registry
        .register(Arc::new(TestExtension { calls }))
        .unwrap();
    registry
}

fn run(source: &str, env: &[&str]) -> (String, Arc<AtomicUsize>) {
    run_with_timeout(source, env, Duration::from_secs(5))
}

fn run_with_timeout(
    source: &str,
    env: &[&str],
    timeout: Duration,
) -> (String, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = registry(calls.clone());
    let script = Script::parse(&registry, source, "test.xml").unwrap();
    let mut lines = vec!["REQUEST_METHOD=GET"];
    lines.extend_from_slice(env);
    let request = Request::from_env_lines(&lines, Vec::new(), &Encoder::cp1251()).unwrap();
    let data = RequestData::new(request);
    let response = data.response.clone();
    let ctx = Context::with_timeout(script, data, timeout);

    let pool = Arc::new(WorkerPool::new(4));
    let invoker = Invoker::new(pool);
    invoker.invoke(&ctx).unwrap();

    let body = String::from_utf8(response.body()).unwrap();
    let body = body
        .strip_prefix("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n")
        .unwrap_or(&body)
        .to_owned();
    (body, calls)
}

#[test]
fn block_result_replaces_placeholder() {
    let (body, calls) = run(
        r#"<page xmlns:x="http://www.yandex.ru/xscript">
<x:test method="echo"><x:param type="string">moscow</x:param></x:test>
</page>"#,
        &[],
    );
    assert!(body.contains("<echo><arg>moscow</arg></echo>"), "{body}");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn query_arg_params_evaluate() {
    let (body, _) = run(
        r#"<page xmlns:x="http://www.yandex.ru/xscript">
<x:test method="echo"><x:param id="text" type="queryarg"/></x:test>
</page>"#,
        &["QUERY_STRING=text=hello"],
    );
    assert!(body.contains("<arg>hello</arg>"), "{body}");
}

#[test]
fn guard_passes_after_earlier_block_sets_state() {
    let source = r#"<page xmlns:x="http://www.yandex.ru/xscript">
<x:test method="setState">
  <x:param type="string">flag</x:param><x:param type="string">1</x:param>
</x:test>
<x:test method="echo"><x:guard state="flag" value="1"/><x:param type="string">guarded</x:param></x:test>
</page>"#;
    let (body, calls) = run(source, &[]);
    assert!(body.contains("<arg>guarded</arg>"), "{body}");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn failing_guard_removes_placeholder() {
    let source = r#"<page xmlns:x="http://www.yandex.ru/xscript">
<x:test method="setState">
  <x:param type="string">flag</x:param><x:param type="string">1</x:param>
</x:test>
<x:test method="echo"><x:guard state="flag" value="2"/><x:param type="string">guarded</x:param></x:test>
</page>"#;
    let (body, calls) = run(source, &[]);
    assert!(!body.contains("guarded"), "{body}");
    assert!(!body.contains("echo"), "{body}");
    // the guarded block is never invoked
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn plain_error_becomes_error_document() {
    let (body, _) = run(
        r#"<page xmlns:x="http://www.yandex.ru/xscript">
<x:test method="fail"/>
<x:test method="echo"><x:param type="string">alive</x:param></x:test>
</page>"#,
        &[],
    );
    assert!(
        body.contains("<xscript_invoke_failed error=\"deliberate failure\" detail=\"from test\"/>"),
        "{body}"
    );
    assert!(body.contains("<arg>alive</arg>"), "{body}");
}

#[test]
fn critical_error_aborts_request() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = registry(calls);
    let script = Script::parse(
        &registry,
        r#"<page xmlns:x="http://www.yandex.ru/xscript"><x:test method="failCritical"/></page>"#,
        "test.xml",
    )
    .unwrap();
    let request =
        Request::from_env_lines(&["REQUEST_METHOD=GET"], Vec::new(), &Encoder::cp1251()).unwrap();
    let ctx = Context::new(script, RequestData::new(request));
    let invoker = Invoker::new(Arc::new(WorkerPool::new(2)));
    assert!(invoker.invoke(&ctx).is_err());
}

#[test]
fn retry_errors_consume_attempts_then_demote() {
    let (body, calls) = run(
        r#"<page xmlns:x="http://www.yandex.ru/xscript">
<x:test method="retryForever" retry-count="2"/>
</page>"#,
        &[],
    );
    // initial attempt + two retries
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(body.contains("xscript_invoke_failed"), "{body}");
}

#[test]
fn threaded_blocks_run_in_parallel_and_splice_in_order() {
    let source = r#"<page xmlns:x="http://www.yandex.ru/xscript">
<x:test method="slow" threaded="yes"/>
<x:test method="slow" threaded="yes"/>
<x:test method="slow" threaded="yes"/>
<x:test method="echo" threaded="yes"><x:param type="string">last</x:param></x:test>
</page>"#;
    let start = std::time::Instant::now();
    let (body, _) = run(source, &[]);
    // three 300ms blocks in parallel should finish well under 900ms
    assert!(
        start.elapsed() < Duration::from_millis(800),
        "took {:?}",
        start.elapsed()
    );
    let slow_first = body.find("<slow/>").unwrap();
    let echo_pos = body.find("<echo>").unwrap();
    assert!(slow_first < echo_pos, "{body}");
}

#[test]
fn timed_out_block_reports_failure() {
    let source = r#"<page xmlns:x="http://www.yandex.ru/xscript">
<x:test method="slow" threaded="yes"/>
</page>"#;
    let (body, _) = run_with_timeout(source, &[], Duration::from_millis(50));
    assert!(
        body.contains("<xscript_invoke_failed error=\"block is timed out\""),
        "{body}"
    );
}

#[test]
fn xpointer_selects_from_result() {
    let (body, _) = run(
        r#"<page xmlns:x="http://www.yandex.ru/xscript">
<x:test method="echo" xpointer="/echo/arg">
  <x:param type="string">a</x:param><x:param type="string">b</x:param>
</x:test>
</page>"#,
        &[],
    );
    assert!(body.contains("<page>"), "{body}");
    assert!(body.contains("<arg>a</arg><arg>b</arg>"), "{body}");
    assert!(!body.contains("<echo>"), "{body}");
}

#[test]
fn context_param_bag_is_unique_per_name() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = registry(calls);
    let script = Script::parse(
        &registry,
        r#"<page xmlns:x="http://www.yandex.ru/xscript"/>"#,
        "test.xml",
    )
    .unwrap();
    let request =
        Request::from_env_lines(&["REQUEST_METHOD=GET"], Vec::new(), &Encoder::cp1251()).unwrap();
    let ctx = Context::new(script, RequestData::new(request));

    ctx.insert_param("counter", 41_i64).unwrap();
    assert!(ctx.insert_param("counter", 42_i64).is_err());
    assert_eq!(*ctx.param::<i64>("counter").unwrap(), 41);
    assert!(ctx.param::<String>("counter").is_none());

    let created = ctx.param_or_create("lazy", || "built".to_owned());
    assert_eq!(*created, "built");
}

#[test]
fn stopped_context_skips_blocks() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = registry(calls.clone());
    let script = Script::parse(
        &registry,
        r#"<page xmlns:x="http://www.yandex.ru/xscript"><x:test method="echo"/></page>"#,
        "test.xml",
    )
    .unwrap();
    let request =
        Request::from_env_lines(&["REQUEST_METHOD=GET"], Vec::new(), &Encoder::cp1251()).unwrap();
    let data = RequestData::new(request);
    let response = data.response.clone();
    let ctx = Context::new(script, data);
    ctx.stop_blocks();

    let invoker = Invoker::new(Arc::new(WorkerPool::new(2)));
    invoker.invoke(&ctx).unwrap();
    let body = String::from_utf8(response.body()).unwrap();
    // the block contributes neither output nor an error node
    assert!(!body.contains("echo"), "{body}");
    assert!(!body.contains("xscript_invoke_failed"), "{body}");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
