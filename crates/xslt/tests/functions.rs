use pretty_assertions::assert_eq;
use std::sync::Arc;
use xscript_core::{Context, Registry, RequestData, Script};
use xscript_http::{Encoder, KnownHeaderName, Request};
use xscript_xml::Child;
use xscript_xslt::{
    LocalArgs, TransformContext, XsltFunctionRegistry, XsltValue, MAX_TRANSFORM_DEPTH,
};

fn context(env: &[&str]) -> Arc<Context> {
    let registry = Registry::new();
    let script = Script::parse(&registry, "<page/>", "page.xml").unwrap();
    let mut lines = vec!["REQUEST_METHOD=GET"];
    lines.extend_from_slice(env);
    let request = Request::from_env_lines(&lines, Vec::new(), &Encoder::cp1251()).unwrap();
    Context::new(script, RequestData::new(request))
}

fn tc(ctx: &Arc<Context>) -> TransformContext {
    TransformContext::new(ctx.clone(), Arc::new(XsltFunctionRegistry::with_builtins()))
}

fn s(value: &str) -> XsltValue {
    XsltValue::from(value)
}

#[test]
fn header_out_and_redirect() {
    let ctx = context(&[]);
    let tc = tc(&ctx);

    tc.call("http-header-out", &[s("X-Generator"), s("engine")]);
    assert_eq!(ctx.response().header("X-Generator").unwrap(), "engine");

    tc.call("http-redirect", &[s("/new")]);
    assert_eq!(ctx.response().status(), 302);
    assert_eq!(
        ctx.response().header(KnownHeaderName::Location).unwrap(),
        "/new"
    );

    // after the body is written, mutations fail quietly (logged) and
    // the response keeps its state
    ctx.response().write(b"body").unwrap();
    tc.call("set-http-status", &[s("500")]);
    tc.call("http-header-out", &[s("X-Late"), s("1")]);
    assert_eq!(ctx.response().status(), 302);
    assert_eq!(ctx.response().header("X-Late"), None);
}

#[test]
fn state_readers_and_writers() {
    let ctx = context(&[]);
    let tc = tc(&ctx);

    let written = tc.call("set-state-string", &[s("k"), s("v")]);
    assert_eq!(written, s("v"));
    assert_eq!(tc.call("get-state-arg", &[s("k")]), s("v"));
    assert_eq!(ctx.state().as_string("k"), "v");
}

#[test]
fn request_readers() {
    let ctx = context(&[
        "QUERY_STRING=text=moscow",
        "HTTP_HOST=h.example",
        "HTTP_COOKIE=lang=ru",
        "SCRIPT_NAME=/page",
    ]);
    let tc = tc(&ctx);
    assert_eq!(tc.call("get-query-arg", &[s("text")]), s("moscow"));
    assert_eq!(tc.call("get-header", &[s("Host")]), s("h.example"));
    assert_eq!(tc.call("get-cookie", &[s("lang")]), s("ru"));
    assert_eq!(tc.call("get-protocol-arg", &[s("method")]), s("GET"));
    assert_eq!(tc.call("get-protocol-arg", &[s("path")]), s("/page"));
}

#[test]
fn local_args() {
    let ctx = context(&[]);
    let mut args = hashbrown::HashMap::new();
    args.insert("profile".to_owned(), "text".to_owned());
    ctx.insert_param(LocalArgs::PARAM_NAME, LocalArgs(args))
        .unwrap();
    let tc = tc(&ctx);
    assert_eq!(tc.call("get-local-arg", &[s("profile")]), s("text"));
    assert_eq!(tc.call("get-local-arg", &[s("missing")]), s(""));
}

#[test]
fn string_transforms() {
    let ctx = context(&[]);
    let tc = tc(&ctx);

    assert_eq!(tc.call("urlencode", &[s("a b")]), s("a%20b"));
    assert_eq!(tc.call("urldecode", &[s("a%20b")]), s("a b"));
    assert_eq!(tc.call("xmlescape", &[s("a<b&c")]), s("a&lt;b&amp;c"));
    assert_eq!(tc.call("js-quote", &[s("a'b\nc")]), s("a\\'b\\nc"));
    assert_eq!(tc.call("json-quote", &[s("say \"hi\"")]), s("\"say \\\"hi\\\"\""));
    assert_eq!(
        tc.call("md5", &[s("")]),
        s("d41d8cd98f00b204e9800998ecf8427e")
    );
}

#[test]
fn conditional_and_depth() {
    let ctx = context(&[]);
    let tc = tc(&ctx);

    assert_eq!(tc.call("if", &[XsltValue::Bool(true), s("yes"), s("no")]), s("yes"));
    assert_eq!(tc.call("if", &[XsltValue::Bool(false), s("yes"), s("no")]), s("no"));
    assert_eq!(tc.call("if", &[XsltValue::Bool(false), s("yes")]), XsltValue::Empty);

    assert_eq!(
        tc.call("remained-depth", &[]),
        XsltValue::Number(MAX_TRANSFORM_DEPTH as f64)
    );
}

#[test]
fn node_producing_functions() {
    let ctx = context(&[]);
    let tc = tc(&ctx);

    let parsed = tc.call("xmlparse", &[s("<r><a/></r>")]);
    match parsed {
        XsltValue::NodeSet(nodes) => {
            assert_eq!(nodes.len(), 1);
            match &nodes[0] {
                Child::Element(node) => assert_eq!(node.name(), "r"),
                Child::Text(_) => panic!("expected element"),
            }
        }
        other => panic!("expected node set, got {other:?}"),
    }

    let broken = tc.call("nl2br", &[s("one\ntwo")]);
    match broken {
        XsltValue::NodeSet(children) => {
            assert_eq!(children.len(), 3);
            assert!(matches!(&children[1], Child::Element(n) if n.name() == "br"));
        }
        other => panic!("expected node set, got {other:?}"),
    }

    let wrapped = tc.call("wbr", &[s("abcdefgh"), s("3")]);
    match wrapped {
        XsltValue::NodeSet(children) => {
            // abc <wbr/> def <wbr/> gh
            assert_eq!(children.len(), 5);
        }
        other => panic!("expected node set, got {other:?}"),
    }
}

#[test]
fn arity_failures_yield_empty() {
    let ctx = context(&[]);
    let tc = tc(&ctx);
    assert_eq!(tc.call("md5", &[]), XsltValue::Empty);
    assert_eq!(tc.call("if", &[s("only-one")]), XsltValue::Empty);
    assert_eq!(tc.call("no-such-function", &[]), XsltValue::Empty);
}
