//! Per-block result carriers.

use crate::{ArgList, InvokeError, Meta, Tag};
use hashbrown::HashMap;
use xscript_xml::Document;

/// Everything one block invocation reads and produces: the evaluated
/// argument lists, the result document, the cache tag, the meta
/// document and the outcome flags.
#[derive(Debug, Default)]
pub struct InvokeContext {
    args: ArgList,
    extra_args: HashMap<String, ArgList>,
    multipart: bool,
    doc: Option<Document>,
    meta: Meta,
    tag: Tag,
    tagged: bool,
    have_cached_copy: bool,
    error: Option<InvokeError>,
    guard_failed: bool,
    skipped: bool,
}

impl InvokeContext {
    /// An empty carrier.
    pub fn new() -> Self {
        Self::default()
    }

    /// The positional arguments.
    pub fn args(&self) -> &ArgList {
        &self.args
    }

    /// Install the positional arguments.
    pub fn set_args(&mut self, args: ArgList) {
        self.args = args;
    }

    /// A named extension argument list (http headers, query params).
    pub fn extra_args(&self, name: &str) -> Option<&ArgList> {
        self.extra_args.get(name)
    }

    /// Install a named extension argument list.
    pub fn set_extra_args(&mut self, name: impl Into<String>, args: ArgList) {
        self.extra_args.insert(name.into(), args);
    }

    /// Whether the outbound post is multipart (never cacheable).
    pub fn multipart(&self) -> bool {
        self.multipart
    }

    /// Mark the outbound post multipart.
    pub fn set_multipart(&mut self, multipart: bool) {
        self.multipart = multipart;
    }

    /// The result document, when one was produced.
    pub fn doc(&self) -> Option<&Document> {
        self.doc.as_ref()
    }

    /// Install the result document.
    pub fn set_doc(&mut self, doc: Document) {
        self.doc = Some(doc);
    }

    /// Take the result document out.
    pub fn take_doc(&mut self) -> Option<Document> {
        self.doc.take()
    }

    /// The meta document.
    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    /// Mutable access to the meta document.
    pub fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }

    /// The cache tag.
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Replace the cache tag.
    pub fn set_tag(&mut self, tag: Tag) {
        self.tag = tag;
    }

    /// Reset the tag to its undefined state.
    pub fn reset_tag(&mut self) {
        self.tag = Tag::new();
    }

    /// Whether the block participates in caching.
    pub fn tagged(&self) -> bool {
        self.tagged
    }

    /// Set cache participation.
    pub fn set_tagged(&mut self, tagged: bool) {
        self.tagged = tagged;
    }

    /// Whether a stale cached copy exists for conditional
    /// revalidation.
    pub fn have_cached_copy(&self) -> bool {
        self.have_cached_copy
    }

    /// Record the presence of a stale cached copy.
    pub fn set_have_cached_copy(&mut self, have: bool) {
        self.have_cached_copy = have;
    }

    /// The recorded failure, if the block failed.
    pub fn error(&self) -> Option<&InvokeError> {
        self.error.as_ref()
    }

    /// Record a failure.
    pub fn set_error(&mut self, error: InvokeError) {
        self.error = Some(error);
    }

    /// Whether a guard suppressed the block.
    pub fn guard_failed(&self) -> bool {
        self.guard_failed
    }

    /// Record guard suppression.
    pub fn set_guard_failed(&mut self, failed: bool) {
        self.guard_failed = failed;
    }

    /// Whether cancellation suppressed the block.
    pub fn skipped(&self) -> bool {
        self.skipped
    }

    /// Record cancellation.
    pub fn set_skipped(&mut self, skipped: bool) {
        self.skipped = skipped;
    }
}
