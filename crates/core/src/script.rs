//! Parsed scripts.

use crate::{BlockCore, BlockHandler, Registry, ScriptError, XSCRIPT_NAMESPACE};
use hashbrown::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use xscript_xml::{Document, Node};

/// A parsed script: the template DOM, the block list in document
/// order, and the optional main stylesheet. Parsed once, shared
/// read-only across requests.
pub struct Script {
    path: PathBuf,
    doc: Document,
    blocks: Vec<Arc<dyn BlockHandler>>,
    stylesheet: Option<String>,
    modified: Option<SystemTime>,
}

impl std::fmt::Debug for Script {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Script")
            .field("path", &self.path)
            .field("blocks", &self.blocks.len())
            .field("stylesheet", &self.stylesheet)
            .finish()
    }
}

impl Script {
    /// Read and parse a script file.
    pub fn load(registry: &Registry, path: &Path) -> Result<Arc<Self>, ScriptError> {
        let source = std::fs::read_to_string(path)?;
        let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();
        let mut script = Self::parse_inner(registry, &source, path.to_path_buf())?;
        script.modified = modified;
        Ok(Arc::new(script))
    }

    /// Parse a script from memory under a display name.
    pub fn parse(
        registry: &Registry,
        source: &str,
        name: impl Into<PathBuf>,
    ) -> Result<Arc<Self>, ScriptError> {
        Ok(Arc::new(Self::parse_inner(registry, source, name.into())?))
    }

    fn parse_inner(
        registry: &Registry,
        source: &str,
        path: PathBuf,
    ) -> Result<Self, ScriptError> {
        let doc = Document::parse(source)?;
        let root = doc
            .root()
            .ok_or(ScriptError::Xml(xscript_xml::Error::NoRootElement))?;

        let mut prefixes: HashSet<String> = HashSet::new();
        prefixes.insert("xscript".to_owned());
        collect_xscript_prefixes(root, &mut prefixes);
        let is_xscript =
            |node: &Node| -> bool { node.prefix().is_some_and(|p| prefixes.contains(p)) };

        let stylesheet = root.attrs().iter().find_map(|(name, value)| {
            name.split_once(':')
                .filter(|(prefix, local)| prefixes.contains(*prefix) && *local == "stylesheet")
                .map(|_| value.clone())
        });

        let mut blocks: Vec<Arc<dyn BlockHandler>> = Vec::new();
        let mut path_stack: Vec<usize> = Vec::new();
        discover_blocks(registry, root, &is_xscript, &mut path_stack, &mut blocks)?;

        log::debug!(
            "parsed script {} with {} blocks",
            path.display(),
            blocks.len()
        );
        Ok(Self {
            path,
            doc,
            blocks,
            stylesheet,
            modified: None,
        })
    }

    /// The script's path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The script's display name.
    pub fn name(&self) -> String {
        self.path.display().to_string()
    }

    /// The template DOM (block placeholders still in place).
    pub fn doc(&self) -> &Document {
        &self.doc
    }

    /// The blocks in document order.
    pub fn blocks(&self) -> &[Arc<dyn BlockHandler>] {
        &self.blocks
    }

    /// The main stylesheet declared on the root element, if any.
    pub fn stylesheet(&self) -> Option<&str> {
        self.stylesheet.as_deref()
    }

    /// The script file's mtime, when loaded from disk.
    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }
}

fn collect_xscript_prefixes(node: &Node, prefixes: &mut HashSet<String>) {
    for (name, value) in node.attrs() {
        if let Some(prefix) = name.strip_prefix("xmlns:") {
            if value == XSCRIPT_NAMESPACE {
                prefixes.insert(prefix.to_owned());
            }
        }
    }
    for child in node.elements() {
        collect_xscript_prefixes(child, prefixes);
    }
}

fn discover_blocks(
    registry: &Registry,
    node: &Node,
    is_xscript: &dyn Fn(&Node) -> bool,
    path_stack: &mut Vec<usize>,
    blocks: &mut Vec<Arc<dyn BlockHandler>>,
) -> Result<(), ScriptError> {
    for (element_index, child) in node.elements().enumerate() {
        path_stack.push(element_index);
        if is_xscript(child) {
            let extension_name = child.local_name().to_owned();
            let extension = registry
                .extension(&extension_name)
                .ok_or(ScriptError::UnknownExtension(extension_name))?;
            let (core, leftover) =
                BlockCore::parse(child, blocks.len(), path_stack.clone(), is_xscript)?;
            let handler = extension.create(core, child, leftover)?;
            blocks.push(handler);
            // no blocks inside blocks
        } else {
            discover_blocks(registry, child, is_xscript, path_stack, blocks)?;
        }
        path_stack.pop();
    }
    Ok(())
}
