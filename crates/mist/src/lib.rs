#![forbid(unsafe_code)]
#![deny(
    missing_copy_implementations,
    rustdoc::missing_crate_level_docs,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    unused_qualifications
)]

/*!
The mist block extension: computes XML fragments from request and
state without leaving the process. The set-state family writes typed
values into [`State`](xscript_core::State) and reports what it wrote;
the echo family mirrors request properties (query args, headers,
cookies, protocol) as `<prefix><arg name="…">value</arg></prefix>`
fragments, optionally copying them into state.
*/

mod mist_block;
pub use mist_block::{MistBlock, MistExtension};

mod prefix_node;
pub use prefix_node::PrefixNode;
