#![forbid(unsafe_code)]
#![deny(nonstandard_style, unused_qualifications)]

/*!
The stylesheet stage.

XSLT compilation and application are delegated to a pluggable
[`XsltEngine`]; what this crate owns is everything around it — the
compiled-stylesheet cache keyed by path and mtime, the per-transform
[`TransformContext`] binding a request [`Context`](xscript_core::Context)
to the running stylesheet, and the fixed set of extension functions a
stylesheet can call back into the engine with.
*/

mod value;
pub use value::XsltValue;

mod error;
pub use error::XsltError;

mod engine;
pub use engine::{CompiledTransform, FnEngine, NullEngine, XsltEngine};

mod transform_context;
pub use transform_context::{LocalArgs, TransformContext, MAX_TRANSFORM_DEPTH};

mod functions;
pub use functions::{register_builtin_functions, XsltFunctionRegistry};

mod stylesheet;
pub use stylesheet::StylesheetCache;
