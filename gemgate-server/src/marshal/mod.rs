//! # Ruby Marshal encoding for the dependency API
//!
//! Bundler's legacy dependency endpoint answers with `Marshal.dump` output
//! (format 4.8) rather than JSON. This module produces that output
//! byte-for-byte for a list of [`GemMetadata`](crate::types::GemMetadata)
//! records:
//!
//! ```text
//! [
//!   {:name => "rack", :number => "2.0.1", :platform => "ruby",
//!    :dependencies => [["bar", "~> 1.0"]]},
//!   ...
//! ]
//! ```
//!
//! Every string is wrapped in an instance-variable envelope carrying the
//! UTF-8 encoding flag (`:E => true`), exactly as Ruby emits it. Symbols seen
//! earlier in the stream are written as symbol links.
//!
//! [`MarshalWriter`] is the low-level open/write/close encoder; it validates
//! the structure it is driven through and latches the first error.
//! [`write_dependencies`] drives it for a whole response.

mod dependencies;
mod writer;


pub use dependencies::{encode_dependencies, write_dependencies};
pub use writer::{MarshalError, MarshalWriter, MAJOR_VERSION, MINOR_VERSION};
