//! Request body encoding and response body decoding.

pub mod decode;
pub mod encode;
pub mod node;

pub use decode::{decode, ContentKind, Data};
pub use encode::{encode_body, encode_query};
pub use node::{Lookup, Node};
