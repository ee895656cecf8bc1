pub mod html;

pub use html::{parse_snapshot, serialize_document};
