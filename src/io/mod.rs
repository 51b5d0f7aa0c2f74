mod source;

pub use source::{ByteSource, ContentReader, FileContent, ReleasableRead};
