//! MIT ticket cache (ccache) files, versions 3 and 4.

pub mod locator;
pub mod parser;
pub mod types;
pub mod writer;

pub use locator::locate_ccache;
pub use parser::{parse_ccache_bytes, parse_ccache_file, ParseError};
pub use types::*;
pub use writer::{write_ccache_bytes, write_ccache_file};
