//! Request path validation.
//!
//! Every inbound path is turned into an [`AssetLocator`] before anything
//! touches the network or the disk. The resolver decodes each segment on its
//! own, validates it, and only then joins the segments, so both the origin
//! URL and the cache file are derived from the same checked value.
//!
//! ```text
//! "/content/images/2021/foo%2Dbar.JPG"
//!          │
//!          ▼  split on '/', percent-decode each segment
//! ["content", "images", "2021", "foo-bar.JPG"]
//!          │
//!          ▼  prefix match, charset + traversal checks, extension
//! AssetLocator {
//!     relative:   "content/images/2021/foo-bar.JPG",
//!     kind:       Jpg,
//!     cache_path: <cache_root>/content/images/2021/foo-bar.JPG,
//! }
//! ```

mod resolver;

pub use resolver::{
    AssetLocator, MediaKind, PathResolver, DEFAULT_CONTENT_PREFIX, SUPPORTED_MEDIA_KINDS,
};
