//! # hwspoof-core
//!
//! Everything the inception layer needs that does not touch libc:
//! path classification, synthetic payload generation, the cloaking
//! filters and the descriptor/directory virtualization tables.
//!
//! All functions here are safe to call from inside an interposed libc
//! entry point: classification never allocates and the tables only hold
//! their lock for a lookup plus a bounded copy.

pub mod buffer;
pub mod category;
pub mod classify;
pub mod cloak;
pub mod error;
pub mod generate;
pub mod overlay;
pub mod table;

pub use buffer::{BoundedBuf, SharedBuffer};
pub use category::SpoofCategory;
pub use classify::Classifier;
pub use error::{GenerateError, SeekError, TableError};
pub use generate::GeneratedContent;
pub use overlay::DirectoryOverlay;
pub use table::{DescriptorTable, VirtualDescriptor, Whence};
