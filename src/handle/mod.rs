//! Buffer handle contract, test allocations and metadata mapping

pub mod alloc;
pub mod attr;
pub mod private;

pub use alloc::SharedBuffer;
pub use attr::{attributes, map_attributes, unmap_attributes};
pub use private::{BufferHandle, HandleId, NativeHandleHeader};
