mod binary;
mod file_source;
mod hash;

pub use binary::{
    read_i32_le, read_u16_be, read_u16_le, read_u32_be, read_u32_le, read_u64_be, read_u64_le,
};
pub use file_source::{read_to_vec, FileSource, RangeSource};
pub use hash::QuickHashBuilder;
