pub mod apply;
pub mod char_index;
pub mod span;
