pub mod png_seq;
pub mod source;
