pub mod ffmpeg;
pub mod png_seq;
pub mod sink;
