pub mod client;
pub mod scoring;
pub mod segmenter;
