pub mod channel_writer;
pub mod metadata;
