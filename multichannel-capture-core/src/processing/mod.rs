pub mod demux;
pub mod period_assembler;
pub mod raw_format;
pub mod transfer_queue;
