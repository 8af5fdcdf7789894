pub mod memory_sinks;
pub mod sequential_decode_executor;
pub mod text_sinks;
pub mod threaded_decode_executor;
