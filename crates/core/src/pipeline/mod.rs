pub mod decode_executor;
pub mod decode_logger;
pub mod decode_options;
pub mod decode_resources;
pub mod decode_session;
pub mod decode_statistics;
pub mod infrastructure;
pub mod output_sink;
pub mod utterance_decoder;
