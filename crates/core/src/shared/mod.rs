pub mod constants;
pub mod decode_error;
