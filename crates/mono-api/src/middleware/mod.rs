pub mod request_context;

pub use request_context::{RequestContextLayer, RequestId, PROCESSING_TIME_HEADER, REQUEST_ID_HEADER};
