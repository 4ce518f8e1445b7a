//! An HTTP/1.1 origin server built directly on TCP: an incremental request
//! parser, an ordered response writer with chunked encoding and trailers,
//! and a per-connection accept loop binding the two to application handlers.

pub mod handler;
pub mod headers;
pub mod request;
pub mod response;
pub mod server;

pub use handler::{ConnectionWriter, Handler};
pub use headers::{HeaderError, Headers};
pub use request::{Method, Request, RequestError, RequestLine};
pub use response::{ResponseWriter, StatusCode, WriteError};
pub use server::{serve, Server};
