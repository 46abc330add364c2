mod http_transport;

pub use http_transport::HttpTransport;
