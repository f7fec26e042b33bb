//! HTTP clients for the services the relay depends on: the object-detection
//! endpoint, the chat webhook, and the weather provider.
//!
//! Each client owns its own error type so callers can decide per call site
//! whether a failure aborts the request or is logged and absorbed.

pub use detect::{
    BoundingBox, DetectClient, DetectError, DetectMode, PredictedClass, Prediction,
    PredictionBody, PredictionResponse, ResponseHead, ResponseStatus,
};
pub use notify::{NotifyClient, NotifyError};
pub use weather::{UNKNOWN_WEATHER, WeatherClient, WeatherError};

mod detect;
mod notify;
mod weather;

#[cfg(test)]
pub(crate) mod testing {
    use std::{
        io::{Read, Write},
        net::{TcpListener, TcpStream},
        thread::{self, JoinHandle},
    };

    /// One-shot HTTP stub: accepts a single connection, captures the raw
    /// request bytes, and answers with the canned status line and body.
    pub(crate) fn spawn_stub(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub listener");
        let addr = listener.local_addr().expect("stub listener addr");
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept stub connection");
            let request = read_request(&mut stream);
            let response = format!(
                "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream
                .write_all(response.as_bytes())
                .expect("write stub response");
            request
        });
        (format!("http://{addr}"), handle)
    }

    /// An address nothing is listening on, for connection-failure tests.
    pub(crate) fn refused_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind probe listener");
        let addr = listener.local_addr().expect("probe listener addr");
        drop(listener);
        format!("http://{addr}")
    }

    pub(crate) fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|window| window == needle)
    }

    fn read_request(stream: &mut TcpStream) -> Vec<u8> {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 1024];
        let header_end = loop {
            let read = stream.read(&mut chunk).expect("read stub request");
            if read == 0 {
                return buffer;
            }
            buffer.extend_from_slice(&chunk[..read]);
            if let Some(position) = buffer.windows(4).position(|window| window == b"\r\n\r\n") {
                break position + 4;
            }
        };

        let headers = String::from_utf8_lossy(&buffer[..header_end]).to_ascii_lowercase();
        let content_length = headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while buffer.len() < header_end + content_length {
            let read = stream.read(&mut chunk).expect("read stub request body");
            if read == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..read]);
        }
        buffer
    }
}
