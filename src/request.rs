use std::fmt;

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::headers::{find_crlf, HeaderError, Headers};

const INITIAL_BUFFER_SIZE: usize = 1024;

#[derive(Error, Debug)]
pub enum RequestError {
    #[error("malformed request line: expected `METHOD SP target SP HTTP/1.1`")]
    MalformedRequestLine,

    #[error("invalid method: expected GET, POST, PATCH, PUT, or DELETE")]
    InvalidMethod,

    #[error("invalid request target: must start with '/'")]
    InvalidTarget,

    #[error("invalid http version: expected HTTP/1.1")]
    InvalidHttpVersion,

    #[error("invalid content-length: {value}")]
    InvalidContentLength { value: String },

    #[error("body shorter than reported content-length")]
    BodyShorterThanContentLength,

    #[error("incomplete request")]
    IncompleteRequest,

    #[error("trying to feed data to a finished parser")]
    UnexpectedStateDone,

    #[error(transparent)]
    Header(#[from] HeaderError),

    #[error("io error while reading request: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

impl Method {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PATCH" => Some(Self::Patch),
            "PUT" => Some(Self::Put),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: Method,
    pub request_target: String,
    pub http_version: String,
}

#[derive(Debug)]
pub struct Request {
    pub request_line: RequestLine,
    pub headers: Headers,
    pub body: Option<Bytes>,
}

impl Request {
    /// Assembles one request from `source`, reading as many times as the
    /// source needs to hand over the bytes. The source is read exactly up to
    /// the end of the request; anything buffered past it is discarded.
    pub async fn from_reader<R>(source: &mut R) -> Result<Self, RequestError>
    where
        R: AsyncRead + Unpin,
    {
        Parser::new().parse_from(source).await
    }

    /// A `GET <target> HTTP/1.1` request with no headers and no body, used
    /// when only the target could be recovered from a malformed request.
    pub(crate) fn minimal(target: String) -> Self {
        Self {
            request_line: RequestLine {
                method: Method::Get,
                request_target: target,
                http_version: "1.1".to_string(),
            },
            headers: Headers::new(),
            body: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initialized,
    ParsingRequestLine,
    ParsingHeaders,
    ParsingBody,
    Done,
}

/// Single-use incremental parser. States only move forward; a finished
/// parser rejects further input.
struct Parser {
    state: State,
    request_line: Option<RequestLine>,
    headers: Headers,
    body: BytesMut,
    content_length: Option<usize>,
}

impl Parser {
    fn new() -> Self {
        Self {
            state: State::Initialized,
            request_line: None,
            headers: Headers::new(),
            body: BytesMut::new(),
            content_length: None,
        }
    }

    async fn parse_from<R>(mut self, source: &mut R) -> Result<Request, RequestError>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; INITIAL_BUFFER_SIZE];
        let mut read_to = 0;

        loop {
            if read_to == buf.len() {
                buf.resize(buf.len() * 2, 0);
            }

            let n = source.read(&mut buf[read_to..]).await?;
            read_to += n;

            let consumed = self.advance(&buf[..read_to])?;
            buf.copy_within(consumed..read_to, 0);
            read_to -= consumed;

            if self.state == State::Done {
                break;
            }

            if n == 0 {
                self.handle_eof()?;
                break;
            }
        }

        self.into_request()
    }

    /// End of stream before the parser finished on its own. Completes a
    /// request whose body was never announced, otherwise fails; on success
    /// the parser is `Done`.
    fn handle_eof(&mut self) -> Result<(), RequestError> {
        match self.state {
            State::ParsingBody => match self.content_length {
                Some(expected) if self.body.len() < expected => {
                    Err(RequestError::BodyShorterThanContentLength)
                }
                _ => {
                    self.state = State::Done;
                    Ok(())
                }
            },
            _ => Err(RequestError::IncompleteRequest),
        }
    }

    fn advance(&mut self, data: &[u8]) -> Result<usize, RequestError> {
        if self.state == State::Done {
            return Err(RequestError::UnexpectedStateDone);
        }

        let mut total = 0;
        while self.state != State::Done {
            let consumed = self.parse_single(&data[total..])?;
            if consumed == 0 {
                break;
            }
            total += consumed;
        }

        Ok(total)
    }

    fn parse_single(&mut self, data: &[u8]) -> Result<usize, RequestError> {
        match self.state {
            State::Initialized | State::ParsingRequestLine => self.parse_request_line(data),
            State::ParsingHeaders => self.parse_headers(data),
            State::ParsingBody => self.parse_body(data),
            State::Done => Err(RequestError::UnexpectedStateDone),
        }
    }

    fn parse_request_line(&mut self, data: &[u8]) -> Result<usize, RequestError> {
        if self.state == State::Initialized {
            self.state = State::ParsingRequestLine;
        }

        let Some(line_end) = find_crlf(data) else {
            return Ok(0);
        };
        let line = std::str::from_utf8(&data[..line_end])
            .map_err(|_| RequestError::MalformedRequestLine)?;

        let parts: Vec<&str> = line.split(' ').collect();
        let (method, target, version) = match parts.as_slice() {
            [method, target, version] => (*method, *target, *version),
            _ => return Err(RequestError::MalformedRequestLine),
        };

        let method = Method::from_token(method).ok_or(RequestError::InvalidMethod)?;

        if target.is_empty() || !target.starts_with('/') {
            return Err(RequestError::InvalidTarget);
        }

        let http_version = match version.split_once('/') {
            Some(("HTTP", "1.1")) => "1.1".to_string(),
            _ => return Err(RequestError::InvalidHttpVersion),
        };

        self.request_line = Some(RequestLine {
            method,
            request_target: target.to_string(),
            http_version,
        });
        self.state = State::ParsingHeaders;
        Ok(line_end + 2)
    }

    /// Drives the header store over the unconsumed buffer. When the full
    /// section terminator is already buffered, store invocations are limited
    /// to that prefix; otherwise whatever is available gets fed.
    fn parse_headers(&mut self, data: &[u8]) -> Result<usize, RequestError> {
        match find_double_crlf(data) {
            Some(pos) => {
                let section = &data[..pos + 4];
                let mut total = 0;
                while total < section.len() {
                    let (consumed, done) = self.headers.parse(&section[total..])?;
                    total += consumed;
                    if done || consumed == 0 {
                        break;
                    }
                }
                self.state = State::ParsingBody;
                Ok(pos + 4)
            }
            None => {
                let mut total = 0;
                while total < data.len() {
                    let (consumed, done) = self.headers.parse(&data[total..])?;
                    if consumed == 0 && !done {
                        break;
                    }
                    total += consumed;
                    if done {
                        self.state = State::ParsingBody;
                        break;
                    }
                }
                Ok(total)
            }
        }
    }

    fn parse_body(&mut self, data: &[u8]) -> Result<usize, RequestError> {
        let expected = match self.content_length {
            Some(expected) => expected,
            None => match self.headers.get("content-length") {
                None => {
                    self.state = State::Done;
                    return Ok(0);
                }
                Some(raw) => {
                    let expected = raw.parse::<usize>().map_err(|_| {
                        RequestError::InvalidContentLength { value: raw.to_string() }
                    })?;
                    self.content_length = Some(expected);
                    self.body.reserve(expected);
                    expected
                }
            },
        };

        if self.body.len() == expected {
            self.state = State::Done;
            return Ok(0);
        }

        let take = (expected - self.body.len()).min(data.len());
        self.body.extend_from_slice(&data[..take]);
        if self.body.len() == expected {
            self.state = State::Done;
        }
        Ok(take)
    }

    fn into_request(self) -> Result<Request, RequestError> {
        let request_line = self.request_line.ok_or(RequestError::IncompleteRequest)?;
        let body = if self.content_length.is_some() {
            Some(self.body.freeze())
        } else {
            None
        };
        Ok(Request {
            request_line,
            headers: self.headers,
            body,
        })
    }
}

fn find_double_crlf(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|window| window == b"\r\n\r\n")
}
