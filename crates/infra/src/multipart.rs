//! `multipart/form-data` bodies and multipart response splitting
//!
//! Bodies are built in memory so they can be replayed by the retrying
//! client.

use bytes::{BufMut, Bytes, BytesMut};
use pangea_domain::constants::CONTENT_TYPE_JSON;
use pangea_domain::{PangeaError, Result};
use rand::Rng;

const CRLF: &[u8] = b"\r\n";

/// Incremental writer for a `multipart/form-data` body
#[derive(Debug)]
pub struct MultipartWriter {
    boundary: String,
    body: BytesMut,
}

impl Default for MultipartWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartWriter {
    /// Writer with a random boundary
    pub fn new() -> Self {
        let token: [u8; 16] = rand::thread_rng().gen();
        Self::with_boundary(format!("pangea-{}", hex::encode(token)))
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self { boundary: boundary.into(), body: BytesMut::new() }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// `Content-Type` header value for the finished body
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Plain form field without a content type
    pub fn text_field(&mut self, name: &str, value: &str) -> &mut Self {
        self.part(name, None, None, value.as_bytes())
    }

    /// Form field carrying a JSON document
    pub fn json_field(&mut self, name: &str, json: &[u8]) -> &mut Self {
        self.part(name, None, Some(CONTENT_TYPE_JSON), json)
    }

    /// File field with a filename and content type
    pub fn file_field(
        &mut self,
        name: &str,
        filename: &str,
        content_type: &str,
        content: &[u8],
    ) -> &mut Self {
        self.part(name, Some(filename), Some(content_type), content)
    }

    fn part(
        &mut self,
        name: &str,
        filename: Option<&str>,
        content_type: Option<&str>,
        content: &[u8],
    ) -> &mut Self {
        self.body.put_slice(b"--");
        self.body.put_slice(self.boundary.as_bytes());
        self.body.put_slice(CRLF);

        let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", quote(name));
        if let Some(filename) = filename {
            disposition.push_str(&format!("; filename=\"{}\"", quote(filename)));
        }
        self.body.put_slice(disposition.as_bytes());
        self.body.put_slice(CRLF);
        if let Some(content_type) = content_type {
            self.body.put_slice(format!("Content-Type: {content_type}").as_bytes());
            self.body.put_slice(CRLF);
        }
        self.body.put_slice(CRLF);
        self.body.put_slice(content);
        self.body.put_slice(CRLF);
        self
    }

    /// Close the body with the final delimiter
    pub fn finish(mut self) -> Bytes {
        self.body.put_slice(b"--");
        self.body.put_slice(self.boundary.as_bytes());
        self.body.put_slice(b"--");
        self.body.put_slice(CRLF);
        self.body.freeze()
    }
}

fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"").replace(['\r', '\n'], " ")
}

/// Parsed `Content-Disposition` header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentDisposition {
    pub disposition: String,
    pub name: Option<String>,
    pub filename: Option<String>,
}

/// Parse a `Content-Disposition` value; `filename*` (RFC 5987) wins over
/// `filename`
pub fn parse_content_disposition(value: &str) -> ContentDisposition {
    let mut params = split_params(value).into_iter();
    let mut parsed = ContentDisposition {
        disposition: params.next().map(|(key, _)| key.to_ascii_lowercase()).unwrap_or_default(),
        ..ContentDisposition::default()
    };
    let mut extended = None;

    for (key, value) in params {
        match key.to_ascii_lowercase().as_str() {
            "name" => parsed.name = Some(value),
            "filename" => parsed.filename = Some(value),
            "filename*" => extended = decode_ext_value(&value),
            _ => {}
        }
    }
    if extended.is_some() {
        parsed.filename = extended;
    }
    parsed
}

/// `key=value` pairs of a header, honouring quoted strings; the first
/// entry is the bare token before the first `;`
fn split_params(value: &str) -> Vec<(String, String)> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for ch in value.chars() {
        match ch {
            _ if escaped => {
                current.push(ch);
                escaped = false;
            }
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => items.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    items.push(current);

    items
        .into_iter()
        .map(|item| match item.split_once('=') {
            Some((key, value)) => (key.trim().to_string(), value.trim().to_string()),
            None => (item.trim().to_string(), String::new()),
        })
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

/// Decode `charset'lang'percent-encoded`; ISO-8859-1 bytes map one to
/// one onto code points, anything else must be UTF-8
fn decode_ext_value(value: &str) -> Option<String> {
    let mut pieces = value.splitn(3, '\'');
    let charset = pieces.next()?;
    let _language = pieces.next()?;
    let bytes = urlencoding::decode_binary(pieces.next()?.as_bytes());

    if charset.eq_ignore_ascii_case("iso-8859-1") || charset.eq_ignore_ascii_case("latin1") {
        Some(bytes.iter().copied().map(char::from).collect())
    } else {
        String::from_utf8(bytes.into_owned()).ok()
    }
}

/// Extract the `boundary` parameter of a multipart content type
pub fn parse_boundary(content_type: &str) -> Option<String> {
    split_params(content_type)
        .into_iter()
        .skip(1)
        .find(|(key, _)| key.eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

/// One part of a multipart body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// Header names lowercased, in order
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Part {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(key, _)| key.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn disposition(&self) -> ContentDisposition {
        self.header("content-disposition").map(parse_content_disposition).unwrap_or_default()
    }
}

/// Split a multipart body into its parts, in transmission order
///
/// # Errors
///
/// [`PangeaError::Unmarshal`] when the opening delimiter is missing or a
/// part has no header terminator.
pub fn split(body: &Bytes, boundary: &str) -> Result<Vec<Part>> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();
    let malformed = |message: &str| PangeaError::Unmarshal {
        message: format!("malformed multipart body: {message}"),
        body: body.to_vec(),
    };

    let start = find(body, delimiter, 0).ok_or_else(|| malformed("opening boundary not found"))?;
    let mut pos = start + delimiter.len();
    let mut parts = Vec::new();

    loop {
        if body[pos..].starts_with(b"--") {
            break;
        }
        pos = skip_line_break(body, pos);

        let mut closing = Vec::with_capacity(delimiter.len() + 2);
        closing.extend_from_slice(CRLF);
        closing.extend_from_slice(delimiter);
        let (end, next) = match find(body, &closing, pos) {
            Some(end) => (end, end + closing.len()),
            None => {
                let mut bare = Vec::with_capacity(delimiter.len() + 1);
                bare.push(b'\n');
                bare.extend_from_slice(delimiter);
                let end = find(body, &bare, pos).ok_or_else(|| malformed("closing boundary not found"))?;
                (end, end + bare.len())
            }
        };

        parts.push(parse_part(body.slice(pos..end)).ok_or_else(|| malformed("part headers are not terminated"))?);
        pos = next;
        if pos >= body.len() {
            break;
        }
    }

    Ok(parts)
}

fn parse_part(raw: Bytes) -> Option<Part> {
    let (head_end, body_start) = match find(&raw, b"\r\n\r\n", 0) {
        Some(idx) => (idx, idx + 4),
        None if raw.starts_with(CRLF) => (0, 2),
        None => {
            let idx = find(&raw, b"\n\n", 0)?;
            (idx, idx + 2)
        }
    };
    let head = String::from_utf8_lossy(&raw[..head_end]);
    let headers = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect();
    Some(Part { headers, body: raw.slice(body_start..) })
}

fn skip_line_break(body: &[u8], pos: usize) -> usize {
    if body[pos..].starts_with(CRLF) {
        pos + 2
    } else if body[pos..].starts_with(b"\n") {
        pos + 1
    } else {
        pos
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from > haystack.len() {
        return None;
    }
    haystack[from..].windows(needle.len()).position(|window| window == needle).map(|idx| idx + from)
}
