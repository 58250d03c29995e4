use std::sync::Mutex;
use std::time::Duration;

use http::header::{CONNECTION, HeaderName, HeaderValue};
use http::{HeaderMap, Uri};
use tokio::time::Instant;

use crate::error::{Error, TransportErrorKind};

const MAX_ERROR_BODY_LEN: usize = 2048;
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Deadline `timeout` from `now`, saturating at roughly thirty years out.
pub(crate) fn deadline_after(now: Instant, timeout: Duration) -> Instant {
    now.checked_add(timeout)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

pub(crate) fn merge_headers(default_headers: &HeaderMap, batch_headers: &HeaderMap) -> HeaderMap {
    let mut merged = default_headers.clone();
    for (name, value) in batch_headers {
        merged.insert(name.clone(), value.clone());
    }
    merged
}

pub(crate) fn ensure_keep_alive(headers: &mut HeaderMap) {
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
}

pub(crate) fn redact_uri_for_logs(uri_text: &str) -> String {
    let Ok(mut parsed) = url::Url::parse(uri_text) else {
        return uri_text.split('?').next().unwrap_or(uri_text).to_owned();
    };

    let _ = parsed.set_username("");
    let _ = parsed.set_password(None);
    parsed.set_query(None);
    parsed.set_fragment(None);
    parsed.to_string()
}

pub(crate) fn resolve_target_uri(
    base_url: &str,
    path: &str,
    query_pairs: &[(String, String)],
) -> Result<(String, Uri), Error> {
    let joined = join_base_path(base_url, path);
    let uri_text = append_query_pairs(&joined, query_pairs);
    if !(uri_text.starts_with("http://") || uri_text.starts_with("https://")) {
        return Err(Error::InvalidUri { uri: uri_text });
    }
    let uri = uri_text.parse().map_err(|_| Error::InvalidUri {
        uri: uri_text.clone(),
    })?;
    Ok((uri_text, uri))
}

pub(crate) fn join_base_path(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let relative = path.trim_start_matches('/');
    match (base.is_empty(), relative.is_empty()) {
        (true, true) => String::new(),
        (true, false) => relative.to_owned(),
        (false, true) => base.to_owned(),
        (false, false) => format!("{base}/{relative}"),
    }
}

pub(crate) fn append_query_pairs(uri_text: &str, query_pairs: &[(String, String)]) -> String {
    if query_pairs.is_empty() {
        return uri_text.to_owned();
    }

    let Ok(mut url) = url::Url::parse(uri_text) else {
        let separator = if uri_text.contains('?') { '&' } else { '?' };
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (name, value) in query_pairs {
            serializer.append_pair(name, value);
        }
        return format!("{uri_text}{separator}{}", serializer.finish());
    };

    {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in query_pairs {
            pairs.append_pair(name, value);
        }
    }
    url.to_string()
}

pub(crate) fn parse_header_name(name: &str) -> Result<HeaderName, Error> {
    name.parse()
        .map_err(|source| Error::InvalidHeaderName {
            name: name.to_owned(),
            source,
        })
}

pub(crate) fn parse_header_value(name: &str, value: &str) -> Result<HeaderValue, Error> {
    value
        .parse()
        .map_err(|source| Error::InvalidHeaderValue {
            name: name.to_owned(),
            source,
        })
}

pub(crate) fn classify_transport_error(
    error: &(dyn std::error::Error + Send + Sync + 'static),
) -> TransportErrorKind {
    if let Some(legacy) = error.downcast_ref::<hyper_util::client::legacy::Error>() {
        if legacy.is_connect() {
            let text = legacy.to_string().to_ascii_lowercase();
            if text.contains("dns")
                || text.contains("name or service not known")
                || text.contains("failed to lookup address")
            {
                return TransportErrorKind::Dns;
            }
            if text.contains("tls") || text.contains("certificate") || text.contains("handshake") {
                return TransportErrorKind::Tls;
            }
            return TransportErrorKind::Connect;
        }
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        return match io_error.kind() {
            std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::NotConnected => {
                TransportErrorKind::Connect
            }
            std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof => TransportErrorKind::Read,
            _ => TransportErrorKind::Other,
        };
    }

    let text = error.to_string().to_ascii_lowercase();
    if text.contains("read")
        || text.contains("connection reset")
        || text.contains("broken pipe")
        || text.contains("unexpected eof")
    {
        return TransportErrorKind::Read;
    }

    TransportErrorKind::Other
}

pub(crate) fn truncate_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.chars().count() <= MAX_ERROR_BODY_LEN {
        return text.into_owned();
    }

    let truncated: String = text.chars().take(MAX_ERROR_BODY_LEN).collect();
    format!("{truncated}...(truncated)")
}
