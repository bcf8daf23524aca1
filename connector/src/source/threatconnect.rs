use super::{FetchError, IndicatorSource};
use crate::types::{now_unix_s, IndicatorType, RawIndicator};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::blocking::{Client, Response};
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use reqwest::redirect::Policy;
use reqwest::Url;
use ring::hmac;
use serde::Deserialize;
use std::io::Read;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

const BULK_PATH: &str = "v2/indicators/bulk/json";
const MAX_BULK_BYTES: usize = 64 * 1024 * 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_RATING: f64 = 5.0;

/// Client for the ThreatConnect v2 REST API, signing each request with the
/// account's access id and secret key.
pub struct ThreatConnectClient {
  http: Client,
  base_url: Url,
  access_id: String,
  secret_key: String,
  owner: String,
}

impl ThreatConnectClient {
  pub fn new(
    base_url: &str,
    access_id: &str,
    secret_key: &str,
    owner: &str,
  ) -> Result<Self, FetchError> {
    let url = Url::parse(base_url).map_err(|e| FetchError::Url {
      url: base_url.to_string(),
      reason: e.to_string(),
    })?;
    validate_base_url(&url)?;

    let http = Client::builder()
      .timeout(REQUEST_TIMEOUT)
      .redirect(Policy::none())
      .build()
      .map_err(FetchError::Client)?;

    Ok(Self {
      http,
      base_url: url,
      access_id: access_id.to_string(),
      secret_key: secret_key.to_string(),
      owner: owner.to_string(),
    })
  }

  fn bulk_url(&self) -> Url {
    let mut url = self.base_url.clone();
    let path = format!("{}/{BULK_PATH}", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url
      .query_pairs_mut()
      .clear()
      .append_pair("owner", &self.owner);
    url
  }

  fn get_signed(&self, url: &Url) -> Result<Response, FetchError> {
    let timestamp = now_unix_s();
    let authorization = authorization_header(
      &self.access_id,
      &self.secret_key,
      &signed_path(url),
      "GET",
      timestamp,
    );

    let response = self
      .http
      .get(url.clone())
      .header(USER_AGENT, format!("tc-connector/{}", env!("CARGO_PKG_VERSION")))
      .header("Timestamp", timestamp.to_string())
      .header(AUTHORIZATION, authorization)
      .send()
      .map_err(|source| FetchError::Http {
        url: safe_url_label(url),
        source,
      })?;

    if response.status().as_u16() != 200 {
      return Err(FetchError::Status {
        status: response.status().as_u16(),
        url: safe_url_label(url),
      });
    }

    Ok(response)
  }
}

impl IndicatorSource for ThreatConnectClient {
  fn fetch_indicators(&self, types: &[IndicatorType]) -> Result<Vec<RawIndicator>, FetchError> {
    let url = self.bulk_url();
    tracing::debug!(url = %safe_url_label(&url), "requesting bulk indicators");

    let response = self.get_signed(&url)?;
    let body = read_response_with_limit(response, MAX_BULK_BYTES)?;
    let indicators = parse_bulk(&body, types, now_unix_s())?;

    tracing::debug!(count = indicators.len(), "bulk indicators decoded");
    Ok(indicators)
  }
}

fn validate_base_url(url: &Url) -> Result<(), FetchError> {
  let bad = |reason: &str| FetchError::Url {
    url: url.to_string(),
    reason: reason.to_string(),
  };

  if url.scheme() != "https" && url.scheme() != "http" {
    return Err(bad("scheme must be http or https"));
  }
  if url.host_str().is_none() {
    return Err(bad("host missing"));
  }
  Ok(())
}

/// The request target covered by the signature: path plus query string.
fn signed_path(url: &Url) -> String {
  match url.query() {
    Some(q) => format!("{}?{q}", url.path()),
    None => url.path().to_string(),
  }
}

fn authorization_header(
  access_id: &str,
  secret_key: &str,
  path: &str,
  method: &str,
  timestamp: i64,
) -> String {
  let message = format!("{path}:{method}:{timestamp}");
  format!("TC {access_id}:{}", sign(secret_key, &message))
}

fn sign(secret_key: &str, message: &str) -> String {
  let key = hmac::Key::new(hmac::HMAC_SHA256, secret_key.as_bytes());
  let tag = hmac::sign(&key, message.as_bytes());
  STANDARD.encode(tag.as_ref())
}

fn read_response_with_limit(response: Response, max_bytes: usize) -> Result<Vec<u8>, FetchError> {
  let mut out = Vec::new();
  let mut limited = response.take((max_bytes.saturating_add(1)) as u64);
  limited.read_to_end(&mut out)?;

  if out.len() > max_bytes {
    return Err(FetchError::TooLarge { max_bytes });
  }

  Ok(out)
}

fn safe_url_label(url: &Url) -> String {
  let host = url.host_str().unwrap_or("<no-host>");
  let mut path = url.path().to_string();
  if path.is_empty() {
    path = "/".to_string();
  }
  format!("{host}{path}")
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
  #[serde(default)]
  indicator: Vec<BulkIndicator>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BulkId {
  Number(u64),
  Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkIndicator {
  id: BulkId,
  #[serde(rename = "type")]
  kind: String,
  #[serde(default)]
  summary: String,
  #[serde(default)]
  rating: Option<f64>,
  #[serde(default)]
  description: Option<String>,
  #[serde(default)]
  web_link: Option<String>,
  #[serde(default)]
  date_added: Option<String>,
}

/// Decodes a bulk indicator download, keeping the requested types and
/// substituting defaults for missing fields. `fetched_at` stands in for an
/// absent or unreadable `dateAdded`.
fn parse_bulk(
  body: &[u8],
  types: &[IndicatorType],
  fetched_at: i64,
) -> Result<Vec<RawIndicator>, FetchError> {
  let bulk: BulkResponse = serde_json::from_slice(body)?;

  let mut out = Vec::with_capacity(bulk.indicator.len());
  for item in bulk.indicator {
    let kind = IndicatorType::from(item.kind.as_str());
    if !types.contains(&kind) {
      continue;
    }

    let id = match item.id {
      BulkId::Number(n) => n.to_string(),
      BulkId::Text(s) => s,
    };

    let value = match kind {
      IndicatorType::File => match md5_component(&item.summary) {
        Some(md5) => md5.to_string(),
        None => {
          tracing::warn!(id = %id, "file indicator has no md5 hash; skipped");
          continue;
        }
      },
      _ => item.summary.trim().to_string(),
    };

    let date_added = item
      .date_added
      .as_deref()
      .and_then(|raw| OffsetDateTime::parse(raw, &Rfc3339).ok())
      .map(|dt| dt.unix_timestamp())
      .unwrap_or(fetched_at);

    out.push(RawIndicator {
      id,
      kind,
      value,
      rating: rating_scale(item.rating),
      description: item.description,
      web_link: item.web_link,
      date_added,
    });
  }

  Ok(out)
}

/// File summaries list their hashes as `md5 : sha1 : sha256`, any of which
/// may be absent.
fn md5_component(summary: &str) -> Option<&str> {
  summary
    .split(':')
    .map(str::trim)
    .find(|part| part.len() == 32 && part.chars().all(|c| c.is_ascii_hexdigit()))
}

fn rating_scale(rating: Option<f64>) -> f64 {
  rating.unwrap_or(0.0).clamp(0.0, MAX_RATING)
}
