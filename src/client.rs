use crate::model::{Device, Network};
use crate::orchestrator::Dashboard;
use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue, LINK, USER_AGENT};
use reqwest::{Method, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

const API_KEY_HEADER: &str = "x-cisco-meraki-api-key";
const AGENT: &str = "ap-reboot/0.1";

#[derive(Debug, Clone)]
pub struct ResponseData {
    pub status: u16,
    pub body: String,
    pub json: Option<Value>,
}

impl ResponseData {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: Url,
    http: Client,
    api_key: String,
}

impl ApiClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        // Url::join drops the last segment unless the base ends with a slash.
        let mut normalized = base_url.trim_end_matches('/').to_string();
        normalized.push('/');
        let parsed = Url::parse(&normalized).context("parsing base URL")?;
        let http = Client::builder()
            .user_agent(HeaderValue::from_static(AGENT))
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            base_url: parsed,
            http,
            api_key: api_key.to_string(),
        })
    }

    /// GETs every page of a list endpoint, following `Link: <..>; rel=next`.
    pub fn get_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let mut url = self.url_for(path)?;
        let mut items = Vec::new();

        loop {
            let (response, headers) = self.send(Method::GET, url.clone(), Option::<&Value>::None)?;
            if !response.is_success() {
                bail!(
                    "GET {} returned HTTP {}: {}",
                    url.path(),
                    response.status,
                    response.body.trim()
                );
            }
            let page: Vec<T> = serde_json::from_str(&response.body)
                .with_context(|| format!("decoding response from {}", url.path()))?;
            debug!(path = url.path(), count = page.len(), "fetched page");
            items.extend(page);

            match next_link(&headers) {
                Some(next) => {
                    let next_url =
                        Url::parse(&next).with_context(|| format!("parsing next link `{next}`"))?;
                    // The API key header goes out with every page request.
                    if next_url.origin() != self.base_url.origin() {
                        bail!(
                            "refusing to follow next link to {} (API base is {})",
                            next_url.origin().ascii_serialization(),
                            self.base_url.origin().ascii_serialization()
                        );
                    }
                    url = next_url;
                }
                None => break,
            }
        }

        Ok(items)
    }

    pub fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: Option<&T>,
    ) -> Result<ResponseData> {
        self.request(Method::POST, path, body)
    }

    pub fn put_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<ResponseData> {
        self.request(Method::PUT, path, Some(body))
    }

    fn request<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&T>,
    ) -> Result<ResponseData> {
        let url = self.url_for(path)?;
        let (response, _) = self.send(method, url, body)?;
        Ok(response)
    }

    fn url_for(&self, path: &str) -> Result<Url> {
        let normalized = path.trim_start_matches('/');
        self.base_url
            .join(normalized)
            .with_context(|| format!("joining path `{}` to base URL", path))
    }

    /// Non-success statuses are returned, not raised; callers decide.
    fn send<T: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&T>,
    ) -> Result<(ResponseData, HeaderMap)> {
        let mut request = self
            .http
            .request(method, url)
            .header(API_KEY_HEADER, &self.api_key)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header(USER_AGENT, HeaderValue::from_static(AGENT));

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().context("sending request")?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let text = response.text().context("reading response body")?;
        let json = serde_json::from_str(&text).ok();

        Ok((
            ResponseData {
                status,
                body: text,
                json,
            },
            headers,
        ))
    }
}

impl Dashboard for ApiClient {
    fn networks(&self, org_id: &str) -> Result<Vec<Network>> {
        self.get_all(&format!("organizations/{org_id}/networks"))
            .with_context(|| format!("listing networks of organization {org_id}"))
    }

    fn devices(&self, network_id: &str) -> Result<Vec<Device>> {
        self.get_all(&format!("networks/{network_id}/devices"))
            .with_context(|| format!("listing devices of network {network_id}"))
    }

    fn reboot(&self, network_id: &str, serial: &str) -> Result<ResponseData> {
        self.post_json(
            &format!("networks/{network_id}/devices/{serial}/reboot"),
            Option::<&Value>::None,
        )
    }

    fn update_tags(&self, network_id: &str, tags: &[String]) -> Result<ResponseData> {
        self.put_json(
            &format!("networks/{network_id}"),
            &json!({ "tags": tags.join(" ") }),
        )
    }
}

fn next_link(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(|entry| {
            let mut parts = entry.split(';');
            let target = parts.next()?.trim();
            let is_next = parts.any(|p| {
                let p = p.trim();
                p == "rel=next" || p == "rel=\"next\""
            });
            if !is_next {
                return None;
            }
            target
                .strip_prefix('<')
                .and_then(|t| t.strip_suffix('>'))
                .map(str::to_string)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn base(server: &MockServer) -> String {
        format!("{}/api/v0", server.base_url())
    }

    #[test]
    fn sends_api_key_and_lists_networks() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v0/organizations/123/networks")
                .header("x-cisco-meraki-api-key", "test-key");
            then.status(200).json_body(json!([
                {"id": "N_1", "name": "HQ", "tags": " ap_reboot "},
                {"id": "N_2", "tags": null}
            ]));
        });

        let client = ApiClient::new(&base(&server), "test-key").unwrap();
        let networks = client.networks("123").unwrap();

        mock.assert();
        assert_eq!(networks.len(), 2);
        assert!(networks[0].has_tag("ap_reboot"));
        assert_eq!(networks[1].tags, None);
    }

    #[test]
    fn follows_next_links() {
        let server = MockServer::start();
        let next = format!("{}/api/v0/pages/devices?startingAfter=A", server.base_url());
        let first = server.mock(|when, then| {
            when.method(GET).path("/api/v0/networks/N_1/devices");
            then.status(200)
                .header("Link", format!("<{next}>; rel=next"))
                .json_body(json!([{"serial": "A", "model": "MR42"}]));
        });
        let second = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v0/pages/devices")
                .query_param("startingAfter", "A")
                .header("x-cisco-meraki-api-key", "k");
            then.status(200)
                .json_body(json!([{"serial": "B", "model": "MX64"}]));
        });

        let client = ApiClient::new(&base(&server), "k").unwrap();
        let devices = client.devices("N_1").unwrap();

        first.assert();
        second.assert();
        let serials: Vec<_> = devices.iter().map(|d| d.serial.as_str()).collect();
        assert_eq!(serials, ["A", "B"]);
    }

    #[test]
    fn rejects_next_link_to_another_origin() {
        let server = MockServer::start();
        let first = server.mock(|when, then| {
            when.method(GET).path("/api/v0/networks/N_1/devices");
            then.status(200)
                .header("Link", "<https://collector.example.net/devices?page=2>; rel=next")
                .json_body(json!([{"serial": "A", "model": "MR42"}]));
        });

        let client = ApiClient::new(&base(&server), "k").unwrap();
        let err = client.devices("N_1").unwrap_err();

        first.assert();
        let message = format!("{err:#}");
        assert!(message.contains("refusing to follow next link to https://collector.example.net"));
    }

    #[test]
    fn list_failure_is_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/v0/organizations/9/networks");
            then.status(404).body(r#"{"errors": ["Not found"]}"#);
        });

        let client = ApiClient::new(&base(&server), "k").unwrap();
        let err = client.networks("9").unwrap_err();
        assert!(format!("{err:#}").contains("HTTP 404"));
    }

    #[test]
    fn reboot_posts_with_json_content_type() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/v0/networks/N_1/devices/Q2XX-AAAA-BBBB/reboot")
                .header("x-cisco-meraki-api-key", "abc")
                .header("Content-Type", "application/json");
            then.status(202).json_body(json!({"success": true}));
        });

        let client = ApiClient::new(&base(&server), "abc").unwrap();
        let response = client.reboot("N_1", "Q2XX-AAAA-BBBB").unwrap();

        mock.assert();
        assert_eq!(response.status, 202);
        assert_eq!(response.json.unwrap()["success"], true);
    }

    #[test]
    fn reboot_failure_is_returned_not_raised() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/v0/networks/N_1/devices/A/reboot");
            then.status(429).body(r#"{"errors": ["Too many requests"]}"#);
        });

        let client = ApiClient::new(&base(&server), "abc").unwrap();
        let response = client.reboot("N_1", "A").unwrap();
        assert_eq!(response.status, 429);
        assert!(!response.is_success());
    }

    #[test]
    fn update_tags_sends_space_separated_string() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(PUT)
                .path("/api/v0/networks/N_1")
                .json_body(json!({"tags": "lab office"}));
            then.status(200).json_body(json!({"id": "N_1", "tags": " lab office "}));
        });

        let client = ApiClient::new(&base(&server), "abc").unwrap();
        let response = client
            .update_tags("N_1", &["lab".to_string(), "office".to_string()])
            .unwrap();

        mock.assert();
        assert!(response.is_success());
    }

    #[test]
    fn parses_quoted_and_bare_rel() {
        let mut headers = HeaderMap::new();
        headers.insert(
            LINK,
            HeaderValue::from_static(
                "<https://x.test/p?a=1>; rel=first, <https://x.test/p?a=2>; rel=\"next\"",
            ),
        );
        assert_eq!(next_link(&headers).as_deref(), Some("https://x.test/p?a=2"));
        assert_eq!(next_link(&HeaderMap::new()), None);
    }
}
