//! phpIPAM API client
//!
//! Implements the phpIPAM REST API (`/api/{appID}/...`) with token
//! authentication. The token is obtained once in [`PhpIpamClient::connect`]
//! and refreshed at most once per call when phpIPAM rejects it.

use crate::config::IpamConfig;
use crate::error::IpamError;
use crate::ipam_trait::PhpIpamApi;
use crate::models::*;
use reqwest::{Client, Method, StatusCode};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// phpIPAM API client
pub struct PhpIpamClient {
    client: Client,
    base_url: String,
    app_id: String,
    username: String,
    password: String,
    token: RwLock<String>,
}

impl std::fmt::Debug for PhpIpamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhpIpamClient")
            .field("base_url", &self.base_url)
            .field("app_id", &self.app_id)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl PhpIpamClient {
    /// Create a new client and authenticate against phpIPAM.
    ///
    /// # Arguments
    /// * `config` - validated IPAM configuration
    ///
    /// # Returns
    /// * `Ok(PhpIpamClient)` - client holding a valid token
    /// * `Err(IpamError)` - if phpIPAM is unreachable or rejects the credentials
    pub async fn connect(config: &IpamConfig) -> Result<Self, IpamError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let (username, password) = config.credentials();

        let ipam = Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            app_id: config.app_id.clone(),
            username: username.to_string(),
            password: password.to_string(),
            token: RwLock::new(String::new()),
        };
        ipam.authenticate().await?;
        Ok(ipam)
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}/{}", self.base_url, self.app_id, path.trim_start_matches('/'))
    }

    /// Obtains a fresh token and stores it for subsequent calls.
    async fn authenticate(&self) -> Result<(), IpamError> {
        let url = self.url("user/");
        debug!("Requesting phpIPAM token from {}", url);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        let envelope = ApiResponse::from_body(&body).map_err(|e| {
            IpamError::Authentication(format!("token request returned {}: {}", status, e))
        })?;
        if !envelope.is_success() {
            return Err(IpamError::Authentication(format!(
                "error retrieving token: {} - {}",
                status,
                envelope.message()
            )));
        }
        let token: TokenData = envelope.into_data()?;

        *self.token.write().await = token.token;
        info!("Obtained phpIPAM token for app {}", self.app_id);
        Ok(())
    }

    /// Sends one request with the current token.
    async fn send_once(
        &self,
        method: Method,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<(StatusCode, ApiResponse), IpamError> {
        let url = self.url(path);
        debug!("Calling phpIPAM: {} {}", method, url);

        let token = self.token.read().await.clone();
        let mut request = self
            .client
            .request(method, &url)
            .header("token", token)
            .header("Accept", "application/json");
        if !form.is_empty() {
            request = request.form(form);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        let envelope = ApiResponse::from_body(&body)?;
        Ok((status, envelope))
    }

    /// Sends a request, re-authenticating once if the token was rejected.
    async fn call(&self, method: Method, path: &str, form: &[(&str, &str)]) -> Result<ApiResponse, IpamError> {
        let (status, envelope) = self.send_once(method.clone(), path, form).await?;
        if !is_auth_failure(status, &envelope) {
            return Ok(envelope);
        }

        warn!("phpIPAM rejected token ({}), re-authenticating", status);
        self.authenticate().await?;

        let (status, envelope) = self.send_once(method, path, form).await?;
        if is_auth_failure(status, &envelope) {
            return Err(IpamError::Authentication(format!(
                "token rejected after refresh: {} - {}",
                status,
                envelope.message()
            )));
        }
        Ok(envelope)
    }
}

fn is_auth_failure(status: StatusCode, envelope: &ApiResponse) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN || envelope.is_auth_failure()
}

#[async_trait::async_trait]
impl PhpIpamApi for PhpIpamClient {
    async fn reserve_first_free(&self, subnet_id: u64, owner: &str) -> Result<String, IpamError> {
        let path = format!("addresses/first_free/{}/", subnet_id);
        self.call(Method::POST, &path, &[("owner", owner)]).await?.into_data()
    }

    async fn get_subnet(&self, subnet_id: &str) -> Result<Subnet, IpamError> {
        let path = format!("subnets/{}/", subnet_id);
        self.call(Method::GET, &path, &[]).await?.into_data()
    }

    async fn search_address(&self, ip: &str) -> Result<Vec<Address>, IpamError> {
        let path = format!("addresses/search/{}/", ip);
        match self.call(Method::GET, &path, &[]).await?.into_result()? {
            Some(data) => serde_json::from_value(data)
                .map_err(|e| IpamError::Decode(format!("unexpected address search result: {}", e))),
            None => Ok(Vec::new()),
        }
    }

    async fn delete_address(&self, address_id: &str) -> Result<(), IpamError> {
        let path = format!("addresses/{}/", address_id);
        self.call(Method::DELETE, &path, &[]).await?.into_result()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const TOKEN_T1: &str = r#"{"code":200,"success":true,"data":{"token":"t1"}}"#;
    const TOKEN_T2: &str = r#"{"code":200,"success":true,"data":{"token":"t2"}}"#;
    const UNAUTHORIZED: &str = r#"{"code":401,"success":false,"message":"Unauthorized"}"#;
    const SUBNET_7: &str =
        r#"{"code":200,"success":true,"data":{"id":"7","subnet":"10.1.7.0","mask":"24","gateway":{"ip_addr":"10.1.7.1"}}}"#;

    /// phpIPAM stand-in answering one canned response per connection, in order
    struct CannedServer {
        url: String,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl CannedServer {
        /// Requests seen so far as `METHOD path token`, `-` when no token was sent
        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }

        fn config(&self) -> IpamConfig {
            IpamConfig::from_yaml(&format!(
                "phpIPAM:\n  url: {}\n  appID: overlay\n  username: u\n  password: p\n  subnetMap:\n    wdc04: [7]\n  timeoutSecs: 5\n",
                self.url
            ))
            .unwrap()
        }
    }

    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        let header_end = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed mid-request");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let header = |name: &str| {
            head.lines().find_map(|line| {
                let (key, value) = line.split_once(':')?;
                key.trim().eq_ignore_ascii_case(name).then(|| value.trim().to_string())
            })
        };
        let body_len: usize = header("content-length").map_or(0, |v| v.parse().unwrap());
        while buf.len() < header_end + body_len {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed mid-body");
            buf.extend_from_slice(&chunk[..n]);
        }

        let request_line: Vec<&str> = head.lines().next().unwrap_or_default().split_whitespace().collect();
        format!(
            "{} {} {}",
            request_line[0],
            request_line[1],
            header("token").unwrap_or_else(|| "-".to_string())
        )
    }

    async fn serve(responses: Vec<(u16, &'static str)>) -> CannedServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().await.unwrap();
                let request = read_request(&mut stream).await;
                seen.lock().unwrap().push(request);
                let reply = format!(
                    "HTTP/1.1 {} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                stream.write_all(reply.as_bytes()).await.unwrap();
                let _ = stream.shutdown().await;
            }
        });

        CannedServer { url, requests }
    }

    #[tokio::test]
    async fn test_rejected_token_is_refreshed_once() {
        let server = serve(vec![(200, TOKEN_T1), (401, UNAUTHORIZED), (200, TOKEN_T2), (200, SUBNET_7)]).await;
        let client = PhpIpamClient::connect(&server.config()).await.unwrap();

        let subnet = client.get_subnet("7").await.unwrap();

        assert_eq!(subnet.mask, "24");
        assert_eq!(
            server.requests(),
            vec![
                "POST /api/overlay/user/ -",
                "GET /api/overlay/subnets/7/ t1",
                "POST /api/overlay/user/ -",
                "GET /api/overlay/subnets/7/ t2",
            ]
        );
    }

    #[tokio::test]
    async fn test_second_rejection_is_authentication_error() {
        let server = serve(vec![
            (200, TOKEN_T1),
            (401, UNAUTHORIZED),
            (200, TOKEN_T2),
            (403, UNAUTHORIZED),
        ])
        .await;
        let client = PhpIpamClient::connect(&server.config()).await.unwrap();

        let result = client.get_subnet("7").await;

        assert!(matches!(result, Err(IpamError::Authentication(_))), "got {:?}", result);
        assert_eq!(server.requests().len(), 4);
    }

    #[tokio::test]
    async fn test_envelope_rejection_triggers_refresh() {
        let server = serve(vec![
            (200, TOKEN_T1),
            (200, r#"{"code":401,"success":false,"message":"Token expired"}"#),
            (200, TOKEN_T2),
            (200, r#"{"code":201,"success":true,"data":"10.1.7.10"}"#),
        ])
        .await;
        let client = PhpIpamClient::connect(&server.config()).await.unwrap();

        let ip = client.reserve_first_free(7, "node-a").await.unwrap();

        assert_eq!(ip, "10.1.7.10");
        assert_eq!(
            server.requests(),
            vec![
                "POST /api/overlay/user/ -",
                "POST /api/overlay/addresses/first_free/7/ t1",
                "POST /api/overlay/user/ -",
                "POST /api/overlay/addresses/first_free/7/ t2",
            ]
        );
    }

    #[test]
    fn test_auth_failure_from_status_or_envelope() {
        let ok = ApiResponse::from_body(r#"{"code":200,"success":true,"data":"10.1.2.3"}"#).unwrap();
        assert!(!is_auth_failure(StatusCode::OK, &ok));
        assert!(is_auth_failure(StatusCode::UNAUTHORIZED, &ok));
        assert!(is_auth_failure(StatusCode::FORBIDDEN, &ok));

        let expired =
            ApiResponse::from_body(r#"{"code":401,"success":false,"message":"Token expired"}"#).unwrap();
        assert!(is_auth_failure(StatusCode::OK, &expired));
    }

    #[tokio::test]
    async fn test_connect_fails_when_unreachable() {
        let config = IpamConfig::from_yaml(
            "phpIPAM:\n  url: http://127.0.0.1:1\n  appID: overlay\n  username: u\n  password: p\n  subnetMap:\n    wdc04: [7]\n  timeoutSecs: 1\n",
        )
        .unwrap();
        assert!(matches!(PhpIpamClient::connect(&config).await, Err(IpamError::Http(_))));
    }
}
