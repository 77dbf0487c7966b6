//! Azure Resource Manager client for virtual machines and storage accounts

use std::time::Duration;

use reqwest::header::{HeaderMap, LOCATION, RETRY_AFTER};
use reqwest::{Method, RequestBuilder, StatusCode};
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;
use vmreaper_models::{Credentials, InstanceRecord};

use super::auth::TokenSource;
use super::wire::{AsyncOperationStatus, StorageAccountKeys, VirtualMachine, VirtualMachineListResult};
use super::{check_arm_response, AzureEndpoints};
use crate::error::ReaperError;
use crate::provider::{ControlPlane, ListScope, Page, ProviderError, StorageKey};

pub const COMPUTE_API_VERSION: &str = "2023-03-01";
pub const STORAGE_API_VERSION: &str = "2023-01-01";

const ASYNC_OPERATION: &str = "azure-asyncoperation";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Management-plane client bound to one subscription
#[derive(Debug, Clone)]
pub struct AzureClient {
    http: reqwest::Client,
    endpoints: AzureEndpoints,
    subscription_id: String,
    token: TokenSource,
    poll_interval: Duration,
}

impl AzureClient {
    /// Authenticate the service principal and bind to its subscription
    pub async fn connect(
        http: reqwest::Client,
        credentials: &Credentials,
        endpoints: AzureEndpoints,
    ) -> Result<Self, ReaperError> {
        let token = TokenSource::client_secret(&endpoints, credentials).map_err(ReaperError::Auth)?;
        token.verify(credentials).await.map_err(ReaperError::Auth)?;
        Ok(Self {
            http,
            endpoints,
            subscription_id: credentials.subscription_id.clone(),
            token,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    /// Build `{arm}/subscriptions/{sub}/{segments...}?api-version=...`
    pub fn arm_url(&self, segments: &[&str], api_version: &str) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&self.endpoints.resource_manager)
            .map_err(|e| ProviderError::Decode(format!("invalid ARM endpoint: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::Decode("ARM endpoint cannot be a base URL".to_string()))?
            .pop_if_empty()
            .push("subscriptions")
            .push(&self.subscription_id)
            .extend(segments);
        url.query_pairs_mut().append_pair("api-version", api_version);
        Ok(url)
    }

    fn vm_url(&self, group: &str, name: &str) -> Result<Url, ProviderError> {
        self.arm_url(
            &[
                "resourceGroups",
                group,
                "providers",
                "Microsoft.Compute",
                "virtualMachines",
                name,
            ],
            COMPUTE_API_VERSION,
        )
    }

    fn list_url(&self, scope: &ListScope) -> Result<Url, ProviderError> {
        match scope {
            ListScope::Subscription => self.arm_url(
                &["providers", "Microsoft.Compute", "virtualMachines"],
                COMPUTE_API_VERSION,
            ),
            ListScope::ResourceGroup(group) => self.arm_url(
                &[
                    "resourceGroups",
                    group.as_str(),
                    "providers",
                    "Microsoft.Compute",
                    "virtualMachines",
                ],
                COMPUTE_API_VERSION,
            ),
        }
    }

    /// Only follow `nextLink`s that stay on the ARM host; the bearer token
    /// goes with every request.
    fn cursor_url(&self, cursor: &str) -> Result<Url, ProviderError> {
        let base = Url::parse(&self.endpoints.resource_manager)
            .map_err(|e| ProviderError::Decode(format!("invalid ARM endpoint: {}", e)))?;
        let url = Url::parse(cursor)
            .map_err(|e| ProviderError::Decode(format!("invalid nextLink '{}': {}", cursor, e)))?;
        if url.scheme() != base.scheme() || url.host_str() != base.host_str() {
            return Err(ProviderError::Decode(format!(
                "nextLink '{}' points outside {}",
                cursor, self.endpoints.resource_manager
            )));
        }
        Ok(url)
    }

    async fn request(&self, method: Method, url: Url) -> Result<RequestBuilder, ProviderError> {
        let bearer = self.token.bearer().await?;
        Ok(self
            .http
            .request(method, url)
            .bearer_auth(bearer)
            .header("x-ms-client-request-id", Uuid::new_v4().to_string()))
    }

    /// Poll a long-running operation until it reaches a terminal state
    async fn wait_for_operation(&self, accepted: &HeaderMap) -> Result<(), ProviderError> {
        let (url, async_operation) = match (accepted.get(ASYNC_OPERATION), accepted.get(LOCATION)) {
            (Some(url), _) => (url, true),
            (None, Some(url)) => (url, false),
            (None, None) => return Ok(()),
        };
        let url = url
            .to_str()
            .map_err(|e| ProviderError::Decode(format!("invalid operation header: {}", e)))
            .and_then(|u| self.cursor_url(u))?;

        let mut delay = retry_after(accepted).unwrap_or(self.poll_interval);
        loop {
            tokio::time::sleep(delay).await;
            let response = self.request(Method::GET, url.clone()).await?.send().await?;
            delay = retry_after(response.headers()).unwrap_or(self.poll_interval);

            if async_operation {
                let response = check_arm_response(response).await?;
                let operation: AsyncOperationStatus = response.json().await?;
                if !operation.is_terminal() {
                    debug!(status = %operation.status, "Waiting for operation");
                    continue;
                }
                if operation.status == "Succeeded" {
                    return Ok(());
                }
                let status = match operation.error.and_then(|e| e.message) {
                    Some(message) => format!("{}: {}", operation.status, message),
                    None => operation.status,
                };
                return Err(ProviderError::OperationFailed { status });
            }

            if response.status() == StatusCode::ACCEPTED {
                debug!("Waiting for operation");
                continue;
            }
            check_arm_response(response).await?;
            return Ok(());
        }
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

impl ControlPlane for AzureClient {
    async fn get_instance(&self, group: &str, name: &str) -> Result<InstanceRecord, ProviderError> {
        let url = self.vm_url(group, name)?;
        let response = check_arm_response(self.request(Method::GET, url).await?.send().await?).await?;
        let vm: VirtualMachine = response.json().await?;
        vm.into_record()
    }

    async fn list_instances(
        &self,
        scope: &ListScope,
        cursor: Option<&str>,
    ) -> Result<Page<InstanceRecord>, ProviderError> {
        let url = match cursor {
            Some(cursor) => self.cursor_url(cursor)?,
            None => self.list_url(scope)?,
        };
        let response = check_arm_response(self.request(Method::GET, url).await?.send().await?).await?;
        let result: VirtualMachineListResult = response.json().await?;
        result.into_page()
    }

    async fn delete_instance(&self, group: &str, name: &str) -> Result<(), ProviderError> {
        let url = self.vm_url(group, name)?;
        let response = self.request(Method::DELETE, url).await?.send().await?;
        match response.status() {
            // From here on the VM is going away whatever the poll reports
            StatusCode::ACCEPTED => {
                info!(instance = %name, "Delete accepted, waiting for completion");
                self.wait_for_operation(response.headers())
                    .await
                    .map_err(|e| ProviderError::Unconfirmed { source: Box::new(e) })
            }
            status if status.is_success() => Ok(()),
            _ => check_arm_response(response).await.map(|_| ()),
        }
    }

    async fn list_storage_account_keys(
        &self,
        group: &str,
        account: &str,
    ) -> Result<Vec<StorageKey>, ProviderError> {
        let url = self.arm_url(
            &[
                "resourceGroups",
                group,
                "providers",
                "Microsoft.Storage",
                "storageAccounts",
                account,
                "listKeys",
            ],
            STORAGE_API_VERSION,
        )?;
        let response = check_arm_response(self.request(Method::POST, url).await?.send().await?).await?;
        let keys: StorageAccountKeys = response.json().await?;
        Ok(keys.keys.into_iter().map(StorageKey::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn client() -> AzureClient {
        AzureClient {
            http: reqwest::Client::new(),
            endpoints: AzureEndpoints::default(),
            subscription_id: "sub-1".to_string(),
            token: TokenSource::fixed("token"),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[test]
    fn test_vm_url() {
        let url = client().vm_url("g1", "web-01").unwrap();
        assert_eq!(
            url.as_str(),
            "https://management.azure.com/subscriptions/sub-1/resourceGroups/g1/providers/Microsoft.Compute/virtualMachines/web-01?api-version=2023-03-01"
        );
    }

    #[test]
    fn test_list_urls() {
        let c = client();
        assert_eq!(
            c.list_url(&ListScope::Subscription).unwrap().path(),
            "/subscriptions/sub-1/providers/Microsoft.Compute/virtualMachines"
        );
        assert_eq!(
            c.list_url(&ListScope::ResourceGroup("g2".to_string())).unwrap().path(),
            "/subscriptions/sub-1/resourceGroups/g2/providers/Microsoft.Compute/virtualMachines"
        );
    }

    #[test]
    fn test_cursor_must_stay_on_arm_host() {
        let c = client();
        assert!(c
            .cursor_url("https://management.azure.com/subscriptions/sub-1/providers/Microsoft.Compute/virtualMachines?$skiptoken=x")
            .is_ok());
        assert!(c.cursor_url("https://evil.example.com/steal").is_err());
        assert!(c.cursor_url("not a url").is_err());
    }

    #[test]
    fn test_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("10"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(10)));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(retry_after(&headers), None);
    }

    fn reply(status_line: &str, headers: &[(&str, &str)], body: &str) -> String {
        let mut out = format!("HTTP/1.1 {}\r\n", status_line);
        for (name, value) in headers {
            out.push_str(&format!("{}: {}\r\n", name, value));
        }
        out.push_str(&format!("Content-Length: {}\r\nConnection: close\r\n\r\n{}", body.len(), body));
        out
    }

    /// Answer each incoming request with the next canned reply, recording
    /// request lines.
    fn serve(listener: TcpListener, replies: Vec<String>) -> Arc<Mutex<Vec<String>>> {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = requests.clone();
        tokio::spawn(async move {
            for reply in replies {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                let line = String::from_utf8_lossy(&buf).lines().next().unwrap_or_default().to_string();
                log.lock().unwrap().push(line);
                socket.write_all(reply.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });
        requests
    }

    async fn local_arm() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        (listener, base)
    }

    fn local_client(base: &str) -> AzureClient {
        AzureClient {
            http: reqwest::Client::builder().no_proxy().build().unwrap(),
            endpoints: AzureEndpoints {
                resource_manager: base.to_string(),
                ..Default::default()
            },
            subscription_id: "sub-1".to_string(),
            token: TokenSource::fixed("token"),
            poll_interval: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_delete_with_failed_poll_is_unconfirmed() {
        let (listener, base) = local_arm().await;
        let operation = format!("{}/operations/op-1", base);
        let requests = serve(
            listener,
            vec![
                reply(
                    "202 Accepted",
                    &[("Azure-AsyncOperation", operation.as_str()), ("Retry-After", "0")],
                    "",
                ),
                reply("503 Service Unavailable", &[], ""),
            ],
        );

        let err = local_client(&base).delete_instance("g1", "web-01").await.unwrap_err();

        assert!(err.was_accepted(), "{:?}", err);
        assert!(matches!(
            err,
            ProviderError::Unconfirmed { ref source } if matches!(**source, ProviderError::Status { status: 503, .. })
        ));
        let requests = requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].starts_with("DELETE /subscriptions/sub-1/resourceGroups/g1/"));
        assert!(requests[1].starts_with("GET /operations/op-1"));
    }

    #[tokio::test]
    async fn test_delete_with_failed_operation_is_unconfirmed() {
        let (listener, base) = local_arm().await;
        let operation = format!("{}/operations/op-2", base);
        serve(
            listener,
            vec![
                reply("202 Accepted", &[("Azure-AsyncOperation", operation.as_str()), ("Retry-After", "0")], ""),
                reply(
                    "200 OK",
                    &[("Content-Type", "application/json")],
                    r#"{"status":"Failed","error":{"code":"Conflict","message":"disk busy"}}"#,
                ),
            ],
        );

        let err = local_client(&base).delete_instance("g1", "web-01").await.unwrap_err();
        assert!(err.was_accepted());
        assert!(err.to_string().contains("Failed: disk busy"));
    }

    #[tokio::test]
    async fn test_rejected_delete_is_not_accepted() {
        let (listener, base) = local_arm().await;
        serve(
            listener,
            vec![reply(
                "409 Conflict",
                &[("Content-Type", "application/json")],
                r#"{"error":{"code":"OperationNotAllowed","message":"locked"}}"#,
            )],
        );

        let err = local_client(&base).delete_instance("g1", "web-01").await.unwrap_err();
        assert!(!err.was_accepted());
        assert!(matches!(err, ProviderError::Status { status: 409, .. }));
    }

    #[tokio::test]
    async fn test_delete_waits_for_success() {
        let (listener, base) = local_arm().await;
        let operation = format!("{}/operations/op-3", base);
        let requests = serve(
            listener,
            vec![
                reply("202 Accepted", &[("Azure-AsyncOperation", operation.as_str()), ("Retry-After", "0")], ""),
                reply("200 OK", &[("Retry-After", "0")], r#"{"status":"InProgress"}"#),
                reply("200 OK", &[], r#"{"status":"Succeeded"}"#),
            ],
        );

        local_client(&base).delete_instance("g1", "web-01").await.unwrap();
        assert_eq!(requests.lock().unwrap().len(), 3);
    }
}
