//! REST client for the Popin call API.

use crate::acceptance::{CallAcceptanceWaitHandler, ConnectionStatusSource};
use crate::config::ClientConfig;
use crate::http::{HttpClient, HttpRequest, HttpResponse};
use crate::session::{HeadersProvider, SessionStore};
use crate::types::events::CallAcceptanceListener;
use async_trait::async_trait;
use log::{debug, info, warn};
use popin_core::ApiError;
use popin_core::api::{self, RegisterUser, STATUS_OK};
use popin_core::contact::ContactInfo;
use popin_core::types::{
    CallDetails, CallId, CallQueueId, ConnectResponse, RegisteredUser, StatusUpdate,
};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct PopinClient {
    config: ClientConfig,
    http_client: Arc<dyn HttpClient>,
    session: Arc<SessionStore>,
    headers: Arc<dyn HeadersProvider>,
}

impl PopinClient {
    /// Creates a client whose requests carry the credentials of its own
    /// [`SessionStore`].
    pub fn new(config: ClientConfig, http_client: Arc<dyn HttpClient>) -> Arc<Self> {
        let session = Arc::new(SessionStore::new());
        Self::with_session(config, http_client, session)
    }

    pub fn with_session(
        config: ClientConfig,
        http_client: Arc<dyn HttpClient>,
        session: Arc<SessionStore>,
    ) -> Arc<Self> {
        let headers: Arc<dyn HeadersProvider> = session.clone();
        Self::with_headers_provider(config, http_client, session, headers)
    }

    /// Uses `headers` instead of the session store for request headers.
    pub fn with_headers_provider(
        config: ClientConfig,
        http_client: Arc<dyn HttpClient>,
        session: Arc<SessionStore>,
        headers: Arc<dyn HeadersProvider>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            http_client,
            session,
            headers,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn is_registered(&self) -> bool {
        self.session.is_registered()
    }

    /// Registers the caller with a seller and stores the returned credentials.
    pub async fn register_user(
        &self,
        seller_id: i64,
        name: &str,
        contact: &str,
        campaign: &BTreeMap<String, String>,
    ) -> Result<RegisteredUser, ApiError> {
        let contact = ContactInfo::parse(contact).inspect_err(|e| {
            warn!(target: "Popin/Client", "Refusing to register: {e}");
        })?;
        let form = RegisterUser {
            seller_id,
            name,
            contact: &contact,
            campaign,
            device: &self.config.device,
        }
        .form()?;

        let user: RegisteredUser = self.post_form(api::REGISTER_PATH, &form).await?;
        if user.status != STATUS_OK {
            return Err(ApiError::Rejected(None));
        }
        info!(target: "Popin/Client", "Registered user on channel {}", user.channel);
        self.session.save_user(user.clone());
        Ok(user)
    }

    /// Asks for an agent and returns the call queue entry to wait on.
    pub async fn start_connection(&self, seller_id: i64) -> Result<CallQueueId, ApiError> {
        let response: ConnectResponse = self
            .post_form(api::CONNECT_PATH, &api::seller_form(seller_id))
            .await?;
        debug!(
            target: "Popin/Client",
            "connect status={} call_queue_id={:?}",
            response.status, response.call_queue_id
        );
        match (response.status, response.call_queue_id) {
            (STATUS_OK, Some(call_queue_id)) => Ok(call_queue_id),
            _ => Err(ApiError::Rejected(response.message)),
        }
    }

    /// Fetches the media room details of an accepted call.
    pub async fn get_call_details(&self, call_id: CallId) -> Result<CallDetails, ApiError> {
        let details: CallDetails = self.get_json(&api::call_details_path(call_id)).await?;
        if details.status != STATUS_OK {
            return Err(ApiError::Rejected(None));
        }
        Ok(details)
    }

    /// Requests a media room token for a direct call to `seller_id`.
    pub async fn request_call_token(&self, seller_id: i64) -> Result<CallDetails, ApiError> {
        let details: CallDetails = self
            .post_form(api::CALL_TOKEN_PATH, &api::seller_form(seller_id))
            .await?;
        if details.status != STATUS_OK {
            return Err(ApiError::Rejected(None));
        }
        Ok(details)
    }

    /// Hangs up an ongoing call.
    pub async fn end_call(&self, call_id: CallId) -> Result<(), ApiError> {
        let response: ConnectResponse = self
            .post_form(api::END_CALL_PATH, &api::end_call_form(call_id))
            .await?;
        if response.status != STATUS_OK {
            return Err(ApiError::Rejected(response.message));
        }
        info!(target: "Popin/Client", "Ended call {call_id}");
        Ok(())
    }

    /// Polls the queue status of `call_queue_id` once.
    pub async fn connection_update(
        &self,
        call_queue_id: CallQueueId,
    ) -> Result<StatusUpdate, ApiError> {
        let request = self.decorate(api::connect_update_request(
            &self.config.base_url,
            call_queue_id,
        ));
        let response = self.http_client.execute(request).await?;
        api::decode_status_update(&response)
    }

    /// Uploads the device push token. The response body is not inspected.
    pub async fn send_push_token(&self, token: &str) -> Result<(), ApiError> {
        let request = self.decorate(
            HttpRequest::post(self.url(api::PUSH_TOKEN_PATH))
                .with_form(&api::push_token_form(token)),
        );
        let response = self.http_client.execute(request).await?;
        if !response.is_success() {
            return Err(ApiError::Http(response.status_code));
        }
        Ok(())
    }

    /// Creates an idle wait handler that polls through this client.
    pub fn wait_for_acceptance<L>(self: &Arc<Self>, listener: &Arc<L>) -> CallAcceptanceWaitHandler
    where
        L: CallAcceptanceListener + 'static,
    {
        CallAcceptanceWaitHandler::new(self.clone(), listener)
    }

    fn url(&self, path: &str) -> String {
        api::endpoint(&self.config.base_url, path)
    }

    fn decorate(&self, request: HttpRequest) -> HttpRequest {
        let request = request.with_headers(self.headers.headers());
        match &self.config.user_agent {
            Some(agent) => request.with_header("User-Agent", agent.as_str()),
            None => request,
        }
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        debug!(target: "Popin/Client", "{} {}", request.method, request.url);
        Ok(self.http_client.execute(self.decorate(request)).await?)
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let response = self
            .send(HttpRequest::post(self.url(path)).with_form(form))
            .await?;
        api::decode_json(&response)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.send(HttpRequest::get(self.url(path))).await?;
        api::decode_json(&response)
    }
}

#[async_trait]
impl ConnectionStatusSource for PopinClient {
    async fn connection_update(
        &self,
        call_queue_id: CallQueueId,
    ) -> Result<StatusUpdate, ApiError> {
        PopinClient::connection_update(self, call_queue_id).await
    }
}

impl std::fmt::Debug for PopinClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PopinClient")
            .field("config", &self.config)
            .field("registered", &self.is_registered())
            .finish()
    }
}
