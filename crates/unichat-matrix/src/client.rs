// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the chat server's client-server API.
//!
//! Provides [`MatrixClient`], which builds endpoint URLs, applies per-call
//! timeouts, decodes error bodies into [`UnichatError::Protocol`], and
//! refreshes the shared credential once when the server answers 401.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use unichat_config::model::MatrixConfig;
use unichat_core::types::HealthStatus;
use unichat_core::{Attachment, ServiceAdapter, UnichatError};

use crate::credential::Credential;
use crate::media::MediaResolver;
use crate::types::{
    CreateRoomRequest, DirectoryResponse, DirectoryUser, ErrorBody, EventIdResponse,
    JoinedMember, JoinedMembersResponse, JoinedRoomsResponse, LoginResponse, MembersResponse,
    MessagesPage, Ordered, PowerLevels, RoomEvent, RoomIdResponse, SyncResponse, UploadResponse,
};

const CLIENT_API: [&str; 3] = ["_matrix", "client", "v3"];
const MEDIA_API: [&str; 3] = ["_matrix", "media", "v3"];

/// Per-call time bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// State reads, sends, membership changes.
    pub request: Duration,
    /// HTTP bound on a long-poll sync; exceeds the requested poll window.
    pub sync: Duration,
    pub upload: Duration,
    pub media_check: Duration,
}

impl Timeouts {
    pub fn from_config(config: &MatrixConfig) -> Self {
        Self {
            request: Duration::from_secs(config.request_timeout_secs),
            sync: Duration::from_secs(config.sync_http_timeout_secs),
            upload: Duration::from_secs(config.upload_timeout_secs),
            media_check: Duration::from_secs(config.media_check_timeout_secs),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::from_config(&MatrixConfig::default())
    }
}

/// Authenticated client for one homeserver and one shared credential.
///
/// Cheap to clone; clones share the credential and its refresh guard.
#[derive(Debug, Clone)]
pub struct MatrixClient {
    http: reqwest::Client,
    base_url: Url,
    user_id: String,
    password: Option<String>,
    credential: Arc<Credential>,
    timeouts: Timeouts,
}

impl MatrixClient {
    /// Creates a client acting as `user_id` with a fixed access token.
    pub fn new(
        homeserver_url: &str,
        user_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self, UnichatError> {
        let base_url = Url::parse(homeserver_url).map_err(|e| {
            UnichatError::Config(format!("invalid homeserver url `{homeserver_url}`: {e}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(UnichatError::Config(format!(
                "homeserver url `{homeserver_url}` cannot carry a path"
            )));
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("unichat/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UnichatError::Transport {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            http,
            base_url,
            user_id: user_id.into(),
            password: None,
            credential: Arc::new(Credential::new(access_token)),
            timeouts: Timeouts::default(),
        })
    }

    /// Creates a client from the `[matrix]` config section.
    ///
    /// Either an access token or a password must be configured; with only a
    /// password the first call fails with 401 and triggers a login.
    pub fn from_config(config: &MatrixConfig) -> Result<Self, UnichatError> {
        if config.access_token.is_none() && config.password.is_none() {
            return Err(UnichatError::Config(
                "matrix.access_token or matrix.password must be set".into(),
            ));
        }
        let client = Self::new(
            &config.homeserver_url,
            config.user_id.clone(),
            config.access_token.clone().unwrap_or_default(),
        )?
        .with_timeouts(Timeouts::from_config(config));
        Ok(match &config.password {
            Some(password) => client.with_password(password.clone()),
            None => client,
        })
    }

    /// Enables password re-login when the access token is rejected.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// The gateway's own user id.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn homeserver_url(&self) -> &str {
        self.base_url.as_str()
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Resolver for media locators hosted by this homeserver.
    pub fn media_resolver(&self) -> MediaResolver {
        MediaResolver::new(self.base_url.as_str())
    }

    // --- Rooms ---

    /// `POST /createRoom`, returning the new room id.
    pub async fn create_room(&self, request: &CreateRoomRequest) -> Result<String, UnichatError> {
        let url = self.url(&CLIENT_API, &["createRoom"]);
        let created: RoomIdResponse = self
            .authed(self.timeouts.request, |http| http.post(url.clone()).json(request))
            .await?;
        Ok(created.room_id)
    }

    pub async fn invite(&self, room_id: &str, user_id: &str) -> Result<(), UnichatError> {
        let url = self.url(&CLIENT_API, &["rooms", room_id, "invite"]);
        let body = json!({ "user_id": user_id });
        let _: IgnoredAny = self
            .authed(self.timeouts.request, |http| http.post(url.clone()).json(&body))
            .await?;
        Ok(())
    }

    /// Accepts an invitation or joins a public room.
    pub async fn join(&self, room_id: &str) -> Result<String, UnichatError> {
        let url = self.url(&CLIENT_API, &["rooms", room_id, "join"]);
        let joined: RoomIdResponse = self
            .authed(self.timeouts.request, |http| {
                http.post(url.clone()).json(&json!({}))
            })
            .await?;
        Ok(joined.room_id)
    }

    pub async fn leave(&self, room_id: &str) -> Result<(), UnichatError> {
        let url = self.url(&CLIENT_API, &["rooms", room_id, "leave"]);
        let _: IgnoredAny = self
            .authed(self.timeouts.request, |http| {
                http.post(url.clone()).json(&json!({}))
            })
            .await?;
        Ok(())
    }

    /// Rooms the gateway user has joined.
    pub async fn joined_rooms(&self) -> Result<Vec<String>, UnichatError> {
        let url = self.url(&CLIENT_API, &["joined_rooms"]);
        let rooms: JoinedRoomsResponse = self
            .authed(self.timeouts.request, |http| http.get(url.clone()))
            .await?;
        Ok(rooms.joined_rooms)
    }

    /// Member events of a room (`m.room.member`, all memberships).
    pub async fn members(&self, room_id: &str) -> Result<Vec<RoomEvent>, UnichatError> {
        let url = self.url(&CLIENT_API, &["rooms", room_id, "members"]);
        let members: MembersResponse = self
            .authed(self.timeouts.request, |http| http.get(url.clone()))
            .await?;
        Ok(members.chunk)
    }

    /// Joined members with profiles, in server order.
    pub async fn joined_members(
        &self,
        room_id: &str,
    ) -> Result<Ordered<JoinedMember>, UnichatError> {
        let url = self.url(&CLIENT_API, &["rooms", room_id, "joined_members"]);
        let members: JoinedMembersResponse = self
            .authed(self.timeouts.request, |http| http.get(url.clone()))
            .await?;
        Ok(members.joined)
    }

    /// Full current state of a room.
    pub async fn room_state(&self, room_id: &str) -> Result<Vec<RoomEvent>, UnichatError> {
        let url = self.url(&CLIENT_API, &["rooms", room_id, "state"]);
        self.authed(self.timeouts.request, |http| http.get(url.clone()))
            .await
    }

    /// Content of one state event.
    pub async fn state_event(
        &self,
        room_id: &str,
        event_type: &str,
        state_key: &str,
    ) -> Result<Value, UnichatError> {
        let mut segments = vec!["rooms", room_id, "state", event_type];
        if !state_key.is_empty() {
            segments.push(state_key);
        }
        let url = self.url(&CLIENT_API, &segments);
        self.authed(self.timeouts.request, |http| http.get(url.clone()))
            .await
    }

    pub async fn power_levels(&self, room_id: &str) -> Result<PowerLevels, UnichatError> {
        let content = self.state_event(room_id, "m.room.power_levels", "").await?;
        serde_json::from_value(content)
            .map_err(|e| UnichatError::Internal(format!("malformed power levels in {room_id}: {e}")))
    }

    // --- Events ---

    /// `PUT /rooms/{id}/send/{type}/{txn}` with a fresh transaction id.
    ///
    /// A retry after credential refresh reuses the same transaction id.
    pub async fn send_event(
        &self,
        room_id: &str,
        event_type: &str,
        content: &Value,
    ) -> Result<String, UnichatError> {
        let txn_id = uuid::Uuid::new_v4().to_string();
        let url = self.url(&CLIENT_API, &["rooms", room_id, "send", event_type, &txn_id]);
        let sent: EventIdResponse = self
            .authed(self.timeouts.request, |http| http.put(url.clone()).json(content))
            .await?;
        debug!(room_id, event_type, event_id = %sent.event_id, "event sent");
        Ok(sent.event_id)
    }

    pub async fn send_text(&self, room_id: &str, body: &str) -> Result<String, UnichatError> {
        self.send_event(
            room_id,
            "m.room.message",
            &json!({ "msgtype": "m.text", "body": body }),
        )
        .await
    }

    /// Annotates `event_id` with `key`.
    pub async fn send_reaction(
        &self,
        room_id: &str,
        event_id: &str,
        key: &str,
    ) -> Result<String, UnichatError> {
        self.send_event(
            room_id,
            "m.reaction",
            &json!({
                "m.relates_to": {
                    "rel_type": "m.annotation",
                    "event_id": event_id,
                    "key": key,
                }
            }),
        )
        .await
    }

    /// Newest-first page of room events.
    pub async fn messages(
        &self,
        room_id: &str,
        limit: u32,
        from: Option<&str>,
    ) -> Result<MessagesPage, UnichatError> {
        let url = self.url(&CLIENT_API, &["rooms", room_id, "messages"]);
        let mut query = vec![("dir", "b".to_string()), ("limit", limit.to_string())];
        if let Some(from) = from {
            query.push(("from", from.to_string()));
        }
        self.authed(self.timeouts.request, |http| http.get(url.clone()).query(&query))
            .await
    }

    // --- Sync ---

    /// Long-poll `GET /sync`.
    ///
    /// `timeout_ms` is the server-side poll window; the HTTP call itself is
    /// bounded by [`Timeouts::sync`].
    pub async fn sync(
        &self,
        since: Option<&str>,
        timeout_ms: u64,
        filter: Option<&Value>,
    ) -> Result<SyncResponse, UnichatError> {
        let url = self.url(&CLIENT_API, &["sync"]);
        let mut query = vec![("timeout", timeout_ms.to_string())];
        if let Some(since) = since {
            query.push(("since", since.to_string()));
        }
        if let Some(filter) = filter {
            query.push(("filter", filter.to_string()));
        }
        self.authed(self.timeouts.sync, |http| http.get(url.clone()).query(&query))
            .await
    }

    // --- Media ---

    /// Uploads to the media repository and returns the `mxc://` locator.
    pub async fn upload(&self, attachment: &Attachment) -> Result<String, UnichatError> {
        let url = self.url(&MEDIA_API, &["upload"]);
        let uploaded: UploadResponse = self
            .authed(self.timeouts.upload, |http| {
                http.post(url.clone())
                    .query(&[("filename", attachment.file_name.as_str())])
                    .header(CONTENT_TYPE, attachment.content_type.as_str())
                    .body(attachment.data.clone())
            })
            .await?;
        Ok(uploaded.content_uri)
    }

    /// True when `url` answers a HEAD request with 2xx within the media-check bound.
    pub async fn check_media(&self, url: &str) -> bool {
        let result = self
            .http
            .head(url)
            .bearer_auth(self.credential.current())
            .timeout(self.timeouts.media_check)
            .send()
            .await;
        match result {
            Ok(response) => {
                debug!(url, status = %response.status(), "media check");
                response.status().is_success()
            }
            Err(e) => {
                debug!(url, error = %e, "media check failed");
                false
            }
        }
    }

    // --- Accounts ---

    /// Registers an account through the dummy interactive-auth stage.
    pub async fn register(
        &self,
        username: &str,
        password: &str,
    ) -> Result<LoginResponse, UnichatError> {
        let url = self.url(&CLIENT_API, &["register"]);
        let body = json!({
            "username": username,
            "password": password,
            "auth": { "type": "m.login.dummy" },
        });
        self.public(self.http.post(url).json(&body)).await
    }

    /// Password login. Does not replace the shared credential.
    pub async fn login(&self, user: &str, password: &str) -> Result<LoginResponse, UnichatError> {
        let url = self.url(&CLIENT_API, &["login"]);
        let body = json!({
            "type": "m.login.password",
            "identifier": { "type": "m.id.user", "user": user },
            "password": password,
        });
        self.public(self.http.post(url).json(&body)).await
    }

    pub async fn logout(&self) -> Result<(), UnichatError> {
        let url = self.url(&CLIENT_API, &["logout"]);
        let _: IgnoredAny = self
            .authed(self.timeouts.request, |http| {
                http.post(url.clone()).json(&json!({}))
            })
            .await?;
        Ok(())
    }

    pub async fn search_users(
        &self,
        term: &str,
        limit: u32,
    ) -> Result<Vec<DirectoryUser>, UnichatError> {
        let url = self.url(&CLIENT_API, &["user_directory", "search"]);
        let body = json!({ "search_term": term, "limit": limit });
        let found: DirectoryResponse = self
            .authed(self.timeouts.request, |http| http.post(url.clone()).json(&body))
            .await?;
        Ok(found.results)
    }

    /// Finds the two-party room shared with `bot_id`, creating it when absent.
    ///
    /// Rooms whose member list cannot be read are skipped.
    pub async fn ensure_direct_room(
        &self,
        bot_id: &str,
        name: &str,
        topic: &str,
    ) -> Result<String, UnichatError> {
        for room_id in self.joined_rooms().await? {
            match self.joined_members(&room_id).await {
                Ok(members) if is_direct_pair(&members, &self.user_id, bot_id) => {
                    debug!(room_id = %room_id, bot_id, "reusing direct room");
                    return Ok(room_id);
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(room_id = %room_id, error = %e, "skipping room while looking for direct room");
                }
            }
        }

        let room_id = self
            .create_room(&CreateRoomRequest {
                name: Some(name.to_string()),
                topic: Some(topic.to_string()),
                preset: Some("trusted_private_chat".into()),
                is_direct: true,
                invite: vec![bot_id.to_string()],
            })
            .await?;
        info!(room_id = %room_id, bot_id, "created direct room");
        Ok(room_id)
    }

    /// `GET /_matrix/client/versions`, used as a liveness probe.
    pub async fn versions(&self) -> Result<Value, UnichatError> {
        let url = self.url(&["_matrix", "client", "versions"], &[]);
        self.public(self.http.get(url)).await
    }

    // --- Plumbing ---

    fn url(&self, api: &[&str], segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Never errs: base urls that cannot carry a path are rejected in `new`.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(api).extend(segments);
        }
        url
    }

    async fn dispatch(
        &self,
        request: RequestBuilder,
        timeout: Duration,
    ) -> Result<Response, UnichatError> {
        request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error(e, timeout))
    }

    async fn public<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, UnichatError> {
        let response = self.dispatch(request, self.timeouts.request).await?;
        decode(response, self.timeouts.request).await
    }

    /// Sends with the current credential; on 401 refreshes once and retries once.
    async fn authed<T: DeserializeOwned>(
        &self,
        timeout: Duration,
        build: impl Fn(&reqwest::Client) -> RequestBuilder,
    ) -> Result<T, UnichatError> {
        let token = self.credential.current();
        let response = self
            .dispatch(build(&self.http).bearer_auth(&token), timeout)
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return decode(response, timeout).await;
        }

        warn!(path = response.url().path(), "access token rejected, refreshing");
        self.refresh_credential(&token).await?;

        let response = self
            .dispatch(
                build(&self.http).bearer_auth(self.credential.current()),
                timeout,
            )
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(UnichatError::CredentialExpired);
        }
        decode(response, timeout).await
    }

    /// Single-flight refresh: only the first task holding a rejected token logs in.
    async fn refresh_credential(&self, rejected: &str) -> Result<(), UnichatError> {
        let _guard = self.credential.lock_refresh().await;
        if !self.credential.is_stale(rejected) {
            debug!("credential already refreshed by another task");
            return Ok(());
        }

        let Some(password) = self.password.as_deref() else {
            return Err(UnichatError::CredentialExpired);
        };
        let login = self.login(&self.user_id, password).await?;
        let token = login.access_token.ok_or(UnichatError::CredentialExpired)?;
        self.credential.replace(token);
        info!(user_id = %self.user_id, "access token refreshed");
        Ok(())
    }
}

#[async_trait]
impl ServiceAdapter for MatrixClient {
    fn name(&self) -> &str {
        "matrix-client"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    async fn health_check(&self) -> Result<HealthStatus, UnichatError> {
        Ok(match self.versions().await {
            Ok(_) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        })
    }

    async fn shutdown(&self) -> Result<(), UnichatError> {
        Ok(())
    }
}

fn is_direct_pair(members: &Ordered<JoinedMember>, self_id: &str, bot_id: &str) -> bool {
    members.len() == 2 && members.get(self_id).is_some() && members.get(bot_id).is_some()
}

fn transport_error(e: reqwest::Error, timeout: Duration) -> UnichatError {
    if e.is_timeout() {
        UnichatError::Timeout { duration: timeout }
    } else {
        UnichatError::Transport {
            message: format!("HTTP request failed: {e}"),
            source: Some(Box::new(e)),
        }
    }
}

async fn decode<T: DeserializeOwned>(
    response: Response,
    timeout: Duration,
) -> Result<T, UnichatError> {
    let status = response.status();
    debug!(status = %status, path = response.url().path(), "homeserver response");

    if status.is_success() {
        return response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                UnichatError::Timeout { duration: timeout }
            } else {
                UnichatError::Transport {
                    message: format!("failed to parse homeserver response: {e}"),
                    source: Some(Box::new(e)),
                }
            }
        });
    }

    let body = response.text().await.unwrap_or_default();
    Err(protocol_error(status, &body))
}

fn protocol_error(status: StatusCode, body: &str) -> UnichatError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = match parsed.error {
        Some(message) => message,
        None if body.is_empty() => status.to_string(),
        None => body.to_string(),
    };
    UnichatError::Protocol {
        status: status.as_u16(),
        errcode: parsed.errcode,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SELF_ID: &str = "@gateway:hs.test";
    const BOT_ID: &str = "@whatsappbot:hs.test";

    fn test_client(server: &MockServer) -> MatrixClient {
        MatrixClient::new(&server.uri(), SELF_ID, "token-1").unwrap()
    }

    #[tokio::test]
    async fn send_text_puts_message_event() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path_regex(r"^/_matrix/client/v3/rooms/!room:hs\.test/send/m\.room\.message/[0-9a-f-]+$"))
            .and(header("authorization", "Bearer token-1"))
            .and(body_json(json!({"msgtype": "m.text", "body": "login"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"event_id": "$e1"})))
            .expect(1)
            .mount(&server)
            .await;

        let event_id = test_client(&server)
            .send_text("!room:hs.test", "login")
            .await
            .unwrap();
        assert_eq!(event_id, "$e1");
    }

    #[tokio::test]
    async fn protocol_error_carries_status_and_errcode() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_matrix/client/v3/rooms/!gone:hs.test/members"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "errcode": "M_FORBIDDEN",
                "error": "You are not in this room"
            })))
            .mount(&server)
            .await;

        let err = test_client(&server)
            .members("!gone:hs.test")
            .await
            .unwrap_err();
        match &err {
            UnichatError::Protocol {
                status,
                errcode,
                message,
            } => {
                assert_eq!(*status, 403);
                assert_eq!(errcode.as_deref(), Some("M_FORBIDDEN"));
                assert_eq!(message, "You are not in this room");
            }
            other => panic!("expected protocol error, got {other:?}"),
        }
        assert!(err.is_terminal());
    }

    #[tokio::test]
    async fn unauthorized_without_password_is_credential_expired() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_matrix/client/v3/joined_rooms"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "errcode": "M_UNKNOWN_TOKEN", "error": "expired"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = test_client(&server).joined_rooms().await.unwrap_err();
        assert!(matches!(err, UnichatError::CredentialExpired), "got {err:?}");
    }

    #[tokio::test]
    async fn unauthorized_refreshes_by_password_and_retries_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_matrix/client/v3/joined_rooms"))
            .and(header("authorization", "Bearer token-1"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "errcode": "M_UNKNOWN_TOKEN", "error": "expired"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/_matrix/client/v3/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "user_id": SELF_ID, "access_token": "token-2", "device_id": "D"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/_matrix/client/v3/joined_rooms"))
            .and(header("authorization", "Bearer token-2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"joined_rooms": ["!a:hs.test"]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server).with_password("pw");
        assert_eq!(client.joined_rooms().await.unwrap(), ["!a:hs.test"]);
    }

    #[tokio::test]
    async fn concurrent_refreshes_log_in_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_matrix/client/v3/joined_rooms"))
            .and(header("authorization", "Bearer token-1"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/_matrix/client/v3/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "user_id": SELF_ID, "access_token": "token-2"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/_matrix/client/v3/joined_rooms"))
            .and(header("authorization", "Bearer token-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"joined_rooms": []})))
            .mount(&server)
            .await;

        let client = test_client(&server).with_password("pw");
        let (a, b, c) = tokio::join!(
            client.joined_rooms(),
            client.joined_rooms(),
            client.joined_rooms()
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
    }

    #[tokio::test]
    async fn ensure_direct_room_reuses_two_member_room() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_matrix/client/v3/joined_rooms"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "joined_rooms": ["!broken:hs.test", "!group:hs.test", "!dm:hs.test"]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/_matrix/client/v3/rooms/!broken:hs.test/joined_members"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/_matrix/client/v3/rooms/!group:hs.test/joined_members"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"joined": {
                SELF_ID: {}, BOT_ID: {}, "@friend:hs.test": {}
            }})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/_matrix/client/v3/rooms/!dm:hs.test/joined_members"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"joined": {
                SELF_ID: {}, BOT_ID: {"display_name": "WhatsApp bridge bot"}
            }})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/_matrix/client/v3/createRoom"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"room_id": "!new:hs.test"})))
            .expect(0)
            .mount(&server)
            .await;

        let room = test_client(&server)
            .ensure_direct_room(BOT_ID, "Whatsapp Bridge", "control room")
            .await
            .unwrap();
        assert_eq!(room, "!dm:hs.test");
    }

    #[tokio::test]
    async fn ensure_direct_room_creates_when_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_matrix/client/v3/joined_rooms"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"joined_rooms": []})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/_matrix/client/v3/createRoom"))
            .and(body_json(json!({
                "name": "Whatsapp Bridge",
                "topic": "control room",
                "preset": "trusted_private_chat",
                "is_direct": true,
                "invite": [BOT_ID]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"room_id": "!new:hs.test"})))
            .expect(1)
            .mount(&server)
            .await;

        let room = test_client(&server)
            .ensure_direct_room(BOT_ID, "Whatsapp Bridge", "control room")
            .await
            .unwrap();
        assert_eq!(room, "!new:hs.test");
    }

    #[tokio::test]
    async fn sync_passes_cursor_and_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_matrix/client/v3/sync"))
            .and(query_param("since", "s1"))
            .and(query_param("timeout", "30000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"next_batch": "s2"})))
            .expect(1)
            .mount(&server)
            .await;

        let sync = test_client(&server)
            .sync(Some("s1"), 30_000, None)
            .await
            .unwrap();
        assert_eq!(sync.next_batch, "s2");
    }

    #[tokio::test]
    async fn slow_sync_is_timeout_class() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_matrix/client/v3/sync"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"next_batch": "s2"}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = test_client(&server).with_timeouts(Timeouts {
            sync: Duration::from_millis(50),
            ..Timeouts::default()
        });
        let err = client.sync(None, 0, None).await.unwrap_err();
        assert!(err.is_timeout_class(), "got {err:?}");
    }

    #[tokio::test]
    async fn upload_returns_content_uri() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_matrix/media/v3/upload"))
            .and(query_param("filename", "cat.png"))
            .and(header("content-type", "image/png"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"content_uri": "mxc://hs.test/cat"})),
            )
            .mount(&server)
            .await;

        let uri = test_client(&server)
            .upload(&Attachment {
                file_name: "cat.png".into(),
                content_type: "image/png".into(),
                data: vec![1, 2, 3],
            })
            .await
            .unwrap();
        assert_eq!(uri, "mxc://hs.test/cat");
    }

    #[tokio::test]
    async fn check_media_follows_head_status() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/_matrix/media/v3/download/hs.test/ok"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/_matrix/media/v3/download/hs.test/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let resolver = client.media_resolver();
        assert!(client.check_media(&resolver.download_url("mxc://hs.test/ok")).await);
        assert!(!client.check_media(&resolver.download_url("mxc://hs.test/missing")).await);
    }

    #[tokio::test]
    async fn search_users_posts_term() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_matrix/client/v3/user_directory/search"))
            .and(body_json(json!({"search_term": "ali", "limit": 10})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"user_id": "@alice:hs.test", "display_name": "Alice"}],
                "limited": false
            })))
            .mount(&server)
            .await;

        let users = test_client(&server).search_users("ali", 10).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].display_name.as_deref(), Some("Alice"));
    }

    #[test]
    fn from_config_requires_a_credential() {
        let config = MatrixConfig::default();
        assert!(matches!(
            MatrixClient::from_config(&config),
            Err(UnichatError::Config(_))
        ));
    }

    #[test]
    fn rejects_unparseable_homeserver() {
        assert!(MatrixClient::new("not a url", SELF_ID, "t").is_err());
    }
}
