//! Orchestration of the login/update/logout protocol.
//!
//! Each operation issues exactly one outbound request and commits or clears
//! through the `SessionStore` only after the remote call succeeds, so a
//! failed call never leaves a partial session behind. Concurrent in-flight
//! calls are not fenced against each other: the later-arriving response
//! wins, which is the accepted race for a single-event-loop client.

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info_span, Instrument};
use url::Url;

use crate::error::Error;
use crate::identity::{Identity, RawCredentialResponse};
use crate::store::SessionStore;
use crate::token;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Decision record returned by the access-gate endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessGateResponse {
    pub state: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Client-side authentication service driving a [`SessionStore`].
pub struct AuthService {
    client: Client,
    base_url: Url,
    store: SessionStore,
}

impl AuthService {
    /// Build the service against a base API URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed or the HTTP client
    /// cannot be constructed.
    pub fn new(base_url: &str, store: SessionStore) -> Result<Self, Error> {
        let base_url = Url::parse(base_url)?;
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            base_url,
            store,
        })
    }

    /// The store this service drives. Subscribe here for session changes.
    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.as_str().trim_end_matches('/'))
    }

    /// Authenticate and commit the resulting identity.
    ///
    /// # Errors
    ///
    /// Returns a transport error for network or non-success responses,
    /// `MalformedToken` if the returned access token cannot be decoded, or
    /// `InvalidCredentialResponse` if required fields are missing. On any
    /// failure the session is left unchanged.
    pub async fn login(&self, email: &str, auth_token: &SecretString) -> Result<Identity, Error> {
        let url = self.endpoint("/login");

        let span = info_span!("auth.login", http.method = "POST", url = %url);
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "username": email,
                "password": auth_token.expose_secret(),
            }))
            .send()
            .instrument(span)
            .await?;
        let response = ok_or_http_error(response).await?;

        let raw: RawCredentialResponse = response.json().await?;
        let access_token = raw
            .access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(Error::InvalidCredentialResponse("access_token"))?;
        let claims = token::decode(access_token)?;
        let identity = Identity::from_response(raw, claims)?;

        debug!(email = identity.email(), "login succeeded");
        self.store.commit(identity.clone());
        Ok(identity)
    }

    /// Query the access gate. Pure query: never touches the session.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the call fails or the response cannot be
    /// parsed.
    pub async fn access(&self, email: &str) -> Result<AccessGateResponse, Error> {
        let url = self.endpoint("/gate/access");

        let span = info_span!("auth.access", http.method = "POST", url = %url);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "email": email }))
            .send()
            .instrument(span)
            .await?;
        let response = ok_or_http_error(response).await?;

        Ok(response.json().await?)
    }

    /// Push a profile update and, on acknowledgement, commit the supplied
    /// identity as-is. The server ack is advisory: the committed value is
    /// the local one, not re-derived from any token.
    ///
    /// # Errors
    ///
    /// Returns a transport error; the prior identity stays committed.
    pub async fn update(&self, identity: &Identity) -> Result<String, Error> {
        let url = self.endpoint("/user/update");

        let span = info_span!("auth.update", http.method = "POST", url = %url);
        let response = self
            .client
            .post(&url)
            .json(identity.data())
            .send()
            .instrument(span)
            .await?;
        let response = ok_or_http_error(response).await?;
        let message = response.text().await?;

        self.store.commit(identity.clone());
        Ok(message)
    }

    /// Delete the account and, on acknowledgement, clear the session.
    ///
    /// # Errors
    ///
    /// Returns a transport error; the session stays authenticated.
    pub async fn delete_account(&self) -> Result<String, Error> {
        let url = self.endpoint("/user/delete");

        let span = info_span!("auth.delete_account", http.method = "DELETE", url = %url);
        let response = self
            .client
            .delete(&url)
            .send()
            .instrument(span)
            .await?;
        let response = ok_or_http_error(response).await?;
        let message = response.text().await?;

        self.store.clear();
        Ok(message)
    }

    /// Drop the session. Local only; always allowed.
    pub fn logout(&self) {
        self.store.clear();
    }
}

async fn ok_or_http_error(response: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(Error::Http {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityData;
    use crate::storage::MemoryStorage;
    use anyhow::{anyhow, Result};
    use base64ct::{Base64UrlUnpadded, Encoding};
    use std::net::TcpListener;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn encoded_token(claims: &serde_json::Value) -> String {
        let header = Base64UrlUnpadded::encode_string(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = Base64UrlUnpadded::encode_string(claims.to_string().as_bytes());
        format!("{header}.{payload}.signature")
    }

    fn service(base_url: &str) -> Result<AuthService> {
        let store = SessionStore::new(MemoryStorage::new());
        Ok(AuthService::new(base_url, store)?)
    }

    fn committed_identity() -> Identity {
        Identity::from_data(IdentityData {
            id: Some(1),
            user_name: Some("alice".to_string()),
            email: "a@x.com".to_string(),
            access_token: "primary".to_string(),
            roles: vec!["user".to_string()],
            ..IdentityData::default()
        })
        .expect("valid identity")
    }

    #[tokio::test]
    async fn login_builds_and_commits_identity() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        let token = encoded_token(&serde_json::json!({
            "id": 1,
            "userName": "alice",
            "accessToken": "api-token"
        }));

        Mock::given(method("POST"))
            .and(path("/login"))
            .and(body_json(serde_json::json!({
                "username": "a@x.com",
                "password": "tokA"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "username": "a@x.com",
                "access_token": token,
                "roles": ["user"]
            })))
            .mount(&server)
            .await;

        let service = service(&server.uri())?;
        let identity = service
            .login("a@x.com", &SecretString::from("tokA".to_string()))
            .await?;

        assert_eq!(identity.email(), "a@x.com");
        assert_eq!(identity.data().id, Some(1));
        assert_eq!(identity.data().user_name.as_deref(), Some("alice"));
        assert_eq!(identity.api_access_token(), Some("api-token"));
        assert_eq!(identity.roles(), ["user".to_string()]);

        assert!(service.store().is_authenticated());
        assert_eq!(service.store().current(), Some(identity));
        Ok(())
    }

    #[tokio::test]
    async fn login_failure_leaves_session_anonymous() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
            .mount(&server)
            .await;

        let service = service(&server.uri())?;
        let result = service
            .login("a@x.com", &SecretString::from("wrong".to_string()))
            .await;

        match result {
            Err(Error::Http { status: 401, message }) => {
                assert_eq!(message, "bad credentials");
            }
            other => return Err(anyhow!("expected 401 error, got {other:?}")),
        }
        assert!(!service.store().is_authenticated());
        Ok(())
    }

    #[tokio::test]
    async fn login_with_malformed_token_commits_nothing() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "username": "a@x.com",
                "access_token": "not-a-jwt",
                "roles": []
            })))
            .mount(&server)
            .await;

        let service = service(&server.uri())?;
        let result = service
            .login("a@x.com", &SecretString::from("tokA".to_string()))
            .await;

        assert!(matches!(result, Err(Error::MalformedToken(_))));
        assert!(!service.store().is_authenticated());
        Ok(())
    }

    #[tokio::test]
    async fn login_without_access_token_is_invalid_response() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "username": "a@x.com"
            })))
            .mount(&server)
            .await;

        let service = service(&server.uri())?;
        let result = service
            .login("a@x.com", &SecretString::from("tokA".to_string()))
            .await;

        assert!(matches!(
            result,
            Err(Error::InvalidCredentialResponse("access_token"))
        ));
        assert!(!service.store().is_authenticated());
        Ok(())
    }

    #[tokio::test]
    async fn update_commits_the_supplied_identity_verbatim() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/user/update"))
            .respond_with(ResponseTemplate::new(200).set_body_string("profile updated"))
            .mount(&server)
            .await;

        let service = service(&server.uri())?;
        service.store().commit(committed_identity());

        let mut data = committed_identity().data().clone();
        data.first_name = Some("Alice".to_string());
        data.organization = Some("Wonderland".to_string());
        let modified = Identity::from_data(data)?;

        let message = service.update(&modified).await?;
        assert_eq!(message, "profile updated");

        // Committed value is the local one, not re-derived from any token.
        assert_eq!(service.store().current(), Some(modified));
        Ok(())
    }

    #[tokio::test]
    async fn update_failure_keeps_the_prior_identity() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/user/update"))
            .respond_with(ResponseTemplate::new(500).set_body_string("nope"))
            .mount(&server)
            .await;

        let service = service(&server.uri())?;
        let prior = committed_identity();
        service.store().commit(prior.clone());

        let mut data = prior.data().clone();
        data.first_name = Some("Mallory".to_string());
        let modified = Identity::from_data(data)?;

        let result = service.update(&modified).await;
        assert!(matches!(result, Err(Error::Http { status: 500, .. })));
        assert_eq!(service.store().current(), Some(prior));
        Ok(())
    }

    #[tokio::test]
    async fn delete_account_clears_the_session() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/user/delete"))
            .respond_with(ResponseTemplate::new(200).set_body_string("account deleted"))
            .mount(&server)
            .await;

        let service = service(&server.uri())?;
        service.store().commit(committed_identity());

        let message = service.delete_account().await?;
        assert_eq!(message, "account deleted");
        assert!(!service.store().is_authenticated());
        Ok(())
    }

    #[tokio::test]
    async fn delete_account_failure_keeps_the_session() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/user/delete"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let service = service(&server.uri())?;
        service.store().commit(committed_identity());

        let result = service.delete_account().await;
        assert!(matches!(result, Err(Error::Http { status: 403, .. })));
        assert!(service.store().is_authenticated());
        Ok(())
    }

    #[tokio::test]
    async fn access_is_a_pure_query() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/gate/access"))
            .and(body_json(serde_json::json!({ "email": "a@x.com" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "state": "PENDING",
                "message": "await approval"
            })))
            .mount(&server)
            .await;

        let service = service(&server.uri())?;
        let before = service.store().current();

        let gate = service.access("a@x.com").await?;
        assert_eq!(gate.state, "PENDING");
        assert_eq!(gate.message.as_deref(), Some("await approval"));

        assert_eq!(service.store().current(), before);
        Ok(())
    }

    #[tokio::test]
    async fn logout_clears_without_any_network_call() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        let service = service(&server.uri())?;
        service.store().commit(committed_identity());

        service.logout();
        assert!(!service.store().is_authenticated());
        assert_eq!(service.store().current(), None);
        Ok(())
    }

    #[test]
    fn rejects_invalid_base_url() {
        let store = SessionStore::new(MemoryStorage::new());
        let result = AuthService::new("not a url", store);
        assert!(matches!(result, Err(Error::BaseUrl(_))));
    }
}
