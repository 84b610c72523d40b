use reqwest::{RequestBuilder, Response, Url};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;

use crate::db::{Message, Room, RoomId, UserId};

use super::ClientError;

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: String,
}

/// REST client for the rooms and messages endpoints, acting as one user.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    user: UserId,
}

impl ApiClient {
    pub fn new(server: &str, user: UserId) -> Result<Self, ClientError> {
        let base = Url::parse(server).map_err(|err| ClientError::InvalidUrl(err.to_string()))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            user,
        })
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub async fn rooms(&self) -> Result<Vec<Room>, ClientError> {
        let request = self.http.get(self.endpoint(&["rooms"])?);
        self.call(request).await
    }

    pub async fn create_room(&self, name: &str) -> Result<Room, ClientError> {
        let request = self.http.post(self.endpoint(&["rooms"])?).json(&json!({ "name": name }));
        self.call(request).await
    }

    pub async fn join_room(&self, room: &RoomId) -> Result<Room, ClientError> {
        let request = self.http.post(self.endpoint(&["rooms", room.as_str(), "members"])?);
        self.call(request).await
    }

    pub async fn messages(&self, room: &RoomId) -> Result<Vec<Message>, ClientError> {
        let request = self.http.get(self.endpoint(&["messages", room.as_str()])?);
        self.call(request).await
    }

    pub async fn send_message(
        &self,
        room: &RoomId,
        content: &str,
        client_token: Option<&str>,
    ) -> Result<Message, ClientError> {
        let request = self.http.post(self.endpoint(&["messages"])?).json(&json!({
            "content": content,
            "roomId": room,
            "clientToken": client_token,
        }));
        self.call(request).await
    }

    /// WebSocket address of the live channel.
    pub fn live_url(&self) -> Result<Url, ClientError> {
        let mut url = self.endpoint(&["ws"])?;
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| ClientError::InvalidUrl(format!("cannot derive websocket url from {}", self.base)))?;
        Ok(url)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(format!("{} cannot be a base", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.bearer_auth(&self.user).send().await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        let Envelope { data } = response.json().await?;
        return Ok(data);
    }

    let message = match response.json::<ErrorEnvelope>().await {
        Ok(ErrorEnvelope { error }) => error,
        Err(_) => status.canonical_reason().unwrap_or("unknown error").to_owned(),
    };
    Err(ClientError::Api { status, message })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_endpoints_under_base_path() {
        let api = ApiClient::new("http://localhost:3000/chat/", "1".into()).unwrap();
        assert_eq!(
            api.endpoint(&["messages", "r 1"]).unwrap().as_str(),
            "http://localhost:3000/chat/messages/r%201"
        );
    }

    #[test]
    fn live_url_switches_scheme() {
        let api = ApiClient::new("http://localhost:3000", "1".into()).unwrap();
        assert_eq!(api.live_url().unwrap().as_str(), "ws://localhost:3000/ws");

        let api = ApiClient::new("https://chat.example", "1".into()).unwrap();
        assert_eq!(api.live_url().unwrap().as_str(), "wss://chat.example/ws");
    }

    #[test]
    fn rejects_garbage_url() {
        assert!(matches!(
            ApiClient::new("not a url", "1".into()),
            Err(ClientError::InvalidUrl(_))
        ));
    }
}
