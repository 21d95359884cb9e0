//! Camera directory lookup.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::auth::Credential;
use crate::error::DirectoryError;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// A camera as listed by the directory service.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CameraDescriptor {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl fmt::Display for CameraDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (id {})", self.name, self.id)
    }
}

#[derive(Debug, Deserialize)]
struct CameraList {
    cameras: Vec<CameraDescriptor>,
}

pub trait CameraDirectory {
    /// List all cameras visible to `credential`. No pagination or retry.
    fn list(&self, credential: &Credential) -> Result<Vec<CameraDescriptor>, DirectoryError>;
}

/// REST directory at `{base_url}/v1/cameras`.
pub struct HttpCameraDirectory {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpCameraDirectory {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            agent: ureq::AgentBuilder::new().timeout(HTTP_TIMEOUT).build(),
        }
    }

    pub fn cameras_url(&self) -> String {
        format!("{}/v1/cameras", self.base_url.trim_end_matches('/'))
    }
}

impl CameraDirectory for HttpCameraDirectory {
    fn list(&self, credential: &Credential) -> Result<Vec<CameraDescriptor>, DirectoryError> {
        let url = self.cameras_url();
        let response = match self
            .agent
            .get(&url)
            .set("Authorization", &credential.bearer_header())
            .call()
        {
            Ok(response) => response,
            Err(ureq::Error::Status(status, _)) => return Err(DirectoryError::Status(status)),
            Err(ureq::Error::Transport(transport)) => {
                return Err(DirectoryError::Unreachable(transport.to_string()))
            }
        };

        // ureq treats every 2xx as success; the directory contract is 200 only.
        if response.status() != 200 {
            return Err(DirectoryError::Status(response.status()));
        }

        let body = response
            .into_string()
            .map_err(|e| DirectoryError::Malformed(format!("read body: {}", e)))?;
        parse_camera_list(&body)
    }
}

pub fn parse_camera_list(body: &str) -> Result<Vec<CameraDescriptor>, DirectoryError> {
    let list: CameraList =
        serde_json::from_str(body).map_err(|e| DirectoryError::Malformed(e.to_string()))?;
    Ok(list.cameras)
}

pub fn camera_name_for_id<'a>(cameras: &'a [CameraDescriptor], id: &str) -> Option<&'a str> {
    cameras
        .iter()
        .find(|camera| camera.id == id)
        .map(|camera| camera.name.as_str())
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(text) => text,
        Id::Number(number) => number.to_string(),
    })
}
