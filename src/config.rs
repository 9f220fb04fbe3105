/// Parameters for a Voice Live connection.
///
/// Immutable once a connection attempt starts; reconfiguring a live
/// session happens through `session.update` commands instead.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Base endpoint, e.g. `https://my-resource.cognitiveservices.azure.com`.
    /// An `https` scheme is rewritten to `wss` when the socket is opened.
    pub endpoint: String,
    pub api_key: String,
    /// Model deployment identifier, passed as the `model` query parameter.
    pub model: String,
    pub api_version: String,
    /// Optional voice name applied through the initial `session.update`.
    pub voice: Option<String>,
}

pub const DEFAULT_API_VERSION: &str = "2025-05-01-preview";

impl ConnectionConfig {
    #[must_use]
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            voice: None,
        }
    }

    #[must_use]
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    #[must_use]
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }
}
