use crate::error::GatewayError;
use crate::runes::settings::{
    Credentials, VERTEX_ENDPOINT_VAR, VERTEX_PROJECT_VAR, VERTEX_TOKEN_VAR,
};

const ENDPOINT_HINT: &str = "It should name the endpoint of the generative AI service provided by the Google Cloud Platform. See VertexAI tutorials for more details.";
const PROJECT_HINT: &str = "See VertexAI tutorials for more details.";
const TOKEN_HINT: &str = "Set it to the output of `gcloud auth print-access-token`.";

const LOCATION: &str = "us-central1";

/// Where and as whom a Vertex AI call is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct VertexTarget {
    endpoint: String,
    project: String,
    pub(super) token: String,
}

impl VertexTarget {
    pub(super) fn from_credentials(credentials: &Credentials) -> Result<Self, GatewayError> {
        let endpoint = credentials
            .vertex_endpoint
            .clone()
            .ok_or_else(|| GatewayError::missing(VERTEX_ENDPOINT_VAR, ENDPOINT_HINT))?;
        let project = credentials
            .vertex_project_id
            .clone()
            .ok_or_else(|| GatewayError::missing(VERTEX_PROJECT_VAR, PROJECT_HINT))?;
        let token = credentials
            .vertex_access_token
            .clone()
            .ok_or_else(|| GatewayError::missing(VERTEX_TOKEN_VAR, TOKEN_HINT))?;
        Ok(Self {
            endpoint,
            project,
            token,
        })
    }

    pub(super) fn url(&self, model: &str, method: &str) -> String {
        format!(
            "https://{}/v1/projects/{}/locations/{LOCATION}/publishers/google/models/{model}:{method}",
            self.endpoint, self.project
        )
    }
}

/// Explicit setting first, then `VERTEXAI_MODEL_ID`, then the backend default.
pub(super) fn resolve_model<'a>(
    setting: Option<&'a str>,
    credentials: &'a Credentials,
    fallback: &'a str,
) -> &'a str {
    setting
        .or(credentials.vertex_model_id.as_deref())
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::{VertexTarget, resolve_model};
    use crate::error::ErrorCode;
    use crate::runes::settings::Credentials;

    fn full() -> Credentials {
        Credentials {
            vertex_endpoint: Some("us-central1-aiplatform.googleapis.com".to_string()),
            vertex_project_id: Some("proj".to_string()),
            vertex_access_token: Some("tok".to_string()),
            ..Credentials::default()
        }
    }

    #[test]
    fn url_follows_publisher_model_layout() {
        let target = VertexTarget::from_credentials(&full()).expect("target");
        assert_eq!(
            target.url("gemini-pro", "streamGenerateContent"),
            "https://us-central1-aiplatform.googleapis.com/v1/projects/proj/locations/us-central1/publishers/google/models/gemini-pro:streamGenerateContent"
        );
    }

    #[test]
    fn missing_values_are_reported_in_order() {
        let mut creds = full();
        creds.vertex_project_id = None;
        creds.vertex_access_token = None;
        let err = VertexTarget::from_credentials(&creds).expect_err("missing");
        assert_eq!(err.code(), ErrorCode::E001ConfigMissing);
        assert!(err.to_string().starts_with("VERTEXAI_PROJECT_ID is not set."));
    }

    #[test]
    fn model_prefers_setting_then_env_then_default() {
        let mut creds = full();
        assert_eq!(resolve_model(None, &creds, "gemini-pro"), "gemini-pro");
        creds.vertex_model_id = Some("gemini-1.0-pro".to_string());
        assert_eq!(resolve_model(None, &creds, "gemini-pro"), "gemini-1.0-pro");
        assert_eq!(resolve_model(Some("x"), &creds, "gemini-pro"), "x");
    }
}
