//! SOAP transport for Exchange Web Services.

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use tracing::{debug, instrument};

use crate::error::{ProviderError, ProviderResult};
use crate::http::{HttpSession, status_error, transport_error};

use super::config::EwsConfig;
use super::response::{ResponseMessage, parse_response};

const SOAP_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// Posts SOAP envelopes to one EWS endpoint.
pub struct EwsClient {
    session: HttpSession,
    url: String,
}

impl EwsClient {
    pub fn new(config: &EwsConfig) -> ProviderResult<Self> {
        let session = HttpSession::new(&config.session_options(), config.credentials.clone())?;
        Ok(Self {
            session,
            url: config.url.to_string(),
        })
    }

    /// Sends `envelope` and parses the response messages.
    ///
    /// Exchange reports SOAP faults with status 500, so those bodies are
    /// parsed rather than mapped by status.
    #[instrument(skip(self, envelope), fields(url = %self.url))]
    pub async fn call(
        &mut self,
        operation: &str,
        envelope: &str,
    ) -> ProviderResult<Vec<ResponseMessage>> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(SOAP_CONTENT_TYPE));

        let response = self
            .session
            .send(Method::POST, &self.url, headers, Some(envelope))
            .await?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::INTERNAL_SERVER_ERROR {
            return Err(status_error(response, "EWS endpoint").await);
        }

        let body = response.text().await.map_err(transport_error)?;
        let messages = parse_response(&body)?;
        if !status.is_success() {
            return Err(ProviderError::server(format!(
                "EWS returned {status} without a SOAP fault"
            )));
        }
        debug!(operation, messages = messages.len(), "EWS call completed");
        Ok(messages)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> EwsClient {
        let config = EwsConfig::new(format!("{}/EWS/Exchange.asmx", server.uri()))
            .unwrap()
            .with_credentials("alice", "secret");
        EwsClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn posts_soap_with_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/EWS/Exchange.asmx"))
            .and(header("content-type", SOAP_CONTENT_TYPE))
            .and(header("authorization", "Basic YWxpY2U6c2VjcmV0"))
            .and(body_string_contains("m:GetFolder"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body>
                <m:GetFolderResponse xmlns:m="urn:m"><m:ResponseMessages>
                <m:GetFolderResponseMessage ResponseClass="Success">
                <m:ResponseCode>NoError</m:ResponseCode>
                </m:GetFolderResponseMessage></m:ResponseMessages></m:GetFolderResponse>
                </s:Body></s:Envelope>"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let mut client = client_for(&server);
        let messages = client
            .call("GetFolder", "<m:GetFolder/>")
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].code, "NoError");
    }

    #[tokio::test]
    async fn fault_with_status_500_is_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string(
                r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body>
                <s:Fault><faultcode>s:Client</faultcode>
                <faultstring>The request is invalid.</faultstring></s:Fault>
                </s:Body></s:Envelope>"#,
            ))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .call("GetItem", "<x/>")
            .await
            .unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::ServerError);
        assert!(err.message().contains("The request is invalid."));
    }

    #[tokio::test]
    async fn forbidden_is_authorization_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .call("GetFolder", "<x/>")
            .await
            .unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::AuthorizationFailed);
    }
}
