use std::time::Duration;

use reqwest::{Client, Method, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;

/// One decoded vendor reply: the status code plus the JSON body, or
/// `Value::Null` when the reply carries no JSON (the delete endpoints
/// answer 204 with an empty body).
#[derive(Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum VendorApiError {
    #[error("the mailer api rejected the request as unprocessable: {message}")]
    UnprocessableEntity { message: String },
    #[error("the mailer api answered with unrecognized status {status}: {message}")]
    UnrecognizedStatus { status: StatusCode, message: String },
}

impl ApiResponse {
    /// Interpret the status against the table of codes the dispatch flow
    /// knows how to continue from. 422 and anything outside the table are
    /// terminal for the whole invocation.
    pub fn check_status(self) -> Result<Self, VendorApiError> {
        match self.status {
            StatusCode::OK | StatusCode::CREATED => {
                tracing::debug!(status = %self.status, "mailer api call accepted");
                Ok(self)
            }
            StatusCode::UNPROCESSABLE_ENTITY => Err(VendorApiError::UnprocessableEntity {
                message: self.vendor_message(),
            }),
            status => Err(VendorApiError::UnrecognizedStatus {
                status,
                message: self.vendor_message(),
            }),
        }
    }

    fn vendor_message(&self) -> String {
        self.body
            .get("message")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| self.body.to_string())
    }
}

/// Campaign identity and content; the target group is supplied per dispatch.
#[derive(Debug)]
pub struct CampaignDraft<'a> {
    pub name: &'a str,
    pub subject: &'a str,
    pub from_email: &'a str,
    pub from_name: &'a str,
    pub content: &'a str,
}

impl CampaignDraft<'_> {
    fn email(&self) -> CampaignEmail<'_> {
        CampaignEmail {
            subject: self.subject,
            from: self.from_email,
            from_name: self.from_name,
            content: self.content,
        }
    }
}

#[derive(Serialize)]
struct CreateSubscriberRequest<'a> {
    email: &'a str,
    fields: SubscriberFields<'a>,
}

#[derive(Serialize)]
struct SubscriberFields<'a> {
    name: &'a str,
    last_name: Option<&'a str>,
}

#[derive(Serialize)]
struct CreateGroupRequest<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct CampaignEmail<'a> {
    subject: &'a str,
    from: &'a str,
    from_name: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct CreateCampaignRequest<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    campaign_type: &'a str,
    groups: &'a [String],
    emails: [CampaignEmail<'a>; 1],
}

#[derive(Serialize)]
struct UpdateCampaignRequest<'a> {
    name: &'a str,
    groups: [&'a str; 1],
    emails: [CampaignEmail<'a>; 1],
}

#[derive(Serialize)]
struct ScheduleCampaignRequest<'a> {
    delivery: &'a str,
}

#[derive(Clone)]
pub struct MailerClient {
    http_client: Client,
    base_url: Url,
    api_key: SecretString,
}

impl MailerClient {
    pub fn new(base_url: String, api_key: SecretString, timeout: Duration) -> Self {
        // Url::join drops the last path segment of a base without a
        // trailing slash.
        let base_url = if base_url.ends_with('/') {
            base_url
        } else {
            format!("{base_url}/")
        };

        Self {
            http_client: Client::builder().timeout(timeout).build().unwrap(),
            base_url: Url::parse(&base_url).expect("Failed parsing base mailer api url."),
            api_key,
        }
    }

    pub async fn find_subscriber_by_email(
        &self,
        email: &str,
    ) -> Result<ApiResponse, reqwest::Error> {
        let route = format!("subscribers/{}", urlencoding::encode(email));
        self.dispatch(self.request(Method::GET, &route)).await
    }

    pub async fn create_subscriber(
        &self,
        email: &str,
        name: &str,
        last_name: Option<&str>,
    ) -> Result<ApiResponse, reqwest::Error> {
        let body = CreateSubscriberRequest {
            email,
            fields: SubscriberFields { name, last_name },
        };

        self.dispatch(self.request(Method::POST, "subscribers").json(&body))
            .await
    }

    pub async fn delete_subscriber(
        &self,
        subscriber_id: &str,
    ) -> Result<ApiResponse, reqwest::Error> {
        let route = format!("subscribers/{subscriber_id}");
        self.dispatch(self.request(Method::DELETE, &route)).await
    }

    pub async fn list_groups(&self) -> Result<ApiResponse, reqwest::Error> {
        self.dispatch(self.request(Method::GET, "groups")).await
    }

    /// Exact-name linear search over the full group listing; the vendor api
    /// has no lookup-by-name endpoint.
    pub async fn find_group_by_name(
        &self,
        name: &str,
    ) -> Result<Option<String>, reqwest::Error> {
        let response = self.list_groups().await?;
        Ok(find_in_listing(&response.body, "name", name))
    }

    pub async fn create_group(&self, name: &str) -> Result<ApiResponse, reqwest::Error> {
        self.dispatch(
            self.request(Method::POST, "groups")
                .json(&CreateGroupRequest { name }),
        )
        .await
    }

    pub async fn delete_group(&self, group_id: &str) -> Result<ApiResponse, reqwest::Error> {
        let route = format!("groups/{group_id}");
        self.dispatch(self.request(Method::DELETE, &route)).await
    }

    pub async fn list_group_subscribers(
        &self,
        group_id: &str,
    ) -> Result<ApiResponse, reqwest::Error> {
        let route = format!("groups/{group_id}/subscribers");
        self.dispatch(self.request(Method::GET, &route)).await
    }

    pub async fn is_subscribed_to_group(
        &self,
        subscriber_id: &str,
        group_id: &str,
    ) -> Result<bool, reqwest::Error> {
        let response = self.list_group_subscribers(group_id).await?;
        Ok(find_in_listing(&response.body, "id", subscriber_id).is_some())
    }

    pub async fn subscribe_to_group(
        &self,
        subscriber_id: &str,
        group_id: &str,
    ) -> Result<ApiResponse, reqwest::Error> {
        let route = format!("subscribers/{subscriber_id}/groups/{group_id}");
        self.dispatch(self.request(Method::POST, &route)).await
    }

    pub async fn create_campaign(
        &self,
        draft: &CampaignDraft<'_>,
        group_ids: &[String],
    ) -> Result<ApiResponse, reqwest::Error> {
        let body = CreateCampaignRequest {
            name: draft.name,
            campaign_type: "regular",
            groups: group_ids,
            emails: [draft.email()],
        };

        self.dispatch(self.request(Method::POST, "campaigns").json(&body))
            .await
    }

    pub async fn get_campaign(&self, campaign_id: &str) -> Result<ApiResponse, reqwest::Error> {
        let route = format!("campaigns/{campaign_id}");
        self.dispatch(self.request(Method::GET, &route)).await
    }

    /// Retarget an existing campaign at another group. The vendor api
    /// requires the campaign name on update, so the current one is read
    /// back first.
    pub async fn update_campaign_group(
        &self,
        campaign_id: &str,
        group_id: &str,
        draft: &CampaignDraft<'_>,
    ) -> Result<ApiResponse, reqwest::Error> {
        let current = self.get_campaign(campaign_id).await?;
        let name = current
            .body
            .pointer("/data/name")
            .and_then(Value::as_str)
            .unwrap_or(draft.name)
            .to_owned();

        let body = UpdateCampaignRequest {
            name: &name,
            groups: [group_id],
            emails: [draft.email()],
        };
        let route = format!("campaigns/{campaign_id}");

        self.dispatch(self.request(Method::PUT, &route).json(&body))
            .await
    }

    pub async fn send_campaign(&self, campaign_id: &str) -> Result<ApiResponse, reqwest::Error> {
        let route = format!("campaigns/{campaign_id}/schedule");
        let body = ScheduleCampaignRequest {
            delivery: "instant",
        };

        self.dispatch(self.request(Method::POST, &route).json(&body))
            .await
    }

    pub async fn delete_campaign(
        &self,
        campaign_id: &str,
    ) -> Result<ApiResponse, reqwest::Error> {
        let route = format!("campaigns/{campaign_id}");
        self.dispatch(self.request(Method::DELETE, &route)).await
    }

    fn request(&self, method: Method, route: &str) -> reqwest::RequestBuilder {
        let url = self
            .base_url
            .join(route)
            .expect("Failed joining route to mailer api url.");

        self.http_client
            .request(method, url)
            .header(
                "Authorization",
                "Bearer ".to_owned() + self.api_key.expose_secret(),
            )
            .header("Content-Type", "application/json")
    }

    async fn dispatch(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<ApiResponse, reqwest::Error> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);

        Ok(ApiResponse { status, body })
    }
}

fn find_in_listing(body: &Value, field: &str, expected: &str) -> Option<String> {
    body.get("data")?
        .as_array()?
        .iter()
        .find(|entry| entry.get(field).and_then(Value::as_str) == Some(expected))
        .and_then(|entry| entry.get("id"))
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
}
