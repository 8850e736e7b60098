use actix_web::{HttpResponse, web};
use anyhow::Context;
use chrono::Utc;
use reqwest::StatusCode;
use secrecy::SecretString;
use serde_json::{Value, json};

use super::errors::DispatchError;
use crate::configuration::{CampaignBlueprint, MailerSettings};
use crate::domain::{DispatchRequest, Recipient};
use crate::mailer_client::{ApiResponse, CampaignDraft, MailerClient};
use crate::secrets::{SecretAccessError, SecretStore};

const GROUP_NAME_PREFIX: &str = "campaign group";

#[tracing::instrument(
    name = "Dispatch campaign",
    skip(body, secret_store, mailer, blueprint),
    fields(
        user_count = tracing::field::Empty,
        group_id = tracing::field::Empty,
        campaign_id = tracing::field::Empty
    )
)]
pub async fn dispatch_campaign(
    body: web::Bytes,
    secret_store: web::Data<dyn SecretStore>,
    mailer: web::Data<MailerSettings>,
    blueprint: web::Data<CampaignBlueprint>,
) -> Result<HttpResponse, DispatchError> {
    let request = DispatchRequest::parse(&body)?;
    tracing::Span::current().record("user_count", request.users.len());

    let client = authorize_client(secret_store.get_ref(), &mailer).await?;

    let group_id = resolve_group(&client, &generate_group_name()).await?;
    tracing::Span::current().record("group_id", tracing::field::display(&group_id));

    let mut subscriber_ids = Vec::with_capacity(request.users.len());
    for user in &request.users {
        let subscriber_id = ensure_subscriber(&client, user).await?;
        ensure_group_membership(&client, &subscriber_id, &group_id).await?;
        subscriber_ids.push(subscriber_id);
    }
    tracing::info!(
        subscriber_count = subscriber_ids.len(),
        "The contact list is subscribed to the group"
    );

    let campaign_id = create_campaign(&client, &blueprint, &group_id).await?;
    tracing::Span::current().record("campaign_id", tracing::field::display(&campaign_id));

    client.send_campaign(&campaign_id).await?.check_status()?;

    Ok(HttpResponse::Ok().json(json!({ "message": "mails are being sent" })))
}

#[tracing::instrument(name = "Resolving the mailer api key", skip_all)]
async fn authorize_client(
    secret_store: &dyn SecretStore,
    mailer: &MailerSettings,
) -> Result<MailerClient, DispatchError> {
    let secrets = secret_store.get_secret(&mailer.secret_name).await?;
    let api_key = secrets
        .get(&mailer.secret_key)
        .ok_or_else(|| SecretAccessError::MissingKey {
            name: mailer.secret_name.clone(),
            key: mailer.secret_key.clone(),
        })?;

    Ok(mailer.client(SecretString::from(api_key.clone())))
}

#[tracing::instrument(name = "Resolving the target group", skip(client))]
async fn resolve_group(client: &MailerClient, group_name: &str) -> Result<String, DispatchError> {
    if let Some(group_id) = client.find_group_by_name(group_name).await? {
        tracing::info!(%group_id, "Reusing an existing group");
        return Ok(group_id);
    }

    let created = client.create_group(group_name).await?.check_status()?;
    let group_id =
        extract_data_id(&created).context("Failed to read the id of the created group")?;
    tracing::info!(%group_id, "Created a new group");

    Ok(group_id)
}

#[tracing::instrument(
    name = "Ensuring the contact is a subscriber",
    skip(client, user),
    fields(subscriber_email = %user.email)
)]
async fn ensure_subscriber(
    client: &MailerClient,
    user: &Recipient,
) -> Result<String, DispatchError> {
    let lookup = client.find_subscriber_by_email(&user.email).await?;
    let subscriber = if lookup.status == StatusCode::OK {
        lookup
    } else {
        client
            .create_subscriber(&user.email, &user.name, None)
            .await?
            .check_status()?
    };

    Ok(extract_data_id(&subscriber).context("Failed to read the subscriber id")?)
}

#[tracing::instrument(name = "Ensuring group membership", skip(client))]
async fn ensure_group_membership(
    client: &MailerClient,
    subscriber_id: &str,
    group_id: &str,
) -> Result<(), DispatchError> {
    if client.is_subscribed_to_group(subscriber_id, group_id).await? {
        return Ok(());
    }

    client
        .subscribe_to_group(subscriber_id, group_id)
        .await?
        .check_status()?;

    Ok(())
}

#[tracing::instrument(name = "Creating the campaign", skip(client, blueprint))]
async fn create_campaign(
    client: &MailerClient,
    blueprint: &CampaignBlueprint,
    group_id: &str,
) -> Result<String, DispatchError> {
    let draft = CampaignDraft {
        name: &blueprint.name,
        subject: &blueprint.subject,
        from_email: blueprint.from_email.as_ref(),
        from_name: &blueprint.from_name,
        content: &blueprint.content,
    };
    let groups = [group_id.to_owned()];

    let created = client
        .create_campaign(&draft, &groups)
        .await?
        .check_status()?;

    Ok(extract_data_id(&created).context("Failed to read the id of the created campaign")?)
}

/// Fresh group name from the current instant, microsecond resolution.
fn generate_group_name() -> String {
    format!(
        "{GROUP_NAME_PREFIX} {}",
        Utc::now().format("%Y%m%d%H%M%S%6f")
    )
}

fn extract_data_id(response: &ApiResponse) -> Result<String, anyhow::Error> {
    response
        .body
        .pointer("/data/id")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| anyhow::anyhow!("the mailer reply carries no data.id: {}", response.body))
}
