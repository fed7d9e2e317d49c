//! Typed control plane operations.
//!
//! `ControlPlaneSession` binds a client, a session token and an organization
//! for the duration of one lifecycle invocation, and exposes one method per
//! REST call the controller makes. Request bodies and response shapes live
//! here so the controller reads as a plain sequence of steps.

use std::sync::Arc;

use async_trait::async_trait;
use dcscale_auth::SessionToken;
use dcscale_core::{JobId, LabelSet, SdcId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::{ApiRequest, ControlPlaneClient};
use crate::drain::JobSource;
use crate::error::{ControlError, Result};

/// Component type of a data collector.
pub const DATA_COLLECTOR_COMPONENT: &str = "dc";

/// Subject kind of an ACL entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubjectType {
    /// A group of users.
    Group,
    /// A single user.
    User,
}

/// Action granted by an ACL entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AclAction {
    /// Read access.
    Read,
    /// Write access.
    Write,
    /// Execute access.
    Execute,
}

impl AclAction {
    /// Every action.
    pub const ALL: [Self; 3] = [Self::Read, Self::Write, Self::Execute];
}

/// One ACL entry on a node resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    /// Group or user id.
    pub subject_id: String,
    /// Whether `subject_id` names a group or a user.
    pub subject_type: SubjectType,
    /// Granted actions.
    pub actions: Vec<AclAction>,
}

impl Permission {
    /// Full access for `subject_id`.
    #[must_use]
    pub fn full_access(subject_id: impl Into<String>, subject_type: SubjectType) -> Self {
        Self {
            subject_id: subject_id.into(),
            subject_type,
            actions: AclAction::ALL.to_vec(),
        }
    }
}

/// Request body for issuing component auth tokens.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IssueComponentsRequest<'a> {
    organization: &'a str,
    component_type: &'a str,
    number_of_components: u32,
    active: bool,
}

/// An issued component auth token.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedComponent {
    /// The token the new node presents to the control plane.
    pub full_auth_token: String,
    /// Component id, when reported.
    #[serde(default)]
    pub component_id: Option<String>,
}

/// Request body for setting a node's ACL.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AclRequest<'a> {
    resource_id: &'a SdcId,
    organization: &'a str,
    permissions: &'a [Permission],
}

/// Request body for replacing a node's labels.
#[derive(Debug, Serialize)]
struct UpdateLabelsRequest<'a> {
    id: &'a SdcId,
    organization: &'a str,
    labels: &'a LabelSet,
}

/// A job as listed by label.
#[derive(Debug, Clone, Deserialize)]
pub struct JobSummary {
    /// Job id.
    pub id: JobId,
}

/// A pipeline running on a node, as reported by the node's pipeline listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePipeline {
    /// Job the pipeline belongs to.
    pub job_id: JobId,
    /// Pinned to this node; never migrated.
    #[serde(default)]
    pub local_pipeline: bool,
}

/// A control plane session bound to one organization and one session token.
pub struct ControlPlaneSession<C> {
    client: Arc<C>,
    token: SessionToken,
    organization: String,
}

impl<C: ControlPlaneClient> ControlPlaneSession<C> {
    /// Create a new session.
    #[must_use]
    pub fn new(client: Arc<C>, token: SessionToken, organization: impl Into<String>) -> Self {
        Self {
            client,
            token,
            organization: organization.into(),
        }
    }

    /// Get the organization this session acts on.
    #[must_use]
    pub fn organization(&self) -> &str {
        &self.organization
    }

    async fn send(&self, request: ApiRequest) -> Result<Option<Value>> {
        self.client.send(&self.token, request).await
    }

    /// Issue `count` active data collector auth tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the response is not a list of
    /// issued components.
    pub async fn issue_component_tokens(&self, count: u32) -> Result<Vec<IssuedComponent>> {
        let body = to_body(&IssueComponentsRequest {
            organization: &self.organization,
            component_type: DATA_COLLECTOR_COMPONENT,
            number_of_components: count,
            active: true,
        })?;
        let path = format!(
            "/security/rest/v1/organization/{}/components",
            self.organization
        );
        let value = self.send(ApiRequest::put(path, body)).await?;
        Ok(decode(value)?.unwrap_or_default())
    }

    /// Replace the ACL of a node resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails.
    pub async fn set_sdc_acl(&self, sdc_id: &SdcId, permissions: &[Permission]) -> Result<()> {
        let body = to_body(&AclRequest {
            resource_id: sdc_id,
            organization: &self.organization,
            permissions,
        })?;
        let path = format!("/jobrunner/rest/v1/sdc/{sdc_id}/acl");
        self.send(ApiRequest::post(path, body)).await?;
        Ok(())
    }

    /// Replace the labels of a node. An empty set strips every label.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails.
    pub async fn update_labels(&self, sdc_id: &SdcId, labels: &LabelSet) -> Result<()> {
        let body = to_body(&UpdateLabelsRequest {
            id: sdc_id,
            organization: &self.organization,
            labels,
        })?;
        let path = format!("/jobrunner/rest/v1/sdc/{sdc_id}/updateLabels");
        self.send(ApiRequest::post(path, body)).await?;
        Ok(())
    }

    /// List the jobs in the organization carrying `label`.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the response is not a job list.
    pub async fn jobs_by_label(&self, label: &str) -> Result<Vec<JobSummary>> {
        let request = ApiRequest::get("/jobrunner/rest/v1/jobs")
            .with_query("organization", self.organization.as_str())
            .with_query("jobLabel", label);
        let value = self.send(request).await?;
        Ok(decode(value)?.unwrap_or_default())
    }

    /// Ask the control plane to redistribute `job_ids` across eligible nodes.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails.
    pub async fn balance_jobs(&self, job_ids: &[JobId]) -> Result<()> {
        let body = to_body(&job_ids)?;
        self.send(ApiRequest::post("/jobrunner/rest/v1/jobs/balanceJobs", body))
            .await?;
        Ok(())
    }

    /// List the pipelines currently running on a node.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the response is not a pipeline list.
    pub async fn sdc_pipelines(&self, sdc_id: &SdcId) -> Result<Vec<NodePipeline>> {
        let path = format!("/jobrunner/rest/v1/sdc/{sdc_id}/pipelines");
        let value = self.send(ApiRequest::get(path)).await?;
        Ok(decode(value)?.unwrap_or_default())
    }

    /// Ids of the jobs on a node that can migrate elsewhere.
    ///
    /// Local pipelines are pinned to the node and are left out.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline listing fails.
    pub async fn migratable_job_ids(&self, sdc_id: &SdcId) -> Result<Vec<JobId>> {
        let pipelines = self.sdc_pipelines(sdc_id).await?;
        Ok(pipelines
            .into_iter()
            .filter(|p| !p.local_pipeline)
            .map(|p| p.job_id)
            .collect())
    }

    /// Ask the control plane to re-evaluate placement of `job_ids`.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails.
    pub async fn sync_jobs(&self, job_ids: &[JobId]) -> Result<()> {
        let body = to_body(&job_ids)?;
        self.send(ApiRequest::post("/jobrunner/rest/v1/jobs/syncJobs", body))
            .await?;
        Ok(())
    }

    /// Deactivate the auth tokens of the given nodes.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails.
    pub async fn deactivate_component_tokens(&self, sdc_ids: &[SdcId]) -> Result<()> {
        self.component_bulk_call("deactivate", sdc_ids).await
    }

    /// Delete the auth tokens of the given nodes.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails.
    pub async fn delete_component_tokens(&self, sdc_ids: &[SdcId]) -> Result<()> {
        self.component_bulk_call("delete", sdc_ids).await
    }

    async fn component_bulk_call(&self, operation: &str, sdc_ids: &[SdcId]) -> Result<()> {
        let body = to_body(&sdc_ids)?;
        let path = format!(
            "/security/rest/v1/organization/{}/components/{operation}",
            self.organization
        );
        self.send(ApiRequest::post(path, body)).await?;
        Ok(())
    }

    /// Delete the node resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails.
    pub async fn delete_sdc(&self, sdc_id: &SdcId) -> Result<()> {
        let path = format!("/jobrunner/rest/v1/sdc/{sdc_id}");
        self.send(ApiRequest::delete(path)).await?;
        Ok(())
    }
}

#[async_trait]
impl<C: ControlPlaneClient> JobSource for ControlPlaneSession<C> {
    async fn migratable_jobs(&self, sdc_id: &SdcId) -> Result<Vec<JobId>> {
        self.migratable_job_ids(sdc_id).await
    }
}

fn to_body<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| ControlError::Decode(format!("failed to encode request body: {e}")))
}

fn decode<T: DeserializeOwned>(value: Option<Value>) -> Result<Option<T>> {
    value
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| ControlError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingClient, Reply};
    use reqwest::Method;
    use serde_json::json;

    fn session(client: &Arc<RecordingClient>) -> ControlPlaneSession<RecordingClient> {
        ControlPlaneSession::new(
            Arc::clone(client),
            SessionToken::new("tok").unwrap(),
            "acme",
        )
    }

    fn sdc() -> SdcId {
        SdcId::new("node-1").unwrap()
    }

    #[test]
    fn permission_serializes_like_the_api() {
        let permission = Permission::full_access("ops", SubjectType::Group);
        assert_eq!(
            serde_json::to_value(&permission).unwrap(),
            json!({
                "subjectId": "ops",
                "subjectType": "GROUP",
                "actions": ["READ", "WRITE", "EXECUTE"]
            })
        );
    }

    #[tokio::test]
    async fn issue_component_tokens_request_shape() {
        let client = Arc::new(RecordingClient::new());
        client.reply(
            Method::PUT,
            "/security/rest/v1/organization/acme/components",
            Reply::Json(json!([{"fullAuthToken": "abc", "componentId": "c-1"}])),
        );

        let issued = session(&client).issue_component_tokens(1).await.unwrap();
        assert_eq!(issued.len(), 1);
        assert_eq!(issued[0].full_auth_token, "abc");
        assert_eq!(issued[0].component_id.as_deref(), Some("c-1"));

        let calls = client.calls();
        assert_eq!(
            calls[0].body,
            Some(json!({
                "organization": "acme",
                "componentType": "dc",
                "numberOfComponents": 1,
                "active": true
            }))
        );
    }

    #[tokio::test]
    async fn update_labels_request_shape() {
        let client = Arc::new(RecordingClient::new());
        session(&client)
            .update_labels(&sdc(), &LabelSet::empty())
            .await
            .unwrap();

        let calls = client.calls();
        assert_eq!(calls[0].method, Method::POST);
        assert_eq!(calls[0].path, "/jobrunner/rest/v1/sdc/node-1/updateLabels");
        assert_eq!(
            calls[0].body,
            Some(json!({"id": "node-1", "organization": "acme", "labels": []}))
        );
    }

    #[tokio::test]
    async fn jobs_by_label_uses_query() {
        let client = Arc::new(RecordingClient::new());
        client.reply(
            Method::GET,
            "/jobrunner/rest/v1/jobs",
            Reply::Json(json!([{"id": "j1", "name": "ingest"}, {"id": "j2"}])),
        );

        let jobs = session(&client).jobs_by_label("west").await.unwrap();
        let ids: Vec<_> = jobs.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["j1", "j2"]);

        let calls = client.calls();
        assert_eq!(
            calls[0].query,
            vec![
                ("organization".to_string(), "acme".to_string()),
                ("jobLabel".to_string(), "west".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn migratable_jobs_skip_local_pipelines() {
        let client = Arc::new(RecordingClient::new());
        client.reply(
            Method::GET,
            "/jobrunner/rest/v1/sdc/node-1/pipelines",
            Reply::Json(json!([
                {"jobId": "j1", "localPipeline": false},
                {"jobId": "local", "localPipeline": true},
                {"jobId": "j2"}
            ])),
        );

        let ids = session(&client).migratable_jobs(&sdc()).await.unwrap();
        assert_eq!(ids, vec![JobId::from("j1"), JobId::from("j2")]);
    }

    #[tokio::test]
    async fn empty_pipeline_listing_means_no_jobs() {
        let client = Arc::new(RecordingClient::new());
        client.reply(
            Method::GET,
            "/jobrunner/rest/v1/sdc/node-1/pipelines",
            Reply::Empty,
        );

        let ids = session(&client).migratable_job_ids(&sdc()).await.unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn malformed_listing_is_decode_error() {
        let client = Arc::new(RecordingClient::new());
        client.reply(
            Method::GET,
            "/jobrunner/rest/v1/sdc/node-1/pipelines",
            Reply::Json(json!({"unexpected": "object"})),
        );

        let err = session(&client).sdc_pipelines(&sdc()).await.unwrap_err();
        assert!(matches!(err, ControlError::Decode(_)));
    }

    #[tokio::test]
    async fn component_bulk_calls_send_singleton_lists() {
        let client = Arc::new(RecordingClient::new());
        let session = session(&client);
        session.deactivate_component_tokens(&[sdc()]).await.unwrap();
        session.delete_component_tokens(&[sdc()]).await.unwrap();

        let calls = client.calls();
        assert_eq!(
            calls[0].path,
            "/security/rest/v1/organization/acme/components/deactivate"
        );
        assert_eq!(calls[0].body, Some(json!(["node-1"])));
        assert_eq!(
            calls[1].path,
            "/security/rest/v1/organization/acme/components/delete"
        );
        assert_eq!(calls[1].body, Some(json!(["node-1"])));
    }
}
