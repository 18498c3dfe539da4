//! Ledger gateway backed by a signing relay
//!
//! The relay owns the host keypair and the ledger wire encoding. This side
//! speaks plain JSON and treats any non-2xx answer as a rejection.

use super::{LedgerGateway, TaskSubmission};
use crate::error::{LedgerError, LedgerResult};
use async_trait::async_trait;
use chrono::DateTime;
use hashnet_types::{
    AccountRef, MachineRecord, MachineUuid, OrderMetadata, OrderRecord, OrderRef, Receipt,
};
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Machine record as the relay renders it
#[derive(Debug, Deserialize)]
struct MachineWire {
    status: String,
    #[serde(default)]
    order: Option<String>,
    #[serde(default)]
    metadata: String,
}

impl TryFrom<MachineWire> for MachineRecord {
    type Error = LedgerError;

    fn try_from(wire: MachineWire) -> LedgerResult<Self> {
        Ok(MachineRecord {
            status: wire.status.parse()?,
            order: OrderRef::from_ledger(wire.order.as_deref()),
            metadata: wire.metadata,
        })
    }
}

/// Order record as the relay renders it
#[derive(Debug, Deserialize)]
struct OrderWire {
    status: String,
    buyer: String,
    start_time: i64,
    duration_hours: u32,
    #[serde(default)]
    metadata: String,
}

impl TryFrom<OrderWire> for OrderRecord {
    type Error = LedgerError;

    fn try_from(wire: OrderWire) -> LedgerResult<Self> {
        let start_time = DateTime::from_timestamp(wire.start_time, 0)
            .ok_or_else(|| LedgerError::Decode(format!("start_time {}", wire.start_time)))?;
        Ok(OrderRecord {
            status: wire.status.parse()?,
            buyer: AccountRef::new(wire.buyer),
            start_time,
            duration_hours: wire.duration_hours,
            metadata: wire.metadata,
        })
    }
}

#[derive(Serialize)]
struct ResolveRequest<'a> {
    machine_uuid: &'a MachineUuid,
}

#[derive(Deserialize)]
struct ResolveResponse {
    account: AccountRef,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    metadata: &'a str,
}

#[derive(Serialize)]
struct OrderStartRequest<'a> {
    machine: &'a AccountRef,
}

#[derive(Serialize)]
struct OrderCompletedRequest<'a> {
    machine: &'a AccountRef,
    metadata: String,
    score: u8,
}

#[derive(Serialize)]
struct OrderFailedRequest<'a> {
    machine: &'a AccountRef,
    buyer: &'a AccountRef,
    metadata: String,
}

#[derive(Serialize)]
struct TaskRequest<'a> {
    machine: &'a AccountRef,
    #[serde(flatten)]
    task: &'a TaskSubmission,
}

/// HTTP client for the signing relay
pub struct RelayLedgerGateway {
    client: Client,
    base_url: Url,
    machine_account: AccountRef,
}

impl RelayLedgerGateway {
    /// Resolve this host's machine account and build the gateway.
    pub async fn connect(base_url: impl Into<String>, machine_uuid: MachineUuid) -> LedgerResult<Self> {
        let client = Client::new();
        let raw = base_url.into();
        let base_url = Url::parse(&raw)
            .map_err(|e| LedgerError::Transport(format!("invalid relay URL {}: {}", raw, e)))?;

        let response = client
            .post(endpoint(&base_url, &["v1", "machines", "resolve"])?)
            .json(&ResolveRequest {
                machine_uuid: &machine_uuid,
            })
            .send()
            .await?;
        let resolved: ResolveResponse = check(response).await?.json().await?;
        debug!(machine = %resolved.account, uuid = %machine_uuid, "Resolved machine account");

        Ok(Self {
            client,
            base_url,
            machine_account: resolved.account,
        })
    }

    fn url(&self, segments: &[&str]) -> LedgerResult<Url> {
        endpoint(&self.base_url, segments)
    }

    async fn submit<B: Serialize + ?Sized>(&self, segments: &[&str], body: &B) -> LedgerResult<Receipt> {
        let response = self.client.post(self.url(segments)?).json(body).send().await?;
        Ok(check(response).await?.json().await?)
    }
}

/// Append percent-encoded path segments to the relay base URL.
fn endpoint(base: &Url, segments: &[&str]) -> LedgerResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| LedgerError::Transport(format!("relay URL cannot take a path: {}", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

async fn check(response: Response) -> LedgerResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(LedgerError::Rejected {
        status: status.as_u16(),
        body,
    })
}

fn encode(metadata: &OrderMetadata) -> LedgerResult<String> {
    metadata
        .encode()
        .map_err(|e| LedgerError::Decode(e.to_string()))
}

#[async_trait]
impl LedgerGateway for RelayLedgerGateway {
    fn machine_account(&self) -> &AccountRef {
        &self.machine_account
    }

    async fn fetch_machine(&self) -> LedgerResult<Option<MachineRecord>> {
        let response = self
            .client
            .get(self.url(&["v1", "machines", self.machine_account.as_str()])?)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let wire: MachineWire = check(response).await?.json().await?;
        Ok(Some(wire.try_into()?))
    }

    async fn fetch_order(&self, order: &OrderRef) -> LedgerResult<OrderRecord> {
        let response = self
            .client
            .get(self.url(&["v1", "orders", order.as_str()])?)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(LedgerError::NotFound(order.to_string()));
        }
        let wire: OrderWire = check(response).await?.json().await?;
        wire.try_into()
    }

    async fn register_machine(&self, metadata: &str) -> LedgerResult<Receipt> {
        self.submit(
            &["v1", "machines", self.machine_account.as_str(), "register"],
            &RegisterRequest { metadata },
        )
        .await
    }

    async fn remove_machine(&self) -> LedgerResult<Receipt> {
        self.submit(
            &["v1", "machines", self.machine_account.as_str(), "remove"],
            &serde_json::json!({}),
        )
        .await
    }

    async fn submit_order_start(&self, order: &OrderRef) -> LedgerResult<Receipt> {
        self.submit(
            &["v1", "orders", order.as_str(), "start"],
            &OrderStartRequest {
                machine: &self.machine_account,
            },
        )
        .await
    }

    async fn submit_order_completed(
        &self,
        order: &OrderRef,
        metadata: &OrderMetadata,
        score: u8,
    ) -> LedgerResult<Receipt> {
        self.submit(
            &["v1", "orders", order.as_str(), "complete"],
            &OrderCompletedRequest {
                machine: &self.machine_account,
                metadata: encode(metadata)?,
                score,
            },
        )
        .await
    }

    async fn submit_order_failed(
        &self,
        order: &OrderRef,
        buyer: &AccountRef,
        metadata: &OrderMetadata,
    ) -> LedgerResult<Receipt> {
        self.submit(
            &["v1", "orders", order.as_str(), "fail"],
            &OrderFailedRequest {
                machine: &self.machine_account,
                buyer,
                metadata: encode(metadata)?,
            },
        )
        .await
    }

    async fn submit_task(&self, task: &TaskSubmission) -> LedgerResult<Receipt> {
        self.submit(
            &["v1", "tasks"],
            &TaskRequest {
                machine: &self.machine_account,
                task,
            },
        )
        .await
    }
}
