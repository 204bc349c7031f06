//! [`PaymentNode`] backed by LND's REST API.

use crate::{
    config::settings,
    node::{
        CompletedPayment, HoldInvoice, Invoice, InvoiceState, InvoiceUpdate, NodeError,
        PaymentNode, PaymentRequest, PaymentResult, PaymentStatus, Route, SendPayment,
        Subscription,
    },
    Preimage, RelativeTime, SwapHash, Timestamp,
};
use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Certificate, RequestBuilder, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{convert::TryFrom, time::Duration};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const MACAROON_HEADER: &str = "Grpc-Metadata-macaroon";
const SUBSCRIPTION_BUFFER: usize = 16;

/// gRPC status codes the REST gateway forwards in error bodies.
const GRPC_DEADLINE_EXCEEDED: i32 = 4;
const GRPC_UNAVAILABLE: i32 = 14;

#[derive(Clone, Debug)]
pub struct LndConnectorParams {
    pub rest_api_url: Url,
    pub certificate: Certificate,
    /// Hex encoded.
    pub macaroon: String,
    pub request_timeout: Duration,
}

impl LndConnectorParams {
    /// Reads the TLS certificate and the macaroon from the paths configured
    /// in `lnd`.
    pub fn read(lnd: &settings::Lnd) -> anyhow::Result<Self> {
        let pem = std::fs::read(&lnd.cert_path).with_context(|| {
            format!(
                "failed to read tls certificate from {}",
                lnd.cert_path.display()
            )
        })?;
        let certificate = Certificate::from_pem(&pem).context("invalid tls certificate")?;

        let macaroon = std::fs::read(&lnd.macaroon_path).with_context(|| {
            format!(
                "failed to read macaroon from {}",
                lnd.macaroon_path.display()
            )
        })?;

        Ok(LndConnectorParams {
            rest_api_url: lnd.rest_api_url.clone(),
            certificate,
            macaroon: hex::encode(macaroon),
            request_timeout: lnd.request_timeout,
        })
    }
}

#[derive(Clone, Debug)]
pub struct LndConnector {
    client: reqwest::Client,
    rest_api_url: Url,
    macaroon: String,
    request_timeout: Duration,
}

impl LndConnector {
    pub fn new(params: LndConnectorParams) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .add_root_certificate(params.certificate)
            .build()
            .context("failed to build http client")?;

        Ok(LndConnector {
            client,
            rest_api_url: params.rest_api_url,
            macaroon: params.macaroon,
            request_timeout: params.request_timeout,
        })
    }

    fn url(&self, path: &str) -> Result<Url, NodeError> {
        self.rest_api_url
            .join(path)
            .map_err(|e| NodeError::Transport(format!("invalid url for {}: {}", path, e)))
    }

    fn get(&self, path: &str) -> Result<RequestBuilder, NodeError> {
        Ok(self
            .client
            .get(self.url(path)?)
            .header(MACAROON_HEADER, &self.macaroon))
    }

    fn post<B>(&self, path: &str, body: &B) -> Result<RequestBuilder, NodeError>
    where
        B: Serialize + ?Sized,
    {
        Ok(self
            .client
            .post(self.url(path)?)
            .header(MACAROON_HEADER, &self.macaroon)
            .json(body))
    }

    /// Sends a unary request, bounded by the request timeout.
    async fn call<R>(&self, request: RequestBuilder) -> Result<R, NodeError>
    where
        R: DeserializeOwned,
    {
        let response = request
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(transport_error)?;

        read_response(response).await
    }

    async fn list_payments(&self) -> Result<Vec<LndPayment>, NodeError> {
        let response: ListPaymentsResponse = self
            .call(self.get("/v1/payments?include_incomplete=true")?)
            .await?;

        Ok(response.payments)
    }
}

#[async_trait]
impl PaymentNode for LndConnector {
    async fn create_hold_invoice(&self, invoice: HoldInvoice) -> Result<PaymentRequest, NodeError> {
        let request = AddHoldInvoiceRequest {
            memo: &invoice.memo,
            hash: invoice.swap_hash.to_base64(),
            value: invoice.amount,
            expiry: u64::from(invoice.expiry.as_secs()),
            cltv_expiry: u64::from(invoice.final_cltv_expiry),
        };

        let response: AddHoldInvoiceResponse =
            self.call(self.post("/v2/invoices/hodl", &request)?).await?;

        Ok(PaymentRequest(response.payment_request))
    }

    async fn lookup_invoice(&self, swap_hash: SwapHash) -> Result<Invoice, NodeError> {
        let invoice: LndInvoice = self
            .call(self.get(&format!("/v1/invoice/{:x}", swap_hash))?)
            .await?;

        Ok(Invoice {
            payment_request: PaymentRequest(invoice.payment_request),
            final_cltv_expiry: narrow(invoice.cltv_expiry, "cltv_expiry")?,
            value: invoice.value,
            state: invoice.state.into(),
        })
    }

    async fn subscribe_invoice(
        &self,
        swap_hash: SwapHash,
    ) -> Result<Subscription<InvoiceUpdate>, NodeError> {
        // Long lived, the request timeout does not apply.
        let response = self
            .get(&format!(
                "/v2/invoices/subscribe/{}",
                swap_hash.to_base64_url()
            ))?
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(read_error(response).await);
        }

        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let cancel = CancellationToken::new();
        tokio::spawn(forward_invoice_updates(response, sender, cancel.clone()));

        Ok(Subscription::new(receiver, cancel))
    }

    async fn send_payment(&self, payment: SendPayment) -> Result<PaymentResult, NodeError> {
        let destination = hex::decode(&payment.destination)
            .map_err(|_| NodeError::Rejected("destination is not a hex public key".to_owned()))?;

        let request = SendRequest {
            dest: base64::encode(destination),
            amt: payment.amount,
            payment_hash: payment.swap_hash.to_base64(),
            final_cltv_delta: payment.final_cltv_delta,
            cltv_limit: payment.cltv_limit,
        };

        let response: SendResponse = self
            .call(self.post("/v1/channels/transactions", &request)?)
            .await?;

        response.into_payment_result()
    }

    async fn send_to_route(
        &self,
        swap_hash: SwapHash,
        route: Route,
    ) -> Result<Subscription<PaymentResult>, NodeError> {
        let request = SendToRouteRequest {
            payment_hash: swap_hash.to_base64(),
            route,
        };

        let response: Result<SendResponse, NodeError> = self
            .call(self.post("/v1/channels/transactions/route", &request)?)
            .await;

        // Unary over REST: the only result is buffered before the
        // subscription is handed out, so there is no producer to cancel.
        let (sender, receiver) = mpsc::channel(1);
        sender
            .try_send(response.and_then(SendResponse::into_payment_result))
            .map_err(|e| NodeError::Transport(format!("failed to buffer route result: {}", e)))?;

        Ok(Subscription::new(receiver, CancellationToken::new()))
    }

    async fn settle_invoice(&self, preimage: Preimage) -> Result<(), NodeError> {
        let request = SettleInvoiceRequest {
            preimage: preimage.to_base64(),
        };

        let _: serde_json::Value = self
            .call(self.post("/v2/invoices/settle", &request)?)
            .await?;

        Ok(())
    }

    async fn cancel_invoice(&self, swap_hash: SwapHash) -> Result<(), NodeError> {
        let request = CancelInvoiceRequest {
            payment_hash: swap_hash.to_base64(),
        };

        let _: serde_json::Value = self
            .call(self.post("/v2/invoices/cancel", &request)?)
            .await?;

        Ok(())
    }

    async fn lookup_payment_status(&self, swap_hash: SwapHash) -> Result<PaymentStatus, NodeError> {
        let payments = self.list_payments().await?;

        Ok(payment_status(swap_hash, &payments))
    }

    async fn list_completed_payments(&self) -> Result<Vec<CompletedPayment>, NodeError> {
        let payments = self.list_payments().await?;

        Ok(payments
            .iter()
            .filter(|payment| payment.status == LndPaymentStatus::Succeeded)
            .filter_map(LndPayment::completed)
            .collect())
    }
}

async fn forward_invoice_updates(
    response: reqwest::Response,
    sender: mpsc::Sender<Result<InvoiceUpdate, NodeError>>,
    cancel: CancellationToken,
) {
    let chunks = response.bytes_stream();
    tokio::pin!(chunks);
    let mut buffer = Vec::new();

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::trace!("invoice subscription cancelled");
                return;
            }
            chunk = chunks.next() => chunk,
        };

        match chunk {
            Some(Ok(bytes)) => buffer.extend_from_slice(&bytes),
            Some(Err(e)) => {
                let _ = sender.send(Err(transport_error(e))).await;
                return;
            }
            None => return,
        }

        while let Some(end) = buffer.iter().position(|byte| *byte == b'\n') {
            let line = buffer.drain(..=end).collect::<Vec<u8>>();
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            if sender.send(parse_invoice_update(&line)).await.is_err() {
                return;
            }
        }
    }
}

fn parse_invoice_update(line: &[u8]) -> Result<InvoiceUpdate, NodeError> {
    let message = serde_json::from_slice::<StreamMessage<LndInvoice>>(line)
        .map_err(|e| NodeError::Transport(format!("malformed invoice update: {}", e)))?;

    match message {
        StreamMessage {
            result: Some(invoice),
            ..
        } => Ok(InvoiceUpdate {
            state: invoice.state.into(),
            creation_date: Timestamp::from(narrow(invoice.creation_date, "creation_date")?),
            expiry: RelativeTime::new(narrow(invoice.expiry, "expiry")?),
        }),
        StreamMessage {
            error: Some(error), ..
        } => Err(error.into_node_error()),
        _ => Err(NodeError::Transport(
            "invoice update without result".to_owned(),
        )),
    }
}

/// Several attempts may exist for one hash, the most advanced one wins.
fn payment_status(swap_hash: SwapHash, payments: &[LndPayment]) -> PaymentStatus {
    let statuses = payments
        .iter()
        .filter(|payment| payment.swap_hash() == Some(swap_hash))
        .map(|payment| payment.status)
        .collect::<Vec<_>>();

    if statuses.contains(&LndPaymentStatus::Succeeded) {
        PaymentStatus::Complete
    } else if statuses
        .iter()
        .any(|status| matches!(status, LndPaymentStatus::InFlight | LndPaymentStatus::Pending))
    {
        PaymentStatus::InFlight
    } else if statuses.contains(&LndPaymentStatus::Failed) {
        PaymentStatus::Failed
    } else {
        PaymentStatus::Grounded
    }
}

async fn read_response<R>(response: reqwest::Response) -> Result<R, NodeError>
where
    R: DeserializeOwned,
{
    if !response.status().is_success() {
        return Err(read_error(response).await);
    }

    response.json::<R>().await.map_err(transport_error)
}

async fn read_error(response: reqwest::Response) -> NodeError {
    let status = response.status();

    match response.json::<RestError>().await {
        Ok(error) => error.into_node_error(),
        Err(_) => status_error(status),
    }
}

/// For replies without a gateway error body, typically from a proxy in front
/// of the node.
fn status_error(status: StatusCode) -> NodeError {
    match status {
        StatusCode::GATEWAY_TIMEOUT => NodeError::DeadlineExceeded,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE => {
            NodeError::Transport(format!("payment node unavailable: {}", status))
        }
        _ => NodeError::Rejected(format!("payment node responded with {}", status)),
    }
}

fn transport_error(error: reqwest::Error) -> NodeError {
    if error.is_timeout() {
        NodeError::DeadlineExceeded
    } else {
        NodeError::Transport(error.to_string())
    }
}

fn narrow(value: u64, field: &str) -> Result<u32, NodeError> {
    u32::try_from(value)
        .map_err(|_| NodeError::Transport(format!("{} out of range: {}", field, value)))
}

#[derive(Debug, Serialize)]
struct AddHoldInvoiceRequest<'a> {
    memo: &'a str,
    hash: String,
    #[serde(with = "crate::serde_str")]
    value: u64,
    #[serde(with = "crate::serde_str")]
    expiry: u64,
    #[serde(with = "crate::serde_str")]
    cltv_expiry: u64,
}

#[derive(Debug, Deserialize)]
struct AddHoldInvoiceResponse {
    payment_request: String,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
enum LndInvoiceState {
    #[serde(rename = "OPEN", alias = "0")]
    Open,
    #[serde(rename = "SETTLED", alias = "1")]
    Settled,
    #[serde(rename = "CANCELED", alias = "2")]
    Canceled,
    #[serde(rename = "ACCEPTED", alias = "3")]
    Accepted,
}

impl From<LndInvoiceState> for InvoiceState {
    fn from(state: LndInvoiceState) -> Self {
        match state {
            LndInvoiceState::Open => InvoiceState::Open,
            LndInvoiceState::Settled => InvoiceState::Settled,
            LndInvoiceState::Canceled => InvoiceState::Canceled,
            LndInvoiceState::Accepted => InvoiceState::Accepted,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LndInvoice {
    #[serde(default)]
    payment_request: String,
    #[serde(default, with = "crate::serde_str")]
    value: u64,
    #[serde(default, with = "crate::serde_str")]
    cltv_expiry: u64,
    #[serde(default, with = "crate::serde_str")]
    creation_date: u64,
    #[serde(default, with = "crate::serde_str")]
    expiry: u64,
    state: LndInvoiceState,
}

#[derive(Debug, Deserialize)]
struct StreamMessage<T> {
    result: Option<T>,
    error: Option<RestError>,
}

#[derive(Debug, Deserialize)]
struct RestError {
    #[serde(default)]
    code: Option<i32>,
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

impl RestError {
    fn into_node_error(self) -> NodeError {
        let message = if self.message.is_empty() {
            self.error
        } else {
            self.message
        };

        match self.code {
            Some(GRPC_DEADLINE_EXCEEDED) => NodeError::DeadlineExceeded,
            Some(GRPC_UNAVAILABLE) => NodeError::Transport(message),
            _ if message.contains("already exists") => NodeError::HashAlreadyExists,
            _ => NodeError::Rejected(message),
        }
    }
}

#[derive(Debug, Serialize)]
struct SendRequest {
    dest: String,
    #[serde(with = "crate::serde_str")]
    amt: u64,
    payment_hash: String,
    final_cltv_delta: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    cltv_limit: Option<u32>,
}

#[derive(Debug, Serialize)]
struct SendToRouteRequest {
    payment_hash: String,
    route: Route,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    payment_error: String,
    #[serde(default)]
    payment_preimage: String,
}

impl SendResponse {
    fn into_payment_result(self) -> Result<PaymentResult, NodeError> {
        let preimage = if self.payment_preimage.is_empty() {
            None
        } else {
            let preimage = Preimage::from_base64(&self.payment_preimage)
                .map_err(|e| NodeError::Transport(format!("malformed preimage: {}", e)))?;
            Some(preimage).filter(|preimage| preimage.as_bytes() != &[0u8; Preimage::LENGTH])
        };

        Ok(PaymentResult {
            preimage,
            payment_error: Some(self.payment_error).filter(|e| !e.is_empty()),
        })
    }
}

#[derive(Debug, Serialize)]
struct SettleInvoiceRequest {
    preimage: String,
}

#[derive(Debug, Serialize)]
struct CancelInvoiceRequest {
    payment_hash: String,
}

#[derive(Debug, Deserialize)]
struct ListPaymentsResponse {
    #[serde(default)]
    payments: Vec<LndPayment>,
}

#[derive(Copy, Clone, Debug, Deserialize, PartialEq)]
enum LndPaymentStatus {
    #[serde(rename = "UNKNOWN", alias = "0")]
    Unknown,
    #[serde(rename = "IN_FLIGHT", alias = "1")]
    InFlight,
    #[serde(rename = "SUCCEEDED", alias = "2")]
    Succeeded,
    #[serde(rename = "FAILED", alias = "3")]
    Failed,
    /// `INITIATED` and whatever later node releases add.
    #[serde(other)]
    Pending,
}

/// Hashes and preimages are hex encoded in payment listings.
#[derive(Clone, Debug, Deserialize)]
struct LndPayment {
    payment_hash: String,
    #[serde(default)]
    payment_preimage: String,
    status: LndPaymentStatus,
}

impl LndPayment {
    fn swap_hash(&self) -> Option<SwapHash> {
        self.payment_hash.parse().ok()
    }

    fn completed(&self) -> Option<CompletedPayment> {
        Some(CompletedPayment {
            swap_hash: self.swap_hash()?,
            preimage: self.payment_preimage.parse().ok()?,
        })
    }
}
