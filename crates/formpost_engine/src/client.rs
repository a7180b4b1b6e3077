use std::sync::Arc;
use std::time::Duration;

use formpost_core::{
    ChunkIndex, FormSchema, Mode, OutcomeStatus, Payload, RowIndex, SubmissionOutcome,
    TransportKind,
};
use pipeline_logging::pipeline_debug;
use reqwest::header::{CONTENT_TYPE, REFERER};
use tokio::sync::{Mutex, Semaphore, SemaphorePermit};
use tokio::time::Instant;

use crate::types::{system_clock, Clock, TransportError};

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
    pub send_referer: bool,
    pub max_in_flight: usize,
    pub min_interval: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            user_agent: "Mozilla/5.0".to_string(),
            send_referer: true,
            max_in_flight: 1,
            min_interval: Duration::ZERO,
        }
    }
}

/// Global ceiling on in-flight requests plus a minimum spacing between request starts.
pub struct RateLimiter {
    in_flight: Semaphore,
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(max_in_flight: usize, min_interval: Duration) -> Self {
        Self {
            in_flight: Semaphore::new(max_in_flight.max(1)),
            min_interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Wait for a free slot. The returned permit must be held for the whole request.
    pub async fn acquire(&self) -> Option<SemaphorePermit<'_>> {
        let permit = self.in_flight.acquire().await.ok();
        if !self.min_interval.is_zero() {
            let slot = {
                let mut next = self.next_slot.lock().await;
                let now = Instant::now();
                let slot = match *next {
                    Some(at) if at > now => at,
                    _ => now,
                };
                *next = Some(slot + self.min_interval);
                slot
            };
            tokio::time::sleep_until(slot).await;
        }
        permit
    }
}

/// Sends one form-encoded body and reports the HTTP status code.
#[async_trait::async_trait]
pub trait FormTransport: Send + Sync {
    async fn post_form(&self, url: &str, payload: &Payload) -> Result<u16, TransportError>;
}

/// Shared HTTP session and rate limiter, passed explicitly to the client.
pub struct SubmissionContext {
    http: reqwest::Client,
    limiter: RateLimiter,
    settings: ClientSettings,
}

impl SubmissionContext {
    pub fn new(settings: ClientSettings) -> Result<Self, TransportError> {
        // Redirects are reported as 3xx, never followed.
        let http = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|err| TransportError::new(TransportKind::Network, err.to_string()))?;
        let limiter = RateLimiter::new(settings.max_in_flight, settings.min_interval);
        Ok(Self {
            http,
            limiter,
            settings,
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }
}

#[async_trait::async_trait]
impl FormTransport for SubmissionContext {
    async fn post_form(&self, url: &str, payload: &Payload) -> Result<u16, TransportError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|err| TransportError::new(TransportKind::InvalidUrl, err.to_string()))?;
        let _permit = self.limiter.acquire().await;

        let mut request = self
            .http
            .post(parsed)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(encode_form(payload));
        if self.settings.send_referer {
            request = request.header(REFERER, referer_for(url));
        }

        let response = request.send().await.map_err(map_reqwest_error)?;
        Ok(response.status().as_u16())
    }
}

pub fn encode_form(payload: &Payload) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (field, value) in payload.iter() {
        serializer.append_pair(field, value);
    }
    serializer.finish()
}

/// The page a browser would have submitted from.
pub fn referer_for(form_url: &str) -> String {
    form_url.replace("/formResponse", "/viewform")
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::new(TransportKind::Timeout, err.to_string());
    }
    if err.is_connect() {
        return TransportError::new(TransportKind::Connect, err.to_string());
    }
    if err.is_builder() {
        return TransportError::new(TransportKind::InvalidUrl, err.to_string());
    }
    TransportError::new(TransportKind::Network, err.to_string())
}

/// One attempt at one row.
#[derive(Debug, Clone, Copy)]
pub struct SubmissionRequest<'a> {
    pub row_index: RowIndex,
    pub chunk_index: ChunkIndex,
    pub attempt: u32,
    pub payload: &'a Payload,
}

/// Makes exactly one attempt per call and turns it into a recorded outcome.
#[derive(Clone)]
pub struct SubmissionClient {
    transport: Arc<dyn FormTransport>,
    form_url: String,
    schema: FormSchema,
    clock: Clock,
    record_payloads: bool,
}

impl SubmissionClient {
    pub fn new(
        transport: Arc<dyn FormTransport>,
        form_url: impl Into<String>,
        schema: FormSchema,
    ) -> Self {
        Self {
            transport,
            form_url: form_url.into(),
            schema,
            clock: system_clock(),
            record_payloads: true,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_record_payloads(mut self, record: bool) -> Self {
        self.record_payloads = record;
        self
    }

    pub fn form_url(&self) -> &str {
        &self.form_url
    }

    pub async fn submit(&self, request: &SubmissionRequest<'_>, mode: Mode) -> SubmissionOutcome {
        let status = match mode {
            Mode::DryRun => self.validate(request.payload),
            Mode::Live => match self.transport.post_form(&self.form_url, request.payload).await {
                Ok(code) if (200..300).contains(&code) => OutcomeStatus::Success { code },
                Ok(code) => OutcomeStatus::HttpFailure { code },
                Err(err) => OutcomeStatus::TransportFailure {
                    transport: err.kind,
                    message: err.message,
                },
            },
        };
        pipeline_debug!(
            "row {} attempt {} ({}): {}",
            request.row_index,
            request.attempt,
            mode,
            status
        );

        SubmissionOutcome {
            row_index: request.row_index,
            chunk_index: request.chunk_index,
            attempt: request.attempt,
            mode,
            status,
            payload_digest: request.payload.digest(),
            payload: self.record_payloads.then(|| request.payload.clone()),
            timestamp: (self.clock)(),
        }
    }

    fn validate(&self, payload: &Payload) -> OutcomeStatus {
        let (missing, unexpected) = self.schema.check(payload);
        if missing.is_empty() && unexpected.is_empty() {
            OutcomeStatus::DryRunOk
        } else {
            OutcomeStatus::DryRunInvalid {
                missing,
                unexpected,
            }
        }
    }
}
