//! Generated advice about the user's recent spending.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    Extension, Json,
    extract::{FromRef, State},
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{
    AppState, Error,
    db::with_connection,
    payment::{Payment, get_recent_payments},
    user::User,
};

/// How many of the most recent payments are included in the prompt.
pub const RECENT_PAYMENT_LIMIT: u32 = 50;
/// The reply when the user has no payments to analyse.
pub const NO_PAYMENTS_MESSAGE: &str = "Adicione gastos para analisar.";
/// The reply when the text generator fails.
pub const GENERATION_FAILED_MESSAGE: &str = "Erro na IA.";

/// How long a call to Gemini may take before it is abandoned.
pub const GEMINI_TIMEOUT: Duration = Duration::from_secs(30);

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Something that can answer a text prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, Error>;
}

/// Calls the Gemini `generateContent` API.
pub struct GeminiClient {
    /// `None` makes every request fail without touching the network.
    api_key: Option<String>,
    http_client: reqwest::Client,
    generate_url: String,
}

impl GeminiClient {
    /// A client for the public Gemini API that gives up after [GEMINI_TIMEOUT].
    ///
    /// # Errors
    ///
    /// Returns [Error::TextGeneration] if the HTTP client cannot be built.
    pub fn new(api_key: Option<String>) -> Result<Self, Error> {
        Self::with_api_url(api_key, GEMINI_API_URL, GEMINI_TIMEOUT)
    }

    /// A client that sends requests to the models under `api_url`.
    ///
    /// # Errors
    ///
    /// Returns [Error::TextGeneration] if the HTTP client cannot be built.
    pub fn with_api_url(
        api_key: Option<String>,
        api_url: &str,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| Error::TextGeneration(error.to_string()))?;

        Ok(Self {
            api_key,
            http_client,
            generate_url: format!("{api_url}/{GEMINI_MODEL}:generateContent"),
        })
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, Error> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::TextGeneration("GEMINI_API_KEY is not set".to_owned()))?;

        let body = GenerateRequest {
            contents: [Content {
                parts: [RequestPart { text: prompt }],
            }],
        };

        let response = self
            .http_client
            .post(&self.generate_url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|error| Error::TextGeneration(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::TextGeneration(format!("Gemini returned {status}")));
        }

        let response: GenerateResponse = response
            .json()
            .await
            .map_err(|error| Error::TextGeneration(error.to_string()))?;

        response
            .candidates
            .into_iter()
            .next()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect::<String>()
            })
            .ok_or_else(|| Error::TextGeneration("Gemini returned no candidates".to_owned()))
    }
}

/// Build the prompt asking for tips about `payments`.
pub fn build_prompt(payments: &[Payment]) -> String {
    let total: f64 = payments.iter().map(|payment| payment.amount).sum();

    let history: String = payments
        .iter()
        .map(|payment| format!("- {}: R$ {:.2}\n", payment.title, payment.amount))
        .collect();

    format!("Analise estes gastos (Total R$ {total:.2}):\nHistórico:\n{history}Dê 2 dicas rápidas.")
}

#[derive(Clone)]
pub struct SummaryState {
    pub db_connection: Arc<Mutex<Connection>>,
    pub text_generator: Arc<dyn TextGenerator>,
}

impl FromRef<AppState> for SummaryState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            text_generator: state.text_generator.clone(),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub analysis: String,
}

/// Ask the text generator for tips on the current user's recent payments.
///
/// Generator failures are logged and replaced with [GENERATION_FAILED_MESSAGE].
pub async fn analyze_finances(
    State(state): State<SummaryState>,
    Extension(user): Extension<User>,
) -> Result<Json<Analysis>, Error> {
    let payments = with_connection(&state.db_connection, |connection| {
        get_recent_payments(user.id, RECENT_PAYMENT_LIMIT, connection)
    })?;

    if payments.is_empty() {
        return Ok(Json(Analysis {
            analysis: NO_PAYMENTS_MESSAGE.to_owned(),
        }));
    }

    let prompt = build_prompt(&payments);
    let analysis = match state.text_generator.generate(&prompt).await {
        Ok(reply) => reply,
        Err(error) => {
            tracing::error!("could not analyse finances for user {}: {error}", user.id);
            GENERATION_FAILED_MESSAGE.to_owned()
        }
    };

    tracing::debug!("analysed {} payments for user {}", payments.len(), user.id);

    Ok(Json(Analysis { analysis }))
}

#[cfg(test)]
mod build_prompt_tests {
    use time::macros::datetime;

    use crate::{payment::Payment, summary::build_prompt, user::UserID};

    fn payment(id: i64, title: &str, amount: f64) -> Payment {
        Payment {
            id,
            title: title.to_owned(),
            amount,
            category: "Casa".to_owned(),
            paid_at: datetime!(2025-05-01 12:00 UTC),
            receipt_url: None,
            owner_id: UserID::new(1),
        }
    }

    #[test]
    fn prompt_lists_every_payment_once_with_total() {
        let payments = [payment(1, "Aluguel", 1500.0), payment(2, "Mercado", 89.9)];

        let prompt = build_prompt(&payments);

        assert_eq!(
            prompt,
            "Analise estes gastos (Total R$ 1589.90):\n\
            Histórico:\n\
            - Aluguel: R$ 1500.00\n\
            - Mercado: R$ 89.90\n\
            Dê 2 dicas rápidas."
        );
        assert_eq!(prompt.matches("Aluguel").count(), 1);
        assert_eq!(prompt.matches("R$ 1589.90").count(), 1);
    }
}
