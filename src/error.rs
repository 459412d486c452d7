// HTTP API error types.
//
// The wire envelope uses the Italian field names of the original VoiceNotes
// client contract (errore/messaggio/dettagli/codice); they must not be
// renamed without a coordinated client release.
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

/// HTTP API error with appropriate status codes and client-friendly messages.
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    Validation(String),

    // 403 Forbidden
    DangerousOperation {
        operation: String,
        details: String,
    },
    TableAccessDenied {
        table: Option<String>,
        details: String,
    },

    // 429 Too Many Requests
    RateLimited(String),

    // 500 Internal Server Error
    UpstreamUnreachable(String),
    Internal(String),

    // 502 Bad Gateway (AI provider issues)
    AiProvider(String),

    // 503 Service Unavailable
    AiNotConfigured,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::DangerousOperation { .. } => StatusCode::FORBIDDEN,
            ApiError::TableAccessDenied { .. } => StatusCode::FORBIDDEN,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::UpstreamUnreachable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::AiProvider(_) => StatusCode::BAD_GATEWAY,
            ApiError::AiNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Machine-readable code for client handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::DangerousOperation { .. } => "DANGEROUS_METHOD_BLOCKED",
            ApiError::TableAccessDenied { .. } => "TABLE_ACCESS_DENIED",
            ApiError::RateLimited(_) => "PROXY_RATE_LIMIT_EXCEEDED",
            ApiError::UpstreamUnreachable(_) => "UPSTREAM_UNREACHABLE",
            ApiError::Internal(_) => "INTERNAL_ERROR",
            ApiError::AiProvider(_) => "AI_PROVIDER_ERROR",
            ApiError::AiNotConfigured => "AI_NOT_CONFIGURED",
        }
    }

    /// Short error name shown in the `errore` field.
    pub fn title(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "Richiesta non valida",
            ApiError::DangerousOperation { .. } => "Operazione non consentita",
            ApiError::TableAccessDenied { .. } => "Accesso alla tabella negato",
            ApiError::RateLimited(_) => "Troppe richieste",
            ApiError::UpstreamUnreachable(_) => "Servizio upstream non raggiungibile",
            ApiError::Internal(_) => "Errore interno",
            ApiError::AiProvider(_) => "Errore del provider AI",
            ApiError::AiNotConfigured => "Servizio AI non configurato",
        }
    }

    pub fn message(&self) -> String {
        match self {
            ApiError::Validation(msg) => msg.clone(),
            ApiError::DangerousOperation { operation, .. } => {
                format!("L'operazione '{operation}' non è consentita dal proxy")
            }
            ApiError::TableAccessDenied { table, .. } => match table {
                Some(name) => format!("L'accesso alla tabella '{name}' non è consentito"),
                None => "La risorsa richiesta non è identificabile e non può essere autorizzata"
                    .to_string(),
            },
            ApiError::RateLimited(msg) => msg.clone(),
            ApiError::UpstreamUnreachable(msg) => msg.clone(),
            ApiError::Internal(msg) => msg.clone(),
            ApiError::AiProvider(msg) => msg.clone(),
            ApiError::AiNotConfigured => {
                "Nessuna chiave API configurata per il provider di embedding".to_string()
            }
        }
    }

    fn details(&self) -> String {
        match self {
            ApiError::DangerousOperation { details, .. } => details.clone(),
            ApiError::TableAccessDenied { details, .. } => details.clone(),
            _ => self.message(),
        }
    }

    /// Convert to the JSON envelope shared by every gate.
    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "errore": self.title(),
            "messaggio": self.message(),
            "dettagli": self.details(),
            "codice": self.error_code(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        // Denials carry the resolved table so clients can report it.
        if let ApiError::TableAccessDenied { table, .. } = self {
            body["tabella"] = match table {
                Some(name) => Value::String(name.clone()),
                None => Value::Null,
            };
        }

        body
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status_code(), Json(self.to_json())).into_response()
    }
}
