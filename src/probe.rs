//! Credential connectivity probe.
//!
//! Before a run, each parsed key can be tested with a minimal request
//! against the primary model, falling back once to the fallback model on a
//! 404. The caller rebuilds the pool from the surviving keys.

use std::sync::Arc;

use crate::client::{ClassifyTransport, GenerateContentRequest};
use crate::keypool::redact_key;
use crate::types::ModelSelector;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStatus {
    /// The key answered a test request on this model.
    Ok { model: String },
    /// Upstream rejected the key (or every model we tried).
    Invalid { status: u16 },
    /// The request never completed.
    Unreachable { detail: String },
}

#[derive(Debug, Clone)]
pub struct KeyProbe {
    pub key: String,
    pub status: ProbeStatus,
}

impl KeyProbe {
    pub fn is_ok(&self) -> bool {
        matches!(self.status, ProbeStatus::Ok { .. })
    }
}

/// Probe each key sequentially. Returns one entry per key, input order
/// preserved.
pub async fn probe_credentials(
    transport: Arc<dyn ClassifyTransport>,
    endpoint: &str,
    models: &ModelSelector,
    keys: &[String],
) -> Vec<KeyProbe> {
    let request = GenerateContentRequest::probe("Hello");
    let mut probes = Vec::with_capacity(keys.len());

    for key in keys {
        let status = probe_one(transport.as_ref(), endpoint, models, key, &request).await;
        if !matches!(status, ProbeStatus::Ok { .. }) {
            tracing::warn!(credential = %redact_key(key), status = ?status, "credential probe failed");
        }
        probes.push(KeyProbe {
            key: key.clone(),
            status,
        });
    }
    probes
}

async fn probe_one(
    transport: &dyn ClassifyTransport,
    endpoint: &str,
    models: &ModelSelector,
    key: &str,
    request: &GenerateContentRequest,
) -> ProbeStatus {
    let reply = match transport.generate(endpoint, &models.primary, key, request).await {
        Ok(reply) => reply,
        Err(e) => {
            return ProbeStatus::Unreachable {
                detail: e.to_string(),
            }
        }
    };

    match reply.status {
        200..=299 => ProbeStatus::Ok {
            model: models.primary.clone(),
        },
        404 if models.can_fall_back() => {
            match transport
                .generate(endpoint, &models.fallback, key, request)
                .await
            {
                Ok(fallback_reply) if (200..=299).contains(&fallback_reply.status) => {
                    ProbeStatus::Ok {
                        model: models.fallback.clone(),
                    }
                }
                Ok(fallback_reply) => ProbeStatus::Invalid {
                    status: fallback_reply.status,
                },
                Err(e) => ProbeStatus::Unreachable {
                    detail: e.to_string(),
                },
            }
        }
        status => ProbeStatus::Invalid { status },
    }
}

/// Keys that passed the probe, input order preserved.
pub fn surviving_keys(probes: &[KeyProbe]) -> Vec<String> {
    probes
        .iter()
        .filter(|p| p.is_ok())
        .map(|p| p.key.clone())
        .collect()
}
